//! Order API client methods

use super::{ApiClient, ApiRequest, ClientError};
use crate::types::{
    CreateOrderRequest, Location, Order, OrderFilters, OrderPage, OrderStatus,
    UpdateOrderStatusRequest,
};

impl ApiClient {
    /// Place an order
    pub async fn create_order(&self, order: &CreateOrderRequest) -> Result<Order, ClientError> {
        let request = ApiRequest::post("/orders").json(order)?;
        self.send(request).await
    }

    /// List orders visible to the signed-in user
    pub async fn list_orders(&self, filters: &OrderFilters) -> Result<OrderPage, ClientError> {
        let request = ApiRequest::get("/orders").query(filters)?;
        self.send(request).await
    }

    /// Get one order
    pub async fn get_order(&self, order_id: &str) -> Result<Order, ClientError> {
        self.send(ApiRequest::get(format!("/orders/{order_id}")))
            .await
    }

    /// Move an order to a new stage (riders and admins)
    pub async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        location: Option<Location>,
    ) -> Result<Order, ClientError> {
        let request = ApiRequest::patch(format!("/orders/{order_id}/status"))
            .json(&UpdateOrderStatusRequest { status, location })?;
        self.send(request).await
    }

    /// Public tracking lookup by order number
    pub async fn track_order(&self, order_number: &str) -> Result<Order, ClientError> {
        let request = ApiRequest::get(format!("/track/{order_number}")).anonymous();
        self.send(request).await
    }
}
