//! Payment API client methods
//!
//! A payment reference returned by the provider's redirect is confirmed by
//! the backend only after the provider's webhook lands. Instead of waiting a
//! fixed delay, [`ApiClient::await_payment_confirmation`] polls the
//! verification endpoint on a capped exponential schedule.

use super::{ApiClient, ApiRequest, ClientError};
use crate::types::{InitiatePaymentRequest, PaymentInitiation, PaymentVerification};
use thiserror::Error;

/// Payment confirmation errors
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The provider never reached a final state
    #[error("Payment {reference} is still {status} after {attempts} checks")]
    Pending {
        reference: String,
        status: String,
        attempts: u32,
    },

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl ApiClient {
    /// Start a payment for an order
    pub async fn initiate_payment(
        &self,
        payment: &InitiatePaymentRequest,
    ) -> Result<PaymentInitiation, ClientError> {
        let request = ApiRequest::post("/payments").json(payment)?;
        self.send(request).await
    }

    /// Ask the backend for the current state of a payment
    pub async fn verify_payment(&self, reference: &str) -> Result<PaymentVerification, ClientError> {
        self.send(ApiRequest::get(format!("/payments/verify/{reference}")))
            .await
    }

    /// Poll until the payment is final or the schedule runs out
    pub async fn await_payment_confirmation(
        &self,
        reference: &str,
    ) -> Result<PaymentVerification, PaymentError> {
        let policy = &self.payment_poll;
        let attempts = policy.max_attempts.max(1);
        let request = ApiRequest::get(format!("/payments/verify/{reference}"));
        let mut status = String::from("unverified");

        for attempt in 0..attempts {
            match self.send_quietly::<PaymentVerification>(&request).await {
                Ok(verification) if verification.is_terminal() => {
                    info!(
                        reference,
                        status = %verification.status,
                        attempt = attempt + 1,
                        "Payment settled"
                    );
                    return Ok(verification);
                }
                Ok(verification) => {
                    debug!(reference, status = %verification.status, "Payment not settled yet");
                    status = verification.status;
                }
                Err(e) if e.is_retryable() => {
                    debug!(reference, error = %e, "Payment verification failed, retrying");
                }
                Err(e) => {
                    self.report(&e);
                    return Err(e.into());
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
            }
        }

        warn!(reference, %status, attempts, "Payment still unsettled");
        Err(PaymentError::Pending {
            reference: reference.to_string(),
            status,
            attempts,
        })
    }
}
