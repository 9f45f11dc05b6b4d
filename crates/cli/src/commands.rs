//! CLI commands

use anyhow::{Context as _, Result, bail};
use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use swiftmeal_http::client::notify::Notifier;
use swiftmeal_http::types::{LoginRequest, Order, OrderFilters, OrderStatus};
use swiftmeal_http::{ApiClient, Persistence, SessionStore, TieredSessionStore};
use tracing::{debug, info, warn};

use crate::config;

/// Values shared by every command
pub struct Context {
    pub data_dir: PathBuf,
    pub config_path: Option<PathBuf>,
    pub api_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "SWIFTMEAL_PASSWORD", hide_env_values = true)]
        password: String,

        /// Keep the session on disk for later commands
        #[arg(long)]
        remember_me: bool,
    },

    /// Sign out and remove the stored session
    Logout,

    /// Show whether a session is stored
    Session,

    /// Order operations
    Orders {
        #[command(subcommand)]
        command: OrderCommands,
    },

    /// Look up an order by its public order number
    Track {
        order_number: String,

        /// Keep polling until the order is delivered or cancelled
        #[arg(long)]
        follow: bool,

        /// Seconds between polls in follow mode
        #[arg(long, default_value = "15")]
        interval: u64,
    },

    /// Notification operations
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },

    /// Payment operations
    Payments {
        #[command(subcommand)]
        command: PaymentCommands,
    },

    /// Generate configuration files
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum OrderCommands {
    /// List orders visible to the signed-in user
    List {
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        area: Option<String>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show one order as JSON
    Show { id: String },

    /// Move an order to a new stage
    Status { id: String, status: String },
}

#[derive(Subcommand)]
pub enum NotificationCommands {
    /// List notifications
    List,

    /// Mark every notification as read
    ReadAll,
}

#[derive(Subcommand)]
pub enum PaymentCommands {
    /// Check the state of a payment
    Verify {
        reference: String,

        /// Poll until the payment settles
        #[arg(long)]
        wait: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Output file path (defaults to <data-dir>/config.toml)
        output: Option<PathBuf>,
    },
}

/// Prints failures the way a toast would show them
struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn error(&self, message: &str) {
        eprintln!("swiftmeal: {message}");
    }

    fn success(&self, message: &str) {
        eprintln!("swiftmeal: {message}");
    }
}

fn login_hint() {
    eprintln!("swiftmeal: run `swiftmeal login` to sign in again");
}

impl Commands {
    /// Whether the command runs until interrupted
    pub const fn is_long_running(&self) -> bool {
        matches!(self, Self::Track { follow: true, .. })
    }

    pub async fn execute(self, context: Context) -> Result<()> {
        match self {
            Self::Login {
                email,
                password,
                remember_me,
            } => login(&build_client(&context)?, email, password, remember_me).await,
            Self::Logout => {
                build_client(&context)?.logout().await?;
                println!("Signed out");
                Ok(())
            }
            Self::Session => show_session(&build_client(&context)?),
            Self::Orders { command } => command.execute(&build_client(&context)?).await,
            Self::Track {
                order_number,
                follow,
                interval,
            } => {
                let client = build_client(&context)?;
                if follow {
                    follow_order(&client, &order_number, Duration::from_secs(interval.max(1))).await
                } else {
                    let order = client.track_order(&order_number).await?;
                    print_order_line(&order);
                    Ok(())
                }
            }
            Self::Notifications { command } => command.execute(&build_client(&context)?).await,
            Self::Payments { command } => command.execute(&build_client(&context)?).await,
            Self::Config { command } => command.execute(&context),
        }
    }
}

fn build_client(context: &Context) -> Result<ApiClient> {
    let config = config::load_client_config(
        context.config_path.as_deref(),
        &context.data_dir,
        context.api_url.clone(),
    )?;
    debug!(api_url = %config.api_url, "Loaded client configuration");

    let store: Arc<dyn SessionStore> = Arc::new(TieredSessionStore::with_durable_file(
        context.data_dir.join(config::SESSION_FILE),
    ));

    ApiClient::builder_from_config(&config)
        .shared_session_store(store)
        .notifier(StderrNotifier)
        .navigator(login_hint)
        .build()
        .context("Failed to create API client")
}

async fn login(client: &ApiClient, email: String, password: String, remember_me: bool) -> Result<()> {
    let credentials = LoginRequest { email, password };
    let response = client.login(&credentials, remember_me).await?;

    let name = response
        .user
        .as_ref()
        .and_then(|user| user.name.clone())
        .unwrap_or(credentials.email);
    println!("Signed in as {name}");
    if !remember_me {
        // The ephemeral tier lives in memory and ends with this process.
        println!("Session was not remembered; pass --remember-me to stay signed in");
    }
    Ok(())
}

fn show_session(client: &ApiClient) -> Result<()> {
    let Some(info) = client.restore_session()? else {
        println!("Not signed in");
        return Ok(());
    };

    let tier = match info.persistence {
        Persistence::Durable => "remembered",
        Persistence::Ephemeral => "this session only",
    };
    match info.user {
        Some(user) => {
            let name = user.name.unwrap_or(user.email);
            let role = user.role.as_deref().unwrap_or("unknown role");
            println!("Signed in as {name} ({role}, {tier})");
        }
        None => println!("Signed in ({tier})"),
    }
    Ok(())
}

fn print_order_line(order: &Order) {
    let delay = match order.delay_minutes {
        Some(minutes) if order.is_delayed => format!("  delayed {minutes} min"),
        _ if order.is_delayed => "  delayed".to_string(),
        _ => String::new(),
    };
    let eta = order
        .estimated_delivery_time
        .as_deref()
        .map(|eta| format!("  eta {eta}"))
        .unwrap_or_default();
    println!("{:<14} {:<18}{eta}{delay}", order.order_number, order.status);
}

async fn follow_order(client: &ApiClient, order_number: &str, interval: Duration) -> Result<()> {
    let mut last_status: Option<OrderStatus> = None;

    loop {
        match client.track_order(order_number).await {
            Ok(order) => {
                if last_status.as_ref() != Some(&order.status) {
                    print_order_line(&order);
                    last_status = Some(order.status.clone());
                }
                if !order.status.is_active() {
                    info!(order_number, status = %order.status, "Order finished");
                    return Ok(());
                }
            }
            Err(e) if e.is_retryable() => {
                warn!(order_number, error = %e, "Tracking lookup failed, retrying");
            }
            Err(e) => return Err(e.into()),
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            result = tokio::signal::ctrl_c() => {
                result?;
                debug!("Interrupted while following order");
                return Ok(());
            }
        }
    }
}

impl OrderCommands {
    async fn execute(self, client: &ApiClient) -> Result<()> {
        match self {
            Self::List {
                status,
                area,
                page,
                limit,
            } => {
                let filters = OrderFilters {
                    status,
                    area,
                    page,
                    limit,
                    ..OrderFilters::default()
                };
                let page = client.list_orders(&filters).await?;
                if page.orders.is_empty() {
                    println!("No orders");
                }
                for order in &page.orders {
                    print_order_line(order);
                }
                if let Some(pagination) = page.pagination {
                    println!(
                        "page {} of {} ({} orders)",
                        pagination.page, pagination.pages, pagination.total
                    );
                }
                Ok(())
            }
            Self::Show { id } => {
                let order = client.get_order(&id).await?;
                println!("{}", serde_json::to_string_pretty(&order)?);
                Ok(())
            }
            Self::Status { id, status } => {
                let status = OrderStatus::from(status.as_str());
                if let OrderStatus::Other(unknown) = &status {
                    bail!("Unknown order status '{unknown}'");
                }
                let order = client.update_order_status(&id, status, None).await?;
                print_order_line(&order);
                Ok(())
            }
        }
    }
}

impl NotificationCommands {
    async fn execute(self, client: &ApiClient) -> Result<()> {
        match self {
            Self::List => {
                let notifications = client.list_notifications().await?;
                if notifications.is_empty() {
                    println!("No notifications");
                }
                for notification in notifications {
                    let marker = if notification.read { ' ' } else { '*' };
                    match notification.title {
                        Some(title) => println!("{marker} {title}: {}", notification.message),
                        None => println!("{marker} {}", notification.message),
                    }
                }
                Ok(())
            }
            Self::ReadAll => {
                client.mark_all_notifications_read().await?;
                println!("All notifications marked as read");
                Ok(())
            }
        }
    }
}

impl PaymentCommands {
    async fn execute(self, client: &ApiClient) -> Result<()> {
        match self {
            Self::Verify { reference, wait } => {
                let verification = if wait {
                    client.await_payment_confirmation(&reference).await?
                } else {
                    client.verify_payment(&reference).await?
                };
                println!("{} {}", verification.reference, verification.status);
                if verification.is_terminal() && !verification.is_successful() {
                    bail!("Payment {} did not succeed", verification.reference);
                }
                Ok(())
            }
        }
    }
}

impl ConfigCommands {
    fn execute(self, context: &Context) -> Result<()> {
        match self {
            Self::Init { output } => {
                let config_path = output.unwrap_or_else(|| context.data_dir.join(config::CONFIG_FILE));

                // Create parent directory if it doesn't exist
                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }

                config::generate_default_config(&config_path)?;
                println!("Generated configuration at: {}", config_path.display());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(data_dir: &std::path::Path) -> Context {
        Context {
            data_dir: data_dir.to_path_buf(),
            config_path: None,
            api_url: None,
        }
    }

    #[tokio::test]
    async fn test_config_init_needs_no_client() {
        let dir = tempfile::tempdir().unwrap();
        // An unusable API URL would fail client construction.
        let context = Context {
            api_url: Some("not a url".to_string()),
            ..context(dir.path())
        };

        let command = Commands::Config {
            command: ConfigCommands::Init { output: None },
        };
        command.execute(context).await.unwrap();
        assert!(dir.path().join(config::CONFIG_FILE).exists());
    }

    #[tokio::test]
    async fn test_session_without_login_reports_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        Commands::Session.execute(context(dir.path())).await.unwrap();
        assert!(!dir.path().join(config::SESSION_FILE).exists());
    }
}
