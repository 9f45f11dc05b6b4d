//! Host capabilities the client reports through
//!
//! The client never renders anything itself. Errors go to a [`Notifier`]
//! (a toast surface in a UI, stderr in a terminal) and a forced logout asks
//! a [`Navigator`] to show the login view.

/// User-visible notification surface
pub trait Notifier: Send + Sync {
    /// Show an error message
    fn error(&self, message: &str);

    /// Show a confirmation message
    fn success(&self, _message: &str) {}
}

/// Notifier that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn error(&self, message: &str) {
        warn!(%message, "User notification");
    }

    fn success(&self, message: &str) {
        info!(%message, "User notification");
    }
}

/// Capability to send the user to the login view
pub trait Navigator: Send + Sync {
    fn navigate_to_login(&self);
}

impl<F> Navigator for F
where
    F: Fn() + Send + Sync,
{
    fn navigate_to_login(&self) {
        self();
    }
}

/// Fallback used when the host registered no navigation callback
#[derive(Debug, Clone)]
pub struct HardRedirect {
    login_path: String,
}

impl HardRedirect {
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }
}

impl Default for HardRedirect {
    fn default() -> Self {
        Self::new("/login")
    }
}

impl Navigator for HardRedirect {
    fn navigate_to_login(&self) {
        warn!(target_path = %self.login_path, "Redirecting to login");
    }
}
