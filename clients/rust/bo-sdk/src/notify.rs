//! Mutation notifications

use tracing::info;

/// Receives the `message` of successful mutation responses
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Logs notifications at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        info!(target: "bo_sdk::notify", "{}", message);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _message: &str) {}
}
