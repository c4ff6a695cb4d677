use async_trait::async_trait;
use tracing::info;

/// Outbound user notifications (chat bot, email — whatever the deployment
/// wires in). Failures are the implementation's problem; callers fire and
/// forget.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// One message per lifecycle event: launch completed, refund issued,
    /// claim landed. `detail` is a category-level description, never a
    /// stack trace.
    async fn notify(&self, user_id: &str, detail: &str);
}

/// Default sink: the structured log. Deployments replace this with a chat
/// integration.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: &str, detail: &str) {
        info!(user_id, "notify: {detail}");
    }
}
