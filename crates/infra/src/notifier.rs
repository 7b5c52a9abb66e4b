//! Outbound alert seam.
//!
//! Delivery mechanics (SMTP, provider APIs) live outside this crate; the
//! service only needs something that accepts an [`AlertNotice`].

use thiserror::Error;
use tracing::warn;

use larder_inventory::AlertNotice;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait::async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, recipient: Option<&str>, notice: &AlertNotice) -> Result<(), NotifyError>;
}

/// Writes alerts to the log instead of sending them. Used when no mail
/// transport is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait::async_trait]
impl AlertNotifier for TracingNotifier {
    async fn notify(&self, recipient: Option<&str>, notice: &AlertNotice) -> Result<(), NotifyError> {
        warn!(
            slug = %notice.slug,
            recipient = recipient.unwrap_or("-"),
            subject = %notice.subject,
            "low stock alert"
        );
        Ok(())
    }
}
