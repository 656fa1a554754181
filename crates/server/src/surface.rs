//! Outbound side of the command surface.

use async_trait::async_trait;
use joinwarden_protocol::UserId;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Delivery to {to} failed: {reason}")]
    Delivery { to: UserId, reason: String },
}

/// Delivers plain-text replies and notifications to an identity.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_text(&self, to: UserId, text: &str) -> Result<(), SurfaceError>;
}

/// Send a reply, logging instead of failing when delivery breaks.
pub async fn deliver(sink: &dyn ReplySink, to: UserId, text: &str) {
    if let Err(e) = sink.send_text(to, text).await {
        warn!(
            component = "surface",
            event = "surface.delivery_failed",
            to = %to,
            error = %e,
            "Reply dropped"
        );
    }
}
