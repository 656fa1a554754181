//! joinwarden Protocol
//!
//! Platform-facing types shared by the approval server and its connectors,
//! plus the NDJSON frames exchanged with a platform bridge process.

use uuid::Uuid;

// Re-exports
pub mod frame;
pub mod ids;
pub mod request;
pub mod types;

pub use frame::{BridgeErrorBody, BridgeFrame};
pub use ids::{ChannelId, UserId};
pub use request::{BridgeOp, BridgeRequest};
pub use types::*;

/// Generate a new unique request ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
