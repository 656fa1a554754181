//! Bridge → server frames

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::PlatformUpdate;

/// A single line read from the bridge's stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeFrame {
    /// Reply to a request, correlated by `id`
    Response {
        id: String,
        ok: bool,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<BridgeErrorBody>,
    },
    /// Unsolicited platform update
    Update { update: PlatformUpdate },
}

/// Platform RPC error as reported by the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeErrorBody {
    #[serde(default)]
    pub code: i32,
    pub message: String,
    /// Some bridges pre-parse the flood wait duration
    #[serde(default)]
    pub seconds: Option<u64>,
}
