//! Server → bridge requests

use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, UserId};
use crate::types::{CodeToken, EntityRef, PageCursor, PasswordCredential};

/// A single request line written to the bridge's stdin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub id: String,
    #[serde(flatten)]
    pub op: BridgeOp,
}

impl BridgeRequest {
    pub fn new(op: BridgeOp) -> Self {
        Self {
            id: crate::new_id(),
            op,
        }
    }
}

/// Operations the bridge performs against the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeOp {
    Connect {
        api_id: i32,
        api_hash: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session: Option<String>,
    },
    Disconnect,
    SendCode {
        phone: String,
    },
    SignIn {
        phone: String,
        phone_code_hash: CodeToken,
        code: String,
    },
    DerivePassword {
        password: String,
    },
    CheckPassword {
        credential: PasswordCredential,
    },
    ExportSession,
    ResolveEntity {
        entity: EntityRef,
    },
    GetMe,
    GetParticipant {
        channel_id: ChannelId,
        user_id: UserId,
    },
    GetJoinRequests {
        channel_id: ChannelId,
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<PageCursor>,
        limit: u32,
    },
    ApproveJoinRequest {
        channel_id: ChannelId,
        user_id: UserId,
    },
}

impl BridgeOp {
    /// Short name for log fields
    pub fn name(&self) -> &'static str {
        match self {
            BridgeOp::Connect { .. } => "connect",
            BridgeOp::Disconnect => "disconnect",
            BridgeOp::SendCode { .. } => "send_code",
            BridgeOp::SignIn { .. } => "sign_in",
            BridgeOp::DerivePassword { .. } => "derive_password",
            BridgeOp::CheckPassword { .. } => "check_password",
            BridgeOp::ExportSession => "export_session",
            BridgeOp::ResolveEntity { .. } => "resolve_entity",
            BridgeOp::GetMe => "get_me",
            BridgeOp::GetParticipant { .. } => "get_participant",
            BridgeOp::GetJoinRequests { .. } => "get_join_requests",
            BridgeOp::ApproveJoinRequest { .. } => "approve_join_request",
        }
    }
}
