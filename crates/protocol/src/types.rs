//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, UserId};

/// Opaque handle correlating a one-time-code request with its verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeToken(pub String);

/// Platform-derived second-factor credential (SRP parameters and proof)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordCredential(pub serde_json::Value);

/// How the admin named a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRef {
    Id(ChannelId),
    Username(String),
}

impl EntityRef {
    /// Parse admin input: a numeric id, `@name`, `name`, or a `t.me/` link.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(id) = trimmed.parse::<ChannelId>() {
            return Some(EntityRef::Id(id));
        }

        let name = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let name = name.strip_prefix("t.me/").unwrap_or(name);
        let name = name.strip_prefix('@').unwrap_or(name);

        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        valid.then(|| EntityRef::Username(name.to_string()))
    }
}

/// A resolved chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDescriptor {
    pub id: ChannelId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl ChatDescriptor {
    pub fn display_name(&self) -> String {
        self.title
            .clone()
            .or_else(|| self.username.as_ref().map(|u| format!("@{u}")))
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Admin rights granted to a channel administrator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminRights {
    pub invite_users: bool,
    pub change_info: bool,
    pub post_messages: bool,
    pub edit_messages: bool,
    pub delete_messages: bool,
    pub ban_users: bool,
    pub add_admins: bool,
}

/// Membership of an identity in a channel, decoded once at the client boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParticipantStatus {
    Creator {
        #[serde(default)]
        rights: Option<AdminRights>,
    },
    Admin {
        #[serde(default)]
        rights: Option<AdminRights>,
    },
    Member,
    #[serde(rename = "none")]
    NotMember,
}

impl ParticipantStatus {
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            ParticipantStatus::Creator { .. } | ParticipantStatus::Admin { .. }
        )
    }

    /// Creators hold every right unless a rights structure says otherwise.
    /// Admins must carry an explicit `invite_users` grant.
    pub fn can_invite_users(&self) -> bool {
        match self {
            ParticipantStatus::Creator { rights } => rights.map_or(true, |r| r.invite_users),
            ParticipantStatus::Admin { rights } => rights.is_some_and(|r| r.invite_users),
            ParticipantStatus::Member | ParticipantStatus::NotMember => false,
        }
    }
}

/// A pending request to join a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub requested_at: Option<i64>,
    #[serde(default)]
    pub about: Option<String>,
}

/// Position after the last request of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub offset_date: i64,
    pub offset_user: UserId,
}

/// One page of pending join requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequestPage {
    pub requests: Vec<JoinRequest>,
    /// None when this is the final page
    #[serde(default)]
    pub next_cursor: Option<PageCursor>,
}

/// Live update pushed by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlatformUpdate {
    JoinRequested {
        channel_id: ChannelId,
        user_id: UserId,
        #[serde(default)]
        about: Option<String>,
    },
    #[serde(other)]
    Unhandled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ref_parses_numeric_ids_and_names() {
        assert_eq!(
            EntityRef::parse("-1003784917581"),
            Some(EntityRef::Id(ChannelId(-1003784917581)))
        );
        assert_eq!(
            EntityRef::parse(" @ExampleChannel "),
            Some(EntityRef::Username("ExampleChannel".into()))
        );
        assert_eq!(
            EntityRef::parse("https://t.me/ExampleChannel"),
            Some(EntityRef::Username("ExampleChannel".into()))
        );
        assert_eq!(EntityRef::parse("not a channel"), None);
        assert_eq!(EntityRef::parse("   "), None);
    }

    #[test]
    fn participant_status_decodes_admin_rights() {
        let raw = r#"{"status":"admin","rights":{"invite_users":false,"ban_users":true}}"#;
        let status: ParticipantStatus = serde_json::from_str(raw).unwrap();
        assert!(status.is_admin());
        assert!(!status.can_invite_users());

        let creator: ParticipantStatus = serde_json::from_str(r#"{"status":"creator"}"#).unwrap();
        assert!(creator.can_invite_users());

        let bare_admin: ParticipantStatus = serde_json::from_str(r#"{"status":"admin"}"#).unwrap();
        assert!(bare_admin.is_admin());
        assert!(!bare_admin.can_invite_users());

        let none: ParticipantStatus = serde_json::from_str(r#"{"status":"none"}"#).unwrap();
        assert_eq!(none, ParticipantStatus::NotMember);
        assert!(!none.is_admin());
    }

    #[test]
    fn unknown_update_kinds_are_unhandled() {
        let update: PlatformUpdate =
            serde_json::from_str(r#"{"kind":"new_message","text":"hi"}"#).unwrap();
        assert_eq!(update, PlatformUpdate::Unhandled);

        let join: PlatformUpdate = serde_json::from_str(
            r#"{"kind":"join_requested","channel_id":"3784917581","user_id":42}"#,
        )
        .unwrap();
        assert_eq!(
            join,
            PlatformUpdate::JoinRequested {
                channel_id: ChannelId(3784917581),
                user_id: UserId(42),
                about: None,
            }
        );
    }
}
