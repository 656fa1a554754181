use thiserror::Error;

/// Errors surfaced by a platform client, classified by the action they demand
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The account has two-step verification enabled
    #[error("Two-step verification password required")]
    PasswordRequired,

    /// Rate limit; retry after the suggested number of seconds
    #[error("Rate limited by the platform{}", flood_suffix(.seconds))]
    FloodWait { seconds: Option<u64> },

    /// Any other platform RPC failure
    #[error("{message}")]
    Rpc { code: i32, message: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Channel closed")]
    ChannelClosed,
}

fn flood_suffix(seconds: &Option<u64>) -> String {
    match seconds {
        Some(s) => format!(" (wait {s}s)"),
        None => String::new(),
    }
}

impl PlatformError {
    /// Classify a raw platform RPC error.
    ///
    /// `seconds` wins over a duration parsed from `FLOOD_WAIT_<n>`.
    pub fn from_rpc(code: i32, message: &str, seconds: Option<u64>) -> Self {
        if message == "SESSION_PASSWORD_NEEDED" {
            return PlatformError::PasswordRequired;
        }

        if let Some(rest) = message.strip_prefix("FLOOD_WAIT") {
            let parsed = rest.trim_start_matches('_').parse::<u64>().ok();
            return PlatformError::FloodWait {
                seconds: seconds.or(parsed),
            };
        }

        if code == 420 {
            return PlatformError::FloodWait { seconds };
        }

        PlatformError::Rpc {
            code,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_second_factor() {
        assert_eq!(
            PlatformError::from_rpc(401, "SESSION_PASSWORD_NEEDED", None),
            PlatformError::PasswordRequired
        );
    }

    #[test]
    fn classifies_flood_wait_with_and_without_duration() {
        assert_eq!(
            PlatformError::from_rpc(420, "FLOOD_WAIT_12", None),
            PlatformError::FloodWait { seconds: Some(12) }
        );
        assert_eq!(
            PlatformError::from_rpc(420, "FLOOD_WAIT", None),
            PlatformError::FloodWait { seconds: None }
        );
        assert_eq!(
            PlatformError::from_rpc(420, "FLOOD_PREMIUM_WAIT_3", Some(3)),
            PlatformError::FloodWait { seconds: Some(3) }
        );
    }

    #[test]
    fn other_errors_keep_their_message() {
        let err = PlatformError::from_rpc(400, "HIDE_REQUESTER_MISSING", None);
        assert_eq!(err.to_string(), "HIDE_REQUESTER_MISSING");
    }

    #[test]
    fn flood_wait_display_includes_duration() {
        let err = PlatformError::FloodWait { seconds: Some(7) };
        assert_eq!(err.to_string(), "Rate limited by the platform (wait 7s)");
    }
}
