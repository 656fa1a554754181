//! Process configuration
//!
//! Flags with environment fallbacks. Every required setting can come from
//! the environment so the binary runs unchanged under a service manager.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use joinwarden_connector_bridge::BridgeConfig;
use joinwarden_protocol::UserId;

use crate::approval::ApprovalConfig;

/// joinwarden: sign in as a channel admin and auto-approve join requests
#[derive(Parser, Debug, Clone)]
#[command(name = "joinwarden")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Bot API token for the command bot
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,

    /// Platform application id
    #[arg(long, env = "API_ID")]
    pub api_id: i32,

    /// Platform application hash
    #[arg(long, env = "API_HASH", hide_env_values = true)]
    pub api_hash: String,

    /// The only identity allowed to drive the bot
    #[arg(long, env = "ADMIN_ID", value_parser = clap::value_parser!(i64).range(1..))]
    pub admin_id: i64,

    /// Platform bridge executable
    #[arg(long, env = "JOINWARDEN_BRIDGE_CMD", default_value = "joinwarden-bridge")]
    pub bridge_cmd: String,

    /// Extra argument for the bridge executable (repeatable)
    #[arg(long = "bridge-arg", allow_hyphen_values = true)]
    pub bridge_args: Vec<String>,

    /// Seconds to wait for a bridge response
    #[arg(long, default_value_t = 30)]
    pub bridge_timeout_secs: u64,

    /// Data directory for logs (default: ~/.joinwarden)
    #[arg(long, env = "JOINWARDEN_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Pending requests fetched per page
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub page_size: u32,

    /// Delay between backlog approvals, in milliseconds
    #[arg(long, default_value_t = 200)]
    pub pacing_ms: u64,

    /// Flood wait used when the platform gives no duration, in seconds
    #[arg(long, default_value_t = 5)]
    pub flood_wait_default_secs: u64,

    /// Send a progress notice every N backlog approvals (0 disables)
    #[arg(long, default_value_t = 50)]
    pub progress_every: u64,
}

impl Config {
    pub fn admin(&self) -> UserId {
        UserId(self.admin_id)
    }

    pub fn approval_config(&self) -> ApprovalConfig {
        ApprovalConfig {
            page_size: self.page_size,
            pacing: Duration::from_millis(self.pacing_ms),
            default_flood_wait: Duration::from_secs(self.flood_wait_default_secs),
            progress_every: self.progress_every,
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::new(&self.bridge_cmd, self.api_id, &self.api_hash);
        config.args = self.bridge_args.clone();
        config.request_timeout = Duration::from_secs(self.bridge_timeout_secs);
        config
    }

    /// Priority: `--data-dir` / `JOINWARDEN_DATA_DIR` > `~/.joinwarden` >
    /// `./.joinwarden` when no home directory exists.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".joinwarden")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 9] = [
        "joinwarden",
        "--bot-token",
        "123:abc",
        "--api-id",
        "12345",
        "--api-hash",
        "0123456789abcdef",
        "--admin-id",
        "8469993808",
    ];

    #[test]
    fn defaults_match_the_approval_engine() {
        let config = Config::try_parse_from(REQUIRED).unwrap();
        let approval = config.approval_config();

        assert_eq!(config.admin(), UserId(8469993808));
        assert_eq!(approval.page_size, 100);
        assert_eq!(approval.pacing, Duration::from_millis(200));
        assert_eq!(approval.default_flood_wait, Duration::from_secs(5));
        assert_eq!(approval.progress_every, 50);
    }

    #[test]
    fn bridge_settings_are_forwarded() {
        let mut args = REQUIRED.to_vec();
        args.extend([
            "--bridge-cmd",
            "python3",
            "--bridge-arg",
            "bridge.py",
            "--bridge-arg",
            "--verbose",
            "--bridge-timeout-secs",
            "45",
        ]);
        let bridge = Config::try_parse_from(args).unwrap().bridge_config();

        assert_eq!(bridge.program, "python3");
        assert_eq!(bridge.args, vec!["bridge.py", "--verbose"]);
        assert_eq!(bridge.api_id, 12345);
        assert_eq!(bridge.api_hash, "0123456789abcdef");
        assert_eq!(bridge.request_timeout, Duration::from_secs(45));
    }

    #[test]
    fn explicit_data_dir_wins() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--data-dir", "/var/lib/joinwarden"]);
        let config = Config::try_parse_from(args).unwrap();
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/joinwarden"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut args = REQUIRED.to_vec();
        args[8] = "0";
        assert!(Config::try_parse_from(&args).is_err());

        let mut args = REQUIRED.to_vec();
        args.extend(["--page-size", "500"]);
        assert!(Config::try_parse_from(args).is_err());
    }

    #[test]
    fn missing_required_setting_is_an_error() {
        // env fallbacks could satisfy it, so only assert when unset
        if std::env::var_os("BOT_TOKEN").is_none() {
            let args: Vec<&str> = REQUIRED.iter().copied().skip(3).collect();
            let mut full = vec!["joinwarden"];
            full.extend(args);
            assert!(Config::try_parse_from(full).is_err());
        }
    }
}
