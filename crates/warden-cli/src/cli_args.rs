use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;

use warden_discord::rest::DEFAULT_API_BASE;
use warden_runtime::RuntimeConfig;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(name = "warden", about = "Discord community moderation bot", version)]
pub struct Cli {
    #[arg(long, env = "WARDEN_BOT_TOKEN", help = "Discord bot token")]
    pub bot_token: String,

    #[arg(long, env = "WARDEN_APPLICATION_ID", help = "Discord application id")]
    pub application_id: String,

    #[arg(long, env = "WARDEN_GUILD_ID", help = "Guild the bot operates in")]
    pub guild_id: String,

    #[arg(
        long,
        env = "WARDEN_API_BASE",
        default_value = DEFAULT_API_BASE,
        help = "Discord REST API base URL"
    )]
    pub api_base: String,

    #[arg(
        long,
        env = "WARDEN_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Per-request REST timeout in milliseconds"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long,
        env = "WARDEN_COMMUNITY_NAME",
        default_value = "Community",
        help = "Community display name used across embeds"
    )]
    pub community_name: String,

    #[arg(
        long = "staff-role-id",
        env = "WARDEN_STAFF_ROLE_IDS",
        value_delimiter = ',',
        required = true,
        help = "Role ids allowed to use staff controls (repeat or comma separate)"
    )]
    pub staff_role_ids: Vec<String>,

    #[arg(
        long,
        env = "WARDEN_ANNOUNCEMENT_CHANNEL_ID",
        help = "Channel for status announcements"
    )]
    pub announcement_channel_id: String,

    #[arg(long, env = "WARDEN_LOG_CHANNEL_ID", help = "Audit log channel")]
    pub log_channel_id: String,

    #[arg(
        long,
        env = "WARDEN_TICKET_LOG_CHANNEL_ID",
        help = "Channel receiving ticket lifecycle logs"
    )]
    pub ticket_log_channel_id: String,

    #[arg(
        long,
        env = "WARDEN_STATUS_CHANNEL_ID",
        help = "Indicator channel renamed to reflect the community status"
    )]
    pub status_channel_id: String,

    #[arg(
        long,
        env = "WARDEN_MEMBER_COUNT_CHANNEL_ID",
        help = "Indicator channel renamed to show the member count"
    )]
    pub member_count_channel_id: String,

    #[arg(
        long,
        env = "WARDEN_TICKET_PARENT_ID",
        default_value = "",
        help = "Default parent category for new ticket channels (empty for none)"
    )]
    pub ticket_parent_id: String,

    #[arg(
        long = "category-parent",
        env = "WARDEN_CATEGORY_PARENTS",
        value_delimiter = ',',
        help = "Per-category parent override as category_key=channel_id (repeat or comma separate)"
    )]
    pub category_parents: Vec<String>,

    #[arg(
        long,
        env = "WARDEN_DATABASE_PATH",
        default_value = ".warden/warden.db",
        help = "SQLite path for the warning ledger"
    )]
    pub database_path: PathBuf,

    #[arg(
        long,
        env = "WARDEN_FORM_WAIT_SECS",
        default_value_t = 300,
        value_parser = parse_positive_u64,
        help = "How long to wait for a form submission before giving up"
    )]
    pub form_wait_secs: u64,

    #[arg(
        long,
        env = "WARDEN_CLOSE_GRACE_SECS",
        default_value_t = 5,
        help = "Delay between the closing notice and the channel deletion"
    )]
    pub close_grace_secs: u64,

    #[arg(
        long,
        env = "WARDEN_ANNOUNCEMENT_PURGE_LIMIT",
        default_value_t = 5,
        help = "How many recent announcements to purge before posting a new one"
    )]
    pub announcement_purge_limit: usize,

    #[arg(
        long,
        env = "WARDEN_STATUS_REFRESH_INITIAL_DELAY_SECS",
        default_value_t = 60,
        help = "Delay before the first status indicator refresh"
    )]
    pub status_refresh_initial_delay_secs: u64,

    #[arg(
        long,
        env = "WARDEN_STATUS_REFRESH_INTERVAL_SECS",
        default_value_t = 900,
        value_parser = parse_positive_u64,
        help = "Interval between status indicator refreshes"
    )]
    pub status_refresh_interval_secs: u64,

    #[arg(
        long,
        env = "WARDEN_PRESENCE_INTERVAL_SECS",
        default_value_t = 60,
        value_parser = parse_positive_u64,
        help = "Interval between presence activity rotations"
    )]
    pub presence_interval_secs: u64,

    #[arg(
        long,
        env = "WARDEN_RECONNECT_DELAY_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Delay before reconnecting after a gateway session ends"
    )]
    pub reconnect_delay_ms: u64,
}

impl Cli {
    pub fn into_runtime_config(self) -> Result<RuntimeConfig> {
        let mut category_parents = HashMap::new();
        for pair in &self.category_parents {
            let Some((key, channel_id)) = pair.split_once('=') else {
                bail!("invalid --category-parent value {pair:?}, expected category_key=channel_id");
            };
            let key = key.trim();
            let channel_id = channel_id.trim();
            if key.is_empty() || channel_id.is_empty() {
                bail!("invalid --category-parent value {pair:?}, expected category_key=channel_id");
            }
            category_parents.insert(key.to_string(), channel_id.to_string());
        }

        Ok(RuntimeConfig {
            bot_token: self.bot_token,
            application_id: self.application_id,
            guild_id: self.guild_id,
            api_base: self.api_base,
            request_timeout_ms: self.request_timeout_ms,
            community_name: self.community_name,
            staff_role_ids: self.staff_role_ids,
            announcement_channel_id: self.announcement_channel_id,
            log_channel_id: self.log_channel_id,
            ticket_log_channel_id: self.ticket_log_channel_id,
            status_channel_id: self.status_channel_id,
            member_count_channel_id: self.member_count_channel_id,
            ticket_parent_id: self.ticket_parent_id,
            category_parents,
            database_path: self.database_path,
            form_wait: Duration::from_secs(self.form_wait_secs),
            close_grace: Duration::from_secs(self.close_grace_secs),
            announcement_purge_limit: self.announcement_purge_limit,
            status_refresh_initial_delay: Duration::from_secs(
                self.status_refresh_initial_delay_secs,
            ),
            status_refresh_interval: Duration::from_secs(self.status_refresh_interval_secs),
            presence_interval: Duration::from_secs(self.presence_interval_secs),
            reconnect_delay_ms: self.reconnect_delay_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "warden",
            "--bot-token",
            "token",
            "--application-id",
            "APP",
            "--guild-id",
            "G1",
            "--staff-role-id",
            "R1,R2",
            "--announcement-channel-id",
            "ANN",
            "--log-channel-id",
            "LOG",
            "--ticket-log-channel-id",
            "TLOG",
            "--status-channel-id",
            "STATUS",
            "--member-count-channel-id",
            "MEMBERS",
        ]
    }

    #[test]
    fn minimal_args_produce_a_config_with_defaults() {
        let cli = Cli::try_parse_from(base_args()).expect("parse");
        let config = cli.into_runtime_config().expect("config");
        assert_eq!(config.staff_role_ids, vec!["R1", "R2"]);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.form_wait, Duration::from_secs(300));
        assert_eq!(config.close_grace, Duration::from_secs(5));
        assert_eq!(config.announcement_purge_limit, 5);
        assert!(config.category_parents.is_empty());
        assert_eq!(config.ticket_parent_for("appeals"), None);
    }

    #[test]
    fn category_parent_pairs_are_parsed_into_the_map() {
        let mut args = base_args();
        args.extend(["--category-parent", "appeals=C1,reports=C2"]);
        let cli = Cli::try_parse_from(args).expect("parse");
        let config = cli.into_runtime_config().expect("config");
        assert_eq!(config.category_parents.get("appeals").map(String::as_str), Some("C1"));
        assert_eq!(config.category_parents.get("reports").map(String::as_str), Some("C2"));
    }

    #[test]
    fn malformed_category_parent_pairs_are_rejected() {
        let mut args = base_args();
        args.extend(["--category-parent", "appeals"]);
        let cli = Cli::try_parse_from(args).expect("parse");
        assert!(cli.into_runtime_config().is_err());
    }

    #[test]
    fn zero_form_wait_is_rejected_at_parse_time() {
        let mut args = base_args();
        args.extend(["--form-wait-secs", "0"]);
        assert!(Cli::try_parse_from(args).is_err());
    }
}
