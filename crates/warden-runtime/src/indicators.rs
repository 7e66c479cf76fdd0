//! Auxiliary indicator channels: the status label and the member counter.
//!
//! Both updaters rename a voice-style indicator channel and nothing else.
//! Channel renames are heavily rate limited by Discord (2 per 10 minutes),
//! so a 429 is logged and skipped; the next cycle catches up.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use warden_discord::rest::{DiscordApiClient, RestError};

use crate::runtime::RuntimeConfig;
use crate::status::{CommunityStatus, StatusHolder};

/// Emoji rotation for the member counter, indexed by `count % 5` so the
/// decoration shifts as the community grows.
const MEMBER_COUNT_EMOJIS: [&str; 5] = ["🌎", "👥", "🚀", "💫", "🌟"];

pub fn member_count_label(count: u64) -> String {
    let emoji = MEMBER_COUNT_EMOJIS[(count % 5) as usize];
    format!("{emoji}│members-{count}")
}

/// Renames the status indicator channel to match `status`, skipping the
/// call entirely when the name is already correct.
pub async fn apply_status_label(
    api: &DiscordApiClient,
    config: &RuntimeConfig,
    status: CommunityStatus,
) -> Result<()> {
    let desired = status.indicator_name();
    apply_channel_name(api, &config.status_channel_id, desired, "status indicator").await
}

/// Renames the member counter channel from the guild's current approximate
/// member count.
pub async fn apply_member_count(api: &DiscordApiClient, config: &RuntimeConfig) -> Result<()> {
    let guild = match api.get_guild_with_counts(&config.guild_id).await {
        Ok(guild) => guild,
        Err(error) if error.is_rate_limited() => {
            warn!(error = %error, "member count lookup rate limited, skipping cycle");
            return Ok(());
        }
        Err(error) => return Err(error).context("fetch guild member count"),
    };
    let count = guild.approximate_member_count.unwrap_or(0);
    apply_channel_name(
        api,
        &config.member_count_channel_id,
        &member_count_label(count),
        "member counter",
    )
    .await
}

async fn apply_channel_name(
    api: &DiscordApiClient,
    channel_id: &str,
    desired: &str,
    what: &str,
) -> Result<()> {
    let channel = match api.get_channel(channel_id).await {
        Ok(channel) => channel,
        Err(error) if error.is_rate_limited() => {
            warn!(error = %error, what, "channel lookup rate limited, skipping cycle");
            return Ok(());
        }
        Err(error) => return Err(error).context(format!("fetch {what} channel")),
    };
    if channel.name.as_deref() == Some(desired) {
        debug!(what, name = desired, "indicator already up to date");
        return Ok(());
    }
    match api.rename_channel(channel_id, desired).await {
        Ok(_) => {
            info!(what, name = desired, "indicator channel renamed");
            Ok(())
        }
        Err(error @ RestError::RateLimited { .. }) => {
            warn!(error = %error, what, "rename rate limited, skipping cycle");
            Ok(())
        }
        Err(error) => Err(error).context(format!("rename {what} channel")),
    }
}

/// Owns the periodic status refresh and on-demand member count updates.
#[derive(Clone)]
pub struct IndicatorUpdater {
    api: DiscordApiClient,
    config: Arc<RuntimeConfig>,
    status: StatusHolder,
}

impl IndicatorUpdater {
    pub fn new(api: DiscordApiClient, config: Arc<RuntimeConfig>, status: StatusHolder) -> Self {
        Self {
            api,
            config,
            status,
        }
    }

    fn current_status(&self) -> CommunityStatus {
        self.status
            .lock()
            .map(|status| *status)
            .unwrap_or(CommunityStatus::Unknown)
    }

    pub async fn refresh_status_label(&self) {
        if let Err(error) =
            apply_status_label(&self.api, &self.config, self.current_status()).await
        {
            warn!(error = %error, "status indicator refresh failed");
        }
    }

    pub async fn refresh_member_count(&self) {
        if let Err(error) = apply_member_count(&self.api, &self.config).await {
            warn!(error = %error, "member counter refresh failed");
        }
    }

    /// Periodic status refresh. The first run is delayed so a restart storm
    /// does not immediately burn the channel rename budget.
    pub async fn run_status_loop(self, initial_delay: Duration, interval: Duration) {
        tokio::time::sleep(initial_delay).await;
        loop {
            self.refresh_status_label().await;
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::test_config;
    use crate::status::new_status_holder;
    use httpmock::prelude::*;

    #[test]
    fn member_count_label_cycles_emojis_by_count() {
        assert_eq!(member_count_label(0), "🌎│members-0");
        assert_eq!(member_count_label(1), "👥│members-1");
        assert_eq!(member_count_label(127), "🚀│members-127");
        assert_eq!(member_count_label(5), "🌎│members-5");
    }

    #[tokio::test]
    async fn status_refresh_skips_the_rename_when_the_name_matches() {
        let server = MockServer::start_async().await;
        let config = test_config(&server.base_url());
        server
            .mock_async(|when, then| {
                when.method(GET).path("/channels/STATUS");
                then.status(200)
                    .json_body(serde_json::json!({"id": "STATUS", "name": "🔴│server-closed"}));
            })
            .await;
        let rename = server
            .mock_async(|when, then| {
                when.method(PATCH).path("/channels/STATUS");
                then.status(200).json_body(serde_json::json!({"id": "STATUS"}));
            })
            .await;

        let api = crate::runtime::test_api_client(&server.base_url());
        apply_status_label(&api, &config, CommunityStatus::Closed)
            .await
            .expect("refresh");
        rename.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn status_refresh_renames_on_mismatch() {
        let server = MockServer::start_async().await;
        let config = test_config(&server.base_url());
        server
            .mock_async(|when, then| {
                when.method(GET).path("/channels/STATUS");
                then.status(200)
                    .json_body(serde_json::json!({"id": "STATUS", "name": "⚪│status-unknown"}));
            })
            .await;
        let rename = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/channels/STATUS")
                    .json_body(serde_json::json!({"name": "🟢│server-open"}));
                then.status(200).json_body(serde_json::json!({"id": "STATUS"}));
            })
            .await;

        let api = crate::runtime::test_api_client(&server.base_url());
        apply_status_label(&api, &config, CommunityStatus::Open)
            .await
            .expect("refresh");
        rename.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limited_rename_is_skipped_not_fatal() {
        let server = MockServer::start_async().await;
        let config = test_config(&server.base_url());
        server
            .mock_async(|when, then| {
                when.method(GET).path("/channels/STATUS");
                then.status(200)
                    .json_body(serde_json::json!({"id": "STATUS", "name": "⚪│status-unknown"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PATCH).path("/channels/STATUS");
                then.status(429)
                    .json_body(serde_json::json!({"retry_after": 300.0}));
            })
            .await;

        let api = crate::runtime::test_api_client(&server.base_url());
        apply_status_label(&api, &config, CommunityStatus::Voting)
            .await
            .expect("rate limit is not an error");
    }

    #[tokio::test]
    async fn member_count_refresh_uses_the_guild_count() {
        let server = MockServer::start_async().await;
        let config = test_config(&server.base_url());
        server
            .mock_async(|when, then| {
                when.method(GET).path("/guilds/G1");
                then.status(200).json_body(
                    serde_json::json!({"id": "G1", "approximate_member_count": 42}),
                );
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/channels/MEMBERS");
                then.status(200)
                    .json_body(serde_json::json!({"id": "MEMBERS", "name": "old"}));
            })
            .await;
        let rename = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/channels/MEMBERS")
                    .json_body(serde_json::json!({"name": "🚀│members-42"}));
                then.status(200).json_body(serde_json::json!({"id": "MEMBERS"}));
            })
            .await;

        let api = crate::runtime::test_api_client(&server.base_url());
        let updater = IndicatorUpdater::new(api, Arc::new(config), new_status_holder());
        updater.refresh_member_count().await;
        rename.assert_async().await;
    }
}
