//! Typed Discord REST client used by the runtime engines.
//!
//! One method per endpoint, serde structs per response. Calls are made
//! exactly once: recovery is the caller's concern, and rate limits are
//! surfaced as a distinct error variant so callers can log and skip.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use warden_core::truncate_for_error;

use crate::types::{
    Channel, CreateGuildChannel, CreateMessage, EditMessage, Guild, GuildMember, Message,
    PermissionOverwrite,
};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Error)]
pub enum RestError {
    #[error("discord {operation} was rate limited (retry after {retry_after_secs:.2}s)")]
    RateLimited {
        operation: String,
        retry_after_secs: f64,
    },
    #[error("discord {operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("discord {operation} request failed")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode discord {operation} response")]
    Decode {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build discord api client")]
    Build(#[source] reqwest::Error),
}

impl RestError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

pub type RestResult<T> = Result<T, RestError>;

#[derive(Debug, Clone, Deserialize)]
struct GatewayBotResponse {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    retry_after: Option<f64>,
}

#[derive(Clone)]
pub struct DiscordApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl DiscordApiClient {
    pub fn new(api_base: &str, bot_token: &str, request_timeout_ms: u64) -> RestResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("Warden (https://github.com, 0.1)"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .map_err(RestError::Build)?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.trim().to_string(),
        })
    }

    pub async fn get_gateway_url(&self) -> RestResult<String> {
        let response: GatewayBotResponse = self
            .request_json("gateway.bot", |http, base| {
                http.get(format!("{base}/gateway/bot"))
            })
            .await?;
        Ok(response.url)
    }

    pub async fn create_message(
        &self,
        channel_id: &str,
        message: &CreateMessage,
    ) -> RestResult<Message> {
        self.request_json("message.create", |http, base| {
            http.post(format!("{base}/channels/{channel_id}/messages"))
                .json(message)
        })
        .await
    }

    pub async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        edit: &EditMessage,
    ) -> RestResult<Message> {
        self.request_json("message.edit", |http, base| {
            http.patch(format!(
                "{base}/channels/{channel_id}/messages/{message_id}"
            ))
            .json(edit)
        })
        .await
    }

    pub async fn delete_message(&self, channel_id: &str, message_id: &str) -> RestResult<()> {
        self.request_empty("message.delete", |http, base| {
            http.delete(format!(
                "{base}/channels/{channel_id}/messages/{message_id}"
            ))
        })
        .await
    }

    pub async fn list_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> RestResult<Vec<Message>> {
        self.request_json("message.list", |http, base| {
            http.get(format!(
                "{base}/channels/{channel_id}/messages?limit={limit}"
            ))
        })
        .await
    }

    /// Deletes up to `limit` of the channel's most recent messages. Uses the
    /// bulk endpoint when two or more messages qualify, single deletes
    /// otherwise. Returns the number of messages removed.
    pub async fn purge_recent(&self, channel_id: &str, limit: usize) -> RestResult<usize> {
        let messages = self.list_recent_messages(channel_id, limit).await?;
        let ids = messages
            .iter()
            .map(|message| message.id.clone())
            .collect::<Vec<_>>();
        match ids.len() {
            0 => Ok(0),
            1 => {
                self.delete_message(channel_id, &ids[0]).await?;
                Ok(1)
            }
            _ => {
                self.request_empty("message.bulk-delete", |http, base| {
                    http.post(format!(
                        "{base}/channels/{channel_id}/messages/bulk-delete"
                    ))
                    .json(&json!({ "messages": ids }))
                })
                .await?;
                Ok(ids.len())
            }
        }
    }

    pub async fn pin_message(&self, channel_id: &str, message_id: &str) -> RestResult<()> {
        self.request_empty("message.pin", |http, base| {
            http.put(format!("{base}/channels/{channel_id}/pins/{message_id}"))
        })
        .await
    }

    pub async fn create_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> RestResult<()> {
        let encoded = percent_encode(emoji);
        self.request_empty("reaction.create", |http, base| {
            http.put(format!(
                "{base}/channels/{channel_id}/messages/{message_id}/reactions/{encoded}/@me"
            ))
        })
        .await
    }

    pub async fn create_guild_channel(
        &self,
        guild_id: &str,
        channel: &CreateGuildChannel,
    ) -> RestResult<Channel> {
        self.request_json("channel.create", |http, base| {
            http.post(format!("{base}/guilds/{guild_id}/channels"))
                .json(channel)
        })
        .await
    }

    pub async fn get_channel(&self, channel_id: &str) -> RestResult<Channel> {
        self.request_json("channel.get", |http, base| {
            http.get(format!("{base}/channels/{channel_id}"))
        })
        .await
    }

    pub async fn rename_channel(&self, channel_id: &str, name: &str) -> RestResult<Channel> {
        self.request_json("channel.rename", |http, base| {
            http.patch(format!("{base}/channels/{channel_id}"))
                .json(&json!({ "name": name }))
        })
        .await
    }

    pub async fn delete_channel(&self, channel_id: &str) -> RestResult<()> {
        self.request_empty("channel.delete", |http, base| {
            http.delete(format!("{base}/channels/{channel_id}"))
        })
        .await
    }

    pub async fn edit_channel_permissions(
        &self,
        channel_id: &str,
        overwrite: &PermissionOverwrite,
    ) -> RestResult<()> {
        let overwrite_id = overwrite.id.clone();
        self.request_empty("channel.permissions", |http, base| {
            http.put(format!(
                "{base}/channels/{channel_id}/permissions/{overwrite_id}"
            ))
            .json(&json!({
                "type": overwrite.kind,
                "allow": overwrite.allow,
                "deny": overwrite.deny,
            }))
        })
        .await
    }

    pub async fn list_guild_channels(&self, guild_id: &str) -> RestResult<Vec<Channel>> {
        self.request_json("guild.channels", |http, base| {
            http.get(format!("{base}/guilds/{guild_id}/channels"))
        })
        .await
    }

    pub async fn get_guild_with_counts(&self, guild_id: &str) -> RestResult<Guild> {
        self.request_json("guild.get", |http, base| {
            http.get(format!("{base}/guilds/{guild_id}?with_counts=true"))
        })
        .await
    }

    pub async fn get_guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> RestResult<GuildMember> {
        self.request_json("guild.member", |http, base| {
            http.get(format!("{base}/guilds/{guild_id}/members/{user_id}"))
        })
        .await
    }

    /// Pages through the guild member list. Discord caps a page at 1000
    /// entries; paging stops on the first short page.
    pub async fn list_all_guild_members(&self, guild_id: &str) -> RestResult<Vec<GuildMember>> {
        const PAGE_LIMIT: usize = 1_000;
        let mut members = Vec::new();
        let mut after = String::new();
        loop {
            let after_query = after.clone();
            let page: Vec<GuildMember> = self
                .request_json("guild.members", |http, base| {
                    let mut url = format!("{base}/guilds/{guild_id}/members?limit={PAGE_LIMIT}");
                    if !after_query.is_empty() {
                        url.push_str(&format!("&after={after_query}"));
                    }
                    http.get(url)
                })
                .await?;
            let page_len = page.len();
            if let Some(last_id) = page
                .iter()
                .rev()
                .find_map(|member| member.user.as_ref().map(|user| user.id.clone()))
            {
                after = last_id;
            }
            members.extend(page);
            if page_len < PAGE_LIMIT {
                return Ok(members);
            }
        }
    }

    pub async fn create_dm_channel(&self, recipient_id: &str) -> RestResult<Channel> {
        self.request_json("dm.open", |http, base| {
            http.post(format!("{base}/users/@me/channels"))
                .json(&json!({ "recipient_id": recipient_id }))
        })
        .await
    }

    pub async fn create_interaction_response(
        &self,
        interaction_id: &str,
        token: &str,
        response: &Value,
    ) -> RestResult<()> {
        self.request_empty("interaction.respond", |http, base| {
            http.post(format!(
                "{base}/interactions/{interaction_id}/{token}/callback"
            ))
            .json(response)
        })
        .await
    }

    /// Posts a follow-up message on an interaction token. Works after the
    /// initial response or a deferral.
    pub async fn create_followup_message(
        &self,
        application_id: &str,
        token: &str,
        payload: &Value,
    ) -> RestResult<Message> {
        self.request_json("interaction.followup", |http, base| {
            http.post(format!("{base}/webhooks/{application_id}/{token}"))
                .json(payload)
        })
        .await
    }

    pub async fn register_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &Value,
    ) -> RestResult<()> {
        let response: Value = self
            .request_json("commands.register", |http, base| {
                http.put(format!(
                    "{base}/applications/{application_id}/guilds/{guild_id}/commands"
                ))
                .json(commands)
            })
            .await?;
        let _ = response;
        Ok(())
    }

    async fn request_json<T, F>(&self, operation: &str, builder: F) -> RestResult<T>
    where
        T: DeserializeOwned,
        F: FnOnce(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    {
        let response = self
            .execute(operation, builder)
            .await?;
        response.json::<T>().await.map_err(|source| RestError::Decode {
            operation: operation.to_string(),
            source,
        })
    }

    async fn request_empty<F>(&self, operation: &str, builder: F) -> RestResult<()>
    where
        F: FnOnce(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    {
        self.execute(operation, builder).await.map(|_| ())
    }

    async fn execute<F>(&self, operation: &str, builder: F) -> RestResult<reqwest::Response>
    where
        F: FnOnce(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    {
        let response = builder(&self.http, &self.api_base)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.bot_token),
            )
            .send()
            .await
            .map_err(|source| RestError::Transport {
                operation: operation.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<f64>().ok());
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            let retry_after_secs = serde_json::from_str::<RateLimitBody>(&body)
                .ok()
                .and_then(|parsed| parsed.retry_after)
                .or(retry_after_header)
                .unwrap_or(60.0);
            return Err(RestError::RateLimited {
                operation: operation.to_string(),
                retry_after_secs,
            });
        }

        Err(RestError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            body: truncate_for_error(&body, 800),
        })
    }
}

/// Percent-encodes a path component (reaction emojis are the only caller).
fn percent_encode(raw: &str) -> String {
    let mut encoded = String::new();
    for byte in raw.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(*byte as char);
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn test_client(base_url: &str) -> DiscordApiClient {
        DiscordApiClient::new(base_url, "bot-token", 3_000).expect("client")
    }

    #[test]
    fn percent_encode_handles_emoji_and_ascii() {
        assert_eq!(percent_encode("abc-1._~"), "abc-1._~");
        assert_eq!(percent_encode("👍"), "%F0%9F%91%8D");
    }

    #[tokio::test]
    async fn create_message_decodes_posted_message() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/channels/C1/messages")
                    .header("authorization", "Bot bot-token");
                then.status(200)
                    .json_body(serde_json::json!({"id": "M1", "channel_id": "C1"}));
            })
            .await;

        let client = test_client(&server.base_url());
        let message = client
            .create_message(
                "C1",
                &CreateMessage {
                    content: Some("hello".to_string()),
                    ..CreateMessage::default()
                },
            )
            .await
            .expect("create message");
        mock.assert_async().await;
        assert_eq!(message.id, "M1");
    }

    #[tokio::test]
    async fn rate_limit_responses_map_to_the_rate_limited_variant() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PATCH).path("/channels/C9");
                then.status(429)
                    .json_body(serde_json::json!({"message": "You are being rate limited.", "retry_after": 12.5}));
            })
            .await;

        let client = test_client(&server.base_url());
        let error = client
            .rename_channel("C9", "new-name")
            .await
            .expect_err("rate limited");
        assert!(error.is_rate_limited());
        match error {
            RestError::RateLimited {
                retry_after_secs, ..
            } => assert!((retry_after_secs - 12.5).abs() < f64::EPSILON),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn non_success_statuses_surface_operation_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/channels/C2");
                then.status(403)
                    .json_body(serde_json::json!({"message": "Missing Permissions"}));
            })
            .await;

        let client = test_client(&server.base_url());
        let error = client.delete_channel("C2").await.expect_err("forbidden");
        match error {
            RestError::Status { status, body, .. } => {
                assert_eq!(status, 403);
                assert!(body.contains("Missing Permissions"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn purge_recent_uses_bulk_delete_for_multiple_messages() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/channels/C3/messages");
                then.status(200).json_body(serde_json::json!([
                    {"id": "M1"}, {"id": "M2"}, {"id": "M3"}
                ]));
            })
            .await;
        let bulk = server
            .mock_async(|when, then| {
                when.method(POST).path("/channels/C3/messages/bulk-delete");
                then.status(204);
            })
            .await;

        let client = test_client(&server.base_url());
        let removed = client.purge_recent("C3", 5).await.expect("purge");
        bulk.assert_async().await;
        assert_eq!(removed, 3);
    }

    #[tokio::test]
    async fn purge_recent_deletes_a_single_message_directly() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/channels/C4/messages");
                then.status(200).json_body(serde_json::json!([{"id": "M9"}]));
            })
            .await;
        let single = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/channels/C4/messages/M9");
                then.status(204);
            })
            .await;

        let client = test_client(&server.base_url());
        let removed = client.purge_recent("C4", 5).await.expect("purge");
        single.assert_async().await;
        assert_eq!(removed, 1);
    }
}
