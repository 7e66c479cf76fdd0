//! Slash commands: panel, tickets, warn, warning-history.
//!
//! All four are staff-only. The warn flow degrades in stages: the public
//! announcement always goes out first, then the DM, then the log mirror,
//! and the ledger write last; a failure in a later stage is reported to the
//! moderator without undoing the earlier ones.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use warden_discord::rest::DiscordApiClient;
use warden_discord::types::{Component, CreateMessage, Interaction};
use warden_ledger::{NewWarning, WarningStore};

use crate::actions::is_staff;
use crate::categories::CategoryRegistry;
use crate::render;
use crate::replies::{self, NO_PERMISSION_NOTICE};
use crate::runtime::RuntimeConfig;

pub const COMMAND_PANEL: &str = "panel";
pub const COMMAND_TICKETS: &str = "tickets";
pub const COMMAND_WARN: &str = "warn";
pub const COMMAND_WARNING_HISTORY: &str = "warning-history";

const OPTION_STRING: u8 = 3;
const OPTION_USER: u8 = 6;

/// Guild command definitions, registered idempotently at startup.
pub fn guild_commands_payload() -> Value {
    json!([
        {
            "name": COMMAND_PANEL,
            "description": "Post the server control panel",
        },
        {
            "name": COMMAND_TICKETS,
            "description": "Post the ticket category menu",
        },
        {
            "name": COMMAND_WARN,
            "description": "Issue a warning to a member",
            "options": [
                {"type": OPTION_USER, "name": "user", "description": "Member to warn", "required": true},
                {"type": OPTION_STRING, "name": "reason", "description": "Reason for the warning", "required": true},
                {"type": OPTION_STRING, "name": "proof", "description": "Proof link", "required": false},
            ],
        },
        {
            "name": COMMAND_WARNING_HISTORY,
            "description": "Show a member's warning history",
            "options": [
                {"type": OPTION_USER, "name": "user", "description": "Member to look up", "required": true},
            ],
        },
    ])
}

pub struct CommandEngine {
    api: DiscordApiClient,
    config: Arc<RuntimeConfig>,
    ledger: Arc<WarningStore>,
}

impl CommandEngine {
    pub fn new(
        api: DiscordApiClient,
        config: Arc<RuntimeConfig>,
        ledger: Arc<WarningStore>,
    ) -> Self {
        Self {
            api,
            config,
            ledger,
        }
    }

    async fn deny_non_staff(&self, interaction: &Interaction) -> Result<bool> {
        if is_staff(interaction.member.as_ref(), &self.config.staff_role_ids) {
            return Ok(false);
        }
        replies::respond_ephemeral_text(
            &self.api,
            &interaction.id,
            &interaction.token,
            NO_PERMISSION_NOTICE,
        )
        .await
        .context("command permission notice")?;
        Ok(true)
    }

    pub async fn handle_panel(&self, interaction: &Interaction) -> Result<()> {
        if self.deny_non_staff(interaction).await? {
            return Ok(());
        }
        replies::respond_message(
            &self.api,
            &interaction.id,
            &interaction.token,
            None,
            vec![render::control_panel_embed(&self.config.community_name)],
            vec![render::control_panel_row()],
            false,
        )
        .await
        .context("post control panel")
    }

    pub async fn handle_tickets_menu(
        &self,
        interaction: &Interaction,
        registry: &CategoryRegistry,
    ) -> Result<()> {
        if self.deny_non_staff(interaction).await? {
            return Ok(());
        }
        replies::respond_message(
            &self.api,
            &interaction.id,
            &interaction.token,
            None,
            vec![render::ticket_menu_embed(registry, &self.config.community_name)],
            vec![Component::action_row(vec![render::category_select_row(
                registry,
            )])],
            false,
        )
        .await
        .context("post ticket menu")
    }

    pub async fn handle_warn(&self, interaction: &Interaction) -> Result<()> {
        if self.deny_non_staff(interaction).await? {
            return Ok(());
        }
        let data = interaction
            .data
            .as_ref()
            .ok_or_else(|| anyhow!("warn command without data"))?;
        let user_id = data
            .option_str("user")
            .ok_or_else(|| anyhow!("warn command without a user option"))?
            .to_owned();
        let reason = data
            .option_str("reason")
            .ok_or_else(|| anyhow!("warn command without a reason option"))?
            .to_owned();
        let proof = data.option_str("proof").map(ToOwned::to_owned);
        let admin = interaction
            .actor()
            .cloned()
            .ok_or_else(|| anyhow!("warn command without an actor"))?;

        let target = match self
            .api
            .get_guild_member(&self.config.guild_id, &user_id)
            .await
            .ok()
            .and_then(|member| member.user)
        {
            Some(user) => user,
            None => {
                return replies::respond_ephemeral_text(
                    &self.api,
                    &interaction.id,
                    &interaction.token,
                    "🚫 Could not find that member in this server.",
                )
                .await
                .context("warn unknown member notice");
            }
        };

        // Stage 1: public announcement. Everything after this is soft.
        replies::respond_message(
            &self.api,
            &interaction.id,
            &interaction.token,
            Some(&format!("✅ Warning issued to {}", target.mention())),
            vec![render::warning_issued(
                &target.mention(),
                admin.display_name(),
                &reason,
                proof.as_deref(),
                None,
            )],
            vec![],
            false,
        )
        .await
        .context("announce warning")?;

        // Stage 2: DM, best effort. Closed DMs are routine.
        let dm_result = self.send_warning_dm(&target.id, &reason, admin.display_name(), proof.as_deref()).await;
        if let Err(dm_error) = dm_result {
            warn!(error = %dm_error, user = %target.id, "warning DM failed");
            let _ = replies::followup_ephemeral_text(
                &self.api,
                &self.config.application_id,
                &interaction.token,
                "⚠️ I could not DM the user; the warning stands regardless.",
            )
            .await;
        }

        // Stage 3: the audit mirror. Posted before the write so a ledger
        // failure cannot suppress the log entry.
        self.api
            .create_message(
                &self.config.log_channel_id,
                &CreateMessage {
                    embeds: vec![render::warning_issued(
                        &target.mention(),
                        admin.display_name(),
                        &reason,
                        proof.as_deref(),
                        None,
                    )],
                    ..CreateMessage::default()
                },
            )
            .await
            .context("mirror warning to the log channel")?;

        // Stage 4: ledger write, soft failure.
        match self.ledger.issue(NewWarning {
            user_id: target.id.clone(),
            user_name: target.display_name().to_owned(),
            admin_id: admin.id.clone(),
            admin_name: admin.display_name().to_owned(),
            reason: reason.clone(),
            proof_url: proof.clone(),
        }) {
            Ok(record) => {
                info!(user = %target.id, record = record.id, "warning issued");
            }
            Err(ledger_error) => {
                error!(error = %ledger_error, user = %target.id, "warning ledger write failed");
                let _ = replies::followup_ephemeral_text(
                    &self.api,
                    &self.config.application_id,
                    &interaction.token,
                    "⚠️ The warning was announced but could not be saved to the ledger.",
                )
                .await;
            }
        }
        Ok(())
    }

    async fn send_warning_dm(
        &self,
        user_id: &str,
        reason: &str,
        admin_name: &str,
        proof: Option<&str>,
    ) -> Result<()> {
        let dm = self
            .api
            .create_dm_channel(user_id)
            .await
            .context("open DM channel")?;
        self.api
            .create_message(
                &dm.id,
                &CreateMessage {
                    embeds: vec![render::warning_dm(
                        &self.config.community_name,
                        reason,
                        admin_name,
                        proof,
                    )],
                    ..CreateMessage::default()
                },
            )
            .await
            .context("send warning DM")?;
        Ok(())
    }

    pub async fn handle_warning_history(&self, interaction: &Interaction) -> Result<()> {
        if self.deny_non_staff(interaction).await? {
            return Ok(());
        }
        let user_id = interaction
            .data
            .as_ref()
            .and_then(|data| data.option_str("user"))
            .ok_or_else(|| anyhow!("warning-history command without a user option"))?
            .to_owned();

        let records = self
            .ledger
            .history(&user_id)
            .context("read warning history")?;
        if records.is_empty() {
            return replies::respond_ephemeral_text(
                &self.api,
                &interaction.id,
                &interaction.token,
                "📭 No warnings on record for that user.",
            )
            .await
            .context("empty history notice");
        }

        let display_name = self
            .api
            .get_guild_member(&self.config.guild_id, &user_id)
            .await
            .ok()
            .and_then(|member| member.user)
            .map(|user| user.display_name().to_owned())
            .unwrap_or_else(|| records[0].user_name.clone());

        replies::respond_message(
            &self.api,
            &interaction.id,
            &interaction.token,
            None,
            vec![render::warning_history(&display_name, &records)],
            vec![],
            false,
        )
        .await
        .context("post warning history")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{test_api_client, test_config};
    use httpmock::prelude::*;

    fn test_engine(base_url: &str, tempdir: &tempfile::TempDir) -> CommandEngine {
        let store =
            WarningStore::open(tempdir.path().join("warden.db")).expect("store");
        CommandEngine::new(
            test_api_client(base_url),
            Arc::new(test_config(base_url)),
            Arc::new(store),
        )
    }

    fn warn_interaction() -> Interaction {
        serde_json::from_value(serde_json::json!({
            "id": "I1",
            "token": "tok",
            "type": 2,
            "guild_id": "G1",
            "member": {
                "roles": ["STAFF"],
                "user": {"id": "A1", "username": "mod", "global_name": "Moderator"}
            },
            "data": {
                "name": COMMAND_WARN,
                "options": [
                    {"name": "user", "value": "U42"},
                    {"name": "reason", "value": "spamming"},
                ]
            }
        }))
        .expect("interaction")
    }

    #[test]
    fn command_payload_defines_all_four_commands() {
        let payload = guild_commands_payload();
        let commands = payload.as_array().expect("array");
        assert_eq!(commands.len(), 4);
        let names: Vec<&str> = commands
            .iter()
            .filter_map(|command| command["name"].as_str())
            .collect();
        assert_eq!(
            names,
            vec![COMMAND_PANEL, COMMAND_TICKETS, COMMAND_WARN, COMMAND_WARNING_HISTORY]
        );
        let warn = &commands[2];
        assert_eq!(warn["options"][0]["required"], serde_json::json!(true));
        assert_eq!(warn["options"][2]["required"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn warn_announces_dms_and_persists() {
        let server = MockServer::start_async().await;
        let tempdir = tempfile::tempdir().expect("tempdir");
        server
            .mock_async(|when, then| {
                when.method(GET).path("/guilds/G1/members/U42");
                then.status(200).json_body(serde_json::json!({
                    "roles": [],
                    "user": {"id": "U42", "username": "target"}
                }));
            })
            .await;
        let respond = server
            .mock_async(|when, then| {
                when.method(POST).path("/interactions/I1/tok/callback");
                then.status(204);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/users/@me/channels");
                then.status(200).json_body(serde_json::json!({"id": "DM1"}));
            })
            .await;
        let dm = server
            .mock_async(|when, then| {
                when.method(POST).path("/channels/DM1/messages");
                then.status(200).json_body(serde_json::json!({"id": "M1"}));
            })
            .await;
        let log = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/channels/LOG/messages")
                    .body_includes("spamming");
                then.status(200).json_body(serde_json::json!({"id": "M2"}));
            })
            .await;

        let engine = test_engine(&server.base_url(), &tempdir);
        engine
            .handle_warn(&warn_interaction())
            .await
            .expect("warn");

        respond.assert_async().await;
        dm.assert_async().await;
        log.assert_async().await;
        let history = engine.ledger.history("U42").expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, "spamming");
        assert_eq!(history[0].admin_name, "Moderator");
    }

    #[tokio::test]
    async fn warn_survives_a_closed_dm() {
        let server = MockServer::start_async().await;
        let tempdir = tempfile::tempdir().expect("tempdir");
        server
            .mock_async(|when, then| {
                when.method(GET).path("/guilds/G1/members/U42");
                then.status(200).json_body(serde_json::json!({
                    "roles": [],
                    "user": {"id": "U42", "username": "target"}
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/interactions/I1/tok/callback");
                then.status(204);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/users/@me/channels");
                then.status(403)
                    .json_body(serde_json::json!({"message": "Cannot send messages to this user"}));
            })
            .await;
        let degradation_notice = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/webhooks/APP/tok")
                    .body_includes("could not DM");
                then.status(200).json_body(serde_json::json!({"id": "F1"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/channels/LOG/messages");
                then.status(200).json_body(serde_json::json!({"id": "M2"}));
            })
            .await;

        let engine = test_engine(&server.base_url(), &tempdir);
        engine
            .handle_warn(&warn_interaction())
            .await
            .expect("warn");

        degradation_notice.assert_async().await;
        assert_eq!(engine.ledger.history("U42").expect("history").len(), 1);
    }

    #[tokio::test]
    async fn warn_log_card_outlives_a_ledger_failure() {
        let server = MockServer::start_async().await;
        let tempdir = tempfile::tempdir().expect("tempdir");
        server
            .mock_async(|when, then| {
                when.method(GET).path("/guilds/G1/members/U42");
                then.status(200).json_body(serde_json::json!({
                    "roles": [],
                    "user": {"id": "U42", "username": "target"}
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/interactions/I1/tok/callback");
                then.status(204);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/users/@me/channels");
                then.status(200).json_body(serde_json::json!({"id": "DM1"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/channels/DM1/messages");
                then.status(200).json_body(serde_json::json!({"id": "M1"}));
            })
            .await;
        let log = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/channels/LOG/messages")
                    .body_includes("spamming");
                then.status(200).json_body(serde_json::json!({"id": "M2"}));
            })
            .await;
        let degradation_notice = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/webhooks/APP/tok")
                    .body_includes("could not be saved");
                then.status(200).json_body(serde_json::json!({"id": "F1"}));
            })
            .await;

        let engine = test_engine(&server.base_url(), &tempdir);
        // Breaking the database directory makes the WAL write fail while the
        // open connection stays usable enough to report the error.
        std::fs::remove_dir_all(tempdir.path()).expect("break db dir");
        engine
            .handle_warn(&warn_interaction())
            .await
            .expect("warn");

        log.assert_async().await;
        degradation_notice.assert_async().await;
    }

    #[tokio::test]
    async fn history_for_a_clean_user_is_an_ephemeral_notice() {
        let server = MockServer::start_async().await;
        let tempdir = tempfile::tempdir().expect("tempdir");
        let respond = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/interactions/I2/tok/callback")
                    .body_includes("No warnings");
                then.status(204);
            })
            .await;

        let engine = test_engine(&server.base_url(), &tempdir);
        let interaction: Interaction = serde_json::from_value(serde_json::json!({
            "id": "I2",
            "token": "tok",
            "type": 2,
            "member": {"roles": ["STAFF"], "user": {"id": "A1", "username": "mod"}},
            "data": {
                "name": COMMAND_WARNING_HISTORY,
                "options": [{"name": "user", "value": "U99"}]
            }
        }))
        .expect("interaction");
        engine
            .handle_warning_history(&interaction)
            .await
            .expect("history");
        respond.assert_async().await;
    }
}
