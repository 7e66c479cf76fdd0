//! Ticket lifecycle engine: intake, provisioning, claim, close, add-user.
//!
//! The engine keeps an in-memory registry of channels it provisioned.
//! Channel state is intentionally not persisted; after a restart the claim
//! check falls back to the marker field on the pinned card.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info};

use warden_core::{current_unix_timestamp_ms, sanitize_channel_token, truncate_chars};
use warden_discord::forms::{FormBroker, FormSubmission};
use warden_discord::rest::DiscordApiClient;
use warden_discord::types::{
    Component, CreateGuildChannel, CreateMessage, EditMessage, Interaction, PermissionOverwrite,
    CHANNEL_KIND_GUILD_TEXT, PERMISSION_MANAGE_MESSAGES, PERMISSION_SEND_MESSAGES,
    PERMISSION_VIEW_CHANNEL,
};

use crate::actions::{is_staff, modal_custom_id};
use crate::categories::{CategoryRegistry, IntakeField, TicketCategory};
use crate::render::{self, CLAIM_FIELD_NAME};
use crate::replies::{self, NO_PERMISSION_NOTICE};
use crate::runtime::RuntimeConfig;

/// Discord's channel name length cap.
pub const CHANNEL_NAME_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimState {
    Unclaimed,
    ClaimedBy(String),
}

#[derive(Debug, Clone)]
struct TicketState {
    category_key: String,
    requester_id: String,
    claim: ClaimState,
}

pub struct TicketEngine {
    api: DiscordApiClient,
    config: Arc<RuntimeConfig>,
    broker: FormBroker,
    registry: CategoryRegistry,
    /// Channel id to ticket state. No awaits happen under this lock.
    tickets: Mutex<HashMap<String, TicketState>>,
    /// Per-category sequence counters, seeded lazily from the sibling
    /// channel count. The async lock serializes concurrent provisioning of
    /// the same category.
    sequences: AsyncMutex<HashMap<String, u64>>,
}

impl TicketEngine {
    pub fn new(api: DiscordApiClient, config: Arc<RuntimeConfig>, broker: FormBroker) -> Self {
        Self {
            api,
            config,
            broker,
            registry: CategoryRegistry::builtin(),
            tickets: Mutex::new(HashMap::new()),
            sequences: AsyncMutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// Category picked from the select menu: open the intake form, wait for
    /// it, then provision. The selection itself never creates anything.
    pub async fn handle_category_select(&self, interaction: &Interaction) -> Result<()> {
        let Some(selection) = interaction
            .data
            .as_ref()
            .and_then(|data| data.values.first())
            .cloned()
        else {
            debug!("category select without a value, ignoring");
            return Ok(());
        };
        let category = self.registry.get_or_fallback(&selection);

        let custom_id = modal_custom_id(
            &format!("ticket_intake:{}", category.key),
            current_unix_timestamp_ms(),
        );
        let wait = self.broker.open(&custom_id);
        let inputs = category
            .fields
            .iter()
            .enumerate()
            .map(|(index, field)| {
                Component::text_input(
                    &IntakeField::custom_id(index),
                    &field.label,
                    field.long,
                    field.required,
                    field.placeholder.as_deref(),
                )
            })
            .collect();
        replies::respond_modal(
            &self.api,
            &interaction.id,
            &interaction.token,
            &custom_id,
            &truncate_chars(&format!("{} {}", category.icon, category.title), 45),
            inputs,
        )
        .await
        .context("open intake form")?;

        let submission = match wait.wait(self.config.form_wait).await {
            Ok(submission) => submission,
            Err(_timeout) => {
                debug!(category = %category.key, "intake form expired");
                return replies::followup_ephemeral_text(
                    &self.api,
                    &self.config.application_id,
                    &interaction.token,
                    "⌛ The form timed out. Please pick the category again.",
                )
                .await
                .context("intake timeout notice");
            }
        };

        if let Err(error) = self.provision(&category, &submission).await {
            error!(error = %error, category = %category.key, "ticket provisioning failed");
            let _ = replies::followup_ephemeral_text(
                &self.api,
                &self.config.application_id,
                &submission.token,
                "🚫 Something went wrong creating your ticket. Please try again or contact staff.",
            )
            .await;
        }
        Ok(())
    }

    async fn provision(
        &self,
        category: &TicketCategory,
        submission: &FormSubmission,
    ) -> Result<()> {
        let requester = submission
            .user
            .as_ref()
            .ok_or_else(|| anyhow!("intake submission without a user"))?;

        let parent_id = self.config.ticket_parent_for(&category.key);
        let sequence = self.next_sequence(&category.key, parent_id.as_deref()).await?;
        let name = ticket_channel_name(&category.key, sequence, &requester.username);

        let mut overwrites = vec![PermissionOverwrite::deny_role(
            &self.config.guild_id,
            PERMISSION_VIEW_CHANNEL,
        )];
        overwrites.push(PermissionOverwrite::allow_member(
            &requester.id,
            PERMISSION_VIEW_CHANNEL | PERMISSION_SEND_MESSAGES,
        ));
        for role_id in &self.config.staff_role_ids {
            overwrites.push(PermissionOverwrite::allow_role(
                role_id,
                PERMISSION_VIEW_CHANNEL | PERMISSION_SEND_MESSAGES | PERMISSION_MANAGE_MESSAGES,
            ));
        }

        let channel = self
            .api
            .create_guild_channel(
                &self.config.guild_id,
                &CreateGuildChannel {
                    name: name.clone(),
                    kind: CHANNEL_KIND_GUILD_TEXT,
                    parent_id,
                    permission_overwrites: overwrites,
                },
            )
            .await
            .context("create ticket channel")?;

        let values: Vec<(String, Option<String>)> = category
            .fields
            .iter()
            .enumerate()
            .map(|(index, field)| {
                (
                    field.label.clone(),
                    submission
                        .field(&IntakeField::custom_id(index))
                        .map(ToOwned::to_owned),
                )
            })
            .collect();
        let card = render::ticket_card(
            category,
            &requester.mention(),
            &values,
            &self.config.community_name,
        );
        let message = self
            .api
            .create_message(
                &channel.id,
                &CreateMessage {
                    content: Some(format!(
                        "🎟️ {} | Staff: a new ticket awaits.",
                        requester.mention()
                    )),
                    embeds: vec![card],
                    components: vec![render::ticket_actions_row()],
                },
            )
            .await
            .context("post ticket card")?;
        self.api
            .pin_message(&channel.id, &message.id)
            .await
            .context("pin ticket card")?;

        self.api
            .create_message(
                &self.config.ticket_log_channel_id,
                &CreateMessage {
                    embeds: vec![render::ticket_created_log(
                        category,
                        &channel.mention(),
                        &requester.mention(),
                    )],
                    ..CreateMessage::default()
                },
            )
            .await
            .context("log ticket creation")?;

        if let Ok(mut tickets) = self.tickets.lock() {
            tickets.insert(
                channel.id.clone(),
                TicketState {
                    category_key: category.key.clone(),
                    requester_id: requester.id.clone(),
                    claim: ClaimState::Unclaimed,
                },
            );
        }

        replies::followup_ephemeral_text(
            &self.api,
            &self.config.application_id,
            &submission.token,
            &format!("✅ Your ticket is ready: {}", channel.mention()),
        )
        .await
        .context("confirm ticket creation")?;

        info!(
            channel = %channel.id,
            category = %category.key,
            requester = %requester.id,
            "ticket provisioned"
        );
        Ok(())
    }

    /// Returns the next sequence number for a category, seeding the counter
    /// from the number of sibling ticket channels on first use.
    async fn next_sequence(&self, key: &str, parent_id: Option<&str>) -> Result<u64> {
        let mut sequences = self.sequences.lock().await;
        if !sequences.contains_key(key) {
            let channels = self
                .api
                .list_guild_channels(&self.config.guild_id)
                .await
                .context("count existing ticket channels")?;
            let prefix = format!("{key}-");
            let existing = channels
                .iter()
                .filter(|channel| {
                    channel
                        .name
                        .as_deref()
                        .is_some_and(|name| name.starts_with(&prefix))
                        && match parent_id {
                            Some(parent) => channel.parent_id.as_deref() == Some(parent),
                            None => true,
                        }
                })
                .count() as u64;
            sequences.insert(key.to_string(), existing);
        }
        let counter = sequences
            .get_mut(key)
            .ok_or_else(|| anyhow!("sequence counter vanished for {key}"))?;
        *counter += 1;
        Ok(*counter)
    }

    pub async fn handle_claim(&self, interaction: &Interaction) -> Result<()> {
        if !is_staff(interaction.member.as_ref(), &self.config.staff_role_ids) {
            return replies::respond_ephemeral_text(
                &self.api,
                &interaction.id,
                &interaction.token,
                NO_PERMISSION_NOTICE,
            )
            .await
            .context("claim permission notice");
        }
        let channel_id = interaction
            .channel_id
            .clone()
            .ok_or_else(|| anyhow!("claim outside a channel"))?;
        let claimer = interaction
            .actor()
            .cloned()
            .ok_or_else(|| anyhow!("claim without an actor"))?;
        let card_already_marked = interaction
            .message
            .as_ref()
            .and_then(|message| message.embeds.first())
            .is_some_and(|embed| embed.has_field(CLAIM_FIELD_NAME));

        if !self.decide_claim(&channel_id, &claimer.id, card_already_marked) {
            return replies::respond_ephemeral_text(
                &self.api,
                &interaction.id,
                &interaction.token,
                "🚫 This ticket is already claimed.",
            )
            .await
            .context("claim rejection notice");
        }

        replies::respond_ephemeral_text(
            &self.api,
            &interaction.id,
            &interaction.token,
            "🛎️ You claimed this ticket.",
        )
        .await
        .context("claim confirmation")?;

        if let Some(message) = &interaction.message {
            let mut embeds = message.embeds.clone();
            if let Some(card) = embeds.first_mut() {
                *card = card
                    .clone()
                    .field(CLAIM_FIELD_NAME, claimer.mention(), true);
            }
            self.api
                .edit_message(
                    &channel_id,
                    &message.id,
                    &EditMessage {
                        embeds: Some(embeds),
                        components: Some(vec![render::claimed_actions_row()]),
                    },
                )
                .await
                .context("mark card as claimed")?;
        }

        self.api
            .create_message(
                &channel_id,
                &CreateMessage {
                    embeds: vec![render::ticket_claimed_notice(&claimer.mention())],
                    ..CreateMessage::default()
                },
            )
            .await
            .context("post claim notice")?;
        info!(channel = %channel_id, claimer = %claimer.id, "ticket claimed");
        Ok(())
    }

    /// The claim check-and-set. Exactly one caller per channel ever gets
    /// `true`; a marker on the card (pre-restart claim) counts as claimed.
    fn decide_claim(&self, channel_id: &str, claimer_id: &str, card_marked: bool) -> bool {
        let Ok(mut tickets) = self.tickets.lock() else {
            return false;
        };
        let state = tickets
            .entry(channel_id.to_string())
            .or_insert_with(|| TicketState {
                category_key: "unknown".to_string(),
                requester_id: "unknown".to_string(),
                claim: ClaimState::Unclaimed,
            });
        if matches!(state.claim, ClaimState::ClaimedBy(_)) {
            false
        } else if card_marked {
            state.claim = ClaimState::ClaimedBy("unknown".to_string());
            false
        } else {
            state.claim = ClaimState::ClaimedBy(claimer_id.to_string());
            true
        }
    }

    pub async fn handle_close(&self, interaction: &Interaction) -> Result<()> {
        if !is_staff(interaction.member.as_ref(), &self.config.staff_role_ids) {
            return replies::respond_ephemeral_text(
                &self.api,
                &interaction.id,
                &interaction.token,
                NO_PERMISSION_NOTICE,
            )
            .await
            .context("close permission notice");
        }
        let channel_id = interaction
            .channel_id
            .clone()
            .ok_or_else(|| anyhow!("close outside a channel"))?;

        let custom_id = modal_custom_id("ticket_close", current_unix_timestamp_ms());
        let wait = self.broker.open(&custom_id);
        replies::respond_modal(
            &self.api,
            &interaction.id,
            &interaction.token,
            &custom_id,
            "Close Ticket",
            vec![Component::text_input(
                "reason",
                "Closing reason",
                true,
                true,
                Some("Resolved, duplicate, no response..."),
            )],
        )
        .await
        .context("open close form")?;

        match wait.wait(self.config.form_wait).await {
            Ok(submission) => self.finish_close(&channel_id, submission).await,
            Err(_timeout) => {
                debug!(channel = %channel_id, "close form expired, ticket stays open");
                Ok(())
            }
        }
    }

    /// Reason validated, notices posted, grace wait, then the delete. The
    /// grace interval runs in full before the channel disappears.
    async fn finish_close(&self, channel_id: &str, submission: FormSubmission) -> Result<()> {
        let Some(reason) = submission.field("reason").map(ToOwned::to_owned) else {
            return replies::followup_ephemeral_text(
                &self.api,
                &self.config.application_id,
                &submission.token,
                "🚫 A closing reason is required.",
            )
            .await
            .context("close empty reason notice");
        };
        let closer = submission
            .user
            .as_ref()
            .map(|user| user.mention())
            .unwrap_or_default();

        let channel_name = self
            .api
            .get_channel(channel_id)
            .await
            .ok()
            .and_then(|channel| channel.name)
            .unwrap_or_else(|| channel_id.to_string());

        let grace_secs = self.config.close_grace.as_secs();
        self.api
            .create_message(
                channel_id,
                &CreateMessage {
                    embeds: vec![render::ticket_closing_notice(&reason, &closer, grace_secs)],
                    ..CreateMessage::default()
                },
            )
            .await
            .context("post closing notice")?;
        self.api
            .create_message(
                &self.config.ticket_log_channel_id,
                &CreateMessage {
                    embeds: vec![render::ticket_closed_log(&channel_name, &reason, &closer)],
                    ..CreateMessage::default()
                },
            )
            .await
            .context("log ticket closure")?;

        tokio::time::sleep(self.config.close_grace).await;

        if let Err(error) = self.api.delete_channel(channel_id).await {
            error!(error = %error, channel = %channel_id, "ticket channel deletion failed");
            return replies::followup_ephemeral_text(
                &self.api,
                &self.config.application_id,
                &submission.token,
                "🚫 I could not delete this channel. Please remove it manually.",
            )
            .await
            .context("deletion failure notice");
        }
        if let Ok(mut tickets) = self.tickets.lock() {
            if let Some(state) = tickets.remove(channel_id) {
                debug!(
                    category = %state.category_key,
                    requester = %state.requester_id,
                    "ticket state dropped"
                );
            }
        }
        info!(channel = %channel_id, "ticket closed");
        Ok(())
    }

    pub async fn handle_add_user(&self, interaction: &Interaction) -> Result<()> {
        if !is_staff(interaction.member.as_ref(), &self.config.staff_role_ids) {
            return replies::respond_ephemeral_text(
                &self.api,
                &interaction.id,
                &interaction.token,
                NO_PERMISSION_NOTICE,
            )
            .await
            .context("add-user permission notice");
        }
        let channel_id = interaction
            .channel_id
            .clone()
            .ok_or_else(|| anyhow!("add-user outside a channel"))?;
        let actor = interaction
            .actor()
            .map(|user| user.mention())
            .unwrap_or_default();

        let custom_id = modal_custom_id("ticket_add_user", current_unix_timestamp_ms());
        let wait = self.broker.open(&custom_id);
        replies::respond_modal(
            &self.api,
            &interaction.id,
            &interaction.token,
            &custom_id,
            "Add User to Ticket",
            vec![Component::text_input(
                "username",
                "Discord username",
                false,
                true,
                Some("Username, display name or nickname"),
            )],
        )
        .await
        .context("open add-user form")?;

        let submission = match wait.wait(self.config.form_wait).await {
            Ok(submission) => submission,
            Err(_timeout) => {
                debug!(channel = %channel_id, "add-user form expired");
                return Ok(());
            }
        };
        let Some(name) = submission.field("username").map(ToOwned::to_owned) else {
            return replies::followup_ephemeral_text(
                &self.api,
                &self.config.application_id,
                &submission.token,
                "🚫 A username is required.",
            )
            .await
            .context("add-user empty name notice");
        };

        let members = self
            .api
            .list_all_guild_members(&self.config.guild_id)
            .await
            .context("list members for add-user lookup")?;
        let Some(target) = members
            .into_iter()
            .find(|member| member.matches_name(&name))
            .and_then(|member| member.user)
        else {
            return replies::followup_ephemeral_text(
                &self.api,
                &self.config.application_id,
                &submission.token,
                &format!("🚫 No member named `{name}` was found."),
            )
            .await
            .context("add-user not found notice");
        };

        self.api
            .edit_channel_permissions(
                &channel_id,
                &PermissionOverwrite::allow_member(
                    &target.id,
                    PERMISSION_VIEW_CHANNEL | PERMISSION_SEND_MESSAGES,
                ),
            )
            .await
            .context("grant ticket access")?;
        self.api
            .create_message(
                &channel_id,
                &CreateMessage {
                    embeds: vec![render::participant_added_notice(&target.mention(), &actor)],
                    ..CreateMessage::default()
                },
            )
            .await
            .context("post add-user notice")?;
        replies::followup_ephemeral_text(
            &self.api,
            &self.config.application_id,
            &submission.token,
            &format!("✅ {} now has access to this ticket.", target.mention()),
        )
        .await
        .context("confirm add-user")?;
        info!(channel = %channel_id, user = %target.id, "participant added to ticket");
        Ok(())
    }

    /// Requester id recorded for a provisioned channel, when known.
    #[cfg(test)]
    fn requester_of(&self, channel_id: &str) -> Option<String> {
        self.tickets
            .lock()
            .ok()
            .and_then(|tickets| tickets.get(channel_id).map(|t| t.requester_id.clone()))
    }
}

/// Channel name for a fresh ticket: `{category}-{seq}-{requester}`, squeezed
/// into Discord's length cap.
fn ticket_channel_name(category_key: &str, sequence: u64, username: &str) -> String {
    let token = sanitize_channel_token(username);
    truncate_chars(
        &format!("{category_key}-{sequence}-{token}"),
        CHANNEL_NAME_MAX_CHARS,
    )
}
