//! Community status state and the staff control panel transitions.
//!
//! The in-memory status is authoritative between restarts and starts at
//! `Unknown`; every transition goes through the holder's mutex before any
//! announcement is made.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use warden_core::current_unix_timestamp_ms;
use warden_discord::forms::{FormBroker, FormSubmission};
use warden_discord::rest::DiscordApiClient;
use warden_discord::types::{Component, CreateMessage, Embed, Interaction, Message};

use crate::actions::{is_staff, modal_custom_id};
use crate::indicators;
use crate::render;
use crate::replies::{self, NO_PERMISSION_NOTICE};
use crate::runtime::RuntimeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommunityStatus {
    #[default]
    Unknown,
    Open,
    Closed,
    Voting,
}

impl CommunityStatus {
    /// Channel name the status indicator shows for this state.
    pub fn indicator_name(self) -> &'static str {
        match self {
            Self::Open => "🟢│server-open",
            Self::Closed => "🔴│server-closed",
            Self::Voting => "🟡│vote-active",
            Self::Unknown => "⚪│status-unknown",
        }
    }
}

/// Shared, mutex-guarded view of the current status. Readers copy the value
/// out; no lock is held across awaits.
pub type StatusHolder = Arc<Mutex<CommunityStatus>>;

pub fn new_status_holder() -> StatusHolder {
    Arc::new(Mutex::new(CommunityStatus::Unknown))
}

pub struct StatusOrchestrator {
    api: DiscordApiClient,
    config: Arc<RuntimeConfig>,
    broker: FormBroker,
    status: StatusHolder,
}

impl StatusOrchestrator {
    pub fn new(
        api: DiscordApiClient,
        config: Arc<RuntimeConfig>,
        broker: FormBroker,
        status: StatusHolder,
    ) -> Self {
        Self {
            api,
            config,
            broker,
            status,
        }
    }

    pub fn current(&self) -> CommunityStatus {
        self.status
            .lock()
            .map(|status| *status)
            .unwrap_or(CommunityStatus::Unknown)
    }

    fn set(&self, next: CommunityStatus) {
        if let Ok(mut status) = self.status.lock() {
            *status = next;
        }
    }

    /// Open button: flips the status and broadcasts immediately, no form.
    pub async fn handle_open(&self, interaction: &Interaction) -> Result<()> {
        if !is_staff(interaction.member.as_ref(), &self.config.staff_role_ids) {
            return replies::respond_ephemeral_text(
                &self.api,
                &interaction.id,
                &interaction.token,
                NO_PERMISSION_NOTICE,
            )
            .await
            .context("status open permission notice");
        }

        self.set(CommunityStatus::Open);
        let actor = interaction
            .actor()
            .map(|user| user.mention())
            .unwrap_or_default();
        self.broadcast(
            render::open_announcement(&self.config.community_name),
            "Server opened",
            &actor,
        )
        .await?;
        replies::respond_ephemeral_text(
            &self.api,
            &interaction.id,
            &interaction.token,
            "📢 The server has been announced as open.",
        )
        .await
        .context("status open confirmation")
    }

    /// Close button: collects a reason through a form, then broadcasts and
    /// refreshes the status indicator without waiting for the periodic job.
    pub async fn handle_close(&self, interaction: &Interaction) -> Result<()> {
        if !is_staff(interaction.member.as_ref(), &self.config.staff_role_ids) {
            return replies::respond_ephemeral_text(
                &self.api,
                &interaction.id,
                &interaction.token,
                NO_PERMISSION_NOTICE,
            )
            .await
            .context("status close permission notice");
        }

        let custom_id = modal_custom_id("status_close", current_unix_timestamp_ms());
        let wait = self.broker.open(&custom_id);
        replies::respond_modal(
            &self.api,
            &interaction.id,
            &interaction.token,
            &custom_id,
            "Close Server",
            vec![Component::text_input(
                "reason",
                "Closing reason",
                true,
                true,
                Some("Maintenance, restart, end of session..."),
            )],
        )
        .await
        .context("status close form")?;

        match wait.wait(self.config.form_wait).await {
            Ok(submission) => self.finish_close(submission).await,
            Err(_timeout) => {
                debug!("close form expired without a submission");
                Ok(())
            }
        }
    }

    async fn finish_close(&self, submission: FormSubmission) -> Result<()> {
        let Some(reason) = submission.field("reason").map(ToOwned::to_owned) else {
            return replies::followup_ephemeral_text(
                &self.api,
                &self.config.application_id,
                &submission.token,
                "🚫 A closing reason is required.",
            )
            .await
            .context("status close empty reason notice");
        };

        self.set(CommunityStatus::Closed);
        let actor = submission
            .user
            .as_ref()
            .map(|user| user.mention())
            .unwrap_or_default();
        self.broadcast(
            render::closed_announcement(&self.config.community_name, &reason),
            "Server closed",
            &actor,
        )
        .await?;

        // A closure should be visible in the sidebar right away.
        if let Err(error) =
            indicators::apply_status_label(&self.api, &self.config, self.current()).await
        {
            warn!(error = %error, "immediate status indicator refresh failed");
        }

        replies::followup_ephemeral_text(
            &self.api,
            &self.config.application_id,
            &submission.token,
            "📢 The server has been announced as closed.",
        )
        .await
        .context("status close confirmation")
    }

    /// Start Vote button: collects the vote parameters, broadcasts the vote
    /// announcement and seeds the tally reactions. Reactions are display
    /// only; no count is enforced.
    pub async fn handle_vote(&self, interaction: &Interaction) -> Result<()> {
        if !is_staff(interaction.member.as_ref(), &self.config.staff_role_ids) {
            return replies::respond_ephemeral_text(
                &self.api,
                &interaction.id,
                &interaction.token,
                NO_PERMISSION_NOTICE,
            )
            .await
            .context("status vote permission notice");
        }

        let custom_id = modal_custom_id("status_vote", current_unix_timestamp_ms());
        let wait = self.broker.open(&custom_id);
        replies::respond_modal(
            &self.api,
            &interaction.id,
            &interaction.token,
            &custom_id,
            "Start Vote",
            vec![
                Component::text_input(
                    "votes_required",
                    "Votes required",
                    false,
                    true,
                    Some("e.g. 8"),
                ),
                Component::text_input(
                    "authorized_by",
                    "Authorized by (name)",
                    false,
                    true,
                    None,
                ),
                Component::text_input(
                    "authorized_by_id",
                    "Authorized by (user id, optional)",
                    false,
                    false,
                    Some("Right click the user, Copy User ID"),
                ),
            ],
        )
        .await
        .context("status vote form")?;

        match wait.wait(self.config.form_wait).await {
            Ok(submission) => self.finish_vote(submission).await,
            Err(_timeout) => {
                debug!("vote form expired without a submission");
                Ok(())
            }
        }
    }

    async fn finish_vote(&self, submission: FormSubmission) -> Result<()> {
        let votes_required = submission
            .field("votes_required")
            .unwrap_or("?")
            .to_owned();
        let authorizer_name = submission.field("authorized_by").unwrap_or("?").to_owned();
        let authorizer = self
            .resolve_authorizer(&authorizer_name, submission.field("authorized_by_id"))
            .await;

        self.set(CommunityStatus::Voting);
        let actor = submission
            .user
            .as_ref()
            .map(|user| user.mention())
            .unwrap_or_default();
        let announcement = self
            .broadcast(
                render::voting_announcement(
                    &self.config.community_name,
                    &votes_required,
                    &authorizer,
                ),
                "Start vote opened",
                &actor,
            )
            .await?;

        for emoji in ["👍", "👎"] {
            if let Err(error) = self
                .api
                .create_reaction(&self.config.announcement_channel_id, &announcement.id, emoji)
                .await
            {
                warn!(error = %error, emoji, "could not seed vote reaction");
            }
        }

        replies::followup_ephemeral_text(
            &self.api,
            &self.config.application_id,
            &submission.token,
            "🗳️ The start vote has been announced.",
        )
        .await
        .context("status vote confirmation")
    }

    /// Resolution chain for the vote authorizer: explicit id, then a
    /// case-insensitive name match against the member list, then the raw
    /// name as plain text.
    async fn resolve_authorizer(&self, name: &str, user_id: Option<&str>) -> String {
        if let Some(user_id) = user_id {
            match self.api.get_guild_member(&self.config.guild_id, user_id).await {
                Ok(member) => {
                    if let Some(user) = member.user {
                        return user.mention();
                    }
                }
                Err(error) => {
                    warn!(error = %error, user_id, "authorizer id lookup failed");
                }
            }
        }
        match self.api.list_all_guild_members(&self.config.guild_id).await {
            Ok(members) => {
                if let Some(user) = members
                    .into_iter()
                    .find(|member| member.matches_name(name))
                    .and_then(|member| member.user)
                {
                    return user.mention();
                }
            }
            Err(error) => {
                warn!(error = %error, "authorizer name lookup failed");
            }
        }
        plain_authorizer(name)
    }

    /// Every broadcast: purge the most recent announcements, post the new
    /// one, mirror an audit entry into the log channel.
    async fn broadcast(
        &self,
        embed: Embed,
        action: &str,
        actor_mention: &str,
    ) -> Result<Message> {
        self.api
            .purge_recent(
                &self.config.announcement_channel_id,
                self.config.announcement_purge_limit,
            )
            .await
            .context("purge previous announcements")?;
        let message = self
            .api
            .create_message(
                &self.config.announcement_channel_id,
                &CreateMessage {
                    embeds: vec![embed],
                    ..CreateMessage::default()
                },
            )
            .await
            .context("post announcement")?;
        self.api
            .create_message(
                &self.config.log_channel_id,
                &CreateMessage {
                    embeds: vec![render::announcement_log(action, actor_mention)],
                    ..CreateMessage::default()
                },
            )
            .await
            .context("mirror announcement to the log channel")?;
        Ok(message)
    }
}

fn plain_authorizer(name: &str) -> String {
    format!("@{}", name.trim())
}
