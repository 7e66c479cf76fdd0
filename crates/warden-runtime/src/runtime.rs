//! Runtime wiring: configuration, the gateway event loop, and the
//! interaction dispatcher that fans out to the engines.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use warden_discord::forms::{FormBroker, FormSubmission};
use warden_discord::gateway::{
    GatewayEvent, GatewaySession, ACTIVITY_LISTENING, ACTIVITY_PLAYING, ACTIVITY_WATCHING,
    INTENT_GUILDS, INTENT_GUILD_MEMBERS,
};
use warden_discord::rest::DiscordApiClient;
use warden_discord::types::{
    Interaction, COMPONENT_BUTTON, INTERACTION_KIND_COMMAND, INTERACTION_KIND_COMPONENT,
    INTERACTION_KIND_MODAL_SUBMIT,
};
use warden_ledger::WarningStore;

use crate::actions::{mark_component_busy, Action};
use crate::commands::{
    guild_commands_payload, CommandEngine, COMMAND_PANEL, COMMAND_TICKETS, COMMAND_WARN,
    COMMAND_WARNING_HISTORY,
};
use crate::indicators::IndicatorUpdater;
use crate::replies;
use crate::status::{new_status_holder, StatusOrchestrator};
use crate::tickets::TicketEngine;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bot_token: String,
    pub application_id: String,
    pub guild_id: String,
    pub api_base: String,
    pub request_timeout_ms: u64,
    /// Human-facing community name used across embeds.
    pub community_name: String,
    pub staff_role_ids: Vec<String>,
    pub announcement_channel_id: String,
    pub log_channel_id: String,
    pub ticket_log_channel_id: String,
    pub status_channel_id: String,
    pub member_count_channel_id: String,
    /// Default parent category for new ticket channels; empty means none.
    pub ticket_parent_id: String,
    /// Per-category parent overrides, keyed by category key.
    pub category_parents: HashMap<String, String>,
    pub database_path: PathBuf,
    /// How long an opened form stays valid before the wait gives up.
    pub form_wait: Duration,
    /// Delay between the closing notice and the channel deletion.
    pub close_grace: Duration,
    pub announcement_purge_limit: usize,
    pub status_refresh_initial_delay: Duration,
    pub status_refresh_interval: Duration,
    pub presence_interval: Duration,
    pub reconnect_delay_ms: u64,
}

impl RuntimeConfig {
    /// Parent category for a new ticket channel of the given kind.
    pub fn ticket_parent_for(&self, category_key: &str) -> Option<String> {
        self.category_parents
            .get(category_key)
            .cloned()
            .or_else(|| {
                (!self.ticket_parent_id.is_empty()).then(|| self.ticket_parent_id.clone())
            })
    }
}

pub struct WardenRuntime {
    config: Arc<RuntimeConfig>,
    api: DiscordApiClient,
    broker: FormBroker,
    tickets: TicketEngine,
    status: StatusOrchestrator,
    commands: CommandEngine,
    indicators: IndicatorUpdater,
}

/// Builds the runtime and drives it until ctrl-c.
pub async fn run_warden_runtime(config: RuntimeConfig) -> Result<()> {
    let runtime = Arc::new(WardenRuntime::new(config)?);
    runtime.run().await
}

impl WardenRuntime {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let config = Arc::new(config);
        let api = DiscordApiClient::new(
            &config.api_base,
            &config.bot_token,
            config.request_timeout_ms,
        )
        .context("build discord api client")?;
        let broker = FormBroker::new();
        let status_holder = new_status_holder();
        let ledger = Arc::new(
            WarningStore::open(&config.database_path).context("open warning ledger")?,
        );

        Ok(Self {
            tickets: TicketEngine::new(api.clone(), Arc::clone(&config), broker.clone()),
            status: StatusOrchestrator::new(
                api.clone(),
                Arc::clone(&config),
                broker.clone(),
                Arc::clone(&status_holder),
            ),
            commands: CommandEngine::new(api.clone(), Arc::clone(&config), ledger),
            indicators: IndicatorUpdater::new(api.clone(), Arc::clone(&config), status_holder),
            config,
            api,
            broker,
        })
    }

    async fn run(self: Arc<Self>) -> Result<()> {
        if let Err(error) = self
            .api
            .register_guild_commands(
                &self.config.application_id,
                &self.config.guild_id,
                &guild_commands_payload(),
            )
            .await
        {
            warn!(error = %error, "guild command registration failed, continuing with whatever is registered");
        }

        self.indicators.refresh_member_count().await;
        tokio::spawn(self.indicators.clone().run_status_loop(
            self.config.status_refresh_initial_delay,
            self.config.status_refresh_interval,
        ));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("ctrl-c received, shutting down");
                    return Ok(());
                }
                session_result = self.run_session() => {
                    match session_result {
                        Ok(()) => info!("gateway session closed, reconnecting"),
                        Err(error) => warn!(error = %error, "gateway session failed, reconnecting"),
                    }
                    tokio::time::sleep(Duration::from_millis(self.config.reconnect_delay_ms)).await;
                }
            }
        }
    }

    async fn run_session(self: &Arc<Self>) -> Result<()> {
        let gateway_url = self.api.get_gateway_url().await?;
        let mut session = GatewaySession::connect(
            &gateway_url,
            &self.config.bot_token,
            INTENT_GUILDS | INTENT_GUILD_MEMBERS,
        )
        .await?;

        let mut presence = tokio::time::interval(self.config.presence_interval);
        let mut rotation: usize = 0;
        loop {
            tokio::select! {
                _ = presence.tick() => {
                    let (kind, name) = self.presence_entry(rotation).await;
                    rotation = rotation.wrapping_add(1);
                    if let Err(error) = session.update_presence(kind, &name).await {
                        warn!(error = %error, "presence update failed");
                    }
                }
                event = session.next_event() => {
                    match event? {
                        None => return Ok(()),
                        Some(event) => self.handle_event(event),
                    }
                }
            }
        }
    }

    fn handle_event(self: &Arc<Self>, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready {
                session_id,
                application_id,
            } => {
                if application_id != self.config.application_id {
                    warn!(
                        configured = %self.config.application_id,
                        actual = %application_id,
                        "gateway reports a different application id"
                    );
                }
                info!(session = %session_id, "gateway session ready");
            }
            GatewayEvent::InteractionCreate(interaction) => {
                let runtime = Arc::clone(self);
                tokio::spawn(async move {
                    runtime.dispatch_interaction(*interaction).await;
                });
            }
            GatewayEvent::GuildMemberAdd { guild_id }
            | GatewayEvent::GuildMemberRemove { guild_id } => {
                if guild_id == self.config.guild_id {
                    let indicators = self.indicators.clone();
                    tokio::spawn(async move {
                        indicators.refresh_member_count().await;
                    });
                }
            }
        }
    }

    /// Rotating presence: member count, ticket hint, community name.
    async fn presence_entry(&self, rotation: usize) -> (u8, String) {
        match rotation % 3 {
            0 => {
                let count = self
                    .api
                    .get_guild_with_counts(&self.config.guild_id)
                    .await
                    .ok()
                    .and_then(|guild| guild.approximate_member_count);
                match count {
                    Some(count) => (ACTIVITY_WATCHING, format!("👥 {count} members")),
                    None => (ACTIVITY_WATCHING, self.config.community_name.clone()),
                }
            }
            1 => (
                ACTIVITY_PLAYING,
                "🎫 Open a ticket for help".to_string(),
            ),
            _ => (ACTIVITY_LISTENING, self.config.community_name.clone()),
        }
    }

    pub(crate) async fn dispatch_interaction(&self, interaction: Interaction) {
        match interaction.kind {
            INTERACTION_KIND_COMMAND => self.dispatch_command(interaction).await,
            INTERACTION_KIND_COMPONENT => self.dispatch_component(interaction).await,
            INTERACTION_KIND_MODAL_SUBMIT => self.dispatch_modal_submit(interaction).await,
            other => debug!(kind = other, "ignoring interaction kind"),
        }
    }

    async fn dispatch_command(&self, interaction: Interaction) {
        let name = interaction.command_name().unwrap_or_default().to_owned();
        let result = match name.as_str() {
            COMMAND_PANEL => self.commands.handle_panel(&interaction).await,
            COMMAND_TICKETS => {
                self.commands
                    .handle_tickets_menu(&interaction, self.tickets.registry())
                    .await
            }
            COMMAND_WARN => self.commands.handle_warn(&interaction).await,
            COMMAND_WARNING_HISTORY => self.commands.handle_warning_history(&interaction).await,
            _ => {
                debug!(command = %name, "ignoring unknown command");
                Ok(())
            }
        };
        if let Err(error) = result {
            error!(error = %error, command = %name, "command handler failed");
            let _ = replies::respond_ephemeral_text(
                &self.api,
                &interaction.id,
                &interaction.token,
                "🚫 Something went wrong. Please try again.",
            )
            .await;
        }
    }

    /// Component dispatch with the visual busy/restore wrapper: the pressed
    /// button is disabled for the duration of the handler and put back
    /// afterwards, success or failure.
    async fn dispatch_component(&self, interaction: Interaction) {
        let Some(action) = interaction.custom_id().and_then(Action::parse) else {
            debug!(
                custom_id = interaction.custom_id().unwrap_or_default(),
                "component without a known action, leaving to the platform default"
            );
            return;
        };

        let message_ref = interaction.message.as_ref().and_then(|message| {
            interaction
                .channel_id
                .clone()
                .map(|channel_id| (channel_id, message.id.clone(), message.components.clone()))
        });
        let is_button = interaction
            .data
            .as_ref()
            .and_then(|data| data.component_type)
            == Some(COMPONENT_BUTTON);

        if is_button {
            if let (Some((channel_id, message_id, components)), Some(custom_id)) =
                (&message_ref, interaction.custom_id())
            {
                let busy = mark_component_busy(components, custom_id);
                if let Err(error) = self
                    .api
                    .edit_message(
                        channel_id,
                        message_id,
                        &warden_discord::types::EditMessage {
                            embeds: None,
                            components: Some(busy),
                        },
                    )
                    .await
                {
                    debug!(error = %error, "could not apply busy state");
                }
            }
        }

        let result = match action {
            Action::CategorySelect => self.tickets.handle_category_select(&interaction).await,
            Action::TicketClaim => self.tickets.handle_claim(&interaction).await,
            Action::TicketClose => self.tickets.handle_close(&interaction).await,
            Action::TicketAddUser => self.tickets.handle_add_user(&interaction).await,
            Action::StatusOpen => self.status.handle_open(&interaction).await,
            Action::StatusVote => self.status.handle_vote(&interaction).await,
            Action::StatusClose => self.status.handle_close(&interaction).await,
        };
        if let Err(error) = result {
            error!(error = %error, action = ?action, "component handler failed");
            let _ = replies::followup_ephemeral_text(
                &self.api,
                &self.config.application_id,
                &interaction.token,
                "🚫 Something went wrong. Please try again.",
            )
            .await;
        }

        if is_button {
            if let Some((channel_id, message_id, components)) = message_ref {
                if let Err(error) = self
                    .api
                    .edit_message(
                        &channel_id,
                        &message_id,
                        &warden_discord::types::EditMessage {
                            embeds: None,
                            components: Some(components),
                        },
                    )
                    .await
                {
                    // Routine when the handler deleted or re-rendered the
                    // message in the meantime.
                    debug!(error = %error, "could not restore component state");
                }
            }
        }
    }

    /// Modal submits are acknowledged immediately, then routed to whichever
    /// engine opened the form. A submit nobody is waiting for is stale.
    async fn dispatch_modal_submit(&self, interaction: Interaction) {
        if let Err(error) =
            replies::defer_ephemeral(&self.api, &interaction.id, &interaction.token).await
        {
            debug!(error = %error, "modal submit ack failed");
        }
        let custom_id = interaction.custom_id().unwrap_or_default().to_owned();
        let delivered = self
            .broker
            .complete(&custom_id, FormSubmission::from_interaction(&interaction));
        if !delivered {
            debug!(custom_id = %custom_id, "modal submit with no waiter, dropping");
        }
    }
}

#[cfg(test)]
pub(crate) fn test_api_client(base_url: &str) -> DiscordApiClient {
    DiscordApiClient::new(base_url, "bot-token", 3_000).expect("client")
}

#[cfg(test)]
pub(crate) fn test_config(base_url: &str) -> RuntimeConfig {
    RuntimeConfig {
        bot_token: "bot-token".to_string(),
        application_id: "APP".to_string(),
        guild_id: "G1".to_string(),
        api_base: base_url.to_string(),
        request_timeout_ms: 3_000,
        community_name: "Example RP".to_string(),
        staff_role_ids: vec!["STAFF".to_string()],
        announcement_channel_id: "ANN".to_string(),
        log_channel_id: "LOG".to_string(),
        ticket_log_channel_id: "TLOG".to_string(),
        status_channel_id: "STATUS".to_string(),
        member_count_channel_id: "MEMBERS".to_string(),
        ticket_parent_id: "PARENT".to_string(),
        category_parents: HashMap::new(),
        database_path: PathBuf::from("warden-test.db"),
        form_wait: Duration::from_millis(500),
        close_grace: Duration::from_millis(0),
        announcement_purge_limit: 5,
        status_refresh_initial_delay: Duration::from_millis(0),
        status_refresh_interval: Duration::from_secs(900),
        presence_interval: Duration::from_secs(60),
        reconnect_delay_ms: 5_000,
    }
}
