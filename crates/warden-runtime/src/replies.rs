//! Interaction response payload helpers shared by the engines.

use serde_json::json;

use warden_discord::rest::{DiscordApiClient, RestResult};
use warden_discord::types::{
    Component, Embed, MESSAGE_FLAG_EPHEMERAL, RESPONSE_CHANNEL_MESSAGE,
    RESPONSE_DEFERRED_CHANNEL_MESSAGE, RESPONSE_MODAL,
};

/// Standard refusal shown to non-staff actors; gated handlers perform no
/// side effects besides this notice.
pub const NO_PERMISSION_NOTICE: &str = "🚫 You don't have permission to use this control.";

/// Initial interaction response carrying a message.
pub async fn respond_message(
    api: &DiscordApiClient,
    interaction_id: &str,
    token: &str,
    content: Option<&str>,
    embeds: Vec<Embed>,
    components: Vec<Component>,
    ephemeral: bool,
) -> RestResult<()> {
    let mut data = json!({});
    if let Some(content) = content {
        data["content"] = json!(content);
    }
    if !embeds.is_empty() {
        data["embeds"] = json!(embeds);
    }
    if !components.is_empty() {
        data["components"] = json!(components);
    }
    if ephemeral {
        data["flags"] = json!(MESSAGE_FLAG_EPHEMERAL);
    }
    api.create_interaction_response(
        interaction_id,
        token,
        &json!({ "type": RESPONSE_CHANNEL_MESSAGE, "data": data }),
    )
    .await
}

pub async fn respond_ephemeral_text(
    api: &DiscordApiClient,
    interaction_id: &str,
    token: &str,
    content: &str,
) -> RestResult<()> {
    respond_message(api, interaction_id, token, Some(content), vec![], vec![], true).await
}

/// Opens a modal as the interaction response. `inputs` are bare text inputs;
/// each gets wrapped in its own action row.
pub async fn respond_modal(
    api: &DiscordApiClient,
    interaction_id: &str,
    token: &str,
    custom_id: &str,
    title: &str,
    inputs: Vec<Component>,
) -> RestResult<()> {
    let rows: Vec<Component> = inputs
        .into_iter()
        .map(|input| Component::action_row(vec![input]))
        .collect();
    api.create_interaction_response(
        interaction_id,
        token,
        &json!({
            "type": RESPONSE_MODAL,
            "data": {
                "custom_id": custom_id,
                "title": title,
                "components": rows,
            }
        }),
    )
    .await
}

/// Acknowledges an interaction with a deferred ephemeral response so
/// follow-ups on its token stay valid.
pub async fn defer_ephemeral(
    api: &DiscordApiClient,
    interaction_id: &str,
    token: &str,
) -> RestResult<()> {
    api.create_interaction_response(
        interaction_id,
        token,
        &json!({
            "type": RESPONSE_DEFERRED_CHANNEL_MESSAGE,
            "data": { "flags": MESSAGE_FLAG_EPHEMERAL }
        }),
    )
    .await
}

pub async fn followup_ephemeral_text(
    api: &DiscordApiClient,
    application_id: &str,
    token: &str,
    content: &str,
) -> RestResult<()> {
    api.create_followup_message(
        application_id,
        token,
        &json!({ "content": content, "flags": MESSAGE_FLAG_EPHEMERAL }),
    )
    .await
    .map(|_| ())
}
