//! Wire models for the Discord REST and gateway payloads Warden touches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const INTERACTION_KIND_COMMAND: u8 = 2;
pub const INTERACTION_KIND_COMPONENT: u8 = 3;
pub const INTERACTION_KIND_MODAL_SUBMIT: u8 = 5;

pub const RESPONSE_CHANNEL_MESSAGE: u8 = 4;
pub const RESPONSE_DEFERRED_CHANNEL_MESSAGE: u8 = 5;
pub const RESPONSE_MODAL: u8 = 9;

/// Message flag marking an interaction response visible only to the caller.
pub const MESSAGE_FLAG_EPHEMERAL: u64 = 1 << 6;

pub const COMPONENT_ACTION_ROW: u8 = 1;
pub const COMPONENT_BUTTON: u8 = 2;
pub const COMPONENT_STRING_SELECT: u8 = 3;
pub const COMPONENT_TEXT_INPUT: u8 = 4;

pub const BUTTON_STYLE_PRIMARY: u8 = 1;
pub const BUTTON_STYLE_SECONDARY: u8 = 2;
pub const BUTTON_STYLE_SUCCESS: u8 = 3;
pub const BUTTON_STYLE_DANGER: u8 = 4;

pub const TEXT_INPUT_SHORT: u8 = 1;
pub const TEXT_INPUT_PARAGRAPH: u8 = 2;

pub const CHANNEL_KIND_GUILD_TEXT: u8 = 0;

pub const PERMISSION_VIEW_CHANNEL: u64 = 1 << 10;
pub const PERMISSION_SEND_MESSAGES: u64 = 1 << 11;
pub const PERMISSION_MANAGE_MESSAGES: u64 = 1 << 13;

pub const OVERWRITE_KIND_ROLE: u8 = 0;
pub const OVERWRITE_KIND_MEMBER: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: Option<bool>,
}

impl User {
    /// Preferred human-facing name: global display name when set, otherwise
    /// the account username.
    pub fn display_name(&self) -> &str {
        self.global_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMember {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl GuildMember {
    pub fn has_any_role(&self, role_ids: &[String]) -> bool {
        self.roles.iter().any(|role| role_ids.contains(role))
    }

    /// Case-insensitive exact match against the account username, global
    /// display name or guild nickname.
    pub fn matches_name(&self, name: &str) -> bool {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return false;
        }
        let user_match = self.user.as_ref().is_some_and(|user| {
            user.username.to_lowercase() == wanted
                || user
                    .global_name
                    .as_deref()
                    .is_some_and(|global| global.to_lowercase() == wanted)
        });
        user_match
            || self
                .nick
                .as_deref()
                .is_some_and(|nick| nick.to_lowercase() == wanted)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Guild {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub approximate_member_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<u8>,
}

impl Channel {
    pub fn mention(&self) -> String {
        format!("<#{}>", self.id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    pub fn timestamp(mut self, rfc3339: impl Into<String>) -> Self {
        self.timestamp = Some(rfc3339.into());
        self
    }

    /// Returns true when the embed carries a field with the given name.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PartialEmoji {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<PartialEmoji>,
}

/// One Discord message component. Discord models rows, buttons, selects and
/// text inputs as a single tagged object, which keeps round-tripping the
/// components attached to an interaction's message lossless.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<PartialEmoji>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_values: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_values: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Component {
    pub fn action_row(components: Vec<Component>) -> Self {
        Self {
            kind: COMPONENT_ACTION_ROW,
            components,
            ..Self::default()
        }
    }

    pub fn button(style: u8, label: &str, emoji: Option<&str>, custom_id: &str) -> Self {
        Self {
            kind: COMPONENT_BUTTON,
            style: Some(style),
            label: Some(label.to_string()),
            emoji: emoji.map(|name| PartialEmoji {
                name: name.to_string(),
            }),
            custom_id: Some(custom_id.to_string()),
            ..Self::default()
        }
    }

    pub fn string_select(custom_id: &str, placeholder: &str, options: Vec<SelectOption>) -> Self {
        Self {
            kind: COMPONENT_STRING_SELECT,
            custom_id: Some(custom_id.to_string()),
            placeholder: Some(placeholder.to_string()),
            options,
            min_values: Some(1),
            max_values: Some(1),
            ..Self::default()
        }
    }

    pub fn text_input(
        custom_id: &str,
        label: &str,
        long: bool,
        required: bool,
        placeholder: Option<&str>,
    ) -> Self {
        Self {
            kind: COMPONENT_TEXT_INPUT,
            custom_id: Some(custom_id.to_string()),
            label: Some(label.to_string()),
            style: Some(if long {
                TEXT_INPUT_PARAGRAPH
            } else {
                TEXT_INPUT_SHORT
            }),
            required: Some(required),
            placeholder: placeholder.map(ToOwned::to_owned),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub allow: String,
    pub deny: String,
}

impl PermissionOverwrite {
    pub fn allow_member(id: &str, allow: u64) -> Self {
        Self {
            id: id.to_string(),
            kind: OVERWRITE_KIND_MEMBER,
            allow: allow.to_string(),
            deny: 0.to_string(),
        }
    }

    pub fn allow_role(id: &str, allow: u64) -> Self {
        Self {
            id: id.to_string(),
            kind: OVERWRITE_KIND_ROLE,
            allow: allow.to_string(),
            deny: 0.to_string(),
        }
    }

    pub fn deny_role(id: &str, deny: u64) -> Self {
        Self {
            id: id.to_string(),
            kind: OVERWRITE_KIND_ROLE,
            allow: 0.to_string(),
            deny: deny.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EditMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Embed>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateGuildChannel {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InteractionData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub component_type: Option<u8>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl InteractionData {
    /// Looks up a string-valued slash command option by name.
    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|option| option.name == name)
            .and_then(|option| option.value.as_ref())
            .and_then(Value::as_str)
    }

    /// Flattens modal action rows into `(custom_id, value)` pairs.
    pub fn text_input_values(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for row in &self.components {
            for child in &row.components {
                if child.kind != COMPONENT_TEXT_INPUT {
                    continue;
                }
                let Some(custom_id) = child.custom_id.clone() else {
                    continue;
                };
                pairs.push((custom_id, child.value.clone().unwrap_or_default()));
            }
        }
        pairs
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<InteractionData>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub member: Option<GuildMember>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub message: Option<Message>,
}

impl Interaction {
    /// The acting user: guild interactions carry it inside `member`, direct
    /// interactions at the top level.
    pub fn actor(&self) -> Option<&User> {
        self.member
            .as_ref()
            .and_then(|member| member.user.as_ref())
            .or(self.user.as_ref())
    }

    pub fn custom_id(&self) -> Option<&str> {
        self.data.as_ref().and_then(|data| data.custom_id.as_deref())
    }

    pub fn command_name(&self) -> Option<&str> {
        self.data.as_ref().and_then(|data| data.name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_display_name_prefers_global_name() {
        let user = User {
            id: "1".to_string(),
            username: "jrsmile".to_string(),
            global_name: Some("Smile".to_string()),
            bot: None,
        };
        assert_eq!(user.display_name(), "Smile");

        let bare = User {
            id: "2".to_string(),
            username: "jrsmile".to_string(),
            global_name: None,
            bot: None,
        };
        assert_eq!(bare.display_name(), "jrsmile");
    }

    #[test]
    fn member_name_matching_checks_username_global_name_and_nick() {
        let member: GuildMember = serde_json::from_value(json!({
            "user": {"id": "1", "username": "SomeBuilder", "global_name": "The Builder"},
            "nick": "Bob the Builder"
        }))
        .expect("member");
        assert!(member.matches_name("somebuilder"));
        assert!(member.matches_name("the builder"));
        assert!(member.matches_name(" Bob the Builder "));
        assert!(!member.matches_name("other"));
        assert!(!member.matches_name("   "));
    }

    #[test]
    fn text_input_values_flatten_modal_rows() {
        let data: InteractionData = serde_json::from_value(json!({
            "custom_id": "ticket_close:abc",
            "components": [
                {"type": 1, "components": [
                    {"type": 4, "custom_id": "reason", "value": "resolved"}
                ]},
                {"type": 1, "components": [
                    {"type": 4, "custom_id": "proof", "value": null}
                ]}
            ]
        }))
        .expect("decode");
        let pairs = data.text_input_values();
        assert_eq!(
            pairs,
            vec![
                ("reason".to_string(), "resolved".to_string()),
                ("proof".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn interaction_actor_falls_back_to_top_level_user() {
        let interaction: Interaction = serde_json::from_value(json!({
            "id": "10",
            "token": "tok",
            "type": INTERACTION_KIND_COMMAND,
            "user": {"id": "42", "username": "solo"}
        }))
        .expect("decode");
        assert_eq!(interaction.actor().map(|user| user.id.as_str()), Some("42"));
    }

    #[test]
    fn components_serialize_without_empty_collections() {
        let button = Component::button(BUTTON_STYLE_SUCCESS, "Claim", Some("🛎️"), "ticket_claim");
        let encoded = serde_json::to_value(&button).expect("encode");
        assert_eq!(encoded["type"], json!(COMPONENT_BUTTON));
        assert_eq!(encoded["custom_id"], json!("ticket_claim"));
        assert!(encoded.get("components").is_none());
        assert!(encoded.get("options").is_none());
    }
}
