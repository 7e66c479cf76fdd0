//! Embed and component builders for everything Warden posts.
//!
//! Keeping presentation in one module means the engines deal purely in
//! state; tests assert on the structures built here instead of on JSON.

use chrono::{SecondsFormat, Utc};

use warden_discord::types::{
    Component, Embed, SelectOption, BUTTON_STYLE_DANGER, BUTTON_STYLE_PRIMARY,
    BUTTON_STYLE_SECONDARY, BUTTON_STYLE_SUCCESS,
};
use warden_ledger::WarningRecord;

use crate::actions::Action;
use crate::categories::{CategoryRegistry, TicketCategory};

/// Brand palette. Category cards use per-category colors from the registry.
pub mod colors {
    pub const PRIMARY: u32 = 0x5865F2;
    pub const SUCCESS: u32 = 0x57F287;
    pub const WARNING: u32 = 0xFEE75C;
    pub const DANGER: u32 = 0xED4245;
    pub const INFO: u32 = 0xEB459E;
    pub const MUNICIPALITY: u32 = 0xF1C40F;
    pub const ILLEGAL: u32 = 0x992D22;
    pub const LEGAL: u32 = 0x1ABC9C;
    pub const APPEALS: u32 = 0xE67E22;
    pub const REPORTS: u32 = 0xE74C3C;
}

/// Placeholder rendered for omitted optional intake fields.
pub const NOT_SPECIFIED: &str = "Not specified";

/// Name of the embed field that marks a ticket card as claimed. The claim
/// fallback check keys on this exact string.
pub const CLAIM_FIELD_NAME: &str = "🛎️ Handled by";

/// Embed field cap imposed by Discord.
const MAX_EMBED_FIELDS: usize = 25;

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The pinned summary card posted into a fresh ticket channel. `values` are
/// the intake answers in form order.
pub fn ticket_card(
    category: &TicketCategory,
    requester_mention: &str,
    values: &[(String, Option<String>)],
    community: &str,
) -> Embed {
    let mut embed = Embed::new()
        .title(format!("{} {} Ticket", category.icon, category.title))
        .description(category.description.clone())
        .color(category.color)
        .field("👤 Requested by", requester_mention, true);
    for (label, value) in values {
        embed = embed.field(
            label.clone(),
            value.as_deref().unwrap_or(NOT_SPECIFIED),
            false,
        );
    }
    embed
        .footer(format!("{community} tickets"))
        .timestamp(now_timestamp())
}

pub fn ticket_actions_row() -> Component {
    Component::action_row(vec![
        Component::button(
            BUTTON_STYLE_SUCCESS,
            "Claim",
            Some("🛎️"),
            Action::TicketClaim.custom_id(),
        ),
        Component::button(
            BUTTON_STYLE_DANGER,
            "Close",
            Some("🔒"),
            Action::TicketClose.custom_id(),
        ),
        Component::button(
            BUTTON_STYLE_PRIMARY,
            "Add User",
            Some("➕"),
            Action::TicketAddUser.custom_id(),
        ),
    ])
}

/// Same row after a claim: the claim button stays visible but inert.
pub fn claimed_actions_row() -> Component {
    let mut row = ticket_actions_row();
    for child in &mut row.components {
        if child.custom_id.as_deref() == Some(Action::TicketClaim.custom_id()) {
            child.disabled = Some(true);
            child.label = Some("Claimed".to_string());
            child.style = Some(BUTTON_STYLE_SECONDARY);
        }
    }
    row
}

pub fn category_select_row(registry: &CategoryRegistry) -> Component {
    let options = registry
        .iter()
        .map(|category| SelectOption {
            label: category.title.clone(),
            value: category.key.clone(),
            description: Some(category.description.clone()),
            emoji: Some(warden_discord::types::PartialEmoji {
                name: category.icon.clone(),
            }),
        })
        .collect();
    Component::string_select(
        Action::CategorySelect.custom_id(),
        "Choose a ticket category...",
        options,
    )
}

pub fn ticket_menu_embed(registry: &CategoryRegistry, community: &str) -> Embed {
    let listing = registry
        .iter()
        .map(|category| format!("{} **{}** — {}", category.icon, category.title, category.description))
        .collect::<Vec<_>>()
        .join("\n");
    Embed::new()
        .title("🎫 Open a Ticket")
        .description(format!(
            "Pick a category below and fill in the form. Staff will get back to you in a private channel.\n\n{listing}"
        ))
        .color(colors::PRIMARY)
        .footer(format!("{community} tickets"))
}

pub fn control_panel_embed(community: &str) -> Embed {
    Embed::new()
        .title("🛠️ Server Control Panel")
        .description(
            "Staff controls for the community status.\n\n\
             🟢 **Open** announces the server as open.\n\
             🗳️ **Start Vote** opens a start vote.\n\
             🔴 **Close** announces the server as closed.",
        )
        .color(colors::PRIMARY)
        .footer(community.to_string())
}

pub fn control_panel_row() -> Component {
    Component::action_row(vec![
        Component::button(
            BUTTON_STYLE_SUCCESS,
            "Open",
            Some("🟢"),
            Action::StatusOpen.custom_id(),
        ),
        Component::button(
            BUTTON_STYLE_PRIMARY,
            "Start Vote",
            Some("🗳️"),
            Action::StatusVote.custom_id(),
        ),
        Component::button(
            BUTTON_STYLE_DANGER,
            "Close",
            Some("🔴"),
            Action::StatusClose.custom_id(),
        ),
    ])
}

pub fn open_announcement(community: &str) -> Embed {
    Embed::new()
        .title("🟢 Server Open")
        .description(format!(
            "**{community}** is now open!\n\nJoin the game and follow the staff's instructions. Have fun!"
        ))
        .color(colors::SUCCESS)
        .footer(community.to_string())
        .timestamp(now_timestamp())
}

pub fn closed_announcement(community: &str, reason: &str) -> Embed {
    Embed::new()
        .title("🔴 Server Closed")
        .description(format!("**{community}** is now closed."))
        .color(colors::DANGER)
        .field("📋 Reason", reason, false)
        .footer(community.to_string())
        .timestamp(now_timestamp())
}

pub fn voting_announcement(community: &str, votes_required: &str, authorized_by: &str) -> Embed {
    Embed::new()
        .title("🗳️ Start Vote")
        .description(format!(
            "A vote to open **{community}** has started. React below to cast your vote!"
        ))
        .color(colors::WARNING)
        .field("✅ Votes required", votes_required, true)
        .field("👮 Authorized by", authorized_by, true)
        .footer(community.to_string())
        .timestamp(now_timestamp())
}

/// Mirrored entry posted to the log channel for every broadcast.
pub fn announcement_log(action: &str, actor_mention: &str) -> Embed {
    Embed::new()
        .title(format!("📢 {action}"))
        .description(format!("Performed by {actor_mention}"))
        .color(colors::INFO)
        .timestamp(now_timestamp())
}

pub fn ticket_created_log(
    category: &TicketCategory,
    channel_mention: &str,
    requester_mention: &str,
) -> Embed {
    Embed::new()
        .title("🎫 Ticket Created")
        .color(category.color)
        .field("Category", category.label(), true)
        .field("Channel", channel_mention, true)
        .field("Requested by", requester_mention, true)
        .timestamp(now_timestamp())
}

pub fn ticket_closed_log(channel_name: &str, reason: &str, closer_mention: &str) -> Embed {
    Embed::new()
        .title("🔒 Ticket Closed")
        .color(colors::DANGER)
        .field("Channel", format!("#{channel_name}"), true)
        .field("Closed by", closer_mention, true)
        .field("📋 Reason", reason, false)
        .timestamp(now_timestamp())
}

pub fn ticket_closing_notice(reason: &str, closer_mention: &str, grace_secs: u64) -> Embed {
    Embed::new()
        .title("🔒 Ticket Closing")
        .description(format!(
            "This channel will be deleted in {grace_secs} seconds."
        ))
        .color(colors::DANGER)
        .field("Closed by", closer_mention, true)
        .field("📋 Reason", reason, false)
        .timestamp(now_timestamp())
}

pub fn ticket_claimed_notice(claimer_mention: &str) -> Embed {
    Embed::new()
        .title("🛎️ Ticket Claimed")
        .description(format!("{claimer_mention} will handle this ticket."))
        .color(colors::SUCCESS)
        .timestamp(now_timestamp())
}

pub fn participant_added_notice(user_mention: &str, actor_mention: &str) -> Embed {
    Embed::new()
        .title("➕ User Added")
        .description(format!(
            "{user_mention} was added to this ticket by {actor_mention}."
        ))
        .color(colors::PRIMARY)
        .timestamp(now_timestamp())
}

/// The public warning embed. `record_id` is present only once the ledger
/// write has succeeded; the announcement itself never waits on it.
pub fn warning_issued(
    target_mention: &str,
    admin_name: &str,
    reason: &str,
    proof_url: Option<&str>,
    record_id: Option<i64>,
) -> Embed {
    let mut embed = Embed::new()
        .title("⚠️ Warning Issued")
        .color(colors::WARNING)
        .field("User", target_mention, true)
        .field("By", admin_name, true)
        .field("📋 Reason", reason, false);
    if let Some(proof) = proof_url {
        embed = embed.field("🔗 Proof", proof, false);
    }
    if let Some(id) = record_id {
        embed = embed.footer(format!("Warning #{id}"));
    }
    embed.timestamp(now_timestamp())
}

pub fn warning_dm(community: &str, reason: &str, admin_name: &str, proof_url: Option<&str>) -> Embed {
    let mut embed = Embed::new()
        .title("⚠️ You received a warning")
        .description(format!(
            "A staff member of **{community}** has issued you a warning."
        ))
        .color(colors::WARNING)
        .field("📋 Reason", reason, false)
        .field("By", admin_name, true);
    if let Some(proof) = proof_url {
        embed = embed.field("🔗 Proof", proof, false);
    }
    embed.timestamp(now_timestamp())
}

/// Full disciplinary history for one user, newest first. Discord caps embeds
/// at 25 fields, so longer histories are truncated with a footer note.
pub fn warning_history(target_name: &str, records: &[WarningRecord]) -> Embed {
    let mut embed = Embed::new()
        .title(format!("📜 Warning history for {target_name}"))
        .color(colors::WARNING);
    for record in records.iter().take(MAX_EMBED_FIELDS) {
        let mut value = format!(
            "**Reason:** {}\n**By:** {}\n**Date:** <t:{}:f>",
            record.reason,
            record.admin_name,
            record.created_at.timestamp()
        );
        if let Some(proof) = &record.proof_url {
            value.push_str(&format!("\n**Proof:** {proof}"));
        }
        embed = embed.field(format!("⚠️ Warning #{}", record.id), value, false);
    }
    let footer = if records.len() > MAX_EMBED_FIELDS {
        format!(
            "{} warnings in total, showing the {} most recent",
            records.len(),
            MAX_EMBED_FIELDS
        )
    } else {
        format!("{} warning(s) in total", records.len())
    };
    embed.footer(footer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: i64, proof: Option<&str>) -> WarningRecord {
        WarningRecord {
            id,
            user_id: "U1".to_string(),
            user_name: "target".to_string(),
            admin_id: "A1".to_string(),
            admin_name: "admin".to_string(),
            reason: "spamming".to_string(),
            proof_url: proof.map(ToOwned::to_owned),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn ticket_card_renders_missing_optionals_as_not_specified() {
        let registry = CategoryRegistry::builtin();
        let category = registry.get("purchases").expect("category");
        let values = vec![
            ("Your Roblox username".to_string(), Some("builder".to_string())),
            ("Reason for the ticket".to_string(), Some("refund".to_string())),
            ("Payment receipt link (optional)".to_string(), None),
        ];
        let card = ticket_card(category, "<@U1>", &values, "Example RP");
        assert_eq!(card.color, Some(colors::SUCCESS));
        assert_eq!(card.fields.len(), 4);
        assert_eq!(card.fields[3].value, NOT_SPECIFIED);
        assert!(!card.has_field(CLAIM_FIELD_NAME));
    }

    #[test]
    fn claimed_row_disables_only_the_claim_button() {
        let row = claimed_actions_row();
        let claim = &row.components[0];
        assert_eq!(claim.disabled, Some(true));
        assert_eq!(claim.label.as_deref(), Some("Claimed"));
        assert_eq!(row.components[1].disabled, None);
        assert_eq!(row.components[2].disabled, None);
    }

    #[test]
    fn category_select_offers_every_registry_entry() {
        let registry = CategoryRegistry::builtin();
        let select = category_select_row(&registry);
        assert_eq!(select.options.len(), registry.len());
        assert!(select
            .options
            .iter()
            .any(|option| option.value == "ck_request"));
    }

    #[test]
    fn warning_history_truncates_at_the_embed_field_cap() {
        let records: Vec<WarningRecord> = (1..=30).map(|id| record(id, None)).collect();
        let embed = warning_history("target", &records);
        assert_eq!(embed.fields.len(), MAX_EMBED_FIELDS);
        assert!(embed
            .footer
            .as_ref()
            .is_some_and(|footer| footer.text.contains("30 warnings")));
    }

    #[test]
    fn warning_embeds_include_proof_only_when_present() {
        let with_proof = warning_issued(
            "<@U1>",
            "admin",
            "spamming",
            Some("https://proof.example"),
            Some(1),
        );
        assert!(with_proof.has_field("🔗 Proof"));
        assert!(with_proof
            .footer
            .as_ref()
            .is_some_and(|footer| footer.text == "Warning #1"));
        let without = warning_issued("<@U1>", "admin", "spamming", None, None);
        assert!(!without.has_field("🔗 Proof"));
        assert!(without.footer.is_none());
    }

    #[test]
    fn history_fields_embed_reason_author_and_proof() {
        let embed = warning_history("target", &[record(7, Some("https://proof.example"))]);
        assert_eq!(embed.fields.len(), 1);
        assert_eq!(embed.fields[0].name, "⚠️ Warning #7");
        assert!(embed.fields[0].value.contains("**Reason:** spamming"));
        assert!(embed.fields[0].value.contains("https://proof.example"));
    }
}
