//! Typed action identifiers for UI controls and the router's visual
//! busy/restore transforms.
//!
//! Control custom ids are only a wire encoding; routing happens on the
//! `Action` enum.

use warden_discord::types::{
    Component, GuildMember, BUTTON_STYLE_SECONDARY, COMPONENT_BUTTON,
};

/// Every control the router knows how to dispatch. Anything else falls
/// through to the platform default (ignored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    TicketClaim,
    TicketClose,
    TicketAddUser,
    StatusOpen,
    StatusVote,
    StatusClose,
    CategorySelect,
}

impl Action {
    pub const fn custom_id(self) -> &'static str {
        match self {
            Self::TicketClaim => "ticket_claim",
            Self::TicketClose => "ticket_close",
            Self::TicketAddUser => "ticket_add_user",
            Self::StatusOpen => "status_open",
            Self::StatusVote => "status_vote",
            Self::StatusClose => "status_close",
            Self::CategorySelect => "ticket_category",
        }
    }

    pub fn parse(custom_id: &str) -> Option<Self> {
        match custom_id {
            "ticket_claim" => Some(Self::TicketClaim),
            "ticket_close" => Some(Self::TicketClose),
            "ticket_add_user" => Some(Self::TicketAddUser),
            "status_open" => Some(Self::StatusOpen),
            "status_vote" => Some(Self::StatusVote),
            "status_close" => Some(Self::StatusClose),
            "ticket_category" => Some(Self::CategorySelect),
            _ => None,
        }
    }
}

/// Builds a modal custom id carrying a per-invocation nonce so concurrent
/// forms never collide in the broker.
pub fn modal_custom_id(prefix: &str, nonce: u64) -> String {
    format!("{prefix}:{nonce}")
}

/// True when the acting member holds at least one staff role.
pub fn is_staff(member: Option<&GuildMember>, staff_role_ids: &[String]) -> bool {
    member
        .map(|member| member.has_any_role(staff_role_ids))
        .unwrap_or(false)
}

/// Returns a copy of `components` with the pressed button put into its
/// transient processing state: disabled, relabeled, emoji stripped.
pub fn mark_component_busy(components: &[Component], custom_id: &str) -> Vec<Component> {
    components
        .iter()
        .map(|row| {
            let mut row = row.clone();
            for child in &mut row.components {
                if child.kind == COMPONENT_BUTTON && child.custom_id.as_deref() == Some(custom_id) {
                    child.disabled = Some(true);
                    child.label = Some("⌛ Processing...".to_string());
                    child.emoji = None;
                    child.style = Some(BUTTON_STYLE_SECONDARY);
                }
            }
            row
        })
        .collect()
}
