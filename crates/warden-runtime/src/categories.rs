//! The built-in ticket category registry.
//!
//! Categories are loaded once at startup; everything downstream (select menu
//! options, intake forms, channel prefixes, card colors) is derived from the
//! registry rather than hard-coded at the call sites.

use crate::render::colors;

/// One text input on a category's intake form. Discord caps a modal at five
/// rows, so categories carry at most four fields plus room to grow.
#[derive(Debug, Clone)]
pub struct IntakeField {
    pub label: String,
    pub required: bool,
    pub long: bool,
    pub placeholder: Option<String>,
}

impl IntakeField {
    fn new(label: &str, required: bool, long: bool, placeholder: Option<&str>) -> Self {
        Self {
            label: label.to_string(),
            required,
            long,
            placeholder: placeholder.map(ToOwned::to_owned),
        }
    }

    /// Custom id of this field inside the intake modal, by position.
    pub fn custom_id(index: usize) -> String {
        format!("field_{index}")
    }
}

#[derive(Debug, Clone)]
pub struct TicketCategory {
    /// Stable key; also the ticket channel name prefix.
    pub key: String,
    pub icon: String,
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<IntakeField>,
}

impl TicketCategory {
    /// Menu label, icon plus title.
    pub fn label(&self) -> String {
        format!("{} {}", self.icon, self.title)
    }
}

#[derive(Debug)]
pub struct CategoryRegistry {
    categories: Vec<TicketCategory>,
}

impl CategoryRegistry {
    pub fn builtin() -> Self {
        Self {
            categories: builtin_categories(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&TicketCategory> {
        self.categories.iter().find(|category| category.key == key)
    }

    /// Resolves a key, falling back to a generic intake category so an
    /// unrecognized selection still produces a usable ticket.
    pub fn get_or_fallback(&self, key: &str) -> TicketCategory {
        self.get(key).cloned().unwrap_or_else(|| fallback_category(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TicketCategory> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Category used when a selection arrives with a key the registry does not
/// know: one generic description field, neutral color.
pub fn fallback_category(key: &str) -> TicketCategory {
    TicketCategory {
        key: key.to_string(),
        icon: "🎫".to_string(),
        title: "Support".to_string(),
        description: "General support request".to_string(),
        color: colors::PRIMARY,
        fields: vec![IntakeField::new(
            "Describe your request",
            true,
            true,
            Some("Tell the staff what you need"),
        )],
    }
}

fn builtin_categories() -> Vec<TicketCategory> {
    let roblox_name = || {
        IntakeField::new(
            "Your Roblox username",
            true,
            false,
            Some("Exact in-game name"),
        )
    };
    let optional_proof = || {
        IntakeField::new(
            "Proof link (optional)",
            false,
            false,
            Some("Screenshot or video link"),
        )
    };

    vec![
        TicketCategory {
            key: "general_help".to_string(),
            icon: "🆘".to_string(),
            title: "General Help".to_string(),
            description: "Questions and problems that fit nowhere else".to_string(),
            color: colors::PRIMARY,
            fields: vec![
                roblox_name(),
                IntakeField::new("Describe your issue", true, true, None),
            ],
        },
        TicketCategory {
            key: "municipality".to_string(),
            icon: "🏛️".to_string(),
            title: "Municipality".to_string(),
            description: "Civil procedures: licenses, registrations, permits".to_string(),
            color: colors::MUNICIPALITY,
            fields: vec![
                roblox_name(),
                IntakeField::new("What procedure do you need?", true, true, None),
                IntakeField::new("Additional details", false, true, None),
            ],
        },
        TicketCategory {
            key: "purchases".to_string(),
            icon: "🛒".to_string(),
            title: "Purchases".to_string(),
            description: "Store orders and payment issues".to_string(),
            color: colors::SUCCESS,
            fields: vec![
                roblox_name(),
                IntakeField::new("Reason for the ticket", true, true, None),
                IntakeField::new(
                    "Payment receipt link (optional)",
                    false,
                    false,
                    Some("Link to the receipt"),
                ),
            ],
        },
        TicketCategory {
            key: "benefits".to_string(),
            icon: "🎁".to_string(),
            title: "Benefits".to_string(),
            description: "Claim booster or supporter perks".to_string(),
            color: colors::INFO,
            fields: vec![
                roblox_name(),
                IntakeField::new("Benefits to claim", true, true, None),
                optional_proof(),
            ],
        },
        TicketCategory {
            key: "alliances".to_string(),
            icon: "🤝".to_string(),
            title: "Alliances".to_string(),
            description: "Partnership requests from other communities".to_string(),
            color: colors::LEGAL,
            fields: vec![
                IntakeField::new("Server name", true, false, None),
                IntakeField::new("Owner's Discord name", true, false, None),
                IntakeField::new("Server link", true, false, Some("Permanent invite link")),
            ],
        },
        TicketCategory {
            key: "doubts".to_string(),
            icon: "❓".to_string(),
            title: "Doubts".to_string(),
            description: "Questions about rules or how things work".to_string(),
            color: colors::PRIMARY,
            fields: vec![
                roblox_name(),
                IntakeField::new("Describe your question", true, true, None),
            ],
        },
        TicketCategory {
            key: "appeals".to_string(),
            icon: "⚖️".to_string(),
            title: "Appeals".to_string(),
            description: "Appeal a sanction, warning or ban".to_string(),
            color: colors::APPEALS,
            fields: vec![
                roblox_name(),
                IntakeField::new("Appeal type", true, false, Some("Warning, ban, CK...")),
                IntakeField::new("Appeal reason", true, true, None),
                optional_proof(),
            ],
        },
        TicketCategory {
            key: "reports".to_string(),
            icon: "🚨".to_string(),
            title: "Reports".to_string(),
            description: "Report a user or staff member".to_string(),
            color: colors::REPORTS,
            fields: vec![
                IntakeField::new("Name of the person to report", true, false, None),
                IntakeField::new("Report type", true, false, Some("User, staff, exploit...")),
                IntakeField::new("Report reason", true, true, None),
                optional_proof(),
            ],
        },
        TicketCategory {
            key: "illegal_faction".to_string(),
            icon: "🕵️".to_string(),
            title: "Illegal Faction".to_string(),
            description: "Register an illegal faction".to_string(),
            color: colors::ILLEGAL,
            fields: vec![
                roblox_name(),
                IntakeField::new("Faction description", true, true, None),
                IntakeField::new("Faction Discord link", true, false, None),
            ],
        },
        TicketCategory {
            key: "robbery_claim".to_string(),
            icon: "💰".to_string(),
            title: "Robbery Claim".to_string(),
            description: "Claim losses after an in-game robbery".to_string(),
            color: colors::WARNING,
            fields: vec![
                roblox_name(),
                IntakeField::new("People involved", true, true, None),
                optional_proof(),
            ],
        },
        TicketCategory {
            key: "business_creation".to_string(),
            icon: "🏢".to_string(),
            title: "Business Creation".to_string(),
            description: "Found a legal in-game business".to_string(),
            color: colors::LEGAL,
            fields: vec![
                IntakeField::new("Owner Roblox username(s)", true, true, None),
                IntakeField::new("Business description", true, true, None),
                IntakeField::new("Business type", true, false, None),
                IntakeField::new("Business Discord link", true, false, None),
            ],
        },
        TicketCategory {
            key: "ck_request".to_string(),
            icon: "💀".to_string(),
            title: "CK Request".to_string(),
            description: "Request a character kill on another player".to_string(),
            color: colors::DANGER,
            fields: vec![
                IntakeField::new("Name of the CK target", true, false, None),
                IntakeField::new("CK reason", true, true, None),
                IntakeField::new("Proof link", true, false, Some("Evidence is mandatory")),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_holds_twelve_categories_with_unique_keys() {
        let registry = CategoryRegistry::builtin();
        assert_eq!(registry.len(), 12);
        let mut keys: Vec<&str> = registry.iter().map(|c| c.key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 12);
    }

    #[test]
    fn every_category_fits_in_a_modal() {
        for category in CategoryRegistry::builtin().iter() {
            assert!(!category.fields.is_empty(), "{} has no fields", category.key);
            assert!(
                category.fields.len() <= 5,
                "{} exceeds the modal row limit",
                category.key
            );
            assert!(
                category.fields.iter().any(|field| field.required),
                "{} has no required field",
                category.key
            );
        }
    }

    #[test]
    fn unknown_keys_resolve_to_the_fallback_category() {
        let registry = CategoryRegistry::builtin();
        let resolved = registry.get_or_fallback("definitely_not_a_category");
        assert_eq!(resolved.key, "definitely_not_a_category");
        assert_eq!(resolved.fields.len(), 1);
        assert!(resolved.fields[0].required);
    }

    #[test]
    fn known_keys_resolve_to_their_own_definition() {
        let registry = CategoryRegistry::builtin();
        let appeals = registry.get_or_fallback("appeals");
        assert_eq!(appeals.title, "Appeals");
        assert_eq!(appeals.fields.len(), 4);
    }
}
