//! Bounded-wait plumbing for modal form submissions.
//!
//! Opening a modal registers its custom id with the broker; the gateway
//! dispatcher completes the matching entry when the submit interaction
//! arrives. The opener awaits a `Result<FormSubmission, FormTimeout>` instead
//! of polling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::types::{Interaction, User};

#[derive(Debug, Error)]
#[error("form submission wait timed out")]
pub struct FormTimeout;

/// A completed modal: the submit interaction's identifiers (for follow-ups)
/// plus its text-input values keyed by field custom id.
#[derive(Debug)]
pub struct FormSubmission {
    pub interaction_id: String,
    pub token: String,
    pub user: Option<User>,
    pub fields: HashMap<String, String>,
}

impl FormSubmission {
    pub fn from_interaction(interaction: &Interaction) -> Self {
        let fields = interaction
            .data
            .as_ref()
            .map(|data| data.text_input_values().into_iter().collect())
            .unwrap_or_default();
        Self {
            interaction_id: interaction.id.clone(),
            token: interaction.token.clone(),
            user: interaction.actor().cloned(),
            fields,
        }
    }

    /// Field value with surrounding whitespace trimmed; empty becomes `None`.
    pub fn field(&self, custom_id: &str) -> Option<&str> {
        self.fields
            .get(custom_id)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Clone, Default)]
pub struct FormBroker {
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<FormSubmission>>>>,
}

impl FormBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending form and returns the handle to await it on.
    /// Re-registering the same custom id replaces the previous waiter, whose
    /// wait then resolves as timed out.
    pub fn open(&self, custom_id: &str) -> FormWait {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(custom_id.to_string(), tx);
        }
        FormWait {
            broker: self.clone(),
            custom_id: custom_id.to_string(),
            rx,
        }
    }

    /// Routes a modal submit to its waiter. Returns false when nothing was
    /// waiting (expired or unknown form).
    pub fn complete(&self, custom_id: &str, submission: FormSubmission) -> bool {
        let sender = match self.pending.lock() {
            Ok(mut pending) => pending.remove(custom_id),
            Err(_) => None,
        };
        match sender {
            Some(sender) => sender.send(submission).is_ok(),
            None => false,
        }
    }

    fn forget(&self, custom_id: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(custom_id);
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }
}

pub struct FormWait {
    broker: FormBroker,
    custom_id: String,
    rx: oneshot::Receiver<FormSubmission>,
}

impl FormWait {
    /// Waits for the submission, unregistering the form on timeout so a
    /// late submit is dropped rather than routed to a dead waiter.
    pub async fn wait(self, timeout: Duration) -> Result<FormSubmission, FormTimeout> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(submission)) => Ok(submission),
            Ok(Err(_closed)) => Err(FormTimeout),
            Err(_elapsed) => {
                self.broker.forget(&self.custom_id);
                Err(FormTimeout)
            }
        }
    }
}
