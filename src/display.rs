//! Display-layer collaborator contract.
//!
//! The display layer renders messages and interactive buttons and relays the
//! action a user picked back to the gate as an opaque string. Button actions
//! are always bound strings produced by the CSRF guard; the display never
//! inspects them.

use anyhow::Result;
use tracing::info;

use crate::admission::PrincipalId;
use crate::credstore::CredentialEntry;

/// An interactive button: a label and the opaque action it fires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionButton {
    pub label: String,
    pub action: String,
}

impl ActionButton {
    #[must_use]
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// Outbound rendering surface.
pub trait DisplayLayer: Send + Sync {
    /// Deliver a plain text message to a principal.
    ///
    /// # Errors
    /// Returns an error if the message cannot be delivered.
    fn send_text(&self, principal: PrincipalId, text: &str) -> Result<()>;

    /// Deliver a message with interactive buttons.
    ///
    /// # Errors
    /// Returns an error if the message cannot be delivered.
    fn send_prompt(
        &self,
        principal: PrincipalId,
        text: &str,
        buttons: &[ActionButton],
    ) -> Result<()>;

    /// Deliver credential entries; formatting and pagination are the
    /// display's concern, not the gate's.
    ///
    /// # Errors
    /// Returns an error if the entries cannot be delivered.
    fn send_entries(&self, principal: PrincipalId, entries: &[CredentialEntry]) -> Result<()>;
}

/// Dev display that writes everything to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogDisplay;

impl DisplayLayer for LogDisplay {
    fn send_text(&self, principal: PrincipalId, text: &str) -> Result<()> {
        info!(principal, text, "display text");
        Ok(())
    }

    fn send_prompt(
        &self,
        principal: PrincipalId,
        text: &str,
        buttons: &[ActionButton],
    ) -> Result<()> {
        let labels: Vec<&str> = buttons.iter().map(|b| b.label.as_str()).collect();
        info!(principal, text, buttons = ?labels, "display prompt");
        Ok(())
    }

    fn send_entries(&self, principal: PrincipalId, entries: &[CredentialEntry]) -> Result<()> {
        info!(principal, count = entries.len(), "display entries");
        Ok(())
    }
}
