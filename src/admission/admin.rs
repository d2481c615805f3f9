//! Operator decision channel for pending access requests.
//!
//! Presents a pending request to the operator principal with bound
//! approve/deny actions and applies the validated decision to the registry.
//! A decision against an already-resolved request is a safe no-op reported
//! as "no effect", never an error.

use std::sync::Arc;

use tracing::{error, info};

use super::csrf::CsrfGuard;
use super::registry::AccessRegistry;
use super::PrincipalId;
use crate::display::{ActionButton, DisplayLayer};

pub const APPROVE_ACTION_PREFIX: &str = "approve_";
pub const DENY_ACTION_PREFIX: &str = "deny_";
pub const REVOKE_ACTION_PREFIX: &str = "rm_";

const UNKNOWN_DISPLAY_NAME: &str = "unknown";

/// An operator's choice for a pending request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny,
}

/// What a decision actually did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionOutcome {
    Applied,
    /// The request was already resolved (duplicate decision race).
    NoEffect,
}

/// Bridge between the registry and the operator's interactive session.
pub struct AdminChannel {
    operator: PrincipalId,
    registry: Arc<AccessRegistry>,
    csrf: Arc<CsrfGuard>,
    display: Arc<dyn DisplayLayer>,
}

impl AdminChannel {
    #[must_use]
    pub fn new(
        operator: PrincipalId,
        registry: Arc<AccessRegistry>,
        csrf: Arc<CsrfGuard>,
        display: Arc<dyn DisplayLayer>,
    ) -> Self {
        Self {
            operator,
            registry,
            csrf,
            display,
        }
    }

    #[must_use]
    pub const fn operator(&self) -> PrincipalId {
        self.operator
    }

    /// Show a new pending request to the operator with bound
    /// approve/deny actions.
    pub fn present_request(&self, principal: PrincipalId, display_name: &str) {
        let approve = self
            .csrf
            .bind(self.operator, &format!("{APPROVE_ACTION_PREFIX}{principal}"));
        let deny = self
            .csrf
            .bind(self.operator, &format!("{DENY_ACTION_PREFIX}{principal}"));
        let text = format!("New access request from {display_name} (id {principal}). Approve?");
        let buttons = [
            ActionButton::new("Approve", approve),
            ActionButton::new("Deny", deny),
        ];
        if let Err(err) = self.display.send_prompt(self.operator, &text, &buttons) {
            error!(principal, "failed to present access request: {err}");
        }
    }

    /// Show the approved roster to the operator with bound revoke actions.
    pub fn present_roster(&self) {
        let users = self.registry.list_approved();
        if users.is_empty() {
            self.tell_operator("No approved principals.");
            return;
        }
        let buttons: Vec<ActionButton> = users
            .iter()
            .map(|user| {
                let action = self
                    .csrf
                    .bind(self.operator, &format!("{REVOKE_ACTION_PREFIX}{}", user.id));
                ActionButton::new(
                    format!("Revoke {} ({})", user.display_name, user.id),
                    action,
                )
            })
            .collect();
        if let Err(err) = self
            .display
            .send_prompt(self.operator, "Approved principals", &buttons)
        {
            error!("failed to present roster: {err}");
        }
    }

    /// Apply a validated operator decision for `target`.
    pub fn decide(&self, decision: Decision, target: PrincipalId) -> DecisionOutcome {
        let display_name = self
            .registry
            .list_pending()
            .into_iter()
            .find(|request| request.id == target)
            .map_or_else(|| UNKNOWN_DISPLAY_NAME.to_string(), |request| request.display_name);

        match decision {
            Decision::Approve => {
                if self.registry.approve(target, &display_name) {
                    info!(operator = self.operator, target, "operator approved request");
                    self.tell_operator(&format!("Access granted to {display_name}."));
                    self.tell_requester(target, "Your access request was approved.");
                    DecisionOutcome::Applied
                } else {
                    self.tell_operator("Request already resolved; no effect.");
                    DecisionOutcome::NoEffect
                }
            }
            Decision::Deny => {
                if self.registry.deny(target, &display_name) {
                    info!(operator = self.operator, target, "operator denied request");
                    self.tell_operator(&format!("Access denied for {display_name}."));
                    self.tell_requester(target, "Your access request was denied.");
                    DecisionOutcome::Applied
                } else {
                    self.tell_operator("Request already resolved; no effect.");
                    DecisionOutcome::NoEffect
                }
            }
        }
    }

    /// Revoke an approved principal's access.
    pub fn revoke(&self, target: PrincipalId) -> DecisionOutcome {
        if self.registry.revoke(target) {
            info!(operator = self.operator, target, "operator revoked access");
            self.tell_operator(&format!("Access revoked for id {target}."));
            self.tell_requester(target, "Your access has been revoked.");
            DecisionOutcome::Applied
        } else {
            self.tell_operator("Principal was not approved; no effect.");
            DecisionOutcome::NoEffect
        }
    }

    fn tell_operator(&self, text: &str) {
        if let Err(err) = self.display.send_text(self.operator, text) {
            error!("failed to notify operator: {err}");
        }
    }

    fn tell_requester(&self, target: PrincipalId, text: &str) {
        if let Err(err) = self.display.send_text(target, text) {
            error!(target, "failed to notify requester: {err}");
        }
    }
}
