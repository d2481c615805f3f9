//! Multi-step admission gate in front of the credential service.
//!
//! Every principal walks the same ladder: shared gate secret, emailed
//! second-factor code, then an explicit operator decision. Only approved
//! principals reach the credential-lookup surface. All inbound traffic is
//! length-checked and rate-limited before any state machine transition, and
//! interactive operator actions are only honored when their forgery token
//! validates.

pub mod admin;
pub mod csrf;
pub mod rate_limit;
pub mod registry;
pub mod second_factor;

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::credstore::{CredentialEntry, CredentialStore};
use crate::display::DisplayLayer;
use crate::validate;

use admin::{AdminChannel, Decision, APPROVE_ACTION_PREFIX, DENY_ACTION_PREFIX, REVOKE_ACTION_PREFIX};
use csrf::CsrfGuard;
use rate_limit::{RateCategory, RateDecision, RateLimiter};
use registry::AccessRegistry;
use second_factor::{SecondFactorIssuer, VerifyOutcome};

/// Stable principal identifier assigned by the display layer.
pub type PrincipalId = i64;

pub const RESEND_COMMAND: &str = "/resend";
pub const ROSTER_COMMAND: &str = "/admin";
pub const RECONNECT_COMMAND: &str = "/reconnect";
pub const GROUP_QUERY_PREFIX: &str = "group ";

/// Where an unapproved principal stands on the admission ladder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing seen yet; the first message arms the gate prompt.
    #[default]
    Unverified,
    /// The next text is treated as a gate-secret attempt.
    GatePending,
    /// A second-factor challenge is outstanding.
    SecondFactorPending,
    /// Verified both factors; waiting on the operator.
    AdminPending,
}

/// One inbound event from the display layer.
#[derive(Clone, Debug)]
pub enum InboundEvent {
    /// A plain text message.
    Text {
        principal: PrincipalId,
        display_name: String,
        text: String,
    },
    /// A pressed button; `data` is the bound action string as sent out.
    Action {
        principal: PrincipalId,
        display_name: String,
        data: String,
    },
}

impl InboundEvent {
    #[must_use]
    pub const fn principal(&self) -> PrincipalId {
        match self {
            Self::Text { principal, .. } | Self::Action { principal, .. } => *principal,
        }
    }
}

/// The admission state machine and post-admission router.
pub struct AdmissionGate {
    gate_secret: SecretString,
    rate: RateLimiter,
    second_factor: SecondFactorIssuer,
    csrf: Arc<CsrfGuard>,
    registry: Arc<AccessRegistry>,
    admin: AdminChannel,
    display: Arc<dyn DisplayLayer>,
    credentials: Arc<dyn CredentialStore>,
    sessions: StdMutex<HashMap<PrincipalId, SessionState>>,
    locks: StdMutex<HashMap<PrincipalId, Arc<tokio::sync::Mutex<()>>>>,
}

impl AdmissionGate {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        gate_secret: SecretString,
        rate: RateLimiter,
        second_factor: SecondFactorIssuer,
        csrf: Arc<CsrfGuard>,
        registry: Arc<AccessRegistry>,
        admin: AdminChannel,
        display: Arc<dyn DisplayLayer>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            gate_secret,
            rate,
            second_factor,
            csrf,
            registry,
            admin,
            display,
            credentials,
            sessions: StdMutex::new(HashMap::new()),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Consume events until the channel closes, handling each on its own task.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<InboundEvent>) {
        while let Some(event) = events.recv().await {
            let gate = Arc::clone(&self);
            tokio::spawn(async move {
                gate.dispatch(event).await;
            });
        }
        info!("event channel closed, admission gate stopping");
    }

    /// Handle one event under the principal's lock so concurrent messages
    /// from the same principal observe transitions in order.
    pub async fn dispatch(&self, event: InboundEvent) {
        let lock = self.principal_lock(event.principal());
        let _guard = lock.lock().await;
        match event {
            InboundEvent::Text {
                principal,
                display_name,
                text,
            } => self.handle_text(principal, &display_name, &text).await,
            InboundEvent::Action {
                principal, data, ..
            } => self.handle_action(principal, &data),
        }
    }

    async fn handle_text(&self, principal: PrincipalId, display_name: &str, text: &str) {
        if let Err(err) = validate::validate_message(text) {
            self.say(principal, &err.to_string());
            return;
        }

        match self.rate.check(principal, RateCategory::GeneralRequest) {
            RateDecision::Allowed { .. } => {}
            RateDecision::Limited {
                retry_after_seconds,
            } => {
                self.say(
                    principal,
                    &format!("Too many requests. Try again in {retry_after_seconds} seconds."),
                );
                return;
            }
        }

        // The operator never climbs the ladder; their commands route directly.
        if self.registry.is_approved(principal) || principal == self.admin.operator() {
            self.handle_member_text(principal, text).await;
            return;
        }

        match self.session_state(principal) {
            SessionState::Unverified => {
                self.set_session_state(principal, SessionState::GatePending);
                self.say(principal, "Please enter the access code.");
            }
            SessionState::GatePending => {
                self.handle_gate_secret(principal, display_name, text).await;
            }
            SessionState::SecondFactorPending => {
                self.handle_second_factor(principal, display_name, text)
                    .await;
            }
            SessionState::AdminPending => {
                if self.registry.has_pending(principal) {
                    self.say(principal, "Your request is waiting for review.");
                } else {
                    // The request was denied while we slept; restart the ladder.
                    self.set_session_state(principal, SessionState::GatePending);
                    self.say(principal, "Please enter the access code.");
                }
            }
        }
    }

    /// A text received while the session expects the gate secret.
    async fn handle_gate_secret(&self, principal: PrincipalId, display_name: &str, text: &str) {
        if let Err(err) = validate::validate_gate_secret(text) {
            self.say(principal, &err.to_string());
            return;
        }

        match self.rate.check(principal, RateCategory::GateSecret) {
            RateDecision::Allowed { .. } => {}
            RateDecision::Limited {
                retry_after_seconds,
            } => {
                self.say(
                    principal,
                    &format!(
                        "Too many access code attempts. Try again in {retry_after_seconds} seconds."
                    ),
                );
                return;
            }
        }

        if text != self.gate_secret.expose_secret() {
            warn!(principal, "wrong gate secret");
            self.say(principal, "Wrong access code.");
            return;
        }

        // A correct secret wipes the failed-attempt window.
        self.rate.reset(principal, RateCategory::GateSecret);
        self.set_session_state(principal, SessionState::SecondFactorPending);

        match self.second_factor.issue(principal, display_name).await {
            Ok(()) => {
                self.say(
                    principal,
                    "A verification code has been sent. Enter the 6-digit code, \
                     or send /resend for a new one.",
                );
            }
            Err(err) => {
                error!(principal, "failed to issue second factor: {err}");
                self.set_session_state(principal, SessionState::GatePending);
                self.say(
                    principal,
                    "Could not send the verification code. Enter the access code to try again.",
                );
            }
        }
    }

    /// A text received while a second-factor challenge is outstanding.
    async fn handle_second_factor(&self, principal: PrincipalId, display_name: &str, text: &str) {
        if text.trim() == RESEND_COMMAND {
            match self.second_factor.reissue(principal, display_name).await {
                Ok(()) => self.say(principal, "A new verification code has been sent."),
                Err(err) => {
                    error!(principal, "failed to reissue second factor: {err}");
                    self.say(principal, "Could not send a new code. Try /resend again later.");
                }
            }
            return;
        }

        if let Err(err) = validate::validate_code(text) {
            self.say(principal, &err.to_string());
            return;
        }

        match self.rate.check(principal, RateCategory::SecondFactor) {
            RateDecision::Allowed { .. } => {}
            RateDecision::Limited {
                retry_after_seconds,
            } => {
                self.say(
                    principal,
                    &format!(
                        "Too many verification attempts. Try again in {retry_after_seconds} seconds."
                    ),
                );
                return;
            }
        }

        match self.second_factor.verify(principal, text) {
            VerifyOutcome::Verified => {
                self.set_session_state(principal, SessionState::AdminPending);
                self.registry.request_access(principal, display_name);
                self.admin.present_request(principal, display_name);
                self.say(
                    principal,
                    "Code verified. Your access request has been sent for review.",
                );
            }
            VerifyOutcome::Mismatch { remaining_attempts } => {
                self.say(
                    principal,
                    &format!("Wrong code. Attempts left: {remaining_attempts}."),
                );
            }
            VerifyOutcome::NoChallenge | VerifyOutcome::Expired | VerifyOutcome::Exhausted => {
                self.set_session_state(principal, SessionState::Unverified);
                self.say(
                    principal,
                    "Verification failed. Send any message to start over.",
                );
            }
        }
    }

    /// A pressed button. The token check comes before everything else; a
    /// failed check mutates nothing and is surfaced as a security event.
    fn handle_action(&self, principal: PrincipalId, data: &str) {
        let action = match self.csrf.unbind(principal, data) {
            Ok(action) => action,
            Err(err) => {
                warn!(principal, %err, "rejected interactive action");
                self.say(principal, "Security check failed. Request a fresh prompt.");
                return;
            }
        };

        if principal != self.admin.operator() {
            warn!(principal, action, "non-operator pressed an operator action");
            self.say(principal, "You are not allowed to do that.");
            return;
        }

        if let Some(target) = parse_target(&action, APPROVE_ACTION_PREFIX) {
            self.admin.decide(Decision::Approve, target);
        } else if let Some(target) = parse_target(&action, DENY_ACTION_PREFIX) {
            self.admin.decide(Decision::Deny, target);
        } else if let Some(target) = parse_target(&action, REVOKE_ACTION_PREFIX) {
            self.admin.revoke(target);
        } else {
            warn!(principal, action, "unrecognized action");
            self.say(principal, "Unknown action.");
        }
    }

    /// Post-admission routing: commands and credential queries.
    async fn handle_member_text(&self, principal: PrincipalId, text: &str) {
        let trimmed = text.trim();

        if trimmed == ROSTER_COMMAND {
            if principal == self.admin.operator() {
                self.admin.present_roster();
            } else {
                self.say(principal, "You are not allowed to do that.");
            }
            return;
        }

        if trimmed == RECONNECT_COMMAND {
            if principal != self.admin.operator() {
                self.say(principal, "You are not allowed to do that.");
                return;
            }
            let credentials = Arc::clone(&self.credentials);
            let reconnected =
                tokio::task::spawn_blocking(move || credentials.force_reconnect()).await;
            match reconnected {
                Ok(Ok(())) => self.say(principal, "Credential store reconnected."),
                Ok(Err(err)) => {
                    error!("credential store reconnect failed: {err}");
                    self.say(principal, "Reconnect failed.");
                }
                Err(join_error) => {
                    error!("reconnect task failed: {join_error}");
                    self.say(principal, "Reconnect failed.");
                }
            }
            return;
        }

        if !self.credentials.is_connected() {
            self.say(principal, "Credential store is unavailable.");
            return;
        }

        if let Some(group) = trimmed.strip_prefix(GROUP_QUERY_PREFIX) {
            let group = match validate::validate_group_name(group) {
                Ok(group) => group,
                Err(err) => {
                    self.say(principal, &err.to_string());
                    return;
                }
            };
            let credentials = Arc::clone(&self.credentials);
            let found =
                tokio::task::spawn_blocking(move || credentials.search_group(&group)).await;
            self.send_results(principal, found);
            return;
        }

        let query = match validate::validate_search_query(trimmed) {
            Ok(query) => query,
            Err(err) => {
                self.say(principal, &err.to_string());
                return;
            }
        };
        let credentials = Arc::clone(&self.credentials);
        let found = tokio::task::spawn_blocking(move || credentials.search(&query)).await;
        self.send_results(principal, found);
    }

    fn send_results(
        &self,
        principal: PrincipalId,
        found: Result<anyhow::Result<Vec<CredentialEntry>>, tokio::task::JoinError>,
    ) {
        match found {
            Ok(Ok(entries)) if entries.is_empty() => self.say(principal, "Nothing found."),
            Ok(Ok(entries)) => {
                if let Err(err) = self.display.send_entries(principal, &entries) {
                    error!(principal, "failed to deliver entries: {err}");
                }
            }
            Ok(Err(err)) => {
                error!(principal, "credential lookup failed: {err}");
                self.say(principal, "Credential store is unavailable.");
            }
            Err(join_error) => {
                error!(principal, "lookup task failed: {join_error}");
                self.say(principal, "Credential store is unavailable.");
            }
        }
    }

    #[must_use]
    pub fn session_state(&self, principal: PrincipalId) -> SessionState {
        let sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sessions.get(&principal).copied().unwrap_or_default()
    }

    fn set_session_state(&self, principal: PrincipalId, state: SessionState) {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sessions.insert(principal, state);
    }

    fn principal_lock(&self, principal: PrincipalId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(principal).or_default())
    }

    fn say(&self, principal: PrincipalId, text: &str) {
        if let Err(err) = self.display.send_text(principal, text) {
            error!(principal, "failed to deliver message: {err}");
        }
    }
}

fn parse_target(action: &str, prefix: &str) -> Option<PrincipalId> {
    action.strip_prefix(prefix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::display::ActionButton;
    use crate::mail::{CodeEmail, CodeSender};
    use crate::store::MemoryStore;
    use std::sync::Mutex;

    use super::rate_limit::RateLimits;

    const OPERATOR: PrincipalId = 9;
    const GATE_SECRET: &str = "123456";

    #[derive(Default)]
    struct RecordingDisplay {
        texts: Mutex<Vec<(PrincipalId, String)>>,
        prompts: Mutex<Vec<(PrincipalId, String, Vec<ActionButton>)>>,
    }

    impl RecordingDisplay {
        fn texts_for(&self, principal: PrincipalId) -> Vec<String> {
            self.texts
                .lock()
                .unwrap()
                .iter()
                .filter(|(to, _)| *to == principal)
                .map(|(_, text)| text.clone())
                .collect()
        }
    }

    impl DisplayLayer for RecordingDisplay {
        fn send_text(&self, principal: PrincipalId, text: &str) -> anyhow::Result<()> {
            self.texts.lock().unwrap().push((principal, text.to_string()));
            Ok(())
        }
        fn send_prompt(
            &self,
            principal: PrincipalId,
            text: &str,
            buttons: &[ActionButton],
        ) -> anyhow::Result<()> {
            self.prompts
                .lock()
                .unwrap()
                .push((principal, text.to_string(), buttons.to_vec()));
            Ok(())
        }
        fn send_entries(
            &self,
            _principal: PrincipalId,
            _entries: &[CredentialEntry],
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<CodeEmail>>,
    }

    impl RecordingSender {
        fn last_code(&self) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .last()
                .map(|message| message.code.clone())
        }
    }

    impl CodeSender for RecordingSender {
        fn send(&self, message: &CodeEmail) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct Fixture {
        gate: Arc<AdmissionGate>,
        display: Arc<RecordingDisplay>,
        sender: Arc<RecordingSender>,
        clock: Arc<ManualClock>,
        registry: Arc<AccessRegistry>,
    }

    fn fixture() -> Fixture {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(10_000));
        let display = Arc::new(RecordingDisplay::default());
        let sender = Arc::new(RecordingSender::default());
        let store = Arc::new(MemoryStore::new());
        let csrf = Arc::new(CsrfGuard::new(clock.clone()));
        let registry = Arc::new(AccessRegistry::new(clock.clone(), store.clone()));
        let admin = AdminChannel::new(
            OPERATOR,
            registry.clone(),
            csrf.clone(),
            display.clone(),
        );
        let second_factor = SecondFactorIssuer::new(
            clock.clone(),
            store,
            sender.clone(),
            "ops@example.com".to_string(),
        );
        let gate = Arc::new(AdmissionGate::new(
            SecretString::from(GATE_SECRET),
            RateLimiter::new(RateLimits::new(), clock.clone()),
            second_factor,
            csrf,
            registry.clone(),
            admin,
            display.clone(),
            Arc::new(crate::credstore::DisconnectedStore),
        ));
        Fixture {
            gate,
            display,
            sender,
            clock,
            registry,
        }
    }

    async fn text(fixture: &Fixture, principal: PrincipalId, text: &str) {
        fixture
            .gate
            .dispatch(InboundEvent::Text {
                principal,
                display_name: "alice".to_string(),
                text: text.to_string(),
            })
            .await;
    }

    #[tokio::test]
    async fn first_contact_arms_the_gate_prompt() {
        let fixture = fixture();
        text(&fixture, 1, "hello").await;
        assert_eq!(fixture.gate.session_state(1), SessionState::GatePending);
        assert!(fixture.display.texts_for(1)[0].contains("access code"));
    }

    #[tokio::test]
    async fn correct_secret_issues_a_challenge() {
        let fixture = fixture();
        text(&fixture, 1, "hi").await;
        text(&fixture, 1, GATE_SECRET).await;
        assert_eq!(
            fixture.gate.session_state(1),
            SessionState::SecondFactorPending
        );
        assert!(fixture.sender.last_code().is_some());
    }

    #[tokio::test]
    async fn wrong_secret_keeps_the_gate_pending() {
        let fixture = fixture();
        text(&fixture, 1, "hi").await;
        text(&fixture, 1, "999999").await;
        assert_eq!(fixture.gate.session_state(1), SessionState::GatePending);
        assert!(fixture
            .display
            .texts_for(1)
            .iter()
            .any(|t| t.contains("Wrong access code")));
    }

    #[tokio::test]
    async fn malformed_secret_does_not_consume_a_rate_slot() {
        let fixture = fixture();
        text(&fixture, 1, "hi").await;
        // Five malformed attempts would exhaust the window if they counted.
        for _ in 0..5 {
            text(&fixture, 1, "not-digits").await;
        }
        text(&fixture, 1, GATE_SECRET).await;
        assert_eq!(
            fixture.gate.session_state(1),
            SessionState::SecondFactorPending
        );
    }

    #[tokio::test]
    async fn gate_secret_attempts_are_rate_limited() {
        let fixture = fixture();
        text(&fixture, 1, "hi").await;
        for _ in 0..5 {
            text(&fixture, 1, "999999").await;
        }
        text(&fixture, 1, GATE_SECRET).await;
        assert_eq!(fixture.gate.session_state(1), SessionState::GatePending);
        assert!(fixture
            .display
            .texts_for(1)
            .iter()
            .any(|t| t.contains("Too many access code attempts")));

        // The window elapses and the correct secret goes through.
        fixture.clock.advance(300);
        text(&fixture, 1, GATE_SECRET).await;
        assert_eq!(
            fixture.gate.session_state(1),
            SessionState::SecondFactorPending
        );
    }

    #[tokio::test]
    async fn verified_code_requests_operator_review() {
        let fixture = fixture();
        text(&fixture, 1, "hi").await;
        text(&fixture, 1, GATE_SECRET).await;
        let code = fixture.sender.last_code().unwrap();
        text(&fixture, 1, &code).await;

        assert_eq!(fixture.gate.session_state(1), SessionState::AdminPending);
        assert!(fixture.registry.has_pending(1));
        let prompts = fixture.display.prompts.lock().unwrap();
        assert!(prompts.iter().any(|(to, _, _)| *to == OPERATOR));
    }

    #[tokio::test]
    async fn operator_approval_admits_the_principal() {
        let fixture = fixture();
        text(&fixture, 1, "hi").await;
        text(&fixture, 1, GATE_SECRET).await;
        let code = fixture.sender.last_code().unwrap();
        text(&fixture, 1, &code).await;

        let approve = {
            let prompts = fixture.display.prompts.lock().unwrap();
            prompts
                .iter()
                .find(|(to, _, _)| *to == OPERATOR)
                .map(|(_, _, buttons)| buttons[0].action.clone())
                .unwrap()
        };
        fixture
            .gate
            .dispatch(InboundEvent::Action {
                principal: OPERATOR,
                display_name: "op".to_string(),
                data: approve,
            })
            .await;

        assert!(fixture.registry.is_approved(1));
        assert!(fixture
            .display
            .texts_for(1)
            .iter()
            .any(|t| t.contains("approved")));
    }

    #[tokio::test]
    async fn forged_action_is_rejected_without_side_effects() {
        let fixture = fixture();
        text(&fixture, 1, "hi").await;
        text(&fixture, 1, GATE_SECRET).await;
        let code = fixture.sender.last_code().unwrap();
        text(&fixture, 1, &code).await;

        fixture
            .gate
            .dispatch(InboundEvent::Action {
                principal: OPERATOR,
                display_name: "op".to_string(),
                data: "approve_1".to_string(),
            })
            .await;

        assert!(!fixture.registry.is_approved(1));
        assert!(fixture
            .display
            .texts_for(OPERATOR)
            .iter()
            .any(|t| t.contains("Security check failed")));
    }

    #[tokio::test]
    async fn bound_action_from_a_non_operator_is_refused() {
        let fixture = fixture();
        text(&fixture, 1, "hi").await;
        text(&fixture, 1, GATE_SECRET).await;
        let code = fixture.sender.last_code().unwrap();
        text(&fixture, 1, &code).await;

        let approve = {
            let prompts = fixture.display.prompts.lock().unwrap();
            prompts
                .iter()
                .find(|(to, _, _)| *to == OPERATOR)
                .map(|(_, _, buttons)| buttons[0].action.clone())
                .unwrap()
        };
        // Principal 2 replays the operator's bound action. Its token was
        // bound to the operator, so the forgery check fails first.
        fixture
            .gate
            .dispatch(InboundEvent::Action {
                principal: 2,
                display_name: "mallory".to_string(),
                data: approve,
            })
            .await;
        assert!(!fixture.registry.is_approved(1));
    }

    #[tokio::test]
    async fn exhausted_second_factor_restarts_the_ladder() {
        let fixture = fixture();
        text(&fixture, 1, "hi").await;
        text(&fixture, 1, GATE_SECRET).await;
        let code = fixture.sender.last_code().unwrap();

        let wrong = if code == "000000" { "000001" } else { "000000" };
        text(&fixture, 1, wrong).await;
        text(&fixture, 1, wrong).await;
        text(&fixture, 1, wrong).await;

        assert_eq!(fixture.gate.session_state(1), SessionState::Unverified);
        assert!(fixture
            .display
            .texts_for(1)
            .iter()
            .any(|t| t.contains("start over")));
    }

    #[tokio::test]
    async fn resend_bypasses_code_format_and_rate_checks() {
        let fixture = fixture();
        text(&fixture, 1, "hi").await;
        text(&fixture, 1, GATE_SECRET).await;
        let first = fixture.sender.last_code().unwrap();

        text(&fixture, 1, RESEND_COMMAND).await;
        let second = fixture.sender.last_code().unwrap();
        assert_eq!(
            fixture.gate.session_state(1),
            SessionState::SecondFactorPending
        );
        if first != second {
            // The old challenge is gone, only the new code verifies.
            text(&fixture, 1, &first).await;
            assert_eq!(
                fixture.gate.session_state(1),
                SessionState::SecondFactorPending
            );
        }
        text(&fixture, 1, &second).await;
        assert_eq!(fixture.gate.session_state(1), SessionState::AdminPending);
    }

    #[tokio::test]
    async fn general_rate_limit_gates_all_text() {
        let fixture = fixture();
        for _ in 0..10 {
            text(&fixture, 1, "hi").await;
        }
        text(&fixture, 1, "hi").await;
        assert!(fixture
            .display
            .texts_for(1)
            .iter()
            .any(|t| t.contains("Too many requests")));
    }

    #[tokio::test]
    async fn approved_member_sees_store_unavailable() {
        let fixture = fixture();
        fixture.registry.request_access(1, "alice");
        fixture.registry.approve(1, "alice");

        text(&fixture, 1, "mail server").await;
        assert!(fixture
            .display
            .texts_for(1)
            .iter()
            .any(|t| t.contains("unavailable")));
    }

    #[tokio::test]
    async fn member_commands_are_operator_only() {
        let fixture = fixture();
        fixture.registry.request_access(1, "alice");
        fixture.registry.approve(1, "alice");

        text(&fixture, 1, ROSTER_COMMAND).await;
        assert!(fixture
            .display
            .texts_for(1)
            .iter()
            .any(|t| t.contains("not allowed")));
    }

    #[tokio::test]
    async fn waiting_principal_is_told_to_wait() {
        let fixture = fixture();
        text(&fixture, 1, "hi").await;
        text(&fixture, 1, GATE_SECRET).await;
        let code = fixture.sender.last_code().unwrap();
        text(&fixture, 1, &code).await;

        text(&fixture, 1, "any news?").await;
        assert!(fixture
            .display
            .texts_for(1)
            .iter()
            .any(|t| t.contains("waiting for review")));
    }

    #[tokio::test]
    async fn denied_principal_restarts_at_the_gate() {
        let fixture = fixture();
        text(&fixture, 1, "hi").await;
        text(&fixture, 1, GATE_SECRET).await;
        let code = fixture.sender.last_code().unwrap();
        text(&fixture, 1, &code).await;

        fixture.registry.deny(1, "alice");
        text(&fixture, 1, "hello again").await;
        assert_eq!(fixture.gate.session_state(1), SessionState::GatePending);
    }
}
