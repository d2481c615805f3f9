//! Second-factor challenge lifecycle: issue over email, verify, reissue.
//!
//! One active challenge per principal. Issue generates a random 6-digit code,
//! persists it, and hands it to the blocking sender on a worker thread; a
//! delivery failure discards the challenge so no partial state survives a
//! failed send. Verification consumes the challenge on success, expiry, or
//! attempt exhaustion. Expiry compares absolute wall-clock timestamps stored
//! at issue time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use super::PrincipalId;
use crate::clock::Clock;
use crate::mail::{CodeEmail, CodeSender};
use crate::store::Store;

const STORE_KEY: &str = "pending_codes";
const CODE_LENGTH: usize = 6;
const DEFAULT_CODE_TTL_MINUTES: i64 = 60;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Durable form of one pending challenge.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct ChallengeRecord {
    code: String,
    expires_at: i64,
    attempts: u32,
    max_attempts: u32,
    display_name: String,
}

/// On-disk document: challenges keyed by principal id.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ChallengeDocument {
    codes: BTreeMap<String, ChallengeRecord>,
}

/// Outcome of a verification attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Correct code; the challenge has been consumed.
    Verified,
    /// Nothing on file for this principal.
    NoChallenge,
    /// The challenge expired and has been discarded.
    Expired,
    /// The attempt budget is spent and the challenge has been discarded.
    Exhausted,
    /// Wrong code; `remaining_attempts` tries left (always at least one).
    Mismatch { remaining_attempts: u32 },
}

impl VerifyOutcome {
    /// Whether the principal may try again against the same challenge.
    #[must_use]
    pub const fn can_retry(self) -> bool {
        matches!(self, Self::Mismatch { .. })
    }
}

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("second-factor delivery failed")]
    Delivery(#[source] anyhow::Error),
}

/// Issues and verifies time-limited second-factor codes.
pub struct SecondFactorIssuer {
    clock: Arc<dyn Clock>,
    store: Arc<dyn Store>,
    sender: Arc<dyn CodeSender>,
    operator_email: String,
    code_ttl_minutes: i64,
    max_attempts: u32,
    challenges: Mutex<BTreeMap<PrincipalId, ChallengeRecord>>,
    diverged: AtomicBool,
}

impl SecondFactorIssuer {
    /// Build the issuer, reloading any persisted challenges so an issued
    /// code survives a restart.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        store: Arc<dyn Store>,
        sender: Arc<dyn CodeSender>,
        operator_email: String,
    ) -> Self {
        let challenges = load_challenges(store.as_ref());
        Self {
            clock,
            store,
            sender,
            operator_email,
            code_ttl_minutes: DEFAULT_CODE_TTL_MINUTES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            challenges: Mutex::new(challenges),
            diverged: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn with_code_ttl_minutes(mut self, minutes: i64) -> Self {
        self.code_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Generate, persist, and deliver a fresh challenge, replacing any prior
    /// one for the principal.
    ///
    /// # Errors
    /// Returns `IssueError::Delivery` when the send fails; the just-created
    /// challenge is discarded first.
    pub async fn issue(
        &self,
        principal: PrincipalId,
        display_name: &str,
    ) -> Result<(), IssueError> {
        self.sweep_expired();

        let code = generate_code();
        let now = self.clock.now();
        let record = ChallengeRecord {
            code: code.clone(),
            expires_at: now + self.code_ttl_minutes * 60,
            attempts: 0,
            max_attempts: self.max_attempts,
            display_name: display_name.to_string(),
        };
        {
            let mut challenges = self
                .challenges
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            challenges.insert(principal, record);
        }
        self.persist();

        let message = CodeEmail {
            to: self.operator_email.clone(),
            principal,
            display_name: display_name.to_string(),
            code,
            valid_minutes: self.code_ttl_minutes,
        };
        let sender = Arc::clone(&self.sender);
        let delivered = tokio::task::spawn_blocking(move || sender.send(&message))
            .await
            .unwrap_or_else(|join_error| Err(anyhow!("sender task failed: {join_error}")));

        if let Err(err) = delivered {
            {
                let mut challenges = self
                    .challenges
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                challenges.remove(&principal);
            }
            self.persist();
            return Err(IssueError::Delivery(err));
        }

        info!(principal, "second-factor code issued");
        Ok(())
    }

    /// Unconditionally discard any existing challenge, then issue a new one.
    ///
    /// # Errors
    /// Returns `IssueError::Delivery` when the send fails.
    pub async fn reissue(
        &self,
        principal: PrincipalId,
        display_name: &str,
    ) -> Result<(), IssueError> {
        let removed = {
            let mut challenges = self
                .challenges
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            challenges.remove(&principal).is_some()
        };
        if removed {
            self.persist();
        }
        self.issue(principal, display_name).await
    }

    /// Check `input_code` against the principal's challenge.
    pub fn verify(&self, principal: PrincipalId, input_code: &str) -> VerifyOutcome {
        let now = self.clock.now();
        let (outcome, changed) = {
            let mut challenges = self
                .challenges
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(record) = challenges.get_mut(&principal) else {
                return VerifyOutcome::NoChallenge;
            };

            if now > record.expires_at {
                challenges.remove(&principal);
                (VerifyOutcome::Expired, true)
            } else if record.attempts >= record.max_attempts {
                challenges.remove(&principal);
                (VerifyOutcome::Exhausted, true)
            } else if input_code == record.code {
                challenges.remove(&principal);
                (VerifyOutcome::Verified, true)
            } else {
                record.attempts += 1;
                let remaining_attempts = record.max_attempts - record.attempts;
                if remaining_attempts == 0 {
                    challenges.remove(&principal);
                    (VerifyOutcome::Exhausted, true)
                } else {
                    (
                        VerifyOutcome::Mismatch { remaining_attempts },
                        true,
                    )
                }
            }
        };
        if changed {
            self.persist();
        }
        match outcome {
            VerifyOutcome::Verified => info!(principal, "second-factor code verified"),
            VerifyOutcome::Mismatch { remaining_attempts } => {
                warn!(principal, remaining_attempts, "wrong second-factor code");
            }
            VerifyOutcome::Expired => warn!(principal, "second-factor code expired"),
            VerifyOutcome::Exhausted => {
                warn!(principal, "second-factor attempts exhausted");
            }
            VerifyOutcome::NoChallenge => {}
        }
        outcome
    }

    /// Whether an unexpired challenge is on file for the principal.
    #[must_use]
    pub fn has_active_challenge(&self, principal: PrincipalId) -> bool {
        let now = self.clock.now();
        let challenges = self
            .challenges
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        challenges
            .get(&principal)
            .is_some_and(|record| now <= record.expires_at)
    }

    /// True after a persistence failure: memory and disk may disagree.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        self.diverged.load(Ordering::SeqCst)
    }

    fn sweep_expired(&self) {
        let now = self.clock.now();
        let removed = {
            let mut challenges = self
                .challenges
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let before = challenges.len();
            challenges.retain(|_, record| now <= record.expires_at);
            before - challenges.len()
        };
        if removed > 0 {
            self.persist();
        }
    }

    /// Persist the whole challenge table. A write failure keeps the
    /// in-memory state and flips the divergence flag.
    fn persist(&self) {
        let document = {
            let challenges = self
                .challenges
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            ChallengeDocument {
                codes: challenges
                    .iter()
                    .map(|(principal, record)| (principal.to_string(), record.clone()))
                    .collect(),
            }
        };
        let serialized = match serde_json::to_string_pretty(&document) {
            Ok(serialized) => serialized,
            Err(err) => {
                error!("failed to serialize challenge table: {err}");
                self.diverged.store(true, Ordering::SeqCst);
                return;
            }
        };
        if let Err(err) = self.store.save(STORE_KEY, &serialized) {
            error!("failed to persist challenge table: {err}");
            self.diverged.store(true, Ordering::SeqCst);
        }
    }
}

fn load_challenges(store: &dyn Store) -> BTreeMap<PrincipalId, ChallengeRecord> {
    let document = match store.load(STORE_KEY) {
        Ok(Some(raw)) => match serde_json::from_str::<ChallengeDocument>(&raw) {
            Ok(document) => document,
            Err(err) => {
                error!("failed to parse challenge table, starting empty: {err}");
                ChallengeDocument::default()
            }
        },
        Ok(None) => ChallengeDocument::default(),
        Err(err) => {
            error!("failed to load challenge table, starting empty: {err}");
            ChallengeDocument::default()
        }
    };
    document
        .codes
        .into_iter()
        .filter_map(|(principal, record)| {
            principal
                .parse::<PrincipalId>()
                .map(|principal| (principal, record))
                .ok()
        })
        .collect()
}

fn generate_code() -> String {
    let mut rng = OsRng;
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}
