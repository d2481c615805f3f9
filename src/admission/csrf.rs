//! Forgery-resistant binding of interactive actions to principals.
//!
//! Outgoing button actions carry a per-principal random token appended as
//! `"<action>|csrf:<token>"`; incoming actions are only accepted after the
//! token is validated and stripped. An action without the delimiter is
//! treated as forged or legacy input and rejected outright.
//!
//! Validation does not rotate the token: repeated binds within the lifetime
//! window reuse one token, so a captured bound action stays replayable until
//! the token expires or is explicitly refreshed. This is a known, intentional
//! weaker guarantee than single-use nonces.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use tracing::debug;

use super::PrincipalId;
use crate::clock::Clock;

/// Delimiter between the action payload and its token on the wire.
pub const ACTION_DELIMITER: &str = "|csrf:";

const TOKEN_BYTES: usize = 8;
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 3600;

/// Why an inbound bound action was rejected.
///
/// Every variant is a security event for the caller to log; none of them
/// mutate any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ForgeryError {
    #[error("action carries no security token")]
    MissingToken,
    #[error("no active security token for principal")]
    NoActiveToken,
    #[error("security token does not match")]
    Mismatch,
}

#[derive(Clone, Debug)]
struct TokenEntry {
    token: String,
    expires_at: i64,
}

/// Issues and validates per-principal action tokens.
///
/// One active token per principal; an expired token is indistinguishable
/// from an absent one.
pub struct CsrfGuard {
    clock: Arc<dyn Clock>,
    ttl_seconds: i64,
    tokens: Mutex<HashMap<PrincipalId, TokenEntry>>,
}

impl CsrfGuard {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn with_ttl_seconds(mut self, ttl_seconds: i64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Generate and store a fresh token, replacing any prior one.
    pub fn issue(&self, principal: PrincipalId) -> String {
        let token = generate_token();
        let expires_at = self.clock.now() + self.ttl_seconds;
        let mut tokens = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tokens.insert(
            principal,
            TokenEntry {
                token: token.clone(),
                expires_at,
            },
        );
        debug!(principal, "issued action token");
        token
    }

    /// Explicitly rotate the principal's token.
    pub fn refresh(&self, principal: PrincipalId) -> String {
        self.issue(principal)
    }

    /// Append the principal's current token to an action, issuing one first
    /// if none is active.
    pub fn bind(&self, principal: PrincipalId, action: &str) -> String {
        let token = self
            .current(principal)
            .unwrap_or_else(|| self.issue(principal));
        format!("{action}{ACTION_DELIMITER}{token}")
    }

    /// Validate and strip the token from an inbound bound action.
    ///
    /// # Errors
    /// Returns a `ForgeryError` when the delimiter is missing, no unexpired
    /// token is on file for the principal, or the token does not match.
    pub fn unbind(&self, principal: PrincipalId, bound: &str) -> Result<String, ForgeryError> {
        let Some((action, token)) = bound.rsplit_once(ACTION_DELIMITER) else {
            return Err(ForgeryError::MissingToken);
        };
        let Some(current) = self.current(principal) else {
            return Err(ForgeryError::NoActiveToken);
        };
        if current != token {
            return Err(ForgeryError::Mismatch);
        }
        Ok(action.to_string())
    }

    /// Drop expired tokens; returns how many were removed. Expiry is also
    /// checked lazily on access, so running this is optional.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut tokens = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = tokens.len();
        tokens.retain(|_, entry| now <= entry.expires_at);
        before - tokens.len()
    }

    /// The principal's unexpired token, dropping an expired one on the way.
    fn current(&self, principal: PrincipalId) -> Option<String> {
        let now = self.clock.now();
        let mut tokens = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match tokens.get(&principal) {
            Some(entry) if now <= entry.expires_at => Some(entry.token.clone()),
            Some(_) => {
                tokens.remove(&principal);
                None
            }
            None => None,
        }
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}
