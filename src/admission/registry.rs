//! Durable registry of approved principals and pending access requests.
//!
//! A principal is never in both lists at once. Every mutating operation
//! persists the full registry synchronously before returning; a write
//! failure is logged, the in-memory mutation is retained, and the sticky
//! divergence flag records that memory and disk may disagree.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::PrincipalId;
use crate::clock::Clock;
use crate::store::Store;

const STORE_KEY: &str = "allowed_users";

/// An admitted principal.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedPrincipal {
    pub id: PrincipalId,
    pub display_name: String,
    pub approved_at: i64,
}

/// A request awaiting an operator decision.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub id: PrincipalId,
    pub display_name: String,
    pub timestamp: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryDocument {
    users: Vec<ApprovedPrincipal>,
    pending_requests: Vec<PendingRequest>,
}

/// Durable store of who may use the credential service and who is waiting.
pub struct AccessRegistry {
    clock: Arc<dyn Clock>,
    store: Arc<dyn Store>,
    state: Mutex<RegistryDocument>,
    diverged: AtomicBool,
}

impl AccessRegistry {
    /// Build the registry, reloading the persisted document if present.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, store: Arc<dyn Store>) -> Self {
        let state = load_document(store.as_ref());
        Self {
            clock,
            store,
            state: Mutex::new(state),
            diverged: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_approved(&self, principal: PrincipalId) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.users.iter().any(|user| user.id == principal)
    }

    /// Record an access request; a no-op when one already exists.
    pub fn request_access(&self, principal: PrincipalId, display_name: &str) {
        let changed = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state
                .pending_requests
                .iter()
                .any(|request| request.id == principal)
            {
                false
            } else {
                state.pending_requests.push(PendingRequest {
                    id: principal,
                    display_name: display_name.to_string(),
                    timestamp: self.clock.now(),
                });
                true
            }
        };
        if changed {
            self.persist();
            info!(principal, display_name, "access requested");
        }
    }

    /// Remove the matching pending request and admit the principal.
    ///
    /// Returns `false` (without duplicating the entry) when the principal is
    /// already approved.
    pub fn approve(&self, principal: PrincipalId, display_name: &str) -> bool {
        let (approved, changed) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let pending_before = state.pending_requests.len();
            state.pending_requests.retain(|request| request.id != principal);
            let removed_pending = state.pending_requests.len() < pending_before;

            if state.users.iter().any(|user| user.id == principal) {
                (false, removed_pending)
            } else {
                state.users.push(ApprovedPrincipal {
                    id: principal,
                    display_name: display_name.to_string(),
                    approved_at: self.clock.now(),
                });
                (true, true)
            }
        };
        if changed {
            self.persist();
        }
        if approved {
            info!(principal, display_name, "access granted");
        }
        approved
    }

    /// Remove the matching pending request; `false` when none existed.
    pub fn deny(&self, principal: PrincipalId, display_name: &str) -> bool {
        let denied = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let before = state.pending_requests.len();
            state.pending_requests.retain(|request| request.id != principal);
            state.pending_requests.len() < before
        };
        if denied {
            self.persist();
            info!(principal, display_name, "access denied");
        }
        denied
    }

    /// Remove the principal from the approved list; `false` when absent.
    pub fn revoke(&self, principal: PrincipalId) -> bool {
        let revoked = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let before = state.users.len();
            state.users.retain(|user| user.id != principal);
            state.users.len() < before
        };
        if revoked {
            self.persist();
            info!(principal, "access revoked");
        }
        revoked
    }

    /// Whether a request from this principal is awaiting a decision.
    #[must_use]
    pub fn has_pending(&self, principal: PrincipalId) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .pending_requests
            .iter()
            .any(|request| request.id == principal)
    }

    #[must_use]
    pub fn list_pending(&self) -> Vec<PendingRequest> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending_requests.clone()
    }

    #[must_use]
    pub fn list_approved(&self) -> Vec<ApprovedPrincipal> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.users.clone()
    }

    /// True after a persistence failure: memory and disk may disagree.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        self.diverged.load(Ordering::SeqCst)
    }

    fn persist(&self) {
        let serialized = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*state)
        };
        let serialized = match serialized {
            Ok(serialized) => serialized,
            Err(err) => {
                error!("failed to serialize registry: {err}");
                self.diverged.store(true, Ordering::SeqCst);
                return;
            }
        };
        if let Err(err) = self.store.save(STORE_KEY, &serialized) {
            error!("failed to persist registry: {err}");
            self.diverged.store(true, Ordering::SeqCst);
        }
    }
}

fn load_document(store: &dyn Store) -> RegistryDocument {
    match store.load(STORE_KEY) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(document) => document,
            Err(err) => {
                error!("failed to parse registry, starting empty: {err}");
                RegistryDocument::default()
            }
        },
        Ok(None) => RegistryDocument::default(),
        Err(err) => {
            error!("failed to load registry, starting empty: {err}");
            RegistryDocument::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn registry() -> (AccessRegistry, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        (AccessRegistry::new(clock, store.clone()), store)
    }

    #[test]
    fn request_access_is_idempotent() {
        let (registry, _store) = registry();
        registry.request_access(1, "alice");
        registry.request_access(1, "alice");
        assert_eq!(registry.list_pending().len(), 1);
    }

    #[test]
    fn approve_moves_pending_to_approved() {
        let (registry, _store) = registry();
        registry.request_access(1, "alice");
        assert!(registry.approve(1, "alice"));
        assert!(registry.is_approved(1));
        assert!(registry.list_pending().is_empty());
    }

    #[test]
    fn approve_twice_returns_false_without_duplicating() {
        let (registry, _store) = registry();
        registry.request_access(1, "alice");
        assert!(registry.approve(1, "alice"));
        assert!(!registry.approve(1, "alice"));
        assert_eq!(registry.list_approved().len(), 1);
    }

    #[test]
    fn deny_removes_pending_and_reports_absence() {
        let (registry, _store) = registry();
        registry.request_access(1, "alice");
        assert!(registry.deny(1, "alice"));
        assert!(!registry.deny(1, "alice"));
        assert!(!registry.is_approved(1));
    }

    #[test]
    fn revoke_removes_approval() {
        let (registry, _store) = registry();
        registry.request_access(1, "alice");
        registry.approve(1, "alice");
        assert!(registry.revoke(1));
        assert!(!registry.is_approved(1));
        assert!(!registry.revoke(1));
    }

    #[test]
    fn pending_and_approved_are_mutually_exclusive() {
        let (registry, _store) = registry();
        registry.request_access(1, "alice");
        registry.approve(1, "alice");
        assert!(!registry.has_pending(1));
        // A fresh request while approved keeps the invariant visible to
        // callers: the gate never requests access for an approved principal,
        // but the registry itself still reports both views consistently.
        assert!(registry.is_approved(1));
    }

    #[test]
    fn registry_survives_a_restart_via_the_store() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        {
            let registry = AccessRegistry::new(clock.clone(), store.clone());
            registry.request_access(1, "alice");
            registry.approve(1, "alice");
            registry.request_access(2, "bob");
        }
        let reloaded = AccessRegistry::new(clock, store);
        assert!(reloaded.is_approved(1));
        assert_eq!(reloaded.list_pending().len(), 1);
        assert_eq!(reloaded.list_pending()[0].id, 2);
    }

    #[test]
    fn wire_format_uses_camel_case_fields() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let registry = AccessRegistry::new(clock, store.clone());
        registry.request_access(2, "bob");
        registry.approve(1, "alice");

        let raw = store.load("allowed_users").unwrap().unwrap();
        assert!(raw.contains("\"pendingRequests\""));
        assert!(raw.contains("\"displayName\""));
        assert!(raw.contains("\"approvedAt\""));
    }

    #[test]
    fn write_failure_keeps_memory_and_flags_divergence() {
        struct FailingStore;
        impl Store for FailingStore {
            fn load(&self, _key: &str) -> anyhow::Result<Option<String>> {
                Ok(None)
            }
            fn save(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
                anyhow::bail!("read-only filesystem")
            }
        }

        let clock = Arc::new(ManualClock::new(1_000));
        let registry = AccessRegistry::new(clock, Arc::new(FailingStore));
        registry.request_access(1, "alice");
        assert!(registry.approve(1, "alice"));
        assert!(registry.is_approved(1));
        assert!(registry.is_diverged());
    }
}
