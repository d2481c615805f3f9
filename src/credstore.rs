//! Credential-store collaborator contract.
//!
//! The actual store (KeePass-style database, vault, ...) lives outside this
//! crate. The gate only routes validated queries from approved principals to
//! it and surfaces unavailability; entry formatting stays with the display.

use anyhow::{bail, Result};

/// One credential entry as returned by the backing store.
///
/// Secret material stays inside the store; the gate only ever sees and
/// forwards entry metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialEntry {
    pub id: String,
    pub title: String,
    pub username: String,
    pub group: String,
}

/// Lookup surface of the external credential store.
pub trait CredentialStore: Send + Sync {
    /// Free-text search over titles and usernames.
    ///
    /// # Errors
    /// Returns an error when the store is unreachable.
    fn search(&self, query: &str) -> Result<Vec<CredentialEntry>>;

    /// All entries under a named group.
    ///
    /// # Errors
    /// Returns an error when the store is unreachable.
    fn search_group(&self, group: &str) -> Result<Vec<CredentialEntry>>;

    /// Lookup by entry identifier.
    ///
    /// # Errors
    /// Returns an error when the store is unreachable.
    fn lookup(&self, id: &str) -> Result<Option<CredentialEntry>>;

    /// Cheap connectivity probe.
    fn is_connected(&self) -> bool;

    /// Drop and re-establish the store connection.
    ///
    /// # Errors
    /// Returns an error when reconnecting fails.
    fn force_reconnect(&self) -> Result<()>;
}

/// Placeholder store for dev runs without a real backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisconnectedStore;

impl CredentialStore for DisconnectedStore {
    fn search(&self, _query: &str) -> Result<Vec<CredentialEntry>> {
        bail!("credential store is not connected")
    }

    fn search_group(&self, _group: &str) -> Result<Vec<CredentialEntry>> {
        bail!("credential store is not connected")
    }

    fn lookup(&self, _id: &str) -> Result<Option<CredentialEntry>> {
        bail!("credential store is not connected")
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn force_reconnect(&self) -> Result<()> {
        bail!("credential store is not connected")
    }
}
