//! # Pordisto (Credential Service Admission Gate)
//!
//! `pordisto` sits between an interactive display layer and an external
//! credential store. Nobody talks to the store without climbing the full
//! admission ladder first:
//!
//! - **Gate secret:** a shared numeric access code, rate limited per
//!   principal over a sliding window.
//! - **Second factor:** a 6-digit code emailed out of band, with a bounded
//!   attempt budget and absolute expiry.
//! - **Operator decision:** a human approves or denies every request through
//!   forgery-checked interactive actions.
//!
//! Approved principals and outstanding challenges are persisted as JSON
//! documents so admissions survive a restart. Rate-limit windows are
//! intentionally in-memory only.

pub mod admission;
pub mod cli;
pub mod clock;
pub mod credstore;
pub mod display;
pub mod mail;
pub mod store;
pub mod validate;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
