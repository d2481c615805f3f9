//! Outbound delivery of second-factor codes.
//!
//! The issuer hands a `CodeEmail` to a `CodeSender`; the sender decides how
//! to deliver (SMTP, API, etc.) and returns `Ok`/`Err`. A transport error is
//! an issuance failure: the caller discards the challenge, nothing survives
//! a failed send. The default sender for local dev is `LogCodeSender`.

use anyhow::Result;
use secrecy::SecretString;
use tracing::info;

use crate::admission::PrincipalId;

/// One second-factor delivery addressed to the operator inbox.
#[derive(Clone, Debug)]
pub struct CodeEmail {
    pub to: String,
    pub principal: PrincipalId,
    pub display_name: String,
    pub code: String,
    pub valid_minutes: i64,
}

/// Delivery abstraction used by the second-factor issuer.
pub trait CodeSender: Send + Sync {
    /// Deliver a code or return an error to abort the issuance.
    ///
    /// # Errors
    /// Returns an error on any transport failure.
    fn send(&self, message: &CodeEmail) -> Result<()>;
}

/// Local dev sender that logs instead of sending real email.
///
/// The code itself is deliberately kept out of the log line.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogCodeSender;

impl CodeSender for LogCodeSender {
    fn send(&self, message: &CodeEmail) -> Result<()> {
        info!(
            to = %message.to,
            principal = message.principal,
            display_name = %message.display_name,
            valid_minutes = message.valid_minutes,
            "second-factor send stub"
        );
        Ok(())
    }
}

/// SMTP connection settings handed to a real transport implementation.
#[derive(Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub operator_email: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("operator_email", &self.operator_email)
            .finish()
    }
}
