use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::admission::PrincipalId;

/// Gate options extracted from the command line.
pub struct Options {
    pub gate_secret: SecretString,
    pub operator_id: PrincipalId,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let gate_secret = matches
            .get_one::<String>("gate-secret")
            .cloned()
            .context("missing required argument: --gate-secret")?;
        let operator_id = matches
            .get_one::<PrincipalId>("operator-id")
            .copied()
            .context("missing required argument: --operator-id")?;
        Ok(Self {
            gate_secret: SecretString::from(gate_secret),
            operator_id,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("gate-secret")
                .long("gate-secret")
                .help("Shared numeric access code (4-10 digits) required from new principals")
                .env("PORDISTO_GATE_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("operator-id")
                .long("operator-id")
                .help("Principal id of the human operator who reviews access requests")
                .env("PORDISTO_OPERATOR_ID")
                .value_parser(clap::value_parser!(i64))
                .required(true),
        )
}
