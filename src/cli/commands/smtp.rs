use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::mail::SmtpConfig;

/// Mail options extracted from the command line.
pub struct Options {
    pub config: SmtpConfig,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let server = matches
            .get_one::<String>("smtp-server")
            .cloned()
            .context("missing required argument: --smtp-server")?;
        let port = matches.get_one::<u16>("smtp-port").copied().unwrap_or(587);
        let username = matches
            .get_one::<String>("smtp-username")
            .cloned()
            .context("missing required argument: --smtp-username")?;
        let password = matches
            .get_one::<String>("smtp-password")
            .cloned()
            .context("missing required argument: --smtp-password")?;
        let operator_email = matches
            .get_one::<String>("operator-email")
            .cloned()
            .context("missing required argument: --operator-email")?;
        Ok(Self {
            config: SmtpConfig {
                server,
                port,
                username,
                password: SecretString::from(password),
                operator_email,
            },
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("smtp-server")
                .long("smtp-server")
                .help("SMTP server used to deliver second-factor codes")
                .env("PORDISTO_SMTP_SERVER")
                .required(true),
        )
        .arg(
            Arg::new("smtp-port")
                .long("smtp-port")
                .help("SMTP server port")
                .default_value("587")
                .env("PORDISTO_SMTP_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("smtp-username")
                .long("smtp-username")
                .help("SMTP username (also the envelope sender)")
                .env("PORDISTO_SMTP_USERNAME")
                .required(true),
        )
        .arg(
            Arg::new("smtp-password")
                .long("smtp-password")
                .help("SMTP password")
                .env("PORDISTO_SMTP_PASSWORD")
                .required(true),
        )
        .arg(
            Arg::new("operator-email")
                .long("operator-email")
                .help("Mailbox that receives second-factor codes")
                .env("PORDISTO_OPERATOR_EMAIL")
                .required(true),
        )
}
