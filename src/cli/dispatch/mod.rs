use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{GateOptions, SmtpOptions, StoreOptions};
use anyhow::Result;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let gate = GateOptions::from_matches(matches)?;
    let smtp = SmtpOptions::from_matches(matches)?;
    let store = StoreOptions::from_matches(matches);

    Ok(Action::Server(Args {
        gate_secret: gate.gate_secret,
        operator_id: gate.operator_id,
        smtp: smtp.config,
        data_dir: store.data_dir,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn test_handler_from_env() {
        temp_env::with_vars(
            [
                ("PORDISTO_GATE_SECRET", Some("123456")),
                ("PORDISTO_OPERATOR_ID", Some("42")),
                ("PORDISTO_SMTP_SERVER", Some("smtp.example.com")),
                ("PORDISTO_SMTP_USERNAME", Some("bot@example.com")),
                ("PORDISTO_SMTP_PASSWORD", Some("hunter2")),
                ("PORDISTO_OPERATOR_EMAIL", Some("ops@example.com")),
                ("PORDISTO_DATA_DIR", Some("/tmp/pordisto-data")),
            ],
            || {
                let command = commands::new();
                let matches = command.get_matches_from(vec!["pordisto"]);
                let action = handler(&matches).unwrap();
                let Action::Server(args) = action;
                assert_eq!(args.gate_secret.expose_secret(), "123456");
                assert_eq!(args.operator_id, 42);
                assert_eq!(args.smtp.server, "smtp.example.com");
                assert_eq!(args.smtp.port, 587);
                assert_eq!(args.smtp.operator_email, "ops@example.com");
                assert_eq!(args.data_dir, "/tmp/pordisto-data");
            },
        );
    }

    #[test]
    fn test_handler_missing_required() {
        temp_env::with_vars(
            [
                ("PORDISTO_GATE_SECRET", None::<&str>),
                ("PORDISTO_OPERATOR_ID", None),
                ("PORDISTO_SMTP_SERVER", None),
                ("PORDISTO_SMTP_USERNAME", None),
                ("PORDISTO_SMTP_PASSWORD", None),
                ("PORDISTO_OPERATOR_EMAIL", None),
            ],
            || {
                let command = commands::new();
                let result = command.try_get_matches_from(vec!["pordisto"]);
                assert!(result.is_err());
            },
        );
    }
}
