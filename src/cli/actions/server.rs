use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::SecretString;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::admission::admin::AdminChannel;
use crate::admission::csrf::CsrfGuard;
use crate::admission::rate_limit::{RateLimiter, RateLimits};
use crate::admission::registry::AccessRegistry;
use crate::admission::second_factor::SecondFactorIssuer;
use crate::admission::{AdmissionGate, InboundEvent, PrincipalId};
use crate::clock::SystemClock;
use crate::credstore::DisconnectedStore;
use crate::display::LogDisplay;
use crate::mail::{LogCodeSender, SmtpConfig};
use crate::store::FileStore;

#[derive(Debug)]
pub struct Args {
    pub gate_secret: SecretString,
    pub operator_id: PrincipalId,
    pub smtp: SmtpConfig,
    pub data_dir: String,
}

/// Execute the server action.
///
/// Wires the admission gate to its collaborators and feeds it events read
/// from stdin, one per line. The stdin loop stands in for a production
/// display transport, which plugs in behind the `DisplayLayer` trait.
///
/// # Errors
/// Returns an error if the data directory cannot be prepared.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let clock = Arc::new(SystemClock);
    let store = Arc::new(
        FileStore::new(&args.data_dir)
            .with_context(|| format!("could not prepare data dir {}", args.data_dir))?,
    );
    let display = Arc::new(LogDisplay);
    let credentials = Arc::new(DisconnectedStore);
    // Code delivery is logged rather than sent; a real SMTP transport
    // implements `CodeSender` against `args.smtp`.
    let sender = Arc::new(LogCodeSender);

    let csrf = Arc::new(CsrfGuard::new(clock.clone()));
    let registry = Arc::new(AccessRegistry::new(clock.clone(), store.clone()));
    let admin = AdminChannel::new(
        args.operator_id,
        registry.clone(),
        csrf.clone(),
        display.clone(),
    );
    let second_factor = SecondFactorIssuer::new(
        clock.clone(),
        store,
        sender,
        args.smtp.operator_email.clone(),
    );
    let gate = Arc::new(AdmissionGate::new(
        args.gate_secret,
        RateLimiter::new(RateLimits::new(), clock),
        second_factor,
        csrf,
        registry,
        admin,
        display,
        credentials,
    ));

    let (tx, rx) = mpsc::channel::<InboundEvent>(64);
    let worker = tokio::spawn(Arc::clone(&gate).run(rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_event(&line) {
            Some(event) => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            None => warn!(line, "unparseable input line"),
        }
    }
    drop(tx);

    worker.await.context("admission gate task failed")?;
    Ok(())
}

/// Parse one stdin line into an event.
///
/// Format: `text <principal> <name> <message...>` or
/// `action <principal> <name> <data>`.
fn parse_event(line: &str) -> Option<InboundEvent> {
    let mut parts = line.splitn(4, ' ');
    let kind = parts.next()?;
    let principal: PrincipalId = parts.next()?.parse().ok()?;
    let display_name = parts.next()?.to_string();
    let rest = parts.next().unwrap_or_default().to_string();

    match kind {
        "text" => Some(InboundEvent::Text {
            principal,
            display_name,
            text: rest,
        }),
        "action" => Some(InboundEvent::Action {
            principal,
            display_name,
            data: rest,
        }),
        _ => None,
    }
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("operator_id", args.operator_id.to_string()),
        ("smtp_server", args.smtp.server.clone()),
        ("smtp_port", args.smtp.port.to_string()),
        ("operator_email", args.smtp.operator_email.clone()),
        ("data_dir", args.data_dir.clone()),
    ];
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "pordisto {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
