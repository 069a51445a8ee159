//! Audit trail maintenance tool
//!
//! Usage:
//!   cargo run -p audit-api --bin audit-admin -- cleanup --retention-days 2190 --dry-run
//!   cargo run -p audit-api --bin audit-admin -- replay-spool --path /var/spool/audit.jsonl
//!
//! Reads the same environment as the server; without `DATABASE_URL` it
//! operates on an empty in-memory store, which is only useful for trying it out.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use audit_api::server::{build_app_state, open_store};
use audit_common::{try_init_tracing, AppConfig, RetentionSettings};
use audit_service::services::{CleanupRequest, PurgeConfirmation, PurgePrompt, RetentionManager};
use audit_service::{FileSpool, ServiceError};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "audit-admin")]
#[command(about = "Maintain the clinic audit trail")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Purge events older than the retention horizon
    Cleanup {
        /// Retention horizon in days
        #[arg(
            long,
            env = "AUDIT_RETENTION_DAYS",
            value_parser = clap::value_parser!(u32)
                .range(0..=i64::from(RetentionSettings::MAX_RETENTION_DAYS))
        )]
        retention_days: Option<u32>,

        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,

        /// Events deleted per batch
        #[arg(long, env = "AUDIT_RETENTION_BATCH_SIZE")]
        batch_size: Option<u32>,
    },

    /// Re-append events spooled while the store was unavailable
    ReplaySpool {
        /// Spool file; defaults to AUDIT_SPOOL_PATH
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

/// Asks the operator on the terminal
struct StdinConfirmation;

#[async_trait]
impl PurgeConfirmation for StdinConfirmation {
    async fn confirm(&self, prompt: &PurgePrompt) -> bool {
        let question = format!("{prompt} [y/N] ");
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            // Prompt failures just mean no confirmation
            let _ = write!(stderr, "{question}");
            let _ = stderr.flush();
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => is_affirmative(&line),
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read confirmation");
                false
            }
            Err(e) => {
                warn!(error = %e, "Confirmation prompt aborted");
                false
            }
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = try_init_tracing() {
        eprintln!("Warning: Failed to initialize tracing: {}", e);
    }

    // Env-backed arguments read the .env file too
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;

    match args.command {
        Command::Cleanup {
            retention_days,
            dry_run,
            force,
            batch_size,
        } => {
            let defaults = CleanupRequest::from(&config.retention);
            let request = CleanupRequest {
                retention_days: retention_days.unwrap_or(defaults.retention_days),
                dry_run,
                force,
                batch_size: batch_size.unwrap_or(defaults.batch_size),
            };
            cleanup(config, request).await
        }
        Command::ReplaySpool { path } => {
            let path = path
                .or_else(|| config.pipeline.spool_path.clone())
                .context("no spool path given and AUDIT_SPOOL_PATH is not set")?;
            replay_spool(config, path).await
        }
    }
}

async fn cleanup(config: AppConfig, request: CleanupRequest) -> anyhow::Result<()> {
    info!(
        retention_days = request.retention_days,
        dry_run = request.dry_run,
        force = request.force,
        batch_size = request.batch_size,
        "Starting retention cleanup"
    );

    let store = open_store(&config).await?;
    let state = build_app_state(config, store)?;
    let ctx = state.service_context();

    let result = RetentionManager::new(ctx)
        .cleanup(request, &StdinConfirmation)
        .await;

    // The PURGE event may have gone through the pipeline
    let report = ctx.pipeline().shutdown().await;
    if !report.drained {
        warn!(abandoned = report.abandoned, "Audit pipeline did not drain");
    }

    match result {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(ServiceError::ConfirmationDeclined) => {
            eprintln!("Cleanup cancelled; nothing was deleted.");
            Ok(())
        }
        Err(e) => Err(e).context("retention cleanup failed"),
    }
}

async fn replay_spool(config: AppConfig, path: PathBuf) -> anyhow::Result<()> {
    let spool = FileSpool::new(path);
    let pending = spool.len()?;
    if pending == 0 {
        info!(path = %spool.path().display(), "Spool is empty");
        return Ok(());
    }

    info!(path = %spool.path().display(), pending, "Replaying audit spool");
    let store = open_store(&config).await?;
    let report = spool.replay(store.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.malformed > 0 {
        warn!(
            quarantine = %spool.quarantine_path().display(),
            malformed = report.malformed,
            "Unreadable spool lines were quarantined"
        );
    }
    if report.failed > 0 {
        anyhow::bail!("{} spooled events could not be persisted", report.failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_answers() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("no"));
    }

    #[test]
    fn test_cleanup_args() {
        let args = Args::try_parse_from([
            "audit-admin",
            "cleanup",
            "--retention-days",
            "30",
            "--dry-run",
            "--batch-size",
            "200",
        ])
        .unwrap();
        match args.command {
            Command::Cleanup {
                retention_days,
                dry_run,
                force,
                batch_size,
            } => {
                assert_eq!(retention_days, Some(30));
                assert!(dry_run);
                assert!(!force);
                assert_eq!(batch_size, Some(200));
            }
            Command::ReplaySpool { .. } => panic!("expected cleanup"),
        }
    }

    #[test]
    fn test_retention_days_beyond_bound_rejected() {
        let result = Args::try_parse_from([
            "audit-admin",
            "cleanup",
            "--retention-days",
            "100000000",
            "--dry-run",
        ]);
        assert!(result.is_err());
    }
}
