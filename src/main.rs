//! doc_transfer - move a document between the personal and team domains
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌──────────┐
//! │  Config  │───▶│ Recovery │───▶│ Coordinator  │───▶│ Outcome  │
//! │  (YAML)  │    │  (log)   │    │ (FSM + log)  │    │  (JSON)  │
//! └──────────┘    └──────────┘    └──────────────┘    └──────────┘
//! ```
//!
//! Usage:
//!   doc_transfer [--env dev] [--to-team <id> | --to-personal <id>] [--skip-sync]
//!
//! Pending transfers from a previous run are always recovered first.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::{error, info};

use doc_transfer::config::AppConfig;
use doc_transfer::transfer::adapters::{
    JsonDocumentStore, JsonMetadataIndex, OfflineHost, StaticIdentity,
};
use doc_transfer::transfer::{
    Collaborators, FileKvStore, TransferCoordinator, TransferDirection, TransferLog,
    TransferOutcome,
};

/// 0 committed or discarded, 1 rejected or rolled back, 2 needs operator attention
fn exit_status(outcome: &TransferOutcome) -> u8 {
    match outcome.error() {
        Some(err) if err.is_fatal() => 2,
        _ if outcome.success() => 0,
        _ => 1,
    }
}

fn arg_value(args: &[String], names: &[&str]) -> Option<String> {
    args.iter()
        .position(|a| names.contains(&a.as_str()))
        .and_then(|i| args.get(i + 1).cloned())
}

fn get_env(args: &[String]) -> String {
    arg_value(args, &["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn get_request(args: &[String]) -> anyhow::Result<Option<(String, TransferDirection)>> {
    let to_team = arg_value(args, &["--to-team"]);
    let to_personal = arg_value(args, &["--to-personal"]);
    match (to_team, to_personal) {
        (Some(_), Some(_)) => bail!("--to-team and --to-personal are mutually exclusive"),
        (Some(id), None) => Ok(Some((id, TransferDirection::ToTeam))),
        (None, Some(id)) => Ok(Some((id, TransferDirection::ToPersonal))),
        (None, None) => Ok(None),
    }
}

fn build_coordinator(config: &AppConfig) -> anyhow::Result<TransferCoordinator> {
    let storage = &config.storage;
    let documents = JsonDocumentStore::open(storage.documents_dir())
        .context("Failed to open document store")?;
    let metadata =
        JsonMetadataIndex::open(storage.state_dir()).context("Failed to open metadata index")?;
    let log_store = FileKvStore::open(storage.state_dir()).context("Failed to open transfer log")?;

    let collaborators = Collaborators {
        documents: Arc::new(documents),
        identity: Arc::new(StaticIdentity::new(
            config.identity.as_ref().map(Into::into),
        )),
        host: Arc::new(OfflineHost),
        metadata: Arc::new(metadata),
    };

    Ok(TransferCoordinator::with_defaults(
        collaborators,
        TransferLog::new(Arc::new(log_store)),
        config.transfer_options(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args: Vec<String> = std::env::args().collect();
    let env = get_env(&args);
    let request = get_request(&args)?;

    let mut config = AppConfig::load(&env)?;
    if args.iter().any(|a| a == "--skip-sync") {
        config.transfer.skip_server_sync = true;
    }
    let _log_guard = doc_transfer::logging::init_logging(&config);

    info!("Starting doc_transfer in {} mode", env);

    let coordinator = build_coordinator(&config)?;

    // Must run before any new transfer is accepted
    match coordinator.recover_pending_transfer().await? {
        Some(outcome) => {
            info!(success = outcome.success(), rolled_back = outcome.rolled_back(), "Recovered pending transfer");
            println!("{}", serde_json::json!({ "recovered": outcome.to_json() }));
        }
        None => info!("Nothing to recover"),
    }

    let Some((document_id, direction)) = request else {
        return Ok(ExitCode::SUCCESS);
    };

    let outcome = coordinator
        .execute_transfer(&document_id, direction, coordinator.default_options())
        .await;
    println!("{}", outcome.to_json());

    let status = exit_status(&outcome);
    if status == 2
        && let Some(err) = outcome.error()
    {
        error!(code = err.code(), "Transfer needs operator attention: {}", err);
    }
    // Returned rather than exiting so the log guard flushes on drop
    Ok(ExitCode::from(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_transfer::{Document, TransferError};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exit_status() {
        let committed = TransferOutcome::Committed {
            document: Document::personal("doc-1", "Plan"),
        };
        let rejected = TransferOutcome::Rejected {
            error: TransferError::TransferInProgress,
        };
        let fatal = TransferOutcome::Failed {
            error: TransferError::CommitFailed("gone".into()),
        };
        assert_eq!(exit_status(&committed), 0);
        assert_eq!(exit_status(&rejected), 1);
        assert_eq!(exit_status(&fatal), 2);
    }

    #[test]
    fn test_get_request() {
        assert_eq!(get_env(&args(&["bin"])), "dev");
        assert_eq!(get_env(&args(&["bin", "-e", "prod"])), "prod");

        let (id, direction) = get_request(&args(&["bin", "--to-team", "doc-1"]))
            .unwrap()
            .unwrap();
        assert_eq!(id, "doc-1");
        assert_eq!(direction, TransferDirection::ToTeam);

        assert!(get_request(&args(&["bin", "--to-team", "a", "--to-personal", "b"])).is_err());
        assert!(get_request(&args(&["bin"])).unwrap().is_none());
    }
}
