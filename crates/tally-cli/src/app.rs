use std::path::Path;

use tally_core::dispatch::Dispatcher;
use tally_core::pending::{PendingActions, DEFAULT_TTL_MINUTES};
use tally_core::storage::SqliteStore;

use crate::cli::Cli;
use crate::config::{default_config_path, read_config};

/// Ledger path resolution order: flag/env, then config file.
pub fn resolve_ledger_path(cli: &Cli) -> anyhow::Result<String> {
    if let Some(path) = cli.ledger.clone() {
        return Ok(path);
    }

    let config_path = resolve_config_path()?;
    if !config_path.exists() {
        return Err(anyhow::anyhow!(
            "No ledger path provided. Use --ledger, set TALLY_LEDGER, or run `tally init`."
        ));
    }

    let config = read_config(&config_path)?;
    Ok(config.ledger.path)
}

pub fn resolve_config_path() -> anyhow::Result<std::path::PathBuf> {
    if let Ok(value) = std::env::var("TALLY_CONFIG") {
        if !value.trim().is_empty() {
            return Ok(std::path::PathBuf::from(value));
        }
    }
    default_config_path()
}

fn pending_ttl() -> i64 {
    let config_path = match resolve_config_path() {
        Ok(path) if path.exists() => path,
        _ => return DEFAULT_TTL_MINUTES,
    };
    read_config(&config_path)
        .map(|config| config.pending.ttl_minutes)
        .unwrap_or(DEFAULT_TTL_MINUTES)
}

/// Open the store and wrap it in a dispatcher with the configured TTL.
pub fn open_dispatcher(cli: &Cli) -> anyhow::Result<Dispatcher<SqliteStore>> {
    let target = resolve_ledger_path(cli)?;
    tracing::debug!(ledger = %target, "opening ledger");
    let store = SqliteStore::open(Path::new(&target))?;
    Ok(Dispatcher::with_pending(
        store,
        PendingActions::new(pending_ttl()),
    ))
}
