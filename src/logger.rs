use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const APP_DIR: &str = "agentvm";
const LOG_FILE: &str = "agentvm.log";

static INIT: OnceLock<()> = OnceLock::new();
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the file logger. `RUST_LOG` overrides the default `info` filter.
/// Terminal output is handled separately by `output`.
pub fn init() -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let log_path = log_path()?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory at {}", parent.display()))?;
    }

    let (directory, file_name) = split_path(&log_path)?;
    let (writer, guard) = tracing_appender::non_blocking(rolling::never(directory, file_name));
    let _ = GUARD.set(guard);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    let _ = INIT.set(());
    Ok(())
}

/// `$XDG_STATE_HOME/agentvm/agentvm.log`, else `~/.local/state/agentvm/agentvm.log`.
fn log_path() -> Result<PathBuf> {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME")
        && !state_home.is_empty()
    {
        return Ok(PathBuf::from(state_home).join(APP_DIR).join(LOG_FILE));
    }

    if let Some(home) = home::home_dir() {
        return Ok(home
            .join(".local")
            .join("state")
            .join(APP_DIR)
            .join(LOG_FILE));
    }

    Ok(std::env::current_dir()?.join(LOG_FILE))
}

fn split_path(path: &Path) -> Result<(PathBuf, &str)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid log file name"))?;

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok((dir, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_separates_directory() {
        let path = PathBuf::from("/var/state/agentvm/agentvm.log");
        let (dir, name) = split_path(&path).unwrap();
        assert_eq!(dir, PathBuf::from("/var/state/agentvm"));
        assert_eq!(name, "agentvm.log");
    }

    #[test]
    fn split_path_rejects_root() {
        assert!(split_path(Path::new("/")).is_err());
    }
}
