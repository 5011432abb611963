use anyhow::{Context, Result, anyhow};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "TONALHUB_LOG";
const LOG_FILE: &str = "tonalhub.log";
const DEFAULT_FILTER: &str = "tonalhub=info";

/// Installs the global subscriber. Output goes to a file in `dir` because
/// the terminal belongs to the UI.
pub fn init(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!("failed to install log subscriber: {err}"))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn events_land_in_the_log_file() {
        let dir = tempdir().expect("tempdir");
        let path = init(dir.path()).expect("init");

        tracing::info!(marker = "log-file-check", "hello from the test");

        let written = fs::read_to_string(&path).expect("read log");
        assert!(written.contains("log-file-check"));
        assert!(init(dir.path()).is_err(), "second install must fail");
    }
}
