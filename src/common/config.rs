//! Runtime configuration loaded from the process environment.
//!
//! A `.env` file in the working directory fills in keys the environment does
//! not set. CLI flags in `main.rs` override individual fields after loading.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{ServeError, ServeResult};

/// Environment variable holding the logistic-regression artefact path.
pub const ENV_LR: &str = "LR";
/// Environment variable holding the random-forest artefact path.
pub const ENV_RF: &str = "RF";
/// Environment variable holding the predictions log path.
pub const ENV_PREDICTIONS: &str = "Pred_File_Path";
pub const ENV_BIND_ADDR: &str = "IRIS_BIND_ADDR";
pub const ENV_LOG_DELAY_MS: &str = "IRIS_LOG_DELAY_MS";
pub const ENV_LOG_QUEUE: &str = "IRIS_LOG_QUEUE";

/// Dotenv file read by [`AppCfg::load`].
pub const DOTENV_FILE: &str = ".env";

const DEFAULT_PREDICTIONS: &str = "predictions.json";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_LOG_DELAY_MS: u64 = 10_000;
const DEFAULT_LOG_QUEUE: usize = 1024;

/// Snapshot of configuration values consumed by the service.
#[derive(Clone, Debug)]
pub struct AppCfg {
    /// Absent paths are not an error here; the model store reports them.
    pub lr_path: Option<PathBuf>,
    pub rf_path: Option<PathBuf>,
    pub predictions_path: PathBuf,
    pub bind_addr: SocketAddr,
    /// Artificial delay before a prediction record is persisted.
    pub log_delay: Duration,
    pub log_queue: usize,
}

impl AppCfg {
    /// Create a configuration snapshot from the process environment and
    /// `./.env`.
    pub fn load() -> ServeResult<Self> {
        Self::load_with_dotenv(Path::new(DOTENV_FILE))
    }

    /// Like [`AppCfg::load`] with an explicit dotenv path. A missing file is
    /// not an error; process variables win over file entries.
    pub fn load_with_dotenv(dotenv: &Path) -> ServeResult<Self> {
        let file = read_dotenv(dotenv)?;
        Self::from_lookup(|key| env::var(key).ok().or_else(|| file.get(key).cloned()))
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ServeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = non_empty(ENV_BIND_ADDR)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ServeError::Config(format!("{ENV_BIND_ADDR}: {e}")))?;

        let log_delay_ms = match non_empty(ENV_LOG_DELAY_MS) {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| ServeError::Config(format!("{ENV_LOG_DELAY_MS}: {e}")))?,
            None => DEFAULT_LOG_DELAY_MS,
        };

        let log_queue = match non_empty(ENV_LOG_QUEUE) {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    ServeError::Config(format!("{ENV_LOG_QUEUE}: expected a positive integer"))
                })?,
            None => DEFAULT_LOG_QUEUE,
        };

        Ok(Self {
            lr_path: non_empty(ENV_LR).map(PathBuf::from),
            rf_path: non_empty(ENV_RF).map(PathBuf::from),
            predictions_path: non_empty(ENV_PREDICTIONS)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PREDICTIONS)),
            bind_addr,
            log_delay: Duration::from_millis(log_delay_ms),
            log_queue,
        })
    }
}

fn read_dotenv(path: &Path) -> ServeResult<HashMap<String, String>> {
    let parse_err = |e: dotenvy::Error| ServeError::Config(format!("{}: {e}", path.display()));
    match dotenvy::from_path_iter(path) {
        Ok(entries) => entries.map(|entry| entry.map_err(parse_err)).collect(),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(parse_err(e)),
    }
}
