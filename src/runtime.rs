//! Process-wide vendor runtime handle
//!
//! The vendor library keeps global state, so it is initialised once per
//! process no matter how many gateways are built. Repeated `init` and
//! `teardown` calls are no-ops.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::core::config::RuntimeConfig;
use crate::core::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub station: String,
    pub log_dir: PathBuf,
    pub started_at: DateTime<Utc>,
}

static RUNTIME: Lazy<Mutex<Option<RuntimeInfo>>> = Lazy::new(|| Mutex::new(None));

/// Returns `true` if this call performed the initialisation.
pub fn init(config: &RuntimeConfig) -> Result<bool> {
    let mut runtime = RUNTIME.lock();
    if let Some(current) = runtime.as_ref() {
        debug!(station = %current.station, "vendor runtime already initialised");
        return Ok(false);
    }

    std::fs::create_dir_all(&config.log_dir).map_err(|e| {
        Error::Config(format!("cannot create log dir {}: {}", config.log_dir.display(), e))
    })?;

    info!(station = %config.station, log_dir = %config.log_dir.display(), "vendor runtime initialised");
    *runtime = Some(RuntimeInfo {
        station: config.station.clone(),
        log_dir: config.log_dir.clone(),
        started_at: Utc::now(),
    });
    Ok(true)
}

/// Returns `true` if a live runtime was torn down.
pub fn teardown() -> bool {
    match RUNTIME.lock().take() {
        Some(info) => {
            info!(station = %info.station, "vendor runtime torn down");
            true
        }
        None => false,
    }
}

pub fn is_initialized() -> bool {
    RUNTIME.lock().is_some()
}

pub fn current() -> Option<RuntimeInfo> {
    RUNTIME.lock().clone()
}
