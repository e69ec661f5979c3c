// SPDX-License-Identifier: MPL-2.0

//! Persistent configuration file
//!
//! The file holds the same JSON object that `GET /config` returns. It is read
//! once at startup through the live-update validation path and rewritten
//! after every update that changed something.

use crate::config::{ConfigUpdate, StreamConfig};
use crate::constants::storage as names;
use crate::errors::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where the config file lives.
///
/// `$CAMERA_TX_CONFIG_PATH`, then `<XDG config>/camera-tx/config.json`,
/// then `~/.camera-tx/config.json`, then `./config.json`.
pub fn resolve_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(names::CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join(names::CONFIG_DIR_NAME).join(names::CONFIG_FILE_NAME);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(names::HOME_DIR_NAME).join(names::CONFIG_FILE_NAME);
    }
    PathBuf::from(names::CONFIG_FILE_NAME)
}

/// Create the parent directory (owner-only on unix) if it does not exist
pub fn ensure_parent_dir(path: &Path) -> Result<(), ConfigError> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if parent.exists() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(parent)?;
    }
    #[cfg(not(unix))]
    fs::create_dir_all(parent)?;

    debug!(dir = %parent.display(), "Created config directory");
    Ok(())
}

/// Read and validate a config file.
///
/// Every field goes through [`StreamConfig::apply`] on top of the defaults,
/// so out-of-range values are dropped exactly like over HTTP.
pub fn load_config(path: &Path) -> Result<StreamConfig, ConfigError> {
    let bytes = fs::read(path)?;
    let update = ConfigUpdate::from_json(&bytes)?;
    let mut config = StreamConfig::default();
    config.apply(&update);
    Ok(config)
}

/// Write `config` as pretty JSON.
///
/// The file is written next to the target and renamed into place, so a
/// reader never sees a partial file.
pub fn save_config(path: &Path, config: &StreamConfig) -> Result<(), ConfigError> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(config)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Load the config at `path`, writing defaults if it is missing or unreadable
pub fn load_or_init(path: &Path) -> StreamConfig {
    match load_config(path) {
        Ok(config) => {
            info!(path = %path.display(), config = %config, "Loaded configuration");
            config
        }
        Err(e) => {
            if path.exists() {
                warn!(path = %path.display(), error = %e, "Config file unusable, rewriting defaults");
            } else {
                info!(path = %path.display(), "No config file, creating defaults");
            }
            let config = StreamConfig::default();
            if let Err(e) = save_config(path, &config) {
                warn!(path = %path.display(), error = %e, "Failed to write default config");
            }
            config
        }
    }
}

/// Saves the configuration after updates; persistence is optional
#[derive(Clone, Debug, Default)]
pub struct ConfigPersister {
    path: Option<PathBuf>,
}

impl ConfigPersister {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// A persister that never writes
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Save `config`; failures are logged and otherwise ignored
    pub fn persist(&self, config: &StreamConfig) {
        let Some(path) = &self.path else {
            return;
        };
        match save_config(path, config) {
            Ok(()) => debug!(path = %path.display(), "Configuration saved"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to save configuration"),
        }
    }
}
