//! Virtual card storage
//!
//! Persists the virtual card as JSON so secrets survive between runs of the
//! CLI. Stores built with [`CardDataStore::in_memory`] never touch disk.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::state::CardState;

/// JSON file holding one virtual card
pub struct CardDataStore {
    state_file: Option<PathBuf>,
    pub state: CardState,
}

impl CardDataStore {
    const DEFAULT_STATE_FILE: &'static str = "seedkeeper_card.json";

    /// `$SEEDKEEPER_SIM_DIR`, else the platform data directory
    pub fn default_storage_dir() -> PathBuf {
        if let Ok(path) = std::env::var("SEEDKEEPER_SIM_DIR") {
            return PathBuf::from(path);
        }
        if let Some(dir) = dirs::data_dir() {
            return dir.join("seedkeeper-tool");
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".seedkeeper-tool");
        }
        PathBuf::from(".seedkeeper-tool")
    }

    /// Store backed by `<dir>/seedkeeper_card.json`
    pub fn new(storage_dir: Option<PathBuf>, initial: CardState) -> Self {
        let dir = storage_dir.unwrap_or_else(Self::default_storage_dir);
        Self {
            state_file: Some(dir.join(Self::DEFAULT_STATE_FILE)),
            state: initial,
        }
    }

    pub fn in_memory(state: CardState) -> Self {
        Self {
            state_file: None,
            state,
        }
    }

    pub fn state_file(&self) -> Option<&Path> {
        self.state_file.as_deref()
    }

    /// Replace the current state with the persisted one, if any
    ///
    /// On false the current state is kept and written by the next save.
    pub fn load(&mut self) -> bool {
        let Some(path) = &self.state_file else {
            return false;
        };
        if !path.exists() {
            info!("No virtual card at {:?}, starting blank", path);
            return false;
        }
        match read_state(path) {
            Ok(state) => {
                self.state = state;
                info!("Loaded virtual card from {:?}", path);
                true
            }
            Err(e) => {
                warn!("Ignoring virtual card at {:?}: {}", path, e);
                false
            }
        }
    }

    pub fn save(&self) -> bool {
        let Some(path) = &self.state_file else {
            return true;
        };
        match write_state(path, &self.state) {
            Ok(()) => {
                debug!("Saved virtual card to {:?}", path);
                true
            }
            Err(e) => {
                warn!("Failed to save virtual card to {:?}: {}", path, e);
                false
            }
        }
    }

    pub fn get_state(&self) -> &CardState {
        &self.state
    }

    pub fn get_state_mut(&mut self) -> &mut CardState {
        &mut self.state
    }
}

#[derive(Debug, thiserror::Error)]
enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed state: {0}")]
    Json(#[from] serde_json::Error),
}

fn read_state(path: &Path) -> Result<CardState, StoreError> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// Written owner-only: the file holds secrets in the clear
fn write_state(path: &Path, state: &CardState) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(state)?;
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // Files left by older runs keep their mode on open
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(json.as_bytes())?;
    Ok(())
}
