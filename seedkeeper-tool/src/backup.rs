//! Card backup document
//!
//! A JSON snapshot of card metadata and secret headers. Secret plaintext is
//! present only for the secrets the user asked to include.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::card::{AuthenticityStatus, Card, CardType, FirmwareVersion, SeedkeeperVersion};
use crate::secret::{SecretHeader, SecretPayload};

/// Current backup document version
pub const BACKUP_FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("failed to access backup file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid backup document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported backup format version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCard {
    pub card_type: CardType,
    pub label: Option<String>,
    pub firmware_version: FirmwareVersion,
    pub seedkeeper_version: Option<SeedkeeperVersion>,
    pub authenticity_status: AuthenticityStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSecret {
    #[serde(flatten)]
    pub header: SecretHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<SecretPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub card: BackupCard,
    pub secrets: Vec<BackupSecret>,
}

impl Backup {
    pub fn new(card: &Card, secrets: Vec<BackupSecret>) -> Self {
        Self {
            format_version: BACKUP_FORMAT_VERSION,
            created_at: Utc::now(),
            card: BackupCard {
                card_type: card.card_type,
                label: card.label.clone(),
                firmware_version: card.firmware_version,
                seedkeeper_version: card.seedkeeper_version,
                authenticity_status: card.authenticity_status,
            },
            secrets,
        }
    }

    /// Secrets whose plaintext is part of this backup
    pub fn with_payload(&self) -> impl Iterator<Item = &BackupSecret> {
        self.secrets.iter().filter(|s| s.payload.is_some())
    }

    pub fn to_json(&self) -> Result<String, BackupError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, BackupError> {
        let backup: Backup = serde_json::from_str(json)?;
        if backup.format_version != BACKUP_FORMAT_VERSION {
            return Err(BackupError::UnsupportedVersion(backup.format_version));
        }
        Ok(backup)
    }

    /// Write to `path`, owner-readable only when plaintext is included
    ///
    /// The permissions are in place before any byte is written.
    pub fn save(&self, path: &Path) -> Result<(), BackupError> {
        let json = self.to_json()?;
        let private = self.with_payload().next().is_some();
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        if private {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        // mode() only applies when the file is created
        #[cfg(unix)]
        if private {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(json.as_bytes())?;
        debug!("Backup written to {:?} (private: {})", path, private);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, BackupError> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}
