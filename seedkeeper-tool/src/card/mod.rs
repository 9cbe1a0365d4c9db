//! Card data model
//!
//! What the host knows about the connected secure element: its type and
//! firmware, the status block it reports, and which features it supports.
//! Every feature check in the controller and in the CLI goes through
//! [`Card::supports`] / [`Card::check`].

pub mod authenticity;
pub mod logs;

pub use authenticity::Truststore;
pub use logs::LogEntry;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NotSuitable;

/// Card family, as determined by the applet AID that answered SELECT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardType {
    Satochip,
    Seedkeeper,
    SatochipEdu,
    Unknown,
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CardType::Satochip => "Satochip",
            CardType::Seedkeeper => "Seedkeeper",
            CardType::SatochipEdu => "Satochip Edu",
            CardType::Unknown => "unknown card",
        };
        f.write_str(name)
    }
}

/// Seedkeeper applet generation; gates feature availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SeedkeeperVersion {
    V1,
    V2,
}

impl SeedkeeperVersion {
    /// Applet 0.1 is V1; 0.2 and later is V2
    pub fn from_applet_version(major: u8, minor: u8) -> Self {
        if (major, minor) < (0, 2) {
            SeedkeeperVersion::V1
        } else {
            SeedkeeperVersion::V2
        }
    }
}

impl fmt::Display for SeedkeeperVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedkeeperVersion::V1 => f.write_str("V1"),
            SeedkeeperVersion::V2 => f.write_str("V2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthenticityStatus {
    #[default]
    Unknown,
    Verified,
    Failed,
}

/// Card capabilities offered to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// List, read and import mnemonics and passwords
    SecretStorage,
    FreeTextSecrets,
    WalletDescriptors,
    SecretErase,
    Logs,
    Backup,
    CardLabel,
    NativeSeedGeneration,
    SeedImport,
}

impl Feature {
    /// Oldest Seedkeeper generation offering this feature
    pub fn minimum_version(self) -> SeedkeeperVersion {
        match self {
            Feature::FreeTextSecrets | Feature::WalletDescriptors | Feature::SecretErase => {
                SeedkeeperVersion::V2
            }
            _ => SeedkeeperVersion::V1,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::SecretStorage => "secret storage",
            Feature::FreeTextSecrets => "free text secrets",
            Feature::WalletDescriptors => "wallet descriptors",
            Feature::SecretErase => "secret erase",
            Feature::Logs => "card logs",
            Feature::Backup => "backup",
            Feature::CardLabel => "card label",
            Feature::NativeSeedGeneration => "on-card seed generation",
            Feature::SeedImport => "seed import",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub protocol_major: u8,
    pub protocol_minor: u8,
    pub applet_major: u8,
    pub applet_minor: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} (protocol {}.{})",
            self.applet_major, self.applet_minor, self.protocol_major, self.protocol_minor
        )
    }
}

/// Status block returned by GET_STATUS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardStatus {
    pub firmware: FirmwareVersion,
    pub pin_tries_remaining: u8,
    pub puk_tries_remaining: u8,
    pub needs_2fa: bool,
    pub is_seeded: bool,
    pub setup_done: bool,
    pub needs_secure_channel: bool,
}

impl CardStatus {
    pub const MIN_SIZE: usize = 12;

    /// Parse the GET_STATUS response body
    ///
    /// Layout: proto_maj proto_min applet_maj applet_min pin0 puk0 pin1 puk1
    /// needs2fa rfu is_seeded setup_done [needs_secure_channel]
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::MIN_SIZE {
            return None;
        }
        Some(Self {
            firmware: FirmwareVersion {
                protocol_major: data[0],
                protocol_minor: data[1],
                applet_major: data[2],
                applet_minor: data[3],
            },
            pin_tries_remaining: data[4],
            puk_tries_remaining: data[5],
            needs_2fa: data[8] != 0,
            is_seeded: data[10] != 0,
            setup_done: data[11] != 0,
            needs_secure_channel: data.get(12).is_some_and(|&b| b != 0),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        vec![
            self.firmware.protocol_major,
            self.firmware.protocol_minor,
            self.firmware.applet_major,
            self.firmware.applet_minor,
            self.pin_tries_remaining,
            self.puk_tries_remaining,
            0x00,
            0x00,
            self.needs_2fa as u8,
            0x00,
            self.is_seeded as u8,
            self.setup_done as u8,
            self.needs_secure_channel as u8,
        ]
    }
}

/// Storage and log counters returned by GET_SEEDKEEPER_STATUS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedkeeperStatus {
    pub secret_count: u16,
    pub total_memory: u16,
    pub free_memory: u16,
    pub total_logs: u16,
    pub available_logs: u16,
    pub last_log: Option<LogEntry>,
}

impl SeedkeeperStatus {
    pub const SIZE: usize = 10 + LogEntry::RECORD_SIZE;

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        let word = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
        let total_logs = word(6);
        Some(Self {
            secret_count: word(0),
            total_memory: word(2),
            free_memory: word(4),
            total_logs,
            available_logs: word(8),
            last_log: if total_logs == 0 {
                None
            } else {
                LogEntry::from_record(total_logs.saturating_sub(1) as u32, &data[10..Self::SIZE])
            },
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        for word in [
            self.secret_count,
            self.total_memory,
            self.free_memory,
            self.total_logs,
            self.available_logs,
        ] {
            out.extend_from_slice(&word.to_be_bytes());
        }
        match &self.last_log {
            Some(entry) => out.extend_from_slice(&entry.to_record()),
            None => out.extend_from_slice(&[0u8; LogEntry::RECORD_SIZE]),
        }
        out
    }
}

/// The connected card as seen by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub card_type: CardType,
    pub label: Option<String>,
    pub firmware_version: FirmwareVersion,
    /// Only set for Seedkeeper cards
    pub seedkeeper_version: Option<SeedkeeperVersion>,
    pub authenticity_status: AuthenticityStatus,
    pub is_seeded: bool,
    pub setup_done: bool,
}

impl Card {
    pub fn new(card_type: CardType, status: &CardStatus) -> Self {
        let seedkeeper_version = match card_type {
            CardType::Seedkeeper => Some(SeedkeeperVersion::from_applet_version(
                status.firmware.applet_major,
                status.firmware.applet_minor,
            )),
            _ => None,
        };
        Self {
            card_type,
            label: None,
            firmware_version: status.firmware,
            seedkeeper_version,
            authenticity_status: AuthenticityStatus::Unknown,
            is_seeded: status.is_seeded,
            setup_done: status.setup_done,
        }
    }

    pub fn supports(&self, feature: Feature) -> bool {
        match self.card_type {
            CardType::Seedkeeper => self
                .seedkeeper_version
                .is_some_and(|version| version >= feature.minimum_version()),
            CardType::Satochip | CardType::SatochipEdu => {
                matches!(feature, Feature::CardLabel | Feature::SeedImport)
            }
            CardType::Unknown => false,
        }
    }

    /// Like [`Card::supports`], but explains a refusal
    pub fn check(&self, feature: Feature) -> Result<(), NotSuitable> {
        if self.supports(feature) {
            return Ok(());
        }
        let required = match self.card_type {
            CardType::Seedkeeper => Some(feature.minimum_version()),
            _ => None,
        };
        Err(NotSuitable::Feature {
            feature,
            card_type: self.card_type,
            required,
        })
    }

    /// Refresh the fields GET_STATUS reports
    pub fn apply_status(&mut self, status: &CardStatus) {
        self.firmware_version = status.firmware;
        self.is_seeded = status.is_seeded;
        self.setup_done = status.setup_done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(applet_major: u8, applet_minor: u8) -> CardStatus {
        CardStatus {
            firmware: FirmwareVersion {
                protocol_major: 0,
                protocol_minor: 1,
                applet_major,
                applet_minor,
            },
            pin_tries_remaining: 5,
            puk_tries_remaining: 5,
            needs_2fa: false,
            is_seeded: true,
            setup_done: true,
            needs_secure_channel: false,
        }
    }

    #[test]
    fn test_seedkeeper_version_from_applet() {
        assert_eq!(SeedkeeperVersion::from_applet_version(0, 1), SeedkeeperVersion::V1);
        assert_eq!(SeedkeeperVersion::from_applet_version(0, 2), SeedkeeperVersion::V2);
        assert_eq!(SeedkeeperVersion::from_applet_version(1, 0), SeedkeeperVersion::V2);
    }

    #[test]
    fn test_v1_feature_matrix() {
        let card = Card::new(CardType::Seedkeeper, &status(0, 1));
        assert!(card.supports(Feature::SecretStorage));
        assert!(card.supports(Feature::Logs));
        assert!(!card.supports(Feature::WalletDescriptors));
        assert!(!card.supports(Feature::SecretErase));
        assert_eq!(
            card.check(Feature::WalletDescriptors),
            Err(NotSuitable::Feature {
                feature: Feature::WalletDescriptors,
                card_type: CardType::Seedkeeper,
                required: Some(SeedkeeperVersion::V2),
            })
        );
    }

    #[test]
    fn test_v2_feature_matrix() {
        let card = Card::new(CardType::Seedkeeper, &status(0, 2));
        assert!(card.supports(Feature::WalletDescriptors));
        assert!(card.supports(Feature::FreeTextSecrets));
        assert!(card.supports(Feature::SecretErase));
        assert!(card.check(Feature::Backup).is_ok());
    }

    #[test]
    fn test_satochip_feature_matrix() {
        let card = Card::new(CardType::Satochip, &status(0, 12));
        assert_eq!(card.seedkeeper_version, None);
        assert!(card.supports(Feature::CardLabel));
        assert!(card.supports(Feature::SeedImport));
        assert!(!card.supports(Feature::SecretStorage));
        assert!(matches!(
            card.check(Feature::SecretStorage),
            Err(NotSuitable::Feature { required: None, .. })
        ));
    }

    #[test]
    fn test_status_bytes() {
        let original = status(0, 2);
        let parsed = CardStatus::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(parsed, original);
        assert!(CardStatus::from_bytes(&[0u8; 11]).is_none());
    }

    #[test]
    fn test_seedkeeper_status_without_logs() {
        let status = SeedkeeperStatus {
            secret_count: 2,
            total_memory: 8192,
            free_memory: 8000,
            total_logs: 0,
            available_logs: 0,
            last_log: None,
        };
        assert_eq!(SeedkeeperStatus::from_bytes(&status.to_bytes()), Some(status));
    }
}
