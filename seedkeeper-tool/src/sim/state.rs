//! Virtual card state
//!
//! Everything the virtual card persists between sessions. Byte fields are
//! stored base64-encoded in the JSON state file.

use serde::{Deserialize, Serialize};

use crate::card::{CardType, FirmwareVersion, LogEntry};

/// Custom serde module for base64 encoding of byte vectors
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if bytes.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str(&STANDARD.encode(bytes))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Audit records kept by the card before the oldest is dropped
pub const LOG_CAPACITY: usize = 64;

/// Simulated EEPROM available for secrets
pub const TOTAL_MEMORY: u16 = 8192;

/// Per-secret bookkeeping overhead charged against memory
pub const SECRET_OVERHEAD: usize = 24;

/// PIN and unblock code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinData {
    #[serde(with = "base64_bytes")]
    pub pin_hash: Vec<u8>,
    pub pin_tries_remaining: u8,
    pub pin_max_tries: u8,
    #[serde(with = "base64_bytes")]
    pub puk_hash: Vec<u8>,
    pub puk_tries_remaining: u8,
    pub puk_max_tries: u8,
    pub min_length: u8,
    pub max_length: u8,
}

impl Default for PinData {
    fn default() -> Self {
        Self {
            pin_hash: Vec::new(),
            pin_tries_remaining: 0,
            pin_max_tries: 0,
            puk_hash: Vec::new(),
            puk_tries_remaining: 0,
            puk_max_tries: 0,
            min_length: 4,
            max_length: 16,
        }
    }
}

/// One secret held by the virtual card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSecret {
    pub id: u16,
    pub secret_type: u8,
    pub origin: u8,
    pub export_rights: u8,
    pub subtype: u8,
    pub nb_export_plain: u8,
    pub label: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl StoredSecret {
    pub fn memory_cost(&self) -> usize {
        SECRET_OVERHEAD + self.label.len() + self.payload.len()
    }
}

/// Complete virtual card state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardState {
    pub card_type: CardType,
    pub firmware: FirmwareVersion,
    pub setup_done: bool,
    pub is_seeded: bool,
    pub needs_secure_channel: bool,
    pub label: String,
    pub pin_data: PinData,
    pub secrets: Vec<StoredSecret>,
    pub next_id: u16,
    /// BIP32 seed imported on a Satochip
    #[serde(with = "base64_bytes")]
    pub bip32_seed: Vec<u8>,
    /// Authenticity certificate (DER), empty when none
    #[serde(with = "base64_bytes")]
    pub certificate: Vec<u8>,
    /// Retained audit records, oldest first
    pub logs: Vec<LogEntry>,
    /// Records ever written, including dropped ones
    pub total_logs: u32,
}

impl Default for CardState {
    fn default() -> Self {
        Self::blank(CardType::Seedkeeper, 0, 2)
    }
}

impl CardState {
    /// Factory-fresh card of the given type and applet version
    pub fn blank(card_type: CardType, applet_major: u8, applet_minor: u8) -> Self {
        Self {
            card_type,
            firmware: FirmwareVersion {
                protocol_major: 0,
                protocol_minor: 1,
                applet_major,
                applet_minor,
            },
            setup_done: false,
            is_seeded: false,
            needs_secure_channel: false,
            label: String::new(),
            pin_data: PinData::default(),
            secrets: Vec::new(),
            next_id: 1,
            bip32_seed: Vec::new(),
            certificate: Vec::new(),
            logs: Vec::new(),
            total_logs: 0,
        }
    }

    pub fn find_secret(&self, id: u16) -> Option<&StoredSecret> {
        self.secrets.iter().find(|s| s.id == id)
    }

    pub fn used_memory(&self) -> usize {
        self.secrets.iter().map(StoredSecret::memory_cost).sum()
    }

    pub fn free_memory(&self) -> u16 {
        (TOTAL_MEMORY as usize).saturating_sub(self.used_memory()) as u16
    }

    /// Append an audit record, dropping the oldest beyond capacity
    pub fn append_log(&mut self, instruction: u8, id1: Option<u16>, id2: Option<u16>, status: u16) {
        self.logs.push(LogEntry {
            sequence: self.total_logs,
            instruction,
            secret_id1: id1,
            secret_id2: id2,
            status,
        });
        self.total_logs += 1;
        if self.logs.len() > LOG_CAPACITY {
            self.logs.remove(0);
        }
    }
}
