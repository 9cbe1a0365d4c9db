//! Card audit log records
//!
//! The Seedkeeper applet keeps a ring of fixed-size records, one per
//! sensitive command: `ins(1) id1(2) id2(2) sw(2)`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::apdu::{ins, SW};

/// Secret id slot value meaning "no secret involved"
const NO_ID: u16 = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the card's log stream, oldest first
    pub sequence: u32,
    pub instruction: u8,
    pub secret_id1: Option<u16>,
    pub secret_id2: Option<u16>,
    pub status: u16,
}

impl LogEntry {
    pub const RECORD_SIZE: usize = 7;

    pub fn from_record(sequence: u32, record: &[u8]) -> Option<Self> {
        if record.len() < Self::RECORD_SIZE {
            return None;
        }
        let id = |i: usize| match u16::from_be_bytes([record[i], record[i + 1]]) {
            NO_ID => None,
            value => Some(value),
        };
        Some(Self {
            sequence,
            instruction: record[0],
            secret_id1: id(1),
            secret_id2: id(3),
            status: u16::from_be_bytes([record[5], record[6]]),
        })
    }

    pub fn to_record(&self) -> [u8; Self::RECORD_SIZE] {
        let id1 = self.secret_id1.unwrap_or(NO_ID).to_be_bytes();
        let id2 = self.secret_id2.unwrap_or(NO_ID).to_be_bytes();
        let sw = self.status.to_be_bytes();
        [self.instruction, id1[0], id1[1], id2[0], id2[1], sw[0], sw[1]]
    }

    pub fn operation(&self) -> &'static str {
        ins::name(self.instruction)
    }

    pub fn is_success(&self) -> bool {
        SW::is_success(self.status)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.sequence, self.operation())?;
        if let Some(id) = self.secret_id1 {
            write!(f, " secret {}", id)?;
        }
        if let Some(id) = self.secret_id2 {
            write!(f, " -> {}", id)?;
        }
        if self.is_success() {
            f.write_str(": ok")
        } else {
            write!(f, ": failed ({:04X})", self.status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record() {
        let entry = LogEntry::from_record(3, &[0xA2, 0x00, 0x05, 0xFF, 0xFF, 0x90, 0x00]).unwrap();
        assert_eq!(entry.instruction, ins::EXPORT_SECRET);
        assert_eq!(entry.secret_id1, Some(5));
        assert_eq!(entry.secret_id2, None);
        assert!(entry.is_success());
        assert_eq!(entry.to_string(), "#3 export secret secret 5: ok");
    }

    #[test]
    fn test_failed_record_display() {
        let entry = LogEntry {
            sequence: 0,
            instruction: ins::VERIFY_PIN,
            secret_id1: None,
            secret_id2: None,
            status: 0x63C2,
        };
        assert_eq!(entry.to_string(), "#0 verify PIN: failed (63C2)");
        assert_eq!(LogEntry::from_record(0, &entry.to_record()), Some(entry));
    }

    #[test]
    fn test_short_record() {
        assert!(LogEntry::from_record(0, &[0xA2, 0x00]).is_none());
    }
}
