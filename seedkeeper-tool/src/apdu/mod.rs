//! Command APDUs for the Satochip/Seedkeeper applet family
//!
//! Only the short ISO 7816-4 form is used: `CLA INS P1 P2 [Lc data]`. The
//! host serializes with [`APDU::to_bytes`]; the virtual card parses with
//! [`parse_apdu`]. Command data is wiped on drop since it routinely carries
//! PIN bytes or secret payloads.
//!
//! # Example
//! ```ignore
//! use seedkeeper_tool::apdu::{APDU, ins, CLA};
//!
//! let cmd = APDU::new(CLA, ins::GET_STATUS, 0x00, 0x00);
//! assert_eq!(&cmd.to_bytes().unwrap()[..], &[0xB0, 0x3C, 0x00, 0x00]);
//! ```

mod response;
mod status;

pub use response::Response;
pub use status::SW;

use std::fmt;

use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

/// Class byte of every applet command
pub const CLA: u8 = 0xB0;

/// Class byte of ISO SELECT
pub const CLA_ISO: u8 = 0x00;

/// Largest Lc a short APDU can carry
pub const MAX_SHORT_DATA: usize = 255;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("Lc {lc} does not match {available} bytes of command data")]
    LengthMismatch { lc: usize, available: usize },

    #[error("Command data too long for a short APDU: {0} bytes")]
    DataTooLong(usize),
}

#[derive(Clone, PartialEq, Eq)]
pub struct APDU {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl APDU {
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self::with_data(cla, ins, p1, p2, Vec::new())
    }

    pub fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self { cla, ins, p1, p2, data }
    }

    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, APDUError> {
        if self.data.len() > MAX_SHORT_DATA {
            return Err(APDUError::DataTooLong(self.data.len()));
        }
        let mut raw = Zeroizing::new(Vec::with_capacity(5 + self.data.len()));
        raw.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if !self.data.is_empty() {
            raw.push(self.data.len() as u8);
            raw.extend_from_slice(&self.data);
        }
        Ok(raw)
    }
}

impl Drop for APDU {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

// Command data is never printed, only its length.
impl fmt::Debug for APDU {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "APDU({:02X} {:02X} {:02X} {:02X}, {} bytes)",
            self.cla,
            self.ins,
            self.p1,
            self.p2,
            self.data.len()
        )
    }
}

/// Parse a short command APDU
///
/// A trailing Le byte is accepted and ignored; the applets never use it.
pub fn parse_apdu(raw: &[u8]) -> Result<APDU, APDUError> {
    let (header, body) = match raw {
        [cla, ins, p1, p2, body @ ..] => ([*cla, *ins, *p1, *p2], body),
        _ => return Err(APDUError::TooShort(raw.len())),
    };
    let [cla, ins, p1, p2] = header;

    let data = match body {
        [] | [_] => Vec::new(),
        [lc, rest @ ..] => {
            let lc = *lc as usize;
            match rest.len().checked_sub(lc) {
                Some(0) | Some(1) => rest[..lc].to_vec(),
                _ => {
                    return Err(APDUError::LengthMismatch {
                        lc,
                        available: rest.len(),
                    })
                }
            }
        }
    };
    Ok(APDU::with_data(cla, ins, p1, p2, data))
}

/// Applet instruction bytes
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const SETUP: u8 = 0x2A;
    pub const GET_STATUS: u8 = 0x3C;
    pub const CARD_LABEL: u8 = 0x3D;
    pub const VERIFY_PIN: u8 = 0x42;
    pub const CHANGE_PIN: u8 = 0x44;
    pub const LOGOUT_ALL: u8 = 0x60;
    pub const BIP32_IMPORT_SEED: u8 = 0x6C;
    pub const EXPORT_PKI_CERTIFICATE: u8 = 0x93;
    pub const GENERATE_MASTERSEED: u8 = 0xA0;
    pub const IMPORT_SECRET: u8 = 0xA1;
    pub const EXPORT_SECRET: u8 = 0xA2;
    pub const RESET_SECRET: u8 = 0xA5;
    pub const LIST_SECRET_HEADERS: u8 = 0xA6;
    pub const GET_SEEDKEEPER_STATUS: u8 = 0xA7;
    pub const PRINT_LOGS: u8 = 0xA9;

    /// Human-readable instruction name, used when formatting card logs
    pub fn name(ins: u8) -> &'static str {
        match ins {
            SELECT => "select",
            SETUP => "setup",
            GET_STATUS => "get status",
            CARD_LABEL => "card label",
            VERIFY_PIN => "verify PIN",
            CHANGE_PIN => "change PIN",
            LOGOUT_ALL => "logout",
            BIP32_IMPORT_SEED => "import seed",
            EXPORT_PKI_CERTIFICATE => "export certificate",
            GENERATE_MASTERSEED => "generate masterseed",
            IMPORT_SECRET => "import secret",
            EXPORT_SECRET => "export secret",
            RESET_SECRET => "erase secret",
            LIST_SECRET_HEADERS => "list secrets",
            GET_SEEDKEEPER_STATUS => "seedkeeper status",
            PRINT_LOGS => "print logs",
            _ => "unknown",
        }
    }
}

/// P1/P2 step values for multi-part commands (import, export, list, logs)
pub mod step {
    pub const INIT: u8 = 0x01;
    pub const UPDATE: u8 = 0x02;
    pub const FINAL: u8 = 0x03;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_only() {
        let apdu = parse_apdu(&[0xB0, 0x3C, 0x00, 0x00]).unwrap();
        assert_eq!(apdu.cla, CLA);
        assert_eq!(apdu.ins, ins::GET_STATUS);
        assert!(apdu.data.is_empty());
    }

    #[test]
    fn test_trailing_le_ignored() {
        let apdu = parse_apdu(&[0xB0, 0x3D, 0x01, 0x00, 0x00]).unwrap();
        assert!(apdu.data.is_empty());

        let select = parse_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x02, 0x53, 0x65, 0x00]).unwrap();
        assert_eq!(select.data, b"Se".to_vec());
    }

    #[test]
    fn test_pin_data() {
        let apdu = parse_apdu(&[0xB0, 0x42, 0x00, 0x00, 0x04, 0x31, 0x32, 0x33, 0x34]).unwrap();
        assert_eq!(apdu.ins, ins::VERIFY_PIN);
        assert_eq!(apdu.data, b"1234".to_vec());
    }

    #[test]
    fn test_bad_lengths() {
        assert_eq!(
            parse_apdu(&[0xB0, 0x42, 0x00, 0x00, 0x05, 0x31]),
            Err(APDUError::LengthMismatch { lc: 5, available: 1 })
        );
        assert_eq!(
            parse_apdu(&[0xB0, 0x42, 0x00, 0x00, 0x01, 0x31, 0x32, 0x33]),
            Err(APDUError::LengthMismatch { lc: 1, available: 3 })
        );
        assert_eq!(parse_apdu(&[0xB0, 0x42, 0x00]), Err(APDUError::TooShort(3)));
    }

    #[test]
    fn test_label_command_bytes() {
        let cmd = APDU::with_data(CLA, ins::CARD_LABEL, 0x00, 0x00, vec![0x03, b'a', b'b', b'c']);
        let raw = cmd.to_bytes().unwrap();
        assert_eq!(&raw[..], &[0xB0, 0x3D, 0x00, 0x00, 0x04, 0x03, b'a', b'b', b'c']);
        assert_eq!(parse_apdu(&raw).unwrap(), cmd);
    }

    #[test]
    fn test_extended_data_rejected() {
        let cmd = APDU::with_data(CLA, ins::IMPORT_SECRET, 0x01, 0x02, vec![0u8; 256]);
        assert_eq!(cmd.to_bytes(), Err(APDUError::DataTooLong(256)));
    }

    #[test]
    fn test_debug_hides_data() {
        let cmd = APDU::with_data(CLA, ins::VERIFY_PIN, 0x00, 0x00, b"123456".to_vec());
        assert_eq!(format!("{:?}", cmd), "APDU(B0 42 00 00, 6 bytes)");
    }
}
