//! Secrets stored on a Seedkeeper card
//!
//! [`SecretHeader`] is the metadata the card reports when listing; the
//! decoded plaintext lives in a [`SecretPayload`], which is wiped on drop
//! and never logged.

pub mod codec;
pub mod mnemonic;

pub use codec::{decode, encode, fingerprint};

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::SecretProcessingError;
use codec::Reader;

/// Subtype bit flags, interpreted per secret type
pub mod subtype {
    /// Mnemonic carries a BIP39 passphrase
    pub const MNEMONIC_PASSPHRASE: u8 = 0x01;
    /// Mnemonic has 24 words (12 otherwise)
    pub const MNEMONIC_24_WORDS: u8 = 0x02;
    /// Password entry carries a URL
    pub const PASSWORD_URL: u8 = 0x01;
}

/// Export right: plaintext export allowed
pub const EXPORT_PLAINTEXT_ALLOWED: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecretType {
    Masterseed,
    Mnemonic,
    Password,
    FreeText,
    WalletDescriptor,
    /// A type this tool can list but not decode
    Other(u8),
}

impl SecretType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x10 => SecretType::Masterseed,
            0x30 => SecretType::Mnemonic,
            0x90 => SecretType::Password,
            0xC0 => SecretType::FreeText,
            0xC1 => SecretType::WalletDescriptor,
            other => SecretType::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            SecretType::Masterseed => 0x10,
            SecretType::Mnemonic => 0x30,
            SecretType::Password => 0x90,
            SecretType::FreeText => 0xC0,
            SecretType::WalletDescriptor => 0xC1,
            SecretType::Other(b) => b,
        }
    }

    /// Subtype bits that are meaningful for this type
    pub fn allowed_subtype_bits(self) -> u8 {
        match self {
            SecretType::Mnemonic => subtype::MNEMONIC_PASSPHRASE | subtype::MNEMONIC_24_WORDS,
            SecretType::Password => subtype::PASSWORD_URL,
            _ => 0x00,
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretType::Masterseed => f.write_str("masterseed"),
            SecretType::Mnemonic => f.write_str("mnemonic"),
            SecretType::Password => f.write_str("password"),
            SecretType::FreeText => f.write_str("free text"),
            SecretType::WalletDescriptor => f.write_str("wallet descriptor"),
            SecretType::Other(b) => write!(f, "type {:#04x}", b),
        }
    }
}

/// How the secret came to be on the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretOrigin {
    PlainImport,
    EncryptedImport,
    GeneratedOnCard,
    Other(u8),
}

impl SecretOrigin {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x01 => SecretOrigin::PlainImport,
            0x02 => SecretOrigin::EncryptedImport,
            0x03 => SecretOrigin::GeneratedOnCard,
            other => SecretOrigin::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            SecretOrigin::PlainImport => 0x01,
            SecretOrigin::EncryptedImport => 0x02,
            SecretOrigin::GeneratedOnCard => 0x03,
            SecretOrigin::Other(b) => b,
        }
    }
}

/// Secret metadata as reported by LIST_SECRET_HEADERS and EXPORT_SECRET
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretHeader {
    pub id: u16,
    pub secret_type: SecretType,
    pub origin: SecretOrigin,
    pub export_rights: u8,
    pub nb_export_plain: u8,
    pub nb_export_secure: u8,
    pub nb_export_pubkey: u8,
    #[serde(with = "hex_fingerprint")]
    pub fingerprint: [u8; 4],
    pub subtype: u8,
    pub label: String,
}

impl SecretHeader {
    /// Fixed part preceding the label
    pub const FIXED_SIZE: usize = 15;

    /// Parse a header, returning it with whatever follows the label
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), SecretProcessingError> {
        let mut reader = Reader::new(data);
        let id = reader.u16("secret id")?;
        let secret_type = SecretType::from_byte(reader.u8("secret type")?);
        let origin = SecretOrigin::from_byte(reader.u8("origin")?);
        let export_rights = reader.u8("export rights")?;
        let nb_export_plain = reader.u8("export counter")?;
        let nb_export_secure = reader.u8("export counter")?;
        let nb_export_pubkey = reader.u8("export counter")?;
        let mut fingerprint = [0u8; 4];
        fingerprint.copy_from_slice(reader.take(4, "fingerprint")?);
        let subtype = reader.u8("subtype")?;
        let _rfu = reader.u8("header")?;
        let label_len = reader.u8("label length")? as usize;
        let label = reader.string(label_len, "label")?;

        let header = Self {
            id,
            secret_type,
            origin,
            export_rights,
            nb_export_plain,
            nb_export_secure,
            nb_export_pubkey,
            fingerprint,
            subtype,
            label,
        };
        Ok((header, reader.rest()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let label = self.label.as_bytes();
        let mut out = Vec::with_capacity(Self::FIXED_SIZE + label.len());
        out.extend_from_slice(&self.id.to_be_bytes());
        out.push(self.secret_type.to_byte());
        out.push(self.origin.to_byte());
        out.push(self.export_rights);
        out.push(self.nb_export_plain);
        out.push(self.nb_export_secure);
        out.push(self.nb_export_pubkey);
        out.extend_from_slice(&self.fingerprint);
        out.push(self.subtype);
        out.push(0x00);
        out.push(label.len().min(u8::MAX as usize) as u8);
        out.extend_from_slice(&label[..label.len().min(u8::MAX as usize)]);
        out
    }

    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint)
    }

    pub fn is_exportable(&self) -> bool {
        self.export_rights & EXPORT_PLAINTEXT_ALLOWED != 0
    }
}

/// Decoded secret plaintext
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretPayload {
    Masterseed {
        #[serde(with = "hex_bytes")]
        seed: Vec<u8>,
    },
    Mnemonic {
        words: Vec<String>,
        passphrase: Option<String>,
    },
    Password {
        login: String,
        password: String,
        url: Option<String>,
    },
    FreeText {
        text: String,
    },
    WalletDescriptor {
        descriptor: String,
    },
}

impl SecretPayload {
    pub fn secret_type(&self) -> SecretType {
        match self {
            SecretPayload::Masterseed { .. } => SecretType::Masterseed,
            SecretPayload::Mnemonic { .. } => SecretType::Mnemonic,
            SecretPayload::Password { .. } => SecretType::Password,
            SecretPayload::FreeText { .. } => SecretType::FreeText,
            SecretPayload::WalletDescriptor { .. } => SecretType::WalletDescriptor,
        }
    }

    /// Subtype flags implied by the payload contents
    pub fn subtype(&self) -> u8 {
        match self {
            SecretPayload::Mnemonic { words, passphrase } => {
                let mut flags = 0;
                if passphrase.is_some() {
                    flags |= subtype::MNEMONIC_PASSPHRASE;
                }
                if words.len() == 24 {
                    flags |= subtype::MNEMONIC_24_WORDS;
                }
                flags
            }
            SecretPayload::Password { url: Some(_), .. } => subtype::PASSWORD_URL,
            _ => 0x00,
        }
    }
}

impl fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret material
        write!(f, "SecretPayload::{:?} {{ .. }}", self.secret_type())
    }
}

/// A secret fetched from the card: header plus decoded payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub header: SecretHeader,
    pub payload: SecretPayload,
}

impl Secret {
    pub fn id(&self) -> u16 {
        self.header.id
    }

    pub fn secret_type(&self) -> SecretType {
        self.header.secret_type
    }

    pub fn label(&self) -> &str {
        &self.header.label
    }
}

mod hex_fingerprint {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(fingerprint: &[u8; 4], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(fingerprint))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 4], D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut out = [0u8; 4];
        hex::decode_to_slice(&s, &mut out).map_err(serde::de::Error::custom)?;
        Ok(out)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> SecretHeader {
        SecretHeader {
            id: 3,
            secret_type: SecretType::Password,
            origin: SecretOrigin::PlainImport,
            export_rights: EXPORT_PLAINTEXT_ALLOWED,
            nb_export_plain: 2,
            nb_export_secure: 0,
            nb_export_pubkey: 0,
            fingerprint: [0xDE, 0xAD, 0xBE, 0xEF],
            subtype: subtype::PASSWORD_URL,
            label: "mail".to_string(),
        }
    }

    #[test]
    fn test_secret_type_bytes() {
        for b in [0x10, 0x30, 0x90, 0xC0, 0xC1, 0x40] {
            assert_eq!(SecretType::from_byte(b).to_byte(), b);
        }
        assert_eq!(SecretType::from_byte(0x40), SecretType::Other(0x40));
        assert_eq!(SecretType::Other(0x40).to_string(), "type 0x40");
    }

    #[test]
    fn test_header_parse_with_trailer() {
        let mut raw = header().to_bytes();
        raw.extend_from_slice(&[0x00, 0x2A]);

        let (parsed, rest) = SecretHeader::parse(&raw).unwrap();
        assert_eq!(parsed, header());
        assert_eq!(rest, &[0x00, 0x2A]);
        assert_eq!(parsed.fingerprint_hex(), "deadbeef");
        assert!(parsed.is_exportable());
    }

    #[test]
    fn test_header_label_overrun() {
        let mut raw = header().to_bytes();
        raw.truncate(raw.len() - 1);
        assert!(matches!(
            SecretHeader::parse(&raw),
            Err(SecretProcessingError::Truncated { field: "label", .. })
        ));
    }

    #[test]
    fn test_payload_subtype() {
        let payload = SecretPayload::Mnemonic {
            words: vec!["abandon".to_string(); 24],
            passphrase: Some("extra".to_string()),
        };
        assert_eq!(
            payload.subtype(),
            subtype::MNEMONIC_24_WORDS | subtype::MNEMONIC_PASSPHRASE
        );
        assert_eq!(payload.secret_type(), SecretType::Mnemonic);
    }

    #[test]
    fn test_payload_debug_is_redacted() {
        let payload = SecretPayload::Password {
            login: "alice".to_string(),
            password: "hunter2".to_string(),
            url: None,
        };
        let printed = format!("{:?}", payload);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("Password"));
    }

    #[test]
    fn test_secret_json() {
        let secret = Secret {
            header: header(),
            payload: SecretPayload::FreeText {
                text: "note".to_string(),
            },
        };
        let json = serde_json::to_string(&secret).unwrap();
        assert!(json.contains("\"deadbeef\""));
        let back: Secret = serde_json::from_str(&json).unwrap();
        assert_eq!(back, secret);
    }
}
