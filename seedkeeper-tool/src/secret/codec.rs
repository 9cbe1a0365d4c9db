//! Secret envelope codec
//!
//! Converts between [`SecretPayload`] and the byte layout the applet stores.
//! Layouts by type:
//!
//! - Masterseed: `seed_len(1) seed`
//! - Mnemonic: `word_count(1) len(1) words [len(1) passphrase]`
//! - Password: `login_len(1) login pw_len(1) pw [url_len(1) url]`
//! - FreeText, WalletDescriptor: `len(2) text`
//!
//! Bracketed fields are present only when the matching subtype bit is set.
//! Decoding checks every length field against the remaining buffer and
//! rejects trailing bytes.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{subtype, SecretPayload, SecretType};
use crate::error::SecretProcessingError;

type Result<T> = std::result::Result<T, SecretProcessingError>;

/// First four bytes of SHA-256 over the encoded payload
pub fn fingerprint(encoded: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(encoded);
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Build the envelope for `payload`
///
/// Fails before producing any bytes for the card if the payload does not
/// match `(secret_type, subtype)` or the result exceeds `max_size`.
pub fn encode(
    secret_type: SecretType,
    subtype: u8,
    payload: &SecretPayload,
    max_size: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    check_subtype(secret_type, subtype)?;
    if let SecretType::Other(_) = secret_type {
        return Err(SecretProcessingError::UnsupportedType(secret_type));
    }
    if payload.secret_type() != secret_type {
        return Err(SecretProcessingError::TypeMismatch {
            expected: secret_type,
        });
    }
    if payload.subtype() != subtype {
        return Err(SecretProcessingError::InvalidField {
            field: "subtype",
            reason: format!(
                "{:#04x} does not describe the payload ({:#04x})",
                subtype,
                payload.subtype()
            ),
        });
    }

    let mut out = Zeroizing::new(Vec::new());
    match payload {
        SecretPayload::Masterseed { seed } => {
            if seed.is_empty() {
                return Err(invalid("seed", "empty"));
            }
            put_u8_prefixed(&mut out, seed, "seed")?;
        }
        SecretPayload::Mnemonic { words, passphrase } => {
            if words.is_empty() {
                return Err(invalid("mnemonic", "no words"));
            }
            if words.iter().any(|w| w.is_empty() || w.contains(char::is_whitespace)) {
                return Err(invalid("mnemonic", "words must be non-empty and contain no spaces"));
            }
            if words.len() > u8::MAX as usize {
                return Err(SecretProcessingError::FieldTooLong {
                    field: "word count",
                    len: words.len(),
                    max: u8::MAX as usize,
                });
            }
            let phrase = Zeroizing::new(words.join(" "));
            out.push(words.len() as u8);
            put_u8_prefixed(&mut out, phrase.as_bytes(), "mnemonic")?;
            if let Some(passphrase) = passphrase {
                put_u8_prefixed(&mut out, passphrase.as_bytes(), "passphrase")?;
            }
        }
        SecretPayload::Password {
            login,
            password,
            url,
        } => {
            put_u8_prefixed(&mut out, login.as_bytes(), "login")?;
            put_u8_prefixed(&mut out, password.as_bytes(), "password")?;
            if let Some(url) = url {
                put_u8_prefixed(&mut out, url.as_bytes(), "url")?;
            }
        }
        SecretPayload::FreeText { text } => {
            put_u16_prefixed(&mut out, text.as_bytes(), "text")?;
        }
        SecretPayload::WalletDescriptor { descriptor } => {
            if descriptor.trim().is_empty() {
                return Err(invalid("descriptor", "empty"));
            }
            put_u16_prefixed(&mut out, descriptor.as_bytes(), "descriptor")?;
        }
    }

    if out.len() > max_size {
        return Err(SecretProcessingError::PayloadTooLarge {
            size: out.len(),
            max: max_size,
        });
    }
    Ok(out)
}

/// Parse an envelope read back from the card
pub fn decode(secret_type: SecretType, subtype: u8, data: &[u8]) -> Result<SecretPayload> {
    check_subtype(secret_type, subtype)?;
    let mut reader = Reader::new(data);

    let payload = match secret_type {
        SecretType::Masterseed => {
            let len = reader.u8("seed length")? as usize;
            let seed = reader.take(len, "seed")?.to_vec();
            SecretPayload::Masterseed { seed }
        }
        SecretType::Mnemonic => {
            let word_count = reader.u8("word count")? as usize;
            let len = reader.u8("mnemonic length")? as usize;
            let phrase = reader.str(len, "mnemonic")?;
            let words: Vec<String> = phrase.split(' ').map(str::to_owned).collect();
            if words.len() != word_count || words.iter().any(String::is_empty) {
                return Err(invalid(
                    "mnemonic",
                    format!("header announces {} words", word_count),
                ));
            }
            if (subtype & subtype::MNEMONIC_24_WORDS != 0) != (word_count == 24) {
                return Err(invalid("word count", "disagrees with subtype"));
            }
            let passphrase = if subtype & subtype::MNEMONIC_PASSPHRASE != 0 {
                let len = reader.u8("passphrase length")? as usize;
                Some(reader.string(len, "passphrase")?)
            } else {
                None
            };
            SecretPayload::Mnemonic { words, passphrase }
        }
        SecretType::Password => {
            let len = reader.u8("login length")? as usize;
            let login = reader.string(len, "login")?;
            let len = reader.u8("password length")? as usize;
            let password = reader.string(len, "password")?;
            let url = if subtype & subtype::PASSWORD_URL != 0 {
                let len = reader.u8("url length")? as usize;
                Some(reader.string(len, "url")?)
            } else {
                None
            };
            SecretPayload::Password {
                login,
                password,
                url,
            }
        }
        SecretType::FreeText => {
            let len = reader.u16("text length")? as usize;
            SecretPayload::FreeText {
                text: reader.string(len, "text")?,
            }
        }
        SecretType::WalletDescriptor => {
            let len = reader.u16("descriptor length")? as usize;
            SecretPayload::WalletDescriptor {
                descriptor: reader.string(len, "descriptor")?,
            }
        }
        SecretType::Other(_) => return Err(SecretProcessingError::UnsupportedType(secret_type)),
    };

    reader.finish()?;
    Ok(payload)
}

fn check_subtype(secret_type: SecretType, subtype: u8) -> Result<()> {
    if subtype & !secret_type.allowed_subtype_bits() != 0 {
        return Err(SecretProcessingError::UnsupportedSubtype {
            secret_type,
            subtype,
        });
    }
    Ok(())
}

fn invalid(field: &'static str, reason: impl Into<String>) -> SecretProcessingError {
    SecretProcessingError::InvalidField {
        field,
        reason: reason.into(),
    }
}

fn put_u8_prefixed(out: &mut Vec<u8>, value: &[u8], field: &'static str) -> Result<()> {
    if value.len() > u8::MAX as usize {
        return Err(SecretProcessingError::FieldTooLong {
            field,
            len: value.len(),
            max: u8::MAX as usize,
        });
    }
    out.push(value.len() as u8);
    out.extend_from_slice(value);
    Ok(())
}

fn put_u16_prefixed(out: &mut Vec<u8>, value: &[u8], field: &'static str) -> Result<()> {
    if value.len() > u16::MAX as usize {
        return Err(SecretProcessingError::FieldTooLong {
            field,
            len: value.len(),
            max: u16::MAX as usize,
        });
    }
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
    Ok(())
}

/// Bounds-checked cursor over card-supplied bytes
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(SecretProcessingError::Truncated {
                field,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.take(1, field)?[0])
    }

    pub(crate) fn u16(&mut self, field: &'static str) -> Result<u16> {
        let bytes = self.take(2, field)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn str(&mut self, len: usize, field: &'static str) -> Result<&'a str> {
        let bytes = self.take(len, field)?;
        std::str::from_utf8(bytes).map_err(|_| SecretProcessingError::InvalidUtf8(field))
    }

    pub(crate) fn string(&mut self, len: usize, field: &'static str) -> Result<String> {
        self.str(len, field).map(str::to_owned)
    }

    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub(crate) fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(SecretProcessingError::TrailingBytes(n)),
        }
    }
}
