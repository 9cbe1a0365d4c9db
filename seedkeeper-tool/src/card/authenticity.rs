//! Card authenticity checks
//!
//! A card is considered genuine when the certificate it exports is one the
//! user pinned in the truststore (by SHA-256 digest).

use sha2::{Digest, Sha256};

use super::AuthenticityStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Truststore {
    pins: Vec<[u8; 32]>,
}

impl Truststore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from hex digests; malformed entries are reported, not skipped
    pub fn from_hex_digests(digests: &[String]) -> Result<Self, hex::FromHexError> {
        let mut pins = Vec::with_capacity(digests.len());
        for digest in digests {
            let mut pin = [0u8; 32];
            hex::decode_to_slice(digest.trim(), &mut pin)?;
            pins.push(pin);
        }
        Ok(Self { pins })
    }

    pub fn pin_certificate(&mut self, certificate: &[u8]) {
        self.pins.push(Self::digest(certificate));
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn digest(certificate: &[u8]) -> [u8; 32] {
        Sha256::digest(certificate).into()
    }

    /// Unknown when nothing is pinned or the card has no certificate to offer
    pub fn verify(&self, certificate: Option<&[u8]>) -> AuthenticityStatus {
        if self.pins.is_empty() {
            return AuthenticityStatus::Unknown;
        }
        match certificate {
            None => AuthenticityStatus::Unknown,
            Some([]) => AuthenticityStatus::Failed,
            Some(cert) => {
                let digest = Self::digest(cert);
                if self.pins.contains(&digest) {
                    AuthenticityStatus::Verified
                } else {
                    AuthenticityStatus::Failed
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_truststore_is_unknown() {
        assert_eq!(Truststore::new().verify(Some(b"cert")), AuthenticityStatus::Unknown);
    }

    #[test]
    fn test_pinned_certificate_verifies() {
        let mut store = Truststore::new();
        store.pin_certificate(b"genuine");
        assert_eq!(store.verify(Some(b"genuine")), AuthenticityStatus::Verified);
        assert_eq!(store.verify(Some(b"forged")), AuthenticityStatus::Failed);
        assert_eq!(store.verify(Some(&[])), AuthenticityStatus::Failed);
        assert_eq!(store.verify(None), AuthenticityStatus::Unknown);
    }

    #[test]
    fn test_from_hex_digests() {
        let digest = hex::encode(Truststore::digest(b"genuine"));
        let store = Truststore::from_hex_digests(&[digest]).unwrap();
        assert_eq!(store.verify(Some(b"genuine")), AuthenticityStatus::Verified);

        assert!(Truststore::from_hex_digests(&["zz".to_string()]).is_err());
    }
}
