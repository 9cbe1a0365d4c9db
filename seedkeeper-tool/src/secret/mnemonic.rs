//! BIP39 helpers
//!
//! Host-side mnemonic generation and validation. Nothing here talks to the
//! card.

use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::config::Config;
use crate::error::SecretProcessingError;

/// Entropy bytes for a BIP39 word count (4 bytes per 3 words)
fn entropy_len(word_count: usize) -> usize {
    word_count / 3 * 4
}

fn unsupported_count(word_count: usize, config: &Config) -> SecretProcessingError {
    SecretProcessingError::InvalidField {
        field: "word count",
        reason: format!(
            "{} is not one of {:?}",
            word_count, config.supported_word_counts
        ),
    }
}

/// Generate a fresh mnemonic from the OS random source
pub fn generate(word_count: usize, config: &Config) -> Result<Zeroizing<Vec<String>>, SecretProcessingError> {
    if !config.is_supported_word_count(word_count) || word_count % 3 != 0 {
        return Err(unsupported_count(word_count, config));
    }

    let mut entropy = Zeroizing::new(vec![0u8; entropy_len(word_count)]);
    OsRng.fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy(&entropy).map_err(|e| SecretProcessingError::InvalidField {
        field: "entropy",
        reason: e.to_string(),
    })?;
    Ok(Zeroizing::new(mnemonic.words().map(str::to_owned).collect()))
}

/// Check the word count against configuration and the BIP39 checksum
pub fn validate(words: &[String], config: &Config) -> Result<(), SecretProcessingError> {
    if !config.is_supported_word_count(words.len()) {
        return Err(unsupported_count(words.len(), config));
    }
    parse(words).map(|_| ())
}

/// BIP39 seed (PBKDF2 over mnemonic and passphrase), used for Satochip import
pub fn to_seed(words: &[String], passphrase: Option<&str>) -> Result<Zeroizing<[u8; 64]>, SecretProcessingError> {
    let mnemonic = parse(words)?;
    Ok(Zeroizing::new(mnemonic.to_seed(passphrase.unwrap_or(""))))
}

fn parse(words: &[String]) -> Result<Mnemonic, SecretProcessingError> {
    let mut phrase = words.join(" ");
    let parsed = Mnemonic::parse_in(Language::English, phrase.as_str());
    phrase.zeroize();
    parsed.map_err(|e| SecretProcessingError::InvalidField {
        field: "mnemonic",
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abandon_about() -> Vec<String> {
        let mut words = vec!["abandon".to_string(); 11];
        words.push("about".to_string());
        words
    }

    #[test]
    fn test_generate_24_words() {
        let config = Config::default();
        let first = generate(24, &config).unwrap();
        let second = generate(24, &config).unwrap();

        assert_eq!(first.len(), 24);
        let wordlist = Language::English.word_list();
        assert!(first.iter().all(|w| wordlist.contains(&w.as_str())));
        assert_ne!(*first, *second);
        assert!(validate(&first, &config).is_ok());
    }

    #[test]
    fn test_generate_12_words() {
        let words = generate(12, &Config::default()).unwrap();
        assert_eq!(words.len(), 12);
    }

    #[test]
    fn test_generate_rejects_unsupported_count() {
        assert!(matches!(
            generate(18, &Config::default()),
            Err(SecretProcessingError::InvalidField { field: "word count", .. })
        ));
    }

    #[test]
    fn test_validate_checksum() {
        let config = Config::default();
        assert!(validate(&abandon_about(), &config).is_ok());

        let bad = vec!["abandon".to_string(); 12];
        assert!(matches!(
            validate(&bad, &config),
            Err(SecretProcessingError::InvalidField { field: "mnemonic", .. })
        ));
    }

    #[test]
    fn test_to_seed_vector() {
        // BIP39 reference vector, passphrase "TREZOR"
        let seed = to_seed(&abandon_about(), Some("TREZOR")).unwrap();
        assert_eq!(hex::encode(&seed[..8]), "c55257c360c07c72");
    }
}
