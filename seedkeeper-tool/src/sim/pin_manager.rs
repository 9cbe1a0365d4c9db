//! PIN manager for the virtual card
//!
//! Handles PIN provisioning, verification, change and retry counters. Only
//! SHA-256 hashes of the PIN and PUK are stored.

use sha2::{Digest, Sha256};

use super::state::PinData;

/// Result of checking a PIN against the stored hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinCheck {
    Valid,
    /// Wrong PIN; tries left after this attempt
    Wrong(u8),
    /// Counter was already exhausted; nothing was compared
    Blocked,
}

#[derive(Debug, Default)]
pub struct PINManager;

impl PINManager {
    pub fn new() -> Self {
        Self
    }

    pub fn hash_pin(pin: &[u8]) -> Vec<u8> {
        Sha256::digest(pin).to_vec()
    }

    pub fn length_ok(&self, pin: &[u8], pin_data: &PinData) -> bool {
        let len = pin.len();
        len >= pin_data.min_length as usize && len <= pin_data.max_length as usize
    }

    /// Provision PIN 0 and its unblock code
    pub fn setup(&self, pin: &[u8], pin_tries: u8, puk: &[u8], puk_tries: u8, pin_data: &mut PinData) {
        pin_data.pin_hash = Self::hash_pin(pin);
        pin_data.pin_tries_remaining = pin_tries;
        pin_data.pin_max_tries = pin_tries;
        pin_data.puk_hash = Self::hash_pin(puk);
        pin_data.puk_tries_remaining = puk_tries;
        pin_data.puk_max_tries = puk_tries;
    }

    /// Verify a PIN, updating the retry counter
    pub fn verify_pin(&self, pin: &[u8], pin_data: &mut PinData) -> PinCheck {
        if pin_data.pin_tries_remaining == 0 {
            return PinCheck::Blocked;
        }

        if Self::hash_pin(pin) == pin_data.pin_hash {
            pin_data.pin_tries_remaining = pin_data.pin_max_tries;
            PinCheck::Valid
        } else {
            pin_data.pin_tries_remaining = pin_data.pin_tries_remaining.saturating_sub(1);
            PinCheck::Wrong(pin_data.pin_tries_remaining)
        }
    }

    /// Change the PIN after verifying the old one
    ///
    /// A new PIN outside the length limits leaves the counter untouched and
    /// reports `None`.
    pub fn change_pin(&self, old_pin: &[u8], new_pin: &[u8], pin_data: &mut PinData) -> Option<PinCheck> {
        if !self.length_ok(new_pin, pin_data) {
            return None;
        }
        let check = self.verify_pin(old_pin, pin_data);
        if check == PinCheck::Valid {
            pin_data.pin_hash = Self::hash_pin(new_pin);
        }
        Some(check)
    }
}
