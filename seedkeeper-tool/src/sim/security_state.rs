//! Security state of the virtual card
//!
//! Tracks which applet is selected and whether the PIN has been verified
//! since the last power cycle.

use crate::card::CardType;

#[derive(Debug, Default)]
pub struct SecurityState {
    selected: Option<CardType>,
    pin_verified: bool,
}

impl SecurityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, applet: CardType) {
        self.selected = Some(applet);
        self.pin_verified = false;
    }

    pub fn selected(&self) -> Option<CardType> {
        self.selected
    }

    pub fn set_verified(&mut self) {
        self.pin_verified = true;
    }

    pub fn is_verified(&self) -> bool {
        self.pin_verified
    }

    /// Drop PIN verification only (LOGOUT_ALL)
    pub fn logout(&mut self) {
        self.pin_verified = false;
    }

    /// Clear everything (card reset or power cycle)
    pub fn clear_all(&mut self) {
        self.selected = None;
        self.pin_verified = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = SecurityState::new();
        assert!(!state.is_verified());
        assert_eq!(state.selected(), None);
    }

    #[test]
    fn test_select_resets_verification() {
        let mut state = SecurityState::new();
        state.select(CardType::Seedkeeper);
        state.set_verified();
        assert!(state.is_verified());

        state.select(CardType::Seedkeeper);
        assert!(!state.is_verified());
    }

    #[test]
    fn test_logout_keeps_selection() {
        let mut state = SecurityState::new();
        state.select(CardType::Satochip);
        state.set_verified();
        state.logout();
        assert!(!state.is_verified());
        assert_eq!(state.selected(), Some(CardType::Satochip));

        state.clear_all();
        assert_eq!(state.selected(), None);
    }
}
