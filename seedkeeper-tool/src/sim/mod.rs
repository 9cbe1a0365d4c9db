//! Virtual Seedkeeper/Satochip card
//!
//! A software card speaking the same APDUs as the real applets, used by the
//! test suite and by the CLI's `--simulator` mode. State can be kept in
//! memory or persisted as JSON in the data directory.

pub mod applet;
pub mod pin_manager;
pub mod security_state;
pub mod state;
pub mod storage;

pub use applet::SeedkeeperApplet;
pub use state::CardState;
pub use storage::CardDataStore;

use std::path::PathBuf;

use log::{debug, error, info};

use crate::apdu::{parse_apdu, Response, SW};
use crate::card::CardType;
use crate::protocol::{CardTransport, TransportError};
use pin_manager::PINManager;

/// Unblock code provisioned by [`VirtualCard::with_pin`]
const FIXTURE_PUK: &[u8] = b"0123456789abcdef";

/// Tries granted by [`VirtualCard::with_pin`]
const FIXTURE_TRIES: u8 = 5;

/// Virtual card in a virtual reader
pub struct VirtualCard {
    applet: SeedkeeperApplet,
    /// Card inserted in the reader
    present: bool,
    /// Channel open (powered)
    powered: bool,
    transmit_count: usize,
}

impl VirtualCard {
    pub fn from_state(state: CardState) -> Self {
        Self::with_store(CardDataStore::in_memory(state))
    }

    fn with_store(store: CardDataStore) -> Self {
        Self {
            applet: SeedkeeperApplet::new(store),
            present: true,
            powered: false,
            transmit_count: 0,
        }
    }

    /// Blank Seedkeeper with applet 0.1
    pub fn seedkeeper_v1() -> Self {
        Self::from_state(CardState::blank(CardType::Seedkeeper, 0, 1))
    }

    /// Blank Seedkeeper with applet 0.2
    pub fn seedkeeper_v2() -> Self {
        Self::from_state(CardState::blank(CardType::Seedkeeper, 0, 2))
    }

    /// Blank Satochip with applet 0.12
    pub fn satochip() -> Self {
        Self::from_state(CardState::blank(CardType::Satochip, 0, 12))
    }

    /// Card persisted under `storage_dir` (default data directory if None)
    ///
    /// `initial` is used when no state file exists yet.
    pub fn persistent(storage_dir: Option<PathBuf>, initial: CardState) -> Self {
        let mut store = CardDataStore::new(storage_dir, initial);
        if !store.load() {
            store.save();
        }
        Self::with_store(store)
    }

    /// Run setup with `pin` (5 tries) without going through APDUs
    pub fn with_pin(mut self, pin: &str) -> Self {
        let state = self.applet.get_state_mut();
        PINManager::new().setup(pin.as_bytes(), FIXTURE_TRIES, FIXTURE_PUK, FIXTURE_TRIES, &mut state.pin_data);
        state.setup_done = true;
        self.applet.save();
        self
    }

    pub fn with_pin_tries(mut self, tries: u8) -> Self {
        let pin_data = &mut self.applet.get_state_mut().pin_data;
        pin_data.pin_max_tries = tries;
        pin_data.pin_tries_remaining = tries;
        self.applet.save();
        self
    }

    /// Card that refuses plain commands, like a Satochip with a secure channel
    pub fn with_secure_channel(mut self) -> Self {
        self.applet.get_state_mut().needs_secure_channel = true;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.applet.get_state_mut().label = label.to_owned();
        self.applet.save();
        self
    }

    pub fn with_certificate(mut self, certificate: Vec<u8>) -> Self {
        self.applet.get_state_mut().certificate = certificate;
        self.applet.save();
        self
    }

    pub fn state(&self) -> &CardState {
        self.applet.get_state()
    }

    /// Pull the card out of the reader
    pub fn remove_card(&mut self) {
        self.present = false;
        self.power_off();
        info!("Virtual card removed");
    }

    pub fn insert_card(&mut self) {
        self.present = true;
        info!("Virtual card inserted");
    }

    /// Commands received since creation, including rejected ones
    pub fn transmit_count(&self) -> usize {
        self.transmit_count
    }

    fn power_off(&mut self) {
        self.powered = false;
        self.applet.reset();
    }
}

impl CardTransport for VirtualCard {
    fn connect(&mut self) -> Result<(), TransportError> {
        if !self.present {
            return Err(TransportError::NoCard);
        }
        self.powered = true;
        self.applet.reset();
        info!("Virtual card powered on");
        Ok(())
    }

    fn is_card_present(&mut self) -> bool {
        self.present
    }

    fn transmit(&mut self, command: &[u8]) -> Result<Response, TransportError> {
        self.transmit_count += 1;
        if !self.present {
            return Err(TransportError::CardRemoved);
        }
        if !self.powered {
            return Err(TransportError::NotConnected);
        }

        let cmd = match parse_apdu(command) {
            Ok(apdu) => apdu,
            Err(e) => {
                error!("Failed to parse APDU: {:?}", e);
                return Ok(Response::error(SW::WRONG_LENGTH));
            }
        };
        debug!(
            "Processing APDU: CLA={:02X} INS={:02X} P1={:02X} P2={:02X}",
            cmd.cla, cmd.ins, cmd.p1, cmd.p2
        );
        Ok(self.applet.process_apdu(&cmd))
    }

    fn disconnect(&mut self) {
        if self.powered {
            self.power_off();
            info!("Virtual card powered off");
        }
    }
}
