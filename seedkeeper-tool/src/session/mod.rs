//! Card session state machine
//!
//! One [`Session`] tracks one physical card from connect to disconnect:
//!
//! ```text
//! Disconnected -> Connected -> Authenticated
//!                     |              |
//!                     +--> Locked <--+   (PIN counter exhausted)
//! ```
//!
//! `disconnect` returns to `Disconnected` from every state. Commands that
//! need the PIN are gated on [`Session::require_authenticated`], which fails
//! without touching the card.

use std::fmt;

use log::{debug, info, warn};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::card::{AuthenticityStatus, Card, CardStatus, Truststore};
use crate::config::Config;
use crate::error::{CardFailure, Error, NotSuitable, PinChangeFailure, PinPolicyViolation, Result};
use crate::protocol::{CardTransport, SeedkeeperProtocol};

/// Length of the random unblock code provisioned at setup
const PUK_LENGTH: usize = 16;

/// PIN bytes, wiped on drop and never printed
#[derive(Clone)]
pub struct Pin(Zeroizing<Vec<u8>>);

impl Pin {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Constant-time comparison
    pub fn matches(&self, other: &Pin) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    fn random(len: usize) -> Self {
        let mut bytes = Zeroizing::new(vec![0u8; len]);
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl From<&str> for Pin {
    fn from(pin: &str) -> Self {
        Self::new(pin.as_bytes())
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
    /// PIN attempts exhausted; only disconnect leaves this state
    Locked,
}

/// Ephemeral PIN state, never persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinSession {
    pub verified: bool,
    /// Last count the card reported
    pub remaining_attempts: Option<u8>,
    pub locked: bool,
}

#[derive(Debug)]
pub struct Session {
    state: SessionState,
    card: Option<Card>,
    status: Option<CardStatus>,
    pin: PinSession,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            card: None,
            status: None,
            pin: PinSession::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn card(&self) -> Option<&Card> {
        self.card.as_ref()
    }

    pub fn status(&self) -> Option<&CardStatus> {
        self.status.as_ref()
    }

    pub fn pin_session(&self) -> PinSession {
        self.pin
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Open the channel, select the applet and read its status
    pub fn connect<T: CardTransport>(&mut self, protocol: &mut SeedkeeperProtocol<T>) -> Result<&Card> {
        if self.state != SessionState::Disconnected {
            self.disconnect(protocol);
        }
        protocol.connect()?;

        let result = Self::identify(protocol);
        let (mut card, status) = match result {
            Ok(identified) => identified,
            Err(e) => {
                protocol.disconnect();
                return Err(e);
            }
        };
        if let Ok(label) = protocol.get_label() {
            card.label = label;
        }

        self.pin = PinSession {
            verified: false,
            remaining_attempts: Some(status.pin_tries_remaining),
            locked: status.setup_done && status.pin_tries_remaining == 0,
        };
        self.state = if self.pin.locked {
            warn!("Card PIN is blocked");
            SessionState::Locked
        } else {
            SessionState::Connected
        };
        info!(
            "Connected to {} {} ({} PIN tries left)",
            card.card_type, card.firmware_version, status.pin_tries_remaining
        );
        self.status = Some(status);
        Ok(self.card.insert(card))
    }

    fn identify<T: CardTransport>(protocol: &mut SeedkeeperProtocol<T>) -> Result<(Card, CardStatus)> {
        let card_type = protocol.select()?;
        let status = protocol.get_status()?;
        if status.needs_secure_channel {
            return Err(Error::CardNotSuitable(NotSuitable::SecureChannelRequired));
        }
        Ok((Card::new(card_type, &status), status))
    }

    /// Always succeeds; clears PIN state and the card model
    pub fn disconnect<T: CardTransport>(&mut self, protocol: &mut SeedkeeperProtocol<T>) {
        if self.state == SessionState::Authenticated {
            // Best effort: the card may already be gone
            if let Err(e) = protocol.logout() {
                debug!("Logout before disconnect failed: {}", e);
            }
        }
        protocol.disconnect();
        self.reset();
    }

    /// The card went away without a disconnect
    pub fn card_removed(&mut self) {
        info!("Card removed");
        self.reset();
    }

    fn reset(&mut self) {
        self.state = SessionState::Disconnected;
        self.card = None;
        self.status = None;
        self.pin = PinSession::default();
    }

    pub fn require_connected(&self) -> Result<&Card> {
        match (&self.state, &self.card) {
            (SessionState::Disconnected, _) | (_, None) => Err(Error::card(CardFailure::NotConnected)),
            (_, Some(card)) => Ok(card),
        }
    }

    pub fn require_authenticated(&self) -> Result<&Card> {
        match self.state {
            SessionState::Locked => Err(Error::CardNotSuitable(NotSuitable::PinBlocked)),
            SessionState::Connected => Err(Error::card(CardFailure::PinRequired)),
            SessionState::Disconnected => Err(Error::card(CardFailure::NotConnected)),
            SessionState::Authenticated => self.require_connected(),
        }
    }

    pub fn verify_pin<T: CardTransport>(&mut self, protocol: &mut SeedkeeperProtocol<T>, pin: &Pin) -> Result<()> {
        match self.state {
            SessionState::Disconnected => return Err(Error::card(CardFailure::NotConnected)),
            SessionState::Locked => return Err(Error::CardNotSuitable(NotSuitable::PinBlocked)),
            SessionState::Connected | SessionState::Authenticated => {}
        }
        if !self.status.is_some_and(|s| s.setup_done) {
            return Err(Error::card(CardFailure::SetupNotDone));
        }

        match protocol.verify_pin(pin) {
            Ok(()) => {
                info!("PIN verified");
                self.pin.verified = true;
                if let Ok(status) = protocol.get_status() {
                    self.pin.remaining_attempts = Some(status.pin_tries_remaining);
                    self.update_status(status);
                }
                self.state = SessionState::Authenticated;
                Ok(())
            }
            Err(Error::InvalidPin { remaining }) => {
                warn!("Wrong PIN, {} attempt(s) left", remaining);
                self.pin.verified = false;
                self.pin.remaining_attempts = Some(remaining);
                if remaining == 0 {
                    self.lock();
                } else {
                    self.state = SessionState::Connected;
                }
                Err(Error::InvalidPin { remaining })
            }
            Err(e) => {
                self.note_error(&e);
                Err(e)
            }
        }
    }

    /// Change the PIN after checking policy locally
    pub fn change_pin<T: CardTransport>(
        &mut self,
        protocol: &mut SeedkeeperProtocol<T>,
        old: &Pin,
        new: &Pin,
        config: &Config,
    ) -> Result<()> {
        self.require_authenticated()?;
        check_pin_policy(new, config)?;
        if old.matches(new) {
            return Err(Error::PinChange(PinChangeFailure::Unchanged));
        }

        match protocol.change_pin(old, new) {
            Ok(()) => {
                info!("PIN changed");
                Ok(())
            }
            Err(Error::PinChange(PinChangeFailure::WrongCurrentPin { remaining })) => {
                self.pin.remaining_attempts = Some(remaining);
                if remaining == 0 {
                    self.lock();
                }
                Err(Error::PinChange(PinChangeFailure::WrongCurrentPin { remaining }))
            }
            Err(e) => {
                self.note_error(&e);
                Err(e)
            }
        }
    }

    /// Provision the PIN on a blank card and log in with it
    ///
    /// Seeding is left to the caller; see [`Session::mark_seeded`].
    pub fn setup<T: CardTransport>(
        &mut self,
        protocol: &mut SeedkeeperProtocol<T>,
        pin: &Pin,
        config: &Config,
    ) -> Result<()> {
        self.require_connected()?;
        if self.status.is_some_and(|s| s.setup_done) {
            return Err(Error::card(CardFailure::AlreadyInitialized));
        }
        check_pin_policy(pin, config)?;

        let puk = Pin::random(PUK_LENGTH);
        protocol.setup(pin, config.setup_pin_tries, &puk, config.setup_puk_tries)?;
        info!("Card setup done");

        let status = protocol.get_status()?;
        self.update_status(status);
        self.verify_pin(protocol, pin)
    }

    pub fn mark_seeded(&mut self) {
        if let Some(status) = self.status.as_mut() {
            status.is_seeded = true;
        }
        if let Some(card) = self.card.as_mut() {
            card.is_seeded = true;
        }
    }

    pub fn set_label(&mut self, label: Option<String>) {
        if let Some(card) = self.card.as_mut() {
            card.label = label;
        }
    }

    pub fn set_authenticity(&mut self, status: AuthenticityStatus) {
        if let Some(card) = self.card.as_mut() {
            card.authenticity_status = status;
        }
    }

    pub fn update_status(&mut self, status: CardStatus) {
        if let Some(card) = self.card.as_mut() {
            card.apply_status(&status);
        }
        self.status = Some(status);
    }

    /// Adjust state after a card-reported failure
    pub fn note_error(&mut self, error: &Error) {
        match error {
            Error::CardNotSuitable(NotSuitable::PinBlocked) => self.lock(),
            Error::Card {
                reason: CardFailure::PinRequired,
                ..
            } if self.state == SessionState::Authenticated => {
                warn!("Card dropped PIN authentication");
                self.pin.verified = false;
                self.state = SessionState::Connected;
            }
            Error::Card {
                reason: CardFailure::NoCard,
                ..
            } => self.card_removed(),
            _ => {}
        }
    }

    /// Check the card certificate against `truststore`
    pub fn verify_authenticity<T: CardTransport>(
        &mut self,
        protocol: &mut SeedkeeperProtocol<T>,
        truststore: &Truststore,
    ) -> Result<AuthenticityStatus> {
        self.require_connected()?;
        let certificate = protocol.get_authenticity_certificate()?;
        let status = truststore.verify(certificate.as_deref());
        info!("Card authenticity: {:?}", status);
        self.set_authenticity(status);
        Ok(status)
    }

    fn lock(&mut self) {
        warn!("PIN attempts exhausted, card locked");
        self.pin.verified = false;
        self.pin.locked = true;
        self.pin.remaining_attempts = Some(0);
        self.state = SessionState::Locked;
    }
}

/// Length limits from configuration
pub fn check_pin_policy(pin: &Pin, config: &Config) -> std::result::Result<(), PinPolicyViolation> {
    if pin.len() < config.min_pin_length {
        return Err(PinPolicyViolation::TooShort {
            min: config.min_pin_length,
        });
    }
    if pin.len() > config.max_pin_length {
        return Err(PinPolicyViolation::TooLong {
            max: config.max_pin_length,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardType;
    use crate::sim::VirtualCard;

    const PIN: &str = "123456";

    fn connected(card: VirtualCard) -> (Session, SeedkeeperProtocol<VirtualCard>) {
        let mut protocol = SeedkeeperProtocol::new(card);
        let mut session = Session::new();
        session.connect(&mut protocol).unwrap();
        (session, protocol)
    }

    #[test]
    fn test_connect_reads_card() {
        let (session, _protocol) = connected(VirtualCard::seedkeeper_v2().with_pin(PIN));
        assert_eq!(session.state(), SessionState::Connected);
        let card = session.card().unwrap();
        assert_eq!(card.card_type, CardType::Seedkeeper);
        assert!(card.setup_done);
        assert_eq!(session.pin_session().remaining_attempts, Some(5));
        assert!(!session.pin_session().verified);
    }

    #[test]
    fn test_verify_pin_authenticates() {
        let (mut session, mut protocol) = connected(VirtualCard::seedkeeper_v2().with_pin(PIN));
        session.verify_pin(&mut protocol, &Pin::from(PIN)).unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
        assert!(session.pin_session().verified);
        assert!(session.require_authenticated().is_ok());
    }

    #[test]
    fn test_wrong_pin_reports_attempts() {
        let (mut session, mut protocol) = connected(VirtualCard::seedkeeper_v2().with_pin(PIN));
        let err = session.verify_pin(&mut protocol, &Pin::from("000000")).unwrap_err();
        assert!(matches!(err, Error::InvalidPin { remaining: 4 }));
        assert!(err.is_pin_retryable());
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_lockout_blocks_further_attempts_without_transmit() {
        let card = VirtualCard::seedkeeper_v2().with_pin(PIN).with_pin_tries(3);
        let (mut session, mut protocol) = connected(card);

        for expected in [2u8, 1, 0] {
            let err = session.verify_pin(&mut protocol, &Pin::from("999999")).unwrap_err();
            assert!(matches!(err, Error::InvalidPin { remaining } if remaining == expected));
        }
        assert_eq!(session.state(), SessionState::Locked);
        assert!(session.pin_session().locked);

        let sent = protocol.transport().transmit_count();
        let err = session.verify_pin(&mut protocol, &Pin::from(PIN)).unwrap_err();
        assert!(matches!(err, Error::CardNotSuitable(NotSuitable::PinBlocked)));
        assert_eq!(protocol.transport().transmit_count(), sent);

        assert!(matches!(
            session.require_authenticated(),
            Err(Error::CardNotSuitable(NotSuitable::PinBlocked))
        ));
    }

    #[test]
    fn test_disconnect_clears_verification() {
        let (mut session, mut protocol) = connected(VirtualCard::seedkeeper_v2().with_pin(PIN));
        session.verify_pin(&mut protocol, &Pin::from(PIN)).unwrap();
        session.disconnect(&mut protocol);

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.pin_session().verified);
        assert!(session.card().is_none());
        assert!(matches!(
            session.require_authenticated(),
            Err(Error::Card { reason: CardFailure::NotConnected, .. })
        ));
    }

    #[test]
    fn test_disconnect_from_locked() {
        let card = VirtualCard::seedkeeper_v2().with_pin(PIN).with_pin_tries(1);
        let (mut session, mut protocol) = connected(card);
        let _ = session.verify_pin(&mut protocol, &Pin::from("999999"));
        assert_eq!(session.state(), SessionState::Locked);

        session.disconnect(&mut protocol);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_connect_to_blocked_card_is_locked() {
        let card = VirtualCard::seedkeeper_v2().with_pin(PIN).with_pin_tries(1);
        let mut protocol = SeedkeeperProtocol::new(card);
        let mut session = Session::new();
        session.connect(&mut protocol).unwrap();
        let _ = session.verify_pin(&mut protocol, &Pin::from("999999"));
        session.disconnect(&mut protocol);

        session.connect(&mut protocol).unwrap();
        assert_eq!(session.state(), SessionState::Locked);
    }

    #[test]
    fn test_change_pin_policy() {
        let config = Config::default();
        let (mut session, mut protocol) = connected(VirtualCard::seedkeeper_v2().with_pin(PIN));

        // Gate first
        assert!(matches!(
            session.change_pin(&mut protocol, &Pin::from(PIN), &Pin::from("654321"), &config),
            Err(Error::Card { reason: CardFailure::PinRequired, .. })
        ));

        session.verify_pin(&mut protocol, &Pin::from(PIN)).unwrap();
        assert!(matches!(
            session.change_pin(&mut protocol, &Pin::from(PIN), &Pin::from("12"), &config),
            Err(Error::PinPolicy(PinPolicyViolation::TooShort { min: 4 }))
        ));
        assert!(matches!(
            session.change_pin(&mut protocol, &Pin::from(PIN), &Pin::from(PIN), &config),
            Err(Error::PinChange(PinChangeFailure::Unchanged))
        ));
        assert!(matches!(
            session.change_pin(&mut protocol, &Pin::from("000000"), &Pin::from("654321"), &config),
            Err(Error::PinChange(PinChangeFailure::WrongCurrentPin { remaining: 4 }))
        ));

        session
            .change_pin(&mut protocol, &Pin::from(PIN), &Pin::from("654321"), &config)
            .unwrap();
        session.disconnect(&mut protocol);
        session.connect(&mut protocol).unwrap();
        session.verify_pin(&mut protocol, &Pin::from("654321")).unwrap();
    }

    #[test]
    fn test_setup_blank_card() {
        let config = Config::default();
        let (mut session, mut protocol) = connected(VirtualCard::seedkeeper_v2());
        assert!(!session.card().unwrap().setup_done);
        assert!(matches!(
            session.verify_pin(&mut protocol, &Pin::from(PIN)),
            Err(Error::Card { reason: CardFailure::SetupNotDone, .. })
        ));

        assert!(matches!(
            session.setup(&mut protocol, &Pin::from("12"), &config),
            Err(Error::PinPolicy(PinPolicyViolation::TooShort { min: 4 }))
        ));
        assert!(matches!(
            session.setup(&mut protocol, &Pin::from("x".repeat(17).as_str()), &config),
            Err(Error::PinPolicy(PinPolicyViolation::TooLong { max: 16 }))
        ));
        assert!(!session.card().unwrap().setup_done);

        session.setup(&mut protocol, &Pin::from(PIN), &config).unwrap();
        assert!(session.is_authenticated());
        assert!(session.card().unwrap().setup_done);

        assert!(matches!(
            session.setup(&mut protocol, &Pin::from(PIN), &config),
            Err(Error::Card { reason: CardFailure::AlreadyInitialized, .. })
        ));
    }

    #[test]
    fn test_removed_card_resets_session() {
        let (mut session, mut protocol) = connected(VirtualCard::seedkeeper_v2().with_pin(PIN));
        session.verify_pin(&mut protocol, &Pin::from(PIN)).unwrap();
        protocol.transport_mut().remove_card();

        let err = protocol.get_status().unwrap_err();
        session.note_error(&err);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.pin_session().verified);
    }

    #[test]
    fn test_secure_channel_card_rejected() {
        let mut protocol = SeedkeeperProtocol::new(VirtualCard::seedkeeper_v2().with_secure_channel());
        let mut session = Session::new();
        assert!(matches!(
            session.connect(&mut protocol),
            Err(Error::CardNotSuitable(NotSuitable::SecureChannelRequired))
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_pin_debug_and_compare() {
        let pin = Pin::from("1234");
        assert_eq!(format!("{:?}", pin), "Pin(***)");
        assert!(pin.matches(&Pin::from("1234")));
        assert!(!pin.matches(&Pin::from("12345")));
        assert!(!pin.matches(&Pin::from("1235")));
    }
}
