//! Controller facade
//!
//! The single entry point for the presentation layer. Every operation runs
//! through [`Controller::traced`], which logs entry and exit and lets the
//! session react to card failures (removal, lockout). Card-gated operations
//! check, in order: a card is connected, the card supports the feature, the
//! PIN session is verified. All three checks are local; a refused operation
//! never reaches the transport.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::backup::{Backup, BackupSecret};
use crate::card::{AuthenticityStatus, Card, CardStatus, CardType, Feature, LogEntry, SeedkeeperStatus, Truststore};
use crate::config::Config;
use crate::error::{CardFailure, Error, NotSuitable, Result, SecretProcessingError};
use crate::protocol::{CardTransport, SeedkeeperProtocol};
use crate::secret::{self, mnemonic, Secret, SecretHeader, SecretPayload, SecretType, EXPORT_PLAINTEXT_ALLOWED};
use crate::session::{Pin, PinSession, Session, SessionState};

/// Label given to the seed stored by [`Controller::initialize`]
const INITIAL_SEED_LABEL: &str = "Masterseed";

/// How [`Controller::initialize`] seeds the card after PIN setup
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub enum SeedPolicy {
    /// Only provision the PIN
    PinOnly,
    /// Seedkeeper generates a masterseed of `size` bytes on-card
    Generate { size: u8 },
    /// Import a BIP39 mnemonic: stored as a mnemonic secret on a Seedkeeper,
    /// converted to a BIP32 seed on a Satochip
    Mnemonic {
        words: Vec<String>,
        passphrase: Option<String>,
    },
}

impl std::fmt::Debug for SeedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedPolicy::PinOnly => f.write_str("PinOnly"),
            SeedPolicy::Generate { size } => write!(f, "Generate {{ size: {} }}", size),
            SeedPolicy::Mnemonic { words, .. } => write!(f, "Mnemonic {{ {} words, .. }}", words.len()),
        }
    }
}

/// Card label as shown in the label editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardLabelInfo {
    pub label: Option<String>,
    pub max_length: usize,
}

pub struct Controller<T: CardTransport> {
    protocol: SeedkeeperProtocol<T>,
    session: Session,
    config: Config,
    truststore: Truststore,
}

impl<T: CardTransport> Controller<T> {
    pub fn new(transport: T, config: Config) -> Self {
        let truststore = match Truststore::from_hex_digests(&config.trusted_certificates) {
            Ok(truststore) => truststore,
            Err(e) => {
                warn!("Ignoring malformed trusted certificate digests: {}", e);
                Truststore::new()
            }
        };
        Self::with_truststore(transport, config, truststore)
    }

    pub fn with_truststore(transport: T, config: Config, truststore: Truststore) -> Self {
        Self {
            protocol: SeedkeeperProtocol::new(transport),
            session: Session::new(),
            config,
            truststore,
        }
    }

    pub fn transport(&self) -> &T {
        self.protocol.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.protocol.transport_mut()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn card(&self) -> Option<&Card> {
        self.session.card()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn pin_session(&self) -> PinSession {
        self.session.pin_session()
    }

    /// Whether the connected card offers `feature`; false when disconnected
    pub fn supports(&self, feature: Feature) -> bool {
        self.session.card().is_some_and(|card| card.supports(feature))
    }

    /// Run `op` with entry/exit logging; failures are shown to the session
    fn traced<R>(&mut self, name: &str, op: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        debug!("Entering {}", name);
        let result = op(self);
        match &result {
            Ok(_) => debug!("Exiting {}", name),
            Err(e) => {
                warn!("{} failed ({:?}): {}", name, e.kind(), e);
                self.session.note_error(e);
            }
        }
        result
    }

    /// Connected, supports `feature`, PIN verified
    fn authorize(&self, feature: Feature) -> Result<()> {
        let card = self.session.require_connected()?;
        card.check(feature).map_err(Error::CardNotSuitable)?;
        self.session.require_authenticated()?;
        Ok(())
    }

    fn check_label(&self, field: &'static str, label: &str) -> Result<()> {
        if label.len() > self.config.max_label_length {
            return Err(SecretProcessingError::FieldTooLong {
                field,
                len: label.len(),
                max: self.config.max_label_length,
            }
            .into());
        }
        Ok(())
    }

    // =========================================================================
    // Card and PIN
    // =========================================================================

    pub fn connect(&mut self) -> Result<Card> {
        self.traced("connect", |c| {
            let card = c.session.connect(&mut c.protocol)?;
            Ok(card.clone())
        })
    }

    pub fn disconnect(&mut self) {
        debug!("Entering disconnect");
        self.session.disconnect(&mut self.protocol);
        debug!("Exiting disconnect");
    }

    /// Poll the reader; a card that went away ends the session
    pub fn check_card_presence(&mut self) -> bool {
        let present = self.protocol.is_card_present();
        if !present && self.session.state() != SessionState::Disconnected {
            self.session.card_removed();
            self.protocol.disconnect();
        }
        present
    }

    pub fn verify_pin(&mut self, pin: &Pin) -> Result<()> {
        self.traced("verify_pin", |c| c.session.verify_pin(&mut c.protocol, pin))
    }

    /// `confirm` must repeat `new`; a mismatch is reported without card I/O
    pub fn change_pin(&mut self, old: &Pin, new: &Pin, confirm: &Pin) -> Result<()> {
        self.traced("change_pin", |c| {
            if !new.matches(confirm) {
                return Err(Error::PinMismatch);
            }
            c.session.change_pin(&mut c.protocol, old, new, &c.config)
        })
    }

    /// Provision the PIN on a blank card, then seed it per `policy`
    ///
    /// Returns the id of the seed secret stored on a Seedkeeper.
    pub fn initialize(&mut self, pin: &Pin, confirm: &Pin, policy: &SeedPolicy) -> Result<Option<u16>> {
        self.traced("initialize", |c| {
            if !pin.matches(confirm) {
                return Err(Error::PinMismatch);
            }
            let card = c.session.require_connected()?;
            if card.setup_done {
                return Err(Error::card(CardFailure::AlreadyInitialized));
            }
            let card_type = card.card_type;
            match policy {
                SeedPolicy::PinOnly => {}
                SeedPolicy::Generate { .. } => card.check(Feature::NativeSeedGeneration).map_err(Error::CardNotSuitable)?,
                SeedPolicy::Mnemonic { words, .. } => {
                    card.check(Feature::SeedImport).map_err(Error::CardNotSuitable)?;
                    mnemonic::validate(words, &c.config)?;
                }
            }

            c.session.setup(&mut c.protocol, pin, &c.config)?;

            let seed_id = match (policy, card_type) {
                (SeedPolicy::PinOnly, _) => None,
                (SeedPolicy::Generate { size }, _) => {
                    let (id, fingerprint) =
                        c.protocol
                            .generate_masterseed(*size, EXPORT_PLAINTEXT_ALLOWED, INITIAL_SEED_LABEL)?;
                    info!("Card generated masterseed {} ({})", id, hex::encode(fingerprint));
                    Some(id)
                }
                (SeedPolicy::Mnemonic { words, passphrase }, CardType::Seedkeeper) => {
                    let payload = SecretPayload::Mnemonic {
                        words: words.clone(),
                        passphrase: passphrase.clone(),
                    };
                    Some(c.store_secret(INITIAL_SEED_LABEL, &payload)?)
                }
                (SeedPolicy::Mnemonic { words, passphrase }, _) => {
                    let seed = mnemonic::to_seed(words, passphrase.as_deref())?;
                    c.protocol.import_seed(seed.as_slice())?;
                    info!("BIP32 seed imported");
                    None
                }
            };
            if !matches!(policy, SeedPolicy::PinOnly) {
                c.session.mark_seeded();
            }
            Ok(seed_id)
        })
    }

    /// Fresh status from the card
    pub fn get_card_status(&mut self) -> Result<CardStatus> {
        self.traced("get_card_status", |c| {
            c.session.require_connected()?;
            let status = c.protocol.get_status()?;
            c.session.update_status(status);
            Ok(status)
        })
    }

    pub fn get_seedkeeper_status(&mut self) -> Result<SeedkeeperStatus> {
        self.traced("get_seedkeeper_status", |c| {
            c.authorize(Feature::SecretStorage)?;
            c.protocol.get_seedkeeper_status()
        })
    }

    pub fn verify_authenticity(&mut self) -> Result<AuthenticityStatus> {
        self.traced("verify_authenticity", |c| {
            c.session.verify_authenticity(&mut c.protocol, &c.truststore)
        })
    }

    // =========================================================================
    // Secrets
    // =========================================================================

    /// Secret headers in card order
    pub fn list_secrets(&mut self) -> Result<Vec<SecretHeader>> {
        self.traced("list_secrets", |c| {
            c.authorize(Feature::SecretStorage)?;
            c.protocol.list_secret_headers()
        })
    }

    pub fn get_secret_details(&mut self, id: u16) -> Result<Secret> {
        self.traced("get_secret_details", |c| {
            c.authorize(Feature::SecretStorage)?;
            c.fetch_secret(id)
        })
    }

    fn fetch_secret(&mut self, id: u16) -> Result<Secret> {
        let (header, encoded) = self.protocol.export_secret(id)?;
        let payload = secret::decode(header.secret_type, header.subtype, &encoded)?;
        Ok(Secret { header, payload })
    }

    /// Encode and store a secret, returning its card-assigned id
    pub fn import_secret(
        &mut self,
        secret_type: SecretType,
        subtype: u8,
        label: &str,
        payload: &SecretPayload,
    ) -> Result<u16> {
        self.traced("import_secret", |c| {
            let feature = match secret_type {
                SecretType::FreeText => Feature::FreeTextSecrets,
                SecretType::WalletDescriptor => Feature::WalletDescriptors,
                _ => Feature::SecretStorage,
            };
            c.authorize(feature)?;
            if payload.secret_type() != secret_type {
                return Err(SecretProcessingError::TypeMismatch { expected: secret_type }.into());
            }
            if payload.subtype() != subtype {
                return Err(SecretProcessingError::InvalidField {
                    field: "subtype",
                    reason: format!("{:#04x} does not describe the payload", subtype),
                }
                .into());
            }
            c.store_secret(label, payload)
        })
    }

    /// Validate, encode, reject duplicates, import
    fn store_secret(&mut self, label: &str, payload: &SecretPayload) -> Result<u16> {
        self.check_label("label", label)?;
        if let SecretPayload::Mnemonic { words, .. } = payload {
            mnemonic::validate(words, &self.config)?;
        }
        let secret_type = payload.secret_type();
        let subtype = payload.subtype();
        let encoded = secret::encode(secret_type, subtype, payload, self.config.max_secret_size)?;

        let fingerprint = secret::fingerprint(&encoded);
        let existing = self.protocol.list_secret_headers()?;
        if let Some(duplicate) = existing
            .iter()
            .find(|h| h.secret_type == secret_type && h.fingerprint == fingerprint)
        {
            return Err(SecretProcessingError::Duplicate {
                existing_id: duplicate.id,
            }
            .into());
        }

        let id = self
            .protocol
            .import_secret(secret_type, subtype, EXPORT_PLAINTEXT_ALLOWED, label, &encoded)?;
        info!("Imported {} secret {}", secret_type, id);
        Ok(id)
    }

    pub fn import_mnemonic(&mut self, label: &str, words: &[String], passphrase: Option<&str>) -> Result<u16> {
        let payload = SecretPayload::Mnemonic {
            words: words.to_vec(),
            passphrase: passphrase.map(str::to_owned),
        };
        self.import_secret(SecretType::Mnemonic, payload.subtype(), label, &payload)
    }

    pub fn import_password(&mut self, label: &str, login: &str, password: &str, url: Option<&str>) -> Result<u16> {
        let payload = SecretPayload::Password {
            login: login.to_owned(),
            password: password.to_owned(),
            url: url.map(str::to_owned),
        };
        self.import_secret(SecretType::Password, payload.subtype(), label, &payload)
    }

    pub fn import_text(&mut self, label: &str, text: &str) -> Result<u16> {
        let payload = SecretPayload::FreeText { text: text.to_owned() };
        self.import_secret(SecretType::FreeText, 0x00, label, &payload)
    }

    pub fn import_descriptor(&mut self, label: &str, descriptor: &str) -> Result<u16> {
        let payload = SecretPayload::WalletDescriptor {
            descriptor: descriptor.to_owned(),
        };
        self.import_secret(SecretType::WalletDescriptor, 0x00, label, &payload)
    }

    /// Erasing an id the card does not hold is an error, never a no-op
    pub fn erase_secret(&mut self, id: u16) -> Result<()> {
        self.traced("erase_secret", |c| {
            c.authorize(Feature::SecretErase)?;
            c.protocol.reset_secret(id)?;
            info!("Erased secret {}", id);
            Ok(())
        })
    }

    /// Fresh BIP39 mnemonic from the OS RNG; the card is not involved
    pub fn generate_random_seed(&mut self, word_count: usize) -> Result<Zeroizing<Vec<String>>> {
        self.traced("generate_random_seed", |c| Ok(mnemonic::generate(word_count, &c.config)?))
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// An empty label clears it
    pub fn edit_card_label(&mut self, label: &str) -> Result<()> {
        self.traced("edit_card_label", |c| {
            c.authorize(Feature::CardLabel)?;
            c.check_label("card label", label)?;
            c.protocol.set_label(label)?;
            c.session
                .set_label(Some(label.to_owned()).filter(|l| !l.is_empty()));
            Ok(())
        })
    }

    pub fn get_card_label_info(&mut self) -> Result<CardLabelInfo> {
        self.traced("get_card_label_info", |c| {
            c.authorize(Feature::CardLabel)?;
            let label = c.protocol.get_label()?;
            c.session.set_label(label.clone());
            Ok(CardLabelInfo {
                label,
                max_length: c.config.max_label_length,
            })
        })
    }

    /// Card audit log, oldest first
    pub fn get_logs(&mut self) -> Result<Vec<LogEntry>> {
        self.traced("get_logs", |c| {
            c.authorize(Feature::Logs)?;
            c.protocol.print_logs()
        })
    }

    /// Snapshot of card metadata and secret headers
    ///
    /// Plaintext is included only for the ids in `with_payload`.
    pub fn make_backup(&mut self, with_payload: &[u16]) -> Result<Backup> {
        self.traced("make_backup", |c| {
            c.authorize(Feature::Backup)?;
            let card = c
                .session
                .card()
                .cloned()
                .ok_or_else(|| Error::card(CardFailure::NotConnected))?;
            let headers = c.protocol.list_secret_headers()?;

            let mut secrets = Vec::with_capacity(headers.len());
            for header in headers {
                let payload = if with_payload.contains(&header.id) {
                    if !header.is_exportable() {
                        return Err(Error::CardNotSuitable(NotSuitable::Feature {
                            feature: Feature::Backup,
                            card_type: card.card_type,
                            required: None,
                        }));
                    }
                    Some(c.fetch_secret(header.id)?.payload)
                } else {
                    None
                };
                secrets.push(BackupSecret { header, payload });
            }
            for id in with_payload {
                if !secrets.iter().any(|s| s.header.id == *id) {
                    return Err(Error::SecretRetrieval { id: *id });
                }
            }
            info!("Backup of {} secret(s) prepared", secrets.len());
            Ok(Backup::new(&card, secrets))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, PinChangeFailure, PinPolicyViolation};
    use crate::sim::VirtualCard;
    use crate::card::SeedkeeperVersion;

    const PIN: &str = "123456";

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon \
                           abandon abandon abandon abandon abandon about";

    fn words(phrase: &str) -> Vec<String> {
        phrase.split_whitespace().map(str::to_owned).collect()
    }

    fn controller(card: VirtualCard) -> Controller<VirtualCard> {
        let mut controller = Controller::new(card, Config::default());
        controller.connect().unwrap();
        controller
    }

    fn logged_in(card: VirtualCard) -> Controller<VirtualCard> {
        let mut controller = controller(card.with_pin(PIN));
        controller.verify_pin(&Pin::from(PIN)).unwrap();
        controller
    }

    #[test]
    fn test_import_and_read_mnemonic() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2());
        let original = words(ABANDON);

        let id = c.import_mnemonic("test", &original, None).unwrap();
        assert!(id >= 1);

        let secret = c.get_secret_details(id).unwrap();
        assert_eq!(secret.secret_type(), SecretType::Mnemonic);
        assert_eq!(secret.label(), "test");
        match &secret.payload {
            SecretPayload::Mnemonic { words, passphrase } => {
                assert_eq!(words, &original);
                assert_eq!(passphrase, &None);
            }
            other => panic!("unexpected payload {:?}", other),
        }

        let listed = c.list_secrets().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].label, "test");
    }

    #[test]
    fn test_generate_random_seed() {
        let mut c = Controller::new(VirtualCard::seedkeeper_v2(), Config::default());
        let first = c.generate_random_seed(24).unwrap();
        let second = c.generate_random_seed(24).unwrap();
        assert_eq!(first.len(), 24);
        assert_ne!(*first, *second);
        let wordlist = bip39::Language::English.word_list();
        assert!(first.iter().all(|w| wordlist.contains(&w.as_str())));

        assert!(matches!(
            c.generate_random_seed(18),
            Err(Error::SecretProcessing(_))
        ));
        assert_eq!(c.transport().transmit_count(), 0);
    }

    #[test]
    fn test_descriptor_on_v1_names_required_version() {
        let mut c = logged_in(VirtualCard::seedkeeper_v1());
        let sent = c.transport().transmit_count();

        let err = c.import_descriptor("wallet", "wpkh([d34db33f/84h/0h/0h]xpub/0/*)").unwrap_err();
        match &err {
            Error::CardNotSuitable(reason) => {
                assert_eq!(reason.required_version(), Some(SeedkeeperVersion::V2));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(c.transport().transmit_count(), sent);
        assert!(!c.supports(Feature::WalletDescriptors));
        assert!(c.supports(Feature::SecretStorage));
    }

    #[test]
    fn test_lockout_then_no_transmit() {
        let card = VirtualCard::seedkeeper_v2().with_pin(PIN).with_pin_tries(3);
        let mut c = controller(card);

        for expected in [2u8, 1] {
            let err = c.verify_pin(&Pin::from("000000")).unwrap_err();
            assert!(matches!(err, Error::InvalidPin { remaining } if remaining == expected));
            assert!(err.is_pin_retryable());
        }
        let err = c.verify_pin(&Pin::from("000000")).unwrap_err();
        assert!(matches!(err, Error::InvalidPin { remaining: 0 }));
        assert_eq!(c.session_state(), SessionState::Locked);

        let sent = c.transport().transmit_count();
        assert!(matches!(
            c.verify_pin(&Pin::from(PIN)),
            Err(Error::CardNotSuitable(NotSuitable::PinBlocked))
        ));
        assert!(matches!(
            c.list_secrets(),
            Err(Error::CardNotSuitable(NotSuitable::PinBlocked))
        ));
        assert_eq!(c.transport().transmit_count(), sent);

        c.disconnect();
        assert_eq!(c.session_state(), SessionState::Disconnected);
    }

    #[test]
    fn test_erase_missing_secret() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2());
        let err = c.erase_secret(42).unwrap_err();
        assert!(matches!(err, Error::SecretRetrieval { id: 42 }));

        let id = c.import_text("note", "hello").unwrap();
        c.erase_secret(id).unwrap();
        assert!(matches!(c.erase_secret(id), Err(Error::SecretRetrieval { .. })));
        assert!(c.list_secrets().unwrap().is_empty());
    }

    #[test]
    fn test_details_missing_secret() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2());
        assert!(matches!(c.get_secret_details(77), Err(Error::SecretRetrieval { id: 77 })));

        let id = c.import_text("note", "hello").unwrap();
        assert!(c.get_secret_details(id).is_ok());
        c.erase_secret(id).unwrap();
        let err = c.get_secret_details(id).unwrap_err();
        assert!(matches!(err, Error::SecretRetrieval { id: missing } if missing == id));
        assert_eq!(c.session_state(), SessionState::Authenticated);
    }

    #[test]
    fn test_initialize_rejects_short_pin() {
        let mut c = controller(VirtualCard::seedkeeper_v2());
        let pin = Pin::from("12");
        let sent = c.transport().transmit_count();
        let err = c.initialize(&pin, &pin, &SeedPolicy::PinOnly).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PinPolicy);
        assert!(matches!(err, Error::PinPolicy(PinPolicyViolation::TooShort { min: 4 })));
        assert_eq!(c.transport().transmit_count(), sent);
        assert!(!c.card().unwrap().setup_done);
    }

    #[test]
    fn test_gates_do_not_transmit() {
        let mut c = controller(VirtualCard::seedkeeper_v2().with_pin(PIN));
        let sent = c.transport().transmit_count();

        assert!(matches!(
            c.list_secrets(),
            Err(Error::Card { reason: CardFailure::PinRequired, .. })
        ));
        assert!(matches!(
            c.get_secret_details(1),
            Err(Error::Card { reason: CardFailure::PinRequired, .. })
        ));
        assert!(matches!(
            c.import_password("mail", "me", "hunter2", None),
            Err(Error::Card { reason: CardFailure::PinRequired, .. })
        ));
        assert!(c.erase_secret(1).is_err());
        assert!(c.get_logs().is_err());
        assert!(c.make_backup(&[]).is_err());
        assert_eq!(c.transport().transmit_count(), sent);

        c.disconnect();
        let err = c.list_secrets().unwrap_err();
        assert!(matches!(err, Error::Card { reason: CardFailure::NotConnected, .. }));
    }

    #[test]
    fn test_oversized_secret_not_sent() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2());
        let max = c.config().max_secret_size;
        let sent = c.transport().transmit_count();

        // Two length bytes plus text
        let err = c.import_text("big", &"x".repeat(max - 1)).unwrap_err();
        assert!(matches!(
            err,
            Error::SecretProcessing(SecretProcessingError::PayloadTooLarge { size, .. }) if size == max + 1
        ));
        assert_eq!(c.transport().transmit_count(), sent);
    }

    #[test]
    fn test_duplicate_import_rejected() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2());
        let id = c.import_password("mail", "me", "hunter2", Some("https://mail.example")).unwrap();
        let err = c
            .import_password("mail again", "me", "hunter2", Some("https://mail.example"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SecretProcessing(SecretProcessingError::Duplicate { existing_id }) if existing_id == id
        ));
    }

    #[test]
    fn test_password_round_trip_with_url() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2());
        let id = c.import_password("bank", "alice", "s3cret", Some("https://bank.example")).unwrap();
        let secret = c.get_secret_details(id).unwrap();
        assert_eq!(
            secret.payload,
            SecretPayload::Password {
                login: "alice".to_string(),
                password: "s3cret".to_string(),
                url: Some("https://bank.example".to_string()),
            }
        );
        assert_eq!(secret.header.nb_export_plain, 1);
    }

    #[test]
    fn test_invalid_mnemonic_rejected_locally() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2());
        let sent = c.transport().transmit_count();
        let mut bad = words(ABANDON);
        bad[11] = "abandon".to_string();
        assert!(matches!(
            c.import_mnemonic("bad", &bad, None),
            Err(Error::SecretProcessing(_))
        ));
        assert_eq!(c.transport().transmit_count(), sent);
    }

    #[test]
    fn test_change_pin_confirmation() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2());
        let sent = c.transport().transmit_count();
        assert!(matches!(
            c.change_pin(&Pin::from(PIN), &Pin::from("654321"), &Pin::from("654320")),
            Err(Error::PinMismatch)
        ));
        assert_eq!(c.transport().transmit_count(), sent);

        assert!(matches!(
            c.change_pin(&Pin::from("999999"), &Pin::from("654321"), &Pin::from("654321")),
            Err(Error::PinChange(PinChangeFailure::WrongCurrentPin { remaining: 4 }))
        ));
        c.change_pin(&Pin::from(PIN), &Pin::from("654321"), &Pin::from("654321"))
            .unwrap();
    }

    #[test]
    fn test_initialize_with_generated_seed() {
        let mut c = controller(VirtualCard::seedkeeper_v2());
        let pin = Pin::from(PIN);
        assert!(matches!(
            c.initialize(&pin, &Pin::from("000000"), &SeedPolicy::PinOnly),
            Err(Error::PinMismatch)
        ));

        let id = c.initialize(&pin, &pin, &SeedPolicy::Generate { size: 32 }).unwrap();
        assert_eq!(c.session_state(), SessionState::Authenticated);
        assert!(c.card().unwrap().is_seeded);

        let seed = c.get_secret_details(id.unwrap()).unwrap();
        assert_eq!(seed.secret_type(), SecretType::Masterseed);
        match &seed.payload {
            SecretPayload::Masterseed { seed } => assert_eq!(seed.len(), 32),
            other => panic!("unexpected payload {:?}", other),
        }

        let err = c.initialize(&pin, &pin, &SeedPolicy::PinOnly).unwrap_err();
        assert!(matches!(err, Error::Card { reason: CardFailure::AlreadyInitialized, .. }));
    }

    #[test]
    fn test_initialize_satochip_with_mnemonic() {
        let mut c = controller(VirtualCard::satochip());
        let pin = Pin::from(PIN);
        let policy = SeedPolicy::Generate { size: 32 };
        assert!(matches!(
            c.initialize(&pin, &pin, &policy),
            Err(Error::CardNotSuitable(NotSuitable::Feature { .. }))
        ));

        let policy = SeedPolicy::Mnemonic {
            words: words(ABANDON),
            passphrase: Some("TREZOR".to_string()),
        };
        assert_eq!(c.initialize(&pin, &pin, &policy).unwrap(), None);
        assert!(c.card().unwrap().is_seeded);
        assert_eq!(c.transport().state().bip32_seed.len(), 64);

        let err = c.list_secrets().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CardNotSuitable);
    }

    #[test]
    fn test_card_label() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2().with_label("old"));
        assert_eq!(c.card().unwrap().label.as_deref(), Some("old"));

        c.edit_card_label("Cold storage").unwrap();
        let info = c.get_card_label_info().unwrap();
        assert_eq!(info.label.as_deref(), Some("Cold storage"));
        assert_eq!(info.max_length, Config::default().max_label_length);

        assert!(c.edit_card_label(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_logs_and_status() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2());
        let id = c.import_text("note", "first").unwrap();
        c.get_secret_details(id).unwrap();

        let status = c.get_seedkeeper_status().unwrap();
        assert_eq!(status.secret_count, 1);
        assert!(status.free_memory < status.total_memory);

        let logs = c.get_logs().unwrap();
        // verify PIN, import, export
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[1].secret_id1, Some(id));
        assert!(logs.iter().all(LogEntry::is_success));
        assert!(logs.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[test]
    fn test_backup_selected_payloads() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2().with_label("vault"));
        let keep = c.import_text("note", "plaintext").unwrap();
        let other = c.import_mnemonic("wallet", &words(ABANDON), Some("extra")).unwrap();

        let backup = c.make_backup(&[keep]).unwrap();
        assert_eq!(backup.card.label.as_deref(), Some("vault"));
        assert_eq!(backup.secrets.len(), 2);
        let with = backup.secrets.iter().find(|s| s.header.id == keep).unwrap();
        assert_eq!(
            with.payload,
            Some(SecretPayload::FreeText {
                text: "plaintext".to_string()
            })
        );
        let without = backup.secrets.iter().find(|s| s.header.id == other).unwrap();
        assert!(without.payload.is_none());

        let json = backup.to_json().unwrap();
        assert!(!json.contains("abandon"));
        assert!(matches!(c.make_backup(&[999]), Err(Error::SecretRetrieval { id: 999 })));
    }

    #[test]
    fn test_card_removal_ends_session() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2());
        c.transport_mut().remove_card();
        assert!(!c.check_card_presence());
        assert_eq!(c.session_state(), SessionState::Disconnected);

        c.transport_mut().insert_card();
        c.connect().unwrap();
        assert!(!c.pin_session().verified);
    }

    #[test]
    fn test_removal_mid_operation_is_card_error() {
        let mut c = logged_in(VirtualCard::seedkeeper_v2());
        c.transport_mut().remove_card();
        let err = c.list_secrets().unwrap_err();
        assert!(matches!(err, Error::Card { reason: CardFailure::NoCard, .. }));
        assert_eq!(c.session_state(), SessionState::Disconnected);
    }

    #[test]
    fn test_authenticity_with_pinned_certificate() {
        let cert = b"genuine card certificate".to_vec();
        let mut truststore = Truststore::new();
        truststore.pin_certificate(&cert);

        let card = VirtualCard::seedkeeper_v2().with_pin(PIN).with_certificate(cert);
        let mut c = Controller::with_truststore(card, Config::default(), truststore.clone());
        c.connect().unwrap();
        assert_eq!(c.verify_authenticity().unwrap(), AuthenticityStatus::Verified);
        assert_eq!(c.card().unwrap().authenticity_status, AuthenticityStatus::Verified);

        let other = VirtualCard::seedkeeper_v2().with_certificate(b"clone".to_vec());
        let mut c = Controller::with_truststore(other, Config::default(), truststore);
        c.connect().unwrap();
        assert_eq!(c.verify_authenticity().unwrap(), AuthenticityStatus::Failed);
    }
}
