//! Error taxonomy
//!
//! Every failure surfaced by the controller is exactly one [`Error`] variant.
//! The presentation layer dispatches on [`Error::kind`]; the variant fields
//! carry structured context (attempts left, required version, status word).

use thiserror::Error;

use crate::card::{CardType, Feature, SeedkeeperVersion};
use crate::secret::SecretType;

pub type Result<T> = std::result::Result<T, Error>;

/// Fieldless view of [`Error`] for presentation-layer dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Card,
    CardNotSuitable,
    InvalidPin,
    PinMismatch,
    PinPolicy,
    PinChange,
    SecretProcessing,
    SecretRetrieval,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Transport or card failure not otherwise classified
    #[error("card error: {reason}{}", format_sw(.sw))]
    Card { reason: CardFailure, sw: Option<u16> },

    /// The connected card cannot perform the requested operation
    #[error("card not suitable: {0}")]
    CardNotSuitable(NotSuitable),

    /// PIN verification failed
    #[error("wrong PIN, {remaining} attempt(s) remaining")]
    InvalidPin { remaining: u8 },

    /// PIN and confirmation disagree (no card I/O performed)
    #[error("PIN confirmation does not match")]
    PinMismatch,

    /// A new PIN (setup or change) violates the configured length limits
    #[error("PIN rejected: {0}")]
    PinPolicy(#[from] PinPolicyViolation),

    #[error("PIN change rejected: {0}")]
    PinChange(PinChangeFailure),

    #[error("secret processing failed: {0}")]
    SecretProcessing(#[from] SecretProcessingError),

    #[error("secret {id} not found on card")]
    SecretRetrieval { id: u16 },
}

fn format_sw(sw: &Option<u16>) -> String {
    match sw {
        Some(sw) => format!(" (SW {:04X})", sw),
        None => String::new(),
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Card { .. } => ErrorKind::Card,
            Error::CardNotSuitable(_) => ErrorKind::CardNotSuitable,
            Error::InvalidPin { .. } => ErrorKind::InvalidPin,
            Error::PinMismatch => ErrorKind::PinMismatch,
            Error::PinPolicy(_) => ErrorKind::PinPolicy,
            Error::PinChange(_) => ErrorKind::PinChange,
            Error::SecretProcessing(_) => ErrorKind::SecretProcessing,
            Error::SecretRetrieval { .. } => ErrorKind::SecretRetrieval,
        }
    }

    /// Card failure without a status word
    pub fn card(reason: CardFailure) -> Self {
        Error::Card { reason, sw: None }
    }

    /// Card failure attributed to a status word
    pub fn card_sw(reason: CardFailure, sw: u16) -> Self {
        Error::Card { reason, sw: Some(sw) }
    }

    /// True when the user may simply try another PIN
    pub fn is_pin_retryable(&self) -> bool {
        matches!(self, Error::InvalidPin { remaining } if *remaining > 0)
    }
}

/// Reason attached to [`Error::Card`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardFailure {
    #[error("no card connected")]
    NotConnected,
    #[error("no card present in reader")]
    NoCard,
    #[error("PIN verification required")]
    PinRequired,
    #[error("card setup has not been done")]
    SetupNotDone,
    #[error("card is already initialized")]
    AlreadyInitialized,
    #[error("card storage is full")]
    StorageFull,
    #[error("wrong command length")]
    WrongLength,
    #[error("operation not allowed by the card")]
    OperationNotAllowed,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("unexpected status word")]
    UnexpectedStatus,
    #[error("malformed card response: {0}")]
    MalformedResponse(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Reason attached to [`Error::CardNotSuitable`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotSuitable {
    #[error("{feature} is not available on {card_type}{}", required_suffix(.required))]
    Feature {
        feature: Feature,
        card_type: CardType,
        required: Option<SeedkeeperVersion>,
    },
    #[error("PIN is blocked; reset or reconnect the card")]
    PinBlocked,
    #[error("card requires a secure channel, which is not supported")]
    SecureChannelRequired,
    #[error("unsupported card")]
    UnsupportedCard,
}

fn required_suffix(required: &Option<SeedkeeperVersion>) -> String {
    match required {
        Some(version) => format!(" (requires Seedkeeper {})", version),
        None => String::new(),
    }
}

impl NotSuitable {
    /// Minimum Seedkeeper version named by this failure, if any
    pub fn required_version(&self) -> Option<SeedkeeperVersion> {
        match self {
            NotSuitable::Feature { required, .. } => *required,
            _ => None,
        }
    }
}

/// Reason attached to [`Error::PinPolicy`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinPolicyViolation {
    #[error("PIN must be at least {min} characters")]
    TooShort { min: usize },
    #[error("PIN must be at most {max} characters")]
    TooLong { max: usize },
}

/// Reason attached to [`Error::PinChange`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinChangeFailure {
    #[error("new PIN must differ from the current PIN")]
    Unchanged,
    #[error("current PIN rejected, {remaining} attempt(s) remaining")]
    WrongCurrentPin { remaining: u8 },
    #[error("card refused the change (SW {0:04X})")]
    Refused(u16),
}

/// Encode/decode failures of a secret envelope
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretProcessingError {
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("truncated {field}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("{field} is too long: {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("payload does not match secret type {expected}")]
    TypeMismatch { expected: SecretType },

    #[error("subtype {subtype:#04x} is not valid for {secret_type}")]
    UnsupportedSubtype { secret_type: SecretType, subtype: u8 },

    #[error("secret type {0} cannot be decoded")]
    UnsupportedType(SecretType),

    #[error("fingerprint mismatch: card reported {card}, computed {computed}")]
    FingerprintMismatch { card: String, computed: String },

    #[error("an identical secret is already stored with id {existing_id}")]
    Duplicate { existing_id: u16 },
}
