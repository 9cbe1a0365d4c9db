//! Secret management for Satochip/Seedkeeper cards
//!
//! The library talks to a PIN-protected Satochip or Seedkeeper applet and
//! exposes secret and card administration through [`Controller`]:
//! - mnemonics, passwords, free text and wallet descriptors stored on a
//!   Seedkeeper, encoded with [`secret::codec`]
//! - PIN verification, change and card initialization ([`session`])
//! - card label, audit logs, authenticity and JSON backups
//!
//! Transports implement [`protocol::CardTransport`]. [`sim::VirtualCard`]
//! is a software card for tests and the `--simulator` CLI mode; the `pcsc`
//! feature adds a PC/SC reader transport.

pub mod apdu;
pub mod backup;
pub mod card;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod secret;
pub mod session;
pub mod sim;

pub use backup::Backup;
pub use card::{Card, CardType, Feature, SeedkeeperVersion};
pub use config::Config;
pub use controller::{CardLabelInfo, Controller, SeedPolicy};
pub use error::{Error, ErrorKind, Result};
pub use protocol::{CardTransport, SeedkeeperProtocol};
pub use secret::{Secret, SecretHeader, SecretPayload, SecretType};
pub use session::{Pin, SessionState};
