//! Card protocol adapter
//!
//! [`SeedkeeperProtocol`] frames applet commands, sends them through a
//! [`CardTransport`] and turns status words into typed results. All status
//! word interpretation goes through [`StatusOutcome`].

#[cfg(feature = "pcsc")]
pub mod pcsc;
pub mod shared;

pub use shared::SharedTransport;

use log::{debug, warn};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::apdu::{ins, step, Response, APDU, CLA, CLA_ISO, MAX_SHORT_DATA, SW};
use crate::card::{CardStatus, CardType, FirmwareVersion, LogEntry, SeedkeeperStatus};
use crate::error::{CardFailure, Error, NotSuitable, PinChangeFailure, Result, SecretProcessingError};
use crate::secret::{fingerprint, SecretHeader, SecretType};
use crate::session::Pin;

/// Applet AIDs, in the order they are tried
pub const AIDS: [(&[u8], CardType); 3] = [
    (b"SeedKeeper", CardType::Seedkeeper),
    (b"SatoChip", CardType::Satochip),
    (b"SatoEdu", CardType::SatochipEdu),
];

/// Payload bytes per IMPORT/EXPORT chunk
pub const CHUNK_SIZE: usize = 128;

/// Certificate bytes requested per EXPORT_PKI_CERTIFICATE call
const CERT_CHUNK_SIZE: u8 = 128;

/// Failures of the underlying byte channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no reader available")]
    NoReader,
    #[error("no card present")]
    NoCard,
    #[error("card was removed")]
    CardRemoved,
    #[error("channel not connected")]
    NotConnected,
    #[error("timed out waiting for the card")]
    Timeout,
    #[error("{0}")]
    Io(String),
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NoCard | TransportError::CardRemoved => Error::card(CardFailure::NoCard),
            TransportError::NotConnected => Error::card(CardFailure::NotConnected),
            other => Error::card(CardFailure::Transport(other.to_string())),
        }
    }
}

/// The byte channel to one card
///
/// Exactly one command may be in flight; callers serialize access (see
/// [`SharedTransport`] when a transport must cross threads).
pub trait CardTransport {
    /// Open the channel to the card
    fn connect(&mut self) -> std::result::Result<(), TransportError>;

    fn is_card_present(&mut self) -> bool;

    /// Send one command APDU and wait for its response
    fn transmit(&mut self, command: &[u8]) -> std::result::Result<Response, TransportError>;

    fn disconnect(&mut self);
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    fn connect(&mut self) -> std::result::Result<(), TransportError> {
        (**self).connect()
    }

    fn is_card_present(&mut self) -> bool {
        (**self).is_card_present()
    }

    fn transmit(&mut self, command: &[u8]) -> std::result::Result<Response, TransportError> {
        (**self).transmit(command)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}

/// Classification of a status word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Success,
    WrongPin(u8),
    PinBlocked,
    NotAuthenticated,
    SetupNotDone,
    WrongLength,
    NotFound,
    StorageFull,
    SequenceEnd,
    Unsupported,
    OperationNotAllowed,
    InvalidParameter,
    CardError(u16),
}

impl StatusOutcome {
    pub fn from_sw(sw: u16) -> Self {
        if let Some(remaining) = SW::pin_tries(sw) {
            return StatusOutcome::WrongPin(remaining);
        }
        match sw {
            SW::SUCCESS => StatusOutcome::Success,
            SW::IDENTITY_BLOCKED => StatusOutcome::PinBlocked,
            SW::UNAUTHORIZED => StatusOutcome::NotAuthenticated,
            SW::SETUP_NOT_DONE => StatusOutcome::SetupNotDone,
            SW::WRONG_LENGTH => StatusOutcome::WrongLength,
            SW::OBJECT_NOT_FOUND => StatusOutcome::NotFound,
            SW::NO_MEMORY_LEFT => StatusOutcome::StorageFull,
            SW::SEQUENCE_END => StatusOutcome::SequenceEnd,
            SW::UNSUPPORTED_FEATURE | SW::INS_NOT_SUPPORTED => StatusOutcome::Unsupported,
            SW::OPERATION_NOT_ALLOWED => StatusOutcome::OperationNotAllowed,
            SW::INVALID_PARAMETER => StatusOutcome::InvalidParameter,
            other => StatusOutcome::CardError(other),
        }
    }

    /// Taxonomy error for a non-success outcome
    ///
    /// Commands with a more specific meaning for a status word (NotFound on
    /// export, WrongPin on change PIN) map it themselves before falling
    /// back to this.
    pub fn into_error(self, sw: u16) -> Error {
        match self {
            StatusOutcome::WrongPin(remaining) => Error::InvalidPin { remaining },
            StatusOutcome::PinBlocked => Error::CardNotSuitable(NotSuitable::PinBlocked),
            StatusOutcome::NotAuthenticated => Error::card_sw(CardFailure::PinRequired, sw),
            StatusOutcome::SetupNotDone => Error::card_sw(CardFailure::SetupNotDone, sw),
            StatusOutcome::WrongLength => Error::card_sw(CardFailure::WrongLength, sw),
            StatusOutcome::StorageFull => Error::card_sw(CardFailure::StorageFull, sw),
            StatusOutcome::Unsupported => Error::CardNotSuitable(NotSuitable::UnsupportedCard),
            StatusOutcome::OperationNotAllowed => Error::card_sw(CardFailure::OperationNotAllowed, sw),
            StatusOutcome::InvalidParameter => Error::card_sw(CardFailure::InvalidParameter, sw),
            StatusOutcome::Success
            | StatusOutcome::NotFound
            | StatusOutcome::SequenceEnd
            | StatusOutcome::CardError(_) => Error::card_sw(CardFailure::UnexpectedStatus, sw),
        }
    }
}

fn malformed(what: impl Into<String>) -> Error {
    Error::card(CardFailure::MalformedResponse(what.into()))
}

/// Length-prefixed label as the applet expects it
fn label_bytes(label: &str) -> Result<Vec<u8>> {
    let bytes = label.as_bytes();
    if bytes.len() > u8::MAX as usize {
        return Err(SecretProcessingError::FieldTooLong {
            field: "label",
            len: bytes.len(),
            max: u8::MAX as usize,
        }
        .into());
    }
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
    Ok(out)
}

/// `id(2) fingerprint(4)` returned by import and generate
fn parse_id_fingerprint(data: &[u8]) -> Result<(u16, [u8; 4])> {
    if data.len() < 6 {
        return Err(malformed(format!("expected id and fingerprint, got {} bytes", data.len())));
    }
    let id = u16::from_be_bytes([data[0], data[1]]);
    let mut fp = [0u8; 4];
    fp.copy_from_slice(&data[2..6]);
    Ok((id, fp))
}

/// Satochip/Seedkeeper applet client
pub struct SeedkeeperProtocol<T: CardTransport> {
    transport: T,
}

impl<T: CardTransport> SeedkeeperProtocol<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn connect(&mut self) -> Result<()> {
        self.transport.connect()?;
        Ok(())
    }

    pub fn is_card_present(&mut self) -> bool {
        self.transport.is_card_present()
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    /// Send a command and return the raw response, whatever its status
    fn exchange(&mut self, apdu: &APDU) -> Result<Response> {
        let raw = apdu.to_bytes().map_err(|e| malformed(e.to_string()))?;
        // Only the instruction is logged; data may carry a PIN or a secret
        debug!(
            "Sending {} (INS {:02X} P1 {:02X} P2 {:02X}, {} data bytes)",
            ins::name(apdu.ins),
            apdu.ins,
            apdu.p1,
            apdu.p2,
            apdu.data.len()
        );
        let response = self.transport.transmit(&raw)?;
        debug!("{} -> SW {:04X}", ins::name(apdu.ins), response.sw());
        Ok(response)
    }

    /// Send a command that must succeed
    fn command(&mut self, apdu: &APDU) -> Result<Response> {
        let response = self.exchange(apdu)?;
        match StatusOutcome::from_sw(response.sw()) {
            StatusOutcome::Success => Ok(response),
            outcome => {
                warn!("{} failed with SW {:04X}", ins::name(apdu.ins), response.sw());
                Err(outcome.into_error(response.sw()))
            }
        }
    }

    /// SELECT each known applet in turn
    pub fn select(&mut self) -> Result<CardType> {
        for (aid, card_type) in AIDS {
            let apdu = APDU::with_data(CLA_ISO, ins::SELECT, 0x04, 0x00, aid.to_vec());
            let response = self.exchange(&apdu)?;
            if response.is_okay() {
                debug!("Selected {} applet", card_type);
                return Ok(card_type);
            }
        }
        Err(Error::CardNotSuitable(NotSuitable::UnsupportedCard))
    }

    pub fn get_status(&mut self) -> Result<CardStatus> {
        let response = self.command(&APDU::new(CLA, ins::GET_STATUS, 0x00, 0x00))?;
        CardStatus::from_bytes(&response.data)
            .ok_or_else(|| malformed(format!("status block of {} bytes", response.data.len())))
    }

    pub fn get_firmware_version(&mut self) -> Result<FirmwareVersion> {
        Ok(self.get_status()?.firmware)
    }

    /// Provision PIN 0 and its unblock code on a blank card
    pub fn setup(&mut self, pin: &Pin, pin_tries: u8, puk: &Pin, puk_tries: u8) -> Result<()> {
        // APDU wipes its data on drop
        let mut data = Vec::with_capacity(4 + pin.len() + puk.len());
        data.push(pin_tries);
        data.push(pin.len() as u8);
        data.extend_from_slice(pin.as_bytes());
        data.push(puk_tries);
        data.push(puk.len() as u8);
        data.extend_from_slice(puk.as_bytes());
        self.command(&APDU::with_data(CLA, ins::SETUP, 0x00, 0x00, data))?;
        Ok(())
    }

    pub fn verify_pin(&mut self, pin: &Pin) -> Result<()> {
        let apdu = APDU::with_data(CLA, ins::VERIFY_PIN, 0x00, 0x00, pin.as_bytes().to_vec());
        self.command(&apdu)?;
        Ok(())
    }

    pub fn change_pin(&mut self, old: &Pin, new: &Pin) -> Result<()> {
        let mut data = Vec::with_capacity(2 + old.len() + new.len());
        data.push(old.len() as u8);
        data.extend_from_slice(old.as_bytes());
        data.push(new.len() as u8);
        data.extend_from_slice(new.as_bytes());

        let response = self.exchange(&APDU::with_data(CLA, ins::CHANGE_PIN, 0x00, 0x00, data))?;
        match StatusOutcome::from_sw(response.sw()) {
            StatusOutcome::Success => Ok(()),
            StatusOutcome::WrongPin(remaining) => {
                Err(Error::PinChange(PinChangeFailure::WrongCurrentPin { remaining }))
            }
            StatusOutcome::PinBlocked => Err(Error::CardNotSuitable(NotSuitable::PinBlocked)),
            StatusOutcome::NotAuthenticated => Err(Error::card_sw(CardFailure::PinRequired, response.sw())),
            _ => Err(Error::PinChange(PinChangeFailure::Refused(response.sw()))),
        }
    }

    pub fn logout(&mut self) -> Result<()> {
        self.command(&APDU::new(CLA, ins::LOGOUT_ALL, 0x00, 0x00))?;
        Ok(())
    }

    pub fn get_label(&mut self) -> Result<Option<String>> {
        let response = self.command(&APDU::new(CLA, ins::CARD_LABEL, 0x01, 0x00))?;
        let data = &response.data;
        let Some((&len, rest)) = data.split_first() else {
            return Ok(None);
        };
        let label = rest
            .get(..len as usize)
            .ok_or_else(|| malformed("card label overruns response"))?;
        if label.is_empty() {
            return Ok(None);
        }
        let label = std::str::from_utf8(label).map_err(|_| malformed("card label is not UTF-8"))?;
        Ok(Some(label.to_owned()))
    }

    pub fn set_label(&mut self, label: &str) -> Result<()> {
        let data = label_bytes(label)?;
        self.command(&APDU::with_data(CLA, ins::CARD_LABEL, 0x00, 0x00, data))?;
        Ok(())
    }

    /// Satochip BIP32 master seed import
    pub fn import_seed(&mut self, seed: &[u8]) -> Result<()> {
        let apdu = APDU::with_data(CLA, ins::BIP32_IMPORT_SEED, seed.len() as u8, 0x00, seed.to_vec());
        self.command(&apdu)?;
        Ok(())
    }

    /// Ask a Seedkeeper to generate a masterseed of `size` bytes on-card
    pub fn generate_masterseed(&mut self, size: u8, export_rights: u8, label: &str) -> Result<(u16, [u8; 4])> {
        let data = label_bytes(label)?;
        let apdu = APDU::with_data(CLA, ins::GENERATE_MASTERSEED, size, export_rights, data);
        let response = self.command(&apdu)?;
        parse_id_fingerprint(&response.data)
    }

    /// Plain import of an encoded secret, in chunks
    ///
    /// Returns the card-assigned id once the card's fingerprint matches the
    /// one computed over `payload`.
    pub fn import_secret(
        &mut self,
        secret_type: SecretType,
        subtype: u8,
        export_rights: u8,
        label: &str,
        payload: &[u8],
    ) -> Result<u16> {
        let size = u16::try_from(payload.len()).map_err(|_| SecretProcessingError::PayloadTooLarge {
            size: payload.len(),
            max: u16::MAX as usize,
        })?;

        let mut init = Vec::with_capacity(5 + label.len() + 1);
        init.extend_from_slice(&size.to_be_bytes());
        init.push(secret_type.to_byte());
        init.push(export_rights);
        init.push(subtype);
        init.extend_from_slice(&label_bytes(label)?);
        if init.len() > MAX_SHORT_DATA {
            return Err(malformed("import header too long"));
        }
        self.command(&APDU::with_data(CLA, ins::IMPORT_SECRET, 0x00, step::INIT, init))?;

        let mut chunks = payload.chunks(CHUNK_SIZE).peekable();
        let mut last = None;
        while let Some(chunk) = chunks.next() {
            let p2 = if chunks.peek().is_some() { step::UPDATE } else { step::FINAL };
            let response = self.command(&APDU::with_data(CLA, ins::IMPORT_SECRET, 0x00, p2, chunk.to_vec()))?;
            if p2 == step::FINAL {
                last = Some(parse_id_fingerprint(&response.data)?);
            }
        }
        let (id, card_fp) = match last {
            Some(result) => result,
            None => {
                let response = self.command(&APDU::new(CLA, ins::IMPORT_SECRET, 0x00, step::FINAL))?;
                parse_id_fingerprint(&response.data)?
            }
        };

        let computed = fingerprint(payload);
        if card_fp != computed {
            return Err(SecretProcessingError::FingerprintMismatch {
                card: hex::encode(card_fp),
                computed: hex::encode(computed),
            }
            .into());
        }
        Ok(id)
    }

    /// Read back a secret's header and encoded payload
    pub fn export_secret(&mut self, id: u16) -> Result<(SecretHeader, Zeroizing<Vec<u8>>)> {
        let apdu = APDU::with_data(CLA, ins::EXPORT_SECRET, 0x00, step::INIT, id.to_be_bytes().to_vec());
        let response = self.exchange(&apdu)?;
        match StatusOutcome::from_sw(response.sw()) {
            StatusOutcome::Success => {}
            StatusOutcome::NotFound => return Err(Error::SecretRetrieval { id }),
            outcome => return Err(outcome.into_error(response.sw())),
        }

        let (header, rest) = SecretHeader::parse(&response.data)?;
        if rest.len() != 2 {
            return Err(malformed("export header without payload size"));
        }
        let size = u16::from_be_bytes([rest[0], rest[1]]) as usize;

        let mut payload = Zeroizing::new(Vec::with_capacity(size));
        while payload.len() < size {
            let mut response = self.command(&APDU::new(CLA, ins::EXPORT_SECRET, 0x00, step::UPDATE))?;
            if response.is_empty() {
                return Err(malformed("export ended early"));
            }
            payload.extend_from_slice(&response.take_data());
        }
        if payload.len() != size {
            return Err(malformed("export returned more data than announced"));
        }

        let computed = fingerprint(&payload);
        if computed != header.fingerprint {
            return Err(SecretProcessingError::FingerprintMismatch {
                card: header.fingerprint_hex(),
                computed: hex::encode(computed),
            }
            .into());
        }
        Ok((header, payload))
    }

    pub fn reset_secret(&mut self, id: u16) -> Result<()> {
        let apdu = APDU::with_data(CLA, ins::RESET_SECRET, 0x00, 0x00, id.to_be_bytes().to_vec());
        let response = self.exchange(&apdu)?;
        match StatusOutcome::from_sw(response.sw()) {
            StatusOutcome::Success => Ok(()),
            StatusOutcome::NotFound => Err(Error::SecretRetrieval { id }),
            outcome => Err(outcome.into_error(response.sw())),
        }
    }

    /// Headers in card order; SEQUENCE_END terminates the listing
    pub fn list_secret_headers(&mut self) -> Result<Vec<SecretHeader>> {
        let mut headers = Vec::new();
        let mut p2 = step::INIT;
        loop {
            let response = self.exchange(&APDU::new(CLA, ins::LIST_SECRET_HEADERS, 0x00, p2))?;
            match StatusOutcome::from_sw(response.sw()) {
                StatusOutcome::Success => {}
                StatusOutcome::SequenceEnd => break,
                outcome => return Err(outcome.into_error(response.sw())),
            }
            let (header, rest) = SecretHeader::parse(&response.data)?;
            if !rest.is_empty() {
                return Err(malformed("trailing bytes after secret header"));
            }
            headers.push(header);
            p2 = step::UPDATE;
        }
        Ok(headers)
    }

    pub fn get_seedkeeper_status(&mut self) -> Result<SeedkeeperStatus> {
        let response = self.command(&APDU::new(CLA, ins::GET_SEEDKEEPER_STATUS, 0x00, 0x00))?;
        SeedkeeperStatus::from_bytes(&response.data)
            .ok_or_else(|| malformed(format!("seedkeeper status of {} bytes", response.data.len())))
    }

    /// All log records still held by the card, oldest first
    pub fn print_logs(&mut self) -> Result<Vec<LogEntry>> {
        let response = self.command(&APDU::new(CLA, ins::PRINT_LOGS, step::INIT, 0x00))?;
        let data = &response.data;
        if data.len() < 4 {
            return Err(malformed("log counters missing"));
        }
        let total = u16::from_be_bytes([data[0], data[1]]) as u32;
        let available = u16::from_be_bytes([data[2], data[3]]) as u32;
        let mut sequence = total.saturating_sub(available);

        let mut entries = Vec::with_capacity(available as usize);
        let mut records = Zeroizing::new(data[4..].to_vec());
        loop {
            if records.len() % LogEntry::RECORD_SIZE != 0 {
                return Err(malformed("partial log record"));
            }
            for record in records.chunks(LogEntry::RECORD_SIZE) {
                if let Some(entry) = LogEntry::from_record(sequence, record) {
                    entries.push(entry);
                    sequence += 1;
                }
            }
            if entries.len() as u32 >= available {
                break;
            }
            let mut response = self.exchange(&APDU::new(CLA, ins::PRINT_LOGS, step::UPDATE, 0x00))?;
            match StatusOutcome::from_sw(response.sw()) {
                StatusOutcome::Success if !response.is_empty() => records = response.take_data(),
                StatusOutcome::Success | StatusOutcome::SequenceEnd => break,
                outcome => return Err(outcome.into_error(response.sw())),
            }
        }
        Ok(entries)
    }

    /// Authenticity certificate, or None if the card has none
    pub fn get_authenticity_certificate(&mut self) -> Result<Option<Vec<u8>>> {
        let response = self.exchange(&APDU::new(CLA, ins::EXPORT_PKI_CERTIFICATE, step::INIT, 0x00))?;
        match StatusOutcome::from_sw(response.sw()) {
            StatusOutcome::Success => {}
            StatusOutcome::Unsupported | StatusOutcome::NotFound => return Ok(None),
            outcome => return Err(outcome.into_error(response.sw())),
        }
        if response.data.len() < 2 {
            return Err(malformed("certificate size missing"));
        }
        let size = u16::from_be_bytes([response.data[0], response.data[1]]) as usize;
        if size == 0 {
            return Ok(None);
        }

        let mut cert = Vec::with_capacity(size);
        while cert.len() < size {
            let offset = cert.len() as u16;
            let len = (size - cert.len()).min(CERT_CHUNK_SIZE as usize) as u8;
            let mut data = offset.to_be_bytes().to_vec();
            data.push(len);
            let mut response =
                self.command(&APDU::with_data(CLA, ins::EXPORT_PKI_CERTIFICATE, step::UPDATE, 0x00, data))?;
            if response.is_empty() {
                return Err(malformed("certificate ended early"));
            }
            cert.extend_from_slice(&response.take_data());
        }
        cert.truncate(size);
        Ok(Some(cert))
    }
}
