//! PC/SC transport for physical readers
//!
//! APDUs travel in the clear. Current Satochip and Seedkeeper firmware
//! requires a secure channel, which this crate does not implement, so such
//! cards are refused at connect with `NotSuitable::SecureChannelRequired`.
//! Only cards that answer SELECT/GET_STATUS without demanding one work here.

use std::ffi::CString;

use log::{debug, info};
use pcsc::{Card, Context, Disposition, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};

use super::{CardTransport, TransportError};
use crate::apdu::Response;

impl From<pcsc::Error> for TransportError {
    fn from(e: pcsc::Error) -> Self {
        match e {
            pcsc::Error::NoReadersAvailable | pcsc::Error::UnknownReader => TransportError::NoReader,
            pcsc::Error::NoSmartcard => TransportError::NoCard,
            pcsc::Error::RemovedCard => TransportError::CardRemoved,
            pcsc::Error::Timeout => TransportError::Timeout,
            other => TransportError::Io(other.to_string()),
        }
    }
}

/// First reader holding a card, or the reader whose name contains `filter`
pub struct PcscTransport {
    filter: Option<String>,
    card: Option<Card>,
}

impl PcscTransport {
    pub fn new(filter: Option<String>) -> Self {
        Self { filter, card: None }
    }

    fn pick_reader(&self, context: &Context) -> Result<CString, TransportError> {
        let len = context.list_readers_len()?;
        let mut buffer = vec![0u8; len];
        for reader in context.list_readers(&mut buffer)? {
            let name = reader.to_string_lossy();
            if self.filter.as_deref().map_or(true, |f| name.contains(f)) {
                return Ok(reader.to_owned());
            }
        }
        Err(TransportError::NoReader)
    }
}

impl CardTransport for PcscTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        let context = Context::establish(Scope::User)?;
        let reader = self.pick_reader(&context)?;
        info!("Connecting to reader {}", reader.to_string_lossy());
        let card = context.connect(&reader, ShareMode::Shared, Protocols::ANY)?;
        self.card = Some(card);
        Ok(())
    }

    fn is_card_present(&mut self) -> bool {
        match &self.card {
            Some(card) => card.status2_owned().is_ok(),
            None => false,
        }
    }

    fn transmit(&mut self, command: &[u8]) -> Result<Response, TransportError> {
        let card = self.card.as_ref().ok_or(TransportError::NotConnected)?;
        let mut buffer = [0u8; MAX_BUFFER_SIZE];
        let raw = card.transmit(command, &mut buffer)?;
        let response = Response::from_bytes(raw)
            .ok_or_else(|| TransportError::Io(format!("short response of {} bytes", raw.len())));
        zeroize::Zeroize::zeroize(&mut buffer[..]);
        response
    }

    fn disconnect(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, e)) = card.disconnect(Disposition::ResetCard) {
                debug!("Reader disconnect failed: {}", e);
            }
        }
    }
}
