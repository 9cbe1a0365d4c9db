//! Thread-safe transport handle
//!
//! Clones share one underlying transport; the lock is held for the whole
//! command/response exchange so at most one command is in flight.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{CardTransport, TransportError};
use crate::apdu::Response;

pub struct SharedTransport<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for SharedTransport<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: CardTransport> SharedTransport<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transport)),
        }
    }

    /// Run `f` with exclusive access to the transport
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}

impl<T: CardTransport> CardTransport for SharedTransport<T> {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.inner.lock().connect()
    }

    fn is_card_present(&mut self) -> bool {
        self.inner.lock().is_card_present()
    }

    fn transmit(&mut self, command: &[u8]) -> Result<Response, TransportError> {
        self.inner.lock().transmit(command)
    }

    fn disconnect(&mut self) {
        self.inner.lock().disconnect()
    }
}
