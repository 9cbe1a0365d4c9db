//! Response APDUs
//!
//! The host builds these from raw reader bytes; the virtual card builds them
//! directly from a status word and optional body.

use std::fmt;

use zeroize::{Zeroize, Zeroizing};

use super::status::SW;

/// Body plus trailing status word of a card reply
///
/// The body is wiped on drop; [`Response::take_data`] moves it into a
/// [`Zeroizing`] buffer that is wiped in turn.
#[derive(Clone, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
    status: u16,
}

impl Response {
    pub fn new(data: Vec<u8>, sw: u16) -> Self {
        Self { data, status: sw }
    }

    /// 9000 with a body
    pub fn success(data: Vec<u8>) -> Self {
        Self::new(data, SW::SUCCESS)
    }

    /// Bare 9000
    pub fn ok() -> Self {
        Self::success(Vec::new())
    }

    /// Status word only, no body
    pub fn error(sw: u16) -> Self {
        Self::new(Vec::new(), sw)
    }

    /// Split what a reader returned into body and SW1 SW2
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.len() < 2 {
            return None;
        }
        let (body, sw) = raw.split_at(raw.len() - 2);
        Some(Self::new(body.to_vec(), u16::from_be_bytes([sw[0], sw[1]])))
    }

    pub fn sw(&self) -> u16 {
        self.status
    }

    pub fn is_okay(&self) -> bool {
        SW::is_success(self.status)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn take_data(&mut self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(std::mem::take(&mut self.data))
    }

    /// Wire form: body followed by SW1 SW2
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 2);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.status.to_be_bytes());
        out
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

// Bodies may hold secrets, so only the length is shown.
impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Response({} bytes, {:04X})", self.data.len(), self.status)
    }
}

impl From<u16> for Response {
    fn from(sw: u16) -> Self {
        Self::error(sw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_form() {
        let resp = Response::success(vec![0x00, 0x07]);
        assert!(resp.is_okay());
        assert_eq!(resp.to_bytes(), vec![0x00, 0x07, 0x90, 0x00]);
        assert_eq!(Response::error(SW::UNAUTHORIZED).to_bytes(), vec![0x9C, 0x06]);
    }

    #[test]
    fn test_reader_bytes() {
        let resp = Response::from_bytes(&[0x01, 0x02, 0x63, 0xC2]).unwrap();
        assert_eq!(resp.data, vec![0x01, 0x02]);
        assert_eq!(resp.sw(), 0x63C2);
        assert!(!resp.is_okay());

        let bare = Response::from_bytes(&[0x9C, 0x12]).unwrap();
        assert!(bare.is_empty());
        assert_eq!(bare.sw(), SW::SEQUENCE_END);

        assert!(Response::from_bytes(&[0x90]).is_none());
        assert!(Response::from_bytes(&[]).is_none());
    }

    #[test]
    fn test_debug_hides_body() {
        let resp = Response::success(b"hunter2".to_vec());
        assert_eq!(format!("{:?}", resp), "Response(7 bytes, 9000)");
    }

    #[test]
    fn test_take_data() {
        let mut resp = Response::success(vec![1, 2, 3]);
        let body: Zeroizing<Vec<u8>> = resp.take_data();
        assert_eq!(*body, vec![1, 2, 3]);
        assert!(resp.is_empty());
        let from_sw: Response = SW::OBJECT_NOT_FOUND.into();
        assert_eq!(from_sw.sw(), 0x9C08);
    }
}
