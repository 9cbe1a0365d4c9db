//! Status words
//!
//! ISO 7816-4 status words plus the 9Cxx range used by the Satochip and
//! Seedkeeper applets.

pub struct SW;

impl SW {
    pub const SUCCESS: u16 = 0x9000;

    // ISO checking errors
    pub const WRONG_LENGTH: u16 = 0x6700;
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
    pub const FILE_NOT_FOUND: u16 = 0x6A82;
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;

    // Applet errors (9Cxx)
    pub const NO_MEMORY_LEFT: u16 = 0x9C01;
    pub const OPERATION_NOT_ALLOWED: u16 = 0x9C03;
    pub const SETUP_NOT_DONE: u16 = 0x9C04;
    pub const UNSUPPORTED_FEATURE: u16 = 0x9C05;
    pub const UNAUTHORIZED: u16 = 0x9C06;
    pub const OBJECT_NOT_FOUND: u16 = 0x9C08;
    pub const IDENTITY_BLOCKED: u16 = 0x9C0C;
    pub const INVALID_PARAMETER: u16 = 0x9C0F;
    pub const INCORRECT_P1: u16 = 0x9C10;
    pub const INCORRECT_P2: u16 = 0x9C11;
    pub const SEQUENCE_END: u16 = 0x9C12;

    /// Wrong PIN, `tries` attempts left (63Cx)
    #[inline]
    pub fn wrong_pin(tries: u8) -> u16 {
        0x63C0 | (tries.min(0x0F) as u16)
    }

    #[inline]
    pub fn is_success(sw: u16) -> bool {
        sw == Self::SUCCESS
    }

    /// Attempts left if `sw` is a wrong-PIN status
    #[inline]
    pub fn pin_tries(sw: u16) -> Option<u8> {
        (sw & 0xFFF0 == 0x63C0).then_some((sw & 0x0F) as u8)
    }
}
