//! BER identifier octets
//!
//! LDAP only uses low-tag-number form (tag numbers below 31), so every
//! identifier fits in a single octet:
//!
//! ```text
//!  8 7 | 6 | 5 4 3 2 1
//! class| P/C| tag number
//! ```

/// Universal BOOLEAN
pub const BOOLEAN: u8 = 0x01;
/// Universal INTEGER
pub const INTEGER: u8 = 0x02;
/// Universal OCTET STRING
pub const OCTET_STRING: u8 = 0x04;
/// Universal NULL
pub const NULL: u8 = 0x05;
/// Universal ENUMERATED
pub const ENUMERATED: u8 = 0x0a;
/// Universal SEQUENCE / SEQUENCE OF (constructed)
pub const SEQUENCE: u8 = 0x30;
/// Universal SET / SET OF (constructed)
pub const SET: u8 = 0x31;

const CLASS_APPLICATION: u8 = 0x40;
const CLASS_CONTEXT: u8 = 0x80;
const CONSTRUCTED: u8 = 0x20;

/// `[APPLICATION n]` primitive
pub const fn application(number: u8) -> u8 {
    CLASS_APPLICATION | (number & 0x1f)
}

/// `[APPLICATION n]` constructed
pub const fn application_constructed(number: u8) -> u8 {
    CLASS_APPLICATION | CONSTRUCTED | (number & 0x1f)
}

/// `[n]` context-specific primitive
pub const fn context(number: u8) -> u8 {
    CLASS_CONTEXT | (number & 0x1f)
}

/// `[n]` context-specific constructed
pub const fn context_constructed(number: u8) -> u8 {
    CLASS_CONTEXT | CONSTRUCTED | (number & 0x1f)
}

/// Returns true if the identifier has the constructed bit set
pub const fn is_constructed(tag: u8) -> bool {
    tag & CONSTRUCTED != 0
}
