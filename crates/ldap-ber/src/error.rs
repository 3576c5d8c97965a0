//! BER error types

use thiserror::Error;

/// BER encoding/decoding errors
///
/// Every variant carries the absolute byte offset (from the start of the
/// buffer handed to the outermost reader) where the problem was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BerError {
    /// Wrong tag at the given position
    #[error("unexpected tag at offset {offset}: expected 0x{expected:02x}, found 0x{found:02x}")]
    UnexpectedTag { offset: usize, expected: u8, found: u8 },

    /// Not enough data to read the announced element
    #[error("truncated element at offset {offset}: needed {needed} bytes, have {have}")]
    Truncated { offset: usize, needed: usize, have: usize },

    /// Length octets are malformed (indefinite form, too wide, or non-minimal)
    #[error("invalid length encoding at offset {offset}")]
    InvalidLength { offset: usize },

    /// Integer does not fit the target type
    #[error("integer overflow at offset {offset}")]
    IntegerOverflow { offset: usize },

    /// Octet string is not valid UTF-8
    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// Bytes left over after a complete structure
    #[error("{count} trailing bytes at offset {offset}")]
    TrailingBytes { offset: usize, count: usize },

    /// Structurally valid TLV carrying a value the schema does not allow
    #[error("invalid value at offset {offset}: {reason}")]
    InvalidValue { offset: usize, reason: String },
}

impl BerError {
    /// Byte offset where decoding failed
    pub fn offset(&self) -> usize {
        match self {
            Self::UnexpectedTag { offset, .. }
            | Self::Truncated { offset, .. }
            | Self::InvalidLength { offset }
            | Self::IntegerOverflow { offset }
            | Self::InvalidUtf8 { offset }
            | Self::TrailingBytes { offset, .. }
            | Self::InvalidValue { offset, .. } => *offset,
        }
    }
}

/// Result type for BER operations
pub type Result<T> = std::result::Result<T, BerError>;
