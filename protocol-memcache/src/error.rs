//! Error types for Memcache protocol parsing.

/// Error type for Memcache parsing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing.
    /// This is not a fatal error - the caller should buffer more data and retry.
    #[error("incomplete data")]
    Incomplete,

    /// Invalid protocol format (static message).
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// Invalid number format.
    #[error("invalid number")]
    InvalidNumber,

    /// A response line that matches no known reply.
    #[error("unknown reply")]
    UnknownReply,

    /// A value length larger than any server would send.
    #[error("value length {0} exceeds limit")]
    ValueTooLarge(usize),

    /// Unknown opcode in binary protocol.
    #[cfg(feature = "binary")]
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// Invalid magic byte in binary protocol.
    #[cfg(feature = "binary")]
    #[error("invalid magic byte: {0:#04x}")]
    InvalidMagic(u8),

    /// Extras and key lengths do not fit in the advertised body.
    #[cfg(feature = "binary")]
    #[error("header lengths exceed body length")]
    BodyLength,
}

impl ParseError {
    /// Returns true if this error indicates more data is needed.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_incomplete() {
        assert!(ParseError::Incomplete.is_incomplete());
        assert!(!ParseError::Protocol("test").is_incomplete());
        assert!(!ParseError::InvalidNumber.is_incomplete());
        assert!(!ParseError::UnknownReply.is_incomplete());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", ParseError::Incomplete), "incomplete data");
        assert_eq!(
            format!("{}", ParseError::Protocol("bad format")),
            "protocol error: bad format"
        );
        assert_eq!(
            format!("{}", ParseError::ValueTooLarge(9)),
            "value length 9 exceeds limit"
        );
    }

    #[cfg(feature = "binary")]
    #[test]
    fn test_binary_errors() {
        assert_eq!(
            format!("{}", ParseError::UnknownOpcode(0x42)),
            "unknown opcode: 0x42"
        );
        assert_eq!(
            format!("{}", ParseError::InvalidMagic(0x80)),
            "invalid magic byte: 0x80"
        );
        assert!(!ParseError::BodyLength.is_incomplete());
    }
}
