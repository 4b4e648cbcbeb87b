//! Error types for wire-format parsing.

use thiserror::Error;

/// Errors produced while encoding or decoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame bytes were empty - there is no type tag to read.
    #[error("malformed frame: empty input")]
    MalformedFrame,

    /// Payload is shorter than a fixed-width field it must contain.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes actually present.
        actual: usize,
    },
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_alias_carries_protocol_errors() {
        fn reject() -> Result<()> {
            Err(ProtocolError::MalformedFrame)
        }
        assert_eq!(reject(), Err(ProtocolError::MalformedFrame));
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = ProtocolError::FrameTooShort { expected: 33, actual: 4 };
        assert_eq!(err.to_string(), "frame too short: expected at least 33 bytes, got 4");

        assert_eq!(ProtocolError::MalformedFrame.to_string(), "malformed frame: empty input");
    }
}
