//! Error types for capture loading
//!
//! Only reading a capture can fail. Everything downstream of a valid
//! [`Signal`](crate::trace::Signal) always produces a value, so these are the
//! only error types the library exposes.

use thiserror::Error;

/// Malformed capture text. Fatal to that analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing Frequency line")]
    MissingFrequency,

    #[error("line {line}: invalid frequency value {value:?}")]
    InvalidFrequency { line: usize, value: String },

    #[error("line {line}: expected `Key: value`, found {text:?}")]
    MalformedMetadata { line: usize, text: String },

    #[error("line {line}: metadata key {key:?} after RAW_Data")]
    MetadataAfterRawData { line: usize, key: String },

    #[error("missing RAW_Data line")]
    MissingRawData,

    #[error("line {line}: non-numeric pulse token {token:?}")]
    InvalidPulse { line: usize, token: String },

    #[error("line {line}: pulse {token:?} does not fit in 32 bits")]
    PulseOutOfRange { line: usize, token: String },

    #[error("line {line}: zero-length pulse")]
    ZeroDuration { line: usize },

    #[error("pulse {index}: zero-length pulse")]
    ZeroPulse { index: usize },

    #[error("empty pulse list")]
    EmptyPulses,
}

/// Failure while loading a capture from a file or stream.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let e = ParseError::InvalidPulse {
            line: 6,
            token: "12a".into(),
        };
        assert_eq!(e.to_string(), "line 6: non-numeric pulse token \"12a\"");
        assert_eq!(ParseError::MissingFrequency.to_string(), "missing Frequency line");
        assert_eq!(
            ParseError::ZeroPulse { index: 3 }.to_string(),
            "pulse 3: zero-length pulse"
        );
    }

    #[test]
    fn test_error_from_parse() {
        let e: Error = ParseError::EmptyPulses.into();
        assert!(matches!(e, Error::Parse(ParseError::EmptyPulses)));
        assert_eq!(e.to_string(), "parse error: empty pulse list");
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
    }
}
