//! Wire-level and codec-level failure modes.
//!
//! These are the errors that can arise purely from looking at bytes —
//! before any request/response or subscription semantics get involved.
//! See `marketlink_client::error::ClientError` for the full taxonomy.

/// Errors raised while framing or decoding the wire protocol.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame length prefix claims {0} bytes, exceeding the configured maximum of {1}")]
    FrameTooLarge(u32, u32),

    #[error("field at index {0} is not valid UTF-8")]
    InvalidUtf8(usize),

    #[error("expected {expected} fields in frame, found {found}")]
    NotEnoughFields { expected: usize, found: usize },

    #[error("unsupported field type for this codec operation")]
    UnsupportedFieldType,

    #[error("unknown incoming message kind: {0}")]
    UnknownMessageKind(i32),

    #[error("malformed count prefix {0:?} for list/map field")]
    BadCount(String),

    #[error("malformed integer field {0:?}")]
    BadInteger(String),

    #[error("malformed floating point field {0:?}")]
    BadFloat(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
