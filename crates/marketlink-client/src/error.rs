//! The client's full error taxonomy. Wraps `marketlink_core::ProtocolError`
//! for wire/codec-level failures and adds the connection/session-level
//! categories a feature handler can raise.

use marketlink_core::ProtocolError;

/// Informational or harmless API error codes: farm connect/disconnect
/// notices and similar. Logged at info rather than surfaced as a
/// failure.
pub const INFORMATIONAL_CODES: &[i32] = &[10167, 2100, 2101, 2102, 2103, 2104, 2105, 2106, 2107, 2108, 2109, 2110, 2137];

pub fn is_informational(code: i32) -> bool {
    INFORMATIONAL_CODES.contains(&code)
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,

    #[error("server protocol version too old and must be upgraded{}", .feature.as_ref().map(|f| format!(" to support {f}")).unwrap_or_default())]
    OutdatedServer { feature: Option<String> },

    #[error("unsupported: {0}")]
    UnsupportedFeature(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("api error {code}: {message}")]
    Api { code: i32, message: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] std::io::Error),

    #[error("not subscribed")]
    NotSubscribed,

    #[error("request canceled")]
    Canceled,
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn informational_codes_cover_farm_notices() {
        assert!(is_informational(2104));
        assert!(is_informational(10167));
        assert!(!is_informational(200));
    }
}
