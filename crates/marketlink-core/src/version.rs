//! Protocol version gate (C4).
//!
//! `ProtocolVersion` is the negotiated connection-wide version; it is set
//! once during the handshake and never changes afterward. Feature gates
//! are named constants compared against it, never raw numbers: handlers
//! must reference a feature by name, not by the version number itself.

use std::fmt;

/// Lowest protocol version this client will propose during negotiation.
pub const MIN_CLIENT_VERSION: i32 = 100;
/// Highest protocol version this client will propose during negotiation.
pub const MAX_CLIENT_VERSION: i32 = 187;

/// A negotiated (or proposed) protocol version. Ordered, immutable once
/// set on a Connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion(i32);

impl ProtocolVersion {
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    pub fn value(self) -> i32 {
        self.0
    }

    pub fn in_client_range(self) -> bool {
        (MIN_CLIENT_VERSION..=MAX_CLIENT_VERSION).contains(&self.0)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named feature gates, each the minimum protocol version at which that
/// server-side capability is known to exist. Values match the order and
/// numbering in which the gateway introduced them; the set is frozen at
/// build time rather than negotiated or extended at runtime.
pub mod features {
    use super::ProtocolVersion;

    pub const REQ_SMART_COMPONENTS: ProtocolVersion = ProtocolVersion(116);
    pub const MD_SIZE_MULTIPLIER: ProtocolVersion = ProtocolVersion(134);
    pub const AGG_GROUP: ProtocolVersion = ProtocolVersion(144);
    pub const UNDERLYING_INFO: ProtocolVersion = ProtocolVersion(145);
    pub const MARKET_RULES: ProtocolVersion = ProtocolVersion(150);
    pub const REAL_EXPIRATION_DATE: ProtocolVersion = ProtocolVersion(152);
    pub const MODELS_SUPPORT: ProtocolVersion = ProtocolVersion(155);
    pub const LAST_LIQUIDITY: ProtocolVersion = ProtocolVersion(158);
    pub const SYNT_REALTIME_BARS: ProtocolVersion = ProtocolVersion(142);
    pub const PEGGED_TO_BENCHMARK: ProtocolVersion = ProtocolVersion(133);
    pub const SOFT_DOLLAR_TIER: ProtocolVersion = ProtocolVersion(135);
    pub const CASH_QTY: ProtocolVersion = ProtocolVersion(149);
    pub const EXT_OPERATOR: ProtocolVersion = ProtocolVersion(151);
    pub const DECISION_MAKER: ProtocolVersion = ProtocolVersion(153);
    pub const MIFID_EXECUTION: ProtocolVersion = ProtocolVersion(154);
    pub const TICK_BY_TICK: ProtocolVersion = ProtocolVersion(137);
    pub const REQ_MATCHING_SYMBOLS: ProtocolVersion = ProtocolVersion(120);
}

/// Error raised when the negotiated version does not meet a feature's
/// minimum. Carries the feature description for the caller to report.
#[derive(Debug, thiserror::Error)]
#[error("server protocol version too old for {feature}: have {have}, need >= {required}")]
pub struct OutdatedServer {
    pub feature: String,
    pub have: ProtocolVersion,
    pub required: ProtocolVersion,
}

/// Fail with [`OutdatedServer`] unless `negotiated >= min_version`.
pub fn require_feature(
    negotiated: ProtocolVersion,
    min_version: ProtocolVersion,
    feature: &str,
) -> Result<(), OutdatedServer> {
    if negotiated < min_version {
        Err(OutdatedServer {
            feature: feature.to_string(),
            have: negotiated,
            required: min_version,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_numeric() {
        assert!(ProtocolVersion::new(100) < ProtocolVersion::new(187));
    }

    #[test]
    fn require_feature_passes_when_met() {
        let negotiated = ProtocolVersion::new(120);
        assert!(require_feature(negotiated, features::REQ_MATCHING_SYMBOLS, "symbol search").is_ok());
    }

    #[test]
    fn require_feature_fails_when_outdated() {
        let negotiated = ProtocolVersion::new(110);
        let err = require_feature(negotiated, features::REQ_SMART_COMPONENTS, "smart components")
            .unwrap_err();
        assert_eq!(err.have, negotiated);
        assert_eq!(err.required, features::REQ_SMART_COMPONENTS);
    }

    #[test]
    fn client_range_check() {
        assert!(ProtocolVersion::new(150).in_client_range());
        assert!(!ProtocolVersion::new(50).in_client_range());
    }
}
