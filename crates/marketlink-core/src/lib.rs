//! Protocol-level primitives for the marketlink wire format: framing,
//! field codec, message catalog, and version gating. No networking and
//! no connection/dispatch semantics live here — see `marketlink-client`
//! for the Connection that drives this engine.

pub mod catalog;
pub mod codec;
pub mod error;
pub mod version;
pub mod wire;

pub use catalog::{Incoming, Outgoing};
pub use codec::{FieldCursor, Gates, OrderedMap, OutgoingFields, DOUBLE_UNSET, INT32_UNSET};
pub use error::{ProtocolError, ProtocolResult};
pub use version::ProtocolVersion;
