//! marketlink-client: the `Connection`, request/response multiplexer,
//! subscription manager, instrument registry, and feature handlers
//! (C5-C9) built on top of `marketlink-core`'s framing/codec/version
//! engine (C1-C4).

pub mod connection;
mod dispatch;
pub mod error;
pub mod handlers;
pub mod instrument;
pub mod registry;
pub mod requests;
pub mod subscription;
pub mod tick_types;

pub use connection::{Connection, ConnectOptions};
pub use error::{ClientError, ClientResult};
pub use instrument::Instrument;
