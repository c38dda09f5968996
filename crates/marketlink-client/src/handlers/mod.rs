//! Feature handlers (C9): one module per request/reply or subscription
//! flow this client supports.
//!
//! Each module owns whatever per-flow bookkeeping its incoming messages
//! need (pending-row accumulation, request-id -> domain-object maps) and
//! exposes the public async entry points application code calls. The
//! `dispatch` module routes each incoming message kind to the matching
//! `handle_*` function here.

use std::sync::{Arc, Weak};

pub mod bars;
pub mod contract;
pub mod current_time;
pub mod depth;
pub mod executions;
pub mod market_data;
pub mod orders;
pub mod positions;
pub mod tick_by_tick;

use crate::connection::ConnectionInner;

/// Connection-wide aggregate of every feature handler's state. A flat
/// struct rather than nested mixins: each handler module is a plain
/// field, composed directly rather than through traits.
pub struct Handlers {
    pub contract: contract::ContractHandlerState,
    pub market_data: market_data::MarketDataHandlerState,
    pub depth: depth::DepthHandlerState,
    pub bars: bars::BarsHandlerState,
    pub tick_by_tick: tick_by_tick::TickByTickHandlerState,
    pub orders: orders::OrdersHandlerState,
    pub positions: positions::PositionsHandlerState,
    pub executions: executions::ExecutionsHandlerState,
    pub current_time: current_time::CurrentTimeHandlerState,
}

impl Handlers {
    /// `connection` is a weak back-reference so the positions subscription
    /// (the one handler state built before the owning `Arc<ConnectionInner>`
    /// exists -- see `Connection::connect`'s use of `Arc::new_cyclic`) can
    /// issue wire messages once it is upgraded.
    pub fn new(connection: Weak<ConnectionInner>) -> Self {
        Self {
            contract: contract::ContractHandlerState::new(),
            market_data: market_data::MarketDataHandlerState::new(),
            depth: depth::DepthHandlerState::new(),
            bars: bars::BarsHandlerState::new(),
            tick_by_tick: tick_by_tick::TickByTickHandlerState::new(),
            orders: orders::OrdersHandlerState::new(),
            positions: positions::PositionsHandlerState::new(connection),
            executions: executions::ExecutionsHandlerState::new(),
            current_time: current_time::CurrentTimeHandlerState::new(),
        }
    }
}

pub(crate) type ConnRef = Arc<ConnectionInner>;
