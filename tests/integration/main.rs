//! End-to-end scenarios driven against an in-process mock gateway
//! (see `mock.rs`): a real `Connection` over a real loopback socket,
//! talking to a hand-rolled server that speaks just enough of the wire
//! protocol to exercise each flow.

mod mock;

mod contract_lookup;
mod current_time;
mod historical_data_cancel;
mod market_depth;
mod order_error;
mod symbol_search;
