//! Instrument domain object (part of C8/C9).
//!
//! Field set and names are carried over from the source's `Instrument`
//! class. Fields are behind a `Mutex` because the same `Arc<Instrument>`
//! is shared between the dispatcher (which populates it from
//! `CONTRACT_DATA`) and application code holding a handle returned from
//! a prior request.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Mutex, Weak};

use marketlink_core::codec::OrderedMap;

use crate::connection::ConnectionInner;
use crate::handlers::bars::Bar;
use crate::handlers::depth::{self, DepthLevel, DepthUpdate, Operation, Side};
use crate::handlers::tick_by_tick::{self, BidAskTick, LastTick, MidpointTick, TickByTickKind};
use crate::subscription::EventInstance;
use crate::tick_types::{MarketDataTimeliness, TickAttribute, TickType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityType {
    Unspecified,
    Stock,
    Future,
    Index,
    Unknown(String),
}

impl Default for SecurityType {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl SecurityType {
    pub fn from_text(text: &str) -> Self {
        match text {
            "" => Self::Unspecified,
            "STK" => Self::Stock,
            "FUT" => Self::Future,
            "IND" => Self::Index,
            // The wire carries a raw string for security types this client
            // doesn't otherwise model (OPT, CASH, FOP, WAR, BOND, ...);
            // keep it owned rather than leaking, per Open Question (b).
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Unspecified => "",
            Self::Stock => "STK",
            Self::Future => "FUT",
            Self::Index => "IND",
            Self::Unknown(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityIdentifierType {
    Unspecified,
    Cusip,
    Sedol,
    Isin,
    Ric,
    Unknown(String),
}

impl Default for SecurityIdentifierType {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl SecurityIdentifierType {
    pub fn from_text(text: &str) -> Self {
        match text {
            "" => Self::Unspecified,
            "CUSIP" => Self::Cusip,
            "SEDOL" => Self::Sedol,
            "ISIN" => Self::Isin,
            "RIC" => Self::Ric,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Unspecified => "",
            Self::Cusip => "CUSIP",
            Self::Sedol => "SEDOL",
            Self::Isin => "ISIN",
            Self::Ric => "RIC",
            Self::Unknown(raw) => raw,
        }
    }
}

/// Mutable `CONTRACT_DATA` field set. Kept as one struct behind a lock
/// rather than per-field atomics: contract data arrives as a single
/// burst and is read back the same way, so there's no benefit to
/// finer-grained locking.
#[derive(Debug, Default, Clone)]
pub struct InstrumentFields {
    pub symbol: String,
    pub security_type: Option<SecurityType>,
    pub last_trade_date: String,
    pub strike: Option<f64>,
    pub right: String,
    pub exchange: String,
    pub currency: String,
    pub local_symbol: String,
    pub market_name: String,
    pub trading_class: String,
    pub minimum_tick: Option<f64>,
    pub market_data_size_multiplier: String,
    pub multiplier: String,
    pub order_types: Vec<String>,
    pub valid_exchanges: Vec<String>,
    pub price_magnifier: Option<i32>,
    pub underlying_contract_id: Option<i32>,
    pub long_name: String,
    pub primary_exchange: String,
    pub contract_month: String,
    pub industry: String,
    pub category: String,
    pub subcategory: String,
    pub time_zone: String,
    pub trading_hours: String,
    pub liquid_hours: String,
    pub ev_rule: String,
    pub ev_multiplier: String,
    pub security_ids: OrderedMap<SecurityIdentifierType, String>,
    pub aggregated_group: String,
    pub underlying_symbol: String,
    pub underlying_security_type: Option<SecurityType>,
    pub market_rule_ids: String,
    pub real_expiration_date: String,
    pub market_data_timeliness: Option<MarketDataTimeliness>,
    pub bbo_exchange: String,
    pub snapshot_permissions: Option<i32>,
}

/// A tick delivered for a subscribed instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickUpdate {
    pub tick_type: TickType,
    pub value: f64,
}

/// A text-valued tick (`TICK_GENERIC`/`TICK_STRING` carry some tick types as
/// text rather than a number -- e.g. the RTVolume composite string).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickTextUpdate {
    pub tick_type: TickType,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct PriceTick {
    pub tick_type: TickType,
    pub price: f64,
    pub size: Option<f64>,
    pub attributes: Vec<TickAttribute>,
}

const NO_REQUEST_ID: i32 = -1;
const DEFAULT_DEPTH_ROWS: i32 = 5;

/// A tradable instrument, canonicalized by contract id within a
/// Connection's [`crate::registry::InstrumentRegistry`].
pub struct Instrument {
    contract_id: AtomicI32,
    fields: Mutex<InstrumentFields>,
    market_data_subscribed: AtomicBool,
    market_data_request_id: AtomicI32,
    depth_request_id: AtomicI32,
    market_depth_rows: AtomicI32,
    tbt_last_request_id: AtomicI32,
    tbt_all_request_id: AtomicI32,
    tbt_bidask_request_id: AtomicI32,
    tbt_midpoint_request_id: AtomicI32,
    realtime_bars_request_id: AtomicI32,
    market_depth_bids: Mutex<Vec<DepthLevel>>,
    market_depth_asks: Mutex<Vec<DepthLevel>>,
    pub ticks: EventInstance<TickUpdate>,
    pub ticks_text: EventInstance<TickTextUpdate>,
    pub executions: EventInstance<crate::handlers::executions::Execution>,
    pub on_market_depth: EventInstance<DepthUpdate>,
    pub on_tick_by_tick_last: EventInstance<LastTick>,
    pub on_tick_by_tick_all: EventInstance<LastTick>,
    pub on_tick_by_tick_bidask: EventInstance<BidAskTick>,
    pub on_tick_by_tick_midpoint: EventInstance<MidpointTick>,
    pub on_realtime_bar: EventInstance<Bar>,
}

impl Instrument {
    /// Constructed via `Arc::new_cyclic` from
    /// [`crate::registry::InstrumentRegistry::get_or_create`]: `self_ref`
    /// is the not-yet-upgradeable handle to the `Arc` under
    /// construction, needed so the event-driven subscriptions
    /// (market depth, tick-by-tick) can resubscribe themselves without
    /// the instrument holding a strong reference to itself.
    pub fn new(contract_id: i32, connection: Weak<ConnectionInner>, self_ref: Weak<Instrument>) -> Self {
        Self {
            contract_id: AtomicI32::new(contract_id),
            fields: Mutex::new(InstrumentFields::default()),
            market_data_subscribed: AtomicBool::new(false),
            market_data_request_id: AtomicI32::new(NO_REQUEST_ID),
            depth_request_id: AtomicI32::new(NO_REQUEST_ID),
            market_depth_rows: AtomicI32::new(DEFAULT_DEPTH_ROWS),
            tbt_last_request_id: AtomicI32::new(NO_REQUEST_ID),
            tbt_all_request_id: AtomicI32::new(NO_REQUEST_ID),
            tbt_bidask_request_id: AtomicI32::new(NO_REQUEST_ID),
            tbt_midpoint_request_id: AtomicI32::new(NO_REQUEST_ID),
            realtime_bars_request_id: AtomicI32::new(NO_REQUEST_ID),
            market_depth_bids: Mutex::new(Vec::new()),
            market_depth_asks: Mutex::new(Vec::new()),
            ticks: EventInstance::new(None, None),
            ticks_text: EventInstance::new(None, None),
            executions: EventInstance::new(None, None),
            on_market_depth: EventInstance::new(
                Some(depth::on_subscribe(connection.clone(), self_ref.clone())),
                Some(depth::on_unsubscribe(connection.clone(), self_ref.clone())),
            ),
            on_tick_by_tick_last: EventInstance::new(
                Some(tick_by_tick::on_subscribe(connection.clone(), self_ref.clone(), TickByTickKind::Last)),
                Some(tick_by_tick::on_unsubscribe(connection.clone(), self_ref.clone(), TickByTickKind::Last)),
            ),
            on_tick_by_tick_all: EventInstance::new(
                Some(tick_by_tick::on_subscribe(connection.clone(), self_ref.clone(), TickByTickKind::All)),
                Some(tick_by_tick::on_unsubscribe(connection.clone(), self_ref.clone(), TickByTickKind::All)),
            ),
            on_tick_by_tick_bidask: EventInstance::new(
                Some(tick_by_tick::on_subscribe(connection.clone(), self_ref.clone(), TickByTickKind::BidAsk)),
                Some(tick_by_tick::on_unsubscribe(connection.clone(), self_ref.clone(), TickByTickKind::BidAsk)),
            ),
            on_tick_by_tick_midpoint: EventInstance::new(
                Some(tick_by_tick::on_subscribe(connection.clone(), self_ref.clone(), TickByTickKind::Midpoint)),
                Some(tick_by_tick::on_unsubscribe(connection.clone(), self_ref.clone(), TickByTickKind::Midpoint)),
            ),
            on_realtime_bar: EventInstance::new(None, None),
        }
    }

    pub fn contract_id(&self) -> i32 {
        self.contract_id.load(Ordering::SeqCst)
    }

    pub(crate) fn set_contract_id(&self, contract_id: i32) {
        self.contract_id.store(contract_id, Ordering::SeqCst);
    }

    pub fn fields(&self) -> InstrumentFields {
        self.fields.lock().unwrap().clone()
    }

    pub fn with_fields_mut<R>(&self, f: impl FnOnce(&mut InstrumentFields) -> R) -> R {
        f(&mut self.fields.lock().unwrap())
    }

    /// True if a live market data subscription has already claimed this
    /// instrument. A second subscribe attempt is an invariant violation
    /// (spec: "double market-data subscribe").
    pub fn is_market_data_subscribed(&self) -> bool {
        self.market_data_subscribed.load(Ordering::SeqCst)
    }

    pub fn mark_market_data_subscribed(&self, request_id: i32) {
        self.market_data_subscribed.store(true, Ordering::SeqCst);
        self.market_data_request_id.store(request_id, Ordering::SeqCst);
    }

    pub fn clear_market_data_subscription(&self) {
        self.market_data_subscribed.store(false, Ordering::SeqCst);
        self.market_data_request_id.store(NO_REQUEST_ID, Ordering::SeqCst);
    }

    pub fn market_data_request_id(&self) -> Option<i32> {
        match self.market_data_request_id.load(Ordering::SeqCst) {
            NO_REQUEST_ID => None,
            id => Some(id),
        }
    }

    pub fn depth_request_id(&self) -> Option<i32> {
        match self.depth_request_id.load(Ordering::SeqCst) {
            NO_REQUEST_ID => None,
            id => Some(id),
        }
    }

    pub(crate) fn set_depth_request_id(&self, request_id: i32) {
        self.depth_request_id.store(request_id, Ordering::SeqCst);
    }

    pub(crate) fn clear_depth_request_id(&self) {
        self.depth_request_id.store(NO_REQUEST_ID, Ordering::SeqCst);
    }

    pub fn market_depth_rows(&self) -> i32 {
        self.market_depth_rows.load(Ordering::SeqCst)
    }

    pub(crate) fn set_market_depth_rows(&self, rows: i32) {
        self.market_depth_rows.store(rows, Ordering::SeqCst);
    }

    /// Bid side of the book this client maintains from `MARKET_DEPTH`/
    /// `MARKET_DEPTH_L2` updates, ordered by position (spec.md: "Lists
    /// are ordered by position").
    pub fn market_depth_bids(&self) -> Vec<DepthLevel> {
        self.market_depth_bids.lock().unwrap().clone()
    }

    /// Ask side of the maintained book; see [`Instrument::market_depth_bids`].
    pub fn market_depth_asks(&self) -> Vec<DepthLevel> {
        self.market_depth_asks.lock().unwrap().clone()
    }

    /// Apply one row update to the maintained bid/ask book before it is
    /// emitted to subscribers: `0=insert`/`1=update`/`2=delete` at
    /// `position` in the side `0=ask`/`1=bid` list. An out-of-range
    /// position (a gap in the sequence) is dropped rather than panicking.
    pub(crate) fn apply_depth_update(&self, update: &DepthUpdate) {
        let book = match update.side {
            Side::Ask => &self.market_depth_asks,
            Side::Bid => &self.market_depth_bids,
            Side::Unknown(_) => return,
        };
        let position = match usize::try_from(update.position) {
            Ok(position) => position,
            Err(_) => return,
        };
        let level = DepthLevel {
            price: update.price,
            size: update.size,
            market_maker: update.market_maker.clone(),
        };
        let mut book = book.lock().unwrap();
        match update.operation {
            Operation::Insert => {
                if position <= book.len() {
                    book.insert(position, level);
                }
            }
            Operation::Update => {
                if let Some(slot) = book.get_mut(position) {
                    *slot = level;
                }
            }
            Operation::Delete => {
                if position < book.len() {
                    book.remove(position);
                }
            }
            Operation::Unknown(_) => {}
        }
    }

    fn tick_by_tick_slot(&self, kind: TickByTickKind) -> &AtomicI32 {
        match kind {
            TickByTickKind::Last => &self.tbt_last_request_id,
            TickByTickKind::All => &self.tbt_all_request_id,
            TickByTickKind::BidAsk => &self.tbt_bidask_request_id,
            TickByTickKind::Midpoint => &self.tbt_midpoint_request_id,
        }
    }

    pub fn tick_by_tick_request_id(&self, kind: TickByTickKind) -> Option<i32> {
        match self.tick_by_tick_slot(kind).load(Ordering::SeqCst) {
            NO_REQUEST_ID => None,
            id => Some(id),
        }
    }

    pub(crate) fn set_tick_by_tick_request_id(&self, kind: TickByTickKind, request_id: i32) {
        self.tick_by_tick_slot(kind).store(request_id, Ordering::SeqCst);
    }

    pub(crate) fn clear_tick_by_tick_request_id(&self, kind: TickByTickKind) {
        self.tick_by_tick_slot(kind).store(NO_REQUEST_ID, Ordering::SeqCst);
    }

    pub fn realtime_bars_request_id(&self) -> Option<i32> {
        match self.realtime_bars_request_id.load(Ordering::SeqCst) {
            NO_REQUEST_ID => None,
            id => Some(id),
        }
    }

    pub(crate) fn set_realtime_bars_request_id(&self, request_id: i32) {
        self.realtime_bars_request_id.store(request_id, Ordering::SeqCst);
    }

    pub(crate) fn clear_realtime_bars_request_id(&self) {
        self.realtime_bars_request_id.store(NO_REQUEST_ID, Ordering::SeqCst);
    }

    /// Dispatch a decoded tick to subscribers, expanding an accompanying
    /// size value into the paired size tick type per the Bid->BidSize /
    /// Ask->AskSize / Last->LastSize table.
    pub fn deliver_tick(&self, tick: PriceTick) {
        self.ticks.emit(&TickUpdate {
            tick_type: tick.tick_type,
            value: tick.price,
        });
        if let (Some(size), Some(size_tick)) = (tick.size, tick.tick_type.paired_size_tick()) {
            self.ticks.emit(&TickUpdate {
                tick_type: size_tick,
                value: size,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_instrument(contract_id: i32) -> Instrument {
        Instrument::new(contract_id, Weak::new(), Weak::new())
    }

    #[test]
    fn security_type_round_trips_known_variants() {
        assert_eq!(SecurityType::from_text("STK"), SecurityType::Stock);
        assert_eq!(SecurityType::Stock.as_wire(), "STK");
    }

    #[test]
    fn unknown_security_type_preserves_raw_text() {
        let unknown = SecurityType::from_text("BAG");
        assert_eq!(unknown.as_wire(), "BAG");
    }

    #[test]
    fn market_data_subscription_flag_tracks_request_id() {
        let instrument = test_instrument(42);
        assert!(!instrument.is_market_data_subscribed());
        instrument.mark_market_data_subscribed(1000);
        assert!(instrument.is_market_data_subscribed());
        assert_eq!(instrument.market_data_request_id(), Some(1000));
        instrument.clear_market_data_subscription();
        assert!(!instrument.is_market_data_subscribed());
        assert_eq!(instrument.market_data_request_id(), None);
    }

    #[test]
    fn depth_request_id_round_trips() {
        let instrument = test_instrument(7);
        assert_eq!(instrument.depth_request_id(), None);
        instrument.set_depth_request_id(2001);
        assert_eq!(instrument.depth_request_id(), Some(2001));
        instrument.clear_depth_request_id();
        assert_eq!(instrument.depth_request_id(), None);
    }

    #[test]
    fn tick_by_tick_request_ids_are_tracked_per_kind() {
        let instrument = test_instrument(7);
        instrument.set_tick_by_tick_request_id(TickByTickKind::Last, 10);
        instrument.set_tick_by_tick_request_id(TickByTickKind::BidAsk, 20);
        assert_eq!(instrument.tick_by_tick_request_id(TickByTickKind::Last), Some(10));
        assert_eq!(instrument.tick_by_tick_request_id(TickByTickKind::BidAsk), Some(20));
        assert_eq!(instrument.tick_by_tick_request_id(TickByTickKind::All), None);
        instrument.clear_tick_by_tick_request_id(TickByTickKind::Last);
        assert_eq!(instrument.tick_by_tick_request_id(TickByTickKind::Last), None);
    }

    #[tokio::test]
    async fn deliver_tick_expands_paired_size() {
        use tokio_stream::StreamExt;

        let instrument = test_instrument(1);
        let mut stream = instrument.ticks.subscribe_stream();

        instrument.deliver_tick(PriceTick {
            tick_type: TickType::Bid,
            price: 100.5,
            size: Some(12.0),
            attributes: vec![],
        });

        let price_update = stream.next().await.unwrap();
        assert_eq!(price_update.tick_type, TickType::Bid);
        assert_eq!(price_update.value, 100.5);

        let size_update = stream.next().await.unwrap();
        assert_eq!(size_update.tick_type, TickType::BidSize);
        assert_eq!(size_update.value, 12.0);
    }
}
