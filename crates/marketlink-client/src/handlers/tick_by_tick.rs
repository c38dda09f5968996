//! Tick-by-tick data: `REQ_TICK_BY_TICK_DATA`/`TICK_BY_TICK`.
//!
//! Each of the four tick kinds (last trade, all-last, bid/ask,
//! midpoint) is its own event-driven subscription on the instrument,
//! with its own request id -- subscribing to `Last` and `BidAsk` on the
//! same instrument runs two independent wire subscriptions.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use marketlink_core::catalog::Outgoing;
use marketlink_core::codec::FieldCursor;
use marketlink_core::ProtocolError;

use crate::connection::ConnectionInner;
use crate::error::{ClientError, ClientResult};
use crate::instrument::Instrument;
use crate::requests::RequestId;
use crate::subscription::Handler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickByTickKind {
    Last,
    All,
    BidAsk,
    Midpoint,
}

impl TickByTickKind {
    fn as_wire(self) -> &'static str {
        match self {
            TickByTickKind::Last => "Last",
            TickByTickKind::All => "AllLast",
            TickByTickKind::BidAsk => "BidAsk",
            TickByTickKind::Midpoint => "MidPoint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastTick {
    pub time: i64,
    pub price: f64,
    pub size: f64,
    pub past_limit: bool,
    pub unreported: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LastTickDetail {
    pub exchange: String,
    pub special_conditions: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BidAskTick {
    pub time: i64,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub bid_past_low: bool,
    pub ask_past_high: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidpointTick {
    pub time: i64,
    pub mid_point: f64,
}

pub struct TickByTickHandlerState {
    by_request_id: DashMap<RequestId, (Arc<Instrument>, TickByTickKind)>,
}

impl TickByTickHandlerState {
    pub fn new() -> Self {
        Self {
            by_request_id: DashMap::new(),
        }
    }
}

fn parse_timestamp(text: &str) -> ClientResult<i64> {
    text.parse::<i64>()
        .map_err(|_| ClientError::Protocol(ProtocolError::BadInteger(text.to_string())))
}

async fn send_subscribe(conn: &Arc<ConnectionInner>, instrument: &Arc<Instrument>, kind: TickByTickKind) -> ClientResult<()> {
    conn.require_feature(marketlink_core::version::features::TICK_BY_TICK, "tick by tick data")?;

    let request_id = match instrument.tick_by_tick_request_id(kind) {
        Some(id) => id,
        None => {
            let id = conn.requests.next_request_id();
            instrument.set_tick_by_tick_request_id(kind, id);
            id
        }
    };
    conn.handlers
        .tick_by_tick
        .by_request_id
        .insert(request_id, (instrument.clone(), kind));

    let f = instrument.fields();
    let mut fields = conn.outgoing_fields();
    fields.push_i32(request_id);
    fields.push_i32(instrument.contract_id());
    fields.push_string(&f.symbol);
    fields.push_string(f.security_type.unwrap_or_default().as_wire());
    fields.push_string(&f.last_trade_date);
    fields.push_f64_opt(f.strike);
    fields.push_string(&f.right);
    fields.push_string(&f.multiplier);
    fields.push_string(&f.exchange);
    fields.push_string(&f.currency);
    fields.push_string(&f.local_symbol);
    fields.push_string(&f.trading_class);
    fields.push_string(kind.as_wire());

    conn.send_message(Outgoing::ReqTickByTickData, fields).await
}

async fn send_unsubscribe(conn: &Arc<ConnectionInner>, instrument: &Arc<Instrument>, kind: TickByTickKind) -> ClientResult<()> {
    let Some(request_id) = instrument.tick_by_tick_request_id(kind) else {
        return Ok(());
    };
    let mut fields = conn.outgoing_fields();
    fields.push_i32(request_id);
    conn.send_message(Outgoing::CancelTickByTickData, fields).await?;

    conn.handlers.tick_by_tick.by_request_id.remove(&request_id);
    instrument.clear_tick_by_tick_request_id(kind);
    Ok(())
}

pub fn on_subscribe(
    connection: Weak<ConnectionInner>,
    instrument: Weak<Instrument>,
    kind: TickByTickKind,
) -> Arc<dyn Fn() + Send + Sync> {
    Arc::new(move || {
        let connection = connection.clone();
        let instrument = instrument.clone();
        tokio::spawn(async move {
            let (Some(conn), Some(instrument)) = (connection.upgrade(), instrument.upgrade()) else {
                return;
            };
            if let Err(err) = send_subscribe(&conn, &instrument, kind).await {
                tracing::warn!(error = %err, ?kind, "failed to subscribe to tick by tick data");
            }
        });
    })
}

pub fn on_unsubscribe(
    connection: Weak<ConnectionInner>,
    instrument: Weak<Instrument>,
    kind: TickByTickKind,
) -> Arc<dyn Fn() + Send + Sync> {
    Arc::new(move || {
        let connection = connection.clone();
        let instrument = instrument.clone();
        tokio::spawn(async move {
            let (Some(conn), Some(instrument)) = (connection.upgrade(), instrument.upgrade()) else {
                return;
            };
            if let Err(err) = send_unsubscribe(&conn, &instrument, kind).await {
                tracing::warn!(error = %err, ?kind, "failed to cancel tick by tick subscription");
            }
        });
    })
}

pub fn subscribe_last(instrument: &Arc<Instrument>, handler: Arc<Handler<LastTick>>) {
    instrument.on_tick_by_tick_last.add_strong(handler);
}

pub fn subscribe_all_last(instrument: &Arc<Instrument>, handler: Arc<Handler<LastTick>>) {
    instrument.on_tick_by_tick_all.add_strong(handler);
}

pub fn subscribe_bid_ask(instrument: &Arc<Instrument>, handler: Arc<Handler<BidAskTick>>) {
    instrument.on_tick_by_tick_bidask.add_strong(handler);
}

pub fn subscribe_midpoint(instrument: &Arc<Instrument>, handler: Arc<Handler<MidpointTick>>) {
    instrument.on_tick_by_tick_midpoint.add_strong(handler);
}

pub fn handle_tick_by_tick(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let tick_type = cursor.read_i32()?.unwrap_or(0);
    let time = parse_timestamp(&cursor.read_string()?)?;

    match tick_type {
        1 | 2 => {
            let price = cursor.read_f64()?.unwrap_or(0.0);
            let size = cursor.read_f64()?.unwrap_or(0.0);
            let attributes = cursor.read_i32()?.unwrap_or(0);
            let past_limit = attributes & 0x01 != 0;
            let unreported = attributes & 0x02 != 0;
            let _exchange = cursor.read_string()?;
            let _special_conditions = cursor.read_string()?;

            let tick = LastTick {
                time,
                price,
                size,
                past_limit,
                unreported,
            };
            if let Some((instrument, _)) = conn.handlers.tick_by_tick.by_request_id.get(&request_id).map(|e| e.clone()) {
                if tick_type == 1 {
                    instrument.on_tick_by_tick_last.emit(&tick);
                } else {
                    instrument.on_tick_by_tick_all.emit(&tick);
                }
            }
        }
        3 => {
            let bid_price = cursor.read_f64()?.unwrap_or(0.0);
            let ask_price = cursor.read_f64()?.unwrap_or(0.0);
            let bid_size = cursor.read_f64()?.unwrap_or(0.0);
            let ask_size = cursor.read_f64()?.unwrap_or(0.0);
            let attributes = cursor.read_i32()?.unwrap_or(0);
            let bid_past_low = attributes & 0x01 != 0;
            let ask_past_high = attributes & 0x02 != 0;

            let tick = BidAskTick {
                time,
                bid_price,
                ask_price,
                bid_size,
                ask_size,
                bid_past_low,
                ask_past_high,
            };
            if let Some((instrument, _)) = conn.handlers.tick_by_tick.by_request_id.get(&request_id).map(|e| e.clone()) {
                instrument.on_tick_by_tick_bidask.emit(&tick);
            }
        }
        4 => {
            let mid_point = cursor.read_f64()?.unwrap_or(0.0);
            let tick = MidpointTick { time, mid_point };
            if let Some((instrument, _)) = conn.handlers.tick_by_tick.by_request_id.get(&request_id).map(|e| e.clone()) {
                instrument.on_tick_by_tick_midpoint.emit(&tick);
            }
        }
        other => {
            tracing::warn!(request_id, tick_type = other, "unknown tick-by-tick type");
        }
    }
    Ok(())
}
