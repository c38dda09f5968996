//! Streaming top-of-book market data: `REQ_MKT_DATA` and its tick
//! update messages.

use std::sync::Arc;

use dashmap::DashMap;
use marketlink_core::catalog::Outgoing;
use marketlink_core::codec::FieldCursor;
use marketlink_core::version::features;

use crate::connection::ConnectionInner;
use crate::error::{ClientError, ClientResult};
use crate::instrument::{Instrument, PriceTick, TickTextUpdate, TickUpdate};
use crate::requests::{PendingCompletion, RequestId};
use crate::tick_types::{TickAttribute, TickType};

pub struct MarketDataHandlerState {
    by_request_id: DashMap<RequestId, Arc<Instrument>>,
}

impl MarketDataHandlerState {
    pub fn new() -> Self {
        Self {
            by_request_id: DashMap::new(),
        }
    }
}

/// Subscribe to top-of-book updates for `instrument`. Fails with
/// `InvariantViolation` if a subscription is already active rather than
/// silently issuing a second one.
pub async fn subscribe_market_data(
    conn: &Arc<ConnectionInner>,
    instrument: &Arc<Instrument>,
    generic_tick_list: &str,
    snapshot: bool,
    regulatory_snapshot: bool,
) -> ClientResult<PendingCompletion<()>> {
    if instrument.is_market_data_subscribed() {
        return Err(ClientError::InvariantViolation(
            "instrument already has an active market data subscription".to_string(),
        ));
    }
    if regulatory_snapshot {
        conn.require_feature(features::REQ_SMART_COMPONENTS, "regulatory snapshot market data")?;
    }

    let (request_id, completion) = conn.requests.make_pending::<()>();
    let symbol = instrument.fields().symbol;

    let mut fields = conn.outgoing_fields();
    fields.push_i32(11);
    fields.push_i32(request_id);
    fields.push_i32(instrument.contract_id());
    fields.push_string(&symbol);
    fields.push_string(generic_tick_list);
    fields.push_bool(snapshot);
    fields.push_bool(regulatory_snapshot);

    conn.send_message(Outgoing::ReqMktData, fields).await?;

    instrument.mark_market_data_subscribed(request_id);
    conn.handlers.market_data.by_request_id.insert(request_id, instrument.clone());

    if !snapshot {
        // Non-snapshot subscriptions are considered active as soon as the
        // request is sent; TICK_SNAPSHOT_END never arrives for them.
        conn.requests.resolve(request_id, ());
    }
    Ok(completion)
}

pub async fn cancel_market_data(conn: &Arc<ConnectionInner>, instrument: &Arc<Instrument>) -> ClientResult<()> {
    let Some(request_id) = instrument.market_data_request_id() else {
        return Err(ClientError::NotSubscribed);
    };

    let mut fields = conn.outgoing_fields();
    fields.push_i32(request_id);
    conn.send_message(Outgoing::CancelMktData, fields).await?;

    conn.handlers.market_data.by_request_id.remove(&request_id);
    instrument.clear_market_data_subscription();
    Ok(())
}

fn lookup(conn: &Arc<ConnectionInner>, request_id: RequestId) -> Option<Arc<Instrument>> {
    let instrument = conn.handlers.market_data.by_request_id.get(&request_id).map(|e| e.clone());
    if instrument.is_none() {
        tracing::warn!(request_id, "market data update for unknown subscription");
    }
    instrument
}

pub fn handle_tick_price(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let tick_type = TickType::from_wire(cursor.read_i32()?.unwrap_or(-1));
    let price = cursor.read_f64()?.unwrap_or(f64::NAN);
    let size = cursor.read_f64()?;
    let attribute_mask = cursor.read_i32()?.unwrap_or(0);

    if let Some(instrument) = lookup(conn, request_id) {
        instrument.deliver_tick(PriceTick {
            tick_type,
            price,
            size,
            attributes: TickAttribute::list_from_int(attribute_mask),
        });
    }
    Ok(())
}

pub fn handle_tick_size(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let tick_type = TickType::from_wire(cursor.read_i32()?.unwrap_or(-1));
    let size = cursor.read_f64()?.unwrap_or(0.0);

    if let Some(instrument) = lookup(conn, request_id) {
        instrument.ticks.emit(&TickUpdate { tick_type, value: size });
    }
    Ok(())
}

pub fn handle_tick_generic(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let tick_type = TickType::from_wire(cursor.read_i32()?.unwrap_or(-1));
    let value = cursor.read_f64()?.unwrap_or(f64::NAN);

    if let Some(instrument) = lookup(conn, request_id) {
        instrument.ticks.emit(&TickUpdate { tick_type, value });
    }
    Ok(())
}

pub fn handle_tick_string(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let tick_type = TickType::from_wire(cursor.read_i32()?.unwrap_or(-1));
    let value = cursor.read_string()?;

    if let Some(instrument) = lookup(conn, request_id) {
        instrument.ticks_text.emit(&TickTextUpdate { tick_type, value });
    }
    Ok(())
}

/// `TICK_REQ_PARAMS` reports per-instrument market data metadata rather
/// than a tick value: minimum price increment, the exchange whose quote
/// is used for best-bid-offer, and the snapshot permission bitmask.
pub fn handle_tick_req_params(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let minimum_tick = cursor.read_f64()?;
    let bbo_exchange = cursor.read_string()?;
    let snapshot_permissions = cursor.read_i32()?;

    if let Some(instrument) = lookup(conn, request_id) {
        instrument.with_fields_mut(|f| {
            if minimum_tick.is_some() {
                f.minimum_tick = minimum_tick;
            }
            f.bbo_exchange = bbo_exchange;
            f.snapshot_permissions = snapshot_permissions;
        });
    }
    Ok(())
}

pub fn handle_tick_snapshot_end(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    conn.requests.resolve(request_id, ());
    Ok(())
}
