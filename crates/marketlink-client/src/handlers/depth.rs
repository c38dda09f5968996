//! Market depth (order book) updates: `REQ_MKT_DEPTH`/`MARKET_DEPTH` and
//! `MARKET_DEPTH_L2`.
//!
//! Subscription is event-driven rather than an explicit async call: the
//! first handler attached to an instrument's `on_market_depth` sink
//! triggers the wire subscribe, the last one dropped triggers the
//! cancel (see [`crate::subscription::EventInstance`]). Changing the
//! requested row count on an already-subscribed instrument reuses the
//! same request id rather than allocating a new one.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use marketlink_core::catalog::Outgoing;
use marketlink_core::codec::FieldCursor;

use crate::connection::ConnectionInner;
use crate::error::{ClientError, ClientResult};
use crate::instrument::Instrument;
use crate::requests::RequestId;
use crate::subscription::Handler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Unknown(i32),
}

impl Operation {
    fn from_wire(value: i32) -> Self {
        match value {
            0 => Operation::Insert,
            1 => Operation::Update,
            2 => Operation::Delete,
            other => Operation::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Ask,
    Bid,
    Unknown(i32),
}

impl Side {
    fn from_wire(value: i32) -> Self {
        match value {
            0 => Side::Ask,
            1 => Side::Bid,
            other => Side::Unknown(other),
        }
    }
}

/// One row update from the book. `market_maker` is always empty for the
/// non-L2 `MARKET_DEPTH` message.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthUpdate {
    pub position: i32,
    pub market_maker: String,
    pub operation: Operation,
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

/// One resting row in an [`crate::instrument::Instrument`]'s maintained
/// book, as applied from a sequence of [`DepthUpdate`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthLevel {
    pub price: f64,
    pub size: f64,
    pub market_maker: String,
}

pub struct DepthHandlerState {
    by_request_id: DashMap<RequestId, Arc<Instrument>>,
}

impl DepthHandlerState {
    pub fn new() -> Self {
        Self {
            by_request_id: DashMap::new(),
        }
    }
}

async fn send_subscribe(conn: &Arc<ConnectionInner>, instrument: &Arc<Instrument>) -> ClientResult<()> {
    let request_id = match instrument.depth_request_id() {
        Some(id) => id,
        None => {
            let id = conn.requests.next_request_id();
            instrument.set_depth_request_id(id);
            id
        }
    };
    conn.handlers.depth.by_request_id.insert(request_id, instrument.clone());

    let f = instrument.fields();
    let mut fields = conn.outgoing_fields();
    fields.push_i32(5);
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
    fields.push_i32(instrument.market_depth_rows());
    // Market depth exchange map: undocumented by the gateway, always empty.
    fields.push_list(&Vec::<String>::new(), |o, v: &String| o.push_string(v));

    conn.send_message(Outgoing::ReqMktDepth, fields).await
}

async fn send_unsubscribe(conn: &Arc<ConnectionInner>, instrument: &Arc<Instrument>) -> ClientResult<()> {
    let Some(request_id) = instrument.depth_request_id() else {
        return Ok(());
    };
    let mut fields = conn.outgoing_fields();
    fields.push_i32(0);
    fields.push_i32(request_id);
    conn.send_message(Outgoing::CancelMktDepth, fields).await?;

    conn.handlers.depth.by_request_id.remove(&request_id);
    instrument.clear_depth_request_id();
    Ok(())
}

/// Built by [`Instrument::new`] and wired into its `on_market_depth`
/// sink's first-subscriber callback.
pub fn on_subscribe(connection: Weak<ConnectionInner>, instrument: Weak<Instrument>) -> Arc<dyn Fn() + Send + Sync> {
    Arc::new(move || {
        let connection = connection.clone();
        let instrument = instrument.clone();
        tokio::spawn(async move {
            let (Some(conn), Some(instrument)) = (connection.upgrade(), instrument.upgrade()) else {
                return;
            };
            if let Err(err) = send_subscribe(&conn, &instrument).await {
                tracing::warn!(error = %err, "failed to subscribe to market depth");
            }
        });
    })
}

pub fn on_unsubscribe(connection: Weak<ConnectionInner>, instrument: Weak<Instrument>) -> Arc<dyn Fn() + Send + Sync> {
    Arc::new(move || {
        let connection = connection.clone();
        let instrument = instrument.clone();
        tokio::spawn(async move {
            let (Some(conn), Some(instrument)) = (connection.upgrade(), instrument.upgrade()) else {
                return;
            };
            if let Err(err) = send_unsubscribe(&conn, &instrument).await {
                tracing::warn!(error = %err, "failed to cancel market depth subscription");
            }
        });
    })
}

pub fn subscribe_market_depth(instrument: &Arc<Instrument>, num_rows: i32, handler: Arc<Handler<DepthUpdate>>) {
    instrument.set_market_depth_rows(num_rows);
    instrument.on_market_depth.add_strong(handler);
}

/// Change the requested row count on an instrument that is already
/// subscribed; reconfigures the existing wire subscription in place
/// rather than unsubscribe/resubscribe. A no-op if nothing is
/// currently subscribed.
pub fn change_market_depth_rows(instrument: &Arc<Instrument>, num_rows: i32) {
    instrument.set_market_depth_rows(num_rows);
    if instrument.on_market_depth.has_subscribers() {
        instrument.on_market_depth.reconfigure();
    }
}

pub fn unsubscribe_market_depth(instrument: &Arc<Instrument>, handler: &Arc<Handler<DepthUpdate>>) -> ClientResult<()> {
    instrument.on_market_depth.remove(handler).map_err(|_| ClientError::NotSubscribed)
}

fn lookup(conn: &Arc<ConnectionInner>, request_id: RequestId) -> Option<Arc<Instrument>> {
    let instrument = conn.handlers.depth.by_request_id.get(&request_id).map(|e| e.clone());
    if instrument.is_none() {
        tracing::warn!(request_id, "market depth update for unknown subscription");
    }
    instrument
}

pub fn handle_market_depth(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let position = cursor.read_i32()?.unwrap_or(0);
    let operation = Operation::from_wire(cursor.read_i32()?.unwrap_or(-1));
    let side = Side::from_wire(cursor.read_i32()?.unwrap_or(-1));
    let price = cursor.read_f64()?.unwrap_or(0.0);
    let size = cursor.read_f64()?.unwrap_or(0.0);

    if let Some(instrument) = lookup(conn, request_id) {
        let update = DepthUpdate {
            position,
            market_maker: String::new(),
            operation,
            side,
            price,
            size,
        };
        instrument.apply_depth_update(&update);
        instrument.on_market_depth.emit(&update);
    }
    Ok(())
}

pub fn handle_market_depth_l2(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let position = cursor.read_i32()?.unwrap_or(0);
    let market_maker = cursor.read_string()?;
    let operation = Operation::from_wire(cursor.read_i32()?.unwrap_or(-1));
    let side = Side::from_wire(cursor.read_i32()?.unwrap_or(-1));
    let price = cursor.read_f64()?.unwrap_or(0.0);
    let size = cursor.read_f64()?.unwrap_or(0.0);

    if let Some(instrument) = lookup(conn, request_id) {
        let update = DepthUpdate {
            position,
            market_maker,
            operation,
            side,
            price,
            size,
        };
        instrument.apply_depth_update(&update);
        instrument.on_market_depth.emit(&update);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Instrument;
    use std::sync::Weak;

    fn update(position: i32, operation: Operation, side: Side, price: f64, size: f64) -> DepthUpdate {
        DepthUpdate {
            position,
            market_maker: String::new(),
            operation,
            side,
            price,
            size,
        }
    }

    /// Property 8: insert/update/delete applied in order produces the
    /// same list a naive model would produce, per side.
    #[test]
    fn insert_update_delete_maintain_ordered_book() {
        let instrument = Instrument::new(265598, Weak::new(), Weak::new());

        instrument.apply_depth_update(&update(0, Operation::Insert, Side::Ask, 20.0, 21.0));
        instrument.apply_depth_update(&update(0, Operation::Insert, Side::Bid, 21.0, 21.0));
        instrument.apply_depth_update(&update(0, Operation::Update, Side::Ask, 22.0, 21.0));
        instrument.apply_depth_update(&update(0, Operation::Delete, Side::Ask, 22.0, 21.0));

        assert_eq!(instrument.market_depth_asks().len(), 0);
        let bids = instrument.market_depth_bids();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].price, 21.0);
        assert_eq!(bids[0].size, 21.0);
    }

    #[test]
    fn insert_preserves_position_order() {
        let instrument = Instrument::new(1, Weak::new(), Weak::new());

        instrument.apply_depth_update(&update(0, Operation::Insert, Side::Bid, 10.0, 1.0));
        instrument.apply_depth_update(&update(1, Operation::Insert, Side::Bid, 9.0, 1.0));
        instrument.apply_depth_update(&update(0, Operation::Insert, Side::Bid, 11.0, 1.0));

        let bids = instrument.market_depth_bids();
        assert_eq!(
            bids.iter().map(|l| l.price).collect::<Vec<_>>(),
            vec![11.0, 10.0, 9.0]
        );
    }

    #[test]
    fn unknown_side_and_out_of_range_position_are_dropped() {
        let instrument = Instrument::new(1, Weak::new(), Weak::new());

        instrument.apply_depth_update(&update(0, Operation::Insert, Side::Unknown(9), 1.0, 1.0));
        instrument.apply_depth_update(&update(5, Operation::Update, Side::Bid, 1.0, 1.0));
        instrument.apply_depth_update(&update(5, Operation::Delete, Side::Bid, 1.0, 1.0));

        assert_eq!(instrument.market_depth_bids().len(), 0);
        assert_eq!(instrument.market_depth_asks().len(), 0);
    }
}
