//! Account positions: `REQ_POSITIONS`/`POSITION_DATA`/`POSITION_END` and
//! `CANCEL_POSITIONS`.
//!
//! Unlike per-instrument subscriptions, positions are a single
//! connection-wide stream: there is one `on_position` sink, its
//! first-subscriber callback sends `REQ_POSITIONS` once regardless of
//! how many handlers end up attached, and its last-subscriber callback
//! sends `CANCEL_POSITIONS`. [`get_positions`] is a one-shot snapshot
//! built on top of that sink using the same trick as the source: attach
//! a temporary handler (subscribing only if nothing else already is),
//! collect until `POSITION_END`, then detach it again.

use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use marketlink_core::catalog::Outgoing;
use marketlink_core::codec::FieldCursor;
use tokio::sync::oneshot;

use crate::connection::ConnectionInner;
use crate::error::ClientResult;
use crate::instrument::{Instrument, SecurityType};
use crate::subscription::{EventInstance, Handler};

/// An IBKR account identifier. Canonicalized by id within a Connection
/// so repeated position updates for the same account share identity.
/// Holds the running position size and average cost per instrument,
/// updated in place as `POSITION_DATA` rows arrive for this account.
#[derive(Debug)]
pub struct Account {
    pub account_id: String,
    positions: DashMap<i32, f64>,
    average_costs: DashMap<i32, f64>,
}

impl Account {
    fn record(&self, contract_id: i32, size: f64, average_cost: Option<f64>) {
        self.positions.insert(contract_id, size);
        if let Some(cost) = average_cost {
            self.average_costs.insert(contract_id, cost);
        }
    }

    /// Current position size for `contract_id`, or `None` if this
    /// account has never reported a position in it.
    pub fn position(&self, contract_id: i32) -> Option<f64> {
        self.positions.get(&contract_id).map(|e| *e)
    }

    /// Average cost for `contract_id`, or `None` if unreported.
    pub fn average_cost(&self, contract_id: i32) -> Option<f64> {
        self.average_costs.get(&contract_id).map(|e| *e)
    }
}

#[derive(Debug, Clone)]
pub struct PositionEvent {
    pub account: Arc<Account>,
    pub instrument: Arc<Instrument>,
    pub size: f64,
    pub average_cost: Option<f64>,
}

pub struct PositionsHandlerState {
    accounts: DashMap<String, Arc<Account>>,
    end_waiters: Mutex<Vec<oneshot::Sender<()>>>,
    pub on_position: EventInstance<PositionEvent>,
}

impl PositionsHandlerState {
    pub fn new(connection: Weak<ConnectionInner>) -> Self {
        Self {
            accounts: DashMap::new(),
            end_waiters: Mutex::new(Vec::new()),
            on_position: EventInstance::new(Some(on_subscribe(connection.clone())), Some(on_unsubscribe(connection))),
        }
    }

    fn account(&self, account_id: &str) -> Arc<Account> {
        self.accounts
            .entry(account_id.to_string())
            .or_insert_with(|| {
                Arc::new(Account {
                    account_id: account_id.to_string(),
                    positions: DashMap::new(),
                    average_costs: DashMap::new(),
                })
            })
            .clone()
    }
}

fn on_subscribe(connection: Weak<ConnectionInner>) -> Arc<dyn Fn() + Send + Sync> {
    Arc::new(move || {
        let connection = connection.clone();
        tokio::spawn(async move {
            let Some(conn) = connection.upgrade() else {
                return;
            };
            let mut fields = conn.outgoing_fields();
            fields.push_i32(1);
            if let Err(err) = conn.send_message(Outgoing::ReqPositions, fields).await {
                tracing::warn!(error = %err, "failed to subscribe to positions");
            }
        });
    })
}

fn on_unsubscribe(connection: Weak<ConnectionInner>) -> Arc<dyn Fn() + Send + Sync> {
    Arc::new(move || {
        let connection = connection.clone();
        tokio::spawn(async move {
            let Some(conn) = connection.upgrade() else {
                return;
            };
            let mut fields = conn.outgoing_fields();
            fields.push_i32(1);
            if let Err(err) = conn.send_message(Outgoing::CancelPositions, fields).await {
                tracing::warn!(error = %err, "failed to cancel positions subscription");
            }
        });
    })
}

/// Take a one-shot snapshot of current positions. If nothing else is
/// subscribed to `on_position`, this subscribes for the duration of the
/// call and unsubscribes again afterward; if something else already is,
/// this rides along with the live stream instead of sending a second
/// `REQ_POSITIONS`.
pub async fn get_positions(conn: &Arc<ConnectionInner>) -> ClientResult<Vec<PositionEvent>> {
    let collected: Arc<Mutex<Vec<PositionEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let collected_for_handler = collected.clone();
    let handler: Arc<Handler<PositionEvent>> = Arc::new(move |event: &PositionEvent| {
        collected_for_handler.lock().unwrap().push(event.clone());
    });

    let (tx, rx) = oneshot::channel();
    conn.handlers.positions.end_waiters.lock().unwrap().push(tx);

    conn.handlers.positions.on_position.add_strong(handler.clone());
    let _ = rx.await;
    let _ = conn.handlers.positions.on_position.remove(&handler);

    Ok(collected.lock().unwrap().clone())
}

pub fn handle_position_data(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let account_id = cursor.read_string()?;
    let contract_id = cursor.read_i32()?.unwrap_or(0);
    let symbol = cursor.read_string()?;
    let security_type = SecurityType::from_text(&cursor.read_string()?);
    let last_trade_date = cursor.read_string()?;
    let strike = cursor.read_f64()?;
    let right = cursor.read_string()?;
    let multiplier = cursor.read_string()?;
    let exchange = cursor.read_string()?;
    let currency = cursor.read_string()?;
    let local_symbol = cursor.read_string()?;
    let trading_class = if cursor.message_version() >= 2 { cursor.read_string()? } else { String::new() };

    let instrument = conn.instruments.get_or_create(contract_id);
    instrument.with_fields_mut(|f| {
        f.symbol = symbol;
        f.security_type = Some(security_type);
        f.last_trade_date = last_trade_date;
        f.strike = strike;
        f.right = right.clone();
        f.multiplier = multiplier.clone();
        f.exchange = exchange.clone();
        f.currency = currency.clone();
        f.local_symbol = local_symbol.clone();
        f.trading_class = trading_class.clone();
    });

    let size = cursor.read_f64()?.unwrap_or(0.0);
    let average_cost = if cursor.message_version() >= 3 { cursor.read_f64()? } else { None };

    let account = conn.handlers.positions.account(&account_id);
    account.record(contract_id, size, average_cost);
    conn.handlers.positions.on_position.emit(&PositionEvent {
        account,
        instrument,
        size,
        average_cost,
    });
    Ok(())
}

pub fn handle_position_end(conn: &Arc<ConnectionInner>) -> ClientResult<()> {
    let mut waiters = conn.handlers.positions.end_waiters.lock().unwrap();
    for tx in waiters.drain(..) {
        let _ = tx.send(());
    }
    Ok(())
}
