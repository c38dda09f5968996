//! Order placement and lifecycle: `PLACE_ORDER`/`CANCEL_ORDER`,
//! `ORDER_STATUS`, `OPEN_ORDER`/`OPEN_ORDER_END`, and `NEXT_VALID_ID`.
//!
//! The source's `Order` carries close to a hundred fields covering
//! combo legs, algo parameters, and conditions that the source itself
//! mostly leaves at their defaults and, for conditions, refuses to
//! serialize at all (`raise UnsupportedFeature("Order conditions")`).
//! This keeps the fields that make up a plain market/limit/stop order
//! and raises [`ClientError::UnsupportedFeature`] for everything this
//! client does not model, rather than silently dropping it on the
//! floor.
//!
//! Order ids are not allocated by [`crate::requests::RequestRegistry`]:
//! they come from the `NEXT_VALID_ID` cursor the gateway hands out at
//! session start, exactly like the source's `_next_order_id`. A placed
//! order's pending completion is still installed through the registry
//! (`make_pending_with_id`) so an `ERROR` naming that order id can fail
//! it the same way a request id would.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use marketlink_core::catalog::Outgoing;
use marketlink_core::codec::FieldCursor;
use tokio::sync::oneshot;
use tokio::sync::Mutex as AsyncMutex;

use crate::connection::ConnectionInner;
use crate::error::{ClientError, ClientResult};
use crate::handlers::executions::Execution;
use crate::instrument::{Instrument, SecurityType};
use crate::requests::PendingCompletion;
use crate::subscription::EventInstance;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Buy,
    Sell,
    SellShort,
}

impl Action {
    fn as_wire(self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::SellShort => "SSHORT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
    MarketOnClose,
    LimitOnClose,
}

impl OrderType {
    fn as_wire(self) -> &'static str {
        match self {
            OrderType::Market => "MKT",
            OrderType::Limit => "LMT",
            OrderType::Stop => "STP",
            OrderType::StopLimit => "STP LMT",
            OrderType::MarketOnClose => "MOC",
            OrderType::LimitOnClose => "LOC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Day,
    GoodTillCancel,
    ImmediateOrCancel,
    GoodTillDate,
    FillOrKill,
}

impl TimeInForce {
    fn as_wire(self) -> &'static str {
        match self {
            TimeInForce::Day => "DAY",
            TimeInForce::GoodTillCancel => "GTC",
            TimeInForce::ImmediateOrCancel => "IOC",
            TimeInForce::GoodTillDate => "GTD",
            TimeInForce::FillOrKill => "FOK",
        }
    }

    fn from_wire(text: &str) -> Self {
        match text {
            "GTC" => TimeInForce::GoodTillCancel,
            "IOC" => TimeInForce::ImmediateOrCancel,
            "GTD" => TimeInForce::GoodTillDate,
            "FOK" => TimeInForce::FillOrKill,
            _ => TimeInForce::Day,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOrigin {
    Customer,
    Firm,
}

impl OrderOrigin {
    fn as_wire(self) -> i32 {
        match self {
            OrderOrigin::Customer => 0,
            OrderOrigin::Firm => 1,
        }
    }
}

/// Order fields mutated in place as `ORDER_STATUS`/`OPEN_ORDER` updates
/// arrive, mirroring [`crate::instrument::InstrumentFields`]'s
/// single-lock-per-burst rationale.
#[derive(Debug, Clone)]
pub struct OrderFields {
    pub instrument: Arc<Instrument>,
    pub action: Action,
    pub total_quantity: f64,
    pub order_type: OrderType,
    pub limit_price: Option<f64>,
    pub aux_price: Option<f64>,
    pub time_in_force: TimeInForce,
    pub oca_group: String,
    pub account: String,
    pub origin: OrderOrigin,
    pub order_ref: String,
    pub client_id: i32,
    pub perm_id: i32,
    pub outside_rth: bool,
    pub hidden: bool,
    pub good_till_date: String,
    pub model_code: String,
    pub status: String,
    pub filled: f64,
    pub remaining: f64,
    pub average_fill_price: f64,
    pub why_held: String,
    pub market_cap_price: Option<f64>,
}

impl OrderFields {
    fn blank(instrument: Arc<Instrument>, action: Action, total_quantity: f64, order_type: OrderType) -> Self {
        Self {
            instrument,
            action,
            total_quantity,
            order_type,
            limit_price: None,
            aux_price: None,
            time_in_force: TimeInForce::Day,
            oca_group: String::new(),
            account: String::new(),
            origin: OrderOrigin::Customer,
            order_ref: String::new(),
            client_id: 0,
            perm_id: 0,
            outside_rth: false,
            hidden: false,
            good_till_date: String::new(),
            model_code: String::new(),
            status: String::new(),
            filled: 0.0,
            remaining: total_quantity,
            average_fill_price: 0.0,
            why_held: String::new(),
            market_cap_price: None,
        }
    }
}

pub struct Order {
    order_id: AtomicI32,
    fields: Mutex<OrderFields>,
    pub updated: EventInstance<()>,
    pub on_execution: EventInstance<Execution>,
}

impl Order {
    fn new(order_id: i32, fields: OrderFields) -> Self {
        Self {
            order_id: AtomicI32::new(order_id),
            fields: Mutex::new(fields),
            updated: EventInstance::new(None, None),
            on_execution: EventInstance::new(None, None),
        }
    }

    /// A plain market order: buy or sell `total_quantity` at whatever
    /// price is available.
    pub fn market(instrument: Arc<Instrument>, action: Action, total_quantity: f64) -> OrderFields {
        OrderFields::blank(instrument, action, total_quantity, OrderType::Market)
    }

    /// A limit order: fills at `limit_price` or better.
    pub fn limit(instrument: Arc<Instrument>, action: Action, total_quantity: f64, limit_price: f64) -> OrderFields {
        let mut fields = OrderFields::blank(instrument, action, total_quantity, OrderType::Limit);
        fields.limit_price = Some(limit_price);
        fields
    }

    pub fn order_id(&self) -> i32 {
        self.order_id.load(Ordering::SeqCst)
    }

    pub fn fields(&self) -> OrderFields {
        self.fields.lock().unwrap().clone()
    }

    fn with_fields_mut<R>(&self, f: impl FnOnce(&mut OrderFields) -> R) -> R {
        f(&mut self.fields.lock().unwrap())
    }
}

pub struct OrdersHandlerState {
    orders: DashMap<i32, Arc<Order>>,
    next_valid_id: AtomicI32,
    open_orders_buffer: Mutex<Vec<Arc<Order>>>,
    open_orders_end: Mutex<Option<oneshot::Sender<()>>>,
    open_orders_lock: AsyncMutex<()>,
}

impl OrdersHandlerState {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            next_valid_id: AtomicI32::new(0),
            open_orders_buffer: Mutex::new(Vec::new()),
            open_orders_end: Mutex::new(None),
            open_orders_lock: AsyncMutex::new(()),
        }
    }

    pub fn get(&self, order_id: i32) -> Option<Arc<Order>> {
        self.orders.get(&order_id).map(|e| e.clone())
    }
}

/// The 11-field "request contract" shape used consistently across this
/// client's outgoing requests; see [`crate::handlers::contract::ContractQuery`].
fn push_contract_fields(fields: &mut marketlink_core::codec::OutgoingFields, instrument: &Arc<Instrument>) -> ClientResult<()> {
    let f = instrument.fields();
    if f.security_type.as_ref().map(SecurityType::as_wire) == Some("BAG") {
        return Err(ClientError::UnsupportedFeature("combo (BAG) orders".to_string()));
    }
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
    Ok(())
}

fn encode_order(fields: &mut marketlink_core::codec::OutgoingFields, order_id: i32, order: &OrderFields) -> ClientResult<()> {
    fields.push_i32(45);
    fields.push_i32(order_id);
    push_contract_fields(fields, &order.instrument)?;
    fields.push_string(order.action.as_wire());
    fields.push_f64(order.total_quantity);
    fields.push_string(order.order_type.as_wire());
    fields.push_f64_opt(order.limit_price);
    fields.push_f64_opt(order.aux_price);
    fields.push_string(order.time_in_force.as_wire());
    fields.push_string(&order.oca_group);
    fields.push_string(&order.account);
    fields.push_i32(order.origin.as_wire());
    fields.push_string(&order.order_ref);
    fields.push_bool(order.outside_rth);
    fields.push_bool(order.hidden);
    fields.push_string(&order.good_till_date);
    fields.push_string(&order.model_code);
    Ok(())
}

pub async fn place_order(conn: &Arc<ConnectionInner>, fields: OrderFields) -> ClientResult<PendingCompletion<Arc<Order>>> {
    let order_id = conn.handlers.orders.next_valid_id.fetch_add(1, Ordering::SeqCst);
    let order = Arc::new(Order::new(order_id, fields));
    conn.handlers.orders.orders.insert(order_id, order.clone());
    let completion = conn.requests.make_pending_with_id::<Arc<Order>>(order_id);

    let mut wire = conn.outgoing_fields();
    encode_order(&mut wire, order_id, &order.fields())?;
    conn.send_message(Outgoing::PlaceOrder, wire).await?;
    Ok(completion)
}

pub async fn cancel_order(conn: &Arc<ConnectionInner>, order_id: i32) -> ClientResult<()> {
    let mut fields = conn.outgoing_fields();
    fields.push_i32(1);
    fields.push_i32(order_id);
    conn.send_message(Outgoing::CancelOrder, fields).await
}

/// Snapshot every currently-open order. Requests are serialized: a
/// second concurrent call waits for the first to finish rather than
/// racing over the same accumulator.
pub async fn get_open_orders(conn: &Arc<ConnectionInner>) -> ClientResult<Vec<Arc<Order>>> {
    let _guard = conn.handlers.orders.open_orders_lock.lock().await;
    conn.handlers.orders.open_orders_buffer.lock().unwrap().clear();

    let (tx, rx) = oneshot::channel();
    *conn.handlers.orders.open_orders_end.lock().unwrap() = Some(tx);

    let mut fields = conn.outgoing_fields();
    fields.push_i32(1);
    conn.send_message(Outgoing::ReqAllOpenOrders, fields).await?;

    let _ = rx.await;
    Ok(conn.handlers.orders.open_orders_buffer.lock().unwrap().clone())
}

pub fn handle_next_valid_id(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let next_id = cursor.read_i32()?.unwrap_or(0);
    conn.handlers.orders.next_valid_id.store(next_id, Ordering::SeqCst);
    Ok(())
}

pub fn handle_order_status(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let order_id = cursor.read_request_id()?;
    let status = cursor.read_string()?;
    let filled = cursor.read_f64()?.unwrap_or(0.0);
    let remaining = cursor.read_f64()?.unwrap_or(0.0);
    let average_fill_price = cursor.read_f64()?.unwrap_or(0.0);
    let _perm_id = cursor.read_i32()?.unwrap_or(0);
    let _parent_id = cursor.read_i32()?.unwrap_or(0);
    let _last_fill_price = cursor.read_f64()?.unwrap_or(0.0);
    let _client_id = cursor.read_i32()?.unwrap_or(0);
    let why_held = cursor.read_string()?;
    let market_cap_price = cursor.read_f64()?;

    if let Some(order) = conn.handlers.orders.get(order_id) {
        order.with_fields_mut(|f| {
            f.status = status;
            f.filled = filled;
            f.remaining = remaining;
            f.average_fill_price = average_fill_price;
            f.why_held = why_held;
            f.market_cap_price = market_cap_price;
        });
        order.updated.emit(&());
        conn.requests.resolve(order_id, order);
    } else {
        tracing::warn!(order_id, "order status for unknown order");
    }
    Ok(())
}

pub fn handle_open_order(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let order_id = cursor.read_request_id()?;
    let instrument_contract_id = cursor.read_i32()?.unwrap_or(0);
    let instrument = conn.instruments.get_or_create(instrument_contract_id);
    let _symbol = cursor.read_string()?;
    let _security_type = cursor.read_string()?;
    let _last_trade_date = cursor.read_string()?;
    let _strike = cursor.read_f64()?;
    let _right = cursor.read_string()?;
    let _multiplier = cursor.read_string()?;
    let _exchange = cursor.read_string()?;
    let _currency = cursor.read_string()?;
    let _local_symbol = cursor.read_string()?;
    let _trading_class = cursor.read_string()?;

    let action = match cursor.read_string()?.as_str() {
        "SELL" => Action::Sell,
        "SSHORT" => Action::SellShort,
        _ => Action::Buy,
    };
    let total_quantity = cursor.read_f64()?.unwrap_or(0.0);
    let order_type = match cursor.read_string()?.as_str() {
        "LMT" => OrderType::Limit,
        "STP" => OrderType::Stop,
        "STP LMT" => OrderType::StopLimit,
        "MOC" => OrderType::MarketOnClose,
        "LOC" => OrderType::LimitOnClose,
        _ => OrderType::Market,
    };
    let limit_price = cursor.read_f64()?;
    let aux_price = cursor.read_f64()?;
    let time_in_force = TimeInForce::from_wire(&cursor.read_string()?);
    let oca_group = cursor.read_string()?;
    let account = cursor.read_string()?;
    let _open_close = cursor.read_string()?;
    let origin = if cursor.read_i32()?.unwrap_or(0) == 1 {
        OrderOrigin::Firm
    } else {
        OrderOrigin::Customer
    };
    let order_ref = cursor.read_string()?;
    let client_id = cursor.read_i32()?.unwrap_or(0);
    let perm_id = cursor.read_i32()?.unwrap_or(0);
    let outside_rth = cursor.read_bool()?.unwrap_or(false);
    let hidden = cursor.read_bool()?.unwrap_or(false);

    let fields = OrderFields {
        instrument,
        action,
        total_quantity,
        order_type,
        limit_price,
        aux_price,
        time_in_force,
        oca_group,
        account,
        origin,
        order_ref,
        client_id,
        perm_id,
        outside_rth,
        hidden,
        good_till_date: String::new(),
        model_code: String::new(),
        status: String::new(),
        filled: 0.0,
        remaining: total_quantity,
        average_fill_price: 0.0,
        why_held: String::new(),
        market_cap_price: None,
    };

    let order = conn
        .handlers
        .orders
        .orders
        .entry(order_id)
        .or_insert_with(|| Arc::new(Order::new(order_id, fields.clone())))
        .clone();
    order.with_fields_mut(|f| *f = fields);
    order.updated.emit(&());
    conn.requests.resolve(order_id, order.clone());

    conn.handlers.orders.open_orders_buffer.lock().unwrap().push(order);
    Ok(())
}

pub fn handle_open_order_end(conn: &Arc<ConnectionInner>) -> ClientResult<()> {
    if let Some(tx) = conn.handlers.orders.open_orders_end.lock().unwrap().take() {
        let _ = tx.send(());
    }
    Ok(())
}
