//! Trade executions: `REQ_EXECUTIONS`/`EXECUTION_DATA`/
//! `EXECUTION_DATA_END` and unsolicited `COMMISSION_REPORT`.
//!
//! An execution fans out three ways on arrival: the connection-wide
//! [`ExecutionsHandlerState::on_execution`] sink, the instrument's own
//! `executions` sink, and -- if the owning order is still tracked -- the
//! order's `on_execution` sink. A live execution (pushed unsolicited as
//! an order fills) carries `request_id == -1` and is never accumulated
//! into a pending `get_executions` result; only a genuine response row
//! is.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use marketlink_core::catalog::Outgoing;
use marketlink_core::codec::{FieldCursor, Gates};
use marketlink_core::version::features;

use crate::connection::ConnectionInner;
use crate::error::{ClientError, ClientResult};
use crate::instrument::{Instrument, SecurityType};
use crate::requests::{PendingCompletion, RequestId};
use crate::subscription::EventInstance;

#[derive(Debug, Clone)]
pub struct Execution {
    pub order_id: i32,
    pub execution_id: String,
    pub time: String,
    pub account_number: String,
    pub exchange: String,
    pub side: String,
    pub share: f64,
    pub price: f64,
    pub perm_id: i32,
    pub client_id: i32,
    pub liquidation: i32,
    pub cumulative_quantity: f64,
    pub average_price: f64,
    pub order_ref: String,
    pub ev_rule: String,
    pub ev_multiplier: f64,
    pub model_code: String,
    pub last_liquidity: i32,
    pub instrument: Arc<Instrument>,
}

/// Deserialize-only: the gateway never accepts a client-constructed
/// commission report.
#[derive(Debug, Clone)]
pub struct CommissionReport {
    pub execution_id: String,
    pub commission: f64,
    pub currency: String,
    pub realized_pnl: Option<f64>,
    pub income: Option<f64>,
    pub yield_redemption_date: String,
}

/// Filters accepted by `get_executions`. An unset field matches
/// everything for that dimension.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub client_id: i32,
    pub account_code: String,
    pub time: String,
    pub symbol: String,
    pub security_type: SecurityType,
    pub exchange: String,
    pub side: String,
}

pub struct ExecutionsHandlerState {
    pending_rows: DashMap<RequestId, Mutex<Vec<Execution>>>,
    pub on_execution: EventInstance<Execution>,
    pub on_commission_report: EventInstance<CommissionReport>,
}

impl ExecutionsHandlerState {
    pub fn new() -> Self {
        Self {
            pending_rows: DashMap::new(),
            on_execution: EventInstance::new(None, None),
            on_commission_report: EventInstance::new(None, None),
        }
    }

    fn push_row(&self, request_id: RequestId, execution: Execution) {
        self.pending_rows
            .entry(request_id)
            .or_insert_with(|| Mutex::new(Vec::new()))
            .lock()
            .unwrap()
            .push(execution);
    }

    fn take_rows(&self, request_id: RequestId) -> Vec<Execution> {
        self.pending_rows
            .remove(&request_id)
            .map(|(_, rows)| rows.into_inner().unwrap())
            .unwrap_or_default()
    }
}

pub async fn get_executions(
    conn: &Arc<ConnectionInner>,
    filter: ExecutionFilter,
) -> ClientResult<PendingCompletion<Vec<Execution>>> {
    let (request_id, completion) = conn.requests.make_pending::<Vec<Execution>>();

    let mut fields = conn.outgoing_fields();
    fields.push_i32(3);
    fields.push_i32(request_id);
    fields.push_i32(filter.client_id);
    fields.push_string(&filter.account_code);
    fields.push_string(&filter.time);
    fields.push_string(&filter.symbol);
    fields.push_string(filter.security_type.as_wire());
    fields.push_string(&filter.exchange);
    fields.push_string(&filter.side);

    conn.send_message(Outgoing::ReqExecutions, fields).await?;
    Ok(completion)
}

/// Decode the 11-field "request contract" shape embedded in an
/// execution row, and canonicalize it through the instrument registry.
fn read_instrument(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<Arc<Instrument>> {
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
    let trading_class = cursor.read_string()?;

    let instrument = conn.instruments.get_or_create(contract_id);
    instrument.with_fields_mut(|f| {
        f.symbol = symbol;
        f.security_type = Some(security_type);
        f.last_trade_date = last_trade_date;
        f.strike = strike;
        f.right = right;
        f.multiplier = multiplier;
        f.exchange = exchange;
        f.currency = currency;
        f.local_symbol = local_symbol;
        f.trading_class = trading_class;
    });
    Ok(instrument)
}

pub fn handle_execution_data(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    if cursor.message_version() <= 10 {
        return Err(ClientError::UnsupportedFeature(
            "execution reports below message version 11".to_string(),
        ));
    }

    let request_id = cursor.read_request_id()?;
    let order_id = cursor.read_i32()?.unwrap_or(0);
    let instrument = read_instrument(conn, cursor)?;

    let execution_id = cursor.read_string()?;
    let time = cursor.read_string()?;
    let account_number = cursor.read_string()?;
    let exchange = cursor.read_string()?;
    let side = cursor.read_string()?;
    let share = cursor.read_f64()?.unwrap_or(0.0);
    let price = cursor.read_f64()?.unwrap_or(0.0);
    let perm_id = cursor.read_i32()?.unwrap_or(0);
    let client_id = cursor.read_i32()?.unwrap_or(0);
    let liquidation = cursor.read_i32()?.unwrap_or(0);
    let cumulative_quantity = cursor.read_f64()?.unwrap_or(0.0);
    let average_price = cursor.read_f64()?.unwrap_or(0.0);
    let order_ref = cursor.read_string()?;
    let ev_rule = cursor.read_string()?;
    let ev_multiplier = cursor.read_f64()?.unwrap_or(0.0);
    let model_code = cursor.read_string_gated(Gates::min_protocol(features::MODELS_SUPPORT.value()), String::new())?;
    let last_liquidity = cursor
        .read_i32_gated(Gates::min_protocol(features::LAST_LIQUIDITY.value()))?
        .unwrap_or(0);

    let execution = Execution {
        order_id,
        execution_id,
        time,
        account_number,
        exchange,
        side,
        share,
        price,
        perm_id,
        client_id,
        liquidation,
        cumulative_quantity,
        average_price,
        order_ref,
        ev_rule,
        ev_multiplier,
        model_code,
        last_liquidity,
        instrument: instrument.clone(),
    };

    if conn.requests.is_pending(request_id) {
        conn.handlers.executions.push_row(request_id, execution.clone());
    }

    conn.handlers.executions.on_execution.emit(&execution);
    instrument.executions.emit(&execution);
    if let Some(order) = conn.handlers.orders.get(order_id) {
        order.on_execution.emit(&execution);
    }
    Ok(())
}

pub fn handle_execution_data_end(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let rows = conn.handlers.executions.take_rows(request_id);
    conn.requests.resolve(request_id, rows);
    Ok(())
}

pub fn handle_commission_report(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let execution_id = cursor.read_string()?;
    let commission = cursor.read_f64()?.unwrap_or(0.0);
    let currency = cursor.read_string()?;
    let realized_pnl = cursor.read_f64()?;
    let income = cursor.read_f64()?;
    let yield_redemption_date = cursor.read_string()?;

    conn.handlers.executions.on_commission_report.emit(&CommissionReport {
        execution_id,
        commission,
        currency,
        realized_pnl,
        income,
        yield_redemption_date,
    });
    Ok(())
}
