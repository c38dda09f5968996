//! Instrument lookup: symbol search (`REQ_MATCHING_SYMBOLS`) and full
//! contract lookup (`REQ_CONTRACT_DATA`).
//!
//! Contract data rows accumulate keyed by request id and resolve on the
//! terminating `CONTRACT_DATA_END`, since a lookup can return more than
//! one matching contract. Symbol search instead delivers its whole
//! result in one frame, so it resolves directly out of the single
//! handler call.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use marketlink_core::catalog::Outgoing;
use marketlink_core::codec::{FieldCursor, Gates};
use marketlink_core::version::features;

use crate::connection::ConnectionInner;
use crate::error::ClientResult;
use crate::instrument::{Instrument, SecurityIdentifierType, SecurityType};
use crate::requests::{PendingCompletion, RequestId};

pub struct ContractHandlerState {
    pending_rows: DashMap<RequestId, Mutex<Vec<Arc<Instrument>>>>,
}

impl ContractHandlerState {
    pub fn new() -> Self {
        Self {
            pending_rows: DashMap::new(),
        }
    }

    fn push_row(&self, request_id: RequestId, instrument: Arc<Instrument>) {
        self.pending_rows
            .entry(request_id)
            .or_insert_with(|| Mutex::new(Vec::new()))
            .lock()
            .unwrap()
            .push(instrument);
    }

    fn take_rows(&self, request_id: RequestId) -> Vec<Arc<Instrument>> {
        self.pending_rows
            .remove(&request_id)
            .map(|(_, rows)| rows.into_inner().unwrap())
            .unwrap_or_default()
    }
}

/// The filled-in subset of contract fields `REQ_CONTRACT_DATA` accepts.
/// Covers both a lookup by security id (ISIN, CUSIP, ...) and the
/// plain-by-symbol case.
#[derive(Debug, Clone, Default)]
pub struct ContractQuery {
    pub contract_id: i32,
    pub symbol: String,
    pub security_type: SecurityType,
    pub last_trade_date: String,
    pub strike: Option<f64>,
    pub right: String,
    pub multiplier: String,
    pub exchange: String,
    pub currency: String,
    pub local_symbol: String,
    pub trading_class: String,
    pub include_expired: bool,
    pub security_id_type: Option<SecurityIdentifierType>,
    pub security_id: Option<String>,
}

fn split_list(text: &str) -> Vec<String> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split(',').map(str::to_string).collect()
    }
}

pub async fn request_contract_data(
    conn: &Arc<ConnectionInner>,
    query: ContractQuery,
) -> ClientResult<PendingCompletion<Vec<Arc<Instrument>>>> {
    let (request_id, completion) = conn.requests.make_pending::<Vec<Arc<Instrument>>>();

    let mut fields = conn.outgoing_fields();
    fields.push_i32(8);
    fields.push_i32(request_id);
    fields.push_i32(query.contract_id);
    fields.push_string(&query.symbol);
    fields.push_string(query.security_type.as_wire());
    fields.push_string(&query.last_trade_date);
    fields.push_f64_opt(query.strike);
    fields.push_string(&query.right);
    fields.push_string(&query.multiplier);
    fields.push_string(&query.exchange);
    fields.push_string(&query.currency);
    fields.push_string(&query.local_symbol);
    fields.push_string(&query.trading_class);
    fields.push_bool(query.include_expired);
    fields.push_string(query.security_id_type.as_ref().map(SecurityIdentifierType::as_wire).unwrap_or(""));
    fields.push_string(query.security_id.as_deref().unwrap_or(""));

    conn.send_message(Outgoing::ReqContractData, fields).await?;
    Ok(completion)
}

pub async fn request_matching_symbols(
    conn: &Arc<ConnectionInner>,
    pattern: &str,
) -> ClientResult<PendingCompletion<Vec<Arc<Instrument>>>> {
    conn.require_feature(features::REQ_MATCHING_SYMBOLS, "symbol search")?;
    let (request_id, completion) = conn.requests.make_pending::<Vec<Arc<Instrument>>>();

    let mut fields = conn.outgoing_fields();
    fields.push_i32(request_id);
    fields.push_string(pattern);

    conn.send_message(Outgoing::ReqMatchingSymbols, fields).await?;
    Ok(completion)
}

pub fn handle_contract_data(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let symbol = cursor.read_string()?;
    let security_type = SecurityType::from_text(&cursor.read_string()?);
    let last_trade_date = cursor.read_string()?;
    let strike = cursor.read_f64()?;
    let right = cursor.read_string()?;
    let exchange = cursor.read_string()?;
    let currency = cursor.read_string()?;
    let local_symbol = cursor.read_string()?;
    let market_name = cursor.read_string()?;
    let trading_class = cursor.read_string()?;
    let contract_id = cursor.read_i32()?.unwrap_or(0);
    let minimum_tick = cursor.read_f64()?;
    let market_data_size_multiplier =
        cursor.read_string_gated(Gates::min_protocol(features::MD_SIZE_MULTIPLIER.value()), String::new())?;
    let multiplier = cursor.read_string()?;
    let order_types = split_list(&cursor.read_string()?);
    let valid_exchanges = split_list(&cursor.read_string()?);
    let price_magnifier = cursor.read_i32()?;
    let underlying_contract_id = cursor.read_i32()?;
    let long_name = cursor.read_string()?;
    let primary_exchange = cursor.read_string()?;
    let contract_month = cursor.read_string()?;
    let industry = cursor.read_string()?;
    let category = cursor.read_string()?;
    let subcategory = cursor.read_string()?;
    let time_zone = cursor.read_string()?;
    let trading_hours = cursor.read_string()?;
    let liquid_hours = cursor.read_string()?;
    let ev_rule = cursor.read_string()?;
    let ev_multiplier = cursor.read_string()?;
    let security_ids = cursor.read_ordered_map(
        |c| Ok(SecurityIdentifierType::from_text(&c.read_string()?)),
        |c| c.read_string(),
    )?;
    let aggregated_group =
        cursor.read_string_gated(Gates::min_protocol(features::AGG_GROUP.value()), String::new())?;

    let (underlying_symbol, underlying_security_type) = if cursor.protocol_version() >= features::UNDERLYING_INFO.value()
    {
        (cursor.read_string()?, Some(SecurityType::from_text(&cursor.read_string()?)))
    } else {
        (String::new(), None)
    };

    let market_rule_ids =
        cursor.read_string_gated(Gates::min_protocol(features::MARKET_RULES.value()), String::new())?;
    let real_expiration_date =
        cursor.read_string_gated(Gates::min_protocol(features::REAL_EXPIRATION_DATE.value()), String::new())?;

    let instrument = conn.instruments.get_or_create(contract_id);
    instrument.with_fields_mut(|f| {
        f.symbol = symbol;
        f.security_type = Some(security_type);
        f.last_trade_date = last_trade_date;
        f.strike = strike;
        f.right = right;
        f.exchange = exchange;
        f.currency = currency;
        f.local_symbol = local_symbol;
        f.market_name = market_name;
        f.trading_class = trading_class;
        f.minimum_tick = minimum_tick;
        f.market_data_size_multiplier = market_data_size_multiplier;
        f.multiplier = multiplier;
        f.order_types = order_types;
        f.valid_exchanges = valid_exchanges;
        f.price_magnifier = price_magnifier;
        f.underlying_contract_id = underlying_contract_id;
        f.long_name = long_name;
        f.primary_exchange = primary_exchange;
        f.contract_month = contract_month;
        f.industry = industry;
        f.category = category;
        f.subcategory = subcategory;
        f.time_zone = time_zone;
        f.trading_hours = trading_hours;
        f.liquid_hours = liquid_hours;
        f.ev_rule = ev_rule;
        f.ev_multiplier = ev_multiplier;
        f.security_ids = security_ids;
        f.aggregated_group = aggregated_group;
        f.underlying_symbol = underlying_symbol;
        f.underlying_security_type = underlying_security_type;
        f.market_rule_ids = market_rule_ids;
        f.real_expiration_date = real_expiration_date;
    });

    conn.handlers.contract.push_row(request_id, instrument);
    Ok(())
}

pub fn handle_contract_data_end(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let rows = conn.handlers.contract.take_rows(request_id);
    conn.requests.resolve(request_id, rows);
    Ok(())
}

pub fn handle_symbol_samples(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let instruments = cursor.read_list(|c| {
        let contract_id = c.read_i32()?.unwrap_or(0);
        let instrument = conn.instruments.get_or_create(contract_id);
        let symbol = c.read_string()?;
        let security_type = SecurityType::from_text(&c.read_string()?);
        let primary_exchange = c.read_string()?;
        let currency = c.read_string()?;
        let _derivative_security_types = c.read_list(|c| c.read_string())?;

        instrument.with_fields_mut(|f| {
            f.symbol = symbol;
            f.security_type = Some(security_type);
            f.primary_exchange = primary_exchange;
            f.currency = currency;
        });
        Ok(instrument)
    })?;

    conn.requests.resolve(request_id, instruments);
    Ok(())
}
