//! Real-time and historical bars: `REQ_REAL_TIME_BARS`/`REAL_TIME_BARS`
//! and `REQ_HISTORICAL_DATA`/`HISTORICAL_DATA`.
//!
//! Real-time bars are an explicit async subscribe/cancel pair (mirroring
//! [`crate::handlers::market_data`]) rather than the event-driven style
//! used for market depth and tick-by-tick: the gateway only ever streams
//! one five-second bar series per request, with no natural
//! "last subscriber gone" trigger to hang off an `EventInstance`.
//!
//! Historical data has no request/response shape documented in the
//! retrieved source this client was grounded on; the outgoing field
//! order here is extrapolated from the well-known gateway wire format
//! (see DESIGN.md) rather than ported line-for-line from a reference
//! implementation.

use std::sync::Arc;

use dashmap::DashMap;
use marketlink_core::catalog::Outgoing;
use marketlink_core::codec::{FieldCursor, Gates};
use marketlink_core::version::features;
use marketlink_core::ProtocolError;

use crate::connection::ConnectionInner;
use crate::error::{ClientError, ClientResult};
use crate::instrument::Instrument;
use crate::requests::RequestId;

/// A single OHLCV bar. Used for both the real-time bar stream and each
/// element of a historical data response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub average: f64,
    pub count: i32,
}

/// A historical bar additionally carries `has_gaps`, present on the wire
/// only below the synthetic-realtime-bars protocol version.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoricBar {
    pub bar: Bar,
    pub has_gaps: bool,
}

pub struct BarsHandlerState {
    realtime_by_request_id: DashMap<RequestId, Arc<Instrument>>,
}

impl BarsHandlerState {
    pub fn new() -> Self {
        Self {
            realtime_by_request_id: DashMap::new(),
        }
    }
}

fn parse_timestamp(text: &str) -> ClientResult<i64> {
    text.parse::<i64>()
        .map_err(|_| ClientError::Protocol(ProtocolError::BadInteger(text.to_string())))
}

fn read_bar(cursor: &mut FieldCursor, historic: bool) -> ClientResult<HistoricBar> {
    let time = parse_timestamp(&cursor.read_string()?)?;
    let open = cursor.read_f64()?.unwrap_or(0.0);
    let high = cursor.read_f64()?.unwrap_or(0.0);
    let low = cursor.read_f64()?.unwrap_or(0.0);
    let close = cursor.read_f64()?.unwrap_or(0.0);
    let volume = cursor.read_f64()?.unwrap_or(0.0);
    let average = cursor.read_f64()?.unwrap_or(0.0);
    let has_gaps = if historic {
        cursor
            .read_bool_gated(Gates {
                max_protocol_version: Some(features::SYNT_REALTIME_BARS.value()),
                ..Gates::NONE
            })?
            .unwrap_or(false)
    } else {
        false
    };
    let count = cursor.read_i32()?.unwrap_or(0);

    Ok(HistoricBar {
        bar: Bar {
            time,
            open,
            high,
            low,
            close,
            volume,
            average,
            count,
        },
        has_gaps,
    })
}

/// Fixed bar size the gateway accepts for the real-time bar stream; it
/// has never supported any value other than five-second bars.
const REALTIME_BAR_SIZE_SECONDS: i32 = 5;

fn push_contract_fields(fields: &mut marketlink_core::codec::OutgoingFields, instrument: &Arc<Instrument>) {
    let f = instrument.fields();
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
}

pub async fn subscribe_realtime_bars(
    conn: &Arc<ConnectionInner>,
    instrument: &Arc<Instrument>,
    what_to_show: &str,
    use_rth: bool,
) -> ClientResult<()> {
    let request_id = conn.requests.next_request_id();
    instrument.set_realtime_bars_request_id(request_id);
    conn.handlers.bars.realtime_by_request_id.insert(request_id, instrument.clone());

    let mut fields = conn.outgoing_fields();
    fields.push_i32(3);
    fields.push_i32(request_id);
    push_contract_fields(&mut fields, instrument);
    fields.push_i32(REALTIME_BAR_SIZE_SECONDS);
    fields.push_string(what_to_show);
    fields.push_bool(use_rth);
    // Real-time bar options: undocumented by the gateway, always empty.
    fields.push_list(&Vec::<String>::new(), |o, v: &String| o.push_string(v));

    conn.send_message(Outgoing::ReqRealTimeBars, fields).await
}

pub async fn unsubscribe_realtime_bars(conn: &Arc<ConnectionInner>, instrument: &Arc<Instrument>) -> ClientResult<()> {
    let Some(request_id) = instrument.realtime_bars_request_id() else {
        return Ok(());
    };
    let mut fields = conn.outgoing_fields();
    fields.push_i32(3);
    fields.push_i32(request_id);
    conn.send_message(Outgoing::CancelRealTimeBars, fields).await?;

    conn.handlers.bars.realtime_by_request_id.remove(&request_id);
    instrument.clear_realtime_bars_request_id();
    Ok(())
}

pub fn handle_real_time_bars(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let bar = read_bar(cursor, false)?.bar;

    if let Some(instrument) = conn.handlers.bars.realtime_by_request_id.get(&request_id).map(|e| e.clone()) {
        instrument.on_realtime_bar.emit(&bar);
    } else {
        tracing::warn!(request_id, "real time bar for unknown subscription");
    }
    Ok(())
}

/// Request a block of historical bars. Resolves once `HISTORICAL_DATA`
/// for this request id arrives in full; the gateway sends the whole
/// block as a single message rather than streaming individual bars.
pub async fn request_historical_data(
    conn: &Arc<ConnectionInner>,
    instrument: &Arc<Instrument>,
    end_date_time: &str,
    duration: &str,
    bar_size_setting: &str,
    what_to_show: &str,
    use_rth: bool,
    keep_up_to_date: bool,
) -> ClientResult<Vec<HistoricBar>> {
    let (request_id, pending) = conn.requests.make_pending::<Vec<HistoricBar>>();

    let mut fields = conn.outgoing_fields();
    fields.push_i32(request_id);
    push_contract_fields(&mut fields, instrument);
    fields.push_bool(false); // include expired contracts: never requested
    fields.push_string(end_date_time);
    fields.push_string(bar_size_setting);
    fields.push_string(duration);
    fields.push_bool(use_rth);
    fields.push_string(what_to_show);
    fields.push_i32(2); // format_date: always string ("yyyymmdd  hh:mm:ss")
    fields.push_bool(keep_up_to_date);
    // Chart options: undocumented by the gateway, always empty.
    fields.push_list(&Vec::<String>::new(), |o, v: &String| o.push_string(v));

    conn.send_message(Outgoing::ReqHistoricalData, fields).await?;
    pending.wait().await
}

/// Cancel a historical data request. Fails the pending completion first
/// so a response already in flight resolves into a dead slot and is
/// silently dropped rather than delivered after the caller gave up.
pub async fn cancel_historical_data(conn: &Arc<ConnectionInner>, request_id: RequestId) -> ClientResult<()> {
    conn.requests.fail(request_id, ClientError::Canceled);

    let mut fields = conn.outgoing_fields();
    fields.push_i32(1);
    fields.push_i32(request_id);
    conn.send_message(Outgoing::CancelHistoricalData, fields).await
}

pub fn handle_historical_data(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let request_id = cursor.read_request_id()?;
    let _start = cursor.read_string()?;
    let _end = cursor.read_string()?;
    let bars = cursor.read_list(|c| read_bar(c, true).map_err(|_| ProtocolError::UnsupportedFieldType))?;

    conn.requests.resolve(request_id, bars);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(fields: &[&str], protocol_version: i32) -> FieldCursor<'_> {
        let owned: &'static [String] = Box::leak(
            fields
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        );
        FieldCursor::new(owned, protocol_version, 0)
    }

    #[test]
    fn historic_bar_reads_has_gaps_below_synt_realtime_bars() {
        let mut c = cursor(&["20240115", "1.0", "2.0", "0.5", "1.5", "100", "1.2", "1", "9"], 100);
        let historic = read_bar(&mut c, true).unwrap();
        assert!(historic.has_gaps);
        assert_eq!(historic.bar.count, 9);
    }

    #[test]
    fn historic_bar_omits_has_gaps_at_or_above_synt_realtime_bars() {
        let mut c = cursor(&["20240115", "1.0", "2.0", "0.5", "1.5", "100", "1.2", "9"], 200);
        let historic = read_bar(&mut c, true).unwrap();
        assert!(!historic.has_gaps);
        assert_eq!(historic.bar.count, 9);
    }

    #[test]
    fn realtime_bar_never_reads_has_gaps() {
        let mut c = cursor(&["20240115", "1.0", "2.0", "0.5", "1.5", "100", "1.2", "9"], 100);
        let bar = read_bar(&mut c, false).unwrap().bar;
        assert_eq!(bar.count, 9);
        assert_eq!(bar.time, 20240115);
    }
}
