//! Dispatcher (C6): peel an incoming frame's header (kind, message
//! version) and route the remaining fields to the handler registered
//! for that message kind.
//!
//! This is the one place that knows every incoming message kind this
//! client wires up; there is no reflection or signature inspection,
//! just an explicit match over [`Incoming`].

use std::sync::Arc;

use marketlink_core::catalog::Incoming;
use marketlink_core::codec::FieldCursor;

use crate::connection::ConnectionInner;
use crate::error::{is_informational, ClientError};
use crate::handlers::{bars, contract, current_time, depth, executions, market_data, orders, positions, tick_by_tick};

/// Decode one frame's header and dispatch the rest of its fields to the
/// matching handler. A handler failure is logged and dropped rather
/// than propagated: one malformed or unexpected message must never tear
/// down the reader task.
pub fn dispatch_frame(conn: &Arc<ConnectionInner>, fields: Vec<String>) {
    if fields.is_empty() {
        tracing::warn!("received an empty frame");
        return;
    }

    let kind_value: i32 = match fields[0].parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(raw = %fields[0], "malformed message kind field");
            return;
        }
    };

    let kind = match Incoming::from_wire(kind_value) {
        Ok(kind) => kind,
        Err(err) => {
            tracing::debug!(error = %err, "unknown message kind, dropping frame");
            return;
        }
    };

    let protocol_version = conn.version().value();
    let (message_version, body_start) = if kind.has_message_version() {
        match fields.get(1).and_then(|v| v.parse::<i32>().ok()) {
            Some(version) => (version, 2),
            None => {
                tracing::warn!(?kind, "missing or malformed message version field");
                return;
            }
        }
    } else {
        (protocol_version, 1)
    };

    let mut cursor = FieldCursor::new(&fields[body_start..], protocol_version, message_version);

    let result = match kind {
        Incoming::ErrMsg => handle_error(conn, &mut cursor),
        Incoming::CurrentTime => current_time::handle_current_time(conn, &mut cursor),
        Incoming::NextValidId => orders::handle_next_valid_id(conn, &mut cursor),
        Incoming::TickPrice => market_data::handle_tick_price(conn, &mut cursor),
        Incoming::TickSize => market_data::handle_tick_size(conn, &mut cursor),
        Incoming::TickGeneric => market_data::handle_tick_generic(conn, &mut cursor),
        Incoming::TickString => market_data::handle_tick_string(conn, &mut cursor),
        Incoming::TickReqParams => market_data::handle_tick_req_params(conn, &mut cursor),
        Incoming::TickSnapshotEnd => market_data::handle_tick_snapshot_end(conn, &mut cursor),
        Incoming::MarketDepth => depth::handle_market_depth(conn, &mut cursor),
        Incoming::MarketDepthL2 => depth::handle_market_depth_l2(conn, &mut cursor),
        Incoming::RealTimeBars => bars::handle_real_time_bars(conn, &mut cursor),
        Incoming::HistoricalData => bars::handle_historical_data(conn, &mut cursor),
        Incoming::TickByTick => tick_by_tick::handle_tick_by_tick(conn, &mut cursor),
        Incoming::ContractData => contract::handle_contract_data(conn, &mut cursor),
        Incoming::ContractDataEnd => contract::handle_contract_data_end(conn, &mut cursor),
        Incoming::SymbolSamples => contract::handle_symbol_samples(conn, &mut cursor),
        Incoming::OrderStatus => orders::handle_order_status(conn, &mut cursor),
        Incoming::OpenOrder => orders::handle_open_order(conn, &mut cursor),
        Incoming::OpenOrderEnd => orders::handle_open_order_end(conn),
        Incoming::PositionData => positions::handle_position_data(conn, &mut cursor),
        Incoming::PositionEnd => positions::handle_position_end(conn),
        Incoming::ExecutionData => executions::handle_execution_data(conn, &mut cursor),
        Incoming::ExecutionDataEnd => executions::handle_execution_data_end(conn, &mut cursor),
        Incoming::CommissionReport => executions::handle_commission_report(conn, &mut cursor),
        other => {
            tracing::debug!(?other, "no handler registered for this message kind, dropping");
            Ok(())
        }
    };

    if let Err(err) = result {
        tracing::warn!(?kind, error = %err, "handler failed, dropping frame");
    }
}

/// `ERROR` carries `(request_id, code, message)`. Codes in the
/// informational allowlist (farm connection notices, harmless
/// warnings) are logged at info; otherwise, if a pending completion
/// matches the id, it fails with that code/message; otherwise the
/// error is logged at warning. Order ids and request ids share the
/// same pending-completion table, which is how an `ERROR` naming an
/// order id fails `place_order`'s completion.
fn handle_error(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> Result<(), ClientError> {
    let request_id = cursor.read_request_id()?;
    let code = cursor.read_i32()?.unwrap_or(0);
    let message = cursor.read_string()?;

    if is_informational(code) {
        tracing::info!(request_id, code, message, "informational server notice");
        return Ok(());
    }

    if conn.requests.is_pending(request_id) {
        conn.requests.fail(request_id, ClientError::Api { code, message });
    } else {
        tracing::warn!(request_id, code, message, "server error with no matching pending request");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionInner;
    use std::sync::Arc;

    fn test_connection(version: i32) -> Arc<ConnectionInner> {
        ConnectionInner::test_instance(version)
    }

    #[tokio::test]
    async fn unknown_kind_is_dropped_without_panicking() {
        let conn = test_connection(150);
        dispatch_frame(&conn, vec!["999999".to_string()]);
    }

    #[tokio::test]
    async fn empty_frame_is_dropped_without_panicking() {
        let conn = test_connection(150);
        dispatch_frame(&conn, Vec::new());
    }

    #[tokio::test]
    async fn error_fails_pending_request_by_id() {
        let conn = test_connection(150);
        let (id, pending) = conn.requests.make_pending::<()>();
        // ERROR is in the message-version-prefixed set: kind, msg version, request_id, code, message.
        dispatch_frame(&conn, vec!["4".to_string(), "2".to_string(), id.to_string(), "-10".to_string(), "Something went wrong".to_string()]);
        let err = pending.wait().await.unwrap_err();
        assert!(matches!(err, ClientError::Api { code: -10, .. }));
    }

    #[tokio::test]
    async fn informational_error_does_not_fail_a_pending_request() {
        let conn = test_connection(150);
        let (id, pending) = conn.requests.make_pending::<()>();
        dispatch_frame(&conn, vec!["4".to_string(), "2".to_string(), id.to_string(), "2104".to_string(), "Market data farm connection is OK".to_string()]);
        conn.requests.resolve(id, ());
        assert!(pending.wait().await.is_ok());
    }

    #[tokio::test]
    async fn error_with_unknown_request_id_is_logged_and_ignored() {
        let conn = test_connection(150);
        let (id, pending) = conn.requests.make_pending::<()>();
        dispatch_frame(&conn, vec!["4".to_string(), "2".to_string(), "44".to_string(), "-5".to_string(), "unrelated".to_string()]);
        conn.requests.resolve(id, ());
        assert!(pending.wait().await.is_ok());
    }
}
