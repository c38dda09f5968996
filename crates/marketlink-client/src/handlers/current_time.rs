//! Current time request/reply.
//!
//! `CURRENT_TIME` is the simplest request/reply flow and the odd one
//! out: its incoming frame carries no request id at all
//! (`["49","1","1524957956"]` is kind, message version, timestamp --
//! nothing else). It cannot use the request registry's id-keyed
//! completions, so it gets its own tiny FIFO of waiters instead.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use marketlink_core::codec::FieldCursor;
use marketlink_core::ProtocolError;
use tokio::sync::oneshot;

use crate::connection::ConnectionInner;
use crate::error::{ClientError, ClientResult};
use marketlink_core::catalog::Outgoing;

pub struct CurrentTimeHandlerState {
    pending: Mutex<VecDeque<oneshot::Sender<i64>>>,
}

impl CurrentTimeHandlerState {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
        }
    }
}

pub async fn request_current_time(conn: &Arc<ConnectionInner>) -> ClientResult<i64> {
    let (tx, rx) = oneshot::channel();
    conn.handlers.current_time.pending.lock().unwrap().push_back(tx);

    let mut fields = conn.outgoing_fields();
    fields.push_i32(1);
    conn.send_message(Outgoing::ReqCurrentTime, fields).await?;

    rx.await.map_err(|_| ClientError::Canceled)
}

pub fn handle_current_time(conn: &Arc<ConnectionInner>, cursor: &mut FieldCursor) -> ClientResult<()> {
    let text = cursor.read_string()?;
    let timestamp: i64 = text.parse().map_err(|_| ClientError::Protocol(ProtocolError::BadInteger(text)))?;

    match conn.handlers.current_time.pending.lock().unwrap().pop_front() {
        Some(tx) => {
            let _ = tx.send(timestamp);
        }
        None => tracing::warn!(timestamp, "current time reply with no pending request"),
    }
    Ok(())
}
