//! The `Connection`: owns the duplex TCP stream, drives the handshake,
//! and runs the single reader task that feeds the dispatcher.

use std::sync::Arc;

use marketlink_core::catalog::Outgoing;
use marketlink_core::codec::OutgoingFields;
use marketlink_core::version::{require_feature, ProtocolVersion, MAX_CLIENT_VERSION, MIN_CLIENT_VERSION};
use marketlink_core::wire::{self, FrameError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::dispatch;
use crate::error::{ClientError, ClientResult};
use crate::handlers::bars::HistoricBar;
use crate::handlers::contract::ContractQuery;
use crate::handlers::executions::{Execution, ExecutionFilter};
use crate::handlers::orders::{Order, OrderFields};
use crate::handlers::positions::PositionEvent;
use crate::handlers::{bars, contract, current_time, executions, market_data, orders, positions, Handlers};
use crate::instrument::Instrument;
use crate::registry::InstrumentRegistry;
use crate::requests::RequestRegistry;
use crate::subscription::EventInstance;

/// Parameters for establishing a Connection. Intentionally just a plain
/// struct: this client carries no file/env configuration layer, since
/// there is nothing here to persist between runs.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub client_id: i32,
    pub optional_capabilities: String,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, port: u16, client_id: i32) -> Self {
        Self {
            host: host.into(),
            port,
            client_id,
            optional_capabilities: String::new(),
        }
    }
}

fn frame_to_client_err(err: FrameError) -> ClientError {
    match err {
        FrameError::Io(io) => ClientError::Transport(io),
        FrameError::Protocol(proto) => ClientError::Protocol(proto),
    }
}

/// Shared connection state reachable from every dispatcher/handler
/// function. Handlers receive `&Arc<ConnectionInner>`.
pub struct ConnectionInner {
    writer: AsyncMutex<Box<dyn AsyncWrite + Send + Unpin>>,
    version: ProtocolVersion,
    pub requests: RequestRegistry,
    pub instruments: InstrumentRegistry,
    pub handlers: Handlers,
}

impl ConnectionInner {
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn require_feature(&self, min_version: ProtocolVersion, feature: &str) -> ClientResult<()> {
        require_feature(self.version, min_version, feature).map_err(|e| ClientError::OutdatedServer {
            feature: Some(e.feature),
        })
    }

    pub(crate) async fn send_message(&self, kind: Outgoing, fields: OutgoingFields) -> ClientResult<()> {
        let mut encoded = vec![kind.wire_id().to_string().into_bytes()];
        encoded.extend(fields.into_bytes());

        let mut writer = self.writer.lock().await;
        wire::write_frame(&mut *writer, &encoded)
            .await
            .map_err(frame_to_client_err)
    }

    pub(crate) fn outgoing_fields(&self) -> OutgoingFields {
        OutgoingFields::new(self.version.value())
    }
}

#[cfg(test)]
impl ConnectionInner {
    /// Build a `ConnectionInner` around an in-memory sink, for tests
    /// that only need to drive the dispatcher/handlers without a real
    /// socket or handshake.
    pub(crate) fn test_instance(version: i32) -> Arc<Self> {
        let (_client, server) = tokio::io::duplex(4096);
        Arc::new_cyclic(|weak| ConnectionInner {
            writer: AsyncMutex::new(Box::new(server)),
            version: ProtocolVersion::new(version),
            requests: RequestRegistry::new(),
            instruments: InstrumentRegistry::new(weak.clone()),
            handlers: Handlers::new(weak.clone()),
        })
    }
}

/// A live connection to the gateway. Dropping this cancels the reader
/// task.
pub struct Connection {
    inner: Arc<ConnectionInner>,
    reader_task: JoinHandle<()>,
}

impl Connection {
    pub async fn connect(options: ConnectOptions) -> ClientResult<Self> {
        let stream = TcpStream::connect((options.host.as_str(), options.port))
            .await
            .map_err(ClientError::Transport)?;
        stream.set_nodelay(true).ok();
        let (read_half, mut write_half) = stream.into_split();

        wire::write_handshake(&mut write_half, MIN_CLIENT_VERSION, MAX_CLIENT_VERSION)
            .await
            .map_err(frame_to_client_err)?;

        let mut read_half = read_half;
        let (version, _server_time, buffered_frames) = negotiate_version(&mut read_half).await?;
        tracing::info!(version = version.value(), "negotiated protocol version");

        let inner = Arc::new_cyclic(|weak| ConnectionInner {
            writer: AsyncMutex::new(Box::new(write_half)),
            version,
            requests: RequestRegistry::new(),
            instruments: InstrumentRegistry::new(weak.clone()),
            handlers: Handlers::new(weak.clone()),
        });

        let mut start_api = inner.outgoing_fields();
        start_api.push_i32(2);
        start_api.push_i32(options.client_id);
        start_api.push_string(&options.optional_capabilities);
        inner.send_message(Outgoing::StartApi, start_api).await?;

        for fields in buffered_frames {
            dispatch::dispatch_frame(&inner, fields);
        }

        let reader_task = spawn_reader(inner.clone(), read_half);

        Ok(Self { inner, reader_task })
    }

    pub fn instruments(&self) -> &InstrumentRegistry {
        &self.inner.instruments
    }

    pub fn version(&self) -> ProtocolVersion {
        self.inner.version
    }

    pub(crate) fn inner(&self) -> &Arc<ConnectionInner> {
        &self.inner
    }

    // Thin wrappers delegating to `handlers::*`. Event-driven subscriptions
    // (market depth, tick-by-tick) need no wrapper here: they are plain
    // `EventInstance` fields on `Instrument`, reached directly or through
    // the free functions in `handlers::depth`/`handlers::tick_by_tick`.

    pub async fn request_current_time(&self) -> ClientResult<i64> {
        current_time::request_current_time(&self.inner).await
    }

    pub async fn request_contract_data(&self, query: ContractQuery) -> ClientResult<Vec<Arc<Instrument>>> {
        contract::request_contract_data(&self.inner, query).await?.wait().await
    }

    pub async fn request_matching_symbols(&self, pattern: &str) -> ClientResult<Vec<Arc<Instrument>>> {
        contract::request_matching_symbols(&self.inner, pattern).await?.wait().await
    }

    pub async fn subscribe_market_data(
        &self,
        instrument: &Arc<Instrument>,
        generic_tick_list: &str,
        snapshot: bool,
        regulatory_snapshot: bool,
    ) -> ClientResult<()> {
        market_data::subscribe_market_data(&self.inner, instrument, generic_tick_list, snapshot, regulatory_snapshot)
            .await?
            .wait()
            .await
    }

    pub async fn cancel_market_data(&self, instrument: &Arc<Instrument>) -> ClientResult<()> {
        market_data::cancel_market_data(&self.inner, instrument).await
    }

    pub async fn subscribe_realtime_bars(
        &self,
        instrument: &Arc<Instrument>,
        what_to_show: &str,
        use_rth: bool,
    ) -> ClientResult<()> {
        bars::subscribe_realtime_bars(&self.inner, instrument, what_to_show, use_rth).await
    }

    pub async fn unsubscribe_realtime_bars(&self, instrument: &Arc<Instrument>) -> ClientResult<()> {
        bars::unsubscribe_realtime_bars(&self.inner, instrument).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn request_historical_data(
        &self,
        instrument: &Arc<Instrument>,
        end_date_time: &str,
        duration: &str,
        bar_size_setting: &str,
        what_to_show: &str,
        use_rth: bool,
        keep_up_to_date: bool,
    ) -> ClientResult<Vec<HistoricBar>> {
        bars::request_historical_data(
            &self.inner,
            instrument,
            end_date_time,
            duration,
            bar_size_setting,
            what_to_show,
            use_rth,
            keep_up_to_date,
        )
        .await
    }

    pub async fn cancel_historical_data(&self, request_id: i32) -> ClientResult<()> {
        bars::cancel_historical_data(&self.inner, request_id).await
    }

    pub async fn place_order(&self, fields: OrderFields) -> ClientResult<Arc<Order>> {
        orders::place_order(&self.inner, fields).await?.wait().await
    }

    pub async fn cancel_order(&self, order_id: i32) -> ClientResult<()> {
        orders::cancel_order(&self.inner, order_id).await
    }

    pub async fn get_open_orders(&self) -> ClientResult<Vec<Arc<Order>>> {
        orders::get_open_orders(&self.inner).await
    }

    pub async fn get_positions(&self) -> ClientResult<Vec<PositionEvent>> {
        positions::get_positions(&self.inner).await
    }

    /// Connection-wide position updates, live for as long as anything
    /// (this stream, `get_positions`, or another handler) is attached.
    pub fn on_position(&self) -> &EventInstance<PositionEvent> {
        &self.inner.handlers.positions.on_position
    }

    pub async fn get_executions(&self, filter: ExecutionFilter) -> ClientResult<Vec<Execution>> {
        executions::get_executions(&self.inner, filter).await?.wait().await
    }

    /// Connection-wide fanout of every execution reported on this
    /// connection, regardless of which instrument or order it belongs to.
    pub fn on_execution(&self) -> &EventInstance<Execution> {
        &self.inner.handlers.executions.on_execution
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Read frames until the version-negotiation response (a frame with
/// exactly two fields: chosen version, server time) arrives. Any frames
/// observed before it are buffered and replayed into the dispatcher
/// once the Connection exists and its negotiated version is known.
async fn negotiate_version<R>(reader: &mut R) -> ClientResult<(ProtocolVersion, String, Vec<Vec<String>>)>
where
    R: AsyncRead + Unpin,
{
    let mut buffered = Vec::new();
    loop {
        let fields = wire::read_frame(reader).await.map_err(frame_to_client_err)?;
        if fields.len() == 2 {
            let version: i32 = fields[0]
                .parse()
                .map_err(|_| ClientError::Protocol(marketlink_core::ProtocolError::BadInteger(fields[0].clone())))?;
            return Ok((ProtocolVersion::new(version), fields[1].clone(), buffered));
        }
        buffered.push(fields);
    }
}

fn spawn_reader<R>(inner: Arc<ConnectionInner>, mut reader: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match wire::read_frame(&mut reader).await {
                Ok(fields) => dispatch::dispatch_frame(&inner, fields),
                Err(FrameError::Io(io)) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::info!("connection closed by peer");
                    inner.requests.fail_all(|| ClientError::Transport(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)));
                    return;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read frame, dropping connection");
                    inner.requests.fail_all(|| ClientError::Transport(std::io::Error::other(err.to_string())));
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn negotiate_version_parses_two_field_response() {
        let (mut client, mut server) = duplex(4096);
        let write_task = tokio::spawn(async move {
            wire::write_frame(&mut server, &[b"187".to_vec(), b"1524957956".to_vec()])
                .await
                .unwrap();
        });

        let (version, server_time, buffered) = negotiate_version(&mut client).await.unwrap();
        assert_eq!(version.value(), 187);
        assert_eq!(server_time, "1524957956");
        assert!(buffered.is_empty());
        write_task.await.unwrap();
    }

    #[tokio::test]
    async fn negotiate_version_buffers_frames_seen_before_the_response() {
        let (mut client, mut server) = duplex(4096);
        let write_task = tokio::spawn(async move {
            wire::write_frame(&mut server, &[b"2104".to_vec(), b"-1".to_vec(), b"note".to_vec()])
                .await
                .unwrap();
            wire::write_frame(&mut server, &[b"150".to_vec(), b"1524957956".to_vec()])
                .await
                .unwrap();
        });

        let (version, _, buffered) = negotiate_version(&mut client).await.unwrap();
        assert_eq!(version.value(), 150);
        assert_eq!(buffered.len(), 1);
        assert_eq!(buffered[0], vec!["2104", "-1", "note"]);
        write_task.await.unwrap();
    }
}
