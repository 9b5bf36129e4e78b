//! TCP client transport.
//!
//! One [`ClientTransport`] owns at most one live connection to one endpoint.
//! All callers share it: writes go through a single writer task, responses
//! come back through a single reader task that fulfills the correlation
//! table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rpcprims_codec::Codec;
use rpcprims_frame::{FrameCodec, FrameError};
use rpcprims_transport::{configure_stream, connect_with_retry};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::correlation::{CorrelationSnapshot, CorrelationStats, CorrelationTable};
use crate::error::{Result, RpcError};
use crate::protocol::{Request, Response};

type FrameSink = SplitSink<Framed<TcpStream, FrameCodec>, Bytes>;
type FrameStream = SplitStream<Framed<TcpStream, FrameCodec>>;

const WRITE_QUEUE_DEPTH: usize = 256;

/// One physical connection and the calls pending on it.
struct Connection {
    writer: mpsc::Sender<Bytes>,
    table: Arc<CorrelationTable>,
    closed: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl Connection {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        self.reader_task.abort();
        self.writer_task.abort();
        self.table.fail_all()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Client side of one endpoint.
pub struct ClientTransport {
    addr: String,
    config: ClientConfig,
    stats: Arc<CorrelationStats>,
    conn: Mutex<Option<Arc<Connection>>>,
}

impl ClientTransport {
    /// Transport for `addr` (`host:port`). Nothing is opened until the first
    /// call or an explicit [`connect`](Self::connect).
    pub fn new(addr: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
            stats: Arc::new(CorrelationStats::default()),
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn codec(&self) -> Codec {
        self.config.codec
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Counters over every connection this transport has opened.
    pub fn stats(&self) -> CorrelationSnapshot {
        self.stats.snapshot()
    }

    /// Calls currently waiting for a response.
    pub async fn pending_count(&self) -> usize {
        match self.conn.lock().await.as_ref() {
            Some(conn) => conn.table.pending_count(),
            None => 0,
        }
    }

    /// True if a live connection is open.
    pub async fn is_connected(&self) -> bool {
        matches!(self.conn.lock().await.as_ref(), Some(conn) if !conn.is_closed())
    }

    /// Open the connection if there is no live one. Idempotent.
    pub async fn connect(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    /// Send `request` and wait up to `timeout` for its response.
    ///
    /// The deadline covers queueing the request as well as waiting for the
    /// answer. A request too large for one frame fails this call only. A lost
    /// connection fails this call; the next call opens a new one. Nothing is
    /// retried.
    pub async fn send(&self, request: Request, timeout: Duration) -> Result<Response> {
        let deadline = Instant::now() + timeout;
        let payload = self.config.codec.serialize(&request)?;
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            }
            .into());
        }

        let conn = self.connection().await?;
        let pending = conn.table.register(request.correlation_id.clone())?;
        if conn.is_closed() {
            conn.table.release(pending.id());
            return Err(RpcError::Connection(format!(
                "connection to {} closed",
                self.addr
            )));
        }

        match tokio::time::timeout_at(deadline, conn.writer.send(Bytes::from(payload))).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                conn.table.release(pending.id());
                return Err(RpcError::Connection(format!(
                    "connection to {} closed",
                    self.addr
                )));
            }
            Err(_) => {
                warn!(
                    correlation_id = %request.correlation_id,
                    addr = %self.addr,
                    "write queue stayed full past the call deadline"
                );
                // A zero wait records the timeout and releases the entry.
                let _ = conn.table.wait(pending, Duration::ZERO).await;
                return Err(RpcError::Timeout(timeout));
            }
        }

        debug!(
            correlation_id = %request.correlation_id,
            method = %request.method_name,
            addr = %self.addr,
            "request sent"
        );
        let remaining = deadline.saturating_duration_since(Instant::now());
        conn.table
            .wait(pending, remaining)
            .await
            .map_err(|err| match err {
                RpcError::Timeout(_) => RpcError::Timeout(timeout),
                other => other,
            })
    }

    /// Close the connection, failing every pending call.
    pub async fn close(&self) {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            let failed = conn.close();
            debug!(addr = %self.addr, failed, "client connection closed");
        }
    }

    async fn connection(&self) -> Result<Arc<Connection>> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            if !conn.is_closed() {
                return Ok(Arc::clone(conn));
            }
        }

        let conn = Arc::new(self.open().await?);
        *guard = Some(Arc::clone(&conn));
        Ok(conn)
    }

    async fn open(&self) -> Result<Connection> {
        let stream = connect_with_retry(&self.addr, &self.config.retry)
            .await
            .map_err(|err| RpcError::Connection(err.to_string()))?;
        configure_stream(&stream)?;
        debug!(addr = %self.addr, "client connection opened");

        let framed = Framed::new(stream, FrameCodec::with_config(self.config.frame_config()));
        let (sink, frames) = framed.split();

        let table = Arc::new(CorrelationTable::with_stats(Arc::clone(&self.stats)));
        let closed = Arc::new(AtomicBool::new(false));
        let (writer, queue) = mpsc::channel(WRITE_QUEUE_DEPTH);

        let writer_task = tokio::spawn(write_loop(
            sink,
            queue,
            Arc::clone(&table),
            Arc::clone(&closed),
            self.addr.clone(),
        ));
        let reader_task = tokio::spawn(read_loop(
            frames,
            self.config.codec,
            Arc::clone(&table),
            Arc::clone(&closed),
            self.addr.clone(),
        ));

        Ok(Connection {
            writer,
            table,
            closed,
            reader_task,
            writer_task,
        })
    }
}

impl std::fmt::Debug for ClientTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTransport")
            .field("addr", &self.addr)
            .field("codec", &self.config.codec)
            .finish_non_exhaustive()
    }
}

async fn write_loop(
    mut sink: FrameSink,
    mut queue: mpsc::Receiver<Bytes>,
    table: Arc<CorrelationTable>,
    closed: Arc<AtomicBool>,
    addr: String,
) {
    while let Some(frame) = queue.recv().await {
        if let Err(err) = sink.send(frame).await {
            warn!(%addr, error = %err, "request write failed");
            break;
        }
    }
    mark_lost(&table, &closed, &addr);
}

async fn read_loop(
    mut frames: FrameStream,
    codec: Codec,
    table: Arc<CorrelationTable>,
    closed: Arc<AtomicBool>,
    addr: String,
) {
    loop {
        let frame = match frames.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                warn!(%addr, error = %err, "response stream failed");
                break;
            }
            None => {
                debug!(%addr, "server closed connection");
                break;
            }
        };

        match codec.deserialize::<Response>(&frame) {
            Ok(response) => {
                let correlation_id = response.correlation_id.clone();
                table.fulfill(&correlation_id, response);
            }
            Err(err) => {
                warn!(%addr, error = %err, "undecodable response; dropping connection");
                break;
            }
        }
    }
    mark_lost(&table, &closed, &addr);
}

fn mark_lost(table: &CorrelationTable, closed: &AtomicBool, addr: &str) {
    closed.store(true, Ordering::SeqCst);
    let failed = table.fail_all();
    if failed > 0 {
        warn!(%addr, failed, "connection lost; failed pending calls");
    }
}
