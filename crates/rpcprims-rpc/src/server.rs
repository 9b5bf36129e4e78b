//! TCP server transport.
//!
//! Accepts connections, decodes request frames and dispatches each request on
//! its own task, so responses may leave a connection in a different order
//! than the requests arrived.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use rpcprims_codec::Codec;
use rpcprims_frame::{FrameCodec, FrameConfig, FrameError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, RpcError};
use crate::protocol::{FaultKind, Request, Response, RpcFault};
use crate::service::ImplementationLookup;

/// Lifecycle of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Listening,
    ShuttingDown,
    Stopped,
}

/// Handle to a running server. Dropping it aborts the server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    state_rx: watch::Receiver<ServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        *self.state_rx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ServerState::Listening
    }

    /// Wait until the server accepts connections.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut state_rx = self.state_rx.clone();
        let state = state_rx
            .wait_for(|state| *state != ServerState::Starting)
            .await
            .map(|state| *state)
            .unwrap_or(ServerState::Stopped);
        if state == ServerState::Listening {
            Ok(())
        } else {
            Err(RpcError::Connection(format!(
                "server stopped before becoming ready ({state:?})"
            )))
        }
    }

    /// Stop accepting, close open connections and wait for the accept loop.
    pub async fn shutdown(mut self) {
        self.signal_shutdown();
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }

    fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.signal_shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Per-connection settings shared by every connection task.
#[derive(Debug, Clone)]
struct ConnectionSettings {
    codec: Codec,
    frame_config: FrameConfig,
    max_in_flight: usize,
    drain_timeout: Duration,
}

/// RPC server transport.
pub struct RpcServer;

impl RpcServer {
    /// Bind `config.bind_addr()` and start serving `lookup`.
    ///
    /// Returns once the listener is bound; the handle reports `Listening`.
    pub async fn start(
        config: ServerConfig,
        lookup: Arc<dyn ImplementationLookup>,
    ) -> Result<ServerHandle> {
        let (state_tx, state_rx) = watch::channel(ServerState::Starting);

        let listener = rpcprims_transport::bind(&config.bind_addr()).await?;
        let local_addr = listener
            .local_addr()
            .map_err(rpcprims_transport::TransportError::Io)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);

        let settings = ConnectionSettings {
            codec: config.codec,
            frame_config: config.frame_config(),
            max_in_flight: config.max_in_flight_per_connection.max(1),
            drain_timeout: config.drain_timeout,
        };

        let _ = state_tx.send(ServerState::Listening);
        info!(addr = %local_addr, codec = %config.codec, "rpc server listening");

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            lookup,
            settings,
            config.max_connections,
            state_tx,
            shutdown_rx,
            conn_shutdown_rx,
        ));

        Ok(ServerHandle {
            local_addr,
            state_rx,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        lookup: Arc<dyn ImplementationLookup>,
        settings: ConnectionSettings,
        max_connections: usize,
        state_tx: watch::Sender<ServerState>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
    ) {
        let active_connections = Arc::new(AtomicUsize::new(0));

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    let _ = state_tx.send(ServerState::ShuttingDown);
                    info!("rpc server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            error!(error = %err, "rpc accept error");
                            continue;
                        }
                    };

                    if active_connections.load(Ordering::Relaxed) >= max_connections {
                        warn!(%peer, max = max_connections, "rejecting rpc connection: at capacity");
                        continue;
                    }

                    active_connections.fetch_add(1, Ordering::Relaxed);
                    let conns = Arc::clone(&active_connections);
                    let lookup = Arc::clone(&lookup);
                    let settings = settings.clone();
                    let conn_shutdown = conn_shutdown_rx.clone();

                    tokio::spawn(async move {
                        debug!(%peer, "rpc connection accepted");
                        match Self::handle_connection(stream, peer, lookup, settings, conn_shutdown).await {
                            Ok(()) => debug!(%peer, "rpc connection closed"),
                            Err(err) => warn!(%peer, error = %err, "rpc connection closed on protocol error"),
                        }
                        conns.fetch_sub(1, Ordering::Relaxed);
                    });
                }
            }
        }

        drop(listener);
        let _ = state_tx.send(ServerState::Stopped);
        info!("rpc server stopped");
    }

    async fn handle_connection(
        stream: TcpStream,
        peer: SocketAddr,
        lookup: Arc<dyn ImplementationLookup>,
        settings: ConnectionSettings,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        rpcprims_transport::configure_stream(&stream)?;
        let codec = settings.codec;
        let max_payload = settings.frame_config.max_payload_size;
        let framed = Framed::new(stream, FrameCodec::with_config(settings.frame_config));
        let (mut sink, mut frames) = framed.split();

        let (tx, mut rx) = mpsc::channel::<Bytes>(settings.max_in_flight);
        // Resolves once the writer is gone, whatever the reason.
        let (writer_done_tx, mut writer_done) = oneshot::channel::<()>();
        let mut writer = tokio::spawn(async move {
            let _done = writer_done_tx;
            while let Some(frame) = rx.recv().await {
                sink.send(frame).await?;
            }
            Ok::<(), FrameError>(())
        });

        let permits = Arc::new(Semaphore::new(settings.max_in_flight));
        let result = loop {
            let frame = tokio::select! {
                next = frames.next() => match next {
                    Some(Ok(frame)) => frame,
                    Some(Err(err)) => break Err(RpcError::from(err)),
                    None => break Ok(()),
                },
                _ = shutdown_rx.changed() => break Ok(()),
                _ = &mut writer_done => break Ok(()),
            };

            let request: Request = match codec.deserialize(&frame) {
                Ok(request) => request,
                Err(err) => break Err(RpcError::from(err)),
            };

            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break Ok(());
            };

            debug!(
                %peer,
                correlation_id = %request.correlation_id,
                interface = %request.target_interface,
                method = %request.method_name,
                "dispatching request"
            );

            let lookup = Arc::clone(&lookup);
            let tx = tx.clone();
            tokio::spawn(async move {
                let correlation_id = request.correlation_id.clone();
                // A panicking handler becomes an application fault.
                let response = match tokio::spawn(dispatch(lookup, codec, request)).await {
                    Ok(response) => response,
                    Err(err) => Response::fault(
                        correlation_id.clone(),
                        RpcFault::new(FaultKind::Application, format!("handler failed: {err}")),
                    ),
                };
                let payload = encode_response(codec, response, max_payload);
                if tx.send(Bytes::from(payload)).await.is_err() {
                    debug!(%correlation_id, "connection gone before response was written");
                }
                drop(permit);
            });
        };

        // Stop reading, then give in-flight responses a bounded window to
        // flush. The socket closes once the writer drops its half.
        drop(frames);
        drop(tx);
        let written = match tokio::time::timeout(settings.drain_timeout, &mut writer).await {
            Ok(Ok(written)) => written.map_err(RpcError::from),
            Ok(Err(err)) => {
                debug!(%peer, error = %err, "rpc response writer aborted");
                Ok(())
            }
            Err(_) => {
                warn!(
                    %peer,
                    timeout = ?settings.drain_timeout,
                    "in-flight requests outlived drain; closing"
                );
                writer.abort();
                Ok(())
            }
        };
        result.and(written)
    }
}

/// Run one request against the implementation it names.
async fn dispatch(
    lookup: Arc<dyn ImplementationLookup>,
    codec: Codec,
    request: Request,
) -> Response {
    let correlation_id = request.correlation_id.clone();

    if let Err(fault) = request.validate() {
        return Response::fault(correlation_id, fault);
    }

    let Some(export) = lookup.get_implementation(&request.implementation_ref) else {
        return Response::fault(
            correlation_id,
            RpcFault::dispatch(format!(
                "no implementation registered as '{}'",
                request.implementation_ref
            )),
        );
    };

    match export.dispatch(codec, request).await {
        Ok(value) => Response::ok(correlation_id, value),
        Err(fault) => {
            debug!(%correlation_id, %fault, "request failed");
            Response::fault(correlation_id, fault)
        }
    }
}

/// Serialize `response`, degrading to a fault if the value cannot be encoded
/// or would not fit in one frame.
fn encode_response(codec: Codec, response: Response, max_payload: usize) -> Vec<u8> {
    let failure = match codec.serialize(&response) {
        Ok(payload) if payload.len() <= max_payload => return payload,
        Ok(payload) => format!(
            "response of {} bytes exceeds the {max_payload} byte frame limit",
            payload.len()
        ),
        Err(err) => format!("cannot encode response: {err}"),
    };
    warn!(correlation_id = %response.correlation_id, reason = %failure, "replacing response with fault");
    let fallback = Response::fault(
        response.correlation_id,
        RpcFault::new(FaultKind::Application, failure),
    );
    codec.serialize(&fallback).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{encode_return, handler, next_argument, ServiceExport, ServiceTable};

    fn echo_table() -> Arc<ServiceTable> {
        let say = handler(|codec, arguments| {
            Box::pin(async move {
                let mut arguments = arguments.into_iter();
                let msg: String = next_argument(codec, &mut arguments, "msg")?;
                if msg == "slow" {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                if msg == "panic" {
                    panic!("handler exploded");
                }
                if msg == "hang" {
                    std::future::pending::<()>().await;
                }
                encode_return(codec, &msg)
            })
        });
        let blob = handler(|codec, arguments| {
            Box::pin(async move {
                let mut arguments = arguments.into_iter();
                let len: u64 = next_argument(codec, &mut arguments, "len")?;
                encode_return(codec, &"x".repeat(len as usize))
            })
        });
        let table = ServiceTable::new();
        table.insert(
            "echo",
            ServiceExport::new("demo.Echo")
                .method("say", &["String"], say)
                .method("blob", &["u64"], blob),
        );
        Arc::new(table)
    }

    fn say(msg: &str) -> Request {
        Request::new(
            "demo.Echo",
            "echo",
            "say",
            vec!["String".to_string()],
            vec![Codec::Json.serialize(msg).expect("arg should encode")],
        )
        .expect("request should be valid")
    }

    fn blob(len: u64) -> Request {
        Request::new(
            "demo.Echo",
            "echo",
            "blob",
            vec!["u64".to_string()],
            vec![Codec::Json.serialize(&len).expect("arg should encode")],
        )
        .expect("request should be valid")
    }

    async fn exchange(
        framed: &mut Framed<TcpStream, FrameCodec>,
        request: &Request,
    ) -> Response {
        let payload = Codec::Json.serialize(request).expect("request should encode");
        framed.send(Bytes::from(payload)).await.expect("send");
        let frame = framed.next().await.expect("frame").expect("frame ok");
        Codec::Json.deserialize(&frame).expect("response should decode")
    }

    async fn start() -> ServerHandle {
        RpcServer::start(ServerConfig::default(), echo_table())
            .await
            .expect("server should start")
    }

    async fn client(handle: &ServerHandle) -> Framed<TcpStream, FrameCodec> {
        let stream = TcpStream::connect(handle.local_addr())
            .await
            .expect("should connect");
        Framed::new(stream, FrameCodec::new())
    }

    #[tokio::test]
    async fn start_reports_listening_and_stops() {
        let handle = start().await;
        assert!(handle.is_ready());
        handle.wait_ready().await.expect("ready");
        assert_ne!(handle.local_addr().port(), 0);

        let mut state_rx = handle.state_rx.clone();
        handle.shutdown().await;
        assert_eq!(*state_rx.borrow_and_update(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn echo_roundtrip() {
        let handle = start().await;
        let mut framed = client(&handle).await;

        let request = say("hi");
        let response = exchange(&mut framed, &request).await;
        assert_eq!(response.correlation_id, request.correlation_id);
        let value = response.into_value().expect("should succeed");
        assert_eq!(Codec::Json.deserialize::<String>(&value).unwrap(), "hi");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn dispatch_errors_keep_connection_open() {
        let handle = start().await;
        let mut framed = client(&handle).await;

        let mut unknown = say("hi");
        unknown.implementation_ref = "nope".to_string();
        let response = exchange(&mut framed, &unknown).await;
        assert!(matches!(
            response.outcome,
            Err(RpcFault { kind: FaultKind::Dispatch, .. })
        ));

        let mut mismatched = say("hi");
        mismatched.arguments.clear();
        let response = exchange(&mut framed, &mismatched).await;
        assert!(matches!(
            response.outcome,
            Err(RpcFault { kind: FaultKind::BadRequest, .. })
        ));

        let response = exchange(&mut framed, &say("panic")).await;
        assert!(matches!(
            response.outcome,
            Err(RpcFault { kind: FaultKind::Application, .. })
        ));

        let response = exchange(&mut framed, &say("still here")).await;
        assert!(response.is_ok());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn responses_may_overtake_slow_requests() {
        let handle = start().await;
        let mut framed = client(&handle).await;

        let slow = say("slow");
        let fast = say("fast");
        for request in [&slow, &fast] {
            let payload = Codec::Json.serialize(request).expect("encode");
            framed.send(Bytes::from(payload)).await.expect("send");
        }

        let first: Response =
            Codec::Json.deserialize(&framed.next().await.unwrap().unwrap()).unwrap();
        let second: Response =
            Codec::Json.deserialize(&framed.next().await.unwrap().unwrap()).unwrap();
        assert_eq!(first.correlation_id, fast.correlation_id);
        assert_eq!(second.correlation_id, slow.correlation_id);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn undecodable_request_closes_connection_only() {
        let handle = start().await;

        let mut bad = client(&handle).await;
        bad.send(Bytes::from_static(b"not a request")).await.expect("send");
        assert!(bad.next().await.is_none());

        let mut good = client(&handle).await;
        let response = exchange(&mut good, &say("ok")).await;
        assert!(response.is_ok());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn connections_over_cap_are_rejected() {
        let config = ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        };
        let handle = RpcServer::start(config, echo_table())
            .await
            .expect("server should start");

        let mut first = client(&handle).await;
        assert!(exchange(&mut first, &say("one")).await.is_ok());

        let mut second = client(&handle).await;
        let payload = Codec::Json.serialize(&say("two")).expect("encode");
        let _ = second.send(Bytes::from(payload)).await;
        assert!(matches!(second.next().await, None | Some(Err(_))));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn port_in_use_fails_to_start() {
        let first = start().await;
        let config = ServerConfig {
            port: first.local_addr().port(),
            ..ServerConfig::default()
        };
        let err = RpcServer::start(config, echo_table())
            .await
            .err()
            .expect("second bind should fail");
        assert!(matches!(err, RpcError::Transport(_)));
        first.shutdown().await;
    }

    #[tokio::test]
    async fn oversized_response_becomes_fault_and_connection_survives() {
        let config = ServerConfig {
            max_payload_size: 1024,
            ..ServerConfig::default()
        };
        let handle = RpcServer::start(config, echo_table())
            .await
            .expect("server should start");
        let mut framed = client(&handle).await;

        let request = blob(4096);
        let response =
            tokio::time::timeout(Duration::from_secs(2), exchange(&mut framed, &request))
                .await
                .expect("oversized response should still be answered");
        assert_eq!(response.correlation_id, request.correlation_id);
        match response.outcome {
            Err(RpcFault {
                kind: FaultKind::Application,
                message,
            }) => assert!(message.contains("frame limit"), "message: {message}"),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let response = exchange(&mut framed, &say("hi")).await;
        assert!(response.is_ok());

        let response = exchange(&mut framed, &blob(16)).await;
        let value = response.into_value().expect("small blob fits");
        assert_eq!(Codec::Json.deserialize::<String>(&value).unwrap().len(), 16);

        handle.shutdown().await;
    }

    #[test]
    fn encode_response_keeps_responses_within_limit() {
        let response = Response::ok("c-1", Codec::Json.serialize(&"y".repeat(64)).unwrap());
        let encoded = encode_response(Codec::Json, response.clone(), 4096);
        assert_eq!(encoded, Codec::Json.serialize(&response).unwrap());

        let encoded = encode_response(Codec::Json, response, 48);
        let fallback: Response = Codec::Json.deserialize(&encoded).unwrap();
        assert_eq!(fallback.correlation_id, "c-1");
        assert!(matches!(
            fallback.outcome,
            Err(RpcFault { kind: FaultKind::Application, .. })
        ));
    }

    #[tokio::test]
    async fn protocol_error_closes_connection_despite_hung_handler() {
        let config = ServerConfig {
            drain_timeout: Duration::from_millis(100),
            ..ServerConfig::default()
        };
        let handle = RpcServer::start(config, echo_table())
            .await
            .expect("server should start");
        let mut framed = client(&handle).await;

        let payload = Codec::Json.serialize(&say("hang")).expect("encode");
        framed.send(Bytes::from(payload)).await.expect("send");
        framed
            .send(Bytes::from_static(b"not a request"))
            .await
            .expect("send");

        let next = tokio::time::timeout(Duration::from_secs(2), framed.next())
            .await
            .expect("connection should close after the drain window");
        assert!(matches!(next, None | Some(Err(_))));

        handle.shutdown().await;
    }
}
