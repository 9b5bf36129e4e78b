use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use rpcprims_frame::FrameCodec;
use rpcprims_registry::{
    EndpointRecord, Registry, RegistryError, RegistryStore, RemoteStore, StoreReply, StoreServer,
    StoreServerConfig,
};
use rpcprims_transport::RetryPolicy;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

async fn start_daemon() -> rpcprims_registry::StoreServerHandle {
    StoreServer::start(StoreServerConfig {
        port: 0,
        ..StoreServerConfig::default()
    })
    .await
    .expect("store server should start")
}

#[tokio::test]
async fn remote_store_speaks_set_commands() {
    let daemon = start_daemon().await;
    let store = RemoteStore::new(daemon.local_addr().to_string());

    assert!(store.set_add("k", "a").await.expect("add"));
    assert!(!store.set_add("k", "a").await.expect("add"));
    assert!(store.set_add("k", "b").await.expect("add"));

    assert_eq!(store.set_members("k").await.expect("members"), ["a", "b"]);
    let picked = store
        .set_random_member("k")
        .await
        .expect("pick")
        .expect("set is not empty");
    assert!(picked == "a" || picked == "b");
    assert_eq!(store.set_random_member("none").await.expect("pick"), None);

    assert!(store.set_remove("k", "a").await.expect("remove"));
    assert_eq!(daemon.store().key_count(), 1);

    daemon.shutdown().await;
}

#[tokio::test]
async fn registry_over_daemon_is_shared_between_clients() {
    let daemon = start_daemon().await;
    let addr = daemon.local_addr().to_string();

    let provider_side = Registry::remote(addr.clone());
    let consumer_side = Registry::remote(addr);

    let record = EndpointRecord::new("demo.Hello", "127.0.0.1", 22201, "helloService");
    provider_side.register(&record).await.expect("register");

    let resolved = consumer_side.resolve("demo.Hello").await.expect("resolve");
    assert_eq!(resolved, record);

    let err = consumer_side.resolve("Unknown").await.expect_err("should fail");
    assert!(matches!(err, RegistryError::NotFound(_)));

    provider_side.unregister(&record).await.expect("unregister");
    assert!(consumer_side
        .providers("demo.Hello")
        .await
        .expect("providers")
        .is_empty());

    daemon.shutdown().await;
}

#[tokio::test]
async fn invalid_command_gets_error_reply_and_connection_survives() {
    let daemon = start_daemon().await;
    let stream = TcpStream::connect(daemon.local_addr())
        .await
        .expect("should connect");
    let mut framed = Framed::new(stream, FrameCodec::new());

    framed
        .send(Bytes::from_static(b"{\"op\":\"flushall\"}"))
        .await
        .expect("send");
    let frame = framed.next().await.expect("reply").expect("frame");
    let reply: StoreReply = serde_json::from_slice(&frame).expect("reply json");
    assert!(matches!(reply, StoreReply::Error(_)));

    framed
        .send(Bytes::from_static(b"{\"op\":\"members\",\"key\":\"k\"}"))
        .await
        .expect("send");
    let frame = framed.next().await.expect("reply").expect("frame");
    let reply: StoreReply = serde_json::from_slice(&frame).expect("reply json");
    assert_eq!(reply, StoreReply::Members(Vec::new()));

    daemon.shutdown().await;
}

#[tokio::test]
async fn remote_store_reconnects_after_daemon_restart() {
    let daemon = start_daemon().await;
    let addr = daemon.local_addr();
    let shared = Arc::clone(daemon.store());

    let store = RemoteStore::new(addr.to_string()).with_retry(RetryPolicy {
        attempts: 20,
        initial_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(1),
    });
    store.set_add("k", "a").await.expect("add");
    daemon.shutdown().await;

    let restarted = StoreServer::start_with_store(
        StoreServerConfig {
            port: addr.port(),
            ..StoreServerConfig::default()
        },
        shared,
    )
    .await
    .expect("store server should restart");

    // The stale connection fails one command at most, then a fresh one is opened.
    let mut members = None;
    for _ in 0..3 {
        if let Ok(found) = store.set_members("k").await {
            members = Some(found);
            break;
        }
    }
    assert_eq!(members.expect("store should recover"), ["a"]);
    restarted.shutdown().await;
}

#[tokio::test]
async fn unreachable_daemon_is_transport_error() {
    let store = RemoteStore::new("127.0.0.1:1").with_retry(RetryPolicy::no_retry());
    let err = store.set_members("k").await.expect_err("should fail");
    assert!(matches!(err, RegistryError::Transport(_)));
}
