//! In-process round trip: registry daemon, provider and consumer.
//!
//! Run with:
//!   cargo run -p rpcprims --example hello-roundtrip

use rpcprims::demo::hello::{self, Service as _};
use rpcprims::demo::{greeter_export, Hi, HELLO_REF};
use rpcprims::registry::{Registry, StoreServer, StoreServerConfig};
use rpcprims::rpc::{ClientConfig, Consumer, Provider, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let daemon = StoreServer::start(StoreServerConfig {
        port: 0,
        ..StoreServerConfig::default()
    })
    .await?;
    let store = daemon.local_addr().to_string();
    eprintln!("registry listening on {store}");

    let provider = Provider::new(Registry::remote(store.clone()), ServerConfig::default())
        .export(HELLO_REF, greeter_export())
        .start()
        .await?;
    for record in provider.records() {
        eprintln!("registered {record}");
    }

    let consumer = Consumer::new(Registry::remote(store), ClientConfig::default());
    let client: hello::Client = consumer.stub().await?;

    println!("{}", client.hi().await?);
    println!("{}", client.say("hello".to_string()).await?);
    println!(
        "{}",
        client
            .say_hi(Hi {
                user_name: "ada".to_string(),
                say_msg: "hello".to_string(),
            })
            .await?
    );

    provider.shutdown().await;
    daemon.shutdown().await;
    Ok(())
}
