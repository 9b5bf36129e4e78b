use rpcprims::registry::{StoreServer, StoreServerConfig};
use tracing::info;

use crate::cmd::{wait_for_shutdown, RegistryArgs};
use crate::exit::{registry_error, CliResult, SUCCESS};
use crate::output::{print_listening, ListeningOutput, OutputFormat};

pub async fn run(args: RegistryArgs, format: OutputFormat) -> CliResult<i32> {
    let config = store_config(&args)?;
    let server = StoreServer::start(config)
        .await
        .map_err(|err| registry_error("registry start failed", err))?;

    print_listening(
        &ListeningOutput::new("registry", server.local_addr(), &[]),
        format,
    );

    wait_for_shutdown().await?;
    info!(
        keys = server.store().key_count(),
        "shutdown requested, stopping registry"
    );
    server.shutdown().await;
    Ok(SUCCESS)
}

fn store_config(args: &RegistryArgs) -> CliResult<StoreServerConfig> {
    let mut config = match &args.config {
        Some(path) => StoreServerConfig::from_json_file(path)
            .map_err(|err| registry_error("invalid registry config", err))?,
        None => StoreServerConfig::default(),
    };
    if let Some(host) = &args.bind_host {
        config.bind_host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(max) = args.max_connections {
        config.max_connections = max;
    }
    Ok(config)
}
