use rpcprims::demo::greeter_export;
use rpcprims::registry::Registry;
use rpcprims::rpc::{Provider, ServerConfig};
use tracing::info;

use crate::cmd::{wait_for_shutdown, ServeArgs};
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS};
use crate::output::{print_listening, ListeningOutput, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = server_config(&args)?;
    let registry = Registry::remote(args.store.addr.clone());

    let provider = Provider::new(registry, config)
        .export(args.implementation_ref.clone(), greeter_export())
        .start()
        .await
        .map_err(|err| rpc_error("provider start failed", err))?;

    let addr = provider
        .local_addr()
        .ok_or_else(|| CliError::new(crate::exit::INTERNAL, "provider has no listener"))?;
    print_listening(
        &ListeningOutput::new("provider", addr, provider.records()),
        format,
    );

    wait_for_shutdown().await?;
    info!(registry = %args.store.addr, "shutdown requested, withdrawing records");
    provider.shutdown().await;
    Ok(SUCCESS)
}

fn server_config(args: &ServeArgs) -> CliResult<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_json_file(path)
            .map_err(|err| rpc_error("invalid server config", err))?,
        None => ServerConfig::default(),
    };
    if let Some(host) = &args.bind_host {
        config.bind_host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = &args.advertise_host {
        config.advertise_host = host.clone();
    }
    if let Some(codec) = args.codec {
        config.codec = codec;
    }
    Ok(config)
}
