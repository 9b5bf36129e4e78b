use std::time::Instant;

use rpcprims::demo::hello::{self, Service as _};
use rpcprims::demo::Hi;
use rpcprims::registry::Registry;
use rpcprims::rpc::{ClientConfig, Consumer};

use crate::cmd::{parse_duration, CallArgs, HelloMethod};
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::{print_call, CallOutput, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let base = match &args.config {
        Some(path) => ClientConfig::from_json_file(path)
            .map_err(|err| rpc_error("invalid client config", err))?,
        None => ClientConfig::default(),
    };
    let config = base.with_call_timeout(timeout).with_codec(args.codec);

    let consumer = Consumer::new(Registry::remote(args.store.addr.clone()), config);
    let client: hello::Client = consumer
        .stub()
        .await
        .map_err(|err| rpc_error("resolve failed", err))?;
    let provider = client.stub().transport().addr().to_string();

    let started = Instant::now();
    let result = match args.method {
        HelloMethod::Hi => client.hi().await,
        HelloMethod::Say => client.say(args.msg.clone()).await,
        HelloMethod::SayHi => {
            client
                .say_hi(Hi {
                    user_name: args.user.clone(),
                    say_msg: args.msg.clone(),
                })
                .await
        }
    }
    .map_err(|err| rpc_error(&format!("{} failed", args.method.name()), err))?;

    print_call(
        &CallOutput {
            interface: hello::INTERFACE,
            method: args.method.name(),
            provider: &provider,
            result: &result,
            elapsed_ms: started.elapsed().as_millis(),
        },
        format,
    );
    client.stub().transport().close().await;
    Ok(SUCCESS)
}
