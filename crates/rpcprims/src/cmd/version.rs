use rpcprims::codec::Codec;
use rpcprims::demo::hello;
use rpcprims::registry::DEFAULT_STORE_PORT;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("rpcprims {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let codecs: Vec<&str> = Codec::ALL.iter().map(|codec| codec.name()).collect();

    println!("name: rpcprims");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("RPCPRIMS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("RPCPRIMS_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("codecs: {}", codecs.join(", "));
    println!("default_registry_port: {DEFAULT_STORE_PORT}");
    println!("demo_interface: {}", hello::INTERFACE);

    Ok(SUCCESS)
}
