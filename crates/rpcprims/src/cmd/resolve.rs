use rpcprims::demo::hello;
use rpcprims::registry::{Registry, RegistryError};

use crate::cmd::ResolveArgs;
use crate::exit::{registry_error, CliResult, SUCCESS};
use crate::output::{print_records, OutputFormat};

pub async fn run(args: ResolveArgs, format: OutputFormat) -> CliResult<i32> {
    let interface = args.interface.as_deref().unwrap_or(hello::INTERFACE);
    let registry = Registry::remote(args.store.addr.clone());

    let records = if args.all {
        let records = registry
            .providers(interface)
            .await
            .map_err(|err| registry_error("resolve failed", err))?;
        if records.is_empty() {
            return Err(registry_error(
                "resolve failed",
                RegistryError::NotFound(interface.to_string()),
            ));
        }
        records
    } else {
        let record = registry
            .resolve(interface)
            .await
            .map_err(|err| registry_error("resolve failed", err))?;
        vec![record]
    };

    print_records(&records, format);
    Ok(SUCCESS)
}
