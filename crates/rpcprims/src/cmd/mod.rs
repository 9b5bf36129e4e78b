use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use rpcprims::codec::Codec;
use rpcprims::demo::HELLO_REF;
use rpcprims::registry::DEFAULT_STORE_PORT;

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod registry;
pub mod resolve;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the registry store daemon.
    Registry(RegistryArgs),
    /// Serve the Hello service and publish it to the registry.
    Serve(ServeArgs),
    /// Call a Hello method through a generated stub.
    Call(CallArgs),
    /// Print the providers registered for an interface.
    Resolve(ResolveArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Registry(args) => registry::run(args, format).await,
        Command::Serve(args) => serve::run(args, format).await,
        Command::Call(args) => call::run(args, format).await,
        Command::Resolve(args) => resolve::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

/// Where the registry store daemon listens.
#[derive(Args, Debug)]
pub struct StoreAddrArgs {
    /// Registry store address.
    #[arg(
        long = "registry",
        value_name = "HOST:PORT",
        env = "RPCPRIMS_REGISTRY",
        default_value_t = format!("127.0.0.1:{DEFAULT_STORE_PORT}")
    )]
    pub addr: String,
}

#[derive(Args, Debug)]
pub struct RegistryArgs {
    /// JSON config file; flags override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Host to bind.
    #[arg(long)]
    pub bind_host: Option<String>,
    /// Port to bind (0 picks an ephemeral port).
    #[arg(long)]
    pub port: Option<u16>,
    /// Maximum concurrent client connections.
    #[arg(long)]
    pub max_connections: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub store: StoreAddrArgs,
    /// JSON server config file; flags override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Host to bind.
    #[arg(long)]
    pub bind_host: Option<String>,
    /// Port to bind (0 picks an ephemeral port).
    #[arg(long)]
    pub port: Option<u16>,
    /// Host published in the endpoint record.
    #[arg(long)]
    pub advertise_host: Option<String>,
    /// Wire codec (json or bincode).
    #[arg(long)]
    pub codec: Option<Codec>,
    /// Implementation reference to register.
    #[arg(long = "ref", value_name = "REF", default_value = HELLO_REF)]
    pub implementation_ref: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum HelloMethod {
    Hi,
    Say,
    SayHi,
}

impl HelloMethod {
    pub fn name(self) -> &'static str {
        match self {
            HelloMethod::Hi => "hi",
            HelloMethod::Say => "say",
            HelloMethod::SayHi => "say_hi",
        }
    }
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Method to invoke.
    pub method: HelloMethod,
    #[command(flatten)]
    pub store: StoreAddrArgs,
    /// Message for `say` and `say-hi`.
    #[arg(long, default_value = "hello")]
    pub msg: String,
    /// User name for `say-hi`.
    #[arg(long, default_value = "rpcprims")]
    pub user: String,
    /// Call deadline (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
    /// Wire codec; must match the provider's.
    #[arg(long, default_value = "json")]
    pub codec: Codec,
    /// JSON client config file; flags override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Interface name. Default: the Hello service.
    pub interface: Option<String>,
    #[command(flatten)]
    pub store: StoreAddrArgs,
    /// List every provider instead of picking one.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `"2s"`, `"150ms"` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Block until Ctrl-C (or SIGTERM on unix).
pub async fn wait_for_shutdown() -> CliResult<()> {
    let signal_error =
        |err: std::io::Error| CliError::new(INTERNAL, format!("signal handler setup failed: {err}"));

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate()).map_err(signal_error)?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map_err(signal_error)?,
            _ = terminate.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map_err(signal_error)
    }
}
