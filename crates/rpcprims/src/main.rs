mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "rpcprims", version, about = "RPC runtime operator CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "RPCPRIMS_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| exit::io_error("runtime setup failed", err))
        .and_then(|runtime| runtime.block_on(cmd::run(cli.command, format)));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_subcommand() {
        let cli = Cli::try_parse_from([
            "rpcprims",
            "call",
            "say-hi",
            "--user",
            "ada",
            "--msg",
            "hello",
            "--registry",
            "127.0.0.1:9000",
            "--timeout",
            "500ms",
        ])
        .expect("call args should parse");

        match cli.command {
            Command::Call(args) => {
                assert_eq!(args.store.addr, "127.0.0.1:9000");
                assert_eq!(args.user, "ada");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_method() {
        let err = Cli::try_parse_from(["rpcprims", "call", "shout"])
            .expect_err("unknown method should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn rejects_unknown_codec() {
        let err = Cli::try_parse_from(["rpcprims", "serve", "--codec", "xml"])
            .expect_err("unknown codec should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_registry_and_resolve_subcommands() {
        let cli = Cli::try_parse_from(["rpcprims", "registry", "--port", "0"])
            .expect("registry args should parse");
        assert!(matches!(cli.command, Command::Registry(_)));

        let cli = Cli::try_parse_from(["rpcprims", "--format", "json", "resolve", "--all"])
            .expect("resolve args should parse");
        assert!(matches!(cli.command, Command::Resolve(ref args) if args.all));
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }
}
