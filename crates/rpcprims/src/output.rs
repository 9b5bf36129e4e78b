use std::io::IsTerminal;
use std::net::SocketAddr;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rpcprims::registry::EndpointRecord;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A long-running command came up.
#[derive(Serialize)]
pub struct ListeningOutput<'a> {
    pub event: &'static str,
    pub role: &'a str,
    pub addr: String,
    #[serde(skip_serializing_if = "no_records")]
    pub records: &'a [EndpointRecord],
}

fn no_records(records: &&[EndpointRecord]) -> bool {
    records.is_empty()
}

impl<'a> ListeningOutput<'a> {
    pub fn new(role: &'a str, addr: SocketAddr, records: &'a [EndpointRecord]) -> Self {
        Self {
            event: "listening",
            role,
            addr: addr.to_string(),
            records,
        }
    }
}

/// Result of one remote call.
#[derive(Serialize)]
pub struct CallOutput<'a> {
    pub interface: &'a str,
    pub method: &'a str,
    pub provider: &'a str,
    pub result: &'a str,
    pub elapsed_ms: u128,
}

pub fn print_listening(out: &ListeningOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ROLE", "ADDRESS", "INTERFACE", "IMPLEMENTATION"]);
            if out.records.is_empty() {
                table.add_row(vec![out.role, out.addr.as_str(), "-", "-"]);
            }
            for record in out.records {
                table.add_row(vec![
                    out.role,
                    out.addr.as_str(),
                    record.interface_name.as_str(),
                    record.implementation_ref.as_str(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{} listening on {}", out.role, out.addr);
            for record in out.records {
                println!("  registered {record}");
            }
        }
    }
}

pub fn print_records(records: &[EndpointRecord], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&records),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["INTERFACE", "HOST", "PORT", "IMPLEMENTATION"]);
            for record in records {
                table.add_row(vec![
                    record.interface_name.clone(),
                    record.host.clone(),
                    record.port.to_string(),
                    record.implementation_ref.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for record in records {
                println!(
                    "interface={} address={} ref={}",
                    record.interface_name,
                    record.address(),
                    record.implementation_ref
                );
            }
        }
    }
}

pub fn print_call(out: &CallOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "PROVIDER", "ELAPSED", "RESULT"])
                .add_row(vec![
                    out.method.to_string(),
                    out.provider.to_string(),
                    format!("{}ms", out.elapsed_ms),
                    out.result.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{}.{} via {} ({}ms): {}",
                out.interface, out.method, out.provider, out.elapsed_ms, out.result
            );
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}
