use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

use crate::cmd::probe::ProbeIteration;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

/// What a printed payload is.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// A message received on a subscribed topic.
    Delivery,
    /// The values of a service response.
    ServiceResponse,
}

#[derive(Serialize)]
struct PayloadOutput<'a> {
    kind: PayloadKind,
    /// Topic or service name.
    source: &'a str,
    payload: &'a Value,
    timestamp: String,
}

pub fn print_payload(kind: PayloadKind, source: &str, payload: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PayloadOutput {
                kind,
                source,
                payload,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "SOURCE", "PAYLOAD"])
                .add_row(vec![
                    kind_name(kind).to_string(),
                    source.to_string(),
                    payload.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let body =
                serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
            println!("{} {source}:\n{body}", kind_name(kind));
        }
        OutputFormat::Raw => {
            print_raw(format!("{payload}\n").as_bytes());
        }
    }
}

#[derive(Serialize)]
struct ProbeOutput<'a> {
    iteration: u64,
    latency_ms: u128,
    class: &'static str,
    encoding: &'a str,
    transport: &'a str,
    response: &'a Value,
}

pub fn print_probe(
    iteration: &ProbeIteration,
    encoding: &str,
    transport: &str,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = ProbeOutput {
                iteration: iteration.iteration,
                latency_ms: iteration.latency.as_millis(),
                class: iteration.class(),
                encoding,
                transport,
                response: &iteration.response,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "MODE", "VIA", "LATENCY", "STATUS", "RESPONSE"])
                .add_row(vec![
                    iteration.iteration.to_string(),
                    encoding.to_string(),
                    transport.to_string(),
                    format!("{} ms", iteration.latency.as_millis()),
                    iteration.class().to_string(),
                    iteration.response.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "probe #{} {encoding} via {transport}: {} in {} ms, response={}",
                iteration.iteration,
                iteration.class(),
                iteration.latency.as_millis(),
                iteration.response
            );
        }
        OutputFormat::Raw => {
            print_raw(format!("{}\n", iteration.response).as_bytes());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn kind_name(kind: PayloadKind) -> &'static str {
    match kind {
        PayloadKind::Delivery => "delivery",
        PayloadKind::ServiceResponse => "service_response",
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
