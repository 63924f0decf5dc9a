mod cmd;
mod duration;
mod exit;
mod logging;
mod output;

use bridgewire_frame::EncodingMode;
use bridgewire_session::{SessionConfig, TransportKind, DEFAULT_ENDPOINT};
use clap::Parser;

use crate::cmd::{Command, Context};
use crate::duration::parse_duration;
use crate::exit::CliResult;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

/// Default `host:port` when `--transport tcp` is given without `--endpoint`.
const DEFAULT_TCP_ENDPOINT: &str = "127.0.0.1:9090";

#[derive(Parser, Debug)]
#[command(name = "bridgewire", version, about = "Bridge protocol client CLI")]
struct Cli {
    /// Message encoding: json or bson.
    #[arg(
        long,
        value_name = "ENCODING",
        default_value = "bson",
        env = "BRIDGEWIRE_ENCODING",
        global = true
    )]
    encoding: EncodingMode,

    /// Transport: tcp or websocket.
    #[arg(
        long,
        value_name = "KIND",
        default_value = "websocket",
        env = "BRIDGEWIRE_TRANSPORT",
        global = true
    )]
    transport: TransportKind,

    /// Bridge endpoint: host:port for tcp, ws:// URL for websocket.
    #[arg(long, value_name = "ENDPOINT", env = "BRIDGEWIRE_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Deadline for subscribe and service call responses (e.g. 10s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "10s", global = true)]
    timeout: String,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn session_config(&self) -> CliResult<SessionConfig> {
        let endpoint = match (&self.endpoint, self.transport) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, TransportKind::Tcp) => DEFAULT_TCP_ENDPOINT.to_string(),
            (None, TransportKind::WebSocket) => DEFAULT_ENDPOINT.to_string(),
        };

        Ok(SessionConfig::default()
            .with_encoding(self.encoding)
            .with_transport(self.transport)
            .with_endpoint(endpoint)
            .with_request_timeout(Some(parse_duration(&self.timeout)?)))
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cli
        .session_config()
        .and_then(|config| cmd::run(cli.command, Context { config, format }));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
