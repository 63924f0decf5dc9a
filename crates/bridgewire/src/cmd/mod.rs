use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridgewire_schema::SchemaRegistry;
use bridgewire_session::{connect_with_schemas, Session, SessionConfig};
use clap::{Args, Subcommand};
use serde_json::Value;

use crate::exit::{io_error, session_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod echo;
pub mod probe;
pub mod publish;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Advertise, publish and call a service; report round-trip latency.
    Probe(ProbeArgs),
    /// Publish one message on a topic.
    Publish(PublishArgs),
    /// Call a service and print its response.
    Call(CallArgs),
    /// Subscribe to a topic and print deliveries.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every command that talks to a bridge.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: SessionConfig,
    pub format: OutputFormat,
}

pub fn run(command: Command, ctx: Context) -> CliResult<i32> {
    let command = match command {
        Command::Version(args) => return version::run(args),
        other => other,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start async runtime", err))?;

    runtime.block_on(async move {
        match command {
            Command::Probe(args) => probe::run(args, &ctx).await,
            Command::Publish(args) => publish::run(args, &ctx).await,
            Command::Call(args) => call::run(args, &ctx).await,
            Command::Echo(args) => echo::run(args, &ctx).await,
            Command::Version(args) => version::run(args),
        }
    })
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Number of rounds to run; 0 runs until interrupted.
    #[arg(long = "loop", value_name = "N", default_value_t = 1)]
    pub rounds: u64,
    /// Pause between rounds (e.g. 1s, 250ms).
    #[arg(long, value_name = "DURATION")]
    pub interval: Option<String>,
    /// Append one latency line per round to this file.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// JSON payload.
    #[arg(long, conflicts_with = "file")]
    pub json: Option<String>,
    /// Read the JSON payload from a file.
    #[arg(long, conflicts_with = "json")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Topic to publish on.
    pub topic: String,
    /// Message type, `package/Type`.
    #[arg(value_name = "TYPE")]
    pub msg_type: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Schema directory for payload validation.
    #[arg(long, value_name = "DIR")]
    pub validate: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Service to call.
    pub service: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Topic to subscribe to.
    pub topic: String,
    /// Message type, `package/Type`.
    #[arg(value_name = "TYPE")]
    pub msg_type: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Schema directory for payload validation.
    #[arg(long, value_name = "DIR")]
    pub validate: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Read the payload given by `--json` or `--file`; `{}` when neither is set.
pub(crate) fn resolve_payload(args: &PayloadArgs) -> CliResult<Value> {
    if let Some(json) = &args.json {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    if let Some(path) = &args.file {
        let text = fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        return serde_json::from_str(&text).map_err(|err| {
            CliError::new(
                USAGE,
                format!("{} is not valid JSON: {err}", path.display()),
            )
        });
    }
    Ok(Value::Object(Default::default()))
}

pub(crate) fn load_schemas(dir: Option<&Path>) -> CliResult<Arc<SchemaRegistry>> {
    let registry = match dir {
        Some(dir) => SchemaRegistry::from_directory(dir)
            .map_err(|err| session_error("failed loading schemas", err.into()))?,
        None => SchemaRegistry::new(),
    };
    Ok(Arc::new(registry))
}

pub(crate) async fn open_session(
    ctx: &Context,
    schemas: Arc<SchemaRegistry>,
) -> CliResult<Session> {
    tracing::debug!(
        endpoint = %ctx.config.endpoint,
        transport = %ctx.config.transport,
        encoding = %ctx.config.encoding,
        "connecting"
    );
    connect_with_schemas(ctx.config.clone(), schemas)
        .await
        .map_err(|err| session_error("connect failed", err))
}

/// Close `session` and combine the outcome with the command's result.
///
/// The command's own error wins over a close error.
pub(crate) async fn finish(session: &Session, result: CliResult<i32>) -> CliResult<i32> {
    let closed = session.close().await;
    match (result, closed) {
        (Ok(code), Ok(())) => Ok(code),
        (Ok(_), Err(err)) => Err(session_error("close failed", err)),
        (Err(err), closed) => {
            if let Err(close_err) = closed {
                tracing::warn!(error = %close_err, "close failed");
            }
            Err(err)
        }
    }
}
