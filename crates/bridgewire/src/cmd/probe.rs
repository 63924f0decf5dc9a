use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bridgewire_frame::EncodingMode;
use bridgewire_session::{Session, TransportKind};
use serde_json::{json, Value};

use crate::cmd::{finish, load_schemas, open_session, Context, ProbeArgs};
use crate::duration::parse_duration;
use crate::exit::{io_error, session_error, CliResult, SUCCESS};
use crate::output::{print_probe, OutputFormat};

pub const PROBE_TOPIC: &str = "/bson_test";
pub const PROBE_TYPE: &str = "std_msgs/String";
pub const PROBE_SERVICE: &str = "/add_two_ints";

/// Rounds at or above this latency are reported as `slow`.
pub const SLOW_AFTER: Duration = Duration::from_secs(8);

const LOG_BANNER: &str = "--------------\n---- Test ----\n--------------\n";

/// Outcome of one advertise/publish/call round.
#[derive(Debug, Clone)]
pub struct ProbeIteration {
    pub iteration: u64,
    pub latency: Duration,
    pub response: Value,
}

impl ProbeIteration {
    pub fn class(&self) -> &'static str {
        if self.latency < SLOW_AFTER {
            "ok"
        } else {
            "slow"
        }
    }

    /// `ok: 0m0.042s`
    pub fn log_line(&self) -> String {
        let millis = self.latency.as_millis();
        format!(
            "{}: {}m{}.{:03}s",
            self.class(),
            millis / 60_000,
            (millis % 60_000) / 1000,
            millis % 1000
        )
    }
}

pub fn greeting(encoding: EncodingMode, transport: TransportKind) -> String {
    format!(
        "Hello from bridgewire probe: {} mode via {}",
        encoding.as_str().to_uppercase(),
        transport.as_str().to_uppercase()
    )
}

struct ProbeLog {
    path: PathBuf,
    file: File,
}

impl ProbeLog {
    fn open(path: &Path) -> CliResult<Self> {
        let context = format!("failed opening {}", path.display());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| io_error(&context, err))?;
        file.write_all(LOG_BANNER.as_bytes())
            .map_err(|err| io_error(&context, err))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn append(&mut self, iteration: &ProbeIteration) -> CliResult<()> {
        writeln!(self.file, "{}", iteration.log_line())
            .map_err(|err| io_error(&format!("failed writing {}", self.path.display()), err))
    }
}

pub async fn run(args: ProbeArgs, ctx: &Context) -> CliResult<i32> {
    let interval = args.interval.as_deref().map(parse_duration).transpose()?;
    let log = args.log_file.as_deref().map(ProbeLog::open).transpose()?;

    let session = open_session(ctx, load_schemas(None)?).await?;
    let result = probe_loop(&session, &args, interval, log, ctx).await;
    finish(&session, result).await
}

async fn probe_loop(
    session: &Session,
    args: &ProbeArgs,
    interval: Option<Duration>,
    mut log: Option<ProbeLog>,
    ctx: &Context,
) -> CliResult<i32> {
    let encoding = ctx.config.encoding;
    let transport = ctx.config.transport;
    let greeting = greeting(encoding, transport);

    let mut iteration = 0u64;
    loop {
        iteration += 1;
        let outcome = tokio::select! {
            outcome = probe_once(session, iteration, &greeting) => outcome?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(iteration, "probe interrupted");
                break;
            }
        };

        report(&outcome, encoding, transport, ctx.format);
        if let Some(log) = log.as_mut() {
            log.append(&outcome)?;
        }

        if args.rounds != 0 && iteration >= args.rounds {
            break;
        }
        if let Some(interval) = interval {
            tokio::time::sleep(interval).await;
        }
    }

    Ok(SUCCESS)
}

async fn probe_once(
    session: &Session,
    iteration: u64,
    greeting: &str,
) -> CliResult<ProbeIteration> {
    let started = Instant::now();

    session
        .advertise(PROBE_TOPIC, PROBE_TYPE)
        .await
        .map_err(|err| session_error("advertise failed", err))?;
    session
        .publish_value(PROBE_TOPIC, PROBE_TYPE, json!({ "data": greeting }))
        .await
        .map_err(|err| session_error("publish failed", err))?;
    let response = session
        .call_service_value(PROBE_SERVICE, json!({ "a": 20, "b": 22 }))
        .await
        .map_err(|err| session_error("service call failed", err))?;

    Ok(ProbeIteration {
        iteration,
        latency: started.elapsed(),
        response,
    })
}

fn report(
    outcome: &ProbeIteration,
    encoding: EncodingMode,
    transport: TransportKind,
    format: OutputFormat,
) {
    if outcome.class() == "slow" {
        tracing::warn!(
            iteration = outcome.iteration,
            latency_ms = outcome.latency.as_millis() as u64,
            "slow probe round"
        );
    }
    print_probe(outcome, encoding.as_str(), transport.as_str(), format);
}
