use bridgewire_schema::SchemaRegistry;
use bridgewire_session::{Session, SessionError};
use serde_json::Value;

use crate::cmd::{finish, load_schemas, open_session, Context, EchoArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_payload, PayloadKind};

/// Subscribe repeatedly and print every delivery.
///
/// Each subscription yields one message, so messages published between two
/// rounds are not seen. Without `--count` a round that times out is retried
/// until interrupted.
pub async fn run(args: EchoArgs, ctx: &Context) -> CliResult<i32> {
    let schemas = load_schemas(args.validate.as_deref())?;
    let session = open_session(ctx, schemas).await?;
    let result = echo_loop(&session, &args, ctx).await;
    finish(&session, result).await
}

async fn echo_loop(session: &Session, args: &EchoArgs, ctx: &Context) -> CliResult<i32> {
    let validate = args.validate.is_some();
    let mut received = 0usize;

    while args.count.is_none_or(|count| received < count) {
        let delivery = tokio::select! {
            delivery = session.subscribe_value(&args.topic, &args.msg_type) => delivery,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(received, "echo interrupted");
                break;
            }
        };

        let payload = match delivery {
            Ok(payload) => payload,
            Err(SessionError::RequestTimeout(_)) if args.count.is_none() => {
                tracing::debug!(topic = %args.topic, "no delivery yet, resubscribing");
                continue;
            }
            Err(err) => return Err(session_error("subscribe failed", err)),
        };

        if validate {
            check(session.schemas(), &args.msg_type, &payload)?;
        }
        print_payload(PayloadKind::Delivery, &args.topic, &payload, ctx.format);
        received += 1;
    }

    Ok(SUCCESS)
}

fn check(schemas: &SchemaRegistry, msg_type: &str, payload: &Value) -> CliResult<()> {
    schemas
        .validate(msg_type, payload)
        .map_err(|err| session_error("delivery rejected", err.into()))
}
