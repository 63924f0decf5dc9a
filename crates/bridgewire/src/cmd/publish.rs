use crate::cmd::{finish, load_schemas, open_session, resolve_payload, Context, PublishArgs};
use crate::exit::{session_error, CliResult, SUCCESS};

pub async fn run(args: PublishArgs, ctx: &Context) -> CliResult<i32> {
    let payload = resolve_payload(&args.payload)?;
    let schemas = load_schemas(args.validate.as_deref())?;
    if args.validate.is_some() {
        schemas
            .validate(&args.msg_type, &payload)
            .map_err(|err| session_error("payload rejected", err.into()))?;
    }

    let session = open_session(ctx, schemas).await?;
    let result = session
        .publish_value(&args.topic, &args.msg_type, payload)
        .await
        .map(|()| SUCCESS)
        .map_err(|err| session_error("publish failed", err));
    if result.is_ok() {
        tracing::info!(topic = %args.topic, msg_type = %args.msg_type, "published");
    }

    finish(&session, result).await
}
