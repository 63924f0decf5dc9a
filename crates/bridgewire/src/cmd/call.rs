use crate::cmd::{finish, load_schemas, open_session, resolve_payload, CallArgs, Context};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_payload, PayloadKind};

pub async fn run(args: CallArgs, ctx: &Context) -> CliResult<i32> {
    let request = resolve_payload(&args.payload)?;

    let session = open_session(ctx, load_schemas(None)?).await?;
    let result = match session.call_service_value(&args.service, request).await {
        Ok(values) => {
            print_payload(PayloadKind::ServiceResponse, &args.service, &values, ctx.format);
            Ok(SUCCESS)
        }
        Err(err) => Err(session_error("service call failed", err)),
    };

    finish(&session, result).await
}
