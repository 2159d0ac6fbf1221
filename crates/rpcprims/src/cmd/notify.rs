use rpcprims_peer::connect_with_config;

use crate::cmd::{client_config, parse_params, NotifyArgs};
use crate::exit::{rpc_error, CliResult, SUCCESS};

pub async fn run(args: NotifyArgs, trace_messages: bool) -> CliResult<i32> {
    let params = parse_params(args.params.as_deref())?;

    let client = connect_with_config(&args.path, client_config(args.binary, trace_messages))
        .await
        .map_err(|err| rpc_error("connect failed", err))?;

    client
        .notify(&args.method, params)
        .map_err(|err| rpc_error("notify failed", err))?
        .await
        .map_err(|err| rpc_error("notify failed", err))?;
    // Close flushes the writer before the process exits.
    client
        .close()
        .await
        .map_err(|err| rpc_error("close failed", err))?;

    tracing::info!(method = %args.method, "notification sent");
    Ok(SUCCESS)
}
