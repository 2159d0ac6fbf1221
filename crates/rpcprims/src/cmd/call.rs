use rpcprims_peer::connect_with_config;
use tracing::debug;

use crate::cmd::{client_config, parse_duration, parse_params, CallArgs};
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_result, CallReport, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat, trace_messages: bool) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = parse_params(args.params.as_deref())?;

    let client = connect_with_config(&args.path, client_config(args.binary, trace_messages))
        .await
        .map_err(|err| rpc_error("connect failed", err))?;

    let pending = client
        .begin_call(&args.method, params)
        .map_err(|err| rpc_error("call failed", err))?;
    let id = pending.id();
    debug!(id, method = %args.method, "call sent");

    let result = match tokio::time::timeout(timeout, pending).await {
        Ok(result) => result.map_err(|err| rpc_error("call failed", err))?,
        Err(_) => {
            return Err(CliError::new(
                TIMEOUT,
                format!("call failed: no reply to {} within {timeout:?}", args.method),
            ))
        }
    };

    print_result(
        &CallReport {
            method: &args.method,
            id,
            encoding: client.encoding(),
            result: &result,
        },
        format,
    );

    if let Err(err) = client.close().await {
        debug!(error = %err, "close after call failed");
    }
    Ok(SUCCESS)
}
