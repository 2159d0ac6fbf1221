use rpcprims_peer::{Client, IncomingCall, Server};
use rpcprims_transport::UnixDomainSocket;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::{client_config, ServeArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};

pub async fn run(args: ServeArgs, trace_messages: bool) -> CliResult<i32> {
    let socket =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    let shutdown = CancellationToken::new();
    let server = build_server(client_config(false, trace_messages), shutdown.clone());

    if let Some(max) = args.max_clients {
        server.on_client_accepted(move |server, client| {
            if server.client_count() > max {
                warn!(client_id = client.id(), max, "client limit reached; closing");
                let client = client.clone();
                tokio::spawn(async move {
                    let _ = client.close().await;
                });
            }
        });
    }

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            signal.cancel();
        }
    });

    server
        .serve(&socket, shutdown)
        .await
        .map_err(|err| transport_error("accept failed", err))?;
    Ok(SUCCESS)
}

/// The built-in method table: `ping`, `echo`, and `shutdown`.
pub(crate) fn build_server(config: rpcprims_peer::ClientConfig, shutdown: CancellationToken) -> Server {
    let server = Server::with_config(config);

    server.add_handler("ping", |_, client, call| {
        reply(client, call, Value::from("pong"));
    });
    server.add_handler("echo", |_, client, call| {
        reply(client, call, call.params.clone());
    });
    server.add_handler("shutdown", move |_, client, call| {
        info!(client_id = client.id(), "shutdown requested");
        reply(client, call, Value::from("ok"));
        shutdown.cancel();
    });
    server.on_notification(|_, client, method, params| {
        info!(client_id = client.id(), method, %params, "notification");
    });
    server
}

fn reply(client: &Client, call: &IncomingCall, result: Value) {
    if let Err(err) = client.reply(call.id.clone(), result) {
        warn!(client_id = client.id(), method = %call.method, error = %err, "reply failed");
    }
}
