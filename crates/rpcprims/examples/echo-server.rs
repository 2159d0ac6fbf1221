//! Minimal echo server: answers `echo` with its params until Ctrl-C.
//!
//! Run with:
//!   cargo run --example echo-server --features peer
//!
//! In another terminal:
//!   cargo run --features cli -- call /tmp/rpcprims-echo-<pid>/echo.sock \
//!     echo --params '{"hello":"world"}'

use std::fs;

use rpcprims::peer::Server;
use rpcprims::transport::UnixDomainSocket;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("rpcprims-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let socket = UnixDomainSocket::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    let server = Server::new();
    server.add_handler("echo", |_, client, call| {
        eprintln!("echo from client {}: {}", client.id(), call.params);
        let _ = client.reply(call.id.clone(), call.params.clone());
    });
    server.on_client_closed(|_, client| eprintln!("client {} left", client.id()));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        signal.cancel();
    });

    server.serve(&socket, shutdown).await?;
    drop(socket);
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
