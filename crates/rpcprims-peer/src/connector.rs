use std::path::Path;

#[cfg(unix)]
use rpcprims_transport::UnixDomainSocket;

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::Result;

/// Connect to a server listening on a local socket.
pub async fn connect(path: impl AsRef<Path>) -> Result<Client> {
    connect_with_config(path, ClientConfig::default()).await
}

/// Connect with explicit configuration.
pub async fn connect_with_config(path: impl AsRef<Path>, config: ClientConfig) -> Result<Client> {
    #[cfg(not(unix))]
    {
        let _ = config;
        return Err(rpcprims_transport::TransportError::Connect {
            path: path.as_ref().to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "rpcprims-peer requires Unix domain sockets on this platform",
            ),
        }
        .into());
    }

    #[cfg(unix)]
    {
        let stream = UnixDomainSocket::connect(path).await?;
        Ok(Client::new(stream, config))
    }
}
