use std::fmt;
use std::io;

use rpcprims_peer::RpcError;
use rpcprims_transport::TransportError;

// Process exit codes shared by every subcommand.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const REMOTE_ERROR: i32 = 70;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: &io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match &err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => {
            let code = io_error(context, source).code;
            CliError::new(code, format!("{context}: {err}"))
        }
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    match &err {
        RpcError::Io(source) => io_error(context, source),
        RpcError::Remote { .. } => CliError::new(REMOTE_ERROR, format!("{context}: {err}")),
        RpcError::Protocol(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        RpcError::NotConnected | RpcError::Closed => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        RpcError::Cancelled => CliError::new(FAILURE, format!("{context}: {err}")),
        RpcError::NotFound(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
