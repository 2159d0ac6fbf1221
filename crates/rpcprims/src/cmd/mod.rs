use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use rpcprims_message::Encoding;
use rpcprims_peer::ClientConfig;
use serde_json::Value;

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod notify;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Call a method and print its result.
    Call(CallArgs),
    /// Send a notification.
    Notify(NotifyArgs),
    /// Run a server with built-in ping, echo, and shutdown methods.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, trace_messages: bool) -> CliResult<i32> {
    if let Command::Version(args) = command {
        return version::run(args);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;

    runtime.block_on(async move {
        match command {
            Command::Call(args) => call::run(args, format, trace_messages).await,
            Command::Notify(args) => notify::run(args, trace_messages).await,
            Command::Serve(args) => serve::run(args, trace_messages).await,
            Command::Version(args) => version::run(args),
        }
    })
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Method name.
    pub method: String,
    /// JSON params. Default: null.
    #[arg(long)]
    pub params: Option<String>,
    /// Maximum time to wait for the result (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Send binary (CBOR) frames.
    #[arg(long)]
    pub binary: bool,
}

#[derive(Args, Debug)]
pub struct NotifyArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Method name.
    pub method: String,
    /// JSON params. Default: null.
    #[arg(long)]
    pub params: Option<String>,
    /// Send binary (CBOR) frames.
    #[arg(long)]
    pub binary: bool,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Refuse connections beyond N concurrent clients.
    #[arg(long, value_name = "N")]
    pub max_clients: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn client_config(binary: bool, trace_messages: bool) -> ClientConfig {
    let encoding = if binary {
        Encoding::Binary
    } else {
        Encoding::Text
    };
    ClientConfig::default()
        .with_encoding(encoding)
        .with_trace_messages(trace_messages)
}

pub(crate) fn parse_params(params: Option<&str>) -> CliResult<Value> {
    match params {
        None => Ok(Value::Null),
        Some(text) => serde_json::from_str(text)
            .map_err(|err| CliError::new(USAGE, format!("--params is not valid JSON: {err}"))),
    }
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
