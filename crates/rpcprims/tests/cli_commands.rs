#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use rpcprims_peer::{BlockingClient, ClientConfig};
use serde_json::{json, Value};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/rpccli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn spawn_server(sock_path: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_rpcprims"))
        .arg("--log-level")
        .arg("error")
        .arg("serve")
        .arg(sock_path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serve command should start")
}

fn wait_for_server(path: &Path, timeout: Duration) -> BlockingClient {
    let start = Instant::now();
    loop {
        match BlockingClient::connect_unix(path, ClientConfig::default()) {
            Ok(client) => return client,
            Err(err) => {
                if start.elapsed() >= timeout {
                    panic!("connect timeout: {err}");
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

fn rpcprims(args: &[&str], sock_path: &Path) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_rpcprims"));
    command.arg("--log-level").arg("error").arg("--format").arg("json");
    let (subcommand, rest) = args.split_first().expect("subcommand required");
    command.arg(subcommand).arg(sock_path).args(rest);
    command.output().expect("rpcprims should run")
}

fn stop(mut child: Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn call_ping_against_serve() {
    let dir = unique_temp_dir("ping");
    let sock_path = dir.join("serve.sock");
    let child = spawn_server(&sock_path);
    drop(wait_for_server(&sock_path, Duration::from_secs(3)));

    let output = rpcprims(&["call", "ping"], &sock_path);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report: Value = serde_json::from_slice(&output.stdout).expect("stdout should be json");
    assert_eq!(report["method"], json!("ping"));
    assert_eq!(report["result"], json!("pong"));
    assert_eq!(report["encoding"], json!("text"));

    stop(child);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn binary_echo_round_trip() {
    let dir = unique_temp_dir("echo");
    let sock_path = dir.join("serve.sock");
    let child = spawn_server(&sock_path);
    drop(wait_for_server(&sock_path, Duration::from_secs(3)));

    let output = rpcprims(
        &["call", "echo", "--params", r#"{"n":[1,2,3]}"#, "--binary"],
        &sock_path,
    );
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("stdout should be json");
    assert_eq!(report["result"], json!({"n": [1, 2, 3]}));
    assert_eq!(report["encoding"], json!("binary"));

    stop(child);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn unknown_method_exits_70() {
    let dir = unique_temp_dir("missing");
    let sock_path = dir.join("serve.sock");
    let child = spawn_server(&sock_path);
    drop(wait_for_server(&sock_path, Duration::from_secs(3)));

    let output = rpcprims(&["call", "no-such-method"], &sock_path);
    assert_eq!(output.status.code(), Some(70));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("-32601"), "stderr: {stderr}");

    stop(child);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn notify_succeeds() {
    let dir = unique_temp_dir("notify");
    let sock_path = dir.join("serve.sock");
    let child = spawn_server(&sock_path);
    drop(wait_for_server(&sock_path, Duration::from_secs(3)));

    let output = rpcprims(&["notify", "log", "--params", r#"["hello"]"#], &sock_path);
    assert!(output.status.success());

    stop(child);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn shutdown_call_stops_server() {
    let dir = unique_temp_dir("shutdown");
    let sock_path = dir.join("serve.sock");
    let mut child = spawn_server(&sock_path);
    let client = wait_for_server(&sock_path, Duration::from_secs(3));

    assert_eq!(client.call("shutdown", Value::Null).unwrap(), json!("ok"));

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().expect("wait should work") {
            break status;
        }
        if start.elapsed() >= Duration::from_secs(5) {
            stop(child);
            panic!("server did not exit after shutdown");
        }
        thread::sleep(Duration::from_millis(25));
    };
    assert!(status.success());
    assert!(!sock_path.exists(), "socket file should be removed");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn call_to_missing_socket_is_transport_error() {
    let dir = unique_temp_dir("absent");
    let output = rpcprims(&["call", "ping"], &dir.join("absent.sock"));
    assert_eq!(output.status.code(), Some(3));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_params_is_usage_error() {
    let dir = unique_temp_dir("usage");
    let output = rpcprims(&["call", "ping", "--params", "{nope"], &dir.join("x.sock"));
    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_reports_name() {
    let output = Command::new(env!("CARGO_BIN_EXE_rpcprims"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("rpcprims "));
}
