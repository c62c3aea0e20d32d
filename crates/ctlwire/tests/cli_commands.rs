#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A `ctlwire serve` child process and the JSON lines it prints.
struct MockBackend {
    child: Child,
    ports: Vec<u16>,
    events: mpsc::Receiver<Value>,
}

impl MockBackend {
    fn spawn(port_count: usize) -> Self {
        Self::spawn_on(&vec![0; port_count])
    }

    /// Serve on exactly `ports`; 0 picks a free one.
    fn spawn_on(ports: &[u16]) -> Self {
        let port_list: Vec<String> = ports.iter().map(u16::to_string).collect();
        let mut child = Command::new(env!("CARGO_BIN_EXE_ctlwire"))
            .args(["--log-level", "error", "--format", "json", "serve", "--port"])
            .arg(port_list.join(","))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve command should start");

        let events = json_lines(&mut child);
        let mut bound = Vec::new();
        while bound.len() < ports.len() {
            let line = events
                .recv_timeout(EVENT_TIMEOUT)
                .expect("serve should print listening lines");
            let port = line["port"].as_u64().expect("listening line should carry port");
            bound.push(u16::try_from(port).expect("port should fit u16"));
        }

        Self {
            child,
            ports: bound,
            events,
        }
    }

    fn backend_arg(&self, name: &str) -> String {
        let ports: Vec<String> = self.ports.iter().map(u16::to_string).collect();
        format!("{name}=127.0.0.1:{}", ports.join(","))
    }

    /// Collect events until `pred` matches one, returning everything seen.
    fn wait_for(&self, pred: impl Fn(&Value) -> bool) -> Vec<Value> {
        let deadline = Instant::now() + EVENT_TIMEOUT;
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            let Ok(event) = self.events.recv_timeout(Duration::from_millis(100)) else {
                continue;
            };
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
        panic!("expected event not seen; got {seen:?}");
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Parse every JSON line the child prints on stdout.
fn json_lines(child: &mut Child) -> mpsc::Receiver<Value> {
    let stdout = child.stdout.take().expect("stdout should be piped");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if let Ok(value) = serde_json::from_str::<Value>(&line) {
                if tx.send(value).is_err() {
                    break;
                }
            }
        }
    });
    rx
}

fn next_status(lines: &mpsc::Receiver<Value>, all_ready: bool) -> Value {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while Instant::now() < deadline {
        let Ok(line) = lines.recv_timeout(Duration::from_millis(100)) else {
            continue;
        };
        if line["all_ready"] == Value::Bool(all_ready) {
            return line;
        }
    }
    panic!("no status line with all_ready={all_ready}");
}

fn ctlwire(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ctlwire"))
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .output()
        .expect("ctlwire should run")
}

fn stdout_json(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    listener.local_addr().expect("local addr").port()
}

#[test]
fn probe_against_mock_backend_reports_all_ready() {
    let backend = MockBackend::spawn(2);
    let target = backend.backend_arg("Mock");

    let output = ctlwire(&["probe", "--backend", &target, "--interval", "10ms"]);

    assert_eq!(output.status.code(), Some(0));
    let status = &stdout_json(&output)[0];
    assert_eq!(status["all_ready"], Value::Bool(true));
    assert_eq!(status["endpoints"].as_array().map(Vec::len), Some(2));
    assert_eq!(status["backends"][0]["name"], "Mock");
    assert_eq!(status["endpoints"][0]["state"], "ready");
    assert_eq!(status["endpoints"][0]["last_sequence"], 2);
}

#[test]
fn probe_unreachable_endpoint_returns_30() {
    let target = format!("Gone=127.0.0.1:{}", free_port());

    let output = ctlwire(&[
        "probe",
        "--backend",
        &target,
        "--ticks",
        "2",
        "--interval",
        "10ms",
        "--connect-timeout",
        "100ms",
    ]);

    assert_eq!(output.status.code(), Some(30));
    let status = &stdout_json(&output)[0];
    assert_eq!(status["all_ready"], Value::Bool(false));
    assert_eq!(status["endpoints"][0]["state"], "disconnected");
    assert!(status["endpoints"][0]["last_error"].is_string());
}

#[test]
fn send_start_delivers_command_body() {
    let backend = MockBackend::spawn(1);
    let target = backend.backend_arg("Mock");

    let output = ctlwire(&[
        "send",
        "start",
        "--backend",
        &target,
        "--interval",
        "10ms",
        "--path",
        "/data/session-1",
        "--mode",
        "2",
        "--data-length",
        "512",
    ]);

    assert_eq!(output.status.code(), Some(0));
    let report = &stdout_json(&output)[0];
    assert_eq!(report["command"], "start");
    assert_eq!(report["success"], Value::Bool(true));

    let events = backend.wait_for(|event| event["event"] == "command");
    let handshakes: Vec<_> = events
        .iter()
        .filter(|event| event["event"] == "handshake")
        .map(|event| event["request"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(handshakes, vec!["HANDSHAKE_REQUEST_A", "HANDSHAKE_REQUEST_B"]);

    let command = events.last().expect("command event");
    assert_eq!(command["command"], "start");
    assert_eq!(command["sequence_number"], 3);
    assert_eq!(command["logging_directory_path"], "/data/session-1");
    assert_eq!(command["logging_mode"], 2);
    assert_eq!(command["data_length"], 512);
}

#[test]
fn send_with_one_unreachable_endpoint_reports_partial_failure() {
    let backend = MockBackend::spawn(1);
    let live = backend.backend_arg("Live");
    let dead = format!("Dead=127.0.0.1:{}", free_port());

    let output = ctlwire(&[
        "send",
        "stop",
        "--backend",
        &live,
        "--backend",
        &dead,
        "--ticks",
        "6",
        "--interval",
        "10ms",
        "--connect-timeout",
        "100ms",
    ]);

    assert_eq!(output.status.code(), Some(1));
    let report = &stdout_json(&output)[0];
    assert_eq!(report["success"], Value::Bool(false));
    assert_eq!(report["delivered"].as_array().map(Vec::len), Some(1));
    let failed = report["failed"].as_array().expect("failed list");
    assert_eq!(failed.len(), 1);
    assert!(failed[0]["endpoint"]
        .as_str()
        .is_some_and(|id| id.starts_with("Dead:")));
}

#[test]
fn run_with_start_sends_start_then_stop() {
    let backend = MockBackend::spawn(2);
    let target = backend.backend_arg("Rig");

    let output = ctlwire(&[
        "run",
        "--backend",
        &target,
        "--interval",
        "10ms",
        "--start",
        "--path",
        "/rec",
        "--duration",
        "500ms",
    ]);

    assert_eq!(output.status.code(), Some(0));
    let lines = stdout_json(&output);
    let commands: Vec<_> = lines
        .iter()
        .filter_map(|line| line["command"].as_str())
        .collect();
    assert_eq!(commands, vec!["start", "stop"]);

    let mut seen = Vec::new();
    while seen.len() < 4 {
        let events = backend.wait_for(|event| event["event"] == "command");
        seen.extend(
            events
                .into_iter()
                .filter(|event| event["event"] == "command")
                .map(|event| event["command"].as_str().unwrap_or_default().to_string()),
        );
    }
    assert_eq!(seen.iter().filter(|kind| *kind == "start").count(), 2);
    assert_eq!(seen.iter().filter(|kind| *kind == "stop").count(), 2);
}

#[test]
fn run_restarts_polling_after_backend_drops() {
    let backend = MockBackend::spawn(1);
    let port = backend.ports[0];
    let target = backend.backend_arg("Rig");

    let mut run = Command::new(env!("CARGO_BIN_EXE_ctlwire"))
        .args(["--log-level", "warn", "--log-format", "json", "--format", "json"])
        .args(["run", "--backend", &target, "--interval", "10ms", "--duration", "4s"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("run command should start");
    let mut stderr = run.stderr.take().expect("stderr should be piped");
    let logs = thread::spawn(move || {
        let mut text = String::new();
        let _ = std::io::Read::read_to_string(&mut stderr, &mut text);
        text
    });
    let statuses = json_lines(&mut run);

    next_status(&statuses, true);
    drop(backend);
    let lost = next_status(&statuses, false);
    assert_eq!(lost["endpoints"][0]["state"], "disconnected");

    let _replacement = MockBackend::spawn_on(&[port]);
    let recovered = next_status(&statuses, true);
    assert_eq!(recovered["endpoints"][0]["state"], "ready");

    let status = run.wait().expect("run should exit");
    assert_eq!(status.code(), Some(0));
    assert!(logs.join().unwrap().contains("restarting polling"));
}

#[test]
fn missing_config_file_is_usage_error() {
    let output = ctlwire(&["probe", "--config", "/nonexistent/ctlwire.json"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

#[test]
fn invalid_config_file_is_rejected() {
    let path = std::env::temp_dir().join(format!("ctlwire-bad-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"backends":[{"name":"a","host":" ","ports":[1]}]}"#)
        .expect("config should be writable");

    let output = ctlwire(&["probe", "--config", path.to_str().expect("utf-8 path")]);
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(78));
    assert!(String::from_utf8_lossy(&output.stderr).contains("must not be empty"));
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_ctlwire"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("ctlwire {}", env!("CARGO_PKG_VERSION"))
    );
}
