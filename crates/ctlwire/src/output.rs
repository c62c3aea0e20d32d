use std::io::IsTerminal;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ctlwire_frame::message_name;
use ctlwire_session::{BackendStatus, CommandReport, EndpointStatus, ResponderEvent};
use serde::Serialize;
use serde_json::json;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    all_ready: bool,
    backends: &'a [BackendStatus],
    endpoints: &'a [EndpointStatus],
    timestamp: String,
}

pub fn print_statuses(
    endpoints: &[EndpointStatus],
    backends: &[BackendStatus],
    all_ready: bool,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = StatusOutput {
                all_ready,
                backends,
                endpoints,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ENDPOINT", "HOST", "PORT", "STATE", "SEQ", "LAST ERROR"]);
            for status in endpoints {
                table.add_row(vec![
                    status.id.to_string(),
                    status.host.clone(),
                    status.port.to_string(),
                    status.state.to_string(),
                    status.last_sequence.to_string(),
                    status.last_error.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
            for backend in backends {
                println!("{}: {}", backend.name, connected_label(backend.ready));
            }
        }
        OutputFormat::Pretty => {
            for backend in backends {
                println!(
                    "{} ({}): {} [{}/{} endpoints ready]",
                    backend.name,
                    backend.host,
                    connected_label(backend.ready),
                    backend.ready_endpoints,
                    backend.endpoints
                );
            }
            for status in endpoints {
                match &status.last_error {
                    Some(err) => println!("  {} {} ({err})", status.id, status.state),
                    None => println!("  {} {}", status.id, status.state),
                }
            }
        }
    }
}

pub fn print_command_report(report: &CommandReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let failed: Vec<_> = report
                .failed
                .iter()
                .map(|failure| json!({ "endpoint": failure.id.to_string(), "reason": failure.reason.to_string() }))
                .collect();
            let delivered: Vec<String> = report.delivered.iter().map(ToString::to_string).collect();
            print_json(&json!({
                "command": report.kind.as_str(),
                "success": report.is_success(),
                "delivered": delivered,
                "failed": failed,
                "timestamp": now_unix_seconds(),
            }));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ENDPOINT", "COMMAND", "RESULT"]);
            for id in &report.delivered {
                table.add_row(vec![id.to_string(), report.kind.to_string(), "delivered".to_string()]);
            }
            for failure in &report.failed {
                table.add_row(vec![
                    failure.id.to_string(),
                    report.kind.to_string(),
                    failure.reason.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let verdict = if report.is_success() { "ok" } else { "incomplete" };
            println!(
                "{} {verdict}: {} delivered, {} failed",
                report.kind,
                report.delivered.len(),
                report.failed.len()
            );
            for failure in &report.failed {
                println!("  {}: {}", failure.id, failure.reason);
            }
        }
    }
}

/// One line per bound address, always JSON so scripts can find the port.
pub fn print_listening(addr: SocketAddr) {
    print_json(&json!({ "listening": addr.to_string(), "port": addr.port() }));
}

pub fn print_responder_event(local_port: u16, event: &ResponderEvent, format: OutputFormat) {
    let value = match event {
        ResponderEvent::Handshake {
            request,
            sequence_number,
        } => json!({
            "event": "handshake",
            "port": local_port,
            "request": message_name(request.code()),
            "sequence_number": sequence_number,
        }),
        ResponderEvent::Command {
            kind,
            sequence_number,
            message,
        } => json!({
            "event": "command",
            "port": local_port,
            "command": kind.as_str(),
            "sequence_number": sequence_number,
            "logging_directory_path": message.logging_directory_path,
            "logging_mode": message.logging_mode,
            "history_time": message.history_time,
            "follow_time": message.follow_time,
            "split_time": message.split_time,
            "data_length": message.data_length,
            "logging_files": message.logging_files.len(),
        }),
        ResponderEvent::Malformed {
            message_type,
            sequence_number,
            error,
        } => json!({
            "event": "malformed",
            "port": local_port,
            "message_type": message_type,
            "sequence_number": sequence_number,
            "error": error,
        }),
        ResponderEvent::Unknown {
            message_type,
            sequence_number,
            body_length,
        } => json!({
            "event": "unknown",
            "port": local_port,
            "message_type": message_type,
            "sequence_number": sequence_number,
            "body_length": body_length,
        }),
    };

    match format {
        OutputFormat::Json => print_json(&value),
        OutputFormat::Table | OutputFormat::Pretty => {
            let kind = value["event"].as_str().unwrap_or("event");
            let seq = &value["sequence_number"];
            match event {
                ResponderEvent::Command { kind: command, message, .. } => println!(
                    "port={local_port} {kind} {command} seq={seq} path={}",
                    message.logging_directory_path
                ),
                _ => println!("port={local_port} {kind} seq={seq}"),
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn connected_label(ready: bool) -> &'static str {
    if ready {
        "connected"
    } else {
        "not connected"
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
