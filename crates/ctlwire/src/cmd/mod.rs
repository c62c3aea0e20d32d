use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use ctlwire_frame::CommandKind;
use ctlwire_session::{BackendConfig, CommandParams, CoordinatorConfig};

use crate::exit::{config_error, CliResult};
use crate::output::OutputFormat;

pub mod probe;
pub mod run;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll endpoints until ready, optionally record between start and stop.
    Run(RunArgs),
    /// Run the handshake and print per-endpoint status.
    Probe(ProbeArgs),
    /// Handshake, then broadcast a single start or stop command.
    Send(SendArgs),
    /// Act as a backend: answer handshakes and log received commands.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Serve(args) => serve::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the endpoints are and how patiently to talk to them.
#[derive(Args, Debug, Clone, Default)]
pub struct EndpointArgs {
    /// JSON configuration file.
    #[arg(long, value_name = "FILE", env = "CTLWIRE_CONFIG")]
    pub config: Option<PathBuf>,
    /// Backend as NAME=HOST:PORT[,PORT...]. Repeatable; replaces configured backends.
    #[arg(long = "backend", value_name = "NAME=HOST:PORTS", value_parser = parse_backend)]
    pub backends: Vec<BackendConfig>,
    /// Connect timeout per attempt (e.g. 500ms, 2s).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub connect_timeout: Option<Duration>,
    /// Read/write timeout per handshake step (e.g. 500ms).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub io_timeout: Option<Duration>,
    /// Delay between polling ticks (e.g. 1s).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub interval: Option<Duration>,
}

impl EndpointArgs {
    /// File (or built-in default) configuration with command-line overrides applied.
    pub fn load(&self) -> CliResult<CoordinatorConfig> {
        let mut config = match &self.config {
            Some(path) => CoordinatorConfig::from_json_file(path)
                .map_err(|err| config_error(&format!("failed loading {}", path.display()), err))?,
            None => CoordinatorConfig::default(),
        };

        if !self.backends.is_empty() {
            config.backends = self.backends.clone();
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout_ms = millis(timeout);
        }
        if let Some(timeout) = self.io_timeout {
            config.io_timeout_ms = millis(timeout);
        }
        if let Some(interval) = self.interval {
            config.reconnect.interval_ms = millis(interval);
        }

        config
            .validate()
            .map_err(|err| config_error("invalid configuration", err))?;
        Ok(config)
    }
}

/// Fields carried in the body of a start/stop command.
#[derive(Args, Debug, Clone, Default)]
pub struct CommandParamArgs {
    /// Logging directory path.
    #[arg(long, default_value = "")]
    pub path: String,
    /// Logging mode.
    #[arg(long, default_value_t = 0)]
    pub mode: u32,
    /// History time.
    #[arg(long, default_value_t = 0)]
    pub history: u32,
    /// Follow time.
    #[arg(long, default_value_t = 0)]
    pub follow: u32,
    /// Split time.
    #[arg(long, default_value_t = 0)]
    pub split: u32,
    /// Data length.
    #[arg(long, default_value_t = 0)]
    pub data_length: u32,
}

impl CommandParamArgs {
    pub fn to_params(&self) -> CommandParams {
        CommandParams {
            logging_directory_path: self.path.clone(),
            logging_mode: self.mode,
            history_time: self.history,
            follow_time: self.follow,
            split_time: self.split,
            data_length: self.data_length,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub endpoints: EndpointArgs,
    #[command(flatten)]
    pub params: CommandParamArgs,
    /// Send a start command once all endpoints are ready, and stop on exit.
    #[arg(long)]
    pub start: bool,
    /// Stop after this long instead of waiting for Ctrl-C (e.g. 30s).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub endpoints: EndpointArgs,
    /// Maximum number of polling ticks.
    #[arg(long, default_value_t = 8)]
    pub ticks: u32,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum CommandArg {
    Start,
    Stop,
}

impl From<CommandArg> for CommandKind {
    fn from(arg: CommandArg) -> Self {
        match arg {
            CommandArg::Start => CommandKind::Start,
            CommandArg::Stop => CommandKind::Stop,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Command to broadcast.
    pub command: CommandArg,
    #[command(flatten)]
    pub endpoints: EndpointArgs,
    #[command(flatten)]
    pub params: CommandParamArgs,
    /// Maximum number of polling ticks before sending.
    #[arg(long, default_value_t = 8)]
    pub ticks: u32,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    /// Ports to listen on (comma-separated or repeated). 0 picks a free port.
    #[arg(long = "port", required = true, value_delimiter = ',')]
    pub ports: Vec<u16>,
    /// Reserved bytes attached to every handshake acknowledgement.
    #[arg(long, default_value = "")]
    pub reserved: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `2s`, `1m` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, scale_ms) = if let Some(num) = input.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, 1_000)
    } else if let Some(num) = input.strip_suffix('m') {
        (num, 60_000)
    } else {
        (input, 1_000)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    value
        .checked_mul(scale_ms)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration too large: {input}"))
}

/// Parse `NAME=HOST:PORT[,PORT...]`.
pub fn parse_backend(input: &str) -> Result<BackendConfig, String> {
    let (name, target) = input
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=HOST:PORT[,PORT...], got '{input}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("backend name must not be empty".to_string());
    }

    let (host, ports) = target
        .rsplit_once(':')
        .ok_or_else(|| format!("missing ports in '{target}'"))?;
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(format!("backend '{name}' has an empty host"));
    }

    let ports = ports
        .split(',')
        .map(|port| {
            port.trim()
                .parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| format!("invalid port '{port}' for backend '{name}'"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BackendConfig::new(name, host, ports))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
