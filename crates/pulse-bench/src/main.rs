//! Pulse ingestion benchmark runner.
//!
//! Single feed:
//!   pulse-bench <host:port> [--seconds N] [--messages N] [--capacity N]
//!
//! Multi feed:
//!   pulse-bench --config feeds.yaml
//!   pulse-bench --feed host:port [--feed host:port ...]

use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use pulse_feed::{MultiFeedConfig, MultiFeedSession};
use pulse_ingest::{IngestConfig, IngestSession};

enum Mode {
    Single(IngestConfig),
    Multi(MultiFeedConfig),
}

fn usage() -> ! {
    eprintln!("usage: pulse-bench <host:port> [--seconds N] [--messages N] [--capacity N]");
    eprintln!("       pulse-bench --config <feeds.yaml>");
    eprintln!("       pulse-bench --feed <host:port> [--feed <host:port> ...]");
    std::process::exit(2);
}

fn parse_args() -> Result<Mode, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    let mut endpoint: Option<(String, u16)> = None;
    let mut config_path: Option<String> = None;
    let mut feed_specs: Vec<String> = Vec::new();
    let mut seconds: Option<u64> = None;
    let mut messages: Option<u64> = None;
    let mut capacity: Option<u64> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .ok_or_else(|| format!("missing value for {flag}"))
        };
        match arg.as_str() {
            "--config" => config_path = Some(value("--config")?),
            "--feed" => feed_specs.push(value("--feed")?),
            "--seconds" => {
                seconds = Some(
                    value("--seconds")?
                        .parse()
                        .map_err(|_| "invalid --seconds value".to_string())?,
                )
            }
            "--messages" => {
                messages = Some(
                    value("--messages")?
                        .parse()
                        .map_err(|_| "invalid --messages value".to_string())?,
                )
            }
            "--capacity" => {
                capacity = Some(
                    value("--capacity")?
                        .parse()
                        .map_err(|_| "invalid --capacity value".to_string())?,
                )
            }
            "--help" | "-h" => usage(),
            spec if !spec.starts_with("--") => {
                let (host, port) = spec
                    .rsplit_once(':')
                    .ok_or_else(|| format!("expected host:port, got {spec:?}"))?;
                let port = port
                    .parse()
                    .map_err(|_| format!("invalid port in {spec:?}"))?;
                endpoint = Some((host.to_string(), port));
            }
            other => return Err(format!("unknown argument {other:?}")),
        }
    }

    if let Some(path) = config_path {
        let config = MultiFeedConfig::from_yaml_file(&path).map_err(|e| e.to_string())?;
        return Ok(Mode::Multi(config));
    }
    if !feed_specs.is_empty() {
        let config = MultiFeedConfig::from_feed_specs(&feed_specs).map_err(|e| e.to_string())?;
        return Ok(Mode::Multi(config));
    }

    let (host, port) = endpoint.ok_or_else(|| "no feed endpoint given".to_string())?;
    let defaults = IngestConfig::default();
    Ok(Mode::Single(IngestConfig {
        host,
        port,
        buffer_capacity: capacity.unwrap_or(defaults.buffer_capacity),
        max_seconds: seconds,
        max_messages: messages,
    }))
}

fn run(mode: Mode) -> Result<(), String> {
    match mode {
        Mode::Single(config) => {
            let session = IngestSession::new(config).map_err(|e| e.to_string())?;
            let transport = session.tcp_source().map_err(|e| e.to_string())?;
            session.run(transport).map_err(|e| e.to_string())
        }
        Mode::Multi(config) => {
            let mut session = MultiFeedSession::new(config).map_err(|e| e.to_string())?;
            session.run();
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mode = match parse_args() {
        Ok(mode) => mode,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(2);
        }
    };

    match run(mode) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
