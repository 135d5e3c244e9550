#![forbid(unsafe_code)]

//! `wirequeue` — pipe stdin and stdout through a background connection worker.
//!
//! Every stdin line is queued for the remote peer; every inbound message is
//! written to stdout as-is. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use wirequeue::{AppError, ConnectionWorker, MessageQueue, Result, WorkerConfig};

/// How long one stdout pass waits on the inbound queue before re-checking
/// stdin and the worker status.
const RECEIVE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "wirequeue", about = "Pipe stdin/stdout through a TCP connection worker", version, long_about = None)]
struct Cli {
    /// Path to a TOML worker configuration file.
    #[arg(long, conflicts_with_all = ["host", "port"])]
    config: Option<PathBuf>,

    /// Remote host (used when no config file is given).
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Remote port (used when no config file is given).
    #[arg(long)]
    port: Option<u16>,

    /// Override the read poll timeout in milliseconds.
    #[arg(long)]
    poll_timeout_ms: Option<u64>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = load_config(&args)?;
    info!(addr = %config.address(), "wirequeue starting");

    let outbound = MessageQueue::shared();
    let inbound = MessageQueue::shared();
    let mut worker = ConnectionWorker::new(config, Arc::clone(&outbound), Arc::clone(&inbound));
    worker.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut stdin_open = true;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => worker.send(format!("{line}\n")),
                Ok(None) => {
                    info!("stdin closed; still relaying inbound messages");
                    stdin_open = false;
                }
                Err(err) => {
                    warn!(%err, "stdin read failed");
                    stdin_open = false;
                }
            },

            received = inbound.pop(RECEIVE_POLL) => {
                if let Ok(message) = received {
                    stdout.write_all(&message).await?;
                    stdout.flush().await?;
                }
            }

            terminal = worker.terminated() => {
                info!(state = ?terminal.state, "worker finished");
                break;
            }
        }
    }

    worker.stop().await?;

    for message in inbound.drain().await {
        stdout.write_all(&message).await?;
    }
    stdout.flush().await?;

    match worker.last_error() {
        Some(err) => warn!(%err, "wirequeue finished after connection failure"),
        None => info!("wirequeue finished"),
    }
    Ok(())
}

fn load_config(args: &Cli) -> Result<WorkerConfig> {
    let mut config = match (&args.config, args.port) {
        (Some(path), _) => WorkerConfig::load_from_path(path)?,
        (None, Some(port)) => WorkerConfig::new(args.host.clone(), port),
        (None, None) => {
            return Err(AppError::Config(
                "either --config or --port is required".into(),
            ))
        }
    };

    if let Some(poll_timeout_ms) = args.poll_timeout_ms {
        config.poll_timeout_ms = poll_timeout_ms;
    }
    config.validate()?;
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries relayed data.
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
