//! `probe`: run one query against a live scene graph and print the result.
//!
//! The endpoint comes from `PROBE_*` environment variables (see
//! [`config::ProbeConfig`]) unless `--url` is given. Logs go to stderr and are
//! filtered with `RUST_LOG`.

mod config;
mod ws_transport;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use foundation::TokioDelay;
use serde_json::Value;
use session::{Session, SessionConfig, SessionError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ProbeConfig;
use crate::ws_transport::connect_with_retry;

#[derive(Parser, Debug)]
#[command(name = "probe", about = "Query a live scene graph over its debug socket")]
struct Cli {
    /// WebSocket URL; overrides PROBE_HOST, PROBE_PORT and PROBE_PATH.
    #[arg(long)]
    url: Option<String>,

    /// Connection attempts before giving up.
    #[arg(long)]
    attempts: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the first result of a lookup.
    Query {
        path: String,
        #[arg(long, default_value = "probe")]
        id: String,
    },
    /// Print every result of a lookup.
    QueryAll {
        path: String,
        #[arg(long, default_value = "probe")]
        id: String,
    },
    /// Sample `path` until it reports `expected`, then stop sampling.
    Watch {
        path: String,
        /// JSON value, or a bare string.
        expected: String,
        /// Sampling frequency in Hz; 0 samples every update tick.
        #[arg(long, default_value_t = 0)]
        freq: u32,
        #[arg(long, default_value = "watch")]
        id: String,
    },
    /// Bind to the event at `path`, waiting for it to exist, then wait for a
    /// payload equal to `expected`.
    WaitEvent {
        path: String,
        /// JSON value, or a bare string.
        expected: String,
        #[arg(long, default_value = "probe")]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ProbeConfig::from_env();
    if let Some(attempts) = cli.attempts {
        config.connect_attempts = attempts;
    }
    let url = cli.url.clone().unwrap_or_else(|| config.url());

    let (transport, inbound) = connect_with_retry(&url, config.retry_policy(), &TokioDelay)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    info!(url = transport.url(), "session ready");

    let session = Arc::new(Session::with_config(
        Arc::new(transport),
        SessionConfig {
            bind_interval: config.bind_interval,
            ..SessionConfig::default()
        },
    ));
    let pump = tokio::spawn({
        let session = session.clone();
        async move { session.pump(inbound).await }
    });

    let outcome = run(&session, cli.command).await;

    if let Err(err) = session.close().await {
        warn!("teardown failed: {err}");
    }
    pump.abort();

    let value = outcome.context("query failed")?;
    info!(metrics = ?session.metrics().snapshot(), "done");
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn run(session: &Session, command: Command) -> Result<Value, SessionError> {
    match command {
        Command::Query { path, id } => session.query(id, &path).await,
        Command::QueryAll { path, id } => session.query_all(id, &path).await.map(Value::Array),
        Command::Watch {
            path,
            expected,
            freq,
            id,
        } => {
            session.repeat_query(id.as_str(), &path, freq).await?;
            let value = session
                .wait_for_repeat_response(id.as_str(), parse_value(&expected))
                .await?;
            session.remove_query(id.as_str()).await?;
            Ok(value)
        }
        Command::WaitEvent { path, expected, id } => {
            session.bind_to_event(&id, &path, true).await?;
            let value = session.wait_for_event(&id, parse_value(&expected)).await?;
            session.unbind_event(&id).await?;
            Ok(value)
        }
    }
}

/// Accepts JSON (`3`, `true`, `{"hp":0}`) and falls back to a bare string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
