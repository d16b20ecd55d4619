//! verity - verification runtime host
//!
//! stdin:  one `Inbound` JSON message per line (editor events, commands,
//!         backend notifications, configuration changes)
//! stdout: one `Outbound` JSON message per line (backend requests, status)
//! stderr: logs

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use verity_core::domain::{Inbound, Outbound};
use verity_core::impls::OutboundChannel;
use verity_core::{CoreConfig, RuntimeBuilder};

#[derive(Debug, Parser)]
#[command(name = "verity", version, about = "Verification work queue and backend supervisor")]
struct Args {
    /// JSON configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Backend to start with. Defaults to the first configured one.
    #[arg(short, long)]
    backend: Option<String>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = CoreConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    info!(
        config = %args.config.display(),
        backends = ?config.backend_names(),
        "configuration loaded"
    );

    let (outbound, outbound_rx) = OutboundChannel::pair();
    let mut builder = RuntimeBuilder::new().config(config).outbound(outbound);
    if let Some(name) = args.backend {
        builder = builder.backend(name);
    }
    let handle = builder.build().context("building runtime")?.start();

    let writer = tokio::spawn(write_outbound(outbound_rx));
    let reader = tokio::spawn(read_inbound(handle.sender()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        result = reader => match result {
            Ok(Ok(())) => info!("stdin closed"),
            Ok(Err(e)) => warn!(error = %e, "reading stdin failed"),
            Err(e) => warn!(error = %e, "stdin reader panicked"),
        },
    }

    handle.shutdown().await;
    // ランタイムが落ちれば送信側も全部 drop される
    if tokio::time::timeout(Duration::from_secs(1), writer).await.is_err() {
        warn!("stdout writer did not finish");
    }
    Ok(())
}

async fn read_inbound(tx: mpsc::UnboundedSender<Inbound>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Inbound>(line) {
            Ok(message) => {
                debug!(?message, "inbound");
                if tx.send(message).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, line, "ignoring malformed message"),
        }
    }
    Ok(())
}

async fn write_outbound(mut rx: mpsc::UnboundedReceiver<Outbound>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
        stdout.flush().await?;
    }
    Ok(())
}
