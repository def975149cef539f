//! Sidecar agent binary
//!
//! Speaks ACP over stdin/stdout. Stdout belongs to the protocol, so all
//! logging goes to stderr.

use anyhow::Result;
use clap::Parser;
use sidecar_core::{run_stdio_server, CannedReplies};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sidecar-agent", version, about = "ACP agent on stdio")]
struct Args {
    /// Pause between reply chunks, in milliseconds
    #[arg(long, default_value_t = 0)]
    chunk_delay_ms: u64,

    /// Log filter when RUST_LOG is unset, e.g. "info" or "sidecar_core=debug"
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let source = Arc::new(CannedReplies::new(Duration::from_millis(args.chunk_delay_ms)));
    run_stdio_server(source).await;
    Ok(())
}
