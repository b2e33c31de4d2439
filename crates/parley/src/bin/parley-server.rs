use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parley::ChatServer;

#[derive(Parser)]
#[command(name = "parley-server", version, about = "Parley chat server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "PARLEY_ADDR", default_value = "0.0.0.0:8822")]
    addr: String,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Per-read deadline in seconds.
    #[arg(long, default_value_t = 20)]
    read_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    parley::logging::init(&args.log_level);

    let server = ChatServer::builder()
        .bind(&args.addr)
        .read_timeout(Duration::from_secs(args.read_timeout_secs))
        .build()
        .await
        .with_context(|| format!("failed to listen on {}", args.addr))?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    server.run_until(ctrl_c()).await?;
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
