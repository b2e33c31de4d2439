use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parley::ConsoleView;
use parley_session::{ChatSession, ClientConfig, MessageKind, View};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "parley-client", version, about = "Parley chat client")]
struct Args {
    /// Room to join. Books a new room when omitted.
    room: Option<String>,

    /// Server address.
    #[arg(long, env = "PARLEY_ADDR", default_value = "127.0.0.1:8822")]
    addr: String,

    /// Display name.
    #[arg(long, env = "USER", default_value = "anonymous")]
    name: String,

    /// Connect attempts before giving up.
    #[arg(long, default_value_t = 5)]
    max_attempts: u64,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    parley::logging::init_stderr(&args.log_level);

    let config = ClientConfig {
        max_attempts: args.max_attempts,
        ..ClientConfig::new(args.addr.clone())
    };
    let view = Arc::new(ConsoleView::new());
    let session = ChatSession::connect(config, &args.name, Arc::clone(&view))
        .await
        .with_context(|| format!("unable to connect to {}", args.addr))?;

    match &args.room {
        Some(room_id) => session.join_room(room_id)?,
        None => session.book_room()?,
    }

    tokio::select! {
        _ = view.show() => {}
        result = read_input(&session) => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "input closed");
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

/// Each stdin line is a chat message; `/quit` exits.
async fn read_input<V: View>(session: &ChatSession<V>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(e) = session.send_message(line).await {
            session.view().view_message(MessageKind::Error, "", &e.to_string());
        }
    }
    Ok(())
}
