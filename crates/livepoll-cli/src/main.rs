// livepoll entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, the terminal is the chat)
// 2. Load config
// 3. Build the backend client, question source and console transport
// 4. Read participant input from stdin until EOF or Ctrl+C
// 5. Tear down any live session

mod config;
mod console;

use std::sync::Arc;

use anyhow::Context;
use livepoll_app::api::HttpPollApi;
use livepoll_app::listener::WebSocketSource;
use livepoll_app::registry::SessionRegistry;
use livepoll_app::router::Router;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::console::{ConsoleChat, CONSOLE_CHAT};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("livepoll starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: api={}, websocket={}, queue_capacity={}",
        config.api_url, config.websocket_url, config.limits.queue_capacity
    );

    // 3. Wire the session stack
    let chat = Arc::new(ConsoleChat::new());
    let api = Arc::new(HttpPollApi::new(config.api_url.clone()));
    let source = Arc::new(WebSocketSource::new(config.websocket_url.clone()));
    let registry = SessionRegistry::new(chat.clone(), api, source, config.limits);
    let mut router = Router::new(chat.clone(), registry);

    // 4. Input loop
    println!("Send /start to connect to a presentation. Ctrl+D or Ctrl+C quits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read input")? else {
                    break;
                };
                if let Some(inbound) = chat.parse_line(&line) {
                    router.handle(CONSOLE_CHAT, inbound).await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // 5. Cleanup
    router.shutdown().await;
    info!("livepoll shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (not the terminal, which carries the
/// conversation).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("livepoll.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("livepoll=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
