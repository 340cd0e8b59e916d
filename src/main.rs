use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use unity_mcp_bridge::config::{self, LogLevel};
use unity_mcp_bridge::context::AppContext;
use unity_mcp_bridge::server::McpServer;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = match config::load_from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("unity-mcp-bridge: configuration error: {e}");
            if let Some(context) = &e.context {
                eprintln!("{context}");
            }
            std::process::exit(1);
        }
    };

    init_tracing(config.log_level);

    let ctx = match AppContext::from_config(config) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!("cannot determine project root: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = ctx.start().await {
        error!("startup failed: {e}");
        std::process::exit(1);
    }
    info!(
        "{} {} ready, data directory {}",
        ctx.config.server.name,
        ctx.config.server.version,
        ctx.monitor.directory().display()
    );

    let server = McpServer::new(ctx);
    if let Err(e) = server.run().await {
        error!("fatal error: {e}");
        std::process::exit(1);
    }

    // Leave without waiting on the blocking stdin reader.
    std::process::exit(0);
}

/// Log to stderr; stdout carries the protocol. `RUST_LOG` overrides the
/// configured level.
fn init_tracing(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
