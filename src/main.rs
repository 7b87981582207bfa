//! HTTP reverse proxy / API gateway.
//!
//! ```text
//!     Client ──▶ listener ──▶ connection handler ──▶ flow controller
//!                                                     │
//!                        AccessLog → RuleMatching → Dispatching
//!                        → RuleChain (rule units) → HttpClient ──▶ Upstream
//!                                                     │
//!     Client ◀── response written ◀── unwind (response / abort handlers)
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use proxy_gateway::config::{load_config, watcher::ConfigWatcher};
use proxy_gateway::lifecycle::{next_signal, Gateway, Signal};
use proxy_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "proxy-gateway", version, about = "HTTP reverse proxy and API gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Don't reload when the configuration file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    logging::init(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        listeners = config.listeners.len(),
        rules = config.rules.len(),
        "proxy-gateway starting"
    );

    let gateway = Gateway::start(&config).await?;
    let drain_deadline = Duration::from_millis(config.transport.socket_timeout_ms);

    let (watcher, mut updates) = ConfigWatcher::new(&cli.config);
    // The watcher stops when dropped.
    let _watch_guard = if cli.no_watch {
        None
    } else {
        match watcher.run() {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, reload with SIGHUP");
                None
            }
        }
    };

    loop {
        tokio::select! {
            signal = next_signal() => match signal {
                Ok(Signal::Shutdown) => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
                Ok(Signal::Reload) => match load_config(&cli.config) {
                    Ok(new_config) => gateway.apply(&new_config).await,
                    Err(e) => tracing::error!(error = %e, "Reload failed, keeping current configuration"),
                },
                Err(e) => {
                    tracing::error!(error = %e, "Signal handling failed");
                    break;
                }
            },
            Some(new_config) = updates.recv() => gateway.apply(&new_config).await,
        }
    }

    gateway.shutdown(drain_deadline).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
