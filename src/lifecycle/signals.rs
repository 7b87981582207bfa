//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM / SIGINT (shutdown) and SIGHUP (config reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown

/// What the process was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Reload,
}

/// Wait for the next signal of interest.
#[cfg(unix)]
pub async fn next_signal() -> std::io::Result<Signal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut hup = signal(SignalKind::hangup())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| Signal::Shutdown),
        _ = term.recv() => Ok(Signal::Shutdown),
        _ = hup.recv() => Ok(Signal::Reload),
    }
}

#[cfg(not(unix))]
pub async fn next_signal() -> std::io::Result<Signal> {
    tokio::signal::ctrl_c().await.map(|_| Signal::Shutdown)
}
