//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → rule table, clients, registries → admin, metrics
//!     → listeners
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!     SIGHUP → config reload
//!
//! Shutdown (shutdown.rs):
//!     Trigger → accept loops stop → connections drain (bounded) → exit
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{next_signal, Signal};
pub use startup::{Gateway, StartupError};
