//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! registry.rs (port → listener, open/close/reconcile)
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (live connection tracking)
//!     → stream.rs (plain/TLS stream + buffered reader)
//!     → Hand off to transport::ConnectionHandler
//! ```
//!
//! # Design Decisions
//! - Bounded accept via semaphore prevents resource exhaustion
//! - Closing a listener stops accepting; open connections finish on their own
//! - TLS is optional and handled transparently

pub mod connection;
pub mod listener;
pub mod registry;
pub mod stream;
pub mod tls;

pub use listener::{EndpointListener, ListenerError};
pub use registry::{ListenerInfo, ListenerRegistry};
pub use stream::{Connection, Stream};
