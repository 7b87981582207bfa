//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream call attempt:
//!     → timeouts.rs (connect / read / write deadlines)
//!     → on failure: retries.rs (retryable? attempts left? pause, next destination)
//! ```
//!
//! # Design Decisions
//! - Every upstream operation has a deadline
//! - The retry loop itself lives in the upstream client; this module only
//!   decides

pub mod retries;
pub mod timeouts;

pub use retries::{RetryDecision, RetryPolicy};
pub use timeouts::with_timeout;
