//! Interceptor chain subsystem.
//!
//! # Data Flow
//! ```text
//! invoke_handlers(exchange, global chain)
//!     → request phase, in list order
//!         Continue → push unit (if it wants RESPONSE/ABORT), next unit
//!         Return   → response unwind (LIFO)
//!         Abort / Err / panic → abort unwind (LIFO)
//!     → Outcome::Return | Outcome::Abort
//!
//! Response unwind:
//!     pop → handle_response ... first Abort/Err → handle_abort for the rest
//! ```
//!
//! # Design Decisions
//! - `Outcome` has exactly three values; anything else is unrepresentable
//! - Interceptors are shared `Arc<dyn Interceptor>`; exchanges only hold
//!   clones on their unwind stack
//! - Nested chains reuse `invoke_request_handlers` on the same exchange

pub mod controller;
pub mod interceptor;

pub use controller::{
    invoke_abort_handlers, invoke_handlers, invoke_request_handlers, invoke_response_handlers,
};
pub use interceptor::{Flow, Interceptor, Outcome};
