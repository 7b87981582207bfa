//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, host, path, local port)
//!     → router.rs (rule lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Rule or NoMatch
//!
//! Rule Compilation (at startup and on reload):
//!     RuleConfig[]
//!     → Compile matchers, build interceptors
//!     → Sort by priority
//!     → Freeze as immutable RuleTable behind ArcSwap
//! ```
//!
//! # Design Decisions
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same rule
//! - First match wins (ordered by priority)

pub mod matcher;
pub mod router;
pub mod rule;

pub use router::RuleTable;
pub use rule::{Rule, Target};
