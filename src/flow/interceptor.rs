//! The processing-unit contract.

use async_trait::async_trait;

use crate::error::ProxyError;
use crate::exchange::Exchange;

/// Result of a request or response callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Hand the exchange to the next unit.
    Continue,
    /// A response is ready; unwind.
    Return,
    /// Processing failed; unwind through the abort handlers.
    Abort,
}

/// Phases a unit takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flow(u8);

impl Flow {
    pub const REQUEST: Flow = Flow(0b001);
    pub const RESPONSE: Flow = Flow(0b010);
    pub const ABORT: Flow = Flow(0b100);
    pub const REQUEST_RESPONSE: Flow = Flow(0b011);
    pub const ALL: Flow = Flow(0b111);

    pub fn contains(self, other: Flow) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn intersects(self, other: Flow) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether the unit must be remembered for the unwind.
    pub fn needs_unwind(self) -> bool {
        self.intersects(Flow::RESPONSE | Flow::ABORT)
    }
}

impl std::ops::BitOr for Flow {
    type Output = Flow;

    fn bitor(self, rhs: Flow) -> Flow {
        Flow(self.0 | rhs.0)
    }
}

/// A unit of the processing chain.
///
/// Units are shared between every exchange that runs through them and must
/// keep per-request state on the exchange, not on `self`.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    fn flow(&self) -> Flow {
        Flow::ALL
    }

    async fn handle_request(&self, _exc: &mut Exchange) -> Result<Outcome, ProxyError> {
        Ok(Outcome::Continue)
    }

    async fn handle_response(&self, _exc: &mut Exchange) -> Result<Outcome, ProxyError> {
        Ok(Outcome::Continue)
    }

    async fn handle_abort(&self, _exc: &mut Exchange) -> Result<(), ProxyError> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interceptor({})", self.name())
    }
}
