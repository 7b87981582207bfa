//! Chain execution and stack-based unwind.
//!
//! # Responsibilities
//! - Run request callbacks in list order
//! - Remember every visited unit that wants a response or abort callback
//! - Unwind that stack in reverse, switching to abort callbacks once anything
//!   fails
//!
//! # Design Decisions
//! - The stack lives on the exchange, so a nested chain and its parent share
//!   one unwind and no unit is called back twice
//! - Panics inside callbacks are caught and handled like errors
//! - Abort callbacks are best effort: their failures are logged and dropped

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::error::ProxyError;
use crate::exchange::{Exchange, FlowState};
use crate::flow::interceptor::{Flow, Interceptor, Outcome};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

fn record_failure(exc: &mut Exchange, unit: &dyn Interceptor, err: ProxyError) {
    tracing::warn!(
        exchange_id = %exc.id(),
        interceptor = unit.name(),
        error = %err,
        "Interceptor failed"
    );
    exc.set_error(err);
}

fn record_panic(exc: &mut Exchange, unit: &dyn Interceptor, payload: Box<dyn Any + Send>) {
    let err = ProxyError::Interceptor {
        name: unit.name().to_string(),
        message: panic_message(payload.as_ref()),
    };
    record_failure(exc, unit, err);
}

/// Run a top-level chain to completion.
///
/// A chain that ends with every unit answering `Continue` has no unit that
/// produced a response; the stack is unwound as an abort and
/// `ChainMisconfigured` is returned.
pub async fn invoke_handlers(
    exc: &mut Exchange,
    units: &[Arc<dyn Interceptor>],
) -> Result<Outcome, ProxyError> {
    if exc.state != FlowState::Idle {
        return Err(ProxyError::ExchangeReused);
    }
    exc.state = FlowState::RunningRequest;

    let outcome = invoke_request_handlers(exc, units).await;
    let result = match outcome {
        Outcome::Continue => {
            let last = units.last().map(|u| u.name().to_string()).unwrap_or_default();
            tracing::error!(
                exchange_id = %exc.id(),
                last = %last,
                "Interceptor chain ended without RETURN or ABORT"
            );
            invoke_abort_handlers(exc).await;
            Err(ProxyError::ChainMisconfigured { last })
        }
        other => Ok(other),
    };

    exc.state = FlowState::Done;
    result
}

/// Request phase over `units`. Returns `Continue` when the list is exhausted,
/// which lets a unit run a nested chain and carry on afterwards.
pub async fn invoke_request_handlers(exc: &mut Exchange, units: &[Arc<dyn Interceptor>]) -> Outcome {
    for unit in units {
        let flow = unit.flow();
        if !flow.contains(Flow::REQUEST) {
            if flow.needs_unwind() {
                exc.stack.push(Arc::clone(unit));
            }
            continue;
        }

        let outcome = match AssertUnwindSafe(unit.handle_request(exc)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                record_failure(exc, unit.as_ref(), err);
                invoke_abort_handlers(exc).await;
                return Outcome::Abort;
            }
            Err(payload) => {
                record_panic(exc, unit.as_ref(), payload);
                invoke_abort_handlers(exc).await;
                return Outcome::Abort;
            }
        };

        tracing::trace!(
            exchange_id = %exc.id(),
            interceptor = unit.name(),
            outcome = ?outcome,
            "Request handler finished"
        );

        match outcome {
            Outcome::Continue => {
                if flow.needs_unwind() {
                    exc.stack.push(Arc::clone(unit));
                }
            }
            Outcome::Return => return invoke_response_handlers(exc).await,
            Outcome::Abort => {
                invoke_abort_handlers(exc).await;
                return Outcome::Abort;
            }
        }
    }
    Outcome::Continue
}

/// Pop the stack calling response handlers; after the first `Abort` or error
/// the remaining units get abort handlers instead.
pub async fn invoke_response_handlers(exc: &mut Exchange) -> Outcome {
    exc.state = FlowState::UnwindingResponse;
    let mut aborted = false;

    while let Some(unit) = exc.stack.pop() {
        if aborted {
            abort_one(exc, &unit).await;
            continue;
        }
        if !unit.flow().contains(Flow::RESPONSE) {
            continue;
        }
        match AssertUnwindSafe(unit.handle_response(exc)).catch_unwind().await {
            Ok(Ok(Outcome::Abort)) => aborted = true,
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                record_failure(exc, unit.as_ref(), err);
                aborted = true;
            }
            Err(payload) => {
                record_panic(exc, unit.as_ref(), payload);
                aborted = true;
            }
        }
        if aborted {
            exc.state = FlowState::UnwindingAbort;
        }
    }

    if aborted {
        Outcome::Abort
    } else {
        Outcome::Return
    }
}

/// Pop every remaining unit and call its abort handler.
pub async fn invoke_abort_handlers(exc: &mut Exchange) {
    exc.state = FlowState::UnwindingAbort;
    while let Some(unit) = exc.stack.pop() {
        abort_one(exc, &unit).await;
    }
}

async fn abort_one(exc: &mut Exchange, unit: &Arc<dyn Interceptor>) {
    if !unit.flow().contains(Flow::ABORT) {
        return;
    }
    match AssertUnwindSafe(unit.handle_abort(exc)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(
            exchange_id = %exc.id(),
            interceptor = unit.name(),
            error = %err,
            "Abort handler failed"
        ),
        Err(payload) => tracing::warn!(
            exchange_id = %exc.id(),
            interceptor = unit.name(),
            panic = %panic_message(payload.as_ref()),
            "Abort handler panicked"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, Response};
    use async_trait::async_trait;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Probe {
        name: String,
        flow: Flow,
        on_request: Result<Outcome, ()>,
        on_response: Outcome,
        panic_on_request: bool,
        log: Log,
    }

    impl Probe {
        fn new(name: &str, log: &Log) -> Self {
            Self {
                name: name.to_string(),
                flow: Flow::ALL,
                on_request: Ok(Outcome::Continue),
                on_response: Outcome::Continue,
                panic_on_request: false,
                log: log.clone(),
            }
        }

        fn returning(mut self, outcome: Outcome) -> Self {
            self.on_request = Ok(outcome);
            self
        }

        fn failing(mut self) -> Self {
            self.on_request = Err(());
            self
        }

        fn flow(mut self, flow: Flow) -> Self {
            self.flow = flow;
            self
        }

        fn aborting_response(mut self) -> Self {
            self.on_response = Outcome::Abort;
            self
        }

        fn panicking(mut self) -> Self {
            self.panic_on_request = true;
            self
        }

        fn arc(self) -> Arc<dyn Interceptor> {
            Arc::new(self)
        }

        fn record(&self, phase: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", phase, self.name));
        }
    }

    #[async_trait]
    impl Interceptor for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        fn flow(&self) -> Flow {
            self.flow
        }

        async fn handle_request(&self, exc: &mut Exchange) -> Result<Outcome, ProxyError> {
            self.record("req");
            if self.panic_on_request {
                panic!("interceptor exploded");
            }
            match self.on_request {
                Ok(Outcome::Return) => {
                    exc.response = Some(Response::ok());
                    Ok(Outcome::Return)
                }
                Ok(outcome) => Ok(outcome),
                Err(()) => Err(ProxyError::Interceptor {
                    name: self.name.clone(),
                    message: "boom".to_string(),
                }),
            }
        }

        async fn handle_response(&self, _exc: &mut Exchange) -> Result<Outcome, ProxyError> {
            self.record("res");
            Ok(self.on_response)
        }

        async fn handle_abort(&self, _exc: &mut Exchange) -> Result<(), ProxyError> {
            self.record("abort");
            Ok(())
        }
    }

    /// Runs `units` through a nested chain.
    struct Nested {
        units: Vec<Arc<dyn Interceptor>>,
    }

    #[async_trait]
    impl Interceptor for Nested {
        fn name(&self) -> &str {
            "nested"
        }

        fn flow(&self) -> Flow {
            Flow::REQUEST
        }

        async fn handle_request(&self, exc: &mut Exchange) -> Result<Outcome, ProxyError> {
            Ok(invoke_request_handlers(exc, &self.units).await)
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn return_unwinds_in_reverse_order() {
        let log = Log::default();
        let chain = vec![
            Probe::new("a", &log).arc(),
            Probe::new("b", &log).arc(),
            Probe::new("c", &log).returning(Outcome::Return).arc(),
        ];
        let mut exc = Exchange::new(Request::get("/"));

        let outcome = invoke_handlers(&mut exc, &chain).await.unwrap();

        assert_eq!(outcome, Outcome::Return);
        assert_eq!(entries(&log), vec!["req:a", "req:b", "req:c", "res:b", "res:a"]);
        assert_eq!(exc.stack_len(), 0);
        assert_eq!(exc.state(), FlowState::Done);
    }

    #[tokio::test]
    async fn failure_aborts_visited_units_only() {
        let log = Log::default();
        let chain = vec![
            Probe::new("a", &log).arc(),
            Probe::new("b", &log).arc(),
            Probe::new("c", &log).failing().arc(),
            Probe::new("d", &log).returning(Outcome::Return).arc(),
        ];
        let mut exc = Exchange::new(Request::get("/"));

        let outcome = invoke_handlers(&mut exc, &chain).await.unwrap();

        assert_eq!(outcome, Outcome::Abort);
        assert_eq!(entries(&log), vec!["req:a", "req:b", "req:c", "abort:b", "abort:a"]);
        assert!(matches!(exc.error(), Some(ProxyError::Interceptor { .. })));
    }

    #[tokio::test]
    async fn panic_is_converted_to_abort() {
        let log = Log::default();
        let chain = vec![
            Probe::new("a", &log).arc(),
            Probe::new("p", &log).panicking().arc(),
        ];
        let mut exc = Exchange::new(Request::get("/"));

        let outcome = invoke_handlers(&mut exc, &chain).await.unwrap();

        assert_eq!(outcome, Outcome::Abort);
        assert_eq!(entries(&log), vec!["req:a", "req:p", "abort:a"]);
        match exc.error() {
            Some(ProxyError::Interceptor { name, message }) => {
                assert_eq!(name, "p");
                assert_eq!(message, "interceptor exploded");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn response_only_units_are_pushed_without_request_call() {
        let log = Log::default();
        let chain = vec![
            Probe::new("r", &log).flow(Flow::RESPONSE).arc(),
            Probe::new("q", &log).flow(Flow::REQUEST).arc(),
            Probe::new("end", &log).returning(Outcome::Return).arc(),
        ];
        let mut exc = Exchange::new(Request::get("/"));

        invoke_handlers(&mut exc, &chain).await.unwrap();

        assert_eq!(entries(&log), vec!["req:q", "req:end", "res:r"]);
    }

    #[tokio::test]
    async fn abort_during_response_switches_remaining_units() {
        let log = Log::default();
        let chain = vec![
            Probe::new("a", &log).arc(),
            Probe::new("b", &log).aborting_response().arc(),
            Probe::new("c", &log).arc(),
            Probe::new("end", &log).returning(Outcome::Return).arc(),
        ];
        let mut exc = Exchange::new(Request::get("/"));

        let outcome = invoke_handlers(&mut exc, &chain).await.unwrap();

        assert_eq!(outcome, Outcome::Abort);
        assert_eq!(
            entries(&log),
            vec!["req:a", "req:b", "req:c", "req:end", "res:c", "res:b", "abort:a"]
        );
    }

    #[tokio::test]
    async fn exhausted_chain_is_misconfigured() {
        let log = Log::default();
        let chain = vec![Probe::new("a", &log).arc(), Probe::new("b", &log).arc()];
        let mut exc = Exchange::new(Request::get("/"));

        let err = invoke_handlers(&mut exc, &chain).await.unwrap_err();

        assert!(matches!(err, ProxyError::ChainMisconfigured { ref last } if last == "b"));
        assert_eq!(entries(&log), vec!["req:a", "req:b", "abort:b", "abort:a"]);
    }

    #[tokio::test]
    async fn nested_chain_shares_the_stack() {
        let log = Log::default();
        let nested = Arc::new(Nested {
            units: vec![
                Probe::new("inner1", &log).arc(),
                Probe::new("inner2", &log).returning(Outcome::Return).arc(),
            ],
        });
        let chain: Vec<Arc<dyn Interceptor>> = vec![
            Probe::new("outer", &log).arc(),
            nested,
            Probe::new("never", &log).arc(),
        ];
        let mut exc = Exchange::new(Request::get("/"));

        let outcome = invoke_handlers(&mut exc, &chain).await.unwrap();

        assert_eq!(outcome, Outcome::Return);
        assert_eq!(
            entries(&log),
            vec!["req:outer", "req:inner1", "req:inner2", "res:inner1", "res:outer"]
        );
    }

    #[tokio::test]
    async fn exchange_cannot_be_reused() {
        let log = Log::default();
        let chain = vec![Probe::new("end", &log).returning(Outcome::Return).arc()];
        let mut exc = Exchange::new(Request::get("/"));

        invoke_handlers(&mut exc, &chain).await.unwrap();
        let err = invoke_handlers(&mut exc, &chain).await.unwrap_err();
        assert!(matches!(err, ProxyError::ExchangeReused));
    }
}
