//! Per-request exchange record.
//!
//! # Data Flow
//! ```text
//! ConnectionHandler parses a request head
//!     → Exchange::new (fresh id, control block, empty unwind stack)
//!     → inbound connection and upstream client move into the exchange
//!     → flow controller runs the interceptor chain against &mut Exchange
//!     → handler takes connection, client and response back out
//!     → exchange dropped after the response is written
//! ```
//!
//! # Design Decisions
//! - One owner task, passed as `&mut`; no interior locking
//! - The unwind stack lives here so nested chains share it
//! - Transport attachments are `Option`s that are moved, never shared

pub mod control;
pub mod registry;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::error::ProxyError;
use crate::flow::Interceptor;
use crate::http::body::Body;
use crate::http::{codec, header, Request, Response};
use crate::net::stream::Connection;
use crate::routing::Rule;
use crate::transport::client::UpstreamClient;

pub use control::ExchangeControl;
pub use registry::{ExchangeInfo, ExchangeRegistry, RegistrationGuard};

/// Where an exchange is in the flow controller's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    RunningRequest,
    UnwindingResponse,
    UnwindingAbort,
    Done,
}

/// Timestamps collected along the way.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub received: Instant,
    pub upstream_sent: Option<Instant>,
    pub upstream_received: Option<Instant>,
    pub response_sent: Option<Instant>,
}

impl Timings {
    fn start() -> Self {
        Self {
            received: Instant::now(),
            upstream_sent: None,
            upstream_received: None,
            response_sent: None,
        }
    }
}

pub struct Exchange {
    id: Uuid,
    pub request: Request,
    pub response: Option<Response>,
    /// Candidate upstream URIs; the client picks one per attempt.
    pub destinations: Vec<String>,
    pub rule: Option<Arc<Rule>>,
    /// Free-form values interceptors use to talk to each other.
    pub properties: HashMap<String, serde_json::Value>,
    pub timings: Timings,
    pub remote_addr: Option<SocketAddr>,
    pub local_port: u16,
    /// Inbound connection the request arrived on.
    pub source: Option<Connection>,
    /// The connection handler's upstream client and its pool.
    pub client: Option<UpstreamClient>,
    /// Upstream side of an established CONNECT tunnel.
    pub tunnel: Option<Connection>,
    pub(crate) stack: Vec<Arc<dyn Interceptor>>,
    pub(crate) state: FlowState,
    error: Option<ProxyError>,
    control: Arc<ExchangeControl>,
}

impl Exchange {
    pub fn new(request: Request) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            response: None,
            destinations: Vec::new(),
            rule: None,
            properties: HashMap::new(),
            timings: Timings::start(),
            remote_addr: None,
            local_port: 0,
            source: None,
            client: None,
            tunnel: None,
            stack: Vec::new(),
            state: FlowState::Idle,
            error: None,
            control: Arc::new(ExchangeControl::new()),
        }
    }

    pub fn with_peer(mut self, remote_addr: SocketAddr, local_port: u16) -> Self {
        self.remote_addr = Some(remote_addr);
        self.local_port = local_port;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn control(&self) -> Arc<ExchangeControl> {
        Arc::clone(&self.control)
    }

    /// The error that aborted the exchange, if any.
    pub fn error(&self) -> Option<&ProxyError> {
        self.error.as_ref()
    }

    /// Record the cause of an abort. The first error wins.
    pub fn set_error(&mut self, err: ProxyError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Units currently waiting for a response or abort callback.
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn rule_name(&self) -> &str {
        self.rule.as_deref().map(|r| r.name.as_str()).unwrap_or("none")
    }

    /// Read a request body that is still on the inbound connection.
    ///
    /// For `Expect: 100-continue` the interim response is sent first and the
    /// `Expect` header is dropped, since the body is now in hand. Failures on
    /// the inbound side come back as `ClientIo`, never as upstream errors.
    pub async fn read_request_body(&mut self, max_body_size: u64) -> Result<(), ProxyError> {
        let Body::Pending(framing) = self.request.body else {
            return Ok(());
        };
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| ProxyError::ClientIo("request body pending without an inbound connection".to_string()))?;

        if self.request.header.is_100_continue_expected() {
            codec::write_response(source.io(), &Response::continue_100(), false)
                .await
                .map_err(|e| ProxyError::ClientIo(e.to_string()))?;
            self.request.header.remove(header::EXPECT);
        }
        let body = codec::read_body(source.io(), framing, max_body_size)
            .await
            .map_err(ProxyError::from_client)?;
        self.request.body = Body::from(body);
        Ok(())
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("method", &self.request.method)
            .field("uri", &self.request.uri)
            .field("state", &self.state)
            .field("destinations", &self.destinations)
            .field("stack", &self.stack.len())
            .finish()
    }
}
