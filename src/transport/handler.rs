//! Inbound connection handler.
//!
//! # Responsibilities
//! - Read successive requests from one accepted connection
//! - Build a fresh exchange per request and run the global chain
//! - Write the final (or generated error) response
//! - Keep-alive, CONNECT hand-off and connection close
//!
//! # Data Flow
//! ```text
//! loop {
//!     read head (socket timeout) ── EOF / timeout / broken head → close, no response
//!     fold Proxy-Connection, read body unless 100-continue is expected
//!     Exchange::new → register → invoke_handlers
//!     write response (generated on abort)
//!     CONNECT 2xx with parked tunnel → spawn relay, stop
//!     keep-alive on both sides, no redirect, body consumed → next request
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::error::ProxyError;
use crate::exchange::Exchange;
use crate::flow::{self, Outcome};
use crate::http::body::Body;
use crate::http::{codec, header, Request, Response};
use crate::net::stream::Connection;
use crate::observability::metrics;
use crate::resilience::with_timeout;
use crate::transport::client::UpstreamClient;
use crate::transport::tunnel;
use crate::transport::HandlerContext;

pub struct ConnectionHandler {
    ctx: Arc<HandlerContext>,
    remote_addr: SocketAddr,
    local_port: u16,
}

impl ConnectionHandler {
    pub fn new(ctx: Arc<HandlerContext>, remote_addr: SocketAddr, local_port: u16) -> Self {
        Self {
            ctx,
            remote_addr,
            local_port,
        }
    }

    /// Serve `conn` until the client or a response ends the keep-alive loop.
    pub async fn run(self, conn: Connection) {
        let mut client = Some(UpstreamClient::new(Arc::clone(&self.ctx.client)));
        let mut source = Some(conn);
        let mut served = 0u64;

        while let Some(mut conn) = source.take() {
            let request = match self.read_request(&mut conn).await {
                Some(request) => request,
                None => {
                    close(conn).await;
                    break;
                }
            };

            let started = Instant::now();
            let mut exc = Exchange::new(request).with_peer(self.remote_addr, self.local_port);
            exc.source = Some(conn);
            exc.client = client.take();
            let registration = self.ctx.exchanges.register(&exc);

            let outcome = flow::invoke_handlers(&mut exc, &self.ctx.chain).await;

            drop(registration);
            client = exc.client.take();
            let Some(mut conn) = exc.source.take() else {
                break;
            };

            let mut response = final_response(&mut exc, outcome);
            if response.is_redirect() {
                response.header.set(header::CONNECTION, "close");
            }

            let write = with_timeout(self.ctx.socket_timeout, || "writing response".to_string(), async {
                codec::write_response(conn.io(), &response, !exc.request.is_head())
                    .await
                    .map_err(ProxyError::from)
            })
            .await;
            exc.timings.response_sent = Some(Instant::now());
            metrics::record_request(&exc.request.method, response.status, exc.rule_name(), started);
            served += 1;

            if let Err(err) = write {
                tracing::debug!(exchange_id = %exc.id(), error = %err, "Writing response failed");
                break;
            }

            if exc.request.is_connect() {
                match exc.tunnel.take() {
                    Some(tunnel) if response.is_success() => tunnel::spawn_relay(conn, tunnel, exc.id()),
                    _ => close(conn).await,
                }
                break;
            }

            let keep_alive = exc.request.is_keep_alive()
                && response.is_keep_alive()
                && !response.is_redirect()
                && !exc.request.body.is_pending()
                && !conn.is_read_closed();
            if keep_alive {
                source = Some(conn);
            } else {
                tracing::trace!(exchange_id = %exc.id(), "Closing inbound connection after response");
                close(conn).await;
            }
        }

        if let Some(client) = client.as_mut() {
            client.close();
        }
        tracing::debug!(remote_addr = %self.remote_addr, requests = served, "Inbound connection finished");
    }

    /// Read the next request; `None` ends the connection.
    async fn read_request(&self, conn: &mut Connection) -> Option<Request> {
        let max = self.ctx.max_head_size;
        let max_body_size = self.ctx.max_body_size;
        let head = with_timeout(self.ctx.socket_timeout, || "reading request head".to_string(), async {
            codec::read_request_head(conn.io(), max).await
        })
        .await;

        let mut request = match head {
            Ok(request) => request,
            Err(ProxyError::NoMoreRequests) => return None,
            Err(ProxyError::Timeout(_)) => {
                tracing::debug!(remote_addr = %self.remote_addr, "Inbound connection idle, closing");
                return None;
            }
            Err(err @ (ProxyError::EofWhileReadingFirstLine { .. } | ProxyError::EofWhileReadingHeader { .. })) => {
                tracing::warn!(remote_addr = %self.remote_addr, error = %err, "Client closed connection mid-request");
                return None;
            }
            Err(err @ ProxyError::MalformedMessage(_)) => {
                tracing::warn!(remote_addr = %self.remote_addr, error = %err, "Malformed request head, closing");
                return None;
            }
            Err(err) => {
                tracing::debug!(remote_addr = %self.remote_addr, error = %err, "Reading request failed");
                return None;
            }
        };

        request.fold_proxy_connection();

        if let Body::Pending(framing) = request.body {
            if !request.header.is_100_continue_expected() {
                let body = with_timeout(self.ctx.socket_timeout, || "reading request body".to_string(), async {
                    codec::read_body(conn.io(), framing, max_body_size).await
                })
                .await;
                match body {
                    Ok(body) => request.body = Body::from(body),
                    Err(err) => {
                        tracing::warn!(remote_addr = %self.remote_addr, error = %err, "Reading request body failed");
                        return None;
                    }
                }
            }
        }
        Some(request)
    }
}

/// The response to write for a finished chain.
fn final_response(exc: &mut Exchange, outcome: Result<Outcome, ProxyError>) -> Response {
    match outcome {
        Ok(Outcome::Return) => exc.response.take().unwrap_or_else(|| {
            tracing::error!(exchange_id = %exc.id(), "Chain returned without a response");
            Response::error(500, "Internal server error.")
        }),
        Ok(_) => match exc.error() {
            Some(err) => Response::from_error(err),
            None => exc
                .response
                .take()
                .unwrap_or_else(|| Response::error(500, "Internal server error.")),
        },
        Err(err) => Response::from_error(&err),
    }
}

/// Shut down our write side (plain TCP only) and drop the connection.
async fn close(mut conn: Connection) {
    if !conn.is_tls() {
        let _ = conn.shutdown_write().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_with_error_generates_response() {
        let mut exc = Exchange::new(Request::get("/"));
        exc.set_error(ProxyError::UnknownHost { host: "x.invalid".into() });
        let response = final_response(&mut exc, Ok(Outcome::Abort));
        assert_eq!(response.status, 502);
    }

    #[test]
    fn abort_keeps_unit_response() {
        let mut exc = Exchange::new(Request::get("/"));
        exc.response = Some(Response::error(403, "denied"));
        let response = final_response(&mut exc, Ok(Outcome::Abort));
        assert_eq!(response.status, 403);
    }

    #[test]
    fn misconfigured_chain_is_500() {
        let mut exc = Exchange::new(Request::get("/"));
        let response = final_response(&mut exc, Err(ProxyError::ChainMisconfigured { last: "x".into() }));
        assert_eq!(response.status, 500);
    }
}
