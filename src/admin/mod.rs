//! Admin HTTP API.
//!
//! Lists listeners and live exchanges, and releases or force-stops held
//! exchanges. Every route requires `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::exchange::ExchangeRegistry;
use crate::lifecycle::Shutdown;
use crate::net::ListenerRegistry;
use crate::routing::RuleTable;

#[derive(Clone)]
pub struct AdminState {
    pub exchanges: Arc<ExchangeRegistry>,
    pub listeners: Arc<ListenerRegistry>,
    pub rules: Arc<ArcSwap<RuleTable>>,
    pub api_key: Arc<str>,
    pub started: Instant,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/listeners", get(get_listeners))
        .route("/admin/exchanges", get(get_exchanges))
        .route("/admin/exchanges/{id}/release", post(release_exchange))
        .route("/admin/exchanges/{id}/stop", post(stop_exchange))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve(addr: SocketAddr, state: AdminState, shutdown: Shutdown) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    let mut rx = shutdown.subscribe();
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = rx.recv().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::exchange::Exchange;
    use crate::http::Request as ProxyRequest;
    use crate::net::tls;
    use crate::transport::{ClientOptions, HandlerContext};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state() -> AdminState {
        let options = Arc::new(ClientOptions::new(tls::client_connector().unwrap()));
        let ctx = Arc::new(HandlerContext::with_chain(Vec::new(), options, &TransportConfig::default()));
        AdminState {
            exchanges: Arc::new(ExchangeRegistry::new()),
            listeners: Arc::new(ListenerRegistry::new(ctx)),
            rules: Arc::new(ArcSwap::from_pointee(RuleTable::default())),
            api_key: Arc::from("secret"),
            started: Instant::now(),
        }
    }

    fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let app = setup_admin_router(state());

        let res = app.clone().oneshot(request("GET", "/admin/status", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app.clone().oneshot(request("GET", "/admin/status", Some("wrong"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app.oneshot(request("GET", "/admin/status", Some("secret"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_lists_and_releases_exchanges() {
        let state = state();
        let exchange = Exchange::new(ProxyRequest::get("/held"));
        let _guard = state.exchanges.register(&exchange);
        let app = setup_admin_router(state);

        let res = app
            .clone()
            .oneshot(request("GET", "/admin/exchanges", Some("secret")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let list: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(list[0]["uri"], "/held");
        assert_eq!(list[0]["id"], exchange.id().to_string());

        let uri = format!("/admin/exchanges/{}/stop", exchange.id());
        let res = app.clone().oneshot(request("POST", &uri, Some("secret"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(exchange.control().is_stopped());

        let uri = format!("/admin/exchanges/{}/release", uuid::Uuid::new_v4());
        let res = app.oneshot(request("POST", &uri, Some("secret"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
