//! Terminal unit: forwards the request upstream.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProxyError;
use crate::exchange::Exchange;
use crate::flow::{Flow, Interceptor, Outcome};
use crate::transport::{ClientOptions, UpstreamClient};

/// Calls the upstream with the connection handler's client when the exchange
/// carries one, so its pooled connection is reused across keep-alive requests.
pub struct HttpClient {
    options: Arc<ClientOptions>,
}

impl HttpClient {
    pub fn new(options: Arc<ClientOptions>) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Interceptor for HttpClient {
    fn name(&self) -> &str {
        "http_client"
    }

    fn flow(&self) -> Flow {
        Flow::REQUEST
    }

    async fn handle_request(&self, exc: &mut Exchange) -> Result<Outcome, ProxyError> {
        let mut client = exc
            .client
            .take()
            .unwrap_or_else(|| UpstreamClient::new(Arc::clone(&self.options)));
        let result = client.call(exc).await;
        exc.client = Some(client);

        exc.response = Some(result?);
        Ok(Outcome::Return)
    }
}
