//! Static response without an upstream call.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ProxyError;
use crate::exchange::Exchange;
use crate::flow::{Flow, Interceptor, Outcome};
use crate::http::Response;

#[derive(Debug, Clone)]
pub struct Respond {
    status: u16,
    content_type: String,
    body: Bytes,
}

impl Respond {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
impl Interceptor for Respond {
    fn name(&self) -> &str {
        "respond"
    }

    fn flow(&self) -> Flow {
        Flow::REQUEST
    }

    async fn handle_request(&self, exc: &mut Exchange) -> Result<Outcome, ProxyError> {
        exc.response =
            Some(Response::new(self.status).with_body(&self.content_type, self.body.clone()));
        Ok(Outcome::Return)
    }
}
