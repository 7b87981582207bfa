//! Sets a header on the request or on the response.

use async_trait::async_trait;

use crate::config::Direction;
use crate::error::ProxyError;
use crate::exchange::Exchange;
use crate::flow::{Flow, Interceptor, Outcome};

#[derive(Debug, Clone)]
pub struct SetHeader {
    direction: Direction,
    name: String,
    value: String,
}

impl SetHeader {
    pub fn new(direction: Direction, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            direction,
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Interceptor for SetHeader {
    fn name(&self) -> &str {
        "set_header"
    }

    fn flow(&self) -> Flow {
        match self.direction {
            Direction::Request => Flow::REQUEST,
            Direction::Response => Flow::RESPONSE,
        }
    }

    async fn handle_request(&self, exc: &mut Exchange) -> Result<Outcome, ProxyError> {
        exc.request.header.set(&self.name, self.value.clone());
        Ok(Outcome::Continue)
    }

    async fn handle_response(&self, exc: &mut Exchange) -> Result<Outcome, ProxyError> {
        if let Some(response) = exc.response.as_mut() {
            response.header.set(&self.name, self.value.clone());
        }
        Ok(Outcome::Continue)
    }
}
