//! Parks an exchange until it is released or stopped from the admin API.

use async_trait::async_trait;

use crate::error::ProxyError;
use crate::exchange::Exchange;
use crate::flow::{Flow, Interceptor, Outcome};

#[derive(Debug, Default)]
pub struct Hold;

#[async_trait]
impl Interceptor for Hold {
    fn name(&self) -> &str {
        "hold"
    }

    fn flow(&self) -> Flow {
        Flow::REQUEST
    }

    async fn handle_request(&self, exc: &mut Exchange) -> Result<Outcome, ProxyError> {
        tracing::info!(exchange_id = %exc.id(), uri = %exc.request.uri, "Exchange held");
        exc.control().wait_for_release().await?;
        tracing::info!(exchange_id = %exc.id(), "Exchange released");
        Ok(Outcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::http::Request;

    #[tokio::test]
    async fn test_release_continues() {
        let mut exc = Exchange::new(Request::get("/"));
        let control = exc.control();
        let task = tokio::spawn(async move { Hold.handle_request(&mut exc).await });

        while !control.is_waiting() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        control.release();
        assert_eq!(task.await.unwrap().unwrap(), Outcome::Continue);
    }

    #[tokio::test]
    async fn test_stop_terminates() {
        let mut exc = Exchange::new(Request::get("/"));
        let control = exc.control();
        let task = tokio::spawn(async move { Hold.handle_request(&mut exc).await });

        while !control.is_waiting() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        control.force_stop();
        assert!(matches!(task.await.unwrap(), Err(ProxyError::Terminated)));
    }
}
