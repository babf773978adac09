use super::{Forwarder, Outcome, TransportError};
use crate::event::ScanEvent;
use anyhow::{bail, Context, Result};
use reqwest::{Client, Response, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

const REJECTION_EXCERPT_BYTES: usize = 256;

/// HTTP client that posts one scan event per request to the ingestion endpoint
#[derive(Clone, Debug)]
pub struct ForwardingClient {
    endpoint: Url,
    client: Client,
}

impl ForwardingClient {
    /// Create a new ForwardingClient.
    ///
    /// Both timeouts must be finite and non-zero: a send that blocks forever
    /// would stall capture on the device.
    pub fn try_new(
        endpoint: &str,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        if request_timeout.is_zero() || connect_timeout.is_zero() {
            bail!("forwarding timeouts must be non-zero");
        }

        let endpoint = Url::parse(endpoint.trim())
            .with_context(|| format!("invalid endpoint url {:?}", endpoint))?;

        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout.min(request_timeout))
            .build()
            .context("failed to build http client")?;

        Ok(ForwardingClient { endpoint, client })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Forwarder for ForwardingClient {
    async fn send(&self, event: &ScanEvent) -> Outcome {
        let start_time = Instant::now();

        // `.json()` sets `Content-Type: application/json`
        let response = match self
            .client
            .post(self.endpoint.clone())
            .json(event)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let error = TransportError::from(e);
                warn!(
                    card_id = %event.card_id,
                    kind = %error.kind(),
                    "Send failed after {:?}: {}",
                    start_time.elapsed(),
                    error
                );
                return Outcome::TransportFailed(error);
            }
        };

        let status = response.status();
        if status == StatusCode::OK {
            debug!(
                card_id = %event.card_id,
                "Delivered in {:?}",
                start_time.elapsed()
            );
            return Outcome::Delivered;
        }

        let body = body_excerpt(response).await;
        warn!(
            card_id = %event.card_id,
            status = status.as_u16(),
            "Endpoint rejected event: {}",
            body
        );
        Outcome::Rejected {
            status: status.as_u16(),
        }
    }
}

/// Reads at most about `REJECTION_EXCERPT_BYTES` of a rejection body for the log.
async fn body_excerpt(mut response: Response) -> String {
    let mut buf = Vec::new();
    while buf.len() < REJECTION_EXCERPT_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            Ok(None) | Err(_) => break,
        }
    }
    excerpt(&buf)
}

fn excerpt(body: &[u8]) -> String {
    let cut = &body[..body.len().min(REJECTION_EXCERPT_BYTES)];
    String::from_utf8_lossy(cut).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::TransportErrorKind;

    #[test]
    fn test_rejects_invalid_endpoint() {
        let result = ForwardingClient::try_new(
            "not a url",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let result = ForwardingClient::try_new(
            "http://127.0.0.1:5050/log_entry",
            Duration::ZERO,
            Duration::from_secs(1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_trims_endpoint() {
        let client = ForwardingClient::try_new(
            " http://127.0.0.1:5050/log_entry \n",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.endpoint().as_str(), "http://127.0.0.1:5050/log_entry");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_failure() {
        // bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ForwardingClient::try_new(
            &format!("http://{}/log_entry", addr),
            Duration::from_secs(2),
            Duration::from_secs(1),
        )
        .unwrap();
        let event = ScanEvent::new("loc_1", "0x04a1b2c3".parse().unwrap());

        match client.send(&event).await {
            Outcome::TransportFailed(e) => {
                assert!(matches!(
                    e.kind(),
                    TransportErrorKind::Connect | TransportErrorKind::Timeout
                ))
            }
            other => panic!("expected transport failure, got {:?}", other),
        }
    }

    #[test]
    fn test_rejection_excerpt_is_capped() {
        let body = "x".repeat(10 * REJECTION_EXCERPT_BYTES);
        assert_eq!(excerpt(body.as_bytes()).len(), REJECTION_EXCERPT_BYTES);
        assert_eq!(excerpt(b"  bad location \n"), "bad location");
    }
}
