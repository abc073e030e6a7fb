//! Delivery of snapshots to the collector
//!
//! One HTTP POST per snapshot, bounded by the request timeout.
//! No retry here: a failed cycle is simply skipped by the agent loop.

use crate::metrics::MetricSnapshot;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub const CLIENT_SECRET_HEADER: &str = "X-Client-Secret";
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("network error: {0}")]
    Network(String),
    #[error("collector answered {status}: {body}")]
    Server { status: u16, body: String },
}

/// Collector acknowledgement (`{"status":"success"}`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Ack {
    pub status: String,
}

pub trait Reporter {
    fn report(&self, snapshot: &MetricSnapshot) -> impl Future<Output = Result<Ack, DeliveryError>> + Send;
}

pub struct HttpReporter {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpReporter {
    pub fn new(collector_url: &str, timeout: Duration, token: Option<String>) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/report", collector_url.trim_end_matches('/')),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Reporter for HttpReporter {
    async fn report(&self, snapshot: &MetricSnapshot) -> Result<Ack, DeliveryError> {
        let mut request = self.client.post(&self.endpoint).json(snapshot);
        if let Some(token) = &self.token {
            request = request.header(CLIENT_SECRET_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
                body.truncate(cut);
            }
            return Err(DeliveryError::Server { status: status.as_u16(), body });
        }

        let ack = response.json::<Ack>().await.unwrap_or_else(|e| {
            debug!("Unreadable acknowledgement body: {e}");
            Ack { status: "success".to_string() }
        });
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_devkit::{MockCollector, SnapshotBuilder};

    fn snapshot(ip: &str) -> MetricSnapshot {
        serde_json::from_value(SnapshotBuilder::new(ip).build()).unwrap()
    }

    #[tokio::test]
    async fn test_report_delivers_json_and_secret() {
        let collector = MockCollector::start().await.unwrap();
        let reporter =
            HttpReporter::new(&format!("{}/", collector.url()), Duration::from_secs(5), Some("s3cret".into())).unwrap();
        assert_eq!(reporter.endpoint(), format!("{}/report", collector.url()));

        let ack = reporter.report(&snapshot("10.0.0.5")).await.unwrap();
        assert_eq!(ack.status, "success");

        let received = collector.reports();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body["ip"], "10.0.0.5");
        assert_eq!(received[0].body["cpu"]["cpu_count"], 2);
        assert_eq!(received[0].client_secret.as_deref(), Some("s3cret"));
    }

    #[tokio::test]
    async fn test_no_secret_header_without_token() {
        let collector = MockCollector::start().await.unwrap();
        let reporter = HttpReporter::new(&collector.url(), Duration::from_secs(5), None).unwrap();
        reporter.report(&snapshot("10.0.0.5")).await.unwrap();
        assert_eq!(collector.reports()[0].client_secret, None);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let collector = MockCollector::start().await.unwrap();
        collector.set_status(500);
        let reporter = HttpReporter::new(&collector.url(), Duration::from_secs(5), None).unwrap();

        match reporter.report(&snapshot("10.0.0.5")).await {
            Err(DeliveryError::Server { status, body }) => {
                assert_eq!(status, 500);
                assert!(body.contains("scripted failure"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_collector_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let reporter = HttpReporter::new(&format!("http://{addr}"), Duration::from_secs(2), None).unwrap();
        let err = reporter.report(&snapshot("10.0.0.5")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Network(_)));
    }
}
