use std::time::Duration;

use bytes::Bytes;
use http::header::ACCEPT;
use http::{Request, StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::http::{HttpClient, HttpError};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("inventory request failed: {0}")]
    Http(#[from] HttpError),
    #[error("inventory request timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected status code {0}")]
    UnexpectedStatus(StatusCode),
    #[error("decode inventory response failed: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("unexpected inventory payload, expected an array of strings, got {0}")]
    UnexpectedShape(&'static str),
}

impl FetchError {
    /// Whether another attempt could reasonably succeed. Shape and
    /// decode errors are permanent, retrying won't fix them.
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(HttpError::CallRequest(_))
            | FetchError::Http(HttpError::ReadIncoming(_))
            | FetchError::Timeout(_) => true,
            FetchError::UnexpectedStatus(status) => matches!(
                *status,
                StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::INTERNAL_SERVER_ERROR
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ),
            _ => false,
        }
    }
}

/// How often and how patiently a single [`InventoryClient::sensors`]
/// call retries transient failures before giving up.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial: Duration,
    pub limit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            initial: Duration::from_secs(1),
            limit: Duration::from_secs(10),
        }
    }
}

pub struct InventoryClient {
    client: HttpClient<Empty<Bytes>>,
    endpoint: Uri,
    timeout: Duration,
    retry: RetryPolicy,
}

impl InventoryClient {
    pub fn new(endpoint: Uri, timeout: Duration) -> Result<Self, HttpError> {
        Ok(Self {
            client: HttpClient::new()?,
            endpoint,
            timeout,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch the current sensor list, in the order the inventory
    /// service returned it.
    pub async fn sensors(&self) -> Result<Vec<String>, FetchError> {
        let mut backoff = Backoff::new(self.retry.initial, self.retry.limit);
        let mut attempt = 1u32;

        let data = loop {
            match self.fetch_once().await {
                Ok(data) => break data,
                Err(err) if err.is_transient() && attempt < self.retry.attempts => {
                    warn!(
                        message = "fetch inventory failed, retrying",
                        attempt,
                        %err,
                    );

                    attempt += 1;
                    backoff.wait().await;
                }
                Err(err) => return Err(err),
            }
        };

        let sensors = decode(&data)?;
        debug!(message = "fetched inventory", sensors = sensors.len());

        Ok(sensors)
    }

    async fn fetch_once(&self) -> Result<Bytes, FetchError> {
        let req = Request::get(self.endpoint.clone())
            .header(ACCEPT, "application/json")
            .body(Empty::default())
            .map_err(HttpError::BuildRequest)?;

        let result = tokio::time::timeout(self.timeout, async {
            let resp = self.client.send(req).await?;

            let status = resp.status();
            if status != StatusCode::OK {
                return Err(FetchError::UnexpectedStatus(status));
            }

            let data = resp
                .into_body()
                .collect()
                .await
                .map_err(HttpError::ReadIncoming)?
                .to_bytes();

            Ok(data)
        })
        .await;

        match result {
            Ok(result) => result,
            Err(_elapsed) => Err(FetchError::Timeout(self.timeout)),
        }
    }
}

fn decode(data: &[u8]) -> Result<Vec<String>, FetchError> {
    let value = serde_json::from_slice::<serde_json::Value>(data)?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        other => return Err(FetchError::UnexpectedShape(json_kind(&other))),
    };

    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::String(host) => Ok(host),
            other => Err(FetchError::UnexpectedShape(json_kind(&other))),
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::Response;
    use http_body_util::Full;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;

    use super::*;

    /// Serves the scripted responses in order, repeating the last one
    /// forever. Returns the bound address and a request counter.
    async fn serve(script: Vec<(StatusCode, &'static str)>) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            let script = Arc::new(script);

            loop {
                let (conn, _peer) = listener.accept().await.unwrap();
                let script = Arc::clone(&script);
                let counter = Arc::clone(&counter);

                tokio::spawn(async move {
                    let service = service_fn(move |_req| {
                        let hit = counter.fetch_add(1, Ordering::SeqCst);
                        let (status, body) = script[hit.min(script.len() - 1)];

                        async move {
                            let resp = Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from_static(body.as_bytes())))
                                .unwrap();

                            Ok::<_, Infallible>(resp)
                        }
                    });

                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(conn), service)
                        .await;
                });
            }
        });

        (addr, hits)
    }

    fn client(addr: SocketAddr) -> InventoryClient {
        let endpoint = format!("http://{addr}/inventory").parse::<Uri>().unwrap();

        InventoryClient::new(endpoint, Duration::from_secs(5))
            .unwrap()
            .with_retry(RetryPolicy {
                attempts: 4,
                initial: Duration::from_millis(10),
                limit: Duration::from_millis(40),
            })
    }

    #[tokio::test]
    async fn fetch_preserves_order() {
        let (addr, hits) = serve(vec![(
            StatusCode::OK,
            r#"["sensor-2","sensor-1","sensor-2"]"#,
        )])
        .await;

        let sensors = client(addr).sensors().await.unwrap();

        assert_eq!(sensors, vec!["sensor-2", "sensor-1", "sensor-2"]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_inventory_is_valid() {
        let (addr, _hits) = serve(vec![(StatusCode::OK, "[]")]).await;

        let sensors = client(addr).sensors().await.unwrap();

        assert!(sensors.is_empty());
    }

    #[tokio::test]
    async fn retries_transient_status() {
        let (addr, hits) = serve(vec![
            (StatusCode::SERVICE_UNAVAILABLE, ""),
            (StatusCode::OK, r#"["sensor-1"]"#),
        ])
        .await;

        let sensors = client(addr).sensors().await.unwrap();

        assert_eq!(sensors, vec!["sensor-1"]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let (addr, hits) = serve(vec![(StatusCode::BAD_GATEWAY, "")]).await;

        let err = client(addr).sensors().await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::UnexpectedStatus(StatusCode::BAD_GATEWAY)
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn not_found_fails_fast() {
        let (addr, hits) = serve(vec![(StatusCode::NOT_FOUND, "")]).await;

        let err = client(addr).sensors().await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::UnexpectedStatus(StatusCode::NOT_FOUND)
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn object_payload_is_not_retried() {
        let (addr, hits) = serve(vec![(StatusCode::OK, r#"{"error":"x"}"#)]).await;

        let err = client(addr).sensors().await.unwrap_err();

        assert!(matches!(err, FetchError::UnexpectedShape("an object")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_string_element_is_rejected() {
        let (addr, _hits) = serve(vec![(StatusCode::OK, r#"["sensor-1",2]"#)]).await;

        let err = client(addr).sensors().await.unwrap_err();

        assert!(matches!(err, FetchError::UnexpectedShape("a number")));
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let (addr, hits) = serve(vec![(StatusCode::OK, r#"["sensor-1""#)]).await;

        let err = client(addr).sensors().await.unwrap_err();

        assert!(matches!(err, FetchError::InvalidJson(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        // Bind then drop, so nothing is listening on the port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = format!("http://{addr}/inventory").parse::<Uri>().unwrap();
        let client = InventoryClient::new(endpoint, Duration::from_secs(1))
            .unwrap()
            .with_retry(RetryPolicy {
                attempts: 2,
                initial: Duration::from_millis(10),
                limit: Duration::from_millis(10),
            });

        let err = client.sensors().await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::Http(HttpError::CallRequest(_)) | FetchError::Timeout(_)
        ));
    }
}
