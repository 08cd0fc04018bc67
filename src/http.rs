use std::fmt;

use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, USER_AGENT};
use http::{Request, Response, header::HeaderValue};
use http_body_util::Empty;
use hyper::body::{Body, Incoming};
use hyper_rustls::{ConfigBuilderExt, HttpsConnector};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rustls::ClientConfig;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Failed to load native certificates: {0}")]
    NativeCerts(#[source] std::io::Error),
    #[error("Failed to make HTTP(S) request: {0}")]
    CallRequest(#[from] hyper_util::client::legacy::Error),
    #[error("Failed to read response: {0}")]
    ReadIncoming(#[from] hyper::Error),
    #[error("Failed to build HTTP request: {0}")]
    BuildRequest(#[from] http::Error),
}

/// A hyper client with sane defaults, usable for both `http` and
/// `https` endpoints.
#[derive(Clone)]
pub struct HttpClient<B = Empty<Bytes>> {
    client: Client<HttpsConnector<HttpConnector>, B>,
    user_agent: HeaderValue,
}

impl<B> HttpClient<B>
where
    B: fmt::Debug + Body + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    pub fn new() -> Result<HttpClient<B>, HttpError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);

        let config = ClientConfig::builder()
            .with_native_roots()
            .map_err(HttpError::NativeCerts)?
            .with_no_client_auth();
        let https = HttpsConnector::from((http, config));

        let client = Client::builder(TokioExecutor::new()).build(https);
        let user_agent =
            HeaderValue::from_str(&format!("sensor-sd/{}", env!("CARGO_PKG_VERSION")))
                .expect("Invalid header value for version!");

        Ok(HttpClient { client, user_agent })
    }

    pub async fn send(&self, mut req: Request<B>) -> Result<Response<Incoming>, HttpError> {
        default_request_headers(&mut req, &self.user_agent);

        let resp = self.client.request(req).await?;

        debug!(
            message = "HTTP response received",
            status = %resp.status(),
            version = ?resp.version(),
        );

        Ok(resp)
    }
}

fn default_request_headers<B>(request: &mut Request<B>, user_agent: &HeaderValue) {
    if !request.headers().contains_key(USER_AGENT) {
        request.headers_mut().insert(USER_AGENT, user_agent.clone());
    }

    // hardcoding until we support compressed responses
    if !request.headers().contains_key(ACCEPT_ENCODING) {
        request
            .headers_mut()
            .insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    }
}

impl<B> fmt::Debug for HttpClient<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("client", &self.client)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
