#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use http::{Response, StatusCode, Uri};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::net::TcpListener;

pub fn temp_file() -> PathBuf {
    let name = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect::<String>();

    std::env::temp_dir().join(name).with_extension("json")
}

/// An inventory service stub answering every request with the response
/// set via [`MockInventory::respond`].
pub struct MockInventory {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
    response: Arc<Mutex<(StatusCode, String)>>,
}

impl MockInventory {
    pub async fn start(status: StatusCode, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let response = Arc::new(Mutex::new((status, body.to_string())));

        let counter = Arc::clone(&hits);
        let current = Arc::clone(&response);
        tokio::spawn(async move {
            loop {
                let (conn, _peer) = listener.accept().await.unwrap();
                let counter = Arc::clone(&counter);
                let current = Arc::clone(&current);

                tokio::spawn(async move {
                    let service = service_fn(move |_req| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let (status, body) = current.lock().unwrap().clone();

                        async move {
                            let resp = Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from(body)))
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

        Self {
            addr,
            hits,
            response,
        }
    }

    pub fn respond(&self, status: StatusCode, body: &str) {
        *self.response.lock().unwrap() = (status, body.to_string());
    }

    pub fn endpoint(&self) -> Uri {
        format!("http://{}/inventory", self.addr).parse().unwrap()
    }
}
