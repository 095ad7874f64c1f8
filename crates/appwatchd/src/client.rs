//! Minimal HTTP/1.1 GET over hyper.

use bytes::Bytes;
use http::{Request, Response, Uri};
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tracing::debug;

const USER_AGENT: &str = concat!("appwatchd/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("URL has no host: {0}")]
    MissingHost(Uri),

    #[error("connection to {address} failed: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("HTTP handshake failed: {0}")]
    Handshake(hyper::Error),

    #[error("failed to build request: {0}")]
    Build(#[from] http::Error),

    #[error("request failed: {0}")]
    Request(hyper::Error),
}

/// Issue a `GET` for `uri` on a fresh connection.
///
/// The response body streams from the connection, which is driven on a
/// background task until the body is dropped.
pub async fn get(uri: &Uri) -> Result<Response<Incoming>, HttpError> {
    let host = uri.host().ok_or_else(|| HttpError::MissingHost(uri.clone()))?;
    let address = format!("{host}:{}", uri.port_u16().unwrap_or(80));

    let stream = tokio::net::TcpStream::connect(&address)
        .await
        .map_err(|source| HttpError::Connect {
            address: address.clone(),
            source,
        })?;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(HttpError::Handshake)?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "http connection closed with error");
        }
    });

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .header("host", address.as_str())
        .header("user-agent", USER_AGENT)
        .header("accept", "application/json")
        .body(Empty::<Bytes>::new())?;

    sender.send_request(request).await.map_err(HttpError::Request)
}
