//! Per-workload event streams over HTTP.
//!
//! A workload's stream endpoint answers `GET` with a long-lived body of
//! newline-delimited JSON envelopes. The provider forwards each decoded
//! envelope to the watcher. A failed connect, non-2xx status, read error
//! or undecodable line goes to the error channel; either way the task then
//! ends and both channels close.

use bytes::{Bytes, BytesMut};
use http::Uri;
use http_body_util::BodyExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use appwatch_core::{
    Envelope, EventStream, EventStreamProvider, StreamConnector, StreamError, WorkloadIdentity,
};

use crate::client;

/// Envelopes buffered between the HTTP body and the watcher.
pub const ENVELOPE_BUFFER: usize = 256;

/// Builds providers rooted at one stream base URL.
#[derive(Debug, Clone)]
pub struct HttpStreamConnector {
    base_url: String,
}

impl HttpStreamConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn stream_url(&self, identity: &WorkloadIdentity) -> String {
        format!("{}/v1/workloads/{identity}/stream", self.base_url)
    }
}

impl StreamConnector for HttpStreamConnector {
    type Provider = HttpStreamProvider;

    fn connect(&self, identity: &WorkloadIdentity) -> HttpStreamProvider {
        HttpStreamProvider::new(identity.clone(), self.stream_url(identity))
    }
}

pub struct HttpStreamProvider {
    identity: WorkloadIdentity,
    url: String,
    task: Option<JoinHandle<()>>,
}

impl HttpStreamProvider {
    pub fn new(identity: WorkloadIdentity, url: String) -> Self {
        Self {
            identity,
            url,
            task: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl EventStreamProvider for HttpStreamProvider {
    fn start(&mut self) -> EventStream {
        let (envelopes_tx, envelopes) = mpsc::channel(ENVELOPE_BUFFER);
        let (errors_tx, errors) = mpsc::channel(1);

        debug!(guid = %self.identity, url = %self.url, "opening event stream");
        let task = tokio::spawn(stream_envelopes(
            self.identity.clone(),
            self.url.clone(),
            envelopes_tx,
            errors_tx,
        ));
        if let Some(previous) = self.task.replace(task) {
            previous.abort();
        }

        EventStream { envelopes, errors }
    }

    fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(guid = %self.identity, "event stream closed");
        }
    }
}

impl Drop for HttpStreamProvider {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn stream_envelopes(
    identity: WorkloadIdentity,
    url: String,
    envelopes: mpsc::Sender<Envelope>,
    errors: mpsc::Sender<StreamError>,
) {
    match forward(&url, &envelopes).await {
        Ok(()) => debug!(guid = %identity, "event stream ended"),
        Err(e) => {
            warn!(guid = %identity, error = %e, "event stream failed");
            let _ = errors.send(e).await;
        }
    }
}

async fn forward(url: &str, envelopes: &mpsc::Sender<Envelope>) -> Result<(), StreamError> {
    let uri: Uri = url
        .parse()
        .map_err(|e| StreamError::Connect(format!("invalid stream URL {url:?}: {e}")))?;

    let response = client::get(&uri)
        .await
        .map_err(|e| StreamError::Connect(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(StreamError::Status(status.as_u16()));
    }

    let mut body = response.into_body();
    let mut lines = LineBuffer::default();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| StreamError::Read(e.to_string()))?;
        // Trailers carry no envelopes.
        let Ok(data) = frame.into_data() else {
            continue;
        };
        for line in lines.push(&data) {
            if envelopes.send(decode_envelope(&line)?).await.is_err() {
                // Watcher is gone.
                return Ok(());
            }
        }
    }

    if let Some(line) = lines.finish() {
        let _ = envelopes.send(decode_envelope(&line)?).await;
    }
    Ok(())
}

/// Decode one stream line into an envelope.
pub fn decode_envelope(line: &[u8]) -> Result<Envelope, StreamError> {
    serde_json::from_slice(line).map_err(|e| StreamError::Decode(e.to_string()))
}

/// Splits a chunked byte stream into non-blank lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: BytesMut,
}

impl LineBuffer {
    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line = self.pending.split_to(end + 1);
            line.truncate(end);
            if let Some(line) = non_blank(line.freeze()) {
                lines.push(line);
            }
        }
        lines
    }

    /// The trailing line, if the stream ended without a newline.
    pub fn finish(&mut self) -> Option<Bytes> {
        non_blank(self.pending.split().freeze())
    }
}

fn non_blank(mut line: Bytes) -> Option<Bytes> {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use appwatch_core::MessageType;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one raw HTTP response to the first connection, then hang up.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn lines_split_across_chunks() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"{\"a\":").is_empty());
        let lines = buffer.push(b"1}\n{\"b\":2}\n{\"c\"");
        assert_eq!(lines, vec![Bytes::from_static(b"{\"a\":1}"), Bytes::from_static(b"{\"b\":2}")]);
        assert_eq!(buffer.finish(), Some(Bytes::from_static(b"{\"c\"")));
    }

    #[test]
    fn crlf_and_blank_lines() {
        let mut buffer = LineBuffer::default();
        let lines = buffer.push(b"one\r\n\r\n  \ntwo\n");
        assert_eq!(lines, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn decodes_each_envelope_kind() {
        let metric = decode_envelope(
            br#"{"type":"container_metric","instance_index":1,"cpu_percentage":2.5,"memory_bytes":10,"memory_bytes_quota":20,"disk_bytes":5,"disk_bytes_quota":50}"#,
        )
        .unwrap();
        assert!(matches!(metric, Envelope::ContainerMetric(m) if m.instance_index == 1));

        let log = decode_envelope(
            br#"{"type":"log_message","message":"hi","message_type":"OUT","source_type":"APP/PROC/WEB"}"#,
        )
        .unwrap();
        assert!(matches!(log, Envelope::LogMessage(l) if l.message_type == MessageType::Out));

        let http = decode_envelope(
            br#"{"type":"http_start_stop","start_timestamp":1,"stop_timestamp":2,"status_code":200,"instance_index":0}"#,
        )
        .unwrap();
        assert!(matches!(http, Envelope::HttpStartStop(h) if h.status_code == 200));
    }

    #[test]
    fn unknown_kind_decodes_to_other() {
        let envelope = decode_envelope(br#"{"type":"value_metric","name":"x"}"#).unwrap();
        assert_eq!(envelope, Envelope::Other);
    }

    #[test]
    fn garbage_line_is_a_decode_error() {
        let err = decode_envelope(b"not json").unwrap_err();
        assert!(matches!(err, StreamError::Decode(_)));
    }

    #[test]
    fn connector_builds_per_workload_url() {
        let connector = HttpStreamConnector::new("http://logs.local:8081/");
        let provider = connector.connect(&"g1".into());
        assert_eq!(provider.url(), "http://logs.local:8081/v1/workloads/g1/stream");
    }

    #[tokio::test]
    async fn forwards_envelopes_then_closes() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\nconnection: close\r\n\r\n\
             {\"type\":\"log_message\",\"message\":\"a\",\"message_type\":\"out\",\"source_type\":\"API\"}\n\
             {\"type\":\"value_metric\"}\n",
        )
        .await;

        let mut provider = HttpStreamConnector::new(base).connect(&"g1".into());
        let mut stream = provider.start();

        assert!(matches!(stream.envelopes.recv().await, Some(Envelope::LogMessage(_))));
        assert_eq!(stream.envelopes.recv().await, Some(Envelope::Other));
        assert_eq!(stream.envelopes.recv().await, None);
        assert!(stream.errors.recv().await.is_none());
        provider.close();
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let base = serve_once("HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n").await;

        let mut provider = HttpStreamConnector::new(base).connect(&"g1".into());
        let mut stream = provider.start();

        assert!(matches!(stream.errors.recv().await, Some(StreamError::Status(404))));
        assert_eq!(stream.envelopes.recv().await, None);
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut provider = HttpStreamConnector::new(format!("http://{addr}")).connect(&"g1".into());
        let mut stream = provider.start();

        assert!(matches!(stream.errors.recv().await, Some(StreamError::Connect(_))));
    }

    #[tokio::test]
    async fn close_ends_the_subscription() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and never answer.
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let mut provider = HttpStreamConnector::new(format!("http://{addr}")).connect(&"g1".into());
        let mut stream = provider.start();
        provider.close();

        assert_eq!(stream.envelopes.recv().await, None);
        assert!(stream.errors.recv().await.is_none());
    }
}
