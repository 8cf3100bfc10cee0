//! Upload transport
//!
//! The session only depends on [`UploadTransport`]. [`HttpTransport`] posts
//! the file as multipart form data:
//!
//! ```text
//! POST {api_url}/upload      field "file"
//! <- { "fileKey": "..." }
//! URL = {api_url}/url/{fileKey}
//! ```

use crate::error::TransportError;
use crate::media::UploadFile;
use crate::upload_session::CancelHandle;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const CHUNK_SIZE: usize = 65536; // 64KB chunks

/// Receives the fraction of the body sent so far, in `[0, 1]`.
pub type ProgressFn = Arc<dyn Fn(Option<f64>) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub url: String,
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Uploads `file`, reporting progress through `on_progress`.
    ///
    /// Must return [`TransportError::Aborted`] promptly once `cancel` fires.
    async fn upload(
        &self,
        file: UploadFile,
        cancel: CancelHandle,
        on_progress: ProgressFn,
    ) -> Result<UploadReceipt, TransportError>;
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(rename = "fileKey")]
    file_key: String,
}

pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
}

impl HttpTransport {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn upload_endpoint(&self) -> String {
        format!("{}/upload", self.api_url)
    }

    fn file_url(&self, file_key: &str) -> String {
        format!("{}/url/{}", self.api_url, file_key)
    }

    fn body(
        file: UploadFile,
        on_progress: ProgressFn,
    ) -> Result<reqwest::multipart::Part, TransportError> {
        let total = file.bytes.len() as u64;
        let body = reqwest::Body::wrap_stream(progress_chunks(file.bytes, on_progress));

        let part = reqwest::multipart::Part::stream_with_length(body, total)
            .file_name(file.name)
            .mime_str(&file.media_type)?;

        Ok(part)
    }

    async fn send(
        &self,
        file: UploadFile,
        on_progress: ProgressFn,
    ) -> Result<UploadReceipt, TransportError> {
        let form = reqwest::multipart::Form::new().part("file", Self::body(file, on_progress)?);

        let response = self
            .client
            .post(self.upload_endpoint())
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TransportError::Status { status, body });
        }

        let text = response.text().await?;
        let parsed: UploadResponse = serde_json::from_str(&text)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        Ok(UploadReceipt {
            url: self.file_url(&parsed.file_key),
        })
    }
}

/// Splits the payload into chunks, reporting the cumulative fraction as each
/// chunk is handed to the HTTP client.
fn progress_chunks(
    bytes: Vec<u8>,
    on_progress: ProgressFn,
) -> impl futures_util::Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + Sync + 'static {
    let total = bytes.len();
    let chunks: Vec<Vec<u8>> = bytes.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();

    let mut sent = 0usize;
    futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len();
        on_progress(Some(sent as f64 / total as f64));
        Ok(chunk)
    }))
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn upload(
        &self,
        file: UploadFile,
        cancel: CancelHandle,
        on_progress: ProgressFn,
    ) -> Result<UploadReceipt, TransportError> {
        tracing::debug!(endpoint = %self.upload_endpoint(), name = %file.name, "Sending upload");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Aborted),
            result = self.send(file, on_progress) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn transport() -> HttpTransport {
        HttpTransport::new("https://img.example.com/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_urls() {
        let t = transport();
        assert_eq!(t.upload_endpoint(), "https://img.example.com/upload");
        assert_eq!(t.file_url("abc-123.png"), "https://img.example.com/url/abc-123.png");
    }

    #[test]
    fn test_response_parsing() {
        let parsed: UploadResponse = serde_json::from_str(r#"{"fileKey":"k1"}"#).unwrap();
        assert_eq!(parsed.file_key, "k1");
        assert!(serde_json::from_str::<UploadResponse>(r#"{"url":"x"}"#).is_err());
    }

    #[tokio::test]
    async fn test_cancelled_before_send_is_aborted() {
        let cancel = CancelHandle::new();
        cancel.cancel();

        let file = UploadFile::new("a.png", "image/png", vec![0; 10]);
        let result = transport().upload(file, cancel, Arc::new(|_| {})).await;
        assert_eq!(result, Err(TransportError::Aborted));
    }

    #[tokio::test]
    async fn test_chunks_report_cumulative_progress() {
        use futures_util::StreamExt;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let on_progress: ProgressFn = Arc::new(move |f| sink.lock().unwrap().push(f));

        let bytes = vec![7u8; CHUNK_SIZE * 2 + 10];
        let chunks: Vec<_> = progress_chunks(bytes, on_progress).collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].as_ref().unwrap().len(), 10);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], Some(CHUNK_SIZE as f64 / (CHUNK_SIZE * 2 + 10) as f64));
        assert_eq!(seen.last(), Some(&Some(1.0)));
    }

    #[tokio::test]
    async fn test_empty_file_reports_nothing() {
        use futures_util::StreamExt;

        let on_progress: ProgressFn = Arc::new(|_| panic!("no chunks expected"));
        let chunks: Vec<_> = progress_chunks(Vec::new(), on_progress).collect().await;
        assert!(chunks.is_empty());
    }
}
