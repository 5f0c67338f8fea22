//! Streaming HTTP transport.

use super::{CompletedTransfer, TransferDelegate, TransferId, TransferRequest, Transport};
use crate::error::TransferError;
use bridge_traits::{
    http::{HttpClient, HttpRequest},
    storage::FileSystemAccess,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Downloads over the host HTTP client, streaming bodies to temp files.
///
/// At most `max_concurrent` transfers move bytes at once; the rest wait for
/// a slot without reporting `on_started`.
pub struct HttpTransport {
    client: Arc<dyn HttpClient>,
    fs: Arc<dyn FileSystemAccess>,
    slots: Arc<Semaphore>,
    request_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(
        client: Arc<dyn HttpClient>,
        fs: Arc<dyn FileSystemAccess>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            client,
            fs,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            request_timeout: None,
        }
    }

    /// Bound the time to receive response headers for each transfer.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Slots currently free.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

impl Transport for HttpTransport {
    fn start(&self, request: TransferRequest, delegate: Arc<dyn TransferDelegate>) {
        let job = TransferJob {
            client: self.client.clone(),
            fs: self.fs.clone(),
            request_timeout: self.request_timeout,
            request,
            delegate,
        };
        tokio::spawn(job.run(self.slots.clone()));
    }
}

struct TransferJob {
    client: Arc<dyn HttpClient>,
    fs: Arc<dyn FileSystemAccess>,
    request_timeout: Option<Duration>,
    request: TransferRequest,
    delegate: Arc<dyn TransferDelegate>,
}

impl TransferJob {
    #[instrument(skip(self, slots), fields(transfer_id = %self.request.id))]
    async fn run(self, slots: Arc<Semaphore>) {
        let id = self.request.id;
        let cancel = self.request.cancel.clone();

        let permit = tokio::select! {
            _ = cancel.cancelled() => {
                self.delegate.on_failure(id, TransferError::Canceled).await;
                return;
            }
            permit = slots.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    let error = TransferError::Network("Transport shut down".to_string());
                    self.delegate.on_failure(id, error).await;
                    return;
                }
            },
        };

        self.delegate.on_started(id).await;

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(TransferError::Canceled),
            result = self.stream_body() => result,
        };
        drop(permit);

        match result {
            Ok(completed) => {
                info!("Transfer body received");
                self.delegate.on_complete(id, completed).await;
            }
            Err(error) => {
                if error != TransferError::Canceled {
                    warn!(error = %error, "Transfer failed");
                }
                self.discard_temp(&self.request.temp_path).await;
                self.delegate.on_failure(id, error).await;
            }
        }
    }

    async fn stream_body(&self) -> Result<CompletedTransfer, TransferError> {
        let id = self.request.id;
        let mut http_request = HttpRequest::get(self.request.url.clone());
        if let Some(timeout) = self.request_timeout {
            http_request = http_request.timeout(timeout);
        }

        let response = self.client.download(http_request).await?;
        let expected = response.content_length;
        let suggested_filename = response.suggested_filename;
        let mime_type = response.mime_type;
        let mut body = response.body;

        let mut writer = self.fs.open_write_stream(&self.request.temp_path).await?;
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut written: u64 = 0;

        loop {
            let read = body
                .read(&mut buffer)
                .await
                .map_err(|e| TransferError::Network(e.to_string()))?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..read])
                .await
                .map_err(|e| TransferError::Storage(e.to_string()))?;
            written += read as u64;
            self.delegate.on_progress(id, written, expected).await;
        }

        writer
            .shutdown()
            .await
            .map_err(|e| TransferError::Storage(e.to_string()))?;

        if let Some(expected) = expected {
            if written < expected {
                return Err(TransferError::Truncated {
                    received: written,
                    expected,
                });
            }
        }

        debug!(bytes = written, "Body streamed to temp file");
        Ok(CompletedTransfer::new(self.request.temp_path.clone())
            .with_suggested_filename(suggested_filename)
            .with_mime_type(mime_type))
    }

    async fn discard_temp(&self, path: &Path) {
        if let Err(e) = self.fs.delete_file(path).await {
            if !e.is_not_found() {
                warn!(error = %e, "Failed to remove partial transfer file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::DownloadResponse;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    /// Serves a fixed body, or an HTTP status error.
    struct StaticClient {
        body: Vec<u8>,
        status: Option<u16>,
        declared_length: Option<u64>,
    }

    #[async_trait]
    impl HttpClient for StaticClient {
        async fn download(&self, request: HttpRequest) -> BridgeResult<DownloadResponse> {
            if let Some(status) = self.status {
                return Err(BridgeError::HttpStatus {
                    status,
                    url: request.url,
                });
            }
            Ok(DownloadResponse {
                status: 200,
                content_length: self.declared_length,
                suggested_filename: Some("server.mp4".to_string()),
                mime_type: Some("video/mp4".to_string()),
                body: Box::new(std::io::Cursor::new(self.body.clone())),
            })
        }
    }

    #[derive(Debug, PartialEq)]
    enum Callback {
        Started,
        Progress(u64, Option<u64>),
        Complete(CompletedTransfer),
        Failure(TransferError),
    }

    struct Recorder {
        sender: mpsc::UnboundedSender<Callback>,
        progress: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl TransferDelegate for Recorder {
        async fn on_started(&self, _id: TransferId) {
            self.sender.send(Callback::Started).ok();
        }
        async fn on_progress(&self, _id: TransferId, written: u64, expected: Option<u64>) {
            self.progress.lock().push(written);
            self.sender.send(Callback::Progress(written, expected)).ok();
        }
        async fn on_complete(&self, _id: TransferId, completed: CompletedTransfer) {
            self.sender.send(Callback::Complete(completed)).ok();
        }
        async fn on_failure(&self, _id: TransferId, error: TransferError) {
            self.sender.send(Callback::Failure(error)).ok();
        }
    }

    fn recorder() -> (Arc<Recorder>, mpsc::UnboundedReceiver<Callback>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Recorder {
                sender,
                progress: Mutex::new(Vec::new()),
            }),
            receiver,
        )
    }

    fn request(dir: &tempfile::TempDir, id: u64) -> TransferRequest {
        TransferRequest {
            id: TransferId(id),
            url: "http://x/video.mp4".to_string(),
            temp_path: dir.path().join(format!("{}.part", id)),
            cancel: CancellationToken::new(),
        }
    }

    fn transport(client: StaticClient, max: usize) -> HttpTransport {
        HttpTransport::new(Arc::new(client), Arc::new(TokioFileSystem::new()), max)
    }

    async fn last(receiver: &mut mpsc::UnboundedReceiver<Callback>) -> Callback {
        let mut last = None;
        while let Some(callback) = receiver.recv().await {
            let terminal = matches!(callback, Callback::Complete(_) | Callback::Failure(_));
            last = Some(callback);
            if terminal {
                break;
            }
        }
        last.unwrap()
    }

    #[tokio::test]
    async fn test_streams_body_to_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let body = vec![7u8; 200_000];
        let transport = transport(
            StaticClient {
                body: body.clone(),
                status: None,
                declared_length: Some(body.len() as u64),
            },
            2,
        );
        let (delegate, mut receiver) = recorder();
        let req = request(&dir, 1);
        let temp: PathBuf = req.temp_path.clone();

        transport.start(req, delegate.clone());

        assert_eq!(receiver.recv().await.unwrap(), Callback::Started);
        match last(&mut receiver).await {
            Callback::Complete(done) => {
                assert_eq!(done.temp_location, temp);
                assert_eq!(done.suggested_filename.as_deref(), Some("server.mp4"));
                assert_eq!(done.mime_type.as_deref(), Some("video/mp4"));
            }
            other => panic!("unexpected callback: {:?}", other),
        }
        assert_eq!(std::fs::read(&temp).unwrap(), body);

        let progress = delegate.progress.lock().clone();
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(progress.last().copied(), Some(200_000));
    }

    #[tokio::test]
    async fn test_http_error_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport(
            StaticClient {
                body: Vec::new(),
                status: Some(404),
                declared_length: None,
            },
            1,
        );
        let (delegate, mut receiver) = recorder();
        let req = request(&dir, 2);
        let temp = req.temp_path.clone();

        transport.start(req, delegate);

        assert_eq!(
            last(&mut receiver).await,
            Callback::Failure(TransferError::Http { status: 404 })
        );
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn test_truncated_body_fails() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport(
            StaticClient {
                body: vec![1u8; 10],
                status: None,
                declared_length: Some(100),
            },
            1,
        );
        let (delegate, mut receiver) = recorder();

        transport.start(request(&dir, 3), delegate);

        assert_eq!(
            last(&mut receiver).await,
            Callback::Failure(TransferError::Truncated {
                received: 10,
                expected: 100
            })
        );
    }

    #[tokio::test]
    async fn test_canceled_while_waiting_for_slot() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport(
            StaticClient {
                body: vec![1u8; 10],
                status: None,
                declared_length: None,
            },
            1,
        );
        // Hold the only slot so the transfer queues.
        let held = transport.slots.clone().acquire_owned().await.unwrap();
        assert_eq!(transport.available_slots(), 0);

        let (delegate, mut receiver) = recorder();
        let req = request(&dir, 4);
        let cancel = req.cancel.clone();
        transport.start(req, delegate);
        cancel.cancel();

        assert_eq!(
            receiver.recv().await.unwrap(),
            Callback::Failure(TransferError::Canceled)
        );
        drop(held);
    }
}
