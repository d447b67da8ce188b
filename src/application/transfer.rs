//! Streams one accepted download to disk and reports progress back to the panel.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{stream::BoxStream, StreamExt};
use tokio::io::AsyncWriteExt;
use url::Url;

use super::download_manager::AcceptedDownload;
use crate::api::ApiClient;
use crate::domain::DownloadError;

#[derive(Debug, Clone)]
pub enum TransferEvent {
    Progress { received: u64, total: Option<u64> },
    Finished(Result<PathBuf, DownloadError>),
}

impl TransferEvent {
    fn failed(error: DownloadError) -> Self {
        TransferEvent::Finished(Err(error))
    }
}

/// Runs the transfer for `download`, ending with exactly one `Finished` event.
///
/// The cancel flag is checked before every chunk. A transfer that does not
/// complete removes its partial file.
pub fn transfer_stream(
    client: ApiClient,
    download: AcceptedDownload,
) -> BoxStream<'static, TransferEvent> {
    futures::stream::unfold(
        TransferState::Start {
            client,
            url: download.url,
            path: download.path,
            cancelled: download.cancel_flag,
        },
        step,
    )
    .boxed()
}

async fn step(state: TransferState) -> Option<(TransferEvent, TransferState)> {
    match state {
        TransferState::Start {
            client,
            url,
            path,
            cancelled,
        } => {
            if cancelled.load(Ordering::SeqCst) {
                return Some((
                    TransferEvent::failed(DownloadError::Aborted),
                    TransferState::Finished,
                ));
            }

            if let Some(parent) = path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return Some((
                        TransferEvent::failed(DownloadError::Io(format!(
                            "Failed to create directory: {}",
                            e
                        ))),
                        TransferState::Finished,
                    ));
                }
            }

            let file = match tokio::fs::File::create(&path).await {
                Ok(file) => file,
                Err(e) => {
                    return Some((
                        TransferEvent::failed(DownloadError::Io(format!(
                            "Failed to create file: {}",
                            e
                        ))),
                        TransferState::Finished,
                    ));
                }
            };

            match client.download_file_stream(&url).await {
                Ok((total, stream)) => Some((
                    TransferEvent::Progress { received: 0, total },
                    TransferState::Downloading {
                        file,
                        stream: stream.boxed(),
                        received: 0,
                        total,
                        path,
                        cancelled,
                    },
                )),
                Err(e) => Some(
                    abandon(file, &path, DownloadError::DownloadFailed(e.to_string())).await,
                ),
            }
        }
        TransferState::Downloading {
            mut file,
            mut stream,
            mut received,
            total,
            path,
            cancelled,
        } => {
            if cancelled.load(Ordering::SeqCst) {
                tracing::debug!("Transfer to {} cancelled", path.display());
                return Some(abandon(file, &path, DownloadError::Aborted).await);
            }

            match stream.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = file.write_all(&chunk).await {
                        let error = DownloadError::Io(format!("Write error: {}", e));
                        return Some(abandon(file, &path, error).await);
                    }

                    received += chunk.len() as u64;

                    Some((
                        TransferEvent::Progress { received, total },
                        TransferState::Downloading {
                            file,
                            stream,
                            received,
                            total,
                            path,
                            cancelled,
                        },
                    ))
                }
                Some(Err(e)) => Some(
                    abandon(file, &path, DownloadError::DownloadFailed(e.to_string())).await,
                ),
                None => {
                    if let Err(e) = file.sync_all().await {
                        let error = DownloadError::Io(format!("Failed to sync file: {}", e));
                        return Some(abandon(file, &path, error).await);
                    }

                    Some((TransferEvent::Finished(Ok(path)), TransferState::Finished))
                }
            }
        }
        TransferState::Finished => None,
    }
}

/// Closes and deletes the partial file, then reports `error` as the outcome.
async fn abandon(
    file: tokio::fs::File,
    path: &Path,
    error: DownloadError,
) -> (TransferEvent, TransferState) {
    drop(file);
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!("Could not remove partial file {}: {}", path.display(), e);
    }
    (TransferEvent::failed(error), TransferState::Finished)
}

enum TransferState {
    Start {
        client: ApiClient,
        url: Url,
        path: PathBuf,
        cancelled: Arc<AtomicBool>,
    },
    Downloading {
        file: tokio::fs::File,
        stream: BoxStream<'static, crate::api::Result<bytes::Bytes>>,
        received: u64,
        total: Option<u64>,
        path: PathBuf,
        cancelled: Arc<AtomicBool>,
    },
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClientConfig;
    use crate::domain::SessionId;

    fn accepted(url: Url, path: PathBuf) -> AcceptedDownload {
        AcceptedDownload {
            id: SessionId(1),
            url,
            path,
            page_format: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    #[tokio::test]
    async fn test_transfer_writes_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file.bin")
            .with_status(200)
            .with_body(vec![1u8; 4096])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.bin");
        let url = Url::parse(&format!("{}/file.bin", server.url())).unwrap();
        let client = ApiClient::new(ClientConfig::default());

        let events: Vec<TransferEvent> = transfer_stream(client, accepted(url, path.clone()))
            .collect()
            .await;

        assert!(matches!(
            events.first(),
            Some(TransferEvent::Progress {
                received: 0,
                total: Some(4096)
            })
        ));
        let last_progress = events.iter().rev().find_map(|event| match event {
            TransferEvent::Progress { received, .. } => Some(*received),
            TransferEvent::Finished(_) => None,
        });
        assert_eq!(last_progress, Some(4096));
        assert!(matches!(events.last(), Some(TransferEvent::Finished(Ok(p))) if *p == path));
        assert_eq!(std::fs::read(&path).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_cancelled_transfer_removes_partial_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file.bin")
            .with_status(200)
            .with_body(vec![1u8; 1024])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        let url = Url::parse(&format!("{}/file.bin", server.url())).unwrap();
        let download = accepted(url, path.clone());
        let flag = Arc::clone(&download.cancel_flag);

        let mut stream = transfer_stream(ApiClient::new(ClientConfig::default()), download);
        assert!(matches!(
            stream.next().await,
            Some(TransferEvent::Progress { received: 0, .. })
        ));
        assert!(path.exists());

        flag.store(true, Ordering::SeqCst);
        assert!(matches!(
            stream.next().await,
            Some(TransferEvent::Finished(Err(DownloadError::Aborted)))
        ));
        assert!(stream.next().await.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_broken_stream_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        let file = tokio::fs::File::create(&path).await.unwrap();
        let chunks: Vec<crate::api::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(b"partial")),
            Err(url::ParseError::EmptyHost.into()),
        ];
        let state = TransferState::Downloading {
            file,
            stream: futures::stream::iter(chunks).boxed(),
            received: 0,
            total: Some(1024),
            path: path.clone(),
            cancelled: Arc::new(AtomicBool::new(false)),
        };

        let events: Vec<TransferEvent> = futures::stream::unfold(state, step).collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            TransferEvent::Progress {
                received: 7,
                total: Some(1024)
            }
        ));
        assert!(matches!(
            events[1],
            TransferEvent::Finished(Err(DownloadError::DownloadFailed(_)))
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_abandon_deletes_file_and_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        let mut file = tokio::fs::File::create(&path).await.unwrap();
        file.write_all(b"half").await.unwrap();

        let error = DownloadError::Io("Write error: disk full".into());
        let (event, next) = abandon(file, &path, error).await;

        assert!(matches!(event, TransferEvent::Finished(Err(DownloadError::Io(_)))));
        assert!(matches!(next, TransferState::Finished));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_http_error_fails_transfer() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone")
            .with_status(410)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.bin");
        let url = Url::parse(&format!("{}/gone", server.url())).unwrap();

        let events: Vec<TransferEvent> =
            transfer_stream(ApiClient::new(ClientConfig::default()), accepted(url, path.clone()))
                .collect()
                .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            TransferEvent::Finished(Err(DownloadError::DownloadFailed(_)))
        ));
        assert!(!path.exists());
    }
}
