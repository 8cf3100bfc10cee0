use crate::error::TransportError;
use crate::media::UploadFile;
use crate::transport::{ProgressFn, UploadTransport};
use crate::upload_session::{CancelHandle, SessionId};

use std::sync::Arc;
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug)]
pub enum UploadCommand {
    Start {
        session: SessionId,
        file: UploadFile,
        cancel: CancelHandle,
    },
}

/// Transport events, tagged with the session they were issued for.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Progress {
        session: SessionId,
        fraction: Option<f64>,
    },
    Completed {
        session: SessionId,
        url: String,
    },
    Failed {
        session: SessionId,
        error: TransportError,
    },
}

impl UploadEvent {
    pub fn session(&self) -> SessionId {
        match self {
            UploadEvent::Progress { session, .. }
            | UploadEvent::Completed { session, .. }
            | UploadEvent::Failed { session, .. } => *session,
        }
    }
}

pub struct UploadManager {
    transport: Arc<dyn UploadTransport>,
    command_rx: mpsc::Receiver<UploadCommand>,
    event_tx: mpsc::Sender<UploadEvent>,
}

impl UploadManager {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        command_rx: mpsc::Receiver<UploadCommand>,
        event_tx: mpsc::Sender<UploadEvent>,
    ) -> Self {
        Self {
            transport,
            command_rx,
            event_tx,
        }
    }

    pub async fn run(mut self) {
        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                UploadCommand::Start {
                    session,
                    file,
                    cancel,
                } => {
                    let transport = self.transport.clone();
                    let event_tx = self.event_tx.clone();

                    // A cancelled transfer may still be unwinding when the
                    // next one starts; the session id keeps their events apart.
                    tokio::spawn(async move {
                        Self::upload_file(transport, session, file, cancel, event_tx).await;
                    });
                }
            }
        }
        tracing::debug!("Upload manager stopped");
    }

    async fn upload_file(
        transport: Arc<dyn UploadTransport>,
        session: SessionId,
        file: UploadFile,
        cancel: CancelHandle,
        event_tx: mpsc::Sender<UploadEvent>,
    ) {
        if cancel.is_cancelled() {
            tracing::debug!(%session, "Upload cancelled before it started");
            let _ = event_tx
                .send(UploadEvent::Failed {
                    session,
                    error: TransportError::Aborted,
                })
                .await;
            return;
        }

        let progress_tx = event_tx.clone();
        let on_progress: ProgressFn = Arc::new(move |fraction| {
            // Progress is lossy; dropping a report under backpressure is fine.
            let _ = progress_tx.try_send(UploadEvent::Progress { session, fraction });
        });

        let event = match transport.upload(file, cancel, on_progress).await {
            Ok(receipt) => UploadEvent::Completed {
                session,
                url: receipt.url,
            },
            Err(error) => UploadEvent::Failed { session, error },
        };

        if event_tx.send(event).await.is_err() {
            tracing::debug!(%session, "Upload finished after the receiver closed");
        }
    }
}

/// Spawns an upload manager and returns the command sender and event receiver.
pub fn create_upload_manager(
    transport: Arc<dyn UploadTransport>,
) -> (mpsc::Sender<UploadCommand>, mpsc::Receiver<UploadEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let manager = UploadManager::new(transport, cmd_rx, event_tx);

    tokio::spawn(async move {
        manager.run().await;
    });

    (cmd_tx, event_rx)
}
