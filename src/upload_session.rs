//! Upload session state machine.
//!
//! ```text
//! Idle -> Transferring -> Succeeded | Failed | Cancelled -> (reset) -> Idle
//! ```
//!
//! Every `start` allocates a new [`SessionId`]. Transport events carry the id
//! they were issued with, and anything that does not match the session that
//! is currently transferring is dropped. This covers progress that arrives
//! after a cancel and late results from a transfer that was replaced.

use crate::effects::SideEffects;
use crate::error::{TransportError, UploadError};
use crate::media::UploadFile;
use crate::recent_uploads::RecentUploadsStore;

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Transferring,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed | SessionState::Cancelled
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Transferring => write!(f, "Transferring"),
            SessionState::Succeeded => write!(f, "Succeeded"),
            SessionState::Failed => write!(f, "Failed"),
            SessionState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Cooperative cancellation signal shared with the transport.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// What the caller needs to issue the transfer for a freshly started session.
#[derive(Debug, Clone)]
pub struct UploadTicket {
    pub session: SessionId,
    pub cancel: CancelHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// `storage_warning` is set when the URL could not be persisted; the
    /// in-memory recent list still holds it.
    Succeeded {
        url: String,
        storage_warning: Option<String>,
    },
    /// The result belonged to a session that is no longer transferring.
    Stale,
}

pub struct UploadSession {
    next_id: u64,
    id: Option<SessionId>,
    file_name: Option<String>,
    state: SessionState,
    progress_percent: u8,
    result_url: Option<String>,
    cancel: Option<CancelHandle>,
    progress_tx: watch::Sender<u8>,
}

impl UploadSession {
    pub fn new() -> Self {
        let (progress_tx, _rx) = watch::channel(0);
        Self {
            next_id: 1,
            id: None,
            file_name: None,
            state: SessionState::Idle,
            progress_percent: 0,
            result_url: None,
            cancel: None,
            progress_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn result_url(&self) -> Option<&str> {
        self.result_url.as_deref()
    }

    pub fn is_transferring(&self) -> bool {
        self.state == SessionState::Transferring
    }

    /// Progress readable from other tasks while a transfer runs.
    pub fn watch_progress(&self) -> watch::Receiver<u8> {
        self.progress_tx.subscribe()
    }

    pub fn start(&mut self, file: &UploadFile) -> Result<UploadTicket, UploadError> {
        if !file.is_image() {
            tracing::info!(name = %file.name, media_type = %file.media_type, "Rejected non-image file");
            return Err(UploadError::UnsupportedMediaType(file.media_type.clone()));
        }

        match self.state {
            SessionState::Idle => {}
            SessionState::Transferring => return Err(UploadError::ConcurrentStartRejected),
            _ => return Err(UploadError::NotIdle),
        }

        let session = SessionId(self.next_id);
        self.next_id += 1;

        let cancel = CancelHandle::new();
        self.id = Some(session);
        self.file_name = Some(file.name.clone());
        self.state = SessionState::Transferring;
        self.result_url = None;
        self.cancel = Some(cancel.clone());
        self.set_progress(0);

        tracing::info!(%session, name = %file.name, bytes = file.bytes.len(), "Upload started");
        Ok(UploadTicket { session, cancel })
    }

    fn is_current(&self, session: SessionId) -> bool {
        self.state == SessionState::Transferring && self.id == Some(session)
    }

    fn set_progress(&mut self, percent: u8) {
        self.progress_percent = percent;
        self.progress_tx.send_replace(percent);
    }

    /// Applies a transport progress report. Absent, non-finite or stale
    /// reports are ignored and the percentage never goes backwards.
    pub fn on_progress(&mut self, session: SessionId, fraction: Option<f64>) {
        if !self.is_current(session) {
            tracing::trace!(%session, "Dropped stale progress");
            return;
        }
        let Some(fraction) = fraction.filter(|f| f.is_finite()) else {
            return;
        };

        let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u8;
        if percent > self.progress_percent {
            self.set_progress(percent);
        }
    }

    /// Aborts the running transfer. Returns false when nothing was running.
    pub fn cancel(&mut self) -> bool {
        if self.state != SessionState::Transferring {
            return false;
        }
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.state = SessionState::Cancelled;
        tracing::info!(session = ?self.id, "Upload cancelled");
        true
    }

    /// Handles the transport's final answer for `session`.
    ///
    /// On success the URL is copied, stored and announced, once. Failures
    /// are announced and returned to the caller. Results for a session that
    /// is not the one transferring are ignored.
    pub fn on_transfer_result(
        &mut self,
        session: SessionId,
        result: Result<String, TransportError>,
        recent: &mut RecentUploadsStore,
        effects: &SideEffects,
    ) -> Result<TransferOutcome, UploadError> {
        if !self.is_current(session) {
            tracing::debug!(%session, "Dropped stale transfer result");
            return Ok(TransferOutcome::Stale);
        }
        self.cancel = None;

        match result {
            Ok(url) => {
                self.state = SessionState::Succeeded;
                self.set_progress(100);
                self.result_url = Some(url.clone());
                tracing::info!(%session, %url, "Upload succeeded");

                let copied = effects.copy(&url);
                let storage_warning = recent.add(&url).err().map(|e| {
                    tracing::warn!(error = %e, "Failed to persist recent uploads");
                    e.to_string()
                });
                effects.upload_completed(copied);

                Ok(TransferOutcome::Succeeded {
                    url,
                    storage_warning,
                })
            }
            Err(e) => {
                self.state = SessionState::Failed;
                tracing::warn!(%session, error = %e, "Upload failed");
                effects.upload_failed(&e.to_string());
                Err(UploadError::TransferFailed(e))
            }
        }
    }

    /// Starts an upload for a dropped or selected file.
    ///
    /// An image replaces whatever is running: the current transfer is
    /// cancelled, the session reset, and a new session started. A non-image
    /// leaves the session untouched and raises the "not allowed" notification.
    pub fn begin(
        &mut self,
        file: &UploadFile,
        effects: &SideEffects,
    ) -> Result<UploadTicket, UploadError> {
        if file.is_image() {
            if self.cancel() {
                tracing::info!(name = %file.name, "Replacing running upload");
            }
            if self.state.is_terminal() {
                self.reset();
            }
        }

        let result = self.start(file);
        if let Err(UploadError::UnsupportedMediaType(_)) = &result {
            effects.not_allowed();
        }
        result
    }

    /// Returns a terminal session to `Idle`. Does nothing while transferring.
    pub fn reset(&mut self) {
        if self.state == SessionState::Transferring {
            return;
        }
        self.state = SessionState::Idle;
        self.file_name = None;
        self.result_url = None;
        self.cancel = None;
        self.set_progress(0);
    }
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::testing::Recorder;
    use crate::error::StorageError;
    use crate::storage::{KeyValueStore, MemoryStore};

    fn png(name: &str) -> UploadFile {
        UploadFile::new(name, "image/png", vec![1, 2, 3])
    }

    fn recent() -> RecentUploadsStore {
        RecentUploadsStore::new(Box::new(MemoryStore::new()))
    }

    #[test]
    fn test_start_transitions_to_transferring() {
        let mut session = UploadSession::new();
        let ticket = session.start(&png("a.png")).unwrap();

        assert_eq!(session.state(), SessionState::Transferring);
        assert_eq!(session.id(), Some(ticket.session));
        assert_eq!(session.file_name(), Some("a.png"));
        assert_eq!(session.progress_percent(), 0);
        assert!(!ticket.cancel.is_cancelled());
    }

    #[test]
    fn test_non_image_is_rejected_without_state_change() {
        let mut session = UploadSession::new();
        let file = UploadFile::new("notes.txt", "text/plain", vec![]);

        let err = session.start(&file).unwrap_err();
        assert_eq!(err, UploadError::UnsupportedMediaType("text/plain".into()));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.id(), None);
    }

    #[test]
    fn test_second_start_is_rejected_while_transferring() {
        let mut session = UploadSession::new();
        let first = session.start(&png("a.png")).unwrap();

        assert_eq!(
            session.start(&png("b.png")).unwrap_err(),
            UploadError::ConcurrentStartRejected
        );
        assert_eq!(session.id(), Some(first.session));
    }

    #[test]
    fn test_start_requires_reset_after_terminal_state() {
        let mut session = UploadSession::new();
        session.start(&png("a.png")).unwrap();
        session.cancel();

        assert_eq!(session.start(&png("b.png")).unwrap_err(), UploadError::NotIdle);
        session.reset();
        assert!(session.start(&png("b.png")).is_ok());
    }

    #[test]
    fn test_progress_rounds_and_never_decreases() {
        let mut session = UploadSession::new();
        let id = session.start(&png("a.png")).unwrap().session;

        session.on_progress(id, Some(0.104));
        assert_eq!(session.progress_percent(), 10);
        session.on_progress(id, Some(0.555));
        assert_eq!(session.progress_percent(), 56);
        session.on_progress(id, Some(0.3));
        assert_eq!(session.progress_percent(), 56);
        session.on_progress(id, Some(1.7));
        assert_eq!(session.progress_percent(), 100);
    }

    #[test]
    fn test_progress_monotonic_for_sorted_fractions() {
        let mut session = UploadSession::new();
        let id = session.start(&png("a.png")).unwrap().session;

        let mut last = 0;
        for step in 0..=200 {
            session.on_progress(id, Some(step as f64 / 200.0));
            assert!(session.progress_percent() >= last);
            last = session.progress_percent();
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_invalid_progress_is_ignored() {
        let mut session = UploadSession::new();
        let id = session.start(&png("a.png")).unwrap().session;
        session.on_progress(id, Some(0.4));

        session.on_progress(id, None);
        session.on_progress(id, Some(f64::NAN));
        session.on_progress(id, Some(f64::INFINITY));
        session.on_progress(id, Some(-2.0));
        assert_eq!(session.progress_percent(), 40);
    }

    #[test]
    fn test_watch_sees_progress() {
        let mut session = UploadSession::new();
        let rx = session.watch_progress();
        let id = session.start(&png("a.png")).unwrap().session;

        session.on_progress(id, Some(0.25));
        assert_eq!(*rx.borrow(), 25);
    }

    #[test]
    fn test_cancel_before_progress() {
        let recorder = Recorder::default();
        let effects = recorder.side_effects();
        let mut recent = recent();
        let mut session = UploadSession::new();
        let ticket = session.start(&png("a.png")).unwrap();

        assert!(session.cancel());
        assert!(ticket.cancel.is_cancelled());
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(session.result_url(), None);

        // The transport acknowledges the abort late.
        let outcome = session
            .on_transfer_result(
                ticket.session,
                Err(TransportError::Aborted),
                &mut recent,
                &effects,
            )
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Stale);
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(recent.list().is_empty());
        assert!(recorder.titles().is_empty());
    }

    #[test]
    fn test_cancel_only_while_transferring() {
        let mut session = UploadSession::new();
        assert!(!session.cancel());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_stale_progress_after_cancel() {
        let mut session = UploadSession::new();
        let id = session.start(&png("a.png")).unwrap().session;
        session.on_progress(id, Some(0.2));
        session.cancel();

        session.on_progress(id, Some(0.9));
        assert_eq!(session.progress_percent(), 20);
        assert_eq!(session.state(), SessionState::Cancelled);
    }

    #[test]
    fn test_old_session_cannot_touch_new_one() {
        let recorder = Recorder::default();
        let effects = recorder.side_effects();
        let mut recent = recent();
        let mut session = UploadSession::new();

        let old = session.start(&png("a.png")).unwrap().session;
        session.cancel();
        session.reset();
        let new = session.start(&png("b.png")).unwrap().session;
        assert_ne!(old, new);

        session.on_progress(old, Some(0.8));
        assert_eq!(session.progress_percent(), 0);

        let outcome = session
            .on_transfer_result(old, Ok("https://x/url/old".into()), &mut recent, &effects)
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Stale);
        assert_eq!(session.state(), SessionState::Transferring);
        assert!(recent.list().is_empty());
        assert!(recorder.copied().is_empty());
    }

    #[test]
    fn test_success_runs_side_effects_once() {
        let recorder = Recorder::default();
        let effects = recorder.side_effects();
        let mut recent = recent();
        let mut session = UploadSession::new();
        let id = session.start(&png("a.png")).unwrap().session;

        let url = "https://x/url/key1".to_string();
        let outcome = session
            .on_transfer_result(id, Ok(url.clone()), &mut recent, &effects)
            .unwrap();
        assert_eq!(
            outcome,
            TransferOutcome::Succeeded {
                url: url.clone(),
                storage_warning: None,
            }
        );
        assert_eq!(session.state(), SessionState::Succeeded);
        assert_eq!(session.result_url(), Some(url.as_str()));
        assert_eq!(session.progress_percent(), 100);

        // A duplicate completion for the same id changes nothing.
        let again = session
            .on_transfer_result(id, Ok(url.clone()), &mut recent, &effects)
            .unwrap();
        assert_eq!(again, TransferOutcome::Stale);

        assert_eq!(recorder.copied(), [url.clone()]);
        assert_eq!(recorder.titles(), ["Upload complete!"]);
        assert_eq!(recent.list(), [url]);
    }

    #[test]
    fn test_failure_is_surfaced_without_store_mutation() {
        let recorder = Recorder::default();
        let effects = recorder.side_effects();
        let mut recent = recent();
        let mut session = UploadSession::new();
        let id = session.start(&png("a.png")).unwrap().session;

        let error = TransportError::Status {
            status: 500,
            body: "boom".into(),
        };
        let err = session
            .on_transfer_result(id, Err(error.clone()), &mut recent, &effects)
            .unwrap_err();

        assert_eq!(err, UploadError::TransferFailed(error));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(recent.list().is_empty());
        assert!(recorder.copied().is_empty());
        assert_eq!(recorder.titles(), ["Upload failed"]);
    }

    #[test]
    fn test_reset_clears_terminal_session() {
        let mut session = UploadSession::new();
        let id = session.start(&png("a.png")).unwrap().session;
        session.on_progress(id, Some(0.5));

        session.reset();
        assert_eq!(session.state(), SessionState::Transferring);

        session.cancel();
        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.progress_percent(), 0);
        assert_eq!(session.file_name(), None);
    }

    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(std::io::Error::other("read-only").into())
        }

        fn remove(&mut self, _key: &str) -> Result<(), StorageError> {
            Err(std::io::Error::other("read-only").into())
        }
    }

    #[test]
    fn test_storage_failure_is_reported_as_warning() {
        let recorder = Recorder::default();
        let effects = recorder.side_effects();
        let mut recent = RecentUploadsStore::new(Box::new(ReadOnlyStore));
        let mut session = UploadSession::new();
        let id = session.start(&png("a.png")).unwrap().session;

        let outcome = session
            .on_transfer_result(id, Ok("https://x/url/k".into()), &mut recent, &effects)
            .unwrap();

        let TransferOutcome::Succeeded {
            url,
            storage_warning,
        } = outcome
        else {
            panic!("expected a successful outcome");
        };
        assert_eq!(url, "https://x/url/k");
        assert!(storage_warning.unwrap().contains("read-only"));
        assert_eq!(session.state(), SessionState::Succeeded);
        assert_eq!(recorder.copied(), ["https://x/url/k"]);
        assert_eq!(recorder.titles(), ["Upload complete!"]);
        assert_eq!(recent.list(), ["https://x/url/k"]);
    }

    #[test]
    fn test_begin_rejects_non_image_with_notification() {
        let recorder = Recorder::default();
        let effects = recorder.side_effects();
        let mut session = UploadSession::new();
        let file = UploadFile::new("notes.txt", "text/plain", b"hi".to_vec());

        let err = session.begin(&file, &effects).unwrap_err();
        assert_eq!(err, UploadError::UnsupportedMediaType("text/plain".into()));
        assert_eq!(recorder.titles(), ["Not allowed!"]);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_begin_replaces_running_upload() {
        let recorder = Recorder::default();
        let effects = recorder.side_effects();
        let mut recent = recent();
        let mut session = UploadSession::new();

        let old = session.begin(&png("a.png"), &effects).unwrap();
        session.on_progress(old.session, Some(0.3));

        let new = session.begin(&png("b.png"), &effects).unwrap();
        assert_ne!(old.session, new.session);
        assert!(old.cancel.is_cancelled());
        assert!(!new.cancel.is_cancelled());
        assert_eq!(session.state(), SessionState::Transferring);
        assert_eq!(session.file_name(), Some("b.png"));
        assert_eq!(session.progress_percent(), 0);

        // The replaced transfer finishing late changes nothing.
        session.on_progress(old.session, Some(0.9));
        let outcome = session
            .on_transfer_result(
                old.session,
                Ok("https://x/url/old".into()),
                &mut recent,
                &effects,
            )
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Stale);
        assert_eq!(session.id(), Some(new.session));
        assert_eq!(session.progress_percent(), 0);
        assert!(recent.list().is_empty());
        assert!(recorder.titles().is_empty());
    }

    #[test]
    fn test_begin_non_image_keeps_running_upload() {
        let recorder = Recorder::default();
        let effects = recorder.side_effects();
        let mut session = UploadSession::new();

        let running = session.begin(&png("a.png"), &effects).unwrap();
        session.on_progress(running.session, Some(0.4));

        let text = UploadFile::new("notes.txt", "text/plain", Vec::new());
        assert!(session.begin(&text, &effects).is_err());

        assert_eq!(recorder.titles(), ["Not allowed!"]);
        assert_eq!(session.state(), SessionState::Transferring);
        assert_eq!(session.id(), Some(running.session));
        assert_eq!(session.progress_percent(), 40);
        assert!(!running.cancel.is_cancelled());
    }

    #[test]
    fn test_begin_after_terminal_state_resets() {
        let recorder = Recorder::default();
        let effects = recorder.side_effects();
        let mut session = UploadSession::new();

        let first = session.begin(&png("a.png"), &effects).unwrap();
        session.on_progress(first.session, Some(0.5));
        session.cancel();

        let second = session.begin(&png("b.png"), &effects).unwrap();
        assert_ne!(first.session, second.session);
        assert_eq!(session.state(), SessionState::Transferring);
        assert_eq!(session.progress_percent(), 0);
    }

    #[tokio::test]
    async fn test_cancel_handle_wakes_waiters() {
        let handle = CancelHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        handle.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
