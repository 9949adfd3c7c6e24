//! Async driver for [`DraftSession`].
//!
//! One task owns the session. Edits and flush requests arrive over a
//! channel, the debounce is a `sleep_until` on the session deadline, and each
//! save runs on its own spawned task so edits keep flowing while the server
//! call is in flight.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};

use crate::config::DraftConfig;
use crate::notes::{NoteField, NoteFields};
use crate::session::{DraftSession, DraftStatus, Snapshot};

/// A save the server did not accept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    /// The server refused the notes, e.g. the encounter is already completed
    #[error("Notes rejected: {0}")]
    Rejected(String),

    /// The request did not reach the server or timed out
    #[error("Save failed: {0}")]
    Transport(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("Draft session is closed")]
    Closed,
}

/// Persistence call behind the auto-saver.
pub trait NoteSink: Send + Sync + 'static {
    /// Store the notes. Returns the server's write time.
    fn save(
        &self,
        notes: NoteFields,
    ) -> impl Future<Output = Result<DateTime<Utc>, SaveError>> + Send;
}

/// Result of a forced flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Saved(DateTime<Utc>),
    /// Nothing to save
    AlreadyClean,
}

const COMMAND_BUFFER: usize = 64;

enum Command {
    Edit { field: NoteField, text: String },
    ForceSave(oneshot::Sender<Result<FlushOutcome, DraftError>>),
    Close,
}

struct SaveDone {
    revision: u64,
    result: Result<DateTime<Utc>, SaveError>,
}

/// A caller waiting for everything up to `revision` to reach the server.
struct FlushWaiter {
    revision: u64,
    reply: oneshot::Sender<Result<FlushOutcome, DraftError>>,
}

/// Client-side handle to a running auto-saver. Cheap to clone.
#[derive(Clone)]
pub struct DraftHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<DraftStatus>,
}

impl DraftHandle {
    /// Replace one field's text.
    pub async fn edit(&self, field: NoteField, text: impl Into<String>) -> Result<(), DraftError> {
        self.commands
            .send(Command::Edit {
                field,
                text: text.into(),
            })
            .await
            .map_err(|_| DraftError::Closed)
    }

    /// Save now, bypassing the debounce, and wait for the result.
    ///
    /// If a save is already in flight this waits for it and saves again only
    /// when edits made before this call are still unsaved.
    pub async fn force_save(&self) -> Result<FlushOutcome, DraftError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::ForceSave(reply))
            .await
            .map_err(|_| DraftError::Closed)?;
        rx.await.map_err(|_| DraftError::Closed)?
    }

    pub fn status(&self) -> DraftStatus {
        self.status.borrow().clone()
    }

    /// Receiver that wakes on every status change.
    pub fn subscribe(&self) -> watch::Receiver<DraftStatus> {
        self.status.clone()
    }

    /// Cancel the debounce timer and stop the task. Unsaved edits are dropped;
    /// call [`force_save`](Self::force_save) first to keep them.
    pub async fn close(mut self) {
        let _ = self.commands.send(Command::Close).await;
        while self.status.changed().await.is_ok() {}
    }
}

/// Task owning one [`DraftSession`].
pub struct AutoSaver<S: NoteSink> {
    session: DraftSession,
    sink: Arc<S>,
    status: watch::Sender<DraftStatus>,
    done_tx: mpsc::UnboundedSender<SaveDone>,
    waiters: Vec<FlushWaiter>,
}

impl<S: NoteSink> AutoSaver<S> {
    /// Start auto-saving `initial` through `sink`.
    ///
    /// Must be called from inside a tokio runtime. The task ends on
    /// [`DraftHandle::close`] or when every handle is dropped.
    pub fn spawn(sink: Arc<S>, config: DraftConfig, initial: NoteFields) -> DraftHandle {
        let session = DraftSession::new(initial, config.debounce());
        let (commands, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status, status_rx) = watch::channel(session.status());
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let saver = AutoSaver {
            session,
            sink,
            status,
            done_tx,
            waiters: Vec::new(),
        };
        tokio::spawn(saver.run(commands_rx, done_rx));

        tracing::debug!(debounce_ms = config.debounce().as_millis() as u64, "draft auto-saver started");
        DraftHandle {
            commands,
            status: status_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut done: mpsc::UnboundedReceiver<SaveDone>,
    ) {
        loop {
            let deadline = self.session.deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Edit { field, text }) => {
                        self.session.edit(field, text, Instant::now());
                        self.publish();
                    }
                    Some(Command::ForceSave(reply)) => self.force_save(reply),
                    Some(Command::Close) | None => break,
                },
                Some(finished) = done.recv() => self.on_save_done(finished),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(snapshot) = self.session.begin_save(Instant::now()) {
                        self.start_save(snapshot);
                    }
                }
            }
        }

        for waiter in self.waiters.drain(..) {
            let _ = waiter.reply.send(Err(DraftError::Closed));
        }
        tracing::debug!(dirty = self.session.is_dirty(), "draft auto-saver stopped");
    }

    fn force_save(&mut self, reply: oneshot::Sender<Result<FlushOutcome, DraftError>>) {
        if !self.session.is_dirty() && !self.session.is_saving() {
            let _ = reply.send(Ok(FlushOutcome::AlreadyClean));
            return;
        }
        self.waiters.push(FlushWaiter {
            revision: self.session.revision(),
            reply,
        });
        if let Some(snapshot) = self.session.force_save_snapshot() {
            self.start_save(snapshot);
        }
    }

    fn start_save(&mut self, snapshot: Snapshot) {
        let Snapshot { revision, notes } = snapshot;
        let sink = Arc::clone(&self.sink);
        let done = self.done_tx.clone();

        tokio::spawn(async move {
            let result = sink.save(notes).await;
            let _ = done.send(SaveDone { revision, result });
        });

        tracing::debug!(revision, "draft save started");
        self.publish();
    }

    fn on_save_done(&mut self, finished: SaveDone) {
        let SaveDone { revision, result } = finished;
        match &result {
            Ok(saved_at) => tracing::debug!(revision, saved_at = %saved_at, "draft saved"),
            Err(e) => tracing::warn!(revision, error = %e, "draft save failed"),
        }
        self.session.finish_save(result.clone(), Instant::now());

        match result {
            Ok(saved_at) => {
                let saved = self.session.saved_revision();
                let (ready, waiting): (Vec<_>, Vec<_>) =
                    self.waiters.drain(..).partition(|w| w.revision <= saved);
                for waiter in ready {
                    let _ = waiter.reply.send(Ok(FlushOutcome::Saved(saved_at)));
                }
                self.waiters = waiting;
            }
            Err(e) => {
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.reply.send(Err(DraftError::Save(e.clone())));
                }
            }
        }

        // Flush requests that arrived mid-save need a follow-up save
        if !self.waiters.is_empty() {
            if let Some(snapshot) = self.session.force_save_snapshot() {
                self.start_save(snapshot);
                return;
            }
        }
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(self.session.status());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        saved: Mutex<Vec<NoteFields>>,
        fail: AtomicBool,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RecordingSink {
        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.saved.lock().unwrap().len()
        }

        fn last(&self) -> NoteFields {
            self.saved.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl NoteSink for RecordingSink {
        async fn save(&self, notes: NoteFields) -> Result<DateTime<Utc>, SaveError> {
            let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
            self.saved.lock().unwrap().push(notes);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.load(Ordering::SeqCst) {
                Err(SaveError::Transport("connection refused".into()))
            } else {
                Ok(Utc::now())
            }
        }
    }

    fn spawn(sink: &Arc<RecordingSink>) -> DraftHandle {
        AutoSaver::spawn(Arc::clone(sink), DraftConfig::default(), NoteFields::default())
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_waits_for_idle() {
        let sink = Arc::new(RecordingSink::default());
        let handle = spawn(&sink);

        handle.edit(NoteField::History, "Cough").await.unwrap();
        advance(5).await;
        handle.edit(NoteField::History, "Cough, 3 days").await.unwrap();

        // 12s after the first edit, 7s after the last
        advance(7).await;
        assert_eq!(sink.calls(), 0);
        assert!(handle.status().dirty);

        advance(4).await;
        assert_eq!(sink.calls(), 1);
        assert_eq!(sink.last().history, "Cough, 3 days");
        let status = handle.status();
        assert!(!status.dirty);
        assert!(status.last_saved.is_some());

        // Clean buffer: no further saves
        advance(60).await;
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_dirty_and_next_edit_retries() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let handle = spawn(&sink);

        handle.edit(NoteField::Plan, "Antibiotics").await.unwrap();
        advance(11).await;
        assert_eq!(sink.calls(), 1);
        let status = handle.status();
        assert!(status.dirty);
        assert!(matches!(status.last_error, Some(SaveError::Transport(_))));

        // No retry without a new edit
        advance(60).await;
        assert_eq!(sink.calls(), 1);

        sink.fail.store(false, Ordering::SeqCst);
        handle.edit(NoteField::Plan, "Antibiotics, 5 days").await.unwrap();
        advance(11).await;
        assert_eq!(sink.calls(), 2);
        assert!(!handle.status().dirty);
        assert!(handle.status().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_save_in_flight() {
        let sink = Arc::new(RecordingSink::slow(Duration::from_secs(30)));
        let handle = spawn(&sink);

        handle.edit(NoteField::Examination, "BP 120/80").await.unwrap();
        advance(11).await;
        assert_eq!(sink.calls(), 1);
        assert!(handle.status().saving);

        // Edits while the slow save runs do not start a second one
        handle.edit(NoteField::Examination, "BP 120/80, HR 72").await.unwrap();
        advance(15).await;
        assert_eq!(sink.calls(), 1);

        // First save lands at t=40, follow-up fires immediately after
        advance(20).await;
        assert_eq!(sink.calls(), 2);
        assert_eq!(sink.last().examination, "BP 120/80, HR 72");

        advance(40).await;
        assert_eq!(sink.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(!handle.status().dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_save_bypasses_debounce() {
        let sink = Arc::new(RecordingSink::default());
        let handle = spawn(&sink);

        handle.edit(NoteField::Assessment, "Gastritis").await.unwrap();
        let outcome = handle.force_save().await.unwrap();
        assert!(matches!(outcome, FlushOutcome::Saved(_)));
        assert_eq!(sink.calls(), 1);

        // The debounce timer was consumed by the forced save
        advance(30).await;
        assert_eq!(sink.calls(), 1);

        assert_eq!(handle.force_save().await.unwrap(), FlushOutcome::AlreadyClean);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_save_waits_for_in_flight_then_resaves() {
        let sink = Arc::new(RecordingSink::slow(Duration::from_secs(5)));
        let handle = spawn(&sink);

        handle.edit(NoteField::Plan, "v1").await.unwrap();
        advance(11).await;
        handle.edit(NoteField::Plan, "v2").await.unwrap();

        let outcome = handle.force_save().await.unwrap();
        assert!(matches!(outcome, FlushOutcome::Saved(_)));
        assert_eq!(sink.calls(), 2);
        assert_eq!(sink.last().plan, "v2");
        assert!(!handle.status().dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_save_reports_failure() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let handle = spawn(&sink);

        handle.edit(NoteField::Plan, "Discharge").await.unwrap();
        let err = handle.force_save().await.unwrap_err();
        assert!(matches!(err, DraftError::Save(SaveError::Transport(_))));
        assert!(handle.status().dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_timer() {
        let sink = Arc::new(RecordingSink::default());
        let handle = spawn(&sink);
        let other = handle.clone();

        handle.edit(NoteField::History, "Headache").await.unwrap();
        handle.close().await;

        advance(30).await;
        assert_eq!(sink.calls(), 0);
        assert_eq!(other.edit(NoteField::History, "x").await, Err(DraftError::Closed));
    }
}
