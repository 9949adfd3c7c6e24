//! Pure dirty-tracking state machine for one note buffer.
//!
//! Nothing here sleeps or spawns; every method takes the current instant
//! from the caller. The async driver lives in [`crate::saver`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::notes::{NoteField, NoteFields};
use crate::saver::SaveError;

/// Where the buffer stands relative to the server copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftState {
    /// Buffer matches the last successful save
    Clean,
    /// Unsaved edits; an automatic save is due at `deadline`
    DirtyPending { deadline: Instant },
    /// Unsaved edits after a failed save; waits for the next edit or a force save
    DirtyIdle,
    /// A save is in flight
    Saving {
        snapshot_revision: u64,
        edited_since_snapshot: bool,
    },
}

/// Buffer contents handed to a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub revision: u64,
    pub notes: NoteFields,
}

/// Observable summary published to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftStatus {
    pub dirty: bool,
    pub saving: bool,
    pub last_saved: Option<DateTime<Utc>>,
    pub last_error: Option<SaveError>,
}

#[derive(Debug, Clone)]
pub struct DraftSession {
    notes: NoteFields,
    state: DraftState,
    debounce: Duration,
    /// Bumped on every edit
    revision: u64,
    /// Revision of the last snapshot the server accepted
    saved_revision: u64,
    last_edit: Option<Instant>,
    last_saved: Option<DateTime<Utc>>,
    last_error: Option<SaveError>,
}

impl DraftSession {
    /// Start clean from notes already on the server.
    pub fn new(notes: NoteFields, debounce: Duration) -> Self {
        Self {
            notes,
            state: DraftState::Clean,
            debounce,
            revision: 0,
            saved_revision: 0,
            last_edit: None,
            last_saved: None,
            last_error: None,
        }
    }

    pub fn notes(&self) -> &NoteFields {
        &self.notes
    }

    pub fn state(&self) -> DraftState {
        self.state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn saved_revision(&self) -> u64 {
        self.saved_revision
    }

    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    pub fn is_saving(&self) -> bool {
        matches!(self.state, DraftState::Saving { .. })
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    /// Record an edit and restart the debounce.
    pub fn edit(&mut self, field: NoteField, text: String, now: Instant) {
        self.notes.set(field, text);
        self.revision += 1;
        self.last_edit = Some(now);

        self.state = match self.state {
            DraftState::Saving {
                snapshot_revision, ..
            } => DraftState::Saving {
                snapshot_revision,
                edited_since_snapshot: true,
            },
            _ => DraftState::DirtyPending {
                deadline: now + self.debounce,
            },
        };
    }

    /// When the pending automatic save fires, if one is scheduled.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DraftState::DirtyPending { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Start the automatic save if its deadline has passed.
    pub fn begin_save(&mut self, now: Instant) -> Option<Snapshot> {
        if !self.due(now) {
            return None;
        }
        self.take_snapshot()
    }

    /// Start a save regardless of the debounce.
    ///
    /// Returns `None` when there is nothing to save or a save is already in
    /// flight.
    pub fn force_save_snapshot(&mut self) -> Option<Snapshot> {
        if self.is_saving() || !self.is_dirty() {
            return None;
        }
        self.take_snapshot()
    }

    fn take_snapshot(&mut self) -> Option<Snapshot> {
        self.state = DraftState::Saving {
            snapshot_revision: self.revision,
            edited_since_snapshot: false,
        };
        Some(Snapshot {
            revision: self.revision,
            notes: self.notes.clone(),
        })
    }

    /// Apply the outcome of the in-flight save.
    ///
    /// `Ok` carries the server's write time. Edits made while the save ran
    /// keep the buffer dirty and reschedule the debounce from the last edit.
    pub fn finish_save(&mut self, result: Result<DateTime<Utc>, SaveError>, now: Instant) {
        let (snapshot_revision, edited) = match self.state {
            DraftState::Saving {
                snapshot_revision,
                edited_since_snapshot,
            } => (snapshot_revision, edited_since_snapshot),
            // No save in flight
            _ => return,
        };

        match result {
            Ok(saved_at) => {
                self.saved_revision = snapshot_revision;
                self.last_saved = Some(saved_at);
                self.last_error = None;
            }
            Err(e) => self.last_error = Some(e),
        }

        self.state = if edited {
            let from_edit = self.last_edit.map(|at| at + self.debounce).unwrap_or(now);
            DraftState::DirtyPending {
                deadline: from_edit.max(now),
            }
        } else if self.is_dirty() {
            DraftState::DirtyIdle
        } else {
            DraftState::Clean
        };
    }

    pub fn status(&self) -> DraftStatus {
        DraftStatus {
            dirty: self.is_dirty(),
            saving: self.is_saving(),
            last_saved: self.last_saved,
            last_error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBOUNCE: Duration = Duration::from_secs(10);

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_edit_marks_dirty_and_schedules() {
        let t0 = Instant::now();
        let mut session = DraftSession::new(NoteFields::default(), DEBOUNCE);
        assert_eq!(session.state(), DraftState::Clean);

        session.edit(NoteField::History, "Fever".into(), t0);
        assert!(session.is_dirty());
        assert_eq!(session.deadline(), Some(t0 + DEBOUNCE));
        assert!(!session.due(t0 + secs(9)));
        assert!(session.due(t0 + secs(10)));
    }

    #[test]
    fn test_further_edit_resets_deadline() {
        let t0 = Instant::now();
        let mut session = DraftSession::new(NoteFields::default(), DEBOUNCE);
        session.edit(NoteField::History, "Fev".into(), t0);
        session.edit(NoteField::History, "Fever".into(), t0 + secs(6));

        assert!(session.begin_save(t0 + secs(12)).is_none());
        let snapshot = session.begin_save(t0 + secs(16)).unwrap();
        assert_eq!(snapshot.notes.history, "Fever");
        assert_eq!(snapshot.revision, 2);
    }

    #[test]
    fn test_single_flight() {
        let t0 = Instant::now();
        let mut session = DraftSession::new(NoteFields::default(), DEBOUNCE);
        session.edit(NoteField::Plan, "Rest".into(), t0);
        assert!(session.force_save_snapshot().is_some());

        // Second start while the first is in flight
        assert!(session.force_save_snapshot().is_none());
        assert!(session.begin_save(t0 + secs(60)).is_none());
        assert!(session.is_saving());
    }

    #[test]
    fn test_success_clears_dirty() {
        let t0 = Instant::now();
        let saved_at = Utc::now();
        let mut session = DraftSession::new(NoteFields::default(), DEBOUNCE);
        session.edit(NoteField::Plan, "Rest".into(), t0);
        session.force_save_snapshot().unwrap();
        session.finish_save(Ok(saved_at), t0 + secs(1));

        assert_eq!(session.state(), DraftState::Clean);
        assert_eq!(session.last_saved(), Some(saved_at));
        assert!(!session.status().dirty);
    }

    #[test]
    fn test_failure_keeps_dirty_until_next_edit() {
        let t0 = Instant::now();
        let mut session = DraftSession::new(NoteFields::default(), DEBOUNCE);
        session.edit(NoteField::Plan, "Rest".into(), t0);
        session.force_save_snapshot().unwrap();
        session.finish_save(Err(SaveError::Transport("offline".into())), t0 + secs(1));

        assert_eq!(session.state(), DraftState::DirtyIdle);
        assert!(session.status().dirty);
        assert!(session.status().last_error.is_some());
        assert!(session.deadline().is_none());

        session.edit(NoteField::Plan, "Rest, fluids".into(), t0 + secs(30));
        assert_eq!(session.deadline(), Some(t0 + secs(40)));
    }

    #[test]
    fn test_edit_during_save_stays_dirty() {
        let t0 = Instant::now();
        let mut session = DraftSession::new(NoteFields::default(), DEBOUNCE);
        session.edit(NoteField::Assessment, "Viral".into(), t0);
        let snapshot = session.force_save_snapshot().unwrap();

        session.edit(NoteField::Assessment, "Viral URTI".into(), t0 + secs(2));
        session.finish_save(Ok(Utc::now()), t0 + secs(3));

        assert_eq!(session.saved_revision(), snapshot.revision);
        assert!(session.is_dirty());
        assert_eq!(session.deadline(), Some(t0 + secs(12)));
    }

    #[test]
    fn test_finish_without_save_is_ignored() {
        let t0 = Instant::now();
        let mut session = DraftSession::new(NoteFields::default(), DEBOUNCE);
        session.edit(NoteField::Plan, "Rest".into(), t0);
        session.finish_save(Ok(Utc::now()), t0);
        assert!(session.is_dirty());
        assert!(session.last_saved().is_none());
    }
}
