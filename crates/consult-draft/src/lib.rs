//! Client-side auto-save of in-progress consultation notes.
//!
//! [`DraftSession`] is the pure dirty-tracking state machine with the clock
//! passed in. [`AutoSaver`] drives it on a tokio task: edits restart a
//! debounce timer, at most one save is in flight, and
//! [`DraftHandle::force_save`] flushes immediately before navigation.

pub mod config;
pub mod notes;
pub mod saver;
pub mod session;

pub use config::DraftConfig;
pub use notes::{NoteField, NoteFields};
pub use saver::{AutoSaver, DraftError, DraftHandle, FlushOutcome, NoteSink, SaveError};
pub use session::{DraftSession, DraftState, DraftStatus, Snapshot};
