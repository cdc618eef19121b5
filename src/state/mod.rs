//! Per-presentation editing state: the slide list, buffered edits, history
//! and the session that owns them.

mod autosave;
mod history;
mod session;
mod slides;

pub use autosave::{AutosaveCoordinator, FlushOutcome};
pub use history::HistoryController;
pub use session::{EditorMessage, EditorSession};
pub use slides::SlideCollection;
