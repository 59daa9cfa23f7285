// Undo/redo history
//
// Every edit captures the state it is about to change as an `UndoRecord`
// and pushes it before mutating. Undo and redo swap a record's payload with
// the live state through `UndoTarget`, then move the record to the other
// stack.
//
// Tempo edits are special: the tempo track keeps its own marker history, and
// the shared stack only holds a `Bpm` placeholder that forwards to it.

pub mod manager;
pub mod record;

pub use manager::{DEFAULT_MAX_HISTORY, UndoStack};
pub use record::{
    CommandError, CommandResult, HistoryDirection, ImportSnapshot, PerfSnapshot, UndoKind,
    UndoRecord, UndoTarget,
};
