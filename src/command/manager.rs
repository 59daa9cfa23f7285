// UndoStack - Manages undo/redo stacks of typed records

use crate::command::record::{
    CommandError, CommandResult, HistoryDirection, UndoKind, UndoRecord, UndoTarget,
};
use std::collections::VecDeque;

/// Default maximum number of records to keep in history
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Manages record history and undo/redo
///
/// The stack keeps two lists:
/// - Undo stack: records captured before an edit
/// - Redo stack: records moved over by undo
///
/// A new push clears the redo stack. Moves between the two stacks during
/// undo/redo do not.
///
/// # Hold window
/// While a hold is open the first pushed record is kept aside and later
/// pushes are dropped; closing the hold pushes that one record, so a drag
/// produces a single history entry holding the pre-drag state.
///
/// # Memory Management
/// When the limit is reached, the oldest record is removed.
#[derive(Debug)]
pub struct UndoStack {
    /// Most recent at the back
    undo_stack: VecDeque<UndoRecord>,

    /// Most recent at the back
    redo_stack: VecDeque<UndoRecord>,

    /// `Some` while a hold window is open; holds the first record pushed
    hold: Option<Option<UndoRecord>>,

    max_history: usize,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_HISTORY)
    }

    pub fn with_capacity(max_history: usize) -> Self {
        Self {
            undo_stack: VecDeque::with_capacity(max_history),
            redo_stack: VecDeque::new(),
            hold: None,
            max_history: max_history.max(1),
        }
    }

    /// Push a record captured before an edit
    ///
    /// Inside a hold window, consecutive records of the same kind and track
    /// collapse into the first one. A record of another kind closes that run
    /// and starts a new one. `Bpm` and `Import` records are never held: they
    /// mirror the tempo track's own history or a one-shot file operation.
    ///
    /// Returns false when the record was absorbed by an open hold window.
    pub fn push(&mut self, record: UndoRecord) -> bool {
        let Some(pending) = &mut self.hold else {
            self.push_new(record);
            return true;
        };
        let mergeable = !matches!(record.kind(), UndoKind::Bpm | UndoKind::Import);
        match pending {
            Some(held)
                if mergeable && held.kind() == record.kind() && held.track() == record.track() =>
            {
                false
            }
            None if mergeable => {
                *pending = Some(record);
                false
            }
            _ => {
                let previous = pending.take();
                let direct = if mergeable {
                    *pending = Some(record);
                    None
                } else {
                    Some(record)
                };
                let pushed = direct.is_some();
                for entry in previous.into_iter().chain(direct) {
                    self.push_new(entry);
                }
                pushed
            }
        }
    }

    fn push_new(&mut self, record: UndoRecord) {
        self.undo_stack.push_back(record);

        // New timeline
        self.redo_stack.clear();

        if self.undo_stack.len() > self.max_history {
            self.undo_stack.pop_front();
        }
    }

    /// Open a hold window (a continuous drag, say); no-op if one is already open
    pub fn begin_hold(&mut self) {
        if self.hold.is_none() {
            self.hold = Some(None);
        }
    }

    pub fn is_holding(&self) -> bool {
        self.hold.is_some()
    }

    /// Close the hold window, pushing the consolidated record if any
    /// Returns the kind that was pushed
    pub fn end_hold(&mut self) -> Option<UndoKind> {
        let record = self.hold.take().flatten()?;
        let kind = record.kind();
        self.push_new(record);
        Some(kind)
    }

    /// Undo the last record
    ///
    /// # Errors
    /// - `HoldOpen` while a hold window is open
    /// - `NothingToUndo` on an empty stack
    /// - any error from the target; the record stays on the undo stack
    pub fn undo(&mut self, target: &mut impl UndoTarget) -> CommandResult<UndoKind> {
        if self.is_holding() {
            return Err(CommandError::HoldOpen);
        }
        let mut record = self
            .undo_stack
            .pop_back()
            .ok_or(CommandError::NothingToUndo)?;

        if let Err(e) = target.apply_record(&mut record, HistoryDirection::Undo) {
            self.undo_stack.push_back(record);
            return Err(e);
        }

        let kind = record.kind();
        self.redo_stack.push_back(record);
        Ok(kind)
    }

    /// Redo the last undone record
    ///
    /// # Errors
    /// Same as [`UndoStack::undo`], with `NothingToRedo`.
    pub fn redo(&mut self, target: &mut impl UndoTarget) -> CommandResult<UndoKind> {
        if self.is_holding() {
            return Err(CommandError::HoldOpen);
        }
        let mut record = self
            .redo_stack
            .pop_back()
            .ok_or(CommandError::NothingToRedo)?;

        if let Err(e) = target.apply_record(&mut record, HistoryDirection::Redo) {
            self.redo_stack.push_back(record);
            return Err(e);
        }

        let kind = record.kind();
        self.undo_stack.push_back(record);
        Ok(kind)
    }

    pub fn has_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn has_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn peek_undo(&self) -> Option<UndoKind> {
        self.undo_stack.back().map(UndoRecord::kind)
    }

    pub fn peek_redo(&self) -> Option<UndoKind> {
        self.redo_stack.back().map(UndoRecord::kind)
    }

    /// Clear all history, closing any hold window
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.hold = None;
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}
