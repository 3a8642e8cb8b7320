//! Linear undo history.
//!
//! Holds the inverses of applied commands. Recording a new change forgets everything that
//! could have been redone.

use std::collections::VecDeque;

use super::{Command, CommandError};

#[derive(Debug)]
pub struct History {
    undo: VecDeque<Command>,
    redo: Vec<Command>,
    limit: usize,
}
impl History {
    /// A history keeping at most `limit` undoable steps.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }
    /// Record the inverse of a freshly applied change.
    pub fn record(&mut self, inverse: Command) {
        self.redo.clear();
        if self.limit == 0 {
            return;
        }
        self.undo.push_back(inverse);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }
    /// Step back once, with `apply` performing the stored inverse and returning the redo.
    /// `Ok(false)` if there was nothing to undo.
    ///
    /// An entry that fails to apply is dropped, it can't match the state anymore.
    pub fn undo_with(
        &mut self,
        apply: impl FnOnce(Command) -> Result<Command, CommandError>,
    ) -> Result<bool, CommandError> {
        let Some(command) = self.undo.pop_back() else {
            return Ok(false);
        };
        let redo = apply(command)?;
        self.redo.push(redo);
        Ok(true)
    }
    /// Step forward once. `Ok(false)` if there was nothing to redo.
    pub fn redo_with(
        &mut self,
        apply: impl FnOnce(Command) -> Result<Command, CommandError>,
    ) -> Result<bool, CommandError> {
        let Some(command) = self.redo.pop() else {
            return Ok(false);
        };
        let undo = apply(command)?;
        self.undo.push_back(undo);
        Ok(true)
    }
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
