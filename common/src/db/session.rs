use crate::db::core::{DbError, Design};

impl Design {
    /// Runs `edits` as one update session. A failing batch leaves the design
    /// exactly as it was when the session opened. Sessions do not nest.
    pub fn update<T, E, F>(&mut self, edits: F) -> Result<T, E>
    where
        F: FnOnce(&mut Design) -> Result<T, E>,
        E: From<DbError>,
    {
        if self.session_open {
            return Err(DbError::SessionAlreadyOpen.into());
        }
        let snapshot = self.clone();
        self.session_open = true;
        let result = edits(self);
        self.session_open = false;
        if result.is_err() {
            log::warn!("Update session aborted, design restored.");
            *self = snapshot;
        }
        result
    }

    pub fn in_session(&self) -> bool {
        self.session_open
    }
}
