use tracing::warn;

use crate::database::{Database, OpenSession};
use crate::error::DbResult;

/// An open undo session.
///
/// Dropping the handle undoes the session unless it was committed, undone,
/// or detached with [`push`](Self::push). Like every session operation the
/// drop takes the write lock, so drop the handle after any [`WriteGuard`]
/// held by the same thread.
///
/// A handle names exactly one session. If that session is closed through
/// [`Database::undo_all`], [`Database::undo`] or [`Database::commit`], the
/// handle's own commit and undo report [`DbError::NoSession`] and its drop
/// leaves any newer session with the same revision alone.
///
/// [`WriteGuard`]: crate::WriteGuard
/// [`DbError::NoSession`]: crate::DbError::NoSession
#[must_use = "dropping a session undoes it"]
pub struct Session<'a> {
    db: &'a Database,
    session: OpenSession,
    open: bool,
}

impl<'a> Session<'a> {
    pub(crate) fn new(db: &'a Database, session: OpenSession) -> Self {
        Self {
            db,
            session,
            open: true,
        }
    }

    pub fn revision(&self) -> u64 {
        self.session.revision
    }

    /// Commit the session. On error (for example, a nested session is
    /// still open) the handle stays live.
    pub fn commit(&mut self) -> DbResult<()> {
        self.db.commit_session(self.session)?;
        self.open = false;
        Ok(())
    }

    /// Undo the session now.
    pub fn undo(&mut self) -> DbResult<()> {
        self.db.undo_session(self.session)?;
        self.open = false;
        Ok(())
    }

    /// Detach the handle, leaving the session open on the database's stack.
    /// Returns the revision to pass to [`Database::commit`] or
    /// [`Database::undo`] later.
    pub fn push(mut self) -> u64 {
        self.open = false;
        self.session.revision
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if let Err(e) = self.db.undo_session(self.session) {
            warn!(revision = self.session.revision, error = %e, "dropped session could not be undone");
        }
    }
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("revision", &self.session.revision)
            .field("open", &self.open)
            .finish()
    }
}
