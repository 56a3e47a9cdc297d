//! Lock guards: the only way to reach the indices.

use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use sdb_index::{GenericIndex, IndexInfo};
use sdb_region::RegionStats;
use sdb_types::{Id, Object};

use crate::database::{Database, DatabaseState, OpenSession};
use crate::error::{DbError, DbResult};
use crate::hooks::{SessionEvent, WriteKind};

/// Shared access: queries only. Any number of readers may hold one at once.
pub struct ReadGuard<'a> {
    db: &'a Database,
    state: RwLockReadGuard<'a, DatabaseState>,
}

impl<'a> ReadGuard<'a> {
    pub(crate) fn new(db: &'a Database, state: RwLockReadGuard<'a, DatabaseState>) -> Self {
        Self { db, state }
    }

    /// The index for `T`.
    pub fn index<T: Object>(&self) -> DbResult<&GenericIndex<T>> {
        self.state.index::<T>()
    }

    pub fn revision(&self) -> u64 {
        self.state.revision()
    }

    pub fn session_depth(&self) -> usize {
        self.state.sessions.len()
    }

    pub fn region_stats(&self) -> RegionStats {
        self.state.region.stats()
    }

    pub fn indices(&self) -> Vec<IndexInfo> {
        self.state.indices.values().map(|index| index.info()).collect()
    }
}

/// Exclusive access: queries, writes, and session control.
///
/// Observers are notified while the guard is held. Dropping the guard
/// releases the lock.
pub struct WriteGuard<'a> {
    db: &'a Database,
    state: RwLockWriteGuard<'a, DatabaseState>,
}

impl<'a> WriteGuard<'a> {
    pub(crate) fn new(db: &'a Database, state: RwLockWriteGuard<'a, DatabaseState>) -> Self {
        Self { db, state }
    }

    pub(crate) fn state_mut(&mut self) -> &mut DatabaseState {
        &mut self.state
    }

    /// The index for `T`.
    pub fn index<T: Object>(&self) -> DbResult<&GenericIndex<T>> {
        self.state.index::<T>()
    }

    pub fn revision(&self) -> u64 {
        self.state.revision()
    }

    pub fn session_depth(&self) -> usize {
        self.state.sessions.len()
    }

    // ---------------------------------------------------------------
    // Object writes
    // ---------------------------------------------------------------

    /// Create an object. See [`GenericIndex::create`].
    pub fn create<T, F>(&mut self, init: F) -> DbResult<&T>
    where
        T: Object,
        F: FnOnce(Id<T>) -> T,
    {
        let db = self.db;
        self.state.index::<T>()?;
        db.with_hooks(|hooks| hooks.before_write::<T>(WriteKind::Create, None));

        let (index, region) = self.state.parts_mut::<T>()?;
        let created = index.create(region, init)?;
        db.with_hooks(|hooks| hooks.after_write(WriteKind::Create, created));
        Ok(created)
    }

    /// Modify an object. See [`GenericIndex::modify`].
    pub fn modify<T, F>(&mut self, id: Id<T>, mutate: F) -> DbResult<&T>
    where
        T: Object,
        F: FnOnce(&mut T),
    {
        let db = self.db;
        let current = self.state.index::<T>()?.find(id)?;
        db.with_hooks(|hooks| hooks.before_write(WriteKind::Modify, Some(current)));

        let (index, region) = self.state.parts_mut::<T>()?;
        let updated = index.modify(region, id, mutate)?;
        db.with_hooks(|hooks| hooks.after_write(WriteKind::Modify, updated));
        Ok(updated)
    }

    /// Remove an object, returning its last value.
    pub fn remove<T: Object>(&mut self, id: Id<T>) -> DbResult<T> {
        let db = self.db;
        let current = self.state.index::<T>()?.find(id)?;
        db.with_hooks(|hooks| hooks.before_write(WriteKind::Remove, Some(current)));

        let (index, region) = self.state.parts_mut::<T>()?;
        let removed = index.remove(region, id)?;
        db.with_hooks(|hooks| hooks.after_write(WriteKind::Remove, &removed));
        Ok(removed)
    }

    // ---------------------------------------------------------------
    // Sessions
    // ---------------------------------------------------------------

    /// Open a new innermost session on every index and return its revision.
    pub fn start_undo_session(&mut self) -> DbResult<u64> {
        self.open_session().map(|open| open.revision)
    }

    pub(crate) fn open_session(&mut self) -> DbResult<OpenSession> {
        let state = &mut *self.state;
        let revision = state.revision() + 1;
        for index in state.indices.values_mut() {
            index.start_undo_session(revision);
        }
        let open = OpenSession {
            token: state.next_token,
            revision,
        };
        state.next_token += 1;
        state.sessions.push(open);
        if !state.schema_locked {
            state.schema_locked = true;
            debug!(indices = state.indices.len(), "schema locked");
        }

        debug!(revision, depth = state.sessions.len(), "session started");
        self.db
            .with_hooks(|hooks| hooks.session(SessionEvent::Started { revision }));
        Ok(open)
    }

    /// Commit the innermost session into its parent (or make it permanent
    /// if it is the outermost).
    pub fn commit(&mut self, revision: u64) -> DbResult<()> {
        self.state.check_innermost(revision)?;
        self.commit_innermost(revision)
    }

    pub(crate) fn commit_session(&mut self, session: OpenSession) -> DbResult<()> {
        self.state.check_handle(session)?;
        self.commit_innermost(session.revision)
    }

    fn commit_innermost(&mut self, revision: u64) -> DbResult<()> {
        let state = &mut *self.state;
        for index in state.indices.values_mut() {
            index.commit_session(revision)?;
        }
        state.sessions.pop();
        if state.sessions.is_empty() {
            state.base_revision = revision;
        }

        debug!(revision, depth = state.sessions.len(), "session committed");
        self.db
            .with_hooks(|hooks| hooks.session(SessionEvent::Committed { revision }));
        Ok(())
    }

    /// Revert the innermost session on every index.
    ///
    /// A region failure while reverting is fatal: indices may be left
    /// partially reverted.
    pub fn undo(&mut self, revision: u64) -> DbResult<()> {
        self.state.check_innermost(revision)?;
        self.undo_innermost(revision)
    }

    pub(crate) fn undo_session(&mut self, session: OpenSession) -> DbResult<()> {
        self.state.check_handle(session)?;
        self.undo_innermost(session.revision)
    }

    fn undo_innermost(&mut self, revision: u64) -> DbResult<()> {
        let state = &mut *self.state;
        for index in state.indices.values_mut() {
            index.undo_session(&mut state.region, revision)?;
        }
        state.sessions.pop();

        debug!(revision, depth = state.sessions.len(), "session undone");
        self.db
            .with_hooks(|hooks| hooks.session(SessionEvent::Undone { revision }));
        Ok(())
    }

    /// Revert every open session, innermost first.
    pub fn undo_all(&mut self) -> DbResult<()> {
        while let Some(innermost) = self.state.sessions.last() {
            let revision = innermost.revision;
            self.undo_innermost(revision)?;
        }
        Ok(())
    }

    /// Set the committed revision. Fails while any session is open.
    pub fn set_revision(&mut self, revision: u64) -> DbResult<()> {
        let depth = self.state.sessions.len();
        if depth > 0 {
            return Err(DbError::SessionActive { depth });
        }
        self.state.base_revision = revision;
        if !self.state.region.is_read_only() {
            self.state.region.set_revision(revision)?;
        }
        Ok(())
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        match self.db.reader_set() {
            Ok(mut readers) => {
                readers.remove(&std::thread::current().id());
            }
            Err(e) => warn!(error = %e, "could not clear read lock holder"),
        }
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        match self.db.lock_owner() {
            Ok(mut owner) => *owner = None,
            Err(e) => warn!(error = %e, "could not clear write lock owner"),
        }
    }
}
