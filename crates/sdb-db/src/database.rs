//! The database registry.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};

use tracing::{debug, info, warn};

use sdb_index::{downcast, downcast_mut, AnyIndex, GenericIndex, IndexInfo};
use sdb_region::{Region, RegionStats};
use sdb_types::{Id, Object, TypeDescriptor};

use crate::config::DatabaseConfig;
use crate::error::{DbError, DbResult};
use crate::guard::{ReadGuard, WriteGuard};
use crate::hooks::{AfterWrite, Hooks, Observer, ObserverResult, SessionObserver, WriteKind};
use crate::session::Session;

/// An entry on the session stack. Revisions repeat once a session is
/// undone; tokens are never reused within one open database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct OpenSession {
    pub(crate) token: u64,
    pub(crate) revision: u64,
}

/// Everything behind the database lock.
pub(crate) struct DatabaseState {
    pub(crate) region: Region,
    pub(crate) indices: BTreeMap<u16, Box<dyn AnyIndex>>,
    /// Open sessions, outermost first.
    pub(crate) sessions: Vec<OpenSession>,
    pub(crate) next_token: u64,
    /// Revision of the state with no session open.
    pub(crate) base_revision: u64,
    pub(crate) schema_locked: bool,
}

impl DatabaseState {
    pub(crate) fn revision(&self) -> u64 {
        self.sessions
            .last()
            .map_or(self.base_revision, |open| open.revision)
    }

    pub(crate) fn index<T: Object>(&self) -> DbResult<&GenericIndex<T>> {
        self.indices
            .get(&T::TYPE_ID)
            .and_then(|index| downcast::<T>(index.as_ref()))
            .ok_or(DbError::IndexNotRegistered {
                type_name: T::TYPE_NAME,
            })
    }

    /// The index for `T` and the region, borrowed together.
    pub(crate) fn parts_mut<T: Object>(&mut self) -> DbResult<(&mut GenericIndex<T>, &mut Region)> {
        let index = self
            .indices
            .get_mut(&T::TYPE_ID)
            .and_then(|index| downcast_mut::<T>(index.as_mut()))
            .ok_or(DbError::IndexNotRegistered {
                type_name: T::TYPE_NAME,
            })?;
        Ok((index, &mut self.region))
    }

    /// Check that `revision` names the innermost open session.
    pub(crate) fn check_innermost(&self, revision: u64) -> DbResult<()> {
        match self.sessions.last() {
            None => Err(DbError::NoSession {
                requested: revision,
            }),
            Some(innermost) if innermost.revision != revision => {
                Err(DbError::InvalidSessionOrder {
                    expected: innermost.revision,
                    requested: revision,
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Check that `session` is still open and innermost. A session closed
    /// through another path is reported as [`DbError::NoSession`] even if a
    /// newer session reuses its revision.
    pub(crate) fn check_handle(&self, session: OpenSession) -> DbResult<()> {
        match self.sessions.last() {
            Some(innermost) if innermost.token == session.token => Ok(()),
            Some(innermost) if self.sessions.contains(&session) => {
                Err(DbError::InvalidSessionOrder {
                    expected: innermost.revision,
                    requested: session.revision,
                })
            }
            _ => Err(DbError::NoSession {
                requested: session.revision,
            }),
        }
    }
}

/// The state database: one [`GenericIndex`] per registered object type,
/// all sharing one backing [`Region`].
///
/// Access goes through a single readers-writer lock:
///
/// - [`read`](Self::read) hands out a shared [`ReadGuard`] for queries
/// - [`write`](Self::write) hands out an exclusive [`WriteGuard`] for
///   creates, modifies, removes and session control
///
/// Locks do not nest. While a thread holds either guard, any further lock
/// request from that thread (including the convenience methods and session
/// handles, which lock internally) fails with [`DbError::ReentrantAccess`]
/// instead of deadlocking.
///
/// Undo sessions span every index. [`start_undo_session`](Self::start_undo_session)
/// returns an RAII [`Session`] that undoes itself when dropped unless it was
/// committed or pushed.
///
/// The database is an explicit handle: construct it once at startup and
/// pass it (for example in an `Arc`) to every consumer.
pub struct Database {
    pub(crate) state: RwLock<DatabaseState>,
    pub(crate) hooks: RwLock<Hooks>,
    /// Thread currently holding the write lock.
    pub(crate) write_owner: Mutex<Option<ThreadId>>,
    /// Threads currently holding a read guard.
    pub(crate) readers: Mutex<HashSet<ThreadId>>,
    config: DatabaseConfig,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.config.path)
            .field("read_only", &self.config.region.read_only)
            .finish()
    }
}

impl Database {
    /// Open (or create) a database.
    pub fn open(config: DatabaseConfig) -> DbResult<Self> {
        config.validate()?;
        let region = Region::open(config.path.as_deref(), config.region.clone())?;
        let base_revision = region.revision();

        info!(
            path = ?config.path,
            revision = base_revision,
            read_only = config.region.read_only,
            "database opened"
        );

        Ok(Self {
            state: RwLock::new(DatabaseState {
                region,
                indices: BTreeMap::new(),
                sessions: Vec::new(),
                next_token: 0,
                base_revision,
                schema_locked: false,
            }),
            hooks: RwLock::new(Hooks::default()),
            write_owner: Mutex::new(None),
            readers: Mutex::new(HashSet::new()),
            config,
        })
    }

    /// A fresh in-memory database with default sizing.
    pub fn in_memory() -> DbResult<Self> {
        Self::open(DatabaseConfig::in_memory())
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    // ---------------------------------------------------------------
    // Locking
    // ---------------------------------------------------------------

    /// Take the shared lock.
    pub fn read(&self) -> DbResult<ReadGuard<'_>> {
        self.check_reentrancy()?;
        let state = self
            .state
            .read()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))?;
        self.reader_set()?.insert(thread::current().id());
        Ok(ReadGuard::new(self, state))
    }

    /// Take the exclusive lock.
    pub fn write(&self) -> DbResult<WriteGuard<'_>> {
        self.check_reentrancy()?;
        let state = self
            .state
            .write()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))?;
        *self.lock_owner()? = Some(thread::current().id());
        Ok(WriteGuard::new(self, state))
    }

    fn check_reentrancy(&self) -> DbResult<()> {
        let me = thread::current().id();
        if *self.lock_owner()? == Some(me) || self.reader_set()?.contains(&me) {
            return Err(DbError::ReentrantAccess);
        }
        Ok(())
    }

    pub(crate) fn reader_set(&self) -> DbResult<std::sync::MutexGuard<'_, HashSet<ThreadId>>> {
        self.readers
            .lock()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))
    }

    pub(crate) fn lock_owner(&self) -> DbResult<std::sync::MutexGuard<'_, Option<ThreadId>>> {
        self.write_owner
            .lock()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))
    }

    /// Run `f` over the registered observers. A poisoned observer table
    /// skips notification.
    pub(crate) fn with_hooks(&self, f: impl FnOnce(&Hooks)) {
        match self.hooks.read() {
            Ok(hooks) => f(&hooks),
            Err(e) => warn!(error = %e, "observer table poisoned; notifications skipped"),
        }
    }

    // ---------------------------------------------------------------
    // Schema
    // ---------------------------------------------------------------

    /// Register the index for `T`, loading any objects a previous flush
    /// persisted for it.
    ///
    /// Every type must be registered before the first session starts.
    pub fn register_index<T: Object>(&self) -> DbResult<()> {
        let desc = TypeDescriptor::validate::<T>().map_err(sdb_index::IndexError::from)?;
        let mut guard = self.write()?;
        let state = guard.state_mut();

        if state.schema_locked {
            return Err(DbError::SchemaLocked {
                type_name: desc.name,
            });
        }
        let taken = state.indices.contains_key(&desc.type_id)
            || state
                .indices
                .values()
                .any(|index| index.object_type_name() == desc.name);
        if taken {
            return Err(DbError::IndexAlreadyRegistered {
                type_name: desc.name,
                type_id: desc.type_id,
            });
        }

        let index = GenericIndex::<T>::open(&mut state.region)?;
        info!(
            type_name = desc.name,
            type_id = desc.type_id,
            objects = index.len(),
            "index registered"
        );
        state.indices.insert(desc.type_id, Box::new(index));
        Ok(())
    }

    /// Summaries of every registered index, in type id order.
    pub fn indices(&self) -> DbResult<Vec<IndexInfo>> {
        Ok(self.read()?.indices())
    }

    // ---------------------------------------------------------------
    // Observers
    // ---------------------------------------------------------------

    /// Observe writes to objects of type `T`.
    pub fn add_observer<T: Object>(&self, observer: Arc<dyn Observer<T>>) -> DbResult<()> {
        self.check_reentrancy()?;
        self.hooks
            .write()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))?
            .add(observer);
        Ok(())
    }

    /// Observe successful writes to objects of type `T` with a closure.
    pub fn on_after_write<T, F>(&self, f: F) -> DbResult<()>
    where
        T: Object,
        F: Fn(WriteKind, &T) -> ObserverResult + Send + Sync + 'static,
    {
        self.add_observer::<T>(Arc::new(AfterWrite(f)))
    }

    /// Observe session start, commit, and undo.
    pub fn add_session_observer(&self, observer: Arc<dyn SessionObserver>) -> DbResult<()> {
        self.check_reentrancy()?;
        self.hooks
            .write()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))?
            .add_session(observer);
        Ok(())
    }

    /// Number of registered observers of either kind.
    pub fn observer_count(&self) -> DbResult<usize> {
        Ok(self
            .hooks
            .read()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))?
            .len())
    }

    // ---------------------------------------------------------------
    // Single-call conveniences (each takes the lock once)
    // ---------------------------------------------------------------

    /// Create an object and return a copy of it.
    pub fn create<T, F>(&self, init: F) -> DbResult<T>
    where
        T: Object,
        F: FnOnce(Id<T>) -> T,
    {
        Ok(self.write()?.create(init)?.clone())
    }

    /// Modify an object and return a copy of its new value.
    pub fn modify<T, F>(&self, id: Id<T>, mutate: F) -> DbResult<T>
    where
        T: Object,
        F: FnOnce(&mut T),
    {
        Ok(self.write()?.modify(id, mutate)?.clone())
    }

    /// Remove an object and return its last value.
    pub fn remove<T: Object>(&self, id: Id<T>) -> DbResult<T> {
        self.write()?.remove(id)
    }

    /// Copy of the object with identity `id`, if it is live.
    pub fn get<T: Object>(&self, id: Id<T>) -> DbResult<Option<T>> {
        Ok(self.read()?.index::<T>()?.get(id).cloned())
    }

    // ---------------------------------------------------------------
    // Sessions
    // ---------------------------------------------------------------

    /// Open a new innermost undo session on every index.
    pub fn start_undo_session(&self) -> DbResult<Session<'_>> {
        let open = self.write()?.open_session()?;
        Ok(Session::new(self, open))
    }

    pub(crate) fn commit_session(&self, session: OpenSession) -> DbResult<()> {
        self.write()?.commit_session(session)
    }

    pub(crate) fn undo_session(&self, session: OpenSession) -> DbResult<()> {
        self.write()?.undo_session(session)
    }

    /// Commit the innermost session, which must have revision `revision`.
    pub fn commit(&self, revision: u64) -> DbResult<()> {
        self.write()?.commit(revision)
    }

    /// Undo the innermost session, which must have revision `revision`.
    pub fn undo(&self, revision: u64) -> DbResult<()> {
        self.write()?.undo(revision)
    }

    /// Undo every open session, innermost first.
    pub fn undo_all(&self) -> DbResult<()> {
        self.write()?.undo_all()
    }

    /// Revision of the innermost open session, or of the committed state
    /// when none is open.
    pub fn revision(&self) -> DbResult<u64> {
        Ok(self.read()?.revision())
    }

    /// Set the committed revision. Only allowed with no session open.
    pub fn set_revision(&self, revision: u64) -> DbResult<()> {
        self.write()?.set_revision(revision)
    }

    /// Number of open sessions.
    pub fn session_depth(&self) -> DbResult<usize> {
        Ok(self.read()?.session_depth())
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    pub fn region_stats(&self) -> DbResult<RegionStats> {
        Ok(self.read()?.region_stats())
    }

    /// Grow the backing region by at least `additional` bytes.
    pub fn grow(&self, additional: u64) -> DbResult<()> {
        let mut guard = self.write()?;
        guard.state_mut().region.grow(additional)?;
        Ok(())
    }

    /// Persist every index and the current revision, then flush the region.
    ///
    /// With sessions open, the current (uncommitted) state is what gets
    /// persisted; the undo stack itself lives only in memory.
    pub fn flush(&self) -> DbResult<()> {
        let mut guard = self.write()?;
        flush_state(guard.state_mut())
    }

    /// Flush and release the region.
    pub fn close(self) -> DbResult<()> {
        self.check_reentrancy()?;
        let mut state = self
            .state
            .into_inner()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))?;
        flush_state(&mut state)?;
        let indices = state.indices.len();
        state.region.close()?;
        info!(path = ?self.config.path, indices, "database closed");
        Ok(())
    }
}

fn flush_state(state: &mut DatabaseState) -> DbResult<()> {
    if state.region.is_read_only() {
        debug!("read-only database; nothing to flush");
        return Ok(());
    }
    if !state.sessions.is_empty() {
        warn!(
            depth = state.sessions.len(),
            revision = state.revision(),
            "flushing with open undo sessions; uncommitted changes are persisted"
        );
    }
    for index in state.indices.values_mut() {
        index.persist(&mut state.region)?;
    }
    let revision = state.revision();
    state.region.set_revision(revision)?;
    state.region.flush()?;
    debug!(revision, indices = state.indices.len(), "database flushed");
    Ok(())
}
