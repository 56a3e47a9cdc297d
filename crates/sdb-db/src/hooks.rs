//! Write and session notifications.
//!
//! Observers are best-effort: they run synchronously while the database
//! write lock is held, their errors are logged and otherwise ignored, and
//! they never roll a write back. An observer must not call back into the
//! database; doing so fails with [`DbError::ReentrantAccess`].
//!
//! [`DbError::ReentrantAccess`]: crate::DbError::ReentrantAccess

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use sdb_types::Object;

/// What an observer returns. Errors are logged, never propagated.
pub type ObserverResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// The kind of object write being reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Create,
    Modify,
    Remove,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteKind::Create => f.write_str("create"),
            WriteKind::Modify => f.write_str("modify"),
            WriteKind::Remove => f.write_str("remove"),
        }
    }
}

/// Observes writes to objects of type `T`.
pub trait Observer<T: Object>: Send + Sync {
    /// Called before a write is attempted. `current` is the stored value
    /// for modify and remove, `None` for create. The write may still fail.
    fn before_write(&self, _kind: WriteKind, _current: Option<&T>) -> ObserverResult {
        Ok(())
    }

    /// Called after a write succeeded, with the new value (for removes,
    /// the value that was removed).
    fn after_write(&self, kind: WriteKind, value: &T) -> ObserverResult;
}

/// Adapts a closure into an after-write [`Observer`].
pub struct AfterWrite<F>(pub F);

impl<T, F> Observer<T> for AfterWrite<F>
where
    T: Object,
    F: Fn(WriteKind, &T) -> ObserverResult + Send + Sync,
{
    fn after_write(&self, kind: WriteKind, value: &T) -> ObserverResult {
        (self.0)(kind, value)
    }
}

/// Session lifecycle events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Started { revision: u64 },
    Committed { revision: u64 },
    Undone { revision: u64 },
}

impl SessionEvent {
    pub fn revision(&self) -> u64 {
        match *self {
            SessionEvent::Started { revision }
            | SessionEvent::Committed { revision }
            | SessionEvent::Undone { revision } => revision,
        }
    }
}

/// Observes session lifecycle events across every index.
pub trait SessionObserver: Send + Sync {
    fn on_session(&self, event: SessionEvent) -> ObserverResult;
}

impl<F> SessionObserver for F
where
    F: Fn(SessionEvent) -> ObserverResult + Send + Sync,
{
    fn on_session(&self, event: SessionEvent) -> ObserverResult {
        self(event)
    }
}

/// Registered observers. Typed observers are stored erased, keyed by
/// object type id, each entry an `Arc<dyn Observer<T>>`.
#[derive(Default)]
pub(crate) struct Hooks {
    typed: HashMap<u16, Vec<Box<dyn Any + Send + Sync>>>,
    sessions: Vec<Arc<dyn SessionObserver>>,
}

impl Hooks {
    pub(crate) fn add<T: Object>(&mut self, observer: Arc<dyn Observer<T>>) {
        self.typed
            .entry(T::TYPE_ID)
            .or_default()
            .push(Box::new(observer));
    }

    pub(crate) fn add_session(&mut self, observer: Arc<dyn SessionObserver>) {
        self.sessions.push(observer);
    }

    pub(crate) fn len(&self) -> usize {
        self.typed.values().map(Vec::len).sum::<usize>() + self.sessions.len()
    }

    fn observers<T: Object>(&self) -> impl Iterator<Item = &Arc<dyn Observer<T>>> + '_ {
        self.typed
            .get(&T::TYPE_ID)
            .into_iter()
            .flatten()
            .filter_map(|erased| erased.downcast_ref::<Arc<dyn Observer<T>>>())
    }

    pub(crate) fn before_write<T: Object>(&self, kind: WriteKind, current: Option<&T>) {
        for observer in self.observers::<T>() {
            if let Err(e) = observer.before_write(kind, current) {
                warn!(type_name = T::TYPE_NAME, %kind, error = %e, "before-write observer failed");
            }
        }
    }

    pub(crate) fn after_write<T: Object>(&self, kind: WriteKind, value: &T) {
        for observer in self.observers::<T>() {
            if let Err(e) = observer.after_write(kind, value) {
                warn!(
                    type_name = T::TYPE_NAME,
                    %kind,
                    id = value.id().get(),
                    error = %e,
                    "after-write observer failed"
                );
            }
        }
    }

    pub(crate) fn session(&self, event: SessionEvent) {
        for observer in &self.sessions {
            if let Err(e) = observer.on_session(event) {
                warn!(?event, error = %e, "session observer failed");
            }
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("typed", &self.typed.values().map(Vec::len).sum::<usize>())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
