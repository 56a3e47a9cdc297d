//! Type-erased view of an index, for code that handles every registered
//! type uniformly (session fan-out, flush, introspection).

use std::any::Any;

use sdb_region::Region;
use sdb_types::Object;

use crate::error::IndexResult;
use crate::index::GenericIndex;

/// Summary of one index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexInfo {
    pub type_id: u16,
    pub type_name: &'static str,
    pub len: usize,
    pub next_id: u64,
    /// `(name, unique)` for every key, identity key first.
    pub keys: Vec<(&'static str, bool)>,
}

/// Operations every [`GenericIndex`] supports regardless of its object type.
pub trait AnyIndex: Send + Sync {
    fn object_type_id(&self) -> u16;

    fn object_type_name(&self) -> &'static str;

    fn info(&self) -> IndexInfo;

    fn start_undo_session(&mut self, revision: u64);

    fn commit_session(&mut self, revision: u64) -> IndexResult<()>;

    fn undo_session(&mut self, region: &mut Region, revision: u64) -> IndexResult<()>;

    fn session_depth(&self) -> usize;

    fn persist(&mut self, region: &mut Region) -> IndexResult<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Object> AnyIndex for GenericIndex<T> {
    fn object_type_id(&self) -> u16 {
        T::TYPE_ID
    }

    fn object_type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn info(&self) -> IndexInfo {
        IndexInfo {
            type_id: T::TYPE_ID,
            type_name: T::TYPE_NAME,
            len: self.len(),
            next_id: self.next_id().get(),
            keys: self.key_names(),
        }
    }

    fn start_undo_session(&mut self, revision: u64) {
        GenericIndex::start_undo_session(self, revision);
    }

    fn commit_session(&mut self, revision: u64) -> IndexResult<()> {
        GenericIndex::commit_session(self, revision)
    }

    fn undo_session(&mut self, region: &mut Region, revision: u64) -> IndexResult<()> {
        GenericIndex::undo_session(self, region, revision)
    }

    fn session_depth(&self) -> usize {
        GenericIndex::session_depth(self)
    }

    fn persist(&mut self, region: &mut Region) -> IndexResult<()> {
        GenericIndex::persist(self, region)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Downcast an erased index to its concrete type.
pub fn downcast<T: Object>(index: &dyn AnyIndex) -> Option<&GenericIndex<T>> {
    index.as_any().downcast_ref::<GenericIndex<T>>()
}

/// Mutable counterpart of [`downcast`].
pub fn downcast_mut<T: Object>(index: &mut dyn AnyIndex) -> Option<&mut GenericIndex<T>> {
    index.as_any_mut().downcast_mut::<GenericIndex<T>>()
}
