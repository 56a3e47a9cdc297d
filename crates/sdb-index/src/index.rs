//! The generic multi-key index.
//!
//! A [`GenericIndex<T>`] owns every live object of one type. Objects are
//! held once, in an identity-ordered map; each declared key (plus the
//! implicit `by_id` key) is a [`KeyView`] of `(key, id)` pairs kept in step
//! with the objects on every change.
//!
//! Every change is written through to the backing region: the object's
//! encoded form lives in its own block, and the index root written by
//! [`GenericIndex::persist`] records where each block is. The index never
//! owns the region; callers pass it to each mutating call.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeBounds;

use tracing::debug;

use sdb_region::{object_allocator, root_allocator, BlockRef, Region, Stored, TypedAllocator};
use sdb_types::{Id, IndexKey, KeyDef, Object, TypeDescriptor, BY_ID};

use crate::error::{IndexError, IndexResult};
use crate::keys::KeyView;
use crate::root::IndexRoot;
use crate::undo::{UndoFrame, UndoRecord};

struct Entry<T> {
    value: T,
    stored: Stored<T>,
}

fn identity_key<T: Object>(object: &T) -> IndexKey {
    object.id().into()
}

/// All live objects of type `T`, their key views, and their undo log.
pub struct GenericIndex<T: Object> {
    objects: BTreeMap<u64, Entry<T>>,
    /// `views[0]` is the identity view.
    views: Vec<KeyView<T>>,
    next_id: u64,
    frames: Vec<UndoFrame<T>>,
    root: Option<Stored<IndexRoot>>,
    alloc: TypedAllocator<T>,
}

impl<T: Object> fmt::Debug for GenericIndex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericIndex")
            .field("type", &T::TYPE_NAME)
            .field("objects", &self.objects.len())
            .field("next_id", &self.next_id)
            .field("sessions", &self.frames.len())
            .finish()
    }
}

impl<T: Object> GenericIndex<T> {
    /// Attach the index for `T` to a region.
    ///
    /// Claims the type's slot in the region's type table. If the slot holds
    /// a root from an earlier flush, every object it lists is decoded and
    /// re-indexed, and identity numbering resumes after the highest id ever
    /// issued.
    pub fn open(region: &mut Region) -> IndexResult<Self> {
        let desc = TypeDescriptor::validate::<T>()?;
        let slot = region.register_type(desc.type_id, desc.name)?;

        let mut index = Self::empty();
        index.next_id = slot.next_id;
        if let Some(offset) = slot.root_offset {
            index.load(region, BlockRef::from_offset(offset))?;
        }

        debug!(
            type_name = T::TYPE_NAME,
            type_id = T::TYPE_ID,
            objects = index.len(),
            next_id = index.next_id,
            "index opened"
        );
        Ok(index)
    }

    fn empty() -> Self {
        let mut views = vec![KeyView::new(KeyDef::unique(BY_ID, identity_key::<T>))];
        views.extend(T::keys().into_iter().map(KeyView::new));
        Self {
            objects: BTreeMap::new(),
            views,
            next_id: 0,
            frames: Vec::new(),
            root: None,
            alloc: object_allocator::<T>(),
        }
    }

    fn load(&mut self, region: &Region, block: BlockRef) -> IndexResult<()> {
        let root_stored = Stored::from_block(block);
        let root = root_allocator::<IndexRoot>(T::TYPE_ID).read(region, root_stored)?;
        if root.type_name != T::TYPE_NAME {
            return Err(Self::corrupt(format!(
                "root belongs to {:?}",
                root.type_name
            )));
        }

        for (id, offset) in root.objects {
            let stored = Stored::from_block(BlockRef::from_offset(offset));
            let value = self.alloc.read(region, stored)?;
            if value.id().get() != id {
                return Err(Self::corrupt(format!(
                    "block at {offset} holds id {} but the root lists {id}",
                    value.id().get()
                )));
            }
            let keys = self.keys_of(&value);
            for (view, key) in self.views.iter().zip(&keys) {
                if let Some(other) = view.conflict(key, None) {
                    return Err(Self::corrupt(format!(
                        "ids {other} and {id} share {} = {key}",
                        view.name()
                    )));
                }
            }
            self.insert_keys(keys, id);
            self.objects.insert(id, Entry { value, stored });
        }

        let past_last = self.objects.keys().next_back().map_or(0, |id| id + 1);
        self.next_id = self.next_id.max(root.next_id).max(past_last);
        self.root = Some(root_stored);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The identity the next created object will receive.
    pub fn next_id(&self) -> Id<T> {
        Id::new(self.next_id)
    }

    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.objects.get(&id.get()).map(|entry| &entry.value)
    }

    pub fn contains(&self, id: Id<T>) -> bool {
        self.objects.contains_key(&id.get())
    }

    /// Like [`get`](Self::get), but a missing object is an error.
    pub fn find(&self, id: Id<T>) -> IndexResult<&T> {
        self.get(id).ok_or_else(|| Self::not_found(id.get()))
    }

    /// All objects in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.objects.values().map(|entry| &entry.value)
    }

    /// First object (in identity order) whose `key` equals `value`.
    pub fn find_by(&self, key: &str, value: impl Into<IndexKey>) -> IndexResult<Option<&T>> {
        let view = self.view(key)?;
        let value = value.into();
        let found = view.ids_for(&value).next();
        Ok(found.and_then(|id| self.by_raw(id)))
    }

    /// Every object whose `key` equals `value`, in identity order.
    pub fn find_all(&self, key: &str, value: impl Into<IndexKey>) -> IndexResult<Vec<&T>> {
        let view = self.view(key)?;
        let value = value.into();
        Ok(view.ids_for(&value).filter_map(|id| self.by_raw(id)).collect())
    }

    /// Every object whose composite `key` starts with `prefix`, in key order.
    pub fn find_prefix(&self, key: &str, prefix: impl Into<IndexKey>) -> IndexResult<Vec<&T>> {
        let view = self.view(key)?;
        let prefix = prefix.into();
        Ok(view
            .ids_with_prefix(&prefix)
            .filter_map(|id| self.by_raw(id))
            .collect())
    }

    /// First object whose `key` is not less than `value`.
    pub fn lower_bound(&self, key: &str, value: impl Into<IndexKey>) -> IndexResult<Option<&T>> {
        let view = self.view(key)?;
        Ok(view.lower_bound(&value.into()).and_then(|id| self.by_raw(id)))
    }

    /// Objects whose `key` falls within `bounds`, in key order.
    pub fn range<R>(&self, key: &str, bounds: R) -> IndexResult<Vec<&T>>
    where
        R: RangeBounds<IndexKey>,
    {
        let view = self.view(key)?;
        let ids = view.ids_in_range(bounds.start_bound().cloned(), bounds.end_bound().cloned());
        Ok(ids.into_iter().filter_map(|id| self.by_raw(id)).collect())
    }

    /// Declared keys as `(name, unique)`, identity key first.
    pub fn key_names(&self) -> Vec<(&'static str, bool)> {
        self.views.iter().map(|v| (v.name(), v.is_unique())).collect()
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Create an object.
    ///
    /// `init` receives the identity the object will carry and must build
    /// an object with exactly that identity. Creation is all-or-nothing: if
    /// any unique key is taken, or the region cannot store the object,
    /// nothing is inserted and no identity is consumed.
    pub fn create<F>(&mut self, region: &mut Region, init: F) -> IndexResult<&T>
    where
        F: FnOnce(Id<T>) -> T,
    {
        let id = Id::new(self.next_id);
        let value = init(id);
        Self::check_identity(id.get(), &value)?;

        let keys = self.keys_of(&value);
        self.check_unique(&keys, None)?;
        let stored = self.alloc.allocate(region, &value)?;

        self.record(UndoRecord::Created(id));
        self.insert_keys(keys, id.get());
        self.next_id += 1;
        let entry = self.objects.entry(id.get()).or_insert(Entry { value, stored });
        Ok(&entry.value)
    }

    /// Modify an object in place.
    ///
    /// `mutate` runs on a copy. Key views are re-synchronized only for keys
    /// whose projection changed. If the change would duplicate a unique
    /// key or alter the identity, it is rejected and the stored object is
    /// left exactly as it was.
    pub fn modify<F>(&mut self, region: &mut Region, id: Id<T>, mutate: F) -> IndexResult<&T>
    where
        F: FnOnce(&mut T),
    {
        let raw = id.get();
        let (previous, stored) = match self.objects.get(&raw) {
            Some(entry) => (entry.value.clone(), entry.stored),
            None => return Err(Self::not_found(raw)),
        };

        let mut updated = previous.clone();
        mutate(&mut updated);
        Self::check_identity(raw, &updated)?;

        let old_keys = self.keys_of(&previous);
        let new_keys = self.keys_of(&updated);
        for ((view, old), new) in self.views.iter().zip(&old_keys).zip(&new_keys) {
            if old != new && view.conflict(new, Some(raw)).is_some() {
                return Err(Self::duplicate(view.name(), new));
            }
        }
        let stored = self.alloc.replace(region, stored, &updated)?;

        self.record(UndoRecord::Modified(previous));
        self.swap_keys(raw, old_keys, new_keys);
        let entry = self
            .objects
            .get_mut(&raw)
            .ok_or_else(|| Self::not_found(raw))?;
        entry.value = updated;
        entry.stored = stored;
        Ok(&entry.value)
    }

    /// Remove an object, returning its last value.
    pub fn remove(&mut self, region: &mut Region, id: Id<T>) -> IndexResult<T> {
        let raw = id.get();
        let stored = self
            .objects
            .get(&raw)
            .map(|entry| entry.stored)
            .ok_or_else(|| Self::not_found(raw))?;
        self.alloc.deallocate(region, stored)?;

        let entry = self
            .objects
            .remove(&raw)
            .ok_or_else(|| Self::not_found(raw))?;
        let keys = self.keys_of(&entry.value);
        self.remove_keys(keys, raw);
        self.record(UndoRecord::Removed(entry.value.clone()));
        Ok(entry.value)
    }

    // ---------------------------------------------------------------
    // Undo sessions
    // ---------------------------------------------------------------

    /// Open a new innermost session.
    pub fn start_undo_session(&mut self, revision: u64) {
        self.frames.push(UndoFrame::new(revision, self.next_id));
    }

    /// Number of open sessions.
    pub fn session_depth(&self) -> usize {
        self.frames.len()
    }

    /// Revision of the innermost open session.
    pub fn session_revision(&self) -> Option<u64> {
        self.frames.last().map(|frame| frame.revision)
    }

    /// Undo records held by the innermost open session.
    pub fn pending_records(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.records.len())
    }

    /// Commit the innermost session: its records move to the enclosing
    /// session, or are dropped if it was the outermost.
    pub fn commit_session(&mut self, revision: u64) -> IndexResult<()> {
        let frame = self.pop_innermost(revision)?;
        let records = frame.records.len();
        if let Some(parent) = self.frames.last_mut() {
            parent.absorb(frame);
        }
        debug!(type_name = T::TYPE_NAME, revision, records, "session committed");
        Ok(())
    }

    /// Revert the innermost session, newest change first, and rewind the
    /// identity counter to where it stood when the session started.
    ///
    /// A region failure part-way through leaves the index partially
    /// reverted; region errors are fatal to the database.
    pub fn undo_session(&mut self, region: &mut Region, revision: u64) -> IndexResult<()> {
        let frame = self.pop_innermost(revision)?;
        let records = frame.records.len();
        for record in frame.records.into_iter().rev() {
            self.revert(region, record)?;
        }
        self.next_id = frame.next_id;
        debug!(type_name = T::TYPE_NAME, revision, records, "session undone");
        Ok(())
    }

    /// Revert every open session, innermost first.
    pub fn undo_all(&mut self, region: &mut Region) -> IndexResult<()> {
        while let Some(revision) = self.session_revision() {
            self.undo_session(region, revision)?;
        }
        Ok(())
    }

    fn pop_innermost(&mut self, revision: u64) -> IndexResult<UndoFrame<T>> {
        let expected = self.session_revision();
        if expected != Some(revision) {
            return Err(IndexError::InvalidSessionOrder {
                expected,
                requested: revision,
            });
        }
        self.frames.pop().ok_or(IndexError::InvalidSessionOrder {
            expected,
            requested: revision,
        })
    }

    fn revert(&mut self, region: &mut Region, record: UndoRecord<T>) -> IndexResult<()> {
        match record {
            UndoRecord::Created(id) => {
                let raw = id.get();
                let entry = self
                    .objects
                    .remove(&raw)
                    .ok_or_else(|| Self::not_found(raw))?;
                self.alloc.deallocate(region, entry.stored)?;
                let keys = self.keys_of(&entry.value);
                self.remove_keys(keys, raw);
            }
            UndoRecord::Modified(previous) => {
                let raw = previous.id().get();
                let entry = self.objects.get(&raw).ok_or_else(|| Self::not_found(raw))?;
                let current_keys = self.keys_of(&entry.value);
                let stored = self.alloc.replace(region, entry.stored, &previous)?;
                let previous_keys = self.keys_of(&previous);
                self.swap_keys(raw, current_keys, previous_keys);
                if let Some(entry) = self.objects.get_mut(&raw) {
                    entry.value = previous;
                    entry.stored = stored;
                }
            }
            UndoRecord::Removed(previous) => {
                let raw = previous.id().get();
                let stored = self.alloc.allocate(region, &previous)?;
                let keys = self.keys_of(&previous);
                self.insert_keys(keys, raw);
                self.objects.insert(raw, Entry { value: previous, stored });
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------

    /// Write the index root and record it, with the identity counter, in
    /// the region's type table.
    pub fn persist(&mut self, region: &mut Region) -> IndexResult<()> {
        let root = IndexRoot {
            type_name: T::TYPE_NAME.to_string(),
            next_id: self.next_id,
            objects: self
                .objects
                .iter()
                .map(|(id, entry)| (*id, entry.stored.block().offset()))
                .collect(),
        };
        let allocator = root_allocator::<IndexRoot>(T::TYPE_ID);
        let stored = match self.root {
            Some(existing) => allocator.replace(region, existing, &root)?,
            None => allocator.allocate(region, &root)?,
        };
        self.root = Some(stored);
        region.update_type(T::TYPE_ID, self.next_id, Some(stored.block()))?;
        debug!(
            type_name = T::TYPE_NAME,
            objects = root.objects.len(),
            next_id = self.next_id,
            "index persisted"
        );
        Ok(())
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn view(&self, key: &str) -> IndexResult<&KeyView<T>> {
        self.views
            .iter()
            .find(|view| view.name() == key)
            .ok_or_else(|| IndexError::UnknownKey {
                type_name: T::TYPE_NAME,
                key: key.to_string(),
            })
    }

    fn by_raw(&self, id: u64) -> Option<&T> {
        self.objects.get(&id).map(|entry| &entry.value)
    }

    fn keys_of(&self, object: &T) -> Vec<IndexKey> {
        self.views.iter().map(|view| view.key_of(object)).collect()
    }

    fn check_unique(&self, keys: &[IndexKey], except: Option<u64>) -> IndexResult<()> {
        for (view, key) in self.views.iter().zip(keys) {
            if view.conflict(key, except).is_some() {
                return Err(Self::duplicate(view.name(), key));
            }
        }
        Ok(())
    }

    fn insert_keys(&mut self, keys: Vec<IndexKey>, id: u64) {
        for (view, key) in self.views.iter_mut().zip(keys) {
            view.insert(key, id);
        }
    }

    fn remove_keys(&mut self, keys: Vec<IndexKey>, id: u64) {
        for (view, key) in self.views.iter_mut().zip(keys) {
            view.remove(key, id);
        }
    }

    fn swap_keys(&mut self, id: u64, old_keys: Vec<IndexKey>, new_keys: Vec<IndexKey>) {
        for ((view, old), new) in self.views.iter_mut().zip(old_keys).zip(new_keys) {
            if old != new {
                view.remove(old, id);
                view.insert(new, id);
            }
        }
    }

    fn record(&mut self, record: UndoRecord<T>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.records.push(record);
        }
    }

    fn check_identity(expected: u64, object: &T) -> IndexResult<()> {
        let found = object.id().get();
        if found != expected {
            return Err(IndexError::IdentityChanged {
                type_name: T::TYPE_NAME,
                id: expected,
                found,
            });
        }
        Ok(())
    }

    fn not_found(id: u64) -> IndexError {
        IndexError::NotFound {
            type_name: T::TYPE_NAME,
            id,
        }
    }

    fn duplicate(key: &'static str, value: &IndexKey) -> IndexError {
        IndexError::DuplicateKey {
            type_name: T::TYPE_NAME,
            key,
            value: value.to_string(),
        }
    }

    fn corrupt(reason: String) -> IndexError {
        IndexError::Corrupt {
            type_name: T::TYPE_NAME,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sdb_region::RegionConfig;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: Id<Account>,
        name: String,
        balance: u64,
        tags: Vec<String>,
    }

    impl Object for Account {
        const TYPE_ID: u16 = 1;
        const TYPE_NAME: &'static str = "account";

        fn id(&self) -> Id<Self> {
            self.id
        }

        fn keys() -> Vec<KeyDef<Self>> {
            vec![
                KeyDef::unique("by_name", |a: &Account| a.name.as_str().into()),
                KeyDef::non_unique("by_balance", |a: &Account| a.balance.into()),
            ]
        }
    }

    fn account(id: Id<Account>, name: &str, balance: u64) -> Account {
        Account {
            id,
            name: name.to_string(),
            balance,
            tags: Vec::new(),
        }
    }

    fn setup() -> (Region, GenericIndex<Account>) {
        let mut region =
            Region::open(None, RegionConfig::with_sizes(256 * 1024, 64 * 1024 * 1024)).unwrap();
        let index = GenericIndex::open(&mut region).unwrap();
        (region, index)
    }

    fn snapshot(index: &GenericIndex<Account>) -> Vec<Account> {
        index.iter().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Create / find
    // -----------------------------------------------------------------------

    #[test]
    fn ids_are_sequential_from_zero() {
        let (mut region, mut index) = setup();
        let a = index.create(&mut region, |id| account(id, "alice", 10)).unwrap().id;
        let b = index.create(&mut region, |id| account(id, "bob", 20)).unwrap().id;
        assert_eq!(a.get(), 0);
        assert_eq!(b.get(), 1);
        assert_eq!(index.next_id().get(), 2);
    }

    #[test]
    fn lookups_by_every_key() {
        let (mut region, mut index) = setup();
        for (name, balance) in [("carol", 5), ("alice", 10), ("bob", 10)] {
            index.create(&mut region, |id| account(id, name, balance)).unwrap();
        }

        assert_eq!(index.find_by("by_name", "bob").unwrap().unwrap().balance, 10);
        assert!(index.find_by("by_name", "zed").unwrap().is_none());
        assert_eq!(index.find_by(BY_ID, 0u64).unwrap().unwrap().name, "carol");

        let tens: Vec<&str> = index
            .find_all("by_balance", 10u64)
            .unwrap()
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(tens, vec!["alice", "bob"]);

        let names: Vec<&str> = index
            .range("by_name", IndexKey::from("b")..)
            .unwrap()
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["bob", "carol"]);

        assert_eq!(index.lower_bound("by_balance", 6u64).unwrap().unwrap().name, "alice");
        assert!(matches!(
            index.find_by("by_owner", 1u64),
            Err(IndexError::UnknownKey { .. })
        ));
    }

    #[test]
    fn duplicate_create_changes_nothing() {
        let (mut region, mut index) = setup();
        index.create(&mut region, |id| account(id, "alice", 1)).unwrap();
        let live = region.stats().live_blocks;

        let err = index
            .create(&mut region, |id| account(id, "alice", 2))
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateKey { key: "by_name", .. }));
        assert_eq!(index.len(), 1);
        assert_eq!(index.next_id().get(), 1);
        assert_eq!(region.stats().live_blocks, live);
    }

    #[test]
    fn constructor_cannot_choose_identity() {
        let (mut region, mut index) = setup();
        let err = index
            .create(&mut region, |_| account(Id::new(42), "x", 0))
            .unwrap_err();
        assert!(matches!(err, IndexError::IdentityChanged { id: 0, found: 42, .. }));
        assert!(index.is_empty());
    }

    // -----------------------------------------------------------------------
    // Modify / remove
    // -----------------------------------------------------------------------

    #[test]
    fn modify_resyncs_changed_keys() {
        let (mut region, mut index) = setup();
        let id = index.create(&mut region, |id| account(id, "alice", 1)).unwrap().id;
        index
            .modify(&mut region, id, |a| {
                a.name = "alicia".into();
                a.tags.push("renamed".into());
            })
            .unwrap();

        assert!(index.find_by("by_name", "alice").unwrap().is_none());
        let found = index.find_by("by_name", "alicia").unwrap().unwrap();
        assert_eq!(found.tags, vec!["renamed".to_string()]);
    }

    #[test]
    fn conflicting_modify_leaves_object_untouched() {
        let (mut region, mut index) = setup();
        let a = index.create(&mut region, |id| account(id, "alice", 1)).unwrap().id;
        index.create(&mut region, |id| account(id, "bob", 2)).unwrap();

        let err = index
            .modify(&mut region, a, |acc| {
                acc.name = "bob".into();
                acc.balance = 99;
            })
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateKey { .. }));
        let alice = index.find(a).unwrap();
        assert_eq!((alice.name.as_str(), alice.balance), ("alice", 1));
        assert_eq!(index.find_all("by_balance", 99u64).unwrap().len(), 0);
    }

    #[test]
    fn modify_cannot_change_identity() {
        let (mut region, mut index) = setup();
        let a = index.create(&mut region, |id| account(id, "alice", 1)).unwrap().id;
        assert!(matches!(
            index.modify(&mut region, a, |acc| acc.id = Id::new(7)),
            Err(IndexError::IdentityChanged { .. })
        ));
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let (mut region, mut index) = setup();
        let a = index.create(&mut region, |id| account(id, "alice", 1)).unwrap().id;
        let removed = index.remove(&mut region, a).unwrap();
        assert_eq!(removed.name, "alice");
        assert!(matches!(
            index.remove(&mut region, a),
            Err(IndexError::NotFound { id: 0, .. })
        ));
        let b = index.create(&mut region, |id| account(id, "alice", 1)).unwrap().id;
        assert_eq!(b.get(), 1);
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    #[test]
    fn undo_reverts_create_modify_remove() {
        let (mut region, mut index) = setup();
        let a = index.create(&mut region, |id| account(id, "alice", 1)).unwrap().id;
        let b = index.create(&mut region, |id| account(id, "bob", 2)).unwrap().id;
        let before = snapshot(&index);

        index.start_undo_session(1);
        index.modify(&mut region, a, |acc| acc.name = "zed".into()).unwrap();
        index.remove(&mut region, b).unwrap();
        index.create(&mut region, |id| account(id, "bob", 3)).unwrap();
        assert_eq!(index.pending_records(), 3);
        index.undo_session(&mut region, 1).unwrap();

        assert_eq!(snapshot(&index), before);
        assert_eq!(index.next_id().get(), 2);
        assert_eq!(index.find_by("by_name", "bob").unwrap().unwrap().id, b);
        assert!(index.find_by("by_name", "zed").unwrap().is_none());
    }

    #[test]
    fn committed_inner_session_is_undone_by_outer() {
        let (mut region, mut index) = setup();
        index.start_undo_session(1);
        index.create(&mut region, |id| account(id, "a", 0)).unwrap();
        index.start_undo_session(2);
        index.create(&mut region, |id| account(id, "b", 0)).unwrap();
        index.commit_session(2).unwrap();
        assert_eq!(index.session_depth(), 1);
        assert_eq!(index.pending_records(), 2);

        index.undo_session(&mut region, 1).unwrap();
        assert!(index.is_empty());
        assert_eq!(region.stats().live_blocks, 0);
    }

    #[test]
    fn outermost_commit_is_permanent() {
        let (mut region, mut index) = setup();
        index.start_undo_session(1);
        index.create(&mut region, |id| account(id, "a", 0)).unwrap();
        index.commit_session(1).unwrap();
        assert_eq!(index.session_depth(), 0);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn out_of_order_session_rejected() {
        let (mut region, mut index) = setup();
        index.start_undo_session(1);
        index.start_undo_session(2);
        assert!(matches!(
            index.commit_session(1),
            Err(IndexError::InvalidSessionOrder { expected: Some(2), requested: 1 })
        ));
        assert!(index.undo_session(&mut region, 1).is_err());
        assert_eq!(index.session_depth(), 2);
        index.undo_all(&mut region).unwrap();
        assert!(matches!(
            index.commit_session(1),
            Err(IndexError::InvalidSessionOrder { expected: None, .. })
        ));
    }

    #[test]
    fn reverse_order_keeps_unique_keys_valid_while_unwinding() {
        let (mut region, mut index) = setup();
        let a = index.create(&mut region, |id| account(id, "x", 0)).unwrap().id;
        index.start_undo_session(1);
        // Free "x" then hand it to a new object.
        index.modify(&mut region, a, |acc| acc.name = "y".into()).unwrap();
        index.create(&mut region, |id| account(id, "x", 0)).unwrap();
        index.undo_session(&mut region, 1).unwrap();
        assert_eq!(index.find_by("by_name", "x").unwrap().unwrap().id, a);
        assert_eq!(index.len(), 1);
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    #[test]
    fn persisted_index_reloads() {
        let (mut region, mut index) = setup();
        let a = index.create(&mut region, |id| account(id, "alice", 1)).unwrap().id;
        let b = index.create(&mut region, |id| account(id, "bob", 2)).unwrap().id;
        index.remove(&mut region, b).unwrap();
        index.persist(&mut region).unwrap();
        index.modify(&mut region, a, |acc| acc.balance = 5).unwrap();
        index.persist(&mut region).unwrap();

        let reloaded = GenericIndex::<Account>::open(&mut region).unwrap();
        assert_eq!(snapshot(&reloaded), snapshot(&index));
        assert_eq!(reloaded.next_id().get(), 2);
        assert_eq!(reloaded.find_by("by_name", "alice").unwrap().unwrap().balance, 5);
    }

    proptest! {
        #[test]
        fn undo_restores_any_history(ops in proptest::collection::vec((0u8..3, 0u64..6, 0u64..4), 1..40)) {
            let (mut region, mut index) = setup();
            for i in 0..4u64 {
                index.create(&mut region, |id| account(id, &format!("n{i}"), i)).unwrap();
            }
            let before = snapshot(&index);
            let next_before = index.next_id();

            index.start_undo_session(1);
            for (op, target, value) in ops {
                let id = Id::new(target);
                let _ = match op {
                    0 => index
                        .create(&mut region, |id| account(id, &format!("n{value}"), value))
                        .map(|_| ()),
                    1 => index
                        .modify(&mut region, id, |acc| {
                            acc.name = format!("n{value}");
                            acc.balance += 1;
                        })
                        .map(|_| ()),
                    _ => index.remove(&mut region, id).map(|_| ()),
                };
            }
            index.undo_session(&mut region, 1).unwrap();

            prop_assert_eq!(snapshot(&index), before);
            prop_assert_eq!(index.next_id(), next_before);
            for i in 0..4u64 {
                let found = index.find_by("by_name", format!("n{i}")).unwrap();
                prop_assert_eq!(found.map(|a| a.id.get()), Some(i));
            }
        }
    }
}
