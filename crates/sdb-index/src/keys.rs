//! Key views: one ordered projection of an index's objects.
//!
//! A view stores `(key, id)` pairs only; the objects themselves live once,
//! in the index's identity map. Appending the id to every entry makes
//! non-unique keys ordered by identity and lets a unique key be checked with
//! a single range probe.

use std::collections::BTreeSet;
use std::ops::Bound;

use sdb_types::{IndexKey, KeyDef};

pub(crate) struct KeyView<T> {
    def: KeyDef<T>,
    entries: BTreeSet<(IndexKey, u64)>,
}

impl<T> KeyView<T> {
    pub(crate) fn new(def: KeyDef<T>) -> Self {
        Self {
            def,
            entries: BTreeSet::new(),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.def.name()
    }

    pub(crate) fn is_unique(&self) -> bool {
        self.def.is_unique()
    }

    pub(crate) fn key_of(&self, object: &T) -> IndexKey {
        self.def.key_of(object)
    }

    /// For a unique view, the id of another object already holding `key`.
    pub(crate) fn conflict(&self, key: &IndexKey, except: Option<u64>) -> Option<u64> {
        if !self.is_unique() {
            return None;
        }
        self.ids_for(key).find(|&id| Some(id) != except)
    }

    pub(crate) fn insert(&mut self, key: IndexKey, id: u64) {
        self.entries.insert((key, id));
    }

    pub(crate) fn remove(&mut self, key: IndexKey, id: u64) -> bool {
        self.entries.remove(&(key, id))
    }

    /// Ids holding exactly `key`, in identity order.
    pub(crate) fn ids_for<'a>(&'a self, key: &IndexKey) -> impl Iterator<Item = u64> + 'a {
        let lower = (key.clone(), 0);
        let upper = (key.clone(), u64::MAX);
        self.entries.range(lower..=upper).map(|(_, id)| *id)
    }

    /// Ids whose key starts with `prefix`, in key order.
    pub(crate) fn ids_with_prefix<'a>(
        &'a self,
        prefix: &'a IndexKey,
    ) -> impl Iterator<Item = u64> + 'a {
        self.entries
            .range((prefix.clone(), 0)..)
            .take_while(move |(key, _)| key.starts_with(prefix))
            .map(|(_, id)| *id)
    }

    /// Id of the first entry whose key is not less than `key`.
    pub(crate) fn lower_bound(&self, key: &IndexKey) -> Option<u64> {
        self.entries
            .range((key.clone(), 0)..)
            .next()
            .map(|(_, id)| *id)
    }

    /// Ids whose key falls within the bounds, in key order.
    pub(crate) fn ids_in_range(&self, lower: Bound<IndexKey>, upper: Bound<IndexKey>) -> Vec<u64> {
        let lower = match lower {
            Bound::Included(key) => Bound::Included((key, 0)),
            Bound::Excluded(key) => Bound::Excluded((key, u64::MAX)),
            Bound::Unbounded => Bound::Unbounded,
        };
        let upper = match upper {
            Bound::Included(key) => Bound::Included((key, u64::MAX)),
            Bound::Excluded(key) => Bound::Excluded((key, 0)),
            Bound::Unbounded => Bound::Unbounded,
        };
        if is_empty_range(&lower, &upper) {
            return Vec::new();
        }
        self.entries
            .range((lower, upper))
            .map(|(_, id)| *id)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

// BTreeSet::range panics on inverted bounds; an inverted query is just empty.
fn is_empty_range<K: Ord>(lower: &Bound<K>, upper: &Bound<K>) -> bool {
    match (lower, upper) {
        (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Row {
        id: u64,
        name: &'static str,
        group: u64,
    }

    fn by_name(row: &Row) -> IndexKey {
        row.name.into()
    }

    fn by_group(row: &Row) -> IndexKey {
        (row.group, row.name).into()
    }

    fn view(def: KeyDef<Row>, rows: &[Row]) -> KeyView<Row> {
        let mut view = KeyView::new(def);
        for row in rows {
            view.insert(view.key_of(row), row.id);
        }
        view
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { id: 0, name: "carol", group: 2 },
            Row { id: 1, name: "alice", group: 1 },
            Row { id: 2, name: "bob", group: 1 },
            Row { id: 3, name: "dave", group: 2 },
        ]
    }

    #[test]
    fn unique_conflict_ignores_self() {
        let view = view(KeyDef::unique("by_name", by_name), &rows());
        assert_eq!(view.conflict(&"alice".into(), None), Some(1));
        assert_eq!(view.conflict(&"alice".into(), Some(1)), None);
        assert_eq!(view.conflict(&"erin".into(), None), None);
    }

    #[test]
    fn non_unique_never_conflicts() {
        let view = view(KeyDef::non_unique("by_name", by_name), &rows());
        assert_eq!(view.conflict(&"alice".into(), None), None);
    }

    #[test]
    fn prefix_scan_on_composite_key() {
        let view = view(KeyDef::non_unique("by_group", by_group), &rows());
        let prefix = IndexKey::from(1u64);
        let ids: Vec<u64> = view.ids_with_prefix(&prefix).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn lower_bound_and_ranges() {
        let view = view(KeyDef::unique("by_name", by_name), &rows());
        assert_eq!(view.lower_bound(&"b".into()), Some(2));
        assert_eq!(view.lower_bound(&"z".into()), None);

        let ids = view.ids_in_range(
            Bound::Included("alice".into()),
            Bound::Excluded("dave".into()),
        );
        assert_eq!(ids, vec![1, 2, 0]);

        let ids = view.ids_in_range(Bound::Excluded("bob".into()), Bound::Unbounded);
        assert_eq!(ids, vec![0, 3]);
    }

    #[test]
    fn inverted_range_is_empty() {
        let view = view(KeyDef::unique("by_name", by_name), &rows());
        assert!(view
            .ids_in_range(Bound::Included("z".into()), Bound::Included("a".into()))
            .is_empty());
        assert!(view
            .ids_in_range(Bound::Excluded("bob".into()), Bound::Excluded("bob".into()))
            .is_empty());
    }

    #[test]
    fn remove_drops_entry() {
        let mut view = view(KeyDef::unique("by_name", by_name), &rows());
        assert!(view.remove("bob".into(), 2));
        assert!(!view.remove("bob".into(), 2));
        assert_eq!(view.len(), 3);
    }
}
