//! Persisted directory of one index.

use serde::{Deserialize, Serialize};

/// What an index writes to its root block at flush: enough to find every
/// object block again after reopening the region.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRoot {
    pub type_name: String,
    pub next_id: u64,
    /// `(identity, object block offset)` for every live object, in identity order.
    pub objects: Vec<(u64, u64)>,
}

impl IndexRoot {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
