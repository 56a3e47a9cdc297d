//! Generic multi-key index for the state database (SDB).
//!
//! One [`GenericIndex<T>`] per object type owns every live `T`, keeps a
//! view per declared key (plus the implicit unique `by_id` view), and
//! records an undo log per open session:
//!
//! - creation is all-or-nothing and assigns the next identity
//! - modification runs on a copy and is rejected whole on a key conflict
//! - undo replays the session's inverse records newest first
//!
//! [`AnyIndex`] erases the object type so a registry can fan session
//! operations out to every index.

pub mod erased;
pub mod error;
pub mod index;
mod keys;
pub mod root;
pub mod undo;

pub use erased::{downcast, downcast_mut, AnyIndex, IndexInfo};
pub use error::{IndexError, IndexResult};
pub use index::GenericIndex;
pub use root::IndexRoot;
pub use undo::{UndoFrame, UndoRecord};
