//! The state database (SDB): a registry of generic indices over one
//! backing region, with nested undo sessions and write notifications.
//!
//! ```no_run
//! use sdb_db::{Database, DatabaseConfig};
//! # use sdb_types::{Id, KeyDef, Object};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Clone, Debug, Serialize, Deserialize)]
//! # struct Account { id: Id<Account>, name: String }
//! # impl Object for Account {
//! #     const TYPE_ID: u16 = 1;
//! #     const TYPE_NAME: &'static str = "account";
//! #     fn id(&self) -> Id<Self> { self.id }
//! #     fn keys() -> Vec<KeyDef<Self>> {
//! #         vec![KeyDef::unique("by_name", |a: &Account| a.name.as_str().into())]
//! #     }
//! # }
//! # fn main() -> sdb_db::DbResult<()> {
//! let db = Database::open(DatabaseConfig::at("state.sdb"))?;
//! db.register_index::<Account>()?;
//!
//! {
//!     let mut session = db.start_undo_session()?;
//!     db.create(|id| Account { id, name: "alice".into() })?;
//!     session.commit()?;
//! }
//!
//! let alice = db.read()?.index::<Account>()?.find_by("by_name", "alice")?.cloned();
//! assert!(alice.is_some());
//! db.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod guard;
pub mod hooks;
pub mod session;

pub use config::DatabaseConfig;
pub use database::Database;
pub use error::{DbError, DbResult};
pub use guard::{ReadGuard, WriteGuard};
pub use hooks::{AfterWrite, Observer, ObserverResult, SessionEvent, SessionObserver, WriteKind};
pub use session::Session;

pub use sdb_index::{GenericIndex, IndexInfo};
pub use sdb_region::{GrowPolicy, RegionConfig, RegionStats};
pub use sdb_types::{Id, IndexKey, KeyDef, KeyPart, Object};
