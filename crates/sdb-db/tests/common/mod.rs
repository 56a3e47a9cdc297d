//! Object types shared by the integration tests.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};

use sdb_db::{Database, DatabaseConfig, DbResult, Id, KeyDef, Object, RegionConfig};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Id<Account>,
    pub name: String,
    pub balance: u64,
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

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Id<Transfer>,
    pub from: Id<Account>,
    pub seq: u64,
    pub amount: u64,
    pub memo: String,
}

impl Object for Transfer {
    const TYPE_ID: u16 = 2;
    const TYPE_NAME: &'static str = "transfer";

    fn id(&self) -> Id<Self> {
        self.id
    }

    fn keys() -> Vec<KeyDef<Self>> {
        vec![KeyDef::unique("by_from_seq", |t: &Transfer| {
            (t.from, t.seq).into()
        })]
    }
}

pub fn account(id: Id<Account>, name: &str, balance: u64) -> Account {
    Account {
        id,
        name: name.to_string(),
        balance,
    }
}

pub fn small_region() -> RegionConfig {
    RegionConfig::with_sizes(256 * 1024, 64 * 1024 * 1024)
}

/// In-memory database with both types registered.
pub fn memory_db() -> Database {
    let db = Database::open(DatabaseConfig {
        path: None,
        region: small_region(),
    })
    .unwrap();
    register_all(&db).unwrap();
    db
}

pub fn register_all(db: &Database) -> DbResult<()> {
    db.register_index::<Account>()?;
    db.register_index::<Transfer>()
}

pub fn accounts(db: &Database) -> Vec<Account> {
    db.read()
        .unwrap()
        .index::<Account>()
        .unwrap()
        .iter()
        .cloned()
        .collect()
}

pub fn transfers(db: &Database) -> Vec<Transfer> {
    db.read()
        .unwrap()
        .index::<Transfer>()
        .unwrap()
        .iter()
        .cloned()
        .collect()
}

pub fn find_account(db: &Database, name: &str) -> Option<Account> {
    db.read()
        .unwrap()
        .index::<Account>()
        .unwrap()
        .find_by("by_name", name)
        .unwrap()
        .cloned()
}
