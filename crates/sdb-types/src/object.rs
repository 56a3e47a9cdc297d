use std::collections::HashSet;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::TypeError;
use crate::id::Id;
use crate::key::IndexKey;

/// Name of the implicit, always-present unique index on identity.
pub const BY_ID: &str = "by_id";

/// Maximum length (in bytes) of a registered type name.
pub const MAX_TYPE_NAME_LEN: usize = 40;

/// Type ids at or above this value are reserved for the engine.
pub const RESERVED_TYPE_ID_START: u16 = 0xff00;

/// Declaration of one secondary key on an object type.
///
/// A key is a named projection of the object into an [`IndexKey`], either
/// unique (no two live objects may project to the same key) or non-unique
/// (ties are ordered by identity).
pub struct KeyDef<T> {
    name: &'static str,
    unique: bool,
    extract: fn(&T) -> IndexKey,
}

impl<T> KeyDef<T> {
    /// Declare a unique key.
    pub const fn unique(name: &'static str, extract: fn(&T) -> IndexKey) -> Self {
        Self {
            name,
            unique: true,
            extract,
        }
    }

    /// Declare a non-unique key.
    pub const fn non_unique(name: &'static str, extract: fn(&T) -> IndexKey) -> Self {
        Self {
            name,
            unique: false,
            extract,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Project an object onto this key.
    pub fn key_of(&self, object: &T) -> IndexKey {
        (self.extract)(object)
    }
}

impl<T> Clone for KeyDef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for KeyDef<T> {}

impl<T> fmt::Debug for KeyDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDef")
            .field("name", &self.name)
            .field("unique", &self.unique)
            .finish()
    }
}

/// Contract every stored object type follows.
///
/// Objects are plain Rust values. Their complete encoded form, variable
/// length members included, is what the backing region stores, so every
/// field must be serializable. The identity field is assigned by the owning
/// index at creation time and must never change afterwards.
pub trait Object: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable numeric type identifier, recorded in the region's type table.
    const TYPE_ID: u16;

    /// Stable type name, recorded next to the type id and checked on reopen.
    const TYPE_NAME: &'static str;

    /// The object's identity.
    fn id(&self) -> Id<Self>;

    /// Secondary keys declared on this type. The identity key is implicit.
    fn keys() -> Vec<KeyDef<Self>> {
        Vec::new()
    }
}

/// Static description of a registered object type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub type_id: u16,
    pub name: &'static str,
}

impl TypeDescriptor {
    /// Describe an object type.
    pub fn of<T: Object>() -> Self {
        Self {
            type_id: T::TYPE_ID,
            name: T::TYPE_NAME,
        }
    }

    /// Validate the type id and name, and the key declarations of `T`.
    pub fn validate<T: Object>() -> Result<Self, TypeError> {
        let desc = Self::of::<T>();
        validate_type_name(desc.name)?;
        if desc.type_id >= RESERVED_TYPE_ID_START {
            return Err(TypeError::ReservedTypeId(desc.type_id));
        }

        let mut seen = HashSet::new();
        for key in T::keys() {
            if key.name() == BY_ID {
                return Err(TypeError::ReservedKeyName {
                    type_name: desc.name,
                    name: key.name(),
                });
            }
            if !seen.insert(key.name()) {
                return Err(TypeError::DuplicateKeyName {
                    type_name: desc.name,
                    name: key.name(),
                });
            }
        }
        Ok(desc)
    }
}

/// Check that a type name fits in the region type table.
pub fn validate_type_name(name: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidTypeName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.len() > MAX_TYPE_NAME_LEN {
        return Err(invalid("too long"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == ':')
    {
        return Err(invalid("only ASCII alphanumerics, '_', '.' and ':' are allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Account {
        id: Id<Account>,
        name: String,
        balance: u64,
    }

    impl Object for Account {
        const TYPE_ID: u16 = 1;
        const TYPE_NAME: &'static str = "account";

        fn id(&self) -> Id<Self> {
            self.id
        }

        fn keys() -> Vec<KeyDef<Self>> {
            vec![
                KeyDef::unique("by_name", |a: &Account| IndexKey::from(a.name.as_str())),
                KeyDef::non_unique("by_balance", |a: &Account| IndexKey::from(a.balance)),
            ]
        }
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Clashing {
        id: Id<Clashing>,
    }

    impl Object for Clashing {
        const TYPE_ID: u16 = 2;
        const TYPE_NAME: &'static str = "clashing";

        fn id(&self) -> Id<Self> {
            self.id
        }

        fn keys() -> Vec<KeyDef<Self>> {
            vec![
                KeyDef::unique("by_x", |c: &Clashing| IndexKey::from(c.id)),
                KeyDef::non_unique("by_x", |c: &Clashing| IndexKey::from(c.id)),
            ]
        }
    }

    #[test]
    fn key_def_projects_objects() {
        let account = Account {
            id: Id::new(0),
            name: "alice".into(),
            balance: 10,
        };
        let keys = Account::keys();
        assert!(keys[0].is_unique());
        assert!(!keys[1].is_unique());
        assert_eq!(keys[0].key_of(&account), IndexKey::from("alice"));
        assert_eq!(keys[1].key_of(&account), IndexKey::from(10u64));
    }

    #[test]
    fn descriptor_validates() {
        let desc = TypeDescriptor::validate::<Account>().unwrap();
        assert_eq!(desc.type_id, 1);
        assert_eq!(desc.name, "account");
    }

    #[test]
    fn duplicate_key_names_rejected() {
        let err = TypeDescriptor::validate::<Clashing>().unwrap_err();
        assert_eq!(
            err,
            TypeError::DuplicateKeyName {
                type_name: "clashing",
                name: "by_x"
            }
        );
    }

    #[test]
    fn type_name_rules() {
        assert!(validate_type_name("ledger::account").is_ok());
        assert!(validate_type_name("").is_err());
        assert!(validate_type_name("has space").is_err());
        assert!(validate_type_name(&"x".repeat(MAX_TYPE_NAME_LEN + 1)).is_err());
    }
}
