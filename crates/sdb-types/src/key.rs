//! Type-erased, totally ordered index keys.
//!
//! Every secondary key an object type declares is projected into an
//! [`IndexKey`]: a short sequence of [`KeyPart`]s compared lexicographically.
//! Composite keys (for example `(owner, name)`) are built from tuples.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::Id;

/// One component of an index key.
///
/// Parts of different variants order by variant first; keys of one declared
/// index always use the same shape, so in practice only same-variant parts
/// are compared.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyPart {
    Bool(bool),
    U64(u64),
    I64(i64),
    Str(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Bool(v) => write!(f, "{v}"),
            KeyPart::U64(v) => write!(f, "{v}"),
            KeyPart::I64(v) => write!(f, "{v}"),
            KeyPart::Str(v) => write!(f, "{v:?}"),
            KeyPart::Bytes(v) => {
                write!(f, "0x")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A full index key: one or more parts, compared lexicographically.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexKey(Vec<KeyPart>);

impl IndexKey {
    /// Build a key from explicit parts.
    pub fn from_parts(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// The key's parts in order.
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Number of parts.
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if `self` starts with every part of `prefix`.
    pub fn starts_with(&self, prefix: &IndexKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            return write!(f, "{}", self.0[0]);
        }
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, ")")
    }
}

impl From<KeyPart> for IndexKey {
    fn from(part: KeyPart) -> Self {
        Self(vec![part])
    }
}

macro_rules! scalar_key {
    ($($ty:ty => |$v:ident| $part:expr),* $(,)?) => {
        $(
            impl From<$ty> for KeyPart {
                fn from($v: $ty) -> Self {
                    $part
                }
            }

            impl From<$ty> for IndexKey {
                fn from(v: $ty) -> Self {
                    IndexKey(vec![KeyPart::from(v)])
                }
            }
        )*
    };
}

scalar_key! {
    bool => |v| KeyPart::Bool(v),
    u8 => |v| KeyPart::U64(u64::from(v)),
    u16 => |v| KeyPart::U64(u64::from(v)),
    u32 => |v| KeyPart::U64(u64::from(v)),
    u64 => |v| KeyPart::U64(v),
    i32 => |v| KeyPart::I64(i64::from(v)),
    i64 => |v| KeyPart::I64(v),
    String => |v| KeyPart::Str(v),
    &str => |v| KeyPart::Str(v.to_string()),
    &String => |v| KeyPart::Str(v.clone()),
    Vec<u8> => |v| KeyPart::Bytes(v),
    &[u8] => |v| KeyPart::Bytes(v.to_vec()),
}

impl<T> From<Id<T>> for KeyPart {
    fn from(id: Id<T>) -> Self {
        KeyPart::U64(id.get())
    }
}

impl<T> From<Id<T>> for IndexKey {
    fn from(id: Id<T>) -> Self {
        IndexKey(vec![KeyPart::U64(id.get())])
    }
}

impl<A, B> From<(A, B)> for IndexKey
where
    A: Into<KeyPart>,
    B: Into<KeyPart>,
{
    fn from((a, b): (A, B)) -> Self {
        IndexKey(vec![a.into(), b.into()])
    }
}

impl<A, B, C> From<(A, B, C)> for IndexKey
where
    A: Into<KeyPart>,
    B: Into<KeyPart>,
    C: Into<KeyPart>,
{
    fn from((a, b, c): (A, B, C)) -> Self {
        IndexKey(vec![a.into(), b.into(), c.into()])
    }
}
