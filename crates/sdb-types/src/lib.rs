//! Foundation types for the state database (SDB).
//!
//! Every other SDB crate depends on `sdb-types`. It defines what a stored
//! object is, independent of where it is stored:
//!
//! - [`Id`]: per-type, monotonically assigned object identity
//! - [`IndexKey`] / [`KeyPart`]: totally ordered, type-erased key values
//! - [`Object`]: the contract an object type implements to be stored
//! - [`KeyDef`]: a secondary key declaration (unique or non-unique)
//! - [`TypeDescriptor`]: the (type id, type name) pair kept in the region

pub mod error;
pub mod id;
pub mod key;
pub mod object;

pub use error::TypeError;
pub use id::Id;
pub use key::{IndexKey, KeyPart};
pub use object::{
    validate_type_name, KeyDef, Object, TypeDescriptor, BY_ID, MAX_TYPE_NAME_LEN,
    RESERVED_TYPE_ID_START,
};
