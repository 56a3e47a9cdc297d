use thiserror::Error;

/// Errors produced by type and schema validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid type name {name:?}: {reason}")]
    InvalidTypeName { name: String, reason: String },

    #[error("type id {0} is reserved")]
    ReservedTypeId(u16),

    #[error("key name {name:?} declared more than once on {type_name}")]
    DuplicateKeyName {
        type_name: &'static str,
        name: &'static str,
    },

    #[error("key name {name:?} on {type_name} collides with the identity key")]
    ReservedKeyName {
        type_name: &'static str,
        name: &'static str,
    },
}
