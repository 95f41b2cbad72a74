//! Schema compilation errors.

use fwupd_errors::FwupdError;

/// Errors returned by [`crate::StructSchema::compile`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The text contains no tokens at all
    #[error("schema is empty")]
    Empty,

    /// The struct name uses the reserved prefix
    #[error("struct name {0} must not start with {prefix}", prefix = crate::RESERVED_PREFIX)]
    ReservedPrefix(String),

    /// The struct declares no fields
    #[error("struct {0} has no fields")]
    NoFields(String),

    /// A field token has the wrong number of parts
    #[error("invalid field definition '{0}'")]
    InvalidToken(String),

    /// A field id is empty
    #[error("field id is empty in '{0}'")]
    EmptyId(String),

    /// A field id is declared twice
    #[error("field id {0} is duplicated")]
    DuplicateId(String),

    /// A field type is not recognized
    #[error("field {id} has unknown type '{ty}'")]
    UnknownType {
        /// Field id
        id: String,
        /// Type text as written
        ty: String,
    },

    /// The default could not be resolved for this field
    #[error("field {id} has invalid default '{value}': {reason}")]
    InvalidDefault {
        /// Field id
        id: String,
        /// Default text as written
        value: String,
        /// Why resolution failed
        reason: String,
    },

    /// The fourth part of a field is not the constant marker
    #[error("field {id} has unknown marker '{marker}'")]
    InvalidMarker {
        /// Field id
        id: String,
        /// Marker text as written
        marker: String,
    },

    /// A constant field has no value to verify against
    #[error("constant field {0} has no default")]
    ConstantWithoutDefault(String),

    /// The struct does not fit in memory
    #[error("struct {0} is too large")]
    TooLarge(String),
}

impl From<SchemaError> for FwupdError {
    fn from(e: SchemaError) -> Self {
        FwupdError::invalid_data(e.to_string())
    }
}
