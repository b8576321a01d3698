//! Error type shared by every field, container and struct operation.
//!
//! Configuration problems are reported when a [`Schema`](crate::schema::Schema) is built;
//! everything else surfaces from load/dump calls. Only two recovery paths exist in the
//! crate: [`Struct::partial_load`](crate::structure::Struct::partial_load) without an end
//! field swallows [`Error::UnexpectedEof`], and best-effort value resolution swallows the
//! errors for which [`Error::is_unresolved`] returns `true`.

use crate::value::Value;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    /// A field or struct was declared inconsistently.
    #[error("Configuration: {message}")]
    Configuration { message: String },

    #[error("Struct {schema} defines field {field:?} already defined in its parent")]
    FieldRedefined { schema: String, field: String },

    #[error("Struct {schema} can't inherit from more than one struct")]
    MultipleInheritance { schema: String },

    #[error("Missing required value for field: {field}")]
    MissingRequiredValue { field: String },

    #[error("Size of field {field:?} couldn't be determined")]
    UndefinedSize { field: String },

    #[error("Invalid value for {}: {reason}", field_label(.field))]
    Validation {
        field: Option<String>,
        value: Option<Value>,
        reason: String,
    },

    #[error("Unexpected EOF while trying to read {size} bytes at offset {offset} ({})", field_label(.field))]
    UnexpectedEof {
        field: Option<String>,
        size: usize,
        offset: u64,
    },

    #[error("Expected to consume {available} bytes, read {consumed}")]
    ExtraneousData { consumed: u64, available: u64 },

    /// Malformed input that is neither short nor invalid per a validator.
    #[error("Can't decode {} at offset {offset}: {reason}", field_label(.field))]
    Deserialization {
        field: Option<String>,
        offset: u64,
        reason: String,
    },

    /// A size or count refers to a field that hasn't been resolved yet.
    #[error("{}: field {reference:?} is not in the struct or hasn't been loaded yet", field_label(.field))]
    FieldReference {
        field: Option<String>,
        reference: String,
    },

    #[error("{}: expected {expected} elements, got {given}", field_label(.field))]
    ArraySize {
        field: Option<String>,
        expected: usize,
        given: usize,
    },

    #[error("{} can't serialize value: {reason}", field_label(.field))]
    UnserializableValue { field: Option<String>, reason: String },

    #[error("{}: value doesn't fit into {} bytes", field_label(.field), size_label(.size))]
    ValueSize {
        field: Option<String>,
        size: Option<usize>,
        value: Value,
    },

    #[error("Field {field:?} is const or computed and can't be assigned")]
    ImmutableField { field: String },

    #[error("{} unrecognized field(s) given to {schema}: {}", .names.len(), .names.join(", "))]
    UnexpectedValue { schema: String, names: Vec<String> },

    #[error("{schema} doesn't have a field named {field:?}")]
    NoSuchField { schema: String, field: String },
}

fn field_label(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("<unbound field>")
}

fn size_label(size: &Option<usize>) -> String {
    size.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string())
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn unserializable(field: Option<&str>, reason: impl Into<String>) -> Self {
        Error::UnserializableValue {
            field: field.map(str::to_string),
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(field: Option<&str>, value: &Value, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.map(str::to_string),
            value: Some(value.clone()),
            reason: reason.into(),
        }
    }

    /// Attach the failing field's name to errors raised below the field layer
    /// (scalar codecs, stream helpers) that don't know which field they serve.
    pub(crate) fn with_field(mut self, name: Option<&str>) -> Self {
        let Some(name) = name else { return self };
        match &mut self {
            Error::Validation { field, .. }
            | Error::UnexpectedEof { field, .. }
            | Error::Deserialization { field, .. }
            | Error::FieldReference { field, .. }
            | Error::ArraySize { field, .. }
            | Error::UnserializableValue { field, .. }
            | Error::ValueSize { field, .. } => {
                if field.is_none() {
                    *field = Some(name.to_string());
                }
            }
            _ => {}
        }
        self
    }

    /// Stream ran dry before a field was complete.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::UnexpectedEof { .. })
    }

    /// Errors meaning "this value can't be derived yet", ignored while resolving
    /// forward references before a dump.
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            Error::MissingRequiredValue { .. }
                | Error::UndefinedSize { .. }
                | Error::UnserializableValue { .. }
                | Error::ValueSize { .. }
                | Error::ArraySize { .. }
                | Error::UnexpectedValue { .. }
        )
    }

    /// Name of the field the error is about, when known.
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::FieldRedefined { field, .. }
            | Error::MissingRequiredValue { field }
            | Error::UndefinedSize { field }
            | Error::ImmutableField { field }
            | Error::NoSuchField { field, .. } => Some(field),
            Error::Validation { field, .. }
            | Error::UnexpectedEof { field, .. }
            | Error::Deserialization { field, .. }
            | Error::FieldReference { field, .. }
            | Error::ArraySize { field, .. }
            | Error::UnserializableValue { field, .. }
            | Error::ValueSize { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}
