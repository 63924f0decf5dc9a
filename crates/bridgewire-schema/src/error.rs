/// Errors raised by the message schema registry.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The schema file could not be loaded.
    #[error("failed to load schema: {0}")]
    LoadFailed(String),

    /// The schema could not be compiled.
    #[error("failed to compile schema: {0}")]
    CompileFailed(String),

    /// The payload failed schema validation.
    #[error("validation failed for type {type_name}: {message}")]
    ValidationFailed { type_name: String, message: String },

    /// The schema text is not valid JSON.
    #[error("schema is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A record could not be converted to or from its generic payload.
    #[error("cannot convert payload of type {type_name}: {message}")]
    Conversion { type_name: String, message: String },

    /// The payload's declared type differs from the requested record type.
    #[error("type mismatch: expected {expected}, got {found}")]
    TypeMismatch { expected: String, found: String },

    /// No schema registered for the given type name.
    #[error("no schema registered for type {0}")]
    NoSchema(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
