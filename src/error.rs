use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcadErrorCode {
    Io,
    Engine,
    Encode,
    Decode,
    InvalidConfig,
    ReadersExhausted,
    Forbidden,
    Validation,
}

impl AcadErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            AcadErrorCode::Io => "io",
            AcadErrorCode::Engine => "engine",
            AcadErrorCode::Encode => "encode",
            AcadErrorCode::Decode => "decode",
            AcadErrorCode::InvalidConfig => "invalid_config",
            AcadErrorCode::ReadersExhausted => "readers_exhausted",
            AcadErrorCode::Forbidden => "forbidden",
            AcadErrorCode::Validation => "validation",
        }
    }
}

/// Error taxonomy of the persistence substrate.
///
/// Engine-level failures (`Io`, `Engine`, `ReadersExhausted`) are fatal and
/// propagate without retry. Not-found is never an error: lookups return
/// `Ok(None)` and deletes return `Ok(false)`. `Forbidden` and `Validation`
/// are the typed failure shapes callers render inline.
#[derive(Debug, Error)]
pub enum AcadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage engine error: {0}")]
    Engine(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("reader budget exhausted ({budget} slots)")]
    ReadersExhausted { budget: usize },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("validation error: {0}")]
    Validation(String),
}

impl AcadError {
    pub fn code(&self) -> AcadErrorCode {
        match self {
            AcadError::Io(_) => AcadErrorCode::Io,
            AcadError::Engine(_) => AcadErrorCode::Engine,
            AcadError::Encode(_) => AcadErrorCode::Encode,
            AcadError::Decode(_) => AcadErrorCode::Decode,
            AcadError::InvalidConfig { .. } => AcadErrorCode::InvalidConfig,
            AcadError::ReadersExhausted { .. } => AcadErrorCode::ReadersExhausted,
            AcadError::Forbidden(_) => AcadErrorCode::Forbidden,
            AcadError::Validation(_) => AcadErrorCode::Validation,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

impl From<redb::DatabaseError> for AcadError {
    fn from(e: redb::DatabaseError) -> Self {
        AcadError::Engine(e.to_string())
    }
}

impl From<redb::TransactionError> for AcadError {
    fn from(e: redb::TransactionError) -> Self {
        AcadError::Engine(e.to_string())
    }
}

impl From<redb::TableError> for AcadError {
    fn from(e: redb::TableError) -> Self {
        AcadError::Engine(e.to_string())
    }
}

impl From<redb::StorageError> for AcadError {
    fn from(e: redb::StorageError) -> Self {
        AcadError::Engine(e.to_string())
    }
}

impl From<redb::CommitError> for AcadError {
    fn from(e: redb::CommitError) -> Self {
        AcadError::Engine(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{AcadError, AcadErrorCode};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(AcadErrorCode::Engine.as_str(), "engine");
        assert_eq!(
            AcadErrorCode::ReadersExhausted.as_str(),
            "readers_exhausted"
        );
        assert_eq!(AcadErrorCode::Forbidden.as_str(), "forbidden");
    }

    #[test]
    fn error_code_str_matches_variant_mapping() {
        let err = AcadError::Validation("course belongs to another academy".into());
        assert_eq!(err.code(), AcadErrorCode::Validation);
        assert_eq!(err.code_str(), "validation");
    }
}
