use thiserror::Error;

/// The five error kinds the engine emits (spec §7).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("input invalid: {0}")]
    InputInvalid(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("partial collection: {0}")]
    PartialCollection(String),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("zip error: {0}")]
    Zip(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
