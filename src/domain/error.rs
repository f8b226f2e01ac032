//! Domain error types.

/// Top-level error type for oitrader.
#[derive(Debug, thiserror::Error)]
pub enum OitraderError {
    #[error("validation error: {reason}")]
    Validation { reason: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    #[error("data quality error: {reason}")]
    DataQuality { reason: String },

    #[error("backtest exceeded time budget of {budget_secs}s")]
    Timeout { budget_secs: u64 },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OitraderError {
    pub fn validation(reason: impl Into<String>) -> Self {
        OitraderError::Validation {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, key: impl std::fmt::Display) -> Self {
        OitraderError::NotFound {
            entity: entity.into(),
            key: key.to_string(),
        }
    }

    pub fn data_quality(reason: impl Into<String>) -> Self {
        OitraderError::DataQuality {
            reason: reason.into(),
        }
    }
}

impl From<&OitraderError> for std::process::ExitCode {
    fn from(err: &OitraderError) -> Self {
        let code: u8 = match err {
            OitraderError::Io(_) => 1,
            OitraderError::ConfigParse { .. }
            | OitraderError::ConfigMissing { .. }
            | OitraderError::ConfigInvalid { .. } => 2,
            OitraderError::Database { .. } | OitraderError::DatabaseQuery { .. } => 3,
            OitraderError::Validation { .. } => 4,
            OitraderError::NotFound { .. } => 5,
            OitraderError::DataQuality { .. } => 6,
            OitraderError::Timeout { .. } => 7,
        };
        std::process::ExitCode::from(code)
    }
}
