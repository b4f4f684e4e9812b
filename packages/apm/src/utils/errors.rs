// packages/apm/src/utils/errors.rs
//! Error types for the APM agent

use thiserror::Error;

/// Result alias used across the agent
pub type Result<T> = std::result::Result<T, ApmError>;

/// Agent errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApmError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Patch target {module}.{attribute} does not exist")]
    PatchTargetMissing { module: String, attribute: String },

    #[error("Patch target {module}.{attribute} has a different signature")]
    SignatureMismatch { module: String, attribute: String },

    #[error("Interceptor for {0} is not enabled")]
    NotEnabled(String),

    #[error("Optional dependency not installed: {0}")]
    MissingDependency(String),

    #[error("Malformed plugin: {0}")]
    MalformedPlugin(String),

    #[error("Interception failed: {0}")]
    InterceptionFailed(String),
}

impl ApmError {
    pub fn target_missing(module: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::PatchTargetMissing {
            module: module.into(),
            attribute: attribute.into(),
        }
    }

    pub fn signature_mismatch(module: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::SignatureMismatch {
            module: module.into(),
            attribute: attribute.into(),
        }
    }
}

impl From<config::ConfigError> for ApmError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}
