//! Failures while opening or tearing down infrastructure handles.

use thiserror::Error;

use crate::cache::StoreError;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("database unreachable")]
    Database(#[from] sqlx::Error),
    #[error("cache store unreachable")]
    Cache(#[from] StoreError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl InfraError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
