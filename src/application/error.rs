use std::error::Error as StdError;

use thiserror::Error;

use crate::{application::listing::ListingError, infra::error::InfraError};

/// Flattened error chain, outermost message first.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn from_message(source: &'static str, message: impl Into<String>) -> Self {
        Self {
            source,
            messages: vec![message.into()],
        }
    }

    pub fn chain(&self) -> String {
        self.messages.join(": ")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Listing(#[from] ListingError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Validation(_) => 2,
            AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::Infra(InfraError::Database(_))
            | AppError::Infra(InfraError::Cache(_))
            | AppError::Listing(_) => 69,
            AppError::Infra(InfraError::Telemetry(_)) | AppError::Unexpected(_) => 1,
        }
    }

    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Request could not be processed",
            AppError::Listing(_) | AppError::Infra(InfraError::Database(_)) => {
                "Content storage temporarily unavailable"
            }
            AppError::Infra(InfraError::Cache(_)) => "Cache store could not be reached",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}
