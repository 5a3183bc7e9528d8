use thiserror::Error;

use crate::{
    application::pipeline::PipelineState,
    cache::StoreError,
    config::LoadError,
    domain::{error::DomainError, events::StreamError, key::StageKind},
    infra::error::InfraError,
};

/// Failures of a single pipeline request. Nothing here is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot {operation} while pipeline is {state}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },
    #[error("pipeline has no {0}")]
    Incomplete(StageKind),
    #[error("no {kind} registered for role `{role}`")]
    UnknownComponent { kind: StageKind, role: String },
    #[error("no cache store registered for role `{role}`")]
    UnknownCacheRole { role: String },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("{kind} `{role}` rejected its setup: {source}")]
    Setup {
        kind: StageKind,
        role: String,
        #[source]
        source: DomainError,
    },
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("pipeline output failed: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn invalid_state(operation: &'static str, state: PipelineState) -> Self {
        Self::InvalidState { operation, state }
    }

    pub fn unknown_component(kind: StageKind, role: impl Into<String>) -> Self {
        Self::UnknownComponent {
            kind,
            role: role.into(),
        }
    }

    pub fn unknown_cache_role(role: impl Into<String>) -> Self {
        Self::UnknownCacheRole { role: role.into() }
    }

    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
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

    /// Process exit code for the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Validation(_)
            | AppError::Config(_)
            | AppError::Pipeline(PipelineError::UnknownComponent { .. })
            | AppError::Pipeline(PipelineError::UnknownCacheRole { .. })
            | AppError::Pipeline(PipelineError::InvalidParameter { .. })
            | AppError::Pipeline(PipelineError::Setup { .. }) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_errors_keep_their_source() {
        let err = PipelineError::Setup {
            kind: StageKind::Generator,
            role: "file".into(),
            source: DomainError::validation("`src` is required"),
        };
        assert_eq!(
            err.to_string(),
            "generator `file` rejected its setup: domain validation failed: `src` is required"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn configuration_problems_exit_with_usage_code() {
        let err = AppError::from(PipelineError::unknown_cache_role("nope"));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(AppError::unexpected("boom").exit_code(), 1);
    }
}
