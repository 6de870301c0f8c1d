use thiserror::Error;

use crate::domain::capability::CapabilityKind;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("unknown calibration method `{0}` (expected temperature|isotonic|platt)")]
    UnknownMethod(String),
    #[error("{method} calibration needs at least two held-out samples with both outcomes")]
    InsufficientData { method: &'static str },
    #[error("calibration temperature must be finite and positive, got {0}")]
    InvalidTemperature(f64),
}

/// Failure reported by an external collaborator (generation, vector store,
/// similarity).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("collaborator `{service}` is unavailable: {message}")]
    Unavailable { service: String, message: String },
    #[error("collaborator `{service}` returned an invalid response: {message}")]
    InvalidResponse { service: String, message: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("capability `{capability}` failed: {message}")]
    Execution { capability: CapabilityKind, message: String },
    #[error("capability `{0}` has no registered handler")]
    NotRegistered(CapabilityKind),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no capability matched and no `general` capability is registered")]
    NoGeneralCapability,
}

/// Error taxonomy of one orchestrated query. Only the fatal variants ever
/// escape `run`; the rest are converted into fallbacks or degraded delivery.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum OrchestrationError {
    #[error("query text is empty")]
    EmptyQuery,
    #[error("capability `{capability}` failed to execute: {message}")]
    CapabilityExecution { capability: CapabilityKind, message: String },
    #[error("evidence retrieval is unavailable: {0}")]
    RetrievalUnavailable(String),
    #[error("generation did not finish within {timeout_ms}ms")]
    GenerationTimeout { timeout_ms: u64 },
    #[error("generation is unavailable: {0}")]
    GenerationUnavailable(String),
    #[error(transparent)]
    CalibrationConfig(#[from] CalibrationError),
}

impl OrchestrationError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EmptyQuery | Self::CalibrationConfig(_))
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::CapabilityExecution { .. } => "capability_execution",
            Self::RetrievalUnavailable(_) => "retrieval_unavailable",
            Self::GenerationTimeout { .. } => "generation_timeout",
            Self::GenerationUnavailable(_) => "generation_unavailable",
            Self::CalibrationConfig(_) => "calibration_config",
        }
    }
}

impl From<CapabilityError> for OrchestrationError {
    fn from(value: CapabilityError) -> Self {
        match value {
            CapabilityError::Execution { capability, message } => {
                Self::CapabilityExecution { capability, message }
            }
            CapabilityError::NotRegistered(capability) => Self::CapabilityExecution {
                capability,
                message: "no handler registered".to_owned(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::capability::CapabilityKind;
    use crate::errors::{CalibrationError, CapabilityError, OrchestrationError};

    #[test]
    fn only_empty_query_and_calibration_config_are_fatal() {
        assert!(OrchestrationError::EmptyQuery.is_fatal());
        assert!(OrchestrationError::from(CalibrationError::UnknownMethod("beta".to_owned()))
            .is_fatal());

        let recoverable = [
            OrchestrationError::CapabilityExecution {
                capability: CapabilityKind::Code,
                message: "sandbox crashed".to_owned(),
            },
            OrchestrationError::RetrievalUnavailable("index offline".to_owned()),
            OrchestrationError::GenerationTimeout { timeout_ms: 500 },
            OrchestrationError::GenerationUnavailable("model offline".to_owned()),
        ];
        assert!(recoverable.iter().all(|error| !error.is_fatal()));
    }

    #[test]
    fn capability_errors_map_to_capability_execution() {
        let mapped = OrchestrationError::from(CapabilityError::Execution {
            capability: CapabilityKind::Code,
            message: "boom".to_owned(),
        });
        assert_eq!(mapped.error_class(), "capability_execution");
        assert_eq!(mapped.to_string(), "capability `code` failed to execute: boom");
    }
}
