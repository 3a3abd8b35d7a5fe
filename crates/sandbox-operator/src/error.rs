//! Error types for the sandbox operator

use thiserror::Error;

/// Errors that can occur while reconciling a User
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Object creation lost a race with another writer
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    /// Owner reference could not be built from the owner object
    #[error("Cannot build owner reference: {0}")]
    OwnerReference(String),

    /// Dependent object is already controlled by a different owner
    #[error("{kind} '{name}' is already controlled by {owner}")]
    AlreadyOwned {
        kind: String,
        name: String,
        owner: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// Check if this error can clear up without human intervention
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            OperatorError::InvalidConfig(_) | OperatorError::AlreadyOwned { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> OperatorError {
        OperatorError::KubeError(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "InternalError".to_string(),
            code,
        }))
    }

    #[test]
    fn test_error_display() {
        let err = OperatorError::AlreadyExists {
            kind: "Namespace".to_string(),
            name: "alice-sbx".to_string(),
        };
        assert_eq!(err.to_string(), "Namespace 'alice-sbx' already exists");

        let err = OperatorError::AlreadyOwned {
            kind: "Namespace".to_string(),
            name: "alice-sbx".to_string(),
            owner: "User/bob".to_string(),
        };
        assert!(err.to_string().contains("User/bob"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(api_error(500).is_retryable());
        assert!(OperatorError::Timeout("get".to_string()).is_retryable());
        assert!(OperatorError::AlreadyExists {
            kind: "Namespace".to_string(),
            name: "x".to_string(),
        }
        .is_retryable());

        assert!(!OperatorError::InvalidConfig("test".to_string()).is_retryable());
        assert!(!OperatorError::AlreadyOwned {
            kind: "Namespace".to_string(),
            name: "x".to_string(),
            owner: "User/y".to_string(),
        }
        .is_retryable());
    }
}
