use super::types::FleetError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl FleetError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Retryable errors
            FleetError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                retryable: true,
            },
            FleetError::Persistence(_) => ErrorClassification {
                error_type: "PersistenceError",
                retryable: true,
            },
            FleetError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: true,
            },

            // Non-retryable errors
            FleetError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                retryable: false,
            },
            FleetError::Validation(_) => ErrorClassification {
                error_type: "ValidationError",
                retryable: false,
            },
            FleetError::Spawn(_) => ErrorClassification {
                error_type: "SpawnError",
                retryable: false,
            },
            FleetError::PortsExhausted(_) => ErrorClassification {
                error_type: "PortsExhaustedError",
                retryable: false,
            },
            FleetError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
            },
            FleetError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
            },
            FleetError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                retryable: false,
            },
        }
    }
}
