//! Error types for bridge coordination

use thiserror::Error;

use crate::types::{BridgeId, Endpoint, LegId};

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failures reported by the signaling gateway
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Leg not found: {leg_id}")]
    LegNotFound { leg_id: LegId },

    #[error("Bridge not found: {bridge_id}")]
    BridgeNotFound { bridge_id: BridgeId },

    #[error("Bridge already exists: {bridge_id}")]
    BridgeExists { bridge_id: BridgeId },

    #[error("Endpoint not found: {endpoint}")]
    EndpointNotFound { endpoint: Endpoint },

    #[error("Gateway connection is closed")]
    Closed,

    #[error("Gateway operation {operation} failed: {message}")]
    Operation { operation: String, message: String },
}

impl GatewayError {
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by dial / join / list
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A target endpoint is not online
    #[error("Cannot dial endpoint {extension}. Please try again.")]
    EndpointUnreachable { extension: String },

    /// The registry holds no bridges at all
    #[error("There are no ongoing calls at the moment.")]
    NoOngoingCalls,

    /// The requested bridge is not registered
    #[error("There are no calls matching the entered call ID.")]
    NoMatchingCall { call_id: String },

    /// Malformed request
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A gateway operation failed while legs or bridges were being set up
    #[error("Setup failed during {operation}: {source}")]
    Setup {
        operation: String,
        #[source]
        source: GatewayError,
    },

    /// A gateway operation failed while resolving bridge membership
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

impl BridgeError {
    pub fn unreachable(extension: impl Into<String>) -> Self {
        Self::EndpointUnreachable {
            extension: extension.into(),
        }
    }

    pub fn no_matching_call(call_id: impl Into<String>) -> Self {
        Self::NoMatchingCall {
            call_id: call_id.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn setup(operation: impl Into<String>, source: GatewayError) -> Self {
        Self::Setup {
            operation: operation.into(),
            source,
        }
    }

    /// Reported to the interactive user; the process keeps running.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::EndpointUnreachable { .. }
                | Self::NoOngoingCalls
                | Self::NoMatchingCall { .. }
                | Self::InvalidInput { .. }
        )
    }

    /// The process must stop: partially created legs and bridges are not rolled back.
    pub fn is_fatal(&self) -> bool {
        !self.is_user_facing()
    }
}

/// Extension for attaching setup context to gateway results
pub(crate) trait SetupContext<T> {
    fn during(self, operation: &str) -> Result<T>;
}

impl<T> SetupContext<T> for std::result::Result<T, GatewayError> {
    fn during(self, operation: &str) -> Result<T> {
        self.map_err(|e| BridgeError::setup(operation, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_classification() {
        assert!(BridgeError::NoOngoingCalls.is_user_facing());
        assert!(BridgeError::no_matching_call("ABCD").is_user_facing());
        assert!(BridgeError::unreachable("1001").is_user_facing());
        assert!(BridgeError::invalid_input("dial needs two targets").is_user_facing());

        let setup = BridgeError::setup("create bridge", GatewayError::Closed);
        assert!(setup.is_fatal());
        assert!(BridgeError::from(GatewayError::Closed).is_fatal());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            BridgeError::unreachable("1001").to_string(),
            "Cannot dial endpoint 1001. Please try again."
        );
        assert_eq!(
            BridgeError::no_matching_call("ZZZZ").to_string(),
            "There are no calls matching the entered call ID."
        );
    }

    #[test]
    fn test_setup_context() {
        let res: std::result::Result<(), GatewayError> =
            Err(GatewayError::operation("dial", "timeout"));
        let err = res.during("dial leg").unwrap_err();
        assert!(matches!(err, BridgeError::Setup { ref operation, .. } if operation == "dial leg"));
    }
}
