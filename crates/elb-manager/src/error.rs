use crate::types::ListenerSpec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fault codes reported by the provider control API
pub mod codes {
    pub const LOAD_BALANCER_NOT_FOUND: &str = "LoadBalancerNotFound";
    pub const ACCESS_POINT_NOT_FOUND: &str = "AccessPointNotFound";
    pub const LISTENER_NOT_FOUND: &str = "ListenerNotFound";
    pub const DUPLICATE_LISTENER: &str = "DuplicateListener";
    pub const DUPLICATE_LOAD_BALANCER_NAME: &str = "DuplicateLoadBalancerName";
    pub const DUPLICATE_ACCESS_POINT_NAME: &str = "DuplicateAccessPointName";
    pub const INSTANCE_NOT_REGISTERED: &str = "InstanceNotRegistered";
    pub const INVALID_CONFIGURATION: &str = "InvalidConfigurationRequest";
    pub const TRANSPORT: &str = "TransportError";
}

/// Typed classification of a provider fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    LoadBalancerNotFound,
    ListenerNotFound,
    DuplicateListener,
    DuplicateLoadBalancerName,
    InstanceNotRegistered,
    Transport,
    Other,
}

/// Fault reported by the remote load balancer service, code and message preserved verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ServiceError {
    pub code: String,
    pub message: String,
}

impl ServiceError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Request never produced a provider answer (connect failure, timeout, 5xx)
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(codes::TRANSPORT, message)
    }

    pub fn load_balancer_not_found(name: &str) -> Self {
        Self::new(
            codes::LOAD_BALANCER_NOT_FOUND,
            format!("There is no load balancer named '{}'", name),
        )
    }

    /// Boundary classification of the provider's code
    pub fn kind(&self) -> FaultKind {
        match self.code.as_str() {
            codes::LOAD_BALANCER_NOT_FOUND | codes::ACCESS_POINT_NOT_FOUND => {
                FaultKind::LoadBalancerNotFound
            }
            codes::LISTENER_NOT_FOUND => FaultKind::ListenerNotFound,
            codes::DUPLICATE_LISTENER => FaultKind::DuplicateListener,
            codes::DUPLICATE_LOAD_BALANCER_NAME | codes::DUPLICATE_ACCESS_POINT_NAME => {
                FaultKind::DuplicateLoadBalancerName
            }
            codes::INSTANCE_NOT_REGISTERED => FaultKind::InstanceNotRegistered,
            codes::TRANSPORT => FaultKind::Transport,
            _ => FaultKind::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == FaultKind::LoadBalancerNotFound
    }
}

/// Errors returned by [`crate::LoadBalancerManager`]
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("failed to create load balancer '{name}': {source}")]
    Provision {
        name: String,
        #[source]
        source: ServiceError,
    },

    #[error("load balancer '{name}' ({dns_name}) was created but its health check could not be attached: {source}")]
    HealthCheck {
        name: String,
        dns_name: String,
        #[source]
        source: ServiceError,
    },

    #[error("load balancer '{name}' already has listener {existing}; refusing {requested}")]
    ListenerConflict {
        name: String,
        existing: ListenerSpec,
        requested: ListenerSpec,
    },

    #[error("load balancer '{name}' not found")]
    NotFound { name: String },

    #[error("remote service error: {0}")]
    Remote(#[from] ServiceError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ManagerError {
    /// Whether repeating the same call may succeed without changing its inputs
    pub fn is_retryable(&self) -> bool {
        match self {
            ManagerError::Remote(_) | ManagerError::HealthCheck { .. } => true,
            // Identical re-creation is accepted by the provider; a taken name is not
            ManagerError::Provision { source, .. } => {
                source.kind() != FaultKind::DuplicateLoadBalancerName
            }
            ManagerError::ListenerConflict { .. }
            | ManagerError::NotFound { .. }
            | ManagerError::InvalidRequest(_) => false,
        }
    }

    /// Provider fault behind this error, if one was reported
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            ManagerError::Provision { source, .. } | ManagerError::HealthCheck { source, .. } => {
                Some(source)
            }
            ManagerError::Remote(source) => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            ServiceError::new("AccessPointNotFound", "gone").kind(),
            FaultKind::LoadBalancerNotFound
        );
        assert_eq!(
            ServiceError::new("LoadBalancerNotFound", "gone").kind(),
            FaultKind::LoadBalancerNotFound
        );
        assert_eq!(
            ServiceError::new("DuplicateListener", "dup").kind(),
            FaultKind::DuplicateListener
        );
        assert_eq!(
            ServiceError::transport("connection reset").kind(),
            FaultKind::Transport
        );
        assert_eq!(
            ServiceError::new("Throttling", "slow down").kind(),
            FaultKind::Other
        );
    }

    #[test]
    fn test_error_preserves_provider_code() {
        let err = ManagerError::from(ServiceError::new("Throttling", "Rate exceeded"));
        assert!(err.is_retryable());
        assert_eq!(err.service_error().unwrap().code, "Throttling");
        assert!(err.to_string().contains("Rate exceeded"));
    }

    #[test]
    fn test_provision_retryable_unless_name_taken() {
        let provision = |source: ServiceError| ManagerError::Provision {
            name: "api-lb".to_string(),
            source,
        };

        assert!(provision(ServiceError::transport("CreateLoadBalancer timed out")).is_retryable());
        assert!(provision(ServiceError::new("Throttling", "Rate exceeded")).is_retryable());
        assert!(!provision(ServiceError::new(
            codes::DUPLICATE_LOAD_BALANCER_NAME,
            "name in use with a different configuration"
        ))
        .is_retryable());
    }

    #[test]
    fn test_conflict_not_retryable() {
        let err = ManagerError::ListenerConflict {
            name: "api-lb".to_string(),
            existing: ListenerSpec::tcp(6443).unwrap(),
            requested: ListenerSpec::new(6443, 8080, crate::types::Protocol::Tcp).unwrap(),
        };
        assert!(!err.is_retryable());
        assert!(err.service_error().is_none());
    }
}
