//! Rollout failure kinds.

use shipyard_core::CoreError;
use shipyard_ecs::ControlPlaneError;
use thiserror::Error;

/// Why a service rollout stopped. None of these are retried or rolled back
/// automatically.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("service {service} not found in cluster {cluster}")]
    ServiceNotFound { cluster: String, service: String },

    #[error("container named {container} not found in task definition {revision}")]
    ContainerNotFound { container: String, revision: String },

    #[error("container named {container} is defined {count} times in task definition {revision}")]
    AmbiguousContainer {
        container: String,
        revision: String,
        count: usize,
    },

    #[error("failed to register new revision of {family}: {reason}")]
    RegistrationFailed { family: String, reason: String },

    #[error("rollout of service {service} in cluster {cluster} failed: {reason}")]
    RolloutFailed {
        cluster: String,
        service: String,
        reason: String,
    },

    #[error("missing required configuration: {0}")]
    ConfigurationMissing(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("control plane error for service {service}: {source}")]
    ControlPlane {
        service: String,
        #[source]
        source: ControlPlaneError,
    },
}

impl RolloutError {
    /// Stable name of the failure kind, for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RolloutError::ServiceNotFound { .. } => "ServiceNotFound",
            RolloutError::ContainerNotFound { .. } => "ContainerNotFound",
            RolloutError::AmbiguousContainer { .. } => "AmbiguousContainer",
            RolloutError::RegistrationFailed { .. } => "RegistrationFailed",
            RolloutError::RolloutFailed { .. } => "RolloutFailed",
            RolloutError::ConfigurationMissing(_) => "ConfigurationMissing",
            RolloutError::InvalidConfiguration(_) => "InvalidConfiguration",
            RolloutError::ControlPlane { .. } => "ControlPlane",
        }
    }
}

impl From<CoreError> for RolloutError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ContainerNotFound {
                container,
                revision,
            } => RolloutError::ContainerNotFound {
                container,
                revision,
            },
            CoreError::AmbiguousContainer {
                container,
                revision,
                count,
            } => RolloutError::AmbiguousContainer {
                container,
                revision,
                count,
            },
            CoreError::ConfigurationMissing(key) => RolloutError::ConfigurationMissing(key),
            other => RolloutError::InvalidConfiguration(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_kind() {
        let err = RolloutError::from(CoreError::ContainerNotFound {
            container: "backend".into(),
            revision: "arn:td/x:1".into(),
        });
        assert_eq!(err.kind(), "ContainerNotFound");

        let err = RolloutError::from(CoreError::ConfigurationMissing("cluster.name".into()));
        assert_eq!(err.kind(), "ConfigurationMissing");
        assert_eq!(err.to_string(), "missing required configuration: cluster.name");

        let err = RolloutError::from(CoreError::InvalidImage("empty tag".into()));
        assert_eq!(err.kind(), "InvalidConfiguration");
    }

    #[test]
    fn rollout_failed_names_service_and_cluster() {
        let err = RolloutError::RolloutFailed {
            cluster: "linksphere-cluster".into(),
            service: "backend-service".into(),
            reason: "service is DRAINING".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("backend-service"));
        assert!(msg.contains("linksphere-cluster"));
    }
}
