//! Domain types for services and the task definitions bound to them.
//!
//! Field names follow the orchestrator's JSON shape (camelCase) so that a
//! described task definition deserializes directly into a
//! [`DeploymentDescriptor`]. Read-only fields the orchestrator adds on
//! describe (status, revision number, registeredAt, ...) are not modelled
//! and are dropped on deserialization.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::image::ImageReference;

// ── Service ───────────────────────────────────────────────────────

/// Identifies one orchestrated service within a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceRef {
    pub cluster: String,
    pub service: String,
}

impl ServiceRef {
    pub fn new(cluster: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster, self.service)
    }
}

/// Which half of the application a service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    Backend,
    Frontend,
}

impl ServiceRole {
    /// Repository each role's image is pushed to under the registry root.
    pub fn default_repository(self) -> &'static str {
        match self {
            ServiceRole::Backend => "linksphere-backend",
            ServiceRole::Frontend => "linksphere-frontend",
        }
    }

    /// Name of the container to patch inside the role's task definition.
    pub fn default_container(self) -> &'static str {
        match self {
            ServiceRole::Backend => "backend",
            ServiceRole::Frontend => "frontend",
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceRole::Backend => f.write_str("backend"),
            ServiceRole::Frontend => f.write_str("frontend"),
        }
    }
}

/// One service to roll out: where it lives, which container to patch, and
/// the image to point it at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTarget {
    pub role: ServiceRole,
    pub service: ServiceRef,
    pub container: String,
    pub image: ImageReference,
}

// ── Revision ──────────────────────────────────────────────────────

/// Opaque identifier of one registered task definition revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RevisionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RevisionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Descriptor ────────────────────────────────────────────────────

/// One container's configuration inside a task definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Every other container field, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A task definition: the versioned spec bound to a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDescriptor {
    pub family: String,
    /// Set on described revisions; absent on a freshly patched copy that has
    /// not been registered yet.
    #[serde(
        rename = "taskDefinitionArn",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub revision: Option<RevisionId>,
    #[serde(rename = "containerDefinitions")]
    pub containers: Vec<ContainerSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement_constraints: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_compatibilities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_platform: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_storage: Option<Value>,
}

impl DeploymentDescriptor {
    /// Look up a container by name.
    pub fn container(&self, name: &str) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| c.name == name)
    }

    /// Revision id for messages, or the family name when unregistered.
    pub fn revision_label(&self) -> String {
        match &self.revision {
            Some(rev) => rev.to_string(),
            None => format!("{} (unregistered)", self.family),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn described_task_definition_drops_read_only_fields() {
        let json = serde_json::json!({
            "taskDefinitionArn": "arn:aws:ecs:us-east-1:1:task-definition/linksphere:7",
            "family": "linksphere",
            "revision": 7,
            "status": "ACTIVE",
            "registeredAt": 1700000000.0,
            "containerDefinitions": [
                { "name": "backend", "image": "registry/old:1", "essential": true }
            ],
            "cpu": "256",
            "memory": "512"
        });

        let td: DeploymentDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(td.family, "linksphere");
        assert_eq!(
            td.revision.as_ref().map(RevisionId::as_str),
            Some("arn:aws:ecs:us-east-1:1:task-definition/linksphere:7")
        );
        assert_eq!(td.cpu.as_deref(), Some("256"));
        assert!(td.network_mode.is_none());

        let back = serde_json::to_value(&td).unwrap();
        assert!(back.get("status").is_none());
        assert!(back.get("registeredAt").is_none());
    }

    #[test]
    fn container_keeps_unknown_fields() {
        let json = serde_json::json!({
            "name": "backend",
            "image": "registry/old:1",
            "portMappings": [{ "containerPort": 8080 }],
            "environment": [{ "name": "PORT", "value": "8080" }]
        });

        let spec: ContainerSpec = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(spec.extra.len(), 2);
        assert_eq!(serde_json::to_value(&spec).unwrap(), json);
    }

    #[test]
    fn service_ref_display() {
        let svc = ServiceRef::new("linksphere-cluster", "backend-service");
        assert_eq!(svc.to_string(), "linksphere-cluster/backend-service");
    }

    #[test]
    fn role_defaults() {
        assert_eq!(ServiceRole::Backend.default_repository(), "linksphere-backend");
        assert_eq!(ServiceRole::Frontend.default_container(), "frontend");
    }
}
