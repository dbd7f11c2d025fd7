//! ECS JSON 1.1 request and response bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shipyard_core::{ContainerSpec, DeploymentDescriptor, RevisionId};

use crate::plane::{DeploymentStatus, ServiceStatus};

pub(crate) const TARGET_PREFIX: &str = "AmazonEC2ContainerServiceV20141113";

// ── DescribeServices ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DescribeServicesRequest<'a> {
    pub cluster: &'a str,
    pub services: [&'a str; 1],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DescribeServicesResponse {
    #[serde(default)]
    pub services: Vec<WireService>,
    #[serde(default)]
    pub failures: Vec<WireFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireService {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub task_definition: Option<String>,
    #[serde(default)]
    pub desired_count: i64,
    #[serde(default)]
    pub running_count: i64,
    #[serde(default)]
    pub deployments: Vec<WireDeployment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireDeployment {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub task_definition: Option<String>,
    #[serde(default)]
    pub desired_count: i64,
    #[serde(default)]
    pub running_count: i64,
    #[serde(default)]
    pub rollout_state: Option<String>,
    #[serde(default)]
    pub rollout_state_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireFailure {
    #[serde(default)]
    pub reason: Option<String>,
}

impl DescribeServicesResponse {
    /// The service's status, or `None` if it is reported MISSING.
    pub fn into_status(self) -> Option<ServiceStatus> {
        let missing = self
            .failures
            .iter()
            .any(|f| f.reason.as_deref() == Some("MISSING"));
        if missing {
            return None;
        }
        self.services.into_iter().next().map(ServiceStatus::from)
    }
}

impl From<WireService> for ServiceStatus {
    fn from(s: WireService) -> Self {
        Self {
            status: s.status.unwrap_or_default(),
            revision: s.task_definition.map(RevisionId::from),
            desired_count: s.desired_count,
            running_count: s.running_count,
            deployments: s
                .deployments
                .into_iter()
                .map(|d| DeploymentStatus {
                    status: d.status.unwrap_or_default(),
                    revision: d.task_definition.map(RevisionId::from),
                    desired_count: d.desired_count,
                    running_count: d.running_count,
                    rollout_state: d.rollout_state,
                    rollout_state_reason: d.rollout_state_reason,
                })
                .collect(),
        }
    }
}

// ── DescribeTaskDefinition ────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DescribeTaskDefinitionRequest<'a> {
    pub task_definition: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DescribeTaskDefinitionResponse {
    pub task_definition: DeploymentDescriptor,
}

// ── RegisterTaskDefinition ────────────────────────────────────────

/// Registration payload. Unset fields are left out of the JSON entirely;
/// the API rejects explicit nulls for some of them.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterTaskDefinitionRequest<'a> {
    pub family: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_role_arn: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_role_arn: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<&'a str>,
    pub container_definitions: &'a [ContainerSpec],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_constraints: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_compatibilities: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_platform: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ephemeral_storage: Option<&'a Value>,
}

impl<'a> From<&'a DeploymentDescriptor> for RegisterTaskDefinitionRequest<'a> {
    fn from(td: &'a DeploymentDescriptor) -> Self {
        Self {
            family: &td.family,
            task_role_arn: td.task_role_arn.as_deref(),
            execution_role_arn: td.execution_role_arn.as_deref(),
            network_mode: td.network_mode.as_deref(),
            container_definitions: &td.containers,
            volumes: td.volumes.as_deref(),
            placement_constraints: td.placement_constraints.as_deref(),
            requires_compatibilities: td.requires_compatibilities.as_deref(),
            cpu: td.cpu.as_deref(),
            memory: td.memory.as_deref(),
            runtime_platform: td.runtime_platform.as_ref(),
            ephemeral_storage: td.ephemeral_storage.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterTaskDefinitionResponse {
    pub task_definition: RegisteredTaskDefinition,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisteredTaskDefinition {
    pub task_definition_arn: String,
}

// ── UpdateService ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateServiceRequest<'a> {
    pub cluster: &'a str,
    pub service: &'a str,
    pub task_definition: &'a str,
    pub force_new_deployment: bool,
}

// ── Errors ────────────────────────────────────────────────────────

/// Error body, e.g.
/// `{"__type":"com.amazonaws.ecs#ServiceNotFoundException","message":"..."}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(rename = "__type", default)]
    pub kind: Option<String>,
    #[serde(alias = "Message", default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Short exception name with any namespace prefix removed.
    pub fn code(&self) -> String {
        self.kind
            .as_deref()
            .map(|k| k.rsplit('#').next().unwrap_or(k))
            .filter(|k| !k.is_empty())
            .unwrap_or("UnknownError")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_omits_unset_fields() {
        let td: DeploymentDescriptor = serde_json::from_value(serde_json::json!({
            "taskDefinitionArn": "arn:td/linksphere:3",
            "family": "linksphere",
            "containerDefinitions": [{ "name": "backend", "image": "img:1" }],
            "cpu": "256"
        }))
        .unwrap();

        let body = serde_json::to_value(RegisterTaskDefinitionRequest::from(&td)).unwrap();
        let keys: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 3, "unexpected keys: {keys:?}");
        assert_eq!(body["family"], "linksphere");
        assert_eq!(body["cpu"], "256");
        assert_eq!(body["containerDefinitions"][0]["image"], "img:1");
        assert!(body.get("taskDefinitionArn").is_none());
        assert!(body.get("memory").is_none());
    }

    #[test]
    fn register_request_keeps_empty_lists() {
        let td: DeploymentDescriptor = serde_json::from_value(serde_json::json!({
            "family": "linksphere",
            "containerDefinitions": [],
            "volumes": [],
            "requiresCompatibilities": ["FARGATE"]
        }))
        .unwrap();

        let body = serde_json::to_value(RegisterTaskDefinitionRequest::from(&td)).unwrap();
        assert_eq!(body["volumes"], serde_json::json!([]));
        assert_eq!(body["requiresCompatibilities"], serde_json::json!(["FARGATE"]));
    }

    #[test]
    fn missing_failure_maps_to_none() {
        let resp: DescribeServicesResponse = serde_json::from_value(serde_json::json!({
            "services": [],
            "failures": [{ "arn": "arn:svc/backend", "reason": "MISSING" }]
        }))
        .unwrap();
        assert!(resp.into_status().is_none());
    }

    #[test]
    fn service_status_from_wire() {
        let resp: DescribeServicesResponse = serde_json::from_value(serde_json::json!({
            "services": [{
                "serviceName": "backend-service",
                "status": "ACTIVE",
                "taskDefinition": "arn:td/linksphere:4",
                "desiredCount": 2,
                "runningCount": 1,
                "deployments": [{
                    "id": "ecs-svc/1",
                    "status": "PRIMARY",
                    "taskDefinition": "arn:td/linksphere:4",
                    "desiredCount": 2,
                    "runningCount": 1,
                    "rolloutState": "IN_PROGRESS"
                }]
            }],
            "failures": []
        }))
        .unwrap();

        let status = resp.into_status().unwrap();
        assert_eq!(status.status, "ACTIVE");
        assert_eq!(status.revision, Some(RevisionId::from("arn:td/linksphere:4")));
        assert_eq!(status.running_count, 1);
        assert_eq!(
            status.deployments[0].rollout_state.as_deref(),
            Some("IN_PROGRESS")
        );
    }

    #[test]
    fn error_code_strips_namespace() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"__type":"com.amazonaws.ecs#ServiceNotFoundException","message":"Service not found."}"#,
        )
        .unwrap();
        assert_eq!(body.code(), "ServiceNotFoundException");
        assert_eq!(body.message.as_deref(), Some("Service not found."));

        let body: ErrorBody = serde_json::from_str(r#"{"Message":"boom"}"#).unwrap();
        assert_eq!(body.code(), "UnknownError");
        assert_eq!(body.message.as_deref(), Some("boom"));
    }
}
