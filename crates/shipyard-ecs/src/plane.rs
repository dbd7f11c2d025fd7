//! The control plane capability a rollout depends on.

use std::sync::Arc;

use async_trait::async_trait;
use shipyard_core::{DeploymentDescriptor, RevisionId, ServiceRef};

use crate::error::ControlPlaneResult;
use crate::waiter::{WaitOutcome, WaitPolicy};

/// Remote orchestrator operations used by a rollout.
///
/// Implementations never retry on their own; retry policy belongs to the
/// caller.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Revision currently bound to `service`.
    async fn describe_service(&self, service: &ServiceRef) -> ControlPlaneResult<RevisionId>;

    /// Full task definition for a revision.
    async fn describe_descriptor(
        &self,
        revision: &RevisionId,
    ) -> ControlPlaneResult<DeploymentDescriptor>;

    /// Register `descriptor` as a new revision and return its id.
    async fn register_descriptor(
        &self,
        descriptor: &DeploymentDescriptor,
    ) -> ControlPlaneResult<RevisionId>;

    /// Bind `service` to `revision`. With `force`, a new deployment starts
    /// even if the revision is unchanged.
    async fn update_service(
        &self,
        service: &ServiceRef,
        revision: &RevisionId,
        force: bool,
    ) -> ControlPlaneResult<()>;

    /// Block until `service` runs `revision` stably, has failed, or `policy`
    /// times out. Settling on any other revision counts as failed.
    async fn wait_stable(
        &self,
        service: &ServiceRef,
        revision: &RevisionId,
        policy: &WaitPolicy,
    ) -> ControlPlaneResult<WaitOutcome>;
}

#[async_trait]
impl<T: ControlPlane + ?Sized> ControlPlane for Arc<T> {
    async fn describe_service(&self, service: &ServiceRef) -> ControlPlaneResult<RevisionId> {
        (**self).describe_service(service).await
    }

    async fn describe_descriptor(
        &self,
        revision: &RevisionId,
    ) -> ControlPlaneResult<DeploymentDescriptor> {
        (**self).describe_descriptor(revision).await
    }

    async fn register_descriptor(
        &self,
        descriptor: &DeploymentDescriptor,
    ) -> ControlPlaneResult<RevisionId> {
        (**self).register_descriptor(descriptor).await
    }

    async fn update_service(
        &self,
        service: &ServiceRef,
        revision: &RevisionId,
        force: bool,
    ) -> ControlPlaneResult<()> {
        (**self).update_service(service, revision, force).await
    }

    async fn wait_stable(
        &self,
        service: &ServiceRef,
        revision: &RevisionId,
        policy: &WaitPolicy,
    ) -> ControlPlaneResult<WaitOutcome> {
        (**self).wait_stable(service, revision, policy).await
    }
}

/// Point-in-time view of a service, as used by the stability waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// ACTIVE, DRAINING or INACTIVE.
    pub status: String,
    pub revision: Option<RevisionId>,
    pub desired_count: i64,
    pub running_count: i64,
    pub deployments: Vec<DeploymentStatus>,
}

/// One deployment (PRIMARY or ACTIVE) inside a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStatus {
    pub status: String,
    pub revision: Option<RevisionId>,
    pub desired_count: i64,
    pub running_count: i64,
    /// IN_PROGRESS, COMPLETED or FAILED when the circuit breaker is enabled.
    pub rollout_state: Option<String>,
    pub rollout_state_reason: Option<String>,
}
