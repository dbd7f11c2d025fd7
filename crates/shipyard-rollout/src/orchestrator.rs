//! Rollout orchestrator: rolls services out one at a time.
//!
//! Services are processed in the order given, each running every stage
//! before the next starts. The first failure aborts the remaining services.

use serde::Serialize;
use shipyard_core::{RevisionId, ServiceRef, ServiceRole, ServiceTarget};
use shipyard_ecs::ControlPlane;
use thiserror::Error;
use tracing::{info, warn};

use crate::controller::{RolloutEvent, RolloutResult, ServiceRollout};
use crate::error::RolloutError;
use crate::policy::RolloutPolicy;

type BoxedObserver = Box<dyn Fn(&ServiceTarget, &RolloutEvent) + Send + Sync>;

/// Drives a rollout plan against a control plane.
pub struct Orchestrator<P> {
    plane: P,
    policy: RolloutPolicy,
    observer: BoxedObserver,
}

/// What happened to one service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub role: ServiceRole,
    pub service: ServiceRef,
    pub container: String,
    pub image: String,
    pub previous_revision: Option<RevisionId>,
    pub result: RolloutResult,
    pub elapsed_ms: u64,
}

/// Per-service outcomes, in rollout order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RolloutReport {
    pub services: Vec<ServiceReport>,
}

/// A rollout stopped early. `report` holds every service that was
/// attempted, ending with the one that failed.
#[derive(Debug, Error)]
#[error("rollout aborted")]
pub struct RolloutAborted {
    pub report: RolloutReport,
    #[source]
    pub error: RolloutError,
}

impl<P: ControlPlane> Orchestrator<P> {
    pub fn new(plane: P, policy: RolloutPolicy) -> Self {
        Self {
            plane,
            policy,
            observer: Box::new(|_, _| {}),
        }
    }

    /// Receive progress events for every service.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ServiceTarget, &RolloutEvent) + Send + Sync + 'static,
    {
        self.observer = Box::new(observer);
        self
    }

    /// Roll out `targets` in order, stopping at the first failure.
    pub async fn run(&self, targets: &[ServiceTarget]) -> Result<RolloutReport, RolloutAborted> {
        let mut report = RolloutReport::default();

        if targets.is_empty() {
            return Err(RolloutAborted {
                report,
                error: RolloutError::ConfigurationMissing("backend.service".to_string()),
            });
        }

        for (index, target) in targets.iter().enumerate() {
            let mut rollout = ServiceRollout::new(target.clone());
            let outcome = rollout
                .run(&self.plane, &self.policy, self.observer.as_ref())
                .await;
            report.services.push(ServiceReport::from_rollout(&rollout));

            if let Err(error) = outcome {
                let skipped: Vec<_> = targets[index + 1..]
                    .iter()
                    .map(|t| t.service.to_string())
                    .collect();
                if !skipped.is_empty() {
                    warn!(?skipped, "skipping remaining services after failure");
                }
                return Err(RolloutAborted { report, error });
            }
        }

        info!(services = report.services.len(), "all services stable");
        Ok(report)
    }
}

impl ServiceReport {
    fn from_rollout(rollout: &ServiceRollout) -> Self {
        let result = rollout.result().unwrap_or_else(|| RolloutResult::Failed {
            reason: "rollout did not finish".to_string(),
        });
        Self {
            role: rollout.target.role,
            service: rollout.target.service.clone(),
            container: rollout.target.container.clone(),
            image: rollout.target.image.to_string(),
            previous_revision: rollout.previous_revision.clone(),
            result,
            elapsed_ms: rollout
                .elapsed()
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        }
    }
}

impl RolloutReport {
    /// New revision per service, for services that reached stable.
    pub fn revisions(&self) -> Vec<(&ServiceRef, &RevisionId)> {
        self.services
            .iter()
            .filter_map(|s| match &s.result {
                RolloutResult::Stable { revision } => Some((&s.service, revision)),
                RolloutResult::Failed { .. } => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_core::{DeploymentDescriptor, ImageReference};
    use shipyard_ecs::{Call, MemoryControlPlane, WaitOutcome};
    use std::sync::Arc;

    fn descriptor(container: &str) -> DeploymentDescriptor {
        serde_json::from_value(serde_json::json!({
            "family": format!("linksphere-{container}"),
            "containerDefinitions": [{ "name": container, "image": "registry/old:1" }]
        }))
        .unwrap()
    }

    fn target(role: ServiceRole, service: &str) -> ServiceTarget {
        ServiceTarget {
            role,
            service: ServiceRef::new("linksphere-cluster", service),
            container: role.default_container().to_string(),
            image: ImageReference::new("registry.example.com/org", role.default_repository(), "2.0.0")
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn empty_plan_is_rejected() {
        let orch = Orchestrator::new(MemoryControlPlane::new(), RolloutPolicy::default());
        let aborted = orch.run(&[]).await.unwrap_err();
        assert_eq!(aborted.error.kind(), "ConfigurationMissing");
        assert!(aborted.report.services.is_empty());
    }

    #[tokio::test]
    async fn services_roll_out_in_order() {
        let plane = Arc::new(MemoryControlPlane::new());
        let backend = target(ServiceRole::Backend, "backend-service");
        let frontend = target(ServiceRole::Frontend, "frontend-service");
        plane.add_service(backend.service.clone(), &descriptor("backend"));
        plane.add_service(frontend.service.clone(), &descriptor("frontend"));

        let orch = Orchestrator::new(plane.clone(), RolloutPolicy::default());
        let report = orch.run(&[backend.clone(), frontend.clone()]).await.unwrap();

        assert_eq!(report.revisions().len(), 2);

        // The backend's wait finishes before the frontend is touched.
        let calls = plane.calls();
        let backend_wait = calls
            .iter()
            .position(|c| *c == Call::WaitStable(backend.service.clone()))
            .unwrap();
        let frontend_describe = calls
            .iter()
            .position(|c| *c == Call::DescribeService(frontend.service.clone()))
            .unwrap();
        assert!(backend_wait < frontend_describe);
    }

    #[tokio::test]
    async fn backend_failure_skips_frontend() {
        let plane = Arc::new(MemoryControlPlane::new());
        let backend = target(ServiceRole::Backend, "backend-service");
        let frontend = target(ServiceRole::Frontend, "frontend-service");
        plane.add_service(backend.service.clone(), &descriptor("backend"));
        plane.add_service(frontend.service.clone(), &descriptor("frontend"));
        plane.set_wait_outcome(
            &backend.service,
            WaitOutcome::Failed {
                reason: "service is DRAINING".to_string(),
            },
        );

        let orch = Orchestrator::new(plane.clone(), RolloutPolicy::default());
        let aborted = orch
            .run(&[backend.clone(), frontend.clone()])
            .await
            .unwrap_err();

        assert_eq!(aborted.error.kind(), "RolloutFailed");
        assert_eq!(aborted.report.services.len(), 1);
        assert!(matches!(
            aborted.report.services[0].result,
            RolloutResult::Failed { .. }
        ));
        assert!(
            plane
                .calls()
                .iter()
                .all(|c| *c != Call::DescribeService(frontend.service.clone()))
        );
    }

    #[tokio::test]
    async fn observer_sees_each_service() {
        let plane = MemoryControlPlane::new();
        let backend = target(ServiceRole::Backend, "backend-service");
        plane.add_service(backend.service.clone(), &descriptor("backend"));

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let orch = Orchestrator::new(plane, RolloutPolicy::default()).with_observer(
            move |target, event| {
                if let RolloutEvent::Stable { .. } = event {
                    sink.lock().unwrap().push(target.role);
                }
            },
        );

        orch.run(&[backend]).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![ServiceRole::Backend]);
    }
}
