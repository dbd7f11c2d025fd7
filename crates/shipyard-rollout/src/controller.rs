//! Rollout controller: drives one service through its rollout stages.
//!
//! The controller moves through `Patching → Registering → Converging` and
//! ends in `Stable` or `Failed`. A stage only starts once the previous one
//! has returned successfully; the first error ends the rollout.

use std::time::{Duration, Instant};

use shipyard_core::{patch_image, DeploymentDescriptor, RevisionId, ServiceRef, ServiceTarget};
use shipyard_ecs::{ControlPlane, ControlPlaneError, WaitOutcome, WaitPolicy};
use tracing::{debug, info, warn};

use crate::error::RolloutError;
use crate::policy::RolloutPolicy;

/// Current phase of a service rollout.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RolloutPhase {
    /// Rollout not started.
    Pending,
    /// Fetching the bound task definition and swapping the image.
    Patching,
    /// Registering the patched copy as a new revision.
    Registering,
    /// Service bound to the new revision, waiting for it to settle.
    Converging { revision: RevisionId },
    /// The orchestrator reported the service stable.
    Stable { revision: RevisionId },
    /// Stopped on an error.
    Failed { reason: String },
}

/// Terminal outcome of a service rollout.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RolloutResult {
    Stable { revision: RevisionId },
    Failed { reason: String },
}

/// Progress notifications emitted while a service rolls out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutEvent {
    Started { image: String },
    Patched { container: String, previous: RevisionId },
    Registering,
    RegistrationRetry { attempt: u32, reason: String },
    Registered { revision: RevisionId },
    Updating { revision: RevisionId },
    Waiting,
    Stable { revision: RevisionId },
    Failed { reason: String },
}

/// Callback receiving every [`RolloutEvent`] along with the service it
/// belongs to.
pub type Observer<'a> = dyn Fn(&ServiceTarget, &RolloutEvent) + Send + Sync + 'a;

/// A single service rollout.
#[derive(Debug, Clone)]
pub struct ServiceRollout {
    pub target: ServiceTarget,
    pub phase: RolloutPhase,
    /// Revision the service was bound to before this rollout.
    pub previous_revision: Option<RevisionId>,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl ServiceRollout {
    pub fn new(target: ServiceTarget) -> Self {
        Self {
            target,
            phase: RolloutPhase::Pending,
            previous_revision: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Run all stages to completion. Returns the new revision once the
    /// service is stable.
    pub async fn run<P>(
        &mut self,
        plane: &P,
        policy: &RolloutPolicy,
        observer: &Observer<'_>,
    ) -> Result<RevisionId, RolloutError>
    where
        P: ControlPlane + ?Sized,
    {
        self.started_at = Some(Instant::now());
        let target = self.target.clone();
        let emit = |event: RolloutEvent| observer(&target, &event);

        info!(
            service = %target.service,
            container = %target.container,
            image = %target.image,
            "starting rollout"
        );
        emit(RolloutEvent::Started {
            image: target.image.to_string(),
        });

        let result = self.drive(plane, policy, &emit).await;
        self.finished_at = Some(Instant::now());

        match &result {
            Ok(revision) => {
                info!(service = %target.service, %revision, "rollout completed");
                emit(RolloutEvent::Stable {
                    revision: revision.clone(),
                });
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(service = %target.service, kind = err.kind(), %reason, "rollout failed");
                self.phase = RolloutPhase::Failed {
                    reason: reason.clone(),
                };
                emit(RolloutEvent::Failed { reason });
            }
        }
        result
    }

    async fn drive<P>(
        &mut self,
        plane: &P,
        policy: &RolloutPolicy,
        emit: &dyn Fn(RolloutEvent),
    ) -> Result<RevisionId, RolloutError>
    where
        P: ControlPlane + ?Sized,
    {
        self.transition(RolloutPhase::Patching);
        let (current, patched) = fetch_and_patch(plane, &self.target).await?;
        self.previous_revision = Some(current.clone());
        emit(RolloutEvent::Patched {
            container: self.target.container.clone(),
            previous: current.clone(),
        });

        self.transition(RolloutPhase::Registering);
        emit(RolloutEvent::Registering);
        let revision = register(plane, &patched, &current, policy.registration_retries, emit).await?;
        emit(RolloutEvent::Registered {
            revision: revision.clone(),
        });

        self.transition(RolloutPhase::Converging {
            revision: revision.clone(),
        });
        converge(plane, &self.target.service, &revision, &policy.wait_policy(), emit).await?;

        self.transition(RolloutPhase::Stable {
            revision: revision.clone(),
        });
        Ok(revision)
    }

    fn transition(&mut self, phase: RolloutPhase) {
        debug!(service = %self.target.service, from = ?self.phase, to = ?phase, "rollout phase");
        self.phase = phase;
    }

    /// Terminal outcome, or `None` while the rollout is unfinished.
    pub fn result(&self) -> Option<RolloutResult> {
        match &self.phase {
            RolloutPhase::Stable { revision } => Some(RolloutResult::Stable {
                revision: revision.clone(),
            }),
            RolloutPhase::Failed { reason } => Some(RolloutResult::Failed {
                reason: reason.clone(),
            }),
            _ => None,
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            (Some(start), None) => Some(start.elapsed()),
            _ => None,
        }
    }
}

// ── Stages ────────────────────────────────────────────────────────

/// Fetch the revision bound to the target service and patch its image.
///
/// Returns the current revision id and the unregistered patched copy.
pub async fn fetch_and_patch<P>(
    plane: &P,
    target: &ServiceTarget,
) -> Result<(RevisionId, DeploymentDescriptor), RolloutError>
where
    P: ControlPlane + ?Sized,
{
    let current = plane
        .describe_service(&target.service)
        .await
        .map_err(|e| describe_error(e, &target.service))?;
    debug!(service = %target.service, revision = %current, "fetched bound revision");

    let descriptor = plane
        .describe_descriptor(&current)
        .await
        .map_err(|e| describe_error(e, &target.service))?;

    let patched = patch_image(&descriptor, &target.container, &target.image)?;
    Ok((current, patched))
}

/// Register `descriptor`, retrying transient failures up to `retries` times.
///
/// Registration only ever creates revisions, so a retried call can at most
/// leave one extra revision behind.
pub async fn register<P>(
    plane: &P,
    descriptor: &DeploymentDescriptor,
    current: &RevisionId,
    retries: u32,
    emit: &dyn Fn(RolloutEvent),
) -> Result<RevisionId, RolloutError>
where
    P: ControlPlane + ?Sized,
{
    let failed = |reason: String| RolloutError::RegistrationFailed {
        family: descriptor.family.clone(),
        reason,
    };

    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match plane.register_descriptor(descriptor).await {
            Ok(revision) if &revision == current => {
                return Err(failed(format!(
                    "orchestrator returned the current revision {revision}"
                )));
            }
            Ok(revision) => {
                info!(family = %descriptor.family, %revision, attempt, "registered new revision");
                return Ok(revision);
            }
            Err(err) if err.is_transient() && attempt <= retries => {
                warn!(family = %descriptor.family, attempt, error = %err, "registration failed, retrying");
                emit(RolloutEvent::RegistrationRetry {
                    attempt,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(failed(err.to_string())),
        }
    }
}

/// Bind `service` to `revision` with a forced deployment and block until the
/// orchestrator reports it stable.
pub async fn converge<P>(
    plane: &P,
    service: &ServiceRef,
    revision: &RevisionId,
    wait: &WaitPolicy,
    emit: &dyn Fn(RolloutEvent),
) -> Result<(), RolloutError>
where
    P: ControlPlane + ?Sized,
{
    emit(RolloutEvent::Updating {
        revision: revision.clone(),
    });
    plane
        .update_service(service, revision, true)
        .await
        .map_err(|e| match e {
            ControlPlaneError::ServiceNotFound { cluster, service } => {
                RolloutError::ServiceNotFound { cluster, service }
            }
            other => rollout_failed(service, format!("update rejected: {other}")),
        })?;

    emit(RolloutEvent::Waiting);
    debug!(%service, timeout_secs = wait.timeout.as_secs(), "waiting for service to stabilize");

    match plane.wait_stable(service, revision, wait).await {
        Ok(WaitOutcome::Stable) => Ok(()),
        Ok(WaitOutcome::Failed { reason }) => Err(rollout_failed(service, reason)),
        Ok(WaitOutcome::TimedOut { waited_secs }) => Err(rollout_failed(
            service,
            format!("timed out after {waited_secs}s waiting for the service to become stable"),
        )),
        Err(err) => Err(rollout_failed(service, format!("stability wait failed: {err}"))),
    }
}

fn describe_error(err: ControlPlaneError, service: &ServiceRef) -> RolloutError {
    match err {
        ControlPlaneError::ServiceNotFound { cluster, service } => {
            RolloutError::ServiceNotFound { cluster, service }
        }
        source => RolloutError::ControlPlane {
            service: service.to_string(),
            source,
        },
    }
}

fn rollout_failed(service: &ServiceRef, reason: String) -> RolloutError {
    RolloutError::RolloutFailed {
        cluster: service.cluster.clone(),
        service: service.service.clone(),
        reason,
    }
}
