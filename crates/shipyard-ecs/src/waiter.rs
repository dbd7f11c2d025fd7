//! Services-stable waiter.
//!
//! A service is stable once it has a single deployment, running the
//! expected revision, whose running task count matches the desired count.
//! It has failed if it went missing, is draining or inactive, any of its
//! deployments reports a FAILED rollout state, or it settled on a different
//! revision (a circuit-breaker rollback).

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use shipyard_core::RevisionId;

use crate::error::ControlPlaneResult;
use crate::plane::ServiceStatus;

/// How long to wait for convergence and how often to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(15),
        }
    }
}

/// Terminal result of a stability wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WaitOutcome {
    Stable,
    Failed { reason: String },
    TimedOut { waited_secs: u64 },
}

/// Verdict for a single status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Stable,
    Pending(String),
    Failed(String),
}

/// Classify one snapshot against the revision the service should converge
/// on. `None` means the orchestrator reported the service as missing.
pub fn evaluate(status: Option<&ServiceStatus>, expected: &RevisionId) -> Probe {
    let Some(status) = status else {
        return Probe::Failed("service is MISSING".to_string());
    };

    if matches!(status.status.as_str(), "DRAINING" | "INACTIVE") {
        return Probe::Failed(format!("service is {}", status.status));
    }

    if let Some(failed) = status
        .deployments
        .iter()
        .find(|d| d.rollout_state.as_deref() == Some("FAILED"))
    {
        let reason = failed
            .rollout_state_reason
            .clone()
            .unwrap_or_else(|| "deployment rollout FAILED".to_string());
        return Probe::Failed(reason);
    }

    if let [only] = status.deployments.as_slice() {
        if only.running_count == only.desired_count
            && status.running_count == status.desired_count
        {
            return match &only.revision {
                Some(revision) if revision == expected => Probe::Stable,
                Some(revision) => Probe::Failed(format!(
                    "service settled on {revision} instead of {expected}"
                )),
                None => Probe::Failed(format!(
                    "service settled without reporting a revision, expected {expected}"
                )),
            };
        }
    }

    Probe::Pending(format!(
        "{} deployments, {}/{} tasks running",
        status.deployments.len(),
        status.running_count,
        status.desired_count
    ))
}

/// Poll `probe` until the service settles or `policy.timeout` elapses.
///
/// Errors from `probe` end the wait immediately.
pub async fn wait_until_stable<F, Fut>(
    policy: &WaitPolicy,
    expected: &RevisionId,
    mut probe: F,
) -> ControlPlaneResult<WaitOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlPlaneResult<Option<ServiceStatus>>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let status = probe().await?;

        match evaluate(status.as_ref(), expected) {
            Probe::Stable => {
                debug!(attempt, "service stable");
                return Ok(WaitOutcome::Stable);
            }
            Probe::Failed(reason) => {
                warn!(attempt, %reason, "service failed to stabilize");
                return Ok(WaitOutcome::Failed { reason });
            }
            Probe::Pending(detail) => {
                debug!(attempt, %detail, "service not yet stable");
            }
        }

        let elapsed = started.elapsed();
        if elapsed + policy.poll_interval > policy.timeout {
            warn!(attempt, waited_secs = elapsed.as_secs(), "stability wait timed out");
            return Ok(WaitOutcome::TimedOut {
                waited_secs: elapsed.as_secs(),
            });
        }

        tokio::time::sleep(policy.poll_interval).await;
    }
}
