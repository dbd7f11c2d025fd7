//! In-process control plane.
//!
//! Keeps a revision store per family, service bindings, and a log of every
//! call made against it. Stability outcomes and registration faults are
//! scripted per test.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use shipyard_core::{DeploymentDescriptor, RevisionId, ServiceRef};
use tracing::debug;

use crate::error::{ControlPlaneError, ControlPlaneResult};
use crate::plane::ControlPlane;
use crate::waiter::{WaitOutcome, WaitPolicy};

const ACCOUNT_ARN_PREFIX: &str = "arn:aws:ecs:us-east-1:000000000000:task-definition";

/// A call recorded by [`MemoryControlPlane`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DescribeService(ServiceRef),
    DescribeDescriptor(RevisionId),
    Register { family: String },
    UpdateService {
        service: ServiceRef,
        revision: RevisionId,
        force: bool,
    },
    WaitStable(ServiceRef),
}

/// How an injected registration failure behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationFault {
    /// The request never reached the store.
    Dropped,
    /// The revision was stored but the response was lost.
    ResponseLost,
    /// The store rejected the descriptor.
    Rejected,
}

#[derive(Default)]
struct State {
    /// Keyed by revision ARN.
    revisions: BTreeMap<String, DeploymentDescriptor>,
    latest: HashMap<String, u32>,
    bindings: HashMap<ServiceRef, RevisionId>,
    wait_outcomes: HashMap<ServiceRef, WaitOutcome>,
    /// Services whose next deployment is rolled back by the circuit breaker.
    rollbacks: HashSet<ServiceRef>,
    registration_faults: Vec<RegistrationFault>,
    calls: Vec<Call>,
}

impl State {
    fn store(&mut self, descriptor: &DeploymentDescriptor) -> RevisionId {
        let number = self.latest.entry(descriptor.family.clone()).or_insert(0);
        *number += 1;
        let id = RevisionId::new(format!("{ACCOUNT_ARN_PREFIX}/{}:{number}", descriptor.family));
        let mut stored = descriptor.clone();
        stored.revision = Some(id.clone());
        self.revisions.insert(id.to_string(), stored);
        id
    }
}

/// A control plane that lives entirely in memory.
#[derive(Default)]
pub struct MemoryControlPlane {
    state: Mutex<State>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `descriptor` and bind `service` to the new revision.
    pub fn add_service(&self, service: ServiceRef, descriptor: &DeploymentDescriptor) -> RevisionId {
        let mut state = self.lock();
        let id = state.store(descriptor);
        state.bindings.insert(service, id.clone());
        id
    }

    /// Remove a service, as if it had been deleted from the cluster.
    pub fn remove_service(&self, service: &ServiceRef) {
        self.lock().bindings.remove(service);
    }

    /// Outcome the next waits on `service` report. Defaults to stable.
    pub fn set_wait_outcome(&self, service: &ServiceRef, outcome: WaitOutcome) {
        self.lock().wait_outcomes.insert(service.clone(), outcome);
    }

    /// Roll the next deployment of `service` back, as the deployment circuit
    /// breaker does: the update is accepted but the service stays on its
    /// previous revision.
    pub fn roll_back_next_deployment(&self, service: &ServiceRef) {
        self.lock().rollbacks.insert(service.clone());
    }

    /// Fail the next registrations, one fault per call, in order.
    pub fn fail_registrations(&self, faults: &[RegistrationFault]) {
        self.lock().registration_faults.extend_from_slice(faults);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Revision currently bound to `service`.
    pub fn bound_revision(&self, service: &ServiceRef) -> Option<RevisionId> {
        self.lock().bindings.get(service).cloned()
    }

    pub fn descriptor(&self, revision: &RevisionId) -> Option<DeploymentDescriptor> {
        self.lock().revisions.get(revision.as_str()).cloned()
    }

    /// All stored revisions of a family, oldest first.
    pub fn revisions(&self, family: &str) -> Vec<DeploymentDescriptor> {
        let mut revisions: Vec<_> = self
            .lock()
            .revisions
            .values()
            .filter(|d| d.family == family)
            .cloned()
            .collect();
        revisions.sort_by_key(|d| revision_number(d.revision.as_ref()));
        revisions
    }
}

fn revision_number(id: Option<&RevisionId>) -> u32 {
    id.and_then(|id| id.as_str().rsplit(':').next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn validate(descriptor: &DeploymentDescriptor) -> ControlPlaneResult<()> {
    let reject = |message: &str| ControlPlaneError::Api {
        code: "ClientException".to_string(),
        message: message.to_string(),
    };
    if descriptor.family.trim().is_empty() {
        return Err(reject("family must not be empty"));
    }
    if descriptor.containers.is_empty() {
        return Err(reject("at least one container definition is required"));
    }
    if descriptor
        .containers
        .iter()
        .any(|c| c.name.is_empty() || c.image.is_empty())
    {
        return Err(reject("container name and image are required"));
    }
    Ok(())
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn describe_service(&self, service: &ServiceRef) -> ControlPlaneResult<RevisionId> {
        let mut state = self.lock();
        state.calls.push(Call::DescribeService(service.clone()));
        state
            .bindings
            .get(service)
            .cloned()
            .ok_or_else(|| ControlPlaneError::ServiceNotFound {
                cluster: service.cluster.clone(),
                service: service.service.clone(),
            })
    }

    async fn describe_descriptor(
        &self,
        revision: &RevisionId,
    ) -> ControlPlaneResult<DeploymentDescriptor> {
        let mut state = self.lock();
        state.calls.push(Call::DescribeDescriptor(revision.clone()));
        state
            .revisions
            .get(revision.as_str())
            .cloned()
            .ok_or_else(|| ControlPlaneError::DescriptorNotFound {
                revision: revision.to_string(),
                message: "unable to describe task definition".to_string(),
            })
    }

    async fn register_descriptor(
        &self,
        descriptor: &DeploymentDescriptor,
    ) -> ControlPlaneResult<RevisionId> {
        let mut state = self.lock();
        state.calls.push(Call::Register {
            family: descriptor.family.clone(),
        });

        let fault = if state.registration_faults.is_empty() {
            None
        } else {
            Some(state.registration_faults.remove(0))
        };

        match fault {
            Some(RegistrationFault::Dropped) => {
                return Err(ControlPlaneError::Transport("connection reset".to_string()));
            }
            Some(RegistrationFault::ResponseLost) => {
                validate(descriptor)?;
                let id = state.store(descriptor);
                debug!(revision = %id, "stored revision, dropping response");
                return Err(ControlPlaneError::Transport("response timed out".to_string()));
            }
            Some(RegistrationFault::Rejected) => {
                return Err(ControlPlaneError::Api {
                    code: "ClientException".to_string(),
                    message: "container definition is invalid".to_string(),
                });
            }
            None => {}
        }

        validate(descriptor)?;
        let id = state.store(descriptor);
        debug!(revision = %id, "registered revision");
        Ok(id)
    }

    async fn update_service(
        &self,
        service: &ServiceRef,
        revision: &RevisionId,
        force: bool,
    ) -> ControlPlaneResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::UpdateService {
            service: service.clone(),
            revision: revision.clone(),
            force,
        });
        if !state.bindings.contains_key(service) {
            return Err(ControlPlaneError::ServiceNotFound {
                cluster: service.cluster.clone(),
                service: service.service.clone(),
            });
        }
        if !state.revisions.contains_key(revision.as_str()) {
            return Err(ControlPlaneError::Api {
                code: "InvalidParameterException".to_string(),
                message: format!("unknown task definition {revision}"),
            });
        }
        if state.rollbacks.remove(service) {
            debug!(%service, %revision, "deployment rolled back");
            return Ok(());
        }
        state.bindings.insert(service.clone(), revision.clone());
        Ok(())
    }

    async fn wait_stable(
        &self,
        service: &ServiceRef,
        revision: &RevisionId,
        _policy: &WaitPolicy,
    ) -> ControlPlaneResult<WaitOutcome> {
        let mut state = self.lock();
        state.calls.push(Call::WaitStable(service.clone()));
        match state.bindings.get(service) {
            None => {
                return Ok(WaitOutcome::Failed {
                    reason: "service is MISSING".to_string(),
                });
            }
            Some(bound) if bound != revision => {
                return Ok(WaitOutcome::Failed {
                    reason: format!("service settled on {bound} instead of {revision}"),
                });
            }
            Some(_) => {}
        }
        Ok(state
            .wait_outcomes
            .get(service)
            .cloned()
            .unwrap_or(WaitOutcome::Stable))
    }
}
