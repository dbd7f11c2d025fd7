//! Shipyard rollout engine: zero-downtime image rollouts.
//!
//! Each service goes through three stages, strictly in order:
//!
//! 1. fetch the bound task definition and patch one container's image
//! 2. register the patched copy as a new revision
//! 3. point the service at it with a forced deployment and wait for the
//!    orchestrator to report it stable
//!
//! # Components
//!
//! - **`policy`**: wait timeout, poll interval, registration retries
//! - **`controller`**: per-service rollout state machine
//! - **`orchestrator`**: runs services one after another, fail-fast

pub mod controller;
pub mod error;
pub mod orchestrator;
pub mod policy;

pub use controller::{RolloutEvent, RolloutPhase, RolloutResult, ServiceRollout};
pub use error::RolloutError;
pub use orchestrator::{Orchestrator, RolloutAborted, RolloutReport, ServiceReport};
pub use policy::RolloutPolicy;
