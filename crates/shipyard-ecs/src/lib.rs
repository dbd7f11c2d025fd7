//! shipyard-ecs: control plane access for Shipyard rollouts.
//!
//! The rollout engine only talks to the orchestrator through the
//! [`ControlPlane`] trait. Two implementations live here:
//!
//! - **`client`**: [`EcsClient`], the Amazon ECS JSON 1.1 API over HTTPS,
//!   signed with SigV4 (`sigv4`)
//! - **`memory`**: [`MemoryControlPlane`], an in-process orchestrator with
//!   a revision store and fault injection, for tests
//!
//! Convergence is confirmed by `waiter`, which polls service status until
//! it is stable, failed, or the wait times out.

pub mod client;
pub mod error;
pub mod memory;
pub mod plane;
pub mod sigv4;
pub mod waiter;
mod wire;

pub use client::{EcsClient, EcsConfig};
pub use error::{ControlPlaneError, ControlPlaneResult};
pub use memory::{Call, MemoryControlPlane, RegistrationFault};
pub use plane::{ControlPlane, DeploymentStatus, ServiceStatus};
pub use sigv4::Credentials;
pub use waiter::{WaitOutcome, WaitPolicy};
