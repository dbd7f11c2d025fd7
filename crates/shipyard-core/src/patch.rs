//! Clone-then-patch of a task definition's container image.
//!
//! The source descriptor is only borrowed. The result is rebuilt field by
//! field with a fresh container list, so the two values share no state.

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::image::ImageReference;
use crate::types::{ContainerSpec, DeploymentDescriptor};

/// Return a copy of `descriptor` with the image of `container` replaced.
///
/// Exactly one container must carry the target name. The copy has no
/// revision id: it describes a revision that does not exist yet.
pub fn patch_image(
    descriptor: &DeploymentDescriptor,
    container: &str,
    image: &ImageReference,
) -> CoreResult<DeploymentDescriptor> {
    let matches = descriptor
        .containers
        .iter()
        .filter(|c| c.name == container)
        .count();

    match matches {
        0 => {
            return Err(CoreError::ContainerNotFound {
                container: container.to_string(),
                revision: descriptor.revision_label(),
            });
        }
        1 => {}
        count => {
            return Err(CoreError::AmbiguousContainer {
                container: container.to_string(),
                revision: descriptor.revision_label(),
                count,
            });
        }
    }

    let containers = descriptor
        .containers
        .iter()
        .map(|c| ContainerSpec {
            name: c.name.clone(),
            image: if c.name == container {
                image.to_string()
            } else {
                c.image.clone()
            },
            extra: c.extra.clone(),
        })
        .collect();

    debug!(
        family = %descriptor.family,
        container,
        %image,
        "patched container image"
    );

    Ok(DeploymentDescriptor {
        family: descriptor.family.clone(),
        revision: None,
        containers,
        task_role_arn: descriptor.task_role_arn.clone(),
        execution_role_arn: descriptor.execution_role_arn.clone(),
        network_mode: descriptor.network_mode.clone(),
        volumes: descriptor.volumes.clone(),
        placement_constraints: descriptor.placement_constraints.clone(),
        requires_compatibilities: descriptor.requires_compatibilities.clone(),
        cpu: descriptor.cpu.clone(),
        memory: descriptor.memory.clone(),
        runtime_platform: descriptor.runtime_platform.clone(),
        ephemeral_storage: descriptor.ephemeral_storage.clone(),
    })
}
