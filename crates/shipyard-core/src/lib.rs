pub mod config;
pub mod error;
pub mod image;
pub mod patch;
pub mod types;

pub use config::{DeployConfig, ResolvedDeploy, WaitConfig};
pub use error::{CoreError, CoreResult};
pub use image::ImageReference;
pub use patch::patch_image;
pub use types::*;
