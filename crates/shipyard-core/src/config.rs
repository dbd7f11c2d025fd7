//! shipyard.toml configuration parser.
//!
//! Every key is optional in the file. The CLI layers flag and environment
//! values on top with [`DeployConfig::overlay`], then calls
//! [`DeployConfig::resolve`] to check that everything a rollout needs is
//! present.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::image::ImageReference;
use crate::types::{ServiceRef, ServiceRole, ServiceTarget};

pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub backend: ServiceConfig,
    #[serde(default)]
    pub frontend: ServiceConfig,
    #[serde(default)]
    pub wait: WaitConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry root images are pushed under, e.g. `registry.gitlab.com/myorg`.
    pub root: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: Option<String>,
    pub region: Option<String>,
    /// Override for the control plane endpoint (emulators, VPC endpoints).
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub service: Option<String>,
    pub container: Option<String>,
    pub repository: Option<String>,
    pub tag: Option<String>,
}

/// Timeout and retry knobs for a rollout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    pub timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub registration_retries: Option<u32>,
}

/// A fully validated rollout configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDeploy {
    pub region: String,
    pub endpoint: Option<String>,
    /// Backend first, then frontend when configured.
    pub targets: Vec<ServiceTarget>,
    pub wait: WaitConfig,
}

impl DeployConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::ConfigRead(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        toml::from_str(content).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }

    /// Layer `other` on top of `self`; values set in `other` win.
    pub fn overlay(self, other: DeployConfig) -> Self {
        Self {
            registry: RegistryConfig {
                root: other.registry.root.or(self.registry.root),
            },
            cluster: ClusterConfig {
                name: other.cluster.name.or(self.cluster.name),
                region: other.cluster.region.or(self.cluster.region),
                endpoint: other.cluster.endpoint.or(self.cluster.endpoint),
            },
            backend: self.backend.overlay(other.backend),
            frontend: self.frontend.overlay(other.frontend),
            wait: WaitConfig {
                timeout_secs: other.wait.timeout_secs.or(self.wait.timeout_secs),
                poll_interval_secs: other
                    .wait
                    .poll_interval_secs
                    .or(self.wait.poll_interval_secs),
                registration_retries: other
                    .wait
                    .registration_retries
                    .or(self.wait.registration_retries),
            },
        }
    }

    /// Validate and turn the config into an ordered list of rollout targets.
    pub fn resolve(&self) -> CoreResult<ResolvedDeploy> {
        let registry = required(&self.registry.root, "registry.root")?;
        let cluster = required(&self.cluster.name, "cluster.name")?;
        let backend_service = required(&self.backend.service, "backend.service")?;

        let mut targets = vec![self.backend.target(
            ServiceRole::Backend,
            registry,
            cluster,
            backend_service,
        )?];

        if let Some(frontend_service) = present(&self.frontend.service) {
            targets.push(self.frontend.target(
                ServiceRole::Frontend,
                registry,
                cluster,
                frontend_service,
            )?);
        }

        Ok(ResolvedDeploy {
            region: present(&self.cluster.region)
                .unwrap_or(DEFAULT_REGION)
                .to_string(),
            endpoint: present(&self.cluster.endpoint).map(str::to_string),
            targets,
            wait: self.wait.clone(),
        })
    }
}

impl ServiceConfig {
    fn overlay(self, other: ServiceConfig) -> Self {
        Self {
            service: other.service.or(self.service),
            container: other.container.or(self.container),
            repository: other.repository.or(self.repository),
            tag: other.tag.or(self.tag),
        }
    }

    fn target(
        &self,
        role: ServiceRole,
        registry: &str,
        cluster: &str,
        service: &str,
    ) -> CoreResult<ServiceTarget> {
        let tag = present(&self.tag)
            .ok_or_else(|| CoreError::ConfigurationMissing(format!("{role}.tag")))?;
        let repository = present(&self.repository).unwrap_or(role.default_repository());
        let container = present(&self.container).unwrap_or(role.default_container());

        Ok(ServiceTarget {
            role,
            service: ServiceRef::new(cluster, service),
            container: container.to_string(),
            image: ImageReference::new(registry, repository, tag)?,
        })
    }
}

/// Treat blank strings the same as unset values.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: &'a Option<String>, key: &str) -> CoreResult<&'a str> {
    present(value).ok_or_else(|| CoreError::ConfigurationMissing(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> DeployConfig {
        DeployConfig::from_toml_str(
            r#"
[registry]
root = "registry.example.com/org/"

[cluster]
name = "linksphere-cluster"

[backend]
service = "backend-service"
tag = "1.2.3"
"#,
        )
        .unwrap()
    }

    #[test]
    fn resolves_backend_with_defaults() {
        let resolved = minimal().resolve().unwrap();
        assert_eq!(resolved.region, "us-east-1");
        assert!(resolved.endpoint.is_none());
        assert_eq!(resolved.targets.len(), 1);

        let backend = &resolved.targets[0];
        assert_eq!(backend.role, ServiceRole::Backend);
        assert_eq!(backend.container, "backend");
        assert_eq!(
            backend.service,
            ServiceRef::new("linksphere-cluster", "backend-service")
        );
        assert_eq!(
            backend.image.to_string(),
            "registry.example.com/org/linksphere-backend:1.2.3"
        );
    }

    #[test]
    fn frontend_follows_backend() {
        let mut config = minimal();
        config.frontend.service = Some("frontend-service".to_string());
        config.frontend.tag = Some("2.0.0".to_string());

        let resolved = config.resolve().unwrap();
        let roles: Vec<_> = resolved.targets.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![ServiceRole::Backend, ServiceRole::Frontend]);
        assert_eq!(
            resolved.targets[1].image.to_string(),
            "registry.example.com/org/linksphere-frontend:2.0.0"
        );
    }

    #[test]
    fn frontend_service_without_tag_is_missing_config() {
        let mut config = minimal();
        config.frontend.service = Some("frontend-service".to_string());
        let err = config.resolve().unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationMissing(ref k) if k == "frontend.tag"));
    }

    fn assert_missing(config: DeployConfig, key: &str) {
        match config.resolve() {
            Err(CoreError::ConfigurationMissing(k)) => assert_eq!(k, key),
            other => panic!("expected ConfigurationMissing({key}), got {other:?}"),
        }
    }

    #[test]
    fn missing_required_keys() {
        let mut config = minimal();
        config.registry.root = None;
        assert_missing(config, "registry.root");

        let mut config = minimal();
        config.cluster.name = None;
        assert_missing(config, "cluster.name");

        let mut config = minimal();
        config.backend.service = Some("  ".to_string());
        assert_missing(config, "backend.service");

        let mut config = minimal();
        config.backend.tag = None;
        assert_missing(config, "backend.tag");
    }

    #[test]
    fn overlay_prefers_the_upper_layer() {
        let file = minimal();
        let flags = DeployConfig {
            cluster: ClusterConfig {
                region: Some("eu-west-1".to_string()),
                ..Default::default()
            },
            backend: ServiceConfig {
                tag: Some("9.9.9".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = file.overlay(flags);
        assert_eq!(merged.backend.tag.as_deref(), Some("9.9.9"));
        assert_eq!(merged.backend.service.as_deref(), Some("backend-service"));
        assert_eq!(merged.cluster.region.as_deref(), Some("eu-west-1"));
        assert_eq!(merged.cluster.name.as_deref(), Some("linksphere-cluster"));
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipyard.toml");
        std::fs::write(
            &path,
            "[wait]\ntimeout_secs = 120\npoll_interval_secs = 5\n",
        )
        .unwrap();

        let config = DeployConfig::from_file(&path).unwrap();
        assert_eq!(config.wait.timeout_secs, Some(120));
        assert_eq!(config.wait.poll_interval_secs, Some(5));
        assert!(config.registry.root.is_none());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = DeployConfig::from_file(Path::new("/nonexistent/shipyard.toml")).unwrap_err();
        assert!(matches!(err, CoreError::ConfigRead(_)));
    }
}
