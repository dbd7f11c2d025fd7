use std::path::PathBuf;

use clap::Args;
use shipyard_core::config::{ClusterConfig, RegistryConfig, ServiceConfig};
use shipyard_core::{DeployConfig, ServiceTarget, WaitConfig};
use shipyard_ecs::{Credentials, EcsClient, EcsConfig};
use shipyard_rollout::{
    Orchestrator, RolloutAborted, RolloutError, RolloutEvent, RolloutPolicy, RolloutReport,
};
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Tag of the backend image to roll out.
    #[arg(long)]
    pub backend_image_tag: Option<String>,

    /// Tag of the frontend image to roll out.
    #[arg(long)]
    pub frontend_image_tag: Option<String>,

    /// Registry root the images were pushed under.
    #[arg(long, env = "SHIPYARD_REGISTRY")]
    pub registry: Option<String>,

    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    #[arg(long, alias = "ecs-cluster")]
    pub cluster: Option<String>,

    /// Backend service name.
    #[arg(long, alias = "ecs-service")]
    pub service: Option<String>,

    /// Frontend service name. The frontend is skipped when unset.
    #[arg(long, alias = "frontend-ecs-service")]
    pub frontend_service: Option<String>,

    /// Container to patch in the backend task definition [default: backend]
    #[arg(long)]
    pub backend_container_name: Option<String>,

    /// Container to patch in the frontend task definition [default: frontend]
    #[arg(long)]
    pub frontend_container_name: Option<String>,

    /// Seconds to wait for each service to become stable [default: 600]
    #[arg(long)]
    pub wait_timeout: Option<u64>,

    /// Seconds between stability polls [default: 15]
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Registration retries after a transient failure [default: 1]
    #[arg(long)]
    pub registration_retries: Option<u32>,

    /// Control plane endpoint override.
    #[arg(long, env = "SHIPYARD_ECS_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Read defaults from a shipyard.toml file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    pub output: String,
}

impl DeployArgs {
    /// Flag values as a config layer. `GITLAB_REGISTRY` is honoured when
    /// no registry was given.
    fn to_config(&self) -> DeployConfig {
        let registry = self
            .registry
            .clone()
            .or_else(|| std::env::var("GITLAB_REGISTRY").ok());

        DeployConfig {
            registry: RegistryConfig { root: registry },
            cluster: ClusterConfig {
                name: self.cluster.clone(),
                region: self.region.clone(),
                endpoint: self.endpoint.clone(),
            },
            backend: ServiceConfig {
                service: self.service.clone(),
                container: self.backend_container_name.clone(),
                repository: None,
                tag: self.backend_image_tag.clone(),
            },
            frontend: ServiceConfig {
                service: self.frontend_service.clone(),
                container: self.frontend_container_name.clone(),
                repository: None,
                tag: self.frontend_image_tag.clone(),
            },
            wait: WaitConfig {
                timeout_secs: self.wait_timeout,
                poll_interval_secs: self.poll_interval,
                registration_retries: self.registration_retries,
            },
        }
    }

    fn load_config(&self) -> anyhow::Result<DeployConfig> {
        let file = match &self.config {
            Some(path) => DeployConfig::from_file(path)?,
            None => DeployConfig::default(),
        };
        Ok(file.overlay(self.to_config()))
    }
}

pub async fn deploy(args: DeployArgs) -> anyhow::Result<()> {
    let json = args.output == "json";
    let config = args.load_config()?;

    let resolved = config
        .resolve()
        .map_err(|e| failure(RolloutError::from(e)))?;
    info!(
        region = %resolved.region,
        services = resolved.targets.len(),
        "starting deploy"
    );

    let mut ecs = EcsConfig::new(&resolved.region, Credentials::from_env()?);
    ecs.endpoint = resolved.endpoint.clone();
    let client = EcsClient::new(ecs)?;

    let mut orchestrator =
        Orchestrator::new(client, RolloutPolicy::from_config(&resolved.wait));
    if !json {
        orchestrator = orchestrator.with_observer(print_event);
    }

    match orchestrator.run(&resolved.targets).await {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report);
                println!("✓ Deployment to ECS complete");
            }
            Ok(())
        }
        Err(aborted) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&aborted.report)?);
            }
            log_skipped(&aborted, resolved.targets.len());
            Err(failure(aborted.error))
        }
    }
}

fn print_event(target: &ServiceTarget, event: &RolloutEvent) {
    match event {
        RolloutEvent::Started { image } => {
            println!("Updating {} service {} to {image}", target.role, target.service);
        }
        RolloutEvent::Patched {
            container,
            previous,
        } => println!("  Patched container {container} (was {previous})"),
        RolloutEvent::Registering => println!("  Registering new task definition revision..."),
        RolloutEvent::RegistrationRetry { attempt, reason } => {
            println!("  Registration attempt {attempt} failed ({reason}); retrying")
        }
        RolloutEvent::Registered { revision } => println!("  New task definition: {revision}"),
        RolloutEvent::Updating { .. } => {
            println!("  Updating service to use new task definition...")
        }
        RolloutEvent::Waiting => {
            println!("  Service update requested; waiting for stable status...")
        }
        RolloutEvent::Stable { .. } => println!("✓ {} is stable", target.service),
        RolloutEvent::Failed { reason } => println!("✗ {}: {reason}", target.service),
    }
}

fn print_summary(report: &RolloutReport) {
    for (service, revision) in report.revisions() {
        println!("  {service} → {revision}");
    }
}

fn log_skipped(aborted: &RolloutAborted, planned: usize) {
    let skipped = planned.saturating_sub(aborted.report.services.len());
    if skipped > 0 {
        warn!(skipped, "remaining services not attempted");
    }
}

/// The single error reported for a failed deploy, tagged with its kind.
fn failure(err: RolloutError) -> anyhow::Error {
    let kind = err.kind();
    anyhow::Error::new(err).context(format!("Deploy failed [{kind}]"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: DeployArgs,
    }

    fn parse(argv: &[&str]) -> DeployArgs {
        let mut full = vec!["shipyard"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().args
    }

    #[test]
    fn legacy_flag_aliases_are_accepted() {
        let args = parse(&[
            "--backend-image-tag",
            "v1.2.3",
            "--frontend-image-tag",
            "v1.2.3",
            "--registry",
            "registry.gitlab.com/myorg/linksphere",
            "--ecs-cluster",
            "linksphere-cluster",
            "--ecs-service",
            "backend-service",
            "--frontend-ecs-service",
            "frontend-service",
        ]);

        let resolved = args.to_config().resolve().unwrap();
        assert_eq!(resolved.targets.len(), 2);
        assert_eq!(
            resolved.targets[0].image.to_string(),
            "registry.gitlab.com/myorg/linksphere/linksphere-backend:v1.2.3"
        );
        assert_eq!(resolved.targets[1].service.service, "frontend-service");
        assert_eq!(resolved.targets[1].container, "frontend");
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipyard.toml");
        std::fs::write(
            &path,
            r#"
[registry]
root = "registry.example.com/org"

[cluster]
name = "from-file"
region = "eu-west-1"

[backend]
service = "backend-service"
container = "api"
tag = "0.0.1"

[wait]
timeout_secs = 300
"#,
        )
        .unwrap();

        let args = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--backend-image-tag",
            "1.2.3",
            "--cluster",
            "from-flag",
            "--wait-timeout",
            "900",
        ]);

        let resolved = args.load_config().unwrap().resolve().unwrap();
        let backend = &resolved.targets[0];
        assert_eq!(backend.service.cluster, "from-flag");
        assert_eq!(backend.container, "api");
        assert_eq!(backend.image.tag, "1.2.3");
        assert_eq!(resolved.wait.timeout_secs, Some(900));
    }

    #[test]
    fn missing_service_flag_is_configuration_missing() {
        let args = parse(&[
            "--backend-image-tag",
            "1.2.3",
            "--registry",
            "registry.example.com/org",
            "--cluster",
            "linksphere-cluster",
        ]);
        let err = RolloutError::from(args.to_config().resolve().unwrap_err());
        assert_eq!(err.kind(), "ConfigurationMissing");
    }

    #[test]
    fn failure_names_kind_and_cause_once() {
        let err = failure(RolloutError::RolloutFailed {
            cluster: "linksphere-cluster".to_string(),
            service: "backend-service".to_string(),
            reason: "service is DRAINING".to_string(),
        });

        assert_eq!(err.to_string(), "Deploy failed [RolloutFailed]");
        let chain = format!("{err:#}");
        assert_eq!(chain.matches("service is DRAINING").count(), 1);
        assert!(err.downcast_ref::<RolloutError>().is_some());
    }
}
