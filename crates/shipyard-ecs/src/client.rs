//! Amazon ECS control plane client.
//!
//! Speaks the ECS JSON 1.1 protocol: every call is a signed `POST /` with
//! the action named in `X-Amz-Target`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shipyard_core::{DeploymentDescriptor, RevisionId, ServiceRef};
use tracing::{debug, info};

use crate::error::{ControlPlaneError, ControlPlaneResult};
use crate::plane::{ControlPlane, ServiceStatus};
use crate::sigv4::{Credentials, RequestSigner};
use crate::waiter::{self, WaitOutcome, WaitPolicy};
use crate::wire::*;

const CONTENT_TYPE_JSON: &str = "application/x-amz-json-1.1";
const SIGNING_SERVICE: &str = "ecs";

/// Connection settings for [`EcsClient`].
#[derive(Debug, Clone)]
pub struct EcsConfig {
    pub region: String,
    /// Defaults to `https://ecs.{region}.amazonaws.com/`.
    pub endpoint: Option<String>,
    pub credentials: Credentials,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl EcsConfig {
    pub fn new(region: &str, credentials: Credentials) -> Self {
        Self {
            region: region.to_string(),
            endpoint: None,
            credentials,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// ECS implementation of [`ControlPlane`].
#[derive(Debug, Clone)]
pub struct EcsClient {
    http: reqwest::Client,
    url: Url,
    host: String,
    signer: RequestSigner,
}

impl EcsClient {
    pub fn new(config: EcsConfig) -> ControlPlaneResult<Self> {
        let endpoint = config
            .endpoint
            .unwrap_or_else(|| format!("https://ecs.{}.amazonaws.com/", config.region));
        let url = Url::parse(&endpoint)
            .map_err(|e| ControlPlaneError::Transport(format!("invalid endpoint {endpoint}: {e}")))?;
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => {
                return Err(ControlPlaneError::Transport(format!(
                    "endpoint has no host: {endpoint}"
                )));
            }
        };

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;

        info!(%url, region = %config.region, "ecs client configured");

        Ok(Self {
            http,
            url,
            host,
            signer: RequestSigner::new(config.credentials, &config.region, SIGNING_SERVICE),
        })
    }

    /// Issue one signed API call.
    async fn call<Req, Resp>(&self, action: &str, request: &Req) -> ControlPlaneResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)
            .map_err(|e| ControlPlaneError::Decode(format!("encoding {action}: {e}")))?;
        let target = format!("{TARGET_PREFIX}.{action}");

        let signed = self.signer.sign(
            "POST",
            self.url.path(),
            &[
                ("content-type", CONTENT_TYPE_JSON),
                ("host", &self.host),
                ("x-amz-target", &target),
            ],
            &body,
            chrono::Utc::now(),
        )?;

        let mut req = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .header("x-amz-target", &target);
        for (name, value) in signed {
            req = req.header(name, value);
        }

        debug!(action, "ecs request");
        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| ControlPlaneError::Transport(format!("{action}: {e}")))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ControlPlaneError::Transport(format!("{action}: {e}")))?;

        if !status.is_success() {
            let err: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
            let code = if err.kind.is_none() && status.is_server_error() {
                "ServerException".to_string()
            } else {
                err.code()
            };
            return Err(ControlPlaneError::Api {
                code,
                message: err
                    .message
                    .unwrap_or_else(|| format!("{action} returned HTTP {status}")),
            });
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ControlPlaneError::Decode(format!("{action} response: {e}")))
    }

    /// Current status of `service`, or `None` if the cluster reports it
    /// missing.
    async fn service_status(&self, service: &ServiceRef) -> ControlPlaneResult<Option<ServiceStatus>> {
        let resp: DescribeServicesResponse = self
            .call(
                "DescribeServices",
                &DescribeServicesRequest {
                    cluster: &service.cluster,
                    services: [&service.service],
                },
            )
            .await
            .map_err(|e| not_found_as(e, service))?;
        Ok(resp.into_status())
    }
}

/// Map cluster/service-not-found API errors to [`ControlPlaneError::ServiceNotFound`].
fn not_found_as(err: ControlPlaneError, service: &ServiceRef) -> ControlPlaneError {
    match err {
        ControlPlaneError::Api { ref code, .. }
            if code == "ServiceNotFoundException" || code == "ClusterNotFoundException" =>
        {
            ControlPlaneError::ServiceNotFound {
                cluster: service.cluster.clone(),
                service: service.service.clone(),
            }
        }
        other => other,
    }
}

/// DescribeTaskDefinition reports unknown revisions as a `ClientException`.
fn descriptor_error(err: ControlPlaneError, revision: &RevisionId) -> ControlPlaneError {
    match err {
        ControlPlaneError::Api { code, message } if code == "ClientException" => {
            ControlPlaneError::DescriptorNotFound {
                revision: revision.to_string(),
                message,
            }
        }
        other => other,
    }
}

#[async_trait]
impl ControlPlane for EcsClient {
    async fn describe_service(&self, service: &ServiceRef) -> ControlPlaneResult<RevisionId> {
        let missing = || ControlPlaneError::ServiceNotFound {
            cluster: service.cluster.clone(),
            service: service.service.clone(),
        };
        let status = self.service_status(service).await?.ok_or_else(missing)?;
        if status.status == "INACTIVE" {
            return Err(missing());
        }
        status
            .revision
            .ok_or_else(|| ControlPlaneError::Decode(format!("service {service} has no task definition")))
    }

    async fn describe_descriptor(
        &self,
        revision: &RevisionId,
    ) -> ControlPlaneResult<DeploymentDescriptor> {
        let resp: DescribeTaskDefinitionResponse = self
            .call(
                "DescribeTaskDefinition",
                &DescribeTaskDefinitionRequest {
                    task_definition: revision.as_str(),
                },
            )
            .await
            .map_err(|e| descriptor_error(e, revision))?;
        Ok(resp.task_definition)
    }

    async fn register_descriptor(
        &self,
        descriptor: &DeploymentDescriptor,
    ) -> ControlPlaneResult<RevisionId> {
        let resp: RegisterTaskDefinitionResponse = self
            .call(
                "RegisterTaskDefinition",
                &RegisterTaskDefinitionRequest::from(descriptor),
            )
            .await?;
        Ok(RevisionId::new(resp.task_definition.task_definition_arn))
    }

    async fn update_service(
        &self,
        service: &ServiceRef,
        revision: &RevisionId,
        force: bool,
    ) -> ControlPlaneResult<()> {
        let _: serde_json::Value = self
            .call(
                "UpdateService",
                &UpdateServiceRequest {
                    cluster: &service.cluster,
                    service: &service.service,
                    task_definition: revision.as_str(),
                    force_new_deployment: force,
                },
            )
            .await
            .map_err(|e| not_found_as(e, service))?;
        Ok(())
    }

    async fn wait_stable(
        &self,
        service: &ServiceRef,
        revision: &RevisionId,
        policy: &WaitPolicy,
    ) -> ControlPlaneResult<WaitOutcome> {
        waiter::wait_until_stable(policy, revision, move || self.service_status(service)).await
    }
}
