use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::api::{
    App, AppResponse, AppSpec, AppsResponse, CreateDeploymentRequest, Deployment,
    DeploymentResponse, UpdateAppRequest,
};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config,
    error::{PortalError, PortalResult},
    telemetry,
};

/// Request/response contract of the platform API.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn get_app(&self, app_id: &str) -> PortalResult<App>;

    /// May return partial projections without spec or active deployment.
    async fn list_apps(&self) -> PortalResult<Vec<App>>;

    /// Full-document replace of the application spec.
    async fn update_app_spec(&self, app_id: &str, spec: &AppSpec) -> PortalResult<Option<App>>;

    async fn create_deployment(
        &self,
        app_id: &str,
        force_build: bool,
    ) -> PortalResult<Option<Deployment>>;
}

pub type DynPlatformApi = Arc<dyn PlatformApi>;

#[derive(Clone)]
pub struct PlatformClient {
    client: Client,
    base: String,
    token: String,
    timeout: Duration,
}

impl PlatformClient {
    pub fn new(
        client: Client,
        base: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base: base.into(),
            token: token.into(),
            timeout,
        }
    }

    pub fn from_config(cfg: &config::AppConfig) -> anyhow::Result<Self> {
        let token = cfg
            .api_token()
            .ok_or_else(|| anyhow::anyhow!("api_token is required to reach the platform API"))?;
        let client = crate::build_client(cfg)?;
        Ok(Self::new(
            client,
            cfg.api_base.clone(),
            token,
            cfg.request_timeout(),
        ))
    }

    /// Append `segments` to the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> PortalResult<Url> {
        let mut url = Url::parse(&self.base).map_err(|err| {
            PortalError::InvalidRequest(format!("invalid api_base {}: {err}", self.base))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                PortalError::InvalidRequest(format!("api_base {} cannot carry a path", self.base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn app_url(&self, app_id: &str, rest: &[&str]) -> PortalResult<Url> {
        if matches!(app_id, "" | "." | "..") || app_id.contains('/') {
            return Err(PortalError::identity(app_id, "app id must be a single path segment"));
        }
        let mut segments = vec!["apps", app_id];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }

    async fn send<T>(&self, operation: &'static str, req: RequestBuilder) -> PortalResult<T>
    where
        T: DeserializeOwned,
    {
        let started = Instant::now();
        let res = req
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                warn!(operation, ?err, "platform request failed");
                let err = PortalError::from_reqwest(operation, err);
                telemetry::record_upstream_request(operation, err.code(), started.elapsed());
                err
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(operation, %status, error = %body, "platform request returned error");
            telemetry::record_upstream_request(operation, "upstream_error", started.elapsed());
            return Err(PortalError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let decoded = res
            .json::<T>()
            .await
            .map_err(|err| PortalError::from_reqwest(operation, err));
        let result = match &decoded {
            Ok(_) => "ok",
            Err(err) => err.code(),
        };
        telemetry::record_upstream_request(operation, result, started.elapsed());
        debug!(operation, %status, elapsed_ms = started.elapsed().as_millis() as u64, "platform request completed");
        decoded
    }
}

/// Decode list entries one at a time, dropping the ones that do not fit.
fn decode_apps(raw: Vec<Value>) -> Vec<App> {
    raw.into_iter()
        .filter_map(|value| {
            let id = value.get("id").and_then(Value::as_str).map(str::to_string);
            match serde_json::from_value::<App>(value) {
                Ok(app) => Some(app),
                Err(err) => {
                    warn!(app_id = ?id, error = %err, "skipping app that could not be decoded");
                    telemetry::record_skipped_app();
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn get_app(&self, app_id: &str) -> PortalResult<App> {
        let req = self.client.get(self.app_url(app_id, &[])?);
        let body: AppResponse = self.send("get_app", req).await?;
        body.app
            .ok_or_else(|| PortalError::NotFound(format!("app {app_id} not found")))
    }

    async fn list_apps(&self) -> PortalResult<Vec<App>> {
        let req = self.client.get(self.url(&["apps"])?);
        let body: AppsResponse = self.send("list_apps", req).await?;
        Ok(decode_apps(body.apps))
    }

    async fn update_app_spec(&self, app_id: &str, spec: &AppSpec) -> PortalResult<Option<App>> {
        let req = self
            .client
            .put(self.app_url(app_id, &[])?)
            .json(&UpdateAppRequest { spec });
        let body: AppResponse = self.send("update_app", req).await?;
        Ok(body.app)
    }

    async fn create_deployment(
        &self,
        app_id: &str,
        force_build: bool,
    ) -> PortalResult<Option<Deployment>> {
        let req = self
            .client
            .post(self.app_url(app_id, &["deployments"])?)
            .json(&CreateDeploymentRequest { force_build });
        let body: DeploymentResponse = self.send("create_deployment", req).await?;
        Ok(body.deployment)
    }
}
