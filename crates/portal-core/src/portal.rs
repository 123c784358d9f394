use std::sync::Arc;

use common::api::App;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    client::{DynPlatformApi, PlatformApi, PlatformClient},
    config::AppConfig,
    detail::{self, ComponentDetail},
    error::{PortalError, PortalResult},
    identity::{self, ComponentRef},
    listing::{self, ComponentRecord},
    mutate::{self, ComponentPatch, Mutation, MutationOutcome, NewComponent},
    telemetry,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartOutcome {
    pub app_id: String,
    pub deployment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub api_configured: bool,
    pub app_id_configured: bool,
    pub app_id_preview: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub name: String,
    pub id: String,
}

/// Entry point for the read and mutation paths.
///
/// Without an API token the portal still answers: listings are empty and
/// every other call fails with [`PortalError::Unconfigured`].
#[derive(Clone)]
pub struct Portal {
    api: Option<DynPlatformApi>,
    config: AppConfig,
}

impl Portal {
    pub fn new(config: AppConfig, api: DynPlatformApi) -> Self {
        Self {
            api: Some(api),
            config,
        }
    }

    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        crate::validate_api_base(&config)?;
        let api = match config.api_token() {
            Some(_) => Some(Arc::new(PlatformClient::from_config(&config)?) as DynPlatformApi),
            None => {
                warn!("api token not configured; the portal will list no components");
                None
            }
        };
        Ok(Self { api, config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn api(&self) -> PortalResult<&dyn PlatformApi> {
        self.api
            .as_deref()
            .ok_or(PortalError::Unconfigured("api token"))
    }

    fn resolve(&self, reference: &str) -> PortalResult<ComponentRef> {
        identity::resolve(reference, self.config.default_app_id().unwrap_or_default())
    }

    /// Every component visible to the credential. Never fails: errors are
    /// logged and produce an empty listing.
    pub async fn list_all(&self, app_id: Option<&str>) -> Vec<ComponentRecord> {
        let api = match self.api() {
            Ok(api) => api,
            Err(err) => {
                warn!(error = %err, "listing skipped");
                telemetry::record_listing_result(err.code());
                return Vec::new();
            }
        };

        match listing::list_components(api, &self.config, app_id).await {
            Ok(records) => {
                telemetry::record_listing_result("ok");
                records
            }
            Err(err) => {
                if err.upstream_status() == Some(404) {
                    error!(
                        error = %err,
                        hint = "check that the app id exists and the token can read it",
                        "listing components failed"
                    );
                } else {
                    error!(error = %err, "listing components failed");
                }
                telemetry::record_listing_result(err.code());
                Vec::new()
            }
        }
    }

    pub async fn get_one(&self, reference: &str) -> PortalResult<ComponentDetail> {
        let api = self.api()?;
        let reference = self.resolve(reference)?;
        detail::get_component(api, &reference).await
    }

    /// Add a service to `app_id`, or to the default app when none is given.
    pub async fn create(
        &self,
        app_id: Option<&str>,
        component: NewComponent,
    ) -> PortalResult<MutationOutcome> {
        let api = self.api()?;
        let app_id = app_id
            .filter(|id| !id.is_empty())
            .or(self.config.default_app_id())
            .ok_or_else(|| PortalError::identity(component.name.as_str(), "app id missing"))?;
        mutate::apply_mutation(api, app_id, Mutation::Create(component)).await
    }

    pub async fn update(
        &self,
        reference: &str,
        patch: ComponentPatch,
    ) -> PortalResult<MutationOutcome> {
        let api = self.api()?;
        let ComponentRef { app_id, component } = self.resolve(reference)?;
        mutate::apply_mutation(api, &app_id, Mutation::Update { component, patch }).await
    }

    pub async fn delete(&self, reference: &str) -> PortalResult<MutationOutcome> {
        let api = self.api()?;
        let ComponentRef { app_id, component } = self.resolve(reference)?;
        mutate::apply_mutation(api, &app_id, Mutation::Delete { component }).await
    }

    /// Redeploy the app that owns `reference`. The platform has no
    /// per-component restart, so the component part is ignored.
    pub async fn restart(&self, reference: &str) -> PortalResult<RestartOutcome> {
        let api = self.api()?;
        let ComponentRef { app_id, .. } = self.resolve(reference)?;
        let deployment = api.create_deployment(&app_id, false).await?;
        let deployment_id = deployment.and_then(|d| d.id);
        info!(%app_id, deployment_id = ?deployment_id, "redeploy requested");
        Ok(RestartOutcome {
            app_id,
            deployment_id,
        })
    }

    pub async fn stop(&self, _reference: &str) -> PortalResult<()> {
        Err(PortalError::Unsupported(
            "stop is not supported by the platform; scale to 0 instances instead".into(),
        ))
    }

    pub async fn start(&self, _reference: &str) -> PortalResult<()> {
        Err(PortalError::Unsupported(
            "start is not supported by the platform; scale > 0 instances instead".into(),
        ))
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            api_configured: self.api.is_some(),
            app_id_configured: self.config.default_app_id().is_some(),
            app_id_preview: self.config.masked_app_id(),
        }
    }

    /// Check the credential by reading the default app.
    pub async fn validate(&self) -> PortalResult<ValidationReport> {
        let api = self.api()?;
        let app_id = self
            .config
            .default_app_id()
            .ok_or(PortalError::Unconfigured("default app id"))?;
        let app = api.get_app(app_id).await?;
        Ok(ValidationReport {
            ok: true,
            name: app.display_name().to_string(),
            id: app.id,
        })
    }

    pub async fn list_applications(&self) -> PortalResult<Vec<App>> {
        self.api()?.list_apps().await
    }
}
