use std::borrow::Cow;

use chrono::{DateTime, Utc};
use common::api::{App, ComponentKind, ComponentSpec};
use futures_util::{StreamExt, stream};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    client::PlatformApi,
    config::AppConfig,
    error::PortalResult,
    identity::ComponentRef,
    progress,
    reconcile::{self, ComponentState, MaintenanceFlags},
    telemetry,
};

/// One row of the component listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    /// `<appId>:<component>`
    pub id: String,
    pub application_id: String,
    pub application_name: String,
    pub name: String,
    /// `<appName> / <component>`
    pub display_name: String,
    pub kind: ComponentKind,
    pub image: String,
    pub state: ComponentState,
    pub status: String,
    pub health: Option<String>,
    pub running: bool,
    pub archived: bool,
    pub mx_mode: bool,
    pub instances: Option<u32>,
    pub size: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
}

const NO_SOURCE: &str = "N/A";

/// Short description of where a component's code comes from.
pub fn source_descriptor(component: &ComponentSpec) -> String {
    if let Some(github) = component.github.as_ref().filter(|g| !g.repo.is_empty()) {
        let branch = github
            .branch
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(crate::mutate::DEFAULT_BRANCH);
        return format!("{}@{}", github.repo, branch);
    }
    if let Some(image) = component.image.as_ref() {
        if let Some(label) = image
            .repository
            .as_deref()
            .or(image.registry_type.as_deref())
            .filter(|s| !s.is_empty())
        {
            return label.to_string();
        }
    }
    component
        .source_dir
        .clone()
        .filter(|dir| !dir.is_empty())
        .unwrap_or_else(|| NO_SOURCE.to_string())
}

/// Most recent activity timestamp known for an app.
pub fn last_updated(app: &App) -> Option<DateTime<Utc>> {
    app.active_deployment
        .as_ref()
        .and_then(|d| d.updated_at)
        .or(app.updated_at)
        .or(app.last_deployment_active_at)
}

/// Components of an app tagged with their kind. When the spec declares no
/// services, services reported by the active deployment are appended.
fn app_components(app: &App) -> Vec<(ComponentKind, Cow<'_, ComponentSpec>)> {
    let mut components: Vec<_> = app
        .spec
        .iter()
        .flat_map(|spec| spec.components())
        .map(|(kind, c)| (kind, Cow::Borrowed(c)))
        .collect();

    let spec_has_services = app.spec.as_ref().is_some_and(|s| !s.services.is_empty());
    if !spec_has_services {
        let deployed = app.active_deployment.iter().flat_map(|d| d.services.iter());
        for svc in deployed {
            let Some(name) = svc.component_name() else {
                continue;
            };
            components.push((
                ComponentKind::Service,
                Cow::Owned(ComponentSpec {
                    name: name.to_string(),
                    instance_count: svc.instance_count,
                    instance_size_slug: svc.instance_size_slug.clone(),
                    ..Default::default()
                }),
            ));
        }
    }

    components
}

/// Reconcile every component of one (hydrated) app.
pub fn app_records(app: &App) -> Vec<ComponentRecord> {
    let phase = reconcile::app_phase(app);
    let maintenance = MaintenanceFlags::for_app(app);
    let statuses = app
        .active_deployment
        .as_ref()
        .map(|d| progress::flatten(d.progress_steps()))
        .unwrap_or_default();
    let app_name = app.display_name();
    let updated_at = last_updated(app);
    let url = app.public_url().map(str::to_string);

    app_components(app)
        .into_iter()
        .filter(|(_, component)| !component.name.is_empty())
        .map(|(kind, component)| {
            let name = component.name.as_str();
            let service = app.active_deployment.as_ref().and_then(|d| d.service(name));
            let status = reconcile::reconcile(
                phase,
                service,
                statuses.get(name).and_then(|s| s.as_deref()),
                maintenance,
            );

            ComponentRecord {
                id: ComponentRef::new(app.id.as_str(), name).to_string(),
                application_id: app.id.clone(),
                application_name: app_name.to_string(),
                name: name.to_string(),
                display_name: ComponentRef::display_name(app_name, name),
                kind,
                image: source_descriptor(&component),
                state: status.state,
                status: status.status,
                health: status.health,
                running: status.running,
                archived: maintenance.archived,
                mx_mode: maintenance.mx_mode,
                instances: component
                    .instance_count
                    .or_else(|| service.and_then(|s| s.instance_count)),
                size: component
                    .instance_size_slug
                    .clone()
                    .or_else(|| service.and_then(|s| s.instance_size_slug.clone())),
                updated_at,
                url: url.clone(),
            }
        })
        .collect()
}

async fn fetch_apps(
    api: &dyn PlatformApi,
    cfg: &AppConfig,
    app_id: Option<&str>,
) -> PortalResult<Vec<App>> {
    if let Some(app_id) = app_id {
        return Ok(vec![api.get_app(app_id).await?]);
    }

    match api.list_apps().await {
        Ok(apps) => Ok(apps),
        Err(err) => {
            let Some(fallback) = cfg.default_app_id() else {
                return Err(err);
            };
            warn!(
                error = %err,
                app_id = fallback,
                "listing apps failed, falling back to the default app"
            );
            Ok(vec![api.get_app(fallback).await?])
        }
    }
}

/// Fetch and reconcile every component visible to the credential, or the
/// components of a single app when `app_id` is given.
///
/// Apps returned as partial projections are re-fetched with at most
/// `hydrate_concurrency` requests in flight. An app that cannot be hydrated
/// is left out of the result; only the initial fetch can fail the listing.
pub async fn list_components(
    api: &dyn PlatformApi,
    cfg: &AppConfig,
    app_id: Option<&str>,
) -> PortalResult<Vec<ComponentRecord>> {
    let apps = fetch_apps(api, cfg, app_id).await?;
    debug!(apps = apps.len(), "hydrating apps");

    let hydrated: Vec<_> = stream::iter(apps)
        .map(|app| async move {
            if app.is_hydrated() {
                return Ok(app);
            }
            let id = app.id.clone();
            api.get_app(&id).await.map_err(|err| (id, err))
        })
        .buffered(cfg.hydrate_concurrency.max(1))
        .collect()
        .await;

    let mut records = Vec::new();
    for result in hydrated {
        match result {
            Ok(app) => records.extend(app_records(&app)),
            Err((app_id, err)) => {
                warn!(%app_id, error = %err, "skipping app that could not be loaded");
                telemetry::record_skipped_app();
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakePlatform, app_with_spec, base_config, component};
    use common::api::{
        AppSpec, Deployment, DeploymentService, GithubSource, ImageSource, MaintenanceSpec,
    };
    use serde_json::json;

    fn partial(id: &str) -> App {
        App {
            id: id.into(),
            ..Default::default()
        }
    }

    fn single_service_spec(app: &str, service: &str) -> AppSpec {
        AppSpec {
            name: app.into(),
            services: vec![ComponentSpec {
                instance_count: Some(1),
                ..component(service)
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn active_app_without_progress_lists_running_component() {
        let fake = FakePlatform::default();
        fake.insert_app(app_with_spec("A", single_service_spec("A", "web"), Some("ACTIVE")));

        let records = list_components(&fake, &base_config(), Some("A"))
            .await
            .expect("records");

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.application_id, "A");
        assert_eq!(record.name, "web");
        assert_eq!(record.id, "A:web");
        assert_eq!(record.display_name, "A / web");
        assert_eq!(record.state, ComponentState::Running);
        assert!(record.running);
        assert_eq!(record.instances, Some(1));
    }

    #[tokio::test]
    async fn failed_hydration_skips_only_that_app() {
        let fake = FakePlatform::default();
        fake.set_list(vec![partial("a1"), partial("a2"), partial("a3")]);
        fake.insert_app(app_with_spec("a1", single_service_spec("one", "web"), Some("ACTIVE")));
        fake.fail_app("a2", 500, "boom");
        fake.insert_app(app_with_spec("a3", single_service_spec("three", "api"), Some("ACTIVE")));

        let records = list_components(&fake, &base_config(), None)
            .await
            .expect("records");

        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a1:web", "a3:api"]);
    }

    #[tokio::test]
    async fn hydrated_list_entries_are_not_refetched() {
        let fake = FakePlatform::default();
        fake.set_list(vec![app_with_spec(
            "a1",
            single_service_spec("one", "web"),
            Some("ACTIVE"),
        )]);

        let records = list_components(&fake, &base_config(), None)
            .await
            .expect("records");
        assert_eq!(records.len(), 1);
        assert!(fake.fetched().is_empty());
    }

    #[tokio::test]
    async fn denied_listing_falls_back_to_default_app() {
        let fake = FakePlatform::default();
        fake.fail_list(403, "forbidden");
        fake.insert_app(app_with_spec("d1", single_service_spec("dflt", "web"), Some("ACTIVE")));
        let cfg = AppConfig {
            default_app_id: Some("d1".into()),
            ..base_config()
        };

        let records = list_components(&fake, &cfg, None).await.expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].application_name, "dflt");
    }

    #[tokio::test]
    async fn denied_listing_without_fallback_propagates() {
        let fake = FakePlatform::default();
        fake.fail_list(403, "forbidden");

        let err = list_components(&fake, &base_config(), None)
            .await
            .expect_err("should fail");
        assert_eq!(err.upstream_status(), Some(403));
    }

    #[test]
    fn components_cover_all_partitions_and_progress() {
        let mut spec = single_service_spec("shop", "web");
        spec.workers.push(component("queue"));
        spec.jobs.push(component("migrate"));
        let mut app = app_with_spec("a1", spec, Some("ACTIVE"));
        app.active_deployment = Some(
            serde_json::from_value(json!({
                "phase": "ACTIVE",
                "progress": {"steps": [
                    {"name": "deploy", "steps": [
                        {"component_name": "queue", "status": "ERROR"}
                    ]}
                ]}
            }))
            .expect("deployment"),
        );

        let records = app_records(&app);
        let summary: Vec<_> = records
            .iter()
            .map(|r| (r.name.as_str(), r.kind, r.running))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("web", ComponentKind::Service, true),
                ("queue", ComponentKind::Worker, false),
                ("migrate", ComponentKind::Job, true),
            ]
        );
        assert_eq!(records[1].state.as_str(), "active");
        assert_eq!(records[1].health.as_deref(), Some("ERROR"));
    }

    #[test]
    fn status_less_later_step_clears_earlier_error() {
        let mut app = app_with_spec("a1", single_service_spec("shop", "web"), Some("ACTIVE"));
        app.active_deployment = Some(
            serde_json::from_value(json!({
                "phase": "ACTIVE",
                "progress": {"steps": [
                    {"component_name": "web", "status": "ERROR"},
                    {"component_name": "web"}
                ]}
            }))
            .expect("deployment"),
        );

        let records = app_records(&app);
        assert!(records[0].running);
        assert_eq!(records[0].state, ComponentState::Running);
        assert_eq!(records[0].health, None);
    }

    #[test]
    fn deployed_services_fill_in_when_spec_has_none() {
        let mut spec = AppSpec {
            name: "shop".into(),
            ..Default::default()
        };
        spec.workers.push(component("queue"));
        let mut app = app_with_spec("a1", spec, Some("ACTIVE"));
        if let Some(active) = app.active_deployment.as_mut() {
            active.services.push(DeploymentService {
                name: Some("legacy".into()),
                status: Some("RUNNING".into()),
                instance_count: Some(2),
                ..Default::default()
            });
        }

        let records = app_records(&app);
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["queue", "legacy"]);
        assert_eq!(records[1].kind, ComponentKind::Service);
        assert_eq!(records[1].instances, Some(2));
        assert_eq!(records[1].status, "RUNNING");
    }

    #[test]
    fn archived_app_marks_every_record() {
        let mut spec = single_service_spec("shop", "web");
        spec.maintenance = Some(MaintenanceSpec {
            archive: true,
            ..Default::default()
        });
        let records = app_records(&app_with_spec("a1", spec, Some("ACTIVE")));
        assert!(records[0].archived);
        assert_eq!(records[0].state, ComponentState::Archived);
        assert!(!records[0].running);
    }

    #[test]
    fn source_descriptor_prefers_repo_then_image_then_dir() {
        let github = ComponentSpec {
            github: Some(GithubSource {
                repo: "acme/web".into(),
                ..Default::default()
            }),
            ..component("web")
        };
        assert_eq!(source_descriptor(&github), "acme/web@main");

        let image = ComponentSpec {
            image: Some(ImageSource {
                registry_type: Some("DOCR".into()),
                ..Default::default()
            }),
            ..component("web")
        };
        assert_eq!(source_descriptor(&image), "DOCR");

        let dir = ComponentSpec {
            source_dir: Some("services/api".into()),
            ..component("api")
        };
        assert_eq!(source_descriptor(&dir), "services/api");
        assert_eq!(source_descriptor(&component("x")), "N/A");
    }

    #[test]
    fn url_and_timestamp_fall_back_in_order() {
        let mut app = app_with_spec("a1", single_service_spec("shop", "web"), None);
        app.default_ingress = Some("https://shop.ondigitalocean.app".into());
        let at: DateTime<Utc> = "2024-05-01T10:00:00Z".parse().expect("ts");
        app.last_deployment_active_at = Some(at);
        app.active_deployment = Some(Deployment::default());

        let records = app_records(&app);
        assert_eq!(
            records[0].url.as_deref(),
            Some("https://shop.ondigitalocean.app")
        );
        assert_eq!(records[0].updated_at, Some(at));
        assert_eq!(records[0].state, ComponentState::Unknown);
    }

    #[test]
    fn record_serializes_in_camel_case() {
        let records = app_records(&app_with_spec(
            "A",
            single_service_spec("A", "web"),
            Some("ACTIVE"),
        ));
        let value = serde_json::to_value(&records[0]).expect("json");
        assert_eq!(value["applicationId"], "A");
        assert_eq!(value["state"], "running");
        assert_eq!(value["kind"], "service");
        assert_eq!(value["mxMode"], false);
    }
}
