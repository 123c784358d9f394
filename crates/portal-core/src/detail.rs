use chrono::{DateTime, Utc};
use common::api::{App, ComponentKind, ComponentSpec, EnvVar, IngressRule, Route};
use serde::Serialize;

use crate::{
    client::PlatformApi,
    error::{PortalError, PortalResult},
    identity::ComponentRef,
    mutate,
    progress::{self, StepEvent},
    reconcile::{self, MaintenanceFlags, SUCCESS_STATUS},
};

#[derive(Debug, Clone, Serialize)]
pub struct ComponentDetail {
    pub app: AppSummary,
    pub component: ComponentView,
    /// Ingress rules routing to this component.
    pub ingress: Vec<IngressRule>,
    pub deployment: Option<DeploymentView>,
    pub status: StatusView,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppSummary {
    pub id: String,
    pub name: String,
    pub region: Option<String>,
    pub tier: Option<String>,
    pub live_url: Option<String>,
    pub live_domain: Option<String>,
    pub default_ingress: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentView {
    pub name: String,
    pub kind: ComponentKind,
    pub instance_count: Option<u32>,
    pub instance_size_slug: Option<String>,
    pub http_port: Option<u16>,
    pub routes: Vec<Route>,
    pub envs: Vec<EnvVar>,
    pub source: SourceView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceView {
    Github {
        repo: String,
        branch: Option<String>,
        deploy_on_push: bool,
        dockerfile_path: Option<String>,
    },
    Image {
        registry_type: Option<String>,
        registry: Option<String>,
        repository: Option<String>,
        tag: Option<String>,
    },
    Unknown,
}

impl SourceView {
    fn of(component: &ComponentSpec) -> Self {
        if let Some(github) = &component.github {
            return SourceView::Github {
                repo: github.repo.clone(),
                branch: github.branch.clone(),
                deploy_on_push: github.deploy_on_push,
                dockerfile_path: component.dockerfile_path.clone(),
            };
        }
        if let Some(image) = &component.image {
            return SourceView::Image {
                registry_type: image.registry_type.clone(),
                registry: image.registry.clone(),
                repository: image.repository.clone(),
                tag: image.tag.clone(),
            };
        }
        SourceView::Unknown
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentView {
    pub id: Option<String>,
    pub phase: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub commit: Option<String>,
    pub events: Vec<StepEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub state: reconcile::ComponentState,
    pub running: bool,
    pub mx_mode: bool,
    pub archived: bool,
    pub health: String,
}

/// Collapse a component's progress events into one status: absent when there
/// are none, `SUCCESS` when all succeeded, else the first unfinished status.
fn events_status(events: &[StepEvent]) -> Option<&str> {
    if events.is_empty() {
        return None;
    }
    events
        .iter()
        .find(|e| e.status.as_deref() != Some(SUCCESS_STATUS))
        .map(|e| e.status.as_deref().or(e.name.as_deref()).unwrap_or("UNKNOWN"))
        .or(Some(SUCCESS_STATUS))
}

fn find_component(app: &App, name: &str) -> Option<(ComponentKind, ComponentSpec)> {
    if let Some(spec) = &app.spec {
        if let Some((kind, idx)) = mutate::find_component(spec, name) {
            return Some((kind, spec.partition(kind)[idx].clone()));
        }
    }
    let svc = app.active_deployment.as_ref()?.service(name)?;
    Some((
        ComponentKind::Service,
        ComponentSpec {
            name: name.to_string(),
            instance_count: svc.instance_count,
            instance_size_slug: svc.instance_size_slug.clone(),
            ..Default::default()
        },
    ))
}

pub fn component_detail(app: &App, name: &str) -> PortalResult<ComponentDetail> {
    let (kind, component) =
        find_component(app, name).ok_or_else(|| PortalError::component_not_found(name, &app.id))?;

    let active = app.active_deployment.as_ref();
    let service = active.and_then(|d| d.service(name));
    let events = active
        .map(|d| progress::component_events(d.progress_steps(), name))
        .unwrap_or_default();
    let maintenance = MaintenanceFlags::for_app(app);
    let reconciled = reconcile::reconcile(
        reconcile::app_phase(app),
        service,
        events_status(&events),
        maintenance,
    );

    let ingress = app
        .spec
        .as_ref()
        .and_then(|s| s.ingress.as_ref())
        .map(|ingress| {
            ingress
                .rules
                .iter()
                .filter(|rule| rule.component_name() == Some(name))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let deployment = active.map(|d| DeploymentView {
        id: d.id.clone(),
        phase: d.phase.clone(),
        created_at: d.created_at,
        updated_at: d.updated_at,
        commit: service.and_then(|s| s.source_commit_hash.clone()),
        events: events.clone(),
    });

    Ok(ComponentDetail {
        app: AppSummary {
            id: app.id.clone(),
            name: app.display_name().to_string(),
            region: app.region.as_ref().map(|r| r.slug().to_string()),
            tier: app.tier_slug.clone(),
            live_url: app.live_url.clone(),
            live_domain: app.live_domain.clone(),
            default_ingress: app.default_ingress.clone(),
        },
        component: ComponentView {
            name: component.name.clone(),
            kind,
            instance_count: component.instance_count,
            instance_size_slug: component.instance_size_slug.clone(),
            http_port: component.http_port,
            routes: component.routes.clone().unwrap_or_default(),
            envs: component.envs.clone().unwrap_or_default(),
            source: SourceView::of(&component),
        },
        ingress,
        deployment,
        status: StatusView {
            state: reconciled.state,
            running: reconciled.running,
            mx_mode: maintenance.mx_mode,
            archived: maintenance.archived,
            health: service
                .and_then(|s| s.health_status().or(s.status.as_deref()))
                .unwrap_or("unknown")
                .to_string(),
        },
    })
}

pub async fn get_component(
    api: &dyn PlatformApi,
    reference: &ComponentRef,
) -> PortalResult<ComponentDetail> {
    let app = api.get_app(&reference.app_id).await?;
    component_detail(&app, &reference.component)
}
