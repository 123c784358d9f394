//! Read-modify-write mutations of an application spec.
//!
//! Every mutation re-reads the spec, edits it locally and writes the whole
//! document back. Concurrent writers are not detected; the last full-document
//! write wins.

use common::api::{
    AppSpec, ComponentKind, ComponentSpec, EnvScope, EnvVar, GithubSource, ImageSource, Route,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    client::PlatformApi,
    error::{PortalError, PortalResult},
    reconcile::MaintenanceFlags,
    telemetry,
};

pub const DEFAULT_INSTANCE_COUNT: u32 = 1;
pub const DEFAULT_INSTANCE_SIZE: &str = "basic-xxs";
pub const DEFAULT_REGISTRY_TYPE: &str = "DOCKER_HUB";
pub const DEFAULT_IMAGE_TAG: &str = "latest";
pub const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct EnvVarInput {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub scope: Option<EnvScope>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl EnvVarInput {
    fn into_env(self) -> EnvVar {
        EnvVar {
            key: self.key,
            value: self.value,
            scope: self.scope.unwrap_or(EnvScope::RunTime),
            kind: self.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewSource {
    Image {
        registry_type: Option<String>,
        repository: String,
        tag: Option<String>,
    },
    Github {
        repo: String,
        branch: Option<String>,
        dockerfile_path: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewComponent {
    pub name: String,
    pub source: NewSource,
    pub instance_count: Option<u32>,
    pub instance_size_slug: Option<String>,
    pub http_port: Option<u16>,
    pub envs: Vec<EnvVarInput>,
}

/// Create payload in the flat form operators submit.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CreateRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// `image` or `github`; inferred from the populated fields when absent.
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub image_registry: Option<String>,
    #[serde(default)]
    pub image_repository: Option<String>,
    #[serde(default)]
    pub image_tag: Option<String>,
    #[serde(default)]
    pub github_repo: Option<String>,
    #[serde(default)]
    pub github_branch: Option<String>,
    #[serde(default)]
    pub dockerfile_path: Option<String>,
    #[serde(default)]
    pub instance_size: Option<String>,
    #[serde(default)]
    pub instance_count: Option<u32>,
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default)]
    pub env_vars: Option<Vec<EnvVarInput>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryFrom<CreateRequest> for NewComponent {
    type Error = PortalError;

    fn try_from(req: CreateRequest) -> Result<Self, Self::Error> {
        let name = non_empty(req.name)
            .ok_or_else(|| PortalError::InvalidRequest("component name is required".into()))?;

        let image_repository = non_empty(req.image_repository);
        let github_repo = non_empty(req.github_repo);
        let source_type = non_empty(req.source_type);

        let use_image = match source_type.as_deref() {
            Some("image") => true,
            Some("github") => false,
            Some(other) => {
                return Err(PortalError::InvalidRequest(format!(
                    "unsupported source type '{other}'"
                )))
            }
            None => match (&image_repository, &github_repo) {
                (Some(_), None) => true,
                (None, Some(_)) => false,
                _ => {
                    return Err(PortalError::InvalidRequest(
                        "exactly one of image_repository or github_repo is required".into(),
                    ))
                }
            },
        };

        let source = if use_image {
            NewSource::Image {
                registry_type: non_empty(req.image_registry),
                repository: image_repository.ok_or_else(|| {
                    PortalError::InvalidRequest("image source requires image_repository".into())
                })?,
                tag: non_empty(req.image_tag),
            }
        } else {
            NewSource::Github {
                repo: github_repo.ok_or_else(|| {
                    PortalError::InvalidRequest("github source requires github_repo".into())
                })?,
                branch: non_empty(req.github_branch),
                dockerfile_path: non_empty(req.dockerfile_path),
            }
        };

        Ok(Self {
            name,
            source,
            instance_count: req.instance_count,
            instance_size_slug: non_empty(req.instance_size),
            http_port: req.http_port,
            envs: req.env_vars.unwrap_or_default(),
        })
    }
}

/// Partial update: absent fields are left untouched.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ComponentPatch {
    #[serde(default)]
    pub instance_count: Option<u32>,
    /// Ignored when empty.
    #[serde(default)]
    pub instance_size_slug: Option<String>,
    /// `null` means "no change", never "clear".
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default)]
    pub routes: Option<Vec<Route>>,
    #[serde(default)]
    pub envs: Option<Vec<EnvVarInput>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create(NewComponent),
    Update {
        component: String,
        patch: ComponentPatch,
    },
    Delete {
        component: String,
    },
}

impl Mutation {
    pub fn label(&self) -> &'static str {
        match self {
            Mutation::Create(_) => "create",
            Mutation::Update { .. } => "update",
            Mutation::Delete { .. } => "delete",
        }
    }

    fn guarded_action(&self) -> &'static str {
        match self {
            Mutation::Create(_) => "create",
            Mutation::Update { .. } => "edit",
            Mutation::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum MutationOutcome {
    Created { component: ComponentSpec },
    Updated { component: ComponentSpec },
    Deleted { component: String },
}

/// Locate a component by name: services, then workers, then jobs.
pub fn find_component(spec: &AppSpec, name: &str) -> Option<(ComponentKind, usize)> {
    ComponentKind::ALL.into_iter().find_map(|kind| {
        spec.partition(kind)
            .iter()
            .position(|c| c.name == name)
            .map(|idx| (kind, idx))
    })
}

pub fn create_component(spec: &mut AppSpec, new: NewComponent) -> PortalResult<ComponentSpec> {
    if find_component(spec, &new.name).is_some() {
        return Err(PortalError::InvalidRequest(format!(
            "component {} already exists",
            new.name
        )));
    }

    let mut component = ComponentSpec {
        name: new.name.clone(),
        instance_count: Some(
            new.instance_count
                .filter(|count| *count > 0)
                .unwrap_or(DEFAULT_INSTANCE_COUNT),
        ),
        instance_size_slug: Some(
            new.instance_size_slug
                .unwrap_or_else(|| DEFAULT_INSTANCE_SIZE.to_string()),
        ),
        ..Default::default()
    };

    match new.source {
        NewSource::Image {
            registry_type,
            repository,
            tag,
        } => {
            component.image = Some(ImageSource {
                registry_type: Some(registry_type.unwrap_or_else(|| DEFAULT_REGISTRY_TYPE.into())),
                repository: Some(repository),
                tag: Some(tag.unwrap_or_else(|| DEFAULT_IMAGE_TAG.into())),
                ..Default::default()
            });
        }
        NewSource::Github {
            repo,
            branch,
            dockerfile_path,
        } => {
            component.github = Some(GithubSource {
                repo,
                branch: Some(branch.unwrap_or_else(|| DEFAULT_BRANCH.into())),
                deploy_on_push: true,
                ..Default::default()
            });
            component.dockerfile_path = dockerfile_path;
        }
    }

    if let Some(port) = new.http_port.filter(|port| *port > 0) {
        component.http_port = Some(port);
        component.routes = Some(vec![Route::path(format!("/{}", new.name))]);
    }

    if !new.envs.is_empty() {
        component.envs = Some(
            new.envs
                .into_iter()
                .map(|ev| EnvVarInput {
                    scope: Some(EnvScope::RunTime),
                    ..ev
                })
                .map(EnvVarInput::into_env)
                .collect(),
        );
    }

    spec.services.push(component.clone());
    Ok(component)
}

/// Apply a patch in place; `None` when no component has that name.
pub fn update_component<'a>(
    spec: &'a mut AppSpec,
    name: &str,
    patch: &ComponentPatch,
) -> Option<&'a ComponentSpec> {
    let (kind, idx) = find_component(spec, name)?;
    let component = &mut spec.partition_mut(kind)[idx];

    if let Some(count) = patch.instance_count {
        component.instance_count = Some(count);
    }
    if let Some(size) = patch.instance_size_slug.as_deref().filter(|s| !s.is_empty()) {
        component.instance_size_slug = Some(size.to_string());
    }
    if let Some(port) = patch.http_port {
        component.http_port = Some(port);
    }
    if let Some(routes) = &patch.routes {
        component.routes = Some(routes.clone());
    }
    if let Some(envs) = &patch.envs {
        component.envs = Some(envs.iter().cloned().map(EnvVarInput::into_env).collect());
    }

    Some(&*component)
}

/// Remove a component from every partition and prune ingress rules that
/// route to it. Returns whether a component was removed.
pub fn delete_component(spec: &mut AppSpec, name: &str) -> bool {
    let before = spec.component_count();
    for kind in ComponentKind::ALL {
        spec.partition_mut(kind).retain(|c| c.name != name);
    }

    if let Some(ingress) = spec.ingress.as_mut() {
        ingress
            .rules
            .retain(|rule| rule.component_name() != Some(name));
    }

    spec.component_count() != before
}

pub async fn apply_mutation(
    api: &dyn PlatformApi,
    app_id: &str,
    mutation: Mutation,
) -> PortalResult<MutationOutcome> {
    let op = mutation.label();
    let result = apply_mutation_inner(api, app_id, mutation).await;
    match &result {
        Ok(_) => telemetry::record_mutation_result(op, "ok"),
        Err(err) => telemetry::record_mutation_result(op, err.code()),
    }
    result
}

async fn apply_mutation_inner(
    api: &dyn PlatformApi,
    app_id: &str,
    mutation: Mutation,
) -> PortalResult<MutationOutcome> {
    let op = mutation.label();
    let app = api.get_app(app_id).await?;

    if MaintenanceFlags::for_app(&app).archived {
        return Err(PortalError::archived(mutation.guarded_action()));
    }

    let mut spec = app
        .spec
        .ok_or_else(|| PortalError::NotFound(format!("app {app_id} has no spec")))?;

    let outcome = match mutation {
        Mutation::Create(new) => MutationOutcome::Created {
            component: create_component(&mut spec, new)?,
        },
        Mutation::Update { component, patch } => {
            let updated = update_component(&mut spec, &component, &patch)
                .cloned()
                .ok_or_else(|| PortalError::component_not_found(&component, app_id))?;
            MutationOutcome::Updated { component: updated }
        }
        Mutation::Delete { component } => {
            if !delete_component(&mut spec, &component) {
                return Err(PortalError::component_not_found(&component, app_id));
            }
            MutationOutcome::Deleted { component }
        }
    };

    api.update_app_spec(app_id, &spec).await?;
    info!(app_id, op, "app spec updated");
    Ok(outcome)
}
