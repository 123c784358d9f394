//! Platform API documents shared across the portal crates.
//!
//! Every document that is written back to the platform keeps the fields this
//! workspace does not model in a flattened `extra` map, so a read-modify-write
//! cycle never drops configuration the portal does not understand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Unmodelled JSON members carried through unchanged.
pub type Extra = Map<String, Value>;

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Kind of a component declared in an application spec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Long-running component that can receive HTTP traffic.
    Service,
    /// Long-running background component without ingress.
    Worker,
    /// Run-to-completion component.
    Job,
}

impl ComponentKind {
    /// Partitions in lookup order.
    pub const ALL: [ComponentKind; 3] = [
        ComponentKind::Service,
        ComponentKind::Worker,
        ComponentKind::Job,
    ];

    /// Returns the canonical lowercase representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Service => "service",
            ComponentKind::Worker => "worker",
            ComponentKind::Job => "job",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope returned by `GET /apps/{id}` and `PUT /apps/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppResponse {
    /// The application, when the platform returned one.
    #[serde(default)]
    pub app: Option<App>,
}

/// Envelope returned by `GET /apps`.
///
/// Entries stay raw so a single app the portal cannot decode does not hide
/// the others; callers decode each one into an [`App`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppsResponse {
    /// Application summaries visible to the credential.
    #[serde(default, deserialize_with = "null_as_default")]
    pub apps: Vec<Value>,
}

/// Body of `PUT /apps/{id}`: the full replacement spec.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateAppRequest<'a> {
    /// Complete specification document.
    pub spec: &'a AppSpec,
}

/// Body of `POST /apps/{id}/deployments`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CreateDeploymentRequest {
    /// Rebuild images instead of reusing the last build.
    pub force_build: bool,
}

/// Envelope returned by `POST /apps/{id}/deployments`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeploymentResponse {
    /// The deployment that was created.
    #[serde(default)]
    pub deployment: Option<Deployment>,
}

/// Application as reported by the platform (possibly a partial projection).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct App {
    /// Platform identifier.
    pub id: String,
    /// Declared specification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<AppSpec>,
    /// Current live deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deployment: Option<Deployment>,
    /// Application-level phase, used when the active deployment has none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Region, either a bare slug or a region object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionRef>,
    /// Pricing tier slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_slug: Option<String>,
    /// Public URL of the application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
    /// Public domain of the application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_domain: Option<String>,
    /// Platform-assigned default ingress URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ingress: Option<String>,
    /// Last update of the application record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Last time a deployment became active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployment_active_at: Option<DateTime<Utc>>,
}

impl App {
    /// Whether both the spec and active deployment are present.
    pub fn is_hydrated(&self) -> bool {
        self.spec.is_some() && self.active_deployment.is_some()
    }

    /// Spec name, falling back to the platform id.
    pub fn display_name(&self) -> &str {
        self.spec
            .as_ref()
            .map(|spec| spec.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }

    /// Public URL, preferring the live URL over the default ingress.
    pub fn public_url(&self) -> Option<&str> {
        self.live_url
            .as_deref()
            .or(self.default_ingress.as_deref())
    }
}

/// Region reference; the platform emits either form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RegionRef {
    /// Bare region slug.
    Slug(String),
    /// Region object with a slug.
    Detail(RegionDetail),
}

impl RegionRef {
    /// Returns the region slug regardless of representation.
    pub fn slug(&self) -> &str {
        match self {
            RegionRef::Slug(slug) => slug,
            RegionRef::Detail(detail) => &detail.slug,
        }
    }
}

/// Region object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionDetail {
    /// Region slug.
    pub slug: String,
    /// Other region attributes.
    #[serde(flatten)]
    pub extra: Extra,
}

/// Application specification, replaced wholesale on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppSpec {
    /// Application name.
    #[serde(default)]
    pub name: String,
    /// Service components.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub services: Vec<ComponentSpec>,
    /// Worker components.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub workers: Vec<ComponentSpec>,
    /// Job components.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub jobs: Vec<ComponentSpec>,
    /// Ingress routing rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressSpec>,
    /// Archive and maintenance-mode markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<MaintenanceSpec>,
    /// Fields not modelled here (domains, databases, region, ...).
    #[serde(flatten)]
    pub extra: Extra,
}

impl AppSpec {
    /// Components of one kind.
    pub fn partition(&self, kind: ComponentKind) -> &[ComponentSpec] {
        match kind {
            ComponentKind::Service => &self.services,
            ComponentKind::Worker => &self.workers,
            ComponentKind::Job => &self.jobs,
        }
    }

    /// Mutable access to the components of one kind.
    pub fn partition_mut(&mut self, kind: ComponentKind) -> &mut Vec<ComponentSpec> {
        match kind {
            ComponentKind::Service => &mut self.services,
            ComponentKind::Worker => &mut self.workers,
            ComponentKind::Job => &mut self.jobs,
        }
    }

    /// All components tagged with their kind, services first.
    pub fn components(&self) -> impl Iterator<Item = (ComponentKind, &ComponentSpec)> {
        ComponentKind::ALL
            .into_iter()
            .flat_map(move |kind| self.partition(kind).iter().map(move |c| (kind, c)))
    }

    /// Total number of components across all partitions.
    pub fn component_count(&self) -> usize {
        self.services.len() + self.workers.len() + self.jobs.len()
    }
}

/// One service, worker or job entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ComponentSpec {
    /// Component name, unique within the application.
    #[serde(default)]
    pub name: String,
    /// Repository source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubSource>,
    /// Container image source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSource>,
    /// Dockerfile path for repository builds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile_path: Option<String>,
    /// Source directory for repository builds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<String>,
    /// Number of instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_count: Option<u32>,
    /// Instance size slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_size_slug: Option<String>,
    /// Port the component listens on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_port: Option<u16>,
    /// Routes served by the component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<Route>>,
    /// Environment variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envs: Option<Vec<EnvVar>>,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Extra,
}

/// Repository source of a component.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GithubSource {
    /// `owner/name` repository.
    #[serde(default)]
    pub repo: String,
    /// Branch to build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Redeploy on every push.
    #[serde(default, skip_serializing_if = "is_false")]
    pub deploy_on_push: bool,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Extra,
}

/// Container image source of a component.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ImageSource {
    /// Registry type (`DOCKER_HUB`, `DOCR`, `GHCR`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_type: Option<String>,
    /// Registry name for registries that need one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    /// Image repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Image tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Extra,
}

/// Route served by a component.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Route {
    /// Path prefix.
    #[serde(default)]
    pub path: String,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Extra,
}

impl Route {
    /// Route for a bare path.
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            extra: Extra::new(),
        }
    }
}

/// When an environment variable is available.
///
/// Scopes this crate does not know decode into [`EnvScope::Other`] and are
/// written back verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum EnvScope {
    /// Scope left to the platform.
    Unset,
    /// Available at build time only.
    BuildTime,
    /// Available at run time only.
    #[default]
    RunTime,
    /// Available at build and run time.
    RunAndBuildTime,
    /// Scope value not known to this crate.
    Other(String),
}

impl EnvScope {
    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            EnvScope::Unset => "UNSET",
            EnvScope::BuildTime => "BUILD_TIME",
            EnvScope::RunTime => "RUN_TIME",
            EnvScope::RunAndBuildTime => "RUN_AND_BUILD_TIME",
            EnvScope::Other(raw) => raw,
        }
    }
}

impl From<String> for EnvScope {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "UNSET" => EnvScope::Unset,
            "BUILD_TIME" => EnvScope::BuildTime,
            "RUN_TIME" => EnvScope::RunTime,
            "RUN_AND_BUILD_TIME" => EnvScope::RunAndBuildTime,
            _ => EnvScope::Other(raw),
        }
    }
}

impl From<EnvScope> for String {
    fn from(scope: EnvScope) -> Self {
        match scope {
            EnvScope::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// Environment variable attached to a component.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EnvVar {
    /// Variable name.
    pub key: String,
    /// Variable value (absent for encrypted secrets).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Availability scope.
    #[serde(default)]
    pub scope: EnvScope,
    /// Variable type (`GENERAL`, `SECRET`).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Ingress section of an application spec.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct IngressSpec {
    /// Routing rules.
    #[serde(default, deserialize_with = "null_as_default")]
    pub rules: Vec<IngressRule>,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Extra,
}

/// Rule binding an external path to a component.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct IngressRule {
    /// Match clause (path prefix, authority, ...).
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub matcher: Option<Value>,
    /// Target component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<IngressComponent>,
    /// Fields not modelled here (redirects, cors, ...).
    #[serde(flatten)]
    pub extra: Extra,
}

impl IngressRule {
    /// Name of the component this rule routes to.
    pub fn component_name(&self) -> Option<&str> {
        self.component.as_ref().map(|c| c.name.as_str())
    }
}

/// Component reference inside an ingress rule.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct IngressComponent {
    /// Component name.
    #[serde(default)]
    pub name: String,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Extra,
}

/// Archive and maintenance-mode markers.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MaintenanceSpec {
    /// Maintenance (MX) mode enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Application archived.
    #[serde(default)]
    pub archive: bool,
    /// Fields not modelled here.
    #[serde(flatten)]
    pub extra: Extra,
}

/// Deployment snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Deployment {
    /// Deployment identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Deployment phase (`ACTIVE`, `BUILDING`, `ERROR`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Per-service runtime status.
    #[serde(default, deserialize_with = "null_as_default")]
    pub services: Vec<DeploymentService>,
    /// Progress step tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    /// Spec the deployment was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<AppSpec>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Root progress steps, empty when the deployment has no progress tree.
    pub fn progress_steps(&self) -> &[Option<ProgressStep>] {
        self.progress
            .as_ref()
            .map(|p| p.steps.as_slice())
            .unwrap_or(&[])
    }

    /// Runtime entry for a component name.
    pub fn service(&self, name: &str) -> Option<&DeploymentService> {
        self.services
            .iter()
            .find(|svc| svc.component_name() == Some(name))
    }
}

/// Runtime status of one service inside a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeploymentService {
    /// Component name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Embedded spec, carrying the name on some API versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<NamedRef>,
    /// Runtime status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Health check result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    /// Commit the running build was produced from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_commit_hash: Option<String>,
    /// Instance count reported by the deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_count: Option<u32>,
    /// Instance size reported by the deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_size_slug: Option<String>,
}

impl DeploymentService {
    /// Name of the component, from the entry or its embedded spec.
    pub fn component_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or_else(|| self.spec.as_ref().map(|s| s.name.as_str()))
            .filter(|name| !name.is_empty())
    }

    /// Health check status, when reported.
    pub fn health_status(&self) -> Option<&str> {
        self.health_check.as_ref().and_then(|h| h.status.as_deref())
    }
}

/// Object that only carries a name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NamedRef {
    /// Name.
    #[serde(default)]
    pub name: String,
}

/// Health check result.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HealthCheck {
    /// Status string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Progress section of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Progress {
    /// Root steps; null entries are tolerated.
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<Option<ProgressStep>>,
}

/// Node of the deployment progress tree.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProgressStep {
    /// Step name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Component the step belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_name: Option<String>,
    /// Step status (`PENDING`, `RUNNING`, `SUCCESS`, `ERROR`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Child steps; null entries are tolerated.
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<Option<ProgressStep>>,
}
