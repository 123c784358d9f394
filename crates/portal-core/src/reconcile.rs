use std::fmt;

use common::api::{App, DeploymentService, MaintenanceSpec};
use serde::{Serialize, Serializer};

pub const ACTIVE_PHASE: &str = "ACTIVE";
pub const SUCCESS_STATUS: &str = "SUCCESS";

/// Archive and maintenance-mode markers of an application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceFlags {
    pub archived: bool,
    pub mx_mode: bool,
}

impl MaintenanceFlags {
    pub fn from_spec(spec: Option<&MaintenanceSpec>) -> Self {
        spec.map(|m| Self {
            archived: m.archive,
            mx_mode: m.enabled,
        })
        .unwrap_or_default()
    }

    /// The app spec's block wins; the active deployment's embedded spec is
    /// only consulted when the app spec has none.
    pub fn for_app(app: &App) -> Self {
        let own = app.spec.as_ref().and_then(|s| s.maintenance.as_ref());
        let deployed = app
            .active_deployment
            .as_ref()
            .and_then(|d| d.spec.as_ref())
            .and_then(|s| s.maintenance.as_ref());
        Self::from_spec(own.or(deployed))
    }
}

/// Phase of the active deployment, falling back to the app's own phase.
pub fn app_phase(app: &App) -> Option<&str> {
    app.active_deployment
        .as_ref()
        .and_then(|d| d.phase.as_deref())
        .or(app.phase.as_deref())
        .filter(|phase| !phase.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Running,
    Archived,
    Mx,
    /// Lowercased deployment phase of a component that is not running.
    Phase(String),
    Unknown,
}

impl ComponentState {
    pub fn as_str(&self) -> &str {
        match self {
            ComponentState::Running => "running",
            ComponentState::Archived => "archived",
            ComponentState::Mx => "mx",
            ComponentState::Phase(phase) => phase,
            ComponentState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ComponentState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciledStatus {
    pub state: ComponentState,
    /// Display status: health, else phase, else `unknown`.
    pub status: String,
    pub health: Option<String>,
    pub running: bool,
}

/// Derive one component's status from the deployment phase, its runtime
/// entry, its progress-tree status and the app's maintenance flags.
///
/// Maintenance flags outrank every live signal: the platform stops reporting
/// health for archived and MX-mode apps.
pub fn reconcile(
    phase: Option<&str>,
    service: Option<&DeploymentService>,
    progress_status: Option<&str>,
    maintenance: MaintenanceFlags,
) -> ReconciledStatus {
    let health = service
        .and_then(|svc| svc.health_status().or(svc.status.as_deref()))
        .or(progress_status)
        .map(str::to_string);

    if maintenance.archived {
        return ReconciledStatus {
            state: ComponentState::Archived,
            status: ComponentState::Archived.to_string(),
            health,
            running: false,
        };
    }
    if maintenance.mx_mode {
        return ReconciledStatus {
            state: ComponentState::Mx,
            status: ComponentState::Mx.to_string(),
            health,
            running: false,
        };
    }

    let running = phase == Some(ACTIVE_PHASE)
        && progress_status.is_none_or(|status| status == SUCCESS_STATUS);

    let state = if running {
        ComponentState::Running
    } else {
        match phase {
            Some(phase) => ComponentState::Phase(phase.to_lowercase()),
            None => ComponentState::Unknown,
        }
    };

    let status = health
        .clone()
        .or_else(|| phase.map(str::to_string))
        .unwrap_or_else(|| ComponentState::Unknown.to_string());

    ReconciledStatus {
        state,
        status,
        health,
        running,
    }
}
