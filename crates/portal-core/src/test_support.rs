use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use common::api::{App, AppSpec, ComponentSpec, Deployment};

use crate::{
    build_client,
    client::PlatformApi,
    config,
    error::{PortalError, PortalResult},
};

pub(crate) static ENV_LOCK: StdMutex<()> = StdMutex::new(());

pub(crate) fn base_config() -> config::AppConfig {
    config::AppConfig {
        api_base: "http://localhost:49431/v2".into(),
        api_token: Some("test-token".into()),
        default_app_id: None,
        request_timeout_secs: 1,
        hydrate_concurrency: 2,
        allow_insecure_http: true,
    }
}

pub(crate) fn component(name: &str) -> ComponentSpec {
    ComponentSpec {
        name: name.into(),
        ..Default::default()
    }
}

/// Fully hydrated app; `phase` becomes the active deployment's phase.
pub(crate) fn app_with_spec(id: &str, spec: AppSpec, phase: Option<&str>) -> App {
    App {
        id: id.into(),
        spec: Some(spec),
        active_deployment: phase.map(|phase| Deployment {
            id: Some(format!("{id}-dep")),
            phase: Some(phase.into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn build_client_sets_user_agent() {
    let cfg = base_config();
    let client = build_client(&cfg).expect("client");
    let server = httpmock::MockServer::start_async().await;

    let mock = server
        .mock_async(|when, then| {
            when.method(httpmock::Method::GET)
                .path("/check")
                .header("user-agent", crate::USER_AGENT);
            then.status(200);
        })
        .await;

    let res = client
        .get(server.url("/check"))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(res.status(), reqwest::StatusCode::OK);
    mock.assert_async().await;
}

#[derive(Clone)]
pub(crate) enum AppReply {
    Ok(App),
    Err(u16, String),
}

impl AppReply {
    fn upstream(status: u16, body: &str) -> PortalError {
        PortalError::Upstream {
            status,
            body: body.to_string(),
        }
    }
}

/// In-memory platform that applies spec writes to its stored apps.
#[derive(Clone, Default)]
pub(crate) struct FakePlatform {
    apps: Arc<StdMutex<HashMap<String, AppReply>>>,
    list: Arc<StdMutex<Vec<App>>>,
    list_failure: Arc<StdMutex<Option<(u16, String)>>>,
    update_failure: Arc<StdMutex<Option<(u16, String)>>>,
    fetched: Arc<StdMutex<Vec<String>>>,
    updates: Arc<StdMutex<Vec<(String, AppSpec)>>>,
    deployments: Arc<StdMutex<Vec<String>>>,
}

impl FakePlatform {
    pub(crate) fn insert_app(&self, app: App) {
        let mut guard = self.apps.lock().expect("lock apps");
        guard.insert(app.id.clone(), AppReply::Ok(app));
    }

    pub(crate) fn fail_app(&self, app_id: &str, status: u16, body: &str) {
        let mut guard = self.apps.lock().expect("lock apps");
        guard.insert(app_id.into(), AppReply::Err(status, body.into()));
    }

    pub(crate) fn set_list(&self, apps: Vec<App>) {
        *self.list.lock().expect("lock list") = apps;
    }

    pub(crate) fn fail_list(&self, status: u16, body: &str) {
        *self.list_failure.lock().expect("lock list") = Some((status, body.into()));
    }

    pub(crate) fn fail_updates(&self, status: u16, body: &str) {
        *self.update_failure.lock().expect("lock updates") = Some((status, body.into()));
    }

    /// App ids passed to `get_app`, in call order.
    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.lock().expect("lock fetched").clone()
    }

    pub(crate) fn updates(&self) -> Vec<(String, AppSpec)> {
        self.updates.lock().expect("lock updates").clone()
    }

    pub(crate) fn deployments(&self) -> Vec<String> {
        self.deployments.lock().expect("lock deployments").clone()
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn get_app(&self, app_id: &str) -> PortalResult<App> {
        self.fetched
            .lock()
            .expect("lock fetched")
            .push(app_id.to_string());
        match self.apps.lock().expect("lock apps").get(app_id) {
            Some(AppReply::Ok(app)) => Ok(app.clone()),
            Some(AppReply::Err(status, body)) => Err(AppReply::upstream(*status, body)),
            None => Err(PortalError::Upstream {
                status: 404,
                body: format!("app {app_id} not found"),
            }),
        }
    }

    async fn list_apps(&self) -> PortalResult<Vec<App>> {
        if let Some((status, body)) = &*self.list_failure.lock().expect("lock list") {
            return Err(AppReply::upstream(*status, body));
        }
        Ok(self.list.lock().expect("lock list").clone())
    }

    async fn update_app_spec(&self, app_id: &str, spec: &AppSpec) -> PortalResult<Option<App>> {
        if let Some((status, body)) = &*self.update_failure.lock().expect("lock updates") {
            return Err(AppReply::upstream(*status, body));
        }
        self.updates
            .lock()
            .expect("lock updates")
            .push((app_id.to_string(), spec.clone()));

        let mut apps = self.apps.lock().expect("lock apps");
        match apps.get_mut(app_id) {
            Some(AppReply::Ok(app)) => {
                app.spec = Some(spec.clone());
                Ok(Some(app.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn create_deployment(
        &self,
        app_id: &str,
        force_build: bool,
    ) -> PortalResult<Option<Deployment>> {
        assert!(!force_build, "redeploys never force a build");
        let mut deployments = self.deployments.lock().expect("lock deployments");
        deployments.push(app_id.to_string());
        Ok(Some(Deployment {
            id: Some(format!("dep-{}", deployments.len())),
            phase: Some("PENDING_BUILD".into()),
            ..Default::default()
        }))
    }
}
