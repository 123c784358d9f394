use std::env;
use std::time::Duration;

use serde::Deserialize;

pub const ENV_PREFIX: &str = "PORTAL";
/// Overrides the config file location (`portal.{toml,json,...}` in the working directory by default).
pub const CONFIG_PATH_ENV: &str = "PORTAL_CONFIG";
pub const DEFAULT_API_BASE: &str = "https://api.digitalocean.com/v2";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api_base: String,
    #[serde(default)]
    pub api_token: Option<String>,
    /// Application used when a reference carries no app id, and as the
    /// listing fallback when bulk listing is denied.
    #[serde(default)]
    pub default_app_id: Option<String>,
    pub request_timeout_secs: u64,
    /// Maximum number of concurrent per-app hydration requests while listing.
    pub hydrate_concurrency: usize,
    pub allow_insecure_http: bool,
}

impl AppConfig {
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    pub fn default_app_id(&self) -> Option<&str> {
        self.default_app_id.as_deref()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `abcdef…wxyz` preview of the default app id, empty when unset.
    pub fn masked_app_id(&self) -> String {
        let Some(id) = self.default_app_id() else {
            return String::new();
        };
        let chars: Vec<char> = id.chars().collect();
        let head: String = chars.iter().take(6).collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("{head}…{tail}")
    }

    fn normalize(&mut self) {
        self.api_base = self.api_base.trim().trim_end_matches('/').to_string();
        self.api_token = trimmed_non_empty(self.api_token.take());
        self.default_app_id = trimmed_non_empty(self.default_app_id.take());
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_base.is_empty() {
            anyhow::bail!("api_base cannot be empty");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be > 0");
        }
        if self.hydrate_concurrency == 0 {
            anyhow::bail!("hydrate_concurrency must be > 0");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            api_token: None,
            default_app_id: None,
            request_timeout_secs: default_request_timeout_secs(),
            hydrate_concurrency: default_hydrate_concurrency(),
            allow_insecure_http: false,
        }
    }
}

fn trimmed_non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_hydrate_concurrency() -> usize {
    4
}

// (ENV_NAME, config_key)
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("PORTAL_API_BASE", "api_base"),
    ("PORTAL_API_TOKEN", "api_token"),
    ("PORTAL_APP_ID", "default_app_id"),
    ("PORTAL_REQUEST_TIMEOUT_SECS", "request_timeout_secs"),
    ("PORTAL_HYDRATE_CONCURRENCY", "hydrate_concurrency"),
    ("PORTAL_ALLOW_INSECURE_HTTP", "allow_insecure_http"),
];

pub fn load() -> anyhow::Result<AppConfig> {
    let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "portal".to_string());
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name(&path).required(false))
        .set_default("api_base", DEFAULT_API_BASE)?
        .set_default("api_token", Option::<String>::None)?
        .set_default("default_app_id", Option::<String>::None)?
        .set_default("request_timeout_secs", default_request_timeout_secs())?
        .set_default("hydrate_concurrency", default_hydrate_concurrency() as u64)?
        .set_default("allow_insecure_http", false)?;

    for (env_key, cfg_key) in ENV_OVERRIDES {
        if let Ok(value) = env::var(env_key) {
            builder = builder.set_override(*cfg_key, value)?;
        }
    }

    let mut app: AppConfig = builder.build()?.try_deserialize()?;
    app.normalize();
    app.validate()?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ENV_LOCK;

    fn clear_env() {
        // SAFETY: Tests hold ENV_LOCK to serialize env mutations.
        unsafe {
            env::remove_var(CONFIG_PATH_ENV);
            for (key, _) in ENV_OVERRIDES {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn load_uses_defaults_without_file_or_env() {
        let _guard = ENV_LOCK.lock().expect("lock");
        clear_env();
        let dir = tempfile::tempdir().expect("tempdir");
        // SAFETY: Tests hold ENV_LOCK to serialize env mutations.
        unsafe {
            env::set_var(CONFIG_PATH_ENV, dir.path().join("missing"));
        }

        let cfg = load().expect("load");
        assert_eq!(cfg.api_base, DEFAULT_API_BASE);
        assert_eq!(cfg.api_token(), None);
        assert_eq!(cfg.default_app_id(), None);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.hydrate_concurrency, 4);
        clear_env();
    }

    #[test]
    fn env_overrides_file_values() {
        let _guard = ENV_LOCK.lock().expect("lock");
        clear_env();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("portal.toml");
        std::fs::write(
            &path,
            "api_base = \"https://platform.example/v2/\"\napi_token = \"file-token\"\ndefault_app_id = \"from-file\"\nrequest_timeout_secs = 12\n",
        )
        .expect("write config");
        // SAFETY: Tests hold ENV_LOCK to serialize env mutations.
        unsafe {
            env::set_var(CONFIG_PATH_ENV, &path);
            env::set_var("PORTAL_APP_ID", "from-env");
            env::set_var("PORTAL_HYDRATE_CONCURRENCY", "8");
        }

        let cfg = load().expect("load");
        assert_eq!(cfg.api_base, "https://platform.example/v2");
        assert_eq!(cfg.api_token(), Some("file-token"));
        assert_eq!(cfg.default_app_id(), Some("from-env"));
        assert_eq!(cfg.request_timeout_secs, 12);
        assert_eq!(cfg.hydrate_concurrency, 8);
        clear_env();
    }

    #[test]
    fn blank_credentials_are_treated_as_absent() {
        let _guard = ENV_LOCK.lock().expect("lock");
        clear_env();
        let dir = tempfile::tempdir().expect("tempdir");
        // SAFETY: Tests hold ENV_LOCK to serialize env mutations.
        unsafe {
            env::set_var(CONFIG_PATH_ENV, dir.path().join("missing"));
            env::set_var("PORTAL_API_TOKEN", "   ");
            env::set_var("PORTAL_APP_ID", "");
        }

        let cfg = load().expect("load");
        assert_eq!(cfg.api_token(), None);
        assert_eq!(cfg.default_app_id(), None);
        clear_env();
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cfg = AppConfig {
            request_timeout_secs: 0,
            ..AppConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn masked_app_id_keeps_head_and_tail() {
        let cfg = AppConfig {
            default_app_id: Some("0123456789abcdef".into()),
            ..AppConfig::default()
        };
        assert_eq!(cfg.masked_app_id(), "012345…cdef");
        assert_eq!(AppConfig::default().masked_app_id(), "");
    }
}
