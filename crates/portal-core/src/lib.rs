use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::warn;

pub mod client;
pub mod config;
pub mod detail;
pub mod error;
pub mod identity;
pub mod listing;
pub mod mutate;
pub mod portal;
pub mod progress;
pub mod reconcile;
pub mod telemetry;

#[cfg(test)]
pub mod test_support;

pub use error::{PortalError, PortalResult};
pub use portal::Portal;

pub const USER_AGENT: &str = concat!("portal-core/", env!("CARGO_PKG_VERSION"));

pub fn validate_api_base(cfg: &config::AppConfig) -> anyhow::Result<()> {
    let url = reqwest::Url::parse(&cfg.api_base)
        .with_context(|| format!("invalid api_base: {}", cfg.api_base))?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if cfg.allow_insecure_http => {
            warn!(
                api_base = %cfg.api_base,
                "insecure HTTP platform URL in use; the API token travels unencrypted"
            );
            Ok(())
        }
        "http" => anyhow::bail!(
            "insecure api_base not allowed: {}; set allow_insecure_http=true to override",
            cfg.api_base
        ),
        other => anyhow::bail!("unsupported URL scheme: {}", other),
    }
}

pub fn build_client(cfg: &config::AppConfig) -> anyhow::Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_str(USER_AGENT).context("invalid user agent header value")?,
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(cfg.request_timeout())
        .build()
        .map_err(Into::into)
}
