use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub debug_mode: bool,
    pub authentik_url: String,
    pub authentik_api_token: String,
    pub token_secret: String,
    pub group_mapping_path: PathBuf,
    pub trusted_proxy_headers: bool,
    pub makerspace_name: String,
    pub makerspace_logo_url: String,
    pub public_base_url: Option<String>,
    pub identity_cache_ttl: Duration,
}

impl ServiceConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug_mode {
            "debug"
        } else {
            "info"
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: "development".to_string(),
            debug_mode: false,
            authentik_url: String::new(),
            authentik_api_token: String::new(),
            token_secret: String::new(),
            group_mapping_path: PathBuf::from("./config/group_mapping.yaml"),
            trusted_proxy_headers: true,
            makerspace_name: "Sequoia Fabrica".to_string(),
            makerspace_logo_url: "/static/images/logo.png".to_string(),
            public_base_url: None,
            identity_cache_ttl: Duration::from_secs(900),
        }
    }
}

pub fn load_service_config() -> Result<ServiceConfig> {
    let defaults = ServiceConfig::default();

    let host = env::var("HOST")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .unwrap_or(defaults.host);
    let port = env::var("PORT")
        .ok()
        .map(|value| value.trim().parse::<u16>())
        .transpose()
        .context("Failed to parse PORT")?
        .unwrap_or(defaults.port);
    let environment = env::var("ENVIRONMENT")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .unwrap_or(defaults.environment);
    let debug_mode = bool_from_env("DEBUG_MODE").unwrap_or(defaults.debug_mode);

    let authentik_url = required("AUTHENTIK_URL")?;
    let authentik_api_token = required("AUTHENTIK_API_TOKEN")?;
    let token_secret = required("TOKEN_SECRET")?;

    let group_mapping_path = env::var("GROUP_MAPPING_CONFIG")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .map(PathBuf::from)
        .unwrap_or(defaults.group_mapping_path);
    let trusted_proxy_headers =
        bool_from_env("TRUSTED_PROXY_HEADERS").unwrap_or(defaults.trusted_proxy_headers);

    let makerspace_name = env::var("MAKERSPACE_NAME")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .unwrap_or(defaults.makerspace_name);
    let makerspace_logo_url = env::var("MAKERSPACE_LOGO_URL")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .unwrap_or(defaults.makerspace_logo_url);
    let public_base_url = env::var("PUBLIC_BASE_URL")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .map(|value| value.trim_end_matches('/').to_string());

    let identity_cache_ttl = env::var("IDENTITY_CACHE_TTL_SECS")
        .ok()
        .map(|value| value.trim().parse::<u64>())
        .transpose()
        .context("Failed to parse IDENTITY_CACHE_TTL_SECS")?
        .map(Duration::from_secs)
        .unwrap_or(defaults.identity_cache_ttl);

    Ok(ServiceConfig {
        host,
        port,
        environment,
        debug_mode,
        authentik_url,
        authentik_api_token,
        token_secret,
        group_mapping_path,
        trusted_proxy_headers,
        makerspace_name,
        makerspace_logo_url,
        public_base_url,
        identity_cache_ttl,
    })
}

fn required(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .and_then(|value| normalize_optional(&value))
        .ok_or_else(|| anyhow!("{key} environment variable not specified"))
}

fn bool_from_env(key: &str) -> Option<bool> {
    env::var(key).ok().map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
