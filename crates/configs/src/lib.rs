//! # Configuration
//!
//! Layered settings for the codeshare client. Later layers win:
//!
//! 1. built-in defaults
//! 2. an optional TOML file named by `CODESHARE_CONFIG`
//! 3. environment variables (`.env` is read first), e.g.
//!    `CODESHARE__SUPABASE__URL=https://xyz.supabase.co`

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

pub const ENV_PREFIX: &str = "CODESHARE";
pub const CONFIG_PATH_VAR: &str = "CODESHARE_CONFIG";
/// Half of the hosted auth service's default one-hour access token lifetime.
pub const MAX_REFRESH_MARGIN_SECS: u64 = 1800;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hosted PostgREST + GoTrue + Storage.
    Rest,
    /// Process-local adapters; nothing leaves the machine.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub supabase: SupabaseConfig,
    pub auth: AuthConfig,
    pub uploads: UploadConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    #[serde(deserialize_with = "secret")]
    pub anon_key: SecretString,
    pub storage_bucket: String,
    pub request_timeout_secs: u64,
}

impl SupabaseConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub oauth_provider: String,
    pub oauth_scopes: String,
    pub redirect_url: String,
    pub auto_refresh: bool,
    pub refresh_margin_secs: u64,
    /// Revoke the session remotely on exit. Remote sign-out also revokes the
    /// user's refresh tokens on every other device.
    pub sign_out_on_exit: bool,
}

impl AuthConfig {
    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// An `EnvFilter` directive; `RUST_LOG` still takes precedence.
    pub log_level: String,
    pub log_format: LogFormat,
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

impl AppConfig {
    /// Reads `.env`, the optional config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);
        let env = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true);
        Self::load_from(file.as_deref(), env)
    }

    pub fn load_from(file: Option<&Path>, env: config::Environment) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("backend", "memory")?
            .set_default("supabase.url", "http://localhost:54321")?
            .set_default("supabase.anon_key", "")?
            .set_default("supabase.storage_bucket", "post-images")?
            .set_default("supabase.request_timeout_secs", 30)?
            .set_default("auth.oauth_provider", "github")?
            .set_default("auth.oauth_scopes", "read:user user:email")?
            .set_default("auth.redirect_url", "http://localhost:5173/auth/callback")?
            .set_default("auth.auto_refresh", true)?
            .set_default("auth.refresh_margin_secs", 60)?
            .set_default("auth.sign_out_on_exit", false)?
            .set_default("uploads.max_bytes", 5 * 1024 * 1024)?
            .set_default("telemetry.log_level", "info")?
            .set_default("telemetry.log_format", "pretty")?;

        if let Some(path) = file {
            tracing::debug!(path = %path.display(), "loading config file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let cfg: AppConfig = builder.add_source(env).build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.supabase.url)
            .map_err(|e| ConfigError::Invalid(format!("supabase.url {:?}: {e}", self.supabase.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!("supabase.url must be http(s), got {}", url.scheme())));
        }
        if self.backend == BackendKind::Rest && self.supabase.anon_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Invalid("supabase.anon_key is required for the rest backend".into()));
        }
        if self.supabase.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("supabase.request_timeout_secs must be positive".into()));
        }
        if self.supabase.storage_bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("supabase.storage_bucket must not be empty".into()));
        }
        if self.auth.refresh_margin_secs > MAX_REFRESH_MARGIN_SECS {
            return Err(ConfigError::Invalid(format!(
                "auth.refresh_margin_secs must be at most {MAX_REFRESH_MARGIN_SECS}, got {}",
                self.auth.refresh_margin_secs
            )));
        }
        if self.uploads.max_bytes == 0 {
            return Err(ConfigError::Invalid("uploads.max_bytes must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(Some(map))
    }

    #[test]
    fn defaults_select_memory_backend() {
        let cfg = AppConfig::load_from(None, env(&[])).unwrap();
        assert_eq!(cfg.backend, BackendKind::Memory);
        assert_eq!(cfg.supabase.storage_bucket, "post-images");
        assert_eq!(cfg.uploads.max_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.auth.refresh_margin(), Duration::from_secs(60));
        assert!(!cfg.auth.sign_out_on_exit);
        assert_eq!(cfg.telemetry.log_format, LogFormat::Pretty);
    }

    #[test]
    fn environment_overrides_defaults() {
        let cfg = AppConfig::load_from(
            None,
            env(&[
                ("CODESHARE__BACKEND", "rest"),
                ("CODESHARE__SUPABASE__URL", "https://abc.supabase.co"),
                ("CODESHARE__SUPABASE__ANON_KEY", "anon-key"),
                ("CODESHARE__SUPABASE__REQUEST_TIMEOUT_SECS", "5"),
                ("CODESHARE__TELEMETRY__LOG_FORMAT", "json"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.backend, BackendKind::Rest);
        assert_eq!(cfg.supabase.anon_key.expose_secret(), "anon-key");
        assert_eq!(cfg.supabase.request_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.telemetry.log_format, LogFormat::Json);
    }

    #[test]
    fn rest_backend_requires_anon_key() {
        let err = AppConfig::load_from(None, env(&[("CODESHARE__BACKEND", "rest")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(m) if m.contains("anon_key")));
    }

    #[test]
    fn rejects_bad_url_and_zero_timeout() {
        let err = AppConfig::load_from(None, env(&[("CODESHARE__SUPABASE__URL", "not a url")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = AppConfig::load_from(None, env(&[("CODESHARE__SUPABASE__REQUEST_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(m) if m.contains("timeout")));
    }

    #[test]
    fn refresh_margin_is_bounded() {
        let err = AppConfig::load_from(None, env(&[("CODESHARE__AUTH__REFRESH_MARGIN_SECS", "7200")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(m) if m.contains("refresh_margin_secs")));

        let max = MAX_REFRESH_MARGIN_SECS.to_string();
        let cfg = AppConfig::load_from(None, env(&[("CODESHARE__AUTH__REFRESH_MARGIN_SECS", max.as_str())])).unwrap();
        assert_eq!(cfg.auth.refresh_margin(), Duration::from_secs(MAX_REFRESH_MARGIN_SECS));
    }

    #[test]
    fn remote_sign_out_on_exit_is_opt_in() {
        let cfg = AppConfig::load_from(None, env(&[("CODESHARE__AUTH__SIGN_OUT_ON_EXIT", "true")])).unwrap();
        assert!(cfg.auth.sign_out_on_exit);
    }

    #[test]
    fn secret_is_redacted_in_debug() {
        let cfg = AppConfig::load_from(None, env(&[("CODESHARE__SUPABASE__ANON_KEY", "top-secret")])).unwrap();
        assert!(!format!("{cfg:?}").contains("top-secret"));
    }
}
