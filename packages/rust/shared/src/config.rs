//! Application configuration for accessreport.
//!
//! User config lives at `~/.accessreport/accessreport.toml`.
//! CLI flags override environment variables, which override config file
//! values, which override defaults. API tokens are only ever read from the
//! environment, by the variable names the config file names.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AccessReportError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "accessreport.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".accessreport";

/// Environment variables consulted as overrides.
pub const ENV_BASE_URL: &str = "ATLASSIAN_BASE_URL";
pub const ENV_USER_EMAIL: &str = "ATLASSIAN_USER_EMAIL";
pub const ENV_ORG_ID: &str = "ORG_ID";

// ---------------------------------------------------------------------------
// Config structs (matching accessreport.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Site (Jira / Confluence) connection.
    #[serde(default)]
    pub site: SiteConfig,

    /// Organization admin API connection.
    #[serde(default)]
    pub admin: AdminConfig,

    /// HTTP client behaviour.
    #[serde(default)]
    pub http: HttpConfig,

    /// Output settings.
    #[serde(default)]
    pub export: ExportConfig,
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site base URL, e.g. `https://example.atlassian.net`.
    #[serde(default)]
    pub base_url: String,

    /// Account email used for basic auth.
    #[serde(default)]
    pub user_email: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_site_token_env")]
    pub api_token_env: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user_email: String::new(),
            api_token_env: default_site_token_env(),
        }
    }
}

fn default_site_token_env() -> String {
    "ATLASSIAN_API_TOKEN".into()
}

/// `[admin]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Admin API base URL.
    #[serde(default = "default_admin_base_url")]
    pub base_url: String,

    /// Organization identifier.
    #[serde(default)]
    pub org_id: String,

    /// Name of the env var holding the organization API key.
    #[serde(default = "default_admin_token_env")]
    pub api_token_env: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            base_url: default_admin_base_url(),
            org_id: String::new(),
            api_token_env: default_admin_token_env(),
        }
    }
}

fn default_admin_base_url() -> String {
    "https://api.atlassian.com".into()
}
fn default_admin_token_env() -> String {
    "ORG_API_TOKEN".into()
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum users enriched concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Retries for 5xx responses and transport failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each further attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_concurrency() -> u32 {
    8
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    250
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory the CSV file is written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Last-active scope: `product`, `all`, or an explicit product key.
    #[serde(default = "default_last_active_scope")]
    pub last_active_scope: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            last_active_scope: default_last_active_scope(),
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}
fn default_last_active_scope() -> String {
    "product".into()
}

// ---------------------------------------------------------------------------
// Runtime settings (resolved once per run, immutable afterwards)
// ---------------------------------------------------------------------------

/// Values supplied on the command line. `None` falls through to env/file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub user_email: Option<String>,
    pub org_id: Option<String>,
    pub output_dir: Option<String>,
    pub last_active_scope: Option<String>,
}

/// Basic-auth credentials for the site APIs.
#[derive(Clone)]
pub struct SiteCredentials {
    pub base_url: Url,
    pub user_email: String,
    pub api_token: String,
}

impl std::fmt::Debug for SiteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteCredentials")
            .field("base_url", &self.base_url.as_str())
            .field("user_email", &self.user_email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Bearer credentials for the organization admin API.
#[derive(Clone)]
pub struct AdminCredentials {
    pub base_url: Url,
    pub org_id: String,
    pub api_token: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("base_url", &self.base_url.as_str())
            .field("org_id", &self.org_id)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// HTTP behaviour for the run.
#[derive(Debug, Clone)]
pub struct HttpPolicy {
    pub timeout: Duration,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for HttpPolicy {
    fn default() -> Self {
        HttpPolicy::from(&HttpConfig::default())
    }
}

impl From<&HttpConfig> for HttpPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            concurrency: config.concurrency.max(1) as usize,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Fully resolved configuration for one export run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub site: SiteCredentials,
    /// Present only when an org id and admin token are both available.
    pub admin: Option<AdminCredentials>,
    pub http: HttpPolicy,
    pub output_dir: PathBuf,
    /// Raw last-active scope setting, interpreted per variant.
    pub last_active_scope: String,
}

impl Settings {
    /// Resolve settings from the file config, CLI overrides, and the process
    /// environment.
    pub fn from_env(config: &AppConfig, overrides: &Overrides) -> Result<Self> {
        Self::resolve(config, overrides, |name| std::env::var(name).ok())
    }

    /// Resolve settings with an explicit environment lookup.
    pub fn resolve(
        config: &AppConfig,
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let pick = |flag: &Option<String>, var: &str, file: &str| -> Option<String> {
            flag.clone()
                .or_else(|| env(var))
                .or_else(|| Some(file.to_string()))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let base_url = pick(&overrides.base_url, ENV_BASE_URL, &config.site.base_url)
            .ok_or_else(|| {
                AccessReportError::config(format!(
                    "site base URL not set. Use --base-url, {ENV_BASE_URL}, or [site].base_url"
                ))
            })?;
        let base_url = parse_base_url(&base_url)?;

        let user_email = pick(&overrides.user_email, ENV_USER_EMAIL, &config.site.user_email)
            .ok_or_else(|| {
                AccessReportError::config(format!(
                    "site user email not set. Use --user-email, {ENV_USER_EMAIL}, or [site].user_email"
                ))
            })?;

        let token_var = &config.site.api_token_env;
        let api_token = env(token_var).filter(|t| !t.is_empty()).ok_or_else(|| {
            AccessReportError::config(format!(
                "site API token not found. Set the {token_var} environment variable."
            ))
        })?;

        let admin = match (
            pick(&overrides.org_id, ENV_ORG_ID, &config.admin.org_id),
            env(&config.admin.api_token_env).filter(|t| !t.is_empty()),
        ) {
            (Some(org_id), Some(api_token)) => Some(AdminCredentials {
                base_url: parse_base_url(&config.admin.base_url)?,
                org_id,
                api_token,
            }),
            _ => None,
        };

        let output_dir = overrides
            .output_dir
            .clone()
            .unwrap_or_else(|| config.export.output_dir.clone());

        let last_active_scope = overrides
            .last_active_scope
            .clone()
            .unwrap_or_else(|| config.export.last_active_scope.clone());

        Ok(Self {
            site: SiteCredentials {
                base_url,
                user_email,
                api_token,
            },
            admin,
            http: HttpPolicy::from(&config.http),
            output_dir: PathBuf::from(output_dir),
            last_active_scope,
        })
    }

    /// Admin credentials, or a config error naming what is missing.
    pub fn require_admin(&self, config: &AppConfig) -> Result<&AdminCredentials> {
        self.admin.as_ref().ok_or_else(|| {
            AccessReportError::config(format!(
                "last-active lookup needs an organization id ({ENV_ORG_ID} or [admin].org_id) \
                 and the {} environment variable",
                config.admin.api_token_env
            ))
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|e| AccessReportError::config(format!("invalid base URL '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AccessReportError::config(format!(
            "base URL '{raw}' must use http or https"
        )));
    }
    Ok(url)
}

/// Check a Jira project key (`PROJ`, `AB_2`, ...).
pub fn validate_project_key(key: &str) -> Result<()> {
    static PROJECT_KEY: OnceLock<Regex> = OnceLock::new();
    let re = PROJECT_KEY
        .get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9_]+$").expect("project key regex is valid"));
    if re.is_match(key) {
        Ok(())
    } else {
        Err(AccessReportError::validation(format!(
            "'{key}' is not a valid project key (expected e.g. PROJ or AB_2)"
        )))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.accessreport/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AccessReportError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.accessreport/accessreport.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AccessReportError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        AccessReportError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AccessReportError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(AccessReportError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AccessReportError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AccessReportError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_millis(250)), 250);
        assert_eq!(millis(Duration::from_micros(1_999)), 1);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn site_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.site.base_url = "https://example.atlassian.net/".into();
        config.site.user_email = "admin@example.com".into();
        config
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("ATLASSIAN_API_TOKEN"));
        assert!(toml_str.contains("ORG_API_TOKEN"));
        assert!(toml_str.contains("https://api.atlassian.com"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.http.concurrency, 8);
        assert_eq!(parsed.http.max_retries, 2);
        assert_eq!(parsed.export.last_active_scope, "product");
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml_str = r#"
[site]
base_url = "https://acme.atlassian.net"
user_email = "ops@acme.test"

[http]
concurrency = 2
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.site.api_token_env, "ATLASSIAN_API_TOKEN");
        assert_eq!(config.http.concurrency, 2);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.export.output_dir, ".");
    }

    #[test]
    fn resolve_from_file_and_env() {
        let settings = Settings::resolve(
            &site_config(),
            &Overrides::default(),
            env_of(&[("ATLASSIAN_API_TOKEN", "tok"), ("ORG_API_TOKEN", "org-tok"), ("ORG_ID", "org-1")]),
        )
        .expect("resolve");

        assert_eq!(settings.site.base_url.as_str(), "https://example.atlassian.net/");
        assert_eq!(settings.site.api_token, "tok");
        let admin = settings.admin.expect("admin credentials");
        assert_eq!(admin.org_id, "org-1");
        assert_eq!(admin.base_url.as_str(), "https://api.atlassian.com/");
        assert_eq!(settings.http.concurrency, 8);
    }

    #[test]
    fn flags_beat_env_beat_file() {
        let overrides = Overrides {
            user_email: Some("flag@example.com".into()),
            ..Default::default()
        };
        let settings = Settings::resolve(
            &site_config(),
            &overrides,
            env_of(&[
                ("ATLASSIAN_API_TOKEN", "tok"),
                ("ATLASSIAN_BASE_URL", "https://env.atlassian.net"),
                ("ATLASSIAN_USER_EMAIL", "env@example.com"),
            ]),
        )
        .expect("resolve");

        assert_eq!(settings.site.base_url.host_str(), Some("env.atlassian.net"));
        assert_eq!(settings.site.user_email, "flag@example.com");
        assert!(settings.admin.is_none());
    }

    #[test]
    fn missing_token_is_config_error() {
        let err = Settings::resolve(&site_config(), &Overrides::default(), env_of(&[]))
            .expect_err("token required");
        assert!(err.to_string().contains("ATLASSIAN_API_TOKEN"));
    }

    #[test]
    fn missing_base_url_is_config_error() {
        let err = Settings::resolve(
            &AppConfig::default(),
            &Overrides::default(),
            env_of(&[("ATLASSIAN_API_TOKEN", "tok")]),
        )
        .expect_err("base url required");
        assert!(matches!(err, AccessReportError::Config { .. }));
    }

    #[test]
    fn require_admin_reports_missing_org() {
        let config = site_config();
        let settings = Settings::resolve(
            &config,
            &Overrides::default(),
            env_of(&[("ATLASSIAN_API_TOKEN", "tok")]),
        )
        .expect("resolve");
        let err = settings.require_admin(&config).expect_err("admin missing");
        assert!(err.to_string().contains("ORG_API_TOKEN"));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let settings = Settings::resolve(
            &site_config(),
            &Overrides::default(),
            env_of(&[("ATLASSIAN_API_TOKEN", "super-secret")]),
        )
        .expect("resolve");
        let debug = format!("{settings:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn project_key_validation() {
        assert!(validate_project_key("PROJ").is_ok());
        assert!(validate_project_key("AB_2").is_ok());
        assert!(validate_project_key("proj").is_err());
        assert!(validate_project_key("P").is_err());
        assert!(validate_project_key("PR OJ").is_err());
    }
}
