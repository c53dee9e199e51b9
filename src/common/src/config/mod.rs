use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use thiserror::Error;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "regprune.toml";

/// Prefix for environment overrides, e.g. `REGPRUNE__FILTER__PREFIX`.
pub const ENV_PREFIX: &str = "REGPRUNE__";

/// Secret material (passwords, tokens). Never rendered in logs.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the underlying value for use on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Prefix and age filter shared by every provider pipeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Only tags starting with this prefix are eligible for deletion.
    ///
    /// Env: REGPRUNE__FILTER__PREFIX
    #[serde(default)]
    pub prefix: Option<String>,

    /// Only entries last updated more than this many days ago are eligible.
    ///
    /// Env: REGPRUNE__FILTER__MAX_AGE_DAYS
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

/// Docker-Hub-style registry (separate catalog and content APIs).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DockerHubConfig {
    /// Repository as `namespace/name`.
    ///
    /// Env: REGPRUNE__DOCKERHUB__REPOSITORY
    #[serde(default)]
    pub repository: Option<String>,

    /// Env: REGPRUNE__DOCKERHUB__USERNAME
    #[serde(default)]
    pub username: Option<String>,

    /// Password or personal access token.
    ///
    /// Env: REGPRUNE__DOCKERHUB__PASSWORD
    #[serde(default)]
    pub password: Option<Secret>,

    /// Catalog API (login, tag listing, tag deletion).
    pub hub_url: String,

    /// Token service for content-scoped tokens.
    pub auth_url: String,

    /// Content API (manifests).
    pub registry_url: String,

    pub page_size: u32,
}

impl Default for DockerHubConfig {
    fn default() -> Self {
        Self {
            repository: None,
            username: None,
            password: None,
            hub_url: "https://hub.docker.com".to_string(),
            auth_url: "https://auth.docker.io".to_string(),
            registry_url: "https://registry-1.docker.io".to_string(),
            page_size: 100,
        }
    }
}

impl DockerHubConfig {
    /// Repository and both halves of the login are present.
    pub fn is_configured(&self) -> bool {
        non_blank(&self.repository)
            && non_blank(&self.username)
            && self.password.as_ref().is_some_and(|p| !p.is_empty())
    }
}

/// GitHub-Packages-style registry (container package versions).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Package as `owner/package`.
    ///
    /// Env: REGPRUNE__GITHUB__REPOSITORY
    #[serde(default)]
    pub repository: Option<String>,

    /// Env: REGPRUNE__GITHUB__TOKEN
    #[serde(default)]
    pub token: Option<Secret>,

    pub api_url: String,

    pub page_size: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            repository: None,
            token: None,
            api_url: "https://api.github.com".to_string(),
            page_size: 100,
        }
    }
}

impl GitHubConfig {
    pub fn is_configured(&self) -> bool {
        non_blank(&self.repository) && self.token.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// What a pipeline-fatal error does to the other provider's pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalPolicy {
    /// Only the failing pipeline stops.
    #[default]
    Isolate,
    /// The first fatal error cancels every other pipeline.
    Abort,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum number of entries processed concurrently per page.
    pub concurrency: usize,

    /// Per-request timeout for every registry call.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(default)]
    pub on_fatal: FatalPolicy,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Treat 404 on delete as an already-removed resource.
    #[serde(default)]
    pub not_found_is_success: bool,

    pub user_agent: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            request_timeout: Duration::from_secs(30),
            on_fatal: FatalPolicy::default(),
            log_format: LogFormat::default(),
            not_found_is_success: false,
            user_agent: concat!("regprune/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub dockerhub: DockerHubConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Configuration {
    /// Load defaults, then `regprune.toml` if present, then `REGPRUNE__*`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Configuration::default()))
                .merge(Toml::file(DEFAULT_CONFIG_FILE))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Load defaults, then the given TOML file, then `REGPRUNE__*`.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.display().to_string()));
        }
        Self::from_figment(
            Figment::from(Serialized::defaults(Configuration::default()))
                .merge(Toml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let mut config: Configuration = figment.extract().map_err(Box::new)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Blank strings from env or files mean "unset".
    fn normalize(&mut self) {
        blank_to_none(&mut self.filter.prefix);
        blank_to_none(&mut self.dockerhub.repository);
        blank_to_none(&mut self.dockerhub.username);
        blank_to_none(&mut self.github.repository);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "runtime.concurrency must be at least 1".to_string(),
            ));
        }

        for (section, page_size) in [
            ("dockerhub", self.dockerhub.page_size),
            ("github", self.github.page_size),
        ] {
            if !(1..=100).contains(&page_size) {
                return Err(ConfigError::Invalid(format!(
                    "{section}.page_size must be between 1 and 100, got {page_size}"
                )));
            }
        }

        for (section, repository) in [
            ("dockerhub", &self.dockerhub.repository),
            ("github", &self.github.repository),
        ] {
            if let Some(repository) = repository
                && !is_two_part(repository)
            {
                return Err(ConfigError::Invalid(format!(
                    "{section}.repository must look like 'owner/name', got '{repository}'"
                )));
            }
        }

        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    MissingFile(String),

    #[error("Failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn blank_to_none(value: &mut Option<String>) {
    if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
        *value = None;
    }
}

fn is_two_part(repository: &str) -> bool {
    match repository.split_once('/') {
        Some((owner, name)) => !owner.is_empty() && !name.is_empty() && !name.contains('/'),
        None => false,
    }
}
