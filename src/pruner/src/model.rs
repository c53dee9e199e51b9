//! Core data model shared by both providers.

use chrono::{DateTime, Utc};
use common::Secret;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status recorded when a request never produced an HTTP response.
pub const NETWORK_UNAVAILABLE: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Docker-Hub-style registry with separate catalog and content APIs.
    DockerHub,
    /// GitHub-Packages-style registry exposing package versions.
    GitHub,
}

impl ProviderKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ProviderKind::DockerHub => "dockerhub",
            ProviderKind::GitHub => "github",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Static secret material a provider exchanges for access tokens.
#[derive(Debug, Clone)]
pub enum CredentialSecret {
    UsernamePassword { username: String, password: Secret },
    Token(Secret),
}

/// Immutable per-provider credential. `Debug` never prints the secret.
#[derive(Debug, Clone)]
pub struct RegistryCredential {
    provider: ProviderKind,
    repository: String,
    secret: CredentialSecret,
}

impl RegistryCredential {
    pub fn new(provider: ProviderKind, repository: impl Into<String>, secret: CredentialSecret) -> Self {
        Self {
            provider,
            repository: repository.into(),
            secret,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn secret(&self) -> &CredentialSecret {
        &self.secret
    }
}

/// Short-lived bearer token. Re-acquired on every run.
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: Secret,
    scope: String,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            value: Secret::new(value),
            scope: scope.into(),
        }
    }

    pub fn bearer(&self) -> &str {
        self.value.expose()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

/// One listed tag or package version, decoded once at the provider boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryEntry {
    /// Human tag name.
    pub name: Option<String>,
    /// Top-level manifest digest.
    pub digest: Option<String>,
    /// Digests of per-platform manifests referenced by a multi-arch index.
    pub platform_digests: Vec<String>,
    /// Last update (or creation) instant.
    pub updated_at: Option<DateTime<Utc>>,
    /// Every tag attached to the entry; package versions may carry several.
    pub tags: Vec<String>,
    /// Provider-side identifier for package versions.
    pub version_id: Option<u64>,
}

impl RegistryEntry {
    /// A tag-named entry without a digest or timestamp.
    pub fn tagged(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            tags: vec![name.clone()],
            name: Some(name),
            ..Default::default()
        }
    }

    /// Entries with no name, digest or version id cannot be addressed.
    pub fn is_actionable(&self) -> bool {
        self.name.is_some() || self.digest.is_some() || self.version_id.is_some()
    }

    /// Best identifier for diagnostics.
    pub fn label(&self) -> String {
        match (&self.name, &self.digest, self.version_id) {
            (Some(name), _, _) => name.clone(),
            (None, Some(digest), _) => digest.clone(),
            (None, None, Some(id)) => id.to_string(),
            (None, None, None) => "<unnamed>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Tag,
    Manifest,
    PackageVersion,
    Untagged,
    Repo,
    Script,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Tag => "tag",
            ResourceKind::Manifest => "manifest",
            ResourceKind::PackageVersion => "package-version",
            ResourceKind::Untagged => "untagged",
            ResourceKind::Repo => "repo",
            ResourceKind::Script => "script",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusClass {
    Success,
    Failure,
    Unknown,
}

impl StatusClass {
    /// Classify an HTTP-style status code returned by a delete call.
    ///
    /// 200, 202 and 204 are success. Everything else, including
    /// `NETWORK_UNAVAILABLE`, is failure; 404 only counts as success when
    /// `not_found_is_success` is set.
    pub fn classify(code: u16, not_found_is_success: bool) -> Self {
        match code {
            200 | 202 | 204 => StatusClass::Success,
            404 if not_found_is_success => StatusClass::Success,
            _ => StatusClass::Failure,
        }
    }
}

/// Result of one attempted deletion channel. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletionOutcome {
    pub kind: ResourceKind,
    pub identifier: String,
    pub status: StatusClass,
    pub code: Option<u16>,
    pub message: String,
}

impl DeletionOutcome {
    pub fn success(kind: ResourceKind, identifier: impl Into<String>, code: u16) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            status: StatusClass::Success,
            code: Some(code),
            message: format!("deleted (status {code})"),
        }
    }

    pub fn failure(
        kind: ResourceKind,
        identifier: impl Into<String>,
        code: u16,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            status: StatusClass::Failure,
            code: Some(code),
            message: message.into(),
        }
    }

    /// The attempt's result could not be observed (e.g. the worker panicked).
    pub fn unknown(kind: ResourceKind, identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            status: StatusClass::Unknown,
            code: None,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusClass::Success
    }
}
