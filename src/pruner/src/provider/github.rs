//! GitHub-Packages-style provider.
//!
//! Container package versions are listed with `Link` header pagination and
//! deleted one version at a time. The supplied token is used directly.

use super::{DeletionChannel, Provider, trim_base};
use crate::dispatch::{self, GITHUB_ACCEPT, GITHUB_API_VERSION, Namespace};
use crate::error::{AuthError, PaginationError};
use crate::filter::{self, FilterCriteria, FilterVerdict};
use crate::http::{self, RegistryHttp};
use crate::model::{
    CredentialSecret, DeletionOutcome, ProviderKind, RegistryCredential, RegistryEntry,
    ResourceKind,
};
use crate::pagination::{Page, PageCursor, PageSource, PaginationStyle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::config::GitHubConfig;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, LINK};
use serde::Deserialize;

#[derive(Debug)]
pub struct GitHubProvider {
    http: RegistryHttp,
    credential: RegistryCredential,
    api_url: String,
    owner: String,
    package: String,
    page_size: u32,
    namespace: Option<Namespace>,
}

#[derive(Debug, Deserialize)]
struct PackageVersion {
    id: u64,
    name: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<VersionMetadata>,
}

#[derive(Debug, Deserialize)]
struct VersionMetadata {
    #[serde(default)]
    container: Option<ContainerMetadata>,
}

#[derive(Debug, Deserialize)]
struct ContainerMetadata {
    #[serde(default)]
    tags: Vec<String>,
}

impl From<PackageVersion> for RegistryEntry {
    fn from(version: PackageVersion) -> Self {
        let tags = version
            .metadata
            .and_then(|m| m.container)
            .map(|c| c.tags)
            .unwrap_or_default();

        RegistryEntry {
            name: tags.first().cloned(),
            digest: version.name.filter(|n| !n.is_empty()),
            platform_digests: Vec::new(),
            updated_at: version.updated_at.or(version.created_at),
            tags,
            version_id: Some(version.id),
        }
    }
}

impl GitHubProvider {
    /// `repository` must be `owner/package`.
    pub fn new(http: RegistryHttp, credential: RegistryCredential, config: &GitHubConfig) -> Self {
        let (owner, package) = credential
            .repository()
            .split_once('/')
            .map(|(o, p)| (o.to_string(), p.to_string()))
            .unwrap_or_else(|| (credential.repository().to_string(), String::new()));

        Self {
            http,
            credential,
            api_url: trim_base(&config.api_url),
            owner,
            package,
            page_size: config.page_size,
            namespace: None,
        }
    }

    pub fn from_config(http: RegistryHttp, config: &GitHubConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }

        let credential = RegistryCredential::new(
            ProviderKind::GitHub,
            config.repository.clone()?,
            CredentialSecret::Token(config.token.clone()?),
        );
        Some(Self::new(http, credential, config))
    }

    /// Namespace chosen during credential acquisition.
    pub fn namespace(&self) -> Option<&Namespace> {
        self.namespace.as_ref()
    }

    fn token(&self) -> Result<&str, AuthError> {
        match self.credential.secret() {
            CredentialSecret::Token(token) if !token.is_empty() => Ok(token.expose()),
            _ => Err(AuthError::WrongSecret {
                provider: ProviderKind::GitHub,
            }),
        }
    }

    fn bearer(&self) -> &str {
        self.token().unwrap_or_default()
    }

    fn versions_url(&self) -> String {
        let namespace = self
            .namespace
            .clone()
            .unwrap_or_else(|| Namespace::User(self.owner.clone()));
        format!(
            "{}/{}/packages/container/{}/versions",
            self.api_url,
            namespace.path(),
            self.package
        )
    }

    fn api_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers
    }
}

#[async_trait]
impl PageSource for GitHubProvider {
    fn style(&self) -> PaginationStyle {
        PaginationStyle::LinkHeader
    }

    async fn fetch_page(&self, url: &str) -> Result<Page, PaginationError> {
        let response = self
            .http
            .client()
            .get(url)
            .bearer_auth(self.bearer())
            .headers(Self::api_headers())
            .send()
            .await
            .map_err(|source| PaginationError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status().as_u16();
        let next = PageCursor::from_link_header(
            response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok()),
        );
        let body = response
            .text()
            .await
            .map_err(|source| PaginationError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !(200..300).contains(&status) {
            return Err(PaginationError::Status {
                url: url.to_string(),
                status,
                message: http::error_message_from_text(&body).unwrap_or(body),
            });
        }

        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|source| PaginationError::Decode {
                url: url.to_string(),
                source,
            })?;

        if !value.is_array() {
            return Err(PaginationError::ErrorBody {
                url: url.to_string(),
                message: http::error_message(&value)
                    .unwrap_or_else(|| "expected a list of package versions".to_string()),
            });
        }

        let versions: Vec<PackageVersion> =
            serde_json::from_value(value).map_err(|source| PaginationError::Decode {
                url: url.to_string(),
                source,
            })?;

        Ok(Page {
            entries: versions.into_iter().map(RegistryEntry::from).collect(),
            next,
        })
    }
}

#[async_trait]
impl Provider for GitHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    fn repository(&self) -> &str {
        self.credential.repository()
    }

    /// The token is used as-is; this step only fixes the namespace.
    async fn acquire_credentials(&mut self) -> Result<(), AuthError> {
        let token = self.token()?;
        let namespace =
            dispatch::probe_namespace(&self.http, &self.api_url, &self.owner, &self.package, token)
                .await;

        tracing::debug!(
            repository = %self.credential.repository(),
            namespace = %namespace,
            "Selected package namespace"
        );
        self.namespace = Some(namespace);
        Ok(())
    }

    fn auth_summary(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("using namespace {namespace}"),
            None => "credentials acquired".to_string(),
        }
    }

    fn first_page_url(&self) -> String {
        format!("{}?per_page={}", self.versions_url(), self.page_size)
    }

    fn entry_kind(&self, entry: &RegistryEntry) -> ResourceKind {
        if entry.tags.is_empty() {
            ResourceKind::Untagged
        } else {
            ResourceKind::PackageVersion
        }
    }

    fn evaluate(&self, entry: &RegistryEntry, criteria: &FilterCriteria) -> FilterVerdict {
        filter::evaluate_package_version(entry, criteria)
    }

    fn channels(&self, entry: &RegistryEntry) -> Vec<DeletionChannel> {
        let Some(id) = entry.version_id else {
            return Vec::new();
        };

        vec![DeletionChannel {
            kind: self.entry_kind(entry),
            identifier: id.to_string(),
            url: format!("{}/{id}", self.versions_url()),
        }]
    }

    async fn delete(&self, channel: &DeletionChannel) -> DeletionOutcome {
        let result = self
            .http
            .delete(
                channel.kind,
                &channel.identifier,
                &channel.url,
                self.bearer(),
                Self::api_headers(),
            )
            .await;

        http::outcome(channel.kind, &channel.identifier, result)
    }
}
