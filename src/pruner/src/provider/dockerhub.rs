//! Docker-Hub-style provider.
//!
//! Tags are listed and deleted through the catalog API with a login token;
//! manifests are resolved and deleted through the content API with a
//! repository-scoped token.

use super::{DeletionChannel, Provider, trim_base};
use crate::error::{AuthError, DigestResolutionFailure, PaginationError};
use crate::http::{self, RegistryHttp};
use crate::model::{
    AccessToken, CredentialSecret, DeletionOutcome, ProviderKind, RegistryCredential,
    RegistryEntry, ResourceKind,
};
use crate::pagination::{Page, PageCursor, PageSource, PaginationStyle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::config::DockerHubConfig;
use reqwest::header::{ACCEPT, HeaderMap};
use serde::Deserialize;

/// Service name the token endpoint issues content tokens for.
pub const CONTENT_SERVICE: &str = "registry.docker.io";

/// Manifest media types accepted when resolving a tag to its digest.
pub const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json";

pub const DIGEST_HEADER: &str = "docker-content-digest";

#[derive(Debug, Clone)]
struct Tokens {
    catalog: AccessToken,
    content: AccessToken,
}

#[derive(Debug)]
pub struct DockerHubProvider {
    http: RegistryHttp,
    credential: RegistryCredential,
    hub_url: String,
    auth_url: String,
    registry_url: String,
    page_size: u32,
    tokens: Option<Tokens>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

impl TokenResponse {
    fn into_token(self) -> Option<String> {
        self.token
            .or(self.access_token)
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct TagPage {
    next: Option<String>,
    results: Vec<HubTag>,
}

#[derive(Debug, Deserialize)]
struct HubTag {
    name: Option<String>,
    digest: Option<String>,
    last_updated: Option<DateTime<Utc>>,
    tag_last_pushed: Option<DateTime<Utc>>,
    #[serde(default)]
    images: Option<Vec<HubImage>>,
}

#[derive(Debug, Deserialize)]
struct HubImage {
    digest: Option<String>,
}

impl From<HubTag> for RegistryEntry {
    fn from(tag: HubTag) -> Self {
        let digest = tag.digest.filter(|d| !d.is_empty());

        let mut platform_digests: Vec<String> = Vec::new();
        for image_digest in tag.images.unwrap_or_default().into_iter().filter_map(|i| i.digest) {
            if image_digest.is_empty()
                || digest.as_deref() == Some(image_digest.as_str())
                || platform_digests.contains(&image_digest)
            {
                continue;
            }
            platform_digests.push(image_digest);
        }

        let name = tag.name.filter(|n| !n.is_empty());
        RegistryEntry {
            tags: name.iter().cloned().collect(),
            name,
            digest,
            platform_digests,
            updated_at: tag.last_updated.or(tag.tag_last_pushed),
            version_id: None,
        }
    }
}

impl DockerHubProvider {
    pub fn new(http: RegistryHttp, credential: RegistryCredential, config: &DockerHubConfig) -> Self {
        Self {
            http,
            credential,
            hub_url: trim_base(&config.hub_url),
            auth_url: trim_base(&config.auth_url),
            registry_url: trim_base(&config.registry_url),
            page_size: config.page_size,
            tokens: None,
        }
    }

    /// Build the provider from configuration, or `None` when unconfigured.
    pub fn from_config(http: RegistryHttp, config: &DockerHubConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }

        let credential = RegistryCredential::new(
            ProviderKind::DockerHub,
            config.repository.clone()?,
            CredentialSecret::UsernamePassword {
                username: config.username.clone()?,
                password: config.password.clone()?,
            },
        );
        Some(Self::new(http, credential, config))
    }

    fn login(&self) -> Result<(&str, &str), AuthError> {
        match self.credential.secret() {
            CredentialSecret::UsernamePassword { username, password } => {
                Ok((username.as_str(), password.expose()))
            }
            CredentialSecret::Token(_) => Err(AuthError::WrongSecret {
                provider: ProviderKind::DockerHub,
            }),
        }
    }

    async fn catalog_token(&self) -> Result<AccessToken, AuthError> {
        let (username, password) = self.login()?;
        let endpoint = format!("{}/v2/users/login", self.hub_url);

        let response = self
            .http
            .client()
            .post(&endpoint)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|source| AuthError::Unreachable {
                endpoint: endpoint.clone(),
                source,
            })?;

        let token = read_token(&endpoint, response).await?;
        Ok(AccessToken::new(token, "catalog"))
    }

    async fn content_token(&self) -> Result<AccessToken, AuthError> {
        let (username, password) = self.login()?;
        let endpoint = format!("{}/token", self.auth_url);
        let scope = format!("repository:{}:pull,push,delete", self.credential.repository());

        let response = self
            .http
            .client()
            .get(&endpoint)
            .query(&[("service", CONTENT_SERVICE), ("scope", scope.as_str())])
            .basic_auth(username, Some(password))
            .send()
            .await
            .map_err(|source| AuthError::Unreachable {
                endpoint: endpoint.clone(),
                source,
            })?;

        let token = read_token(&endpoint, response).await?;
        Ok(AccessToken::new(token, scope))
    }

    fn catalog_bearer(&self) -> &str {
        self.tokens
            .as_ref()
            .map(|t| t.catalog.bearer())
            .unwrap_or_default()
    }

    fn content_bearer(&self) -> &str {
        self.tokens
            .as_ref()
            .map(|t| t.content.bearer())
            .unwrap_or_default()
    }

    fn tag_url(&self, tag: &str) -> String {
        format!(
            "{}/v2/repositories/{}/tags/{tag}/",
            self.hub_url,
            self.credential.repository()
        )
    }

    fn manifest_url(&self, reference: &str) -> String {
        format!(
            "{}/v2/{}/manifests/{reference}",
            self.registry_url,
            self.credential.repository()
        )
    }

    /// Look up a tag's manifest digest with a HEAD request on the content API.
    pub async fn resolve_digest(&self, tag: &str) -> Result<String, DigestResolutionFailure> {
        let failure = |reason: String| DigestResolutionFailure {
            tag: tag.to_string(),
            reason,
        };

        let response = self
            .http
            .client()
            .head(self.manifest_url(tag))
            .bearer_auth(self.content_bearer())
            .header(ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await
            .map_err(|e| failure(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(failure(format!(
                "manifest lookup returned status {}",
                response.status().as_u16()
            )));
        }

        response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|digest| !digest.is_empty())
            .map(str::to_string)
            .ok_or_else(|| failure(format!("response carried no {DIGEST_HEADER} header")))
    }
}

async fn read_token(endpoint: &str, response: reqwest::Response) -> Result<String, AuthError> {
    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::Rejected {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .json::<TokenResponse>()
        .await
        .ok()
        .and_then(TokenResponse::into_token)
        .ok_or_else(|| AuthError::MissingToken {
            endpoint: endpoint.to_string(),
        })
}

#[async_trait]
impl PageSource for DockerHubProvider {
    fn style(&self) -> PaginationStyle {
        PaginationStyle::BodyCursor
    }

    async fn fetch_page(&self, url: &str) -> Result<Page, PaginationError> {
        let response = self
            .http
            .client()
            .get(url)
            .bearer_auth(self.catalog_bearer())
            .send()
            .await
            .map_err(|source| PaginationError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status().as_u16();
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

        if value.get("results").is_none()
            && let Some(message) = http::error_message(&value)
        {
            return Err(PaginationError::ErrorBody {
                url: url.to_string(),
                message,
            });
        }

        let page: TagPage =
            serde_json::from_value(value).map_err(|source| PaginationError::Decode {
                url: url.to_string(),
                source,
            })?;

        Ok(Page {
            entries: page.results.into_iter().map(RegistryEntry::from).collect(),
            next: PageCursor::from_body(page.next),
        })
    }
}

#[async_trait]
impl Provider for DockerHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DockerHub
    }

    fn repository(&self) -> &str {
        self.credential.repository()
    }

    async fn acquire_credentials(&mut self) -> Result<(), AuthError> {
        let catalog = self.catalog_token().await?;
        let content = self.content_token().await?;
        tracing::debug!(
            repository = %self.credential.repository(),
            content_scope = %content.scope(),
            "Acquired catalog and content tokens"
        );
        self.tokens = Some(Tokens { catalog, content });
        Ok(())
    }

    fn first_page_url(&self) -> String {
        format!(
            "{}/v2/repositories/{}/tags?page_size={}",
            self.hub_url,
            self.credential.repository(),
            self.page_size
        )
    }

    async fn resolve(&self, mut entry: RegistryEntry) -> Result<RegistryEntry, DigestResolutionFailure> {
        if entry.digest.is_some() {
            return Ok(entry);
        }

        let Some(tag) = entry.name.as_deref() else {
            return Err(DigestResolutionFailure {
                tag: entry.label(),
                reason: "entry has no tag to resolve".to_string(),
            });
        };

        let digest = self.resolve_digest(tag).await?;
        entry.platform_digests.retain(|d| d != &digest);
        entry.digest = Some(digest);
        Ok(entry)
    }

    fn channels(&self, entry: &RegistryEntry) -> Vec<DeletionChannel> {
        let mut channels = Vec::with_capacity(2 + entry.platform_digests.len());

        if let Some(name) = &entry.name {
            channels.push(DeletionChannel {
                kind: ResourceKind::Tag,
                identifier: name.clone(),
                url: self.tag_url(name),
            });
        }

        for digest in entry.digest.iter().chain(entry.platform_digests.iter()) {
            channels.push(DeletionChannel {
                kind: ResourceKind::Manifest,
                identifier: digest.clone(),
                url: self.manifest_url(digest),
            });
        }

        channels
    }

    async fn delete(&self, channel: &DeletionChannel) -> DeletionOutcome {
        let bearer = match channel.kind {
            ResourceKind::Tag => self.catalog_bearer(),
            _ => self.content_bearer(),
        };

        let result = self
            .http
            .delete(
                channel.kind,
                &channel.identifier,
                &channel.url,
                bearer,
                HeaderMap::new(),
            )
            .await;

        http::outcome(channel.kind, &channel.identifier, result)
    }
}
