//! Organization-vs-user namespace selection for GitHub-style packages.

use crate::http::RegistryHttp;
use std::fmt;

pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";
pub const GITHUB_API_VERSION: &str = "2022-11-28";

/// Account namespace every listing and deletion URL is built against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Namespace {
    Organization(String),
    User(String),
}

impl Namespace {
    /// Path segment below the API root, e.g. `orgs/acme`.
    pub fn path(&self) -> String {
        match self {
            Namespace::Organization(owner) => format!("orgs/{owner}"),
            Namespace::User(owner) => format!("users/{owner}"),
        }
    }

    pub fn is_organization(&self) -> bool {
        matches!(self, Namespace::Organization(_))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Probe the organization-scoped listing; fall back to the user namespace on
/// any non-success status or transport error.
pub async fn probe_namespace(
    http: &RegistryHttp,
    api_url: &str,
    owner: &str,
    package: &str,
    bearer: &str,
) -> Namespace {
    let organization = Namespace::Organization(owner.to_string());
    let url = format!(
        "{api_url}/{}/packages/container/{package}/versions",
        organization.path()
    );

    let response = http
        .client()
        .get(&url)
        .query(&[("per_page", "1")])
        .bearer_auth(bearer)
        .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
        .header("x-github-api-version", GITHUB_API_VERSION)
        .send()
        .await;

    match response {
        Ok(response) if response.status().is_success() => organization,
        Ok(response) => {
            tracing::debug!(
                owner,
                status = response.status().as_u16(),
                "Organization probe failed, using user namespace"
            );
            Namespace::User(owner.to_string())
        }
        Err(e) => {
            tracing::debug!(owner, error = %e, "Organization probe unreachable, using user namespace");
            Namespace::User(owner.to_string())
        }
    }
}
