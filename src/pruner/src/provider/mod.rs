//! Provider capability abstraction.
//!
//! The orchestrator is written once against `Provider`; `DockerHubProvider`
//! and `GitHubProvider` are the concrete variants.

pub mod dockerhub;
pub mod github;

use crate::error::{AuthError, DigestResolutionFailure};
use crate::filter::{self, FilterCriteria, FilterVerdict};
use crate::model::{DeletionOutcome, ProviderKind, RegistryEntry, ResourceKind};
use crate::pagination::PageSource;
use async_trait::async_trait;

pub use dockerhub::DockerHubProvider;
pub use github::GitHubProvider;

/// One independent way of deleting (part of) an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionChannel {
    pub kind: ResourceKind,
    pub identifier: String,
    pub url: String,
}

#[async_trait]
pub trait Provider: PageSource {
    fn kind(&self) -> ProviderKind;

    fn repository(&self) -> &str;

    /// Exchange static secrets for the tokens this provider needs.
    ///
    /// Called exactly once, before any listing or deletion.
    async fn acquire_credentials(&mut self) -> Result<(), AuthError>;

    /// Message for the `auth` event once credentials are in place.
    fn auth_summary(&self) -> String {
        "credentials acquired".to_string()
    }

    /// URL of the first listing page.
    fn first_page_url(&self) -> String;

    /// Resource kind reported for the entry as a whole.
    fn entry_kind(&self, entry: &RegistryEntry) -> ResourceKind {
        if entry.name.is_some() {
            ResourceKind::Tag
        } else {
            ResourceKind::Untagged
        }
    }

    fn evaluate(&self, entry: &RegistryEntry, criteria: &FilterCriteria) -> FilterVerdict {
        filter::evaluate(entry, criteria)
    }

    /// Fill in anything the deletion channels need but the listing omitted.
    async fn resolve(&self, entry: RegistryEntry) -> Result<RegistryEntry, DigestResolutionFailure> {
        Ok(entry)
    }

    /// Every applicable deletion channel for a retained entry.
    fn channels(&self, entry: &RegistryEntry) -> Vec<DeletionChannel>;

    async fn delete(&self, channel: &DeletionChannel) -> DeletionOutcome;
}

/// `base` without trailing slashes.
pub(crate) fn trim_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}
