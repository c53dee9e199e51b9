//! Error taxonomy for the pruning pipelines.
//!
//! `AuthError` and `PaginationError` end a provider's pipeline. Digest and
//! delete failures are recoverable and only ever surface as event records.

use crate::model::{ProviderKind, ResourceKind};
use thiserror::Error;

/// Credential exchange failed. Fatal to that provider's pipeline.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token endpoint {endpoint} unreachable: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Token endpoint {endpoint} rejected credentials with status {status}")]
    Rejected { endpoint: String, status: u16 },

    #[error("Token endpoint {endpoint} returned no usable token")]
    MissingToken { endpoint: String },

    #[error("Credential for {provider} does not carry the secret it needs")]
    WrongSecret { provider: ProviderKind },
}

/// A listing endpoint returned an error or malformed payload. Fatal to that
/// provider's pipeline.
#[derive(Error, Debug)]
pub enum PaginationError {
    #[error("Failed to fetch page {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Listing {url} returned status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Listing {url} returned an error object: {message}")]
    ErrorBody { url: String, message: String },

    #[error("Failed to decode page {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Listing {url} points back to itself as the next page")]
    CursorLoop { url: String },
}

/// A digest could not be derived for a tag. The entry is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Could not resolve digest for tag '{tag}': {reason}")]
pub struct DigestResolutionFailure {
    pub tag: String,
    pub reason: String,
}

/// One deletion channel returned a non-success status. Recorded, never
/// escalated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Deleting {kind} '{identifier}' failed with status {status}: {message}")]
pub struct DeleteFailure {
    pub kind: ResourceKind,
    pub identifier: String,
    pub status: u16,
    pub message: String,
}

/// Why a provider pipeline ended early.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Pagination(#[from] PaginationError),

    #[error("Pipeline aborted after a fatal error in another provider")]
    Aborted,

    #[error("Pipeline task failed: {0}")]
    Join(String),
}

impl PipelineError {
    /// Short label used in event records.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineError::Auth(_) => "auth",
            PipelineError::Pagination(_) => "pagination",
            PipelineError::Aborted => "aborted",
            PipelineError::Join(_) => "join",
        }
    }
}
