//! Registry pruning engine.
//!
//! Removes stale image references from a Docker-Hub-style registry and a
//! GitHub-Packages-style registry. Each configured provider runs as an
//! independent pipeline:
//!
//! - credentials are exchanged for tokens (`provider`)
//! - listings are paged lazily (`pagination`)
//! - every entry is evaluated against the run's `FilterCriteria` (`filter`)
//! - retained entries fan out to every applicable deletion channel
//!   (`orchestrator`)
//!
//! Outcomes are reported as `EventRecord`s through an `EventSink`; the sink
//! decides how they are rendered.

pub mod dispatch;
pub mod error;
pub mod events;
pub mod filter;
pub mod http;
pub mod model;
pub mod orchestrator;
pub mod pagination;
pub mod provider;
pub mod run;

// Re-export commonly used types
pub use error::{AuthError, DeleteFailure, DigestResolutionFailure, PaginationError, PipelineError};
pub use events::{Action, EventRecord, EventSink, MemorySink, Severity, TracingSink};
pub use filter::{FilterCriteria, FilterVerdict};
pub use model::{
    AccessToken, DeletionOutcome, ProviderKind, RegistryCredential, RegistryEntry, ResourceKind,
    StatusClass,
};
pub use orchestrator::{Orchestrator, RunReport};
pub use run::{RunSummary, run};
