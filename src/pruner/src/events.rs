//! Provider-agnostic event records and the sinks that receive them.
//!
//! The engine only produces `EventRecord`s. Rendering (text lines, JSON,
//! anything else) belongs to whichever `EventSink` the caller plugs in.

use crate::model::{DeletionOutcome, ProviderKind, ResourceKind, StatusClass};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start,
    Auth,
    DeleteAttempt,
    DeleteSuccess,
    DeleteFailed,
    Skip,
    Pager,
    Finished,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Auth => "auth",
            Action::DeleteAttempt => "delete_attempt",
            Action::DeleteSuccess => "delete_success",
            Action::DeleteFailed => "delete_failed",
            Action::Skip => "skip",
            Action::Pager => "pager",
            Action::Finished => "finished",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notable action taken during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// `None` for run-level (script) events.
    pub provider: Option<ProviderKind>,
    pub repository: String,
    pub action: Action,
    pub resource_kind: ResourceKind,
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EventRecord {
    pub fn new(
        severity: Severity,
        provider: Option<ProviderKind>,
        repository: impl Into<String>,
        action: Action,
        resource_kind: ResourceKind,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            provider,
            repository: repository.into(),
            action,
            resource_kind,
            resource: resource.into(),
            status: None,
            message: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Map a channel outcome onto `delete_success` / `delete_failed`.
    ///
    /// Failures are warnings: they are recorded but never escalated.
    pub fn from_outcome(provider: ProviderKind, repository: &str, outcome: &DeletionOutcome) -> Self {
        let (severity, action) = match outcome.status {
            StatusClass::Success => (Severity::Info, Action::DeleteSuccess),
            StatusClass::Failure | StatusClass::Unknown => (Severity::Warn, Action::DeleteFailed),
        };

        let record = EventRecord::new(
            severity,
            Some(provider),
            repository,
            action,
            outcome.kind,
            outcome.identifier.clone(),
        )
        .with_message(outcome.message.clone());

        match outcome.code {
            Some(code) => record.with_status(code),
            None => record,
        }
    }
}

/// Receives event records. Implementations must not block for long; they are
/// called from worker tasks.
pub trait EventSink: Send + Sync {
    fn emit(&self, record: EventRecord);
}

/// Forwards records to `tracing`, one structured event per record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, record: EventRecord) {
        let provider = record.provider.map(|p| p.tag()).unwrap_or("script");
        let message = record.message.as_deref().unwrap_or("");

        macro_rules! emit_at {
            ($macro:ident) => {
                tracing::$macro!(
                    provider,
                    repository = %record.repository,
                    action = %record.action,
                    resource_kind = %record.resource_kind,
                    resource = %record.resource,
                    status = record.status,
                    "{message}"
                )
            };
        }

        match record.severity {
            Severity::Info => emit_at!(info),
            Severity::Warn => emit_at!(warn),
            Severity::Error => emit_at!(error),
        }
    }
}

/// Collects records in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, in emission order.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn with_action(&self, action: Action) -> Vec<EventRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.action == action)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, record: EventRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
