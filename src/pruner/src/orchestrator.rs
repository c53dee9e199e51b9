//! Deletion orchestration for one provider pipeline.
//!
//! Pages are fetched in sequence. Within a page, entries are processed by a
//! bounded set of worker tasks; each retained entry attempts every
//! applicable deletion channel regardless of earlier channel failures. A
//! page is complete only once every entry's outcomes are recorded.

use crate::error::PipelineError;
use crate::events::{Action, EventRecord, EventSink, Severity};
use crate::filter::FilterCriteria;
use crate::model::{DeletionOutcome, ProviderKind, RegistryEntry, ResourceKind, StatusClass};
use crate::pagination::paginate;
use crate::provider::Provider;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Summary of one provider pipeline run.
#[derive(Debug)]
pub struct RunReport {
    pub provider: ProviderKind,
    pub repository: String,
    pub pages: usize,
    pub entries_seen: usize,
    pub selected: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unknown: usize,
    /// Set when the pipeline ended early.
    pub fatal: Option<PipelineError>,
}

impl RunReport {
    pub fn new(provider: ProviderKind, repository: impl Into<String>) -> Self {
        Self {
            provider,
            repository: repository.into(),
            pages: 0,
            entries_seen: 0,
            selected: 0,
            skipped: 0,
            succeeded: 0,
            failed: 0,
            unknown: 0,
            fatal: None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn outcomes(&self) -> usize {
        self.succeeded + self.failed + self.unknown
    }

    fn record(&mut self, outcome: &DeletionOutcome) {
        match outcome.status {
            StatusClass::Success => self.succeeded += 1,
            StatusClass::Failure => self.failed += 1,
            StatusClass::Unknown => self.unknown += 1,
        }
    }

    /// Human-readable representation for logging.
    pub fn display(&self) -> String {
        format!(
            "pages={}, seen={}, selected={}, skipped={}, deleted={}, failed={}, unknown={}",
            self.pages,
            self.entries_seen,
            self.selected,
            self.skipped,
            self.succeeded,
            self.failed,
            self.unknown
        )
    }
}

enum EntryResult {
    Skipped,
    Handled(Vec<DeletionOutcome>),
}

/// Entry workers of one page. Workers still running when the batch is
/// dropped, e.g. because the pipeline task was aborted, are aborted too.
struct EntryWorkers(Vec<(ResourceKind, String, JoinHandle<EntryResult>)>);

impl Drop for EntryWorkers {
    fn drop(&mut self) {
        for (_, _, handle) in &self.0 {
            handle.abort();
        }
    }
}

/// Applies the filter policy and fans retained entries out to their
/// deletion channels. Written once against `Provider`.
#[derive(Clone)]
pub struct Orchestrator {
    criteria: Arc<FilterCriteria>,
    sink: Arc<dyn EventSink>,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(criteria: FilterCriteria, sink: Arc<dyn EventSink>, concurrency: usize) -> Self {
        Self {
            criteria: Arc::new(criteria),
            sink,
            concurrency: concurrency.max(1),
        }
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Run the full pipeline for one provider.
    ///
    /// Authentication and pagination failures end the pipeline and are
    /// returned in `RunReport::fatal`; everything else is recorded as events.
    pub async fn run<P>(&self, mut provider: P) -> RunReport
    where
        P: Provider + 'static,
    {
        let kind = provider.kind();
        let repository = provider.repository().to_string();
        let mut report = RunReport::new(kind, &repository);

        self.emit(
            EventRecord::new(
                Severity::Info,
                Some(kind),
                &repository,
                Action::Start,
                ResourceKind::Repo,
                &repository,
            )
            .with_message(self.criteria.display()),
        );

        if let Err(e) = provider.acquire_credentials().await {
            self.emit(
                EventRecord::new(
                    Severity::Error,
                    Some(kind),
                    &repository,
                    Action::Auth,
                    ResourceKind::Repo,
                    &repository,
                )
                .with_message(e.to_string()),
            );
            report.fatal = Some(e.into());
            self.finish(&report);
            return report;
        }

        self.emit(
            EventRecord::new(
                Severity::Info,
                Some(kind),
                &repository,
                Action::Auth,
                ResourceKind::Repo,
                &repository,
            )
            .with_message(provider.auth_summary()),
        );

        let provider = Arc::new(provider);
        if let Err(e) = self.drain(&provider, &mut report).await {
            report.fatal = Some(e);
        }

        self.finish(&report);
        report
    }

    async fn drain<P>(&self, provider: &Arc<P>, report: &mut RunReport) -> Result<(), PipelineError>
    where
        P: Provider + 'static,
    {
        let pages = paginate(provider.as_ref(), provider.first_page_url());
        futures::pin_mut!(pages);

        while let Some(batch) = pages.next().await {
            let entries = match batch {
                Ok(entries) => entries,
                Err(e) => {
                    self.emit(
                        EventRecord::new(
                            Severity::Error,
                            Some(report.provider),
                            &report.repository,
                            Action::Pager,
                            ResourceKind::Repo,
                            &report.repository,
                        )
                        .with_message(e.to_string()),
                    );
                    return Err(e.into());
                }
            };

            report.pages += 1;
            self.emit(
                EventRecord::new(
                    Severity::Info,
                    Some(report.provider),
                    &report.repository,
                    Action::Pager,
                    ResourceKind::Repo,
                    &report.repository,
                )
                .with_message(format!("page {} with {} entries", report.pages, entries.len())),
            );

            self.process_batch(provider, entries, report).await;
        }

        Ok(())
    }

    async fn process_batch<P>(&self, provider: &Arc<P>, entries: Vec<RegistryEntry>, report: &mut RunReport)
    where
        P: Provider + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = EntryWorkers(Vec::with_capacity(entries.len()));

        for entry in entries {
            report.entries_seen += 1;

            let kind = provider.entry_kind(&entry);
            let label = entry.label();
            let provider = provider.clone();
            let criteria = self.criteria.clone();
            let sink = self.sink.clone();
            let semaphore = semaphore.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                process_entry(provider.as_ref(), &criteria, sink.as_ref(), entry).await
            });
            workers.0.push((kind, label, handle));
        }

        for (kind, label, handle) in workers.0.iter_mut() {
            let kind = *kind;
            let label = label.clone();
            match handle.await {
                Ok(EntryResult::Skipped) => report.skipped += 1,
                Ok(EntryResult::Handled(outcomes)) => {
                    report.selected += 1;
                    for outcome in &outcomes {
                        report.record(outcome);
                    }
                }
                Err(e) => {
                    tracing::error!(entry = %label, error = %e, "Entry worker failed");
                    let outcome = DeletionOutcome::unknown(kind, label, format!("worker failed: {e}"));
                    self.emit(EventRecord::from_outcome(
                        report.provider,
                        &report.repository,
                        &outcome,
                    ));
                    report.selected += 1;
                    report.record(&outcome);
                }
            }
        }
    }

    fn finish(&self, report: &RunReport) {
        let record = EventRecord::new(
            if report.is_fatal() {
                Severity::Error
            } else {
                Severity::Info
            },
            Some(report.provider),
            &report.repository,
            Action::Finished,
            ResourceKind::Repo,
            &report.repository,
        );

        let message = match &report.fatal {
            Some(e) => format!("{} ({}: {e})", report.display(), e.label()),
            None => report.display(),
        };
        self.emit(record.with_message(message));
    }

    fn emit(&self, record: EventRecord) {
        self.sink.emit(record);
    }
}

async fn process_entry<P>(
    provider: &P,
    criteria: &FilterCriteria,
    sink: &dyn EventSink,
    entry: RegistryEntry,
) -> EntryResult
where
    P: Provider + ?Sized,
{
    let kind = provider.kind();
    let repository = provider.repository();
    let entry_kind = provider.entry_kind(&entry);

    if !entry.is_actionable() {
        sink.emit(
            EventRecord::new(
                Severity::Warn,
                Some(kind),
                repository,
                Action::Skip,
                entry_kind,
                entry.label(),
            )
            .with_message("entry has no name, digest or version id"),
        );
        return EntryResult::Skipped;
    }

    let verdict = provider.evaluate(&entry, criteria);
    if !verdict.is_retained() {
        sink.emit(
            EventRecord::new(
                Severity::Info,
                Some(kind),
                repository,
                Action::Skip,
                entry_kind,
                entry.label(),
            )
            .with_message(verdict.reason()),
        );
        return EntryResult::Skipped;
    }

    let entry = match provider.resolve(entry).await {
        Ok(entry) => entry,
        Err(failure) => {
            sink.emit(
                EventRecord::new(
                    Severity::Warn,
                    Some(kind),
                    repository,
                    Action::Skip,
                    ResourceKind::Manifest,
                    failure.tag.clone(),
                )
                .with_message(failure.to_string()),
            );
            return EntryResult::Skipped;
        }
    };

    let channels = provider.channels(&entry);
    if channels.is_empty() {
        sink.emit(
            EventRecord::new(
                Severity::Warn,
                Some(kind),
                repository,
                Action::Skip,
                entry_kind,
                entry.label(),
            )
            .with_message("no deletion channel applies"),
        );
        return EntryResult::Skipped;
    }

    let mut outcomes = Vec::with_capacity(channels.len());
    for channel in &channels {
        sink.emit(EventRecord::new(
            Severity::Info,
            Some(kind),
            repository,
            Action::DeleteAttempt,
            channel.kind,
            channel.identifier.clone(),
        ));

        let outcome = provider.delete(channel).await;
        sink.emit(EventRecord::from_outcome(kind, repository, &outcome));
        outcomes.push(outcome);
    }

    EntryResult::Handled(outcomes)
}
