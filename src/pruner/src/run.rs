//! Run coordination: one pipeline per configured provider.

use crate::error::PipelineError;
use crate::events::{Action, EventRecord, EventSink, Severity};
use crate::filter::FilterCriteria;
use crate::http::RegistryHttp;
use crate::model::{ProviderKind, ResourceKind};
use crate::orchestrator::{Orchestrator, RunReport};
use crate::provider::{DockerHubProvider, GitHubProvider};
use chrono::Utc;
use common::config::{Configuration, FatalPolicy};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use tokio::task::AbortHandle;

const RUN_RESOURCE: &str = "regprune";

/// Reports of every pipeline that was started, in completion order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<RunReport>,
}

impl RunSummary {
    pub fn any_fatal(&self) -> bool {
        self.reports.iter().any(RunReport::is_fatal)
    }

    pub fn report(&self, provider: ProviderKind) -> Option<&RunReport> {
        self.reports.iter().find(|r| r.provider == provider)
    }

    /// `1` if any pipeline ended on a fatal error, else `0`. Per-resource
    /// deletion failures do not affect the exit code.
    pub fn exit_code(&self) -> u8 {
        if self.any_fatal() { 1 } else { 0 }
    }
}

/// Execute one pruning run against every configured provider.
///
/// Providers without usable credentials are skipped with an `info` event.
/// Pipelines run concurrently; with `FatalPolicy::Abort` the first fatal
/// error cancels the rest.
pub async fn run(config: &Configuration, sink: Arc<dyn EventSink>) -> Result<RunSummary, reqwest::Error> {
    let http = RegistryHttp::new(&config.runtime)?;
    let criteria = FilterCriteria::from_config(&config.filter, Utc::now());
    let orchestrator = Orchestrator::new(criteria, sink.clone(), config.runtime.concurrency);

    sink.emit(
        EventRecord::new(
            Severity::Info,
            None,
            "",
            Action::Start,
            ResourceKind::Script,
            RUN_RESOURCE,
        )
        .with_message(orchestrator.criteria().display()),
    );

    let mut launches = Vec::new();

    match DockerHubProvider::from_config(http.clone(), &config.dockerhub) {
        Some(provider) => {
            let orchestrator = orchestrator.clone();
            launches.push((
                ProviderKind::DockerHub,
                provider_repository(&config.dockerhub.repository),
                tokio::spawn(async move { orchestrator.run(provider).await }),
            ));
        }
        None => skip_unconfigured(sink.as_ref(), ProviderKind::DockerHub, &config.dockerhub.repository),
    }

    match GitHubProvider::from_config(http, &config.github) {
        Some(provider) => {
            let orchestrator = orchestrator.clone();
            launches.push((
                ProviderKind::GitHub,
                provider_repository(&config.github.repository),
                tokio::spawn(async move { orchestrator.run(provider).await }),
            ));
        }
        None => skip_unconfigured(sink.as_ref(), ProviderKind::GitHub, &config.github.repository),
    }

    let abort_handles: Vec<_> = launches.iter().map(|(_, _, handle)| handle.abort_handle()).collect();
    let mut pipelines: FuturesUnordered<_> = launches
        .into_iter()
        .map(|(kind, repository, handle)| async move { (kind, repository, handle.await) })
        .collect();

    let mut summary = RunSummary::default();
    let mut aborted = false;

    while let Some((kind, repository, joined)) = pipelines.next().await {
        let report = match joined {
            Ok(report) => report,
            Err(e) => {
                let fatal = if e.is_cancelled() {
                    PipelineError::Aborted
                } else {
                    tracing::error!(provider = %kind, error = %e, "Pipeline task failed");
                    PipelineError::Join(e.to_string())
                };
                abandoned(sink.as_ref(), kind, repository, fatal)
            }
        };

        if report.is_fatal() && config.runtime.on_fatal == FatalPolicy::Abort && !aborted {
            tracing::warn!(provider = %report.provider, "Fatal error, aborting remaining pipelines");
            aborted = true;
            abort_handles.iter().for_each(AbortHandle::abort);
        }
        summary.reports.push(report);
    }

    let fatal = summary.reports.iter().filter(|r| r.is_fatal()).count();
    sink.emit(
        EventRecord::new(
            if fatal > 0 { Severity::Error } else { Severity::Info },
            None,
            "",
            Action::Finished,
            ResourceKind::Script,
            RUN_RESOURCE,
        )
        .with_message(format!(
            "{} pipeline(s) run, {fatal} fatal",
            summary.reports.len()
        )),
    );

    Ok(summary)
}

/// Report for a pipeline whose task ended without producing one.
fn abandoned(sink: &dyn EventSink, kind: ProviderKind, repository: String, fatal: PipelineError) -> RunReport {
    sink.emit(
        EventRecord::new(
            Severity::Error,
            Some(kind),
            &repository,
            Action::Finished,
            ResourceKind::Repo,
            &repository,
        )
        .with_message(fatal.label()),
    );

    let mut report = RunReport::new(kind, repository);
    report.fatal = Some(fatal);
    report
}

fn provider_repository(repository: &Option<String>) -> String {
    repository.clone().unwrap_or_default()
}

fn skip_unconfigured(sink: &dyn EventSink, kind: ProviderKind, repository: &Option<String>) {
    tracing::info!(provider = %kind, "Provider not configured, skipping");
    let repository = provider_repository(repository);
    sink.emit(
        EventRecord::new(
            Severity::Info,
            Some(kind),
            &repository,
            Action::Skip,
            ResourceKind::Repo,
            &repository,
        )
        .with_message("credentials not configured"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;

    #[tokio::test]
    async fn test_unconfigured_providers_are_skipped() {
        let sink = MemorySink::new();
        let summary = run(&Configuration::default(), Arc::new(sink.clone()))
            .await
            .unwrap();

        assert!(summary.reports.is_empty());
        assert_eq!(summary.exit_code(), 0);

        let skips = sink.with_action(Action::Skip);
        assert_eq!(skips.len(), 2);
        assert!(skips.iter().all(|r| r.severity == Severity::Info));
        assert!(
            skips
                .iter()
                .all(|r| r.message.as_deref() == Some("credentials not configured"))
        );

        let records = sink.records();
        assert_eq!(records.first().unwrap().resource_kind, ResourceKind::Script);
        assert_eq!(records.last().unwrap().action, Action::Finished);
    }

    #[test]
    fn test_exit_code_reflects_fatal_pipelines() {
        let mut summary = RunSummary::default();
        let mut report = RunReport::new(ProviderKind::GitHub, "acme/web");
        report.failed = 3;
        summary.reports.push(report);
        assert_eq!(summary.exit_code(), 0);

        let mut fatal = RunReport::new(ProviderKind::DockerHub, "acme/web");
        fatal.fatal = Some(PipelineError::Aborted);
        summary.reports.push(fatal);
        assert_eq!(summary.exit_code(), 1);
        assert!(summary.report(ProviderKind::DockerHub).unwrap().is_fatal());
    }
}
