//! Docker-Hub pipeline against a mock registry.

mod support;

use axum::http::Method;
use chrono::{Duration, Utc};
use common::Secret;
use common::config::Configuration;
use pruner::{Action, MemorySink, PaginationError, PipelineError, ProviderKind, ResourceKind, Severity};
use serde_json::json;
use std::sync::Arc;
use support::{MockRegistry, Reply};

const LOGIN: &str = "/v2/users/login";
const TAGS: &str = "/v2/repositories/acme/web/tags";

fn config(server: &MockRegistry) -> Configuration {
    let mut config = Configuration::default();
    config.filter.prefix = Some("myapp-".to_string());
    config.filter.max_age_days = Some(7);
    config.dockerhub.repository = Some("acme/web".to_string());
    config.dockerhub.username = Some("robot".to_string());
    config.dockerhub.password = Some(Secret::new("hunter2"));
    config.dockerhub.hub_url = server.base().to_string();
    config.dockerhub.auth_url = server.base().to_string();
    config.dockerhub.registry_url = server.base().to_string();
    config.dockerhub.page_size = 2;
    config
}

fn with_tokens(server: &MockRegistry) {
    server
        .on(Method::POST, LOGIN, Reply::json(200, json!({ "token": "hub-token" })))
        .on(Method::GET, "/token", Reply::json(200, json!({ "token": "content-token" })));
}

fn manifest(digest: &str) -> String {
    format!("/v2/acme/web/manifests/{digest}")
}

#[tokio::test]
async fn test_prunes_tags_and_manifests_across_pages() {
    let server = MockRegistry::start().await;
    with_tokens(&server);

    let fresh = (Utc::now() - Duration::days(1)).to_rfc3339();
    let second_page = format!("{}{TAGS}?page=2&page_size=2", server.base());

    server
        .on(
            Method::GET,
            &format!("{TAGS}?page_size=2"),
            Reply::json(
                200,
                json!({
                    "next": second_page,
                    "results": [
                        {
                            "name": "myapp-1",
                            "digest": "sha256:aaa",
                            "last_updated": "2020-01-01T00:00:00Z",
                            "images": [
                                { "digest": "sha256:amd" },
                                { "digest": "sha256:arm" },
                                { "digest": "sha256:aaa" }
                            ]
                        },
                        { "name": "other-1", "digest": "sha256:ooo", "last_updated": "2020-01-01T00:00:00Z" }
                    ]
                }),
            ),
        )
        .on(
            Method::GET,
            &format!("{TAGS}?page=2&page_size=2"),
            Reply::json(
                200,
                json!({
                    "next": null,
                    "results": [
                        { "name": "myapp-2", "last_updated": "2020-01-01T00:00:00Z" },
                        { "name": "myapp-3", "digest": "sha256:new", "last_updated": fresh }
                    ]
                }),
            ),
        )
        .on(Method::DELETE, &format!("{TAGS}/myapp-1/"), Reply::status(204))
        .on(Method::DELETE, &manifest("sha256:aaa"), Reply::status(202))
        .on(
            Method::DELETE,
            &manifest("sha256:amd"),
            Reply::json(
                404,
                json!({ "errors": [{ "code": "MANIFEST_UNKNOWN", "message": "manifest unknown" }] }),
            ),
        )
        .on(Method::DELETE, &manifest("sha256:arm"), Reply::status(202))
        .on(
            Method::HEAD,
            &manifest("myapp-2"),
            Reply::status(200).header("docker-content-digest", "sha256:bbb"),
        )
        .on(Method::DELETE, &format!("{TAGS}/myapp-2/"), Reply::status(204))
        .on(Method::DELETE, &manifest("sha256:bbb"), Reply::status(202));

    let sink = MemorySink::new();
    let summary = pruner::run(&config(&server), Arc::new(sink.clone())).await.unwrap();

    assert_eq!(summary.exit_code(), 0);
    let report = summary.report(ProviderKind::DockerHub).unwrap();
    assert!(!report.is_fatal());
    assert_eq!(report.pages, 2);
    assert_eq!(report.entries_seen, 4);
    assert_eq!(report.selected, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.succeeded, 5);
    assert_eq!(report.failed, 1);

    // Every channel of myapp-1 was attempted even though one manifest failed
    let mut deletes = server.deletes();
    deletes.sort();
    let mut expected = vec![
        format!("{TAGS}/myapp-1/"),
        format!("{TAGS}/myapp-2/"),
        manifest("sha256:aaa"),
        manifest("sha256:amd"),
        manifest("sha256:arm"),
        manifest("sha256:bbb"),
    ];
    expected.sort();
    assert_eq!(deletes, expected);

    let failed = sink.with_action(Action::DeleteFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].resource, "sha256:amd");
    assert_eq!(failed[0].resource_kind, ResourceKind::Manifest);
    assert_eq!(failed[0].status, Some(404));
    assert_eq!(failed[0].message.as_deref(), Some("manifest unknown"));
    assert_eq!(failed[0].severity, Severity::Warn);

    // Tag deletes use the login token, manifest deletes the scoped token
    for request in server.requests().iter().filter(|r| r.method == Method::DELETE) {
        let expected = if request.path.starts_with(TAGS) {
            "Bearer hub-token"
        } else {
            "Bearer content-token"
        };
        assert_eq!(request.authorization.as_deref(), Some(expected), "{}", request.path);
    }

    let token_requests = server.requests_to(Method::GET, "/token");
    assert_eq!(token_requests.len(), 1);
    assert!(
        token_requests[0]
            .authorization
            .as_deref()
            .is_some_and(|a| a.starts_with("Basic "))
    );
    assert!(
        token_requests[0]
            .query
            .as_deref()
            .is_some_and(|q| q.contains("service=registry.docker.io"))
    );

    let skipped: Vec<_> = sink
        .with_action(Action::Skip)
        .into_iter()
        .map(|r| (r.resource, r.message.unwrap_or_default()))
        .collect();
    assert!(skipped.contains(&("other-1".to_string(), "prefix mismatch".to_string())));
    assert!(skipped.contains(&("myapp-3".to_string(), "too new".to_string())));
}

#[tokio::test]
async fn test_rejected_login_is_fatal() {
    let server = MockRegistry::start().await;
    server.on(
        Method::POST,
        LOGIN,
        Reply::json(401, json!({ "detail": "Incorrect authentication credentials" })),
    );

    let sink = MemorySink::new();
    let summary = pruner::run(&config(&server), Arc::new(sink.clone())).await.unwrap();

    assert_eq!(summary.exit_code(), 1);
    let report = summary.report(ProviderKind::DockerHub).unwrap();
    assert!(matches!(report.fatal, Some(PipelineError::Auth(_))));
    assert!(server.requests_to(Method::GET, TAGS).is_empty());
    assert!(server.deletes().is_empty());

    let auth = sink.with_action(Action::Auth);
    assert_eq!(auth.len(), 1);
    assert_eq!(auth[0].severity, Severity::Error);
}

#[tokio::test]
async fn test_error_body_ends_listing() {
    let server = MockRegistry::start().await;
    with_tokens(&server);
    server.on(
        Method::GET,
        TAGS,
        Reply::json(200, json!({ "message": "object not found", "errinfo": {} })),
    );

    let summary = pruner::run(&config(&server), Arc::new(MemorySink::new()))
        .await
        .unwrap();

    let report = summary.report(ProviderKind::DockerHub).unwrap();
    match &report.fatal {
        Some(PipelineError::Pagination(PaginationError::ErrorBody { message, .. })) => {
            assert_eq!(message, "object not found");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(report.pages, 0);
}

#[tokio::test]
async fn test_unresolvable_digest_is_skipped() {
    let server = MockRegistry::start().await;
    with_tokens(&server);
    server
        .on(
            Method::GET,
            TAGS,
            Reply::json(
                200,
                json!({
                    "next": null,
                    "results": [{ "name": "myapp-9", "last_updated": "2020-01-01T00:00:00Z" }]
                }),
            ),
        )
        .on(Method::HEAD, &manifest("myapp-9"), Reply::status(404));

    let sink = MemorySink::new();
    let summary = pruner::run(&config(&server), Arc::new(sink.clone())).await.unwrap();

    assert_eq!(summary.exit_code(), 0);
    assert!(server.deletes().is_empty());

    let skips = sink.with_action(Action::Skip);
    assert_eq!(skips.len(), 1);
    assert_eq!(skips[0].resource, "myapp-9");
    assert_eq!(skips[0].resource_kind, ResourceKind::Manifest);
    assert_eq!(skips[0].severity, Severity::Warn);
}

#[tokio::test]
async fn test_not_found_can_count_as_success() {
    let server = MockRegistry::start().await;
    with_tokens(&server);
    server
        .on(
            Method::GET,
            TAGS,
            Reply::json(
                200,
                json!({
                    "next": null,
                    "results": [{ "name": "myapp-1", "digest": "sha256:gone", "last_updated": "2020-01-01T00:00:00Z" }]
                }),
            ),
        )
        .on(Method::DELETE, &format!("{TAGS}/myapp-1/"), Reply::status(404))
        .on(Method::DELETE, &manifest("sha256:gone"), Reply::status(404));

    let mut config = config(&server);
    config.runtime.not_found_is_success = true;

    let summary = pruner::run(&config, Arc::new(MemorySink::new())).await.unwrap();

    let report = summary.report(ProviderKind::DockerHub).unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);
}
