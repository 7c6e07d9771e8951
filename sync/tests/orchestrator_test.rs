//! Fan-out semantics: one journal's failure never touches another's
//! pass, and targeted passes address journals by selector.

use ojs_core::traits::{JournalRegistry, SubmissionStore};
use ojs_core::types::{JournalSelector, JournalTenant, NewJournalTenant, SyncDirection, SyncKind};
use std::sync::Arc;
use sync::{Orchestrator, PassOutcome, SyncError, SyncSettings, TenantOutcome};
use testing::{MemoryStore, empty_page, page_body, submission_payload, unique_journal_code};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn register_journal(store: &Arc<MemoryStore>, base_url: &str) -> JournalTenant {
    store
        .register_journal(NewJournalTenant {
            code: unique_journal_code(),
            name: "Test Journal".to_string(),
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
            remote_journal_id: 7,
            sync_direction: SyncDirection::FromRemote,
            sync_interval_hours: 24,
        })
        .await
        .unwrap()
}

/// Mounts a healthy remote with one submission and nothing else.
async fn mount_healthy_remote(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/submissions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(&[submission_payload(101, "Lone Paper")])),
        )
        .mount(server)
        .await;
    for endpoint in ["/api/v1/users", "/api/v1/issues", "/api/v1/reviews", "/api/v1/comments"] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_one_broken_journal_does_not_stop_the_others() {
    let broken_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/submissions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&broken_server)
        .await;
    let healthy_server = MockServer::start().await;
    mount_healthy_remote(&healthy_server).await;

    let store = Arc::new(MemoryStore::new());
    let broken = register_journal(&store, &broken_server.uri()).await;
    let healthy = register_journal(&store, &healthy_server.uri()).await;

    let orchestrator = Orchestrator::new(store.clone(), SyncSettings::default());
    let report = orchestrator
        .sync_all_journals("cli", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.journals_attempted(), 2);
    assert_eq!(report.journals_failed(), 1);

    let broken_outcome = report
        .outcomes
        .iter()
        .find(|o| o.journal_code() == broken.code)
        .unwrap();
    assert!(!broken_outcome.succeeded());
    match broken_outcome {
        TenantOutcome::Completed { report } => {
            assert_eq!(report.summaries[0].outcome, PassOutcome::Failed);
        }
        TenantOutcome::Failed { .. } => panic!("batch failure should come back as a report"),
    }

    let healthy_outcome = report
        .outcomes
        .iter()
        .find(|o| o.journal_code() == healthy.code)
        .unwrap();
    assert!(healthy_outcome.succeeded());
    assert_eq!(
        store
            .submissions_for_journal(healthy.id)
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(report.total_processed(), 1);
}

#[tokio::test]
async fn test_disabled_journals_are_not_attempted() {
    let server = MockServer::start().await;
    mount_healthy_remote(&server).await;

    let store = Arc::new(MemoryStore::new());
    let enabled = register_journal(&store, &server.uri()).await;
    let disabled = register_journal(&store, &server.uri()).await;
    store.set_journal_enabled(disabled.id, false).await.unwrap();
    let archived = register_journal(&store, &server.uri()).await;
    store.set_journal_active(archived.id, false).await.unwrap();

    let orchestrator = Orchestrator::new(store.clone(), SyncSettings::default());
    let report = orchestrator
        .sync_all_journals("cli", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.journals_attempted(), 1);
    assert_eq!(report.outcomes[0].journal_code(), enabled.code);
}

#[tokio::test]
async fn test_targeted_pass_by_code_runs_one_kind() {
    let server = MockServer::start().await;
    mount_healthy_remote(&server).await;

    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri()).await;

    let orchestrator = Orchestrator::new(store.clone(), SyncSettings::default());
    let report = orchestrator
        .sync_journal(
            &JournalSelector::Code(journal.code.clone()),
            SyncKind::Submissions,
            "cli",
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.journal_id, journal.id);
    assert_eq!(report.summaries.len(), 1);
    assert_eq!(report.summaries[0].kind, SyncKind::Submissions);
    assert_eq!(report.summaries[0].created, 1);
}

#[tokio::test]
async fn test_targeted_pass_by_id_runs_all_kinds() {
    let server = MockServer::start().await;
    mount_healthy_remote(&server).await;

    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri()).await;

    let orchestrator = Orchestrator::new(store.clone(), SyncSettings::default());
    let report = orchestrator
        .sync_journal(
            &JournalSelector::Id(journal.id),
            SyncKind::All,
            "cli",
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.summaries.len(), 5);
    assert!(!report.has_failures());
}

#[tokio::test]
async fn test_unknown_selector_is_reported() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(store, SyncSettings::default());

    let err = orchestrator
        .sync_journal(
            &JournalSelector::Code("nope".to_string()),
            SyncKind::All,
            "cli",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::JournalNotFound(_)));
}
