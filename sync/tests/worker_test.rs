//! Per-journal pass behavior: run rows, paging, failure taxonomy, the
//! push step and cancellation.

use ojs_core::traits::{
    CommentStore, IssueStore, JournalRegistry, MappingStore, ReviewStore, SubmissionStore,
    SyncLogStore, UserDirectory,
};
use ojs_core::types::{
    JournalTenant, MappingStatus, NewJournalTenant, NewMapping, NewSubmission, RunStatus,
    SubmissionStatus, SyncDirection, SyncKind,
};
use serde_json::json;
use std::sync::Arc;
use sync::{KeyedLocks, PassOutcome, SyncSettings, SyncWorker};
use testing::{
    MemoryStore, comment_payload, empty_page, issue_payload, page_body, page_body_with_total,
    review_payload, submission_payload, unique_journal_code, user_payload,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn register_journal(
    store: &Arc<MemoryStore>,
    base_url: &str,
    direction: SyncDirection,
) -> JournalTenant {
    store
        .register_journal(NewJournalTenant {
            code: unique_journal_code(),
            name: "Test Journal".to_string(),
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
            remote_journal_id: 7,
            sync_direction: direction,
            sync_interval_hours: 24,
        })
        .await
        .unwrap()
}

fn worker_for(
    store: &Arc<MemoryStore>,
    journal: &JournalTenant,
    settings: SyncSettings,
) -> SyncWorker {
    SyncWorker::new(
        store.clone(),
        settings,
        Arc::new(KeyedLocks::new()),
        journal.clone(),
        "cli",
    )
    .unwrap()
}

/// A submission already mapped to a remote counterpart, for the passes
/// that walk existing mappings.
async fn mapped_submission(
    store: &Arc<MemoryStore>,
    journal: &JournalTenant,
    remote_submission_id: i64,
) -> i64 {
    let submission = store
        .insert_submission(NewSubmission {
            journal_id: journal.id,
            title: "Mapped".to_string(),
            abstract_text: None,
            section: None,
            keywords: Vec::new(),
            status: SubmissionStatus::Queued,
            submitted_at: None,
        })
        .await
        .unwrap();
    store
        .insert_mapping(NewMapping {
            journal_id: journal.id,
            submission_id: submission.id,
            remote_submission_id,
            direction: journal.sync_direction,
            status: MappingStatus::Completed,
            local_version: None,
            remote_version: None,
            last_error: None,
            metadata: json!({}),
            last_synced_at: None,
        })
        .await
        .unwrap();
    submission.id
}

#[tokio::test]
async fn test_disabled_journal_is_skipped_without_a_run_row() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let mut journal = register_journal(&store, &server.uri(), SyncDirection::FromRemote).await;
    store.set_journal_enabled(journal.id, false).await.unwrap();
    journal.enabled = false;

    let worker = worker_for(&store, &journal, SyncSettings::default());
    let summary = worker
        .sync_submissions(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.outcome, PassOutcome::Skipped);
    assert!(
        store
            .recent_runs(Some(journal.id), 10)
            .await
            .unwrap()
            .is_empty(),
        "a skipped pass must not record a run"
    );
}

#[tokio::test]
async fn test_rejected_credentials_fail_the_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/submissions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), SyncDirection::FromRemote).await;

    let worker = worker_for(&store, &journal, SyncSettings::default());
    let summary = worker
        .sync_submissions(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.outcome, PassOutcome::Failed);
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.error_details.len(), 1);
    assert!(summary.error_details[0].error.contains("authentication"));

    let runs = store.recent_runs(Some(journal.id), 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);

    let refreshed = store.journal_by_id(journal.id).await.unwrap().unwrap();
    assert!(
        refreshed.last_synced_at.is_none(),
        "a failed pass must not advance the sync cursor"
    );
}

#[tokio::test]
async fn test_one_malformed_item_does_not_fail_the_batch() {
    let server = MockServer::start().await;
    let mut broken = submission_payload(102, "ignored");
    broken.title = None;
    let items = vec![
        submission_payload(101, "Fine"),
        broken,
        submission_payload(103, "Also Fine"),
    ];
    Mock::given(method("GET"))
        .and(path("/api/v1/submissions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&items)))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), SyncDirection::FromRemote).await;

    let worker = worker_for(&store, &journal, SyncSettings::default());
    let summary = worker
        .sync_submissions(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.outcome, PassOutcome::Completed);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.created, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.error_details.len(), 1);
    assert_eq!(summary.error_details[0].entity_id, "102");

    let refreshed = store.journal_by_id(journal.id).await.unwrap().unwrap();
    assert!(refreshed.last_synced_at.is_some());
}

#[tokio::test]
async fn test_paging_walks_every_page() {
    let server = MockServer::start().await;
    let first = vec![
        submission_payload(101, "Page One A"),
        submission_payload(102, "Page One B"),
    ];
    let second = vec![submission_payload(103, "Page Two")];
    Mock::given(method("GET"))
        .and(path("/api/v1/submissions"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body_with_total(&first, 3)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/submissions"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body_with_total(&second, 3)))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), SyncDirection::FromRemote).await;

    let settings = SyncSettings {
        page_size: 2,
        ..SyncSettings::default()
    };
    let worker = worker_for(&store, &journal, settings);
    let summary = worker
        .sync_submissions(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.created, 3);
    assert_eq!(
        store
            .submissions_for_journal(journal.id)
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn test_users_pass_skips_disabled_accounts() {
    let server = MockServer::start().await;
    let mut blocked = user_payload(2, "blocked@example.edu");
    blocked.disabled = true;
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&[
            user_payload(1, "live@example.edu"),
            blocked,
        ])))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), SyncDirection::FromRemote).await;

    let worker = worker_for(&store, &journal, SyncSettings::default());
    let summary = worker.sync_users(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.outcome, PassOutcome::Completed);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.created, 1);
    assert!(
        store
            .user_by_email("live@example.edu")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        store
            .user_by_email("blocked@example.edu")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_issues_pass_upserts_by_remote_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&[
            issue_payload(1, 12, 2025),
            issue_payload(2, 13, 2026),
        ])))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), SyncDirection::FromRemote).await;
    let worker = worker_for(&store, &journal, SyncSettings::default());

    let first = worker.sync_issues(&CancellationToken::new()).await.unwrap();
    assert_eq!(first.created, 2);

    let second = worker.sync_issues(&CancellationToken::new()).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 2);
    assert_eq!(store.issues_for_journal(journal.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_reviews_pass_resolves_reviewer_and_upserts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/reviews"))
        .and(query_param("submissionId", "42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(&[review_payload(900, "rita@example.edu")])),
        )
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), SyncDirection::FromRemote).await;
    let submission_id = mapped_submission(&store, &journal, 42).await;

    let worker = worker_for(&store, &journal, SyncSettings::default());
    let summary = worker
        .sync_reviews(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.outcome, PassOutcome::Completed);
    assert_eq!(summary.created, 1);
    let reviews = store.reviews_for_submission(submission_id).await.unwrap();
    assert_eq!(reviews.len(), 1);
    let reviewer = store
        .user_by_email("rita@example.edu")
        .await
        .unwrap()
        .expect("reviewer account created");
    assert_eq!(reviews[0].reviewer_id, reviewer.id);
}

#[tokio::test]
async fn test_reviews_pass_walks_every_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/reviews"))
        .and(query_param("submissionId", "42"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body_with_total(
            &[review_payload(900, "rita@example.edu")],
            2,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/reviews"))
        .and(query_param("submissionId", "42"))
        .and(query_param("offset", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body_with_total(
            &[review_payload(901, "remy@example.edu")],
            2,
        )))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), SyncDirection::FromRemote).await;
    let submission_id = mapped_submission(&store, &journal, 42).await;

    let settings = SyncSettings {
        page_size: 1,
        ..SyncSettings::default()
    };
    let worker = worker_for(&store, &journal, settings);
    let summary = worker
        .sync_reviews(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.created, 2);
    assert_eq!(
        store
            .reviews_for_submission(submission_id)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_comments_pass_requires_a_body_but_not_an_author() {
    let server = MockServer::start().await;
    let mut empty_body = comment_payload(801, "ignored");
    empty_body.body = None;
    Mock::given(method("GET"))
        .and(path("/api/v1/comments"))
        .and(query_param("submissionId", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&[
            comment_payload(800, "Please shorten the abstract."),
            empty_body,
        ])))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), SyncDirection::FromRemote).await;
    let submission_id = mapped_submission(&store, &journal, 42).await;

    let worker = worker_for(&store, &journal, SyncSettings::default());
    let summary = worker
        .sync_comments(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.outcome, PassOutcome::Completed);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.created, 1);
    assert_eq!(summary.failed, 1);

    let comments = store.comments_for_submission(submission_id).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].author_id, None);
}

#[tokio::test]
async fn test_comments_pass_walks_every_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/comments"))
        .and(query_param("submissionId", "42"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body_with_total(
            &[comment_payload(800, "First round note.")],
            2,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/comments"))
        .and(query_param("submissionId", "42"))
        .and(query_param("offset", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body_with_total(
            &[comment_payload(801, "Second round note.")],
            2,
        )))
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), SyncDirection::FromRemote).await;
    let submission_id = mapped_submission(&store, &journal, 42).await;

    let settings = SyncSettings {
        page_size: 1,
        ..SyncSettings::default()
    };
    let worker = worker_for(&store, &journal, settings);
    let summary = worker
        .sync_comments(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.created, 2);
    assert_eq!(
        store
            .comments_for_submission(submission_id)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_local_edits_are_pushed_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/submissions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(&[submission_payload(101, "Remote Title")])),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/articles/101"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::to_value(submission_payload(101, "Local copyedit")).unwrap()),
        )
        .expect(1)
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), SyncDirection::Bidirectional).await;
    let worker = worker_for(&store, &journal, SyncSettings::default());
    let cancel = CancellationToken::new();

    let first = worker.sync_submissions(&cancel).await.unwrap();
    assert_eq!(first.created, 1);
    assert_eq!(first.pushed, 0);

    let mapping = store
        .mapping_for_remote(journal.id, 101)
        .await
        .unwrap()
        .unwrap();
    let mut submission = store
        .submission_by_id(mapping.submission_id)
        .await
        .unwrap()
        .unwrap();
    submission.title = "Local copyedit".to_string();
    store.update_submission(&submission).await.unwrap();

    let second = worker.sync_submissions(&cancel).await.unwrap();
    assert_eq!(second.outcome, PassOutcome::Completed);
    assert_eq!(second.pushed, 1);

    let pushed = store
        .mapping_for_remote(journal.id, 101)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(pushed.local_version, mapping.local_version);
    assert!(pushed.last_synced_at.is_some());
}

#[tokio::test]
async fn test_cancellation_finishes_the_run_as_cancelled() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), SyncDirection::FromRemote).await;
    let worker = worker_for(&store, &journal, SyncSettings::default());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = worker.sync_submissions(&cancel).await.unwrap();

    assert_eq!(summary.outcome, PassOutcome::Cancelled);
    let runs = store.recent_runs(Some(journal.id), 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Cancelled);

    let refreshed = store.journal_by_id(journal.id).await.unwrap().unwrap();
    assert!(refreshed.last_synced_at.is_none());
}

#[tokio::test]
async fn test_sync_all_stops_after_a_batch_failure() {
    let server = MockServer::start().await;
    // Submissions succeed, users are rejected; issues and later kinds
    // must never be attempted.
    Mock::given(method("GET"))
        .and(path("/api/v1/submissions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
        .expect(0)
        .mount(&server)
        .await;
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), SyncDirection::FromRemote).await;

    let worker = worker_for(&store, &journal, SyncSettings::default());
    let report = worker.sync_all(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.summaries.len(), 2);
    assert_eq!(report.summaries[0].kind, SyncKind::Submissions);
    assert_eq!(report.summaries[0].outcome, PassOutcome::Completed);
    assert_eq!(report.summaries[1].kind, SyncKind::Users);
    assert_eq!(report.summaries[1].outcome, PassOutcome::Failed);
    assert!(report.has_failures());
}
