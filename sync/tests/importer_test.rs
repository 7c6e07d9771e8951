//! Importer behavior against an in-memory store and a mock OJS API.

use ojs_client::{OjsApi, create_client};
use ojs_core::traits::{
    DocumentStore, JournalRegistry, MappingStore, SubmissionStore, UserDirectory,
};
use ojs_core::types::{
    JournalTenant, MappingStatus, NewJournalTenant, NewMapping, NewSubmission, SubmissionStatus,
    SyncDirection,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use sync::{ImportOutcome, KeyedLocks, SubmissionImporter, SyncError};
use testing::{
    MemoryStore, author_payload, galley_payload, submission_payload, unique_journal_code,
};
use wiremock::matchers::{method, path};
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

struct Harness {
    store: Arc<MemoryStore>,
    journal: JournalTenant,
    client: Arc<dyn OjsApi>,
    importer: SubmissionImporter,
}

async fn harness(server: &MockServer, direction: SyncDirection) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let journal = register_journal(&store, &server.uri(), direction).await;
    let client = create_client(&server.uri(), "test-key", Duration::from_secs(5)).unwrap();
    let importer = SubmissionImporter::new(store.clone(), Arc::new(KeyedLocks::new()));
    Harness {
        store,
        journal,
        client,
        importer,
    }
}

#[tokio::test]
async fn test_first_import_creates_submission_mapping_and_byline() {
    let server = MockServer::start().await;
    let h = harness(&server, SyncDirection::FromRemote).await;

    let mut remote = submission_payload(101, "Ice Cores of the Holocene");
    remote.authors = vec![
        author_payload("ada@example.edu", "Ada", "Author", 0),
        author_payload("ben@example.edu", "Ben", "Byline", 1),
    ];

    let outcome = h
        .importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();
    assert_eq!(outcome, ImportOutcome::Created);

    let submissions = h.store.submissions_for_journal(h.journal.id).await.unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].title, "Ice Cores of the Holocene");

    let mapping = h
        .store
        .mapping_for_remote(h.journal.id, 101)
        .await
        .unwrap()
        .expect("mapping created");
    assert_eq!(mapping.status, MappingStatus::Completed);
    assert!(mapping.local_version.is_some());
    assert!(mapping.remote_version.is_some());
    assert!(mapping.last_synced_at.is_some());

    let byline = h
        .store
        .contributions_for_submission(submissions[0].id)
        .await
        .unwrap();
    assert_eq!(byline.len(), 2);
    assert!(byline[0].primary_contact);
}

#[tokio::test]
async fn test_reimport_of_unchanged_payload_is_a_no_op() {
    let server = MockServer::start().await;
    let h = harness(&server, SyncDirection::FromRemote).await;

    let mut remote = submission_payload(101, "Stable Title");
    remote.authors = vec![author_payload("ada@example.edu", "Ada", "Author", 0)];

    let first = h
        .importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();
    let second = h
        .importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();
    assert_eq!(first, ImportOutcome::Created);
    assert_eq!(second, ImportOutcome::Unchanged);

    let submissions = h.store.submissions_for_journal(h.journal.id).await.unwrap();
    assert_eq!(submissions.len(), 1);
    let byline = h
        .store
        .contributions_for_submission(submissions[0].id)
        .await
        .unwrap();
    assert_eq!(byline.len(), 1, "byline duplicated on re-import");
}

#[tokio::test]
async fn test_shared_author_email_resolves_to_one_account() {
    let server = MockServer::start().await;
    let h = harness(&server, SyncDirection::FromRemote).await;

    let mut first = submission_payload(101, "First Paper");
    first.authors = vec![author_payload("Shared@Example.EDU", "Ada", "Author", 0)];
    let mut second = submission_payload(102, "Second Paper");
    second.authors = vec![author_payload("shared@example.edu", "Ada", "Author", 0)];

    h.importer
        .import(h.client.as_ref(), &h.journal, &first)
        .await
        .unwrap();
    h.importer
        .import(h.client.as_ref(), &h.journal, &second)
        .await
        .unwrap();

    let account = h
        .store
        .user_by_email("shared@example.edu")
        .await
        .unwrap()
        .expect("account exists");
    let first_byline = h
        .store
        .contributions_for_submission(
            h.store
                .mapping_for_remote(h.journal.id, 101)
                .await
                .unwrap()
                .unwrap()
                .submission_id,
        )
        .await
        .unwrap();
    let second_byline = h
        .store
        .contributions_for_submission(
            h.store
                .mapping_for_remote(h.journal.id, 102)
                .await
                .unwrap()
                .unwrap()
                .submission_id,
        )
        .await
        .unwrap();
    assert_eq!(first_byline[0].user_id, account.id);
    assert_eq!(second_byline[0].user_id, account.id);
}

#[tokio::test]
async fn test_missing_title_fails_before_any_write() {
    let server = MockServer::start().await;
    let h = harness(&server, SyncDirection::FromRemote).await;

    let mut remote = submission_payload(101, "ignored");
    remote.title = None;

    let err = h
        .importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));

    assert!(
        h.store
            .submissions_for_journal(h.journal.id)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        h.store
            .mapping_for_remote(h.journal.id, 101)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_interrupted_first_import_resumes_into_the_same_submission() {
    let server = MockServer::start().await;
    let h = harness(&server, SyncDirection::FromRemote).await;

    // The state a first import leaves behind when it dies after the
    // submission and mapping rows went in: a Pending mapping with no
    // version tags.
    let submission = h
        .store
        .insert_submission(NewSubmission {
            journal_id: h.journal.id,
            title: "Half Imported".to_string(),
            abstract_text: None,
            section: None,
            keywords: Vec::new(),
            status: SubmissionStatus::Queued,
            submitted_at: None,
        })
        .await
        .unwrap();
    h.store
        .insert_mapping(NewMapping {
            journal_id: h.journal.id,
            submission_id: submission.id,
            remote_submission_id: 101,
            direction: h.journal.sync_direction,
            status: MappingStatus::Pending,
            local_version: None,
            remote_version: None,
            last_error: None,
            metadata: json!({}),
            last_synced_at: None,
        })
        .await
        .unwrap();

    let mut remote = submission_payload(101, "Half Imported");
    remote.authors = vec![author_payload("ada@example.edu", "Ada", "Author", 0)];
    let outcome = h
        .importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();
    assert_eq!(outcome, ImportOutcome::Updated);

    let submissions = h.store.submissions_for_journal(h.journal.id).await.unwrap();
    assert_eq!(
        submissions.len(),
        1,
        "retry must reuse the half-imported row"
    );
    assert_eq!(submissions[0].id, submission.id);

    let mapping = h
        .store
        .mapping_for_remote(h.journal.id, 101)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mapping.status, MappingStatus::Completed);
    assert!(mapping.local_version.is_some());
    assert!(mapping.last_synced_at.is_some());
}

#[tokio::test]
async fn test_remote_only_change_is_applied() {
    let server = MockServer::start().await;
    let h = harness(&server, SyncDirection::FromRemote).await;

    let mut remote = submission_payload(101, "Original");
    h.importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();

    remote.abstract_text = Some("Revised abstract from the remote side.".to_string());
    let outcome = h
        .importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();
    assert_eq!(outcome, ImportOutcome::Updated);

    let submissions = h.store.submissions_for_journal(h.journal.id).await.unwrap();
    assert_eq!(
        submissions[0].abstract_text.as_deref(),
        Some("Revised abstract from the remote side.")
    );
    let mapping = h
        .store
        .mapping_for_remote(h.journal.id, 101)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mapping.status, MappingStatus::Completed);
}

#[tokio::test]
async fn test_local_only_change_is_never_overwritten() {
    let server = MockServer::start().await;
    let h = harness(&server, SyncDirection::Bidirectional).await;

    let remote = submission_payload(101, "Remote Title");
    h.importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();

    let mapping = h
        .store
        .mapping_for_remote(h.journal.id, 101)
        .await
        .unwrap()
        .unwrap();
    let mut submission = h
        .store
        .submission_by_id(mapping.submission_id)
        .await
        .unwrap()
        .unwrap();
    submission.title = "Local copyedit".to_string();
    h.store.update_submission(&submission).await.unwrap();

    let outcome = h
        .importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();
    assert_eq!(outcome, ImportOutcome::Unchanged);

    let kept = h
        .store
        .submission_by_id(mapping.submission_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.title, "Local copyedit");
}

#[tokio::test]
async fn test_both_sides_changed_parks_mapping_as_conflict() {
    let server = MockServer::start().await;
    let h = harness(&server, SyncDirection::Bidirectional).await;

    let mut remote = submission_payload(101, "Remote Title");
    h.importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();

    // Diverge both sides.
    let mapping = h
        .store
        .mapping_for_remote(h.journal.id, 101)
        .await
        .unwrap()
        .unwrap();
    let mut submission = h
        .store
        .submission_by_id(mapping.submission_id)
        .await
        .unwrap()
        .unwrap();
    submission.title = "Local edit".to_string();
    h.store.update_submission(&submission).await.unwrap();
    remote.title = Some("Remote edit".to_string());

    let outcome = h
        .importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();
    assert_eq!(outcome, ImportOutcome::Conflict);

    let parked = h
        .store
        .mapping_for_remote(h.journal.id, 101)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(parked.status, MappingStatus::Conflict);
    assert!(parked.metadata.get("conflict").is_some());

    // Conflicts are sticky: further imports touch nothing.
    let again = h
        .importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();
    assert_eq!(again, ImportOutcome::Conflict);
    let kept = h
        .store
        .submission_by_id(mapping.submission_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.title, "Local edit");
}

#[tokio::test]
async fn test_push_only_journal_does_not_materialize_remote_submissions() {
    let server = MockServer::start().await;
    let h = harness(&server, SyncDirection::ToRemote).await;

    let remote = submission_payload(101, "Remote Only");
    let outcome = h
        .importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();
    assert_eq!(outcome, ImportOutcome::Unchanged);
    assert!(
        h.store
            .submissions_for_journal(h.journal.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_galleys_are_stored_content_addressed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/1.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 fake".to_vec()))
        .mount(&server)
        .await;
    let h = harness(&server, SyncDirection::FromRemote).await;

    let mut remote = submission_payload(101, "With Files");
    remote.galleys = vec![galley_payload(
        1,
        "PDF",
        "paper.pdf",
        &format!("{}/files/1.pdf", server.uri()),
    )];

    h.importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();
    let mapping = h
        .store
        .mapping_for_remote(h.journal.id, 101)
        .await
        .unwrap()
        .unwrap();

    let documents = h
        .store
        .documents_for_submission(mapping.submission_id)
        .await
        .unwrap();
    assert_eq!(documents.len(), 1);
    let versions = h
        .store
        .versions_for_document(documents[0].id)
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(
        h.store.version_content(versions[0].id).await.unwrap(),
        b"%PDF-1.7 fake".to_vec()
    );

    // Force an update pass; identical file content must not grow a new
    // revision.
    remote.abstract_text = Some("changed".to_string());
    h.importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();
    let versions = h
        .store
        .versions_for_document(documents[0].id)
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);
}

#[tokio::test]
async fn test_unresolvable_author_is_a_warning_not_a_failure() {
    let server = MockServer::start().await;
    let h = harness(&server, SyncDirection::FromRemote).await;

    let mut remote = submission_payload(101, "Partial Byline");
    let mut anonymous = author_payload("ignored", "Ann", "Onymous", 1);
    anonymous.email = None;
    remote.authors = vec![
        author_payload("ada@example.edu", "Ada", "Author", 0),
        anonymous,
    ];

    let outcome = h
        .importer
        .import(h.client.as_ref(), &h.journal, &remote)
        .await
        .unwrap();
    assert_eq!(outcome, ImportOutcome::Created);

    let mapping = h
        .store
        .mapping_for_remote(h.journal.id, 101)
        .await
        .unwrap()
        .unwrap();
    let warnings = mapping
        .metadata
        .get("warnings")
        .and_then(|w| w.as_array())
        .expect("warnings recorded");
    assert_eq!(warnings.len(), 1);

    let byline = h
        .store
        .contributions_for_submission(mapping.submission_id)
        .await
        .unwrap();
    assert_eq!(byline.len(), 1);
}
