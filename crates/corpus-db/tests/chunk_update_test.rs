//! Integration tests for the chunk update protocol.
//!
//! Covers the transactional edit path, optimistic concurrency, and the
//! two-phase edit-then-enqueue helper. Requires a migrated database; run
//! with `cargo test -- --ignored`.

use corpus_core::{
    ChunkRepository, CreateDocumentRequest, DocumentRepository, Error, JobRepository, JobStatus,
    JobType, UpdateChunkRequest, VersionRepository,
};
use corpus_db::test_fixtures::{TestDatabase, TestDataBuilder};
use uuid::Uuid;

fn init_logging() {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "corpus_db=debug".into()),
        )
        .try_init();
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_update_bumps_version_and_caches_content() {
    init_logging();
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_document("Update", "Version one text.")
        .await
        .build();

    let chunks = test_db
        .db
        .chunks
        .list_for_document(data.documents[0])
        .await
        .unwrap();
    let chunk = &chunks[0];
    assert_eq!(chunk.version, 1);

    let updated = test_db
        .db
        .chunks
        .update(
            chunk.id,
            UpdateChunkRequest {
                content: "Version two text.".to_string(),
                modified_by: "alice".to_string(),
                comment: Some("Reworded".to_string()),
                expected_version: Some(1),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.version, 2);
    assert_eq!(updated.content.as_deref(), Some("Version two text."));
    assert_eq!(updated.last_modified_by.as_deref(), Some("alice"));
    assert_eq!(updated.modification_count, 1);

    // Pointer references the new ledger row.
    let history = test_db.db.versions.get_history(chunk.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(updated.chunk_version_id, Some(history[1].id));
    assert_eq!(history[1].comment.as_deref(), Some("Reworded"));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_stale_expected_version_conflicts() {
    init_logging();
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_document("Conflict", "Contested text.")
        .await
        .build();

    let chunks = test_db
        .db
        .chunks
        .list_for_document(data.documents[0])
        .await
        .unwrap();
    let chunk_id = chunks[0].id;

    // First writer wins.
    test_db
        .db
        .chunks
        .update(
            chunk_id,
            UpdateChunkRequest {
                content: "First writer.".to_string(),
                modified_by: "alice".to_string(),
                comment: None,
                expected_version: Some(1),
            },
        )
        .await
        .unwrap();

    // Second writer still expects version 1.
    let err = test_db
        .db
        .chunks
        .update(
            chunk_id,
            UpdateChunkRequest {
                content: "Second writer.".to_string(),
                modified_by: "bob".to_string(),
                comment: None,
                expected_version: Some(1),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Conflict(_)));

    // The losing edit left no trace in the ledger.
    let history = test_db.db.versions.get_history(chunk_id).await.unwrap();
    assert_eq!(history.len(), 2);
    let chunk = test_db.db.chunks.get(chunk_id).await.unwrap();
    assert_eq!(chunk.content.as_deref(), Some("First writer."));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_racing_updates_one_winner() {
    init_logging();
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_document("Race", "Contested text.")
        .await
        .build();

    let chunks = test_db
        .db
        .chunks
        .list_for_document(data.documents[0])
        .await
        .unwrap();
    let chunk_id = chunks[0].id;

    let req = |content: &str, by: &str| UpdateChunkRequest {
        content: content.to_string(),
        modified_by: by.to_string(),
        comment: None,
        expected_version: Some(1),
    };

    // Both writers read version 1; the row lock serializes them and the
    // loser sees a bumped version.
    let db_a = test_db.db.clone();
    let db_b = test_db.db.clone();
    let (a, b) = tokio::join!(
        db_a.chunks.update(chunk_id, req("Writer A.", "alice")),
        db_b.chunks.update(chunk_id, req("Writer B.", "bob")),
    );

    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert!(matches!(loser, Error::Conflict(_)));

    let chunk = test_db.db.chunks.get(chunk_id).await.unwrap();
    assert_eq!(chunk.version, 2);
    let history = test_db.db.versions.get_history(chunk_id).await.unwrap();
    assert_eq!(history.len(), 2);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_empty_content_rejected() {
    init_logging();
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_document("Validation", "Non-empty.")
        .await
        .build();

    let chunks = test_db
        .db
        .chunks
        .list_for_document(data.documents[0])
        .await
        .unwrap();

    let err = test_db
        .db
        .chunks
        .update(
            chunks[0].id,
            UpdateChunkRequest {
                content: "   \n".to_string(),
                modified_by: "alice".to_string(),
                comment: None,
                expected_version: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_update_missing_chunk() {
    init_logging();
    let test_db = TestDatabase::new().await;

    let err = test_db
        .db
        .chunks
        .update(
            Uuid::new_v4(),
            UpdateChunkRequest {
                content: "Ghost edit.".to_string(),
                modified_by: "alice".to_string(),
                comment: None,
                expected_version: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ChunkNotFound(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_edit_chunk_enqueues_one_reindex_job() {
    init_logging();
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_document("TwoPhase", "Reprocess me.")
        .await
        .build();

    let chunks = test_db
        .db
        .chunks
        .list_for_document(data.documents[0])
        .await
        .unwrap();
    let chunk_id = chunks[0].id;

    // Two edits in a row only leave one queued reindex job.
    for content in ["Edit one.", "Edit two."] {
        test_db
            .db
            .edit_chunk(
                chunk_id,
                UpdateChunkRequest {
                    content: content.to_string(),
                    modified_by: "alice".to_string(),
                    comment: None,
                    expected_version: None,
                },
            )
            .await
            .unwrap();
    }

    let jobs = test_db.db.jobs.get_for_chunk(chunk_id).await.unwrap();
    let queued: Vec<_> = jobs
        .iter()
        .filter(|j| j.job_type == JobType::Reindex && j.status == JobStatus::Pending)
        .collect();
    assert_eq!(queued.len(), 1);

    // Both edits landed regardless of the dedup.
    let chunk = test_db.db.chunks.get(chunk_id).await.unwrap();
    assert_eq!(chunk.version, 3);
    assert_eq!(chunk.content.as_deref(), Some("Edit two."));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_chunk_content_falls_back_to_ledger() {
    init_logging();
    let test_db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&test_db.db)
        .with_document("Fallback", "Ledger speaks.")
        .await
        .build();

    let chunks = test_db
        .db
        .chunks
        .list_for_document(data.documents[0])
        .await
        .unwrap();
    let chunk_id = chunks[0].id;

    // Simulate a lost cache.
    sqlx::query("UPDATE document_chunk SET content = NULL WHERE id = $1")
        .bind(chunk_id)
        .execute(&test_db.pool)
        .await
        .unwrap();

    let content = test_db.db.chunk_content(chunk_id).await.unwrap();
    assert_eq!(content, "Ledger speaks.");

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_ingest_document_queues_vectorize_per_chunk() {
    init_logging();
    let test_db = TestDatabase::new().await;

    // Each paragraph exceeds the merge threshold, so ingestion keeps them
    // as separate chunks.
    let first = "First paragraph. ".repeat(8);
    let second = "Second paragraph. ".repeat(8);
    let document = test_db
        .db
        .ingest_document(CreateDocumentRequest {
            title: "Two paragraphs".to_string(),
            content: format!("{}\n\n{}", first.trim_end(), second.trim_end()),
            source: "test".to_string(),
            created_by: "alice".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(document.chunk_count, 2);

    let chunks = test_db
        .db
        .chunks
        .list_for_document(document.id)
        .await
        .unwrap();
    for chunk in &chunks {
        let jobs = test_db.db.jobs.get_for_chunk(chunk.id).await.unwrap();
        let vectorize: Vec<_> = jobs
            .iter()
            .filter(|j| j.job_type == JobType::Vectorize && j.status == JobStatus::Pending)
            .collect();
        assert_eq!(vectorize.len(), 1);
    }

    test_db.cleanup().await;
}
