//! Integration tests for the PostgreSQL progress ledger.
//!
//! These run against a real database (`DATABASE_URL`) and are ignored by
//! default: `cargo test -p lookbook-db -- --ignored`.

use std::sync::Arc;

use lookbook_core::job::FIELD_OUTPUT_IMAGES;
use lookbook_core::ledger::{LedgerError, ProgressLedger};
use lookbook_core::patch::PatchDocument;
use lookbook_core::types::JobId;
use lookbook_db::PgProgressLedger;
use sqlx::PgPool;

fn job(id: &str) -> JobId {
    JobId::new(id).unwrap()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn create_then_patch_merges_fields(pool: PgPool) {
    let ledger = PgProgressLedger::new(pool);
    let created = ledger
        .create(&job("j1"), 40, "Prompt Template Loaded")
        .await
        .unwrap();
    assert!(created);
    assert!(!ledger.create(&job("j1"), 0, "again").await.unwrap());

    let first = PatchDocument::new(66, "Product Attribution Generated")
        .unwrap()
        .with_field("title", "Linen shirt")
        .unwrap();
    ledger.apply_patch(&job("j1"), &first).await.unwrap();

    let second = PatchDocument::new(80, "Generating images")
        .unwrap()
        .with_field("garmentType", "UPPER_BODY")
        .unwrap();
    ledger.apply_patch(&job("j1"), &second).await.unwrap();

    let record = ledger.get(&job("j1")).await.unwrap().unwrap();
    assert_eq!(record.progress, 80);
    assert_eq!(record.current_step, "Generating images");
    assert_eq!(record.text("title"), Some("Linen shirt"));
    assert_eq!(record.text("garmentType"), Some("UPPER_BODY"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn progress_is_monotonic(pool: PgPool) {
    let ledger = PgProgressLedger::new(pool);
    ledger.create(&job("j2"), 80, "late").await.unwrap();
    ledger
        .apply_patch(&job("j2"), &PatchDocument::new(10, "early").unwrap())
        .await
        .unwrap();
    let record = ledger.get(&job("j2")).await.unwrap().unwrap();
    assert_eq!(record.progress, 80);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn writes_to_missing_job_fail(pool: PgPool) {
    let ledger = PgProgressLedger::new(pool);
    let patch = PatchDocument::new(10, "x").unwrap();
    assert!(matches!(
        ledger.apply_patch(&job("ghost"), &patch).await,
        Err(LedgerError::JobNotFound(_))
    ));
    assert!(matches!(
        ledger.append_to_list(&job("ghost"), FIELD_OUTPUT_IMAGES, "k").await,
        Err(LedgerError::JobNotFound(_))
    ));
    assert!(ledger.get(&job("ghost")).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_appends_keep_every_entry(pool: PgPool) {
    let ledger = Arc::new(PgProgressLedger::new(pool));
    ledger.create(&job("j3"), 0, "").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..25 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            let key = format!("output/x/{i}.jpg");
            ledger
                .append_to_list(&job("j3"), FIELD_OUTPUT_IMAGES, &key)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let record = ledger.get(&job("j3")).await.unwrap().unwrap();
    let mut outputs = record.output_images();
    outputs.sort();
    assert_eq!(outputs.len(), 25);
    outputs.dedup();
    assert_eq!(outputs.len(), 25);
}
