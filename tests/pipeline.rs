mod common;

use std::sync::Arc;

use codebase_companion::embedding::HashingProvider;
use codebase_companion::error::CompanionError;
use codebase_companion::index::VectorIndex;
use codebase_companion::llm::MockModel;
use codebase_companion::pipeline::{Companion, ANALYZE_SUCCESS_MESSAGE, NOT_ANALYZED_MESSAGE};
use tempfile::TempDir;

use common::{companion, fixtures, test_config, FixtureCloner};

#[tokio::test]
async fn analyze_then_chat_answers_from_repository() {
    let tmp = TempDir::new().unwrap();
    let model = MockModel::with_replies(["It multiplies the subtotal by one plus the tax rate."]);
    let c = companion(&tmp, model.clone());

    let report = c.analyze("https://example.com/acme/billing.git").await.unwrap();
    assert_eq!(report.message, ANALYZE_SUCCESS_MESSAGE);
    assert_eq!(report.documents, 2);
    assert_eq!(report.chunks, 2);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].path.ends_with("legacy.py"));

    let answer = c.chat("What does compute_invoice_total do?").await.unwrap();
    assert_eq!(answer.text, "It multiplies the subtotal by one plus the tax rate.");
    assert_eq!(answer.cited_sources.len(), 2);
    assert_eq!(answer.cited_sources[0].source_path, "src/invoice.py");

    let prompt = &model.prompts()[0];
    assert!(prompt.contains("def compute_invoice_total"));
    assert!(!prompt.contains("left-pad"));
}

#[tokio::test]
async fn chat_before_analyze_is_precondition() {
    let tmp = TempDir::new().unwrap();
    let c = companion(&tmp, MockModel::default());
    match c.chat("anything").await {
        Err(CompanionError::Precondition(msg)) => assert_eq!(msg, NOT_ANALYZED_MESSAGE),
        other => panic!("expected Precondition, got {other:?}"),
    }
}

#[tokio::test]
async fn reanalyze_replaces_previous_index() {
    let tmp = TempDir::new().unwrap();
    let c = companion(&tmp, MockModel::default());

    c.analyze("https://example.com/acme/billing.git").await.unwrap();
    let report = c.analyze("https://example.com/acme/weather.git").await.unwrap();
    assert_eq!(report.documents, 2);

    let answer = c.chat("compute_invoice_total tax_rate").await.unwrap();
    assert!(!answer.cited_sources.is_empty());
    assert!(answer
        .cited_sources
        .iter()
        .all(|s| s.source_path == "app.js" || s.source_path == "styles.css"));

    let status = c.status().await.unwrap();
    let index = status.index.unwrap();
    assert_eq!(index.entries, 2);
    assert_eq!(
        index.repository_url.as_deref(),
        Some("https://example.com/acme/weather.git")
    );
    assert!(!tmp.path().join("temp_repo/src/invoice.py").exists());
}

#[tokio::test]
async fn failed_reanalyze_leaves_no_index() {
    let tmp = TempDir::new().unwrap();
    let c = companion(&tmp, MockModel::default());

    c.analyze("https://example.com/acme/billing.git").await.unwrap();
    let err = c.analyze("https://example.com/acme/missing.git").await.unwrap_err();
    assert!(matches!(err, CompanionError::Clone { .. }));

    assert!(matches!(
        c.chat("invoice").await.unwrap_err(),
        CompanionError::Precondition(_)
    ));
    assert!(matches!(
        VectorIndex::open(&tmp.path().join("vector_index")).await.unwrap_err(),
        CompanionError::NotFound(_)
    ));
}

#[tokio::test]
async fn index_survives_restart() {
    let tmp = TempDir::new().unwrap();
    {
        let c = companion(&tmp, MockModel::default());
        c.analyze("https://example.com/acme/billing.git").await.unwrap();
    }

    let restarted = Companion::new(
        &test_config(&tmp),
        Arc::new(FixtureCloner {
            fixtures: fixtures(&tmp),
        }),
        Arc::new(HashingProvider::new(256)),
        Arc::new(MockModel::with_replies(["still here"])),
    )
    .unwrap();
    assert!(!restarted.is_ready().await);
    assert!(restarted.attach_existing().await.unwrap());

    let answer = restarted.chat("invoice").await.unwrap();
    assert_eq!(answer.text, "still here");
}

#[tokio::test]
async fn concurrent_chats_share_the_index() {
    let tmp = TempDir::new().unwrap();
    let c = Arc::new(companion(&tmp, MockModel::default()));
    c.analyze("https://example.com/acme/weather.git").await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.chat(&format!("forecast question {i}")).await })
        })
        .collect();
    for h in handles {
        let answer = h.await.unwrap().unwrap();
        assert_eq!(answer.cited_sources.len(), 2);
    }
}

#[tokio::test]
async fn top_k_larger_than_index_uses_everything() {
    let tmp = TempDir::new().unwrap();
    let c = companion(&tmp, MockModel::default());
    c.analyze("https://example.com/acme/weather.git").await.unwrap();

    // Default top_k is 7; the weather fixture has two chunks.
    let answer = c.chat("fetchForecast").await.unwrap();
    assert_eq!(answer.cited_sources.len(), 2);
    assert!(answer.cited_sources[0].score >= answer.cited_sources[1].score);
    assert_eq!(answer.cited_sources[0].source_path, "app.js");
}

#[tokio::test]
async fn reanalyzing_same_repository_does_not_accumulate() {
    let tmp = TempDir::new().unwrap();
    let c = companion(&tmp, MockModel::default());

    let first = c.analyze("https://example.com/acme/billing.git").await.unwrap();
    let entries = c.status().await.unwrap().index.unwrap().entries;
    assert_eq!(entries, first.chunks);

    let second = c.analyze("https://example.com/acme/billing.git").await.unwrap();
    assert_eq!(second.chunks, first.chunks);
    assert_eq!(c.status().await.unwrap().index.unwrap().entries, entries);
}

#[tokio::test]
async fn corrupt_index_file_does_not_block_startup() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("vector_index");
    std::fs::create_dir_all(&index_dir).unwrap();
    std::fs::write(index_dir.join("index.sqlite"), b"definitely not sqlite, just noise").unwrap();

    let started = Companion::from_config(&test_config(&tmp)).await.unwrap();
    assert!(!started.is_ready().await);
    assert!(!started.status().await.unwrap().ready);

    let c = companion(&tmp, MockModel::default());
    assert!(!c.attach_existing().await.unwrap());
    c.analyze("https://example.com/acme/billing.git").await.unwrap();
    assert!(c.is_ready().await);
    assert_eq!(c.status().await.unwrap().index.unwrap().entries, 2);
}
