//! Index initialization across layouts.

use submission_indexer::config::IndexLayout;
use submission_indexer::index::init::InitOutcome;
use submission_indexer::index::{initialize, IndexClient, MemoryIndex};

fn per_resource() -> IndexLayout {
    IndexLayout::PerResource {
        submission: "submissions".to_string(),
        review: "reviews".to_string(),
        review_type: "review-types".to_string(),
        review_summation: "review-summations".to_string(),
    }
}

#[tokio::test]
async fn test_initialize_per_resource_layout() {
    let client = MemoryIndex::new();
    let outcomes = initialize(&client, &per_resource().indices(), false)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 4);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, InitOutcome::Created(_))));
    assert_eq!(
        client.index_names().await,
        vec!["review-summations", "review-types", "reviews", "submissions"]
    );
}

#[tokio::test]
async fn test_initialize_twice_reports_existing() {
    let client = MemoryIndex::new();
    let indices = IndexLayout::default().indices();
    initialize(&client, &indices, false).await.unwrap();

    let outcomes = initialize(&client, &indices, false).await.unwrap();
    assert_eq!(
        outcomes,
        vec![InitOutcome::Existing("submission-index".to_string())]
    );
    assert!(client.index_exists("submission-index").await.unwrap());
}
