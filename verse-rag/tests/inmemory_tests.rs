//! Property and behaviour tests for the in-memory vector store.

use std::collections::HashMap;

use proptest::prelude::*;
use verse_rag::{IndexEntry, InMemoryVectorStore, VectorStore, Verse, VerseError};

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

/// Generate an entry for a random verse key with a normalized embedding.
fn arb_entry(dim: usize) -> impl Strategy<Value = IndexEntry> {
    ("[A-Z][a-z]{2,8}", 1u32..50, 1u32..40, "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(book, chapter, verse, text, vector)| IndexEntry::new(Verse::new(book, chapter, verse, text), vector),
    )
}

fn entry(book: &str, chapter: u32, verse: u32, vector: Vec<f32>) -> IndexEntry {
    IndexEntry::new(Verse::new(book, chapter, verse, format!("{book} {chapter}:{verse}")), vector)
}

mod prop_inmemory_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Results come back by descending score, at most `top_k` of them,
        /// and the store holds exactly one entry per distinct id.
        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            entries in proptest::collection::vec(arb_entry(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, count) = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.create_collection("test", DIM).await.unwrap();
                store.upsert("test", &entries).await.unwrap();
                let results = store.search("test", &query, top_k).await.unwrap();
                (results, store.count("test").await.unwrap())
            });

            let unique: HashMap<&str, ()> = entries.iter().map(|e| (e.id.as_str(), ())).collect();
            prop_assert_eq!(count, unique.len());
            prop_assert!(results.len() <= top_k);
            prop_assert!(results.len() <= count);

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
        }
    }
}

#[tokio::test]
async fn upserting_the_same_id_replaces_the_entry() {
    let store = InMemoryVectorStore::new();
    store.create_collection("bible", 2).await.unwrap();

    store.upsert("bible", &[entry("John", 3, 16, vec![1.0, 0.0])]).await.unwrap();
    store.upsert("bible", &[entry("John", 3, 16, vec![0.0, 1.0])]).await.unwrap();

    assert_eq!(store.count("bible").await.unwrap(), 1);
    let hits = store.search("bible", &[0.0, 1.0], 1).await.unwrap();
    assert_eq!(hits[0].id, "John_3_16");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn recreating_with_another_dimension_is_rejected() {
    let store = InMemoryVectorStore::new();
    store.create_collection("bible", 384).await.unwrap();
    store.create_collection("bible", 384).await.unwrap();

    let err = store.create_collection("bible", 768).await.unwrap_err();
    assert!(matches!(err, VerseError::DimensionMismatch { expected: 768, actual: 384, .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn vectors_of_the_wrong_length_are_refused() {
    let store = InMemoryVectorStore::new();
    store.create_collection("bible", 3).await.unwrap();
    let err = store.upsert("bible", &[entry("John", 11, 35, vec![1.0, 0.0])]).await.unwrap_err();
    assert!(matches!(err, VerseError::DimensionMismatch { .. }));
    assert_eq!(store.count("bible").await.unwrap(), 0);
}

#[tokio::test]
async fn equal_scores_are_ordered_by_id() {
    let store = InMemoryVectorStore::new();
    store.create_collection("bible", 2).await.unwrap();
    store
        .upsert("bible", &[entry("Psalms", 1, 1, vec![1.0, 0.0]), entry("Genesis", 1, 1, vec![1.0, 0.0])])
        .await
        .unwrap();

    let hits = store.search("bible", &[1.0, 0.0], 2).await.unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, ["Genesis_1_1", "Psalms_1_1"]);
}

fn missing<T>(result: &verse_rag::Result<T>) -> bool {
    matches!(result, Err(VerseError::CollectionNotFound(name)) if name == "nope")
}

#[tokio::test]
async fn missing_collections_are_reported_as_not_found() {
    let store = InMemoryVectorStore::new();
    assert!(missing(&store.count("nope").await));
    assert!(missing(&store.search("nope", &[1.0], 1).await));
    assert!(missing(&store.upsert("nope", &[entry("John", 11, 35, vec![1.0])]).await));
    assert!(!store.count("nope").await.unwrap_err().is_retryable());

    store.create_collection("bible", 2).await.unwrap();
    store.upsert("bible", &[entry("John", 11, 35, vec![1.0, 0.0])]).await.unwrap();
    store.delete_collection("bible").await.unwrap();
    store.delete_collection("bible").await.unwrap();
    assert!(matches!(store.count("bible").await, Err(VerseError::CollectionNotFound(_))));
}
