use super::*;
use crate::testing::{KeywordEmbedder, chunk};
use tempfile::TempDir;

const VOCABULARY: &[&str] = &["alpha", "beta", "gamma"];

fn entry(ordinal: u32, vector: Vec<f32>) -> IndexedChunk {
    IndexedChunk {
        ordinal,
        chunk: chunk("doc.txt", &format!("chunk {ordinal}"), None),
        vector,
    }
}

fn fixed_index(vectors: Vec<Vec<f32>>) -> VectorIndex {
    let entries = vectors
        .into_iter()
        .zip(0u32..)
        .map(|(vector, ordinal)| entry(ordinal, vector))
        .collect();
    VectorIndex::from_parts(entries, "fixed".to_string(), "fp".to_string())
        .expect("should assemble index")
}

#[test]
fn test_search_orders_by_distance() {
    let index = fixed_index(vec![
        vec![10.0, 0.0],
        vec![1.0, 0.0],
        vec![0.0, 3.0],
        vec![0.5, 0.5],
    ]);

    let hits = index.search(&[0.0, 0.0], 3).expect("should search");
    let ordinals: Vec<u32> = hits.iter().map(|h| h.ordinal).collect();

    assert_eq!(ordinals, vec![3, 1, 2]);
    assert!((hits[0].distance - 0.5).abs() < f32::EPSILON);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[test]
fn test_search_ties_keep_corpus_order() {
    let index = fixed_index(vec![
        vec![1.0, 0.0],
        vec![0.0, 1.0],
        vec![-1.0, 0.0],
        vec![0.0, -1.0],
    ]);

    let hits = index.search(&[0.0, 0.0], 4).expect("should search");
    let ordinals: Vec<u32> = hits.iter().map(|h| h.ordinal).collect();

    assert_eq!(ordinals, vec![0, 1, 2, 3]);
}

#[test]
fn test_search_returns_fewer_when_index_is_small() {
    let index = fixed_index(vec![vec![1.0], vec![2.0]]);

    let hits = index.search(&[0.0], 10).expect("should search");

    assert_eq!(hits.len(), 2);
}

#[test]
fn test_search_on_empty_index() {
    let index = fixed_index(Vec::new());

    assert!(index.is_empty());
    assert!(index.search(&[1.0, 2.0], 3).expect("should search").is_empty());
}

#[test]
fn test_search_rejects_dimension_mismatch() {
    let index = fixed_index(vec![vec![1.0, 2.0]]);

    let result = index.search(&[1.0, 2.0, 3.0], 1);

    assert!(matches!(result, Err(RagError::Index(_))));
}

#[test]
fn test_from_parts_rejects_ragged_vectors() {
    let entries = vec![entry(0, vec![1.0, 2.0]), entry(1, vec![1.0])];

    let result = VectorIndex::from_parts(entries, "m".to_string(), "fp".to_string());

    assert!(matches!(result, Err(RagError::Index(_))));
}

#[test]
fn test_from_parts_restores_ordinal_order() {
    let entries = vec![entry(2, vec![2.0]), entry(0, vec![0.0]), entry(1, vec![1.0])];

    let index = VectorIndex::from_parts(entries, "m".to_string(), "fp".to_string())
        .expect("should assemble index");

    let ordinals: Vec<u32> = index.entries().iter().map(|e| e.ordinal).collect();
    assert_eq!(ordinals, vec![0, 1, 2]);
}

#[test]
fn test_build_embeds_every_chunk_in_order() {
    let embedder = KeywordEmbedder::new(VOCABULARY);
    let chunks = vec![
        chunk("a.txt", "alpha alpha", None),
        chunk("b.txt", "beta", None),
        chunk("c.txt", "gamma beta", None),
    ];

    let index = VectorIndex::build(chunks, &embedder).expect("should build");

    assert_eq!(embedder.calls(), 3);
    assert_eq!(index.len(), 3);
    assert_eq!(index.dimension(), 3);
    assert_eq!(index.entries()[0].vector, vec![2.0, 0.0, 0.0]);
    assert_eq!(index.entries()[2].chunk.source_path, "c.txt");
    assert_eq!(index.embedding_model(), "keyword-test");
}

#[test]
fn test_query_finds_matching_chunk() {
    let embedder = KeywordEmbedder::new(VOCABULARY);
    let chunks = vec![
        chunk("a.txt", "alpha", None),
        chunk("b.txt", "beta", None),
        chunk("c.txt", "gamma", None),
    ];
    let index = VectorIndex::build(chunks, &embedder).expect("should build");

    let hits = index.query(&embedder, "gamma", 1).expect("should query");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.source_path, "c.txt");
}

#[test]
fn test_fingerprint_tracks_content_and_model() {
    let chunks = vec![chunk("a.txt", "alpha", Some("research"))];
    let base = fingerprint(&chunks, "model-a");

    assert_eq!(base, fingerprint(&chunks, "model-a"));
    assert_ne!(base, fingerprint(&chunks, "model-b"));

    let edited = vec![chunk("a.txt", "alpha!", Some("research"))];
    assert_ne!(base, fingerprint(&edited, "model-a"));

    let recategorised = vec![chunk("a.txt", "alpha", Some("general"))];
    assert_ne!(base, fingerprint(&recategorised, "model-a"));

    let uncategorised = vec![chunk("a.txt", "alpha", None)];
    let empty_category = vec![chunk("a.txt", "alpha", Some(""))];
    assert_ne!(
        fingerprint(&uncategorised, "model-a"),
        fingerprint(&empty_category, "model-a")
    );
}

#[test]
fn test_fingerprint_is_not_fooled_by_field_boundaries() {
    let split_one = vec![chunk("ab", "c", None)];
    let split_two = vec![chunk("a", "bc", None)];

    assert_ne!(fingerprint(&split_one, "m"), fingerprint(&split_two, "m"));
}

#[tokio::test]
async fn test_build_or_load_reuses_persisted_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = IndexConfig::default();
    let chunks = vec![chunk("a.txt", "alpha", None), chunk("b.txt", "beta", None)];

    let first = KeywordEmbedder::new(VOCABULARY);
    let built = build_or_load(chunks.clone(), temp_dir.path(), &first, &config)
        .await
        .expect("should build index");
    assert_eq!(first.calls(), 2);

    let second = KeywordEmbedder::new(VOCABULARY);
    let loaded = build_or_load(chunks, temp_dir.path(), &second, &config)
        .await
        .expect("should load index");

    assert_eq!(second.calls(), 0);
    assert_eq!(loaded, built);
}

#[tokio::test]
async fn test_build_or_load_rebuilds_on_changed_corpus() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = IndexConfig::default();

    let embedder = KeywordEmbedder::new(VOCABULARY);
    build_or_load(
        vec![chunk("a.txt", "alpha", None)],
        temp_dir.path(),
        &embedder,
        &config,
    )
    .await
    .expect("should build index");

    let changed = vec![chunk("a.txt", "alpha", None), chunk("b.txt", "gamma", None)];
    let rebuilt_with = KeywordEmbedder::new(VOCABULARY);
    let rebuilt = build_or_load(changed.clone(), temp_dir.path(), &rebuilt_with, &config)
        .await
        .expect("should rebuild index");

    assert_eq!(rebuilt_with.calls(), 2);
    assert_eq!(rebuilt.len(), 2);
    assert_eq!(rebuilt.fingerprint(), fingerprint(&changed, "keyword-test"));
}

#[tokio::test]
async fn test_build_or_load_rebuilds_on_changed_model() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = IndexConfig::default();
    let chunks = vec![chunk("a.txt", "alpha", None)];

    let old_model = KeywordEmbedder::with_model("old", VOCABULARY);
    build_or_load(chunks.clone(), temp_dir.path(), &old_model, &config)
        .await
        .expect("should build index");

    let new_model = KeywordEmbedder::with_model("new", VOCABULARY);
    let rebuilt = build_or_load(chunks, temp_dir.path(), &new_model, &config)
        .await
        .expect("should rebuild index");

    assert_eq!(new_model.calls(), 1);
    assert_eq!(rebuilt.embedding_model(), "new");
}

#[tokio::test]
async fn test_build_or_load_without_verification_keeps_stale_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = IndexConfig {
        verify_fingerprint: false,
    };

    let embedder = KeywordEmbedder::new(VOCABULARY);
    let original = build_or_load(
        vec![chunk("a.txt", "alpha", None)],
        temp_dir.path(),
        &embedder,
        &config,
    )
    .await
    .expect("should build index");

    let later = KeywordEmbedder::new(VOCABULARY);
    let reused = build_or_load(
        vec![chunk("z.txt", "gamma", None)],
        temp_dir.path(),
        &later,
        &config,
    )
    .await
    .expect("should reuse index");

    assert_eq!(later.calls(), 0);
    assert_eq!(reused, original);
}
