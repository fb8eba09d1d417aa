//! Crash and redelivery tests.
//!
//! Each test stops the consumer at a different point of the
//! commit/checkpoint/acknowledge sequence, reopens the databases, and
//! checks that redelivery converges to exactly one vector per chunk.

use std::collections::HashSet;

use pretty_assertions::assert_eq;

use docrag_extract::ChunkerConfig;
use docrag_storage::{QueueStats, WorkQueue};
use e2e_tests::{distinct_paragraphs, drain, TestHarness, BUCKET};

const TOPICS: &[&[&str]] = &[
    &["tundra", "permafrost", "lichen", "caribou"],
    &["reef", "coral", "anemone", "clownfish"],
    &["canyon", "mesa", "butte", "arroyo"],
    &["marsh", "heron", "reeds", "peat"],
];

async fn ingest_four_chunks(harness: &TestHarness) -> Vec<String> {
    let paragraphs = distinct_paragraphs(TOPICS, 8);
    harness
        .upload("biomes.txt", paragraphs.join("\n\n").as_bytes())
        .await;
    let report = harness
        .ingest_service(ChunkerConfig {
            max_words: 5,
            table_rows: 10,
        })
        .ingest_object(BUCKET, "biomes.txt")
        .await
        .unwrap();
    assert_eq!(report.chunks_sent, 4);
    paragraphs
}

/// Every metadata entry points at a durable position, and every chunk id
/// appears exactly once.
fn assert_consistent(harness: &TestHarness, index_len: u64, chunks: usize) {
    assert_eq!(harness.metadata.count().unwrap(), chunks);
    let mut positions = HashSet::new();
    for i in 0..chunks {
        let chunk_id = format!("biomes.txt#{:06}", i);
        let entry = harness
            .metadata
            .get_by_chunk_id(&chunk_id)
            .unwrap()
            .unwrap_or_else(|| panic!("{} missing", chunk_id));
        assert!(entry.vector_position < index_len);
        assert!(positions.insert(entry.vector_position));
        let by_position = harness
            .metadata
            .get_by_position(entry.vector_position)
            .unwrap()
            .unwrap();
        assert_eq!(by_position.chunk_id, chunk_id);
    }
}

#[tokio::test]
async fn test_crash_after_snapshot_before_ack_deduplicates() {
    let harness = TestHarness::new();
    ingest_four_chunks(&harness).await;

    {
        let (mut consumer, _index) = harness.consumer(100).await;
        consumer.poll_once().await.unwrap();
        assert_eq!(consumer.stats().committed, 4);
        consumer.persist_snapshot().await.unwrap();
        // Crash: leases never acknowledged
    }

    let harness = harness.restart();
    let (mut consumer, index) = harness.consumer(100).await;
    assert_eq!(consumer.stats().purged_on_startup, 0);

    drain(&mut consumer).await;
    assert_eq!(consumer.stats().duplicates, 4);
    assert_eq!(consumer.stats().committed, 0);
    assert_eq!(consumer.stats().acknowledged, 4);

    let len = index.read().unwrap().len() as u64;
    assert_eq!(len, 4);
    assert_consistent(&harness, len, 4);
    assert_eq!(harness.queue.stats().await.unwrap(), QueueStats::default());
}

#[tokio::test]
async fn test_crash_between_checkpoints_redoes_only_the_tail() {
    let harness = TestHarness::new();
    ingest_four_chunks(&harness).await;

    {
        let (mut consumer, _index) = harness.consumer(3).await;
        consumer.poll_once().await.unwrap();
        // Three settled triggered a checkpoint; the fourth is committed
        // but neither snapshotted nor acknowledged
        assert_eq!(consumer.stats().checkpoints, 1);
        assert_eq!(consumer.stats().acknowledged, 3);
        assert_eq!(consumer.pending_leases(), 1);
    }

    let harness = harness.restart();
    let (mut consumer, index) = harness.consumer(3).await;
    assert_eq!(index.read().unwrap().len(), 3);
    assert_eq!(consumer.stats().purged_on_startup, 1);

    drain(&mut consumer).await;
    assert_eq!(consumer.stats().committed, 1);
    assert_eq!(consumer.stats().duplicates, 0);

    let len = index.read().unwrap().len() as u64;
    assert_eq!(len, 4);
    assert_consistent(&harness, len, 4);
}

#[tokio::test]
async fn test_uncheckpointed_commits_are_purged_and_redone() {
    let harness = TestHarness::new();
    ingest_four_chunks(&harness).await;

    {
        let (mut consumer, _index) = harness.consumer(100).await;
        consumer.poll_once().await.unwrap();
        assert_eq!(consumer.stats().committed, 4);
        // Crash: metadata written, no snapshot, no ack
    }
    assert_eq!(harness.metadata.count().unwrap(), 4);

    let harness = harness.restart();
    let (mut consumer, index) = harness.consumer(100).await;
    assert_eq!(consumer.stats().purged_on_startup, 4);
    assert_eq!(harness.metadata.count().unwrap(), 0);

    drain(&mut consumer).await;
    assert_eq!(consumer.stats().committed, 4);
    assert_eq!(consumer.stats().duplicates, 0);

    let len = index.read().unwrap().len() as u64;
    assert_eq!(len, 4);
    assert_consistent(&harness, len, 4);
}

#[tokio::test]
async fn test_reingesting_same_object_adds_nothing() {
    let harness = TestHarness::new();
    ingest_four_chunks(&harness).await;
    let (mut consumer, index) = harness.consumer(10).await;
    drain(&mut consumer).await;

    ingest_four_chunks(&harness).await;
    drain(&mut consumer).await;

    assert_eq!(consumer.stats().committed, 4);
    assert_eq!(consumer.stats().duplicates, 4);
    let len = index.read().unwrap().len() as u64;
    assert_eq!(len, 4);
    assert_consistent(&harness, len, 4);
}

#[tokio::test]
async fn test_rocks_queue_persists_dead_letters_across_restart() {
    let harness = TestHarness::new();
    harness.queue.send(b"not a message".to_vec()).await.unwrap();

    {
        let (mut consumer, _index) = harness.consumer(10).await;
        drain(&mut consumer).await;
        assert_eq!(consumer.stats().dead_lettered, 1);
    }

    let harness = harness.restart();
    let stats = harness.queue.stats().await.unwrap();
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(stats.ready, 0);

    let dead = harness.queue.dead_letters(10).await.unwrap();
    assert_eq!(dead[0].body, b"not a message".to_vec());
    assert!(dead[0].reason.starts_with("Malformed message"));
}
