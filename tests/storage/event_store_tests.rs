//! EventStore contract tests.
//!
//! These verify backend-agnostic behavior: order-preserving atomic appends,
//! optimistic-concurrency errors, read-window semantics, global-sequence
//! monotonicity, and UTC time normalization. Each storage implementation
//! runs the whole set through `run_event_store_tests!`.
//!
//! Stores may be shared across tests, so every test works in its own
//! freshly named stream.

use serde_json::json;
use ulid::Ulid;

use lucida::{
    EnvelopeBatch, EventEnvelope, EventStore, EventStoreError, JsonObject, SinceFilter,
    StreamRange,
};

/// A stream id no other test run has touched.
pub fn fresh_stream_id(prefix: &str) -> String {
    format!("{prefix}-{}", Ulid::new())
}

/// Create a test envelope with a fresh ULID event id.
pub fn make_envelope(stream_type: &str, stream_id: &str, version: i64) -> EventEnvelope {
    let mut payload = JsonObject::new();
    payload.insert("ordinal".to_string(), json!(version));
    let mut metadata = JsonObject::new();
    metadata.insert(
        "correlation_id".to_string(),
        json!(Ulid::new().to_string()),
    );
    EventEnvelope::new(
        stream_type,
        stream_id,
        version,
        Ulid::new().to_string(),
        "ObservationRecorded",
        payload,
        metadata,
    )
    .expect("test envelope should be valid")
}

/// Create a contiguous batch of `count` envelopes starting at `from_version`.
pub fn make_batch(
    stream_type: &str,
    stream_id: &str,
    from_version: i64,
    count: i64,
) -> EnvelopeBatch {
    let events = (from_version..from_version + count)
        .map(|version| make_envelope(stream_type, stream_id, version))
        .collect();
    EnvelopeBatch::from_events(events).expect("test batch should be valid")
}

// =============================================================================
// append: happy path & shapes
// =============================================================================

pub async fn test_append_assigns_seq_and_recorded_at<S: EventStore>(store: &S) {
    let stream_id = fresh_stream_id("assigns");

    let persisted = store
        .append(make_batch("Session", &stream_id, 1, 1))
        .await
        .expect("append should succeed");

    assert_eq!(persisted.len(), 1);
    let event = &persisted[0];
    assert!(event.global_seq.expect("global_seq should be set") >= 1);
    let recorded = event.recorded_at.expect("recorded_at should be set");
    let age = chrono::Utc::now() - recorded;
    assert!(
        age.num_minutes().abs() < 5,
        "recorded_at should be server-now, got {recorded}"
    );
}

pub async fn test_append_returns_input_order<S: EventStore>(store: &S) {
    let stream_id = fresh_stream_id("order");
    let batch = make_batch("Session", &stream_id, 1, 3);
    let input_ids: Vec<String> = batch.events().iter().map(|e| e.event_id.clone()).collect();

    let persisted = store.append(batch).await.expect("append should succeed");

    let output_ids: Vec<String> = persisted.iter().map(|e| e.event_id.clone()).collect();
    assert_eq!(output_ids, input_ids, "order should match input");

    for pair in persisted.windows(2) {
        assert_eq!(pair[1].version, pair[0].version + 1);
        assert!(pair[1].global_seq.unwrap() > pair[0].global_seq.unwrap());
    }
}

pub async fn test_append_ignores_caller_store_fields<S: EventStore>(store: &S) {
    let stream_id = fresh_stream_id("ignored");
    let mut event = make_envelope("Session", &stream_id, 1);
    event.global_seq = Some(9_999_999);
    event.recorded_at = Some("1999-01-01T00:00:00Z".parse().unwrap());
    let batch = EnvelopeBatch::from_events(vec![event]).unwrap();

    let persisted = store.append(batch).await.expect("append should succeed");

    assert_ne!(persisted[0].global_seq, Some(9_999_999));
    assert!(
        persisted[0].recorded_at.unwrap()
            > "2000-01-01T00:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap()
    );
}

pub async fn test_global_seq_monotonic_across_appends<S: EventStore>(store: &S) {
    let stream_a = fresh_stream_id("mono-a");
    let stream_b = fresh_stream_id("mono-b");

    let first = store
        .append(make_batch("Session", &stream_a, 1, 2))
        .await
        .expect("first append should succeed");
    let second = store
        .append(make_batch("Session", &stream_b, 1, 2))
        .await
        .expect("second append should succeed");

    let max_first = first.iter().map(|e| e.global_seq.unwrap()).max().unwrap();
    let min_second = second.iter().map(|e| e.global_seq.unwrap()).min().unwrap();
    assert!(max_first < min_second);
}

// =============================================================================
// append: errors
// =============================================================================

pub async fn test_append_version_conflict_stale<S: EventStore>(store: &S) {
    let stream_id = fresh_stream_id("stale");
    store
        .append(make_batch("Session", &stream_id, 1, 2))
        .await
        .expect("setup append should succeed");

    // Version 2 already exists.
    let err = store
        .append(make_batch("Session", &stream_id, 2, 1))
        .await
        .expect_err("stale append should fail");
    assert!(
        matches!(err, EventStoreError::VersionConflict { .. }),
        "got {err:?}"
    );

    let events = store
        .read_stream(&stream_id, StreamRange::default())
        .await
        .unwrap();
    assert_eq!(events.len(), 2, "conflicting append must not persist");
}

pub async fn test_append_version_conflict_on_empty_stream<S: EventStore>(store: &S) {
    let stream_id = fresh_stream_id("gap");

    let err = store
        .append(make_batch("Session", &stream_id, 5, 1))
        .await
        .expect_err("append past the tip should fail");
    assert!(matches!(err, EventStoreError::VersionConflict { .. }));
}

pub async fn test_append_duplicate_event_id<S: EventStore>(store: &S) {
    let stream_a = fresh_stream_id("dup-a");
    let stream_b = fresh_stream_id("dup-b");

    let persisted = store
        .append(make_batch("Session", &stream_a, 1, 1))
        .await
        .expect("setup append should succeed");

    let mut reused = make_envelope("Session", &stream_b, 1);
    reused.event_id = persisted[0].event_id.clone();
    let err = store
        .append(EnvelopeBatch::from_events(vec![reused]).unwrap())
        .await
        .expect_err("duplicate event_id should fail");
    assert!(
        matches!(err, EventStoreError::DuplicateEventId { .. }),
        "got {err:?}"
    );

    let events = store
        .read_stream(&stream_b, StreamRange::default())
        .await
        .unwrap();
    assert!(events.is_empty(), "no row should be inserted");
}

pub async fn test_append_is_atomic_on_partial_failure<S: EventStore>(store: &S) {
    let stream_id = fresh_stream_id("atomic");
    let persisted = store
        .append(make_batch("Session", &stream_id, 1, 1))
        .await
        .expect("setup append should succeed");

    // Batch of two where the second envelope reuses an existing event_id:
    // the whole batch must be rejected, not just the offending row.
    let good = make_envelope("Session", &stream_id, 2);
    let mut bad = make_envelope("Session", &stream_id, 3);
    bad.event_id = persisted[0].event_id.clone();
    let err = store
        .append(EnvelopeBatch::from_events(vec![good, bad]).unwrap())
        .await
        .expect_err("batch with duplicate should fail");
    assert!(matches!(err, EventStoreError::DuplicateEventId { .. }));

    let events = store
        .read_stream(&stream_id, StreamRange::default())
        .await
        .unwrap();
    assert_eq!(events.len(), 1, "failed batch must leave the stream unchanged");
}

// =============================================================================
// read_stream
// =============================================================================

pub async fn test_read_stream_ascending_with_inclusive_bounds<S: EventStore>(store: &S) {
    let stream_id = fresh_stream_id("window");
    store
        .append(make_batch("Session", &stream_id, 1, 5))
        .await
        .expect("append should succeed");

    let window = store
        .read_stream(&stream_id, StreamRange::new(2, Some(4)).unwrap())
        .await
        .unwrap();
    let versions: Vec<i64> = window.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![2, 3, 4]);

    let limited = store
        .read_stream(
            &stream_id,
            StreamRange::default().with_limit(2).unwrap(),
        )
        .await
        .unwrap();
    let versions: Vec<i64> = limited.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2]);
}

pub async fn test_read_stream_contiguous_from_one<S: EventStore>(store: &S) {
    let stream_id = fresh_stream_id("contig");
    store
        .append(make_batch("Session", &stream_id, 1, 3))
        .await
        .unwrap();
    store
        .append(make_batch("Session", &stream_id, 4, 2))
        .await
        .unwrap();

    let events = store
        .read_stream(&stream_id, StreamRange::default())
        .await
        .unwrap();
    let versions: Vec<i64> = events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
}

pub async fn test_read_stream_empty_cases<S: EventStore>(store: &S) {
    let absent = store
        .read_stream(&fresh_stream_id("absent"), StreamRange::default())
        .await
        .unwrap();
    assert!(absent.is_empty());

    let stream_id = fresh_stream_id("past-tip");
    store
        .append(make_batch("Session", &stream_id, 1, 2))
        .await
        .unwrap();
    let past_tip = store
        .read_stream(&stream_id, StreamRange::new(10, None).unwrap())
        .await
        .unwrap();
    assert!(past_tip.is_empty());
}

// =============================================================================
// read_since
// =============================================================================

pub async fn test_read_since_excludes_cursor_and_ascends<S: EventStore>(store: &S) {
    let stream_id = fresh_stream_id("cursor");
    let persisted = store
        .append(make_batch("Session", &stream_id, 1, 3))
        .await
        .unwrap();

    let cursor = persisted[0].global_seq.unwrap();
    let tail = store
        .read_since(SinceFilter::after(cursor).unwrap())
        .await
        .unwrap();

    assert!(tail.iter().all(|e| e.global_seq.unwrap() > cursor));
    for pair in tail.windows(2) {
        assert!(pair[0].global_seq.unwrap() < pair[1].global_seq.unwrap());
    }
    let ours: Vec<i64> = tail
        .iter()
        .filter(|e| e.stream_id == stream_id)
        .map(|e| e.version)
        .collect();
    assert_eq!(ours, vec![2, 3]);
}

pub async fn test_read_since_respects_limit<S: EventStore>(store: &S) {
    let stream_type = format!("T{}", Ulid::new());
    let stream_id = fresh_stream_id("limit");
    store
        .append(make_batch(&stream_type, &stream_id, 1, 4))
        .await
        .unwrap();

    let limited = store
        .read_since(
            SinceFilter::after(0)
                .unwrap()
                .for_stream_type(&stream_type)
                .with_limit(2)
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].version, 1);
    assert_eq!(limited[1].version, 2);
}

pub async fn test_read_since_filters_coarsely<S: EventStore>(store: &S) {
    // Unique stream_type so parallel test traffic cannot leak in.
    let stream_type = format!("T{}", Ulid::new());
    let stream_id = fresh_stream_id("filter");

    let mut first = make_envelope(&stream_type, &stream_id, 1);
    first.event_type = "ExposureStarted".to_string();
    let mut second = make_envelope(&stream_type, &stream_id, 2);
    second.event_type = "ExposureCompleted".to_string();
    store
        .append(EnvelopeBatch::from_events(vec![first, second]).unwrap())
        .await
        .unwrap();

    let by_stream_type = store
        .read_since(SinceFilter::default().for_stream_type(&stream_type))
        .await
        .unwrap();
    assert_eq!(by_stream_type.len(), 2);

    let by_event_type = store
        .read_since(
            SinceFilter::default()
                .for_stream_type(&stream_type)
                .for_event_type("ExposureCompleted"),
        )
        .await
        .unwrap();
    assert_eq!(by_event_type.len(), 1);
    assert_eq!(by_event_type[0].version, 2);
}

pub async fn test_read_since_empty_for_large_cursor<S: EventStore>(store: &S) {
    let tail = store
        .read_since(SinceFilter::after(i64::MAX - 1).unwrap())
        .await
        .unwrap();
    assert!(tail.is_empty());
}

// =============================================================================
// round trips
// =============================================================================

pub async fn test_read_stream_matches_append_return<S: EventStore>(store: &S) {
    let stream_id = fresh_stream_id("roundtrip");
    let persisted = store
        .append(make_batch("Session", &stream_id, 1, 3))
        .await
        .unwrap();

    let read_back = store
        .read_stream(&stream_id, StreamRange::default())
        .await
        .unwrap();
    assert_eq!(read_back, persisted);
}

pub async fn test_payload_and_metadata_round_trip<S: EventStore>(store: &S) {
    let stream_id = fresh_stream_id("payload");
    let mut payload = JsonObject::new();
    payload.insert("name".to_string(), json!("n1"));
    payload.insert("counts".to_string(), json!([1, 2, 3]));
    payload.insert("nested".to_string(), json!({"ra": 182.53, "dec": null}));
    payload.insert(
        "frame_digest".to_string(),
        json!("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"),
    );
    let mut metadata = JsonObject::new();
    metadata.insert("actor".to_string(), json!("pipeline"));
    metadata.insert("causation_id".to_string(), json!(Ulid::new().to_string()));

    let event = EventEnvelope::new(
        "Session",
        &stream_id,
        1,
        Ulid::new().to_string(),
        "SessionStarted",
        payload.clone(),
        metadata.clone(),
    )
    .unwrap();
    store
        .append(EnvelopeBatch::from_events(vec![event]).unwrap())
        .await
        .unwrap();

    let read_back = store
        .read_stream(&stream_id, StreamRange::default())
        .await
        .unwrap();
    assert_eq!(read_back[0].payload, payload);
    assert_eq!(read_back[0].metadata, metadata);
}

/// Run the full EventStore contract against one backend instance.
#[macro_export]
macro_rules! run_event_store_tests {
    ($store:expr) => {
        use $crate::storage::event_store_tests::*;

        test_append_assigns_seq_and_recorded_at($store).await;
        println!("  test_append_assigns_seq_and_recorded_at: PASSED");

        test_append_returns_input_order($store).await;
        println!("  test_append_returns_input_order: PASSED");

        test_append_ignores_caller_store_fields($store).await;
        println!("  test_append_ignores_caller_store_fields: PASSED");

        test_global_seq_monotonic_across_appends($store).await;
        println!("  test_global_seq_monotonic_across_appends: PASSED");

        test_append_version_conflict_stale($store).await;
        println!("  test_append_version_conflict_stale: PASSED");

        test_append_version_conflict_on_empty_stream($store).await;
        println!("  test_append_version_conflict_on_empty_stream: PASSED");

        test_append_duplicate_event_id($store).await;
        println!("  test_append_duplicate_event_id: PASSED");

        test_append_is_atomic_on_partial_failure($store).await;
        println!("  test_append_is_atomic_on_partial_failure: PASSED");

        test_read_stream_ascending_with_inclusive_bounds($store).await;
        println!("  test_read_stream_ascending_with_inclusive_bounds: PASSED");

        test_read_stream_contiguous_from_one($store).await;
        println!("  test_read_stream_contiguous_from_one: PASSED");

        test_read_stream_empty_cases($store).await;
        println!("  test_read_stream_empty_cases: PASSED");

        test_read_since_excludes_cursor_and_ascends($store).await;
        println!("  test_read_since_excludes_cursor_and_ascends: PASSED");

        test_read_since_respects_limit($store).await;
        println!("  test_read_since_respects_limit: PASSED");

        test_read_since_filters_coarsely($store).await;
        println!("  test_read_since_filters_coarsely: PASSED");

        test_read_since_empty_for_large_cursor($store).await;
        println!("  test_read_since_empty_for_large_cursor: PASSED");

        test_read_stream_matches_append_return($store).await;
        println!("  test_read_stream_matches_append_return: PASSED");

        test_payload_and_metadata_round_trip($store).await;
        println!("  test_payload_and_metadata_round_trip: PASSED");
    };
}
