mod common;

use common::{append, new_events, none};
use spitedb_memory::{
    Checkpoint, Error, EventId, ExpectedVersion, InMemoryStreamStore, NewStreamEvent,
    PageReadStatus, StreamId, StreamStore, StreamVersion,
};

#[tokio::test]
async fn append_three_events_then_read_them_back() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("orders-1");

    let result = append(&store, "orders-1", ExpectedVersion::NoStream, 3).await;
    assert_eq!(result.current_version.as_raw(), 2);
    assert_eq!(result.current_checkpoint.as_raw(), 2);

    assert_eq!(store.get_stream_event_count(&stream, &none()).await.unwrap(), 3);

    let page = store
        .read_stream_forwards(&stream, StreamVersion::START, 10, &none())
        .await
        .unwrap();
    assert_eq!(page.status, PageReadStatus::Success);
    let versions: Vec<i64> = page.events.iter().map(|e| e.stream_version.as_raw()).collect();
    assert_eq!(versions, vec![0, 1, 2]);
    assert!(page.is_end);
    assert_eq!(page.last_stream_version.as_raw(), 2);

    assert_eq!(store.read_head_checkpoint(&none()).await.unwrap().as_raw(), 2);
}

#[tokio::test]
async fn empty_store_reports_no_head_and_empty_pages() {
    let store = InMemoryStreamStore::new();
    assert_eq!(store.read_head_checkpoint(&none()).await.unwrap(), Checkpoint::NONE);

    let page = store.read_all_forwards(Checkpoint::NONE, 10, &none()).await.unwrap();
    assert!(page.events.is_empty());
    assert!(page.is_end);

    let page = store
        .read_stream_forwards(&StreamId::new("missing"), StreamVersion::START, 10, &none())
        .await
        .unwrap();
    assert_eq!(page.status, PageReadStatus::StreamNotFound);
    assert!(page.events.is_empty());
    assert_eq!(
        store.get_stream_event_count(&StreamId::new("missing"), &none()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn checkpoints_increase_across_streams() {
    let store = InMemoryStreamStore::new();
    append(&store, "a", ExpectedVersion::NoStream, 2).await;
    append(&store, "b", ExpectedVersion::NoStream, 2).await;
    append(&store, "a", ExpectedVersion::exact(1), 1).await;

    let page = store.read_all_forwards(Checkpoint::START, 100, &none()).await.unwrap();
    let checkpoints: Vec<i64> = page.events.iter().map(|e| e.checkpoint.as_raw()).collect();
    assert_eq!(checkpoints, vec![0, 1, 2, 3, 4]);
    let streams: Vec<&str> = page.events.iter().map(|e| e.stream_id.as_str()).collect();
    assert_eq!(streams, vec!["a", "a", "b", "b", "a"]);
    assert_eq!(page.events[4].stream_version.as_raw(), 2);
}

#[tokio::test]
async fn expected_version_is_enforced() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("orders-1");
    append(&store, "orders-1", ExpectedVersion::NoStream, 2).await;

    let err = store
        .append_to_stream(&stream, ExpectedVersion::NoStream, new_events("Late", 1), &none())
        .await
        .unwrap_err();
    assert!(err.is_wrong_expected_version());

    let err = store
        .append_to_stream(&stream, ExpectedVersion::exact(0), new_events("Stale", 1), &none())
        .await
        .unwrap_err();
    match err {
        Error::WrongExpectedVersion { stream_id, actual, .. } => {
            assert_eq!(stream_id, "orders-1");
            assert_eq!(actual.as_raw(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    let result = store
        .append_to_stream(&stream, ExpectedVersion::exact(1), new_events("Fresh", 1), &none())
        .await
        .unwrap();
    assert_eq!(result.current_version.as_raw(), 2);

    let err = store
        .append_to_stream(
            &StreamId::new("new-stream"),
            ExpectedVersion::exact(0),
            new_events("Nope", 1),
            &none(),
        )
        .await
        .unwrap_err();
    assert!(err.is_wrong_expected_version());
}

#[tokio::test]
async fn failed_append_leaves_no_trace() {
    let store = InMemoryStreamStore::new();
    append(&store, "a", ExpectedVersion::NoStream, 1).await;

    let _ = store
        .append_to_stream(&StreamId::new("a"), ExpectedVersion::exact(7), new_events("X", 3), &none())
        .await
        .unwrap_err();

    assert_eq!(store.read_head_checkpoint(&none()).await.unwrap().as_raw(), 0);
    assert_eq!(store.get_stream_event_count(&StreamId::new("a"), &none()).await.unwrap(), 1);
}

#[tokio::test]
async fn re_append_with_same_ids_is_idempotent() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("orders-1");
    let batch: Vec<NewStreamEvent> = (0..2)
        .map(|i| NewStreamEvent::with_id(EventId::new_random(), "Placed", vec![i as u8]))
        .collect();

    let first = store
        .append_to_stream(&stream, ExpectedVersion::NoStream, batch.clone(), &none())
        .await
        .unwrap();
    let replay = store
        .append_to_stream(&stream, ExpectedVersion::NoStream, batch.clone(), &none())
        .await
        .unwrap();
    assert_eq!(first, replay);
    assert_eq!(store.get_stream_event_count(&stream, &none()).await.unwrap(), 2);

    let single = store
        .append_to_stream(&stream, ExpectedVersion::Any, vec![batch[0].clone()], &none())
        .await;
    assert!(single.is_ok(), "a prefix replay at its own position succeeds");

    // Reusing an id behind a new one is a conflict, not a replay.
    let mut mixed = new_events("Other", 1);
    mixed.push(batch[1].clone());
    let err = store
        .append_to_stream(&stream, ExpectedVersion::Any, mixed, &none())
        .await
        .unwrap_err();
    assert!(err.is_wrong_expected_version());
}

#[tokio::test]
async fn stream_reads_page_in_both_directions() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("s");
    append(&store, "s", ExpectedVersion::NoStream, 5).await;

    let mut seen = Vec::new();
    let mut next = StreamVersion::START;
    loop {
        let page = store.read_stream_forwards(&stream, next, 2, &none()).await.unwrap();
        seen.extend(page.events.iter().map(|e| e.stream_version.as_raw()));
        next = page.next_version;
        if page.is_end {
            break;
        }
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    assert_eq!(next.as_raw(), 5);

    let mut seen = Vec::new();
    let mut next = StreamVersion::END;
    loop {
        let page = store.read_stream_backwards(&stream, next, 2, &none()).await.unwrap();
        seen.extend(page.events.iter().map(|e| e.stream_version.as_raw()));
        next = page.next_version;
        if page.is_end {
            break;
        }
    }
    assert_eq!(seen, vec![4, 3, 2, 1, 0]);
}

#[tokio::test]
async fn all_reads_page_in_both_directions() {
    let store = InMemoryStreamStore::new();
    append(&store, "a", ExpectedVersion::NoStream, 3).await;
    append(&store, "b", ExpectedVersion::NoStream, 2).await;

    let page = store.read_all_forwards(Checkpoint::NONE, 3, &none()).await.unwrap();
    assert_eq!(page.events.len(), 3);
    assert_eq!(page.next_checkpoint.as_raw(), 3);
    assert!(!page.is_end);

    let page = store
        .read_all_forwards(page.next_checkpoint, 3, &none())
        .await
        .unwrap();
    assert_eq!(page.events.len(), 2);
    assert!(page.is_end);
    assert_eq!(page.next_checkpoint.as_raw(), 5);

    let page = store.read_all_backwards(Checkpoint::END, 2, &none()).await.unwrap();
    let checkpoints: Vec<i64> = page.events.iter().map(|e| e.checkpoint.as_raw()).collect();
    assert_eq!(checkpoints, vec![4, 3]);
    assert_eq!(page.next_checkpoint.as_raw(), 2);
    assert!(!page.is_end);
}

#[tokio::test]
async fn event_payload_and_metadata_are_preserved() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("s");
    let id = EventId::new_random();
    let event = NewStreamEvent::with_id(id, "Greeting", b"hello".to_vec()).with_metadata(b"m".to_vec());

    store
        .append_to_stream(&stream, ExpectedVersion::Any, vec![event], &none())
        .await
        .unwrap();

    let page = store
        .read_stream_forwards(&stream, StreamVersion::START, 1, &none())
        .await
        .unwrap();
    let stored = &page.events[0];
    assert_eq!(stored.event_id, id);
    assert_eq!(stored.event_type, "Greeting");
    assert_eq!(stored.data, b"hello");
    assert_eq!(stored.metadata.as_deref(), Some(&b"m"[..]));
    assert!(stored.created_ms > 0);
}

#[tokio::test]
async fn reserved_and_empty_ids_are_rejected_for_writes() {
    let store = InMemoryStreamStore::new();
    for id in ["", "$deleted", "$$orders-1"] {
        let err = store
            .append_to_stream(&StreamId::new(id), ExpectedVersion::Any, new_events("X", 1), &none())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStreamId(_)), "id {id:?}");
    }

    // Reading a reserved stream is fine.
    let page = store
        .read_stream_forwards(&StreamId::deleted(), StreamVersion::START, 10, &none())
        .await
        .unwrap();
    assert_eq!(page.status, PageReadStatus::StreamNotFound);
}

#[tokio::test]
async fn concurrent_appends_get_distinct_checkpoints() {
    let store = InMemoryStreamStore::new();
    let mut tasks = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                store
                    .append_to_stream(
                        &StreamId::new(format!("s-{i}")),
                        ExpectedVersion::Any,
                        new_events("Tested", 1),
                        &none(),
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let page = store.read_all_forwards(Checkpoint::START, 1000, &none()).await.unwrap();
    let checkpoints: Vec<i64> = page.events.iter().map(|e| e.checkpoint.as_raw()).collect();
    assert_eq!(checkpoints, (0..80).collect::<Vec<i64>>());
    for i in 0..8 {
        let stream = StreamId::new(format!("s-{i}"));
        let page = store
            .read_stream_forwards(&stream, StreamVersion::START, 100, &none())
            .await
            .unwrap();
        let versions: Vec<i64> = page.events.iter().map(|e| e.stream_version.as_raw()).collect();
        assert_eq!(versions, (0..10).collect::<Vec<i64>>());
    }
}
