mod common;

use common::{append, none};
use spitedb_memory::metadata::{
    MessageDeleted, StreamDeleted, MESSAGE_DELETED_EVENT_TYPE, STREAM_DELETED_EVENT_TYPE,
};
use spitedb_memory::{
    Checkpoint, EventId, ExpectedVersion, InMemoryStreamStore, PageReadStatus, SetStreamMetadata,
    StreamId, StreamStore, StreamVersion,
};

async fn deleted_stream_types(store: &InMemoryStreamStore) -> Vec<String> {
    let page = store
        .read_stream_forwards(&StreamId::deleted(), StreamVersion::START, 100, &none())
        .await
        .unwrap();
    page.events.into_iter().map(|e| e.event_type).collect()
}

#[tokio::test]
async fn deleted_stream_keeps_global_history() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("orders-1");
    append(&store, "orders-1", ExpectedVersion::NoStream, 3).await;

    let deleted = store
        .delete_stream(&stream, ExpectedVersion::Any, &none())
        .await
        .unwrap();
    assert!(deleted);

    let page = store
        .read_stream_forwards(&stream, StreamVersion::START, 10, &none())
        .await
        .unwrap();
    assert_eq!(page.status, PageReadStatus::StreamNotFound);

    let all = store.read_all_forwards(Checkpoint::NONE, 10, &none()).await.unwrap();
    assert_eq!(all.events.len(), 4);
    for (i, event) in all.events[..3].iter().enumerate() {
        assert_eq!(event.stream_id.as_str(), "orders-1");
        assert_eq!(event.stream_version.as_raw(), i as i64);
    }

    let tombstone = &all.events[3];
    assert!(tombstone.stream_id.is_deleted_stream());
    assert_eq!(tombstone.event_type, STREAM_DELETED_EVENT_TYPE);
    let payload: StreamDeleted = serde_json::from_slice(&tombstone.data).unwrap();
    assert_eq!(payload.stream_id, "orders-1");
}

#[tokio::test]
async fn deleting_an_event_emits_one_tombstone() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("s");
    append(&store, "s", ExpectedVersion::NoStream, 3).await;

    let page = store
        .read_stream_forwards(&stream, StreamVersion::START, 10, &none())
        .await
        .unwrap();
    let victim = page.events[1].event_id;

    assert!(store.delete_event(&stream, victim, &none()).await.unwrap());
    assert_eq!(deleted_stream_types(&store).await, vec![MESSAGE_DELETED_EVENT_TYPE]);

    let tombstones = store
        .read_stream_forwards(&StreamId::deleted(), StreamVersion::START, 10, &none())
        .await
        .unwrap();
    let payload: MessageDeleted = serde_json::from_slice(&tombstones.events[0].data).unwrap();
    assert_eq!(payload.stream_id, "s");
    assert_eq!(payload.message_id, victim.to_string());

    // Survivors keep their versions.
    let page = store
        .read_stream_forwards(&stream, StreamVersion::START, 10, &none())
        .await
        .unwrap();
    let versions: Vec<i64> = page.events.iter().map(|e| e.stream_version.as_raw()).collect();
    assert_eq!(versions, vec![0, 2]);
    assert_eq!(page.last_stream_version.as_raw(), 2);

    // The global log still holds the deleted event.
    let all = store.read_all_forwards(Checkpoint::START, 10, &none()).await.unwrap();
    assert!(all.events.iter().any(|e| e.event_id == victim));
}

#[tokio::test]
async fn deleting_a_missing_event_is_a_no_op() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("s");
    append(&store, "s", ExpectedVersion::NoStream, 1).await;

    assert!(!store.delete_event(&stream, EventId::new_random(), &none()).await.unwrap());
    assert!(!store
        .delete_event(&StreamId::new("unknown"), EventId::new_random(), &none())
        .await
        .unwrap());
    assert!(deleted_stream_types(&store).await.is_empty());
    assert_eq!(store.read_head_checkpoint(&none()).await.unwrap().as_raw(), 0);
}

#[tokio::test]
async fn deleting_events_keeps_expected_version_on_append_history() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("s");
    append(&store, "s", ExpectedVersion::NoStream, 2).await;

    let page = store
        .read_stream_forwards(&stream, StreamVersion::START, 10, &none())
        .await
        .unwrap();
    for event in &page.events {
        store.delete_event(&stream, event.event_id, &none()).await.unwrap();
    }
    assert_eq!(store.get_stream_event_count(&stream, &none()).await.unwrap(), 0);

    // The stream still exists with its history's version.
    let page = store
        .read_stream_forwards(&stream, StreamVersion::START, 10, &none())
        .await
        .unwrap();
    assert_eq!(page.status, PageReadStatus::Success);
    assert!(page.events.is_empty());

    let result = append(&store, "s", ExpectedVersion::exact(1), 1).await;
    assert_eq!(result.current_version.as_raw(), 2);
}

#[tokio::test]
async fn delete_stream_checks_expected_version() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("s");
    append(&store, "s", ExpectedVersion::NoStream, 2).await;

    let err = store
        .delete_stream(&stream, ExpectedVersion::exact(5), &none())
        .await
        .unwrap_err();
    assert!(err.is_wrong_expected_version());

    let err = store
        .delete_stream(&stream, ExpectedVersion::NoStream, &none())
        .await
        .unwrap_err();
    assert!(err.is_wrong_expected_version());

    assert!(store
        .delete_stream(&stream, ExpectedVersion::exact(1), &none())
        .await
        .unwrap());
}

#[tokio::test]
async fn deleting_unknown_stream_is_silent() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("never");

    assert!(!store.delete_stream(&stream, ExpectedVersion::Any, &none()).await.unwrap());
    assert!(!store
        .delete_stream(&stream, ExpectedVersion::NoStream, &none())
        .await
        .unwrap());
    assert_eq!(store.read_head_checkpoint(&none()).await.unwrap(), Checkpoint::NONE);

    let err = store
        .delete_stream(&stream, ExpectedVersion::exact(0), &none())
        .await
        .unwrap_err();
    assert!(err.is_wrong_expected_version());
}

#[tokio::test]
async fn deleting_a_stream_also_deletes_its_metadata() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("s");
    append(&store, "s", ExpectedVersion::NoStream, 1).await;
    store
        .set_stream_metadata(
            &stream,
            ExpectedVersion::NoStream,
            SetStreamMetadata {
                max_count: Some(10),
                ..Default::default()
            },
            &none(),
        )
        .await
        .unwrap();

    store.delete_stream(&stream, ExpectedVersion::Any, &none()).await.unwrap();

    let meta = store.get_stream_metadata(&stream, &none()).await.unwrap();
    assert_eq!(meta.metadata_stream_version, StreamVersion::NONE);
    assert!(meta.max_count.is_none());

    // One tombstone for the stream, one for its metadata stream.
    assert_eq!(
        deleted_stream_types(&store).await,
        vec![STREAM_DELETED_EVENT_TYPE, STREAM_DELETED_EVENT_TYPE]
    );
}

#[tokio::test]
async fn a_deleted_stream_can_be_recreated() {
    let store = InMemoryStreamStore::new();
    let stream = StreamId::new("s");
    append(&store, "s", ExpectedVersion::NoStream, 3).await;
    store.delete_stream(&stream, ExpectedVersion::Any, &none()).await.unwrap();

    let result = append(&store, "s", ExpectedVersion::NoStream, 1).await;
    assert_eq!(result.current_version.as_raw(), 0);
    // 3 events + 1 tombstone before the new one.
    assert_eq!(result.current_checkpoint.as_raw(), 4);
}
