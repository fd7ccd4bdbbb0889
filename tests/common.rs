#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use spitedb_memory::{
    CancelSignal, DropReason, ExpectedVersion, InMemoryStreamStore, NewStreamEvent, StreamEvent,
    StreamId, StreamStore, SubscriptionHandler,
};

pub const TIMEOUT: Duration = Duration::from_secs(2);
pub const INTERVAL: Duration = Duration::from_millis(5);

/// Routes store logs through the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn none() -> CancelSignal {
    CancelSignal::none()
}

pub fn new_events(event_type: &str, n: usize) -> Vec<NewStreamEvent> {
    (0..n)
        .map(|i| NewStreamEvent::new(event_type, format!("{}-{}", event_type, i).into_bytes()))
        .collect()
}

pub async fn append(
    store: &InMemoryStreamStore,
    stream: &str,
    expected: ExpectedVersion,
    n: usize,
) -> spitedb_memory::AppendResult {
    store
        .append_to_stream(&StreamId::new(stream), expected, new_events("Tested", n), &none())
        .await
        .expect("append")
}

pub async fn eventually<T>(
    timeout: Duration,
    interval: Duration,
    mut f: impl FnMut() -> Option<T>,
) -> T {
    let start = std::time::Instant::now();
    loop {
        if let Some(v) = f() {
            return v;
        }
        if start.elapsed() > timeout {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(interval).await;
    }
}

/// What a [`Recorder`] has seen so far.
#[derive(Debug, Default)]
pub struct Recording {
    pub events: Vec<StreamEvent>,
    pub caught_up: usize,
    pub dropped: Vec<DropReason>,
}

impl Recording {
    pub fn versions(&self) -> Vec<i64> {
        self.events.iter().map(|e| e.stream_version.as_raw()).collect()
    }

    pub fn checkpoints(&self) -> Vec<i64> {
        self.events.iter().map(|e| e.checkpoint.as_raw()).collect()
    }
}

/// Subscription handler that records every callback.
#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Recording>>,
    panic_on_event: Option<usize>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics while handling the n-th event (zero-based).
    pub fn panicking_at(n: usize) -> Self {
        Self {
            inner: Arc::default(),
            panic_on_event: Some(n),
        }
    }

    pub fn boxed(&self) -> Box<dyn SubscriptionHandler> {
        Box::new(self.clone())
    }

    pub fn with<T>(&self, f: impl FnOnce(&Recording) -> T) -> T {
        f(&self.inner.lock().unwrap())
    }

    pub fn event_count(&self) -> usize {
        self.with(|r| r.events.len())
    }

    pub fn dropped(&self) -> Vec<DropReason> {
        self.with(|r| r.dropped.clone())
    }

    pub async fn wait_for_events(&self, n: usize) {
        eventually(TIMEOUT, INTERVAL, || (self.event_count() >= n).then_some(())).await;
    }

    pub async fn wait_for_drop(&self) -> DropReason {
        eventually(TIMEOUT, INTERVAL, || self.dropped().first().cloned()).await
    }
}

impl SubscriptionHandler for Recorder {
    fn on_event(&mut self, event: StreamEvent) {
        let mut inner = self.inner.lock().unwrap();
        if self.panic_on_event == Some(inner.events.len()) {
            drop(inner);
            panic!("handler refused event {}", event.stream_version);
        }
        inner.events.push(event);
    }

    fn on_caught_up(&mut self) {
        self.inner.lock().unwrap().caught_up += 1;
    }

    fn on_dropped(&mut self, reason: DropReason) {
        self.inner.lock().unwrap().dropped.push(reason);
    }
}
