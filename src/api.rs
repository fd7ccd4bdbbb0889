//! # Async API for the In-Memory Stream Store
//!
//! [`InMemoryStreamStore`] is the public handle. It is `Clone`; every clone
//! shares one store state behind a single read/write lock.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Async Tasks (callers, subscriptions)            │
//! └───────────────┬──────────────────────────────┬──────────────────┘
//!                 │ write ops                    │ read ops
//!                 ▼                              ▼
//!        ┌─────────────────────────────────────────────────┐
//!        │        RwLock<Option<StoreState>>               │
//!        │   exclusive ◄── one acquisition per call ──► shared
//!        └───────────────┬─────────────────────────────────┘
//!                        │ on commit
//!                        ▼
//!                ┌───────────────┐      wakes      ┌──────────────────┐
//!                │ AppendSignal  │ ──────────────► │ subscription     │
//!                │ (watch<u64>)  │                 │ tasks (re-read)  │
//!                └───────────────┘                 └──────────────────┘
//! ```
//!
//! ## Disposal
//!
//! `dispose()` sets a flag, drops the state and bumps the append signal.
//! Every later call fails with [`Error::Disposed`] (checked before the lock is
//! taken), and live subscriptions drop with
//! [`DropReason::StoreDisposed`](crate::subscription::DropReason) on their next
//! read.
//!
//! ## Locking
//!
//! The lock is a `parking_lot::RwLock` held only for the synchronous body of
//! each call, never across an `.await`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use crate::cancel::CancelSignal;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::orchestrator::{OpContext, StoreState};
use crate::stream_store::StreamStore;
use crate::subscription::{
    self, AllStart, AppendSignal, Cursor, PageSource, StreamStart, SubscriptionHandle,
    SubscriptionHandler, SubscriptionSettings, DEFAULT_PAGE_SIZE,
};
use crate::types::{
    AppendResult, Checkpoint, EventId, ExpectedVersion, NewStreamEvent, ReadAllPage,
    ReadStreamPage, SetStreamMetadata, StreamId, StreamMetadataResult, StreamVersion,
};

// =============================================================================
// Configuration
// =============================================================================

/// Default upper bound on `max_count` for a single read.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 10_000;

/// Configuration for the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Reads asking for more events than this are clamped.
    pub max_page_size: usize,

    /// Page size for subscriptions that do not set one.
    pub default_subscription_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            default_subscription_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

// =============================================================================
// Shared State
// =============================================================================

struct Shared {
    // None once disposed
    state: RwLock<Option<StoreState>>,
    disposed: AtomicBool,
    signal: AppendSignal,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
}

impl Shared {
    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> Result<T>) -> Result<T> {
        self.ensure_live()?;
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(Error::Disposed)?;
        f(state)
    }

    fn write<T>(
        &self,
        cancel: &CancelSignal,
        f: impl FnOnce(&mut StoreState, &OpContext<'_>) -> Result<T>,
    ) -> Result<T> {
        self.ensure_live()?;
        cancel.check()?;
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(Error::Disposed)?;
        let ctx = OpContext {
            clock: self.clock.as_ref(),
            signal: &self.signal,
            cancel,
        };
        f(state, &ctx)
    }

    fn clamp(&self, max_count: usize) -> usize {
        max_count.min(self.config.max_page_size)
    }
}

impl PageSource for Shared {
    fn read_stream_page(
        &self,
        stream_id: &StreamId,
        from: StreamVersion,
        max_count: usize,
    ) -> Result<ReadStreamPage> {
        let now_ms = self.clock.now_ms();
        let max_count = self.clamp(max_count);
        self.read(|state| state.read_stream_forwards(Some(now_ms), stream_id, from, max_count))
    }

    fn read_all_page(&self, from: Checkpoint, max_count: usize) -> Result<ReadAllPage> {
        let max_count = self.clamp(max_count);
        self.read(|state| Ok(state.read_all_forwards(from, max_count)))
    }
}

/// Only the store writes to reserved streams.
fn ensure_writable(stream_id: &StreamId) -> Result<()> {
    if stream_id.as_str().is_empty() || stream_id.is_reserved() {
        return Err(Error::InvalidStreamId(stream_id.to_string()));
    }
    Ok(())
}

// =============================================================================
// InMemoryStreamStore - The Main Async Handle
// =============================================================================

/// An in-memory event store.
///
/// # Example
///
/// ```rust
/// use spitedb_memory::{
///     CancelSignal, ExpectedVersion, InMemoryStreamStore, NewStreamEvent, StreamId,
///     StreamStore, StreamVersion,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> spitedb_memory::Result<()> {
/// let store = InMemoryStreamStore::new();
/// let stream = StreamId::new("orders-1");
/// let none = CancelSignal::none();
///
/// store
///     .append_to_stream(
///         &stream,
///         ExpectedVersion::NoStream,
///         vec![NewStreamEvent::new("OrderPlaced", b"{}".to_vec())],
///         &none,
///     )
///     .await?;
///
/// let page = store.read_stream_forwards(&stream, StreamVersion::START, 10, &none).await?;
/// assert_eq!(page.events.len(), 1);
///
/// store.dispose().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryStreamStore {
    shared: Arc<Shared>,
}

impl Default for InMemoryStreamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStreamStore {
    /// Creates an empty store with default configuration and the system clock.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates an empty store with custom configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        Self::with_config_and_clock(config, Arc::new(SystemClock))
    }

    /// Creates an empty store reading time from `clock`.
    pub fn with_config_and_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(Some(StoreState::new())),
                disposed: AtomicBool::new(false),
                signal: AppendSignal::new(),
                clock,
                config,
            }),
        }
    }

    /// The store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Number of running subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.signal.receiver_count()
    }

    /// Returns true once [`dispose`](StreamStore::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    fn page_size(&self, settings: &SubscriptionSettings) -> usize {
        settings
            .page_size
            .unwrap_or(self.shared.config.default_subscription_page_size)
    }

    fn spawn_subscription(
        &self,
        cursor: Cursor,
        settings: SubscriptionSettings,
        handler: Box<dyn SubscriptionHandler>,
    ) -> Result<SubscriptionHandle> {
        let page_size = self.page_size(&settings);
        let source: Arc<dyn PageSource> = self.shared.clone();
        subscription::spawn(
            source,
            &self.shared.signal,
            cursor,
            page_size,
            settings.name,
            handler,
        )
    }
}

impl fmt::Debug for InMemoryStreamStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStreamStore")
            .field("disposed", &self.is_disposed())
            .field("subscriptions", &self.subscription_count())
            .field("config", &self.shared.config)
            .finish()
    }
}

#[async_trait]
impl StreamStore for InMemoryStreamStore {
    async fn append_to_stream(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        events: Vec<NewStreamEvent>,
        cancel: &CancelSignal,
    ) -> Result<AppendResult> {
        ensure_writable(stream_id)?;
        self.shared.write(cancel, |state, ctx| {
            state.append_to_stream(ctx, stream_id, expected, events)
        })
    }

    async fn read_stream_forwards(
        &self,
        stream_id: &StreamId,
        start: StreamVersion,
        max_count: usize,
        cancel: &CancelSignal,
    ) -> Result<ReadStreamPage> {
        cancel.check()?;
        self.shared.read_stream_page(stream_id, start, max_count)
    }

    async fn read_stream_backwards(
        &self,
        stream_id: &StreamId,
        from: StreamVersion,
        max_count: usize,
        cancel: &CancelSignal,
    ) -> Result<ReadStreamPage> {
        cancel.check()?;
        let now_ms = self.shared.clock.now_ms();
        let max_count = self.shared.clamp(max_count);
        self.shared.read(|state| {
            state.read_stream_backwards(Some(now_ms), stream_id, from, max_count)
        })
    }

    async fn read_all_forwards(
        &self,
        from: Checkpoint,
        max_count: usize,
        cancel: &CancelSignal,
    ) -> Result<ReadAllPage> {
        cancel.check()?;
        self.shared.read_all_page(from, max_count)
    }

    async fn read_all_backwards(
        &self,
        from: Checkpoint,
        max_count: usize,
        cancel: &CancelSignal,
    ) -> Result<ReadAllPage> {
        cancel.check()?;
        let max_count = self.shared.clamp(max_count);
        self.shared
            .read(|state| Ok(state.read_all_backwards(from, max_count)))
    }

    async fn delete_event(
        &self,
        stream_id: &StreamId,
        event_id: EventId,
        cancel: &CancelSignal,
    ) -> Result<bool> {
        ensure_writable(stream_id)?;
        self.shared
            .write(cancel, |state, ctx| state.delete_event(ctx, stream_id, event_id))
    }

    async fn delete_stream(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        cancel: &CancelSignal,
    ) -> Result<bool> {
        ensure_writable(stream_id)?;
        self.shared
            .write(cancel, |state, ctx| state.delete_stream(ctx, stream_id, expected))
    }

    async fn get_stream_metadata(
        &self,
        stream_id: &StreamId,
        cancel: &CancelSignal,
    ) -> Result<StreamMetadataResult> {
        cancel.check()?;
        self.shared.read(|state| state.get_stream_metadata(stream_id))
    }

    async fn set_stream_metadata(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        metadata: SetStreamMetadata,
        cancel: &CancelSignal,
    ) -> Result<AppendResult> {
        ensure_writable(stream_id)?;
        self.shared.write(cancel, |state, ctx| {
            state.set_stream_metadata(ctx, stream_id, expected, metadata)
        })
    }

    async fn get_stream_event_count(
        &self,
        stream_id: &StreamId,
        cancel: &CancelSignal,
    ) -> Result<usize> {
        cancel.check()?;
        self.shared.read(|state| Ok(state.stream_event_count(stream_id)))
    }

    async fn read_head_checkpoint(&self, cancel: &CancelSignal) -> Result<Checkpoint> {
        cancel.check()?;
        self.shared.read(|state| Ok(state.head_checkpoint()))
    }

    fn subscribe_to_stream(
        &self,
        stream_id: &StreamId,
        start: StreamStart,
        settings: SubscriptionSettings,
        handler: Box<dyn SubscriptionHandler>,
    ) -> Result<SubscriptionHandle> {
        let from = match start {
            StreamStart::Beginning => StreamVersion::START,
            StreamStart::Version(v) => v.max(StreamVersion::START),
            StreamStart::Now => self
                .shared
                .read(|state| Ok(state.stream_current_version(stream_id).next()))?,
        };
        self.shared.ensure_live()?;
        self.spawn_subscription(Cursor::stream(stream_id.clone(), from), settings, handler)
    }

    fn subscribe_to_all(
        &self,
        start: AllStart,
        settings: SubscriptionSettings,
        handler: Box<dyn SubscriptionHandler>,
    ) -> Result<SubscriptionHandle> {
        let from = match start {
            AllStart::Beginning => Checkpoint::START,
            AllStart::After(c) if c != Checkpoint::END => c.next().max(Checkpoint::START),
            AllStart::After(_) | AllStart::Now => self.shared.read(|state| Ok(state.head_checkpoint().next()))?,
        };
        self.shared.ensure_live()?;
        self.spawn_subscription(Cursor::all(from), settings, handler)
    }

    async fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut state) = self.shared.state.write().take() {
            state.clear();
        }
        self.shared.signal.notify();
        info!(subscriptions = self.subscription_count(), "stream store disposed");
    }
}
