//! # Subscriptions & Live Tailing
//!
//! Push-style subscriptions: each one is a tokio task that catches up from a
//! starting position and then tails the store as new events are committed.
//!
//! ## The Catch-Up + Live Pattern
//!
//! ```text
//!  subscribe(from = 100)                       head = 500
//!        │                                         │
//!        ▼                                         ▼
//!  ┌──────────────────────────────────┐  ┌──────────────────────────────────┐
//!  │ CatchingUp                       │  │ Live                             │
//!  │ forward pages 100..=500 until a  │─►│ wait for the append signal, then │
//!  │ page reports is_end              │  │ re-read from the last position   │
//!  └──────────────────────────────────┘  └──────────────────────────────────┘
//!                 │ cancel / read error / panic         │
//!                 └───────────────────┬─────────────────┘
//!                                     ▼
//!                                  Dropped  (on_dropped runs exactly once)
//! ```
//!
//! ## Why a Signal Instead of a Broadcast of Events?
//!
//! The append signal is a `tokio::sync::watch` channel carrying a generation
//! counter, not the events themselves. A woken subscription always re-reads
//! from its own position, so:
//!
//! - nothing can be missed: the signal is marked seen *before* each read, so
//!   an append racing the read leaves the signal dirty and causes another pass
//! - nothing is delivered twice: each read resumes strictly after the last
//!   delivered position
//! - there is no per-subscriber buffer that a slow consumer could overflow
//!
//! ## Panic Safety
//!
//! Handler callbacks run inside [`std::panic::catch_unwind`]. A panicking
//! `on_event` drops the subscription with [`DropReason::SubscriberError`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::{self, CancelSignal, Canceller};
use crate::error::{Error, Result};
use crate::types::{
    Checkpoint, PageReadStatus, ReadAllPage, ReadStreamPage, StreamEvent, StreamId, StreamVersion,
};

// =============================================================================
// Configuration
// =============================================================================

/// Default number of events fetched per catch-up read.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Per-subscription settings.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSettings {
    /// Name used in log fields. A random one is generated when unset.
    pub name: Option<String>,

    /// Events per read. Falls back to the store's configured default.
    pub page_size: Option<usize>,
}

impl SubscriptionSettings {
    /// Settings with a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            page_size: None,
        }
    }

    /// Sets the page size (builder pattern).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// Where a stream subscription starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStart {
    /// From version 0.
    Beginning,
    /// From this version, inclusive.
    Version(StreamVersion),
    /// Only events appended after the subscription was created.
    Now,
}

/// Where an all-stream subscription starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllStart {
    /// From checkpoint 0.
    Beginning,
    /// Strictly after this checkpoint.
    After(Checkpoint),
    /// Only events committed after the subscription was created.
    Now,
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Spawned, first read not issued yet.
    Starting,
    /// Reading history.
    CatchingUp,
    /// Caught up; waiting for appends.
    Live,
    /// Terminal.
    Dropped,
}

/// Why a subscription stopped. Delivered exactly once to
/// [`SubscriptionHandler::on_dropped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The handle was cancelled or dropped.
    Cancelled,
    /// The subscribed stream was deleted.
    StreamDeleted,
    /// The store was disposed.
    StoreDisposed,
    /// `on_event` panicked; carries the panic message.
    SubscriberError(String),
    /// A read failed for another reason.
    ReadFailed(String),
}

impl DropReason {
    fn from_read_error(err: Error) -> Self {
        match err {
            Error::Disposed => Self::StoreDisposed,
            other => Self::ReadFailed(other.to_string()),
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::StreamDeleted => write!(f, "stream deleted"),
            Self::StoreDisposed => write!(f, "store disposed"),
            Self::SubscriberError(msg) => write!(f, "subscriber error: {}", msg),
            Self::ReadFailed(msg) => write!(f, "read failed: {}", msg),
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

/// Receives a subscription's events.
///
/// Callbacks run on the subscription's task, one at a time, in position order.
///
/// # Example
///
/// ```rust
/// use spitedb_memory::subscription::SubscriptionHandler;
/// use spitedb_memory::types::StreamEvent;
///
/// struct Projector {
///     seen: usize,
/// }
///
/// impl SubscriptionHandler for Projector {
///     fn on_event(&mut self, _event: StreamEvent) {
///         self.seen += 1;
///     }
/// }
/// ```
pub trait SubscriptionHandler: Send + 'static {
    /// Called once per delivered event.
    fn on_event(&mut self, event: StreamEvent);

    /// Called once, the first time the subscription reaches the live phase.
    fn on_caught_up(&mut self) {}

    /// Called exactly once when the subscription stops.
    fn on_dropped(&mut self, reason: DropReason) {
        debug!(%reason, "subscription dropped");
    }
}

/// Adapter turning a pair of closures into a [`SubscriptionHandler`].
pub struct FnHandler<E, D> {
    on_event: E,
    on_dropped: D,
}

/// Builds a handler from an event closure and a drop closure.
pub fn handler_fn<E, D>(on_event: E, on_dropped: D) -> FnHandler<E, D>
where
    E: FnMut(StreamEvent) + Send + 'static,
    D: FnMut(DropReason) + Send + 'static,
{
    FnHandler { on_event, on_dropped }
}

impl<E, D> SubscriptionHandler for FnHandler<E, D>
where
    E: FnMut(StreamEvent) + Send + 'static,
    D: FnMut(DropReason) + Send + 'static,
{
    fn on_event(&mut self, event: StreamEvent) {
        (self.on_event)(event);
    }

    fn on_dropped(&mut self, reason: DropReason) {
        (self.on_dropped)(reason);
    }
}

// =============================================================================
// Append Signal
// =============================================================================

/// Wakes subscriptions after commits. Carries a generation counter.
///
/// Every live subscription task holds exactly one receiver, so the receiver
/// count doubles as the subscription count.
#[derive(Debug)]
pub(crate) struct AppendSignal {
    tx: watch::Sender<u64>,
}

impl Default for AppendSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AppendSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Bumps the generation, waking every receiver.
    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// =============================================================================
// Page Source
// =============================================================================

/// Where a subscription reads its pages from.
pub(crate) trait PageSource: Send + Sync + 'static {
    fn read_stream_page(
        &self,
        stream_id: &StreamId,
        from: StreamVersion,
        max_count: usize,
    ) -> Result<ReadStreamPage>;

    fn read_all_page(&self, from: Checkpoint, max_count: usize) -> Result<ReadAllPage>;
}

/// A subscription's read position. Always the next position to read,
/// inclusive.
#[derive(Debug, Clone)]
pub(crate) enum Cursor {
    Stream {
        stream_id: StreamId,
        next: StreamVersion,
        // Creation checkpoint of the stream incarnation being followed
        followed: Option<Checkpoint>,
    },
    All {
        next: Checkpoint,
    },
}

enum Step {
    Page { events: Vec<StreamEvent>, is_end: bool },
    StreamDeleted,
}

impl Cursor {
    pub fn stream(stream_id: StreamId, next: StreamVersion) -> Self {
        Self::Stream {
            stream_id,
            next,
            followed: None,
        }
    }

    pub fn all(next: Checkpoint) -> Self {
        Self::All { next }
    }

    fn read(&mut self, source: &dyn PageSource, page_size: usize) -> Result<Step> {
        match self {
            Self::Stream {
                stream_id,
                next,
                followed,
            } => {
                let page = source.read_stream_page(stream_id, *next, page_size)?;
                if page.status == PageReadStatus::StreamNotFound {
                    return Ok(if followed.is_some() {
                        Step::StreamDeleted
                    } else {
                        Step::Page {
                            events: Vec::new(),
                            is_end: true,
                        }
                    });
                }
                // Deleted and recreated between two reads.
                if followed.is_some_and(|c| c != page.stream_created_at) {
                    return Ok(Step::StreamDeleted);
                }
                *followed = Some(page.stream_created_at);
                *next = (*next).max(page.next_version);
                Ok(Step::Page {
                    events: page.events,
                    is_end: page.is_end,
                })
            }
            Self::All { next } => {
                let page = source.read_all_page(*next, page_size)?;
                *next = (*next).max(page.next_checkpoint);
                Ok(Step::Page {
                    events: page.events,
                    is_end: page.is_end,
                })
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Stream { stream_id, .. } => stream_id.to_string(),
            Self::All { .. } => "$all".to_string(),
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Owns a running subscription.
///
/// Dropping the handle cancels the subscription. Use [`cancel`](Self::cancel)
/// to also wait until the drop callback has run.
pub struct SubscriptionHandle {
    name: String,
    canceller: Canceller,
    state: watch::Receiver<SubscriptionState>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// The subscription's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Waits until the subscription is live or dropped. Returns true if live.
    pub async fn wait_until_live(&self) -> bool {
        self.state
            .clone()
            .wait_for(|s| matches!(s, SubscriptionState::Live | SubscriptionState::Dropped))
            .await
            .is_ok_and(|s| *s == SubscriptionState::Live)
    }

    /// Stops the subscription and waits for its task to finish.
    ///
    /// `on_dropped(Cancelled)` has run when this returns, unless the
    /// subscription had already dropped for another reason.
    pub async fn cancel(mut self) {
        self.canceller.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(subscription = %self.name, error = %e, "subscription task failed");
            }
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.canceller.cancel();
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Spawns a subscription task on the current tokio runtime.
///
/// # Errors
///
/// `Internal` when called outside a tokio runtime.
pub(crate) fn spawn(
    source: Arc<dyn PageSource>,
    signal: &AppendSignal,
    cursor: Cursor,
    page_size: usize,
    name: Option<String>,
    handler: Box<dyn SubscriptionHandler>,
) -> Result<SubscriptionHandle> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| Error::Internal(format!("subscriptions need a tokio runtime: {}", e)))?;

    let name = name.unwrap_or_else(|| format!("sub-{}", Uuid::new_v4().simple()));
    let (canceller, cancel) = cancel::channel();
    let (state_tx, state_rx) = watch::channel(SubscriptionState::Starting);

    let worker = Worker {
        name: name.clone(),
        source,
        appended: signal.subscribe(),
        cancel,
        state: state_tx,
        cursor,
        page_size: page_size.max(1),
        handler,
    };

    info!(subscription = %name, target = %worker.cursor.describe(), "subscription started");
    let task = runtime.spawn(worker.run());

    Ok(SubscriptionHandle {
        name,
        canceller,
        state: state_rx,
        task: Some(task),
    })
}

struct Worker {
    name: String,
    source: Arc<dyn PageSource>,
    appended: watch::Receiver<u64>,
    cancel: CancelSignal,
    state: watch::Sender<SubscriptionState>,
    cursor: Cursor,
    page_size: usize,
    handler: Box<dyn SubscriptionHandler>,
}

impl Worker {
    async fn run(mut self) {
        let reason = self.drive().await;
        self.state.send_replace(SubscriptionState::Dropped);

        match &reason {
            DropReason::Cancelled | DropReason::StoreDisposed | DropReason::StreamDeleted => {
                info!(subscription = %self.name, %reason, "subscription dropped");
            }
            DropReason::SubscriberError(_) | DropReason::ReadFailed(_) => {
                warn!(subscription = %self.name, %reason, "subscription dropped");
            }
        }

        let handler = &mut self.handler;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.on_dropped(reason))) {
            warn!(
                subscription = %self.name,
                panic = %panic_message(payload.as_ref()),
                "on_dropped panicked"
            );
        }
    }

    async fn drive(&mut self) -> DropReason {
        let mut live = false;
        self.state.send_replace(SubscriptionState::CatchingUp);

        loop {
            // Mark seen before reading; an append after this point re-arms changed()
            self.appended.borrow_and_update();

            loop {
                if self.cancel.is_cancelled() {
                    return DropReason::Cancelled;
                }

                let (events, is_end) = match self.cursor.read(self.source.as_ref(), self.page_size) {
                    Ok(Step::Page { events, is_end }) => (events, is_end),
                    Ok(Step::StreamDeleted) => return DropReason::StreamDeleted,
                    Err(e) => return DropReason::from_read_error(e),
                };

                for event in events {
                    let handler = &mut self.handler;
                    if let Err(payload) =
                        panic::catch_unwind(AssertUnwindSafe(|| handler.on_event(event)))
                    {
                        return DropReason::SubscriberError(panic_message(payload.as_ref()));
                    }
                }

                if is_end {
                    break;
                }
                tokio::task::yield_now().await;
            }

            if !live {
                live = true;
                self.state.send_replace(SubscriptionState::Live);
                debug!(subscription = %self.name, "subscription caught up");

                let handler = &mut self.handler;
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.on_caught_up())) {
                    return DropReason::SubscriberError(panic_message(payload.as_ref()));
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return DropReason::Cancelled,
                changed = self.appended.changed() => {
                    if changed.is_err() {
                        return DropReason::StoreDisposed;
                    }
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
