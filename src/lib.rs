//! # SpiteDB Memory - In-Memory Event Stream Store
//!
//! An event store that keeps everything in process memory. It provides:
//!
//! - **Event sourcing primitives**: named streams, per-stream versions, one
//!   ordered global log
//! - **Optimistic concurrency**: every write carries an expected version
//! - **Deletion with tombstones**: deleted events and streams leave an audit
//!   trail on the reserved `$deleted` stream
//! - **Retention**: per-stream `max_count` and `max_age` metadata
//! - **Subscriptions**: catch up from any position, then tail live
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  InMemoryStreamStore (api)                      │
//! │      append, read, delete, metadata, subscribe, dispose         │
//! └──────────────┬──────────────────────────────────┬───────────────┘
//!                │ one lock acquisition per call    │ spawn
//!                ▼                                  ▼
//! ┌──────────────────────────────────┐   ┌─────────────────────────┐
//! │      StoreState (orchestrator)   │   │  Subscription tasks     │
//! │                                  │   │  (catch-up, then live)  │
//! │  ┌──────────────┐ ┌───────────┐  │   └────────────▲────────────┘
//! │  │ StreamLedger │ │ AllStream │  │                │
//! │  │  per stream  │ │  Ledger   │  │── AppendSignal ┘
//! │  └──────────────┘ └───────────┘  │
//! └──────────────────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **Global ordering**: checkpoints strictly increase from 0, are never
//!    reused, and survive deletion of the events they point at
//! 2. **Stream correctness**: the i-th event appended to a stream has version i;
//!    deletion never renumbers survivors
//! 3. **Atomic appends**: a batch is fully validated before the first event is
//!    linked, so a failed append leaves no trace
//! 4. **Ordered delivery**: a subscription sees each event at most once, in
//!    position order
//!
//! ## Module Organization
//!
//! - [`error`]: Error enum for all failure modes
//! - [`types`]: Domain types (StreamId, StreamVersion, Checkpoint, pages, ...)
//! - [`stream_ledger`]: Per-stream version ledger
//! - [`all_stream`]: Global ledger and checkpoint assignment
//! - [`metadata`]: Payloads of metadata and tombstone events
//! - [`subscription`]: Catch-up + live subscriptions
//! - [`stream_store`]: The `StreamStore` contract
//! - [`api`]: `InMemoryStreamStore` (main entry point)

/// Error types for stream store operations.
pub mod error;

/// Domain types for event sourcing.
///
/// Newtypes for identifiers and positions, the expected-version sentinel,
/// events, and read pages.
pub mod types;

/// Time source for event timestamps and max-age checks.
pub mod clock;

/// Cooperative cancellation.
pub mod cancel;

/// Per-stream ledger: sparse, keyed by version, with optimistic concurrency.
pub mod stream_ledger;

/// Global ledger spanning every stream, in commit order.
pub mod all_stream;

/// Reserved streams and the JSON payloads written to them.
pub mod metadata;

mod orchestrator;

/// Subscriptions and live tailing.
///
/// Each subscription is a tokio task that reads history in pages, then waits
/// on the store's append signal and re-reads from its own position.
pub mod subscription;

/// The generic stream store contract.
pub mod stream_store;

/// Async API for the in-memory store.
///
/// The main entry point is [`InMemoryStreamStore`](api::InMemoryStreamStore).
pub mod api;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::{InMemoryStreamStore, StoreConfig};
pub use cancel::{CancelSignal, Canceller};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use stream_store::StreamStore;

pub use types::{
    AppendResult, Checkpoint, EventId, ExpectedVersion, NewStreamEvent, PageReadStatus,
    ReadAllPage, ReadDirection, ReadStreamPage, SetStreamMetadata, StreamEvent, StreamId,
    StreamMetadataResult, StreamVersion,
};

pub use subscription::{
    handler_fn, AllStart, DropReason, StreamStart, SubscriptionHandle, SubscriptionHandler,
    SubscriptionSettings, SubscriptionState,
};
