//! # Domain Types for the Stream Store
//!
//! This module defines the types that flow through the store: stream and event
//! identifiers, positions, the expected-version sentinel, events, and read pages.
//!
//! ## Design Philosophy: Newtypes for Safety
//!
//! Positions are wrapped in single-field structs so a [`Checkpoint`] can never be
//! passed where a [`StreamVersion`] is expected:
//!
//! ```rust
//! use spitedb_memory::types::{Checkpoint, StreamVersion};
//!
//! fn example(pos: Checkpoint, version: StreamVersion) {
//!     // pos == version  // Won't compile
//! }
//! ```
//!
//! ## Invariants
//!
//! - [`Checkpoint`]: strictly increasing across the store, starts at 0, never reused
//! - [`StreamVersion`]: starts at 0 per stream, assigned contiguously at append time
//! - Both use −1 (`NONE`) for "nothing yet", so "before the beginning" needs no `Option`

use std::fmt;

use uuid::Uuid;

// =============================================================================
// Stream Identification
// =============================================================================

/// Prefix of the derived metadata stream name (`"$$" + stream_id`).
pub const METADATA_STREAM_PREFIX: &str = "$$";

/// Reserved stream receiving one tombstone event per deletion.
pub const DELETED_STREAM_ID: &str = "$deleted";

/// A human-readable identifier for an event stream.
///
/// # Example
///
/// ```rust
/// use spitedb_memory::types::StreamId;
///
/// let stream = StreamId::new("orders-1");
/// assert_eq!(stream.as_str(), "orders-1");
/// assert_eq!(stream.metadata_stream().as_str(), "$$orders-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a new stream ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The reserved `$deleted` stream.
    pub fn deleted() -> Self {
        Self(DELETED_STREAM_ID.to_string())
    }

    /// Returns the string representation of this stream ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the derived stream holding this stream's metadata events.
    pub fn metadata_stream(&self) -> StreamId {
        Self(format!("{}{}", METADATA_STREAM_PREFIX, self.0))
    }

    /// Returns true for `"$$…"` metadata streams.
    pub fn is_metadata_stream(&self) -> bool {
        self.0.starts_with(METADATA_STREAM_PREFIX)
    }

    /// Returns true for the `$deleted` tombstone stream.
    pub fn is_deleted_stream(&self) -> bool {
        self.0 == DELETED_STREAM_ID
    }

    /// Returns true for streams only the store itself writes to.
    pub fn is_reserved(&self) -> bool {
        self.is_metadata_stream() || self.is_deleted_stream()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&StreamId> for StreamId {
    fn from(s: &StreamId) -> Self {
        s.clone()
    }
}

/// Opaque unique identifier of an event.
///
/// Callers may supply their own (which makes appends replayable, see
/// [`ExpectedVersion`]) or let the store generate a random one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(Uuid);

impl EventId {
    /// Generates a new random event id.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// =============================================================================
// Positions
// =============================================================================

/// A version number within a stream.
///
/// Versions are zero-based. The i-th event ever appended to a stream has
/// version i. Deleting an event never renumbers its successors, so the live
/// sequence of a stream may have holes, but its append history never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamVersion(i64);

impl StreamVersion {
    /// "No events yet" (−1). The version reported for a missing stream.
    pub const NONE: StreamVersion = StreamVersion(-1);

    /// The first version of a stream (0). Use as `start_version` to read from
    /// the beginning.
    pub const START: StreamVersion = StreamVersion(0);

    /// Backward reads starting here begin at the stream's current tail.
    pub const END: StreamVersion = StreamVersion(i64::MAX);

    /// Creates a StreamVersion from a raw value.
    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub fn as_raw(&self) -> i64 {
        self.0
    }

    /// Returns the next version. Saturates at [`StreamVersion::END`].
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the previous version.
    pub fn prev(&self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Returns true for [`StreamVersion::NONE`].
    pub fn is_none(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for StreamVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::END => write!(f, "end"),
            v if v.is_none() => write!(f, "none"),
            v => write!(f, "{}", v.0),
        }
    }
}

/// A position in the global (all-stream) log.
///
/// Assigned from a single counter at commit time. Strictly increasing, never
/// reused, and retained even after the owning event or stream is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checkpoint(i64);

impl Checkpoint {
    /// "Before the beginning" (−1). The head of an empty store.
    pub const NONE: Checkpoint = Checkpoint(-1);

    /// The first checkpoint ever assigned (0).
    pub const START: Checkpoint = Checkpoint(0);

    /// Backward reads starting here begin at the current tail.
    pub const END: Checkpoint = Checkpoint(i64::MAX);

    /// Creates a Checkpoint from a raw value.
    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub fn as_raw(&self) -> i64 {
        self.0
    }

    /// Returns the next checkpoint. Saturates at [`Checkpoint::END`].
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns true for [`Checkpoint::NONE`] (or any negative value).
    pub fn is_none(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::END => write!(f, "end"),
            c if c.is_none() => write!(f, "none"),
            c => write!(f, "{}", c.0),
        }
    }
}

// =============================================================================
// Optimistic Concurrency
// =============================================================================

/// The caller's belief about a stream's state, checked on every write.
///
/// | Variant | Succeeds when |
/// |---------|---------------|
/// | `Exact(v)` | The stream exists and its last version is `v` |
/// | `NoStream` | The stream does not exist |
/// | `Any` | Always (no concurrency check) |
///
/// Never persisted; it travels with a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpectedVersion {
    /// No concurrency check.
    Any,
    /// The stream must not exist yet.
    NoStream,
    /// The stream's last version must be exactly this.
    Exact(StreamVersion),
}

impl ExpectedVersion {
    /// Shorthand for `ExpectedVersion::Exact(StreamVersion::from_raw(version))`.
    pub fn exact(version: i64) -> Self {
        Self::Exact(StreamVersion::from_raw(version))
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::NoStream => write!(f, "no stream"),
            Self::Exact(v) => write!(f, "{}", v),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// An event to be appended to a stream.
///
/// This is the "input" form. Version, checkpoint and timestamp are assigned
/// during append.
#[derive(Debug, Clone)]
pub struct NewStreamEvent {
    /// Unique id. Re-sending the same ids makes an append replayable.
    pub event_id: EventId,

    /// Type discriminator (e.g. `"OrderPlaced"`).
    pub event_type: String,

    /// The event payload. Opaque to the store.
    pub data: Vec<u8>,

    /// Optional metadata (correlation ids and the like). Opaque to the store.
    pub metadata: Option<Vec<u8>>,
}

impl NewStreamEvent {
    /// Creates a new event with a generated id.
    pub fn new(event_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::with_id(EventId::new_random(), event_type, data)
    }

    /// Creates a new event with a caller-supplied id.
    pub fn with_id(
        event_id: EventId,
        event_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            data: data.into(),
            metadata: None,
        }
    }

    /// Adds metadata to this event (builder pattern).
    pub fn with_metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// A committed event with full position information.
///
/// Immutable once created. The same record is shared by the stream's ledger
/// and the global ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// The stream this event belongs to.
    pub stream_id: StreamId,

    /// Unique id of the event.
    pub event_id: EventId,

    /// Version within the stream.
    pub stream_version: StreamVersion,

    /// Position in the global log.
    pub checkpoint: Checkpoint,

    /// When the event was committed (Unix milliseconds).
    pub created_ms: u64,

    /// The event type.
    pub event_type: String,

    /// The event payload.
    pub data: Vec<u8>,

    /// The event metadata, if provided.
    pub metadata: Option<Vec<u8>>,
}

// =============================================================================
// Results and Pages
// =============================================================================

/// The result of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    /// The stream's version after the append.
    pub current_version: StreamVersion,

    /// The store's head checkpoint after the append.
    pub current_checkpoint: Checkpoint,
}

/// Direction of a paged read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDirection {
    /// Toward the tail.
    Forward,
    /// Toward the beginning.
    Backward,
}

/// Outcome status of a stream read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageReadStatus {
    /// The stream exists; the page may still be empty.
    Success,
    /// The stream does not exist (never created, or deleted).
    StreamNotFound,
}

/// One page of a stream read.
#[derive(Debug, Clone)]
pub struct ReadStreamPage {
    /// The stream that was read.
    pub stream_id: StreamId,

    /// Whether the stream exists.
    pub status: PageReadStatus,

    /// The version the read started from, as requested.
    pub from_version: StreamVersion,

    /// Read direction.
    pub direction: ReadDirection,

    /// The stream's last appended version.
    pub last_stream_version: StreamVersion,

    /// Head checkpoint of the store when this incarnation of the stream was
    /// created. A stream deleted and appended to again gets a new value.
    pub stream_created_at: Checkpoint,

    /// The version to pass as the start of the next page.
    pub next_version: StreamVersion,

    /// True when the walk reached the end of the stream in this direction.
    pub is_end: bool,

    /// Events, ordered in the read direction.
    pub events: Vec<StreamEvent>,
}

impl ReadStreamPage {
    pub(crate) fn not_found(
        stream_id: StreamId,
        from_version: StreamVersion,
        direction: ReadDirection,
    ) -> Self {
        Self {
            stream_id,
            status: PageReadStatus::StreamNotFound,
            from_version,
            direction,
            last_stream_version: StreamVersion::NONE,
            stream_created_at: Checkpoint::NONE,
            next_version: StreamVersion::NONE,
            is_end: true,
            events: Vec::new(),
        }
    }
}

/// One page of an all-stream read.
#[derive(Debug, Clone)]
pub struct ReadAllPage {
    /// The checkpoint the read started from, as requested.
    pub from_checkpoint: Checkpoint,

    /// The checkpoint to pass as the start of the next page.
    pub next_checkpoint: Checkpoint,

    /// True when the walk reached the end of the log in this direction.
    pub is_end: bool,

    /// Read direction.
    pub direction: ReadDirection,

    /// Events, ordered in the read direction.
    pub events: Vec<StreamEvent>,
}

// =============================================================================
// Stream Metadata
// =============================================================================

/// Metadata to write for a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetStreamMetadata {
    /// Events older than this many seconds are hidden from stream reads.
    pub max_age: Option<u64>,

    /// At most this many live events are kept; older ones are deleted.
    pub max_count: Option<u64>,

    /// Opaque caller-defined metadata (usually JSON).
    pub custom: Option<String>,
}

/// The active metadata of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMetadataResult {
    /// The stream the metadata applies to.
    pub stream_id: StreamId,

    /// Version of the metadata stream's latest event, or
    /// [`StreamVersion::NONE`] when metadata was never written.
    pub metadata_stream_version: StreamVersion,

    /// Max age in seconds.
    pub max_age: Option<u64>,

    /// Max live event count.
    pub max_count: Option<u64>,

    /// Opaque caller-defined metadata.
    pub custom: Option<String>,
}

impl StreamMetadataResult {
    pub(crate) fn none(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            metadata_stream_version: StreamVersion::NONE,
            max_age: None,
            max_count: None,
            custom: None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
