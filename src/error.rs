//! # Error Handling for the Stream Store
//!
//! A single error enum ([`Error`]) covers every failure mode of the store. Callers
//! match on the variant to decide what to do next.
//!
//! ## Error Categories
//!
//! | Category | Variant | Typical Response |
//! |----------|---------|------------------|
//! | Conflict | `WrongExpectedVersion` | Re-read the stream, retry with the fresh version |
//! | Misuse | `Disposed`, `InvalidStreamId` | Fix the caller |
//! | Cancellation | `Cancelled` | Nothing, the caller asked for it |
//! | Internal | `Internal`, `InvalidMetadata` | Log and investigate |
//!
//! "Stream not found" is deliberately *not* an error. Reads against an unknown
//! stream return a page with [`PageReadStatus::StreamNotFound`](crate::types::PageReadStatus)
//! so callers can tell "no such stream" apart from "empty page".

use thiserror::Error;

use crate::types::{ExpectedVersion, StreamVersion};

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in stream store operations.
///
/// # Example
///
/// ```rust
/// use spitedb_memory::{Error, ExpectedVersion, StreamVersion};
///
/// let err = Error::WrongExpectedVersion {
///     stream_id: "orders-1".to_string(),
///     expected: ExpectedVersion::NoStream,
///     actual: StreamVersion::from_raw(2),
/// };
/// assert!(err.is_wrong_expected_version());
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Conflict Errors (Client can retry with updated data)
    // =========================================================================

    /// Optimistic concurrency conflict.
    ///
    /// # When This Happens
    ///
    /// - `Exact(v)` was supplied but the stream's last version is not `v`
    /// - `Exact(v)` was supplied for a stream that does not exist
    /// - `NoStream` was supplied for a stream that already exists
    /// - The batch reuses event ids in a way that is not a clean replay
    ///
    /// # Recovery
    ///
    /// 1. Re-read the stream to get current state
    /// 2. Re-apply business logic with new data
    /// 3. Retry the append with an updated expected version
    #[error("wrong expected version on stream '{stream_id}': expected {expected}, but current version is {actual}")]
    WrongExpectedVersion {
        /// The stream where the conflict occurred.
        stream_id: String,
        /// The version the caller supplied.
        expected: ExpectedVersion,
        /// The stream's current version ([`StreamVersion::NONE`] if it does not exist).
        actual: StreamVersion,
    },

    // =========================================================================
    // Caller Errors
    // =========================================================================

    /// The store has been disposed. Every operation after `dispose()` fails
    /// with this error; the instance can never be used again.
    #[error("stream store has been disposed")]
    Disposed,

    /// The operation's cancellation signal fired before it completed.
    ///
    /// Cancellation is cooperative. Work done before the signal was observed
    /// (for example, some deletions of a retention purge) stays done.
    #[error("operation cancelled")]
    Cancelled,

    /// The stream id is empty, or names a reserved stream that only the store
    /// itself may write to (`$deleted`, `$$…`).
    #[error("invalid stream id '{0}'")]
    InvalidStreamId(String),

    // =========================================================================
    // Internal Errors (Investigate and fix)
    // =========================================================================

    /// A metadata or tombstone payload could not be encoded or decoded.
    #[error("invalid stream metadata: {0}")]
    InvalidMetadata(#[from] serde_json::Error),

    /// A structural invariant (version or checkpoint contiguity) was violated.
    ///
    /// This never happens with correct internal sequencing. It is reported
    /// separately from `WrongExpectedVersion` because it is not recoverable
    /// by the caller.
    #[error("internal consistency error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true for optimistic concurrency conflicts.
    pub fn is_wrong_expected_version(&self) -> bool {
        matches!(self, Error::WrongExpectedVersion { .. })
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
