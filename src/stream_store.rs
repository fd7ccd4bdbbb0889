//! # The Stream Store Contract
//!
//! [`StreamStore`] is the generic surface an event-sourcing application codes
//! against. [`InMemoryStreamStore`](crate::InMemoryStreamStore) is the
//! implementation in this crate; a durable backend would implement the same
//! trait.
//!
//! Every async operation takes a [`CancelSignal`]. Pass
//! [`CancelSignal::none()`] when the call should never be cancelled.

use async_trait::async_trait;

use crate::cancel::CancelSignal;
use crate::error::Result;
use crate::subscription::{
    AllStart, StreamStart, SubscriptionHandle, SubscriptionHandler, SubscriptionSettings,
};
use crate::types::{
    AppendResult, Checkpoint, EventId, ExpectedVersion, NewStreamEvent, ReadAllPage,
    ReadStreamPage, SetStreamMetadata, StreamId, StreamMetadataResult, StreamVersion,
};

/// An event store organized as named streams over one global log.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Appends events to a stream under optimistic concurrency.
    ///
    /// # Errors
    ///
    /// - `WrongExpectedVersion` if `expected` does not hold
    /// - `InvalidStreamId` for an empty or reserved stream id
    async fn append_to_stream(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        events: Vec<NewStreamEvent>,
        cancel: &CancelSignal,
    ) -> Result<AppendResult>;

    /// Reads a stream toward its tail from `start` (inclusive).
    async fn read_stream_forwards(
        &self,
        stream_id: &StreamId,
        start: StreamVersion,
        max_count: usize,
        cancel: &CancelSignal,
    ) -> Result<ReadStreamPage>;

    /// Reads a stream toward version 0 from `from` (inclusive).
    /// [`StreamVersion::END`] starts at the tail.
    async fn read_stream_backwards(
        &self,
        stream_id: &StreamId,
        from: StreamVersion,
        max_count: usize,
        cancel: &CancelSignal,
    ) -> Result<ReadStreamPage>;

    /// Reads the global log toward the tail from `from` (inclusive).
    async fn read_all_forwards(
        &self,
        from: Checkpoint,
        max_count: usize,
        cancel: &CancelSignal,
    ) -> Result<ReadAllPage>;

    /// Reads the global log toward the beginning from `from` (inclusive).
    /// [`Checkpoint::END`] starts at the tail.
    async fn read_all_backwards(
        &self,
        from: Checkpoint,
        max_count: usize,
        cancel: &CancelSignal,
    ) -> Result<ReadAllPage>;

    /// Deletes one event. Returns whether it existed.
    async fn delete_event(
        &self,
        stream_id: &StreamId,
        event_id: EventId,
        cancel: &CancelSignal,
    ) -> Result<bool>;

    /// Deletes a stream and its metadata. Returns whether the stream existed.
    async fn delete_stream(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        cancel: &CancelSignal,
    ) -> Result<bool>;

    /// Returns the stream's active metadata.
    async fn get_stream_metadata(
        &self,
        stream_id: &StreamId,
        cancel: &CancelSignal,
    ) -> Result<StreamMetadataResult>;

    /// Writes new metadata for a stream. `expected` applies to the metadata
    /// stream, and the result reports the metadata stream's version.
    async fn set_stream_metadata(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        metadata: SetStreamMetadata,
        cancel: &CancelSignal,
    ) -> Result<AppendResult>;

    /// Number of live events in a stream; 0 for an unknown stream.
    async fn get_stream_event_count(
        &self,
        stream_id: &StreamId,
        cancel: &CancelSignal,
    ) -> Result<usize>;

    /// Last checkpoint assigned; [`Checkpoint::NONE`] for an empty store.
    async fn read_head_checkpoint(&self, cancel: &CancelSignal) -> Result<Checkpoint>;

    /// Subscribes to one stream.
    fn subscribe_to_stream(
        &self,
        stream_id: &StreamId,
        start: StreamStart,
        settings: SubscriptionSettings,
        handler: Box<dyn SubscriptionHandler>,
    ) -> Result<SubscriptionHandle>;

    /// Subscribes to the global log.
    fn subscribe_to_all(
        &self,
        start: AllStart,
        settings: SubscriptionSettings,
        handler: Box<dyn SubscriptionHandler>,
    ) -> Result<SubscriptionHandle>;

    /// Tears the store down. Every later call fails with `Disposed`.
    async fn dispose(&self);
}
