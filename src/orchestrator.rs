//! # Store Orchestrator
//!
//! [`StoreState`] owns the stream map and the global ledger and implements every
//! store operation on top of them. It holds no lock of its own: the async handle
//! in [`api`](crate::api) takes the store lock exactly once per public call and
//! hands the borrowed state in here.
//!
//! ## Why No Re-entrant Lock?
//!
//! An append has to look up the stream's metadata, and a retention purge has
//! to run the single-event delete path, which appends a tombstone. With a lock
//! taken per operation those nested calls would re-acquire it. Instead, nested
//! steps call each other directly on `&mut self`, which the borrow checker
//! already proves exclusive.
//!
//! ```text
//! append_to_stream ──► append_internal ──► StreamLedger::append
//!        │                    │                    └─► AllStreamLedger::link
//!        │                    └─► AppendSignal::notify
//!        └─► check_stream_max_count ──► delete_event ──► append_internal($deleted)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::all_stream::AllStreamLedger;
use crate::cancel::CancelSignal;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::metadata::{MessageDeleted, MetadataMessage, StreamDeleted};
use crate::stream_ledger::{AppendOutcome, StreamLedger};
use crate::subscription::AppendSignal;
use crate::types::{
    AppendResult, Checkpoint, EventId, ExpectedVersion, NewStreamEvent, PageReadStatus,
    ReadAllPage, ReadDirection, ReadStreamPage, SetStreamMetadata, StreamEvent, StreamId,
    StreamMetadataResult, StreamVersion,
};

/// Everything a mutation needs besides the state itself.
pub(crate) struct OpContext<'a> {
    pub clock: &'a dyn Clock,
    pub signal: &'a AppendSignal,
    pub cancel: &'a CancelSignal,
}

/// The stream map and the global ledger.
#[derive(Debug, Default)]
pub struct StoreState {
    streams: HashMap<StreamId, StreamLedger>,
    all: AllStreamLedger,
}

impl StoreState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Appends
    // =========================================================================

    /// Appends to a stream, then enforces its max-count retention.
    pub(crate) fn append_to_stream(
        &mut self,
        ctx: &OpContext<'_>,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        events: Vec<NewStreamEvent>,
    ) -> Result<AppendResult> {
        let result = self.append_internal(ctx, stream_id, expected, events)?;
        let max_count = self.get_stream_metadata(stream_id)?.max_count;
        self.check_stream_max_count(ctx, stream_id, max_count)?;
        Ok(result)
    }

    /// The append path shared by user appends, tombstones and metadata writes.
    ///
    /// Creates the ledger lazily; a ledger is only kept in the map once it has
    /// committed something. Fires the append signal when events were committed.
    fn append_internal(
        &mut self,
        ctx: &OpContext<'_>,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        events: Vec<NewStreamEvent>,
    ) -> Result<AppendResult> {
        let now_ms = ctx.clock.now_ms();
        let Self { streams, all } = self;

        let mut fresh = None;
        let ledger = match streams.get_mut(stream_id) {
            Some(ledger) => ledger,
            None => fresh.insert(StreamLedger::new(stream_id.clone(), all.next_checkpoint())),
        };

        let outcome = ledger.append(expected, events, |version, new_event| {
            let event = Arc::new(StreamEvent {
                stream_id: stream_id.clone(),
                event_id: new_event.event_id,
                stream_version: version,
                checkpoint: all.next_checkpoint(),
                created_ms: now_ms,
                event_type: new_event.event_type,
                data: new_event.data,
                metadata: new_event.metadata,
            });
            all.link(Arc::clone(&event))?;
            Ok(event)
        })?;
        let current_version = ledger.current_version();

        if let Some(ledger) = fresh.filter(StreamLedger::exists) {
            streams.insert(stream_id.clone(), ledger);
        }

        match outcome {
            AppendOutcome::Committed(committed) if !committed.is_empty() => {
                debug!(
                    stream_id = %stream_id,
                    count = committed.len(),
                    current_version = %current_version,
                    head = %all.last_checkpoint(),
                    "appended events"
                );
                ctx.signal.notify();
            }
            AppendOutcome::Committed(_) => {}
            AppendOutcome::Replayed => {
                debug!(stream_id = %stream_id, "append replayed, nothing written");
            }
        }

        Ok(AppendResult {
            current_version,
            current_checkpoint: all.last_checkpoint(),
        })
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Deletes one event. No-op (returns false) for an unknown stream or event;
    /// otherwise appends a `$message-deleted` tombstone.
    pub(crate) fn delete_event(
        &mut self,
        ctx: &OpContext<'_>,
        stream_id: &StreamId,
        event_id: EventId,
    ) -> Result<bool> {
        let Some(ledger) = self.streams.get_mut(stream_id) else {
            return Ok(false);
        };
        let tombstone = MessageDeleted::tombstone(stream_id.as_str(), event_id)?;
        if !ledger.delete_event(event_id) {
            return Ok(false);
        }

        debug!(stream_id = %stream_id, event_id = %event_id, "deleted event");
        self.append_internal(ctx, &StreamId::deleted(), ExpectedVersion::Any, vec![tombstone])?;
        Ok(true)
    }

    /// Deletes a stream and, silently, its metadata stream.
    ///
    /// Returns whether the stream existed.
    pub(crate) fn delete_stream(
        &mut self,
        ctx: &OpContext<'_>,
        stream_id: &StreamId,
        expected: ExpectedVersion,
    ) -> Result<bool> {
        let deleted = self.delete_stream_internal(ctx, stream_id, expected)?;
        self.delete_stream_internal(ctx, &stream_id.metadata_stream(), ExpectedVersion::Any)?;
        Ok(deleted)
    }

    fn delete_stream_internal(
        &mut self,
        ctx: &OpContext<'_>,
        stream_id: &StreamId,
        expected: ExpectedVersion,
    ) -> Result<bool> {
        let current = self
            .streams
            .get(stream_id)
            .map(StreamLedger::current_version);

        let matches = match (expected, current) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::NoStream, current) => current.is_none(),
            (ExpectedVersion::Exact(v), Some(current)) => v == current,
            (ExpectedVersion::Exact(_), None) => false,
        };
        if !matches {
            return Err(Error::WrongExpectedVersion {
                stream_id: stream_id.to_string(),
                expected,
                actual: current.unwrap_or(StreamVersion::NONE),
            });
        }

        let Some(mut ledger) = self.streams.remove(stream_id) else {
            return Ok(false);
        };
        let tombstone = StreamDeleted::tombstone(stream_id.as_str())?;
        ledger.delete_all();

        info!(stream_id = %stream_id, last_version = %ledger.current_version(), "deleted stream");
        self.append_internal(ctx, &StreamId::deleted(), ExpectedVersion::Any, vec![tombstone])?;
        Ok(true)
    }

    // =========================================================================
    // Metadata and Retention
    // =========================================================================

    /// Reads the latest metadata event of a stream.
    pub(crate) fn get_stream_metadata(&self, stream_id: &StreamId) -> Result<StreamMetadataResult> {
        let metadata_stream = stream_id.metadata_stream();
        let Some(ledger) = self.streams.get(&metadata_stream) else {
            return Ok(StreamMetadataResult::none(stream_id.clone()));
        };
        let (latest, _) = ledger.read_backward(StreamVersion::END, 1);
        let Some(event) = latest.first() else {
            return Ok(StreamMetadataResult::none(stream_id.clone()));
        };

        let message = MetadataMessage::from_event(event)?;
        Ok(StreamMetadataResult {
            stream_id: stream_id.clone(),
            metadata_stream_version: event.stream_version,
            max_age: message.max_age,
            max_count: message.max_count,
            custom: message.meta_json,
        })
    }

    /// Appends a metadata event, then enforces the new max count.
    pub(crate) fn set_stream_metadata(
        &mut self,
        ctx: &OpContext<'_>,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        metadata: SetStreamMetadata,
    ) -> Result<AppendResult> {
        let message = MetadataMessage {
            stream_id: stream_id.to_string(),
            max_age: metadata.max_age,
            max_count: metadata.max_count,
            meta_json: metadata.custom,
        };
        let result = self.append_internal(
            ctx,
            &stream_id.metadata_stream(),
            expected,
            vec![message.to_event()?],
        )?;
        self.check_stream_max_count(ctx, stream_id, metadata.max_count)?;
        Ok(result)
    }

    /// Deletes the oldest live events until at most `max_count` remain.
    ///
    /// Each deletion goes through [`delete_event`](Self::delete_event), so every
    /// purged event gets its own tombstone and notification. The cancel signal
    /// is checked between deletions. Reserved streams are never purged.
    fn check_stream_max_count(
        &mut self,
        ctx: &OpContext<'_>,
        stream_id: &StreamId,
        max_count: Option<u64>,
    ) -> Result<()> {
        let Some(max_count) = max_count else {
            return Ok(());
        };
        if stream_id.is_reserved() {
            return Ok(());
        }
        let Some(ledger) = self.streams.get(stream_id) else {
            return Ok(());
        };

        let count = ledger.len() as u64;
        if count <= max_count {
            return Ok(());
        }

        let to_purge = (count - max_count) as usize;
        let (victims, _) = ledger.read_forward(StreamVersion::START, to_purge);
        let victims: Vec<EventId> = victims.iter().map(|e| e.event_id).collect();

        info!(stream_id = %stream_id, count, max_count, to_purge, "purging events over max count");
        for event_id in victims {
            ctx.cancel.check()?;
            self.delete_event(ctx, stream_id, event_id)?;
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Number of live events in a stream; 0 if unknown.
    pub fn stream_event_count(&self, stream_id: &StreamId) -> usize {
        self.streams.get(stream_id).map_or(0, StreamLedger::len)
    }

    /// The stream's last appended version, `NONE` if it does not exist.
    pub fn stream_current_version(&self, stream_id: &StreamId) -> StreamVersion {
        self.streams
            .get(stream_id)
            .map_or(StreamVersion::NONE, StreamLedger::current_version)
    }

    /// Reads a stream toward its tail, starting at `start` (inclusive).
    ///
    /// With a `max_age` policy, expired events are left out of the page, while
    /// `next_version` and `is_end` still describe the walk.
    pub(crate) fn read_stream_forwards(
        &self,
        now_ms: Option<u64>,
        stream_id: &StreamId,
        start: StreamVersion,
        max_count: usize,
    ) -> Result<ReadStreamPage> {
        let Some(ledger) = self.streams.get(stream_id) else {
            return Ok(ReadStreamPage::not_found(stream_id.clone(), start, ReadDirection::Forward));
        };

        let from = start.max(StreamVersion::START);
        let (events, is_end) = ledger.read_forward(from, max_count);
        let next_version = match events.last() {
            Some(last) => last.stream_version.next(),
            None if is_end => from.max(ledger.current_version().next()),
            None => from,
        };

        Ok(ReadStreamPage {
            stream_id: stream_id.clone(),
            status: PageReadStatus::Success,
            from_version: start,
            direction: ReadDirection::Forward,
            last_stream_version: ledger.current_version(),
            stream_created_at: ledger.created_at(),
            next_version,
            is_end,
            events: self.unexpired(now_ms, stream_id, events)?,
        })
    }

    /// Reads a stream toward version 0, starting at `from` (inclusive).
    /// [`StreamVersion::END`] starts at the current tail.
    pub(crate) fn read_stream_backwards(
        &self,
        now_ms: Option<u64>,
        stream_id: &StreamId,
        from: StreamVersion,
        max_count: usize,
    ) -> Result<ReadStreamPage> {
        let Some(ledger) = self.streams.get(stream_id) else {
            return Ok(ReadStreamPage::not_found(stream_id.clone(), from, ReadDirection::Backward));
        };

        let start = if from == StreamVersion::END {
            ledger.current_version()
        } else {
            from
        };
        let (events, is_end) = ledger.read_backward(start, max_count);
        let next_version = match events.last() {
            Some(last) => last.stream_version.prev(),
            None if is_end => StreamVersion::NONE,
            None => start,
        };

        Ok(ReadStreamPage {
            stream_id: stream_id.clone(),
            status: PageReadStatus::Success,
            from_version: from,
            direction: ReadDirection::Backward,
            last_stream_version: ledger.current_version(),
            stream_created_at: ledger.created_at(),
            next_version,
            is_end,
            events: self.unexpired(now_ms, stream_id, events)?,
        })
    }

    /// Drops events older than the stream's `max_age`. `now_ms` of `None`
    /// disables the filter.
    fn unexpired(
        &self,
        now_ms: Option<u64>,
        stream_id: &StreamId,
        events: Vec<Arc<StreamEvent>>,
    ) -> Result<Vec<StreamEvent>> {
        let max_age = match now_ms {
            Some(_) if !stream_id.is_reserved() => self.get_stream_metadata(stream_id)?.max_age,
            _ => None,
        };

        let events = events.into_iter();
        Ok(match (max_age, now_ms) {
            (Some(max_age), Some(now_ms)) => events
                .filter(|e| e.created_ms.saturating_add(max_age.saturating_mul(1000)) >= now_ms)
                .map(|e| StreamEvent::clone(&e))
                .collect(),
            _ => events.map(|e| StreamEvent::clone(&e)).collect(),
        })
    }

    /// Reads the global log toward the tail, from `from` (inclusive).
    pub fn read_all_forwards(&self, from: Checkpoint, max_count: usize) -> ReadAllPage {
        let page = self.all.scan_forward(from, max_count);
        ReadAllPage {
            from_checkpoint: from,
            next_checkpoint: page.next_checkpoint,
            is_end: page.is_end,
            direction: ReadDirection::Forward,
            events: page.events.iter().map(|e| StreamEvent::clone(e)).collect(),
        }
    }

    /// Reads the global log toward the beginning, from `from` (inclusive).
    pub fn read_all_backwards(&self, from: Checkpoint, max_count: usize) -> ReadAllPage {
        let page = self.all.scan_backward(from, max_count);
        ReadAllPage {
            from_checkpoint: from,
            next_checkpoint: page.next_checkpoint,
            is_end: page.is_end,
            direction: ReadDirection::Backward,
            events: page.events.iter().map(|e| StreamEvent::clone(e)).collect(),
        }
    }

    /// Last checkpoint assigned, [`Checkpoint::NONE`] if empty.
    pub fn head_checkpoint(&self) -> Checkpoint {
        self.all.last_checkpoint()
    }

    /// Drops every stream and the whole global log.
    pub fn clear(&mut self) {
        self.streams.clear();
        self.all.clear();
    }
}
