//! # Per-Stream Ledger
//!
//! The ordered, append-only sequence of events for one stream name.
//!
//! ## Sparse by Design
//!
//! Deleting a single event does not renumber the survivors. The ledger is
//! therefore keyed by version rather than being a dense list:
//!
//! ```text
//! append history:  v0  v1  v2  v3  v4        current_version = 4
//! delete v1, v3:   v0  --  v2  --  v4        len() = 3
//! ```
//!
//! - `current_version` tracks the append history and never goes down, so
//!   optimistic concurrency keeps comparing against the last *appended* version.
//! - Lookups and range reads simply skip deleted slots; a deleted version is
//!   "absent", never an error.
//!
//! ## Invariants
//!
//! - The i-th event appended has version i (checked on every push)
//! - Entries are never reordered
//! - A batch is validated completely before the first entry is linked

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{
    Checkpoint, EventId, ExpectedVersion, NewStreamEvent, StreamEvent, StreamId, StreamVersion,
};

/// What an accepted append turned out to be.
#[derive(Debug)]
pub enum AppendOutcome {
    /// New events were committed, in version order.
    Committed(Vec<Arc<StreamEvent>>),

    /// Every event id was already present at the expected positions; nothing
    /// was appended.
    Replayed,
}

/// Events of one stream, keyed by version.
#[derive(Debug)]
pub struct StreamLedger {
    stream_id: StreamId,
    events: BTreeMap<StreamVersion, Arc<StreamEvent>>,
    by_id: HashMap<EventId, StreamVersion>,
    current_version: StreamVersion,
    created_at: Checkpoint,
}

impl StreamLedger {
    /// Creates an empty ledger. It counts as existing once something is appended.
    ///
    /// `created_at` is the next global checkpoint at creation time. It tells a
    /// recreated stream apart from the one deleted before it.
    pub fn new(stream_id: StreamId, created_at: Checkpoint) -> Self {
        Self {
            stream_id,
            events: BTreeMap::new(),
            by_id: HashMap::new(),
            current_version: StreamVersion::NONE,
            created_at,
        }
    }

    /// Next global checkpoint at the time this ledger was created.
    pub fn created_at(&self) -> Checkpoint {
        self.created_at
    }

    /// The stream this ledger belongs to.
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Version of the last appended event, [`StreamVersion::NONE`] if nothing
    /// was ever appended. Unaffected by deletions.
    pub fn current_version(&self) -> StreamVersion {
        self.current_version
    }

    /// True once at least one event has been appended.
    pub fn exists(&self) -> bool {
        !self.current_version.is_none()
    }

    /// Number of live (not deleted) events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no live events remain.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Looks up a live event by version.
    pub fn get(&self, version: StreamVersion) -> Option<&Arc<StreamEvent>> {
        self.events.get(&version)
    }

    /// The live event with the highest version.
    pub fn last(&self) -> Option<&Arc<StreamEvent>> {
        self.events.values().next_back()
    }

    /// Appends a batch under optimistic concurrency.
    ///
    /// `commit` is called once per new event, in order, with the version it
    /// receives. It builds the final record (assigning the checkpoint) and links
    /// it into the global ledger.
    ///
    /// # Errors
    ///
    /// - `WrongExpectedVersion` if the expected version does not hold, or the
    ///   batch reuses event ids without being an exact replay
    /// - `Internal` if `commit` hands back a record with the wrong version
    pub fn append<F>(
        &mut self,
        expected: ExpectedVersion,
        new_events: Vec<NewStreamEvent>,
        mut commit: F,
    ) -> Result<AppendOutcome>
    where
        F: FnMut(StreamVersion, NewStreamEvent) -> Result<Arc<StreamEvent>>,
    {
        if self.is_replay(expected, &new_events)? {
            return Ok(AppendOutcome::Replayed);
        }

        match expected {
            ExpectedVersion::Any => {}
            ExpectedVersion::NoStream if self.exists() => return Err(self.wrong_version(expected)),
            ExpectedVersion::NoStream => {}
            ExpectedVersion::Exact(v) if self.exists() && v == self.current_version => {}
            ExpectedVersion::Exact(_) => return Err(self.wrong_version(expected)),
        }

        let mut batch_ids = HashSet::with_capacity(new_events.len());
        for event in &new_events {
            if self.by_id.contains_key(&event.event_id) || !batch_ids.insert(event.event_id) {
                return Err(self.wrong_version(expected));
            }
        }

        let mut committed = Vec::with_capacity(new_events.len());
        for new_event in new_events {
            let version = self.current_version.next();
            let event = commit(version, new_event)?;
            self.push(Arc::clone(&event))?;
            committed.push(event);
        }

        Ok(AppendOutcome::Committed(committed))
    }

    /// Checks whether `new_events` were already appended, in order, at the
    /// position the expected version implies.
    ///
    /// Only a batch whose first id is already present can be a replay. If that
    /// id is present but the rest does not line up, the append is a conflict.
    fn is_replay(&self, expected: ExpectedVersion, new_events: &[NewStreamEvent]) -> Result<bool> {
        let Some(first) = new_events.first() else {
            return Ok(false);
        };
        let Some(&start) = self.by_id.get(&first.event_id) else {
            return Ok(false);
        };

        let position_ok = match expected {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => start == StreamVersion::START,
            ExpectedVersion::Exact(v) => start == v.next(),
        };

        let ids_match = new_events.iter().enumerate().all(|(offset, new_event)| {
            let version = StreamVersion::from_raw(start.as_raw() + offset as i64);
            self.events
                .get(&version)
                .is_some_and(|existing| existing.event_id == new_event.event_id)
        });

        if position_ok && ids_match {
            Ok(true)
        } else {
            Err(self.wrong_version(expected))
        }
    }

    fn push(&mut self, event: Arc<StreamEvent>) -> Result<()> {
        let expected = self.current_version.next();
        if event.stream_version != expected {
            return Err(Error::Internal(format!(
                "stream '{}' expected version {} but got {}",
                self.stream_id, expected, event.stream_version
            )));
        }
        self.current_version = expected;
        self.by_id.insert(event.event_id, expected);
        self.events.insert(expected, event);
        Ok(())
    }

    fn wrong_version(&self, expected: ExpectedVersion) -> Error {
        Error::WrongExpectedVersion {
            stream_id: self.stream_id.to_string(),
            expected,
            actual: self.current_version,
        }
    }

    /// Removes one event from the live sequence. Returns whether it was found.
    pub fn delete_event(&mut self, event_id: EventId) -> bool {
        match self.by_id.remove(&event_id) {
            Some(version) => self.events.remove(&version).is_some(),
            None => false,
        }
    }

    /// Removes every event. Used when the whole stream is deleted.
    pub fn delete_all(&mut self) {
        self.events.clear();
        self.by_id.clear();
    }

    /// Collects up to `max_count` live events with version ≥ `from`, ascending.
    ///
    /// The flag is true when no live event remains after the collected ones.
    pub fn read_forward(
        &self,
        from: StreamVersion,
        max_count: usize,
    ) -> (Vec<Arc<StreamEvent>>, bool) {
        let mut walk = self.events.range(from..).map(|(_, event)| event);
        let events: Vec<_> = walk.by_ref().take(max_count).cloned().collect();
        let is_end = walk.next().is_none();
        (events, is_end)
    }

    /// Collects up to `max_count` live events with version ≤ `from`, descending.
    ///
    /// The flag is true when no live event remains below the collected ones.
    pub fn read_backward(
        &self,
        from: StreamVersion,
        max_count: usize,
    ) -> (Vec<Arc<StreamEvent>>, bool) {
        let mut walk = self.events.range(..=from).rev().map(|(_, event)| event);
        let events: Vec<_> = walk.by_ref().take(max_count).cloned().collect();
        let is_end = walk.next().is_none();
        (events, is_end)
    }
}
