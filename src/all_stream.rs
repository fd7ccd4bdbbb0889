//! # Global Ledger (All-Stream)
//!
//! One ordered sequence spanning every stream, in commit order. Each committed
//! event is linked exactly once and receives the next checkpoint from a single
//! counter.
//!
//! ## Layout
//!
//! An arena of entries addressed by index, with explicit `prev`/`next` links.
//! Entry 0 is a sentinel carrying no event (checkpoint −1), so "before the
//! beginning" is just another entry:
//!
//! ```text
//!  index:      0          1         2         3
//!           ┌──────┐   ┌─────┐   ┌─────┐   ┌─────┐
//!           │ HEAD │ ⇄ │ c=0 │ ⇄ │ c=1 │ ⇄ │ c=2 │  ← tail
//!           │ c=-1 │   │ s=A │   │ s=B │   │ s=A │
//!           └──────┘   └─────┘   └─────┘   └─────┘
//! ```
//!
//! Entries are never unlinked: deleting events or whole streams leaves the
//! global history intact. Because the arena only grows at the tail, its index
//! order is checkpoint order, and scans locate their starting entry by binary
//! search before walking the links.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{Checkpoint, StreamEvent};

/// Index of the sentinel entry.
const HEAD: usize = 0;

#[derive(Debug)]
struct Entry {
    checkpoint: Checkpoint,
    // None only for the sentinel
    event: Option<Arc<StreamEvent>>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Result of a global scan.
#[derive(Debug)]
pub struct ScanPage {
    /// Collected events, in scan direction.
    pub events: Vec<Arc<StreamEvent>>,
    /// Where the next scan in the same direction should start.
    pub next_checkpoint: Checkpoint,
    /// True when the scan reached the end in its direction.
    pub is_end: bool,
}

/// The cross-stream log.
#[derive(Debug)]
pub struct AllStreamLedger {
    entries: Vec<Entry>,
    tail: usize,
    next_checkpoint: Checkpoint,
}

impl Default for AllStreamLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AllStreamLedger {
    /// Creates a ledger holding only the sentinel.
    pub fn new() -> Self {
        Self {
            entries: vec![Self::sentinel()],
            tail: HEAD,
            next_checkpoint: Checkpoint::START,
        }
    }

    fn sentinel() -> Entry {
        Entry {
            checkpoint: Checkpoint::NONE,
            event: None,
            prev: None,
            next: None,
        }
    }

    /// The checkpoint the next linked event must carry.
    pub fn next_checkpoint(&self) -> Checkpoint {
        self.next_checkpoint
    }

    /// The last checkpoint assigned, [`Checkpoint::NONE`] if nothing was linked.
    pub fn last_checkpoint(&self) -> Checkpoint {
        self.entries[self.tail].checkpoint
    }

    /// Number of linked events (the sentinel is not counted).
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    /// True when nothing was ever linked.
    pub fn is_empty(&self) -> bool {
        self.tail == HEAD
    }

    /// Links a committed event at the tail and advances the counter.
    ///
    /// # Errors
    ///
    /// `Internal` if the event does not carry [`next_checkpoint`](Self::next_checkpoint).
    pub fn link(&mut self, event: Arc<StreamEvent>) -> Result<()> {
        if event.checkpoint != self.next_checkpoint {
            return Err(Error::Internal(format!(
                "expected checkpoint {} but got {}",
                self.next_checkpoint, event.checkpoint
            )));
        }

        let index = self.entries.len();
        self.entries.push(Entry {
            checkpoint: event.checkpoint,
            event: Some(event),
            prev: Some(self.tail),
            next: None,
        });
        self.entries[self.tail].next = Some(index);
        self.tail = index;
        self.next_checkpoint = self.next_checkpoint.next();
        Ok(())
    }

    /// Drops every entry except the sentinel. The counter restarts at 0.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.entries.push(Self::sentinel());
        self.tail = HEAD;
        self.next_checkpoint = Checkpoint::START;
    }

    /// First entry with checkpoint ≥ `from`, if any.
    fn locate_forward(&self, from: Checkpoint) -> Option<usize> {
        let offset = self.entries[1..].partition_point(|e| e.checkpoint < from);
        let index = offset + 1;
        (index < self.entries.len()).then_some(index)
    }

    /// Last entry with checkpoint ≤ `from`; the sentinel if there is none.
    fn locate_backward(&self, from: Checkpoint) -> usize {
        // entries[1..][count - 1] is entries[count]
        self.entries[1..].partition_point(|e| e.checkpoint <= from)
    }

    /// Collects up to `max_count` events with checkpoint ≥ `from`, walking
    /// toward the tail.
    ///
    /// - Empty store: empty page anchored at checkpoint 0, `is_end`
    /// - `from` past the tail: empty page echoing `from`, `is_end`
    /// - Otherwise `next_checkpoint` is the first uncollected checkpoint, or one
    ///   past the last collected one when the walk fell off the tail
    pub fn scan_forward(&self, from: Checkpoint, max_count: usize) -> ScanPage {
        if self.is_empty() {
            return ScanPage {
                events: Vec::new(),
                next_checkpoint: Checkpoint::START,
                is_end: true,
            };
        }

        let Some(start) = self.locate_forward(from) else {
            return ScanPage {
                events: Vec::new(),
                next_checkpoint: from,
                is_end: true,
            };
        };

        let mut events = Vec::with_capacity(max_count.min(self.len()));
        let mut current = Some(start);
        while events.len() < max_count {
            let Some(index) = current else { break };
            let entry = &self.entries[index];
            events.extend(entry.event.iter().cloned());
            current = entry.next;
        }

        let next_checkpoint = match current {
            Some(index) => self.entries[index].checkpoint,
            None => self.last_checkpoint().next(),
        };

        ScanPage {
            events,
            next_checkpoint,
            is_end: current.is_none(),
        }
    }

    /// Collects up to `max_count` events with checkpoint ≤ `from`, walking
    /// toward the sentinel. [`Checkpoint::END`] starts at the tail.
    ///
    /// `is_end` once the walk reaches (or starts at) the sentinel, in which case
    /// `next_checkpoint` is 0.
    pub fn scan_backward(&self, from: Checkpoint, max_count: usize) -> ScanPage {
        let start = if from == Checkpoint::END {
            self.tail
        } else {
            self.locate_backward(from)
        };

        let mut events = Vec::with_capacity(max_count.min(self.len()));
        let mut current = start;
        while events.len() < max_count && current != HEAD {
            let entry = &self.entries[current];
            events.extend(entry.event.iter().cloned());
            current = entry.prev.unwrap_or(HEAD);
        }

        let is_end = current == HEAD;
        let next_checkpoint = if is_end {
            Checkpoint::START
        } else {
            self.entries[current].checkpoint
        };

        ScanPage {
            events,
            next_checkpoint,
            is_end,
        }
    }
}
