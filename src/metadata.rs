//! # Reserved Streams and Their Payloads
//!
//! Stream metadata and deletions are recorded as ordinary events on reserved
//! streams, so the global log stays the single source of truth:
//!
//! | Stream | Event type | Payload |
//! |--------|------------|---------|
//! | `"$$" + stream_id` | `$stream-metadata` | [`MetadataMessage`] |
//! | `$deleted` | `$message-deleted` | [`MessageDeleted`] |
//! | `$deleted` | `$stream-deleted` | [`StreamDeleted`] |
//!
//! Payloads are JSON (camelCase field names). This is the only serialized
//! structure the store defines; event payloads themselves stay opaque bytes.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{EventId, NewStreamEvent, StreamEvent};

/// Event type of metadata events on `"$$…"` streams.
pub const STREAM_METADATA_EVENT_TYPE: &str = "$stream-metadata";

/// Event type of single-event tombstones on `$deleted`.
pub const MESSAGE_DELETED_EVENT_TYPE: &str = "$message-deleted";

/// Event type of whole-stream tombstones on `$deleted`.
pub const STREAM_DELETED_EVENT_TYPE: &str = "$stream-deleted";

// =============================================================================
// Metadata
// =============================================================================

/// Payload of a metadata event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataMessage {
    /// The stream the metadata applies to (not the `$$` name).
    pub stream_id: String,

    /// Max age in seconds.
    pub max_age: Option<u64>,

    /// Max live event count.
    pub max_count: Option<u64>,

    /// Opaque caller-defined metadata.
    pub meta_json: Option<String>,
}

impl MetadataMessage {
    /// Encodes the message as a new event for the metadata stream.
    pub fn to_event(&self) -> Result<NewStreamEvent> {
        let data = serde_json::to_vec(self)?;
        Ok(NewStreamEvent::new(STREAM_METADATA_EVENT_TYPE, data))
    }

    /// Decodes a metadata event.
    pub fn from_event(event: &StreamEvent) -> Result<Self> {
        Ok(serde_json::from_slice(&event.data)?)
    }
}

// =============================================================================
// Tombstones
// =============================================================================

/// Payload of a `$message-deleted` tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    /// Stream the event was deleted from.
    pub stream_id: String,

    /// Id of the deleted event.
    pub message_id: String,
}

impl MessageDeleted {
    /// Builds the tombstone event for deleting `event_id` from `stream_id`.
    pub fn tombstone(stream_id: &str, event_id: EventId) -> Result<NewStreamEvent> {
        let payload = Self {
            stream_id: stream_id.to_string(),
            message_id: event_id.to_string(),
        };
        let data = serde_json::to_vec(&payload)?;
        Ok(NewStreamEvent::new(MESSAGE_DELETED_EVENT_TYPE, data))
    }
}

/// Payload of a `$stream-deleted` tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDeleted {
    /// The deleted stream.
    pub stream_id: String,
}

impl StreamDeleted {
    /// Builds the tombstone event for deleting `stream_id`.
    pub fn tombstone(stream_id: &str) -> Result<NewStreamEvent> {
        let payload = Self {
            stream_id: stream_id.to_string(),
        };
        let data = serde_json::to_vec(&payload)?;
        Ok(NewStreamEvent::new(STREAM_DELETED_EVENT_TYPE, data))
    }
}

// =============================================================================
// Tests
// =============================================================================
