// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The Participants Database and the contract a participant must satisfy to
//! plug into the pipe.
//!
//! Concrete wire-protocol participants (RTPS, shared memory, schema
//! subscribers, echo...) are external collaborators; this module only
//! defines the trait surface the core consumes and the registry that holds
//! live participants.

use crate::topic::DistributedTopic;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Opaque identifier for a participant, unique within a pipe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Sentinel meaning "no participant". Must never be a live participant.
    pub const DEFAULT: &'static str = "__default__";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The reserved sentinel id.
    pub fn default_id() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A sample as handed over by a reader, before it is wrapped in a pool `Payload`.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub bytes: Vec<u8>,
}

/// Outcome of a `Writer::write` call.
#[derive(Debug)]
pub enum WriteOutcome {
    Ok,
    /// Transient failure: the sample is dropped, the loop continues.
    Recoverable(String),
    /// The writer is unusable and must be removed from its track.
    Fatal(String),
}

/// A reader pulls samples for one topic from one participant.
pub trait Reader: Send + Sync {
    fn guid(&self) -> &str;
    fn topic(&self) -> &DistributedTopic;

    /// Take the oldest available sample, if any.
    fn take(&self) -> Option<RawSample>;

    fn enable(&self);
    fn disable(&self);

    /// Register a callback invoked when new data becomes available.
    /// Implementations that poll instead of push may no-op this.
    fn set_on_data_available(&self, _callback: Arc<dyn Fn() + Send + Sync>) {}
}

/// A writer delivers payloads for one topic to one participant.
pub trait Writer: Send + Sync {
    fn write(&self, payload: crate::payload::Payload) -> WriteOutcome;
}

#[derive(Debug, Error)]
pub enum ParticipantError {
    #[error("participant id is the reserved DEFAULT sentinel")]
    ReservedId,

    #[error("participant '{0}' already registered")]
    AlreadyExists(ParticipantId),

    #[error("participant '{0}' not found")]
    NotFound(ParticipantId),

    #[error("failed to create reader for topic {topic}: {reason}")]
    ReaderCreationFailed { topic: String, reason: String },

    #[error("failed to create writer for topic {topic}: {reason}")]
    WriterCreationFailed { topic: String, reason: String },
}

/// A participant contributes readers and/or writers to topics.
pub trait Participant: Send + Sync {
    fn id(&self) -> &ParticipantId;

    /// A repeater is authorized to write back its own input.
    fn is_repeater(&self) -> bool {
        false
    }

    /// Whether this participant is backed by a real wire protocol (vs. an
    /// internal data source). Informational only; the core never branches on it.
    fn is_rtps_kind(&self) -> bool {
        true
    }

    fn create_reader(&self, topic: &DistributedTopic) -> Result<Arc<dyn Reader>, ParticipantError>;
    fn create_writer(&self, topic: &DistributedTopic) -> Result<Arc<dyn Writer>, ParticipantError>;
}

/// Keyed registry of live participants.
///
/// Reads (lookups, iteration) are concurrent; inserts/removes are exclusive,
/// via a read-write lock.
#[derive(Default)]
pub struct ParticipantsDatabase {
    participants: RwLock<HashMap<ParticipantId, Arc<dyn Participant>>>,
}

impl ParticipantsDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, participant: Arc<dyn Participant>) -> Result<(), ParticipantError> {
        let id = participant.id().clone();
        if id.is_default() {
            return Err(ParticipantError::ReservedId);
        }

        let mut participants = self.participants.write();
        if participants.contains_key(&id) {
            return Err(ParticipantError::AlreadyExists(id));
        }
        tracing::debug!("Registering participant '{}'", id);
        participants.insert(id, participant);
        Ok(())
    }

    pub fn remove(&self, id: &ParticipantId) -> Option<Arc<dyn Participant>> {
        let removed = self.participants.write().remove(id);
        if removed.is_some() {
            tracing::debug!("Removed participant '{}'", id);
        }
        removed
    }

    pub fn get(&self, id: &ParticipantId) -> Option<Arc<dyn Participant>> {
        self.participants.read().get(id).cloned()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.read().contains_key(id)
    }

    /// All currently registered participant ids.
    pub fn ids(&self) -> Vec<ParticipantId> {
        self.participants.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.participants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
