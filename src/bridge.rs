// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-topic fan-out: one Bridge owns one Track per reader participant, and
//! assigns every writer-capable participant to the tracks that should
//! forward to it.
//!
//! The writer-assignment algorithm mirrors the original `DdsBridge`: a
//! reader's track forwards to `route[reader] ∩ known writers` if a route
//! names it, otherwise to every known writer except the reader itself
//! (unless it is a repeater). A track is only materialized once it has at
//! least one eligible writer, and torn down the moment it has none,
//! mirroring `add_writers_to_tracks_nts_` / `remove_writer`.

use crate::participant::{Participant, ParticipantId, ParticipantsDatabase, Reader, Writer};
use crate::payload::PayloadPool;
use crate::routes::RoutesConfiguration;
use crate::topic::DistributedTopic;
use crate::track::Track;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("participant '{0}' not found in participants database")]
    UnknownParticipant(ParticipantId),

    #[error("cannot create a writer for the reserved DEFAULT participant")]
    DefaultParticipantAsWriter,

    #[error("failed to create reader for topic {topic}: {reason}")]
    ReaderCreationFailed { topic: String, reason: String },

    #[error("failed to create writer for topic {topic}: {reason}")]
    WriterCreationFailed { topic: String, reason: String },
}

struct ReaderEntry {
    reader: Arc<dyn Reader>,
    is_repeater: bool,
}

struct BridgeInner {
    readers: HashMap<ParticipantId, ReaderEntry>,
    writers: HashMap<ParticipantId, Arc<dyn Writer>>,
    tracks: HashMap<ParticipantId, Track>,
    enabled: bool,
}

/// Owns the set of Tracks that together route one topic.
///
/// One Track per reader-capable participant; each Track fans out to
/// whichever writer-capable participants the route set assigns to it.
pub struct Bridge {
    topic: Arc<DistributedTopic>,
    payload_pool: PayloadPool,
    inner: Mutex<BridgeInner>,
}

impl Bridge {
    pub fn new(topic: DistributedTopic, payload_pool: PayloadPool) -> Self {
        Self {
            topic: Arc::new(topic),
            payload_pool,
            inner: Mutex::new(BridgeInner {
                readers: HashMap::new(),
                writers: HashMap::new(),
                tracks: HashMap::new(),
                enabled: false,
            }),
        }
    }

    pub fn topic(&self) -> &DistributedTopic {
        &self.topic
    }

    pub fn has_track(&self, reader_pid: &ParticipantId) -> bool {
        self.inner.lock().tracks.contains_key(reader_pid)
    }

    pub fn track_count(&self) -> usize {
        self.inner.lock().tracks.len()
    }

    /// Whether the track rooted at `reader_pid` currently has `writer_pid`
    /// attached. Returns `false` if the track itself does not exist.
    pub fn track_has_writer(&self, reader_pid: &ParticipantId, writer_pid: &ParticipantId) -> bool {
        self.inner
            .lock()
            .tracks
            .get(reader_pid)
            .map(|t| t.has_writer(writer_pid))
            .unwrap_or(false)
    }

    /// Register `reader_pid`'s reader for this topic and (re)compute its
    /// track against the currently known writers and `routes`.
    ///
    /// Grounded on `DdsBridge::create_all_tracks_`: a reader is recorded
    /// immediately, but its Track only comes into existence once it has at
    /// least one eligible writer (invariant: no Bridge holds an empty
    /// Track).
    pub fn create_reader(
        &self,
        participants: &ParticipantsDatabase,
        reader_pid: &ParticipantId,
        routes: &RoutesConfiguration,
    ) -> Result<(), BridgeError> {
        let mut inner = self.inner.lock();

        if !inner.readers.contains_key(reader_pid) {
            let participant = participants
                .get(reader_pid)
                .ok_or_else(|| BridgeError::UnknownParticipant(reader_pid.clone()))?;
            let reader = self.new_reader_for(&participant)?;
            inner.readers.insert(
                reader_pid.clone(),
                ReaderEntry {
                    reader,
                    is_repeater: participant.is_repeater(),
                },
            );
        }

        self.sync_track(&mut inner, reader_pid, routes);
        Ok(())
    }

    /// Drop `reader_pid`'s reader and its track, if any.
    pub fn remove_reader(&self, reader_pid: &ParticipantId) -> bool {
        let mut inner = self.inner.lock();
        inner.readers.remove(reader_pid);
        let removed = inner.tracks.remove(reader_pid).is_some();
        if removed {
            tracing::debug!(
                "Removed track for reader '{}' on topic '{}'",
                reader_pid,
                self.topic.name
            );
        }
        removed
    }

    /// Register `writer_pid`'s writer for this topic and attach it to every
    /// reader's track for which it is eligible, materializing tracks that
    /// had none. Grounded on `DdsBridge::add_writers_to_tracks_nts_`.
    pub fn create_writer(
        &self,
        participants: &ParticipantsDatabase,
        writer_pid: &ParticipantId,
        routes: &RoutesConfiguration,
    ) -> Result<(), BridgeError> {
        if writer_pid.is_default() {
            return Err(BridgeError::DefaultParticipantAsWriter);
        }

        let mut inner = self.inner.lock();

        if !inner.writers.contains_key(writer_pid) {
            let participant = participants
                .get(writer_pid)
                .ok_or_else(|| BridgeError::UnknownParticipant(writer_pid.clone()))?;
            let writer = self.new_writer_for(&participant)?;
            inner.writers.insert(writer_pid.clone(), writer);
        }

        let reader_ids: Vec<ParticipantId> = inner.readers.keys().cloned().collect();
        for reader_pid in reader_ids {
            self.sync_track(&mut inner, &reader_pid, routes);
        }
        Ok(())
    }

    /// Detach `writer_pid` from every track that has it, destroying any
    /// track that ends up with zero writers.
    pub fn remove_writer(&self, writer_pid: &ParticipantId) {
        let mut inner = self.inner.lock();
        inner.writers.remove(writer_pid);

        let reader_ids: Vec<ParticipantId> = inner.tracks.keys().cloned().collect();
        for reader_pid in reader_ids {
            if let Some(track) = inner.tracks.get(&reader_pid) {
                track.remove_writer(writer_pid);
                if !track.has_writers() {
                    inner.tracks.remove(&reader_pid);
                    tracing::debug!(
                        "Destroyed empty track for reader '{}' on topic '{}'",
                        reader_pid,
                        self.topic.name
                    );
                }
            }
        }
    }

    /// Recompute the eligible writer set for `reader_pid` and materialize,
    /// update, or tear down its track accordingly. If the track already
    /// exists its writer set is reconciled in place (missing writers added,
    /// no-longer-eligible writers removed); the track is rebuilt only when
    /// it didn't exist before, so a track whose eligible set is unchanged is
    /// left untouched entirely.
    fn sync_track(
        &self,
        inner: &mut BridgeInner,
        reader_pid: &ParticipantId,
        routes: &RoutesConfiguration,
    ) {
        let Some(reader_entry) = inner.readers.get(reader_pid) else {
            return;
        };
        let eligible = Self::eligible_writers(&inner.writers, reader_pid, reader_entry.is_repeater, routes);

        if eligible.is_empty() {
            if inner.tracks.remove(reader_pid).is_some() {
                tracing::debug!(
                    "Track for reader '{}' on topic '{}' has no eligible writers; not instantiated",
                    reader_pid,
                    self.topic.name
                );
            }
            return;
        }

        if let Some(track) = inner.tracks.get(reader_pid) {
            let current: HashSet<ParticipantId> = track.writer_ids().into_iter().collect();
            let desired: HashSet<ParticipantId> = eligible.keys().cloned().collect();

            for (writer_pid, writer) in &eligible {
                if !current.contains(writer_pid) {
                    track.add_writer(writer_pid.clone(), writer.clone());
                }
            }
            for writer_pid in current.difference(&desired) {
                track.remove_writer(writer_pid);
            }
        } else {
            let track = Track::new(
                self.topic.clone(),
                reader_pid.clone(),
                reader_entry.reader.clone(),
                eligible,
                self.payload_pool.clone(),
            );
            if inner.enabled {
                track.enable();
            }
            tracing::debug!(
                "Created track for reader '{}' on topic '{}'",
                reader_pid,
                self.topic.name
            );
            inner.tracks.insert(reader_pid.clone(), track);
        }
    }

    /// Recompute every existing reader's track against `routes`, without
    /// touching readers/writers themselves. Used by `PipeController::reload`
    /// to apply a new route table to bridges that already exist.
    pub fn resync_routes(&self, routes: &RoutesConfiguration) {
        let mut inner = self.inner.lock();
        let reader_ids: Vec<ParticipantId> = inner.readers.keys().cloned().collect();
        for reader_pid in reader_ids {
            self.sync_track(&mut inner, &reader_pid, routes);
        }
    }

    /// Writers eligible for `reader_pid`'s track: `route[reader] ∩ known`
    /// if a route names the reader, else every known writer; the reader
    /// itself is always excluded unless it is a repeater (invariant 3).
    fn eligible_writers(
        writers: &HashMap<ParticipantId, Arc<dyn Writer>>,
        reader_pid: &ParticipantId,
        reader_is_repeater: bool,
        routes: &RoutesConfiguration,
    ) -> HashMap<ParticipantId, Arc<dyn Writer>> {
        let candidates: Vec<ParticipantId> = match routes.get(reader_pid) {
            Some(allowed) => writers.keys().filter(|w| allowed.contains(*w)).cloned().collect(),
            None => writers.keys().cloned().collect(),
        };

        candidates
            .into_iter()
            .filter(|w| w != reader_pid || reader_is_repeater)
            .filter_map(|w| writers.get(&w).map(|writer| (w, writer.clone())))
            .collect()
    }

    fn new_reader_for(
        &self,
        participant: &Arc<dyn Participant>,
    ) -> Result<Arc<dyn Reader>, BridgeError> {
        participant
            .create_reader(&self.topic)
            .map_err(|e| BridgeError::ReaderCreationFailed {
                topic: self.topic.name.clone(),
                reason: e.to_string(),
            })
    }

    fn new_writer_for(
        &self,
        participant: &Arc<dyn Participant>,
    ) -> Result<Arc<dyn Writer>, BridgeError> {
        participant
            .create_writer(&self.topic)
            .map_err(|e| BridgeError::WriterCreationFailed {
                topic: self.topic.name.clone(),
                reason: e.to_string(),
            })
    }

    pub fn enable(&self) {
        let mut inner = self.inner.lock();
        if inner.enabled {
            return;
        }
        inner.enabled = true;
        for track in inner.tracks.values() {
            track.enable();
        }
    }

    pub fn disable(&self) {
        let mut inner = self.inner.lock();
        if !inner.enabled {
            return;
        }
        inner.enabled = false;
        for track in inner.tracks.values() {
            track.disable();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    /// Drain every track once. Returns the total number of samples
    /// forwarded across all tracks.
    ///
    /// A writer a Track drops with a fatal write error is only half removed
    /// at that point (gone from the Track, still known to the Bridge); this
    /// finishes the job by removing it bridge-wide via `remove_writer`,
    /// which also destroys any track that ends up with zero writers
    /// (invariant: a Bridge never holds an empty track).
    pub fn poll_all_tracks(&self) -> usize {
        let (forwarded, fatal_writers) = {
            let inner = self.inner.lock();
            let mut forwarded = 0;
            let mut fatal_writers = Vec::new();
            for track in inner.tracks.values() {
                forwarded += track.drain();
                fatal_writers.extend(track.take_fatal_removed());
            }
            (forwarded, fatal_writers)
        };

        for writer_pid in fatal_writers {
            tracing::warn!(
                "removing fatally-failed writer '{}' from bridge for topic '{}'",
                writer_pid,
                self.topic.name
            );
            self.remove_writer(&writer_pid);
        }

        forwarded
    }
}
