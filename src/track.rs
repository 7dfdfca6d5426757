// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One reader, many writers: pulls available samples, fans out, applies
//! downsampling and rate limiting.

use crate::participant::{ParticipantId, Reader, WriteOutcome, Writer};
use crate::payload::{PayloadError, PayloadPool};
use crate::topic::DistributedTopic;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Track lifecycle: `Created -> Enabled <-> Disabled -> Destroyed`. Only
/// `Enabled` permits forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Created,
    Enabled,
    Disabled,
    Destroyed,
}

/// Outcome of one `poll_once` iteration.
#[derive(Debug, PartialEq)]
pub enum PollOutcome {
    /// No sample was available, or the track is not enabled.
    Idle,
    /// A sample was forwarded to at least one writer (or had zero writers).
    Forwarded,
    /// A sample was taken but dropped by downsampling.
    DroppedDownsampled,
    /// A sample was taken but dropped by the rate limiter.
    DroppedRateLimited,
    /// A sample was taken but the payload pool was exhausted.
    DroppedOutOfMemory,
}

#[derive(Debug, Default)]
pub struct TrackStats {
    pub samples_taken: AtomicU64,
    pub samples_forwarded: AtomicU64,
    pub samples_downsampled: AtomicU64,
    pub samples_rate_limited: AtomicU64,
    pub samples_out_of_memory: AtomicU64,
    pub writer_errors: AtomicU64,
    pub writers_removed_fatal: AtomicU64,
}

struct TrackInner {
    writers: HashMap<ParticipantId, Arc<dyn Writer>>,
    state: TrackState,
    downsample_idx: u32,
    last_received_ts: Option<Instant>,
}

/// One reader plus the writers it fans out to, for a single topic.
pub struct Track {
    topic: Arc<DistributedTopic>,
    reader_pid: ParticipantId,
    reader: Arc<dyn Reader>,
    payload_pool: PayloadPool,
    inner: Mutex<TrackInner>,
    stats: Arc<TrackStats>,
    /// Writer ids dropped by a fatal write error since the last drain, for
    /// the owning Bridge to pick up and remove bridge-wide (spec: a fatal
    /// writer is "removed from the track and the bridge").
    fatal_removed: Mutex<Vec<ParticipantId>>,
}

impl Track {
    pub fn new(
        topic: Arc<DistributedTopic>,
        reader_pid: ParticipantId,
        reader: Arc<dyn Reader>,
        writers: HashMap<ParticipantId, Arc<dyn Writer>>,
        payload_pool: PayloadPool,
    ) -> Self {
        Self {
            topic,
            reader_pid,
            reader,
            payload_pool,
            inner: Mutex::new(TrackInner {
                writers,
                state: TrackState::Created,
                downsample_idx: 0,
                last_received_ts: None,
            }),
            stats: Arc::new(TrackStats::default()),
            fatal_removed: Mutex::new(Vec::new()),
        }
    }

    pub fn topic(&self) -> &DistributedTopic {
        &self.topic
    }

    pub fn reader_pid(&self) -> &ParticipantId {
        &self.reader_pid
    }

    pub fn stats(&self) -> Arc<TrackStats> {
        self.stats.clone()
    }

    pub fn state(&self) -> TrackState {
        self.inner.lock().state
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == TrackState::Enabled
    }

    /// Idempotent: enabling an already-enabled (or destroyed) track is a no-op.
    pub fn enable(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, TrackState::Created | TrackState::Disabled) {
            inner.state = TrackState::Enabled;
            self.reader.enable();
        }
    }

    /// Idempotent. Stops forwarding at the next suspension point; samples
    /// already in flight to writers are allowed to complete.
    pub fn disable(&self) {
        let mut inner = self.inner.lock();
        if inner.state == TrackState::Enabled {
            inner.state = TrackState::Disabled;
            self.reader.disable();
        }
    }

    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        inner.state = TrackState::Destroyed;
    }

    pub fn add_writer(&self, id: ParticipantId, writer: Arc<dyn Writer>) {
        self.inner.lock().writers.insert(id, writer);
    }

    /// Returns `true` if a writer with this id was present and removed.
    pub fn remove_writer(&self, id: &ParticipantId) -> bool {
        self.inner.lock().writers.remove(id).is_some()
    }

    pub fn has_writer(&self, id: &ParticipantId) -> bool {
        self.inner.lock().writers.contains_key(id)
    }

    pub fn has_writers(&self) -> bool {
        !self.inner.lock().writers.is_empty()
    }

    pub fn writer_count(&self) -> usize {
        self.inner.lock().writers.len()
    }

    pub fn writer_ids(&self) -> Vec<ParticipantId> {
        self.inner.lock().writers.keys().cloned().collect()
    }

    /// Drain the ids of writers this track has dropped due to a fatal write
    /// error since the last call. The Bridge owning this track calls this
    /// after every drain to finish the "removed from the track and the
    /// bridge" half of a fatal write error.
    pub fn take_fatal_removed(&self) -> Vec<ParticipantId> {
        std::mem::take(&mut *self.fatal_removed.lock())
    }

    /// Process every sample currently buffered in the reader. Returns the
    /// number forwarded. Intended for tests and for drivers that prefer to
    /// drain synchronously rather than poll one sample at a time.
    pub fn drain(&self) -> usize {
        let mut forwarded = 0;
        loop {
            match self.poll_once() {
                PollOutcome::Forwarded => forwarded += 1,
                PollOutcome::Idle => break,
                _ => {}
            }
        }
        forwarded
    }

    /// Take at most one sample from the reader and apply the forwarding
    /// contract: downsample, then rate-limit, then fan out to writers.
    pub fn poll_once(&self) -> PollOutcome {
        if !self.is_enabled() {
            return PollOutcome::Idle;
        }

        let sample = match self.reader.take() {
            Some(s) => s,
            None => return PollOutcome::Idle,
        };
        self.stats.samples_taken.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let downsampling = self.topic.qos.downsampling.max(1);
        let max_rate = self.topic.qos.max_reception_rate;

        let mut inner = self.inner.lock();

        let considered_idx = inner.downsample_idx;
        inner.downsample_idx = inner.downsample_idx.wrapping_add(1);

        if downsampling > 1 && considered_idx % downsampling != 0 {
            self.stats.samples_downsampled.fetch_add(1, Ordering::Relaxed);
            return PollOutcome::DroppedDownsampled;
        }

        if max_rate > 0.0 {
            let min_period = Duration::from_secs_f64(1.0 / max_rate);
            if let Some(last) = inner.last_received_ts {
                if now.saturating_duration_since(last) < min_period {
                    self.stats
                        .samples_rate_limited
                        .fetch_add(1, Ordering::Relaxed);
                    return PollOutcome::DroppedRateLimited;
                }
            }
        }
        inner.last_received_ts = Some(now);

        let writers: Vec<(ParticipantId, Arc<dyn Writer>)> = inner
            .writers
            .iter()
            .map(|(id, w)| (id.clone(), w.clone()))
            .collect();
        drop(inner);

        let payload = match self.payload_pool.get_payload(sample.bytes.len()) {
            Ok(p) => p,
            Err(PayloadError::OutOfMemory { .. }) => {
                self.stats
                    .samples_out_of_memory
                    .fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    "payload pool exhausted forwarding topic '{}'; sample dropped",
                    self.topic.name
                );
                return PollOutcome::DroppedOutOfMemory;
            }
        };
        payload.copy_from_slice(&sample.bytes);

        for (writer_id, writer) in &writers {
            let writer_payload = self.payload_pool.get_payload_ref(&payload);
            match writer.write(writer_payload) {
                WriteOutcome::Ok => {}
                WriteOutcome::Recoverable(reason) => {
                    self.stats.writer_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "recoverable write error on topic '{}' to writer '{}': {}",
                        self.topic.name,
                        writer_id,
                        reason
                    );
                }
                WriteOutcome::Fatal(reason) => {
                    self.stats
                        .writers_removed_fatal
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "fatal write error on topic '{}', removing writer '{}': {}",
                        self.topic.name,
                        writer_id,
                        reason
                    );
                    self.remove_writer(writer_id);
                    self.fatal_removed.lock().push(writer_id.clone());
                }
            }
        }

        self.stats.samples_forwarded.fetch_add(1, Ordering::Relaxed);
        PollOutcome::Forwarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::test_support::{StubReader, StubWriter, WriteFailure};
    use crate::topic::TopicQos;
    use std::thread::sleep;

    fn track_with_qos(qos: TopicQos) -> (Track, Arc<StubReader>, Arc<StubWriter>) {
        let topic = Arc::new(DistributedTopic::new("T", "Type").with_qos(qos));
        let reader = StubReader::new("r1", (*topic).clone());
        let writer = StubWriter::new();
        let mut writers: HashMap<ParticipantId, Arc<dyn Writer>> = HashMap::new();
        writers.insert(ParticipantId::new("W"), writer.clone());

        let track = Track::new(
            topic,
            ParticipantId::new("R"),
            reader.clone(),
            writers,
            PayloadPool::new(None),
        );
        track.enable();
        (track, reader, writer)
    }

    #[test]
    fn test_forward_single_sample() {
        let (track, reader, writer) = track_with_qos(TopicQos::default());
        reader.push(vec![1, 2, 3]);

        assert_eq!(track.poll_once(), PollOutcome::Forwarded);
        assert_eq!(writer.received.lock().unwrap().len(), 1);
        assert_eq!(writer.received.lock().unwrap()[0], vec![1, 2, 3]);
    }

    #[test]
    fn test_disabled_track_does_not_forward() {
        let (track, reader, writer) = track_with_qos(TopicQos::default());
        track.disable();
        reader.push(vec![9]);

        assert_eq!(track.poll_once(), PollOutcome::Idle);
        assert!(writer.received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_downsampling_keeps_every_nth() {
        // scenario 3: downsampling=3, s1..s7 -> keep s1, s4, s7
        let qos = TopicQos {
            downsampling: 3,
            ..Default::default()
        };
        let (track, reader, writer) = track_with_qos(qos);

        for i in 1..=7u8 {
            reader.push(vec![i]);
        }
        track.drain();

        let received = writer.received.lock().unwrap();
        assert_eq!(*received, vec![vec![1u8], vec![4u8], vec![7u8]]);
    }

    #[test]
    fn test_rate_limit_drops_within_window() {
        // scenario 4: max_reception_rate=10 (100ms gap); t=0,50,120,130 -> keep {0,120}
        let qos = TopicQos {
            max_reception_rate: 10.0,
            ..Default::default()
        };
        let (track, reader, writer) = track_with_qos(qos);

        reader.push(vec![0]);
        track.poll_once();

        sleep(Duration::from_millis(50));
        reader.push(vec![50]);
        track.poll_once();

        sleep(Duration::from_millis(70)); // total ~120ms since t=0
        reader.push(vec![120]);
        track.poll_once();

        sleep(Duration::from_millis(10)); // total ~130ms
        reader.push(vec![130]);
        track.poll_once();

        let received: Vec<u8> = writer
            .received
            .lock()
            .unwrap()
            .iter()
            .map(|b| b[0])
            .collect();
        assert_eq!(received, vec![0, 120]);
    }

    #[test]
    fn test_fatal_writer_removed_from_track() {
        let topic = Arc::new(DistributedTopic::new("T", "Type"));
        let reader = StubReader::new("r1", (*topic).clone());
        let fatal_writer = StubWriter::failing(WriteFailure::Fatal);
        let mut writers: HashMap<ParticipantId, Arc<dyn Writer>> = HashMap::new();
        writers.insert(ParticipantId::new("W"), fatal_writer);

        let track = Track::new(
            topic,
            ParticipantId::new("R"),
            reader.clone(),
            writers,
            PayloadPool::new(None),
        );
        track.enable();
        reader.push(vec![1]);
        track.poll_once();

        assert!(!track.has_writer(&ParticipantId::new("W")));
        assert_eq!(track.stats().writers_removed_fatal.load(Ordering::Relaxed), 1);
        assert_eq!(track.take_fatal_removed(), vec![ParticipantId::new("W")]);
        assert!(track.take_fatal_removed().is_empty());
    }

    #[test]
    fn test_recoverable_writer_error_keeps_writer() {
        let topic = Arc::new(DistributedTopic::new("T", "Type"));
        let reader = StubReader::new("r1", (*topic).clone());
        let writer = StubWriter::failing(WriteFailure::Recoverable);
        let mut writers: HashMap<ParticipantId, Arc<dyn Writer>> = HashMap::new();
        writers.insert(ParticipantId::new("W"), writer);

        let track = Track::new(
            topic,
            ParticipantId::new("R"),
            reader.clone(),
            writers,
            PayloadPool::new(None),
        );
        track.enable();
        reader.push(vec![1]);
        track.poll_once();

        assert!(track.has_writer(&ParticipantId::new("W")));
        assert_eq!(track.stats().writer_errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_add_remove_has_writer() {
        let (track, _reader, _writer) = track_with_qos(TopicQos::default());
        assert!(track.has_writer(&ParticipantId::new("W")));

        assert!(track.remove_writer(&ParticipantId::new("W")));
        assert!(!track.has_writer(&ParticipantId::new("W")));
        assert!(!track.has_writers());

        track.add_writer(ParticipantId::new("W2"), StubWriter::new());
        assert!(track.has_writer(&ParticipantId::new("W2")));
    }

    #[test]
    fn test_enable_disable_idempotent() {
        let (track, _reader, _writer) = track_with_qos(TopicQos::default());
        assert!(track.is_enabled());
        track.enable();
        track.enable();
        assert!(track.is_enabled());

        track.disable();
        track.disable();
        assert!(!track.is_enabled());
    }
}
