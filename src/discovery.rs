// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Append-mostly store of discovered endpoints, with change notification.

use crate::participant::ParticipantId;
use crate::topic::DistributedTopic;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Reader,
    Writer,
}

/// A discovered reader or writer.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointRecord {
    pub guid: String,
    pub kind: EndpointKind,
    pub topic: DistributedTopic,
    pub participant_id: ParticipantId,
    pub active: bool,
}

/// Change notification emitted by the Discovery Database.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    Discovered(EndpointRecord),
    Updated(EndpointRecord),
    Removed(EndpointRecord),
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("erase of unknown endpoint guid '{0}'")]
    UnknownEndpoint(String),
}

type Callback = Arc<dyn Fn(&DiscoveryEvent) + Send + Sync>;

/// Endpoint inventory and change-notification bus.
///
/// Per-GUID event order is preserved; no ordering is promised across GUIDs.
/// Callbacks are invoked after the write lock on the record map is released,
/// so a callback may safely call back into the database.
#[derive(Default)]
pub struct DiscoveryDatabase {
    records: RwLock<HashMap<String, EndpointRecord>>,
    callbacks: RwLock<Vec<Callback>>,
}

impl DiscoveryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked for every subsequent discovery event.
    pub fn subscribe(&self, callback: Callback) {
        self.callbacks.write().push(callback);
    }

    /// Insert or update an endpoint. Emits `Discovered` if it is new,
    /// `Updated` if it existed and any field changed, and nothing at all if
    /// the record is identical to what is already stored.
    pub fn add_or_modify(&self, endpoint: EndpointRecord) {
        let event = {
            let mut records = self.records.write();
            match records.get(&endpoint.guid) {
                Some(existing) if *existing == endpoint => return,
                Some(_) => DiscoveryEvent::Updated(endpoint.clone()),
                None => DiscoveryEvent::Discovered(endpoint.clone()),
            }
        };
        self.records.write().insert(endpoint.guid.clone(), endpoint);
        self.notify(&event);
    }

    /// Remove an endpoint by GUID, emitting `Removed`.
    ///
    /// Erasing an absent GUID is non-fatal: it is logged as a warning and
    /// `Err(DiscoveryError::UnknownEndpoint)` is returned for the caller to
    /// observe, but callers should not treat it as fatal.
    pub fn erase(&self, guid: &str) -> Result<(), DiscoveryError> {
        let removed = self.records.write().remove(guid);
        match removed {
            Some(record) => {
                self.notify(&DiscoveryEvent::Removed(record));
                Ok(())
            }
            None => {
                tracing::warn!("erase() called for unknown endpoint guid '{}'", guid);
                Err(DiscoveryError::UnknownEndpoint(guid.to_string()))
            }
        }
    }

    pub fn get(&self, guid: &str) -> Option<EndpointRecord> {
        self.records.read().get(guid).cloned()
    }

    pub fn endpoints_for_topic(&self, topic_name: &str) -> Vec<EndpointRecord> {
        self.records
            .read()
            .values()
            .filter(|e| e.topic.name == topic_name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, event: &DiscoveryEvent) {
        let callbacks = self.callbacks.read().clone();
        for callback in callbacks.iter() {
            callback(event);
        }
    }
}
