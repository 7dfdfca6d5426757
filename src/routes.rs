// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Generic and topic-specific `reader -> {writer}` route configuration.

use crate::participant::ParticipantId;
use crate::topic::DistributedTopic;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route references unknown participant '{participant}'")]
    InvalidRoute { participant: ParticipantId },
}

/// One `src: ParticipantId -> dst: set<ParticipantId>` entry, as written in
/// configuration (`routes:`/`topic-routes:` in the YAML surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    pub src: ParticipantId,
    pub dst: HashSet<ParticipantId>,
}

impl Serialize for ParticipantId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ParticipantId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ParticipantId::new(s))
    }
}

/// A resolved `reader -> {writer}` map for either the generic route set or
/// one topic's override.
pub type RoutesConfiguration = HashMap<ParticipantId, HashSet<ParticipantId>>;

/// Build a [`RoutesConfiguration`] from the list-of-entries shape used in
/// configuration files.
pub fn routes_from_entries(entries: &[RouteEntry]) -> RoutesConfiguration {
    entries
        .iter()
        .map(|e| (e.src.clone(), e.dst.clone()))
        .collect()
}

/// Validate that every participant named in `routes` is present in `known`.
///
/// Pure function over an external participant id set; validation never
/// touches live participant objects directly.
pub fn validate_routes(
    routes: &RoutesConfiguration,
    known: &HashSet<ParticipantId>,
) -> Result<(), RouteError> {
    for (src, dsts) in routes {
        if !known.contains(src) {
            return Err(RouteError::InvalidRoute {
                participant: src.clone(),
            });
        }
        for dst in dsts {
            if !known.contains(dst) {
                return Err(RouteError::InvalidRoute {
                    participant: dst.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Per-topic route overrides, keyed by `(topic name, type name)` rather than
/// full QoS equality: a topic-specific route shadows the generic route for
/// every instance of that topic regardless of QoS.
#[derive(Debug, Clone, Default)]
pub struct TopicRoutesConfiguration {
    routes: HashMap<(String, String), RoutesConfiguration>,
}

impl TopicRoutesConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, topic_name: impl Into<String>, type_name: impl Into<String>, routes: RoutesConfiguration) {
        self.routes.insert((topic_name.into(), type_name.into()), routes);
    }

    pub fn get(&self, topic: &DistributedTopic) -> Option<&RoutesConfiguration> {
        self.routes
            .get(&(topic.name.clone(), topic.type_name.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn validate(&self, known: &HashSet<ParticipantId>) -> Result<(), RouteError> {
        for routes in self.routes.values() {
            validate_routes(routes, known)?;
        }
        Ok(())
    }
}

/// Resolve the effective route set for a topic in a single lookup: the
/// topic-specific route if one exists, otherwise the generic route.
///
/// This replaces the original design's two separate lookups into
/// `topic_routes()` with one `Option`-returning call.
pub fn get_routes_config<'a>(
    generic: &'a RoutesConfiguration,
    topic_routes: &'a TopicRoutesConfiguration,
    topic: &DistributedTopic,
) -> &'a RoutesConfiguration {
    topic_routes.get(topic).unwrap_or(generic)
}
