// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Top-level pipe configuration.
//!
//! Field names mirror the YAML tags of the configuration surface this crate
//! is meant to sit behind (`allowlist`, `blocklist`, `builtin-topics`,
//! `routes`, `topic-routes`, `specs.*`), even though loading a full YAML
//! document is an external collaborator's job; this module only owns the
//! resolved, typed configuration and its TOML-file convenience loader.

use crate::participant::ParticipantId;
use crate::routes::{
    routes_from_entries, validate_routes, RouteEntry, RoutesConfiguration,
    TopicRoutesConfiguration,
};
use crate::topic::{DistributedTopic, WildcardDdsFilterTopic};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Route(#[from] crate::routes::RouteError),
}

/// When a Bridge is created for a newly discovered topic.
///
/// Mirrors the original `EntityCreationTrigger`: a bridge (and its tracks)
/// can be created as soon as any endpoint for the topic is seen, or held
/// back until specifically a reader or a writer shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityCreationTrigger {
    #[default]
    Any,
    Reader,
    Writer,
}

/// One `topic-routes:` entry: the topic it applies to, plus its override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TopicRouteEntry {
    pub topic_name: String,
    pub type_name: String,
    pub routes: Vec<RouteEntry>,
}

/// Resolved, typed pipe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipeConfiguration {
    #[serde(default)]
    pub allowlist: Vec<WildcardDdsFilterTopic>,
    #[serde(default)]
    pub blocklist: Vec<WildcardDdsFilterTopic>,
    /// Concrete topics a Bridge is force-created for at startup, regardless
    /// of `entity_creation_trigger` or whether any endpoint has announced
    /// itself yet.
    #[serde(default)]
    pub builtin_topics: Vec<DistributedTopic>,
    #[serde(default)]
    pub manual_topics: Vec<WildcardDdsFilterTopic>,

    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub topic_routes: Vec<TopicRouteEntry>,

    #[serde(default = "default_true")]
    pub remove_unused_entities: bool,
    #[serde(default = "default_true")]
    pub init_enabled: bool,
    #[serde(default)]
    pub entity_creation_trigger: EntityCreationTrigger,

    /// `specs.max-depth` equivalent: default history depth for topics that
    /// don't specify their own.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Optional ceiling on bytes simultaneously checked out of the shared
    /// payload pool. `None` = unbounded.
    #[serde(default)]
    pub max_payload_pool_bytes: Option<usize>,

    /// `specs.threads` equivalent: upper bound on bridges polled
    /// concurrently by the background scheduler, and the worker count of
    /// the runtime it spawns if one isn't already running.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> u32 {
    5
}

impl Default for PipeConfiguration {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            blocklist: Vec::new(),
            builtin_topics: Vec::new(),
            manual_topics: Vec::new(),
            routes: Vec::new(),
            topic_routes: Vec::new(),
            remove_unused_entities: true,
            init_enabled: true,
            entity_creation_trigger: EntityCreationTrigger::default(),
            max_depth: default_max_depth(),
            max_payload_pool_bytes: None,
            worker_concurrency: default_worker_concurrency(),
        }
    }
}

impl PipeConfiguration {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve the generic `routes:` list into a lookup map.
    pub fn generic_routes(&self) -> RoutesConfiguration {
        routes_from_entries(&self.routes)
    }

    /// Resolve the `topic-routes:` list into a per-topic lookup.
    pub fn topic_routes_config(&self) -> TopicRoutesConfiguration {
        let mut config = TopicRoutesConfiguration::new();
        for entry in &self.topic_routes {
            config.insert(
                entry.topic_name.clone(),
                entry.type_name.clone(),
                routes_from_entries(&entry.routes),
            );
        }
        config
    }

    /// Validate that every route references a known participant id.
    pub fn validate(&self, known_participants: &HashSet<ParticipantId>) -> Result<(), ConfigError> {
        validate_routes(&self.generic_routes(), known_participants)?;
        self.topic_routes_config().validate(known_participants)?;
        Ok(())
    }
}
