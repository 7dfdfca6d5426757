// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A transport-agnostic pub/sub routing core: participants register
//! readers and writers against topics, and the pipe forwards samples
//! between them according to an allow/block-list filter and a route table.
//!
//! Concrete wire protocols (RTPS, shared memory, in-process echo, ...) are
//! external collaborators that implement the [`participant::Participant`],
//! [`participant::Reader`] and [`participant::Writer`] traits; this crate
//! owns only the routing core: the payload pool, the topic model, the
//! filter, the routes table, the participants and discovery registries, and
//! the bridge/track forwarding machinery that ties them together.

pub mod bridge;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod filter;
pub mod participant;
pub mod payload;
pub mod routes;
pub mod topic;
pub mod track;

pub use bridge::{Bridge, BridgeError};
pub use config::{ConfigError, EntityCreationTrigger, PipeConfiguration};
pub use controller::{PipeController, PipeError};
pub use discovery::{DiscoveryDatabase, DiscoveryError, DiscoveryEvent, EndpointKind, EndpointRecord};
pub use filter::{AllowedTopicsFilter, Decision};
pub use participant::{
    Participant, ParticipantError, ParticipantId, ParticipantsDatabase, RawSample, Reader,
    WriteOutcome, Writer,
};
pub use payload::{Payload, PayloadError, PayloadPool};
pub use routes::{
    get_routes_config, routes_from_entries, validate_routes, RouteEntry, RouteError,
    RoutesConfiguration, TopicRoutesConfiguration,
};
pub use topic::{
    glob_match, DistributedTopic, Durability, PartialTopicQos, Reliability, TopicQos,
    WildcardDdsFilterTopic,
};
pub use track::{PollOutcome, Track, TrackState, TrackStats};
