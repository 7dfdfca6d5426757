// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Top-level coordinator: wires the Participants Database, Discovery
//! Database, Allowed-Topics Filter and Routes Configuration together,
//! creating and tearing down Bridges as topics are discovered.

use crate::bridge::{Bridge, BridgeError};
use crate::config::{ConfigError, EntityCreationTrigger, PipeConfiguration};
use crate::discovery::{DiscoveryDatabase, DiscoveryEvent, EndpointKind, EndpointRecord};
use crate::filter::AllowedTopicsFilter;
use crate::participant::{ParticipantId, ParticipantsDatabase};
use crate::payload::PayloadPool;
use crate::routes::{get_routes_config, RoutesConfiguration, TopicRoutesConfiguration};
use crate::topic::DistributedTopic;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Interval at which the background scheduler drains every bridge's tracks.
/// Mirrors `hdds-router::router::ROUTE_POLL_INTERVAL`.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Either a runtime handle borrowed from whatever async context constructed
/// the controller, or one this controller owns because none was running.
enum SchedulerRuntime {
    Borrowed(tokio::runtime::Handle),
    Owned(tokio::runtime::Runtime),
}

impl SchedulerRuntime {
    fn handle(&self) -> tokio::runtime::Handle {
        match self {
            Self::Borrowed(h) => h.clone(),
            Self::Owned(rt) => rt.handle().clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("pipe already enabled")]
    AlreadyEnabled,

    #[error("pipe not enabled")]
    NotEnabled,
}

struct Routing {
    generic: RoutesConfiguration,
    topic_routes: TopicRoutesConfiguration,
    trigger: EntityCreationTrigger,
    remove_unused_entities: bool,
}

/// Coordinates discovery, filtering and routing for one pipe instance.
///
/// Bridges are created reactively as endpoints are discovered and torn down
/// (when `remove_unused_entities` is set) once they have no tracks left.
pub struct PipeController {
    participants: ParticipantsDatabase,
    discovery: Arc<DiscoveryDatabase>,
    filter: RwLock<AllowedTopicsFilter>,
    routing: RwLock<Routing>,
    payload_pool: PayloadPool,
    bridges: Mutex<HashMap<(String, String), Arc<Bridge>>>,
    enabled: AtomicBool,
    scheduler_running: Arc<AtomicBool>,
    poll_semaphore: Arc<Semaphore>,
    runtime: SchedulerRuntime,
}

impl PipeController {
    pub fn new(config: PipeConfiguration) -> Arc<Self> {
        let filter = AllowedTopicsFilter::new(
            config.allowlist.clone(),
            config.blocklist.clone(),
            config.manual_topics.clone(),
        );
        let routing = Routing {
            generic: config.generic_routes(),
            topic_routes: config.topic_routes_config(),
            trigger: config.entity_creation_trigger,
            remove_unused_entities: config.remove_unused_entities,
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => SchedulerRuntime::Borrowed(handle),
            Err(_) => {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(config.worker_concurrency.max(1))
                    .enable_all()
                    .build()
                    .expect("failed to start background runtime");
                SchedulerRuntime::Owned(rt)
            }
        };

        let controller = Arc::new(Self {
            participants: ParticipantsDatabase::new(),
            discovery: Arc::new(DiscoveryDatabase::new()),
            filter: RwLock::new(filter),
            routing: RwLock::new(routing),
            payload_pool: PayloadPool::new(config.max_payload_pool_bytes),
            bridges: Mutex::new(HashMap::new()),
            enabled: AtomicBool::new(false),
            scheduler_running: Arc::new(AtomicBool::new(true)),
            poll_semaphore: Arc::new(Semaphore::new(config.worker_concurrency.max(1))),
            runtime,
        });

        let weak = Arc::downgrade(&controller);
        controller.discovery.subscribe(Arc::new(move |event: &DiscoveryEvent| {
            if let Some(controller) = weak.upgrade() {
                controller.on_discovery_event(event);
            }
        }));

        controller.create_builtin_bridges(&config.builtin_topics);
        controller.spawn_scheduler();

        if config.init_enabled {
            controller.enable();
        }
        controller
    }

    /// Force a Bridge to exist for each configured builtin topic, bypassing
    /// `entity_creation_trigger` and independent of any endpoint having
    /// announced itself yet.
    fn create_builtin_bridges(&self, builtin_topics: &[DistributedTopic]) {
        let mut bridges = self.bridges.lock();
        for topic in builtin_topics {
            let key = (topic.name.clone(), topic.type_name.clone());
            if bridges.contains_key(&key) {
                continue;
            }
            tracing::debug!("Creating builtin bridge for topic '{}'", topic);
            let bridge = Bridge::new(topic.clone(), self.payload_pool.clone());
            bridges.insert(key, Arc::new(bridge));
        }
    }

    /// Spawn the background task that periodically drains every bridge's
    /// tracks, bounded by `poll_semaphore`. Runs until `shutdown` is called
    /// or the controller is dropped, following the
    /// `AtomicBool`-gated-loop-plus-spawned-unit-of-work shape of
    /// `hdds-router::router::run_route`.
    fn spawn_scheduler(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let running = self.scheduler_running.clone();
        self.runtime.handle().spawn(async move {
            while running.load(Ordering::Relaxed) {
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.poll_tick().await;
                drop(controller);
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        });
    }

    async fn poll_tick(&self) {
        if !self.is_enabled() {
            return;
        }

        let bridges: Vec<Arc<Bridge>> = self.bridges.lock().values().cloned().collect();
        let mut handles = Vec::with_capacity(bridges.len());
        for bridge in bridges {
            let permit = self
                .poll_semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("poll semaphore never closed");
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                bridge.poll_all_tracks()
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Stop the background scheduler. Idempotent; does not tear down
    /// bridges or tracks, just stops draining them.
    pub fn shutdown(&self) {
        self.scheduler_running.store(false, Ordering::Relaxed);
    }

    pub fn participants(&self) -> &ParticipantsDatabase {
        &self.participants
    }

    pub fn discovery(&self) -> &DiscoveryDatabase {
        &self.discovery
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Idempotent: enabling an already-enabled pipe is a no-op.
    pub fn enable(&self) {
        if self.enabled.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Pipe enabled");
        for bridge in self.bridges.lock().values() {
            bridge.enable();
        }
    }

    /// Idempotent.
    pub fn disable(&self) {
        if !self.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Pipe disabled");
        for bridge in self.bridges.lock().values() {
            bridge.disable();
        }
    }

    pub fn bridge_count(&self) -> usize {
        self.bridges.lock().len()
    }

    /// Replace the filter and routing configuration wholesale, then
    /// recompute every existing bridge's tracks against the new routes:
    /// writers no longer eligible are dropped, newly eligible ones are
    /// attached, and a track whose eligible set is unchanged is left as-is.
    /// Future discovery events are evaluated against the new configuration
    /// too; bridges and their reader/writer registrations themselves are
    /// left in place.
    pub fn reload(&self, config: &PipeConfiguration) {
        tracing::info!("Reloading pipe configuration");
        *self.filter.write() = AllowedTopicsFilter::new(
            config.allowlist.clone(),
            config.blocklist.clone(),
            config.manual_topics.clone(),
        );
        *self.routing.write() = Routing {
            generic: config.generic_routes(),
            topic_routes: config.topic_routes_config(),
            trigger: config.entity_creation_trigger,
            remove_unused_entities: config.remove_unused_entities,
        };

        // Lock order matches `handle_endpoint_present`: bridges, then routing.
        let bridges = self.bridges.lock();
        let routing = self.routing.read();
        for bridge in bridges.values() {
            let resolved = get_routes_config(&routing.generic, &routing.topic_routes, bridge.topic());
            bridge.resync_routes(resolved);
        }
    }

    fn on_discovery_event(&self, event: &DiscoveryEvent) {
        match event {
            DiscoveryEvent::Discovered(record) | DiscoveryEvent::Updated(record) => {
                self.handle_endpoint_present(record);
            }
            DiscoveryEvent::Removed(record) => {
                self.handle_endpoint_removed(record);
            }
        }
    }

    fn handle_endpoint_present(&self, record: &EndpointRecord) {
        let mut topic = record.topic.clone();
        if !self.filter.read().accept(&mut topic) {
            return;
        }

        let trigger = self.routing.read().trigger;
        let key = (topic.name.clone(), topic.type_name.clone());
        let should_create = match trigger {
            EntityCreationTrigger::Any => true,
            EntityCreationTrigger::Reader => record.kind == EndpointKind::Reader,
            EntityCreationTrigger::Writer => record.kind == EndpointKind::Writer,
        };

        let mut bridges = self.bridges.lock();
        if !bridges.contains_key(&key) {
            if !should_create {
                return;
            }
            let bridge = Bridge::new(topic.clone(), self.payload_pool.clone());
            if self.is_enabled() {
                bridge.enable();
            }
            bridges.insert(key.clone(), Arc::new(bridge));
        }
        let bridge = bridges.get(&key).expect("just inserted");

        let routing = self.routing.read();
        let generic_routes = &routing.generic;
        let resolved_routes = get_routes_config(generic_routes, &routing.topic_routes, &topic);

        let result = match record.kind {
            EndpointKind::Reader => {
                bridge.create_reader(&self.participants, &record.participant_id, resolved_routes)
            }
            EndpointKind::Writer => {
                bridge.create_writer(&self.participants, &record.participant_id, resolved_routes)
            }
        };

        if let Err(err) = result {
            tracing::warn!(
                "failed to wire endpoint '{}' on topic '{}': {}",
                record.participant_id,
                topic,
                err
            );
        }
    }

    fn handle_endpoint_removed(&self, record: &EndpointRecord) {
        let key = (record.topic.name.clone(), record.topic.type_name.clone());
        let mut bridges = self.bridges.lock();
        let Some(bridge) = bridges.get(&key) else {
            return;
        };

        match record.kind {
            EndpointKind::Reader => {
                bridge.remove_reader(&record.participant_id);
            }
            EndpointKind::Writer => {
                bridge.remove_writer(&record.participant_id);
            }
        }

        if self.routing.read().remove_unused_entities && bridge.track_count() == 0 {
            bridges.remove(&key);
            tracing::debug!("Removed unused bridge for topic '{}'", key.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::EndpointRecord;
    use crate::participant::test_support::StubParticipant;
    use crate::routes::RouteEntry;

    fn endpoint(
        guid: &str,
        kind: EndpointKind,
        topic: &str,
        participant: &str,
    ) -> EndpointRecord {
        EndpointRecord {
            guid: guid.to_string(),
            kind,
            topic: DistributedTopic::new(topic, "Type"),
            participant_id: ParticipantId::new(participant),
            active: true,
        }
    }

    #[test]
    fn test_two_participant_echo() {
        // scenario 1: A reads+writes on T, B reads+writes on T, routed A<->B
        let mut config = PipeConfiguration::default();
        config.routes.push(RouteEntry {
            src: ParticipantId::new("A"),
            dst: [ParticipantId::new("B")].into_iter().collect(),
        });
        config.routes.push(RouteEntry {
            src: ParticipantId::new("B"),
            dst: [ParticipantId::new("A")].into_iter().collect(),
        });

        let controller = PipeController::new(config);
        controller
            .participants()
            .insert(StubParticipant::new("A", false))
            .unwrap();
        controller
            .participants()
            .insert(StubParticipant::new("B", false))
            .unwrap();

        controller
            .discovery()
            .add_or_modify(endpoint("a-reader", EndpointKind::Reader, "T", "A"));
        controller
            .discovery()
            .add_or_modify(endpoint("b-writer", EndpointKind::Writer, "T", "B"));

        assert_eq!(controller.bridge_count(), 1);
        let bridges = controller.bridges.lock();
        let bridge = bridges.get(&("T".to_string(), "Type".to_string())).unwrap();
        assert!(bridge.track_has_writer(&ParticipantId::new("A"), &ParticipantId::new("B")));
    }

    #[test]
    fn test_blocklist_prevents_bridge_creation() {
        let mut config = PipeConfiguration::default();
        config.blocklist.push(crate::topic::WildcardDdsFilterTopic::new("T", ""));

        let controller = PipeController::new(config);
        controller
            .participants()
            .insert(StubParticipant::new("A", false))
            .unwrap();
        controller
            .discovery()
            .add_or_modify(endpoint("a-reader", EndpointKind::Reader, "T", "A"));

        assert_eq!(controller.bridge_count(), 0);
    }

    #[test]
    fn test_removal_tears_down_unused_bridge() {
        let mut config = PipeConfiguration::default();
        config.routes.push(RouteEntry {
            src: ParticipantId::new("A"),
            dst: [ParticipantId::new("B")].into_iter().collect(),
        });

        let controller = PipeController::new(config);
        controller
            .participants()
            .insert(StubParticipant::new("A", false))
            .unwrap();
        controller
            .participants()
            .insert(StubParticipant::new("B", false))
            .unwrap();

        let reader_endpoint = endpoint("a-reader", EndpointKind::Reader, "T", "A");
        controller.discovery().add_or_modify(reader_endpoint.clone());
        assert_eq!(controller.bridge_count(), 1);

        controller.discovery().erase(&reader_endpoint.guid).unwrap();
        assert_eq!(controller.bridge_count(), 0);
    }

    #[test]
    fn test_enable_disable_idempotent_and_cascades() {
        let mut config = PipeConfiguration::default();
        config.init_enabled = false;
        config.routes.push(RouteEntry {
            src: ParticipantId::new("A"),
            dst: [ParticipantId::new("B")].into_iter().collect(),
        });

        let controller = PipeController::new(config);
        assert!(!controller.is_enabled());

        controller
            .participants()
            .insert(StubParticipant::new("A", false))
            .unwrap();
        controller
            .discovery()
            .add_or_modify(endpoint("a-reader", EndpointKind::Reader, "T", "A"));

        controller.enable();
        controller.enable(); // idempotent
        assert!(controller.is_enabled());

        let bridges = controller.bridges.lock();
        let bridge = bridges.get(&("T".to_string(), "Type".to_string())).unwrap();
        assert!(bridge.is_enabled());
    }

    #[test]
    fn test_builtin_topic_creates_bridge_before_any_discovery() {
        let mut config = PipeConfiguration::default();
        config.entity_creation_trigger = EntityCreationTrigger::Writer;
        config.builtin_topics.push(DistributedTopic::new("T", "Type"));

        let controller = PipeController::new(config);
        assert_eq!(controller.bridge_count(), 1);
    }

    #[test]
    fn test_reload_recomputes_existing_bridge_tracks() {
        let mut cfg_a = PipeConfiguration::default();
        cfg_a.routes.push(RouteEntry {
            src: ParticipantId::new("A"),
            dst: [ParticipantId::new("B")].into_iter().collect(),
        });

        let mut cfg_b = PipeConfiguration::default();
        cfg_b.routes.push(RouteEntry {
            src: ParticipantId::new("A"),
            dst: [ParticipantId::new("C")].into_iter().collect(),
        });

        let controller = PipeController::new(cfg_a.clone());
        controller
            .participants()
            .insert(StubParticipant::new("A", false))
            .unwrap();
        controller
            .participants()
            .insert(StubParticipant::new("B", false))
            .unwrap();
        controller
            .participants()
            .insert(StubParticipant::new("C", false))
            .unwrap();

        controller
            .discovery()
            .add_or_modify(endpoint("a-reader", EndpointKind::Reader, "T", "A"));
        controller
            .discovery()
            .add_or_modify(endpoint("b-writer", EndpointKind::Writer, "T", "B"));
        controller
            .discovery()
            .add_or_modify(endpoint("c-writer", EndpointKind::Writer, "T", "C"));

        let key = ("T".to_string(), "Type".to_string());
        {
            let bridges = controller.bridges.lock();
            let bridge = bridges.get(&key).unwrap();
            assert!(bridge.track_has_writer(&ParticipantId::new("A"), &ParticipantId::new("B")));
            assert!(!bridge.track_has_writer(&ParticipantId::new("A"), &ParticipantId::new("C")));
        }

        // Swap to a route that points A at C instead of B.
        controller.reload(&cfg_b);
        {
            let bridges = controller.bridges.lock();
            let bridge = bridges.get(&key).unwrap();
            assert!(!bridge.track_has_writer(&ParticipantId::new("A"), &ParticipantId::new("B")));
            assert!(bridge.track_has_writer(&ParticipantId::new("A"), &ParticipantId::new("C")));
        }

        // Reload back to the original config restores the original wiring.
        controller.reload(&cfg_a);
        {
            let bridges = controller.bridges.lock();
            let bridge = bridges.get(&key).unwrap();
            assert!(bridge.track_has_writer(&ParticipantId::new("A"), &ParticipantId::new("B")));
            assert!(!bridge.track_has_writer(&ParticipantId::new("A"), &ParticipantId::new("C")));
        }
    }

    #[test]
    fn test_entity_creation_trigger_writer_only() {
        let mut config = PipeConfiguration::default();
        config.entity_creation_trigger = EntityCreationTrigger::Writer;
        config.routes.push(RouteEntry {
            src: ParticipantId::new("A"),
            dst: [ParticipantId::new("B")].into_iter().collect(),
        });

        let controller = PipeController::new(config);
        controller
            .participants()
            .insert(StubParticipant::new("A", false))
            .unwrap();
        controller
            .participants()
            .insert(StubParticipant::new("B", false))
            .unwrap();

        // reader-only discovery does not create a bridge under Writer trigger
        controller
            .discovery()
            .add_or_modify(endpoint("a-reader", EndpointKind::Reader, "T", "A"));
        assert_eq!(controller.bridge_count(), 0);

        controller
            .discovery()
            .add_or_modify(endpoint("b-writer", EndpointKind::Writer, "T", "B"));
        assert_eq!(controller.bridge_count(), 1);
    }
}
