// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decides whether a discovered topic participates in routing, and applies
//! manual QoS overrides to the topics that do.

use crate::topic::{DistributedTopic, WildcardDdsFilterTopic};

/// Whether a topic should be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block,
}

/// Allow/block-list + manual QoS overrides.
///
/// The decision for a topic depends only on `(allowlist, blocklist,
/// manual_topics)`, never on the order discovery events arrived in — the
/// filter itself holds no mutable state.
#[derive(Debug, Clone, Default)]
pub struct AllowedTopicsFilter {
    allowlist: Vec<WildcardDdsFilterTopic>,
    blocklist: Vec<WildcardDdsFilterTopic>,
    manual_topics: Vec<WildcardDdsFilterTopic>,
}

impl AllowedTopicsFilter {
    pub fn new(
        allowlist: Vec<WildcardDdsFilterTopic>,
        blocklist: Vec<WildcardDdsFilterTopic>,
        manual_topics: Vec<WildcardDdsFilterTopic>,
    ) -> Self {
        Self {
            allowlist,
            blocklist,
            manual_topics,
        }
    }

    /// Decide whether `topic` should be routed.
    ///
    /// 1. Any blocklist match blocks, unconditionally.
    /// 2. Otherwise allow if the allowlist is empty or any entry matches.
    /// 3. Otherwise block.
    pub fn decide(&self, topic: &DistributedTopic) -> Decision {
        if self.blocklist.iter().any(|f| f.matches(topic)) {
            return Decision::Block;
        }

        if self.allowlist.is_empty() || self.allowlist.iter().any(|f| f.matches(topic)) {
            Decision::Allow
        } else {
            Decision::Block
        }
    }

    /// Apply manual-topic QoS overrides to `topic`, in place.
    ///
    /// Manual topics are tried in declaration order; the first match sets
    /// whichever QoS fields it specifies, leaving the rest untouched.
    pub fn apply_manual_qos(&self, topic: &mut DistributedTopic) {
        for manual in &self.manual_topics {
            if manual.matches(topic) {
                if let Some(partial) = &manual.qos {
                    partial.apply(&mut topic.qos);
                }
                return;
            }
        }
    }

    /// Convenience: apply the filter decision and, if allowed, the manual QoS
    /// override in one call.
    pub fn accept(&self, topic: &mut DistributedTopic) -> bool {
        if self.decide(topic) == Decision::Block {
            return false;
        }
        self.apply_manual_qos(topic);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::{PartialTopicQos, Reliability};

    fn topic(name: &str) -> DistributedTopic {
        DistributedTopic::new(name, "T")
    }

    #[test]
    fn test_empty_allowlist_allows_all() {
        let filter = AllowedTopicsFilter::default();
        assert_eq!(filter.decide(&topic("anything")), Decision::Allow);
    }

    #[test]
    fn test_blocklist_wins_over_allow_all() {
        // scenario 5: allowlist={*}, blocklist={name="sensor/*"}
        let filter = AllowedTopicsFilter::new(
            vec![WildcardDdsFilterTopic::new("*", "")],
            vec![WildcardDdsFilterTopic::new("sensor/*", "")],
            vec![],
        );

        assert_eq!(filter.decide(&topic("sensor/temp")), Decision::Block);
        assert_eq!(filter.decide(&topic("cmd/vel")), Decision::Allow);
    }

    #[test]
    fn test_allowlist_restricts() {
        let filter = AllowedTopicsFilter::new(
            vec![WildcardDdsFilterTopic::new("cmd/*", "")],
            vec![],
            vec![],
        );

        assert_eq!(filter.decide(&topic("cmd/vel")), Decision::Allow);
        assert_eq!(filter.decide(&topic("sensor/temp")), Decision::Block);
    }

    #[test]
    fn test_manual_qos_first_match_wins() {
        let mut manual_a = WildcardDdsFilterTopic::new("sensor/*", "");
        manual_a.qos = Some(PartialTopicQos {
            reliability: Some(Reliability::Reliable),
            ..Default::default()
        });

        let mut manual_b = WildcardDdsFilterTopic::new("sensor/temp", "");
        manual_b.qos = Some(PartialTopicQos {
            downsampling: Some(5),
            ..Default::default()
        });

        let filter = AllowedTopicsFilter::new(vec![], vec![], vec![manual_a, manual_b]);

        let mut t = topic("sensor/temp");
        filter.apply_manual_qos(&mut t);

        // First match (manual_a) wins; manual_b never consulted.
        assert_eq!(t.qos.reliability, Reliability::Reliable);
        assert_eq!(t.qos.downsampling, 1);
    }

    #[test]
    fn test_decision_independent_of_evaluation_order() {
        let filter = AllowedTopicsFilter::new(
            vec![WildcardDdsFilterTopic::new("*", "")],
            vec![WildcardDdsFilterTopic::new("sensor/*", "")],
            vec![],
        );

        // Evaluate in different orders; outcome is purely a function of the
        // topic, never of prior calls.
        let first = filter.decide(&topic("sensor/temp"));
        let second = filter.decide(&topic("cmd/vel"));
        let first_again = filter.decide(&topic("sensor/temp"));

        assert_eq!(first, first_again);
        assert_ne!(first, second);
    }
}
