// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topics, topic QoS, and the wildcard filter topics used to match them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality-of-service options recognized on a topic.
///
/// Every field is optional at the filter-topic level (an unspecified field
/// keeps the discovered/default value); a [`DistributedTopic`] always carries
/// a fully resolved `TopicQos`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TopicQos {
    #[serde(default)]
    pub reliability: Reliability,
    #[serde(default)]
    pub durability: Durability,
    /// Keep-last history depth. Must be >= 1.
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default)]
    pub partitions: bool,
    #[serde(default)]
    pub ownership: bool,
    #[serde(default)]
    pub keyed: bool,
    /// Keep 1 out of every `downsampling` samples received. `1` = no downsampling.
    #[serde(default = "default_downsampling")]
    pub downsampling: u32,
    /// Maximum samples per second forwarded by a Track for this topic. `0.0` = unlimited.
    #[serde(default)]
    pub max_reception_rate: f64,
}

fn default_depth() -> u32 {
    1
}

fn default_downsampling() -> u32 {
    1
}

impl Default for TopicQos {
    fn default() -> Self {
        Self {
            reliability: Reliability::default(),
            durability: Durability::default(),
            depth: default_depth(),
            partitions: false,
            ownership: false,
            keyed: false,
            downsampling: default_downsampling(),
            max_reception_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reliability {
    #[default]
    BestEffort,
    Reliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Durability {
    #[default]
    Volatile,
    TransientLocal,
}

/// A concrete, fully-qualified topic instance with a type and resolved QoS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DistributedTopic {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub qos: TopicQos,
}

impl DistributedTopic {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            qos: TopicQos::default(),
        }
    }

    pub fn with_qos(mut self, qos: TopicQos) -> Self {
        self.qos = qos;
        self
    }
}

impl fmt::Display for DistributedTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.type_name)
    }
}

/// A glob pattern matching many concrete topics by name/type, with optional
/// QoS overrides applied to whatever it matches.
///
/// An empty pattern matches any name/type ("match any").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WildcardDdsFilterTopic {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub type_name: String,
    /// Partial QoS overrides; `None` fields fall through to the discovered value.
    #[serde(default)]
    pub qos: Option<PartialTopicQos>,
}

/// A `TopicQos` where every field is optional, used for manual-topic overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartialTopicQos {
    pub reliability: Option<Reliability>,
    pub durability: Option<Durability>,
    pub depth: Option<u32>,
    pub partitions: Option<bool>,
    pub ownership: Option<bool>,
    pub keyed: Option<bool>,
    pub downsampling: Option<u32>,
    pub max_reception_rate: Option<f64>,
}

impl PartialTopicQos {
    /// Apply the specified fields onto `base`, in place.
    pub fn apply(&self, base: &mut TopicQos) {
        if let Some(v) = self.reliability {
            base.reliability = v;
        }
        if let Some(v) = self.durability {
            base.durability = v;
        }
        if let Some(v) = self.depth {
            base.depth = v;
        }
        if let Some(v) = self.partitions {
            base.partitions = v;
        }
        if let Some(v) = self.ownership {
            base.ownership = v;
        }
        if let Some(v) = self.keyed {
            base.keyed = v;
        }
        if let Some(v) = self.downsampling {
            base.downsampling = v;
        }
        if let Some(v) = self.max_reception_rate {
            base.max_reception_rate = v;
        }
    }
}

impl WildcardDdsFilterTopic {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            qos: None,
        }
    }

    /// Check whether this filter topic matches a concrete topic.
    pub fn matches(&self, topic: &DistributedTopic) -> bool {
        glob_match(&self.name, &topic.name) && glob_match(&self.type_name, &topic.type_name)
    }
}

/// Simple glob matching (`*` = any run, `?` = one char). An empty pattern
/// matches anything.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_recursive(&pattern, &text, 0, 0)
}

fn glob_match_recursive(pattern: &[char], text: &[char], pi: usize, ti: usize) -> bool {
    if pi == pattern.len() {
        return ti == text.len();
    }

    match pattern[pi] {
        '*' => {
            for i in ti..=text.len() {
                if glob_match_recursive(pattern, text, pi + 1, i) {
                    return true;
                }
            }
            false
        }
        '?' => ti < text.len() && glob_match_recursive(pattern, text, pi + 1, ti + 1),
        c => ti < text.len() && text[ti] == c && glob_match_recursive(pattern, text, pi + 1, ti + 1),
    }
}
