//! Configuration
//!
//! The reconciler recognizes its markers by attribute name. The names are
//! configurable so an application can match whatever convention its
//! templates already use.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Options for the tree reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphConfig {
    /// Attribute holding the list key used for keyed child reconciliation.
    pub key_attribute: String,

    /// Attribute marking a live node as externally owned.
    ///
    /// Any live element carrying this attribute is skipped together with its
    /// descendants.
    pub keep_attribute: String,

    /// Additional tag names that should be created in the SVG namespace,
    /// beyond the built-in set.
    pub extra_svg_tags: Vec<String>,
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self {
            key_attribute: "key".to_string(),
            keep_attribute: "data-keep".to_string(),
            extra_svg_tags: Vec::new(),
        }
    }
}

impl MorphConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Options for the render scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on drain rounds in a single flush.
    ///
    /// A render that writes to cells its own mount observes schedules the
    /// mount again; the flush keeps draining until the queue is empty or this
    /// many rounds have run. Leftover work stays queued for the next flush.
    pub max_flush_rounds: usize,

    /// Reconciler options used by every mount of the scheduler.
    pub morph: MorphConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_flush_rounds: 16,
            morph: MorphConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
