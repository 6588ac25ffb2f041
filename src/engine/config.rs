//! Store configuration.
//!
//! A [`StoreConfig`] can be built in code or loaded from TOML:
//!
//! ```toml
//! pid_policy = "random_pids"
//! random_seed = 1234
//! node_capacity = 4096
//! max_id = 1048576
//! ```
//!
//! Every field is optional; missing fields take their [`Default`] value.

use serde::Deserialize;

use crate::engine::error::ConfigError;
use crate::engine::types::EntityId;


/// Default upper bound of entity ids.
pub const DEFAULT_MAX_ID: EntityId = 1 << 24;

/// How persistent ids are assigned to new entities.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PidPolicy {
    /// The pid of an entity equals its id.
    #[default]
    UsePidAsId,
    /// Every entity gets a random positive pid, mapped to its id.
    RandomPids,
}

/// Construction parameters of an [`EntityStore`](crate::engine::store::EntityStore).

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Pid assignment policy.
    pub pid_policy: PidPolicy,
    /// Seed for random pids; entropy when `None`.
    pub random_seed: Option<u64>,
    /// Number of node slots reserved up front.
    pub node_capacity: usize,
    /// Highest entity id the store hands out or accepts. Ids index the node
    /// table directly, so this bounds its size.
    pub max_id: EntityId,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pid_policy: PidPolicy::UsePidAsId,
            random_seed: None,
            node_capacity: 0,
            max_id: DEFAULT_MAX_ID,
        }
    }
}

impl StoreConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Shorthand for a default config with `policy`.
    pub fn with_pid_policy(policy: PidPolicy) -> Self {
        Self { pid_policy: policy, ..Self::default() }
    }
}
