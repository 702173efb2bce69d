use std::collections::BTreeMap;

use kin_alloc::{AllocatorConfig, DEFAULT_KEY_CACHE_SIZE};
use kin_batch::CoordinatorConfig;
use kin_store::MAX_CROSS_GROUP_ENTITY_GROUPS;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// When an entity read in the old storage layout is written back upgraded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPolicy {
    /// `load` writes the upgraded entity immediately.
    PersistOnRead,
    /// The upgrade is written with the entity's next update.
    #[default]
    DeferUntilNextWrite,
}

/// Per-sequence overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfig {
    pub key_cache_size: u64,
}

/// Engine configuration.
///
/// ```toml
/// allow_multi_group_transactions = true
/// default_key_cache_size = 50
/// migration = "persist_on_read"
///
/// [sequences.Book_SEQUENCE__]
/// key_cache_size = 200
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Relaxed mode: transactional operations may span several entity groups.
    pub allow_multi_group_transactions: bool,
    pub max_groups_per_transaction: usize,
    pub default_key_cache_size: u64,
    /// Keyed by full sequence name.
    pub sequences: BTreeMap<String, SequenceConfig>,
    /// Suffix added to every sequence the engine allocates from.
    pub sequence_appendage: Option<String>,
    pub migration: MigrationPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allow_multi_group_transactions: false,
            max_groups_per_transaction: MAX_CROSS_GROUP_ENTITY_GROUPS,
            default_key_cache_size: DEFAULT_KEY_CACHE_SIZE,
            sequences: BTreeMap::new(),
            sequence_appendage: None,
            migration: MigrationPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and check a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.max_groups_per_transaction == 0
            || self.max_groups_per_transaction > MAX_CROSS_GROUP_ENTITY_GROUPS
        {
            return Err(ConfigError::Invalid(format!(
                "max_groups_per_transaction must be between 1 and {MAX_CROSS_GROUP_ENTITY_GROUPS}, got {}",
                self.max_groups_per_transaction
            )));
        }
        if self.default_key_cache_size == 0 {
            return Err(ConfigError::Invalid("default_key_cache_size must be positive".into()));
        }
        if let Some((name, _)) = self.sequences.iter().find(|(_, s)| s.key_cache_size == 0) {
            return Err(ConfigError::Invalid(format!(
                "key_cache_size for sequence {name} must be positive"
            )));
        }
        Ok(())
    }

    pub fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            default_cache_size: self.default_key_cache_size,
            per_sequence: self
                .sequences
                .iter()
                .map(|(name, s)| (name.clone(), s.key_cache_size))
                .collect(),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            allow_multi_group: self.allow_multi_group_transactions,
            max_groups: self.max_groups_per_transaction,
        }
    }
}
