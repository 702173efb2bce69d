use std::sync::Arc;

use kin_alloc::{BlockAllocator, SequenceContext};
use kin_batch::{BatchCoordinator, BatchReport, Grouping, Mutation, MutationBatch, WriteObserver};
use kin_mapping::{AssignedKeys, PersistOperation, Planner};
use kin_meta::{MetaError, TypeCatalog, DISCRIMINATOR_PROPERTY};
use kin_migrate::{MigrationError, MigrationReport, Migrator};
use kin_store::Datastore;
use kin_types::{Entity, Key, Value};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, MigrationPolicy};
use crate::error::{AllocationError, LoadError, LoadResult, PersistResult};

/// Storage layout of an entity as returned by [`Engine::load`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationStatus {
    /// Stored in the current layout.
    Current,
    /// Read in the old layout and upgraded in memory. `persisted` is true
    /// when the upgrade was also written back.
    Upgraded { persisted: bool },
    /// Read in the old layout and could not be upgraded; these relationship
    /// fields are unresolved. The entity is returned as stored.
    Incomplete { missing: Vec<String> },
}

/// An entity read through [`Engine::load`].
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedEntity {
    pub entity: Entity,
    /// Most specific type the entity resolves to.
    pub concrete_type: String,
    pub migration: MigrationStatus,
}

impl LoadedEntity {
    pub fn into_entity(self) -> Entity {
        self.entity
    }
}

/// The kinstore engine: one store, one catalog, one id allocator.
///
/// Methods that allocate take `&mut self`. Share an engine across threads
/// behind a lock, or give each thread its own engine over the same store;
/// the store's range reservation keeps their ids disjoint.
pub struct Engine {
    store: Arc<dyn Datastore>,
    catalog: Arc<dyn TypeCatalog>,
    allocator: BlockAllocator,
    coordinator: BatchCoordinator,
    migrator: Migrator,
    config: EngineConfig,
}

impl Engine {
    pub fn new(store: Arc<dyn Datastore>, catalog: Arc<dyn TypeCatalog>, config: EngineConfig) -> Self {
        Self {
            allocator: BlockAllocator::new(store.clone(), config.allocator_config()),
            coordinator: BatchCoordinator::new(store.clone(), config.coordinator_config()),
            migrator: Migrator::new(store.clone(), catalog.clone()),
            store,
            catalog,
            config,
        }
    }

    /// Report every physical write and delete to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn WriteObserver>) -> Self {
        self.coordinator = BatchCoordinator::new(self.store.clone(), self.config.coordinator_config())
            .with_observer(observer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &dyn TypeCatalog {
        self.catalog.as_ref()
    }

    pub fn store(&self) -> &dyn Datastore {
        self.store.as_ref()
    }

    fn planner(&self) -> Planner<'_> {
        Planner::new(self.catalog.as_ref(), self.store.as_ref(), &self.migrator)
            .with_sequence_appendage(self.config.sequence_appendage.as_deref())
    }

    // ---- Write operations ----

    /// Persist an object graph and return the keys given to its new objects.
    ///
    /// Transactional operations commit atomically or not at all. Others are
    /// applied one entity group at a time; on failure the error's
    /// [`crate::PersistError::progress`] tells which groups landed.
    pub fn persist(&mut self, op: &PersistOperation) -> PersistResult<AssignedKeys> {
        if op.is_empty() {
            return Ok(AssignedKeys::default());
        }
        let grouping = if op.is_transactional() {
            Grouping::Transactional
        } else {
            Grouping::PerGroup
        };

        // Not `self.planner()`: that would borrow all of `self` while
        // `self.allocator` is borrowed mutably below.
        let planner = Planner::new(self.catalog.as_ref(), self.store.as_ref(), &self.migrator)
            .with_sequence_appendage(self.config.sequence_appendage.as_deref());
        let validated = planner.validate(op)?;
        let unit = self.coordinator.begin(grouping, validated.group_count())?;

        let planned = planner
            .assign_keys(validated, &mut self.allocator)
            .and_then(|prepared| planner.plan(&prepared, unit.txn()));
        let plan = match planned {
            Ok(plan) => plan,
            Err(e) => {
                self.coordinator.abort(unit);
                return Err(e.into());
            }
        };

        let upgraded = plan.upgraded.len();
        let report = self.coordinator.execute(plan.batch, unit)?;
        log_report("persist", &report);
        if upgraded > 0 {
            debug!(upgraded, "old-layout entities written upgraded");
        }
        Ok(plan.assigned)
    }

    /// Delete `keys` and every owned descendant.
    ///
    /// Deletes are applied one entity group at a time.
    pub fn delete(&self, keys: &[Key]) -> PersistResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let doomed = self.planner().plan_delete(keys, None)?;
        let batch: MutationBatch = doomed.into_iter().map(Mutation::Delete).collect();
        let report = self.coordinator.execute_now(batch, Grouping::PerGroup)?;
        log_report("delete", &report);
        Ok(())
    }

    /// Reserve `count` contiguous ids from a sequence.
    ///
    /// The configured appendage is used only when `sequence` carries none
    /// of its own.
    pub fn allocate(&mut self, sequence: &SequenceContext, count: u64) -> Result<Vec<i64>, AllocationError> {
        let ctx = match &self.config.sequence_appendage {
            Some(appendage) if sequence.appendage().is_empty() => {
                sequence.clone().with_appendage(appendage.clone())
            }
            _ => sequence.clone(),
        };
        self.allocator.reserve(&ctx, count)
    }

    /// Upgrade every stored entity of `type_name`'s kind to the current
    /// layout and write the changed ones in one batch.
    ///
    /// Entities that cannot be upgraded are left as they are and listed in
    /// the report.
    pub fn migrate_kind(&self, type_name: &str) -> PersistResult<MigrationReport> {
        let kind = self.catalog.root_kind(type_name)?;
        let keys = self.store.query_keys(&kind, None)?;
        let entities: Vec<Entity> = self.store.get_many(&keys, None)?.into_iter().flatten().collect();
        let report = self.migrator.migrate_all(entities, type_name)?;

        let batch: MutationBatch = report
            .entities
            .iter()
            .filter(|e| report.changed.contains(e.key()))
            .cloned()
            .map(Mutation::Put)
            .collect();
        if !batch.is_empty() {
            let written = self.coordinator.execute_now(batch, Grouping::PerGroup)?;
            log_report("migrate", &written);
        }
        if !report.incomplete.is_empty() {
            warn!(
                kind = %kind,
                incomplete = report.incomplete.len(),
                "some entities kept the old layout"
            );
        }
        info!(
            kind = %kind,
            scanned = report.entities.len(),
            changed = report.changed.len(),
            "kind migrated"
        );
        Ok(report)
    }

    // ---- Read operations ----

    /// Read the entity at `key` as `declared_type`.
    ///
    /// The stored kind and discriminator pick the concrete type, which must
    /// be `declared_type` or a subtype. Entities in the old layout are
    /// upgraded in memory and, under [`MigrationPolicy::PersistOnRead`],
    /// written back.
    pub fn load(&self, key: &Key, declared_type: &str) -> LoadResult<LoadedEntity> {
        let entity = self
            .store
            .get(key, None)?
            .ok_or_else(|| LoadError::NotFound(key.clone()))?;
        let concrete_type = self.resolve_type(&entity, declared_type)?;

        let (entity, migration) = match self.migrator.migrate(entity.clone(), &concrete_type) {
            Ok((upgraded, true)) => {
                let persisted = self.config.migration == MigrationPolicy::PersistOnRead;
                if persisted {
                    let mut batch = MutationBatch::new();
                    batch.put(upgraded.clone());
                    self.coordinator.execute_now(batch, Grouping::PerGroup)?;
                }
                (upgraded, MigrationStatus::Upgraded { persisted })
            }
            Ok((current, false)) => (current, MigrationStatus::Current),
            Err(MigrationError::Incomplete { missing, .. }) => {
                (entity, MigrationStatus::Incomplete { missing })
            }
            Err(e) => return Err(e.into()),
        };

        Ok(LoadedEntity {
            entity,
            concrete_type,
            migration,
        })
    }

    fn resolve_type(&self, entity: &Entity, declared_type: &str) -> LoadResult<String> {
        // Fails early on an unknown declared type.
        self.catalog.describe(declared_type)?;

        let discriminator = entity.get(DISCRIMINATOR_PROPERTY).and_then(Value::as_text);
        let actual = match self.catalog.resolve_concrete_type(entity.kind(), discriminator) {
            Ok(ty) => ty.name.clone(),
            Err(MetaError::UnknownDiscriminator { kind, value }) => {
                return Err(LoadError::UnknownDiscriminator {
                    key: entity.key().clone(),
                    kind,
                    value,
                })
            }
            Err(e) => return Err(e.into()),
        };

        if !self.catalog.is_subtype(&actual, declared_type)? {
            return Err(LoadError::TypeMismatch {
                key: entity.key().clone(),
                declared: declared_type.to_string(),
                actual,
            });
        }
        Ok(actual)
    }
}

fn log_report(operation: &'static str, report: &BatchReport) {
    debug!(
        operation,
        puts = report.puts,
        deletes = report.deletes,
        groups = report.groups,
        round_trips = report.round_trips,
        collapsed = report.collapsed,
        "batch applied"
    );
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("allocator", &self.allocator)
            .finish_non_exhaustive()
    }
}
