use std::sync::Arc;

use kin_meta::{Cardinality, FieldDescriptor, TypeCatalog, DISCRIMINATOR_PROPERTY};
use kin_store::Datastore;
use kin_types::{Entity, Key, Value};
use tracing::{debug, info, warn};

use crate::error::{MigrateResult, MigrationError};
use crate::layout::StorageLayoutVersion;

/// Outcome of [`Migrator::migrate_all`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MigrationReport {
    /// Every input entity, upgraded where possible.
    pub entities: Vec<Entity>,
    /// Keys of the entities that were upgraded and need writing.
    pub changed: Vec<Key>,
    /// Entities left in the old layout, with their unresolved fields.
    pub incomplete: Vec<(Key, Vec<String>)>,
}

/// Upgrades entities from the parent-unaware layout.
pub struct Migrator {
    store: Arc<dyn Datastore>,
    catalog: Arc<dyn TypeCatalog>,
}

impl Migrator {
    pub fn new(store: Arc<dyn Datastore>, catalog: Arc<dyn TypeCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Owned relationship fields of `type_name`; the ones a parent tracks.
    fn owned_fields(&self, type_name: &str) -> MigrateResult<Vec<&FieldDescriptor>> {
        Ok(self
            .catalog
            .fields(type_name)?
            .into_iter()
            .filter(|f| f.relation_descriptor().is_some_and(|r| r.is_owned()))
            .collect())
    }

    /// Detect the layout an entity was written with.
    ///
    /// An entity is current when every owned relationship of its type has a
    /// property, even a null one.
    pub fn infer_layout(
        &self,
        entity: &Entity,
        type_name: &str,
    ) -> MigrateResult<StorageLayoutVersion> {
        let current = self
            .owned_fields(type_name)?
            .iter()
            .all(|f| entity.has(f.property_name()));
        Ok(if current {
            StorageLayoutVersion::ParentTracksChildren
        } else {
            StorageLayoutVersion::ParentUnaware
        })
    }

    /// The most specific type `entity` can be read as, given it was
    /// requested as `declared_type`.
    pub fn concrete_type(&self, entity: &Entity, declared_type: &str) -> MigrateResult<String> {
        let discriminator = entity.get(DISCRIMINATOR_PROPERTY).and_then(Value::as_text);
        if let Ok(ty) = self.catalog.resolve_concrete_type(entity.kind(), discriminator) {
            if self.catalog.is_subtype(&ty.name, declared_type)? {
                return Ok(ty.name.clone());
            }
        }
        Ok(declared_type.to_string())
    }

    /// Upgrade `entity` to the parent-tracks-children layout.
    ///
    /// Returns the entity and whether it changed. Nothing is written. Fails
    /// with [`MigrationError::Incomplete`] if any owned relationship cannot
    /// be reconstructed, in which case no property is added.
    pub fn migrate(&self, entity: Entity, declared_type: &str) -> MigrateResult<(Entity, bool)> {
        if let Some(disc) = entity.get(DISCRIMINATOR_PROPERTY).and_then(Value::as_text) {
            let expected = self.catalog.describe(declared_type)?;
            let actual = self.catalog.resolve_concrete_type(entity.kind(), Some(disc));
            let compatible = match actual {
                Ok(ty) => self.catalog.is_subtype(&ty.name, &expected.name)?,
                Err(_) => false,
            };
            if !compatible {
                info!(
                    key = %entity.key(),
                    declared = declared_type,
                    discriminator = disc,
                    "discriminator names a different type, not migrating"
                );
                return Ok((entity, false));
            }
        }

        let missing_fields: Vec<&FieldDescriptor> = self
            .owned_fields(declared_type)?
            .into_iter()
            .filter(|f| !entity.has(f.property_name()))
            .collect();
        if missing_fields.is_empty() {
            return Ok((entity, false));
        }

        let key = entity.key().clone();
        let mut resolved = Vec::with_capacity(missing_fields.len());
        let mut unresolved = Vec::new();
        for field in &missing_fields {
            match self.reconstruct(&key, field)? {
                Some(value) => resolved.push((field.property_name().to_string(), value)),
                None => unresolved.push(field.name.clone()),
            }
        }

        if !unresolved.is_empty() {
            warn!(key = %key, fields = ?unresolved, "migration incomplete, keeping old layout");
            return Err(MigrationError::Incomplete {
                key,
                missing: unresolved,
            });
        }

        let mut upgraded = entity;
        for (property, value) in resolved {
            upgraded.set(property, value);
        }
        info!(key = %key, fields = missing_fields.len(), "migrated entity to parent-tracks-children layout");
        Ok((upgraded, true))
    }

    /// Rebuild one owned relationship property from the children found by
    /// ancestor query. `None` when the children are inconsistent.
    fn reconstruct(&self, parent: &Key, field: &FieldDescriptor) -> MigrateResult<Option<Value>> {
        let Some(rel) = field.relation_descriptor() else {
            return Ok(None);
        };
        let child_kind = self.catalog.root_kind(&rel.target_type)?;
        let candidates: Vec<Key> = self
            .store
            .query_keys(&child_kind, Some(parent))?
            .into_iter()
            .filter(|k| k.parent() == Some(parent))
            .collect();

        let mut children = Vec::with_capacity(candidates.len());
        for (key, found) in candidates.iter().zip(self.store.get_many(&candidates, None)?) {
            let Some(child) = found else {
                debug!(parent = %parent, child = %key, "child vanished during migration");
                return Ok(None);
            };
            let child_type = self.concrete_type(&child, &rel.target_type)?;
            if self.catalog.is_subtype(&child_type, &rel.target_type)? {
                children.push(child);
            }
        }

        let value = match rel.cardinality {
            Cardinality::OneToOne => match children.as_slice() {
                [] => Value::Null,
                [only] => Value::Key(only.key().clone()),
                _ => return Ok(None),
            },
            Cardinality::OneToManyUnordered => key_list(children.iter().map(|c| c.key().clone()).collect()),
            Cardinality::OneToManyList => {
                let Some(ordinal_property) = field.ordinal_property() else {
                    return Ok(None);
                };
                let mut ordered = Vec::with_capacity(children.len());
                for child in &children {
                    let Some(ordinal) = child.get(&ordinal_property).and_then(Value::as_int) else {
                        return Ok(None);
                    };
                    ordered.push((ordinal, child.key().clone()));
                }
                ordered.sort();
                key_list(ordered.into_iter().map(|(_, k)| k).collect())
            }
        };
        Ok(Some(value))
    }

    /// Migrate a set of entities read as `declared_type`.
    ///
    /// Entities that cannot be completed are reported, not returned as
    /// errors; store and metadata failures abort the run.
    pub fn migrate_all(
        &self,
        entities: Vec<Entity>,
        declared_type: &str,
    ) -> MigrateResult<MigrationReport> {
        let mut report = MigrationReport::default();
        for entity in entities {
            let key = entity.key().clone();
            let concrete = self.concrete_type(&entity, declared_type)?;
            match self.migrate(entity.clone(), &concrete) {
                Ok((migrated, changed)) => {
                    if changed {
                        report.changed.push(key);
                    }
                    report.entities.push(migrated);
                }
                Err(MigrationError::Incomplete { missing, .. }) => {
                    report.incomplete.push((key, missing));
                    report.entities.push(entity);
                }
                Err(e) => return Err(e),
            }
        }
        debug!(
            declared = declared_type,
            scanned = report.entities.len(),
            changed = report.changed.len(),
            incomplete = report.incomplete.len(),
            "bulk migration finished"
        );
        Ok(report)
    }
}

/// Empty collections are stored as null.
fn key_list(keys: Vec<Key>) -> Value {
    if keys.is_empty() {
        Value::Null
    } else {
        Value::KeyList(keys)
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator").finish_non_exhaustive()
    }
}
