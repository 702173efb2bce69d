//! The [`TypeCatalog`] trait and the [`Catalog`] implementation.

use std::collections::BTreeMap;

use tracing::debug;

use crate::descriptor::{FieldDescriptor, IdentityDescriptor, TypeDescriptor};
use crate::error::{MetaError, MetaResult};
use crate::validate;

/// Property holding a polymorphic entity's discriminator value.
pub const DISCRIMINATOR_PROPERTY: &str = "DISCRIMINATOR";

/// Hierarchies deeper than this are treated as cyclic.
const MAX_HIERARCHY_DEPTH: usize = 64;

/// Read-only view of the host's type metadata.
///
/// Implementors supply `describe` and `types_of_kind`; everything else is
/// derived from those two.
pub trait TypeCatalog: Send + Sync {
    /// Look up a type by name.
    fn describe(&self, type_name: &str) -> MetaResult<&TypeDescriptor>;

    /// Every type stored under `kind`.
    fn types_of_kind(&self, kind: &str) -> Vec<&TypeDescriptor>;

    /// Top of `type_name`'s hierarchy (the type itself if it has no parent).
    fn root_type(&self, type_name: &str) -> MetaResult<&TypeDescriptor> {
        let mut current = self.describe(type_name)?;
        for _ in 0..MAX_HIERARCHY_DEPTH {
            match &current.parent_type {
                Some(parent) => current = self.describe(parent)?,
                None => return Ok(current),
            }
        }
        Err(MetaError::InheritanceCycle(type_name.to_string()))
    }

    /// Kind that entities of `type_name` are stored under.
    fn root_kind(&self, type_name: &str) -> MetaResult<String> {
        let root = self.root_type(type_name)?;
        if root.inheritance.shares_kind() {
            Ok(root.own_kind().to_string())
        } else {
            Ok(self.describe(type_name)?.own_kind().to_string())
        }
    }

    /// Identity of `type_name`, inherited from its root.
    fn identity(&self, type_name: &str) -> MetaResult<&IdentityDescriptor> {
        Ok(&self.root_type(type_name)?.identity)
    }

    /// Fields of `type_name` including inherited ones, root first.
    fn fields(&self, type_name: &str) -> MetaResult<Vec<&FieldDescriptor>> {
        let mut chain = vec![self.describe(type_name)?];
        while let Some(parent) = chain.last().copied().and_then(|t| t.parent_type.as_deref()) {
            if chain.len() > MAX_HIERARCHY_DEPTH {
                return Err(MetaError::InheritanceCycle(type_name.to_string()));
            }
            chain.push(self.describe(parent)?);
        }
        Ok(chain.into_iter().rev().flat_map(|t| t.fields.iter()).collect())
    }

    /// Whether `sub` is `sup` or descends from it.
    fn is_subtype(&self, sub: &str, sup: &str) -> MetaResult<bool> {
        let mut current = self.describe(sub)?;
        for _ in 0..MAX_HIERARCHY_DEPTH {
            if current.name == sup {
                return Ok(true);
            }
            match &current.parent_type {
                Some(parent) => current = self.describe(parent)?,
                None => return Ok(false),
            }
        }
        Err(MetaError::InheritanceCycle(sub.to_string()))
    }

    /// Whether entities of `type_name` must carry a discriminator: its kind
    /// is shared by more than one type.
    fn needs_discriminator(&self, type_name: &str) -> MetaResult<bool> {
        let kind = self.root_kind(type_name)?;
        Ok(self.types_of_kind(&kind).len() > 1)
    }

    /// Map a stored kind and optional discriminator back to a type.
    ///
    /// Without a discriminator, resolves to the topmost type stored under
    /// the kind.
    fn resolve_concrete_type(
        &self,
        kind: &str,
        discriminator: Option<&str>,
    ) -> MetaResult<&TypeDescriptor> {
        let candidates = self.types_of_kind(kind);
        if candidates.is_empty() {
            return Err(MetaError::UnknownKind(kind.to_string()));
        }
        match discriminator {
            Some(value) => candidates
                .into_iter()
                .find(|t| t.discriminator_value() == value)
                .ok_or_else(|| MetaError::UnknownDiscriminator {
                    kind: kind.to_string(),
                    value: value.to_string(),
                }),
            None => {
                let topmost = candidates.iter().copied().find(|t| match &t.parent_type {
                    None => true,
                    Some(parent) => self.root_kind(parent).map_or(true, |k| k != kind),
                });
                topmost
                    .or_else(|| candidates.first().copied())
                    .ok_or_else(|| MetaError::UnknownKind(kind.to_string()))
            }
        }
    }
}

/// Validated, immutable set of type descriptors.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    types: BTreeMap<String, TypeDescriptor>,
    by_kind: BTreeMap<String, Vec<String>>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.by_kind.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeCatalog for Catalog {
    fn describe(&self, type_name: &str) -> MetaResult<&TypeDescriptor> {
        self.types
            .get(type_name)
            .ok_or_else(|| MetaError::UnknownType(type_name.to_string()))
    }

    fn types_of_kind(&self, kind: &str) -> Vec<&TypeDescriptor> {
        self.by_kind
            .get(kind)
            .map(|names| names.iter().filter_map(|n| self.types.get(n)).collect())
            .unwrap_or_default()
    }
}

/// Collects type descriptors and validates them as a whole.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    types: Vec<TypeDescriptor>,
}

impl CatalogBuilder {
    pub fn register(mut self, descriptor: TypeDescriptor) -> Self {
        self.types.push(descriptor);
        self
    }

    /// Build and validate the catalog.
    pub fn build(self) -> MetaResult<Catalog> {
        let mut types = BTreeMap::new();
        for descriptor in self.types {
            let name = descriptor.name.clone();
            if types.insert(name.clone(), descriptor).is_some() {
                return Err(MetaError::DuplicateType(name));
            }
        }

        let mut catalog = Catalog {
            types,
            by_kind: BTreeMap::new(),
        };
        validate::check_hierarchy(&catalog)?;

        let mut by_kind: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in catalog.types.keys() {
            by_kind
                .entry(catalog.root_kind(name)?)
                .or_default()
                .push(name.clone());
        }
        catalog.by_kind = by_kind;

        validate::check_catalog(&catalog)?;
        debug!(
            types = catalog.types.len(),
            kinds = catalog.by_kind.len(),
            "type catalog built"
        );
        Ok(catalog)
    }
}
