//! Whole-catalog validation, run once by [`crate::CatalogBuilder::build`].

use std::collections::{BTreeMap, HashSet};

use crate::catalog::{Catalog, TypeCatalog};
use crate::descriptor::{IdGeneration, IdentityShape, TypeDescriptor};
use crate::error::{MetaError, MetaResult};

/// Every declared parent exists and no hierarchy loops.
pub(crate) fn check_hierarchy(catalog: &Catalog) -> MetaResult<()> {
    for name in catalog.type_names() {
        let ty = catalog.describe(name)?;
        if let Some(parent) = &ty.parent_type {
            if catalog.describe(parent).is_err() {
                return Err(MetaError::UnknownParentType {
                    type_name: name.to_string(),
                    parent: parent.clone(),
                });
            }
        }
        catalog.root_type(name)?;
    }
    Ok(())
}

pub(crate) fn check_catalog(catalog: &Catalog) -> MetaResult<()> {
    for name in catalog.type_names() {
        let ty = catalog.describe(name)?;
        if ty.parent_type.is_none() {
            check_identity(ty)?;
        }
        check_relations(catalog, ty)?;
    }
    for kind in catalog.kinds() {
        check_kind(catalog, kind)?;
    }
    Ok(())
}

fn check_identity(ty: &TypeDescriptor) -> MetaResult<()> {
    match (ty.identity.shape, ty.identity.generation) {
        (IdentityShape::Encoded, IdGeneration::Sequence) => {
            Err(MetaError::SequenceInvalidForEncodedIdentity(ty.name.clone()))
        }
        (IdentityShape::RawName, IdGeneration::Sequence | IdGeneration::Store) => {
            Err(MetaError::RawNameMustBeExplicit(ty.name.clone()))
        }
        _ => Ok(()),
    }
}

fn check_relations(catalog: &Catalog, ty: &TypeDescriptor) -> MetaResult<()> {
    for field in &ty.fields {
        let Some(rel) = field.relation_descriptor() else {
            continue;
        };
        if catalog.describe(&rel.target_type).is_err() {
            return Err(MetaError::UnknownTargetType {
                type_name: ty.name.clone(),
                field: field.name.clone(),
                target: rel.target_type.clone(),
            });
        }
        if rel.is_owned() && !catalog.identity(&rel.target_type)?.shape.can_hold_ancestor() {
            return Err(MetaError::ChildIdentityCannotHoldAncestor {
                type_name: ty.name.clone(),
                field: field.name.clone(),
                target: rel.target_type.clone(),
            });
        }
    }

    // Owned children of one type under one parent would be indistinguishable
    // once stored, so inherited fields count too.
    let mut owned_targets = HashSet::new();
    for field in catalog.fields(&ty.name)? {
        if let Some(rel) = field.relation_descriptor().filter(|r| r.is_owned()) {
            if !owned_targets.insert(rel.target_type.as_str()) {
                return Err(MetaError::MultipleOwnedRelationsOfSameType {
                    type_name: ty.name.clone(),
                    target: rel.target_type.clone(),
                });
            }
        }
    }
    Ok(())
}

fn check_kind(catalog: &Catalog, kind: &str) -> MetaResult<()> {
    let types = catalog.types_of_kind(kind);

    let mut generations = HashSet::new();
    for ty in &types {
        generations.insert(catalog.identity(&ty.name)?.generation);
    }
    if generations.contains(&IdGeneration::Sequence) && generations.contains(&IdGeneration::Store) {
        return Err(MetaError::MixedIdentifierSchemes(kind.to_string()));
    }

    let mut discriminators: BTreeMap<&str, &str> = BTreeMap::new();
    for ty in &types {
        if discriminators
            .insert(ty.discriminator_value(), &ty.name)
            .is_some()
        {
            return Err(MetaError::DuplicateDiscriminator {
                kind: kind.to_string(),
                value: ty.discriminator_value().to_string(),
            });
        }
    }
    Ok(())
}
