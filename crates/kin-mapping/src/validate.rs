//! First planning phase: checks that need neither the store nor ids.

use std::collections::{HashMap, HashSet};

use kin_meta::{FieldDescriptor, IdGeneration, RelationshipDescriptor, TypeCatalog};
use kin_types::Key;

use crate::error::{MappingError, MappingResult};
use crate::identity::ExplicitId;
use crate::operation::{Change, Link, NodeId, NodeRole, ObjectNode, PersistOperation};

/// The node that owns another, and through which field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner {
    pub node: NodeId,
    pub field: String,
}

/// An operation whose graph is known to be mappable.
#[derive(Debug)]
pub struct ValidatedOperation<'op> {
    pub(crate) op: &'op PersistOperation,
    pub(crate) owners: HashMap<NodeId, Owner>,
    /// Length of each node's owner chain within the operation.
    pub(crate) depth: HashMap<NodeId, usize>,
    group_count: usize,
}

impl<'op> ValidatedOperation<'op> {
    pub fn operation(&self) -> &'op PersistOperation {
        self.op
    }

    pub fn owner_of(&self, node: NodeId) -> Option<&Owner> {
        self.owners.get(&node)
    }

    /// Entity groups the operation writes to, counted before keys exist.
    pub fn group_count(&self) -> usize {
        self.group_count
    }
}

pub(crate) fn node(op: &PersistOperation, id: NodeId) -> MappingResult<&ObjectNode> {
    op.node(id)
        .ok_or_else(|| MappingError::InvalidOperation(format!("unknown node {id}")))
}

pub(crate) fn field<'c>(
    catalog: &'c dyn TypeCatalog,
    type_name: &str,
    name: &str,
) -> MappingResult<&'c FieldDescriptor> {
    catalog
        .fields(type_name)?
        .into_iter()
        .find(|f| f.name == name)
        .ok_or_else(|| MappingError::InvalidOperation(format!("{type_name} has no field {name}")))
}

pub(crate) fn validate<'op>(
    catalog: &dyn TypeCatalog,
    op: &'op PersistOperation,
) -> MappingResult<ValidatedOperation<'op>> {
    for change in op.changes() {
        if let Change::Insert(id) | Change::Update(id) = change {
            node(op, *id)?;
        }
    }

    let mut owners: HashMap<NodeId, Owner> = HashMap::new();
    for (id, n) in op.nodes() {
        catalog.describe(&n.type_name)?;
        if n.role == NodeRole::Referenced && (!n.scalars.is_empty() || !n.links.is_empty()) {
            return Err(MappingError::InvalidOperation(format!(
                "node {id} ({}) is only referenced but has changes; mark it updated",
                n.type_name
            )));
        }
        if n.is_new() && n.explicit_id.is_none()
            && catalog.identity(&n.type_name)?.generation == IdGeneration::Explicit
        {
            return Err(MappingError::MissingIdentity {
                type_name: n.type_name.clone(),
            });
        }

        for name in n.scalars.keys() {
            if field(catalog, &n.type_name, name)?.relation_descriptor().is_some() {
                return Err(MappingError::InvalidOperation(format!(
                    "{}.{name} is a relationship and must be linked",
                    n.type_name
                )));
            }
        }

        for (name, link) in &n.links {
            let f = field(catalog, &n.type_name, name)?;
            let rel = f.relation_descriptor().ok_or_else(|| {
                MappingError::InvalidOperation(format!("{}.{name} is not a relationship", n.type_name))
            })?;
            match (rel.is_collection(), link) {
                (false, Link::Many(_)) | (true, Link::One(_)) => {
                    return Err(MappingError::InvalidOperation(format!(
                        "{}.{name} linked with the wrong cardinality",
                        n.type_name
                    )));
                }
                _ => {}
            }
            check_polymorphism(catalog, f, rel)?;

            let mut seen = HashSet::new();
            for member in link.members() {
                let m = node(op, member)?;
                if !seen.insert(member) {
                    return Err(MappingError::InvalidOperation(format!(
                        "node {member} linked twice through {}.{name}",
                        n.type_name
                    )));
                }
                check_element(catalog, f, rel, &m.type_name)?;
                if !rel.is_owned() {
                    continue;
                }
                check_adoption(n, f, m)?;
                let owner = Owner {
                    node: id,
                    field: name.clone(),
                };
                if let Some(previous) = owners.insert(member, owner) {
                    let first = node(op, previous.node)?;
                    return Err(MappingError::AmbiguousAncestor {
                        type_name: m.type_name.clone(),
                        detail: format!(
                            "owned through {}.{} and {}.{name}",
                            first.type_name, previous.field, n.type_name
                        ),
                    });
                }
            }
        }

        for name in &n.positional {
            if field(catalog, &n.type_name, name)?.ordinal_property().is_none() {
                return Err(MappingError::InvalidOperation(format!(
                    "{}.{name} is not an ordered owned collection",
                    n.type_name
                )));
            }
        }
    }

    let depth = owner_depths(op, &owners)?;
    let group_count = count_groups(op, &owners);
    Ok(ValidatedOperation {
        op,
        owners,
        depth,
        group_count,
    })
}

/// Polymorphic members are stored under one kind, so the hierarchy must
/// share it.
fn check_polymorphism(
    catalog: &dyn TypeCatalog,
    f: &FieldDescriptor,
    rel: &RelationshipDescriptor,
) -> MappingResult<()> {
    if !rel.element_is_polymorphic {
        return Ok(());
    }
    let root = catalog.root_type(&rel.target_type)?;
    if root.inheritance.shares_kind() {
        return Ok(());
    }
    Err(MappingError::UnsupportedInheritanceStrategy {
        field: f.name.clone(),
        target_type: rel.target_type.clone(),
        strategy: root.inheritance,
    })
}

fn check_element(
    catalog: &dyn TypeCatalog,
    f: &FieldDescriptor,
    rel: &RelationshipDescriptor,
    member_type: &str,
) -> MappingResult<()> {
    if !catalog.is_subtype(member_type, &rel.target_type)? {
        return Err(MappingError::ElementTypeMismatch {
            field: f.name.clone(),
            expected: rel.target_type.clone(),
            actual: member_type.to_string(),
        });
    }
    if catalog.root_kind(member_type)? != catalog.root_kind(&rel.target_type)? {
        return Err(MappingError::UnsupportedInheritanceStrategy {
            field: f.name.clone(),
            target_type: rel.target_type.clone(),
            strategy: catalog.root_type(&rel.target_type)?.inheritance,
        });
    }
    Ok(())
}

/// A persisted object may stay an owned member of its current parent but
/// can never gain one or change it.
fn check_adoption(owner: &ObjectNode, f: &FieldDescriptor, member: &ObjectNode) -> MappingResult<()> {
    let Some(child) = &member.key else {
        return Ok(());
    };
    let adopt = || MappingError::CannotAdoptExistingOwnedChild {
        owner_type: owner.type_name.clone(),
        field: f.name.clone(),
        child: child.clone(),
    };
    let Some(parent) = &owner.key else {
        return Err(adopt());
    };
    match child.parent() {
        Some(current) if current == parent => Ok(()),
        None => Err(adopt()),
        current => Err(MappingError::CannotReparentOwnedChild {
            child: child.clone(),
            current_parent: current.cloned(),
            new_parent: parent.clone(),
        }),
    }
}

fn owner_depths(
    op: &PersistOperation,
    owners: &HashMap<NodeId, Owner>,
) -> MappingResult<HashMap<NodeId, usize>> {
    let limit = op.node_count();
    let mut depths = HashMap::with_capacity(limit);
    for (id, _) in op.nodes() {
        let mut depth = 0;
        let mut current = id;
        while let Some(owner) = owners.get(&current) {
            depth += 1;
            if depth > limit {
                return Err(MappingError::OwnershipCycle(id.index()));
            }
            current = owner.node;
        }
        depths.insert(id, depth);
    }
    Ok(depths)
}

#[derive(PartialEq, Eq, Hash)]
enum Anchor {
    Known(Key),
    New(NodeId),
}

/// Distinct entity groups written. New top-level objects each start a
/// group unless their identity already names a root.
fn count_groups(op: &PersistOperation, owners: &HashMap<NodeId, Owner>) -> usize {
    let mut anchors: HashSet<Anchor> = HashSet::new();
    for change in op.changes() {
        let anchor = match change {
            Change::Delete(key) => Anchor::Known(key.root().clone()),
            Change::Insert(id) | Change::Update(id) => {
                let mut top = *id;
                for _ in 0..op.node_count() {
                    match owners.get(&top) {
                        Some(owner) => top = owner.node,
                        None => break,
                    }
                }
                anchor_of(op, top)
            }
        };
        anchors.insert(anchor);
    }
    anchors.len()
}

fn anchor_of(op: &PersistOperation, id: NodeId) -> Anchor {
    let Some(n) = op.node(id) else {
        return Anchor::New(id);
    };
    if let Some(key) = &n.key {
        return Anchor::Known(key.root().clone());
    }
    let full = match &n.explicit_id {
        Some(ExplicitId::Key(key)) => Some(key.clone()),
        Some(ExplicitId::Encoded(token)) => token.decode().ok(),
        _ => None,
    };
    match full {
        Some(key) if !key.is_root() => Anchor::Known(key.root().clone()),
        _ => Anchor::New(id),
    }
}
