//! [`PersistOperation`]: one unit of work handed over by the host.
//!
//! The host describes its object graph as nodes (new or already persisted
//! objects) joined by relationship links, plus the changes to apply. The
//! operation is a plain value; nothing touches the store until it is
//! planned.

use std::collections::BTreeMap;
use std::fmt;

use kin_types::{Key, Value};

use crate::identity::ExplicitId;

/// Index of a node within its [`PersistOperation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Current value of a relationship field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Link {
    One(Option<NodeId>),
    Many(Vec<NodeId>),
}

impl Link {
    pub fn members(&self) -> Vec<NodeId> {
        match self {
            Self::One(member) => member.iter().copied().collect(),
            Self::Many(members) => members.clone(),
        }
    }
}

/// How a node relates to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRole {
    /// A new object; gets a key when the operation is prepared.
    New,
    /// A persisted object whose fields change.
    Updated,
    /// A persisted object that is only linked to.
    Referenced,
}

/// One object in the graph.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectNode {
    pub type_name: String,
    pub role: NodeRole,
    /// Set for persisted objects.
    pub key: Option<Key>,
    pub explicit_id: Option<ExplicitId>,
    /// Changed scalar fields, by field name.
    pub scalars: BTreeMap<String, Value>,
    /// Changed relationship fields, by field name.
    pub links: BTreeMap<String, Link>,
    /// Ordered fields whose ordinals are rewritten to exactly `0..n`.
    pub positional: Vec<String>,
}

impl ObjectNode {
    fn new(type_name: String, role: NodeRole, key: Option<Key>) -> Self {
        Self {
            type_name,
            role,
            key,
            explicit_id: None,
            scalars: BTreeMap::new(),
            links: BTreeMap::new(),
            positional: Vec::new(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.role == NodeRole::New
    }
}

/// A requested change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    Insert(NodeId),
    /// The node's set scalars and links are the diff.
    Update(NodeId),
    /// Delete an entity and, transitively, everything it owns.
    Delete(Key),
}

/// Batch of changes plus the relationship edges touched by them.
#[derive(Clone, Debug, Default)]
pub struct PersistOperation {
    nodes: Vec<ObjectNode>,
    changes: Vec<Change>,
    transactional: bool,
}

impl PersistOperation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the whole operation in one store transaction.
    pub fn transactional(mut self) -> Self {
        self.transactional = true;
        self
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    /// A new object whose id is generated.
    pub fn insert(&mut self, type_name: impl Into<String>) -> NodeId {
        let id = self.push(ObjectNode::new(type_name.into(), NodeRole::New, None));
        self.changes.push(Change::Insert(id));
        id
    }

    /// A new object with a host-supplied id.
    pub fn insert_with_id(&mut self, type_name: impl Into<String>, id: impl Into<ExplicitId>) -> NodeId {
        let node = self.insert(type_name);
        self.nodes[node.0].explicit_id = Some(id.into());
        node
    }

    /// A persisted object that this operation modifies.
    pub fn update(&mut self, type_name: impl Into<String>, key: Key) -> NodeId {
        let id = self.push(ObjectNode::new(type_name.into(), NodeRole::Updated, Some(key)));
        self.changes.push(Change::Update(id));
        id
    }

    /// A persisted object used only as a link target.
    pub fn existing(&mut self, type_name: impl Into<String>, key: Key) -> NodeId {
        self.push(ObjectNode::new(type_name.into(), NodeRole::Referenced, Some(key)))
    }

    pub fn delete(&mut self, key: Key) {
        self.changes.push(Change::Delete(key));
    }

    /// Set a scalar field. Unknown node ids are reported when planning.
    pub fn set(&mut self, node: NodeId, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.scalars.insert(field.into(), value.into());
        }
        self
    }

    pub fn link_one(&mut self, owner: NodeId, field: impl Into<String>, member: Option<NodeId>) -> &mut Self {
        self.link(owner, field.into(), Link::One(member))
    }

    pub fn link_many(&mut self, owner: NodeId, field: impl Into<String>, members: Vec<NodeId>) -> &mut Self {
        self.link(owner, field.into(), Link::Many(members))
    }

    /// Null out or clear a relationship field.
    pub fn clear(&mut self, owner: NodeId, field: impl Into<String>, collection: bool) -> &mut Self {
        let link = if collection {
            Link::Many(Vec::new())
        } else {
            Link::One(None)
        };
        self.link(owner, field.into(), link)
    }

    /// Rewrite the ordinals of an ordered field to exactly `0..n` instead
    /// of repairing only what moved.
    pub fn mark_positional(&mut self, owner: NodeId, field: impl Into<String>) -> &mut Self {
        if let Some(n) = self.nodes.get_mut(owner.0) {
            n.positional.push(field.into());
        }
        self
    }

    pub fn node(&self, id: NodeId) -> Option<&ObjectNode> {
        self.nodes.get(id.0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &ObjectNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn push(&mut self, node: ObjectNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn link(&mut self, owner: NodeId, field: String, link: Link) -> &mut Self {
        if let Some(n) = self.nodes.get_mut(owner.0) {
            n.links.insert(field, link);
        }
        self
    }
}
