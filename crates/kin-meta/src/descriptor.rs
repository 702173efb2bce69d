use serde::{Deserialize, Serialize};

/// Suffix of the ordinal property stamped on ordered collection members.
pub const ORDINAL_SUFFIX: &str = "_INTEGER_IDX";

/// Whether the child's key is rooted under the parent's key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ownership {
    Owned,
    Unowned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    OneToOne,
    /// Ordered collection; members carry an ordinal property.
    OneToManyList,
    OneToManyUnordered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Unidirectional,
    Bidirectional,
}

/// How a relationship field is persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    pub ownership: Ownership,
    pub cardinality: Cardinality,
    pub direction: Direction,
    /// Members may be subtypes of `target_type`.
    pub element_is_polymorphic: bool,
    pub target_type: String,
    /// Overrides the derived ordinal property name for lists.
    pub order_property: Option<String>,
    /// Property on the target holding the back-reference, for bidirectional
    /// relationships.
    pub mapped_by: Option<String>,
}

impl RelationshipDescriptor {
    pub fn owned(target_type: impl Into<String>, cardinality: Cardinality) -> Self {
        Self::new(Ownership::Owned, target_type.into(), cardinality)
    }

    pub fn unowned(target_type: impl Into<String>, cardinality: Cardinality) -> Self {
        Self::new(Ownership::Unowned, target_type.into(), cardinality)
    }

    fn new(ownership: Ownership, target_type: String, cardinality: Cardinality) -> Self {
        Self {
            ownership,
            cardinality,
            direction: Direction::Unidirectional,
            element_is_polymorphic: false,
            target_type,
            order_property: None,
            mapped_by: None,
        }
    }

    pub fn bidirectional(mut self, mapped_by: impl Into<String>) -> Self {
        self.direction = Direction::Bidirectional;
        self.mapped_by = Some(mapped_by.into());
        self
    }

    pub fn polymorphic(mut self) -> Self {
        self.element_is_polymorphic = true;
        self
    }

    pub fn ordered_by(mut self, property: impl Into<String>) -> Self {
        self.order_property = Some(property.into());
        self
    }

    pub fn is_owned(&self) -> bool {
        self.ownership == Ownership::Owned
    }

    pub fn is_collection(&self) -> bool {
        self.cardinality != Cardinality::OneToOne
    }

    pub fn is_ordered(&self) -> bool {
        self.cardinality == Cardinality::OneToManyList
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Scalar { unindexed: bool },
    Relation(RelationshipDescriptor),
}

/// A persistent field of a type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Stored property name, when it differs from the field name.
    pub property: Option<String>,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property: None,
            kind: FieldKind::Scalar { unindexed: false },
        }
    }

    pub fn unindexed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property: None,
            kind: FieldKind::Scalar { unindexed: true },
        }
    }

    pub fn relation(name: impl Into<String>, descriptor: RelationshipDescriptor) -> Self {
        Self {
            name: name.into(),
            property: None,
            kind: FieldKind::Relation(descriptor),
        }
    }

    pub fn stored_as(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn property_name(&self) -> &str {
        self.property.as_deref().unwrap_or(&self.name)
    }

    pub fn relation_descriptor(&self) -> Option<&RelationshipDescriptor> {
        match &self.kind {
            FieldKind::Relation(rel) => Some(rel),
            FieldKind::Scalar { .. } => None,
        }
    }

    /// Ordinal property stamped on members of an ordered owned collection.
    pub fn ordinal_property(&self) -> Option<String> {
        let rel = self.relation_descriptor()?;
        if !rel.is_owned() || !rel.is_ordered() {
            return None;
        }
        Some(
            rel.order_property
                .clone()
                .unwrap_or_else(|| format!("{}{ORDINAL_SUFFIX}", self.property_name())),
        )
    }
}

/// How a type hierarchy maps onto kinds. Declared on the root type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InheritanceStrategy {
    /// Every type in the hierarchy shares the root's kind; a discriminator
    /// property tells them apart.
    #[default]
    SingleKind,
    /// Each concrete type has its own kind.
    KindPerClass,
    /// Subtype fields live in separate, joined records.
    Joined,
}

impl InheritanceStrategy {
    /// Whether subtypes can be stored together under one kind.
    pub fn shares_kind(&self) -> bool {
        matches!(self, Self::SingleKind)
    }
}

/// Shape of a type's identity field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityShape {
    /// Bare numeric id; cannot carry an ancestor.
    Numeric,
    /// Literal name; cannot carry an ancestor.
    RawName,
    /// Key token string; carries the full path.
    Encoded,
    /// Full key value.
    #[default]
    Key,
}

impl IdentityShape {
    pub fn can_hold_ancestor(&self) -> bool {
        matches!(self, Self::Encoded | Self::Key)
    }
}

/// Where new numeric ids come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdGeneration {
    /// The application always supplies the id.
    Explicit,
    /// Block allocator sequence.
    #[default]
    Sequence,
    /// The store's own per-(kind, ancestor) allocator.
    Store,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDescriptor {
    pub shape: IdentityShape,
    pub generation: IdGeneration,
    /// Explicit sequence name; defaults to the kind's sequence.
    pub sequence: Option<String>,
}

impl IdentityDescriptor {
    pub fn new(shape: IdentityShape, generation: IdGeneration) -> Self {
        Self {
            shape,
            generation,
            sequence: None,
        }
    }

    pub fn with_sequence(mut self, name: impl Into<String>) -> Self {
        self.sequence = Some(name.into());
        self
    }
}

/// A persistent type as seen by the mapping engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    /// Kind override; defaults to the type name.
    pub kind: Option<String>,
    pub parent_type: Option<String>,
    pub inheritance: InheritanceStrategy,
    /// Value written to the discriminator property; defaults to the name.
    pub discriminator: Option<String>,
    /// Ignored on subtypes, which use their root's identity.
    pub identity: IdentityDescriptor,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            parent_type: None,
            inheritance: InheritanceStrategy::default(),
            discriminator: None,
            identity: IdentityDescriptor::default(),
            fields: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent_type = Some(parent.into());
        self
    }

    pub fn with_inheritance(mut self, strategy: InheritanceStrategy) -> Self {
        self.inheritance = strategy;
        self
    }

    pub fn with_discriminator(mut self, value: impl Into<String>) -> Self {
        self.discriminator = Some(value.into());
        self
    }

    pub fn with_identity(mut self, identity: IdentityDescriptor) -> Self {
        self.identity = identity;
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn own_kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.name)
    }

    pub fn discriminator_value(&self) -> &str {
        self.discriminator.as_deref().unwrap_or(&self.name)
    }
}
