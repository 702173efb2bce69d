use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::group::EntityGroupId;
use crate::token::KeyToken;

/// Identifier of an entity within its kind and ancestor.
///
/// Numeric ids sort before names, matching the store's key ordering.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyId {
    /// Allocated or explicitly assigned positive integer.
    Numeric(i64),
    /// Literal name chosen by the application.
    Name(String),
}

impl KeyId {
    /// Returns the numeric id, if this is one.
    pub fn as_numeric(&self) -> Option<i64> {
        match self {
            Self::Numeric(n) => Some(*n),
            Self::Name(_) => None,
        }
    }

    /// Returns the name, if this is one.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Numeric(_) => None,
            Self::Name(name) => Some(name),
        }
    }

    fn validate(&self) -> Result<(), TypeError> {
        match self {
            Self::Numeric(n) if *n <= 0 => Err(TypeError::InvalidNumericId(*n)),
            Self::Name(name) if name.is_empty() => Err(TypeError::EmptyName),
            _ => Ok(()),
        }
    }
}

impl From<i64> for KeyId {
    fn from(n: i64) -> Self {
        Self::Numeric(n)
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

/// Hierarchical key path addressing one entity.
///
/// A key is a kind plus an identifier, optionally rooted under an ancestor
/// key. The root of the ancestor chain determines the entity group. Once a
/// key exists its ancestor chain never changes: there is no setter for the
/// parent, and re-parenting means deriving a different key.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    parent: Option<Box<Key>>,
    kind: String,
    id: KeyId,
}

impl Key {
    /// Create a root key (no ancestor).
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> Result<Self, TypeError> {
        Self::build(None, kind.into(), id.into())
    }

    /// Create a key rooted under `parent`.
    pub fn with_parent(
        parent: &Key,
        kind: impl Into<String>,
        id: impl Into<KeyId>,
    ) -> Result<Self, TypeError> {
        Self::build(Some(parent.clone()), kind.into(), id.into())
    }

    /// Create a key with an optional ancestor.
    pub fn with_ancestor(
        ancestor: Option<&Key>,
        kind: impl Into<String>,
        id: impl Into<KeyId>,
    ) -> Result<Self, TypeError> {
        Self::build(ancestor.cloned(), kind.into(), id.into())
    }

    fn build(parent: Option<Key>, kind: String, id: KeyId) -> Result<Self, TypeError> {
        if kind.is_empty() {
            return Err(TypeError::EmptyKind);
        }
        id.validate()?;
        Ok(Self {
            parent: parent.map(Box::new),
            kind,
            id,
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &KeyId {
        &self.id
    }

    /// The immediate ancestor, if any.
    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    /// The root of the ancestor chain (the key itself for root keys).
    pub fn root(&self) -> &Key {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Number of ancestors above this key.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(parent) = current.parent() {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Path elements from the root down to this key.
    pub fn path(&self) -> Vec<(&str, &KeyId)> {
        let mut elements = Vec::with_capacity(self.depth() + 1);
        let mut current = Some(self);
        while let Some(key) = current {
            elements.push((key.kind.as_str(), &key.id));
            current = key.parent();
        }
        elements.reverse();
        elements
    }

    /// Returns `true` if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Key) -> bool {
        let mut current = other.parent();
        while let Some(key) = current {
            if key == self {
                return true;
            }
            current = key.parent();
        }
        false
    }

    /// The entity group this key belongs to.
    pub fn group(&self) -> EntityGroupId {
        EntityGroupId::of(self)
    }

    /// Encode into an opaque, portable token.
    pub fn to_token(&self) -> KeyToken {
        KeyToken::encode(self)
    }

    /// Decode a key from a token produced by [`Key::to_token`].
    pub fn from_token(token: &str) -> Result<Self, TypeError> {
        KeyToken::decode_str(token)
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keys order by path, so an ancestor sorts immediately before its
/// descendants.
impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path().cmp(&other.path())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (kind, id)) in self.path().into_iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{kind}({id})")?;
        }
        Ok(())
    }
}
