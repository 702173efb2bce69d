//! Identity values as the host sees them, and how they map to keys.

use kin_meta::IdentityShape;
use kin_types::{Key, KeyId, KeyToken, Value};

use crate::error::{MappingError, MappingResult};

/// An identifier supplied by the host for a new object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExplicitId {
    Numeric(i64),
    Name(String),
    /// A token wrapping a complete key, ancestors included.
    Encoded(KeyToken),
    /// A complete key.
    Key(Key),
}

impl From<i64> for ExplicitId {
    fn from(id: i64) -> Self {
        Self::Numeric(id)
    }
}

impl From<&str> for ExplicitId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<KeyToken> for ExplicitId {
    fn from(token: KeyToken) -> Self {
        Self::Encoded(token)
    }
}

impl From<Key> for ExplicitId {
    fn from(key: Key) -> Self {
        Self::Key(key)
    }
}

/// The value held by an object's identity field, in its declared shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityValue {
    Numeric(i64),
    RawName(String),
    Encoded(KeyToken),
    Key(Key),
}

impl IdentityValue {
    /// Express `key` in `shape`.
    ///
    /// Numeric and raw shapes hold only the last path element, so keys with
    /// an ancestor cannot be expressed in them.
    pub fn from_key(type_name: &str, shape: IdentityShape, key: &Key) -> MappingResult<Self> {
        match shape {
            IdentityShape::Numeric | IdentityShape::RawName if !key.is_root() => {
                Err(MappingError::shape(
                    type_name,
                    format!("{shape:?} identity cannot hold ancestor of {key}"),
                ))
            }
            IdentityShape::Numeric => match key.id() {
                KeyId::Numeric(id) => Ok(Self::Numeric(*id)),
                KeyId::Name(_) => Err(MappingError::shape(
                    type_name,
                    format!("numeric identity for named key {key}"),
                )),
            },
            IdentityShape::RawName => match key.id() {
                KeyId::Name(name) => Ok(Self::RawName(name.clone())),
                KeyId::Numeric(_) => Err(MappingError::shape(
                    type_name,
                    format!("raw name identity for numeric key {key}"),
                )),
            },
            IdentityShape::Encoded => Ok(Self::Encoded(key.to_token())),
            IdentityShape::Key => Ok(Self::Key(key.clone())),
        }
    }

    /// Read an identity field value stored by the host.
    ///
    /// Raw and encoded strings are never interchangeable: a raw field
    /// holding a token, or an encoded field holding a plain string, is
    /// rejected.
    pub fn from_stored(type_name: &str, shape: IdentityShape, value: &Value) -> MappingResult<Self> {
        match (shape, value) {
            (IdentityShape::Numeric, Value::Int(id)) => Ok(Self::Numeric(*id)),
            (IdentityShape::RawName, Value::Text(s)) if KeyToken::looks_encoded(s) => Err(
                MappingError::shape(type_name, "raw name field holds an encoded key"),
            ),
            (IdentityShape::RawName, Value::Text(s)) => Ok(Self::RawName(s.clone())),
            (IdentityShape::Encoded, Value::Text(s)) if !KeyToken::looks_encoded(s) => Err(
                MappingError::shape(type_name, format!("encoded field holds plain string {s:?}")),
            ),
            (IdentityShape::Encoded, Value::Text(s)) => Ok(Self::Encoded(KeyToken::parse(s)?)),
            (IdentityShape::Key, Value::Key(key)) => Ok(Self::Key(key.clone())),
            (shape, other) => Err(MappingError::shape(
                type_name,
                format!("{shape:?} identity cannot be read from {other:?}"),
            )),
        }
    }

    /// The explicit id this value supplies when persisting.
    pub fn to_explicit(&self) -> ExplicitId {
        match self {
            Self::Numeric(id) => ExplicitId::Numeric(*id),
            Self::RawName(name) => ExplicitId::Name(name.clone()),
            Self::Encoded(token) => ExplicitId::Encoded(token.clone()),
            Self::Key(key) => ExplicitId::Key(key.clone()),
        }
    }
}
