use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::key::Key;

/// Largest payload accepted by an indexed short blob.
pub const SHORT_BLOB_MAX_BYTES: usize = 500;

/// A property value stored on an entity.
///
/// `Null` is a real stored value: a property set to `Null` is present, which
/// is distinct from the property being absent from the entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Indexed inline bytes, at most [`SHORT_BLOB_MAX_BYTES`].
    ShortBlob(Vec<u8>),
    /// Unindexed bytes with no size limit.
    LongBlob(Vec<u8>),
    Key(Key),
    KeyList(Vec<Key>),
}

impl Value {
    /// Build a short blob, enforcing the size limit.
    pub fn short_blob(bytes: impl Into<Vec<u8>>) -> Result<Self, TypeError> {
        let bytes = bytes.into();
        if bytes.len() > SHORT_BLOB_MAX_BYTES {
            return Err(TypeError::ShortBlobTooLong {
                len: bytes.len(),
                max: SHORT_BLOB_MAX_BYTES,
            });
        }
        Ok(Self::ShortBlob(bytes))
    }

    pub fn long_blob(bytes: impl Into<Vec<u8>>) -> Self {
        Self::LongBlob(bytes.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the store indexes this value.
    pub fn is_indexed(&self) -> bool {
        !matches!(self, Self::LongBlob(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&Key> {
        match self {
            Self::Key(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_key_list(&self) -> Option<&[Key]> {
        match self {
            Self::KeyList(keys) => Some(keys),
            _ => None,
        }
    }

    /// Keys referenced by this value. `Null` references nothing.
    pub fn referenced_keys(&self) -> Vec<&Key> {
        match self {
            Self::Key(k) => vec![k],
            Self::KeyList(keys) => keys.iter().collect(),
            _ => Vec::new(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Key> for Value {
    fn from(k: Key) -> Self {
        Self::Key(k)
    }
}

impl From<Vec<Key>> for Value {
    fn from(keys: Vec<Key>) -> Self {
        Self::KeyList(keys)
    }
}

impl From<Option<Key>> for Value {
    fn from(k: Option<Key>) -> Self {
        k.map_or(Self::Null, Self::Key)
    }
}
