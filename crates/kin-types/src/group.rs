use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::key::{Key, KeyId};

/// Stable identifier of an entity group.
///
/// Derived with BLAKE3 from the path of the group's root key, so every key
/// sharing a root maps to the same id. Used for grouping mutations; the root
/// key itself remains available through [`Key::root`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityGroupId {
    hash: [u8; 32],
}

impl EntityGroupId {
    /// The group a key belongs to.
    pub fn of(key: &Key) -> Self {
        let root = key.root();
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"kin-group-v1:");
        hasher.update(root.kind().as_bytes());
        hasher.update(b":");
        match root.id() {
            KeyId::Numeric(n) => {
                hasher.update(b"num:");
                hasher.update(&n.to_be_bytes());
            }
            KeyId::Name(name) => {
                hasher.update(b"name:");
                hasher.update(name.as_bytes());
            }
        }
        Self {
            hash: *hasher.finalize().as_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Short identifier (first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("eg:{}", hex::encode(&self.hash[..4]))
    }

    /// Parse from a hex string, with or without the `eg:` prefix.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix("eg:").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| TypeError::InvalidHex(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self { hash })
    }
}

impl fmt::Debug for EntityGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityGroupId({})", self.short_id())
    }
}

impl fmt::Display for EntityGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_id())
    }
}
