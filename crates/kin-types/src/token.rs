use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::key::Key;

const TOKEN_PREFIX: &str = "kin:";
const TOKEN_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct TokenRepr {
    version: u8,
    key: Key,
}

/// Opaque, portable string form of a [`Key`].
///
/// A token carries the whole ancestor path, so decoding one yields the
/// original key exactly. Tokens are what encoded string identities hold.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyToken(String);

impl KeyToken {
    /// Encode a key.
    pub fn encode(key: &Key) -> Self {
        let repr = TokenRepr {
            version: TOKEN_VERSION,
            key: key.clone(),
        };
        // Serializing owned strings and integers into a Vec cannot fail.
        let bytes = bincode::serialize(&repr).unwrap_or_default();
        Self(format!("{TOKEN_PREFIX}{}", hex::encode(bytes)))
    }

    /// Parse and validate a token string.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Self::decode_str(s)?;
        Ok(Self(s.to_string()))
    }

    /// Decode back into the key it was produced from.
    pub fn decode(&self) -> Result<Key, TypeError> {
        Self::decode_str(&self.0)
    }

    pub(crate) fn decode_str(s: &str) -> Result<Key, TypeError> {
        let body = s
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| TypeError::InvalidToken(format!("missing '{TOKEN_PREFIX}' prefix")))?;
        let bytes = hex::decode(body).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let repr: TokenRepr = bincode::deserialize(&bytes)
            .map_err(|e| TypeError::InvalidToken(e.to_string()))?;
        if repr.version != TOKEN_VERSION {
            return Err(TypeError::InvalidToken(format!(
                "unsupported token version {}",
                repr.version
            )));
        }
        revalidate(&repr.key)?;
        Ok(repr.key)
    }

    /// Whether `s` has the shape of a token (prefix plus hex body).
    ///
    /// Does not fully decode; use [`KeyToken::parse`] for that.
    pub fn looks_encoded(s: &str) -> bool {
        s.strip_prefix(TOKEN_PREFIX)
            .is_some_and(|body| !body.is_empty() && body.bytes().all(|b| b.is_ascii_hexdigit()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Deserialization bypasses the key constructors, so re-run their checks.
fn revalidate(key: &Key) -> Result<(), TypeError> {
    let mut rebuilt: Option<Key> = None;
    for (kind, id) in key.path() {
        rebuilt = Some(Key::with_ancestor(rebuilt.as_ref(), kind, id.clone())?);
    }
    Ok(())
}

impl fmt::Debug for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyToken({})", self.0)
    }
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
