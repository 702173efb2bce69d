use kin_meta::IdentityShape;
use kin_types::{Key, KeyToken};

use crate::error::{MappingError, MappingResult};
use crate::identity::ExplicitId;

/// Derive the key of a new entity of `kind` from an identifier.
///
/// Numeric and name ids are placed under `ancestor`. Encoded and key ids
/// carry their own ancestor chain, which must agree with `ancestor` when
/// both are present. No store access happens here.
pub fn derive_key(
    type_name: &str,
    kind: &str,
    shape: IdentityShape,
    id: &ExplicitId,
    ancestor: Option<&Key>,
) -> MappingResult<Key> {
    if let Some(parent) = ancestor {
        if !shape.can_hold_ancestor() {
            return Err(MappingError::shape(
                type_name,
                format!("{shape:?} identity cannot be placed under {parent}"),
            ));
        }
    }

    match (shape, id) {
        (IdentityShape::Numeric, ExplicitId::Numeric(n)) => Ok(Key::with_ancestor(ancestor, kind, *n)?),
        (IdentityShape::RawName, ExplicitId::Name(name)) if KeyToken::looks_encoded(name) => Err(
            MappingError::shape(type_name, "raw name identity given an encoded key"),
        ),
        (IdentityShape::RawName, ExplicitId::Name(name)) => {
            Ok(Key::with_ancestor(ancestor, kind, name.as_str())?)
        }
        (IdentityShape::Encoded | IdentityShape::Key, ExplicitId::Numeric(n)) => {
            Ok(Key::with_ancestor(ancestor, kind, *n)?)
        }
        (IdentityShape::Encoded | IdentityShape::Key, ExplicitId::Name(name)) => {
            Ok(Key::with_ancestor(ancestor, kind, name.as_str())?)
        }
        (IdentityShape::Encoded | IdentityShape::Key, ExplicitId::Encoded(token)) => {
            adopt_full_key(type_name, kind, token.decode()?, ancestor)
        }
        (IdentityShape::Encoded | IdentityShape::Key, ExplicitId::Key(key)) => {
            adopt_full_key(type_name, kind, key.clone(), ancestor)
        }
        (shape, id) => Err(MappingError::shape(
            type_name,
            format!("{shape:?} identity cannot take {id:?}"),
        )),
    }
}

fn adopt_full_key(type_name: &str, kind: &str, key: Key, ancestor: Option<&Key>) -> MappingResult<Key> {
    if key.kind() != kind {
        return Err(MappingError::shape(
            type_name,
            format!("key {key} is not of kind {kind}"),
        ));
    }
    match (key.parent(), ancestor) {
        (Some(own), Some(declared)) if own != declared => Err(MappingError::AmbiguousAncestor {
            type_name: type_name.to_string(),
            detail: format!("identity names parent {own}, owner is {declared}"),
        }),
        (None, Some(declared)) => Ok(Key::with_parent(declared, kind, key.id().clone())?),
        _ => Ok(key),
    }
}
