/// Errors from metadata lookup and catalog validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetaError {
    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("no type is stored under kind {0}")]
    UnknownKind(String),

    #[error("kind {kind} has no type with discriminator {value:?}")]
    UnknownDiscriminator { kind: String, value: String },

    #[error("type {0} registered twice")]
    DuplicateType(String),

    #[error("type {type_name} extends unknown type {parent}")]
    UnknownParentType { type_name: String, parent: String },

    #[error("inheritance cycle through type {0}")]
    InheritanceCycle(String),

    #[error("{type_name}.{field} targets unknown type {target}")]
    UnknownTargetType {
        type_name: String,
        field: String,
        target: String,
    },

    /// An owned child must use an identity that can carry its parent's key.
    #[error("{type_name}.{field} owns {target}, whose identity cannot hold an ancestor")]
    ChildIdentityCannotHoldAncestor {
        type_name: String,
        field: String,
        target: String,
    },

    #[error("{type_name} declares more than one owned relationship to {target}")]
    MultipleOwnedRelationsOfSameType { type_name: String, target: String },

    #[error("{0} uses an encoded string identity, which a sequence cannot generate")]
    SequenceInvalidForEncodedIdentity(String),

    #[error("{0} uses a raw name identity, which must be assigned explicitly")]
    RawNameMustBeExplicit(String),

    #[error("kind {0} mixes sequence and store id generation")]
    MixedIdentifierSchemes(String),

    #[error("kind {kind} has two types with discriminator {value:?}")]
    DuplicateDiscriminator { kind: String, value: String },
}

/// Result alias for metadata operations.
pub type MetaResult<T> = Result<T, MetaError>;
