use std::fmt;

use serde::{Deserialize, Serialize};

/// Which historical layout an entity was written with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageLayoutVersion {
    /// Children are discoverable only by ancestor query.
    ParentUnaware,
    /// The parent stores its children's keys.
    ParentTracksChildren,
}

impl StorageLayoutVersion {
    pub fn is_current(&self) -> bool {
        matches!(self, Self::ParentTracksChildren)
    }
}

impl fmt::Display for StorageLayoutVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParentUnaware => write!(f, "parent-unaware"),
            Self::ParentTracksChildren => write!(f, "parent-tracks-children"),
        }
    }
}
