//! Ordinal maintenance for ordered owned collections.
//!
//! Members of a list carry an integer property giving their position. The
//! functions here only compute ordinals; callers write the members listed
//! in [`OrdinalAssignment::changed`].

/// Ordinals for a list of members, in list order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrdinalAssignment {
    pub ordinals: Vec<i64>,
    /// Positions whose ordinal differs from what the member had.
    pub changed: Vec<usize>,
}

/// Ordinals for a freshly inserted list: `0..n`.
pub fn assign_on_insert(len: usize) -> OrdinalAssignment {
    OrdinalAssignment {
        ordinals: (0..len as i64).collect(),
        changed: (0..len).collect(),
    }
}

/// Repair ordinals after members were moved or inserted.
///
/// `existing[i]` is the ordinal the member at position `i` already has,
/// `None` for new members. Members keep their ordinal while it still
/// increases along the list; the others get the next free value. Only the
/// disturbed stretch is renumbered and gaps are kept.
pub fn repair_after_reorder(existing: &[Option<i64>]) -> OrdinalAssignment {
    let mut result = OrdinalAssignment {
        ordinals: Vec::with_capacity(existing.len()),
        changed: Vec::new(),
    };
    let mut previous: Option<i64> = None;
    for (pos, current) in existing.iter().enumerate() {
        let floor = previous.map_or(0, |p| p + 1);
        let ordinal = match current {
            Some(o) if *o >= floor => *o,
            _ => {
                result.changed.push(pos);
                floor
            }
        };
        result.ordinals.push(ordinal);
        previous = Some(ordinal);
    }
    result
}

/// Repair ordinals after members were removed. Survivors keep theirs.
pub fn repair_after_removal(existing: &[Option<i64>]) -> OrdinalAssignment {
    repair_after_reorder(existing)
}

/// Renumber to exactly `0..n`, rewriting only members that move.
pub fn compact(existing: &[Option<i64>]) -> OrdinalAssignment {
    let ordinals: Vec<i64> = (0..existing.len() as i64).collect();
    let changed = existing
        .iter()
        .zip(&ordinals)
        .enumerate()
        .filter(|(_, (old, new))| **old != Some(**new))
        .map(|(pos, _)| pos)
        .collect();
    OrdinalAssignment { ordinals, changed }
}
