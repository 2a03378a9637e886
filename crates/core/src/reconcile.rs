//! Desired-vs-existing set reconciliation shared by tags, people, locations,
//! collections, persons and regions.

use crate::error::Result;

/// Outcome of matching a desired set against what is stored.
#[derive(Debug)]
pub struct Matching<'a, D, E> {
    /// Desired entries paired with the stored entry they matched.
    pub kept: Vec<(&'a D, &'a E)>,
    /// Desired entries with no stored counterpart.
    pub added: Vec<&'a D>,
    /// Stored entries no desired entry claimed.
    pub removed: Vec<&'a E>,
}

/// Pair each desired entry with the first unclaimed stored entry it matches.
/// A stored entry is claimed at most once, so duplicates on either side reconcile one-to-one.
pub fn reconcile<'a, D, E>(
    desired: &'a [D],
    existing: &'a [E],
    matches: impl Fn(&D, &E) -> bool,
) -> Matching<'a, D, E> {
    let mut claimed = vec![false; existing.len()];
    let mut kept = Vec::new();
    let mut added = Vec::new();

    for want in desired {
        let hit = existing
            .iter()
            .enumerate()
            .find(|&(i, have)| !claimed[i] && matches(want, have));
        match hit {
            Some((i, have)) => {
                claimed[i] = true;
                kept.push((want, have));
            }
            None => added.push(want),
        }
    }

    let removed = existing
        .iter()
        .zip(&claimed)
        .filter(|(_, claimed)| !**claimed)
        .map(|(have, _)| have)
        .collect();

    Matching {
        kept,
        added,
        removed,
    }
}

/// Exact-identity reconciliation, applied through the given callbacks.
/// Removals are applied before additions. Returns `(added, removed)` counts.
pub fn apply<T: PartialEq>(
    desired: &[T],
    existing: &[T],
    mut remove: impl FnMut(&T) -> Result<()>,
    mut add: impl FnMut(&T) -> Result<()>,
) -> Result<(usize, usize)> {
    let matching = reconcile(desired, existing, |a, b| a == b);
    for &stale in &matching.removed {
        remove(stale)?;
    }
    for &fresh in &matching.added {
        add(fresh)?;
    }
    Ok((matching.added.len(), matching.removed.len()))
}

/// Order-preserving de-duplication of trimmed, non-empty strings.
pub fn dedup_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.as_ref().trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}
