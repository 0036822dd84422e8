//! Query canonicalization (spec §4.G steps 1-2).
//!
//! Terms are deduplicated and sorted per operator, then used directly as
//! a `HashMap` key. This stands in for the source's "canonical hash" (the
//! spec's "compute a canonical hash; consult the query cache"): a
//! `#[derive(Hash, Eq)]` struct over three sorted `SmallVec`s is exactly a
//! canonical hash, just without hand-rolling the hash function, and two
//! equal `QueryKey`s are guaranteed to compare equal term-for-term rather
//! than merely hash-equal.

use crate::component::ComponentId;
use smallvec::SmallVec;

/// Canonicalized, hashable identity of a query's predicate. Two builder
/// calls that name the same terms (in any order, with any duplicates)
/// produce equal keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub all: SmallVec<[ComponentId; 8]>,
    pub any: SmallVec<[ComponentId; 8]>,
    pub not: SmallVec<[ComponentId; 8]>,
    pub changed: SmallVec<[ComponentId; 8]>,
}

impl QueryKey {
    pub(crate) fn canonicalize(&mut self) {
        Self::sort_dedup(&mut self.all);
        Self::sort_dedup(&mut self.any);
        Self::sort_dedup(&mut self.not);
        Self::sort_dedup(&mut self.changed);
    }

    fn sort_dedup(ids: &mut SmallVec<[ComponentId; 8]>) {
        ids.sort_unstable();
        ids.dedup();
    }
}
