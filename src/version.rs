//! World and column version counters used for change detection.
//!
//! The world version is a 64-bit monotonic counter owned by the `World`;
//! it is incremented on every structural mutation (§3, §5 of the design).
//! Per-column counters inside a chunk stay 32-bit, as the chunk header is
//! meant to fit one cache line, and are compared against a truncated
//! snapshot of the world version using wrapping arithmetic. A query would
//! have to go unpolled for ~2^31 structural mutations for that comparison
//! to misfire, which does not happen within one process's lifetime.

/// Monotonic counter of structural mutations against a `World`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorldVersion(u64);

impl WorldVersion {
    pub const fn zero() -> Self {
        WorldVersion(0)
    }

    /// Advances the counter and returns the new value.
    pub(crate) fn bump(&mut self) -> WorldVersion {
        self.0 = self.0.wrapping_add(1);
        *self
    }

    pub fn get(self) -> u64 {
        self.0
    }

    fn truncated(self) -> u32 {
        self.0 as u32
    }
}

/// Per-column version, stamped with the low 32 bits of the world version
/// the last time a writable view of the column was taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColumnVersion(u32);

impl ColumnVersion {
    pub const fn zero() -> Self {
        ColumnVersion(0)
    }

    pub(crate) fn stamp(&mut self, world: WorldVersion) {
        self.0 = world.truncated();
    }

    /// True if this column was written since `since`.
    pub fn is_newer_than(self, since: WorldVersion) -> bool {
        let since = since.truncated();
        // wrapping-safe "newer than" comparison, standard tick-based idiom
        (self.0.wrapping_sub(since) as i32) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_is_monotonic() {
        let mut v = WorldVersion::zero();
        let a = v.bump();
        let b = v.bump();
        assert!(b.get() > a.get());
    }

    #[test]
    fn column_version_change_detection() {
        let mut world = WorldVersion::zero();
        let baseline = world;
        let mut col = ColumnVersion::zero();
        assert!(!col.is_newer_than(baseline));

        world.bump();
        col.stamp(world);
        assert!(col.is_newer_than(baseline));
        assert!(!col.is_newer_than(world));
    }
}
