//! Hashers for keys that are already well distributed, so the default
//! SipHash-family hasher's mixing work is wasted (grounded on the teacher's
//! `src/util/hash.rs`).

use {
    ahash::RandomState,
    core::hash::{BuildHasherDefault, Hasher},
};

/// Takes the first 8 bytes of the input verbatim instead of mixing them.
/// Correct for keys whose bit pattern is already a good hash, such as a
/// `TypeId`: falls back to `ahash` for anything shorter than a `u64`.
#[derive(Default)]
pub(crate) struct NoOpHasher {
    hash: u64,
}

impl Hasher for NoOpHasher {
    fn finish(&self) -> u64 {
        self.hash
    }

    #[cfg(target_pointer_width = "64")]
    fn write_usize(&mut self, i: usize) {
        self.hash = i as u64;
    }

    fn write_u128(&mut self, i: u128) {
        self.hash = i as u64;
    }

    fn write_u64(&mut self, i: u64) {
        self.hash = i;
    }

    fn write(&mut self, bytes: &[u8]) {
        match *bytes {
            [a, b, c, d, e, f, g, h, ..] => {
                self.hash = u64::from_ne_bytes([a, b, c, d, e, f, g, h]);
            }
            _ => {
                let mut hasher = RandomState::new().build_hasher();
                hasher.write(bytes);
                self.hash = hasher.finish();
            }
        }
    }
}

/// XORs each written chunk into a running accumulator, so the order
/// elements are written in doesn't affect the result. Used for keys that
/// are conceptually a *set* of small integers (a sorted component-id
/// slice): two archetypes with the same components hash identically
/// regardless of how the caller happened to build the slice.
#[derive(Default)]
pub(crate) struct XorHasher {
    hash: u64,
}

impl Hasher for XorHasher {
    fn finish(&self) -> u64 {
        self.hash
    }

    #[cfg(target_pointer_width = "64")]
    fn write_usize(&mut self, i: usize) {
        self.hash ^= i as u64;
    }

    fn write_u128(&mut self, i: u128) {
        self.hash ^= i as u64;
    }

    fn write_u64(&mut self, i: u64) {
        self.hash ^= i;
    }

    fn write(&mut self, bytes: &[u8]) {
        match *bytes {
            [a, b, c, d, e, f, g, h, ..] => {
                self.hash ^= u64::from_ne_bytes([a, b, c, d, e, f, g, h]);
            }
            _ => {
                let mut hasher = RandomState::new().build_hasher();
                hasher.write(bytes);
                self.hash ^= hasher.finish();
            }
        }
    }
}

pub(crate) type NoOpBuildHasher = BuildHasherDefault<NoOpHasher>;
pub(crate) type XorBuildHasher = BuildHasherDefault<XorHasher>;
