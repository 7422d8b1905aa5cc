//! Identifier space and ring arithmetic.
//!
//! The traditional Chord paper sizes the identifier space at m = 160 bits
//! (SHA-1). This implementation fixes m = 64 instead by picking `u64` as
//! the `RingId` representation: one machine word, wrapping arithmetic for
//! free, and plenty of space for any cluster this crate will realistically
//! see. `RING_BITS` is `RingId::BITS` so the rest of the crate never
//! hardcodes the width.

/// A position on the identifier ring.
pub type RingId = u64;

/// Bit width of the identifier space (m in the Chord paper).
pub const RING_BITS: u32 = RingId::BITS;

/// Hashes an arbitrary byte string down to a ring identifier.
///
/// Uses blake3 and keeps the first 8 bytes of the digest, big-endian.
pub fn hash_bytes(bytes: &[u8]) -> RingId {
    let digest = blake3::hash(bytes);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest.as_bytes()[..8]);
    RingId::from_be_bytes(buf)
}

/// Anything that can be placed on the ring by hashing its canonical bytes:
/// node endpoints and store keys alike.
pub trait HashRingKey {
    fn ring_id(&self) -> RingId;
}

impl HashRingKey for str {
    fn ring_id(&self) -> RingId {
        hash_bytes(self.as_bytes())
    }
}

impl HashRingKey for String {
    fn ring_id(&self) -> RingId {
        hash_bytes(self.as_bytes())
    }
}

impl HashRingKey for [u8] {
    fn ring_id(&self) -> RingId {
        hash_bytes(self)
    }
}

/// The position the i-th finger of a node at `id` should point at:
/// `(id + 2^i) mod 2^m`.
pub fn finger_start(id: RingId, i: u32) -> RingId {
    id.wrapping_add(1u64.wrapping_shl(i))
}

/// Circular containment test with explicit inclusivity at each end.
///
/// When `lo == hi` the interval spans the whole ring; the two inclusivity
/// flags then decide whether the single shared boundary point counts as
/// "inside" (this is what makes a one-node ring own everything: its
/// predecessor is nil, so ownership degenerates to "always true").
pub fn is_between(x: RingId, lo: RingId, hi: RingId, lo_inclusive: bool, hi_inclusive: bool) -> bool {
    if lo == hi {
        return lo_inclusive || hi_inclusive || x != lo;
    }
    let strictly_inside = if lo < hi { x > lo && x < hi } else { x > lo || x < hi };
    strictly_inside || (lo_inclusive && x == lo) || (hi_inclusive && x == hi)
}

/// `x ∈ (lo, hi)`, both ends excluded.
pub fn in_open(x: RingId, lo: RingId, hi: RingId) -> bool {
    is_between(x, lo, hi, false, false)
}

/// `x ∈ (lo, hi]`, right end included.
pub fn in_half_open_right(x: RingId, lo: RingId, hi: RingId) -> bool {
    is_between(x, lo, hi, false, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_bytes(b"127.0.0.1:4001"), hash_bytes(b"127.0.0.1:4001"));
    }

    #[test]
    fn hash_is_sensitive_to_input() {
        assert_ne!(hash_bytes(b"a"), hash_bytes(b"b"));
    }

    #[test]
    fn open_interval_wraps() {
        // ring of 8: (6, 2) wraps through 0 and contains 7, 0, 1 but not 6 or 2.
        assert!(in_open(7, 6, 2));
        assert!(in_open(0, 6, 2));
        assert!(in_open(1, 6, 2));
        assert!(!in_open(6, 6, 2));
        assert!(!in_open(2, 6, 2));
        assert!(!in_open(3, 6, 2));
    }

    #[test]
    fn half_open_includes_right_bound() {
        assert!(in_half_open_right(2, 6, 2));
        assert!(!in_half_open_right(6, 6, 2));
    }

    #[test]
    fn equal_bounds_is_full_ring_for_open_interval() {
        assert!(in_open(0, 5, 5));
        assert!(in_open(5, 5, 5));
    }

    #[test]
    fn equal_bounds_excludes_the_point_for_half_open() {
        assert!(!is_between(5, 5, 5, false, false));
        assert!(is_between(5, 5, 5, true, false));
        assert!(is_between(0, 5, 5, false, false));
    }

    #[test]
    fn finger_start_wraps_around_the_ring() {
        assert_eq!(finger_start(RingId::MAX, 0), 0);
    }
}
