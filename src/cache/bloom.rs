//! Bloom filter over cache keys.
//!
//! Space-efficient probabilistic set membership: no false negatives, tunable
//! false-positive rate. Used as a pre-check in front of the authoritative
//! cache store so provably-unseen keys skip the lookup entirely. Membership
//! only grows; the filter is rebuilt solely on a full cache flush.

use bit_vec::BitVec;

/// A bloom filter sized for a target capacity and false-positive rate.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: BitVec,
    hash_count: u32,
    inserted: u64,
}

impl BloomFilter {
    /// Create a filter sized to hold `capacity` items at roughly
    /// `fp_rate` false positives.
    ///
    /// Uses the standard sizing formulas: `m = -n ln p / (ln 2)^2` bits and
    /// `k = (m / n) ln 2` hash functions.
    pub fn new(capacity: usize, fp_rate: f64) -> Self {
        let capacity = capacity.max(1);
        let fp_rate = fp_rate.clamp(1e-9, 0.5);

        let ln2 = std::f64::consts::LN_2;
        let bit_count = (-(capacity as f64) * fp_rate.ln() / (ln2 * ln2)).ceil() as usize;
        let bit_count = bit_count.max(8);
        let hash_count = ((bit_count as f64 / capacity as f64) * ln2).round().max(1.0) as u32;

        BloomFilter {
            bits: BitVec::from_elem(bit_count, false),
            hash_count,
            inserted: 0,
        }
    }

    /// Number of bits in the filter.
    pub fn bit_count(&self) -> usize {
        self.bits.len()
    }

    /// Number of hash functions applied per key.
    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    /// How many keys have been inserted.
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Insert a key.
    pub fn insert(&mut self, key: u64) {
        let (h1, h2) = Self::derive_hashes(key);
        for i in 0..self.hash_count {
            let index = self.index_for(h1, h2, i);
            self.bits.set(index, true);
        }
        self.inserted += 1;
    }

    /// Whether the key may have been inserted.
    ///
    /// `false` is definitive; `true` may be a false positive.
    pub fn might_contain(&self, key: u64) -> bool {
        let (h1, h2) = Self::derive_hashes(key);
        (0..self.hash_count).all(|i| {
            self.bits
                .get(self.index_for(h1, h2, i))
                .unwrap_or(false)
        })
    }

    /// Clear the filter back to empty.
    pub fn clear(&mut self) {
        self.bits.clear();
        self.inserted = 0;
    }

    /// Double hashing: the i-th probe is `h1 + i * h2` modulo the bit count.
    fn index_for(&self, h1: u64, h2: u64, i: u32) -> usize {
        (h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.bits.len() as u64) as usize
    }

    /// Derive two independent hash values from a 64-bit key.
    fn derive_hashes(key: u64) -> (u64, u64) {
        // splitmix64 finalizer, applied twice with different offsets.
        let h1 = Self::mix(key.wrapping_add(0x9E37_79B9_7F4A_7C15));
        let h2 = Self::mix(key ^ 0xBF58_476D_1CE4_E5B9) | 1; // odd, so probes cover the table
        (h1, h2)
    }

    fn mix(mut x: u64) -> u64 {
        x ^= x >> 30;
        x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        x ^= x >> 27;
        x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
        x ^ (x >> 31)
    }
}
