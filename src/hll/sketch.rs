// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The sketch itself: representation dispatch, insert, merge, estimate.

use std::collections::HashSet;

use crate::error::Error;
use crate::error::ErrorKind;
use crate::hll::estimation::{alpha, beta, linear_count};
use crate::hll::registers::RegisterArray;
use crate::hll::serialization;
use crate::hll::sparse::CompressedList;
use crate::hll::{
    HashFn, MAX_PRECISION, MIN_PRECISION, PP, REGISTER_LEVELS, decode_hash, default_hash,
    encode_hash, position_value,
};

/// Storage representation. A sketch starts sparse and converts to dense
/// exactly once; there is no path back.
#[derive(Debug, Clone)]
pub(crate) enum Representation {
    Sparse(SparseState),
    Dense(RegisterArray),
}

/// Sparse-mode state: recent entries buffered in a set, older ones folded
/// into the compressed list.
#[derive(Debug, Clone, Default)]
pub(crate) struct SparseState {
    pub(crate) accumulator: HashSet<u32>,
    pub(crate) list: CompressedList,
}

/// HyperLogLog cardinality sketch with tail-cut dense registers.
///
/// The precision `p` fixes the number of dense buckets at `2^p` and the
/// relative estimation error at roughly `1.04 / sqrt(2^p)`. Sketches only
/// merge with sketches of the same precision.
///
/// # Examples
///
/// ```
/// use tailcut::Sketch;
///
/// let mut left = Sketch::new(14)?;
/// let mut right = Sketch::new(14)?;
/// left.insert(b"a");
/// right.insert(b"b");
/// left.merge(Some(&right))?;
/// assert_eq!(left.estimate(), 2);
/// # Ok::<(), tailcut::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Sketch {
    pub(crate) p: u8,
    pub(crate) m: u32,
    pub(crate) b: u8,
    pub(crate) alpha: f64,
    pub(crate) hash: HashFn,
    pub(crate) repr: Representation,
}

impl Sketch {
    /// Create a sketch with the default murmur3-based hash.
    ///
    /// Fails with [`ErrorKind::ConfigInvalid`] unless `4 <= precision <= 18`.
    pub fn new(precision: u8) -> Result<Sketch, Error> {
        Self::with_hash(precision, default_hash)
    }

    /// Create a sketch that hashes items with a caller-supplied function.
    ///
    /// The hash must be uniform over all 64 bits or the estimates degrade.
    pub fn with_hash(precision: u8, hash: HashFn) -> Result<Sketch, Error> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(Error::new(
                ErrorKind::ConfigInvalid,
                format!("precision must be between {MIN_PRECISION} and {MAX_PRECISION}"),
            )
            .with_context("precision", precision));
        }
        let m = 1u32 << precision;
        Ok(Sketch {
            p: precision,
            m,
            b: 0,
            alpha: alpha(m),
            hash,
            repr: Representation::Sparse(SparseState::default()),
        })
    }

    /// The precision this sketch was created with.
    pub fn precision(&self) -> u8 {
        self.p
    }

    /// Whether the sketch is still in its sparse representation.
    pub fn is_sparse(&self) -> bool {
        matches!(self.repr, Representation::Sparse(_))
    }

    /// Record one item.
    pub fn insert(&mut self, item: &[u8]) {
        self.insert_hash((self.hash)(item));
    }

    /// Record one pre-hashed item.
    ///
    /// Useful when the caller already owns a 64-bit hash pipeline; the value
    /// is consumed exactly as if the sketch's hash function had produced it.
    pub fn insert_hash(&mut self, hash: u64) {
        match &mut self.repr {
            Representation::Sparse(state) => {
                state.accumulator.insert(encode_hash(hash, self.p));
                if state.accumulator.len() as u64 * 100 > u64::from(self.m) {
                    self.fold();
                    self.promote_if_oversized();
                }
            }
            Representation::Dense(regs) => {
                let (index, rank) = position_value(hash, self.p);
                Self::insert_rebased(regs, &mut self.b, index, rank);
            }
        }
    }

    /// Merge another sketch of the same precision into this one, converting
    /// this sketch to the dense representation. `other` is unchanged;
    /// `None` is a no-op.
    pub fn merge(&mut self, other: Option<&Sketch>) -> Result<(), Error> {
        let Some(other) = other else {
            return Ok(());
        };

        if self.p != other.p {
            return Err(Error::new(
                ErrorKind::PrecisionMismatch,
                "sketches must have equal precision to merge",
            )
            .with_context("self", self.p)
            .with_context("other", other.p));
        }

        if self.is_sparse() {
            self.promote();
        }

        match &other.repr {
            Representation::Sparse(state) => {
                for &entry in state.accumulator.iter() {
                    let (index, rank) = decode_hash(entry, other.p);
                    self.insert_dense(index, rank);
                }
                for entry in state.list.iter() {
                    let (index, rank) = decode_hash(entry, other.p);
                    self.insert_dense(index, rank);
                }
            }
            Representation::Dense(other_regs) => {
                // The other sketch's values are relative to its own bias
                // base. Re-expand each occupied bucket to its absolute rank
                // and let our insert path clamp and rebase against ours.
                for index in 0..other.m {
                    let stored = other_regs.get(index);
                    if stored > 0 {
                        self.insert_dense(index, stored + other.b);
                    }
                }
            }
        }
        Ok(())
    }

    /// Approximate number of distinct items inserted so far.
    pub fn estimate(&mut self) -> u64 {
        self.fold();
        match &self.repr {
            Representation::Sparse(state) => {
                let mp = 1u32 << PP;
                linear_count(mp, mp - state.list.len()) as u64
            }
            Representation::Dense(regs) => {
                let sum = regs.sum(self.b);
                let ez = f64::from(regs.zeros());
                let m = f64::from(self.m);
                let est = if self.b == 0 {
                    self.alpha * m * (m - ez) / (sum + beta(ez)) + 0.5
                } else {
                    self.alpha * m * m / sum + 0.5
                };
                (est + 0.5) as u64
            }
        }
    }

    /// Serialize to the versioned big-endian wire format.
    pub fn serialize(&self) -> Vec<u8> {
        serialization::serialize(self)
    }

    /// Reconstruct a sketch serialized with [`Sketch::serialize`], restoring
    /// the default hash function.
    ///
    /// Fails with [`ErrorKind::MalformedDeserializeData`] on truncated or
    /// inconsistent input.
    pub fn deserialize(bytes: &[u8]) -> Result<Sketch, Error> {
        serialization::deserialize(bytes, default_hash)
    }

    /// Like [`Sketch::deserialize`], restoring a caller-supplied hash
    /// function instead. It must be the function the serialized sketch was
    /// fed with.
    pub fn deserialize_with_hash(bytes: &[u8], hash: HashFn) -> Result<Sketch, Error> {
        serialization::deserialize(bytes, hash)
    }

    /// Drain the sparse accumulator into the compressed list via a sorted
    /// merge-join. No-op when dense or when nothing is pending.
    fn fold(&mut self) {
        if let Representation::Sparse(state) = &mut self.repr {
            if state.accumulator.is_empty() {
                return;
            }
            let mut entries: Vec<u32> = state.accumulator.drain().collect();
            entries.sort_unstable();
            state.list = state.list.fold(&entries);
        }
    }

    fn promote_if_oversized(&mut self) {
        let oversized =
            matches!(&self.repr, Representation::Sparse(state) if state.list.len() > self.m);
        if oversized {
            self.promote();
        }
    }

    /// One-way conversion to the dense representation, replaying every
    /// folded entry through the dense insert path.
    fn promote(&mut self) {
        self.fold();
        let mut regs = RegisterArray::new(self.m);
        if let Representation::Sparse(state) = &self.repr {
            for entry in state.list.iter() {
                let (index, rank) = decode_hash(entry, self.p);
                Self::insert_rebased(&mut regs, &mut self.b, index, rank);
            }
        }
        self.repr = Representation::Dense(regs);
    }

    fn insert_dense(&mut self, index: u32, rank: u8) {
        if let Representation::Dense(regs) = &mut self.repr {
            Self::insert_rebased(regs, &mut self.b, index, rank);
        }
    }

    /// Overflow-tolerant register update. A rank past the 4-bit window first
    /// slides the window up by the current register minimum, then the rank is
    /// stored relative to the base, clamped to the top of the window.
    fn insert_rebased(regs: &mut RegisterArray, base: &mut u8, index: u32, rank: u8) {
        if u32::from(rank) >= u32::from(*base) + u32::from(REGISTER_LEVELS) {
            let delta = regs.min_value();
            if delta > 0 {
                *base += delta;
                regs.rebase(delta);
            }
        }
        if rank > *base {
            let value = (rank - *base).min(REGISTER_LEVELS - 1);
            if value > regs.get(index) {
                regs.set(index, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::hll::sketch::{Representation, Sketch};
    use crate::hll::{PP, REGISTER_LEVELS};

    /// Hash landing in dense bucket `index` with rank `rank` at precision `p`.
    fn hash_at(p: u8, index: u32, rank: u8) -> u64 {
        assert!(rank <= 64 - p);
        (u64::from(index) << (64 - p)) | (1u64 << (64 - p - rank))
    }

    fn dense_registers(sketch: &Sketch) -> Vec<u8> {
        match &sketch.repr {
            Representation::Dense(regs) => (0..sketch.m).map(|i| regs.get(i)).collect(),
            Representation::Sparse(_) => panic!("sketch is still sparse"),
        }
    }

    #[test]
    fn test_rejects_out_of_range_precision() {
        assert_eq!(Sketch::new(3).unwrap_err().kind(), ErrorKind::ConfigInvalid);
        assert_eq!(Sketch::new(19).unwrap_err().kind(), ErrorKind::ConfigInvalid);
        assert!(Sketch::new(4).is_ok());
        assert!(Sketch::new(18).is_ok());
    }

    #[test]
    fn test_starts_sparse_and_promotes_once() {
        let mut sketch = Sketch::new(4).unwrap();
        assert!(sketch.is_sparse());
        // Distinct fine-grained entries; at p = 4 the list holds 16 of them.
        for i in 1..=16u64 {
            sketch.insert_hash(i << (64 - PP));
            assert!(sketch.is_sparse());
        }
        sketch.insert_hash(17u64 << (64 - PP));
        assert!(!sketch.is_sparse());
    }

    #[test]
    fn test_duplicates_are_free() {
        let mut sketch = Sketch::new(14).unwrap();
        for _ in 0..1000 {
            sketch.insert(b"same item");
        }
        assert_eq!(sketch.estimate(), 1);
        assert!(sketch.is_sparse());
    }

    #[test]
    fn test_sparse_estimate_counts_distinct_entries() {
        let mut sketch = Sketch::new(14).unwrap();
        for i in 0..100u32 {
            sketch.insert_hash(hash_at(14, i * 163, 3));
        }
        assert_eq!(sketch.estimate(), 100);
    }

    #[test]
    fn test_dense_insert_keeps_register_max() {
        let mut sketch = Sketch::new(4).unwrap();
        for i in 1..=17u64 {
            sketch.insert_hash(i << (64 - PP));
        }
        assert!(!sketch.is_sparse());
        sketch.insert_hash(hash_at(4, 7, 9));
        sketch.insert_hash(hash_at(4, 7, 4));
        assert_eq!(dense_registers(&sketch)[7], 9);
    }

    #[test]
    fn test_overflowing_rank_slides_the_base() {
        let mut sketch = Sketch::new(4).unwrap();
        for i in 1..=17u64 {
            sketch.insert_hash(i << (64 - PP));
        }
        assert!(!sketch.is_sparse());
        // The promotion replay lands every entry in bucket 0 with the rank
        // clamped at 15; buckets 1..16 are still zero.
        assert_eq!(dense_registers(&sketch)[0], 15);
        assert_eq!(sketch.b, 0);

        // Fill every bucket so the register minimum becomes nonzero.
        for index in 0..16 {
            sketch.insert_hash(hash_at(4, index, 5));
        }
        // A rank past the window now rebases: the base absorbs the minimum.
        sketch.insert_hash(hash_at(4, 1, 21));
        assert_eq!(sketch.b, 5);
        let regs = dense_registers(&sketch);
        assert_eq!(regs[0], 10);
        assert_eq!(regs[1], REGISTER_LEVELS - 1);
        assert_eq!(regs[2], 0);
    }

    #[test]
    fn test_merge_none_is_noop() {
        let mut sketch = Sketch::new(10).unwrap();
        sketch.insert(b"x");
        sketch.merge(None).unwrap();
        assert!(sketch.is_sparse());
        assert_eq!(sketch.estimate(), 1);
    }

    #[test]
    fn test_merge_rejects_precision_mismatch() {
        let mut left = Sketch::new(10).unwrap();
        let right = Sketch::new(11).unwrap();
        let err = left.merge(Some(&right)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PrecisionMismatch);
        // A failed merge leaves the receiver untouched.
        assert!(left.is_sparse());
    }

    #[test]
    fn test_merge_takes_register_maximum() {
        let mut left = Sketch::new(4).unwrap();
        let mut right = Sketch::new(4).unwrap();
        left.insert_hash(hash_at(4, 2, 7));
        left.insert_hash(hash_at(4, 3, 1));
        right.insert_hash(hash_at(4, 2, 4));
        right.insert_hash(hash_at(4, 5, 11));
        left.merge(Some(&right)).unwrap();
        assert!(!left.is_sparse());
        let regs = dense_registers(&left);
        assert_eq!(regs[2], 7);
        assert_eq!(regs[3], 1);
        assert_eq!(regs[5], 11);
        // The sparse operand is untouched.
        assert!(right.is_sparse());
    }

    #[test]
    fn test_merge_reconciles_bias_bases() {
        // Build a dense operand with a nonzero base.
        let mut other = Sketch::new(4).unwrap();
        for i in 1..=17u64 {
            other.insert_hash(i << (64 - PP));
        }
        for index in 0..16 {
            other.insert_hash(hash_at(4, index, 5));
        }
        other.insert_hash(hash_at(4, 1, 21));
        assert_eq!(other.b, 5);

        let mut receiver = Sketch::new(4).unwrap();
        receiver.insert_hash(hash_at(4, 2, 9));
        receiver.merge(Some(&other)).unwrap();
        assert_eq!(receiver.b, 0);
        let regs = dense_registers(&receiver);
        // The operand's bucket 1 held 15 above its base of 5: absolute rank
        // 20, clamped to the window top here.
        assert_eq!(regs[1], 15);
        // Bucket 0 held 10 above the base: absolute rank 15.
        assert_eq!(regs[0], 15);
        // The receiver's own rank 9 beats the operand's rebased-to-zero
        // bucket 2.
        assert_eq!(regs[2], 9);
        assert_eq!(regs[4], 0);
    }

    #[test]
    fn test_estimate_is_stable_across_repeats() {
        let mut sketch = Sketch::new(12).unwrap();
        for i in 0..5000u32 {
            sketch.insert(&i.to_be_bytes());
        }
        let first = sketch.estimate();
        for i in 0..5000u32 {
            sketch.insert(&i.to_be_bytes());
        }
        assert_eq!(sketch.estimate(), first);
    }
}
