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

//! HyperLogLog sketch implementation for cardinality estimation.
//!
//! This module provides a probabilistic data structure for estimating the cardinality
//! (number of distinct elements) of large datasets with high accuracy and low memory usage.
//!
//! # Overview
//!
//! The sketch hashes each item to 64 bits and keeps, per bucket, the longest run of
//! leading zeros observed in the hash tail. Two storage representations adapt to the
//! cardinality seen so far:
//!
//! - **Sparse**: 32-bit entries at auxiliary precision [`PP`], buffered in an
//!   accumulator set and periodically folded into a sorted, delta/varint-compressed
//!   list. Estimation is linear counting over the fine bucket space.
//! - **Dense**: `2^p` 4-bit registers, two per byte. Register overflow is absorbed
//!   by a shared bias base that the whole array is rebased against, so values far
//!   above 15 remain representable.
//!
//! Promotion from sparse to dense happens once and is never reversed.
//!
//! # Entries
//!
//! A sparse entry is a 32-bit value whose top 25 bits are the fine bucket index.
//! When the index alone cannot reproduce the rank (all index bits below the coarse
//! prefix are zero), the rank is carried explicitly in a 6-bit field and bit 0 is
//! set as a flag.

use std::hash::Hasher;

mod estimation;
mod registers;
mod serialization;
mod sketch;
mod sparse;

// Re-export public API
pub use sketch::Sketch;

/// Hash collaborator: maps an item to the 64 bits the sketch consumes.
pub type HashFn = fn(&[u8]) -> u64;

/// Auxiliary precision of the sparse representation.
pub(crate) const PP: u8 = 25;

/// Number of values a 4-bit register can hold.
pub(crate) const REGISTER_LEVELS: u8 = 16;

pub(crate) const MIN_PRECISION: u8 = 4;
pub(crate) const MAX_PRECISION: u8 = 18;

const RANK_BITS: u32 = 6;
const RANK_MASK: u32 = (1 << RANK_BITS) - 1;

const DEFAULT_SEED: u32 = 9001;

/// Default item hash: murmur3 x64-128 with a fixed seed, low 64 bits.
pub(crate) fn default_hash(item: &[u8]) -> u64 {
    let mut hasher = mur3::Hasher128::with_seed(DEFAULT_SEED);
    hasher.write(item);
    let (lo, _) = hasher.finish128();
    lo
}

/// Encode a 64-bit hash as a sparse entry at auxiliary precision [`PP`].
///
/// The top [`PP`] bits of the hash become the fine bucket index. When every
/// index bit below the coarse `p`-bit prefix is zero, the rank cannot later be
/// recovered from the index, so it is stored explicitly:
/// `index << 7 | rank << 1 | 1`. Otherwise the entry is `index << 1` with the
/// flag bit clear.
#[inline]
pub(crate) fn encode_hash(x: u64, p: u8) -> u32 {
    let index = (x >> (64 - PP)) as u32;
    if index & ((1 << (PP - p)) - 1) == 0 {
        // Guard bits cap the rank at 64 - PP + 1, which fits the 6-bit field.
        let tail = (x << PP) | ((1u64 << PP) - 1);
        let rank = tail.leading_zeros() + 1;
        (index << (RANK_BITS + 1)) | (rank << 1) | 1
    } else {
        index << 1
    }
}

/// Decode a sparse entry into a coarse bucket index and rank at precision `p`.
///
/// The rank is relative to the coarse prefix: an explicit rank counted below
/// the [`PP`] prefix is widened by `PP - p`, an implicit one is recomputed
/// from the index bits between the two prefixes.
#[inline]
pub(crate) fn decode_hash(entry: u32, p: u8) -> (u32, u8) {
    let index = if entry & 1 == 1 {
        entry >> (RANK_BITS + 1)
    } else {
        entry >> 1
    };
    let rank = if entry & 1 == 1 {
        ((entry >> 1) & RANK_MASK) as u8 + (PP - p)
    } else {
        let sub = index << (32 - u32::from(PP - p));
        sub.leading_zeros() as u8 + 1
    };
    (index >> (PP - p), rank)
}

/// Bucket index and rank straight from a hash, for the dense representation.
///
/// The tail is guarded at bit `p - 1`, capping the rank at `65 - p`, the same
/// cap the sparse encoding enforces.
#[inline]
pub(crate) fn position_value(x: u64, p: u8) -> (u32, u8) {
    let index = (x >> (64 - p)) as u32;
    let tail = (x << p) | (1u64 << (p - 1));
    (index, tail.leading_zeros() as u8 + 1)
}
