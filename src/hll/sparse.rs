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

//! Compressed storage for sparse entries.
//!
//! Entries are kept strictly ascending and stored as deltas from their
//! predecessor, each delta as an LSB-first varint (7 value bits per byte,
//! high bit set on every byte except the last). The list is append-only;
//! updates happen by merging into a fresh list.

use crate::error::Error;

/// Decode one varint starting at `pos`. Returns the value and the position
/// just past it, or `None` if the stream is truncated or the group would not
/// fit 32 bits.
fn decode_varint(bytes: &[u8], mut pos: usize) -> Option<(u32, usize)> {
    let mut value = 0u32;
    let mut shift = 0u32;
    loop {
        let byte = *bytes.get(pos)?;
        pos += 1;
        if shift >= 32 || (shift == 28 && byte & 0x7F > 0x0F) {
            return None;
        }
        value |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Some((value, pos));
        }
        shift += 7;
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct CompressedList {
    count: u32,
    last: u32,
    bytes: Vec<u8>,
}

impl CompressedList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            count: 0,
            last: 0,
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Number of entries in the list.
    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Append an entry. Entries must arrive in strictly ascending order.
    pub fn append(&mut self, entry: u32) {
        debug_assert!(self.count == 0 || entry > self.last);
        let mut delta = entry - self.last;
        while delta & !0x7F != 0 {
            self.bytes.push((delta as u8 & 0x7F) | 0x80);
            delta >>= 7;
        }
        self.bytes.push(delta as u8);
        self.last = entry;
        self.count += 1;
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            bytes: &self.bytes,
            pos: 0,
            last: 0,
        }
    }

    /// Merge this list with an ascending, duplicate-free slice of new
    /// entries into a fresh list, dropping entries present in both.
    pub fn fold(&self, sorted_new: &[u32]) -> CompressedList {
        let mut merged = CompressedList::with_capacity(self.bytes.len() + sorted_new.len());
        let mut iter = self.iter();
        let mut i = 0;
        loop {
            let take_existing = match (iter.peek(), sorted_new.get(i)) {
                (None, None) => break,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some(existing), Some(&new)) => {
                    if existing == new {
                        i += 1;
                    }
                    existing <= new
                }
            };
            if take_existing {
                if let Some(existing) = iter.next() {
                    merged.append(existing);
                }
            } else {
                merged.append(sorted_new[i]);
                i += 1;
            }
        }
        merged
    }

    /// Reconstruct a list from its serialized parts, validating that the
    /// stream decodes to exactly `count` strictly ascending entries with no
    /// bytes left over.
    pub fn from_parts(count: u32, bytes: Vec<u8>) -> Result<Self, Error> {
        let mut last = 0u32;
        let mut pos = 0usize;
        for i in 0..count {
            let (delta, next) = decode_varint(&bytes, pos)
                .ok_or_else(|| Error::deserial("compressed list varint stream is invalid"))?;
            if i > 0 && delta == 0 {
                return Err(Error::deserial(
                    "compressed list entries are not strictly ascending",
                ));
            }
            last = last
                .checked_add(delta)
                .ok_or_else(|| Error::deserial("compressed list entry overflows 32 bits"))?;
            pos = next;
        }
        if pos != bytes.len() {
            return Err(Error::deserial("compressed list has trailing bytes"));
        }
        Ok(Self { count, last, bytes })
    }
}

pub(crate) struct Iter<'a> {
    bytes: &'a [u8],
    pos: usize,
    last: u32,
}

impl Iter<'_> {
    /// Next entry without consuming it.
    pub fn peek(&self) -> Option<u32> {
        decode_varint(self.bytes, self.pos).map(|(delta, _)| self.last + delta)
    }
}

impl Iterator for Iter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let (delta, pos) = decode_varint(self.bytes, self.pos)?;
        self.pos = pos;
        self.last += delta;
        Some(self.last)
    }
}

#[cfg(test)]
mod tests {
    use crate::hll::sparse::CompressedList;

    #[test]
    fn test_append_and_iterate() {
        let mut list = CompressedList::default();
        let entries = [0u32, 1, 127, 128, 16511, 1 << 30, u32::MAX];
        for &entry in &entries {
            list.append(entry);
        }
        assert_eq!(list.len(), entries.len() as u32);
        assert_eq!(list.iter().collect::<Vec<_>>(), entries);
    }

    #[test]
    fn test_small_deltas_use_one_byte() {
        let mut list = CompressedList::default();
        for entry in [10u32, 20, 147] {
            list.append(entry);
        }
        // Deltas 10, 10, 127 all fit a single varint byte.
        assert_eq!(list.as_bytes().len(), 3);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut list = CompressedList::default();
        list.append(5);
        list.append(300);
        let mut iter = list.iter();
        assert_eq!(iter.peek(), Some(5));
        assert_eq!(iter.peek(), Some(5));
        assert_eq!(iter.next(), Some(5));
        assert_eq!(iter.peek(), Some(300));
        assert_eq!(iter.next(), Some(300));
        assert_eq!(iter.peek(), None);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_fold_merges_and_dedups() {
        let mut list = CompressedList::default();
        for entry in [2u32, 5, 9, 1000] {
            list.append(entry);
        }
        let merged = list.fold(&[1, 5, 9, 10, 2000]);
        assert_eq!(
            merged.iter().collect::<Vec<_>>(),
            vec![1, 2, 5, 9, 10, 1000, 2000]
        );
        assert_eq!(merged.len(), 7);
    }

    #[test]
    fn test_fold_into_empty_list() {
        let list = CompressedList::default();
        let merged = list.fold(&[3, 4, 5]);
        assert_eq!(merged.iter().collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn test_from_parts_round_trip() {
        let mut list = CompressedList::default();
        for entry in [0u32, 42, 65536, 4_000_000_000] {
            list.append(entry);
        }
        let restored =
            CompressedList::from_parts(list.len(), list.as_bytes().to_vec()).unwrap();
        assert_eq!(restored.iter().collect::<Vec<_>>(), list.iter().collect::<Vec<_>>());
        // The reconstructed list keeps appending where the original left off.
        let mut restored = restored;
        restored.append(4_000_000_001);
        assert_eq!(restored.iter().last(), Some(4_000_000_001));
    }

    #[test]
    fn test_from_parts_rejects_truncation() {
        let mut list = CompressedList::default();
        list.append(100_000);
        let mut bytes = list.as_bytes().to_vec();
        bytes.pop();
        assert!(CompressedList::from_parts(1, bytes).is_err());
    }

    #[test]
    fn test_from_parts_rejects_trailing_bytes() {
        let mut list = CompressedList::default();
        list.append(7);
        let mut bytes = list.as_bytes().to_vec();
        bytes.push(0);
        assert!(CompressedList::from_parts(1, bytes).is_err());
    }

    #[test]
    fn test_from_parts_rejects_duplicate_entries() {
        // Two zero deltas after the first entry encode a duplicate.
        assert!(CompressedList::from_parts(2, vec![5, 0]).is_err());
    }

    #[test]
    fn test_from_parts_rejects_overlong_varint() {
        // Six continuation bytes cannot encode a u32.
        let bytes = vec![0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(CompressedList::from_parts(1, bytes).is_err());
    }
}
