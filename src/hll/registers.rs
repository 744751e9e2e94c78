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

//! Dense register storage: 4-bit counters packed two per byte.
//!
//! Values stored here are relative to the sketch's shared bias base. A value
//! of 0 means the bucket has seen nothing above the base. The zero-register
//! count is maintained incrementally because both the estimator and the
//! rebase fast path depend on it.

use crate::hll::REGISTER_LEVELS;

/// Exact `2^-e` for exponents inside the normal f64 range.
#[inline]
fn inv_pow2(e: u32) -> f64 {
    debug_assert!(e < 1023);
    f64::from_bits(u64::from(1023 - e) << 52)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RegisterArray {
    /// Packed registers, even slot in the low nibble, odd slot in the high.
    fields: Vec<u8>,
    /// Number of registers currently at zero.
    zero_count: u32,
}

impl RegisterArray {
    /// Create `count` zeroed registers. `count` must be even.
    pub fn new(count: u32) -> Self {
        debug_assert!(count % 2 == 0);
        Self {
            fields: vec![0u8; (count / 2) as usize],
            zero_count: count,
        }
    }

    /// Rebuild from packed bytes, recounting zero registers from scratch.
    pub fn from_bytes(fields: Vec<u8>) -> Self {
        let zero_count = fields
            .iter()
            .map(|byte| u32::from(byte & 0x0F == 0) + u32::from(byte >> 4 == 0))
            .sum();
        Self { fields, zero_count }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.fields
    }

    pub fn get(&self, index: u32) -> u8 {
        let byte = self.fields[(index >> 1) as usize];
        if index & 1 == 0 { byte & 0x0F } else { byte >> 4 }
    }

    pub fn set(&mut self, index: u32, value: u8) {
        debug_assert!(value < REGISTER_LEVELS);
        let slot = (index >> 1) as usize;
        let byte = self.fields[slot];
        let old = if index & 1 == 0 { byte & 0x0F } else { byte >> 4 };
        self.fields[slot] = if index & 1 == 0 {
            (byte & 0xF0) | value
        } else {
            (byte & 0x0F) | (value << 4)
        };
        if old == 0 && value != 0 {
            self.zero_count -= 1;
        } else if old != 0 && value == 0 {
            self.zero_count += 1;
        }
    }

    /// Number of registers at zero.
    pub fn zeros(&self) -> u32 {
        self.zero_count
    }

    /// Smallest stored value across all registers; 0 as soon as any register
    /// is empty.
    pub fn min_value(&self) -> u8 {
        if self.zero_count > 0 {
            return 0;
        }
        let mut min = REGISTER_LEVELS - 1;
        for byte in &self.fields {
            min = min.min(byte & 0x0F).min(byte >> 4);
        }
        min
    }

    /// Sum of `2^-(value + base)` over all registers, the harmonic-mean term
    /// of the dense estimator.
    pub fn sum(&self, base: u8) -> f64 {
        let base = u32::from(base);
        let mut sum = 0.0;
        for byte in &self.fields {
            sum += inv_pow2(u32::from(byte & 0x0F) + base);
            sum += inv_pow2(u32::from(byte >> 4) + base);
        }
        sum
    }

    /// Subtract `delta` from every register, flooring at zero. Called when
    /// the shared bias base slides up by `delta`.
    pub fn rebase(&mut self, delta: u8) {
        debug_assert!(delta > 0);
        let mut zero_count = 0;
        for byte in self.fields.iter_mut() {
            let low = (*byte & 0x0F).saturating_sub(delta);
            let high = (*byte >> 4).saturating_sub(delta);
            *byte = (high << 4) | low;
            zero_count += u32::from(low == 0) + u32::from(high == 0);
        }
        self.zero_count = zero_count;
    }
}

#[cfg(test)]
mod tests {
    use crate::hll::registers::{RegisterArray, inv_pow2};

    #[test]
    fn test_get_set_packing() {
        let mut regs = RegisterArray::new(16);
        regs.set(0, 5);
        regs.set(1, 9);
        regs.set(15, 15);
        assert_eq!(regs.get(0), 5);
        assert_eq!(regs.get(1), 9);
        assert_eq!(regs.get(15), 15);
        assert_eq!(regs.get(2), 0);
        // Even and odd slots share a byte.
        assert_eq!(regs.as_bytes()[0], (9 << 4) | 5);
    }

    #[test]
    fn test_zero_count_tracking() {
        let mut regs = RegisterArray::new(8);
        assert_eq!(regs.zeros(), 8);
        regs.set(3, 7);
        assert_eq!(regs.zeros(), 7);
        regs.set(3, 2);
        assert_eq!(regs.zeros(), 7);
        regs.set(3, 0);
        assert_eq!(regs.zeros(), 8);
    }

    #[test]
    fn test_min_value_short_circuits_on_zero() {
        let mut regs = RegisterArray::new(4);
        regs.set(0, 3);
        regs.set(1, 4);
        regs.set(2, 5);
        assert_eq!(regs.min_value(), 0);
        regs.set(3, 6);
        assert_eq!(regs.min_value(), 3);
    }

    #[test]
    fn test_rebase_shifts_and_recounts() {
        let mut regs = RegisterArray::new(4);
        regs.set(0, 3);
        regs.set(1, 3);
        regs.set(2, 7);
        regs.set(3, 15);
        regs.rebase(3);
        assert_eq!(regs.get(0), 0);
        assert_eq!(regs.get(1), 0);
        assert_eq!(regs.get(2), 4);
        assert_eq!(regs.get(3), 12);
        assert_eq!(regs.zeros(), 2);
        assert_eq!(regs.min_value(), 0);
    }

    #[test]
    fn test_sum_with_base() {
        let mut regs = RegisterArray::new(2);
        regs.set(0, 1);
        // Registers hold 1 and 0; with base 2 that is 2^-3 + 2^-2.
        assert_eq!(regs.sum(2), 0.125 + 0.25);
        assert_eq!(regs.sum(0), 0.5 + 1.0);
    }

    #[test]
    fn test_from_bytes_recounts_zeros() {
        let regs = RegisterArray::from_bytes(vec![0x50, 0x00, 0x0F]);
        assert_eq!(regs.get(1), 5);
        assert_eq!(regs.get(4), 15);
        assert_eq!(regs.zeros(), 4);
    }

    #[test]
    fn test_inv_pow2() {
        assert_eq!(inv_pow2(0), 1.0);
        assert_eq!(inv_pow2(4), 0.0625);
        assert_eq!(inv_pow2(270), 2.0f64.powi(-270));
    }
}
