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

//! Estimator constants and low-range correction terms.

/// Range correction constant for `m` registers.
pub(crate) fn alpha(m: u32) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => {
            let m = f64::from(m);
            0.7213 / (1.0 + 1.079 / m)
        }
    }
}

/// Empirical bias-correction polynomial in the zero-register count.
///
/// Fixed coefficients, fitted once against the tail-cut register encoding.
pub(crate) fn beta(ez: f64) -> f64 {
    let zl = (ez + 1.0).ln();
    -0.370393911 * ez
        + 0.070471823 * zl
        + 0.17393686 * zl.powi(2)
        + 0.16339839 * zl.powi(3)
        - 0.09237745 * zl.powi(4)
        + 0.03738027 * zl.powi(5)
        - 0.005384159 * zl.powi(6)
        + 0.00042419 * zl.powi(7)
}

/// Linear counting estimate over `m` buckets of which `empty` saw nothing.
pub(crate) fn linear_count(m: u32, empty: u32) -> f64 {
    let m = f64::from(m);
    m * (m / f64::from(empty)).ln()
}
