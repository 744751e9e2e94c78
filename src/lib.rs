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

//! Approximate distinct counting with a HyperLogLog sketch.
//!
//! A [`Sketch`] estimates the number of distinct items fed to it while using
//! a fixed, small amount of memory. Small cardinalities are tracked in a
//! compressed sparse representation; once that outgrows the dense register
//! array the sketch promotes itself and stays dense for the rest of its life.
//!
//! # Examples
//!
//! ```
//! use tailcut::Sketch;
//!
//! let mut sketch = Sketch::new(14)?;
//! sketch.insert(b"apple");
//! sketch.insert(b"banana");
//! sketch.insert(b"apple");
//! assert_eq!(sketch.estimate(), 2);
//! # Ok::<(), tailcut::Error>(())
//! ```

mod codec;
pub mod error;
pub mod hll;

pub use error::Error;
pub use error::ErrorKind;
pub use hll::HashFn;
pub use hll::Sketch;
