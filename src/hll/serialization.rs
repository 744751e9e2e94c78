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

//! Wire format.
//!
//! Header: version (1 byte), precision, bias base, representation tag
//! (1 = sparse, 0 = dense). Sparse payload: accumulator entry count and the
//! entries as big-endian u32 (written ascending, accepted in any order),
//! then the compressed list as entry count, byte length and the raw varint
//! stream. Dense payload: the packed register byte length followed by the
//! raw bytes. All integers are big-endian.
//!
//! Deserialization validates everything before a sketch is constructed; a
//! failure never yields a half-built sketch. The hash function is not part
//! of the format and is supplied by the caller on the way back in.

use std::collections::HashSet;

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::error::Error;
use crate::hll::estimation::alpha;
use crate::hll::registers::RegisterArray;
use crate::hll::sketch::{Representation, Sketch, SparseState};
use crate::hll::sparse::CompressedList;
use crate::hll::{HashFn, MAX_PRECISION, MIN_PRECISION, PP};

const SERIAL_VERSION: u8 = 1;
const REPR_DENSE: u8 = 0;
const REPR_SPARSE: u8 = 1;

pub(crate) fn serialize(sketch: &Sketch) -> Vec<u8> {
    match &sketch.repr {
        Representation::Sparse(state) => {
            let list_bytes = state.list.as_bytes();
            let mut out =
                SketchBytes::with_capacity(16 + state.accumulator.len() * 4 + list_bytes.len());
            write_header(&mut out, sketch, REPR_SPARSE);

            // Ascending order so equal sketches serialize to equal bytes.
            let mut entries: Vec<u32> = state.accumulator.iter().copied().collect();
            entries.sort_unstable();
            out.write_u32_be(entries.len() as u32);
            for entry in entries {
                out.write_u32_be(entry);
            }

            out.write_u32_be(state.list.len());
            out.write_u32_be(list_bytes.len() as u32);
            out.write(list_bytes);
            out.into_bytes()
        }
        Representation::Dense(regs) => {
            let bytes = regs.as_bytes();
            let mut out = SketchBytes::with_capacity(8 + bytes.len());
            write_header(&mut out, sketch, REPR_DENSE);
            out.write_u32_be(bytes.len() as u32);
            out.write(bytes);
            out.into_bytes()
        }
    }
}

fn write_header(out: &mut SketchBytes, sketch: &Sketch, repr: u8) {
    out.write_u8(SERIAL_VERSION);
    out.write_u8(sketch.p);
    out.write_u8(sketch.b);
    out.write_u8(repr);
}

pub(crate) fn deserialize(bytes: &[u8], hash: HashFn) -> Result<Sketch, Error> {
    let mut input = SketchSlice::new(bytes);

    let version = input
        .read_u8()
        .map_err(|_| Error::insufficient_data("version"))?;
    if version != SERIAL_VERSION {
        return Err(
            Error::deserial("unsupported serialization version").with_context("version", version)
        );
    }

    let p = input
        .read_u8()
        .map_err(|_| Error::insufficient_data("precision"))?;
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&p) {
        return Err(Error::deserial("precision out of range").with_context("precision", p));
    }
    let m = 1u32 << p;

    let b = input
        .read_u8()
        .map_err(|_| Error::insufficient_data("bias base"))?;
    let tag = input
        .read_u8()
        .map_err(|_| Error::insufficient_data("representation tag"))?;

    let repr = match tag {
        REPR_SPARSE => {
            let count = input
                .read_u32_be()
                .map_err(|_| Error::insufficient_data("accumulator count"))?;
            if u64::from(count) * 4 > input.remaining() as u64 {
                return Err(Error::deserial("accumulator count exceeds available data")
                    .with_context("count", count));
            }
            let mut accumulator = HashSet::with_capacity(count as usize);
            for _ in 0..count {
                accumulator.insert(
                    input
                        .read_u32_be()
                        .map_err(|_| Error::insufficient_data("accumulator entry"))?,
                );
            }

            let list_count = input
                .read_u32_be()
                .map_err(|_| Error::insufficient_data("list count"))?;
            // Folding through estimate() can leave the list slightly past the
            // promotion threshold while the sketch stays sparse, so the only
            // hard bound on the count is the fine bucket space itself.
            if list_count >= 1 << PP {
                return Err(Error::deserial("compressed list count exceeds sparse entry space")
                    .with_context("count", list_count));
            }
            let byte_len = input
                .read_u32_be()
                .map_err(|_| Error::insufficient_data("list byte length"))?
                as usize;
            if byte_len > input.remaining() {
                return Err(Error::insufficient_data("list bytes"));
            }
            let mut list_bytes = vec![0u8; byte_len];
            input
                .read_exact(&mut list_bytes)
                .map_err(|_| Error::insufficient_data("list bytes"))?;
            let list = CompressedList::from_parts(list_count, list_bytes)?;
            Representation::Sparse(SparseState { accumulator, list })
        }
        REPR_DENSE => {
            let byte_len = input
                .read_u32_be()
                .map_err(|_| Error::insufficient_data("register length"))?;
            if byte_len != m / 2 {
                return Err(Error::deserial("dense register payload has the wrong length")
                    .with_context("expected", m / 2)
                    .with_context("actual", byte_len));
            }
            let mut fields = vec![0u8; byte_len as usize];
            input
                .read_exact(&mut fields)
                .map_err(|_| Error::insufficient_data("registers"))?;
            Representation::Dense(RegisterArray::from_bytes(fields))
        }
        _ => {
            return Err(Error::deserial("invalid representation tag").with_context("tag", tag));
        }
    };

    Ok(Sketch {
        p,
        m,
        b,
        alpha: alpha(m),
        hash,
        repr,
    })
}
