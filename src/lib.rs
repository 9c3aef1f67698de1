//! GPU BLAS level 1/2 primitives over the [`clrt`] runtime facade.
//!
//! The centerpiece is the strided dot product in three precisions (fp16,
//! fp32, fp64), built from two kernel families: an elementwise multiply and
//! a parity-split pairwise-sum tree. The same machinery carries `sum`, and
//! `gemv` rides the same tiling. Results always accumulate to fp64 on the
//! host.
//!
//! ```no_run
//! use blast::{Blast, Fpp};
//! use clrt::{Context, MapFlags, MemFlags, Memory};
//!
//! # fn main() -> Result<(), failure::Error> {
//! let ctx = Context::open(0, None)?;
//! let blas = Blast::new(&ctx)?;
//! let mut v = Memory::alloc(&ctx, MemFlags::READ_ONLY, 8 * 4)?;
//! {
//!     let mut map = v.map(MapFlags::WRITE_INVALIDATE, 0, 8 * 4)?;
//!     for (i, x) in map.as_slice_mut::<f32>().iter_mut().enumerate() {
//!         *x = i as f32;
//!     }
//! }
//! let norm2 = blas.dot(Fpp::Fp32, &v, 0, 1, &v, 0, 1, 8)?;
//! assert_eq!(norm2, 140.0);
//! # Ok(())
//! # }
//! ```
//!
//! Kernels come from a single source bundle ([`KERNEL_SOURCE`]) compiled
//! once per precision the device supports; precisions the device lacks
//! surface as [`Error::PrecisionNotSupported`], not as build failures.

extern crate failure;

pub extern crate clrt;

mod blas;
mod error;
mod fp16;
mod fpp;
mod kernels;
mod options;
mod reduce;

#[cfg(test)]
mod tests;

pub use crate::blas::{Blast, KERNEL_SOURCE};
pub use crate::error::{Error, Result};
pub use crate::fp16::{Fp16, F16_EPSILON, F16_MAX, F16_MIN, F16_NAN, F16_NINF,
    F16_PINF, F16_TRUE_MIN};
pub use crate::fpp::{kernel_name, Fpp, Mode, Op, OPS, PRECISIONS};
