//! A thin, single-device, single-queue OpenCL facade.
//!
//! The runtime library is bound with `dlopen`/`LoadLibrary` semantics at
//! first use rather than linked, so binaries built against this crate run
//! (and fail politely) on machines with no OpenCL driver installed.
//!
//! The surface is deliberately narrow: enumerate devices once, open one
//! [`Context`] (one device, one in-order queue), allocate pinned [`Memory`]
//! buffers, compile a [`Program`] from source, pull [`Kernel`]s out of it,
//! dispatch 1-D NDRanges and observe completion through [`Event`]s with
//! optional [`Profiling`] samples.
//!
//! ## Ordering
//!
//! The queue is in-order: kernels execute in submission order and serialize
//! on their memory dependencies. [`Context::finish`] is the barrier to issue
//! before reading results on the host.
//!
//! ## Ownership
//!
//! Buffers, programs, kernels and events borrow their [`Context`] and
//! release their handle on drop, on every exit path. A mapped buffer is
//! mutably borrowed by its [`MemMap`] guard, so enqueuing a kernel over
//! still-mapped memory is rejected at compile time.

#[macro_use]
extern crate bitflags;

pub mod ffi;

mod context;
mod device;
mod error;
mod kernel;
mod memory;
mod profiling;
mod program;
mod runtime;

#[cfg(test)]
mod tests;

pub use crate::context::{wait, Context, Event};
pub use crate::device::{Device, FpConfig, Version};
pub use crate::error::{error_string, ApiError, Error, ErrorKind, Result, Status};
pub use crate::kernel::{ArgVal, Kernel, KernelInfo};
pub use crate::memory::{MapFlags, MemFlags, MemMap, Memory};
pub use crate::profiling::{fold, Ema, Override, Profiling, SampleStore,
    EMA_SAMPLES_DEFAULT};
pub use crate::program::Program;
pub use crate::runtime::{init, Runtime, DEVICES_MAX};
