//! Device buffers and blocking host mappings.
//!
//! Every buffer is allocated with `CL_MEM_ALLOC_HOST_PTR` so a blocking map
//! is a zero-copy pin, not a transfer. A live [`MemMap`] holds the `&mut
//! Memory`, so a mapped buffer cannot be handed to a kernel: the unmap-
//! before-enqueue rule is enforced by the borrow checker rather than by a
//! runtime flag.

use std::mem;
use std::ptr;
use std::slice;

use libc::{c_void, size_t};

use crate::error::{eval_errcode, Result};
use crate::ffi;
use crate::Context;

bitflags! {
    /// Buffer access flags; bit values match `cl_mem_flags`.
    pub struct MemFlags: u64 {
        const READ_WRITE = ffi::CL_MEM_READ_WRITE;
        const WRITE_ONLY = ffi::CL_MEM_WRITE_ONLY;
        const READ_ONLY = ffi::CL_MEM_READ_ONLY;
        const ALLOC_HOST_PTR = ffi::CL_MEM_ALLOC_HOST_PTR;
    }
}

bitflags! {
    /// Map access flags; bit values match `cl_map_flags`.
    ///
    /// `WRITE_INVALIDATE` tells the runtime the mapped region's previous
    /// contents are dead, enabling a pure producer path.
    pub struct MapFlags: u64 {
        const READ = ffi::CL_MAP_READ;
        const WRITE = ffi::CL_MAP_WRITE;
        const WRITE_INVALIDATE = ffi::CL_MAP_WRITE_INVALIDATE_REGION;
    }
}

/// An owning handle to one device buffer, bound to its context.
#[derive(Debug)]
pub struct Memory<'c> {
    ctx: &'c Context,
    raw: ffi::cl_mem,
    bytes: usize,
}

impl<'c> Memory<'c> {
    /// Allocates a pinned, host-mappable buffer of `bytes` bytes.
    ///
    /// `CL_MEM_ALLOC_HOST_PTR` is always added to `flags`.
    pub fn alloc(ctx: &'c Context, flags: MemFlags, bytes: usize) -> Result<Memory<'c>> {
        let mut errcode: ffi::cl_int = 0;
        let raw = unsafe {
            (ctx.lib().clCreateBuffer)(ctx.raw(),
                flags.bits() | ffi::CL_MEM_ALLOC_HOST_PTR, bytes as size_t,
                ptr::null_mut(), &mut errcode)
        };
        eval_errcode(errcode, (), "clCreateBuffer")?;
        log::trace!("allocated {} bytes ({:?})", bytes, flags);
        Ok(Memory { ctx, raw, bytes })
    }

    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// The context this buffer was allocated against.
    pub fn context(&self) -> &'c Context {
        self.ctx
    }

    /// Maps `bytes` bytes at `offset` into host memory, blocking until the
    /// region is coherent.
    ///
    /// The returned guard unmaps on drop; while it lives the buffer is
    /// mutably borrowed and cannot be passed to [`Context::enqueue_range_1d`].
    pub fn map(&mut self, flags: MapFlags, offset: usize, bytes: usize)
            -> Result<MemMap<'_>> {
        assert!(offset + bytes <= self.bytes,
            "map of {} bytes at {} exceeds buffer length {}", bytes, offset,
            self.bytes);
        let mut errcode: ffi::cl_int = 0;
        let ptr = unsafe {
            (self.ctx.lib().clEnqueueMapBuffer)(self.ctx.queue(), self.raw,
                ffi::CL_TRUE, flags.bits(), offset as size_t, bytes as size_t,
                0, ptr::null(), ptr::null_mut(), &mut errcode)
        };
        eval_errcode(errcode, (), "clEnqueueMapBuffer")?;
        log::trace!("mapped {} bytes at {} ({:?})", bytes, offset, flags);
        Ok(MemMap {
            queue: self.ctx.queue(),
            mem: self.raw,
            ptr,
            bytes,
            ctx: self.ctx,
        })
    }

    pub(crate) fn raw(&self) -> ffi::cl_mem {
        self.raw
    }

    /// Address of the raw handle, for binding as a kernel argument.
    pub(crate) fn raw_ref(&self) -> &ffi::cl_mem {
        &self.raw
    }
}

impl<'c> Drop for Memory<'c> {
    fn drop(&mut self) {
        let errcode = unsafe { (self.ctx.lib().clReleaseMemObject)(self.raw) };
        if errcode != ffi::CL_SUCCESS {
            log::error!("clReleaseMemObject: {}",
                crate::error::error_string(errcode));
        }
    }
}

/// A mapped region of a [`Memory`] buffer; unmaps when dropped.
///
/// Holds the mutable borrow of its parent buffer for its whole life.
#[derive(Debug)]
pub struct MemMap<'m> {
    queue: ffi::cl_command_queue,
    mem: ffi::cl_mem,
    ptr: *mut c_void,
    bytes: usize,
    ctx: &'m Context,
}

impl<'m> MemMap<'m> {
    /// Views the region as a slice of `T`.
    ///
    /// The region length must be a whole number of `T`s and the mapping must
    /// be suitably aligned (it is: pinned allocations are at least 8-byte
    /// aligned).
    pub fn as_slice<T: Copy>(&self) -> &[T] {
        self.check_layout::<T>();
        unsafe {
            slice::from_raw_parts(self.ptr as *const T, self.bytes / mem::size_of::<T>())
        }
    }

    /// Views the region as a mutable slice of `T`.
    pub fn as_slice_mut<T: Copy>(&mut self) -> &mut [T] {
        self.check_layout::<T>();
        unsafe {
            slice::from_raw_parts_mut(self.ptr as *mut T, self.bytes / mem::size_of::<T>())
        }
    }

    /// Region length in bytes.
    pub fn len(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// Unmaps now instead of at end of scope.
    pub fn unmap(self) {}

    fn check_layout<T>(&self) {
        assert!(self.bytes % mem::size_of::<T>() == 0,
            "mapped length {} is not a whole number of elements of size {}",
            self.bytes, mem::size_of::<T>());
        assert!(self.ptr as usize % mem::align_of::<T>() == 0,
            "mapped pointer is unaligned for the element type");
    }
}

impl<'m> Drop for MemMap<'m> {
    fn drop(&mut self) {
        let errcode = unsafe {
            (self.ctx.lib().clEnqueueUnmapMemObject)(self.queue, self.mem,
                self.ptr, 0, ptr::null(), ptr::null_mut())
        };
        if errcode != ffi::CL_SUCCESS {
            log::error!("clEnqueueUnmapMemObject: {}",
                crate::error::error_string(errcode));
        }
    }
}
