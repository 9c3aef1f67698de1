//! Kernel handles and argument descriptors.

use std::ffi::CString;
use std::marker::PhantomData;
use std::mem;
use std::ptr;

use libc::{c_void, size_t};

use crate::error::{eval_errcode, Error, Result};
use crate::ffi;
use crate::memory::Memory;
use crate::program::Program;
use crate::Context;

/// Per-device kernel compilation facts (`CL_KERNEL_*` work-group queries).
#[derive(Clone, Copy, Debug, Default)]
pub struct KernelInfo {
    /// Largest work-group this kernel can be dispatched with.
    pub work_group: usize,
    /// The `reqd_work_group_size` attribute, or zeros.
    pub compile_work_group: [usize; 3],
    pub local_memory: u64,
    pub preferred_work_group_multiple: usize,
    pub private_memory: u64,
}

/// An executable entry point, created from a [`Program`] by name.
///
/// The runtime retains the program internally, so a `Kernel` may outlive the
/// `Program` value it was created from.
#[derive(Debug)]
pub struct Kernel<'c> {
    ctx: &'c Context,
    raw: ffi::cl_kernel,
    name: String,
}

impl<'c> Kernel<'c> {
    /// Creates the kernel named `name` from `program`.
    pub fn new(program: &Program<'c>, name: &str) -> Result<Kernel<'c>> {
        let ctx = program.context();
        let c_name = CString::new(name).map_err(|_| {
            Error::from("kernel name contains an interior NUL byte")
        })?;
        let mut errcode: ffi::cl_int = 0;
        let raw = unsafe {
            (ctx.lib().clCreateKernel)(program.raw(), c_name.as_ptr(), &mut errcode)
        };
        eval_errcode(errcode, (), "clCreateKernel")?;
        Ok(Kernel { ctx, raw, name: String::from(name) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queries the kernel's work-group facts for its context's device.
    pub fn info(&self) -> Result<KernelInfo> {
        let work_group: size_t = self.wg_info(ffi::CL_KERNEL_WORK_GROUP_SIZE)?;
        let compile_work_group: [size_t; 3] =
            self.wg_info(ffi::CL_KERNEL_COMPILE_WORK_GROUP_SIZE)?;
        let local_memory: u64 = self.wg_info(ffi::CL_KERNEL_LOCAL_MEM_SIZE)?;
        let preferred: size_t =
            self.wg_info(ffi::CL_KERNEL_PREFERRED_WORK_GROUP_SIZE_MULTIPLE)?;
        let private_memory: u64 = self.wg_info(ffi::CL_KERNEL_PRIVATE_MEM_SIZE)?;
        Ok(KernelInfo {
            work_group: work_group as usize,
            compile_work_group: [
                compile_work_group[0] as usize,
                compile_work_group[1] as usize,
                compile_work_group[2] as usize,
            ],
            local_memory,
            preferred_work_group_multiple: preferred as usize,
            private_memory,
        })
    }

    fn wg_info<T: Copy + Default>(&self, param: ffi::cl_uint) -> Result<T> {
        let mut value = T::default();
        let errcode = unsafe {
            (self.ctx.lib().clGetKernelWorkGroupInfo)(self.raw,
                self.ctx.device().id, param, mem::size_of::<T>() as size_t,
                &mut value as *mut T as *mut c_void, ptr::null_mut())
        };
        eval_errcode(errcode, value, "clGetKernelWorkGroupInfo")
    }

    pub(crate) fn raw(&self) -> ffi::cl_kernel {
        self.raw
    }
}

impl<'c> Drop for Kernel<'c> {
    fn drop(&mut self) {
        let errcode = unsafe { (self.ctx.lib().clReleaseKernel)(self.raw) };
        if errcode != ffi::CL_SUCCESS {
            log::error!("clReleaseKernel({}): {}", self.name,
                crate::error::error_string(errcode));
        }
    }
}

/// One kernel argument: a pointer to the value plus its size, bound by index
/// at enqueue time.
#[derive(Clone, Copy, Debug)]
pub struct ArgVal<'a> {
    size: usize,
    value: *const c_void,
    _marker: PhantomData<&'a ()>,
}

impl<'a> ArgVal<'a> {
    /// A buffer argument (the kernel sees the device pointer).
    pub fn mem(mem: &'a Memory) -> ArgVal<'a> {
        ArgVal {
            size: mem::size_of::<ffi::cl_mem>(),
            value: mem.raw_ref() as *const ffi::cl_mem as *const c_void,
            _marker: PhantomData,
        }
    }

    /// A scalar argument passed by value.
    pub fn scalar<T: Copy>(value: &'a T) -> ArgVal<'a> {
        ArgVal {
            size: mem::size_of::<T>(),
            value: value as *const T as *const c_void,
            _marker: PhantomData,
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn value(&self) -> *const c_void {
        self.value
    }
}
