//! Program compilation.

use std::ffi::CString;
use std::ptr;

use libc::{c_char, c_void, size_t};

use crate::error::{eval_errcode, Error, ErrorKind, Result, Status, BUILD_LOG_MAX};
use crate::ffi;
use crate::Context;

/// A compiled program, from which kernels are created by entry name.
#[derive(Debug)]
pub struct Program<'c> {
    ctx: &'c Context,
    raw: ffi::cl_program,
}

impl<'c> Program<'c> {
    /// Compiles `source` for the context's device with the given build
    /// options, synchronously.
    ///
    /// On a build failure the device build log is fetched and attached to
    /// the returned error, truncated to a fixed bound.
    pub fn with_source(ctx: &'c Context, source: &str, options: &str)
            -> Result<Program<'c>> {
        let lib = ctx.lib();
        let src_ptr = source.as_ptr() as *const c_char;
        let src_len = source.len() as size_t;
        let mut errcode: ffi::cl_int = 0;
        let raw = unsafe {
            (lib.clCreateProgramWithSource)(ctx.raw(), 1, &src_ptr, &src_len,
                &mut errcode)
        };
        eval_errcode(errcode, (), "clCreateProgramWithSource")?;
        let program = Program { ctx, raw };

        log::debug!("building program ({} bytes) with: {}", source.len(), options);
        let options = CString::new(options).map_err(|_| {
            Error::from("build options contain an interior NUL byte")
        })?;
        let device = ctx.device().id;
        let errcode = unsafe {
            (lib.clBuildProgram)(raw, 1, &device, options.as_ptr(), None,
                ptr::null_mut())
        };
        if errcode != ffi::CL_SUCCESS {
            let status = Status::from_i32(errcode)
                .unwrap_or(Status::CL_BUILD_PROGRAM_FAILURE);
            let log = program.build_log().unwrap_or_default();
            return Err(Error::from(ErrorKind::Build { status, log }));
        }
        Ok(program)
    }

    /// The build log for the context's device, truncated to a fixed bound.
    pub fn build_log(&self) -> Result<String> {
        let lib = self.ctx.lib();
        let device = self.ctx.device().id;
        let mut size: size_t = 0;
        let errcode = unsafe {
            (lib.clGetProgramBuildInfo)(self.raw, device,
                ffi::CL_PROGRAM_BUILD_LOG, 0, ptr::null_mut(), &mut size)
        };
        eval_errcode(errcode, (), "clGetProgramBuildInfo")?;
        let mut bytes = vec![0u8; size as usize];
        let errcode = unsafe {
            (lib.clGetProgramBuildInfo)(self.raw, device,
                ffi::CL_PROGRAM_BUILD_LOG, size,
                bytes.as_mut_ptr() as *mut c_void, ptr::null_mut())
        };
        eval_errcode(errcode, (), "clGetProgramBuildInfo")?;
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        bytes.truncate(BUILD_LOG_MAX);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub(crate) fn raw(&self) -> ffi::cl_program {
        self.raw
    }

    pub(crate) fn context(&self) -> &'c Context {
        self.ctx
    }
}

impl<'c> Drop for Program<'c> {
    fn drop(&mut self) {
        let errcode = unsafe { (self.ctx.lib().clReleaseProgram)(self.raw) };
        if errcode != ffi::CL_SUCCESS {
            log::error!("clReleaseProgram: {}",
                crate::error::error_string(errcode));
        }
    }
}
