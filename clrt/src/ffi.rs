//! Raw OpenCL ABI: scalar typedefs, the constants this crate consumes, and a
//! function table resolved from the platform runtime library at first use.
//!
//! Types and constants follow
//! [KhronosGroup/OpenCL-Headers/CL/cl.h](https://github.com/KhronosGroup/OpenCL-Headers/blob/master/CL/cl.h).
//! Nothing here links against the runtime; a machine without an OpenCL
//! driver fails at [`Lib::load`] with a recoverable error, not at load time.

#![allow(non_camel_case_types, non_snake_case)]

use libc::{c_char, c_void, size_t};
use libloading::Library;

use crate::error::{Error, ErrorKind, Result};

pub type cl_platform_id   = *mut c_void;
pub type cl_device_id     = *mut c_void;
pub type cl_context       = *mut c_void;
pub type cl_command_queue = *mut c_void;
pub type cl_mem           = *mut c_void;
pub type cl_program       = *mut c_void;
pub type cl_kernel        = *mut c_void;
pub type cl_event         = *mut c_void;

pub type cl_int      = i32;
pub type cl_uint     = u32;
pub type cl_ulong    = u64;
pub type cl_bool     = cl_uint;
pub type cl_bitfield = cl_ulong;

pub type cl_device_type              = cl_bitfield;
pub type cl_device_info              = cl_uint;
pub type cl_device_fp_config         = cl_bitfield;
pub type cl_command_queue_properties = cl_bitfield;
pub type cl_queue_properties         = cl_bitfield;
pub type cl_context_properties       = libc::intptr_t;
pub type cl_mem_flags                = cl_bitfield;
pub type cl_map_flags                = cl_bitfield;
pub type cl_program_build_info       = cl_uint;
pub type cl_profiling_info           = cl_uint;

pub const CL_SUCCESS: cl_int = 0;

pub const CL_FALSE: cl_bool = 0;
pub const CL_TRUE:  cl_bool = 1;

// cl_device_type
pub const CL_DEVICE_TYPE_ALL: cl_device_type = 0xFFFF_FFFF;

// cl_device_info
pub const CL_DEVICE_MAX_COMPUTE_UNITS:        cl_device_info = 0x1002;
pub const CL_DEVICE_MAX_WORK_ITEM_DIMENSIONS: cl_device_info = 0x1003;
pub const CL_DEVICE_MAX_WORK_GROUP_SIZE:      cl_device_info = 0x1004;
pub const CL_DEVICE_MAX_WORK_ITEM_SIZES:      cl_device_info = 0x1005;
pub const CL_DEVICE_MAX_CLOCK_FREQUENCY:      cl_device_info = 0x100C;
pub const CL_DEVICE_SINGLE_FP_CONFIG:         cl_device_info = 0x101B;
pub const CL_DEVICE_GLOBAL_MEM_SIZE:          cl_device_info = 0x101F;
pub const CL_DEVICE_LOCAL_MEM_SIZE:           cl_device_info = 0x1023;
pub const CL_DEVICE_NAME:                     cl_device_info = 0x102B;
pub const CL_DEVICE_VENDOR:                   cl_device_info = 0x102C;
pub const CL_DEVICE_VERSION:                  cl_device_info = 0x102F;
pub const CL_DEVICE_DOUBLE_FP_CONFIG:         cl_device_info = 0x1032;
// 0x1033 is CL_DEVICE_HALF_FP_CONFIG, hosted in cl_ext.h by Khronos.
pub const CL_DEVICE_HALF_FP_CONFIG:           cl_device_info = 0x1033;
pub const CL_DEVICE_OPENCL_C_VERSION:         cl_device_info = 0x103D;

// cl_device_fp_config
pub const CL_FP_DENORM:                        cl_bitfield = 1 << 0;
pub const CL_FP_INF_NAN:                       cl_bitfield = 1 << 1;
pub const CL_FP_ROUND_TO_NEAREST:              cl_bitfield = 1 << 2;
pub const CL_FP_ROUND_TO_ZERO:                 cl_bitfield = 1 << 3;
pub const CL_FP_ROUND_TO_INF:                  cl_bitfield = 1 << 4;
pub const CL_FP_FMA:                           cl_bitfield = 1 << 5;
pub const CL_FP_SOFT_FLOAT:                    cl_bitfield = 1 << 6;
pub const CL_FP_CORRECTLY_ROUNDED_DIVIDE_SQRT: cl_bitfield = 1 << 7;

// cl_command_queue_properties
pub const CL_QUEUE_PROFILING_ENABLE: cl_bitfield = 1 << 1;
// cl_queue_properties key for ::clCreateCommandQueueWithProperties.
pub const CL_QUEUE_PROPERTIES: cl_uint = 0x1093;

// cl_context_properties
pub const CL_CONTEXT_PLATFORM: cl_uint = 0x1084;

// cl_mem_flags
pub const CL_MEM_READ_WRITE:     cl_bitfield = 1 << 0;
pub const CL_MEM_WRITE_ONLY:     cl_bitfield = 1 << 1;
pub const CL_MEM_READ_ONLY:      cl_bitfield = 1 << 2;
pub const CL_MEM_ALLOC_HOST_PTR: cl_bitfield = 1 << 4;

// cl_map_flags
pub const CL_MAP_READ:                    cl_bitfield = 1 << 0;
pub const CL_MAP_WRITE:                   cl_bitfield = 1 << 1;
pub const CL_MAP_WRITE_INVALIDATE_REGION: cl_bitfield = 1 << 2;

// cl_program_build_info
pub const CL_PROGRAM_BUILD_LOG: cl_program_build_info = 0x1183;

// cl_kernel_work_group_info
pub const CL_KERNEL_WORK_GROUP_SIZE:                    cl_uint = 0x11B0;
pub const CL_KERNEL_COMPILE_WORK_GROUP_SIZE:            cl_uint = 0x11B1;
pub const CL_KERNEL_LOCAL_MEM_SIZE:                     cl_uint = 0x11B2;
pub const CL_KERNEL_PREFERRED_WORK_GROUP_SIZE_MULTIPLE: cl_uint = 0x11B3;
pub const CL_KERNEL_PRIVATE_MEM_SIZE:                   cl_uint = 0x11B4;

// cl_profiling_info
pub const CL_PROFILING_COMMAND_QUEUED: cl_profiling_info = 0x1280;
pub const CL_PROFILING_COMMAND_SUBMIT: cl_profiling_info = 0x1281;
pub const CL_PROFILING_COMMAND_START:  cl_profiling_info = 0x1282;
pub const CL_PROFILING_COMMAND_END:    cl_profiling_info = 0x1283;

pub type CreateContextNotifyFn =
    extern "C" fn(*const c_char, *const c_void, size_t, *mut c_void);
pub type BuildProgramNotifyFn = extern "C" fn(cl_program, *mut c_void);

type FnGetPlatformIDs =
    unsafe extern "C" fn(cl_uint, *mut cl_platform_id, *mut cl_uint) -> cl_int;
type FnGetDeviceIDs = unsafe extern "C" fn(cl_platform_id, cl_device_type, cl_uint,
    *mut cl_device_id, *mut cl_uint) -> cl_int;
type FnGetDeviceInfo = unsafe extern "C" fn(cl_device_id, cl_device_info, size_t,
    *mut c_void, *mut size_t) -> cl_int;
type FnCreateContext = unsafe extern "C" fn(*const cl_context_properties, cl_uint,
    *const cl_device_id, Option<CreateContextNotifyFn>, *mut c_void,
    *mut cl_int) -> cl_context;
type FnReleaseContext = unsafe extern "C" fn(cl_context) -> cl_int;
type FnCreateCommandQueue = unsafe extern "C" fn(cl_context, cl_device_id,
    cl_command_queue_properties, *mut cl_int) -> cl_command_queue;
type FnCreateCommandQueueWithProperties = unsafe extern "C" fn(cl_context,
    cl_device_id, *const cl_queue_properties, *mut cl_int) -> cl_command_queue;
type FnReleaseCommandQueue = unsafe extern "C" fn(cl_command_queue) -> cl_int;
type FnCreateBuffer = unsafe extern "C" fn(cl_context, cl_mem_flags, size_t,
    *mut c_void, *mut cl_int) -> cl_mem;
type FnReleaseMemObject = unsafe extern "C" fn(cl_mem) -> cl_int;
type FnEnqueueMapBuffer = unsafe extern "C" fn(cl_command_queue, cl_mem, cl_bool,
    cl_map_flags, size_t, size_t, cl_uint, *const cl_event, *mut cl_event,
    *mut cl_int) -> *mut c_void;
type FnEnqueueUnmapMemObject = unsafe extern "C" fn(cl_command_queue, cl_mem,
    *mut c_void, cl_uint, *const cl_event, *mut cl_event) -> cl_int;
type FnCreateProgramWithSource = unsafe extern "C" fn(cl_context, cl_uint,
    *const *const c_char, *const size_t, *mut cl_int) -> cl_program;
type FnBuildProgram = unsafe extern "C" fn(cl_program, cl_uint, *const cl_device_id,
    *const c_char, Option<BuildProgramNotifyFn>, *mut c_void) -> cl_int;
type FnGetProgramBuildInfo = unsafe extern "C" fn(cl_program, cl_device_id,
    cl_program_build_info, size_t, *mut c_void, *mut size_t) -> cl_int;
type FnReleaseProgram = unsafe extern "C" fn(cl_program) -> cl_int;
type FnCreateKernel =
    unsafe extern "C" fn(cl_program, *const c_char, *mut cl_int) -> cl_kernel;
type FnGetKernelWorkGroupInfo = unsafe extern "C" fn(cl_kernel, cl_device_id,
    cl_uint, size_t, *mut c_void, *mut size_t) -> cl_int;
type FnSetKernelArg =
    unsafe extern "C" fn(cl_kernel, cl_uint, size_t, *const c_void) -> cl_int;
type FnReleaseKernel = unsafe extern "C" fn(cl_kernel) -> cl_int;
type FnEnqueueNDRangeKernel = unsafe extern "C" fn(cl_command_queue, cl_kernel,
    cl_uint, *const size_t, *const size_t, *const size_t, cl_uint,
    *const cl_event, *mut cl_event) -> cl_int;
type FnWaitForEvents = unsafe extern "C" fn(cl_uint, *const cl_event) -> cl_int;
type FnGetEventProfilingInfo = unsafe extern "C" fn(cl_event, cl_profiling_info,
    size_t, *mut c_void, *mut size_t) -> cl_int;
type FnReleaseEvent = unsafe extern "C" fn(cl_event) -> cl_int;
type FnFlush = unsafe extern "C" fn(cl_command_queue) -> cl_int;
type FnFinish = unsafe extern "C" fn(cl_command_queue) -> cl_int;

/// The subset of the OpenCL entry points this crate calls, bound from the
/// platform runtime library.
///
/// `clCreateCommandQueueWithProperties` is a 2.0 entry point and may be
/// absent on 1.x runtimes; queue creation falls back to the 1.x call.
pub struct Lib {
    // Keeps the loaded library (and therefore every resolved pointer) alive.
    _lib: Library,
    pub clGetPlatformIDs: FnGetPlatformIDs,
    pub clGetDeviceIDs: FnGetDeviceIDs,
    pub clGetDeviceInfo: FnGetDeviceInfo,
    pub clCreateContext: FnCreateContext,
    pub clReleaseContext: FnReleaseContext,
    pub clCreateCommandQueue: FnCreateCommandQueue,
    pub clCreateCommandQueueWithProperties: Option<FnCreateCommandQueueWithProperties>,
    pub clReleaseCommandQueue: FnReleaseCommandQueue,
    pub clCreateBuffer: FnCreateBuffer,
    pub clReleaseMemObject: FnReleaseMemObject,
    pub clEnqueueMapBuffer: FnEnqueueMapBuffer,
    pub clEnqueueUnmapMemObject: FnEnqueueUnmapMemObject,
    pub clCreateProgramWithSource: FnCreateProgramWithSource,
    pub clBuildProgram: FnBuildProgram,
    pub clGetProgramBuildInfo: FnGetProgramBuildInfo,
    pub clReleaseProgram: FnReleaseProgram,
    pub clCreateKernel: FnCreateKernel,
    pub clGetKernelWorkGroupInfo: FnGetKernelWorkGroupInfo,
    pub clSetKernelArg: FnSetKernelArg,
    pub clReleaseKernel: FnReleaseKernel,
    pub clEnqueueNDRangeKernel: FnEnqueueNDRangeKernel,
    pub clWaitForEvents: FnWaitForEvents,
    pub clGetEventProfilingInfo: FnGetEventProfilingInfo,
    pub clReleaseEvent: FnReleaseEvent,
    pub clFlush: FnFlush,
    pub clFinish: FnFinish,
}

#[cfg(target_os = "windows")]
const LIBRARY_CANDIDATES: &[&str] = &["OpenCL.dll"];
#[cfg(target_os = "macos")]
const LIBRARY_CANDIDATES: &[&str] =
    &["/System/Library/Frameworks/OpenCL.framework/OpenCL"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIBRARY_CANDIDATES: &[&str] = &["libOpenCL.so.1", "libOpenCL.so"];

fn open_library() -> Result<Library> {
    let mut last_err = String::new();
    for name in LIBRARY_CANDIDATES {
        match unsafe { Library::new(name) } {
            Ok(lib) => {
                log::debug!("loaded OpenCL runtime from {:?}", name);
                return Ok(lib);
            }
            Err(err) => last_err = format!("{}: {}", name, err),
        }
    }
    Err(Error::from(ErrorKind::Load(last_err)))
}

fn sym<T: Copy + 'static>(lib: &Library, name: &'static str) -> Result<T> {
    let symbol: libloading::Symbol<T> = unsafe { lib.get(name.as_bytes()) }
        .map_err(|_| Error::from(ErrorKind::Symbol(name.trim_end_matches('\0'))))?;
    Ok(*symbol)
}

fn sym_opt<T: Copy + 'static>(lib: &Library, name: &'static str) -> Option<T> {
    let bytes = name.as_bytes();
    unsafe { lib.get::<T>(bytes) }.ok().map(|s| *s)
}

impl Lib {
    /// Opens the platform runtime library and resolves every entry point.
    pub fn load() -> Result<Lib> {
        let lib = open_library()?;
        let clGetPlatformIDs = sym(&lib, "clGetPlatformIDs\0")?;
        let clGetDeviceIDs = sym(&lib, "clGetDeviceIDs\0")?;
        let clGetDeviceInfo = sym(&lib, "clGetDeviceInfo\0")?;
        let clCreateContext = sym(&lib, "clCreateContext\0")?;
        let clReleaseContext = sym(&lib, "clReleaseContext\0")?;
        let clCreateCommandQueue = sym(&lib, "clCreateCommandQueue\0")?;
        let clCreateCommandQueueWithProperties =
            sym_opt(&lib, "clCreateCommandQueueWithProperties\0");
        let clReleaseCommandQueue = sym(&lib, "clReleaseCommandQueue\0")?;
        let clCreateBuffer = sym(&lib, "clCreateBuffer\0")?;
        let clReleaseMemObject = sym(&lib, "clReleaseMemObject\0")?;
        let clEnqueueMapBuffer = sym(&lib, "clEnqueueMapBuffer\0")?;
        let clEnqueueUnmapMemObject = sym(&lib, "clEnqueueUnmapMemObject\0")?;
        let clCreateProgramWithSource = sym(&lib, "clCreateProgramWithSource\0")?;
        let clBuildProgram = sym(&lib, "clBuildProgram\0")?;
        let clGetProgramBuildInfo = sym(&lib, "clGetProgramBuildInfo\0")?;
        let clReleaseProgram = sym(&lib, "clReleaseProgram\0")?;
        let clCreateKernel = sym(&lib, "clCreateKernel\0")?;
        let clGetKernelWorkGroupInfo = sym(&lib, "clGetKernelWorkGroupInfo\0")?;
        let clSetKernelArg = sym(&lib, "clSetKernelArg\0")?;
        let clReleaseKernel = sym(&lib, "clReleaseKernel\0")?;
        let clEnqueueNDRangeKernel = sym(&lib, "clEnqueueNDRangeKernel\0")?;
        let clWaitForEvents = sym(&lib, "clWaitForEvents\0")?;
        let clGetEventProfilingInfo = sym(&lib, "clGetEventProfilingInfo\0")?;
        let clReleaseEvent = sym(&lib, "clReleaseEvent\0")?;
        let clFlush = sym(&lib, "clFlush\0")?;
        let clFinish = sym(&lib, "clFinish\0")?;
        Ok(Lib {
            _lib: lib,
            clGetPlatformIDs,
            clGetDeviceIDs,
            clGetDeviceInfo,
            clCreateContext,
            clReleaseContext,
            clCreateCommandQueue,
            clCreateCommandQueueWithProperties,
            clReleaseCommandQueue,
            clCreateBuffer,
            clReleaseMemObject,
            clEnqueueMapBuffer,
            clEnqueueUnmapMemObject,
            clCreateProgramWithSource,
            clBuildProgram,
            clGetProgramBuildInfo,
            clReleaseProgram,
            clCreateKernel,
            clGetKernelWorkGroupInfo,
            clSetKernelArg,
            clReleaseKernel,
            clEnqueueNDRangeKernel,
            clWaitForEvents,
            clGetEventProfilingInfo,
            clReleaseEvent,
            clFlush,
            clFinish,
        })
    }
}

impl std::fmt::Debug for Lib {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("Lib { .. }")
    }
}
