//! Device descriptors.
//!
//! One [`Device`] is filled per physical device at [`Runtime::init`] time and
//! never mutated afterwards.
//!
//! [`Runtime::init`]: crate::Runtime::init

use std::fmt;

use libc::{c_void, size_t};

use crate::error::{eval_errcode, Result};
use crate::ffi;

bitflags! {
    /// Floating-point capability bits (`CL_FP_*`), one set per precision.
    ///
    /// An empty set means the precision is not supported at all; devices
    /// without the half-precision extension report an empty fp16 set.
    pub struct FpConfig: u64 {
        const DENORM = ffi::CL_FP_DENORM;
        const INF_NAN = ffi::CL_FP_INF_NAN;
        const ROUND_TO_NEAREST = ffi::CL_FP_ROUND_TO_NEAREST;
        const ROUND_TO_ZERO = ffi::CL_FP_ROUND_TO_ZERO;
        const ROUND_TO_INF = ffi::CL_FP_ROUND_TO_INF;
        const FMA = ffi::CL_FP_FMA;
        const SOFT_FLOAT = ffi::CL_FP_SOFT_FLOAT;
        const CORRECTLY_ROUNDED_DIVIDE_SQRT = ffi::CL_FP_CORRECTLY_ROUNDED_DIVIDE_SQRT;
    }
}

/// A runtime or kernel-language version, `major.minor`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
}

impl Version {
    /// Parses `"<prefix><major>.<minor>[ ...]"`, e.g. `"OpenCL C 1.2 "`.
    pub(crate) fn parse(text: &str, prefix: &str) -> Option<Version> {
        let rest = text.strip_prefix(prefix)?;
        let token = rest.split_whitespace().next()?;
        let mut parts = token.splitn(2, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some(Version { major, minor })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// An immutable descriptor of one compute device.
#[derive(Clone, Debug)]
pub struct Device {
    pub(crate) platform: ffi::cl_platform_id,
    pub(crate) id: ffi::cl_device_id,
    pub name: String,
    pub vendor: String,
    /// Runtime version reported by `CL_DEVICE_VERSION`.
    pub version: Version,
    /// Kernel language version reported by `CL_DEVICE_OPENCL_C_VERSION`.
    pub c_version: Version,
    /// Core clock in MHz.
    pub clock_frequency: u32,
    pub global_memory: u64,
    pub local_memory: u64,
    pub compute_units: u32,
    /// Upper bound on work-groups per 1-D dispatch.
    pub max_groups: usize,
    /// Upper bound on work-items per group, per dimension.
    pub max_items: [usize; 3],
    pub fp32_config: FpConfig,
    pub fp64_config: FpConfig,
    pub fp16_config: FpConfig,
}

impl Device {
    /// True iff fp64 kernels can be built for this device.
    pub fn has_fp64(&self) -> bool {
        !self.fp64_config.is_empty()
    }

    /// True iff fp16 kernels can be built for this device.
    pub fn has_fp16(&self) -> bool {
        !self.fp16_config.is_empty()
    }

    pub(crate) fn query(lib: &ffi::Lib, platform: ffi::cl_platform_id,
            id: ffi::cl_device_id) -> Result<Device> {
        let name = info_string(lib, id, ffi::CL_DEVICE_NAME)?;
        let vendor = info_string(lib, id, ffi::CL_DEVICE_VENDOR)?;
        let version_text = info_string(lib, id, ffi::CL_DEVICE_VERSION)?;
        let c_version_text = info_string(lib, id, ffi::CL_DEVICE_OPENCL_C_VERSION)?;
        let version = Version::parse(&version_text, "OpenCL ").unwrap_or_default();
        let c_version =
            Version::parse(&c_version_text, "OpenCL C ").unwrap_or_default();

        let clock_frequency: u32 = info(lib, id, ffi::CL_DEVICE_MAX_CLOCK_FREQUENCY)?;
        let global_memory: u64 = info(lib, id, ffi::CL_DEVICE_GLOBAL_MEM_SIZE)?;
        let local_memory: u64 = info(lib, id, ffi::CL_DEVICE_LOCAL_MEM_SIZE)?;
        let compute_units: u32 = info(lib, id, ffi::CL_DEVICE_MAX_COMPUTE_UNITS)?;
        let max_group_size: size_t =
            info(lib, id, ffi::CL_DEVICE_MAX_WORK_GROUP_SIZE)?;
        let sizes: [size_t; 3] = info(lib, id, ffi::CL_DEVICE_MAX_WORK_ITEM_SIZES)?;

        let fp32_config = fp_config(lib, id, ffi::CL_DEVICE_SINGLE_FP_CONFIG);
        let fp64_config = fp_config(lib, id, ffi::CL_DEVICE_DOUBLE_FP_CONFIG);
        // The half-precision query fails outright without cl_khr_fp16.
        let fp16_config = fp_config(lib, id, ffi::CL_DEVICE_HALF_FP_CONFIG);

        Ok(Device {
            platform,
            id,
            name,
            vendor,
            version,
            c_version,
            clock_frequency,
            global_memory,
            local_memory,
            compute_units,
            max_groups: max_group_size as usize,
            max_items: [sizes[0] as usize, sizes[1] as usize, sizes[2] as usize],
            fp32_config,
            fp64_config,
            fp16_config,
        })
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}) OpenCL {} / CL C {}", self.name, self.vendor,
            self.version, self.c_version)
    }
}

fn info<T: Copy + Default>(lib: &ffi::Lib, id: ffi::cl_device_id,
        param: ffi::cl_device_info) -> Result<T> {
    let mut value = T::default();
    let errcode = unsafe {
        (lib.clGetDeviceInfo)(id, param, std::mem::size_of::<T>() as size_t,
            &mut value as *mut T as *mut c_void, std::ptr::null_mut())
    };
    eval_errcode(errcode, value, "clGetDeviceInfo")
}

fn info_string(lib: &ffi::Lib, id: ffi::cl_device_id,
        param: ffi::cl_device_info) -> Result<String> {
    let mut size: size_t = 0;
    let errcode = unsafe {
        (lib.clGetDeviceInfo)(id, param, 0, std::ptr::null_mut(), &mut size)
    };
    eval_errcode(errcode, (), "clGetDeviceInfo")?;
    let mut bytes = vec![0u8; size as usize];
    let errcode = unsafe {
        (lib.clGetDeviceInfo)(id, param, size,
            bytes.as_mut_ptr() as *mut c_void, std::ptr::null_mut())
    };
    eval_errcode(errcode, (), "clGetDeviceInfo")?;
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn fp_config(lib: &ffi::Lib, id: ffi::cl_device_id,
        param: ffi::cl_device_info) -> FpConfig {
    match info::<u64>(lib, id, param) {
        Ok(bits) => FpConfig::from_bits_truncate(bits),
        Err(_) => FpConfig::empty(),
    }
}
