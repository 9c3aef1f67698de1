//! Runtime discovery and the process-wide device table.

use once_cell::sync::OnceCell;

use crate::error::{eval_errcode, Error, ErrorKind, Result};
use crate::ffi;
use crate::Device;

/// Largest number of platforms queried.
const PLATFORMS_MAX: usize = 16;
/// Largest number of devices retained across all platforms.
pub const DEVICES_MAX: usize = 32;

static RUNTIME: OnceCell<::std::result::Result<Runtime, String>> = OnceCell::new();

/// The bound runtime library plus the device table discovered through it.
///
/// Created once per process by [`Runtime::init`]; every [`Context`] holds a
/// reference to it for its whole life.
///
/// [`Context`]: crate::Context
#[derive(Debug)]
pub struct Runtime {
    pub(crate) lib: ffi::Lib,
    devices: Vec<Device>,
}

// Platform and device ids are process-global, immutable handles; the device
// table is filled once and never written again.
unsafe impl Send for Runtime {}
unsafe impl Sync for Runtime {}

impl Runtime {
    /// Binds the runtime library and fills the device table.
    ///
    /// Idempotent; every call after the first returns the same value,
    /// including a failure to bind (the library is only probed once).
    pub fn init() -> Result<&'static Runtime> {
        let slot = RUNTIME.get_or_init(|| {
            Runtime::discover().map_err(|err| format!("{}", err))
        });
        match *slot {
            Ok(ref rt) => Ok(rt),
            Err(ref msg) => Err(Error::from(ErrorKind::Load(msg.clone()))),
        }
    }

    fn discover() -> Result<Runtime> {
        let lib = ffi::Lib::load()?;
        let mut platforms = [::std::ptr::null_mut(); PLATFORMS_MAX];
        let mut platform_count: ffi::cl_uint = 0;
        let errcode = unsafe {
            (lib.clGetPlatformIDs)(PLATFORMS_MAX as ffi::cl_uint,
                platforms.as_mut_ptr(), &mut platform_count)
        };
        eval_errcode(errcode, (), "clGetPlatformIDs")?;

        let mut devices = Vec::new();
        for &platform in platforms.iter().take(platform_count as usize) {
            let mut ids: [ffi::cl_device_id; DEVICES_MAX] =
                [::std::ptr::null_mut(); DEVICES_MAX];
            let mut count: ffi::cl_uint = 0;
            let errcode = unsafe {
                (lib.clGetDeviceIDs)(platform, ffi::CL_DEVICE_TYPE_ALL,
                    DEVICES_MAX as ffi::cl_uint, ids.as_mut_ptr(), &mut count)
            };
            // A platform with no devices of the requested type reports
            // CL_DEVICE_NOT_FOUND; skip it and keep probing the rest.
            if errcode != ffi::CL_SUCCESS {
                log::debug!("clGetDeviceIDs: {}",
                    crate::error::error_string(errcode));
                continue;
            }
            for &id in ids.iter().take(count as usize) {
                if devices.len() == DEVICES_MAX {
                    break;
                }
                let device = Device::query(&lib, platform, id)?;
                log::debug!("device[{}]: {}", devices.len(), device);
                devices.push(device);
            }
        }
        if devices.is_empty() {
            return Err(Error::from(ErrorKind::NoDevices));
        }
        Ok(Runtime { lib, devices })
    }

    /// The discovered devices, in platform enumeration order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// One device by index.
    pub fn device(&self, index: usize) -> Result<&Device> {
        self.devices.get(index).ok_or_else(|| {
            Error::from(ErrorKind::DeviceIndex { index, count: self.devices.len() })
        })
    }
}

/// Shorthand for [`Runtime::init`].
pub fn init() -> Result<&'static Runtime> {
    Runtime::init()
}
