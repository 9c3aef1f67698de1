//! A device context with its single in-order command queue.

use std::cell::RefCell;
use std::ptr;

use libc::size_t;

use crate::error::{eval_errcode, Result};
use crate::ffi;
use crate::kernel::{ArgVal, Kernel};
use crate::profiling::{Override, SampleStore};
use crate::runtime::Runtime;
use crate::Device;

/// One open device: an OpenCL context plus one in-order command queue.
///
/// Single-device, single-queue by design; every resource created against a
/// `Context` borrows it, so the borrow checker retires them first. Dropping
/// the context releases the queue, then the context.
#[derive(Debug)]
pub struct Context {
    rt: &'static Runtime,
    device_index: usize,
    ctx: ffi::cl_context,
    queue: ffi::cl_command_queue,
    profiling: bool,
    override_: RefCell<Override>,
}

impl Context {
    /// Opens device `device_index`, creating the context and its queue.
    ///
    /// The queue is created with profiling enabled iff `override_` carries a
    /// sample store. [`Runtime::init`] is invoked implicitly.
    pub fn open(device_index: usize, override_: Option<Override>) -> Result<Context> {
        let rt = Runtime::init()?;
        let device = rt.device(device_index)?;
        let override_ = override_.unwrap_or_default();
        let profiling = override_.profiling.is_some();
        let lib = &rt.lib;

        let properties: [ffi::cl_context_properties; 3] = [
            ffi::CL_CONTEXT_PLATFORM as ffi::cl_context_properties,
            device.platform as ffi::cl_context_properties,
            0,
        ];
        let mut errcode: ffi::cl_int = 0;
        let ctx = unsafe {
            (lib.clCreateContext)(properties.as_ptr(), 1, &device.id, None,
                ptr::null_mut(), &mut errcode)
        };
        let ctx = eval_errcode(errcode, ctx, "clCreateContext")?;

        let queue = match create_queue(lib, ctx, device.id, profiling) {
            Ok(queue) => queue,
            Err(err) => {
                unsafe { (lib.clReleaseContext)(ctx) };
                return Err(err);
            }
        };
        log::trace!("opened device[{}] {} (profiling: {})", device_index,
            device.name, profiling);
        Ok(Context {
            rt,
            device_index,
            ctx,
            queue,
            profiling,
            override_: RefCell::new(override_),
        })
    }

    pub fn runtime(&self) -> &'static Runtime {
        self.rt
    }

    pub fn device_index(&self) -> usize {
        self.device_index
    }

    pub fn device(&self) -> &Device {
        &self.rt.devices()[self.device_index]
    }

    /// Work-group cap for 1-D dispatches: the device limit, clamped by a
    /// non-zero override.
    pub fn max_groups(&self) -> usize {
        clamp(self.device().max_groups, self.override_.borrow().max_groups)
    }

    /// Work-items-per-group cap for 1-D dispatches.
    pub fn max_items(&self) -> usize {
        clamp(self.device().max_items[0], self.override_.borrow().max_items)
    }

    /// True iff the queue was opened with profiling enabled.
    pub fn is_profiling(&self) -> bool {
        self.profiling
    }

    /// Runs `f` over the profiling sample store, if profiling is enabled.
    pub fn with_samples<R>(&self, f: impl FnOnce(&mut SampleStore) -> R) -> Option<R> {
        self.override_.borrow_mut().profiling.as_mut().map(f)
    }

    /// Hands the override block back, consuming the context.
    pub fn into_override(self) -> Override {
        self.override_.replace(Override::default())
    }

    /// Releases the queue and then the context.
    ///
    /// Equivalent to dropping; every buffer, program, kernel and event
    /// created against the context has necessarily been released already
    /// (they borrow it).
    pub fn close(self) {}

    /// Issues all queued commands to the device without waiting.
    pub fn flush(&self) -> Result<()> {
        let errcode = unsafe { (self.lib().clFlush)(self.queue) };
        eval_errcode(errcode, (), "clFlush")
    }

    /// Blocks until every queued command has completed.
    pub fn finish(&self) -> Result<()> {
        let errcode = unsafe { (self.lib().clFinish)(self.queue) };
        eval_errcode(errcode, (), "clFinish")
    }

    /// Binds `args` by index and enqueues a 1-D NDRange of
    /// `groups * items` work items in groups of `items`.
    ///
    /// Exceeding the device (or override) limits is a programmer error and
    /// aborts.
    pub fn enqueue_range_1d(&self, kernel: &Kernel, groups: usize, items: usize,
            args: &[ArgVal]) -> Result<Event> {
        assert!(groups > 0 && items > 0,
            "empty NDRange: groups: {} items: {}", groups, items);
        assert!(groups <= self.max_groups(),
            "groups: {} exceeds the device limit: {}", groups, self.max_groups());
        assert!(items <= self.max_items(),
            "items: {} exceeds the device limit: {}", items, self.max_items());
        let lib = self.lib();
        for (index, arg) in args.iter().enumerate() {
            let errcode = unsafe {
                (lib.clSetKernelArg)(kernel.raw(), index as ffi::cl_uint,
                    arg.size() as size_t, arg.value())
            };
            eval_errcode(errcode, (), "clSetKernelArg")?;
        }
        let global: size_t = (groups * items) as size_t;
        let local: size_t = items as size_t;
        let mut event: ffi::cl_event = ptr::null_mut();
        let errcode = unsafe {
            (lib.clEnqueueNDRangeKernel)(self.queue, kernel.raw(), 1,
                ptr::null(), &global, &local, 0, ptr::null(), &mut event)
        };
        eval_errcode(errcode, (), "clEnqueueNDRangeKernel")?;
        log::trace!("enqueued {} groups x {} items", groups, items);
        Ok(Event { ctx: self, raw: event })
    }

    pub(crate) fn lib(&self) -> &'static ffi::Lib {
        &self.rt.lib
    }

    pub(crate) fn raw(&self) -> ffi::cl_context {
        self.ctx
    }

    pub(crate) fn queue(&self) -> ffi::cl_command_queue {
        self.queue
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let lib = self.lib();
        unsafe {
            let errcode = (lib.clReleaseCommandQueue)(self.queue);
            if errcode != ffi::CL_SUCCESS {
                log::error!("clReleaseCommandQueue: {}",
                    crate::error::error_string(errcode));
            }
            let errcode = (lib.clReleaseContext)(self.ctx);
            if errcode != ffi::CL_SUCCESS {
                log::error!("clReleaseContext: {}",
                    crate::error::error_string(errcode));
            }
        }
    }
}

fn clamp(device_limit: usize, override_limit: usize) -> usize {
    if override_limit == 0 {
        device_limit
    } else {
        device_limit.min(override_limit)
    }
}

fn create_queue(lib: &ffi::Lib, ctx: ffi::cl_context, device: ffi::cl_device_id,
        profiling: bool) -> Result<ffi::cl_command_queue> {
    let mut errcode: ffi::cl_int = 0;
    let queue = if let Some(create) = lib.clCreateCommandQueueWithProperties {
        let properties: [ffi::cl_queue_properties; 3] = [
            ffi::CL_QUEUE_PROPERTIES as ffi::cl_queue_properties,
            ffi::CL_QUEUE_PROFILING_ENABLE,
            0,
        ];
        let properties = if profiling { properties.as_ptr() } else { ptr::null() };
        unsafe { create(ctx, device, properties, &mut errcode) }
    } else {
        let properties = if profiling { ffi::CL_QUEUE_PROFILING_ENABLE } else { 0 };
        unsafe { (lib.clCreateCommandQueue)(ctx, device, properties, &mut errcode) }
    };
    eval_errcode(errcode, queue, "clCreateCommandQueue")
}

/// A completion token for one enqueued command.
///
/// Dropping the event releases it; [`Event::profile`] must therefore happen
/// before the event goes out of scope.
#[derive(Debug)]
pub struct Event<'c> {
    ctx: &'c Context,
    raw: ffi::cl_event,
}

impl<'c> Event<'c> {
    /// Blocks until the command has completed.
    pub fn wait(&self) -> Result<()> {
        let errcode = unsafe { (self.ctx.lib().clWaitForEvents)(1, &self.raw) };
        eval_errcode(errcode, (), "clWaitForEvents")
    }

    /// Fills `p` with the four device timestamps and derives `time` and the
    /// rate fields from the op counts already present in `p`.
    ///
    /// The command must have completed (wait on it, or [`Context::finish`]).
    pub fn profile(&self, p: &mut crate::Profiling) -> Result<()> {
        p.queued = self.profiling_info(ffi::CL_PROFILING_COMMAND_QUEUED)?;
        p.submit = self.profiling_info(ffi::CL_PROFILING_COMMAND_SUBMIT)?;
        p.start = self.profiling_info(ffi::CL_PROFILING_COMMAND_START)?;
        p.end = self.profiling_info(ffi::CL_PROFILING_COMMAND_END)?;
        p.derive();
        Ok(())
    }

    fn profiling_info(&self, param: ffi::cl_profiling_info) -> Result<u64> {
        let mut value: u64 = 0;
        let errcode = unsafe {
            (self.ctx.lib().clGetEventProfilingInfo)(self.raw, param,
                std::mem::size_of::<u64>() as size_t,
                &mut value as *mut u64 as *mut libc::c_void, ptr::null_mut())
        };
        eval_errcode(errcode, value, "clGetEventProfilingInfo")
    }
}

impl<'c> Drop for Event<'c> {
    fn drop(&mut self) {
        let errcode = unsafe { (self.ctx.lib().clReleaseEvent)(self.raw) };
        if errcode != ffi::CL_SUCCESS {
            log::error!("clReleaseEvent: {}", crate::error::error_string(errcode));
        }
    }
}

/// Blocks until every event in `events` has completed.
pub fn wait(events: &[Event]) -> Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    let raws: Vec<ffi::cl_event> = events.iter().map(|e| e.raw).collect();
    let lib = events[0].ctx.lib();
    let errcode = unsafe {
        (lib.clWaitForEvents)(raws.len() as ffi::cl_uint, raws.as_ptr())
    };
    eval_errcode(errcode, (), "clWaitForEvents")
}
