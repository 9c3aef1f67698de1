//! Device-backed smoke tests.
//!
//! Every test here needs a working OpenCL runtime and at least one device;
//! on machines without one they return early and report nothing.

use crate::{ArgVal, Context, Kernel, MapFlags, MemFlags, Memory, Override,
    Profiling, Program, Runtime, SampleStore};

const SRC: &str = r#"
    __kernel void scale(__global const float* in, __global float* out,
            const float k) {
        const int i = get_global_id(0);
        out[i] = in[i] * k;
    }
"#;

fn runtime() -> Option<&'static Runtime> {
    let _ = env_logger::builder().is_test(true).try_init();
    match Runtime::init() {
        Ok(rt) => Some(rt),
        Err(err) => {
            eprintln!("skipping: {}", err);
            None
        }
    }
}

#[test]
fn init_is_idempotent() {
    let first = Runtime::init().is_ok();
    let second = Runtime::init().is_ok();
    assert_eq!(first, second);
    if let Some(rt) = runtime() {
        assert!(!rt.devices().is_empty());
        assert!(rt.devices().len() <= crate::DEVICES_MAX);
        assert!(rt.device(rt.devices().len()).is_err());
    }
}

#[test]
fn device_descriptors_are_sane() {
    let rt = match runtime() { Some(rt) => rt, None => return };
    for device in rt.devices() {
        assert!(!device.name.is_empty());
        assert!(device.max_groups > 0);
        assert!(device.max_items[0] > 0);
        // fp32 is mandatory for conformant devices.
        assert!(!device.fp32_config.is_empty());
    }
}

#[test]
fn map_write_then_read_round_trips() {
    if runtime().is_none() { return }
    let ctx = Context::open(0, None).unwrap();
    let mut buf = Memory::alloc(&ctx, MemFlags::READ_WRITE, 64 * 4).unwrap();
    {
        let mut map = buf.map(MapFlags::WRITE_INVALIDATE, 0, 64 * 4).unwrap();
        for (i, v) in map.as_slice_mut::<f32>().iter_mut().enumerate() {
            *v = i as f32;
        }
    }
    let map = buf.map(MapFlags::READ, 0, 64 * 4).unwrap();
    let host = map.as_slice::<f32>();
    assert_eq!(host[0], 0.0);
    assert_eq!(host[63], 63.0);
    drop(map);
}

#[test]
fn compile_dispatch_and_profile() {
    if runtime().is_none() { return }
    let n = 256usize;
    let override_ = Override {
        max_groups: 0,
        max_items: 0,
        profiling: Some(SampleStore::with_capacity(16)),
    };
    let ctx = Context::open(0, Some(override_)).unwrap();
    assert!(ctx.is_profiling());

    let program = Program::with_source(&ctx, SRC, "").unwrap();
    let kernel = Kernel::new(&program, "scale").unwrap();

    let mut input = Memory::alloc(&ctx, MemFlags::READ_ONLY, n * 4).unwrap();
    let output = Memory::alloc(&ctx, MemFlags::WRITE_ONLY, n * 4).unwrap();
    {
        let mut map = input.map(MapFlags::WRITE_INVALIDATE, 0, n * 4).unwrap();
        for (i, v) in map.as_slice_mut::<f32>().iter_mut().enumerate() {
            *v = (i + 1) as f32;
        }
    }

    let k = 2.0f32;
    let mut items = 1;
    while items * 2 <= ctx.max_items().min(n) {
        items *= 2;
    }
    let groups = n / items;
    let event = ctx.enqueue_range_1d(&kernel, groups, items,
        &[ArgVal::mem(&input), ArgVal::mem(&output), ArgVal::scalar(&k)]).unwrap();
    ctx.finish().unwrap();

    let mut sample = Profiling::new(n as i64, 1, 0, 0);
    event.profile(&mut sample).unwrap();
    assert!(sample.end >= sample.start);
    assert!(sample.time >= 0.0);
    drop(event);

    let info = kernel.info().unwrap();
    assert!(info.work_group >= 1);
    assert!(info.preferred_work_group_multiple >= 1);

    let mut output = output;
    let map = output.map(MapFlags::READ, 0, n * 4).unwrap();
    let host = map.as_slice::<f32>();
    assert_eq!(host[0], 2.0);
    assert_eq!(host[n - 1], (n as f32) * 2.0);
    drop(map);
}

#[test]
fn build_failure_carries_the_log() {
    if runtime().is_none() { return }
    let ctx = Context::open(0, None).unwrap();
    let err = Program::with_source(&ctx, "__kernel void broken( {", "")
        .err()
        .expect("the build must fail");
    let text = format!("{}", err);
    assert!(text.contains("build failed"));
}

#[test]
fn override_caps_clamp_dispatch_limits() {
    if runtime().is_none() { return }
    let ctx = Context::open(0, Some(Override::with_limits(2, 4))).unwrap();
    assert!(ctx.max_groups() <= 2);
    assert!(ctx.max_items() <= 4);
}
