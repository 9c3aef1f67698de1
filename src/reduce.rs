//! The tiled reduction engine.
//!
//! An operation over `n` elements is cut into chunks bounded by the device's
//! work-group and work-item limits. Each chunk runs one elementwise kernel
//! (the `dot` multiply, or the first strided reduction layer for `sum`)
//! followed by a logarithmic tree of pairwise-sum layers that ping-pong
//! between two scratch buffers. Layers with an odd element count use the
//! `sum_odd` kernel, which folds the lone trailing element into pair 0, so
//! no layer ever needs a conditional tail. The chunk's single remaining
//! element is mapped back and accumulated on the host in fp64, which bounds
//! round-off growth across chunks.

use clrt::{ArgVal, Context, Event, MapFlags, MemFlags, MemMap, Memory, Profiling};

use crate::error::Result;
use crate::fp16::Fp16;
use crate::fpp::{Fpp, Mode, Op};
use crate::kernels::KernelTable;

/// One pending profiling record: the event and the record primed with the
/// dispatch's arithmetic intensity.
type Pending<'c> = Vec<(Event<'c>, Profiling)>;

/// Splits `n` remaining elements into the next chunk's NDRange.
///
/// Returns `(groups, items, total)` with `total = groups * items <= n`,
/// `items <= max_items` and `groups <= max_groups`. `groups` is kept to a
/// power of two so that the reduction loop can halve it exactly until one
/// group remains; only then does `items` start halving, where the parity
/// kernels absorb odd counts.
pub(crate) fn tile(n: usize, max_groups: usize, max_items: usize)
        -> (usize, usize, usize) {
    debug_assert!(n > 0 && max_groups > 0 && max_items > 0);
    let wanted = ((n + max_items - 1) / max_items).min(max_groups);
    let mut groups = floor_pow2(wanted);
    let mut total = if groups == 1 { n.min(max_items) } else { groups * max_items };
    if groups > 1 && total > n {
        groups /= 2;
        total = groups * max_items;
    }
    let items = total / groups;
    assert!(items > 0 && groups > 0 && items * groups <= n && items * groups == total);
    (groups, items, total)
}

fn floor_pow2(x: usize) -> usize {
    debug_assert!(x > 0);
    let next = x.next_power_of_two();
    if next == x { x } else { next >> 1 }
}

/// Converts the mapped single-element result to fp64.
fn read_scalar(fpp: Fpp, map: &MemMap) -> f64 {
    match fpp {
        Fpp::Fp16 => f64::from(Fp16::from_bits(map.as_slice::<u16>()[0])),
        Fpp::Fp32 => f64::from(map.as_slice::<f32>()[0]),
        Fpp::Fp64 => map.as_slice::<f64>()[0],
    }
}

/// Records the event for later profiling, or releases it immediately when
/// profiling is off.
fn note<'c>(ctx: &Context, pending: &mut Pending<'c>, event: Event<'c>,
        count: i64, fops: i64, i32ops: i64) {
    if ctx.is_profiling() {
        pending.push((event, Profiling::new(count, fops, i32ops, 0)));
    }
    // Dropping the event releases it; completion is ordered by the queue.
}

/// Profiles every pending event (all complete after a `finish`) and appends
/// the records to the context's sample store.
fn drain<'c>(ctx: &Context, pending: &mut Pending<'c>) -> Result<()> {
    for (event, mut record) in pending.drain(..) {
        event.profile(&mut record)?;
        let _ = ctx.with_samples(|samples| samples.add(record));
    }
    Ok(())
}

/// Tree-reduces `total` elements of `a` down to element 0 of whichever
/// scratch buffer the last layer wrote, then maps that element and returns
/// it as fp64. `groups * items` must equal `total`.
fn reduce_chunk<'c>(ctx: &'c Context, kernels: &KernelTable<'c>, fpp: Fpp,
        a: &mut Memory<'c>, mut groups: usize, mut items: usize, total: usize,
        pending: &mut Pending<'c>) -> Result<f64> {
    let bytes = fpp.bytes();
    // One extra element so a one-element chunk doesn't allocate zero bytes.
    let half = (total + 1) / 2;
    let mut b = Memory::alloc(ctx, MemFlags::READ_WRITE, half.max(1) * bytes)?;
    let mut m = total;
    let mut k = m / 2;
    let mut in_a = true;
    while k >= 1 {
        let parity = if m % 2 == 0 { Op::SumEven } else { Op::SumOdd };
        if groups > 1 {
            groups /= 2;
        } else {
            items /= 2;
        }
        debug_assert_eq!(groups * items, k);
        let kernel = kernels.get(parity, fpp, Mode::Compact)?;
        let (src, dst) = if in_a { (&*a, &b) } else { (&b, &*a) };
        let event = ctx.enqueue_range_1d(kernel, groups, items,
            &[ArgVal::mem(src), ArgVal::mem(dst)])?;
        note(ctx, pending, event, (groups * items) as i64, 1, 1);
        in_a = !in_a;
        m = k;
        k /= 2;
    }
    ctx.finish()?;
    drain(ctx, pending)?;
    let result = if in_a { a } else { &mut b };
    let map = result.map(MapFlags::READ, 0, bytes)?;
    Ok(read_scalar(fpp, &map))
}

/// The dot product, chunked.
pub(crate) fn dot<'c>(ctx: &'c Context, kernels: &KernelTable<'c>, fpp: Fpp,
        v0: &Memory<'c>, o0: i64, s0: i64, v1: &Memory<'c>, o1: i64, s1: i64,
        n: i64) -> Result<f64> {
    let bytes = fpp.bytes();
    let max_groups = ctx.max_groups();
    let max_items = ctx.max_items();
    let _ = ctx.with_samples(|samples| samples.clear());
    let mut pending = Pending::new();
    let (mut o0, mut o1) = (o0, o1);
    let mut n = n as usize;
    let mut sum = 0.0f64;
    while n > 0 {
        let (groups, items, total) = tile(n, max_groups, max_items);
        let mut r = Memory::alloc(ctx, MemFlags::READ_WRITE, total * bytes)?;
        if o0 == 0 && s0 == 1 && o1 == 0 && s1 == 1 {
            let kernel = kernels.get(Op::Dot, fpp, Mode::Compact)?;
            let event = ctx.enqueue_range_1d(kernel, groups, items,
                &[ArgVal::mem(v0), ArgVal::mem(v1), ArgVal::mem(&r)])?;
            note(ctx, &mut pending, event, total as i64, 1, 0);
        } else {
            let kernel = kernels.get(Op::Dot, fpp, Mode::OffsetStride)?;
            let (o0w, s0w) = (o0 as i32, s0 as i32);
            let (o1w, s1w) = (o1 as i32, s1 as i32);
            let event = ctx.enqueue_range_1d(kernel, groups, items,
                &[ArgVal::mem(v0), ArgVal::scalar(&o0w), ArgVal::scalar(&s0w),
                  ArgVal::mem(v1), ArgVal::scalar(&o1w), ArgVal::scalar(&s1w),
                  ArgVal::mem(&r)])?;
            note(ctx, &mut pending, event, total as i64, 1, 4);
        }
        sum += reduce_chunk(ctx, kernels, fpp, &mut r, groups, items, total,
            &mut pending)?;
        n -= total;
        o0 += total as i64 * s0;
        o1 += total as i64 * s1;
    }
    summarize(ctx, "dot", fpp);
    Ok(sum)
}

/// The strided element sum, chunked. Maps `v` directly for a length-1 tail,
/// which is why the vector comes in mutably.
pub(crate) fn sum<'c>(ctx: &'c Context, kernels: &KernelTable<'c>, fpp: Fpp,
        v: &mut Memory<'c>, o: i64, s: i64, n: i64) -> Result<f64> {
    let bytes = fpp.bytes();
    let max_groups = ctx.max_groups();
    let max_items = ctx.max_items();
    let _ = ctx.with_samples(|samples| samples.clear());
    let mut pending = Pending::new();
    let mut o = o;
    let mut n = n as usize;
    let mut sum = 0.0f64;
    while n > 0 {
        let (mut groups, mut items, total) = tile(n, max_groups, max_items);
        if total == 1 {
            ctx.finish()?;
            let map = v.map(MapFlags::READ, o as usize * bytes, bytes)?;
            sum += read_scalar(fpp, &map);
            drop(map);
            n -= 1;
            o += s;
            continue;
        }
        // First layer reads the strided vector and writes a compact scratch
        // buffer; the remaining layers reduce that buffer in place.
        let m = total;
        let k = m / 2;
        let parity = if m % 2 == 0 { Op::SumEven } else { Op::SumOdd };
        if groups > 1 {
            groups /= 2;
        } else {
            items /= 2;
        }
        debug_assert_eq!(groups * items, k);
        let half = (total + 1) / 2;
        let mut a = Memory::alloc(ctx, MemFlags::READ_WRITE, half * bytes)?;
        let kernel = kernels.get(parity, fpp, Mode::OffsetStride)?;
        let (ow, sw) = (o as i32, s as i32);
        let event = ctx.enqueue_range_1d(kernel, groups, items,
            &[ArgVal::mem(&*v), ArgVal::scalar(&ow), ArgVal::scalar(&sw),
              ArgVal::mem(&a)])?;
        note(ctx, &mut pending, event, k as i64, 1, 3);
        sum += reduce_chunk(ctx, kernels, fpp, &mut a, groups, items, k,
            &mut pending)?;
        n -= total;
        o += total as i64 * s;
    }
    summarize(ctx, "sum", fpp);
    Ok(sum)
}

/// Matrix-vector multiply: `out[i] = sum_j mat[i][j] * vec[j]`, row-chunked.
///
/// `sm` is the element stride between row starts; `om`/`ov` are element
/// offsets. One work item produces one output row.
pub(crate) fn gemv<'c>(ctx: &'c Context, kernels: &KernelTable<'c>, fpp: Fpp,
        mat: &Memory<'c>, om: i64, sm: i64, vec: &Memory<'c>, ov: i64, sv: i64,
        out: &Memory<'c>, m: i64, n: i64) -> Result<()> {
    let max_groups = ctx.max_groups();
    let max_items = ctx.max_items();
    let _ = ctx.with_samples(|samples| samples.clear());
    let mut pending = Pending::new();
    let nw = n as i32;
    let mut row0 = 0i64;
    let mut rows = m as usize;
    while rows > 0 {
        let (groups, items, total) = tile(rows, max_groups, max_items);
        let compact = row0 == 0 && om == 0 && sm == n && ov == 0 && sv == 1;
        let event = if compact {
            let kernel = kernels.get(Op::Gemv, fpp, Mode::Compact)?;
            ctx.enqueue_range_1d(kernel, groups, items,
                &[ArgVal::mem(mat), ArgVal::mem(vec), ArgVal::mem(out),
                  ArgVal::scalar(&nw)])?
        } else {
            let kernel = kernels.get(Op::Gemv, fpp, Mode::OffsetStride)?;
            let omw = (om + row0 * sm) as i32;
            let smw = sm as i32;
            let ovw = ov as i32;
            let svw = sv as i32;
            let oow = row0 as i32;
            ctx.enqueue_range_1d(kernel, groups, items,
                &[ArgVal::mem(mat), ArgVal::scalar(&omw), ArgVal::scalar(&smw),
                  ArgVal::mem(vec), ArgVal::scalar(&ovw), ArgVal::scalar(&svw),
                  ArgVal::mem(out), ArgVal::scalar(&oow), ArgVal::scalar(&nw)])?
        };
        note(ctx, &mut pending, event, total as i64, 2 * n, 0);
        rows -= total;
        row0 += total as i64;
    }
    ctx.finish()?;
    drain(ctx, &mut pending)?;
    summarize(ctx, "gemv", fpp);
    Ok(())
}

/// Folds the operation's samples into one line of debug logging.
fn summarize(ctx: &Context, op: &str, fpp: Fpp) {
    if !ctx.is_profiling() {
        return;
    }
    let _ = ctx.with_samples(|samples| {
        if let Some(folded) = clrt::fold(samples.samples()) {
            log::debug!("{}[{}]: {:.3} us, {:.6} Gflops ({} dispatches)", op,
                fpp, folded.time * 1.0e6, folded.gflops, samples.samples().len());
        }
    });
}
