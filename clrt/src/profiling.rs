//! Dispatch profiling: per-kernel timing records, fold-up summaries, and an
//! exponential moving average over recent dispatches.

pub const NSEC_PER_SEC: f64 = 1_000_000_000.0;

const GIGA: f64 = 1.0e9;

/// Default EMA window, in samples.
pub const EMA_SAMPLES_DEFAULT: usize = 128;

/// One profiled dispatch.
///
/// The four timestamps come from the event; `time` and the `g*ops` rates are
/// derived from them, the work-item `count` and the per-item operation
/// counts. `user` is host-observed wall time, filled by the caller if at all.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Profiling {
    /// Nanoseconds: command enqueued on the host.
    pub queued: u64,
    /// Nanoseconds: command submitted to the device.
    pub submit: u64,
    /// Nanoseconds: execution start.
    pub start: u64,
    /// Nanoseconds: execution end.
    pub end: u64,
    /// Seconds of device execution (`end - start`).
    pub time: f64,
    /// Seconds of host wall time; caller-filled.
    pub user: f64,
    /// Work items dispatched.
    pub count: i64,
    /// Floating-point ops per work item.
    pub fops: i64,
    /// 32-bit integer ops per work item.
    pub i32ops: i64,
    /// 64-bit integer ops per work item.
    pub i64ops: i64,
    pub gflops: f64,
    pub gi32ops: f64,
    pub gi64ops: f64,
}

impl Profiling {
    /// A record pre-filled with the dispatch's known arithmetic intensity,
    /// ready for [`Event::profile`].
    ///
    /// [`Event::profile`]: crate::Event::profile
    pub fn new(count: i64, fops: i64, i32ops: i64, i64ops: i64) -> Profiling {
        Profiling { count, fops, i32ops, i64ops, ..Profiling::default() }
    }

    /// Derives `time` and the rate fields from the timestamps and counts.
    pub(crate) fn derive(&mut self) {
        self.time = (self.end - self.start) as f64 / NSEC_PER_SEC;
        self.gflops = self.rate(self.fops);
        self.gi32ops = self.rate(self.i32ops);
        self.gi64ops = self.rate(self.i64ops);
    }

    fn rate(&self, ops_per_item: i64) -> f64 {
        if self.time > 0.0 && ops_per_item > 0 {
            (self.count as f64 * ops_per_item as f64) / self.time / GIGA
        } else {
            0.0
        }
    }
}

/// Collapses per-kernel records into one summary: times add up, rates are
/// averaged arithmetically across records.
pub fn fold(samples: &[Profiling]) -> Option<Profiling> {
    let first = *samples.first()?;
    let mut folded = samples[1..].iter().fold(first, |mut acc, p| {
        acc.time += p.time;
        acc.user += p.user;
        acc.gflops += p.gflops;
        acc.gi32ops += p.gi32ops;
        acc.gi64ops += p.gi64ops;
        acc
    });
    let n = samples.len() as f64;
    folded.gflops /= n;
    folded.gi32ops /= n;
    folded.gi64ops /= n;
    Some(folded)
}

/// Exponential moving average of dispatch time and flop rate.
#[derive(Clone, Copy, Debug)]
pub struct Ema {
    window: usize,
    seen: usize,
    pub time: f64,
    pub gflops: f64,
}

impl Ema {
    /// `window` of zero selects [`EMA_SAMPLES_DEFAULT`].
    pub fn new(window: usize) -> Ema {
        let window = if window == 0 { EMA_SAMPLES_DEFAULT } else { window };
        Ema { window, seen: 0, time: 0.0, gflops: 0.0 }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Number of samples folded in so far.
    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn update(&mut self, time: f64, gflops: f64) {
        if self.seen == 0 {
            self.time = time;
            self.gflops = gflops;
        } else {
            let k = 2.0 / (self.window as f64 + 1.0);
            self.time += k * (time - self.time);
            self.gflops += k * (gflops - self.gflops);
        }
        self.seen += 1;
    }
}

impl Default for Ema {
    fn default() -> Ema {
        Ema::new(EMA_SAMPLES_DEFAULT)
    }
}

/// A bounded, caller-owned store of profiling samples.
#[derive(Debug)]
pub struct SampleStore {
    samples: Vec<Profiling>,
    cap: usize,
    ema: Ema,
}

impl SampleStore {
    /// A store holding at most `cap` samples per operation.
    pub fn with_capacity(cap: usize) -> SampleStore {
        SampleStore { samples: Vec::with_capacity(cap), cap, ema: Ema::default() }
    }

    /// Overrides the EMA window (`0` keeps the default of 128 samples).
    pub fn ema_window(mut self, window: usize) -> SampleStore {
        self.ema = Ema::new(window);
        self
    }

    /// Appends a sample unless the store is full. The EMA is updated either
    /// way.
    pub fn add(&mut self, sample: Profiling) -> bool {
        self.ema.update(sample.time, sample.gflops);
        if self.samples.len() < self.cap {
            self.samples.push(sample);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn samples(&self) -> &[Profiling] {
        &self.samples
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn ema(&self) -> &Ema {
        &self.ema
    }
}

/// Caps and profiling plumbing handed to [`Context::open`]; zero caps mean
/// "use the device maximum".
///
/// [`Context::open`]: crate::Context::open
#[derive(Debug, Default)]
pub struct Override {
    pub max_groups: usize,
    pub max_items: usize,
    /// Profiling is enabled on the queue iff this is `Some`.
    pub profiling: Option<SampleStore>,
}

impl Override {
    /// Caps without profiling.
    pub fn with_limits(max_groups: usize, max_items: usize) -> Override {
        Override { max_groups, max_items, profiling: None }
    }
}
