//! The public BLAS surface.

use std::ptr;

use clrt::{Context, Memory};

use crate::error::{Error, Result};
use crate::fpp::Fpp;
use crate::kernels::KernelTable;
use crate::reduce;

/// The kernel source bundle; compiled once per supported precision.
pub const KERNEL_SOURCE: &str = include_str!("blast.cl");

/// BLAS level 1/2 operations over one open device.
///
/// Construction compiles the kernel bundle for every precision the device
/// supports (fp32 always; fp16 and fp64 when the device's fp-config says
/// so) and indexes the kernels by operation, precision and addressing mode.
///
/// Operand buffers must be allocated against the same [`Context`] the
/// surface was built on, must be unmapped, and address their elements as
/// `offset + i * stride` in element units. All reductions come back as
/// fp64 regardless of the operand precision.
pub struct Blast<'c> {
    ctx: &'c Context,
    kernels: KernelTable<'c>,
}

impl<'c> Blast<'c> {
    /// Builds the surface from the bundled kernel source.
    pub fn new(ctx: &'c Context) -> Result<Blast<'c>> {
        Blast::with_source(ctx, KERNEL_SOURCE)
    }

    /// Builds the surface from a caller-supplied kernel source bundle.
    ///
    /// The bundle must define every `<op>_<suffix>` / `<op>_os_<suffix>`
    /// entry point for `dot`, `sum_odd`, `sum_even` and `gemv`.
    pub fn with_source(ctx: &'c Context, source: &str) -> Result<Blast<'c>> {
        let kernels = KernelTable::build(ctx, source)?;
        Ok(Blast { ctx, kernels })
    }

    pub fn context(&self) -> &'c Context {
        self.ctx
    }

    /// True iff kernels for `fpp` were built.
    pub fn supports(&self, fpp: Fpp) -> bool {
        self.kernels.supports(fpp)
    }

    /// Dot product of two strided vectors of `n` elements of precision
    /// `fpp`, accumulated to fp64.
    pub fn dot(&self, fpp: Fpp, v0: &Memory<'c>, o0: i64, s0: i64,
            v1: &Memory<'c>, o1: i64, s1: i64, n: i64) -> Result<f64> {
        if !self.supports(fpp) {
            return Err(Error::PrecisionNotSupported(fpp));
        }
        self.check_vector(fpp, v0, o0, s0, n)?;
        self.check_vector(fpp, v1, o1, s1, n)?;
        reduce::dot(self.ctx, &self.kernels, fpp, v0, o0, s0, v1, o1, s1, n)
    }

    pub fn dot_fp16(&self, v0: &Memory<'c>, o0: i64, s0: i64, v1: &Memory<'c>,
            o1: i64, s1: i64, n: i64) -> Result<f64> {
        self.dot(Fpp::Fp16, v0, o0, s0, v1, o1, s1, n)
    }

    pub fn dot_fp32(&self, v0: &Memory<'c>, o0: i64, s0: i64, v1: &Memory<'c>,
            o1: i64, s1: i64, n: i64) -> Result<f64> {
        self.dot(Fpp::Fp32, v0, o0, s0, v1, o1, s1, n)
    }

    pub fn dot_fp64(&self, v0: &Memory<'c>, o0: i64, s0: i64, v1: &Memory<'c>,
            o1: i64, s1: i64, n: i64) -> Result<f64> {
        self.dot(Fpp::Fp64, v0, o0, s0, v1, o1, s1, n)
    }

    /// Sum of a strided vector's `n` elements, accumulated to fp64.
    ///
    /// Takes the vector mutably: a length-1 chunk tail is mapped and read
    /// on the host rather than dispatched.
    pub fn sum(&self, fpp: Fpp, v: &mut Memory<'c>, o: i64, s: i64, n: i64)
            -> Result<f64> {
        if !self.supports(fpp) {
            return Err(Error::PrecisionNotSupported(fpp));
        }
        self.check_vector(fpp, v, o, s, n)?;
        reduce::sum(self.ctx, &self.kernels, fpp, v, o, s, n)
    }

    pub fn sum_fp16(&self, v: &mut Memory<'c>, o: i64, s: i64, n: i64) -> Result<f64> {
        self.sum(Fpp::Fp16, v, o, s, n)
    }

    pub fn sum_fp32(&self, v: &mut Memory<'c>, o: i64, s: i64, n: i64) -> Result<f64> {
        self.sum(Fpp::Fp32, v, o, s, n)
    }

    pub fn sum_fp64(&self, v: &mut Memory<'c>, o: i64, s: i64, n: i64) -> Result<f64> {
        self.sum(Fpp::Fp64, v, o, s, n)
    }

    /// Euclidean norm of a strided vector: `sqrt(dot(v, v))`.
    pub fn nrm2(&self, fpp: Fpp, v: &Memory<'c>, o: i64, s: i64, n: i64)
            -> Result<f64> {
        Ok(self.dot(fpp, v, o, s, v, o, s, n)?.sqrt())
    }

    pub fn nrm2_fp16(&self, v: &Memory<'c>, o: i64, s: i64, n: i64) -> Result<f64> {
        self.nrm2(Fpp::Fp16, v, o, s, n)
    }

    pub fn nrm2_fp32(&self, v: &Memory<'c>, o: i64, s: i64, n: i64) -> Result<f64> {
        self.nrm2(Fpp::Fp32, v, o, s, n)
    }

    pub fn nrm2_fp64(&self, v: &Memory<'c>, o: i64, s: i64, n: i64) -> Result<f64> {
        self.nrm2(Fpp::Fp64, v, o, s, n)
    }

    /// Matrix-vector multiply of an `m x n` matrix (row stride `sm`, offset
    /// `om`) with a strided vector, writing `m` results into `out`.
    pub fn gemv(&self, fpp: Fpp, mat: &Memory<'c>, om: i64, sm: i64,
            vec: &Memory<'c>, ov: i64, sv: i64, out: &Memory<'c>, m: i64,
            n: i64) -> Result<()> {
        if !self.supports(fpp) {
            return Err(Error::PrecisionNotSupported(fpp));
        }
        if !ptr::eq(mat.context(), self.ctx) || !ptr::eq(vec.context(), self.ctx)
                || !ptr::eq(out.context(), self.ctx) {
            return Err(Error::ForeignBuffer);
        }
        let bytes = fpp.bytes() as i64;
        assert!(m >= 1 && n >= 1, "gemv dimensions m: {} n: {}", m, n);
        assert!(om >= 0 && ov >= 0 && sm >= n && sv >= 1,
            "gemv addressing om: {} sm: {} ov: {} sv: {}", om, sm, ov, sv);
        assert!((om + (m - 1) * sm + n) * bytes <= mat.len() as i64,
            "matrix exceeds its buffer");
        assert!((ov + (n - 1) * sv + 1) * bytes <= vec.len() as i64,
            "vector exceeds its buffer");
        assert!(m * bytes <= out.len() as i64, "result exceeds its buffer");
        check_i32(om + (m - 1) * sm + n);
        check_i32(ov + (n - 1) * sv);
        check_i32(m);
        reduce::gemv(self.ctx, &self.kernels, fpp, mat, om, sm, vec, ov, sv,
            out, m, n)
    }

    pub fn gemv_fp16(&self, mat: &Memory<'c>, om: i64, sm: i64, vec: &Memory<'c>,
            ov: i64, sv: i64, out: &Memory<'c>, m: i64, n: i64) -> Result<()> {
        self.gemv(Fpp::Fp16, mat, om, sm, vec, ov, sv, out, m, n)
    }

    pub fn gemv_fp32(&self, mat: &Memory<'c>, om: i64, sm: i64, vec: &Memory<'c>,
            ov: i64, sv: i64, out: &Memory<'c>, m: i64, n: i64) -> Result<()> {
        self.gemv(Fpp::Fp32, mat, om, sm, vec, ov, sv, out, m, n)
    }

    pub fn gemv_fp64(&self, mat: &Memory<'c>, om: i64, sm: i64, vec: &Memory<'c>,
            ov: i64, sv: i64, out: &Memory<'c>, m: i64, n: i64) -> Result<()> {
        self.gemv(Fpp::Fp64, mat, om, sm, vec, ov, sv, out, m, n)
    }

    /// Shared vector argument validation. A buffer from another context is
    /// an error; a range that escapes its buffer is a programmer bug and
    /// aborts.
    fn check_vector(&self, fpp: Fpp, v: &Memory<'c>, o: i64, s: i64, n: i64)
            -> Result<()> {
        if !ptr::eq(v.context(), self.ctx) {
            return Err(Error::ForeignBuffer);
        }
        assert!(n >= 1, "vector length n: {}", n);
        assert!(o >= 0, "element offset o: {}", o);
        assert!(s >= 1, "element stride s: {}", s);
        let last = o + (n - 1) * s;
        assert!((last + 1) * fpp.bytes() as i64 <= v.len() as i64,
            "vector [{} + i * {}; {}] exceeds its {} byte buffer", o, s, n,
            v.len());
        check_i32(last);
        Ok(())
    }
}

/// Strided kernels take `int` offsets; anything wider is a programmer error.
fn check_i32(value: i64) {
    assert!(value <= i64::from(i32::MAX),
        "element index {} exceeds the kernel's 32-bit addressing", value);
}
