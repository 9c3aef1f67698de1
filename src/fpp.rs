//! Precision tags, addressing modes and the operation set.
//!
//! All three enums are dense and start at zero so they can index the kernel
//! table directly.

use std::fmt;

/// Floating-point precision of a vector's elements.
#[repr(usize)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fpp {
    Fp16 = 0,
    Fp32 = 1,
    Fp64 = 2,
}

/// All precisions, in table order.
pub const PRECISIONS: [Fpp; 3] = [Fpp::Fp16, Fpp::Fp32, Fpp::Fp64];

impl Fpp {
    /// Element size in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Fpp::Fp16 => 2,
            Fpp::Fp32 => 4,
            Fpp::Fp64 => 8,
        }
    }

    /// Kernel name suffix.
    pub fn suffix(self) -> &'static str {
        match self {
            Fpp::Fp16 => "fp16",
            Fpp::Fp32 => "fp32",
            Fpp::Fp64 => "fp64",
        }
    }

    /// The OpenCL C scalar type the precision maps to.
    pub fn type_name(self) -> &'static str {
        match self {
            Fpp::Fp16 => "half",
            Fpp::Fp32 => "float",
            Fpp::Fp64 => "double",
        }
    }
}

impl fmt::Display for Fpp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Vector addressing of a kernel variant.
///
/// `Compact` assumes offset 0 and stride 1 and skips the index arithmetic;
/// `OffsetStride` takes both as `int` arguments.
#[repr(usize)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Compact = 0,
    OffsetStride = 1,
}

/// Operations present in the kernel table.
#[repr(usize)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Dot = 0,
    SumOdd = 1,
    SumEven = 2,
    Gemv = 3,
}

/// All operations, in table order.
pub const OPS: [Op; 4] = [Op::Dot, Op::SumOdd, Op::SumEven, Op::Gemv];

impl Op {
    pub fn base_name(self) -> &'static str {
        match self {
            Op::Dot => "dot",
            Op::SumOdd => "sum_odd",
            Op::SumEven => "sum_even",
            Op::Gemv => "gemv",
        }
    }
}

/// The kernel entry-point name for `(op, fpp, mode)`.
pub fn kernel_name(op: Op, fpp: Fpp, mode: Mode) -> String {
    match mode {
        Mode::Compact => format!("{}_{}", op.base_name(), fpp.suffix()),
        Mode::OffsetStride => format!("{}_os_{}", op.base_name(), fpp.suffix()),
    }
}
