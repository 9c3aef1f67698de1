//! Per-precision program builds and the kernel table.

use clrt::{Context, Kernel, Program};

use crate::error::{Error, Result};
use crate::fpp::{kernel_name, Fpp, Mode, Op, OPS, PRECISIONS};
use crate::options::build_options;

/// Kernels indexed by `(op, precision, mode)`.
///
/// The fp32 slots are always filled; fp16 and fp64 slots stay empty when the
/// device's fp-config bitset rules the precision out. Whatever was built is
/// released when the table drops.
pub(crate) struct KernelTable<'c> {
    entries: [[[Option<Kernel<'c>>; 2]; 3]; 4],
    supported: [bool; 3],
}

impl<'c> KernelTable<'c> {
    /// Compiles `source` once per eligible precision and fills the table.
    pub fn build(ctx: &'c Context, source: &str) -> Result<KernelTable<'c>> {
        let device = ctx.device();
        let mut table = KernelTable {
            entries: [
                [[None, None], [None, None], [None, None]],
                [[None, None], [None, None], [None, None]],
                [[None, None], [None, None], [None, None]],
                [[None, None], [None, None], [None, None]],
            ],
            supported: [device.has_fp16(), true, device.has_fp64()],
        };
        for &fpp in PRECISIONS.iter() {
            if !table.supported[fpp as usize] {
                log::debug!("skipping {} kernels: unsupported by {}", fpp,
                    device.name);
                continue;
            }
            let options = build_options(device.c_version, fpp);
            let program = Program::with_source(ctx, source, &options)?;
            for &op in OPS.iter() {
                for &mode in &[Mode::Compact, Mode::OffsetStride] {
                    let name = kernel_name(op, fpp, mode);
                    let kernel = Kernel::new(&program, &name)?;
                    table.entries[op as usize][fpp as usize][mode as usize] =
                        Some(kernel);
                }
            }
            // The program handle can go; created kernels keep it retained.
        }
        Ok(table)
    }

    pub fn supports(&self, fpp: Fpp) -> bool {
        self.supported[fpp as usize]
    }

    pub fn get(&self, op: Op, fpp: Fpp, mode: Mode) -> Result<&Kernel<'c>> {
        self.entries[op as usize][fpp as usize][mode as usize]
            .as_ref()
            .ok_or(Error::PrecisionNotSupported(fpp))
    }
}
