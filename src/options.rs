//! Build-option synthesis for the per-precision program builds.

use std::fmt::Write;

use clrt::Version;

use crate::Fpp;

/// Returns the compiler options that specialize the kernel bundle for one
/// precision, given the device's kernel-language version.
///
/// The aliases make the bundle precision-agnostic: `fp_t` (and its 4/8/16
/// wide vector forms) become the selected scalar type and `suffix` pastes
/// the precision into every entry-point name. fp16 builds additionally
/// define `fp16_surrogate`, which makes kernels do their arithmetic in fp32
/// and touch half-precision values through `vload_half`/`vstore_half` only.
pub(crate) fn build_options(c_version: Version, fpp: Fpp) -> String {
    let t = fpp.type_name();
    let mut options = String::with_capacity(256);
    options.push_str("-D fp16_t=half -D fp32_t=float -D fp64_t=double ");
    options.push_str("-D int32_t=int -D int64_t=long ");
    write!(options, "-cl-std=CL{}.{} ", c_version.major, c_version.minor)
        .unwrap();
    write!(options, "-D fp_t={} -D vec4={}4 -D vec8={}8 -D vec16={}16 -D suffix={}",
        t, t, t, t, fpp.suffix()).unwrap();
    if fpp == Fpp::Fp16 {
        options.push_str(" -D fp16_surrogate");
    }
    options
}
