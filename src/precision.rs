use crate::{Error, Result};

/// Floating point formats that can be benchmarked.
///
/// The declaration order is the order used when reporting results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precision {
    F64,
    F32,
    F16,
    BF16,
}

impl Precision {
    pub const ALL: [Precision; 4] = [Self::F64, Self::F32, Self::F16, Self::BF16];

    pub fn name(&self) -> &'static str {
        match self {
            Self::F64 => "FP64",
            Self::F32 => "FP32",
            Self::F16 => "FP16",
            Self::BF16 => "BF16",
        }
    }

    /// Shader features the device has to be created with to run this precision.
    pub fn required_features(&self) -> wgpu::Features {
        match self {
            Self::F64 => wgpu::Features::SHADER_F64,
            Self::F32 | Self::F16 | Self::BF16 => wgpu::Features::empty(),
        }
    }

    /// Type used for the elements of the storage buffers in the gemm kernel.
    /// Half precision values are packed two per word.
    fn wgsl_storage(&self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::F16 | Self::BF16 => "u32",
        }
    }

    /// Type used for accumulation in the gemm kernel.
    fn wgsl_accumulator(&self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 | Self::F16 | Self::BF16 => "f32",
        }
    }

    /// Element access helpers `load_a`, `load_b2` and `store_c2` for the gemm kernel.
    fn wgsl_accessors(&self) -> &'static str {
        match self {
            Self::F64 | Self::F32 => DIRECT_ACCESSORS,
            Self::F16 => F16_ACCESSORS,
            Self::BF16 => BF16_ACCESSORS,
        }
    }

    /// WGSL source of the gemm kernel specialised for this precision.
    pub(crate) fn gemm_source(&self) -> String {
        include_str!("gemm.wgsl")
            .replace("@ACCESSORS@", self.wgsl_accessors())
            .replace("@STORAGE@", self.wgsl_storage())
            .replace("@ACC@", self.wgsl_accumulator())
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl serde::Serialize for Precision {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

const DIRECT_ACCESSORS: &str = r#"
fn load_a(row: u32, col: u32) -> @ACC@ {
    return lhs[row * params.k + col];
}

fn load_b2(row: u32, col: u32) -> vec2<@ACC@> {
    let i = row * params.n + col;
    return vec2<@ACC@>(rhs[i], rhs[i + 1u]);
}

fn store_c2(row: u32, col: u32, v: vec2<@ACC@>) {
    let i = row * params.n + col;
    dst[i] = v.x;
    dst[i + 1u] = v.y;
}
"#;

const F16_ACCESSORS: &str = r#"
fn load_a(row: u32, col: u32) -> f32 {
    let pair = unpack2x16float(lhs[(row * params.k + col) / 2u]);
    return pair[col & 1u];
}

fn load_b2(row: u32, col: u32) -> vec2<f32> {
    return unpack2x16float(rhs[(row * params.n + col) / 2u]);
}

fn store_c2(row: u32, col: u32, v: vec2<f32>) {
    dst[(row * params.n + col) / 2u] = pack2x16float(v);
}
"#;

// bf16 is the upper half of an f32, rounding to nearest even on the way back.
const BF16_ACCESSORS: &str = r#"
fn unpack_bf16(w: u32) -> vec2<f32> {
    return vec2<f32>(bitcast<f32>(w << 16u), bitcast<f32>(w & 0xffff0000u));
}

fn to_bf16(x: f32) -> u32 {
    let bits = bitcast<u32>(x);
    return (bits + 0x7fffu + ((bits >> 16u) & 1u)) >> 16u;
}

fn load_a(row: u32, col: u32) -> f32 {
    let pair = unpack_bf16(lhs[(row * params.k + col) / 2u]);
    return pair[col & 1u];
}

fn load_b2(row: u32, col: u32) -> vec2<f32> {
    return unpack_bf16(rhs[(row * params.n + col) / 2u]);
}

fn store_c2(row: u32, col: u32, v: vec2<f32>) {
    dst[(row * params.n + col) / 2u] = to_bf16(v.x) | (to_bf16(v.y) << 16u);
}
"#;

/// Which optional precisions to benchmark on top of FP16.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecisionFlags {
    pub double: bool,
    pub single: bool,
    pub bfloat: bool,
}

/// Capability queries needed before a benchmark run.
pub trait PrecisionSupport {
    fn supports_bf16(&self) -> bool;
}

/// Builds the ordered list of precisions to benchmark.
///
/// FP16 is always run. BF16 is appended after checking the device supports it,
/// FP32 and then FP64 are put in front.
pub fn resolve_precisions<S: PrecisionSupport + ?Sized>(
    flags: PrecisionFlags,
    support: &S,
) -> Result<Vec<Precision>> {
    let mut precisions = vec![Precision::F16];
    if flags.bfloat {
        if !support.supports_bf16() {
            return Err(Error::UnsupportedPrecision(Precision::BF16));
        }
        precisions.push(Precision::BF16);
    }
    if flags.single {
        precisions.insert(0, Precision::F32);
    }
    if flags.double {
        precisions.insert(0, Precision::F64);
    }
    Ok(precisions)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Support(bool);

    impl PrecisionSupport for Support {
        fn supports_bf16(&self) -> bool {
            self.0
        }
    }

    fn flags(double: bool, single: bool, bfloat: bool) -> PrecisionFlags {
        PrecisionFlags { double, single, bfloat }
    }

    #[test]
    fn half_is_always_included() {
        let p = resolve_precisions(PrecisionFlags::default(), &Support(false)).unwrap();
        assert_eq!(p, vec![Precision::F16]);
    }

    #[test]
    fn flag_combinations() {
        use Precision::*;
        let cases = [
            (flags(true, false, false), vec![F64, F16]),
            (flags(false, true, false), vec![F32, F16]),
            (flags(false, false, true), vec![F16, BF16]),
            (flags(false, true, true), vec![F32, F16, BF16]),
            (flags(true, true, false), vec![F64, F32, F16]),
            (flags(true, true, true), vec![F64, F32, F16, BF16]),
        ];
        for (f, expected) in cases {
            assert_eq!(resolve_precisions(f, &Support(true)).unwrap(), expected, "{f:?}");
        }
    }

    #[test]
    fn unsupported_bf16_is_rejected() {
        let err = resolve_precisions(flags(true, true, true), &Support(false)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPrecision(Precision::BF16)));
        assert!(err.is_user_facing());
        assert_eq!(
            err.to_string(),
            "This device does not support the BF16 precision!"
        );
    }

    #[test]
    fn bf16_support_is_only_queried_when_requested() {
        let p = resolve_precisions(flags(true, true, false), &Support(false)).unwrap();
        assert_eq!(p, vec![Precision::F64, Precision::F32, Precision::F16]);
    }

    #[test]
    fn display_order_and_names() {
        let mut shuffled = vec![Precision::BF16, Precision::F16, Precision::F64, Precision::F32];
        shuffled.sort();
        assert_eq!(shuffled, Precision::ALL);
        let names: Vec<_> = Precision::ALL.iter().map(|p| p.to_string()).collect();
        assert_eq!(names, ["FP64", "FP32", "FP16", "BF16"]);
    }

    #[test]
    fn gemm_sources_are_fully_specialised() {
        for p in Precision::ALL {
            let source = p.gemm_source();
            for placeholder in ["@ACCESSORS@", "@STORAGE@", "@ACC@"] {
                assert!(!source.contains(placeholder), "{p} still has {placeholder}");
            }
            // Comments are left untouched by the specialisation.
            let comments = |s: &str| -> Vec<String> {
                s.lines()
                    .filter(|l| l.trim_start().starts_with("//"))
                    .map(String::from)
                    .collect()
            };
            assert_eq!(comments(&source), comments(include_str!("gemm.wgsl")), "{p}");
        }
    }

    #[test]
    fn gemm_sources_validate() {
        let flags = naga::valid::ValidationFlags::all();
        let caps = naga::valid::Capabilities::FLOAT64;
        for p in Precision::ALL {
            let source = p.gemm_source();
            let module = match naga::front::wgsl::parse_str(&source) {
                Ok(module) => module,
                Err(err) => panic!("{p}: {}", err.emit_to_string(&source)),
            };
            if let Err(err) = naga::valid::Validator::new(flags, caps).validate(&module) {
                panic!("{p}: {err:?}");
            }
            assert!(module.entry_points.iter().any(|e| e.name == "gemm"), "{p}");
        }
    }

    #[test]
    fn only_f64_needs_extra_features() {
        assert_eq!(Precision::F64.required_features(), wgpu::Features::SHADER_F64);
        for p in [Precision::F32, Precision::F16, Precision::BF16] {
            assert!(p.required_features().is_empty());
        }
    }
}
