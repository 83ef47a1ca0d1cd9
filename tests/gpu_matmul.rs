use half::{bf16, f16};
use mbench::tensor::Kind;
use mbench::bench::{tflops, time_matmul};
use mbench::{Device, Error, Precision, PrecisionSupport, Tensor2D};
use std::time::Duration;

fn device() -> Option<Device> {
    let _ = env_logger::builder().is_test(true).try_init();
    if Device::count() == 0 {
        eprintln!("no WebGPU adapter available, skipping");
        return None;
    }
    Some(pollster::block_on(Device::with_index(0)).unwrap())
}

fn values<K: Kind>(len: usize, seed: usize) -> Vec<K> {
    // Small multiples of 1/4 are exact in every precision.
    (0..len)
        .map(|i| K::from_f64(((i * 7 + seed) % 9) as f64 * 0.25 - 1.0))
        .collect()
}

fn cpu_matmul<K: Kind>(a: &[K], b: &[K], m: usize, k: usize, n: usize) -> Vec<f64> {
    let mut c = vec![0f64; m * n];
    for i in 0..m {
        for j in 0..n {
            c[i * n + j] = (0..k).map(|p| a[i * k + p].to_f64() * b[p * n + j].to_f64()).sum();
        }
    }
    c
}

fn check_matmul<K: Kind>(device: &Device, max_relative: f64) {
    let (m, k, n) = (20, 34, 36);
    let a = values::<K>(m * k, 1);
    let b = values::<K>(k * n, 4);
    let lhs = Tensor2D::from_slice(device, m, k, &a).unwrap();
    let rhs = Tensor2D::from_slice(device, k, n, &b).unwrap();
    let dst = lhs.matmul(&rhs).unwrap();
    assert_eq!(dst.dims(), [m, n]);
    let got = pollster::block_on(dst.to_vec()).unwrap();
    let expected = cpu_matmul(&a, &b, m, k, n);
    for (idx, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        let g = g.to_f64();
        let tol = max_relative * e.abs().max(1.0);
        assert!((g - e).abs() <= tol, "{:?} at {idx}: {g} vs {e}", K::PRECISION);
    }
}

#[test]
fn matmul_f32() {
    let Some(device) = device() else { return };
    check_matmul::<f32>(&device, 1e-5);
}

#[test]
fn matmul_f16() {
    let Some(device) = device() else { return };
    check_matmul::<f16>(&device, 1e-3);
}

#[test]
fn matmul_bf16() {
    let Some(device) = device() else { return };
    check_matmul::<bf16>(&device, 1e-2);
}

#[test]
fn matmul_f64_needs_shader_f64() {
    let Some(device) = device() else { return };
    if device.features().contains(wgpu::Features::SHADER_F64) {
        check_matmul::<f64>(&device, 1e-12);
    } else {
        let a = Tensor2D::<f64>::from_slice(&device, 2, 2, &[1.0; 4]).unwrap();
        let err = a.matmul(&a).err().unwrap();
        assert!(matches!(err, Error::MissingFeatures { precision: Precision::F64, .. }));
    }
}

#[test]
fn shape_errors() {
    let Some(device) = device() else { return };
    let a = Tensor2D::<f32>::from_slice(&device, 2, 4, &[0.0; 8]).unwrap();
    let b = Tensor2D::<f32>::from_slice(&device, 2, 4, &[0.0; 8]).unwrap();
    assert!(matches!(
        a.matmul(&b).err().unwrap(),
        Error::DimensionMismatchBinaryOp { op: "gemm", .. }
    ));
    let c = Tensor2D::<f32>::from_slice(&device, 4, 3, &[0.0; 12]).unwrap();
    assert!(matches!(
        a.matmul(&c).err().unwrap(),
        Error::OddDimension { op: "gemm", .. }
    ));
    assert!(matches!(
        Tensor2D::<f16>::from_slice(&device, 1, 3, &[f16::ZERO; 3]).err().unwrap(),
        Error::OddDimension { op: "alloc", .. }
    ));
    assert!(matches!(
        Tensor2D::<f32>::from_slice(&device, 2, 2, &[0.0; 3]).err().unwrap(),
        Error::DimensionMismatchBinaryOp { op: "from_slice", .. }
    ));
}

#[test]
fn randn_matmul_runs() {
    let Some(device) = device() else { return };
    let mut rng = rand::thread_rng();
    let a = Tensor2D::<f16>::randn(&device, 64, 64, &mut rng).unwrap();
    let b = Tensor2D::<f16>::randn(&device, 64, 64, &mut rng).unwrap();
    let c = a.matmul(&b).unwrap();
    a.matmul_into(&b, &c).unwrap();
    device.synchronize();
    let values = pollster::block_on(c.to_vec()).unwrap();
    assert_eq!(values.len(), 64 * 64);
    assert!(values.iter().all(|v| v.is_finite()));
}

#[test]
fn time_matmul_reports_positive_medians() {
    let Some(device) = device() else { return };
    let mut precisions = vec![Precision::F32, Precision::F16];
    if device.supports_bf16() {
        precisions.push(Precision::BF16);
    }
    for p in precisions {
        let median = time_matmul(&device, 64, p, Duration::from_millis(20)).unwrap();
        assert!(median.is_finite() && median > 0.0, "{p}: {median}");
        assert!(tflops(64, median) > 0.0, "{p}");
    }
}
