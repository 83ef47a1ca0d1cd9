use crate::tensor::{Kind, Tensor2D};
use crate::timer::Timer;
use crate::{Device, Error, Precision, Result};
use half::{bf16, f16};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Square matrix sizes that are benchmarked, in order.
pub const PROBLEM_SIZES: [usize; 4] = [512, 2048, 8192, 9216];

/// Minimum time spent measuring each (size, precision) pair.
pub const DEFAULT_MIN_RUN_TIME: Duration = Duration::from_secs(3);

/// Throughput in teraflops of an `n x n` by `n x n` matmul taking `seconds`.
pub fn tflops(n: usize, seconds: f64) -> f64 {
    let n = n as f64;
    2.0 * n * n * n / seconds / 1e12
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputResult {
    pub size: usize,
    pub precision: Precision,
    pub tflops: f64,
}

/// Teraflops indexed by problem size then precision, both in ascending order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    results: BTreeMap<usize, BTreeMap<Precision, f64>>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: ThroughputResult) -> Result<()> {
        let ThroughputResult {
            size,
            precision,
            tflops,
        } = result;
        let row = self.results.entry(size).or_default();
        if row.contains_key(&precision) {
            return Err(Error::DuplicateResult { size, precision });
        }
        row.insert(precision, tflops);
        Ok(())
    }

    pub fn get(&self, size: usize, precision: Precision) -> Option<f64> {
        self.results.get(&size)?.get(&precision).copied()
    }

    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.results.keys().copied()
    }

    /// Precisions with at least one recorded value.
    pub fn precisions(&self) -> BTreeSet<Precision> {
        self.results
            .values()
            .flat_map(|row| row.keys().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.results.values().map(|row| row.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl serde::Serialize for ResultTable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.results.len()))?;
        for (size, row) in self.results.iter() {
            map.serialize_entry(&format!("n={size}"), row)?;
        }
        map.end()
    }
}

/// Runs `measure` for every size and precision, sizes in the outer loop.
///
/// `measure` returns the median time of one matmul in seconds and `progress`
/// is called before each measurement starts.
pub fn collect_results<M, P>(
    sizes: &[usize],
    precisions: &[Precision],
    mut measure: M,
    mut progress: P,
) -> Result<ResultTable>
where
    M: FnMut(usize, Precision) -> Result<f64>,
    P: FnMut(usize, Precision) -> Result<()>,
{
    let mut table = ResultTable::new();
    for &size in sizes {
        for &precision in precisions {
            progress(size, precision)?;
            let seconds = measure(size, precision)?;
            let result = ThroughputResult {
                size,
                precision,
                tflops: tflops(size, seconds),
            };
            log::debug!("{precision} n={size}: {seconds:.3e}s {:.2} TFLOPS", result.tflops);
            table.record(result)?;
        }
    }
    Ok(table)
}

fn time_matmul_kind<K: Kind>(device: &Device, n: usize, min_run_time: Duration) -> Result<f64> {
    let mut rng = rand::thread_rng();
    let lhs = Tensor2D::<K>::randn(device, n, n, &mut rng)?;
    let rhs = Tensor2D::<K>::randn(device, n, n, &mut rng)?;
    let dst = lhs.matmul(&rhs)?;
    let measurement = Timer::new(|| lhs.matmul_into(&rhs, &dst), || device.synchronize())
        .blocked_autorange(min_run_time)?;
    Ok(measurement.median())
}

/// Median time in seconds of an `n x n` matmul on random operands.
pub fn time_matmul(
    device: &Device,
    n: usize,
    precision: Precision,
    min_run_time: Duration,
) -> Result<f64> {
    match precision {
        Precision::F64 => time_matmul_kind::<f64>(device, n, min_run_time),
        Precision::F32 => time_matmul_kind::<f32>(device, n, min_run_time),
        Precision::F16 => time_matmul_kind::<f16>(device, n, min_run_time),
        Precision::BF16 => time_matmul_kind::<bf16>(device, n, min_run_time),
    }
}

/// Benchmarks every problem size for each of `precisions` on `device`.
pub fn run_matmul_benchmarks<P: FnMut(usize, Precision) -> Result<()>>(
    device: &Device,
    precisions: &[Precision],
    min_run_time: Duration,
    progress: P,
) -> Result<ResultTable> {
    collect_results(
        &PROBLEM_SIZES,
        precisions,
        |n, precision| time_matmul(device, n, precision, min_run_time),
        progress,
    )
}
