//! Blocked auto-ranging wall clock timer.
//!
//! The statement is run in blocks of `number_per_run` calls. The block size is
//! grown until the cost of starting and stopping the clock is negligible, then
//! blocks are timed until `min_run_time` has elapsed and the median block time
//! is reported per call.
use crate::Result;
use std::time::{Duration, Instant};

const OVERHEAD_SAMPLES: usize = 5;
const MAX_RELATIVE_OVERHEAD: f64 = 1e-4;
const MAX_NUMBER_PER_RUN: u64 = i32::MAX as u64;

/// Times of the measured blocks.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub number_per_run: u64,
    pub raw_times: Vec<Duration>,
}

impl Measurement {
    /// Median time of a single call, in seconds.
    pub fn median(&self) -> f64 {
        let per_call: Vec<f64> = self
            .raw_times
            .iter()
            .map(|t| t.as_secs_f64() / self.number_per_run as f64)
            .collect();
        median(per_call)
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Repeatedly runs `stmt`. `sync` is called before starting and before stopping
/// the clock so that asynchronous work is accounted for.
pub struct Timer<F, S> {
    stmt: F,
    sync: S,
}

impl<F, S> Timer<F, S>
where
    F: FnMut() -> Result<()>,
    S: FnMut(),
{
    pub fn new(stmt: F, sync: S) -> Self {
        Self { stmt, sync }
    }

    fn timeit(&mut self, number: u64) -> Result<Duration> {
        (self.sync)();
        let start = Instant::now();
        for _ in 0..number {
            (self.stmt)()?;
        }
        (self.sync)();
        Ok(start.elapsed())
    }

    /// Finds a block size for which timer overhead is negligible, this also
    /// serves as warmup.
    fn estimate_block_size(&mut self, min_run_time: Duration) -> Result<u64> {
        let mut overheads = Vec::with_capacity(OVERHEAD_SAMPLES);
        for _ in 0..OVERHEAD_SAMPLES {
            overheads.push(self.timeit(0)?.as_secs_f64());
        }
        let overhead = median(overheads);
        let min_run_time = min_run_time.as_secs_f64();

        let mut number = 1;
        loop {
            let time_taken = self.timeit(number)?.as_secs_f64();
            let relative_overhead = overhead / time_taken;
            if relative_overhead <= MAX_RELATIVE_OVERHEAD && time_taken >= min_run_time / 1000.0 {
                break;
            }
            if time_taken > min_run_time || number * 10 > MAX_NUMBER_PER_RUN {
                break;
            }
            number *= 10;
        }
        Ok(number)
    }

    pub fn blocked_autorange(&mut self, min_run_time: Duration) -> Result<Measurement> {
        let number_per_run = self.estimate_block_size(min_run_time)?;
        log::debug!("timing blocks of {number_per_run} calls");
        let mut raw_times = vec![];
        let mut total_time = Duration::ZERO;
        while total_time < min_run_time {
            let time_spent = self.timeit(number_per_run)?;
            raw_times.push(time_spent);
            total_time += time_spent;
        }
        Ok(Measurement {
            number_per_run,
            raw_times,
        })
    }
}
