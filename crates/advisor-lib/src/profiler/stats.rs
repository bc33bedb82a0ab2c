//! Streaming statistics for profile aggregation
//!
//! Everything here runs in constant memory per metric: running extrema and
//! sums, a least-squares slope accumulated sample by sample, and a bounded
//! reservoir for percentile estimation.

use crate::models::{MetricAggregate, Trend};
use rand::rngs::StdRng;
use rand::Rng;

/// Nearest-rank percentile of an unsorted slice; 0 for an empty slice
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Least-squares slope of values against their index
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    let mut acc = SlopeAccumulator::default();
    for v in values {
        acc.push(*v);
    }
    acc.slope()
}

#[derive(Debug, Clone, Default)]
struct SlopeAccumulator {
    n: f64,
    sum_x: f64,
    sum_y: f64,
    sum_xy: f64,
    sum_x2: f64,
}

impl SlopeAccumulator {
    fn push(&mut self, y: f64) {
        let x = self.n;
        self.n += 1.0;
        self.sum_x += x;
        self.sum_y += y;
        self.sum_xy += x * y;
        self.sum_x2 += x * x;
    }

    fn slope(&self) -> f64 {
        let denom = self.n * self.sum_x2 - self.sum_x.powi(2);
        if denom.abs() < f64::EPSILON {
            return 0.0;
        }
        (self.n * self.sum_xy - self.sum_x * self.sum_y) / denom
    }
}

/// Uniform sample of a stream with a fixed capacity
#[derive(Debug, Clone)]
pub struct Reservoir {
    capacity: usize,
    seen: u64,
    samples: Vec<f64>,
}

impl Reservoir {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: 0,
            samples: Vec::with_capacity(capacity.min(1024)),
        }
    }

    pub fn push(&mut self, value: f64, rng: &mut StdRng) {
        self.seen += 1;
        if self.samples.len() < self.capacity {
            self.samples.push(value);
            return;
        }
        let j = rng.gen_range(0..self.seen);
        if (j as usize) < self.capacity {
            self.samples[j as usize] = value;
        }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn percentile(&self, p: f64) -> f64 {
        percentile(&self.samples, p)
    }
}

/// Running statistics for one metric
#[derive(Debug, Clone)]
pub struct RunningStats {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
    first: f64,
    last: f64,
    non_decreasing: bool,
    slope: SlopeAccumulator,
    reservoir: Reservoir,
}

impl RunningStats {
    pub fn new(reservoir_size: usize) -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            first: 0.0,
            last: 0.0,
            non_decreasing: true,
            slope: SlopeAccumulator::default(),
            reservoir: Reservoir::new(reservoir_size),
        }
    }

    /// Record one observation; non-finite values are ignored
    pub fn push(&mut self, value: f64, rng: &mut StdRng) {
        if !value.is_finite() {
            return;
        }
        if self.count == 0 {
            self.first = value;
        } else if value < self.last {
            self.non_decreasing = false;
        }
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.last = value;
        self.slope.push(value);
        self.reservoir.push(value, rng);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Classify the direction of the series
    ///
    /// The fitted change across the window is compared with the mean; a
    /// relative change within `tolerance_pct` is stable.
    pub fn trend(&self, tolerance_pct: f64) -> Trend {
        if self.count < 2 {
            return Trend::InsufficientData;
        }
        let change = self.slope.slope() * (self.count - 1) as f64;
        let base = self.mean().abs();
        if base < f64::EPSILON {
            return if change.abs() < f64::EPSILON {
                Trend::Stable
            } else if change > 0.0 {
                Trend::Increasing
            } else {
                Trend::Decreasing
            };
        }
        let relative = change / base * 100.0;
        if relative > tolerance_pct {
            Trend::Increasing
        } else if relative < -tolerance_pct {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }

    pub fn aggregate(&self, tolerance_pct: f64) -> Option<MetricAggregate> {
        if self.count == 0 {
            return None;
        }
        Some(MetricAggregate {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.mean(),
            p95: self.reservoir.percentile(95.0),
            first: self.first,
            last: self.last,
            trend: self.trend(tolerance_pct),
            monotonic_increase: self.non_decreasing && self.last > self.first,
        })
    }
}
