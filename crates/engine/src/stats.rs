//! Statistics over worker data points
//!
//! Latency and retry statistics are computed over successful points only;
//! failed points are counted but contribute no samples. Latencies are in
//! milliseconds. `stddev` is the sample standard deviation (`n - 1`), zero
//! for fewer than two samples.

use rowbench_core::{Outcome, ResultDataPoint, RetryKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Key of the acquire latency statistic
pub const ACQUIRE: &str = "acquire";
/// Key of the release latency statistic
pub const RELEASE: &str = "release";

/// Descriptive statistics of one series
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
    /// Sum of samples
    pub sum: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Sample standard deviation
    pub stddev: f64,
}

impl Stats {
    /// Statistics of `samples`; all zero when empty
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let n = samples.len() as f64;
        let sum: f64 = samples.iter().sum();
        let mean = sum / n;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let stddev = if samples.len() < 2 {
            0.0
        } else {
            let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        };
        Self {
            min,
            max,
            sum,
            mean,
            stddev,
        }
    }
}

/// Aggregated profile of one store call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    /// Number of calls
    pub calls: u64,
    /// Total time in the calls, in milliseconds
    pub elapsed_ms: f64,
}

/// Summary of one benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Strategy name
    pub solution: String,
    /// Wall-clock duration of the run, in seconds
    pub total_time_secs: f64,
    /// Successful cycles
    pub ok: usize,
    /// Failed cycles
    pub errors: usize,
    /// Cycles with a non-fatal check error
    pub check_errors: usize,
    /// Statistics by key (`acquire`, `release`, one per retry kind)
    pub stats: BTreeMap<String, Stats>,
    /// Store call profile by call name, empty unless profiling was on
    pub profile: BTreeMap<String, ProfileEntry>,
}

impl Summary {
    /// Statistics for `key`
    pub fn stat(&self, key: &str) -> Option<&Stats> {
        self.stats.get(key)
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Aggregate the data points of one run
pub fn summarize(solution: &str, total_time: Duration, points: &[ResultDataPoint]) -> Summary {
    let ok_points: Vec<&ResultDataPoint> = points.iter().filter(|p| p.is_ok()).collect();

    let mut series: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    series.insert(
        ACQUIRE.to_string(),
        ok_points.iter().map(|p| millis(p.acquire)).collect(),
    );
    series.insert(
        RELEASE.to_string(),
        ok_points.iter().map(|p| millis(p.release)).collect(),
    );
    for kind in RetryKind::ALL {
        series.insert(
            kind.as_str().to_string(),
            ok_points.iter().map(|p| f64::from(p.counters.get(kind))).collect(),
        );
    }

    let mut profile: BTreeMap<String, ProfileEntry> = BTreeMap::new();
    for sample in points.iter().filter_map(|p| p.profile.as_ref()).flatten() {
        let entry = profile.entry(sample.name.clone()).or_default();
        entry.calls += sample.calls;
        entry.elapsed_ms += millis(sample.elapsed);
    }

    Summary {
        solution: solution.to_string(),
        total_time_secs: total_time.as_secs_f64(),
        ok: ok_points.len(),
        errors: points
            .iter()
            .filter(|p| matches!(p.outcome, Outcome::Failed(_)))
            .count(),
        check_errors: points.iter().filter(|p| p.check_error.is_some()).count(),
        stats: series
            .into_iter()
            .map(|(key, samples)| (key, Stats::from_samples(&samples)))
            .collect(),
        profile,
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Solution: {}", self.solution)?;
        writeln!(f, "Total running time {:.2} secs", self.total_time_secs)?;
        writeln!(f, "OK: {}  Errors: {}  Check errors: {}", self.ok, self.errors, self.check_errors)?;
        for (key, s) in &self.stats {
            writeln!(
                f,
                "{:>12}: min {:.3} max {:.3} sum {:.3} mean {:.3} stddev {:.3}",
                key, s.min, s.max, s.sum, s.mean, s.stddev
            )?;
        }
        if !self.profile.is_empty() {
            writeln!(f, "Profile:")?;
            for (name, entry) in &self.profile {
                writeln!(f, "  {}: {} calls, {:.2}ms", name, entry.calls, entry.elapsed_ms)?;
            }
        }
        Ok(())
    }
}
