// src/time_series.rs - Longitudinal growth and morphology trend analysis

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::errors::{OrganoidError, Result};
use crate::record::FeatureRecord;

/// A single observation: acquisition time plus the per-timepoint metrics
/// produced by the analysis pipeline.
#[derive(Debug, Clone)]
pub struct TimePoint {
    pub time: f64,
    pub metrics: FeatureRecord,
}

impl TimePoint {
    pub fn new(time: f64, metrics: FeatureRecord) -> Self {
        Self { time, metrics }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GrowthAnalysis {
    pub growth_rate: Vec<f64>,
    pub average_growth_rate: f64,
    pub slope: f64,
    pub r_squared: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricTrend {
    pub trend: String,
    /// Trailing window-3 rolling mean. The first two positions have no full
    /// window and are explicitly `None` rather than truncated away.
    pub moving_average: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MorphologyChanges {
    pub shape_variation: BTreeMap<String, f64>,
    pub trend_analysis: BTreeMap<String, MetricTrend>,
    pub time_points: Vec<FeatureRecord>,
}

/// An owned, always-time-sorted sequence of observations.
///
/// Single-writer by contract: callers that accumulate from multiple threads
/// must serialize access themselves.
#[derive(Debug, Default)]
pub struct TimeSeries {
    points: Vec<TimePoint>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an observation, keeping the sequence sorted ascending by time.
    ///
    /// The sort is stable, so duplicate times keep their insertion order and
    /// reruns are reproducible. Arrival order does not need to be monotonic.
    pub fn add_time_point(&mut self, point: TimePoint) {
        self.points.push(point);
        self.points
            .sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(std::cmp::Ordering::Equal));
    }

    pub fn points(&self) -> &[TimePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Derive growth statistics from the `area` metric over time.
    ///
    /// `growth_rate[i]` is the area difference between consecutive points
    /// divided by the time difference (length N-1). Slope, r² and the
    /// two-sided p-value come from an ordinary least-squares regression of
    /// area against time.
    pub fn analyze_growth(&self) -> Result<GrowthAnalysis> {
        if self.points.len() < 2 {
            return Err(OrganoidError::InsufficientDataPoints {
                required: 2,
                actual: self.points.len(),
            });
        }

        let times: Vec<f64> = self.points.iter().map(|p| p.time).collect();
        let areas: Vec<f64> = self
            .points
            .iter()
            .map(|p| p.metrics.get_f64("area").unwrap_or(0.0))
            .collect();

        let growth_rate: Vec<f64> = areas
            .windows(2)
            .zip(times.windows(2))
            .map(|(a, t)| (a[1] - a[0]) / (t[1] - t[0]))
            .collect();
        let average_growth_rate = growth_rate.iter().sum::<f64>() / growth_rate.len() as f64;

        let (slope, r_squared, p_value) = linear_regression(&times, &areas);

        Ok(GrowthAnalysis {
            growth_rate,
            average_growth_rate,
            slope,
            r_squared,
            p_value,
        })
    }

    /// Per-metric variation and trend statistics across all points.
    pub fn analyze_morphology_changes(&self) -> Result<MorphologyChanges> {
        if self.points.is_empty() {
            return Err(OrganoidError::InsufficientDataPoints {
                required: 1,
                actual: 0,
            });
        }

        let metric_names: BTreeSet<String> = self
            .points
            .iter()
            .flat_map(|p| p.metrics.keys().cloned())
            .collect();

        let mut shape_variation = BTreeMap::new();
        let mut trend_analysis = BTreeMap::new();

        for name in &metric_names {
            let values: Vec<f64> = self
                .points
                .iter()
                .map(|p| p.metrics.get_f64(name).unwrap_or(0.0))
                .collect();

            shape_variation.insert(name.clone(), sample_std_dev(&values));

            // Strict comparison: equal first and last values classify as
            // "decreasing".
            let trend = if values[values.len() - 1] > values[0] {
                "increasing"
            } else {
                "decreasing"
            };
            trend_analysis.insert(
                name.clone(),
                MetricTrend {
                    trend: trend.to_string(),
                    moving_average: rolling_mean(&values, 3),
                },
            );
        }

        let time_points = self
            .points
            .iter()
            .map(|p| {
                let mut record = p.metrics.clone();
                record.insert("time", p.time);
                record
            })
            .collect();

        Ok(MorphologyChanges {
            shape_variation,
            trend_analysis,
            time_points,
        })
    }
}

/// Sample standard deviation (n-1 denominator); 0.0 for fewer than 2 values.
fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

/// Trailing rolling mean: position i holds the mean of the last `window`
/// values ending at i, or `None` while the window is not yet full. Output
/// length always equals input length.
fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i + 1 < window {
                None
            } else {
                let slice = &values[i + 1 - window..=i];
                Some(slice.iter().sum::<f64>() / window as f64)
            }
        })
        .collect()
}

/// Ordinary least-squares regression of y on x.
///
/// Returns (slope, r_squared, p_value) with the p-value from a two-sided
/// t-test on the slope with n-2 degrees of freedom.
fn linear_regression(x: &[f64], y: &[f64]) -> (f64, f64, f64) {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    if sxx == 0.0 {
        return (0.0, 0.0, 1.0);
    }

    let slope = sxy / sxx;
    let r_squared = if syy == 0.0 { 1.0 } else { (sxy * sxy) / (sxx * syy) };

    let df = n - 2.0;
    let p_value = if df < 1.0 {
        1.0
    } else if r_squared >= 1.0 {
        0.0
    } else {
        // Two-sided p for the t statistic, via the regularized incomplete
        // beta: p = I_{df/(df+t^2)}(df/2, 1/2).
        let t_sq = r_squared * df / (1.0 - r_squared);
        incomplete_beta(df / 2.0, 0.5, df / (df + t_sq))
    };

    (slope, r_squared, p_value)
}

/// Regularized incomplete beta function I_x(a, b) by continued fraction.
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_cont_frac(a, b, x) / a
    } else {
        1.0 - front * beta_cont_frac(b, a, 1.0 - x) / b
    }
}

/// Continued fraction for the incomplete beta (modified Lentz's method).
fn beta_cont_frac(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 3e-14;
    const FPMIN: f64 = 1e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < FPMIN {
        d = FPMIN;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Natural log of the gamma function (Lanczos approximation).
fn ln_gamma(x: f64) -> f64 {
    const COEF: [f64; 6] = [
        76.18009172947146,
        -86.50532032941677,
        24.01409824083091,
        -1.231739572450155,
        0.1208650973866179e-2,
        -0.5395239384953e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000000000190015;
    for c in COEF {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.5066282746310005 * ser / x).ln()
}
