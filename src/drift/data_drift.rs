//! Two-sample Kolmogorov-Smirnov test

use crate::drift::{DriftDetector, DriftResult};
use crate::error::{PhishnetError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Above this `n * m` the exact lattice computation is replaced by the
/// asymptotic Kolmogorov distribution.
pub const EXACT_LIMIT: u64 = 25_000_000;

/// Kolmogorov-Smirnov test for distribution comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KolmogorovSmirnovTest {
    /// Drift is flagged when the p-value falls below this
    threshold: f64,
}

/// KS statistic and its two-sided p-value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KsOutcome {
    pub statistic: f64,
    pub p_value: f64,
}

impl KolmogorovSmirnovTest {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Run the test on two samples; NaN entries are dropped first.
    pub fn test(&self, reference: &[f64], current: &[f64]) -> Result<KsOutcome> {
        let mut a: Vec<f64> = reference.iter().copied().filter(|v| !v.is_nan()).collect();
        let mut b: Vec<f64> = current.iter().copied().filter(|v| !v.is_nan()).collect();
        if a.is_empty() || b.is_empty() {
            return Err(PhishnetError::DataError(
                "KS test needs at least one value in each sample".to_string(),
            ));
        }
        a.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));
        b.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));

        let n = a.len() as u64;
        let m = b.len() as u64;
        let d_num = statistic_numerator(&a, &b);
        let statistic = d_num as f64 / (n * m) as f64;

        let p_value = if d_num == 0 {
            1.0
        } else if n * m <= EXACT_LIMIT {
            exact_p_value(n, m, d_num)
        } else {
            asymptotic_p_value(n, m, statistic)
        };

        Ok(KsOutcome {
            statistic,
            p_value: p_value.clamp(0.0, 1.0),
        })
    }
}

impl Default for KolmogorovSmirnovTest {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl DriftDetector for KolmogorovSmirnovTest {
    fn detect(&self, reference: &Array1<f64>, test: &Array1<f64>) -> Result<DriftResult> {
        let reference = reference.to_vec();
        let test = test.to_vec();
        let outcome = self.test(&reference, &test)?;

        if outcome.p_value < self.threshold {
            Ok(DriftResult::drift(
                outcome.statistic,
                outcome.p_value,
                self.threshold,
                &format!(
                    "p-value {:.4} below threshold {:.4}",
                    outcome.p_value, self.threshold
                ),
            ))
        } else {
            Ok(DriftResult::no_drift(outcome.statistic, outcome.p_value, self.threshold))
        }
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// `D * n * m` as an integer: the largest `|a*m - b*n|` over all points, where
/// `a` and `b` count the values of each sorted sample that are `<=` the point.
fn statistic_numerator(a: &[f64], b: &[f64]) -> u64 {
    let n = a.len() as i64;
    let m = b.len() as i64;
    let (mut i, mut j) = (0usize, 0usize);
    let mut best = 0i64;

    while i < a.len() || j < b.len() {
        let next = match (a.get(i), b.get(j)) {
            (Some(&x), Some(&y)) => x.min(y),
            (Some(&x), None) => x,
            (None, Some(&y)) => y,
            (None, None) => break,
        };
        while i < a.len() && a[i] <= next {
            i += 1;
        }
        while j < b.len() && b[j] <= next {
            j += 1;
        }
        let diff = (i as i64 * m - j as i64 * n).abs();
        best = best.max(diff);
    }

    best as u64
}

/// P(D >= d) for samples of size `n` and `m`, with `d = d_num / (n * m)`.
///
/// Walks the lattice of merged orderings row by row, keeping the probability
/// mass of paths that have stayed strictly inside `|i*m - j*n| < d_num`.
fn exact_p_value(n: u64, m: u64, d_num: u64) -> f64 {
    let (n, m) = (n as usize, m as usize);
    let d = d_num as i64;
    let inside = |i: usize, j: usize| (i as i64 * m as i64 - j as i64 * n as i64).abs() < d;
    // Probability that the next merged value comes from the first sample.
    let step_a = |i: usize, j: usize| {
        let left_a = (n - i) as f64;
        let left_b = (m - j) as f64;
        left_a / (left_a + left_b)
    };

    let mut prev = vec![0.0f64; m + 1];
    prev[0] = 1.0;
    for j in 1..=m {
        prev[j] = if inside(0, j) { prev[j - 1] * (1.0 - step_a(0, j - 1)) } else { 0.0 };
    }

    let mut cur = vec![0.0f64; m + 1];
    for i in 1..=n {
        cur[0] = if inside(i, 0) { prev[0] * step_a(i - 1, 0) } else { 0.0 };
        for j in 1..=m {
            cur[j] = if inside(i, j) {
                prev[j] * step_a(i - 1, j) + cur[j - 1] * (1.0 - step_a(i, j - 1))
            } else {
                0.0
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    1.0 - prev[m]
}

/// Kolmogorov distribution tail with the Stephens small-sample correction.
fn asymptotic_p_value(n: u64, m: u64, statistic: f64) -> f64 {
    let en = ((n * m) as f64 / (n + m) as f64).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * statistic;
    kolmogorov_q(lambda)
}

fn kolmogorov_q(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut sum = 0.0;
    let mut sign = 1.0;
    let mut previous_term = 0.0f64;

    for k in 1..=100 {
        let kf = k as f64;
        let term = sign * 2.0 * (a2 * kf * kf).exp();
        sum += term;
        if term.abs() <= 1e-10 * previous_term.abs() || term.abs() <= 1e-16 * sum.abs() {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous_term = term;
    }

    // No convergence means lambda is tiny and the tail is 1.
    1.0
}
