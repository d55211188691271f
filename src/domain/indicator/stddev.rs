//! Standard deviation over a rolling window.
//!
//! Population standard deviation over the n values currently held.
//! STDDEV = sqrt(sum((x[j] - mean)^2 for j in 0..n) / n)
//! Fewer than two values yield 0.

use super::window::RollingWindow;

pub fn population_stddev(window: &RollingWindow) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window
        .iter()
        .map(|x| {
            let diff = x - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}
