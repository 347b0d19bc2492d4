//! Mean and standard deviation for angle-valued samples.
//!
//! Samples are mapped onto the unit circle, averaged as vectors and mapped back,
//! so values on either side of the wrap point (e.g. -179° and +179°) average to
//! the wrap point rather than to the middle of the interval.

use crate::error::SweepError;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use sweep_common::vecmath::{angle_to_vec, vec_to_angle, Vec2};

/// Half-open interval `[lo, hi)` that angle samples wrap into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WrapInterval {
    pub lo: f64,
    pub hi: f64,
}

impl WrapInterval {
    /// `[-π, π)`, the interval practice and goal angles live in.
    pub const RADIANS: WrapInterval = WrapInterval { lo: -PI, hi: PI };

    pub fn new(lo: f64, hi: f64) -> Result<Self, SweepError> {
        if !(lo.is_finite() && hi.is_finite() && hi > lo) {
            return Err(SweepError::config(format!("wrap interval [{lo}, {hi}) is empty or not finite")));
        }
        Ok(Self { lo, hi })
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    /// Shifts `value` by whole interval widths until it lies in `[lo, hi)`.
    pub fn wrap(&self, value: f64) -> f64 {
        let width = self.width();
        let wrapped = self.lo + (value - self.lo).rem_euclid(width);
        // rem_euclid can round up to exactly `width` for tiny negative offsets
        if wrapped >= self.hi {
            self.lo
        } else {
            wrapped
        }
    }

    fn to_radians(self, value: f64) -> f64 {
        (value - self.lo) * TAU / self.width()
    }

    fn from_radians(self, angle: f64) -> f64 {
        self.lo + angle * self.width() / TAU
    }
}

impl Default for WrapInterval {
    fn default() -> Self {
        Self::RADIANS
    }
}

/// Mean resultant vector of the samples on the unit circle.
fn mean_resultant(samples: &[f64], interval: WrapInterval) -> Result<Vec2, SweepError> {
    if samples.is_empty() {
        return Err(SweepError::EmptySample { what: "circular sample".to_string() });
    }
    let sum = samples
        .iter()
        .map(|&s| angle_to_vec(interval.to_radians(s)))
        .fold(Vec2::zero(), |acc, v| acc + v);
    Ok(sum / samples.len() as f64)
}

/// Circular mean of `samples`, wrapped into `interval`.
///
/// Fails on an empty sample. When the unit vectors cancel exactly the direction
/// is arbitrary and `interval.lo` is returned.
pub fn circular_mean(samples: &[f64], interval: WrapInterval) -> Result<f64, SweepError> {
    let resultant = mean_resultant(samples, interval)?;
    let angle = vec_to_angle(resultant);
    Ok(interval.wrap(interval.from_radians(angle)))
}

/// Circular standard deviation `sqrt(-2 ln R)`, scaled to the interval's units.
///
/// Exactly `0.0` when every sample wraps to the same angle. Infinite when the
/// mean resultant length is zero. Fails on an empty sample.
pub fn circular_std(samples: &[f64], interval: WrapInterval) -> Result<f64, SweepError> {
    let resultant = mean_resultant(samples, interval)?;
    let first = interval.wrap(samples[0]);
    if samples.iter().all(|&s| interval.wrap(s) == first) {
        return Ok(0.0);
    }
    let r = resultant.length().min(1.0);
    Ok((-2.0 * r.ln()).sqrt() * interval.width() / TAU)
}
