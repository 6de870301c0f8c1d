//! Confidence calibration
//!
//! Maps a raw confidence score to a calibrated one. Three interchangeable
//! methods are supported: temperature scaling, isotonic regression and Platt
//! scaling. The method is chosen once per deployment through configuration.

use serde::{Deserialize, Serialize};

use crate::domain::confidence::{CalibratedConfidence, CalibrationMethod};
use crate::errors::CalibrationError;

/// Bounds applied before taking a logit so 0 and 1 stay finite.
const LOGIT_EPSILON: f64 = 1e-6;

/// Held-out observation: a raw confidence and whether the answer was correct.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub raw: f64,
    pub outcome: bool,
}

impl CalibrationSample {
    pub fn new(raw: f64, outcome: bool) -> Self {
        Self { raw, outcome }
    }

    fn target(&self) -> f64 {
        if self.outcome {
            1.0
        } else {
            0.0
        }
    }
}

pub trait ConfidenceCalibrator {
    fn method(&self) -> CalibrationMethod;
    fn calibrate(&self, raw: f64) -> f64;
}

fn sigmoid(z: f64) -> f64 {
    let z = z.clamp(-500.0, 500.0);
    1.0 / (1.0 + (-z).exp())
}

fn logit(p: f64) -> f64 {
    let p = p.clamp(LOGIT_EPSILON, 1.0 - LOGIT_EPSILON);
    (p / (1.0 - p)).ln()
}

fn sanitize(raw: f64) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}

fn require_both_outcomes(
    samples: &[CalibrationSample],
    method: CalibrationMethod,
) -> Result<(), CalibrationError> {
    let positives = samples.iter().filter(|sample| sample.outcome).count();
    let negatives = samples.len() - positives;
    if samples.len() < 2 || positives == 0 || negatives == 0 {
        return Err(CalibrationError::InsufficientData { method: method.as_str() });
    }
    Ok(())
}

/// `σ(logit(x) / T)`. With `T > 1` every value moves toward 0.5.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemperatureScaling {
    temperature: f64,
}

impl TemperatureScaling {
    pub const DEFAULT_TEMPERATURE: f64 = 1.5;

    pub fn new(temperature: f64) -> Result<Self, CalibrationError> {
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(CalibrationError::InvalidTemperature(temperature));
        }
        Ok(Self { temperature })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }
}

impl ConfidenceCalibrator for TemperatureScaling {
    fn method(&self) -> CalibrationMethod {
        CalibrationMethod::Temperature
    }

    fn calibrate(&self, raw: f64) -> f64 {
        sigmoid(logit(sanitize(raw)) / self.temperature).clamp(0.0, 1.0)
    }
}

/// Monotone step fit by pool-adjacent-violators, interpolated linearly
/// between block centers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsotonicRegression {
    /// `(mean raw, mean outcome)` per pooled block, increasing in both.
    points: Vec<(f64, f64)>,
}

impl IsotonicRegression {
    pub fn fit(samples: &[CalibrationSample]) -> Result<Self, CalibrationError> {
        require_both_outcomes(samples, CalibrationMethod::Isotonic)?;

        let mut sorted: Vec<(f64, f64)> =
            samples.iter().map(|sample| (sanitize(sample.raw), sample.target())).collect();
        sorted.sort_by(|left, right| left.0.total_cmp(&right.0));

        // (sum_x, sum_y, count)
        let mut blocks: Vec<(f64, f64, f64)> = Vec::with_capacity(sorted.len());
        for (x, y) in sorted {
            blocks.push((x, y, 1.0));
            while blocks.len() >= 2 {
                let last = blocks[blocks.len() - 1];
                let prev = blocks[blocks.len() - 2];
                if prev.1 / prev.2 <= last.1 / last.2 {
                    break;
                }
                blocks.pop();
                blocks.pop();
                blocks.push((prev.0 + last.0, prev.1 + last.1, prev.2 + last.2));
            }
        }

        let points = blocks
            .into_iter()
            .map(|(sum_x, sum_y, count)| (sum_x / count, sum_y / count))
            .collect();
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}

impl ConfidenceCalibrator for IsotonicRegression {
    fn method(&self) -> CalibrationMethod {
        CalibrationMethod::Isotonic
    }

    fn calibrate(&self, raw: f64) -> f64 {
        let x = sanitize(raw);
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return x;
        };
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }

        for window in self.points.windows(2) {
            let (x0, y0) = window[0];
            let (x1, y1) = window[1];
            if x >= x0 && x <= x1 {
                if (x1 - x0).abs() < f64::EPSILON {
                    return y1;
                }
                return (y0 + (y1 - y0) * (x - x0) / (x1 - x0)).clamp(0.0, 1.0);
            }
        }
        last.1
    }
}

/// Logistic fit `σ(A·x + B)` with Platt's smoothed targets.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlattScaling {
    pub slope: f64,
    pub intercept: f64,
}

impl PlattScaling {
    /// Learning rate for batch gradient descent
    pub const LEARNING_RATE: f64 = 0.5;
    /// Number of training epochs
    pub const EPOCHS: usize = 5000;

    pub fn fit(samples: &[CalibrationSample]) -> Result<Self, CalibrationError> {
        require_both_outcomes(samples, CalibrationMethod::Platt)?;

        let positives = samples.iter().filter(|sample| sample.outcome).count() as f64;
        let negatives = samples.len() as f64 - positives;
        let high_target = (positives + 1.0) / (positives + 2.0);
        let low_target = 1.0 / (negatives + 2.0);
        let n = samples.len() as f64;

        let mut slope = 0.0;
        let mut intercept = ((positives + 1.0) / (negatives + 1.0)).ln();

        for _ in 0..Self::EPOCHS {
            let mut grad_slope = 0.0;
            let mut grad_intercept = 0.0;
            for sample in samples {
                let x = sanitize(sample.raw);
                let target = if sample.outcome { high_target } else { low_target };
                let error = sigmoid(slope * x + intercept) - target;
                grad_slope += error * x;
                grad_intercept += error;
            }
            slope -= Self::LEARNING_RATE * grad_slope / n;
            intercept -= Self::LEARNING_RATE * grad_intercept / n;
        }

        Ok(Self { slope, intercept })
    }
}

impl ConfidenceCalibrator for PlattScaling {
    fn method(&self) -> CalibrationMethod {
        CalibrationMethod::Platt
    }

    fn calibrate(&self, raw: f64) -> f64 {
        sigmoid(self.slope * sanitize(raw) + self.intercept).clamp(0.0, 1.0)
    }
}

/// The configured calibration strategy.
#[derive(Clone, Debug, PartialEq)]
pub enum Calibrator {
    Temperature(TemperatureScaling),
    Isotonic(IsotonicRegression),
    Platt(PlattScaling),
}

impl Calibrator {
    /// Builds the strategy named by `method`. Fitted methods train on
    /// `samples` immediately so a bad configuration fails at startup.
    pub fn from_settings(
        method: &str,
        temperature: f64,
        samples: &[CalibrationSample],
    ) -> Result<Self, CalibrationError> {
        let parsed = CalibrationMethod::parse(method)
            .ok_or_else(|| CalibrationError::UnknownMethod(method.trim().to_owned()))?;
        match parsed {
            CalibrationMethod::Temperature => {
                Ok(Self::Temperature(TemperatureScaling::new(temperature)?))
            }
            CalibrationMethod::Isotonic => Ok(Self::Isotonic(IsotonicRegression::fit(samples)?)),
            CalibrationMethod::Platt => Ok(Self::Platt(PlattScaling::fit(samples)?)),
        }
    }

    pub fn apply(&self, raw: f64) -> CalibratedConfidence {
        CalibratedConfidence { value: self.calibrate(raw), method: self.method() }
    }

    pub fn report(&self, samples: &[CalibrationSample]) -> CalibrationReport {
        let before: Vec<(f64, bool)> =
            samples.iter().map(|sample| (sanitize(sample.raw), sample.outcome)).collect();
        let after: Vec<(f64, bool)> =
            samples.iter().map(|sample| (self.calibrate(sample.raw), sample.outcome)).collect();
        CalibrationReport {
            method: self.method(),
            samples: samples.len(),
            ece_before: expected_calibration_error(&before, ECE_BINS),
            ece_after: expected_calibration_error(&after, ECE_BINS),
            brier_before: brier_score(&before),
            brier_after: brier_score(&after),
        }
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::Temperature(TemperatureScaling {
            temperature: TemperatureScaling::DEFAULT_TEMPERATURE,
        })
    }
}

impl ConfidenceCalibrator for Calibrator {
    fn method(&self) -> CalibrationMethod {
        match self {
            Self::Temperature(inner) => inner.method(),
            Self::Isotonic(inner) => inner.method(),
            Self::Platt(inner) => inner.method(),
        }
    }

    fn calibrate(&self, raw: f64) -> f64 {
        match self {
            Self::Temperature(inner) => inner.calibrate(raw),
            Self::Isotonic(inner) => inner.calibrate(raw),
            Self::Platt(inner) => inner.calibrate(raw),
        }
    }
}

pub const ECE_BINS: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub method: CalibrationMethod,
    pub samples: usize,
    pub ece_before: f64,
    pub ece_after: f64,
    pub brier_before: f64,
    pub brier_after: f64,
}

/// Weighted mean gap between confidence and accuracy over equal-width bins.
pub fn expected_calibration_error(predictions: &[(f64, bool)], bins: usize) -> f64 {
    if predictions.is_empty() || bins == 0 {
        return 0.0;
    }

    let mut totals = vec![(0.0_f64, 0.0_f64, 0usize); bins];
    for (confidence, outcome) in predictions {
        let confidence = sanitize(*confidence);
        let index = ((confidence * bins as f64) as usize).min(bins - 1);
        let bin = &mut totals[index];
        bin.0 += confidence;
        bin.1 += if *outcome { 1.0 } else { 0.0 };
        bin.2 += 1;
    }

    let n = predictions.len() as f64;
    totals
        .into_iter()
        .filter(|(_, _, count)| *count > 0)
        .map(|(sum_confidence, sum_correct, count)| {
            let count = count as f64;
            (count / n) * (sum_correct / count - sum_confidence / count).abs()
        })
        .sum()
}

pub fn brier_score(predictions: &[(f64, bool)]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .map(|(confidence, outcome)| {
            let target = if *outcome { 1.0 } else { 0.0 };
            (sanitize(*confidence) - target).powi(2)
        })
        .sum::<f64>()
        / predictions.len() as f64
}
