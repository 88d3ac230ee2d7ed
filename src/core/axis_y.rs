//! Price Axis Mapping
//!
//! Builds the pixel-row <-> price mapping from OCR price labels.
//!
//! # Algorithm
//! 1. Sort labels by pixel row
//! 2. Decide linear vs logarithmic: least-squares fit quality of `value ~ y` against
//!    `log10(value) ~ y`, gated on roughly constant consecutive value ratios
//! 3. Two-point closed form between the extreme labels
//! 4. Confidence from OCR confidence, label count, spacing evenness and fit quality

use crate::core::line_fit::fit_line;
use crate::core::scoring::{clamp_unit, coefficient_of_variation, weighted_score};
use crate::error::{ChartError, Result};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleType {
    Linear,
    Logarithmic,
}

/// A price label read off the Y axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YLabel {
    pub pixel_y: f64,
    pub value: f64,
    pub ocr_confidence: f64,
}

impl YLabel {
    pub fn new(pixel_y: f64, value: f64, ocr_confidence: f64) -> Self {
        YLabel {
            pixel_y,
            value,
            ocr_confidence,
        }
    }
}

/// Immutable pixel <-> value mapping for one axis.
///
/// Both directions clamp to the calibrated range instead of extrapolating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisMapping {
    pub scale_type: ScaleType,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
    pub domain_min: f64,
    pub domain_max: f64,
    pub pixel_min: f64,
    pub pixel_max: f64,
    /// Value at `pixel_min`
    value_at_pixel_min: f64,
    /// Value at `pixel_max`
    value_at_pixel_max: f64,
}

impl AxisMapping {
    /// Build a mapping through two anchors.
    ///
    /// # Errors
    /// `InsufficientData` when the anchors share a pixel or a value, or when a
    /// logarithmic mapping is requested with a non-positive anchor value.
    pub fn from_anchors(
        scale_type: ScaleType,
        (pixel_a, value_a): (f64, f64),
        (pixel_b, value_b): (f64, f64),
        confidence: f64,
    ) -> Result<Self> {
        if (pixel_a - pixel_b).abs() < 1e-9 {
            return Err(ChartError::InsufficientData(
                "axis labels share a single pixel position".to_string(),
            ));
        }
        if (value_a - value_b).abs() < 1e-12 {
            return Err(ChartError::InsufficientData(
                "axis labels share a single value".to_string(),
            ));
        }
        if scale_type == ScaleType::Logarithmic && (value_a <= 0.0 || value_b <= 0.0) {
            return Err(ChartError::InsufficientData(
                "logarithmic axis needs positive label values".to_string(),
            ));
        }

        let ((p0, v0), (p1, v1)) = if pixel_a < pixel_b {
            ((pixel_a, value_a), (pixel_b, value_b))
        } else {
            ((pixel_b, value_b), (pixel_a, value_a))
        };

        Ok(AxisMapping {
            scale_type,
            confidence: clamp_unit(confidence),
            domain_min: v0.min(v1),
            domain_max: v0.max(v1),
            pixel_min: p0,
            pixel_max: p1,
            value_at_pixel_min: v0,
            value_at_pixel_max: v1,
        })
    }

    #[inline]
    fn to_linear_space(&self, value: f64) -> f64 {
        match self.scale_type {
            ScaleType::Linear => value,
            ScaleType::Logarithmic => value.log10(),
        }
    }

    #[inline]
    fn from_linear_space(&self, value: f64) -> f64 {
        match self.scale_type {
            ScaleType::Linear => value,
            ScaleType::Logarithmic => 10f64.powf(value),
        }
    }

    /// Value -> pixel. Values outside the domain clamp to the nearest end.
    pub fn forward(&self, value: f64) -> f64 {
        let v = value.clamp(self.domain_min, self.domain_max);
        let s0 = self.to_linear_space(self.value_at_pixel_min);
        let s1 = self.to_linear_space(self.value_at_pixel_max);
        let t = (self.to_linear_space(v) - s0) / (s1 - s0);
        self.pixel_min + t * (self.pixel_max - self.pixel_min)
    }

    /// Pixel -> value. Pixels outside `[pixel_min, pixel_max]` clamp to the nearest end.
    pub fn inverse(&self, pixel: f64) -> f64 {
        let p = pixel.clamp(self.pixel_min, self.pixel_max);
        let t = (p - self.pixel_min) / (self.pixel_max - self.pixel_min);
        let s0 = self.to_linear_space(self.value_at_pixel_min);
        let s1 = self.to_linear_space(self.value_at_pixel_max);
        self.from_linear_space(s0 + t * (s1 - s0))
    }

    /// True when values grow toward higher pixel coordinates.
    pub fn increases_with_pixel(&self) -> bool {
        self.value_at_pixel_max > self.value_at_pixel_min
    }
}

/// Ratio consistency needed before a log scale is considered.
const MAX_LOG_RATIO_CV: f64 = 0.25;
/// How much better the log fit must be.
const LOG_FIT_MARGIN: f64 = 0.01;

/// Decide the scale type for labels already sorted by pixel. Returns the chosen type and
/// the R² of its fit.
fn detect_scale_type(labels: &[YLabel]) -> (ScaleType, f64) {
    let linear_pts: Vec<(f64, f64)> = labels.iter().map(|l| (l.pixel_y, l.value)).collect();
    let linear_r2 = fit_line(&linear_pts).map(|f| f.r_squared).unwrap_or(1.0);

    if labels.len() < 3 || labels.iter().any(|l| l.value <= 0.0) {
        return (ScaleType::Linear, linear_r2);
    }

    let log_pts: Vec<(f64, f64)> = labels
        .iter()
        .map(|l| (l.pixel_y, l.value.log10()))
        .collect();
    let log_r2 = fit_line(&log_pts).map(|f| f.r_squared).unwrap_or(0.0);

    // Per-pixel ratios, so uneven label spacing does not hide a constant growth rate
    let ratios: Vec<f64> = labels
        .windows(2)
        .filter(|w| (w[1].pixel_y - w[0].pixel_y).abs() > 1e-9)
        .map(|w| (w[1].value / w[0].value).ln().abs() / (w[1].pixel_y - w[0].pixel_y).abs())
        .collect();
    let ratio_cv = coefficient_of_variation(&ratios);

    debug!(
        "scale test: linear r2={:.4}, log r2={:.4}, ratio cv={:.3}",
        linear_r2, log_r2, ratio_cv
    );

    if ratio_cv < MAX_LOG_RATIO_CV && log_r2 > linear_r2 + LOG_FIT_MARGIN {
        (ScaleType::Logarithmic, log_r2)
    } else {
        (ScaleType::Linear, linear_r2)
    }
}

/// Build the price mapping from OCR labels.
///
/// # Errors
/// `InsufficientData` with fewer than two usable labels, or when the extreme labels
/// cannot anchor a mapping.
pub fn compute_y_mapping(labels: &[YLabel]) -> Result<AxisMapping> {
    let mut sorted: Vec<YLabel> = labels
        .iter()
        .copied()
        .filter(|l| l.pixel_y.is_finite() && l.value.is_finite())
        .collect();

    if sorted.len() < 2 {
        return Err(ChartError::InsufficientData(format!(
            "need at least 2 price labels, got {}",
            sorted.len()
        )));
    }

    sorted.sort_by(|a, b| a.pixel_y.total_cmp(&b.pixel_y));

    let (scale_type, fit_r2) = detect_scale_type(&sorted);

    // Confidence
    let mean_ocr =
        sorted.iter().map(|l| clamp_unit(l.ocr_confidence)).sum::<f64>() / sorted.len() as f64;
    let count_score = (0.5 + 0.125 * sorted.len() as f64).min(1.0);
    let gaps: Vec<f64> = sorted
        .windows(2)
        .map(|w| w[1].pixel_y - w[0].pixel_y)
        .collect();
    let spacing_penalty = (coefficient_of_variation(&gaps) * 0.5).min(0.3);
    let confidence = weighted_score(&[(mean_ocr, 0.5), (count_score, 0.3), (fit_r2, 0.2)])
        - spacing_penalty;

    let first = sorted[0];
    let last = sorted[sorted.len() - 1];
    let mapping = AxisMapping::from_anchors(
        scale_type,
        (first.pixel_y, first.value),
        (last.pixel_y, last.value),
        confidence,
    )?;

    debug!(
        "price axis: {:?} over {} labels, confidence {:.2}",
        mapping.scale_type,
        sorted.len(),
        mapping.confidence
    );

    Ok(mapping)
}
