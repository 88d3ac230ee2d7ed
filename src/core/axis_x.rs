//! Time Axis Assignment
//!
//! Attaches a timestamp to every candle center column.
//!
//! Three strategies, picked by how much label evidence is available:
//! - two or more OCR labels: piecewise-linear interpolation between bracketing labels,
//!   nearest-pair extrapolation outside the labelled span
//! - one OCR label: fixed timeframe steps from the label column, using the median
//!   candle spacing
//! - no labels, anchor only: `anchor + index * timeframe` at a flat low confidence

use crate::core::scoring::{clamp_unit, weighted_mean};
use crate::error::{ChartError, Result};
use chrono::{DateTime, Duration, TimeDelta, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Chart timeframe (candle period).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour2,
    Hour4,
    Hour6,
    Hour12,
    Day1,
    Week1,
}

impl Timeframe {
    /// Duration of one candle in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::Min1 => 60,
            Timeframe::Min3 => 3 * 60,
            Timeframe::Min5 => 5 * 60,
            Timeframe::Min15 => 15 * 60,
            Timeframe::Min30 => 30 * 60,
            Timeframe::Hour1 => 60 * 60,
            Timeframe::Hour2 => 2 * 60 * 60,
            Timeframe::Hour4 => 4 * 60 * 60,
            Timeframe::Hour6 => 6 * 60 * 60,
            Timeframe::Hour12 => 12 * 60 * 60,
            Timeframe::Day1 => 24 * 60 * 60,
            Timeframe::Week1 => 7 * 24 * 60 * 60,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Short token, as written on chart toolbars.
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min3 => "3m",
            Timeframe::Min5 => "5m",
            Timeframe::Min15 => "15m",
            Timeframe::Min30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour2 => "2h",
            Timeframe::Hour4 => "4h",
            Timeframe::Hour6 => "6h",
            Timeframe::Hour12 => "12h",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1w",
        }
    }

    pub fn all() -> &'static [Timeframe] {
        &[
            Timeframe::Min1,
            Timeframe::Min3,
            Timeframe::Min5,
            Timeframe::Min15,
            Timeframe::Min30,
            Timeframe::Hour1,
            Timeframe::Hour2,
            Timeframe::Hour4,
            Timeframe::Hour6,
            Timeframe::Hour12,
            Timeframe::Day1,
            Timeframe::Week1,
        ]
    }
}

impl FromStr for Timeframe {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        Timeframe::all()
            .iter()
            .copied()
            .find(|tf| tf.label() == token)
            .ok_or_else(|| ChartError::InvalidTimeframe(s.to_string()))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Timeframe {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// A timestamp label read off the X axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XLabel {
    pub pixel_x: f64,
    pub timestamp: DateTime<Utc>,
    pub ocr_confidence: f64,
}

impl XLabel {
    pub fn new(pixel_x: f64, timestamp: DateTime<Utc>, ocr_confidence: f64) -> Self {
        XLabel {
            pixel_x,
            timestamp,
            ocr_confidence,
        }
    }
}

/// Pixel center of one detected candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandleCenter {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentMethod {
    Ocr,
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimestampAssignment {
    /// Index into the candle centers as passed in
    pub candle_index: usize,
    pub pixel_x: f64,
    pub timestamp: DateTime<Utc>,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
    pub method: AssignmentMethod,
}

/// Timestamps for every candle, ordered left to right.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimestampResult {
    pub assignments: Vec<TimestampAssignment>,
    pub method: AssignmentMethod,
    pub overall_confidence: f64,
    pub timeframe: Timeframe,
    pub anchor_timestamp: Option<DateTime<Utc>>,
}

/// Upper bound for interpolated OCR timestamps.
const MAX_OCR_CONFIDENCE: f64 = 0.9;
/// Extra factor for candles left or right of the labelled span.
const EXTRAPOLATION_DISCOUNT: f64 = 0.85;
/// Single-label assignments start from this fraction of the label's confidence.
const SINGLE_LABEL_FACTOR: f64 = 0.75;
/// Confidence lost per timeframe step away from the single label.
const SINGLE_LABEL_DECAY: f64 = 0.03;
const SINGLE_LABEL_FLOOR: f64 = 0.5;
/// Factor applied when the anchor disagrees with the single label.
const ANCHOR_MISMATCH_FACTOR: f64 = 0.7;
/// Anchor-only assignments.
pub const ESTIMATED_CONFIDENCE: f64 = 0.4;
/// Factor for a timestamp that left the representable date range and was clamped.
const OUT_OF_RANGE_FACTOR: f64 = 0.1;

/// Add a (possibly fractional) number of milliseconds. `None` when the result leaves
/// chrono's date range.
fn offset_millis(base: DateTime<Utc>, millis: f64) -> Option<DateTime<Utc>> {
    let millis = millis.round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    base.checked_add_signed(TimeDelta::try_milliseconds(millis as i64)?)
}

/// [`offset_millis`], clamped into `[lo, hi]` on overflow. The flag is set when clamped.
fn offset_or_clamp(
    base: DateTime<Utc>,
    millis: f64,
    lo: DateTime<Utc>,
    hi: DateTime<Utc>,
) -> (DateTime<Utc>, bool) {
    match offset_millis(base, millis) {
        Some(t) => (t, false),
        None if millis.is_nan() => (base, true),
        None if millis < 0.0 => (lo, true),
        None => (hi, true),
    }
}

/// Pick the label pair used for `x`. Returns `(left, right, inside_span)`.
fn bracket(labels: &[XLabel], x: f64) -> (usize, usize, bool) {
    let n = labels.len();
    match labels.iter().rposition(|l| l.pixel_x <= x) {
        None => (0, 1, false),
        Some(i) if i + 1 >= n => (n - 2, n - 1, (x - labels[n - 1].pixel_x).abs() < 1e-9),
        Some(i) => (i, i + 1, true),
    }
}

/// Labels sorted by column with duplicate columns collapsed to the most confident one.
fn distinct_labels(labels: &[XLabel]) -> Vec<XLabel> {
    let mut sorted: Vec<XLabel> = labels
        .iter()
        .copied()
        .filter(|l| l.pixel_x.is_finite())
        .collect();
    sorted.sort_by(|a, b| a.pixel_x.total_cmp(&b.pixel_x));

    let mut out: Vec<XLabel> = Vec::with_capacity(sorted.len());
    for label in sorted {
        match out.last_mut() {
            Some(last) if (last.pixel_x - label.pixel_x).abs() < 0.5 => {
                if label.ocr_confidence > last.ocr_confidence {
                    *last = label;
                }
            }
            _ => out.push(label),
        }
    }
    out
}

fn median_spacing(sorted_xs: &[f64]) -> f64 {
    let mut gaps: Vec<f64> = sorted_xs
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|g| *g > 1e-9)
        .collect();
    if gaps.is_empty() {
        return 1.0;
    }
    gaps.sort_by(|a, b| a.total_cmp(b));
    gaps[gaps.len() / 2]
}

/// Assign timestamps to candle centers.
///
/// # Errors
/// - `InvalidTimeframe` for an unrecognized timeframe token
/// - `InsufficientData` when there are no labels and no anchor
pub fn assign_timestamps(
    candle_centers: &[CandleCenter],
    labels: &[XLabel],
    timeframe: &str,
    anchor_timestamp: Option<DateTime<Utc>>,
) -> Result<TimestampResult> {
    let tf: Timeframe = timeframe.parse()?;

    let labels = distinct_labels(labels);
    if labels.is_empty() && anchor_timestamp.is_none() {
        return Err(ChartError::InsufficientData(
            "no time labels and no anchor timestamp".to_string(),
        ));
    }

    // Left to right, remembering the caller's indices
    let mut order: Vec<(usize, CandleCenter)> = candle_centers.iter().copied().enumerate().collect();
    order.sort_by(|a, b| a.1.x.total_cmp(&b.1.x));

    let (assignments, method, consistency) = match labels.len() {
        0 => {
            let Some(anchor) = anchor_timestamp else {
                return Err(ChartError::InsufficientData(
                    "no time labels and no anchor timestamp".to_string(),
                ));
            };
            (
                assign_from_anchor(&order, anchor, tf),
                AssignmentMethod::Estimated,
                1.0,
            )
        }
        1 => (
            assign_from_single_label(&order, &labels[0], tf, anchor_timestamp),
            AssignmentMethod::Ocr,
            1.0,
        ),
        _ => {
            let increasing = labels.windows(2).all(|w| w[1].timestamp > w[0].timestamp);
            if !increasing {
                warn!("time labels are not increasing left to right; OCR likely misread one");
            }
            (
                interpolate_labels(&order, &labels),
                AssignmentMethod::Ocr,
                if increasing { 1.0 } else { 0.5 },
            )
        }
    };

    let overall_confidence =
        clamp_unit(consistency * weighted_mean(assignments.iter().map(|a| (a.confidence, 1.0))));

    debug!(
        "time axis: {} candles, {} labels, method {:?}, confidence {:.2}",
        assignments.len(),
        labels.len(),
        method,
        overall_confidence
    );

    Ok(TimestampResult {
        assignments,
        method,
        overall_confidence,
        timeframe: tf,
        anchor_timestamp,
    })
}

fn interpolate_labels(order: &[(usize, CandleCenter)], labels: &[XLabel]) -> Vec<TimestampAssignment> {
    order
        .iter()
        .map(|&(index, center)| {
            let (i, j, inside) = bracket(labels, center.x);
            let a = &labels[i];
            let b = &labels[j];

            let span_ms = (b.timestamp - a.timestamp).num_milliseconds() as f64;
            let t = (center.x - a.pixel_x) / (b.pixel_x - a.pixel_x);
            // Labels may be out of order; overflow clamps into their span
            let (timestamp, clamped) = offset_or_clamp(
                a.timestamp,
                t * span_ms,
                a.timestamp.min(b.timestamp),
                a.timestamp.max(b.timestamp),
            );
            if clamped {
                warn!(
                    "timestamp for column {:.1} overflows between labels {} and {}; clamped",
                    center.x, a.timestamp, b.timestamp
                );
            }

            let pair_confidence = clamp_unit((a.ocr_confidence + b.ocr_confidence) / 2.0)
                .min(MAX_OCR_CONFIDENCE);
            let mut confidence = if inside {
                pair_confidence
            } else {
                pair_confidence * EXTRAPOLATION_DISCOUNT
            };
            if clamped {
                confidence *= OUT_OF_RANGE_FACTOR;
            }

            TimestampAssignment {
                candle_index: index,
                pixel_x: center.x,
                timestamp,
                confidence,
                method: AssignmentMethod::Ocr,
            }
        })
        .collect()
}

fn assign_from_single_label(
    order: &[(usize, CandleCenter)],
    label: &XLabel,
    tf: Timeframe,
    anchor: Option<DateTime<Utc>>,
) -> Vec<TimestampAssignment> {
    let xs: Vec<f64> = order.iter().map(|(_, c)| c.x).collect();
    let spacing = median_spacing(&xs);
    let step_ms = tf.seconds() as f64 * 1000.0;

    let steps_from_label = |x: f64| ((x - label.pixel_x) / spacing).round();

    // The anchor is taken as the first candle's open time
    let anchor_factor = match (anchor, xs.first()) {
        (Some(anchor), Some(&first_x)) => {
            let drift_ms = offset_millis(label.timestamp, steps_from_label(first_x) * step_ms)
                .map(|expected| (expected - anchor).num_milliseconds().abs() as f64);
            match drift_ms {
                Some(drift_ms) if drift_ms <= step_ms / 2.0 => 1.0,
                _ => {
                    warn!(
                        "anchor {} disagrees with time label {} ({:?} ms apart)",
                        anchor, label.timestamp, drift_ms
                    );
                    ANCHOR_MISMATCH_FACTOR
                }
            }
        }
        _ => 1.0,
    };

    let base = clamp_unit(label.ocr_confidence).min(MAX_OCR_CONFIDENCE)
        * SINGLE_LABEL_FACTOR
        * anchor_factor;

    order
        .iter()
        .map(|&(index, center)| {
            let steps = steps_from_label(center.x);
            let decay = (1.0 - SINGLE_LABEL_DECAY * steps.abs()).max(SINGLE_LABEL_FLOOR);
            let (timestamp, clamped) = offset_or_clamp(
                label.timestamp,
                steps * step_ms,
                DateTime::<Utc>::MIN_UTC,
                DateTime::<Utc>::MAX_UTC,
            );
            if clamped {
                warn!("{} steps from label {} leave the date range; clamped", steps, label.timestamp);
            }
            TimestampAssignment {
                candle_index: index,
                pixel_x: center.x,
                timestamp,
                confidence: if clamped { base * decay * OUT_OF_RANGE_FACTOR } else { base * decay },
                method: if steps == 0.0 {
                    AssignmentMethod::Ocr
                } else {
                    AssignmentMethod::Estimated
                },
            }
        })
        .collect()
}

fn assign_from_anchor(
    order: &[(usize, CandleCenter)],
    anchor: DateTime<Utc>,
    tf: Timeframe,
) -> Vec<TimestampAssignment> {
    let step_ms = tf.seconds() as f64 * 1000.0;
    order
        .iter()
        .enumerate()
        .map(|(position, &(index, center))| {
            let (timestamp, clamped) = offset_or_clamp(
                anchor,
                position as f64 * step_ms,
                DateTime::<Utc>::MIN_UTC,
                DateTime::<Utc>::MAX_UTC,
            );
            TimestampAssignment {
                candle_index: index,
                pixel_x: center.x,
                timestamp,
                confidence: if clamped {
                    ESTIMATED_CONFIDENCE * OUT_OF_RANGE_FACTOR
                } else {
                    ESTIMATED_CONFIDENCE
                },
                method: AssignmentMethod::Estimated,
            }
        })
        .collect()
}
