//! OHLC Column Reader
//!
//! Turns one tagged candle column into open/high/low/close prices through the price
//! axis mapping.
//!
//! Rows are read top to bottom: the body's top row is the open, its bottom row the
//! close, the highest and lowest tagged rows are high and low. Whether the candle rose
//! or fell is not decided here; see [`OhlcCandle::oriented`].

use crate::core::axis_y::AxisMapping;
use crate::core::column_mask::{CandleTone, ColumnMask};
use crate::core::scoring::weighted_score;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelCoord {
    pub x: u32,
    pub y: u32,
}

/// Source pixel of each price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CandlePixels {
    pub open: PixelCoord,
    pub high: PixelCoord,
    pub low: PixelCoord,
    pub close: PixelCoord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OhlcCandle {
    pub timestamp: Option<DateTime<Utc>>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
    pub pixel_coords: CandlePixels,
}

impl OhlcCandle {
    pub fn direction(&self) -> CandleDirection {
        if self.close > self.open {
            CandleDirection::Up
        } else if self.close < self.open {
            CandleDirection::Down
        } else {
            CandleDirection::Flat
        }
    }

    /// `high >= max(open, close)` and `low <= min(open, close)`.
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }

    /// Swap open and close (with their pixels) so the direction agrees with the
    /// candle's color. Unknown tone keeps the top-to-bottom reading.
    pub fn oriented(mut self, tone: CandleTone) -> Self {
        let swap = match tone {
            CandleTone::Bullish => self.close < self.open,
            CandleTone::Bearish => self.close > self.open,
            CandleTone::Unknown => false,
        };
        if swap {
            std::mem::swap(&mut self.open, &mut self.close);
            std::mem::swap(&mut self.pixel_coords.open, &mut self.pixel_coords.close);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionParams {
    /// Bodies shorter than this are treated as doji
    pub min_body_rows: u32,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self { min_body_rows: 3 }
    }
}

// Column shape scores
const CLEAR_SCORE: f64 = 0.9;
const BODY_ONLY_SCORE: f64 = 0.75;
const DOJI_SCORE: f64 = 0.6;
const DOJI_NO_WICK_SCORE: f64 = 0.5;
const WICK_ONLY_SCORE: f64 = 0.3;
const EMPTY_SCORE: f64 = 0.1;

const SHAPE_WEIGHT: f64 = 0.8;
const MAPPING_WEIGHT: f64 = 0.2;

/// Read a column with default parameters.
pub fn extract_from_column(mask: &ColumnMask, mapping: &AxisMapping) -> OhlcCandle {
    extract_with_params(mask, mapping, &ExtractionParams::default())
}

pub fn extract_with_params(
    mask: &ColumnMask,
    mapping: &AxisMapping,
    params: &ExtractionParams,
) -> OhlcCandle {
    let body = mask.body_extent();
    let wick = mask.wick_extent();

    // (open row, close row, high row, low row, shape score)
    let (open_row, close_row, high_row, low_row, shape_score) = match (body, wick) {
        (Some((body_top, body_bottom)), wick) => {
            let (high_row, low_row) = match wick {
                Some((wick_top, wick_bottom)) => {
                    (wick_top.min(body_top), wick_bottom.max(body_bottom))
                }
                None => (body_top, body_bottom),
            };
            let body_rows = body_bottom - body_top + 1;
            let score = match (body_rows >= params.min_body_rows, wick.is_some()) {
                (true, true) => CLEAR_SCORE,
                (true, false) => BODY_ONLY_SCORE,
                (false, true) => DOJI_SCORE,
                (false, false) => DOJI_NO_WICK_SCORE,
            };
            (body_top, body_bottom, high_row, low_row, score)
        }
        (None, Some((wick_top, wick_bottom))) => {
            (wick_top, wick_bottom, wick_top, wick_bottom, WICK_ONLY_SCORE)
        }
        (None, None) => {
            let top = mask.top;
            let bottom = mask.top + mask.height().saturating_sub(1);
            (top, bottom, top, bottom, EMPTY_SCORE)
        }
    };

    let price = |row: u32| mapping.inverse(row as f64);
    let at = |row: u32| PixelCoord { x: mask.x, y: row };

    let mut candle = OhlcCandle {
        timestamp: None,
        open: price(open_row),
        high: price(high_row),
        low: price(low_row),
        close: price(close_row),
        confidence: weighted_score(&[
            (shape_score, SHAPE_WEIGHT),
            (mapping.confidence, MAPPING_WEIGHT),
        ]),
        pixel_coords: CandlePixels {
            open: at(open_row),
            high: at(high_row),
            low: at(low_row),
            close: at(close_row),
        },
    };

    // Surfaced through confidence, never corrected
    if !candle.is_consistent() {
        candle.confidence *= 0.5;
    }
    candle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::axis_y::ScaleType;
    use crate::core::column_mask::PixelClass;

    /// Row 0 is 200.0, row 100 is 100.0.
    fn mapping() -> AxisMapping {
        AxisMapping::from_anchors(ScaleType::Linear, (0.0, 200.0), (100.0, 100.0), 0.9).unwrap()
    }

    fn column(body: Option<(usize, usize)>, wick: Option<(usize, usize)>) -> ColumnMask {
        let mut classes = vec![PixelClass::Other; 100];
        if let Some((top, bottom)) = wick {
            for c in &mut classes[top..=bottom] {
                *c = PixelClass::Wick;
            }
        }
        if let Some((top, bottom)) = body {
            for c in &mut classes[top..=bottom] {
                *c = PixelClass::Body;
            }
        }
        ColumnMask::new(42, 0, classes)
    }

    #[test]
    fn test_reads_body_and_wick_rows() {
        let m = mapping();
        let candle = extract_from_column(&column(Some((20, 60)), Some((10, 80))), &m);

        assert_eq!(candle.open, m.inverse(20.0));
        assert_eq!(candle.close, m.inverse(60.0));
        assert_eq!(candle.high, m.inverse(10.0));
        assert_eq!(candle.low, m.inverse(80.0));
        assert!((candle.open - 180.0).abs() < 1e-9);
        assert!((candle.low - 120.0).abs() < 1e-9);
        assert_eq!(candle.pixel_coords.high, PixelCoord { x: 42, y: 10 });
        assert_eq!(candle.pixel_coords.close, PixelCoord { x: 42, y: 60 });
        assert!(candle.timestamp.is_none());
        assert!(candle.confidence > 0.8);
    }

    #[test]
    fn test_missing_wick_falls_back_to_body() {
        let candle = extract_from_column(&column(Some((30, 50)), None), &mapping());
        assert_eq!(candle.high, candle.open);
        assert_eq!(candle.low, candle.close);
    }

    #[test]
    fn test_upper_wick_only_keeps_body_bottom_as_low() {
        let candle = extract_from_column(&column(Some((30, 50)), Some((15, 35))), &mapping());
        assert_eq!(candle.pixel_coords.high.y, 15);
        assert_eq!(candle.pixel_coords.low.y, 50);
        assert!(candle.is_consistent());
    }

    #[test]
    fn test_shape_scores_order() {
        let m = mapping();
        let clear = extract_from_column(&column(Some((20, 60)), Some((10, 80))), &m);
        let doji = extract_from_column(&column(Some((40, 41)), Some((10, 80))), &m);
        let wick_only = extract_from_column(&column(None, Some((10, 80))), &m);
        let empty = extract_from_column(&column(None, None), &m);

        assert!(clear.confidence > doji.confidence);
        assert!(doji.confidence > wick_only.confidence);
        assert!(wick_only.confidence > empty.confidence);
        assert!(wick_only.confidence < 0.5);
        assert!(empty.confidence < 0.5);
        assert!(empty.confidence > 0.0);
    }

    #[test]
    fn test_empty_column_spans_whole_column() {
        let candle = extract_from_column(&column(None, None), &mapping());
        assert_eq!(candle.pixel_coords.open.y, 0);
        assert_eq!(candle.pixel_coords.close.y, 99);
        assert!((candle.open - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverted_axis_flags_inconsistency() {
        // values grow downward, so the top wick row reads lowest
        let inverted =
            AxisMapping::from_anchors(ScaleType::Linear, (0.0, 100.0), (100.0, 200.0), 0.9).unwrap();
        let mask = column(Some((20, 60)), Some((10, 80)));
        let normal = extract_from_column(&mask, &mapping());
        let flipped = extract_from_column(&mask, &inverted);
        assert!(!flipped.is_consistent());
        assert!((flipped.confidence - normal.confidence * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_orientation_follows_tone() {
        let candle = extract_from_column(&column(Some((20, 60)), Some((10, 80))), &mapping());
        assert_eq!(candle.direction(), CandleDirection::Down);

        let up = candle.clone().oriented(CandleTone::Bullish);
        assert_eq!(up.direction(), CandleDirection::Up);
        assert_eq!(up.open, candle.close);
        assert_eq!(up.pixel_coords.close.y, 20);

        let down = candle.clone().oriented(CandleTone::Bearish);
        assert_eq!(down, candle);
        assert_eq!(candle.clone().oriented(CandleTone::Unknown), candle);
    }
}
