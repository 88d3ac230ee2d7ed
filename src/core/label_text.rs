//! Axis Label Text
//!
//! Turns OCR readings into numeric price labels and timestamp labels.
//! The OCR engine itself lives outside this crate; it hands over
//! `(pixel coordinate, text, confidence)` triples per axis region.
//! Readings whose text cannot be parsed are skipped.

use crate::core::axis_x::XLabel;
use crate::core::axis_y::YLabel;
use crate::core::scoring::clamp_unit;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

/// One text box recognized on an axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrReading {
    /// Center of the text box along the axis (row for Y, column for X)
    pub pixel_coordinate: f64,
    pub text: String,
    /// OCR confidence (0.0 - 1.0)
    pub confidence: f64,
}

impl OcrReading {
    pub fn new(pixel_coordinate: f64, text: impl Into<String>, confidence: f64) -> Self {
        OcrReading {
            pixel_coordinate,
            text: text.into(),
            confidence,
        }
    }
}

const CURRENCY_PREFIXES: [char; 5] = ['$', '€', '£', '¥', '₩'];

/// Parse a price label.
///
/// Accepts signed decimals, scientific notation (`"1.23E+2"` -> 123), thousands
/// separators, a unicode minus, a leading currency symbol and `K`/`M`/`B` magnitude
/// suffixes. A single comma followed by anything other than three digits is read as a
/// decimal comma.
pub fn parse_price_text(text: &str) -> Option<f64> {
    let mut s: String = text
        .trim()
        .replace('\u{2212}', "-")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    // Currency symbol may sit before or after the sign
    let negative = s.starts_with('-');
    let body = s.trim_start_matches(&['-', '+'][..]);
    let body = body.trim_start_matches(&CURRENCY_PREFIXES[..]);
    s = if negative {
        format!("-{}", body)
    } else {
        body.to_string()
    };

    if !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let multiplier = match s.chars().last() {
        Some('k') | Some('K') => 1e3,
        Some('m') | Some('M') => 1e6,
        Some('b') | Some('B') => 1e9,
        _ => 1.0,
    };
    if multiplier != 1.0 {
        s.pop();
    }

    let commas = s.matches(',').count();
    if commas == 1 && !s.contains('.') {
        let decimals = s.rsplit(',').next().map(str::len).unwrap_or(0);
        if decimals != 3 {
            s = s.replace(',', ".");
        }
    }
    let s = s.replace(',', "");

    let value: f64 = s.parse().ok()?;
    let value = value * multiplier;
    value.is_finite().then_some(value)
}

const DATE_TIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

/// Parse a time-axis label into a UTC timestamp.
///
/// Full RFC 3339 stamps carry their own offset; naive date-times are taken as UTC;
/// bare clock times (`"09:00"`) are placed on `reference_date`.
pub fn parse_time_text(text: &str, reference_date: NaiveDate) -> Option<DateTime<Utc>> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
        }
    }

    for fmt in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(s, fmt) {
            return Some(reference_date.and_time(time).and_utc());
        }
    }

    None
}

/// Price labels from Y-axis readings; unparseable text is dropped.
pub fn y_labels_from_readings(readings: &[OcrReading]) -> Vec<YLabel> {
    readings
        .iter()
        .filter_map(|r| match parse_price_text(&r.text) {
            Some(value) => Some(YLabel::new(
                r.pixel_coordinate,
                value,
                clamp_unit(r.confidence),
            )),
            None => {
                debug!("skipping price label {:?} at y={}", r.text, r.pixel_coordinate);
                None
            }
        })
        .collect()
}

/// Timestamp labels from X-axis readings; unparseable text is dropped.
pub fn x_labels_from_readings(readings: &[OcrReading], reference_date: NaiveDate) -> Vec<XLabel> {
    readings
        .iter()
        .filter_map(|r| match parse_time_text(&r.text, reference_date) {
            Some(timestamp) => Some(XLabel::new(
                r.pixel_coordinate,
                timestamp,
                clamp_unit(r.confidence),
            )),
            None => {
                debug!("skipping time label {:?} at x={}", r.text, r.pixel_coordinate);
                None
            }
        })
        .collect()
}
