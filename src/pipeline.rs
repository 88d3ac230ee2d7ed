//! Chart Reader
//!
//! Runs every stage over one screenshot and joins the results.
//!
//! # Data flow
//! 1. Plot area: manual corners when given, else contour detection on the edge map with
//!    an axis-line second chance when contours fall back
//! 2. Price axis from the OCR price readings inside the plot rows
//! 3. Candle palette learned from the plot crop
//! 4. Column masks (palette or external segmentation) grouped into candle spans
//! 5. One OHLC reading per span, in parallel, oriented by candle color
//! 6. Timestamps from the OCR time readings and/or an anchor

use crate::config::EngineConfig;
use crate::core::axis_x::{assign_timestamps, CandleCenter, Timeframe, TimestampResult};
use crate::core::axis_y::{compute_y_mapping, AxisMapping, YLabel};
use crate::core::candle_palette::{detect_candle_colors, CandleColorDetectionResult};
use crate::core::column_mask::{
    apply_color_votes, build_column_masks, masks_from_segmentation, merge_span, segment_candles,
    CandleSpan, ColumnMask, SegmentationMask,
};
use crate::core::column_reader::{extract_with_params, OhlcCandle};
use crate::core::edge_scan::{bounds_from_axis_lines, detect_edges, find_axis_lines};
use crate::core::label_text::{x_labels_from_readings, y_labels_from_readings, OcrReading};
use crate::core::pixel_buffer::PixelBuffer;
use crate::core::plot_area::{
    calibrate_manual, detect_automatic, PlotAreaBounds, PlotCorners, FALLBACK_CONFIDENCE,
};
use crate::core::scoring::{weighted_mean, weighted_score};
use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything known about a chart besides its pixels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartRequest {
    /// OCR readings from the price axis (pixel row, text, confidence)
    pub price_readings: Vec<OcrReading>,
    /// OCR readings from the time axis (pixel column, text, confidence)
    pub time_readings: Vec<OcrReading>,
    pub corners: Option<PlotCorners>,
    /// Overrides the configured timeframe
    pub timeframe: Option<String>,
    /// Open time of the leftmost candle
    pub anchor: Option<DateTime<Utc>>,
    /// Date for clock-only time labels; defaults to the anchor's date, then today
    pub reference_date: Option<NaiveDate>,
    #[serde(skip)]
    pub segmentation: Option<SegmentationMask>,
}

/// Full result for one chart.
#[derive(Debug, Clone, Serialize)]
pub struct ChartReading {
    pub bounds: PlotAreaBounds,
    pub y_mapping: AxisMapping,
    pub palette: CandleColorDetectionResult,
    /// Left to right
    pub candles: Vec<OhlcCandle>,
    pub timestamps: Option<TimestampResult>,
    /// Confidence score (0.0 - 1.0)
    pub overall_confidence: f64,
}

// Stage weights for the overall confidence
const PLOT_WEIGHT: f64 = 0.2;
const Y_AXIS_WEIGHT: f64 = 0.25;
const PALETTE_WEIGHT: f64 = 0.15;
const CANDLE_WEIGHT: f64 = 0.25;
const TIME_WEIGHT: f64 = 0.15;

#[derive(Debug, Clone, Default)]
pub struct ChartReader {
    config: EngineConfig,
}

impl ChartReader {
    pub fn new(config: EngineConfig) -> Self {
        ChartReader { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decode an image file and read it.
    pub fn read_file(&self, path: impl AsRef<Path>, request: &ChartRequest) -> Result<ChartReading> {
        let buffer = PixelBuffer::open(path)?;
        self.read(&buffer, request)
    }

    /// Read one chart.
    ///
    /// # Errors
    /// Structural problems only: bad manual corners, an unknown timeframe, fewer than two
    /// usable price labels. Weak input lowers confidences instead.
    pub fn read(&self, buffer: &PixelBuffer, request: &ChartRequest) -> Result<ChartReading> {
        let timeframe = request
            .timeframe
            .as_deref()
            .unwrap_or(&self.config.timestamps.timeframe)
            .parse::<Timeframe>()?;

        let bounds = self.locate_plot_area(buffer, request.corners.as_ref())?;
        info!(
            "plot area {}x{} at ({}, {}), {:?}, confidence {:.2}",
            bounds.width, bounds.height, bounds.x, bounds.y, bounds.method, bounds.confidence
        );

        let y_labels = labels_in_plot_rows(y_labels_from_readings(&request.price_readings), &bounds);
        let y_mapping = compute_y_mapping(&y_labels)?;
        info!(
            "price axis {:?} over {:.4}..{:.4}, confidence {:.2}",
            y_mapping.scale_type, y_mapping.domain_min, y_mapping.domain_max, y_mapping.confidence
        );

        let crop = buffer.crop(&bounds)?;
        let palette = detect_candle_colors(
            &crop,
            Some(&self.config.kmeans),
            Some(&self.config.histogram),
        );
        if !palette.profile.has_candle_colors() {
            warn!("no candle colors found in the plot area");
        }

        let masks = match &request.segmentation {
            Some(segmentation) => {
                let mut masks = masks_from_segmentation(segmentation, &bounds);
                apply_color_votes(
                    &mut masks,
                    buffer,
                    &palette.profile,
                    self.config.masks.color_tolerance,
                );
                masks
            }
            None => build_column_masks(buffer, &bounds, &palette.profile, &self.config.masks),
        };

        let spans = segment_candles(&masks, self.config.masks.min_body_width);
        if spans.is_empty() {
            warn!("no candles found in the plot area");
        }
        let (centers, mut candles) = self.extract_candles(&masks, &spans, &y_mapping);
        info!("extracted {} candles", candles.len());

        let timestamps = self.assign_times(request, timeframe, &centers)?;
        if let Some(result) = &timestamps {
            for a in &result.assignments {
                if let Some(candle) = candles.get_mut(a.candle_index) {
                    candle.timestamp = Some(a.timestamp);
                }
            }
        }

        let mean_candle = weighted_mean(candles.iter().map(|c| (c.confidence, 1.0)));
        let mut parts = vec![
            (bounds.confidence, PLOT_WEIGHT),
            (y_mapping.confidence, Y_AXIS_WEIGHT),
            (palette.profile.overall_confidence, PALETTE_WEIGHT),
            (mean_candle, CANDLE_WEIGHT),
        ];
        if let Some(result) = &timestamps {
            parts.push((result.overall_confidence, TIME_WEIGHT));
        }
        let overall_confidence = weighted_score(&parts);
        info!("chart read with overall confidence {:.2}", overall_confidence);

        Ok(ChartReading {
            bounds,
            y_mapping,
            palette,
            candles,
            timestamps,
            overall_confidence,
        })
    }

    fn locate_plot_area(
        &self,
        buffer: &PixelBuffer,
        corners: Option<&PlotCorners>,
    ) -> Result<PlotAreaBounds> {
        if let Some(corners) = corners {
            return calibrate_manual(buffer.width(), buffer.height(), corners);
        }

        let edges = detect_edges(buffer, &self.config.edges);
        let bounds = detect_automatic(&edges, &self.config.plot_area);
        if bounds.confidence > FALLBACK_CONFIDENCE {
            return Ok(bounds);
        }

        let lines = find_axis_lines(&edges, self.config.edges.min_line_coverage);
        match bounds_from_axis_lines(&lines) {
            Some(from_lines) => {
                debug!(
                    "axis lines {:?} / {:?} replace the fallback plot area",
                    lines.horizontal, lines.vertical
                );
                Ok(from_lines)
            }
            None => Ok(bounds),
        }
    }

    fn extract_candles(
        &self,
        masks: &[ColumnMask],
        spans: &[CandleSpan],
        y_mapping: &AxisMapping,
    ) -> (Vec<CandleCenter>, Vec<OhlcCandle>) {
        let params = &self.config.extraction;
        spans
            .par_iter()
            .filter_map(|span| {
                let merged = merge_span(masks, span)?;
                let candle = extract_with_params(&merged, y_mapping, params).oriented(merged.tone());
                let center_y = match merged.body_extent().or(merged.wick_extent()) {
                    Some((top, bottom)) => (top as f64 + bottom as f64) / 2.0,
                    None => merged.top as f64 + merged.height() as f64 / 2.0,
                };
                Some((
                    CandleCenter {
                        x: span.center_x(),
                        y: center_y,
                    },
                    candle,
                ))
            })
            .unzip()
    }

    fn assign_times(
        &self,
        request: &ChartRequest,
        timeframe: Timeframe,
        centers: &[CandleCenter],
    ) -> Result<Option<TimestampResult>> {
        let reference_date = request
            .reference_date
            .or(request.anchor.map(|a| a.date_naive()))
            .unwrap_or_else(|| Utc::now().date_naive());
        let x_labels = x_labels_from_readings(&request.time_readings, reference_date);

        if x_labels.is_empty() && request.anchor.is_none() {
            debug!("no time labels and no anchor; candles stay untimed");
            return Ok(None);
        }

        let result = assign_timestamps(centers, &x_labels, timeframe.label(), request.anchor)?;
        info!(
            "timestamps via {:?} for {} candles, confidence {:.2}",
            result.method,
            result.assignments.len(),
            result.overall_confidence
        );
        Ok(Some(result))
    }
}

/// Keep labels on rows inside the plot area, unless that leaves fewer than two.
fn labels_in_plot_rows(labels: Vec<YLabel>, bounds: &PlotAreaBounds) -> Vec<YLabel> {
    let inside: Vec<YLabel> = labels
        .iter()
        .copied()
        .filter(|l| bounds.contains_row(l.pixel_y))
        .collect();
    if inside.len() >= 2 {
        inside
    } else {
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::axis_x::AssignmentMethod;
    use crate::core::column_reader::CandleDirection;
    use crate::core::plot_area::{ClickPoint, DetectionMethod};
    use crate::error::ChartError;
    use image::{DynamicImage, Rgb, RgbImage};

    const GREEN: Rgb<u8> = Rgb([0, 180, 70]);
    const RED: Rgb<u8> = Rgb([220, 40, 40]);

    fn draw_candle(img: &mut RgbImage, x: u32, body: (u32, u32), wick: (u32, u32), color: Rgb<u8>) {
        for y in wick.0..=wick.1 {
            img.put_pixel(x + 3, y, color);
        }
        for dx in 0..7 {
            for y in body.0..=body.1 {
                img.put_pixel(x + dx, y, color);
            }
        }
    }

    /// 200x150 white chart, rows 0..150 span 150.0 down to 0.0 (one unit per row).
    fn two_candle_chart() -> PixelBuffer {
        let mut img = RgbImage::from_pixel(200, 150, Rgb([255, 255, 255]));
        // rising: open row 100 (50.0), close row 60 (90.0), high row 40, low row 120
        draw_candle(&mut img, 40, (60, 100), (40, 120), GREEN);
        // falling: open row 70 (80.0), close row 110 (40.0), high row 50, low row 130
        draw_candle(&mut img, 120, (70, 110), (50, 130), RED);
        PixelBuffer::from_image(&DynamicImage::ImageRgb8(img)).unwrap()
    }

    fn request() -> ChartRequest {
        ChartRequest {
            price_readings: vec![
                OcrReading::new(10.0, "140", 0.95),
                OcrReading::new(140.0, "10", 0.95),
            ],
            corners: Some(PlotCorners {
                top_left: ClickPoint::new(0, 0),
                top_right: ClickPoint::new(200, 0),
                bottom_left: ClickPoint::new(0, 150),
            }),
            timeframe: Some("1h".to_string()),
            anchor: Some(DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z").unwrap().with_timezone(&Utc)),
            ..ChartRequest::default()
        }
    }

    #[test]
    fn test_reads_two_candles() {
        let reading = ChartReader::default()
            .read(&two_candle_chart(), &request())
            .unwrap();

        assert_eq!(reading.bounds.method, DetectionMethod::Manual);
        assert_eq!(reading.candles.len(), 2);

        let up = &reading.candles[0];
        assert_eq!(up.direction(), CandleDirection::Up);
        assert!((up.open - 50.0).abs() < 1e-6);
        assert!((up.close - 90.0).abs() < 1e-6);
        assert!((up.high - 110.0).abs() < 1e-6);
        assert!((up.low - 30.0).abs() < 1e-6);

        let down = &reading.candles[1];
        assert_eq!(down.direction(), CandleDirection::Down);
        assert!((down.open - 80.0).abs() < 1e-6);
        assert!((down.close - 40.0).abs() < 1e-6);

        let ts = reading.timestamps.as_ref().unwrap();
        assert_eq!(ts.method, AssignmentMethod::Estimated);
        assert_eq!(
            down.timestamp.unwrap() - up.timestamp.unwrap(),
            chrono::Duration::hours(1)
        );
        assert!(reading.overall_confidence > 0.5);
    }

    #[test]
    fn test_unknown_timeframe_is_rejected() {
        let mut req = request();
        req.timeframe = Some("2d".to_string());
        let err = ChartReader::default().read(&two_candle_chart(), &req).unwrap_err();
        assert!(matches!(err, ChartError::InvalidTimeframe(_)));
    }

    #[test]
    fn test_single_price_label_is_rejected() {
        let mut req = request();
        req.price_readings.truncate(1);
        let err = ChartReader::default().read(&two_candle_chart(), &req).unwrap_err();
        assert!(matches!(err, ChartError::InsufficientData(_)));
    }

    #[test]
    fn test_no_time_information_leaves_candles_untimed() {
        let mut req = request();
        req.anchor = None;
        let reading = ChartReader::default().read(&two_candle_chart(), &req).unwrap();
        assert!(reading.timestamps.is_none());
        assert!(reading.candles.iter().all(|c| c.timestamp.is_none()));
    }

    #[test]
    fn test_external_segmentation_is_used() {
        let mut data = vec![0u8; 200 * 150];
        // one candle at columns 40..47, body rows 60..=100, wick at column 43 rows 40..=120
        for y in 40..=120usize {
            data[y * 200 + 43] = 2;
        }
        for x in 40..47usize {
            for y in 60..=100usize {
                data[y * 200 + x] = 1;
            }
        }
        let mut req = request();
        req.segmentation = Some(SegmentationMask::new(200, 150, data).unwrap());

        let reading = ChartReader::default().read(&two_candle_chart(), &req).unwrap();
        assert_eq!(reading.candles.len(), 1);
        // color votes from the green pixels orient it upward
        assert_eq!(reading.candles[0].direction(), CandleDirection::Up);
    }
}
