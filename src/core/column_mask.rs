//! Column Masks
//!
//! Per-column pixel tags (body / wick / other) inside the plot area, built either from a
//! learned [`CandleColorProfile`] or from an external segmentation mask, plus grouping of
//! adjacent tagged columns into candle spans.

use crate::core::candle_palette::{CandleColorProfile, ColorRole};
use crate::core::pixel_buffer::PixelBuffer;
use crate::core::plot_area::PlotAreaBounds;
use crate::error::{ChartError, Result};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelClass {
    #[default]
    Other,
    Body,
    Wick,
}

impl PixelClass {
    /// Segmentation code: 1 body, 2 wick, anything else other.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => PixelClass::Body,
            2 => PixelClass::Wick,
            _ => PixelClass::Other,
        }
    }
}

/// Rising, falling, or no color evidence either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleTone {
    Bullish,
    Bearish,
    Unknown,
}

/// Tags for one image column, top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMask {
    /// Image column
    pub x: u32,
    /// Image row of `classes[0]`
    pub top: u32,
    pub classes: Vec<PixelClass>,
    pub bullish_votes: u32,
    pub bearish_votes: u32,
}

impl ColumnMask {
    pub fn new(x: u32, top: u32, classes: Vec<PixelClass>) -> Self {
        ColumnMask {
            x,
            top,
            classes,
            bullish_votes: 0,
            bearish_votes: 0,
        }
    }

    pub fn height(&self) -> u32 {
        self.classes.len() as u32
    }

    /// Image rows of the first and last pixel tagged `class`.
    pub fn extent(&self, class: PixelClass) -> Option<(u32, u32)> {
        let first = self.classes.iter().position(|&c| c == class)?;
        let last = self.classes.iter().rposition(|&c| c == class)?;
        Some((self.top + first as u32, self.top + last as u32))
    }

    pub fn body_extent(&self) -> Option<(u32, u32)> {
        self.extent(PixelClass::Body)
    }

    pub fn wick_extent(&self) -> Option<(u32, u32)> {
        self.extent(PixelClass::Wick)
    }

    pub fn count(&self, class: PixelClass) -> usize {
        self.classes.iter().filter(|&&c| c == class).count()
    }

    pub fn has_candle_pixels(&self) -> bool {
        self.classes.iter().any(|&c| c != PixelClass::Other)
    }

    pub fn tone(&self) -> CandleTone {
        use std::cmp::Ordering;
        match self.bullish_votes.cmp(&self.bearish_votes) {
            Ordering::Greater => CandleTone::Bullish,
            Ordering::Less => CandleTone::Bearish,
            Ordering::Equal => CandleTone::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskParams {
    /// Max RGB distance from a profile color for a pixel to count as that color
    pub color_tolerance: f64,
    /// Horizontal runs narrower than this are wick, not body
    pub min_body_width: u32,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            color_tolerance: 60.0,
            min_body_width: 3,
        }
    }
}

/// Image rectangle covered by `bounds`, clipped to a `width x height` frame.
fn clipped_range(bounds: &PlotAreaBounds, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let x0 = bounds.x.min(width);
    let y0 = bounds.y.min(height);
    let x1 = bounds.right().min(width);
    let y1 = bounds.bottom().min(height);
    (x0, y0, x1, y1)
}

/// Tag every pixel inside `bounds` using the palette.
///
/// Wick-role colors are wick. Fill and stroke colors are body when their horizontal run
/// of candle pixels is at least `min_body_width` wide, otherwise wick (a thin line drawn
/// in the body color).
pub fn build_column_masks(
    buffer: &PixelBuffer,
    bounds: &PlotAreaBounds,
    profile: &CandleColorProfile,
    params: &MaskParams,
) -> Vec<ColumnMask> {
    let (x0, y0, x1, y1) = clipped_range(bounds, buffer.width(), buffer.height());
    let width = (x1 - x0) as usize;
    let height = (y1 - y0) as usize;
    if width == 0 || height == 0 {
        return Vec::new();
    }

    // Row-major role grid; each row is independent
    let rows: Vec<Vec<(PixelClass, Option<ColorRole>)>> = (y0..y1)
        .into_par_iter()
        .map(|y| {
            let roles: Vec<Option<ColorRole>> = (x0..x1)
                .map(|x| profile.classify_pixel(buffer.rgb(x, y), params.color_tolerance))
                .collect();
            classify_row(&roles, params.min_body_width as usize)
        })
        .collect();

    let mut masks: Vec<ColumnMask> = (0..width)
        .map(|i| ColumnMask::new(x0 + i as u32, y0, vec![PixelClass::Other; height]))
        .collect();

    for (row, tags) in rows.iter().enumerate() {
        for (mask, &(class, role)) in masks.iter_mut().zip(tags) {
            mask.classes[row] = class;
            match role {
                Some(r) if r.is_bullish() => mask.bullish_votes += 1,
                Some(r) if r.is_bearish() => mask.bearish_votes += 1,
                _ => {}
            }
        }
    }

    debug!(
        "column masks: {} columns, {} with candle pixels",
        masks.len(),
        masks.iter().filter(|m| m.has_candle_pixels()).count()
    );
    masks
}

fn classify_row(roles: &[Option<ColorRole>], min_body_width: usize) -> Vec<(PixelClass, Option<ColorRole>)> {
    let mut out = vec![(PixelClass::Other, None); roles.len()];
    let mut start = 0;
    while start < roles.len() {
        if roles[start].is_none() {
            start += 1;
            continue;
        }
        let mut end = start;
        while end < roles.len() && roles[end].is_some() {
            end += 1;
        }
        let run = end - start;
        for i in start..end {
            let class = match roles[i] {
                Some(ColorRole::Wick) => PixelClass::Wick,
                Some(r) if r.is_body() && run >= min_body_width => PixelClass::Body,
                Some(_) => PixelClass::Wick,
                None => PixelClass::Other,
            };
            out[i] = (class, roles[i]);
        }
        start = end;
    }
    out
}

/// Per-pixel class codes from an external segmenter, in image coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    /// Row-major codes: 0 other, 1 body, 2 wick
    pub data: Vec<u8>,
}

impl SegmentationMask {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if data.len() != width as usize * height as usize {
            return Err(ChartError::ImageAccess(format!(
                "segmentation mask holds {} codes, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(SegmentationMask {
            width,
            height,
            data,
        })
    }

    /// Mask from an image whose luma values are the class codes.
    pub fn from_image(img: &image::DynamicImage) -> Self {
        let luma = img.to_luma8();
        SegmentationMask {
            width: luma.width(),
            height: luma.height(),
            data: luma.into_raw(),
        }
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let img = image::open(path)?;
        Ok(Self::from_image(&img))
    }

    #[inline]
    pub fn class_at(&self, x: u32, y: u32) -> PixelClass {
        if x >= self.width || y >= self.height {
            return PixelClass::Other;
        }
        PixelClass::from_code(self.data[y as usize * self.width as usize + x as usize])
    }
}

/// Column masks for the plot area from an external segmentation. No color votes are
/// available, so every column's tone is unknown.
pub fn masks_from_segmentation(mask: &SegmentationMask, bounds: &PlotAreaBounds) -> Vec<ColumnMask> {
    let (x0, y0, x1, y1) = clipped_range(bounds, mask.width, mask.height);
    (x0..x1)
        .map(|x| {
            let classes = (y0..y1).map(|y| mask.class_at(x, y)).collect();
            ColumnMask::new(x, y0, classes)
        })
        .collect()
}

/// Count rising/falling palette colors under each column's tagged pixels.
///
/// Used for masks that came without color information.
pub fn apply_color_votes(
    masks: &mut [ColumnMask],
    buffer: &PixelBuffer,
    profile: &CandleColorProfile,
    color_tolerance: f64,
) {
    masks.par_iter_mut().for_each(|mask| {
        let (mut bullish, mut bearish) = (0, 0);
        for (i, &class) in mask.classes.iter().enumerate() {
            if class == PixelClass::Other {
                continue;
            }
            let pixel = buffer.rgb(mask.x, mask.top + i as u32);
            match profile.classify_pixel(pixel, color_tolerance) {
                Some(r) if r.is_bullish() => bullish += 1,
                Some(r) if r.is_bearish() => bearish += 1,
                _ => {}
            }
        }
        mask.bullish_votes = bullish;
        mask.bearish_votes = bearish;
    });
}

/// A run of adjacent columns that make up one candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CandleSpan {
    pub start_x: u32,
    /// Inclusive
    pub end_x: u32,
}

impl CandleSpan {
    pub fn width(&self) -> u32 {
        self.end_x - self.start_x + 1
    }

    pub fn center_x(&self) -> f64 {
        (self.start_x as f64 + self.end_x as f64) / 2.0
    }
}

/// Group consecutive columns with candle pixels into spans.
///
/// A run is split where the color tone flips between rising and falling (two candles
/// drawn without a gap). Spans narrower than `min_width` are dropped as noise.
pub fn segment_candles(masks: &[ColumnMask], min_width: u32) -> Vec<CandleSpan> {
    let mut spans = Vec::new();
    let mut current: Option<(CandleSpan, CandleTone)> = None;

    for mask in masks {
        if !mask.has_candle_pixels() {
            if let Some((span, _)) = current.take() {
                spans.push(span);
            }
            continue;
        }

        let tone = mask.tone();
        current = match current.take() {
            Some((span, prev_tone)) if span.end_x + 1 == mask.x => {
                let flipped = matches!(
                    (prev_tone, tone),
                    (CandleTone::Bullish, CandleTone::Bearish)
                        | (CandleTone::Bearish, CandleTone::Bullish)
                );
                if flipped {
                    spans.push(span);
                    Some((CandleSpan { start_x: mask.x, end_x: mask.x }, tone))
                } else {
                    let keep = if tone == CandleTone::Unknown { prev_tone } else { tone };
                    Some((CandleSpan { start_x: span.start_x, end_x: mask.x }, keep))
                }
            }
            Some((span, _)) => {
                spans.push(span);
                Some((CandleSpan { start_x: mask.x, end_x: mask.x }, tone))
            }
            None => Some((CandleSpan { start_x: mask.x, end_x: mask.x }, tone)),
        };
    }
    if let Some((span, _)) = current {
        spans.push(span);
    }

    spans.retain(|s| s.width() >= min_width);
    spans
}

/// Union of the span's columns, reported at the span's middle column.
///
/// Per row: body if any column is body, else wick if any is wick.
pub fn merge_span(masks: &[ColumnMask], span: &CandleSpan) -> Option<ColumnMask> {
    let mut members = masks
        .iter()
        .filter(|m| m.x >= span.start_x && m.x <= span.end_x);
    let first = members.next()?;

    let mut merged = ColumnMask::new(span.center_x().floor() as u32, first.top, first.classes.clone());
    merged.bullish_votes = first.bullish_votes;
    merged.bearish_votes = first.bearish_votes;

    for m in members {
        for (dst, &src) in merged.classes.iter_mut().zip(&m.classes) {
            *dst = match (*dst, src) {
                (PixelClass::Body, _) | (_, PixelClass::Body) => PixelClass::Body,
                (PixelClass::Wick, _) | (_, PixelClass::Wick) => PixelClass::Wick,
                _ => PixelClass::Other,
            };
        }
        merged.bullish_votes += m.bullish_votes;
        merged.bearish_votes += m.bearish_votes;
    }
    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::candle_palette::{RgbColor, RoleMap};
    use crate::core::plot_area::DetectionMethod;
    use image::{DynamicImage, Rgb, RgbImage};

    fn bounds(x: u32, y: u32, width: u32, height: u32) -> PlotAreaBounds {
        PlotAreaBounds {
            x,
            y,
            width,
            height,
            confidence: 1.0,
            method: DetectionMethod::Manual,
        }
    }

    fn profile() -> CandleColorProfile {
        let mut colors: RoleMap<Option<RgbColor>> = RoleMap::default();
        *colors.get_mut(ColorRole::BullishFill) = Some(RgbColor::new(0, 200, 0));
        *colors.get_mut(ColorRole::BearishFill) = Some(RgbColor::new(220, 0, 0));
        *colors.get_mut(ColorRole::Background) = Some(RgbColor::new(255, 255, 255));
        CandleColorProfile {
            colors,
            overall_confidence: 0.9,
            clusters: Vec::new(),
        }
    }

    /// Green candle: body x 10..15 rows 20..=40, wick x 12 rows 10..=50.
    fn one_candle() -> PixelBuffer {
        let mut img = RgbImage::from_pixel(40, 60, Rgb([255, 255, 255]));
        for y in 10..=50 {
            img.put_pixel(12, y, Rgb([0, 200, 0]));
        }
        for x in 10..15 {
            for y in 20..=40 {
                img.put_pixel(x, y, Rgb([0, 200, 0]));
            }
        }
        PixelBuffer::from_image(&DynamicImage::ImageRgb8(img)).unwrap()
    }

    #[test]
    fn test_thin_runs_become_wick() {
        let masks = build_column_masks(&one_candle(), &bounds(0, 0, 40, 60), &profile(), &MaskParams::default());
        assert_eq!(masks.len(), 40);

        let center = &masks[12];
        assert_eq!(center.body_extent(), Some((20, 40)));
        assert_eq!(center.wick_extent(), Some((10, 50)));
        assert_eq!(center.tone(), CandleTone::Bullish);

        let side = &masks[10];
        assert_eq!(side.body_extent(), Some((20, 40)));
        assert_eq!(side.wick_extent(), None);
        assert!(!masks[30].has_candle_pixels());
    }

    #[test]
    fn test_masks_use_image_rows() {
        let masks = build_column_masks(&one_candle(), &bounds(5, 5, 20, 50), &profile(), &MaskParams::default());
        assert_eq!(masks[0].x, 5);
        assert_eq!(masks[0].top, 5);
        let center = masks.iter().find(|m| m.x == 12).unwrap();
        assert_eq!(center.wick_extent(), Some((10, 50)));
    }

    #[test]
    fn test_segment_and_merge() {
        let masks = build_column_masks(&one_candle(), &bounds(0, 0, 40, 60), &profile(), &MaskParams::default());
        let spans = segment_candles(&masks, 3);
        assert_eq!(spans, vec![CandleSpan { start_x: 10, end_x: 14 }]);

        let merged = merge_span(&masks, &spans[0]).unwrap();
        assert_eq!(merged.x, 12);
        assert_eq!(merged.body_extent(), Some((20, 40)));
        assert_eq!(merged.wick_extent(), Some((10, 50)));
        assert_eq!(merged.tone(), CandleTone::Bullish);
    }

    #[test]
    fn test_segment_splits_on_tone_flip() {
        let mut masks = Vec::new();
        for x in 0..8u32 {
            let mut m = ColumnMask::new(x, 0, vec![PixelClass::Body; 4]);
            if x < 4 {
                m.bullish_votes = 4;
            } else {
                m.bearish_votes = 4;
            }
            masks.push(m);
        }
        masks.push(ColumnMask::new(8, 0, vec![PixelClass::Other; 4]));
        masks.push(ColumnMask::new(9, 0, vec![PixelClass::Wick; 4]));

        let spans = segment_candles(&masks, 3);
        assert_eq!(
            spans,
            vec![
                CandleSpan { start_x: 0, end_x: 3 },
                CandleSpan { start_x: 4, end_x: 7 },
            ]
        );
    }

    #[test]
    fn test_segmentation_mask_adapter() {
        // 4x3 mask, column 1 is a candle: wick, body, wick
        let data = vec![
            0, 2, 0, 0, //
            0, 1, 0, 0, //
            0, 2, 0, 7, //
        ];
        let seg = SegmentationMask::new(4, 3, data).unwrap();
        let masks = masks_from_segmentation(&seg, &bounds(0, 0, 4, 3));
        assert_eq!(masks.len(), 4);
        assert_eq!(masks[1].body_extent(), Some((1, 1)));
        assert_eq!(masks[1].wick_extent(), Some((0, 2)));
        assert!(!masks[3].has_candle_pixels());
        assert_eq!(masks[1].tone(), CandleTone::Unknown);

        assert!(SegmentationMask::new(4, 3, vec![0; 5]).is_err());
    }

    #[test]
    fn test_segmentation_mask_from_luma_image() {
        let mut img = image::GrayImage::new(3, 2);
        img.put_pixel(1, 0, image::Luma([2]));
        img.put_pixel(1, 1, image::Luma([1]));
        let seg = SegmentationMask::from_image(&DynamicImage::ImageLuma8(img));

        assert_eq!((seg.width, seg.height), (3, 2));
        assert_eq!(seg.class_at(1, 0), PixelClass::Wick);
        assert_eq!(seg.class_at(1, 1), PixelClass::Body);
        assert_eq!(seg.class_at(0, 1), PixelClass::Other);

        let missing = SegmentationMask::open("/nonexistent/mask.png");
        assert!(matches!(missing, Err(ChartError::ImageAccess(_))));
    }

    #[test]
    fn test_color_votes_for_segmented_columns() {
        let buf = one_candle();
        let mut data = vec![0u8; 40 * 60];
        for y in 20..=40 {
            data[y * 40 + 12] = 1;
        }
        let seg = SegmentationMask::new(40, 60, data).unwrap();
        let mut masks = masks_from_segmentation(&seg, &bounds(0, 0, 40, 60));
        apply_color_votes(&mut masks, &buf, &profile(), 60.0);

        assert_eq!(masks[12].bullish_votes, 21);
        assert_eq!(masks[12].tone(), CandleTone::Bullish);
        assert_eq!(masks[0].tone(), CandleTone::Unknown);
    }
}
