//! Plot Area Detection
//!
//! Locates the rectangular plotting region of a chart screenshot.
//!
//! # Algorithm (automatic)
//! 1. Trace 8-connected contours over the binary edge map (explicit stack, caller-owned
//!    visited arena)
//! 2. Drop contours with too few points
//! 3. Area = shoelace formula over the contour points in convex-hull order
//! 4. Filter by area range and bounding-box aspect ratio
//! 5. Largest survivor becomes the plot rectangle; confidence from area/aspect bands
//! 6. No survivor: central 80% x 80% of the frame at confidence 0.1
//!
//! Manual calibration takes three clicked corners and always reports confidence 1.0.

use crate::core::edge_scan::EdgeMap;
use crate::core::scoring::{banded_score, ScoreBand};
use crate::error::{ChartError, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Automatic,
    Manual,
}

/// The located plotting rectangle, in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlotAreaBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
    pub method: DetectionMethod,
}

impl PlotAreaBounds {
    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn contains_row(&self, y: f64) -> bool {
        y >= self.y as f64 && y < self.bottom() as f64
    }

    pub fn contains_column(&self, x: f64) -> bool {
        x >= self.x as f64 && x < self.right() as f64
    }
}

/// Contour filtering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotAreaParams {
    /// Contours with fewer traced points are noise
    pub min_contour_points: usize,
    /// Minimum enclosed area in pixels
    pub min_contour_area: f64,
    /// Maximum enclosed area as a fraction of the frame
    pub max_contour_area_ratio: f64,
    pub aspect_ratio_min: f64,
    pub aspect_ratio_max: f64,
}

impl Default for PlotAreaParams {
    fn default() -> Self {
        PlotAreaParams {
            min_contour_points: 10,
            min_contour_area: 1000.0,
            max_contour_area_ratio: 0.8,
            aspect_ratio_min: 0.5,
            aspect_ratio_max: 3.0,
        }
    }
}

/// Confidence assigned to the central-80% fallback rectangle.
pub const FALLBACK_CONFIDENCE: f64 = 0.1;

/// Area-ratio bands, tightest first.
const AREA_BANDS: [ScoreBand; 2] = [ScoreBand::new(0.1, 0.8, 0.8), ScoreBand::new(0.05, 0.9, 0.6)];
const AREA_FALLBACK_SCORE: f64 = 0.3;
/// Near-square plot areas get a small bonus.
const SQUARE_BAND: ScoreBand = ScoreBand::new(0.8, 1.25, 0.1);

/// One traced connected component of edge pixels.
#[derive(Debug, Clone)]
pub struct Contour {
    pub points: Vec<(u32, u32)>,
}

impl Contour {
    /// Inclusive bounding box `(min_x, min_y, max_x, max_y)`.
    pub fn bounding_box(&self) -> Option<(u32, u32, u32, u32)> {
        let first = self.points.first()?;
        let mut bb = (first.0, first.1, first.0, first.1);
        for &(x, y) in &self.points {
            bb.0 = bb.0.min(x);
            bb.1 = bb.1.min(y);
            bb.2 = bb.2.max(x);
            bb.3 = bb.3.max(y);
        }
        Some(bb)
    }

    /// Enclosed area: shoelace formula over the convex hull of the traced points.
    pub fn area(&self) -> f64 {
        let pts: Vec<(f64, f64)> = self
            .points
            .iter()
            .map(|&(x, y)| (x as f64, y as f64))
            .collect();
        shoelace_area(&convex_hull(&pts))
    }
}

/// Flood-fill one contour starting at `(start_x, start_y)`.
///
/// `visited` is the caller's `width * height` arena; every pixel reached here is marked so
/// later seeds skip it.
pub fn trace_contour(edges: &EdgeMap, visited: &mut [bool], start_x: u32, start_y: u32) -> Contour {
    let w = edges.width as i64;
    let h = edges.height as i64;
    let mut points = Vec::new();
    let mut stack = vec![(start_x as i64, start_y as i64)];
    visited[(start_y as i64 * w + start_x as i64) as usize] = true;

    while let Some((x, y)) = stack.pop() {
        points.push((x as u32, y as u32));
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                }
                let nidx = (ny * w + nx) as usize;
                if !visited[nidx] && edges.data[nidx] > 0 {
                    visited[nidx] = true;
                    stack.push((nx, ny));
                }
            }
        }
    }

    Contour { points }
}

/// Trace every contour in the edge map, dropping those under `min_points`.
pub fn find_contours(edges: &EdgeMap, min_points: usize) -> Vec<Contour> {
    let mut visited = vec![false; edges.width as usize * edges.height as usize];
    let mut contours = Vec::new();

    for y in 0..edges.height {
        for x in 0..edges.width {
            let idx = (y * edges.width + x) as usize;
            if edges.data[idx] > 0 && !visited[idx] {
                let contour = trace_contour(edges, &mut visited, x, y);
                if contour.points.len() >= min_points {
                    contours.push(contour);
                }
            }
        }
    }

    contours
}

/// Andrew's monotone chain. Returns the hull counter-clockwise without repeating the
/// first point.
fn convex_hull(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let cross = |o: (f64, f64), a: (f64, f64), b: (f64, f64)| {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };

    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Polygon area by the shoelace formula (absolute value).
pub fn shoelace_area(polygon: &[(f64, f64)]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..polygon.len() {
        let (x1, y1) = polygon[i];
        let (x2, y2) = polygon[(i + 1) % polygon.len()];
        sum += x1 * y2 - x2 * y1;
    }
    sum.abs() / 2.0
}

/// Central 80% x 80% of the frame.
pub fn fallback_bounds(image_width: u32, image_height: u32) -> PlotAreaBounds {
    let x = (image_width as f64 * 0.1) as u32;
    let y = (image_height as f64 * 0.1) as u32;
    let width = ((image_width as f64 * 0.8) as u32).max(1);
    let height = ((image_height as f64 * 0.8) as u32).max(1);
    PlotAreaBounds {
        x,
        y,
        width: width.min(image_width.saturating_sub(x)).max(1),
        height: height.min(image_height.saturating_sub(y)).max(1),
        confidence: FALLBACK_CONFIDENCE,
        method: DetectionMethod::Automatic,
    }
}

/// Confidence of an automatically detected rectangle.
fn score_rectangle(width: u32, height: u32, image_area: f64) -> f64 {
    let area_ratio = (width as f64 * height as f64) / image_area;
    let aspect = width as f64 / height as f64;
    let base = banded_score(area_ratio, &AREA_BANDS, AREA_FALLBACK_SCORE);
    let bonus = banded_score(aspect, &[SQUARE_BAND], 0.0);
    (base + bonus).min(1.0)
}

/// Find the plot rectangle in an edge map.
///
/// Never fails: when nothing qualifies the central-80% fallback is returned with
/// [`FALLBACK_CONFIDENCE`].
pub fn detect_automatic(edges: &EdgeMap, params: &PlotAreaParams) -> PlotAreaBounds {
    let image_area = edges.width as f64 * edges.height as f64;
    if image_area <= 0.0 {
        return fallback_bounds(edges.width.max(1), edges.height.max(1));
    }
    let max_area = params.max_contour_area_ratio * image_area;

    let contours = find_contours(edges, params.min_contour_points);

    let mut best: Option<(f64, (u32, u32, u32, u32))> = None;
    for contour in &contours {
        let Some(bb) = contour.bounding_box() else {
            continue;
        };
        let bw = bb.2 - bb.0 + 1;
        let bh = bb.3 - bb.1 + 1;
        let aspect = bw as f64 / bh as f64;
        if aspect < params.aspect_ratio_min || aspect > params.aspect_ratio_max {
            continue;
        }

        let area = contour.area();
        if area < params.min_contour_area || area > max_area {
            continue;
        }

        if best.map(|(a, _)| area > a).unwrap_or(true) {
            best = Some((area, bb));
        }
    }

    debug!(
        "plot area: {} contours traced, best area {:?}",
        contours.len(),
        best.map(|(a, _)| a)
    );

    match best {
        Some((_, (min_x, min_y, max_x, max_y))) => {
            let width = max_x - min_x + 1;
            let height = max_y - min_y + 1;
            PlotAreaBounds {
                x: min_x,
                y: min_y,
                width,
                height,
                confidence: score_rectangle(width, height, image_area),
                method: DetectionMethod::Automatic,
            }
        }
        None => {
            warn!("no qualifying contour, falling back to the central 80% of the frame");
            fallback_bounds(edges.width, edges.height)
        }
    }
}

/// A clicked point in image pixels. Signed so that clicks outside the frame can be
/// reported instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickPoint {
    pub x: i64,
    pub y: i64,
}

impl ClickPoint {
    pub fn new(x: i64, y: i64) -> Self {
        ClickPoint { x, y }
    }
}

/// Three corners clicked by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotCorners {
    pub top_left: ClickPoint,
    pub top_right: ClickPoint,
    pub bottom_left: ClickPoint,
}

/// Build bounds from three clicked corners.
///
/// # Errors
/// `Calibration` when any coordinate is negative, the rectangle is degenerate, or it
/// extends past the image.
pub fn calibrate_manual(
    image_width: u32,
    image_height: u32,
    corners: &PlotCorners,
) -> Result<PlotAreaBounds> {
    let PlotCorners {
        top_left: tl,
        top_right: tr,
        bottom_left: bl,
    } = *corners;

    if [tl, tr, bl].iter().any(|p| p.x < 0 || p.y < 0) {
        return Err(ChartError::Calibration(format!(
            "negative corner coordinate in {:?}",
            corners
        )));
    }

    let x = tl.x.min(bl.x);
    let y = tl.y.min(tr.y);
    let width = tr.x.max(bl.x) - x;
    let height = bl.y.max(tr.y) - y;

    if width <= 0 || height <= 0 {
        return Err(ChartError::Calibration(format!(
            "degenerate plot area {}x{}",
            width, height
        )));
    }

    if x + width > image_width as i64 || y + height > image_height as i64 {
        return Err(ChartError::Calibration(format!(
            "plot area ({}, {}, {}x{}) exceeds image {}x{}",
            x, y, width, height, image_width, image_height
        )));
    }

    Ok(PlotAreaBounds {
        x: x as u32,
        y: y as u32,
        width: width as u32,
        height: height as u32,
        confidence: 1.0,
        method: DetectionMethod::Manual,
    })
}
