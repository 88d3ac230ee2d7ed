//! Edge Scan
//!
//! Canny-style edge detection over a [`PixelBuffer`] and projection-based axis line
//! search over the resulting binary edge map.
//!
//! # Processing Pipeline
//! 1. Luminance plane (BT.601)
//! 2. 3x3 Gaussian blur
//! 3. Sobel gradients (magnitude + direction)
//! 4. Non-maximum suppression along the quantized gradient direction
//! 5. Double threshold + hysteresis (weak edges survive only when 8-connected to a strong one)

use crate::core::line_fit::fit_line;
use crate::core::pixel_buffer::PixelBuffer;
use crate::core::plot_area::{DetectionMethod, PlotAreaBounds};
use log::debug;
use serde::{Deserialize, Serialize};

/// Edge detection thresholds, on Sobel gradient magnitude (0 - ~1440 for 8-bit input).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeParams {
    /// Weak edge threshold for hysteresis
    pub low_threshold: f32,
    /// Strong edge threshold; every edge chain needs at least one pixel above it
    pub high_threshold: f32,
    /// Minimum fraction of a row/column covered by edge pixels to count as an axis line
    pub min_line_coverage: f64,
}

impl Default for EdgeParams {
    fn default() -> Self {
        EdgeParams {
            low_threshold: 30.0,
            high_threshold: 80.0,
            min_line_coverage: 0.6,
        }
    }
}

/// Binary edge map: 255 = edge, 0 = background (row-major, one byte per pixel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl EdgeMap {
    pub fn new(width: u32, height: u32) -> Self {
        EdgeMap {
            width,
            height,
            data: vec![0u8; width as usize * height as usize],
        }
    }

    #[inline]
    pub fn is_edge(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.data[(y * self.width + x) as usize] > 0
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32) {
        if x < self.width && y < self.height {
            self.data[(y * self.width + x) as usize] = 255;
        }
    }

    pub fn edge_count(&self) -> usize {
        self.data.iter().filter(|&&v| v > 0).count()
    }
}

/// Blur the luminance plane with the 3x3 kernel [1 2 1; 2 4 2; 1 2 1] / 16.
/// Borders are clamped.
fn gaussian_blur(plane: &[f32], width: u32, height: u32) -> Vec<f32> {
    const KERNEL: [[f32; 3]; 3] = [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];
    let w = width as i64;
    let h = height as i64;
    let mut out = vec![0.0f32; plane.len()];

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (ky, row) in KERNEL.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    let sx = (x + kx as i64 - 1).clamp(0, w - 1);
                    let sy = (y + ky as i64 - 1).clamp(0, h - 1);
                    acc += weight * plane[(sy * w + sx) as usize];
                }
            }
            out[(y * w + x) as usize] = acc / 16.0;
        }
    }

    out
}

/// Sobel gradients. Returns (magnitude, gx, gy); border pixels are left at zero.
fn sobel(plane: &[f32], width: u32, height: u32) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let w = width as usize;
    let h = height as usize;
    let mut mag = vec![0.0f32; plane.len()];
    let mut gx = vec![0.0f32; plane.len()];
    let mut gy = vec![0.0f32; plane.len()];

    if w < 3 || h < 3 {
        return (mag, gx, gy);
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let p = |dx: usize, dy: usize| plane[(y + dy - 1) * w + (x + dx - 1)];
            let sx = (p(2, 0) + 2.0 * p(2, 1) + p(2, 2)) - (p(0, 0) + 2.0 * p(0, 1) + p(0, 2));
            let sy = (p(0, 2) + 2.0 * p(1, 2) + p(2, 2)) - (p(0, 0) + 2.0 * p(1, 0) + p(2, 0));
            let idx = y * w + x;
            gx[idx] = sx;
            gy[idx] = sy;
            mag[idx] = (sx * sx + sy * sy).sqrt();
        }
    }

    (mag, gx, gy)
}

/// Keep only local maxima along the gradient direction (quantized to 0/45/90/135 deg).
fn non_max_suppression(mag: &[f32], gx: &[f32], gy: &[f32], width: u32, height: u32) -> Vec<f32> {
    let w = width as usize;
    let h = height as usize;
    let mut out = vec![0.0f32; mag.len()];

    if w < 3 || h < 3 {
        return out;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = y * w + x;
            let m = mag[idx];
            if m <= 0.0 {
                continue;
            }

            let mut angle = gy[idx].atan2(gx[idx]).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }

            // Neighbor offsets along the gradient
            let (a, b) = if !(22.5..157.5).contains(&angle) {
                (idx - 1, idx + 1)
            } else if angle < 67.5 {
                (idx - w - 1, idx + w + 1)
            } else if angle < 112.5 {
                (idx - w, idx + w)
            } else {
                (idx - w + 1, idx + w - 1)
            };

            if m >= mag[a] && m >= mag[b] {
                out[idx] = m;
            }
        }
    }

    out
}

/// Run the full edge pipeline on a pixel buffer.
pub fn detect_edges(buffer: &PixelBuffer, params: &EdgeParams) -> EdgeMap {
    let width = buffer.width();
    let height = buffer.height();

    // Step 1: Luminance
    let plane: Vec<f32> = buffer.to_luma_plane().into_iter().map(f32::from).collect();

    // Step 2: Blur
    let blurred = gaussian_blur(&plane, width, height);

    // Step 3: Gradients
    let (mag, gx, gy) = sobel(&blurred, width, height);

    // Step 4: Thin to ridges
    let thin = non_max_suppression(&mag, &gx, &gy, width, height);

    // Step 5: Hysteresis
    let mut edges = EdgeMap::new(width, height);
    let w = width as i64;
    let h = height as i64;
    let mut stack: Vec<(i64, i64)> = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if thin[idx] >= params.high_threshold && edges.data[idx] == 0 {
                edges.data[idx] = 255;
                stack.push((x, y));

                while let Some((cx, cy)) = stack.pop() {
                    for dy in -1..=1 {
                        for dx in -1..=1 {
                            let nx = cx + dx;
                            let ny = cy + dy;
                            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                                continue;
                            }
                            let nidx = (ny * w + nx) as usize;
                            if edges.data[nidx] == 0 && thin[nidx] >= params.low_threshold {
                                edges.data[nidx] = 255;
                                stack.push((nx, ny));
                            }
                        }
                    }
                }
            }
        }
    }

    debug!(
        "edge scan {}x{}: {} edge pixels",
        width,
        height,
        edges.edge_count()
    );

    edges
}

/// Long straight edge runs found by row/column projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AxisLines {
    /// Rows (y) of horizontal lines, top to bottom
    pub horizontal: Vec<u32>,
    /// Columns (x) of vertical lines, left to right
    pub vertical: Vec<u32>,
    /// Edge coverage of each horizontal line (0.0 - 1.0)
    pub horizontal_coverage: Vec<f64>,
    /// Edge coverage of each vertical line (0.0 - 1.0)
    pub vertical_coverage: Vec<f64>,
}

/// Maximum |slope| of a fitted line for it to count as axis-aligned.
const MAX_AXIS_SLOPE: f64 = 0.02;

/// Collapse runs of adjacent indices into their midpoint, keeping the best coverage.
fn collapse_runs(candidates: &[(u32, f64)]) -> Vec<(u32, f64)> {
    let mut out: Vec<(u32, f64)> = Vec::new();
    let mut run: Vec<(u32, f64)> = Vec::new();

    for &c in candidates {
        if let Some(&(last, _)) = run.last() {
            if c.0 != last + 1 {
                let mid = run[run.len() / 2].0;
                let best = run.iter().map(|r| r.1).fold(0.0, f64::max);
                out.push((mid, best));
                run.clear();
            }
        }
        run.push(c);
    }
    if !run.is_empty() {
        let mid = run[run.len() / 2].0;
        let best = run.iter().map(|r| r.1).fold(0.0, f64::max);
        out.push((mid, best));
    }

    out
}

/// Find horizontal and vertical lines whose edge coverage reaches `min_coverage`.
///
/// Candidate rows/columns come from the projection profile; each candidate is checked
/// with a least-squares fit over the edge pixels in a 3-pixel band so that a diagonal
/// streak crossing many rows is not mistaken for an axis.
pub fn find_axis_lines(edges: &EdgeMap, min_coverage: f64) -> AxisLines {
    let w = edges.width;
    let h = edges.height;
    let mut lines = AxisLines::default();
    if w == 0 || h == 0 {
        return lines;
    }

    let mut row_candidates = Vec::new();
    for y in 0..h {
        let count = (0..w).filter(|&x| edges.is_edge(x, y)).count();
        let coverage = count as f64 / w as f64;
        if coverage < min_coverage {
            continue;
        }
        let band: Vec<(f64, f64)> = (y.saturating_sub(1)..=(y + 1).min(h - 1))
            .flat_map(|by| {
                (0..w)
                    .filter(move |&x| edges.is_edge(x, by))
                    .map(move |x| (x as f64, by as f64))
            })
            .collect();
        let straight = fit_line(&band)
            .map(|fit| fit.slope.abs() < MAX_AXIS_SLOPE)
            .unwrap_or(false);
        if straight {
            row_candidates.push((y, coverage));
        }
    }

    let mut col_candidates = Vec::new();
    for x in 0..w {
        let count = (0..h).filter(|&y| edges.is_edge(x, y)).count();
        let coverage = count as f64 / h as f64;
        if coverage < min_coverage {
            continue;
        }
        // Fit x as a function of y for vertical lines
        let band: Vec<(f64, f64)> = (x.saturating_sub(1)..=(x + 1).min(w - 1))
            .flat_map(|bx| {
                (0..h)
                    .filter(move |&y| edges.is_edge(bx, y))
                    .map(move |y| (y as f64, bx as f64))
            })
            .collect();
        let straight = fit_line(&band)
            .map(|fit| fit.slope.abs() < MAX_AXIS_SLOPE)
            .unwrap_or(false);
        if straight {
            col_candidates.push((x, coverage));
        }
    }

    for (y, cov) in collapse_runs(&row_candidates) {
        lines.horizontal.push(y);
        lines.horizontal_coverage.push(cov);
    }
    for (x, cov) in collapse_runs(&col_candidates) {
        lines.vertical.push(x);
        lines.vertical_coverage.push(cov);
    }

    debug!(
        "axis lines: {} horizontal, {} vertical",
        lines.horizontal.len(),
        lines.vertical.len()
    );

    lines
}

/// Rectangle spanned by the outermost detected lines.
///
/// Needs at least two horizontal and two vertical lines. Confidence is half the mean
/// coverage of the four framing lines, so it never outranks a contour detection.
pub fn bounds_from_axis_lines(lines: &AxisLines) -> Option<PlotAreaBounds> {
    if lines.horizontal.len() < 2 || lines.vertical.len() < 2 {
        return None;
    }

    let top = *lines.horizontal.first()?;
    let bottom = *lines.horizontal.last()?;
    let left = *lines.vertical.first()?;
    let right = *lines.vertical.last()?;

    if bottom <= top || right <= left {
        return None;
    }

    let coverage = [
        lines.horizontal_coverage.first().copied().unwrap_or(0.0),
        lines.horizontal_coverage.last().copied().unwrap_or(0.0),
        lines.vertical_coverage.first().copied().unwrap_or(0.0),
        lines.vertical_coverage.last().copied().unwrap_or(0.0),
    ];
    let mean_coverage = coverage.iter().sum::<f64>() / coverage.len() as f64;

    Some(PlotAreaBounds {
        x: left,
        y: top,
        width: right - left + 1,
        height: bottom - top + 1,
        confidence: (0.5 * mean_coverage).clamp(0.0, 0.5),
        method: DetectionMethod::Automatic,
    })
}
