//! Candle Palette Module
//!
//! Learns which colors a chart uses for rising candles, falling candles, wicks and the
//! background, without being told the chart theme.
//!
//! # Algorithm
//! 1. Bin the plot pixels into unique colors with counts
//! 2. k-means over the weighted colors (farthest-point init from the most frequent color)
//! 3. Histogram pass keeping bins above a frequency floor
//! 4. Classify every candidate color into a role by reference bands
//! 5. Merge near-duplicates, keep the highest-count cluster per role

use crate::core::pixel_buffer::PixelBuffer;
use crate::core::scoring::{clamp_unit, weighted_mean};
use log::debug;
use rayon::prelude::*;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        RgbColor { r, g, b }
    }

    /// Perceived brightness (ITU-R BT.601).
    #[inline]
    pub fn luma(&self) -> u8 {
        (0.299 * self.r as f64 + 0.587 * self.g as f64 + 0.114 * self.b as f64) as u8
    }

    /// Euclidean distance in RGB space.
    #[inline]
    pub fn distance(&self, other: &RgbColor) -> f64 {
        let dr = self.r as f64 - other.r as f64;
        let dg = self.g as f64 - other.g as f64;
        let db = self.b as f64 - other.b as f64;
        (dr * dr + dg * dg + db * db).sqrt()
    }

    /// Spread between the strongest and weakest channel.
    #[inline]
    pub fn chroma(&self) -> u8 {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        max - min
    }

    /// HSL lightness in `[0, 1]`.
    pub fn lightness(&self) -> f64 {
        let max = self.r.max(self.g).max(self.b) as f64;
        let min = self.r.min(self.g).min(self.b) as f64;
        (max + min) / 2.0 / 255.0
    }

    fn to_f64(self) -> [f64; 3] {
        [self.r as f64, self.g as f64, self.b as f64]
    }

    fn from_f64(c: [f64; 3]) -> Self {
        let ch = |v: f64| v.round().clamp(0.0, 255.0) as u8;
        RgbColor::new(ch(c[0]), ch(c[1]), ch(c[2]))
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// What a color is used for on the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorRole {
    BullishFill,
    BearishFill,
    BullishStroke,
    BearishStroke,
    Wick,
    Background,
}

impl ColorRole {
    pub const ALL: [ColorRole; 6] = [
        ColorRole::BullishFill,
        ColorRole::BearishFill,
        ColorRole::BullishStroke,
        ColorRole::BearishStroke,
        ColorRole::Wick,
        ColorRole::Background,
    ];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            ColorRole::BullishFill => 0,
            ColorRole::BearishFill => 1,
            ColorRole::BullishStroke => 2,
            ColorRole::BearishStroke => 3,
            ColorRole::Wick => 4,
            ColorRole::Background => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorRole::BullishFill => "bullish_fill",
            ColorRole::BearishFill => "bearish_fill",
            ColorRole::BullishStroke => "bullish_stroke",
            ColorRole::BearishStroke => "bearish_stroke",
            ColorRole::Wick => "wick",
            ColorRole::Background => "background",
        }
    }

    pub fn is_bullish(self) -> bool {
        matches!(self, ColorRole::BullishFill | ColorRole::BullishStroke)
    }

    pub fn is_bearish(self) -> bool {
        matches!(self, ColorRole::BearishFill | ColorRole::BearishStroke)
    }

    /// Colors that belong to a candle body outline or fill.
    pub fn is_body(self) -> bool {
        self.is_bullish() || self.is_bearish()
    }
}

/// One value per [`ColorRole`], stored in a fixed array.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleMap<T>([T; 6]);

impl<T> RoleMap<T> {
    pub fn from_fn(mut f: impl FnMut(ColorRole) -> T) -> Self {
        RoleMap(ColorRole::ALL.map(&mut f))
    }

    #[inline]
    pub fn get(&self, role: ColorRole) -> &T {
        &self.0[role.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, role: ColorRole) -> &mut T {
        &mut self.0[role.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ColorRole, &T)> {
        ColorRole::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T: Default> Default for RoleMap<T> {
    fn default() -> Self {
        RoleMap::from_fn(|_| T::default())
    }
}

impl<T: Serialize> Serialize for RoleMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ColorRole::ALL.len()))?;
        for (role, value) in self.iter() {
            map.serialize_entry(role.name(), value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColorCluster {
    pub color: RgbColor,
    pub pixel_count: u64,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
    pub role: ColorRole,
}

/// Canonical color per role plus the clusters it was chosen from.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CandleColorProfile {
    pub colors: RoleMap<Option<RgbColor>>,
    pub overall_confidence: f64,
    pub clusters: Vec<ColorCluster>,
}

impl CandleColorProfile {
    pub fn color(&self, role: ColorRole) -> Option<RgbColor> {
        *self.colors.get(role)
    }

    pub fn has_candle_colors(&self) -> bool {
        ColorRole::ALL
            .iter()
            .any(|&role| role != ColorRole::Background && self.color(role).is_some())
    }

    /// Candle role of the profile color nearest to `pixel`.
    ///
    /// `None` when nothing is within `tolerance`, or when the background color is at
    /// least as close as every candle color.
    pub fn classify_pixel(&self, pixel: RgbColor, tolerance: f64) -> Option<ColorRole> {
        let mut best: Option<(ColorRole, f64)> = None;
        for (role, color) in self.colors.iter() {
            let Some(color) = color else { continue };
            if role == ColorRole::Background {
                continue;
            }
            let d = color.distance(&pixel);
            if d <= tolerance && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((role, d));
            }
        }

        let (role, d) = best?;
        match self.color(ColorRole::Background) {
            Some(bg) if bg.distance(&pixel) <= d => None,
            _ => Some(role),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteMethod {
    KMeans,
    Histogram,
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandleColorDetectionResult {
    pub profile: CandleColorProfile,
    /// Raw k-means clusters, before merging with the histogram pass
    pub kmeans_clusters: Vec<ColorCluster>,
    pub histogram_clusters: Vec<ColorCluster>,
    pub method: PaletteMethod,
    pub iterations: usize,
    pub converged: bool,
}

impl CandleColorDetectionResult {
    /// Result for input that yielded no colors at all.
    pub fn empty() -> Self {
        CandleColorDetectionResult {
            profile: CandleColorProfile::default(),
            kmeans_clusters: Vec::new(),
            histogram_clusters: Vec::new(),
            method: PaletteMethod::Hybrid,
            iterations: 0,
            converged: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansParams {
    pub k: usize,
    pub max_iterations: usize,
    /// Stop once no centroid moves farther than this (RGB units)
    pub tolerance: f64,
    /// Channel bin width used to collapse near-identical samples
    pub sample_bin_size: u8,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            k: 6,
            max_iterations: 20,
            tolerance: 1.0,
            sample_bin_size: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramParams {
    pub bin_size: u8,
    /// Minimum share of pixels for a bin to count as a candidate
    pub min_frequency: f64,
    /// Candidates closer than this are merged
    pub merge_distance: f64,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            bin_size: 16,
            min_frequency: 0.01,
            merge_distance: 24.0,
        }
    }
}

/// A binned color and how many pixels fell into its bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorCount {
    pub color: RgbColor,
    pub count: u64,
}

/// Collapse the buffer into unique colors, each channel quantized to the center of a
/// `bin_size` wide bin. Sorted by count (descending), then by color.
pub fn extract_unique_colors(buffer: &PixelBuffer, bin_size: u8) -> Vec<ColorCount> {
    let bin = bin_size.max(1) as u16;
    let quantize = |v: u8| -> u8 {
        if bin == 1 {
            return v;
        }
        let center = (v as u16 / bin) * bin + bin / 2;
        center.min(255) as u8
    };

    let mut counts: HashMap<RgbColor, u64> = HashMap::new();
    for y in 0..buffer.height() {
        for x in 0..buffer.width() {
            let c = buffer.rgb(x, y);
            *counts
                .entry(RgbColor::new(quantize(c.r), quantize(c.g), quantize(c.b)))
                .or_insert(0) += 1;
        }
    }

    let mut out: Vec<ColorCount> = counts
        .into_iter()
        .map(|(color, count)| ColorCount { color, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then(a.color.cmp(&b.color)));
    out
}

// Reference centers for the role bands
const BULLISH_FILL_REF: RgbColor = RgbColor::new(0, 160, 60);
const BEARISH_FILL_REF: RgbColor = RgbColor::new(200, 30, 30);
const BULLISH_STROKE_REF: RgbColor = RgbColor::new(150, 230, 150);
const BEARISH_STROKE_REF: RgbColor = RgbColor::new(245, 160, 160);
const WICK_REF: RgbColor = RgbColor::new(40, 80, 200);

/// Colors with a smaller channel spread are gray.
const GRAY_CHROMA: u8 = 40;
/// Lightness above which a green/red is a tint (stroke) rather than a fill.
const TINT_LIGHTNESS: f64 = 0.65;
/// Distance at which the band confidence reaches zero.
const REFERENCE_RADIUS: f64 = 220.0;
/// A color assigned to a band is never less certain than this.
const MIN_ROLE_CONFIDENCE: f64 = 0.2;

/// Role of a single color and how close it sits to that role's reference.
pub fn classify_role(color: RgbColor) -> (ColorRole, f64) {
    let chroma = color.chroma();
    if chroma < GRAY_CHROMA {
        let confidence = 1.0 - chroma as f64 / (GRAY_CHROMA as f64 * 2.0);
        return (ColorRole::Background, clamp_unit(confidence));
    }

    let (r, g, b) = (color.r, color.g, color.b);
    let tint = color.lightness() > TINT_LIGHTNESS;
    let (role, reference) = if b > r && b > g {
        (ColorRole::Wick, WICK_REF)
    } else if g >= r {
        if tint {
            (ColorRole::BullishStroke, BULLISH_STROKE_REF)
        } else {
            (ColorRole::BullishFill, BULLISH_FILL_REF)
        }
    } else if tint {
        (ColorRole::BearishStroke, BEARISH_STROKE_REF)
    } else {
        (ColorRole::BearishFill, BEARISH_FILL_REF)
    };

    let confidence = (1.0 - color.distance(&reference) / REFERENCE_RADIUS).max(MIN_ROLE_CONFIDENCE);
    (role, clamp_unit(confidence))
}

fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn nearest_centroid(point: &[f64; 3], centroids: &[[f64; 3]]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

#[derive(Debug, Clone)]
struct KMeansOutcome {
    centroids: Vec<[f64; 3]>,
    counts: Vec<u64>,
    iterations: usize,
    converged: bool,
}

/// Farthest-point initialization starting from the most frequent color.
fn initial_centroids(points: &[[f64; 3]], k: usize) -> Vec<[f64; 3]> {
    let mut centroids = Vec::with_capacity(k);
    let Some(first) = points.first() else {
        return centroids;
    };
    centroids.push(*first);

    let mut nearest: Vec<f64> = points.iter().map(|p| squared_distance(p, first)).collect();
    while centroids.len() < k {
        let mut far_idx = 0;
        let mut far_d = 0.0;
        for (i, &d) in nearest.iter().enumerate() {
            if d > far_d {
                far_idx = i;
                far_d = d;
            }
        }
        // Every remaining point coincides with a centroid
        if far_d <= 0.0 {
            break;
        }
        let next = points[far_idx];
        centroids.push(next);
        for (d, p) in nearest.iter_mut().zip(points) {
            *d = d.min(squared_distance(p, &next));
        }
    }
    centroids
}

/// Weighted k-means. Deterministic for a given input order.
fn weighted_kmeans(samples: &[ColorCount], params: &KMeansParams) -> KMeansOutcome {
    let points: Vec<[f64; 3]> = samples.iter().map(|s| s.color.to_f64()).collect();
    let mut centroids = initial_centroids(&points, params.k.max(1));
    let mut counts = vec![0u64; centroids.len()];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < params.max_iterations && !centroids.is_empty() {
        iterations += 1;

        let assignments: Vec<usize> = points
            .par_iter()
            .map(|p| nearest_centroid(p, &centroids))
            .collect();

        let mut sums = vec![[0.0f64; 3]; centroids.len()];
        counts = vec![0u64; centroids.len()];
        for ((p, &a), s) in points.iter().zip(&assignments).zip(samples) {
            let w = s.count as f64;
            sums[a][0] += p[0] * w;
            sums[a][1] += p[1] * w;
            sums[a][2] += p[2] * w;
            counts[a] += s.count;
        }

        let mut max_shift: f64 = 0.0;
        for (i, c) in centroids.iter_mut().enumerate() {
            if counts[i] == 0 {
                continue;
            }
            let n = counts[i] as f64;
            let updated = [sums[i][0] / n, sums[i][1] / n, sums[i][2] / n];
            max_shift = max_shift.max(squared_distance(c, &updated).sqrt());
            *c = updated;
        }

        if max_shift <= params.tolerance {
            converged = true;
            break;
        }
    }

    KMeansOutcome {
        centroids,
        counts,
        iterations,
        converged,
    }
}

fn to_cluster(color: RgbColor, pixel_count: u64) -> ColorCluster {
    let (role, confidence) = classify_role(color);
    ColorCluster {
        color,
        pixel_count,
        confidence,
        role,
    }
}

/// Merge clusters closer than `merge_distance`. The highest-count member keeps its color;
/// counts add up, confidence is the maximum, the role is the pixel-weighted majority.
fn merge_clusters(mut candidates: Vec<ColorCluster>, merge_distance: f64) -> Vec<ColorCluster> {
    candidates.sort_by(|a, b| {
        b.pixel_count
            .cmp(&a.pixel_count)
            .then(a.color.cmp(&b.color))
    });

    let mut merged: Vec<(ColorCluster, RoleMap<u64>)> = Vec::new();
    for cand in candidates {
        match merged
            .iter_mut()
            .find(|(m, _)| m.color.distance(&cand.color) < merge_distance)
        {
            Some((m, votes)) => {
                m.pixel_count += cand.pixel_count;
                m.confidence = m.confidence.max(cand.confidence);
                *votes.get_mut(cand.role) += cand.pixel_count;
            }
            None => {
                let mut votes = RoleMap::<u64>::default();
                *votes.get_mut(cand.role) += cand.pixel_count;
                merged.push((cand, votes));
            }
        }
    }

    let mut out: Vec<ColorCluster> = merged
        .into_iter()
        .map(|(mut cluster, votes)| {
            // First role wins ties
            let mut best = (cluster.role, 0u64);
            for (role, &v) in votes.iter() {
                if v > best.1 {
                    best = (role, v);
                }
            }
            cluster.role = best.0;
            cluster
        })
        .collect();
    out.sort_by(|a, b| {
        b.pixel_count
            .cmp(&a.pixel_count)
            .then(a.color.cmp(&b.color))
    });
    out
}

fn build_profile(clusters: Vec<ColorCluster>) -> CandleColorProfile {
    let mut colors: RoleMap<Option<RgbColor>> = RoleMap::default();
    let mut best_counts: RoleMap<u64> = RoleMap::default();
    for c in &clusters {
        if c.pixel_count > *best_counts.get(c.role) {
            *best_counts.get_mut(c.role) = c.pixel_count;
            *colors.get_mut(c.role) = Some(c.color);
        }
    }

    let overall_confidence =
        weighted_mean(clusters.iter().map(|c| (c.confidence, c.pixel_count as f64)));

    CandleColorProfile {
        colors,
        overall_confidence,
        clusters,
    }
}

/// Detect the candle color scheme of a chart.
///
/// Runs k-means and the histogram pass over the same pixels and merges their
/// candidates. Identical input and parameters always give the identical profile.
pub fn detect_candle_colors(
    buffer: &PixelBuffer,
    kmeans: Option<&KMeansParams>,
    histogram: Option<&HistogramParams>,
) -> CandleColorDetectionResult {
    let kmeans = kmeans.copied().unwrap_or_default();
    let histogram = histogram.copied().unwrap_or_default();

    let samples = extract_unique_colors(buffer, kmeans.sample_bin_size);
    let bins = extract_unique_colors(buffer, histogram.bin_size);
    detect_from_samples(&samples, &bins, &kmeans, &histogram)
}

/// Same as [`detect_candle_colors`], over pre-binned samples.
pub fn detect_from_samples(
    samples: &[ColorCount],
    bins: &[ColorCount],
    kmeans: &KMeansParams,
    histogram: &HistogramParams,
) -> CandleColorDetectionResult {
    if samples.is_empty() && bins.is_empty() {
        return CandleColorDetectionResult::empty();
    }

    let outcome = weighted_kmeans(samples, kmeans);
    let kmeans_clusters: Vec<ColorCluster> = outcome
        .centroids
        .iter()
        .zip(&outcome.counts)
        .filter(|(_, &n)| n > 0)
        .map(|(c, &n)| to_cluster(RgbColor::from_f64(*c), n))
        .collect();

    let total: u64 = bins.iter().map(|b| b.count).sum();
    let histogram_clusters: Vec<ColorCluster> = if total == 0 {
        Vec::new()
    } else {
        bins.iter()
            .filter(|b| b.count as f64 / total as f64 > histogram.min_frequency)
            .map(|b| to_cluster(b.color, b.count))
            .collect()
    };

    let method = match (kmeans_clusters.is_empty(), histogram_clusters.is_empty()) {
        (false, true) => PaletteMethod::KMeans,
        (true, false) => PaletteMethod::Histogram,
        _ => PaletteMethod::Hybrid,
    };

    debug!(
        "palette: {} samples, {} k-means clusters in {} iterations (converged: {}), {} histogram bins",
        samples.len(),
        kmeans_clusters.len(),
        outcome.iterations,
        outcome.converged,
        histogram_clusters.len()
    );

    let mut candidates = kmeans_clusters.clone();
    candidates.extend(histogram_clusters.iter().copied());
    let profile = build_profile(merge_clusters(candidates, histogram.merge_distance));

    CandleColorDetectionResult {
        profile,
        kmeans_clusters,
        histogram_clusters,
        method,
        iterations: outcome.iterations,
        converged: outcome.converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    const GREEN: Rgb<u8> = Rgb([20, 170, 60]);
    const RED: Rgb<u8> = Rgb([210, 40, 40]);

    fn chart_like() -> PixelBuffer {
        let mut img = RgbImage::from_pixel(120, 80, WHITE);
        for x in 10..40 {
            for y in 10..70 {
                img.put_pixel(x, y, GREEN);
            }
        }
        for x in 60..80 {
            for y in 20..50 {
                img.put_pixel(x, y, RED);
            }
        }
        PixelBuffer::from_image(&DynamicImage::ImageRgb8(img)).unwrap()
    }

    #[test]
    fn test_classify_reference_bands() {
        assert_eq!(classify_role(RgbColor::new(0, 160, 60)).0, ColorRole::BullishFill);
        assert_eq!(classify_role(RgbColor::new(200, 30, 30)).0, ColorRole::BearishFill);
        assert_eq!(classify_role(RgbColor::new(150, 230, 150)).0, ColorRole::BullishStroke);
        assert_eq!(classify_role(RgbColor::new(245, 160, 160)).0, ColorRole::BearishStroke);
        assert_eq!(classify_role(RgbColor::new(40, 80, 200)).0, ColorRole::Wick);
        assert_eq!(classify_role(RgbColor::new(128, 128, 130)).0, ColorRole::Background);

        // exactly on a reference center
        let (_, conf) = classify_role(BULLISH_FILL_REF);
        assert!((conf - 1.0).abs() < 1e-12);
        let (_, far) = classify_role(RgbColor::new(90, 110, 50));
        assert!(far < conf);
    }

    #[test]
    fn test_unique_colors_binned_and_sorted() {
        let buf = chart_like();
        let colors = extract_unique_colors(&buf, 16);
        assert_eq!(colors.len(), 3);
        // white background dominates; 255 lands in the last bin's center
        assert_eq!(colors[0].color, RgbColor::new(248, 248, 248));
        assert_eq!(colors[1].count, 30 * 60);
        let total: u64 = colors.iter().map(|c| c.count).sum();
        assert_eq!(total, 120 * 80);
    }

    #[test]
    fn test_detects_candle_roles() {
        let result = detect_candle_colors(&chart_like(), None, None);
        let profile = &result.profile;
        assert_eq!(result.method, PaletteMethod::Hybrid);
        assert!(result.converged);

        let bull = profile.color(ColorRole::BullishFill).unwrap();
        let bear = profile.color(ColorRole::BearishFill).unwrap();
        let bg = profile.color(ColorRole::Background).unwrap();
        assert!(bull.distance(&RgbColor::new(20, 170, 60)) < 10.0);
        assert!(bear.distance(&RgbColor::new(210, 40, 40)) < 10.0);
        assert!(bg.distance(&RgbColor::new(255, 255, 255)) < 16.0);
        assert!(profile.overall_confidence > 0.5);
    }

    #[test]
    fn test_histogram_drops_bins_under_min_frequency() {
        let bins = vec![
            ColorCount { color: RgbColor::new(248, 248, 248), count: 980 },
            // 1.1% and 0.9% of 1000 pixels around the 1% cutoff
            ColorCount { color: RgbColor::new(8, 168, 56), count: 11 },
            ColorCount { color: RgbColor::new(200, 40, 40), count: 9 },
        ];
        let result = detect_from_samples(
            &[],
            &bins,
            &KMeansParams::default(),
            &HistogramParams::default(),
        );

        assert_eq!(result.method, PaletteMethod::Histogram);
        assert_eq!(result.histogram_clusters.len(), 2);
        assert!(result
            .histogram_clusters
            .iter()
            .any(|c| c.color == RgbColor::new(8, 168, 56)));
        assert!(result
            .histogram_clusters
            .iter()
            .all(|c| c.color != RgbColor::new(200, 40, 40)));
        assert!(result.profile.color(ColorRole::BearishFill).is_none());
    }

    #[test]
    fn test_kmeans_stops_at_max_iterations() {
        // Farthest-point init picks (0,0,0) and (200,0,0); (10,0,0) pulls the first
        // centroid 5 units on the first pass, so one pass cannot converge
        let samples = vec![
            ColorCount { color: RgbColor::new(0, 0, 0), count: 10 },
            ColorCount { color: RgbColor::new(10, 0, 0), count: 10 },
            ColorCount { color: RgbColor::new(200, 0, 0), count: 10 },
        ];
        let capped = KMeansParams {
            k: 2,
            max_iterations: 1,
            ..KMeansParams::default()
        };
        let result = detect_from_samples(&samples, &[], &capped, &HistogramParams::default());
        assert_eq!(result.iterations, 1);
        assert!(!result.converged);
        assert_eq!(result.method, PaletteMethod::KMeans);

        let free = KMeansParams { k: 2, ..KMeansParams::default() };
        let result = detect_from_samples(&samples, &[], &free, &HistogramParams::default());
        assert_eq!(result.iterations, 2);
        assert!(result.converged);
    }

    #[test]
    fn test_detection_is_idempotent() {
        let buf = chart_like();
        let a = detect_candle_colors(&buf, None, None);
        let b = detect_candle_colors(&buf, None, None);
        assert_eq!(a.profile.colors, b.profile.colors);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_samples_yield_nothing() {
        let result = detect_from_samples(
            &[],
            &[],
            &KMeansParams::default(),
            &HistogramParams::default(),
        );
        assert!(result.profile.colors.iter().all(|(_, c)| c.is_none()));
        assert_eq!(result.profile.overall_confidence, 0.0);
        assert_eq!(result.method, PaletteMethod::Hybrid);
    }

    #[test]
    fn test_merge_sums_counts_and_votes() {
        let clusters = vec![
            ColorCluster {
                color: RgbColor::new(0, 160, 60),
                pixel_count: 100,
                confidence: 0.6,
                role: ColorRole::BullishFill,
            },
            ColorCluster {
                color: RgbColor::new(5, 165, 60),
                pixel_count: 40,
                confidence: 0.9,
                role: ColorRole::BullishStroke,
            },
            ColorCluster {
                color: RgbColor::new(255, 255, 255),
                pixel_count: 500,
                confidence: 1.0,
                role: ColorRole::Background,
            },
        ];
        let merged = merge_clusters(clusters, 24.0);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].pixel_count, 140);
        assert_eq!(merged[1].confidence, 0.9);
        assert_eq!(merged[1].role, ColorRole::BullishFill);
        assert_eq!(merged[1].color, RgbColor::new(0, 160, 60));
    }

    #[test]
    fn test_classify_pixel_respects_background() {
        let result = detect_candle_colors(&chart_like(), None, None);
        let profile = &result.profile;
        assert_eq!(
            profile.classify_pixel(RgbColor::new(25, 165, 55), 60.0),
            Some(ColorRole::BullishFill)
        );
        assert_eq!(profile.classify_pixel(RgbColor::new(250, 250, 250), 60.0), None);
        assert_eq!(profile.classify_pixel(RgbColor::new(0, 0, 255), 60.0), None);
    }

    #[test]
    fn test_role_map_serializes_by_name() {
        let mut map: RoleMap<Option<RgbColor>> = RoleMap::default();
        *map.get_mut(ColorRole::Wick) = Some(RgbColor::new(1, 2, 3));
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["wick"]["b"], 3);
        assert!(json["background"].is_null());
    }
}
