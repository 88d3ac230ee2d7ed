//! Pixel Buffer
//!
//! Immutable, row-major pixel grid handed over by the image loader.
//! Supports single-channel (gray), RGB8 and RGBA8 layouts; every reader in the
//! crate goes through [`PixelBuffer::rgb`] or [`PixelBuffer::luma`] so the layout
//! never leaks into the algorithms.

use crate::core::candle_palette::RgbColor;
use crate::core::plot_area::PlotAreaBounds;
use crate::error::{ChartError, Result};
use image::DynamicImage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap a decoded buffer.
    ///
    /// # Errors
    /// `ImageAccess` when the dimensions are zero, the channel count is not 1, 3 or 4,
    /// or `data` does not hold exactly `width * height * channels` bytes.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ChartError::ImageAccess(format!(
                "empty pixel buffer ({}x{})",
                width, height
            )));
        }
        if !matches!(channels, 1 | 3 | 4) {
            return Err(ChartError::ImageAccess(format!(
                "unsupported channel count {}",
                channels
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(ChartError::ImageAccess(format!(
                "buffer holds {} bytes, expected {} for {}x{}x{}",
                data.len(),
                expected,
                width,
                height,
                channels
            )));
        }

        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Convenience constructor for RGB8 data (3 bytes per pixel).
    pub fn from_rgb(width: u32, height: u32, rgb_data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, 3, rgb_data)
    }

    /// Adapt a decoded `image` frame. Gray frames stay single-channel, everything else
    /// is normalized to RGB8.
    pub fn from_image(img: &DynamicImage) -> Result<Self> {
        match img {
            DynamicImage::ImageLuma8(gray) => {
                let (w, h) = gray.dimensions();
                Self::new(w, h, 1, gray.as_raw().clone())
            }
            _ => {
                let rgb = img.to_rgb8();
                let (w, h) = rgb.dimensions();
                Self::new(w, h, 3, rgb.into_raw())
            }
        }
    }

    /// Load and decode an image file.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let img = image::open(path)?;
        Self::from_image(&img)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Color at `(x, y)`. Out-of-range coordinates read as black.
    #[inline]
    pub fn rgb(&self, x: u32, y: u32) -> RgbColor {
        if x >= self.width || y >= self.height {
            return RgbColor::new(0, 0, 0);
        }
        let idx = (y as usize * self.width as usize + x as usize) * self.channels as usize;
        match self.channels {
            1 => {
                let v = self.data[idx];
                RgbColor::new(v, v, v)
            }
            // RGB and RGBA share the first three bytes
            _ => RgbColor::new(self.data[idx], self.data[idx + 1], self.data[idx + 2]),
        }
    }

    /// Perceived brightness (ITU-R BT.601) at `(x, y)`.
    #[inline]
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        if self.channels == 1 {
            if x >= self.width || y >= self.height {
                return 0;
            }
            return self.data[y as usize * self.width as usize + x as usize];
        }
        self.rgb(x, y).luma()
    }

    /// Whole-frame luminance plane, row-major.
    pub fn to_luma_plane(&self) -> Vec<u8> {
        let mut plane = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                plane.push(self.luma(x, y));
            }
        }
        plane
    }

    /// Copy the region covered by `bounds` into a new RGB8 buffer.
    ///
    /// The region is clipped to the frame; an empty intersection is an `ImageAccess` error.
    pub fn crop(&self, bounds: &PlotAreaBounds) -> Result<PixelBuffer> {
        let x_start = bounds.x.min(self.width);
        let y_start = bounds.y.min(self.height);
        let x_end = bounds.x.saturating_add(bounds.width).min(self.width);
        let y_end = bounds.y.saturating_add(bounds.height).min(self.height);

        let crop_width = x_end.saturating_sub(x_start);
        let crop_height = y_end.saturating_sub(y_start);

        let mut cropped = Vec::with_capacity((crop_width * crop_height * 3) as usize);
        for y in y_start..y_end {
            for x in x_start..x_end {
                let c = self.rgb(x, y);
                cropped.extend_from_slice(&[c.r, c.g, c.b]);
            }
        }

        PixelBuffer::from_rgb(crop_width, crop_height, cropped)
    }
}
