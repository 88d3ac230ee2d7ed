//! Recovers calibrated OHLC candles from candlestick chart screenshots.
//!
//! The per-stage building blocks live in [`core`]; [`pipeline::ChartReader`] runs them
//! end to end.
pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;

pub use crate::config::EngineConfig;
pub use crate::core::axis_x::{assign_timestamps, Timeframe, TimestampResult};
pub use crate::core::axis_y::{compute_y_mapping, AxisMapping, ScaleType};
pub use crate::core::candle_palette::{detect_candle_colors, CandleColorProfile, ColorRole, RgbColor};
pub use crate::core::column_reader::{extract_from_column, OhlcCandle};
pub use crate::core::label_text::OcrReading;
pub use crate::core::pixel_buffer::PixelBuffer;
pub use crate::core::plot_area::{calibrate_manual, detect_automatic, PlotAreaBounds, PlotCorners};
pub use crate::error::{ChartError, Result};
pub use crate::pipeline::{ChartReader, ChartReading, ChartRequest};
