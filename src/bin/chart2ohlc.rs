//! Command-line front end: reads one chart screenshot and prints the OHLC reading as JSON.
//!
//! OCR runs elsewhere; its output is passed in with `--labels`:
//!
//! ```json
//! {
//!   "price": [{"pixel_coordinate": 40, "text": "1,250.00", "confidence": 0.93}],
//!   "time":  [{"pixel_coordinate": 120, "text": "09:00", "confidence": 0.88}]
//! }
//! ```
//!
//! An external segmentation can be given with `--segmentation`: a grayscale PNG the size of
//! the chart whose pixel values are class codes (0 other, 1 body, 2 wick).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chart_ohlc_scan::core::column_mask::SegmentationMask;
use chart_ohlc_scan::core::label_text::OcrReading;
use chart_ohlc_scan::core::plot_area::PlotCorners;
use chart_ohlc_scan::{ChartReader, ChartRequest, EngineConfig};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(
    name = "chart2ohlc",
    version,
    about = "Recover OHLC candles from a candlestick chart screenshot"
)]
struct Cli {
    /// Chart image (PNG or JPEG)
    image: PathBuf,

    /// JSON file with OCR readings: {"price": [...], "time": [...]}
    #[arg(long)]
    labels: PathBuf,

    /// JSON file with the plot corners: {"top_left": {"x":..,"y":..}, "top_right": .., "bottom_left": ..}
    #[arg(long)]
    corners: Option<PathBuf>,

    /// Grayscale PNG of per-pixel class codes (0 other, 1 body, 2 wick)
    #[arg(long)]
    segmentation: Option<PathBuf>,

    /// Candle period, e.g. "15m", "1h", "1d" (overrides the config file)
    #[arg(long)]
    timeframe: Option<String>,

    /// Open time of the leftmost candle, RFC 3339
    #[arg(long)]
    anchor: Option<DateTime<Utc>>,

    /// Date for clock-only time labels (YYYY-MM-DD)
    #[arg(long)]
    reference_date: Option<NaiveDate>,

    /// TOML config file; defaults to ./chart-ohlc.toml, then the user config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the JSON reading to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LabelFile {
    price: Vec<OcrReading>,
    time: Vec<OcrReading>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path).with_context(|| format!("cannot read {:?}", path))?;
    serde_json::from_str(&data).with_context(|| format!("invalid JSON in {:?}", path))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading config {:?}", path))?,
        None => EngineConfig::load_default(),
    };

    let labels: LabelFile = read_json(&cli.labels)?;
    let corners: Option<PlotCorners> = cli
        .corners
        .as_deref()
        .map(read_json::<PlotCorners>)
        .transpose()?;
    let segmentation = cli
        .segmentation
        .as_deref()
        .map(|path| {
            SegmentationMask::open(path).with_context(|| format!("loading segmentation {:?}", path))
        })
        .transpose()?;

    let request = ChartRequest {
        price_readings: labels.price,
        time_readings: labels.time,
        corners,
        timeframe: cli.timeframe,
        anchor: cli.anchor,
        reference_date: cli.reference_date,
        segmentation,
    };

    let reading = ChartReader::new(config)
        .read_file(&cli.image, &request)
        .with_context(|| format!("reading chart {:?}", cli.image))?;

    let json = serde_json::to_string_pretty(&reading)?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("cannot write {:?}", path))?;
            log::info!("wrote {} candles to {:?}", reading.candles.len(), path);
        }
        None => println!("{}", json),
    }
    Ok(())
}
