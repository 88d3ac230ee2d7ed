//! Benchmarks for the chart reading stages.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chart_ohlc_scan::core::candle_palette::detect_candle_colors;
use chart_ohlc_scan::core::edge_scan::{detect_edges, EdgeParams};
use chart_ohlc_scan::core::label_text::OcrReading;
use chart_ohlc_scan::core::plot_area::{detect_automatic, ClickPoint, PlotAreaParams, PlotCorners};
use chart_ohlc_scan::{ChartReader, ChartRequest, PixelBuffer};
use image::{DynamicImage, Rgb, RgbImage};

const HEIGHT: u32 = 400;

/// White chart with a black frame and `count` alternating candles, 10px apart.
fn generate_chart(count: u32) -> PixelBuffer {
    let width = 40 + count * 10;
    let mut img = RgbImage::from_pixel(width, HEIGHT, Rgb([255, 255, 255]));

    for x in 10..width - 10 {
        img.put_pixel(x, 10, Rgb([0, 0, 0]));
        img.put_pixel(x, HEIGHT - 10, Rgb([0, 0, 0]));
    }
    for y in 10..=HEIGHT - 10 {
        img.put_pixel(10, y, Rgb([0, 0, 0]));
        img.put_pixel(width - 10, y, Rgb([0, 0, 0]));
    }

    for i in 0..count {
        let x = 20 + i * 10;
        let mid = 200.0 + (i as f32 * 0.2).sin() * 120.0;
        let body_top = (mid - 20.0) as u32;
        let body_bottom = (mid + 20.0) as u32;
        let color = if i % 2 == 0 { Rgb([0, 180, 70]) } else { Rgb([220, 40, 40]) };

        for y in body_top - 15..=body_bottom + 15 {
            img.put_pixel(x + 2, y, color);
        }
        for dx in 0..5 {
            for y in body_top..=body_bottom {
                img.put_pixel(x + dx, y, color);
            }
        }
    }

    PixelBuffer::from_image(&DynamicImage::ImageRgb8(img)).unwrap()
}

fn request_for(buffer: &PixelBuffer) -> ChartRequest {
    let right = buffer.width() as i64 - 11;
    let bottom = HEIGHT as i64 - 11;
    ChartRequest {
        price_readings: vec![
            OcrReading::new(20.0, "1000", 0.9),
            OcrReading::new(380.0, "100", 0.9),
        ],
        corners: Some(PlotCorners {
            top_left: ClickPoint::new(11, 11),
            top_right: ClickPoint::new(right, 11),
            bottom_left: ClickPoint::new(11, bottom),
        }),
        timeframe: Some("5m".to_string()),
        anchor: Some("2024-01-01T00:00:00Z".parse().unwrap()),
        ..ChartRequest::default()
    }
}

fn bench_full_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_read");
    let reader = ChartReader::default();

    for count in [20u32, 100, 300].iter() {
        let buffer = generate_chart(*count);
        let request = request_for(&buffer);

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &buffer, |b, buffer| {
            b.iter(|| reader.read(black_box(buffer), &request).unwrap());
        });
    }

    group.finish();
}

fn bench_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("stages");
    let buffer = generate_chart(100);

    group.bench_function("detect_edges", |b| {
        b.iter(|| detect_edges(black_box(&buffer), &EdgeParams::default()));
    });

    let edges = detect_edges(&buffer, &EdgeParams::default());
    group.bench_function("detect_automatic", |b| {
        b.iter(|| detect_automatic(black_box(&edges), &PlotAreaParams::default()));
    });

    group.bench_function("detect_candle_colors", |b| {
        b.iter(|| detect_candle_colors(black_box(&buffer), None, None));
    });

    group.finish();
}

criterion_group!(benches, bench_full_read, bench_stages);
criterion_main!(benches);
