pub mod axis_x;
pub mod axis_y;
pub mod candle_palette;
pub mod column_mask;
pub mod column_reader;
pub mod edge_scan;
pub mod label_text;
pub mod line_fit;
pub mod pixel_buffer;
pub mod plot_area;
pub mod scoring;
