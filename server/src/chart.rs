use crate::errors::{Error, Result};
use crate::mirror::MirrorEntry;
use image::{ImageFormat, RgbImage};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::fmt::Display;
use std::io::Cursor;

pub const MQ6_SIZE: (u32, u32) = (1000, 600);
pub const AHT21_SIZE: (u32, u32) = (1000, 1200);
pub const OVERALL_SIZE: (u32, u32) = (1800, 1800);

pub const MQ6_COLOR: RGBColor = RED;
pub const TEMPERATURE_COLOR: RGBColor = BLUE;
pub const HUMIDITY_COLOR: RGBColor = GREEN;

/// One line chart stacked vertically in the output image.
#[derive(Debug, Clone)]
pub struct Panel {
    pub entries: Vec<MirrorEntry>,
    pub color: RGBColor,
}

impl Panel {
    pub fn new(entries: Vec<MirrorEntry>, color: RGBColor) -> Self {
        Self { entries, color }
    }
}

fn render_error<E: Display>(e: E) -> Error {
    Error::Render(e.to_string())
}

/// Renders the panels top to bottom into a PNG of the given size.
pub fn render_png(panels: &[Panel], (width, height): (u32, u32)) -> Result<Vec<u8>> {
    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let areas = root.split_evenly((panels.len().max(1), 1));
        for (area, panel) in areas.iter().zip(panels) {
            draw_panel(area, panel)?;
        }
        root.present().map_err(render_error)?;
    }
    encode_png(pixels, width, height)
}

fn draw_panel(area: &DrawingArea<BitMapBackend<'_>, Shift>, panel: &Panel) -> Result<()> {
    let points = numeric_points(&panel.entries);
    let x_max = panel.entries.len().saturating_sub(1).max(1) as f64;
    let (y_min, y_max) = value_range(&points);

    let mut chart = ChartBuilder::on(area)
        .margin(24)
        .build_cartesian_2d(0f64..x_max, y_min..y_max)
        .map_err(render_error)?;

    chart
        .draw_series(std::iter::once(Rectangle::new(
            [(0.0, y_min), (x_max, y_max)],
            BLACK.mix(0.3).stroke_width(1),
        )))
        .map_err(render_error)?;

    chart
        .draw_series(LineSeries::new(
            points.iter().copied(),
            panel.color.stroke_width(2),
        ))
        .map_err(render_error)?;

    chart
        .draw_series(
            points
                .iter()
                .map(|&point| Circle::new(point, 4, panel.color.filled())),
        )
        .map_err(render_error)?;

    Ok(())
}

/// Position in the series against numeric value. Entries whose value is not
/// a number keep their slot on the x axis but are not drawn.
pub fn numeric_points(entries: &[MirrorEntry]) -> Vec<(f64, f64)> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| entry.value.as_f64().map(|v| (i as f64, v)))
        .collect()
}

fn value_range(points: &[(f64, f64)]) -> (f64, f64) {
    let mut values = points.iter().map(|&(_, v)| v);
    let Some(first) = values.next() else {
        return (0.0, 1.0);
    };
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));

    if min == max {
        (min - 1.0, max + 1.0)
    } else {
        let pad = (max - min) * 0.05;
        (min - pad, max + pad)
    }
}

fn encode_png(pixels: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>> {
    let image = RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| Error::Render("pixel buffer does not match image size".to_string()))?;

    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(render_error)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    fn entry(ts: &str, value: serde_json::Value) -> MirrorEntry {
        MirrorEntry {
            timestamp: ts.to_string(),
            value,
        }
    }

    #[test]
    fn test_empty_series_renders() {
        let png = render_png(&[Panel::new(Vec::new(), MQ6_COLOR)], MQ6_SIZE).unwrap();
        assert_eq!(&png[..8], &PNG_SIGNATURE);

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), MQ6_SIZE);
    }

    #[test]
    fn test_multi_panel_dimensions() {
        let entries = vec![
            entry("2024-05-01 10:00:00", json!(21.0)),
            entry("2024-05-01 10:00:05", json!(21.4)),
            entry("2024-05-01 10:00:10", json!(20.9)),
        ];
        let panels = [
            Panel::new(entries.clone(), TEMPERATURE_COLOR),
            Panel::new(entries, HUMIDITY_COLOR),
        ];

        let png = render_png(&panels, AHT21_SIZE).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), AHT21_SIZE);
    }

    #[test]
    fn test_non_numeric_values_skipped() {
        let entries = vec![
            entry("2024-05-01 10:00:00", json!(300)),
            entry("2024-05-01 10:00:05", json!("offline")),
            entry("2024-05-01 10:00:10", json!(320.5)),
        ];
        assert_eq!(numeric_points(&entries), vec![(0.0, 300.0), (2.0, 320.5)]);
    }

    #[test]
    fn test_value_range() {
        assert_eq!(value_range(&[]), (0.0, 1.0));
        assert_eq!(value_range(&[(0.0, 5.0)]), (4.0, 6.0));

        let (lo, hi) = value_range(&[(0.0, 10.0), (1.0, 20.0)]);
        assert!(lo < 10.0 && hi > 20.0);
    }
}
