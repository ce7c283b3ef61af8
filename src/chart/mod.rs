//! Chart rendering for player-count history.
//!
//! Produces a fixed-size PNG line chart. Rendering is a pure function of the
//! series and color so it can sit behind a trait and be faked in tests.

mod glyphs;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::history::HistorySeries;

pub const CHART_WIDTH: u32 = 800;
pub const CHART_HEIGHT: u32 = 400;

/// Fewer samples than this draw no trend.
pub const MIN_SAMPLES: usize = 2;

const MARGIN_LEFT: f32 = 56.0;
const MARGIN_RIGHT: f32 = 24.0;
const MARGIN_TOP: f32 = 20.0;
const MARGIN_BOTTOM: f32 = 40.0;
const GRID_LINES: u32 = 4;
const LABEL_SCALE: u32 = 2;
/// Time labels are smaller so a day of hourly samples is labelled in full.
const TIME_LABEL_SCALE: u32 = 1;

/// Alpha of the area under the line.
const FILL_ALPHA: u8 = 0x40;

/// Chart error types.
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("invalid color: {0}")]
    InvalidColor(String),
    #[error("failed to allocate {0}x{1} canvas")]
    Canvas(u32, u32),
    #[error("failed to build path")]
    Path,
    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// An sRGB color, written as `#rrggbb` in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Packed `0xRRGGBB`, the form embed colors take.
    pub fn to_u32(self) -> u32 {
        (u32::from(self.0) << 16) | (u32::from(self.1) << 8) | u32::from(self.2)
    }

    fn paint(self, alpha: u8) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(self.0, self.1, self.2, alpha);
        paint.anti_alias = true;
        paint
    }
}

impl FromStr for Rgb {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ChartError::InvalidColor(s.to_string()));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ChartError::InvalidColor(s.to_string()));
        Ok(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Rgb {
    type Error = ChartError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> Self {
        c.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Turns a history series into image bytes.
pub trait ChartRenderer: Send + Sync {
    /// Returns `Ok(None)` when the series is too short to show a trend.
    fn render(&self, series: &HistorySeries, color: Rgb) -> Result<Option<Vec<u8>>, ChartError>;
}

/// Software rasterizer producing PNG line charts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngChartRenderer;

impl ChartRenderer for PngChartRenderer {
    fn render(&self, series: &HistorySeries, color: Rgb) -> Result<Option<Vec<u8>>, ChartError> {
        if series.len() < MIN_SAMPLES {
            return Ok(None);
        }

        let pixmap = draw_chart(series, color)?;
        let png = pixmap.encode_png().map_err(|e| ChartError::Encode(e.to_string()))?;
        Ok(Some(png))
    }
}

fn draw_chart(series: &HistorySeries, color: Rgb) -> Result<Pixmap, ChartError> {
    let mut pixmap =
        Pixmap::new(CHART_WIDTH, CHART_HEIGHT).ok_or(ChartError::Canvas(CHART_WIDTH, CHART_HEIGHT))?;
    pixmap.fill(Color::from_rgba8(0x2b, 0x2d, 0x31, 0xff));

    let left = MARGIN_LEFT;
    let right = CHART_WIDTH as f32 - MARGIN_RIGHT;
    let top = MARGIN_TOP;
    let bottom = CHART_HEIGHT as f32 - MARGIN_BOTTOM;
    let plot_w = right - left;
    let plot_h = bottom - top;

    let y_max = axis_max(series.max_value());
    let label = Rgb(0xb5, 0xba, 0xc1).paint(0xff);
    let grid = Rgb(0xff, 0xff, 0xff).paint(0x20);

    // Horizontal grid and y labels, origin pinned to zero.
    for k in 0..=GRID_LINES {
        let y = bottom - plot_h * k as f32 / GRID_LINES as f32;
        if let Some(rect) = Rect::from_xywh(left, y, plot_w, 1.0) {
            pixmap.fill_rect(rect, &grid, Transform::identity(), None);
        }
        let text = (y_max * k / GRID_LINES).to_string();
        let tx = left - 8.0 - glyphs::text_width(&text, LABEL_SCALE) as f32;
        let ty = y - glyphs::text_height(LABEL_SCALE) as f32 / 2.0;
        glyphs::draw_text(&mut pixmap, &text, tx, ty, LABEL_SCALE, &label);
    }

    let step_x = plot_w / (series.len() - 1) as f32;
    let points: Vec<(f32, f32)> = series
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let x = left + step_x * i as f32;
            let y = bottom - plot_h * s.value as f32 / y_max as f32;
            (x, y)
        })
        .collect();

    let mut area = PathBuilder::new();
    area.move_to(points[0].0, bottom);
    for &(x, y) in &points {
        area.line_to(x, y);
    }
    area.line_to(points[points.len() - 1].0, bottom);
    area.close();
    let area = area.finish().ok_or(ChartError::Path)?;
    pixmap.fill_path(&area, &color.paint(FILL_ALPHA), FillRule::Winding, Transform::identity(), None);

    let mut line = PathBuilder::new();
    line.move_to(points[0].0, points[0].1);
    for &(x, y) in &points[1..] {
        line.line_to(x, y);
    }
    let line = line.finish().ok_or(ChartError::Path)?;
    let stroke = Stroke {
        width: 3.0,
        ..Default::default()
    };
    let accent = color.paint(0xff);
    pixmap.stroke_path(&line, &accent, &stroke, Transform::identity(), None);

    for &(x, y) in &points {
        if let Some(dot) = PathBuilder::from_circle(x, y, 4.0) {
            pixmap.fill_path(&dot, &accent, FillRule::Winding, Transform::identity(), None);
        }
    }

    // Time-of-day labels, thinned only when they would overlap.
    let every = label_stride(series.len(), plot_w);
    for (i, (sample, &(x, _))) in series.iter().zip(&points).enumerate() {
        if i % every != 0 {
            continue;
        }
        let text = sample.time.format("%H:%M").to_string();
        let tx = x - glyphs::text_width(&text, TIME_LABEL_SCALE) as f32 / 2.0;
        glyphs::draw_text(&mut pixmap, &text, tx, bottom + 12.0, TIME_LABEL_SCALE, &label);
    }

    Ok(pixmap)
}

/// Label every n-th sample so `HH:MM` labels keep a small gap.
fn label_stride(samples: usize, plot_w: f32) -> usize {
    if samples < 2 {
        return 1;
    }
    let step_x = plot_w / (samples - 1) as f32;
    let label_w = glyphs::text_width("00:00", TIME_LABEL_SCALE) as f32 + 8.0;
    (label_w / step_x).ceil().max(1.0) as usize
}

/// Y-axis maximum: at least 4, rounded up to a multiple of the grid count.
fn axis_max(max_value: u32) -> u32 {
    let max_value = max_value.max(GRID_LINES);
    max_value.div_ceil(GRID_LINES) * GRID_LINES
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistorySample;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn series(values: &[u32]) -> HistorySeries {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| HistorySample {
                time: t0 + ChronoDuration::hours(i as i64),
                value,
            })
            .collect()
    }

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn test_day_of_hourly_samples_labels_every_point() {
        let plot_w = CHART_WIDTH as f32 - MARGIN_LEFT - MARGIN_RIGHT;
        assert_eq!(label_stride(24, plot_w), 1);
        assert_eq!(label_stride(2, plot_w), 1);
        assert!(label_stride(168, plot_w) > 1);
    }

    #[test]
    fn test_render_needs_two_samples() {
        let renderer = PngChartRenderer;
        let red = Rgb(0xff, 0, 0);
        assert!(renderer.render(&series(&[]), red).unwrap().is_none());
        assert!(renderer.render(&series(&[5]), red).unwrap().is_none());
    }

    #[test]
    fn test_render_produces_png() {
        let renderer = PngChartRenderer;
        for color in [Rgb(0, 0, 0), Rgb(0xff, 0xff, 0xff), Rgb(0x58, 0x65, 0xf2)] {
            let bytes = renderer.render(&series(&[8, 3]), color).unwrap().unwrap();
            assert!(bytes.starts_with(&PNG_SIGNATURE));
        }
    }

    #[test]
    fn test_render_handles_full_day_and_zeros() {
        let renderer = PngChartRenderer;
        let values: Vec<u32> = (0..24).map(|i| i * 3).collect();
        assert!(renderer.render(&series(&values), Rgb(0, 0x80, 0)).unwrap().is_some());
        assert!(renderer.render(&series(&[0, 0, 0]), Rgb(0, 0x80, 0)).unwrap().is_some());
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = PngChartRenderer;
        let s = series(&[1, 4, 2, 9]);
        let a = renderer.render(&s, Rgb(1, 2, 3)).unwrap();
        let b = renderer.render(&s, Rgb(1, 2, 3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_axis_max() {
        assert_eq!(axis_max(0), 4);
        assert_eq!(axis_max(3), 4);
        assert_eq!(axis_max(5), 8);
        assert_eq!(axis_max(20), 20);
        assert_eq!(axis_max(21), 24);
    }

    #[test]
    fn test_color_parsing() {
        assert_eq!("#5865f2".parse::<Rgb>().unwrap(), Rgb(0x58, 0x65, 0xf2));
        assert_eq!("FFAA00".parse::<Rgb>().unwrap(), Rgb(0xff, 0xaa, 0x00));
        assert!("#fff".parse::<Rgb>().is_err());
        assert!("#gg0000".parse::<Rgb>().is_err());

        let c = Rgb(0x12, 0x34, 0x56);
        assert_eq!(c.to_string(), "#123456");
        assert_eq!(c.to_u32(), 0x123456);
    }
}
