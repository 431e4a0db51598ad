use crate::config::MapConfig;
use crate::types::{District, GeoPoint};
use anyhow::{Context, Result, anyhow};
use geo::LineString;
use image::{ImageBuffer, Pixel, Rgba, RgbaImage};
use plotters::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

const OUTLINE_COLOR: &str = "#000000";
const NODE_COLOR: &str = "#ff0000";
const NODE_ALPHA: f64 = 0.5;
const NODE_RADIUS: i64 = 3;

/// Scatter of node positions over the district outlines, cropped to the
/// configured bounds (plate carrée).
pub fn render_map<'p>(
    config: &MapConfig,
    districts: &[District],
    points: impl IntoIterator<Item = &'p GeoPoint>,
    path: &Path,
) -> Result<()> {
    info!("Rendering map {:?} to {:?}", config.title, path);

    let img = draw_map(config, districts, points);
    img.save(path)
        .with_context(|| format!("Failed to save map image: {:?}", path))?;

    Ok(())
}

fn draw_map<'p>(
    config: &MapConfig,
    districts: &[District],
    points: impl IntoIterator<Item = &'p GeoPoint>,
) -> RgbaImage {
    let projection = Projection::new(config);
    let mut img: RgbaImage = ImageBuffer::from_pixel(config.width, config.height, Rgba([255, 255, 255, 255]));

    let outline = hex_to_rgba(OUTLINE_COLOR, 1.0);
    for district in districts {
        for polygon in district.geometry.iter() {
            draw_ring(&mut img, &projection, polygon.exterior(), outline);
            for interior in polygon.interiors() {
                draw_ring(&mut img, &projection, interior, outline);
            }
        }
    }

    let dot = hex_to_rgba(NODE_COLOR, NODE_ALPHA);
    for point in points {
        let (cx, cy) = projection.project(point.x(), point.y());
        let (cx, cy) = (cx.round() as i64, cy.round() as i64);
        for dy in -NODE_RADIUS..=NODE_RADIUS {
            for dx in -NODE_RADIUS..=NODE_RADIUS {
                if dx * dx + dy * dy <= NODE_RADIUS * NODE_RADIUS {
                    blend_pixel(&mut img, cx + dx, cy + dy, dot);
                }
            }
        }
    }

    img
}

struct Projection {
    lon_min: f64,
    lat_max: f64,
    x_scale: f64,
    y_scale: f64,
}

impl Projection {
    fn new(config: &MapConfig) -> Self {
        let [lat_min, lat_max] = config.bounds_lat;
        let [lon_min, lon_max] = config.bounds_lon;
        Projection {
            lon_min,
            lat_max,
            x_scale: (config.width - 1) as f64 / (lon_max - lon_min),
            y_scale: (config.height - 1) as f64 / (lat_max - lat_min),
        }
    }

    fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        ((lon - self.lon_min) * self.x_scale, (self.lat_max - lat) * self.y_scale)
    }
}

fn draw_ring(img: &mut RgbaImage, projection: &Projection, ring: &LineString<f64>, color: Rgba<u8>) {
    for line in ring.lines() {
        let from = projection.project(line.start.x, line.start.y);
        let to = projection.project(line.end.x, line.end.y);
        draw_line(img, from, to, color);
    }
}

// DDA, one sample per pixel along the major axis.
fn draw_line(img: &mut RgbaImage, from: (f64, f64), to: (f64, f64), color: Rgba<u8>) {
    let Some((from, to)) = clip_segment(from, to, img.width() as f64, img.height() as f64) else {
        return;
    };
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as i64;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = (from.0 + dx * t).round() as i64;
        let y = (from.1 + dy * t).round() as i64;
        blend_pixel(img, x, y, color);
    }
}

/// Liang-Barsky clip of a segment to the canvas plus a one-pixel margin,
/// so a segment costs at most one canvas diagonal however far it reaches.
fn clip_segment(from: (f64, f64), to: (f64, f64), width: f64, height: f64) -> Option<((f64, f64), (f64, f64))> {
    if ![from.0, from.1, to.0, to.1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for (p, q) in [
        (-dx, from.0 + 1.0),
        (dx, width - from.0),
        (-dy, from.1 + 1.0),
        (dy, height - from.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((
        (from.0 + t0 * dx, from.1 + t0 * dy),
        (from.0 + t1 * dx, from.1 + t1 * dy),
    ))
}

fn blend_pixel(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= img.width() as i64 || y >= img.height() as i64 {
        return;
    }
    img.get_pixel_mut(x as u32, y as u32).blend(&color);
}

fn hex_to_rgba(hex: &str, alpha: f64) -> Rgba<u8> {
    let hex = hex.trim_start_matches('#');
    let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0);
    let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0);
    let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0);
    Rgba([r, g, b, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8])
}

/// Districts ordered by count, smallest first; ties by name.
pub fn sorted_ascending(counts: &BTreeMap<String, usize>) -> Vec<(&str, usize)> {
    let mut bars: Vec<(&str, usize)> = counts.iter().map(|(name, count)| (name.as_str(), *count)).collect();
    bars.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    bars
}

/// Horizontal bar chart of per-district counts.
pub fn render_bar_chart(config: &MapConfig, counts: &BTreeMap<String, usize>, path: &Path) -> Result<()> {
    info!("Rendering bar chart {:?} to {:?}", config.title, path);

    let bars = sorted_ascending(counts);
    if bars.is_empty() {
        return Err(anyhow!("No districts to chart"));
    }

    draw_bar_chart(config, &bars, path)
        .map_err(|e| anyhow!("Failed to draw bar chart {:?}: {}", path, e))
}

fn draw_bar_chart(
    config: &MapConfig,
    bars: &[(&str, usize)],
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (config.chart_width, config.chart_height)).into_drawing_area();
    root.fill(&WHITE)?;

    let max_count = bars.iter().map(|(_, count)| *count as u32).max().unwrap_or(0);
    let n_bars = bars.len() as u32;

    let mut chart = ChartBuilder::on(&root)
        .caption(&config.title, ("sans-serif", 60))
        .margin(40_i32)
        .x_label_area_size(80_i32)
        .y_label_area_size(config.chart_width / 5)
        .build_cartesian_2d(0u32..max_count + 1, (0u32..n_bars).into_segmented())?;

    let label = |v: &SegmentValue<u32>| match v {
        SegmentValue::CenterOf(i) => bars.get(*i as usize).map(|(name, _)| name.to_string()).unwrap_or_default(),
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(bars.len())
        .y_label_formatter(&label)
        .label_style(("sans-serif", 36))
        .draw()?;

    chart.draw_series(
        Histogram::horizontal(&chart)
            .style(RED.mix(0.5).filled())
            .margin(6)
            .data(bars.iter().enumerate().map(|(i, (_, count))| (i as u32, *count as u32))),
    )?;

    root.present()?;

    Ok(())
}
