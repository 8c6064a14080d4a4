#![cfg(not(tarpaulin_include))]
#![cfg(feature = "web")]

use crate::aggregate::{CategoryGroup, MonthlyGenerationPoint};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use plotters::prelude::*;
use std::error::Error;
use std::io::Cursor;

/// Styling for a dashboard bar chart
#[derive(Clone, Debug)]
pub struct ChartOptions {
    /// Title displayed at the top of the chart
    pub title: String,
    pub y_label: String,
    /// Width of the image in pixels
    pub width: u32,
    /// Height of the image in pixels
    pub height: u32,
    pub color: RGBColor,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: "Chart".to_string(),
            y_label: String::new(),
            width: 900,
            height: 450,
            color: RGBColor(37, 99, 235),
        }
    }
}

/// Monthly generation bar chart, in fiscal order, as PNG
///
/// # Arguments
/// * `points` - Monthly series from the aggregator
///
/// # Returns
/// * A Result containing the PNG image data as bytes or an error
pub fn render_monthly_generation(
    points: &[MonthlyGenerationPoint],
) -> Result<Vec<u8>, Box<dyn Error>> {
    let bars: Vec<(String, f64)> = points
        .iter()
        .map(|p| (p.month.clone(), p.value_mu))
        .collect();
    let options = ChartOptions {
        title: "Monthly Generation".to_string(),
        y_label: "MU".to_string(),
        ..ChartOptions::default()
    };
    render_bars(&bars, &options)
}

/// Installed capacity per plant category, as PNG
pub fn render_category_capacity(groups: &[CategoryGroup]) -> Result<Vec<u8>, Box<dyn Error>> {
    let bars: Vec<(String, f64)> = groups
        .iter()
        .map(|g| (g.label.clone(), g.installed_capacity))
        .collect();
    let options = ChartOptions {
        title: "Capacity by Category".to_string(),
        y_label: "MW".to_string(),
        color: RGBColor(22, 163, 74),
        ..ChartOptions::default()
    };
    render_bars(&bars, &options)
}

/// Draws labelled bars into an in-memory RGB buffer and encodes it as PNG
fn render_bars(bars: &[(String, f64)], options: &ChartOptions) -> Result<Vec<u8>, Box<dyn Error>> {
    let (width, height) = (options.width, options.height);
    let mut pixels = vec![0u8; (width * height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE)?;

        let slots = bars.len().max(1) as u32;
        let max_y = bars.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
        let y_top = if max_y > 0.0 { max_y * 1.1 } else { 1.0 };

        let mut chart = ChartBuilder::on(&root)
            .caption(&options.title, ("sans-serif", 28).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d((0u32..slots).into_segmented(), 0.0..y_top)?;

        let label = |v: &SegmentValue<u32>| match v {
            SegmentValue::CenterOf(i) => bars
                .get(*i as usize)
                .map(|(name, _)| name.clone())
                .unwrap_or_default(),
            _ => String::new(),
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(bars.len().max(1))
            .x_label_formatter(&label)
            .y_desc(&options.y_label)
            .draw()?;

        chart.draw_series(
            Histogram::vertical(&chart)
                .style(options.color.filled())
                .margin(8)
                .data(bars.iter().enumerate().map(|(i, (_, v))| (i as u32, *v))),
        )?;

        root.present()?;
    }

    let image = RgbImage::from_raw(width, height, pixels).ok_or("chart buffer has wrong size")?;
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image).write_to(&mut png, ImageOutputFormat::Png)?;
    Ok(png.into_inner())
}
