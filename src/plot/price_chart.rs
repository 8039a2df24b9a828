use crate::model::{PlotError, PriceSeries};
use crate::plot::{day_label, day_offset, render_err, y_bounds};
use chrono::NaiveDate;
use plotters::prelude::*;

pub const DEFAULT_SIZE: (u32, u32) = (1200, 500);

/// Line chart of a price series with a vertical marker at each statement
/// date that falls inside the series.
pub fn render(
    title: &str,
    series: &PriceSeries,
    markers: &[NaiveDate],
    size: (u32, u32),
) -> Result<String, PlotError> {
    let (Some(origin), Some(last)) = (series.min_date(), series.max_date()) else {
        return Err(PlotError::EmptyData);
    };
    let (lo, hi) = y_bounds(series.points().iter().map(|(_, v)| *v)).ok_or(PlotError::EmptyData)?;
    let x_max = day_offset(origin, last).max(1);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(64)
            .build_cartesian_2d(0..x_max, lo..hi)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .light_line_style(WHITE)
            .x_labels(8)
            .x_label_formatter(&|x| day_label(origin, *x))
            .y_desc(series.column())
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(LineSeries::new(
                series
                    .points()
                    .iter()
                    .filter(|(_, v)| v.is_finite())
                    .map(|(d, v)| (day_offset(origin, *d), *v)),
                BLUE.stroke_width(1),
            ))
            .map_err(render_err)?;

        chart
            .draw_series(
                markers
                    .iter()
                    .filter(|d| **d >= origin && **d <= last)
                    .map(|d| {
                        let x = day_offset(origin, *d);
                        PathElement::new(vec![(x, lo), (x, hi)], RED.mix(0.6).stroke_width(1))
                    }),
            )
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
    }
    Ok(svg)
}
