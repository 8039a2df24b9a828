use crate::analyzer::causal_impact::CausalImpact;
use crate::model::PlotError;
use crate::plot::{day_label, day_offset, render_err, y_bounds};
use plotters::coord::Shift;
use plotters::prelude::*;

pub const DEFAULT_SIZE: (u32, u32) = (1000, 900);

/// One panel: optional observed line, mean line and its interval band.
struct Panel {
    title: &'static str,
    observed: Option<Vec<(i32, f64)>>,
    mean: Vec<(i32, f64)>,
    band: Vec<(i32, f64, f64)>,
    zero_line: bool,
}

/// Renders the original, pointwise and cumulative panels stacked
/// vertically, with a marker at the intervention date.
pub fn render(impact: &CausalImpact, size: (u32, u32)) -> Result<String, PlotError> {
    let Some(first) = impact.points.first() else {
        return Err(PlotError::EmptyData);
    };
    let origin = first.date;
    let x_of = |date| day_offset(origin, date);
    let x_max = impact.points.iter().map(|p| x_of(p.date)).max().unwrap_or(0).max(1);
    let marker = x_of(impact.window.date);

    let original = Panel {
        title: "Original",
        observed: Some(impact.points.iter().map(|p| (x_of(p.date), p.observed)).collect()),
        mean: impact.points.iter().map(|p| (x_of(p.date), p.mean)).collect(),
        band: impact.points.iter().map(|p| (x_of(p.date), p.lower, p.upper)).collect(),
        zero_line: false,
    };
    let pointwise = effect_panel("Pointwise effect", impact.pointwise_effects(), x_of);
    let cumulative = effect_panel("Cumulative effect", impact.cumulative_effects(), x_of);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;
        let areas = root.split_evenly((3, 1));
        for (area, panel) in areas.iter().zip([&original, &pointwise, &cumulative]) {
            draw_panel(area, panel, origin, x_max, marker)?;
        }
        root.present().map_err(render_err)?;
    }
    Ok(svg)
}

fn effect_panel(
    title: &'static str,
    effects: Vec<(chrono::NaiveDate, f64, f64, f64)>,
    x_of: impl Fn(chrono::NaiveDate) -> i32,
) -> Panel {
    Panel {
        title,
        observed: None,
        mean: effects.iter().map(|(d, e, _, _)| (x_of(*d), *e)).collect(),
        band: effects.iter().map(|(d, _, lo, hi)| (x_of(*d), *lo, *hi)).collect(),
        zero_line: true,
    }
}

fn draw_panel(
    area: &DrawingArea<SVGBackend<'_>, Shift>,
    panel: &Panel,
    origin: chrono::NaiveDate,
    x_max: i32,
    marker: i32,
) -> Result<(), PlotError> {
    let values = panel
        .band
        .iter()
        .flat_map(|(_, lo, hi)| [*lo, *hi])
        .chain(panel.mean.iter().map(|(_, v)| *v))
        .chain(panel.observed.iter().flatten().map(|(_, v)| *v))
        .chain(panel.zero_line.then_some(0.0));
    let (lo, hi) = y_bounds(values).ok_or(PlotError::EmptyData)?;

    let mut chart = ChartBuilder::on(area)
        .caption(panel.title, ("sans-serif", 18))
        .margin(8)
        .x_label_area_size(28)
        .y_label_area_size(64)
        .build_cartesian_2d(0..x_max, lo..hi)
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .light_line_style(WHITE)
        .x_labels(6)
        .x_label_formatter(&|x| day_label(origin, *x))
        .draw()
        .map_err(render_err)?;

    let band: Vec<(i32, f64, f64)> = panel
        .band
        .iter()
        .copied()
        .filter(|(_, lo, hi)| lo.is_finite() && hi.is_finite())
        .collect();
    if band.len() > 1 {
        let mut outline: Vec<(i32, f64)> = band.iter().map(|(x, lo, _)| (*x, *lo)).collect();
        outline.extend(band.iter().rev().map(|(x, _, hi)| (*x, *hi)));
        chart
            .draw_series(std::iter::once(Polygon::new(outline, BLUE.mix(0.2).filled())))
            .map_err(render_err)?;
    }

    if let Some(observed) = &panel.observed {
        chart
            .draw_series(LineSeries::new(observed.iter().copied(), BLACK.stroke_width(1)))
            .map_err(render_err)?;
    }
    chart
        .draw_series(LineSeries::new(panel.mean.iter().copied(), BLUE.stroke_width(2)))
        .map_err(render_err)?;

    if panel.zero_line {
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(0, 0.0), (x_max, 0.0)],
                BLACK.mix(0.5).stroke_width(1),
            )))
            .map_err(render_err)?;
    }
    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(marker, lo), (marker, hi)],
            RED.stroke_width(1),
        )))
        .map_err(render_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::causal_impact::{ImpactModel, LocalLevelModel};
    use crate::analyzer::window::AnalysisWindow;
    use crate::model::PriceSeries;
    use chrono::{Days, NaiveDate};

    fn impact() -> CausalImpact {
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let points = (0..40u64)
            .map(|i| (start + Days::new(i), if i < 25 { 50.0 + (i % 3) as f64 } else { 70.0 }))
            .collect();
        let series = PriceSeries::new("close", points);
        let window = AnalysisWindow::resolve(
            start + Days::new(25),
            series.min_date().unwrap(),
            series.max_date().unwrap(),
        )
        .unwrap();
        LocalLevelModel::new(50, 2, 0.05).fit(&series, &window).unwrap()
    }

    #[test]
    fn renders_three_panels() {
        let svg = render(&impact(), DEFAULT_SIZE).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Original"));
        assert!(svg.contains("Pointwise effect"));
        assert!(svg.contains("Cumulative effect"));
    }

    #[test]
    fn empty_impact_is_rejected() {
        let mut empty = impact();
        empty.points.clear();
        assert!(matches!(render(&empty, DEFAULT_SIZE), Err(PlotError::EmptyData)));
    }
}
