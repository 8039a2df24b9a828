// Chart rendering to SVG strings.

pub mod impact_chart;
pub mod price_chart;

use crate::model::PlotError;
use crate::utils::format_date;
use chrono::{Days, NaiveDate};

pub(crate) fn render_err<E: std::fmt::Display>(e: E) -> PlotError {
    PlotError::Render(e.to_string())
}

/// Day offset of `date` from `origin`, used as the x coordinate.
pub(crate) fn day_offset(origin: NaiveDate, date: NaiveDate) -> i32 {
    (date - origin).num_days() as i32
}

pub(crate) fn day_label(origin: NaiveDate, offset: i32) -> String {
    u64::try_from(offset)
        .ok()
        .and_then(|days| origin.checked_add_days(Days::new(days)))
        .map(format_date)
        .unwrap_or_default()
}

/// Padded y-range over the finite values; `None` when there are none.
pub(crate) fn y_bounds(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return None;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.05 };
    Some((lo - pad, hi + pad))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_skip_non_finite_values() {
        assert_eq!(y_bounds(vec![f64::NAN, f64::INFINITY]), None);
        let (lo, hi) = y_bounds(vec![1.0, f64::NAN, 3.0]).unwrap();
        assert!(lo < 1.0 && hi > 3.0);
        let (lo, hi) = y_bounds(vec![0.0]).unwrap();
        assert!(lo < 0.0 && hi > 0.0);
    }

    #[test]
    fn labels_are_dates() {
        let origin = NaiveDate::from_ymd_opt(2020, 1, 30).unwrap();
        assert_eq!(day_label(origin, 2), "2020-02-01");
        assert_eq!(day_label(origin, -1), "");
        assert_eq!(day_offset(origin, NaiveDate::from_ymd_opt(2020, 2, 1).unwrap()), 2);
    }
}
