use crate::model::{PriceFrequency, PriceHistory, PriceSeries};
use chrono::{Datelike, Days, Months, NaiveDate};

/// Builds the analysis input from raw price rows: closing prices,
/// deduplicated, sorted and resampled with nearest fill.
pub fn normalize_history(history: &PriceHistory, frequency: PriceFrequency) -> PriceSeries {
    let closes: Vec<(NaiveDate, f64)> = history
        .bars
        .iter()
        .filter_map(|bar| bar.close.filter(|c| c.is_finite()).map(|c| (bar.date, c)))
        .collect();
    resample(&PriceSeries::new("close", closes), frequency)
}

/// Reindexes the series onto a uniform calendar. Each calendar date takes the
/// value of the nearest observation; ties go to the later observation.
pub fn resample(series: &PriceSeries, frequency: PriceFrequency) -> PriceSeries {
    let (Some(min), Some(max)) = (series.min_date(), series.max_date()) else {
        return series.clone();
    };
    let points = series.points();
    let filled = calendar(min, max, frequency)
        .into_iter()
        .map(|date| (date, nearest_value(points, date)))
        .collect();
    PriceSeries::new(series.column(), filled)
}

fn nearest_value(points: &[(NaiveDate, f64)], date: NaiveDate) -> f64 {
    let idx = points.partition_point(|(d, _)| *d < date);
    let right = points.get(idx);
    let left = idx.checked_sub(1).and_then(|i| points.get(i));
    match (left, right) {
        (Some(l), Some(r)) => {
            if (date - l.0) < (r.0 - date) {
                l.1
            } else {
                r.1
            }
        }
        (Some(l), None) => l.1,
        (None, Some(r)) => r.1,
        // callers never pass an empty slice
        (None, None) => f64::NAN,
    }
}

fn calendar(min: NaiveDate, max: NaiveDate, frequency: PriceFrequency) -> Vec<NaiveDate> {
    match frequency {
        PriceFrequency::Daily => min.iter_days().take_while(|d| *d <= max).collect(),
        PriceFrequency::Weekly => {
            let last = week_end(max);
            week_end(min)
                .iter_weeks()
                .take_while(|d| *d <= last)
                .collect()
        }
        PriceFrequency::Monthly => {
            let last = month_start(max);
            let mut dates = Vec::new();
            let mut current = month_start(min);
            while current <= last {
                dates.push(current);
                match current.checked_add_months(Months::new(1)) {
                    Some(next) => current = next,
                    None => break,
                }
            }
            dates
        }
    }
}

/// Sunday closing the week that contains `date`.
fn week_end(date: NaiveDate) -> NaiveDate {
    let offset = (7 - date.weekday().num_days_from_sunday()) % 7;
    date + Days::new(offset as u64)
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriceBar;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn bar(date: &str, close: Option<f64>) -> PriceBar {
        PriceBar {
            date: d(date),
            open: close,
            high: close,
            low: close,
            close,
            adj_close: close,
            volume: Some(100),
        }
    }

    #[test]
    fn daily_fill_uses_nearest_neighbour() {
        // Friday 10, Monday 13: Saturday takes Friday, Sunday takes Monday
        let series = PriceSeries::new("close", vec![(d("2021-01-08"), 10.0), (d("2021-01-11"), 13.0)]);
        let daily = resample(&series, PriceFrequency::Daily);
        let values: Vec<f64> = daily.points().iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![10.0, 10.0, 13.0, 13.0]);
        assert_eq!(daily.min_date(), Some(d("2021-01-08")));
        assert_eq!(daily.max_date(), Some(d("2021-01-11")));
    }

    #[test]
    fn ties_prefer_the_later_observation() {
        let series = PriceSeries::new("close", vec![(d("2021-01-01"), 1.0), (d("2021-01-03"), 3.0)]);
        let daily = resample(&series, PriceFrequency::Daily);
        assert_eq!(daily.value_at(d("2021-01-02")), Some(3.0));
    }

    #[test]
    fn history_drops_missing_closes_and_duplicates() {
        let history = PriceHistory {
            ticker: "TSLA".into(),
            frequency: PriceFrequency::Daily,
            first_trade_date: None,
            bars: vec![
                bar("2021-01-04", Some(1.0)),
                bar("2021-01-05", None),
                bar("2021-01-04", Some(2.0)),
                bar("2021-01-06", Some(6.0)),
            ],
            dividends: vec![],
            splits: vec![],
        };
        let series = normalize_history(&history, PriceFrequency::Daily);
        assert_eq!(series.column(), "close");
        assert_eq!(
            series.points(),
            &[(d("2021-01-04"), 2.0), (d("2021-01-05"), 6.0), (d("2021-01-06"), 6.0)]
        );
    }

    #[test]
    fn weekly_labels_are_sundays() {
        let series = PriceSeries::new(
            "close",
            vec![(d("2021-01-04"), 1.0), (d("2021-01-13"), 2.0), (d("2021-01-18"), 3.0)],
        );
        let weekly = resample(&series, PriceFrequency::Weekly);
        let dates: Vec<NaiveDate> = weekly.points().iter().map(|(date, _)| *date).collect();
        assert_eq!(dates, vec![d("2021-01-10"), d("2021-01-17"), d("2021-01-24")]);
        assert_eq!(weekly.value_at(d("2021-01-10")), Some(2.0));
        assert_eq!(weekly.value_at(d("2021-01-17")), Some(3.0));
    }

    #[test]
    fn monthly_labels_are_month_starts() {
        let series = PriceSeries::new("close", vec![(d("2021-01-20"), 1.0), (d("2021-03-02"), 2.0)]);
        let monthly = resample(&series, PriceFrequency::Monthly);
        let dates: Vec<NaiveDate> = monthly.points().iter().map(|(date, _)| *date).collect();
        assert_eq!(dates, vec![d("2021-01-01"), d("2021-02-01"), d("2021-03-01")]);
        assert_eq!(monthly.value_at(d("2021-01-01")), Some(1.0));
        assert_eq!(monthly.value_at(d("2021-03-01")), Some(2.0));
    }

    #[test]
    fn empty_series_stays_empty() {
        let series = PriceSeries::new("close", vec![]);
        assert!(resample(&series, PriceFrequency::Daily).is_empty());
    }
}
