use crate::analyzer::causal_impact::{CausalImpact, ImpactModel};
use crate::analyzer::summary::{SummaryRow, SummaryTable};
use crate::analyzer::window::{AnalysisWindow, SkipReason};
use crate::model::{AnalysisError, PlotError, PriceSeries};
use crate::utils::{format_date, parse_date};
use chrono::NaiveDate;
use futures::StreamExt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Result of analyzing a single candidate date.
#[derive(Debug, Clone, PartialEq)]
pub enum DateOutcome {
    Analyzed(SummaryRow),
    Skipped(SkipReason),
}

/// Tests every candidate date for a change in price behavior and
/// aggregates the per-date results.
pub struct StructuralChange {
    series: Arc<PriceSeries>,
    candidate_dates: Vec<String>,
    model: Arc<dyn ImpactModel>,
    series_min_date: NaiveDate,
    series_max_date: NaiveDate,
    results: Vec<(NaiveDate, CausalImpact)>,
    skipped: Vec<(String, SkipReason)>,
    summary: Option<SummaryTable>,
    charts_dir: PathBuf,
}

fn parse_candidate(raw: &str) -> Result<NaiveDate, AnalysisError> {
    parse_date(raw).ok_or_else(|| AnalysisError::InvalidDate(raw.to_string()))
}

impl StructuralChange {
    pub fn new(
        series: Arc<PriceSeries>,
        candidate_dates: Vec<String>,
        model: Arc<dyn ImpactModel>,
    ) -> Result<Self, AnalysisError> {
        let (Some(series_min_date), Some(series_max_date)) = (series.min_date(), series.max_date()) else {
            return Err(AnalysisError::EmptySeries);
        };
        Ok(Self {
            series,
            candidate_dates,
            model,
            series_min_date,
            series_max_date,
            results: Vec::new(),
            skipped: Vec::new(),
            summary: None,
            charts_dir: PathBuf::from("charts"),
        })
    }

    /// Folder that `plot(.., true)` writes into; `charts` by default.
    pub fn with_charts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.charts_dir = dir.into();
        self
    }

    pub fn series_min_date(&self) -> String {
        format_date(self.series_min_date)
    }

    pub fn series_max_date(&self) -> String {
        format_date(self.series_max_date)
    }

    pub fn analyze_one_date(&mut self, date: &str) -> Result<DateOutcome, AnalysisError> {
        let parsed = parse_candidate(date)?;
        let window = match AnalysisWindow::resolve(parsed, self.series_min_date, self.series_max_date) {
            Ok(window) => window,
            Err(reason) => {
                debug!("Skipping {}: {}", date, reason);
                self.skipped.push((date.to_string(), reason));
                return Ok(DateOutcome::Skipped(reason));
            }
        };

        debug!("Analyzing {}: pre {} post {}", date, window.pre, window.post);
        let impact = self.model.fit(&self.series, &window)?;
        let row = SummaryRow::from_impact(parsed, &impact);
        self.store(parsed, impact);
        Ok(DateOutcome::Analyzed(row))
    }

    /// Runs every candidate in order. Malformed dates and model failures
    /// abort the batch; boundary dates are skipped.
    pub fn analyze(&mut self) -> Result<&SummaryTable, AnalysisError> {
        self.reset();
        let dates = self.candidate_dates.clone();
        let mut rows = Vec::new();
        for date in &dates {
            if let DateOutcome::Analyzed(row) = self.analyze_one_date(date)? {
                rows.push(row);
            }
        }
        info!(
            "Structural change: {} of {} candidate dates analyzed",
            rows.len(),
            dates.len()
        );
        Ok(self.summary.insert(SummaryTable::new(rows)))
    }

    /// Same contract as [`analyze`](Self::analyze), with up to `workers` model
    /// fits running at once. A fit that exceeds `per_date_timeout` is skipped;
    /// it keeps its worker slot until the blocking fit actually returns.
    /// Rows keep candidate order whatever the completion order.
    pub async fn analyze_concurrent(
        &mut self,
        workers: usize,
        per_date_timeout: Duration,
    ) -> Result<&SummaryTable, AnalysisError> {
        self.reset();
        let mut parsed = Vec::with_capacity(self.candidate_dates.len());
        for raw in &self.candidate_dates {
            parsed.push((raw.clone(), parse_candidate(raw)?));
        }

        let workers = workers.max(1);
        let slots = Arc::new(Semaphore::new(workers));
        let (min, max) = (self.series_min_date, self.series_max_date);
        let jobs = parsed.into_iter().map(|(raw, date)| {
            let series = Arc::clone(&self.series);
            let model = Arc::clone(&self.model);
            let slots = Arc::clone(&slots);
            async move {
                let window = match AnalysisWindow::resolve(date, min, max) {
                    Ok(window) => window,
                    Err(reason) => return (raw, date, Ok(Err(reason))),
                };
                let permit = match slots.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (raw, date, Err(AnalysisError::Worker(e.to_string()))),
                };
                let task = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    model.fit(&series, &window)
                });
                let outcome = match tokio::time::timeout(per_date_timeout, task).await {
                    Ok(Ok(Ok(impact))) => Ok(Ok(impact)),
                    Ok(Ok(Err(e))) => Err(e),
                    Ok(Err(join_err)) => Err(AnalysisError::Worker(join_err.to_string())),
                    Err(_) => Ok(Err(SkipReason::TimedOut)),
                };
                (raw, date, outcome)
            }
        });
        let outcomes: Vec<_> = futures::stream::iter(jobs)
            .buffered(workers)
            .collect()
            .await;

        let mut rows = Vec::new();
        for (raw, date, outcome) in outcomes {
            match outcome? {
                Ok(impact) => {
                    rows.push(SummaryRow::from_impact(date, &impact));
                    self.store(date, impact);
                }
                Err(reason) => {
                    if reason == SkipReason::TimedOut {
                        warn!("Model for {} timed out after {:?}", raw, per_date_timeout);
                    } else {
                        debug!("Skipping {}: {}", raw, reason);
                    }
                    self.skipped.push((raw, reason));
                }
            }
        }
        info!(
            "Structural change: {} of {} candidate dates analyzed",
            rows.len(),
            self.candidate_dates.len()
        );
        Ok(self.summary.insert(SummaryTable::new(rows)))
    }

    /// Renders the stored impact for `date`. With `show`, the figure is
    /// also written to `<charts_dir>/impact_<date>.svg`.
    pub fn plot(&self, date: &str, show: bool) -> Result<String, AnalysisError> {
        let parsed = parse_candidate(date)?;
        let impact = self.impact(parsed).ok_or(AnalysisError::DateNotFound(parsed))?;
        let svg = impact.plot()?;
        if show {
            let folder = self.charts_dir.as_path();
            fs::create_dir_all(folder).map_err(PlotError::from)?;
            let filename = folder.join(format!("impact_{}.svg", date));
            fs::write(&filename, &svg).map_err(PlotError::from)?;
            info!("Saved impact chart: {}", filename.display());
        }
        Ok(svg)
    }

    pub fn summary(&self) -> Option<&SummaryTable> {
        if self.summary.is_none() {
            warn!("Summary requested before analyze(); nothing to report yet");
        }
        self.summary.as_ref()
    }

    pub fn impact(&self, date: NaiveDate) -> Option<&CausalImpact> {
        self.results
            .iter()
            .find(|(d, _)| *d == date)
            .map(|(_, impact)| impact)
    }

    /// Dates with a stored impact, in analysis order.
    pub fn analyzed_dates(&self) -> Vec<NaiveDate> {
        self.results.iter().map(|(d, _)| *d).collect()
    }

    pub fn skipped(&self) -> &[(String, SkipReason)] {
        &self.skipped
    }

    fn store(&mut self, date: NaiveDate, impact: CausalImpact) {
        match self.results.iter_mut().find(|(d, _)| *d == date) {
            Some(slot) => slot.1 = impact,
            None => self.results.push((date, impact)),
        }
    }

    fn reset(&mut self) {
        self.results.clear();
        self.skipped.clear();
        self.summary = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::causal_impact::LocalLevelModel;
    use chrono::Days;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn year_2020() -> Arc<PriceSeries> {
        let start = d("2020-01-01");
        let points = (0..366)
            .map(|i| (start + Days::new(i), 100.0 + (i % 5) as f64 + i as f64 * 0.05))
            .collect();
        Arc::new(PriceSeries::new("close", points))
    }

    fn model() -> Arc<dyn ImpactModel> {
        Arc::new(LocalLevelModel::new(40, 11, 0.05))
    }

    fn dates(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn edge_dates_are_excluded() {
        let mut sc = StructuralChange::new(
            year_2020(),
            dates(&["2020-01-01", "2020-06-15", "2020-12-31"]),
            model(),
        )
        .unwrap();
        assert_eq!(sc.series_min_date(), "2020-01-01");
        assert_eq!(sc.series_max_date(), "2020-12-31");

        let table = sc.analyze().unwrap().clone();
        assert_eq!(table.dates(), vec![d("2020-06-15")]);

        let impact = sc.impact(d("2020-06-15")).unwrap();
        assert_eq!(impact.window.pre.as_strings(), ["2020-01-01".to_string(), "2020-06-14".to_string()]);
        assert_eq!(impact.window.post.as_strings(), ["2020-06-15".to_string(), "2020-12-31".to_string()]);
        assert_eq!(
            sc.skipped(),
            &[
                ("2020-01-01".to_string(), SkipReason::TooEarly),
                ("2020-12-31".to_string(), SkipReason::TooLate)
            ]
        );
    }

    #[test]
    fn analyze_one_date_follows_boundary_rule() {
        let mut sc = StructuralChange::new(year_2020(), vec![], model()).unwrap();
        assert_eq!(sc.analyze_one_date("2020-01-02").unwrap(), DateOutcome::Skipped(SkipReason::TooEarly));
        match sc.analyze_one_date("2020-01-03").unwrap() {
            DateOutcome::Analyzed(row) => assert_eq!(row.date, d("2020-01-03")),
            other => panic!("expected a row, got {:?}", other),
        }
        assert!(matches!(sc.analyze_one_date("2020-12-30").unwrap(), DateOutcome::Analyzed(_)));
        assert_eq!(sc.analyze_one_date("2021-01-15").unwrap(), DateOutcome::Skipped(SkipReason::TooLate));
        assert_eq!(sc.analyzed_dates(), vec![d("2020-01-03"), d("2020-12-30")]);
    }

    #[test]
    fn empty_candidate_list_gives_empty_table() {
        let mut sc = StructuralChange::new(year_2020(), vec![], model()).unwrap();
        assert!(sc.summary().is_none());
        assert!(sc.analyze().unwrap().is_empty());
        assert_eq!(sc.summary().map(|t| t.len()), Some(0));
    }

    #[test]
    fn no_eligible_dates_gives_empty_table() {
        let mut sc = StructuralChange::new(year_2020(), dates(&["2019-05-01", "2020-12-31"]), model()).unwrap();
        assert!(sc.analyze().unwrap().is_empty());
        assert_eq!(sc.skipped().len(), 2);
    }

    #[test]
    fn duplicates_produce_one_row_each() {
        let mut sc = StructuralChange::new(
            year_2020(),
            dates(&["2020-03-31", "2020-03-31", "2020-06-30"]),
            model(),
        )
        .unwrap();
        let table = sc.analyze().unwrap();
        assert_eq!(table.dates(), vec![d("2020-03-31"), d("2020-03-31"), d("2020-06-30")]);
        assert_eq!(table.rows()[0], table.rows()[1]);
        assert_eq!(sc.analyzed_dates().len(), 2);
    }

    #[test]
    fn analyze_is_idempotent() {
        let mut sc = StructuralChange::new(
            year_2020(),
            dates(&["2020-09-30", "2020-03-31", "2020-06-30"]),
            model(),
        )
        .unwrap();
        let first = sc.analyze().unwrap().clone();
        let second = sc.analyze().unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(first.dates(), vec![d("2020-09-30"), d("2020-03-31"), d("2020-06-30")]);
    }

    #[test]
    fn malformed_date_fails_the_batch() {
        let mut sc = StructuralChange::new(year_2020(), dates(&["2020-06-15", "15/06/2020"]), model()).unwrap();
        let err = sc.analyze().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidDate(ref s) if s == "15/06/2020"));
    }

    #[test]
    fn empty_series_is_rejected() {
        let empty = Arc::new(PriceSeries::new("close", vec![]));
        assert!(matches!(
            StructuralChange::new(empty, vec![], model()),
            Err(AnalysisError::EmptySeries)
        ));
    }

    #[test]
    fn plot_unknown_date_is_not_found() {
        let sc = StructuralChange::new(year_2020(), dates(&["2020-06-15"]), model()).unwrap();
        let err = sc.plot("2099-01-01", false).unwrap_err();
        assert!(matches!(err, AnalysisError::DateNotFound(date) if date == d("2099-01-01")));
        assert!(matches!(sc.plot("soon", false), Err(AnalysisError::InvalidDate(_))));
    }

    #[test]
    fn plot_renders_analyzed_date() {
        let mut sc = StructuralChange::new(year_2020(), dates(&["2020-06-15", "2020-01-01"]), model()).unwrap();
        sc.analyze().unwrap();
        let svg = sc.plot("2020-06-15", false).unwrap();
        assert!(svg.contains("<svg"));
        assert!(matches!(sc.plot("2020-01-01", false), Err(AnalysisError::DateNotFound(_))));
    }

    #[test]
    fn plot_with_show_writes_svg_file() {
        let dir = tempfile::tempdir().unwrap();
        let charts = dir.path().join("charts");
        let mut sc = StructuralChange::new(year_2020(), dates(&["2020-06-15"]), model())
            .unwrap()
            .with_charts_dir(&charts);
        sc.analyze().unwrap();

        sc.plot("2020-06-15", false).unwrap();
        assert!(!charts.exists());

        let svg = sc.plot("2020-06-15", true).unwrap();
        let written = fs::read_to_string(charts.join("impact_2020-06-15.svg")).unwrap();
        assert_eq!(written, svg);
    }

    /// Sleeps longer for earlier candidates so completion order is reversed.
    struct SlowModel {
        inner: LocalLevelModel,
        calls: AtomicUsize,
        stall: Option<NaiveDate>,
    }

    impl ImpactModel for SlowModel {
        fn fit(&self, series: &PriceSeries, window: &AnalysisWindow) -> Result<CausalImpact, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stall == Some(window.date) {
                std::thread::sleep(Duration::from_millis(400));
            } else {
                let delay = 60u64.saturating_sub(window.date.format("%m").to_string().parse::<u64>().unwrap_or(0) * 5);
                std::thread::sleep(Duration::from_millis(delay));
            }
            self.inner.fit(series, window)
        }
    }

    #[tokio::test]
    async fn concurrent_results_keep_candidate_order() {
        let list = dates(&["2020-02-28", "2020-12-31", "2020-05-29", "2020-08-31", "2020-11-30"]);
        let mut sequential = StructuralChange::new(year_2020(), list.clone(), model()).unwrap();
        let expected = sequential.analyze().unwrap().clone();

        let slow = Arc::new(SlowModel {
            inner: LocalLevelModel::new(40, 11, 0.05),
            calls: AtomicUsize::new(0),
            stall: None,
        });
        let mut concurrent = StructuralChange::new(year_2020(), list, slow.clone()).unwrap();
        let table = concurrent
            .analyze_concurrent(4, Duration::from_secs(10))
            .await
            .unwrap()
            .clone();
        assert_eq!(table, expected);
        assert_eq!(slow.calls.load(Ordering::SeqCst), 4);
        assert_eq!(concurrent.skipped(), &[("2020-12-31".to_string(), SkipReason::TooLate)]);
    }

    #[tokio::test]
    async fn slow_fit_is_skipped_after_timeout() {
        let slow = Arc::new(SlowModel {
            inner: LocalLevelModel::new(20, 5, 0.05),
            calls: AtomicUsize::new(0),
            stall: Some(d("2020-04-30")),
        });
        let mut sc = StructuralChange::new(year_2020(), dates(&["2020-04-30", "2020-10-30"]), slow).unwrap();
        let table = sc
            .analyze_concurrent(2, Duration::from_millis(150))
            .await
            .unwrap()
            .clone();
        assert_eq!(table.dates(), vec![d("2020-10-30")]);
        assert_eq!(sc.skipped(), &[("2020-04-30".to_string(), SkipReason::TimedOut)]);
        assert!(matches!(sc.plot("2020-04-30", false), Err(AnalysisError::DateNotFound(_))));
    }

    /// Every fit outlives the timeout; records how many run at once.
    struct StuckModel {
        inner: LocalLevelModel,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ImpactModel for StuckModel {
        fn fit(&self, series: &PriceSeries, window: &AnalysisWindow) -> Result<CausalImpact, AnalysisError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(120));
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.inner.fit(series, window)
        }
    }

    #[tokio::test]
    async fn timed_out_fits_still_hold_their_worker() {
        let stuck = Arc::new(StuckModel {
            inner: LocalLevelModel::new(10, 1, 0.05),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let list = dates(&["2020-03-31", "2020-06-30", "2020-09-30", "2020-11-30"]);
        let mut sc = StructuralChange::new(year_2020(), list, stuck.clone()).unwrap();
        let table = sc
            .analyze_concurrent(2, Duration::from_millis(20))
            .await
            .unwrap()
            .clone();
        assert!(table.is_empty());
        assert_eq!(sc.skipped().len(), 4);
        assert!(sc.skipped().iter().all(|(_, reason)| *reason == SkipReason::TimedOut));
        assert!(stuck.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn concurrent_rejects_malformed_dates() {
        let mut sc = StructuralChange::new(year_2020(), dates(&["2020-13-01"]), model()).unwrap();
        let err = sc.analyze_concurrent(2, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidDate(_)));
        assert!(sc.summary().is_none());
    }
}
