// Core structs: statements, prices, series, errors
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Reporting frequency of financial statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementFrequency {
    Quarterly,
    Annual,
}

impl StatementFrequency {
    /// Short code used in cache keys and file names.
    pub fn abbr(&self) -> &'static str {
        match self {
            StatementFrequency::Quarterly => "Q",
            StatementFrequency::Annual => "Y",
        }
    }

    pub fn from_abbr(abbr: &str) -> Option<Self> {
        match abbr {
            "Q" => Some(StatementFrequency::Quarterly),
            "Y" => Some(StatementFrequency::Annual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementFrequency::Quarterly => "quarterly",
            StatementFrequency::Annual => "annual",
        }
    }
}

impl fmt::Display for StatementFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling frequency of price rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl PriceFrequency {
    /// Interval parameter understood by the chart endpoint.
    pub fn interval(&self) -> &'static str {
        match self {
            PriceFrequency::Daily => "1d",
            PriceFrequency::Weekly => "1wk",
            PriceFrequency::Monthly => "1mo",
        }
    }
}

/// Which financial statement a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Balance,
    Income,
    Cash,
}

impl StatementKind {
    pub const ALL: [StatementKind; 3] = [
        StatementKind::Balance,
        StatementKind::Income,
        StatementKind::Cash,
    ];

    /// Line items requested for this statement.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            StatementKind::Balance => &[
                "TotalAssets",
                "TotalLiabilitiesNetMinorityInterest",
                "StockholdersEquity",
                "CashAndCashEquivalents",
                "CurrentAssets",
                "CurrentLiabilities",
                "LongTermDebt",
            ],
            StatementKind::Income => &[
                "TotalRevenue",
                "GrossProfit",
                "OperatingIncome",
                "NetIncome",
                "BasicEPS",
                "DilutedEPS",
            ],
            StatementKind::Cash => &[
                "OperatingCashFlow",
                "CapitalExpenditure",
                "FreeCashFlow",
                "CashDividendsPaid",
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    pub date: NaiveDate,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub date: NaiveDate,
    pub numerator: f64,
    pub denominator: f64,
}

/// Raw price rows plus corporate events for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub ticker: String,
    pub frequency: PriceFrequency,
    pub first_trade_date: Option<NaiveDate>,
    pub bars: Vec<PriceBar>,
    pub dividends: Vec<Dividend>,
    pub splits: Vec<Split>,
}

/// Line items keyed by report date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementTable {
    rows: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl StatementTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, field: &str, value: f64) {
        self.rows
            .entry(date)
            .or_default()
            .insert(field.to_string(), value);
    }

    pub fn get(&self, date: NaiveDate, field: &str) -> Option<f64> {
        self.rows.get(&date).and_then(|row| row.get(field).copied())
    }

    /// Report dates in ascending order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.keys().copied().collect()
    }

    pub fn columns(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.rows.values().flat_map(|row| row.keys()).collect();
        set.into_iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Column-wise union; on conflicting cells the other table wins.
    pub fn merge(&mut self, other: &StatementTable) {
        for (date, row) in &other.rows {
            let target = self.rows.entry(*date).or_default();
            for (field, value) in row {
                target.insert(field.clone(), *value);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatements {
    pub ticker: String,
    pub frequency: StatementFrequency,
    pub balance: StatementTable,
    pub income: StatementTable,
    pub cash: StatementTable,
}

impl FinancialStatements {
    pub fn table(&self, kind: StatementKind) -> &StatementTable {
        match kind {
            StatementKind::Balance => &self.balance,
            StatementKind::Income => &self.income,
            StatementKind::Cash => &self.cash,
        }
    }

    /// All three statements merged into one dated table.
    pub fn merged(&self) -> StatementTable {
        let mut all = self.balance.clone();
        all.merge(&self.income);
        all.merge(&self.cash);
        all
    }

    pub fn statement_dates(&self) -> Vec<NaiveDate> {
        self.merged().dates()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerInfo {
    pub ticker: String,
    pub has_stock: bool,
    pub has_statement: bool,
    pub first_trade_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRequest {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub frequency: PriceFrequency,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundamentalsRequest {
    pub ticker: String,
    pub frequency: StatementFrequency,
    pub kind: StatementKind,
}

/// A single-column, date-indexed series. Dates are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    column: String,
    points: Vec<(NaiveDate, f64)>,
}

impl PriceSeries {
    /// Sorts by date and keeps the last value seen for a repeated date.
    pub fn new(column: impl Into<String>, mut points: Vec<(NaiveDate, f64)>) -> Self {
        points.sort_by_key(|(date, _)| *date);
        let mut deduped: Vec<(NaiveDate, f64)> = Vec::with_capacity(points.len());
        for (date, value) in points {
            match deduped.last_mut() {
                Some(last) if last.0 == date => last.1 = value,
                _ => deduped.push((date, value)),
            }
        }
        Self {
            column: column.into(),
            points: deduped,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn min_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|(date, _)| *date)
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|(date, _)| *date)
    }

    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |(d, _)| *d)
            .ok()
            .map(|idx| self.points[idx].1)
    }

    /// Points with `start <= date <= end`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> &[(NaiveDate, f64)] {
        let lo = self.points.partition_point(|(d, _)| *d < start);
        let hi = self.points.partition_point(|(d, _)| *d <= end);
        if lo >= hi { &[] } else { &self.points[lo..hi] }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected response [{status}]: {body}")]
    InvalidResponse { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("provider error {code}: {description}")]
    Api { code: String, description: String },
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("timestamp out of range: {0}")]
    InvalidTimestamp(i64),
}

#[derive(Debug, Error)]
pub enum TickerError {
    #[error("ticker cannot be empty")]
    EmptySymbol,
    #[error("no data found for ticker {0}")]
    NotFound(String),
    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParserError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("nothing to draw")]
    EmptyData,
    #[error("render failed: {0}")]
    Render(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("price series is empty")]
    EmptySeries,
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("no analysis result for {0}")]
    DateNotFound(NaiveDate),
    #[error("not enough data around {date}: {reason}")]
    InsufficientData { date: NaiveDate, reason: String },
    #[error("worker failed: {0}")]
    Worker(String),
    #[error(transparent)]
    Plot(#[from] PlotError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn price_series_sorts_and_keeps_last_duplicate() {
        let series = PriceSeries::new(
            "close",
            vec![(d("2021-01-03"), 3.0), (d("2021-01-01"), 1.0), (d("2021-01-03"), 4.0)],
        );
        assert_eq!(series.points(), &[(d("2021-01-01"), 1.0), (d("2021-01-03"), 4.0)]);
        assert_eq!(series.min_date(), Some(d("2021-01-01")));
        assert_eq!(series.max_date(), Some(d("2021-01-03")));
        assert_eq!(series.value_at(d("2021-01-03")), Some(4.0));
        assert_eq!(series.value_at(d("2021-01-02")), None);
    }

    #[test]
    fn between_is_inclusive() {
        let series = PriceSeries::new(
            "close",
            (1..=5).map(|day| (d(&format!("2021-01-0{day}")), day as f64)).collect(),
        );
        let slice = series.between(d("2021-01-02"), d("2021-01-04"));
        assert_eq!(slice.len(), 3);
        assert!(series.between(d("2021-02-01"), d("2021-02-05")).is_empty());
    }

    #[test]
    fn merged_statements_union_columns_by_date() {
        let mut balance = StatementTable::new();
        balance.insert(d("2022-03-31"), "totalAssets", 10.0);
        let mut income = StatementTable::new();
        income.insert(d("2022-03-31"), "netIncome", 2.0);
        income.insert(d("2022-06-30"), "netIncome", 3.0);
        let statements = FinancialStatements {
            ticker: "AAPL".into(),
            frequency: StatementFrequency::Quarterly,
            balance,
            income,
            cash: StatementTable::new(),
        };
        let merged = statements.merged();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get(d("2022-03-31"), "totalAssets"), Some(10.0));
        assert_eq!(merged.get(d("2022-03-31"), "netIncome"), Some(2.0));
        assert_eq!(merged.columns(), vec!["netIncome".to_string(), "totalAssets".to_string()]);
        assert_eq!(statements.statement_dates(), vec![d("2022-03-31"), d("2022-06-30")]);
    }

    #[test]
    fn frequency_codes_round_trip() {
        for freq in [StatementFrequency::Quarterly, StatementFrequency::Annual] {
            assert_eq!(StatementFrequency::from_abbr(freq.abbr()), Some(freq));
        }
        assert_eq!(StatementFrequency::from_abbr("M"), None);
    }
}
