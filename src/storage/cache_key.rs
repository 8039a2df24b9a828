use crate::model::{StatementFrequency, StorageError};
use crate::utils::{format_date, parse_date};
use chrono::NaiveDate;
use std::fmt;

/// What a cached blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Statements,
    Prices,
    Summary,
    ImpactFigure,
    PriceChart,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Statements,
        ArtifactKind::Prices,
        ArtifactKind::Summary,
        ArtifactKind::ImpactFigure,
        ArtifactKind::PriceChart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Statements => "statements",
            ArtifactKind::Prices => "prices",
            ArtifactKind::Summary => "summary",
            ArtifactKind::ImpactFigure => "impact",
            ArtifactKind::PriceChart => "chart",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    pub fn extension(&self) -> &'static str {
        if self.is_figure() { "svg" } else { "json" }
    }

    pub fn is_figure(&self) -> bool {
        matches!(self, ArtifactKind::ImpactFigure | ArtifactKind::PriceChart)
    }

    /// Only impact figures are keyed by statement date.
    fn dated(&self) -> bool {
        matches!(self, ArtifactKind::ImpactFigure)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub ticker: String,
    pub frequency: StatementFrequency,
    pub kind: ArtifactKind,
    pub statement_date: Option<NaiveDate>,
}

impl CacheKey {
    pub fn new(ticker: &str, frequency: StatementFrequency, kind: ArtifactKind) -> Self {
        Self {
            ticker: ticker.to_string(),
            frequency,
            kind,
            statement_date: None,
        }
    }

    pub fn impact_figure(ticker: &str, frequency: StatementFrequency, date: NaiveDate) -> Self {
        Self {
            statement_date: Some(date),
            ..Self::new(ticker, frequency, ArtifactKind::ImpactFigure)
        }
    }

    /// `<kind>_<ticker>_<Q|Y>[_<date>].<ext>`
    pub fn file_name(&self) -> String {
        let mut name = format!("{}_{}_{}", self.kind, self.ticker, self.frequency.abbr());
        if let Some(date) = self.statement_date {
            name.push('_');
            name.push_str(&format_date(date));
        }
        name.push('.');
        name.push_str(self.kind.extension());
        name
    }

    /// Inverse of [`file_name`](Self::file_name).
    pub fn parse_file_name(name: &str) -> Result<Self, StorageError> {
        let invalid = || StorageError::InvalidKey(name.to_string());
        let (stem, ext) = name.rsplit_once('.').ok_or_else(invalid)?;
        let parts: Vec<&str> = stem.split('_').collect();
        let kind = parts.first().and_then(|p| ArtifactKind::from_name(p)).ok_or_else(invalid)?;
        if ext != kind.extension() {
            return Err(invalid());
        }

        let (rest, statement_date) = if kind.dated() {
            let (last, rest) = parts[1..].split_last().ok_or_else(invalid)?;
            (rest, Some(parse_date(last).ok_or_else(invalid)?))
        } else {
            (&parts[1..], None)
        };
        let (freq, ticker) = rest.split_last().ok_or_else(invalid)?;
        let frequency = StatementFrequency::from_abbr(freq).ok_or_else(invalid)?;
        if ticker.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            ticker: ticker.join("_"),
            frequency,
            kind,
            statement_date,
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}
