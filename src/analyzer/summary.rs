use crate::analyzer::causal_impact::{CausalImpact, EffectStats};
use crate::utils::format_date;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Average effect and significance for one candidate date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub stats: EffectStats,
    pub p_value: f64,
}

impl SummaryRow {
    pub fn from_impact(date: NaiveDate, impact: &CausalImpact) -> Self {
        Self {
            date,
            stats: impact.average,
            p_value: impact.p_value,
        }
    }
}

/// One row per analyzed candidate date, in candidate order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn new(rows: Vec<SummaryRow>) -> Self {
        Self { rows }
    }

    pub fn columns() -> Vec<&'static str> {
        let mut cols = EffectStats::FIELDS.to_vec();
        cols.push("p_value");
        cols
    }

    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|row| row.date).collect()
    }

    /// First row for `date`.
    pub fn row(&self, date: NaiveDate) -> Option<&SummaryRow> {
        self.rows.iter().find(|row| row.date == date)
    }

    /// Rows whose p-value is below `alpha`.
    pub fn significant(&self, alpha: f64) -> impl Iterator<Item = &SummaryRow> {
        self.rows.iter().filter(move |row| row.p_value < alpha)
    }
}

impl fmt::Display for SummaryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<10}", "date")?;
        for col in Self::columns() {
            write!(f, " {:>16}", col)?;
        }
        writeln!(f)?;
        for row in &self.rows {
            write!(f, "{:<10}", format_date(row.date))?;
            for value in row.stats.values() {
                write!(f, " {:>16.4}", value)?;
            }
            writeln!(f, " {:>16.4}", row.p_value)?;
        }
        Ok(())
    }
}
