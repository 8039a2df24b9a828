// Ticker validation and typed statement/price loading on top of a provider
use crate::fetcher::MarketDataProvider;
use crate::model::{
    ChartRequest, FetchError, FinancialStatements, FundamentalsRequest, ParserError,
    PriceFrequency, PriceHistory, StatementFrequency, StatementKind, TickerError, TickerInfo,
};
use crate::parser::{ResponseParser, YahooParser};
use crate::utils::years_before;
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info};

pub struct MarketData {
    provider: Arc<dyn MarketDataProvider>,
    parser: YahooParser,
}

/// Date range of a price request. `None` picks the default bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl MarketData {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            provider,
            parser: YahooParser::new(),
        }
    }

    /// Reports which kinds of data exist for `ticker` and its first trade date.
    pub async fn check_ticker(&self, ticker: &str, today: NaiveDate) -> Result<TickerInfo, TickerError> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(TickerError::EmptySymbol);
        }

        let check = FundamentalsRequest {
            ticker: ticker.clone(),
            frequency: StatementFrequency::Quarterly,
            kind: StatementKind::Income,
        };
        let has_statement = match self.provider.fetch_fundamentals(&check).await {
            Ok(body) => match self.parser.parse_statement(&body, check.frequency) {
                Ok(table) => !table.is_empty(),
                Err(ParserError::Api { .. }) => false,
                Err(e) => return Err(e.into()),
            },
            Err(FetchError::InvalidResponse { status, .. }) => {
                debug!("Statement check for {} answered {}", ticker, status);
                false
            }
            Err(e) => return Err(e.into()),
        };

        let recent = ChartRequest {
            ticker: ticker.clone(),
            start: today.checked_sub_days(Days::new(8)).unwrap_or(today),
            end: today,
            frequency: PriceFrequency::Weekly,
        };
        let (has_stock, first_trade_date) = match self.provider.fetch_chart(&recent).await {
            Ok(body) => match self.parser.parse_chart(&body, recent.frequency) {
                Ok(history) => (
                    !history.bars.is_empty() || history.first_trade_date.is_some(),
                    history.first_trade_date,
                ),
                Err(ParserError::Api { .. }) => (false, None),
                Err(e) => return Err(e.into()),
            },
            Err(FetchError::InvalidResponse { status, .. }) => {
                debug!("Price check for {} answered {}", ticker, status);
                (false, None)
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Ticker {}: stock data = {}, statement data = {}, first trade date = {:?}",
            ticker, has_stock, has_statement, first_trade_date
        );
        Ok(TickerInfo {
            ticker,
            has_stock,
            has_statement,
            first_trade_date,
        })
    }

    /// Balance sheet, income statement and cash flow for one frequency.
    pub async fn fetch_statements(
        &self,
        info: &TickerInfo,
        frequency: StatementFrequency,
    ) -> Result<FinancialStatements, TickerError> {
        if !info.has_statement {
            return Err(TickerError::NotFound(info.ticker.clone()));
        }
        let mut statements = FinancialStatements {
            ticker: info.ticker.clone(),
            frequency,
            balance: Default::default(),
            income: Default::default(),
            cash: Default::default(),
        };
        for kind in StatementKind::ALL {
            let req = FundamentalsRequest {
                ticker: info.ticker.clone(),
                frequency,
                kind,
            };
            let body = self.provider.fetch_fundamentals(&req).await?;
            let table = self.parser.parse_statement(&body, frequency)?;
            debug!("{:?} statement for {}: {} report dates", kind, info.ticker, table.len());
            match kind {
                StatementKind::Balance => statements.balance = table,
                StatementKind::Income => statements.income = table,
                StatementKind::Cash => statements.cash = table,
            }
        }
        Ok(statements)
    }

    /// Price rows between `range` bounds. Defaults: end is today, start is
    /// `history_years` back; start never precedes the first trade date.
    pub async fn fetch_prices(
        &self,
        info: &TickerInfo,
        range: PriceRange,
        frequency: PriceFrequency,
        today: NaiveDate,
        history_years: u32,
    ) -> Result<PriceHistory, TickerError> {
        if !info.has_stock {
            return Err(TickerError::NotFound(info.ticker.clone()));
        }
        let (start, end) = resolve_range(range, info.first_trade_date, today, history_years)?;
        let req = ChartRequest {
            ticker: info.ticker.clone(),
            start,
            end,
            frequency,
        };
        let body = self.provider.fetch_chart(&req).await?;
        let history = self.parser.parse_chart(&body, frequency)?;
        info!(
            "Fetched {} price rows for {} ({} to {})",
            history.bars.len(),
            info.ticker,
            start,
            end
        );
        Ok(history)
    }
}

fn resolve_range(
    range: PriceRange,
    first_trade_date: Option<NaiveDate>,
    today: NaiveDate,
    history_years: u32,
) -> Result<(NaiveDate, NaiveDate), TickerError> {
    let end = range.end.unwrap_or(today);
    let mut start = range.start.unwrap_or_else(|| years_before(today, history_years));
    if let Some(first) = first_trade_date {
        start = start.max(first);
    }
    if end < start {
        return Err(TickerError::InvalidRange { start, end });
    }
    Ok((start, end))
}
