use crate::fetcher::traits::MarketDataProvider;
use crate::model::{ChartRequest, FetchError, FundamentalsRequest};
use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const TIMESERIES_URL: &str =
    "https://query1.finance.yahoo.com/ws/fundamentals-timeseries/v1/finance/timeseries";
// Earliest period the fundamentals endpoint accepts.
const FUNDAMENTALS_PERIOD_START: i64 = 493_590_046;

pub struct YahooClient {
    pub client: Client,
}

impl YahooClient {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) SwiftGrasp/0.1")
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client })
    }

    fn chart_url(&self, req: &ChartRequest) -> String {
        format!("{}/{}", CHART_URL, req.ticker)
    }

    fn timeseries_url(&self, req: &FundamentalsRequest) -> String {
        format!("{}/{}", TIMESERIES_URL, req.ticker)
    }

    /// Comma separated series names, e.g. `quarterlyTotalAssets,quarterlyNetIncome`.
    fn timeseries_types(req: &FundamentalsRequest) -> String {
        req.kind
            .fields()
            .iter()
            .map(|field| format!("{}{}", req.frequency.as_str(), field))
            .collect::<Vec<_>>()
            .join(",")
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
        debug!("GET {} {:?}", url, query);
        let response = self.client.get(url).query(query).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::HttpError(e)
            }
        })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::InvalidResponse {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

fn epoch(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooClient {
    async fn fetch_chart(&self, req: &ChartRequest) -> Result<String, FetchError> {
        let url = self.chart_url(req);
        // period2 is exclusive on the provider side
        let end = req.end.succ_opt().unwrap_or(req.end);
        let query = [
            ("period1", epoch(req.start).to_string()),
            ("period2", epoch(end).to_string()),
            ("interval", req.frequency.interval().to_string()),
            ("events", "div,split".to_string()),
            ("includeAdjustedClose", "true".to_string()),
        ];
        self.get(&url, &query).await
    }

    async fn fetch_fundamentals(&self, req: &FundamentalsRequest) -> Result<String, FetchError> {
        let url = self.timeseries_url(req);
        let query = [
            ("symbol", req.ticker.clone()),
            ("type", Self::timeseries_types(req)),
            ("period1", FUNDAMENTALS_PERIOD_START.to_string()),
            ("period2", Utc::now().timestamp().to_string()),
        ];
        self.get(&url, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StatementFrequency, StatementKind};

    #[test]
    fn timeseries_types_carry_frequency_prefix() {
        let req = FundamentalsRequest {
            ticker: "NFLX".into(),
            frequency: StatementFrequency::Annual,
            kind: StatementKind::Cash,
        };
        let types = YahooClient::timeseries_types(&req);
        assert!(types.starts_with("annualOperatingCashFlow,"));
        assert_eq!(types.split(',').count(), StatementKind::Cash.fields().len());
    }

    #[test]
    fn epoch_is_utc_midnight() {
        let date = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        assert_eq!(epoch(date), 1_609_459_200);
    }
}
