// Yahoo Finance JSON parsing
use crate::model::{
    Dividend, ParserError, PriceBar, PriceFrequency, PriceHistory, Split, StatementFrequency,
    StatementTable,
};
use crate::utils::{date_from_timestamp, parse_date};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

pub trait ResponseParser {
    fn parse_chart(&self, body: &str, frequency: PriceFrequency) -> Result<PriceHistory, ParserError>;
    fn parse_statement(&self, body: &str, frequency: StatementFrequency) -> Result<StatementTable, ParserError>;
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    events: Option<ChartEvents>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    symbol: String,
    #[serde(rename = "firstTradeDate")]
    first_trade_date: Option<i64>,
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Default, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: BTreeMap<String, DividendEvent>,
    #[serde(default)]
    splits: BTreeMap<String, SplitEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    date: i64,
    numerator: f64,
    denominator: f64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBlock>,
    #[serde(default)]
    adjclose: Vec<AdjCloseBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct TimeseriesEnvelope {
    timeseries: TimeseriesBody,
}

#[derive(Debug, Deserialize)]
struct TimeseriesBody {
    #[serde(default)]
    result: Option<Vec<TimeseriesResult>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResult {
    meta: TimeseriesMeta,
    #[serde(flatten)]
    values: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TimeseriesMeta {
    #[serde(rename = "type", default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DataPoint {
    #[serde(rename = "asOfDate")]
    as_of_date: String,
    #[serde(rename = "reportedValue")]
    reported_value: Option<ReportedValue>,
}

#[derive(Debug, Deserialize)]
struct ReportedValue {
    raw: f64,
}

pub struct YahooParser;

impl YahooParser {
    pub fn new() -> Self {
        Self
    }
}

impl ResponseParser for YahooParser {
    fn parse_chart(&self, body: &str, frequency: PriceFrequency) -> Result<PriceHistory, ParserError> {
        let envelope: ChartEnvelope = serde_json::from_str(body)?;
        if let Some(err) = envelope.chart.error {
            return Err(ParserError::Api {
                code: err.code,
                description: err.description,
            });
        }
        let result = envelope
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| ParserError::MissingField("chart.result".into()))?;

        let offset = result.meta.gmtoffset;
        let to_date = |ts: i64| date_from_timestamp(ts, offset).ok_or(ParserError::InvalidTimestamp(ts));

        let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
        let adjclose = result
            .indicators
            .adjclose
            .into_iter()
            .next()
            .map(|block| block.adjclose)
            .unwrap_or_default();
        let pick = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

        let mut bars = Vec::with_capacity(result.timestamp.len());
        for (i, ts) in result.timestamp.iter().enumerate() {
            bars.push(PriceBar {
                date: to_date(*ts)?,
                open: pick(&quote.open, i),
                high: pick(&quote.high, i),
                low: pick(&quote.low, i),
                close: pick(&quote.close, i),
                adj_close: pick(&adjclose, i),
                volume: quote.volume.get(i).copied().flatten(),
            });
        }

        let events = result.events.unwrap_or_default();
        let mut dividends = Vec::with_capacity(events.dividends.len());
        for event in events.dividends.values() {
            dividends.push(Dividend {
                date: to_date(event.date)?,
                amount: event.amount,
            });
        }
        dividends.sort_by_key(|div| div.date);
        let mut splits = Vec::with_capacity(events.splits.len());
        for event in events.splits.values() {
            splits.push(Split {
                date: to_date(event.date)?,
                numerator: event.numerator,
                denominator: event.denominator,
            });
        }
        splits.sort_by_key(|split| split.date);

        let first_trade_date = match result.meta.first_trade_date {
            Some(ts) => Some(to_date(ts)?),
            None => None,
        };

        Ok(PriceHistory {
            ticker: result.meta.symbol,
            frequency,
            first_trade_date,
            bars,
            dividends,
            splits,
        })
    }

    fn parse_statement(&self, body: &str, frequency: StatementFrequency) -> Result<StatementTable, ParserError> {
        let envelope: TimeseriesEnvelope = serde_json::from_str(body)?;
        if let Some(err) = envelope.timeseries.error {
            return Err(ParserError::Api {
                code: err.code,
                description: err.description,
            });
        }

        let mut table = StatementTable::new();
        for result in envelope.timeseries.result.unwrap_or_default() {
            for series_type in &result.meta.types {
                let Some(raw) = result.values.get(series_type) else {
                    continue;
                };
                let points: Vec<Option<DataPoint>> = serde_json::from_value(raw.clone())?;
                let field = field_name(series_type, frequency);
                for point in points.into_iter().flatten() {
                    let Some(value) = point.reported_value else {
                        continue;
                    };
                    let date = parse_date(&point.as_of_date)
                        .ok_or_else(|| ParserError::MissingField(format!("{series_type}.asOfDate")))?;
                    table.insert(date, &field, value.raw);
                }
            }
        }
        Ok(table)
    }
}

/// `quarterlyTotalAssets` -> `totalAssets`
fn field_name(series_type: &str, frequency: StatementFrequency) -> String {
    let stripped = series_type
        .strip_prefix(frequency.as_str())
        .unwrap_or(series_type);
    let mut chars = stripped.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    const CHART: &str = r#"{"chart":{"result":[{
        "meta":{"symbol":"AAPL","firstTradeDate":345479400,"gmtoffset":-14400},
        "timestamp":[1699018200,1699277400],
        "events":{
            "dividends":{"1699018200":{"amount":0.24,"date":1699018200}},
            "splits":{"1598880600":{"date":1598880600,"numerator":4,"denominator":1,"splitRatio":"4:1"}}
        },
        "indicators":{
            "quote":[{"open":[174.2,176.4],"high":[176.8,179.4],"low":[173.3,176.2],"close":[176.6,null],"volume":[79763700,63841300]}],
            "adjclose":[{"adjclose":[175.9,178.7]}]
        }}],"error":null}}"#;

    #[test]
    fn parses_chart_rows_and_events() {
        let history = YahooParser::new()
            .parse_chart(CHART, PriceFrequency::Daily)
            .unwrap();
        assert_eq!(history.ticker, "AAPL");
        assert_eq!(history.first_trade_date, Some(d("1980-12-12")));
        assert_eq!(history.bars.len(), 2);
        assert_eq!(history.bars[0].date, d("2023-11-03"));
        assert_eq!(history.bars[0].close, Some(176.6));
        assert_eq!(history.bars[1].date, d("2023-11-06"));
        assert_eq!(history.bars[1].close, None);
        assert_eq!(history.bars[1].adj_close, Some(178.7));
        assert_eq!(history.bars[1].volume, Some(63_841_300));
        assert_eq!(history.dividends, vec![Dividend { date: d("2023-11-03"), amount: 0.24 }]);
        assert_eq!(history.splits.len(), 1);
        assert_eq!(history.splits[0].numerator, 4.0);
    }

    #[test]
    fn chart_error_is_reported() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = YahooParser::new()
            .parse_chart(body, PriceFrequency::Daily)
            .unwrap_err();
        assert!(matches!(err, ParserError::Api { ref code, .. } if code == "Not Found"));
    }

    #[test]
    fn chart_without_rows_is_empty_not_an_error() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"NEW","gmtoffset":0},"indicators":{"quote":[{}]}}],"error":null}}"#;
        let history = YahooParser::new()
            .parse_chart(body, PriceFrequency::Weekly)
            .unwrap();
        assert!(history.bars.is_empty());
        assert_eq!(history.first_trade_date, None);
        assert_eq!(history.frequency, PriceFrequency::Weekly);
    }

    #[test]
    fn parses_fundamentals_timeseries() {
        let body = r#"{"timeseries":{"result":[
            {"meta":{"symbol":["AAPL"],"type":["quarterlyTotalAssets"]},"timestamp":[1680220800],
             "quarterlyTotalAssets":[{"asOfDate":"2023-03-31","periodType":"3M","reportedValue":{"raw":332160000000.0,"fmt":"332.16B"}},null]},
            {"meta":{"symbol":["AAPL"],"type":["quarterlyBasicEPS"]},
             "quarterlyBasicEPS":[{"asOfDate":"2023-03-31","reportedValue":{"raw":1.53}},{"asOfDate":"2023-06-30"}]},
            {"meta":{"symbol":["AAPL"],"type":["quarterlyNetIncome"]}}
        ],"error":null}}"#;
        let table = YahooParser::new()
            .parse_statement(body, StatementFrequency::Quarterly)
            .unwrap();
        assert_eq!(table.dates(), vec![d("2023-03-31")]);
        assert_eq!(table.get(d("2023-03-31"), "totalAssets"), Some(332_160_000_000.0));
        assert_eq!(table.get(d("2023-03-31"), "basicEPS"), Some(1.53));
    }

    #[test]
    fn field_names_drop_frequency_prefix() {
        assert_eq!(field_name("annualNetIncome", StatementFrequency::Annual), "netIncome");
        assert_eq!(field_name("quarterlyFreeCashFlow", StatementFrequency::Quarterly), "freeCashFlow");
    }
}
