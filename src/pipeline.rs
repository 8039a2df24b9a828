// One ticker/frequency pass: fetch or reuse inputs, analyze, store outputs
use crate::analyzer::{LocalLevelModel, StructuralChange, SummaryTable};
use crate::config::AppConfig;
use crate::market_data::{MarketData, PriceRange};
use crate::model::{
    AnalysisError, FinancialStatements, PlotError, PriceFrequency, PriceHistory, StatementFrequency,
    StorageError, TickerError, TickerInfo,
};
use crate::normalizer::{normalize_history, resample};
use crate::plot::price_chart;
use crate::storage::{ArtifactKind, BlobStore, CacheKey, load_json, save_json};
use crate::utils::format_date;
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ticker(#[from] TickerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Plot(#[from] PlotError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerReport {
    pub ticker: String,
    pub frequency: StatementFrequency,
    pub candidates: usize,
    pub analyzed: usize,
    pub skipped: usize,
    pub significant: usize,
}

async fn load_statements(
    market: &MarketData,
    cache: &dyn BlobStore,
    info: &TickerInfo,
    frequency: StatementFrequency,
    refresh: bool,
) -> Result<FinancialStatements, PipelineError> {
    let key = CacheKey::new(&info.ticker, frequency, ArtifactKind::Statements);
    if !refresh {
        if let Some(cached) = load_json::<FinancialStatements>(cache, &key)? {
            info!("Using cached statements: {}", key);
            return Ok(cached);
        }
    }
    let statements = market.fetch_statements(info, frequency).await?;
    save_json(cache, &key, &statements)?;
    Ok(statements)
}

async fn load_prices(
    market: &MarketData,
    cache: &dyn BlobStore,
    info: &TickerInfo,
    frequency: StatementFrequency,
    config: &AppConfig,
    today: NaiveDate,
) -> Result<PriceHistory, PipelineError> {
    let key = CacheKey::new(&info.ticker, frequency, ArtifactKind::Prices);
    if !config.refresh {
        if let Some(cached) = load_json::<PriceHistory>(cache, &key)? {
            info!("Using cached prices: {}", key);
            return Ok(cached);
        }
    }
    let history = market
        .fetch_prices(
            info,
            PriceRange::default(),
            PriceFrequency::Daily,
            today,
            config.history_years,
        )
        .await?;
    save_json(cache, &key, &history)?;
    Ok(history)
}

/// Runs the structural change analysis for one ticker and statement
/// frequency and writes the summary, one figure per analyzed date and a
/// price chart into `cache`.
pub async fn process_ticker(
    market: &MarketData,
    cache: &dyn BlobStore,
    config: &AppConfig,
    symbol: &str,
    frequency: StatementFrequency,
    today: NaiveDate,
) -> Result<TickerReport, PipelineError> {
    info!("Processing ticker: {} ({})", symbol, frequency);
    let info = market.check_ticker(symbol, today).await?;
    let ticker = info.ticker.clone();

    let statements = load_statements(market, cache, &info, frequency, config.refresh).await?;
    let history = load_prices(market, cache, &info, frequency, config, today).await?;
    debug!(
        "{}: {} price rows, {} dividends, {} splits",
        ticker,
        history.bars.len(),
        history.dividends.len(),
        history.splits.len()
    );

    let series = Arc::new(normalize_history(&history, PriceFrequency::Daily));
    let statement_dates = statements.statement_dates();
    let candidates: Vec<String> = statement_dates.iter().map(|d| format_date(*d)).collect();
    info!("{}: {} statement dates as candidates", ticker, candidates.len());

    let impact = &config.impact;
    let model = Arc::new(LocalLevelModel::new(impact.draws, impact.seed, impact.alpha));
    let mut sc = StructuralChange::new(series.clone(), candidates.clone(), model)?;
    let table: SummaryTable = sc.analyze_concurrent(impact.workers, impact.timeout()).await?.clone();
    let significant = table.significant(impact.alpha).count();
    info!(
        "{} ({}): {} rows, {} significant at alpha {}\n{}",
        ticker,
        frequency,
        table.len(),
        significant,
        impact.alpha,
        table
    );

    save_json(cache, &CacheKey::new(&ticker, frequency, ArtifactKind::Summary), &table)?;

    for date in sc.analyzed_dates() {
        let svg = sc.plot(&format_date(date), false)?;
        cache.put(&CacheKey::impact_figure(&ticker, frequency, date), svg.as_bytes())?;
    }

    let chart_series = resample(&series, config.price_frequency);
    let title = format!("{} close ({}, {} statements)", ticker, config.price_frequency.interval(), frequency);
    let chart = price_chart::render(&title, &chart_series, &statement_dates, price_chart::DEFAULT_SIZE)?;
    cache.put(&CacheKey::new(&ticker, frequency, ArtifactKind::PriceChart), chart.as_bytes())?;

    info!("Finished ticker: {} ({})", ticker, frequency);
    Ok(TickerReport {
        ticker,
        frequency,
        candidates: candidates.len(),
        analyzed: table.len(),
        skipped: sc.skipped().len(),
        significant,
    })
}
