use crate::analyzer::stats::{mean, normal_quantile, quantile, variance};
use crate::analyzer::window::AnalysisWindow;
use crate::model::{AnalysisError, PlotError, PriceSeries};
use crate::plot::impact_chart;
use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{ChiSquared, Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// JSON has no NaN or infinity; such values are written as `null` and
/// read back as NaN.
mod finite_or_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Effect statistics over the post-period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectStats {
    pub actual: f64,
    #[serde(with = "finite_or_null")]
    pub predicted: f64,
    #[serde(with = "finite_or_null")]
    pub predicted_lower: f64,
    #[serde(with = "finite_or_null")]
    pub predicted_upper: f64,
    #[serde(with = "finite_or_null")]
    pub abs_effect: f64,
    #[serde(with = "finite_or_null")]
    pub abs_effect_lower: f64,
    #[serde(with = "finite_or_null")]
    pub abs_effect_upper: f64,
    /// NaN when the prediction is zero.
    #[serde(with = "finite_or_null")]
    pub rel_effect: f64,
    #[serde(with = "finite_or_null")]
    pub rel_effect_lower: f64,
    #[serde(with = "finite_or_null")]
    pub rel_effect_upper: f64,
}

impl EffectStats {
    pub const FIELDS: [&'static str; 10] = [
        "actual",
        "predicted",
        "predicted_lower",
        "predicted_upper",
        "abs_effect",
        "abs_effect_lower",
        "abs_effect_upper",
        "rel_effect",
        "rel_effect_lower",
        "rel_effect_upper",
    ];

    /// Derives effects from the observed value and the prediction interval.
    pub fn new(actual: f64, predicted: f64, predicted_lower: f64, predicted_upper: f64) -> Self {
        let abs_effect = actual - predicted;
        let abs_effect_lower = actual - predicted_upper;
        let abs_effect_upper = actual - predicted_lower;
        let rel = |abs: f64| if predicted == 0.0 { f64::NAN } else { abs / predicted };
        Self {
            actual,
            predicted,
            predicted_lower,
            predicted_upper,
            abs_effect,
            abs_effect_lower,
            abs_effect_upper,
            rel_effect: rel(abs_effect),
            rel_effect_lower: rel(abs_effect_lower),
            rel_effect_upper: rel(abs_effect_upper),
        }
    }

    /// Averages turned into sums over `n` days; relative effects are unchanged.
    pub fn scaled(&self, n: f64) -> Self {
        Self {
            actual: self.actual * n,
            predicted: self.predicted * n,
            predicted_lower: self.predicted_lower * n,
            predicted_upper: self.predicted_upper * n,
            abs_effect: self.abs_effect * n,
            abs_effect_lower: self.abs_effect_lower * n,
            abs_effect_upper: self.abs_effect_upper * n,
            ..*self
        }
    }

    pub fn values(&self) -> [f64; 10] {
        [
            self.actual,
            self.predicted,
            self.predicted_lower,
            self.predicted_upper,
            self.abs_effect,
            self.abs_effect_lower,
            self.abs_effect_upper,
            self.rel_effect,
            self.rel_effect_lower,
            self.rel_effect_upper,
        ]
    }
}

/// Observed value and counterfactual prediction for one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointPrediction {
    pub date: NaiveDate,
    pub observed: f64,
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Fitted model output for one candidate date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalImpact {
    pub window: AnalysisWindow,
    /// Pre and post days in order.
    pub points: Vec<PointPrediction>,
    pub average: EffectStats,
    pub cumulative: EffectStats,
    pub p_value: f64,
    pub alpha: f64,
}

impl CausalImpact {
    pub fn post_points(&self) -> impl Iterator<Item = &PointPrediction> {
        let start = self.window.post.start;
        self.points.iter().filter(move |p| p.date >= start)
    }

    /// (date, effect, lower, upper) per day.
    pub fn pointwise_effects(&self) -> Vec<(NaiveDate, f64, f64, f64)> {
        self.points
            .iter()
            .map(|p| (p.date, p.observed - p.mean, p.observed - p.upper, p.observed - p.lower))
            .collect()
    }

    /// Running sum of pointwise effects from the intervention on; zero before it.
    pub fn cumulative_effects(&self) -> Vec<(NaiveDate, f64, f64, f64)> {
        let start = self.window.post.start;
        let mut acc = (0.0, 0.0, 0.0);
        self.pointwise_effects()
            .into_iter()
            .map(|(date, effect, lower, upper)| {
                if date >= start {
                    acc = (acc.0 + effect, acc.1 + lower, acc.2 + upper);
                }
                (date, acc.0, acc.1, acc.2)
            })
            .collect()
    }

    /// Three-panel SVG: original, pointwise and cumulative.
    pub fn plot(&self) -> Result<String, PlotError> {
        impact_chart::render(self, impact_chart::DEFAULT_SIZE)
    }
}

pub trait ImpactModel: Send + Sync {
    fn fit(&self, series: &PriceSeries, window: &AnalysisWindow) -> Result<CausalImpact, AnalysisError>;
}

/// Bayesian local level with drift. The counterfactual is a random walk
/// started from the last pre-period value, with drift and noise drawn from
/// their posterior given the pre-period differences.
#[derive(Debug, Clone)]
pub struct LocalLevelModel {
    draws: usize,
    seed: u64,
    alpha: f64,
}

impl LocalLevelModel {
    pub fn new(draws: usize, seed: u64, alpha: f64) -> Self {
        Self {
            draws: draws.max(1),
            seed,
            alpha,
        }
    }

    fn rng_for(&self, date: NaiveDate) -> StdRng {
        let salt = (date.num_days_from_ce() as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        StdRng::seed_from_u64(self.seed ^ salt)
    }
}

impl Default for LocalLevelModel {
    fn default() -> Self {
        Self::new(1000, 42, 0.05)
    }
}

impl ImpactModel for LocalLevelModel {
    fn fit(&self, series: &PriceSeries, window: &AnalysisWindow) -> Result<CausalImpact, AnalysisError> {
        let pre = series.between(window.pre.start, window.pre.end);
        let post = series.between(window.post.start, window.post.end);
        if pre.len() < 2 {
            return Err(AnalysisError::InsufficientData {
                date: window.date,
                reason: format!("{} pre-period observations, need 2", pre.len()),
            });
        }
        if post.is_empty() {
            return Err(AnalysisError::InsufficientData {
                date: window.date,
                reason: "empty post-period".into(),
            });
        }

        let diffs: Vec<f64> = pre.windows(2).map(|w| w[1].1 - w[0].1).collect();
        let n = diffs.len() as f64;
        let drift = mean(&diffs);
        let dof = if diffs.len() > 1 { n - 1.0 } else { 1.0 };
        let s2 = variance(&diffs, drift, dof);
        let last = pre[pre.len() - 1].1;
        let m = post.len();

        let post_values: Vec<f64> = post.iter().map(|(_, v)| *v).collect();
        let actual = mean(&post_values);

        let chi = ChiSquared::new(dof).map_err(|e| AnalysisError::InsufficientData {
            date: window.date,
            reason: format!("chi-square with {} degrees of freedom: {}", dof, e),
        })?;
        let mut rng = self.rng_for(window.date);
        let mut sims = Vec::with_capacity(self.draws);
        for _ in 0..self.draws {
            let sigma2 = s2 * dof / chi.sample(&mut rng).max(f64::MIN_POSITIVE);
            let sigma = sigma2.sqrt();
            let mu = drift + (sigma2 / n).sqrt() * rng.sample::<f64, _>(StandardNormal);
            let mut level = last;
            let mut total = 0.0;
            for _ in 0..m {
                level += mu + sigma * rng.sample::<f64, _>(StandardNormal);
                total += level;
            }
            sims.push(total / m as f64);
        }
        sims.sort_by(f64::total_cmp);

        let predicted = mean(&sims);
        let lower = quantile(&sims, self.alpha / 2.0);
        let upper = quantile(&sims, 1.0 - self.alpha / 2.0);
        let average = EffectStats::new(actual, predicted, lower, upper);

        let above = sims.iter().filter(|s| **s >= actual).count();
        let below = sims.iter().filter(|s| **s <= actual).count();
        let p_value = (1 + above.min(below)) as f64 / (1 + sims.len()) as f64;

        let z = normal_quantile(1.0 - self.alpha / 2.0);
        let step_sd = s2.sqrt();
        let mut points = Vec::with_capacity(pre.len() + m);
        points.push(PointPrediction {
            date: pre[0].0,
            observed: pre[0].1,
            mean: pre[0].1,
            lower: pre[0].1,
            upper: pre[0].1,
        });
        for w in pre.windows(2) {
            let mean = w[0].1 + drift;
            points.push(PointPrediction {
                date: w[1].0,
                observed: w[1].1,
                mean,
                lower: mean - z * step_sd,
                upper: mean + z * step_sd,
            });
        }
        for (h, (date, observed)) in post.iter().enumerate() {
            let h = (h + 1) as f64;
            let mean = last + drift * h;
            let sd = (s2 * h + h * h * s2 / n).sqrt();
            points.push(PointPrediction {
                date: *date,
                observed: *observed,
                mean,
                lower: mean - z * sd,
                upper: mean + z * sd,
            });
        }

        Ok(CausalImpact {
            window: *window,
            points,
            average,
            cumulative: average.scaled(m as f64),
            p_value,
            alpha: self.alpha,
        })
    }
}
