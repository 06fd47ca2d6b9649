use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pools::DarkPoolMap;
use crate::stats::{self, round_to, TestOutcome};
use crate::types::{Category, SellerSets, SiteMetrics, SiteRecord};

/// Compute exposure and opacity of a single site.
///
/// Both are percentages in [0, 100], rounded to 2 decimals, and 0 when the
/// denominator is empty.
pub fn site_metrics(sellers: &SellerSets, pools: &DarkPoolMap) -> SiteMetrics {
    let n_direct = sellers.direct.len();
    let n_reseller = sellers.reseller.len();

    let n_pools = sellers
        .direct
        .iter()
        .filter(|s| pools.contains_key(*s))
        .count();

    let exposure = if n_direct > 0 {
        n_pools as f64 / n_direct as f64 * 100.0
    } else {
        0.0
    };

    let total = n_direct + n_reseller;
    let opacity = if total > 0 {
        n_reseller as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    SiteMetrics {
        n_direct,
        n_reseller,
        exposure: round_to(exposure, 2),
        opacity: round_to(opacity, 2),
        n_pools,
    }
}

/// Attach metrics to every successfully fetched site.
pub fn attach_metrics(sites: &mut [SiteRecord], pools: &DarkPoolMap) {
    for site in sites.iter_mut().filter(|s| s.success) {
        site.metrics = Some(site_metrics(&site.sellers, pools));
    }
}

/// Summary of the direct-seller counts of a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountSummary {
    pub mean: f64,
    pub median: usize,
    pub std: f64,
    pub min: usize,
    pub max: usize,
}

/// Summary of a percentage metric across a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentSummary {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDetail {
    pub sellers_direct: CountSummary,
    pub exposure: PercentSummary,
    pub opacity: PercentSummary,
}

/// Aggregates of one category. `detail` is absent when `n == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub n: usize,
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<CategoryDetail>,
}

/// Successful sites of `category` that already carry metrics.
pub fn measured_sites(sites: &[SiteRecord], category: Category) -> Vec<&SiteMetrics> {
    sites
        .iter()
        .filter(|s| s.success && s.category == category)
        .filter_map(|s| s.metrics.as_ref())
        .collect()
}

fn percent_summary(values: &[f64]) -> Option<PercentSummary> {
    Some(PercentSummary {
        mean: round_to(stats::mean(values)?, 1),
        median: round_to(stats::median(values)?, 1),
        std: round_to(stats::std_dev(values)?, 1),
    })
}

fn category_detail(metrics: &[&SiteMetrics]) -> Option<CategoryDetail> {
    let counts: Vec<f64> = metrics.iter().map(|m| m.n_direct as f64).collect();
    let exposures: Vec<f64> = metrics.iter().map(|m| m.exposure).collect();
    let opacities: Vec<f64> = metrics.iter().map(|m| m.opacity).collect();

    Some(CategoryDetail {
        sellers_direct: CountSummary {
            mean: round_to(stats::mean(&counts)?, 1),
            median: stats::median(&counts)?.trunc() as usize,
            std: round_to(stats::std_dev(&counts)?, 1),
            min: metrics.iter().map(|m| m.n_direct).min()?,
            max: metrics.iter().map(|m| m.n_direct).max()?,
        },
        exposure: percent_summary(&exposures)?,
        opacity: percent_summary(&opacities)?,
    })
}

/// Per-category aggregates over successfully fetched sites.
pub fn category_statistics(sites: &[SiteRecord]) -> BTreeMap<Category, CategoryStats> {
    Category::ALL
        .iter()
        .map(|&category| {
            let metrics = measured_sites(sites, category);
            let stats = CategoryStats {
                n: metrics.len(),
                detail: category_detail(&metrics),
            };
            (category, stats)
        })
        .collect()
}

/// A reported significance test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test: String,
    pub statistic: f64,
    pub p: f64,
    pub significant: bool,
}

impl TestResult {
    pub fn new(test: &str, outcome: TestOutcome, alpha: f64) -> Self {
        Self {
            test: test.to_string(),
            statistic: round_to(outcome.statistic, 2),
            p: round_to(outcome.p_value, 4),
            significant: outcome.p_value < alpha,
        }
    }

    /// Keep the statistic and p-value at full precision.
    pub fn unrounded(test: &str, outcome: TestOutcome, alpha: f64) -> Self {
        Self {
            test: test.to_string(),
            statistic: outcome.statistic,
            p: outcome.p_value,
            significant: outcome.p_value < alpha,
        }
    }
}

/// Category comparisons. A test whose samples are missing is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignificanceTests {
    /// Exposure, FC vs MS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure: Option<TestResult>,
    /// Opacity, FC vs MS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<TestResult>,
    /// Direct-seller counts across FC, HP and MS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sellers_between_categories: Option<TestResult>,
}

impl SignificanceTests {
    /// Present tests in a fixed order, paired with their key.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &TestResult)> {
        [
            ("exposure", self.exposure.as_ref()),
            ("opacity", self.opacity.as_ref()),
            ("sellers_between_categories", self.sellers_between_categories.as_ref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
    }
}

const MANN_WHITNEY: &str = "Mann-Whitney U";
const KRUSKAL_WALLIS: &str = "Kruskal-Wallis H";

fn field(set: &[&SiteMetrics], f: impl Fn(&SiteMetrics) -> f64) -> Vec<f64> {
    set.iter().map(|m| f(*m)).collect()
}

/// Run the category significance tests at level `alpha`.
pub fn significance_tests(sites: &[SiteRecord], alpha: f64) -> SignificanceTests {
    let fc = measured_sites(sites, Category::FactChecked);
    let hp = measured_sites(sites, Category::Hyperpartisan);
    let ms = measured_sites(sites, Category::Mainstream);

    let exposure = stats::mann_whitney_u(
        &field(&fc, |m| m.exposure),
        &field(&ms, |m| m.exposure),
    )
    .map(|o| TestResult::new(MANN_WHITNEY, o, alpha));

    let opacity = stats::mann_whitney_u(&field(&fc, |m| m.opacity), &field(&ms, |m| m.opacity))
        .map(|o| TestResult::new(MANN_WHITNEY, o, alpha));

    let direct = |m: &SiteMetrics| m.n_direct as f64;
    let (d_fc, d_hp, d_ms) = (field(&fc, direct), field(&hp, direct), field(&ms, direct));
    let sellers_between_categories =
        stats::kruskal_wallis(&[d_fc.as_slice(), d_hp.as_slice(), d_ms.as_slice()])
            .map(|o| TestResult::new(KRUSKAL_WALLIS, o, alpha));

    SignificanceTests {
        exposure,
        opacity,
        sellers_between_categories,
    }
}
