//! Strategy clustering: k-means over standardized (direct, reseller) counts.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::metrics::TestResult;
use crate::stats;
use crate::types::{Category, SiteRecord};

const MAX_ITERATIONS: usize = 300;
const TOLERANCE: f64 = 1e-4;
const SAMPLE_SITES: usize = 5;

/// Seeded k-means with k-means++ initialisation and independent restarts.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub k: usize,
    pub restarts: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit<const D: usize> {
    pub labels: Vec<usize>,
    pub centroids: Vec<[f64; D]>,
    pub inertia: f64,
}

fn squared_distance<const D: usize>(a: &[f64; D], b: &[f64; D]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest<const D: usize>(point: &[f64; D], centroids: &[[f64; D]]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

impl KMeans {
    pub fn new(k: usize, restarts: usize, seed: u64) -> Self {
        Self { k, restarts, seed }
    }

    /// Best fit over all restarts. `None` when there are fewer points than clusters.
    ///
    /// Restarts run in parallel; the lowest inertia wins, ties going to the
    /// lowest restart number, so the result only depends on `seed`.
    pub fn fit<const D: usize>(&self, points: &[[f64; D]]) -> Option<KMeansFit<D>> {
        if self.k == 0 || points.len() < self.k {
            return None;
        }
        (0..self.restarts.max(1))
            .into_par_iter()
            .map(|restart| (restart, self.run(points, self.seed.wrapping_add(restart as u64))))
            .min_by(|a, b| a.1.inertia.total_cmp(&b.1.inertia).then(a.0.cmp(&b.0)))
            .map(|(_, fit)| fit)
    }

    fn seed_centroids<const D: usize>(&self, points: &[[f64; D]], rng: &mut StdRng) -> Vec<[f64; D]> {
        let mut centroids = Vec::with_capacity(self.k);
        centroids.push(points[rng.gen_range(0..points.len())]);

        let mut dist: Vec<f64> = points
            .iter()
            .map(|p| squared_distance(p, &centroids[0]))
            .collect();
        while centroids.len() < self.k {
            let total: f64 = dist.iter().sum();
            let chosen = if total > 0.0 {
                let target = rng.gen::<f64>() * total;
                let mut acc = 0.0;
                let mut pick = points.len() - 1;
                for (i, d) in dist.iter().enumerate() {
                    acc += d;
                    if acc > target {
                        pick = i;
                        break;
                    }
                }
                pick
            } else {
                rng.gen_range(0..points.len())
            };

            let centroid = points[chosen];
            for (d, p) in dist.iter_mut().zip(points) {
                *d = d.min(squared_distance(p, &centroid));
            }
            centroids.push(centroid);
        }
        centroids
    }

    fn run<const D: usize>(&self, points: &[[f64; D]], seed: u64) -> KMeansFit<D> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut centroids = self.seed_centroids(points, &mut rng);
        let mut labels = vec![0usize; points.len()];

        for _ in 0..MAX_ITERATIONS {
            for (label, p) in labels.iter_mut().zip(points) {
                *label = nearest(p, &centroids).0;
            }

            let mut sums = vec![[0.0; D]; self.k];
            let mut counts = vec![0usize; self.k];
            for (&label, p) in labels.iter().zip(points) {
                counts[label] += 1;
                for (s, x) in sums[label].iter_mut().zip(p) {
                    *s += x;
                }
            }

            let mut shift = 0.0;
            for (c, (sum, &count)) in centroids.iter_mut().zip(sums.iter().zip(&counts)) {
                // An empty cluster keeps its previous centre.
                if count == 0 {
                    continue;
                }
                let mut updated = [0.0; D];
                for (u, s) in updated.iter_mut().zip(sum) {
                    *u = s / count as f64;
                }
                shift += squared_distance(c, &updated);
                *c = updated;
            }
            if shift <= TOLERANCE {
                break;
            }
        }

        let mut inertia = 0.0;
        for (label, p) in labels.iter_mut().zip(points) {
            let (best, d) = nearest(p, &centroids);
            *label = best;
            inertia += d;
        }
        KMeansFit {
            labels,
            centroids,
            inertia,
        }
    }
}

/// Zero-mean, unit-variance scaling per feature. A constant feature is only centred.
pub fn standardize<const D: usize>(points: &[[f64; D]]) -> Vec<[f64; D]> {
    let mut scaled = points.to_vec();
    for dim in 0..D {
        let column: Vec<f64> = points.iter().map(|p| p[dim]).collect();
        let (Some(mean), Some(std)) = (stats::mean(&column), stats::std_dev(&column)) else {
            continue;
        };
        let std = if std > 0.0 { std } else { 1.0 };
        for p in scaled.iter_mut() {
            p[dim] = (p[dim] - mean) / std;
        }
    }
    scaled
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub id: usize,
    pub n_sites: usize,
    pub direct_mean: f64,
    pub reseller_mean: f64,
    /// Only categories present in the cluster.
    pub categories: BTreeMap<Category, usize>,
    /// First few member sites, in collection order.
    pub sample_sites: Vec<String>,
}

/// Outcome of strategy clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StrategyReport {
    Clustered {
        clusters: Vec<ClusterInfo>,
        /// Cluster vs. category chi-squared test; absent for a degenerate table.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        independence_test: Option<TestResult>,
    },
    InsufficientData {
        error: String,
        eligible_sites: usize,
        required: usize,
    },
}

impl StrategyReport {
    pub fn clusters(&self) -> &[ClusterInfo] {
        match self {
            StrategyReport::Clustered { clusters, .. } => clusters,
            StrategyReport::InsufficientData { .. } => &[],
        }
    }
}

const CHI_SQUARED: &str = "chi-squared";

/// Cluster measured sites into `config.clusters` strategies.
pub fn analyze_strategies(sites: &[SiteRecord], config: &AnalysisConfig) -> StrategyReport {
    let eligible: Vec<&SiteRecord> = sites
        .iter()
        .filter(|s| s.success && s.metrics.is_some())
        .collect();

    let required = config.min_cluster_sites.max(config.clusters);
    if eligible.len() < required {
        tracing::info!(
            "skipping strategy clustering: {} eligible sites, {} required",
            eligible.len(),
            required
        );
        return StrategyReport::InsufficientData {
            error: "too few sites for clustering".to_string(),
            eligible_sites: eligible.len(),
            required,
        };
    }

    let features: Vec<[f64; 2]> = eligible
        .iter()
        .filter_map(|s| s.metrics.as_ref())
        .map(|m| [m.n_direct as f64, m.n_reseller as f64])
        .collect();

    let kmeans = KMeans::new(config.clusters, config.cluster_restarts, config.cluster_seed);
    let Some(fit) = kmeans.fit(&standardize(&features)) else {
        return StrategyReport::InsufficientData {
            error: "too few sites for clustering".to_string(),
            eligible_sites: eligible.len(),
            required,
        };
    };
    tracing::debug!("k-means inertia {:.4}", fit.inertia);

    let mut table = vec![vec![0.0; Category::ALL.len()]; config.clusters];
    let mut clusters = Vec::with_capacity(config.clusters);
    for id in 0..config.clusters {
        let members: Vec<usize> = (0..eligible.len()).filter(|&i| fit.labels[i] == id).collect();

        let mut categories = BTreeMap::new();
        for &i in &members {
            *categories.entry(eligible[i].category).or_insert(0) += 1;
            table[id][eligible[i].category.index()] += 1.0;
        }

        let direct: Vec<f64> = members.iter().map(|&i| features[i][0]).collect();
        let reseller: Vec<f64> = members.iter().map(|&i| features[i][1]).collect();
        clusters.push(ClusterInfo {
            id,
            n_sites: members.len(),
            direct_mean: stats::mean(&direct).unwrap_or(0.0),
            reseller_mean: stats::mean(&reseller).unwrap_or(0.0),
            categories,
            sample_sites: members
                .iter()
                .take(SAMPLE_SITES)
                .map(|&i| eligible[i].name.clone())
                .collect(),
        });
    }

    let independence_test = stats::chi_squared_independence(&table).map(|(outcome, _dof)| {
        TestResult::unrounded(CHI_SQUARED, outcome, config.significance_level)
    });

    StrategyReport::Clustered {
        clusters,
        independence_test,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SellerSets, SiteMetrics};
    use statrs::distribution::{ChiSquared, ContinuousCDF};

    fn make_site(name: &str, category: Category, n_direct: usize, n_reseller: usize) -> SiteRecord {
        SiteRecord {
            name: name.to_string(),
            domain: format!("{name}.com"),
            category,
            success: true,
            error: None,
            sellers: SellerSets::default(),
            metrics: Some(SiteMetrics {
                n_direct,
                n_reseller,
                exposure: 0.0,
                opacity: 0.0,
                n_pools: 0,
            }),
        }
    }

    /// Four well separated groups of three sites.
    fn grouped_sites() -> Vec<SiteRecord> {
        let centres = [(1, 1), (100, 1), (1, 100), (100, 100)];
        let mut sites = Vec::new();
        for (g, (d, r)) in centres.iter().enumerate() {
            for j in 0..3 {
                let category = Category::ALL[j];
                sites.push(make_site(&format!("s{g}{j}"), category, d + j, r + j));
            }
        }
        sites
    }

    #[test]
    fn test_fewer_than_ten_sites_is_insufficient() {
        let sites: Vec<SiteRecord> = (0..9)
            .map(|i| make_site(&format!("s{i}"), Category::Mainstream, i, i))
            .collect();
        let report = analyze_strategies(&sites, &AnalysisConfig::default());
        match report {
            StrategyReport::InsufficientData {
                eligible_sites,
                required,
                ..
            } => {
                assert_eq!(eligible_sites, 9);
                assert_eq!(required, 10);
            }
            other => panic!("expected insufficient data, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_sites_are_not_eligible() {
        let mut sites = grouped_sites();
        for site in sites.iter_mut().take(3) {
            site.success = false;
        }
        let report = analyze_strategies(&sites, &AnalysisConfig::default());
        assert!(matches!(report, StrategyReport::InsufficientData { eligible_sites: 9, .. }));
    }

    #[test]
    fn test_separated_groups_are_recovered() {
        let sites = grouped_sites();
        let report = analyze_strategies(&sites, &AnalysisConfig::default());
        let clusters = report.clusters();
        assert_eq!(clusters.len(), 4);
        assert!(clusters.iter().all(|c| c.n_sites == 3));
        assert_eq!(clusters.iter().map(|c| c.n_sites).sum::<usize>(), 12);

        // Each group mixes all three categories, so clusters are independent of them.
        let StrategyReport::Clustered {
            independence_test, ..
        } = &report
        else {
            panic!("expected clusters");
        };
        let test = independence_test.as_ref().unwrap();
        assert_eq!(test.statistic, 0.0);
        assert!(!test.significant);
    }

    #[test]
    fn test_cluster_figures_keep_full_precision() {
        let centres = [(1, 1), (100, 1), (1, 100), (100, 100)];
        let mut sites = Vec::new();
        for (g, (d, r)) in centres.iter().enumerate() {
            for j in 0..3 {
                let category = match (g, j) {
                    (_, 2) => Category::Mainstream,
                    (0 | 1, _) => Category::FactChecked,
                    _ => Category::Hyperpartisan,
                };
                let bump = usize::from(j == 2);
                sites.push(make_site(&format!("s{g}{j}"), category, d + bump, r + bump));
            }
        }

        let report = analyze_strategies(&sites, &AnalysisConfig::default());
        let clusters = report.clusters();
        assert_eq!(clusters.len(), 4);
        assert!(clusters.iter().any(|c| c.direct_mean == 4.0 / 3.0));
        assert!(clusters.iter().any(|c| c.reseller_mean == 301.0 / 3.0));

        let StrategyReport::Clustered {
            independence_test: Some(test),
            ..
        } = &report
        else {
            panic!("expected an independence test");
        };
        // Every cell expects one site, so the statistic is exactly 8 on 6 dof.
        let expected_p = ChiSquared::new(6.0).unwrap().sf(8.0);
        assert_eq!(test.statistic, 8.0);
        assert_eq!(test.p, expected_p);
        assert_ne!(test.p, crate::stats::round_to(expected_p, 4));
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let sites = grouped_sites();
        let config = AnalysisConfig::default();
        assert_eq!(analyze_strategies(&sites, &config), analyze_strategies(&sites, &config));
    }

    #[test]
    fn test_standardize_constant_feature() {
        let scaled = standardize(&[[1.0, 5.0], [3.0, 5.0]]);
        assert_eq!(scaled, vec![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_kmeans_needs_enough_points() {
        let kmeans = KMeans::new(4, 10, 42);
        assert!(kmeans.fit(&[[0.0, 0.0], [1.0, 1.0]]).is_none());
    }

    #[test]
    fn test_insufficient_data_serializes_error_field() {
        let report = StrategyReport::InsufficientData {
            error: "too few sites for clustering".to_string(),
            eligible_sites: 3,
            required: 10,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["error"], "too few sites for clustering");
        assert!(json.get("clusters").is_none());
    }
}
