use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::brokerage::{self, BrokerageReport};
use crate::clustering::{self, StrategyReport};
use crate::config::Config;
use crate::error::AnalysisError;
use crate::graph::{BipartiteGraph, GraphSummary};
use crate::integration::{self, IntegrationReport};
use crate::metrics::{self, CategoryStats, SignificanceTests};
use crate::parser;
use crate::pools::{self, DarkPoolMap, PoolComposition};
use crate::types::{Category, FetchOutcome, SellerKey, SiteRecord};
use crate::vulnerability::{self, VulnerabilityReport};

/// Run-level facts about a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// RFC 3339 time the collection finished.
    pub timestamp: String,
    pub total_sites: usize,
    pub sites_with_adstxt: usize,
    pub unique_direct_sellers: usize,
    pub unique_reseller_sellers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DarkPoolSection {
    pub total: usize,
    pub pools: DarkPoolMap,
    pub composition: PoolComposition,
}

/// Everything the collection stage produces; the sole input of the network stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub metadata: CollectionMetadata,
    pub sites: Vec<SiteRecord>,
    pub dark_pools: DarkPoolSection,
    pub statistics: BTreeMap<Category, CategoryStats>,
    pub tests: SignificanceTests,
}

impl CollectionReport {
    pub fn successful_sites(&self) -> impl Iterator<Item = &SiteRecord> {
        self.sites.iter().filter(|s| s.success)
    }
}

/// Output of the network stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkReport {
    /// SHA-256 of the collection file this report was computed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_digest: Option<String>,
    pub graph: GraphSummary,
    pub vulnerability: VulnerabilityReport,
    pub strategies: StrategyReport,
    pub brokers: BrokerageReport,
    pub integration: IntegrationReport,
}

/// A collection read back from disk together with its digest.
#[derive(Debug, Clone)]
pub struct LoadedCollection {
    pub report: CollectionReport,
    pub digest: String,
}

/// Compute SHA-256 hash of file content.
pub fn compute_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Read a persisted collection. A missing file is reported before anything else runs.
pub fn load_collection(path: &Path) -> Result<LoadedCollection, AnalysisError> {
    if !path.exists() {
        return Err(AnalysisError::MissingCollection {
            path: path.to_path_buf(),
        });
    }
    let bytes = std::fs::read(path).map_err(|source| AnalysisError::ReadCollection {
        path: path.to_path_buf(),
        source,
    })?;
    let report = serde_json::from_slice(&bytes).map_err(|source| {
        AnalysisError::MalformedCollection {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(LoadedCollection {
        report,
        digest: compute_digest(&bytes),
    })
}

/// Two-stage analysis pipeline over an immutable configuration.
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Pair every configured site with its fetch outcome, parsing successful ones.
    ///
    /// A site without an outcome is recorded as failed.
    pub fn build_site_records(&self, outcomes: &[FetchOutcome]) -> Vec<SiteRecord> {
        let by_domain: HashMap<&str, &FetchOutcome> =
            outcomes.iter().map(|o| (o.domain.as_str(), o)).collect();

        self.config
            .sites
            .iter()
            .map(|site| {
                let outcome = by_domain.get(site.domain.as_str());
                let (success, error, sellers) = match outcome {
                    Some(o) if o.success => (true, None, parser::parse_ads_txt(&o.lines)),
                    Some(o) => (false, Some(o.error.clone()), Default::default()),
                    None => (false, Some("not fetched".to_string()), Default::default()),
                };
                if let Some(err) = &error {
                    tracing::warn!("{} ({}): {err}", site.name, site.domain);
                } else {
                    tracing::debug!(
                        "{}: {} direct, {} reseller",
                        site.name,
                        sellers.direct.len(),
                        sellers.reseller.len()
                    );
                }
                SiteRecord {
                    name: site.name.clone(),
                    domain: site.domain.clone(),
                    category: site.category,
                    success,
                    error,
                    sellers,
                    metrics: None,
                }
            })
            .collect()
    }

    /// Stage one: pools, per-site metrics, category statistics and tests.
    pub fn collect(&self, outcomes: &[FetchOutcome]) -> CollectionReport {
        let analysis = &self.config.analysis;
        let mut sites = self.build_site_records(outcomes);

        let pools = pools::detect_dark_pools(&sites, &self.config.editorial_groups);
        tracing::info!("{} dark pools detected", pools.len());
        metrics::attach_metrics(&mut sites, &pools);

        let statistics = metrics::category_statistics(&sites);
        let tests = metrics::significance_tests(&sites, analysis.significance_level);

        let mut direct: BTreeSet<&SellerKey> = BTreeSet::new();
        let mut reseller: BTreeSet<&SellerKey> = BTreeSet::new();
        for site in sites.iter().filter(|s| s.success) {
            direct.extend(&site.sellers.direct);
            reseller.extend(&site.sellers.reseller);
        }
        let metadata = CollectionMetadata {
            timestamp: Utc::now().to_rfc3339(),
            total_sites: sites.len(),
            sites_with_adstxt: sites.iter().filter(|s| s.success).count(),
            unique_direct_sellers: direct.len(),
            unique_reseller_sellers: reseller.len(),
        };
        tracing::info!(
            "collected {}/{} sites",
            metadata.sites_with_adstxt,
            metadata.total_sites
        );

        let composition = pools::compose(&pools, analysis.top_pools);
        CollectionReport {
            metadata,
            dark_pools: DarkPoolSection {
                total: pools.len(),
                pools,
                composition,
            },
            sites,
            statistics,
            tests,
        }
    }

    /// Stage two: build the graph and run the four network analyses.
    ///
    /// The analyses only read the graph and run in parallel.
    pub fn analyze_network(
        &self,
        collection: &CollectionReport,
        source_digest: Option<String>,
    ) -> NetworkReport {
        let analysis = &self.config.analysis;
        let sites = &collection.sites;

        let graph = BipartiteGraph::build(sites, &collection.dark_pools.pools);
        let summary = graph.summary();
        tracing::info!(
            "graph: {} sites, {} intermediaries, {} edges",
            summary.n_sites,
            summary.n_intermediaries,
            summary.n_edges
        );

        let detector = integration::community_detector(analysis);
        let ((vulnerability, strategies), (brokers, integration)) = rayon::join(
            || {
                rayon::join(
                    || {
                        vulnerability::analyze_vulnerability(
                            &graph,
                            sites,
                            analysis.vulnerability_threshold,
                            analysis.top_intermediaries,
                        )
                    },
                    || clustering::analyze_strategies(sites, analysis),
                )
            },
            || {
                rayon::join(
                    || {
                        brokerage::analyze_brokerage(
                            &graph,
                            analysis.top_intermediaries,
                            analysis.broker_min_neighbors,
                        )
                    },
                    || integration::analyze_integration(&graph, detector.as_ref()),
                )
            },
        );

        NetworkReport {
            source_digest,
            graph: summary,
            vulnerability,
            strategies,
            brokers,
            integration,
        }
    }
}
