//! Editorial integration of the sharing network: category assortativity and
//! community structure of the site projection.

use std::collections::BTreeMap;

use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::graph::{BipartiteGraph, SiteProjection};
use crate::types::Category;

/// Community partition of a projection, as produced by a detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Communities {
    /// Community id per projection node index.
    pub membership: Vec<usize>,
    pub modularity: f64,
}

/// Community detection over the site projection.
pub trait CommunityDetection: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when no partition can be computed.
    fn detect(&self, projection: &SiteProjection) -> Option<Communities>;
}

/// Louvain modularity optimisation.
#[cfg(feature = "louvain")]
pub struct Louvain;

#[cfg(feature = "louvain")]
impl CommunityDetection for Louvain {
    fn name(&self) -> &'static str {
        "louvain"
    }

    fn detect(&self, projection: &SiteProjection) -> Option<Communities> {
        crate::community::louvain(projection).map(|p| Communities {
            membership: p.communities,
            modularity: p.modularity,
        })
    }
}

/// Used when community detection is compiled out or switched off.
pub struct Unavailable;

impl CommunityDetection for Unavailable {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn detect(&self, _projection: &SiteProjection) -> Option<Communities> {
        None
    }
}

/// Pick the community detector for this build and configuration.
pub fn community_detector(config: &AnalysisConfig) -> Box<dyn CommunityDetection> {
    if !config.community_detection {
        return Box::new(Unavailable);
    }
    compiled_detector()
}

#[cfg(feature = "louvain")]
fn compiled_detector() -> Box<dyn CommunityDetection> {
    Box::new(Louvain)
}

#[cfg(not(feature = "louvain"))]
fn compiled_detector() -> Box<dyn CommunityDetection> {
    tracing::warn!("community detection is not compiled in; modularity will be null");
    Box::new(Unavailable)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunityKind {
    /// Members from more than one category.
    Mixed,
    Pure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityInfo {
    pub id: usize,
    /// Member count per category, every category present.
    pub composition: BTreeMap<Category, usize>,
    #[serde(rename = "type")]
    pub kind: CommunityKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationReport {
    pub assortativity: Option<f64>,
    pub modularity: Option<f64>,
    pub n_communities: usize,
    pub communities: Vec<CommunityInfo>,
}

/// Category assortativity coefficient of the projection.
///
/// Built from the category mixing matrix with each edge counted in both
/// directions. `None` without edges or when every edge joins one category.
pub fn category_assortativity(projection: &SiteProjection) -> Option<f64> {
    let graph = projection.inner();
    let mut mixing = [[0.0f64; 3]; 3];
    for edge in graph.edge_references() {
        let a = graph[edge.source()].category.index();
        let b = graph[edge.target()].category.index();
        mixing[a][b] += 1.0;
        mixing[b][a] += 1.0;
    }

    let total: f64 = mixing.iter().flatten().sum();
    if total == 0.0 {
        return None;
    }
    for row in mixing.iter_mut() {
        for cell in row.iter_mut() {
            *cell /= total;
        }
    }

    let trace: f64 = (0..3).map(|i| mixing[i][i]).sum();
    let expected: f64 = (0..3)
        .map(|i| {
            let a: f64 = mixing[i].iter().sum();
            let b: f64 = mixing.iter().map(|row| row[i]).sum();
            a * b
        })
        .sum();

    let denominator = 1.0 - expected;
    if denominator.abs() < f64::EPSILON {
        return None;
    }
    Some((trace - expected) / denominator)
}

fn describe_communities(projection: &SiteProjection, membership: &[usize]) -> Vec<CommunityInfo> {
    let mut compositions: BTreeMap<usize, BTreeMap<Category, usize>> = BTreeMap::new();
    for (idx, &community) in projection.inner().node_indices().zip(membership) {
        let composition = compositions
            .entry(community)
            .or_insert_with(|| Category::ALL.iter().map(|&c| (c, 0)).collect());
        if let Some(count) = composition.get_mut(&projection.site(idx).category) {
            *count += 1;
        }
    }

    compositions
        .into_iter()
        .map(|(id, composition)| {
            let present = composition.values().filter(|&&n| n > 0).count();
            CommunityInfo {
                id,
                kind: if present > 1 {
                    CommunityKind::Mixed
                } else {
                    CommunityKind::Pure
                },
                composition,
            }
        })
        .collect()
}

/// Assortativity and communities of the site projection of `graph`.
pub fn analyze_integration(
    graph: &BipartiteGraph,
    detector: &dyn CommunityDetection,
) -> IntegrationReport {
    let projection = graph.project_sites();
    let assortativity = category_assortativity(&projection);

    let Some(found) = detector.detect(&projection) else {
        tracing::debug!("no communities from {} detector", detector.name());
        return IntegrationReport {
            assortativity,
            ..IntegrationReport::default()
        };
    };

    let communities = describe_communities(&projection, &found.membership);
    IntegrationReport {
        assortativity,
        modularity: Some(found.modularity),
        n_communities: communities.len(),
        communities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::{DarkPool, DarkPoolMap, PoolType};
    use crate::types::{SellerKey, SellerSets, SiteRecord};

    fn make_site(name: &str, category: Category) -> SiteRecord {
        SiteRecord {
            name: name.to_string(),
            domain: format!("{}.com", name.to_lowercase()),
            category,
            success: true,
            error: None,
            sellers: SellerSets::default(),
            metrics: None,
        }
    }

    fn add_pool(pools: &mut DarkPoolMap, seller: &str, sites: &str) {
        let sites: Vec<String> = sites.split(',').map(str::to_string).collect();
        pools.insert(
            SellerKey(seller.to_string()),
            DarkPool {
                n_sites: sites.len(),
                sites,
                categories: vec![Category::FactChecked],
                pool_type: PoolType::Homogeneous(Category::FactChecked),
            },
        );
    }

    fn segregated_graph() -> BipartiteGraph {
        let sites = vec![
            make_site("F1", Category::FactChecked),
            make_site("F2", Category::FactChecked),
            make_site("M1", Category::Mainstream),
            make_site("M2", Category::Mainstream),
        ];
        let mut pools = DarkPoolMap::new();
        add_pool(&mut pools, "f.com#1", "F1,F2");
        add_pool(&mut pools, "m.com#1", "M1,M2");
        BipartiteGraph::build(&sites, &pools)
    }

    #[test]
    fn test_segregated_network_is_fully_assortative() {
        let projection = segregated_graph().project_sites();
        let r = category_assortativity(&projection).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cross_category_edges_are_disassortative() {
        let sites = vec![
            make_site("F1", Category::FactChecked),
            make_site("M1", Category::Mainstream),
        ];
        let mut pools = DarkPoolMap::new();
        add_pool(&mut pools, "x.com#1", "F1,M1");
        let projection = BipartiteGraph::build(&sites, &pools).project_sites();
        let r = category_assortativity(&projection).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_category_assortativity_is_undefined() {
        let sites = vec![
            make_site("M1", Category::Mainstream),
            make_site("M2", Category::Mainstream),
        ];
        let mut pools = DarkPoolMap::new();
        add_pool(&mut pools, "x.com#1", "M1,M2");
        let projection = BipartiteGraph::build(&sites, &pools).project_sites();
        assert!(category_assortativity(&projection).is_none());
    }

    #[test]
    fn test_unavailable_detector_yields_nulls() {
        let report = analyze_integration(&segregated_graph(), &Unavailable);
        assert!(report.assortativity.is_some());
        assert!(report.modularity.is_none());
        assert_eq!(report.n_communities, 0);
        assert!(report.communities.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["modularity"].is_null());
    }

    #[cfg(feature = "louvain")]
    #[test]
    fn test_louvain_finds_pure_communities() {
        let report = analyze_integration(&segregated_graph(), &Louvain);
        assert_eq!(report.n_communities, 2);
        assert!(report.modularity.unwrap() > 0.0);
        assert!(report
            .communities
            .iter()
            .all(|c| c.kind == CommunityKind::Pure));
        assert_eq!(report.communities[0].composition[&Category::FactChecked], 2);
        assert_eq!(report.communities[0].composition[&Category::Hyperpartisan], 0);
    }

    #[test]
    fn test_switched_off_detection_is_unavailable() {
        let config = AnalysisConfig {
            community_detection: false,
            ..AnalysisConfig::default()
        };
        assert_eq!(community_detector(&config).name(), "unavailable");
    }
}
