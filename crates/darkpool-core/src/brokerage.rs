use serde::{Deserialize, Serialize};

use crate::centrality;
use crate::graph::BipartiteGraph;
use crate::types::Category;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerInfo {
    pub intermediary: String,
    pub betweenness: f64,
    pub n_sites_fc: usize,
    pub n_sites_ms: usize,
    pub total_sites: usize,
    /// Connects at least the configured number of FC and of MS sites.
    pub is_broker: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerageReport {
    pub top: Vec<BrokerInfo>,
    pub n_cross_editorial: usize,
}

/// Rank intermediaries by normalized betweenness and flag cross-editorial brokers.
///
/// Ties in betweenness are broken by intermediary domain.
pub fn analyze_brokerage(graph: &BipartiteGraph, top_n: usize, min_neighbors: usize) -> BrokerageReport {
    let centrality = centrality::betweenness(graph.inner());

    let mut ranked: Vec<(&str, f64)> = graph
        .intermediaries()
        .map(|(domain, idx)| (domain, centrality[idx.index()]))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let top: Vec<BrokerInfo> = ranked
        .into_iter()
        .take(top_n)
        .filter_map(|(domain, betweenness)| {
            let idx = graph.intermediary_index(domain)?;
            let n_sites_fc = graph.neighbors_in(idx, Category::FactChecked);
            let n_sites_ms = graph.neighbors_in(idx, Category::Mainstream);
            Some(BrokerInfo {
                intermediary: domain.to_string(),
                betweenness,
                n_sites_fc,
                n_sites_ms,
                total_sites: graph.neighbors(idx).count(),
                is_broker: n_sites_fc >= min_neighbors && n_sites_ms >= min_neighbors,
            })
        })
        .collect();

    let n_cross_editorial = top.iter().filter(|b| b.is_broker).count();
    BrokerageReport {
        top,
        n_cross_editorial,
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
                categories: vec![Category::FactChecked, Category::Mainstream],
                pool_type: PoolType::Mixed(vec![Category::FactChecked, Category::Mainstream]),
            },
        );
    }

    fn sample_graph() -> BipartiteGraph {
        let sites = vec![
            make_site("F1", Category::FactChecked),
            make_site("F2", Category::FactChecked),
            make_site("M1", Category::Mainstream),
            make_site("M2", Category::Mainstream),
            make_site("H1", Category::Hyperpartisan),
        ];
        let mut pools = DarkPoolMap::new();
        add_pool(&mut pools, "hub.com#1", "F1,F2,M1,M2");
        add_pool(&mut pools, "edge.com#1", "M2,H1");
        BipartiteGraph::build(&sites, &pools)
    }

    #[test]
    fn test_hub_is_cross_editorial_broker() {
        let report = analyze_brokerage(&sample_graph(), 10, 2);
        assert_eq!(report.top.len(), 2);

        let hub = &report.top[0];
        assert_eq!(hub.intermediary, "hub.com");
        assert_eq!(hub.n_sites_fc, 2);
        assert_eq!(hub.n_sites_ms, 2);
        assert_eq!(hub.total_sites, 4);
        assert!(hub.is_broker);

        let edge = &report.top[1];
        assert!(!edge.is_broker);
        assert!(hub.betweenness > edge.betweenness);
        assert_eq!(report.n_cross_editorial, 1);
    }

    #[test]
    fn test_top_n_limits_ranking() {
        let report = analyze_brokerage(&sample_graph(), 1, 2);
        assert_eq!(report.top.len(), 1);
        assert_eq!(report.top[0].intermediary, "hub.com");
    }

    #[test]
    fn test_empty_graph_has_no_brokers() {
        let report = analyze_brokerage(&BipartiteGraph::new(), 10, 2);
        assert!(report.top.is_empty());
        assert_eq!(report.n_cross_editorial, 0);
    }
}
