use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

use crate::pools::DarkPoolMap;
use crate::types::{Category, SellerKey, SiteRecord};

/// Which side of the bipartite graph a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Site(Category),
    Intermediary,
}

/// Node in the site/intermediary graph
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Site name or intermediary domain.
    pub id: String,
    pub kind: NodeKind,
}

impl GraphNode {
    pub fn category(&self) -> Option<Category> {
        match self.kind {
            NodeKind::Site(category) => Some(category),
            NodeKind::Intermediary => None,
        }
    }
}

/// Edge between a site and an intermediary.
///
/// A site sharing several seller accounts of one intermediary still gets a
/// single edge; every originating seller key is kept here.
#[derive(Debug, Clone, Default)]
pub struct GraphEdge {
    pub sellers: BTreeSet<SellerKey>,
}

/// Summary counts of a built graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub n_sites: usize,
    pub n_intermediaries: usize,
    pub n_edges: usize,
    /// edges / (sites x intermediaries), 0 when either side is empty.
    pub density: f64,
}

/// Undirected bipartite graph of sites and the intermediaries of their dark pools.
pub struct BipartiteGraph {
    graph: UnGraph<GraphNode, GraphEdge>,
    sites: BTreeMap<String, NodeIndex>,
    intermediaries: BTreeMap<String, NodeIndex>,
}

impl BipartiteGraph {
    pub fn new() -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            sites: BTreeMap::new(),
            intermediaries: BTreeMap::new(),
        }
    }

    /// Build the graph from the collected sites and the dark-pool map.
    ///
    /// Every successfully fetched site becomes a node, even without pools.
    pub fn build(sites: &[SiteRecord], pools: &DarkPoolMap) -> Self {
        let mut graph = Self::new();
        for site in sites.iter().filter(|s| s.success) {
            graph.add_site(&site.name, site.category);
        }

        for (seller, pool) in pools {
            let intermediary = graph.ensure_intermediary(seller.domain());
            for name in &pool.sites {
                match graph.sites.get(name) {
                    Some(&site) => graph.link(site, intermediary, seller),
                    None => tracing::debug!("pool {seller} names unknown site {name}"),
                }
            }
        }
        graph
    }

    /// Add a site node. Returns the existing index if the name is known.
    pub fn add_site(&mut self, name: &str, category: Category) -> NodeIndex {
        if let Some(&idx) = self.sites.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(GraphNode {
            id: name.to_string(),
            kind: NodeKind::Site(category),
        });
        self.sites.insert(name.to_string(), idx);
        idx
    }

    /// Ensure an intermediary domain exists as a node.
    pub fn ensure_intermediary(&mut self, domain: &str) -> NodeIndex {
        if let Some(&idx) = self.intermediaries.get(domain) {
            return idx;
        }
        let idx = self.graph.add_node(GraphNode {
            id: domain.to_string(),
            kind: NodeKind::Intermediary,
        });
        self.intermediaries.insert(domain.to_string(), idx);
        idx
    }

    /// Connect a site to an intermediary through `seller`, merging repeated pairs.
    pub fn link(&mut self, site: NodeIndex, intermediary: NodeIndex, seller: &SellerKey) {
        match self.graph.find_edge(site, intermediary) {
            Some(edge) => {
                self.graph[edge].sellers.insert(seller.clone());
            }
            None => {
                let mut sellers = BTreeSet::new();
                sellers.insert(seller.clone());
                self.graph.add_edge(site, intermediary, GraphEdge { sellers });
            }
        }
    }

    pub fn summary(&self) -> GraphSummary {
        let n_sites = self.sites.len();
        let n_intermediaries = self.intermediaries.len();
        let n_edges = self.graph.edge_count();
        let density = if n_sites > 0 && n_intermediaries > 0 {
            n_edges as f64 / (n_sites * n_intermediaries) as f64
        } else {
            0.0
        };
        GraphSummary {
            n_sites,
            n_intermediaries,
            n_edges,
            density,
        }
    }

    /// The underlying petgraph graph, for read-only algorithms.
    pub fn inner(&self) -> &UnGraph<GraphNode, GraphEdge> {
        &self.graph
    }

    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    /// Site nodes ordered by name.
    pub fn sites(&self) -> impl Iterator<Item = (&str, NodeIndex)> + '_ {
        self.sites.iter().map(|(name, &idx)| (name.as_str(), idx))
    }

    /// Intermediary nodes ordered by domain.
    pub fn intermediaries(&self) -> impl Iterator<Item = (&str, NodeIndex)> + '_ {
        self.intermediaries
            .iter()
            .map(|(domain, &idx)| (domain.as_str(), idx))
    }

    pub fn site_index(&self, name: &str) -> Option<NodeIndex> {
        self.sites.get(name).copied()
    }

    pub fn intermediary_index(&self, domain: &str) -> Option<NodeIndex> {
        self.intermediaries.get(domain).copied()
    }

    pub fn neighbors(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors(idx)
    }

    pub fn has_edge(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.graph.find_edge(a, b).is_some()
    }

    /// Seller keys carried by the edge between `a` and `b`, if any.
    pub fn edge_sellers(&self, a: NodeIndex, b: NodeIndex) -> Option<&BTreeSet<SellerKey>> {
        self.graph.find_edge(a, b).map(|e| &self.graph[e].sellers)
    }

    /// Number of neighbouring sites of `idx` in `category`.
    pub fn neighbors_in(&self, idx: NodeIndex, category: Category) -> usize {
        self.graph
            .neighbors(idx)
            .filter(|&n| self.graph[n].category() == Some(category))
            .count()
    }

    /// Weighted projection onto the site side.
    ///
    /// Two sites are joined when they share at least one intermediary; the
    /// weight is the number of shared intermediaries. Isolated sites are kept.
    pub fn project_sites(&self) -> SiteProjection {
        let mut projection = SiteProjection::default();
        let mut position: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
        for (name, idx) in self.sites() {
            let NodeKind::Site(category) = self.graph[idx].kind else {
                continue;
            };
            let p = projection.graph.add_node(ProjectedSite {
                name: name.to_string(),
                category,
            });
            position.insert(idx, p);
        }

        let mut weights: BTreeMap<(NodeIndex, NodeIndex), u32> = BTreeMap::new();
        for (_, intermediary) in self.intermediaries() {
            let mut members: Vec<NodeIndex> = self
                .graph
                .neighbors(intermediary)
                .filter_map(|n| position.get(&n).copied())
                .collect();
            members.sort();
            members.dedup();
            for (i, &a) in members.iter().enumerate() {
                for &b in &members[i + 1..] {
                    *weights.entry((a, b)).or_default() += 1;
                }
            }
        }

        for ((a, b), weight) in weights {
            projection.graph.add_edge(a, b, weight);
        }
        projection
    }
}

impl Default for BipartiteGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Site node of the projection graph.
#[derive(Debug, Clone)]
pub struct ProjectedSite {
    pub name: String,
    pub category: Category,
}

/// Site-site graph weighted by shared intermediaries.
///
/// Nodes are indexed in site-name order.
#[derive(Debug, Clone, Default)]
pub struct SiteProjection {
    graph: UnGraph<ProjectedSite, u32>,
}

impl SiteProjection {
    pub fn inner(&self) -> &UnGraph<ProjectedSite, u32> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn site(&self, idx: NodeIndex) -> &ProjectedSite {
        &self.graph[idx]
    }

    pub fn weight(&self, a: NodeIndex, b: NodeIndex) -> Option<u32> {
        self.graph.find_edge(a, b).map(|e| self.graph[e])
    }
}
