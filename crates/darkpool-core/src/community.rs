//! Louvain community detection and modularity on the site projection.
//!
//! Nodes are visited in index order and neighbouring communities in ascending
//! id, so a partition is fully reproducible.

use std::collections::BTreeMap;

use petgraph::visit::EdgeRef;

use crate::graph::SiteProjection;

/// Passes stop once modularity improves by less than this.
const MIN_GAIN: f64 = 1e-7;

const UNASSIGNED: usize = usize::MAX;

/// A partition of the projection nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Community id per projection node index, numbered by first member.
    pub communities: Vec<usize>,
    pub modularity: f64,
}

impl Partition {
    pub fn n_communities(&self) -> usize {
        self.communities.iter().max().map_or(0, |m| m + 1)
    }
}

/// Weighted undirected graph with self-loops, as aggregated between levels.
#[derive(Debug, Clone)]
struct WeightedGraph {
    adjacency: Vec<BTreeMap<usize, f64>>,
    loops: Vec<f64>,
}

impl WeightedGraph {
    fn from_projection(projection: &SiteProjection) -> Self {
        let n = projection.node_count();
        let mut adjacency = vec![BTreeMap::new(); n];
        for edge in projection.inner().edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            let w = f64::from(*edge.weight());
            *adjacency[a].entry(b).or_insert(0.0) += w;
            *adjacency[b].entry(a).or_insert(0.0) += w;
        }
        Self {
            adjacency,
            loops: vec![0.0; n],
        }
    }

    fn len(&self) -> usize {
        self.adjacency.len()
    }

    /// Sum of edge weights, each self-loop counted once.
    fn total_weight(&self) -> f64 {
        let pairs: f64 = self
            .adjacency
            .iter()
            .map(|n| n.values().sum::<f64>())
            .sum();
        pairs / 2.0 + self.loops.iter().sum::<f64>()
    }

    fn degree(&self, node: usize) -> f64 {
        self.adjacency[node].values().sum::<f64>() + 2.0 * self.loops[node]
    }

    /// Collapse each community into a single node.
    fn induce(&self, partition: &[usize], n_communities: usize) -> Self {
        let mut adjacency = vec![BTreeMap::new(); n_communities];
        let mut loops = vec![0.0; n_communities];
        for (node, neighbours) in self.adjacency.iter().enumerate() {
            let c = partition[node];
            loops[c] += self.loops[node];
            for (&other, &w) in neighbours {
                if other < node {
                    continue;
                }
                let d = partition[other];
                if c == d {
                    loops[c] += w;
                } else {
                    *adjacency[c].entry(d).or_insert(0.0) += w;
                    *adjacency[d].entry(c).or_insert(0.0) += w;
                }
            }
        }
        Self { adjacency, loops }
    }
}

/// Running totals of one Louvain level.
struct Status {
    node_to_community: Vec<usize>,
    total_weight: f64,
    /// Total degree per community.
    degrees: Vec<f64>,
    /// Internal edge weight per community.
    internals: Vec<f64>,
    node_degrees: Vec<f64>,
    loops: Vec<f64>,
}

impl Status {
    fn new(graph: &WeightedGraph) -> Self {
        let n = graph.len();
        let node_degrees: Vec<f64> = (0..n).map(|i| graph.degree(i)).collect();
        Self {
            node_to_community: (0..n).collect(),
            total_weight: graph.total_weight(),
            degrees: node_degrees.clone(),
            internals: graph.loops.clone(),
            node_degrees,
            loops: graph.loops.clone(),
        }
    }

    fn modularity(&self) -> f64 {
        let links = self.total_weight;
        if links <= 0.0 {
            return 0.0;
        }
        self.internals
            .iter()
            .zip(&self.degrees)
            .map(|(inside, degree)| inside / links - (degree / (2.0 * links)).powi(2))
            .sum()
    }

    /// Weight from `node` to each neighbouring community, self-loops excluded.
    fn neighbour_communities(&self, graph: &WeightedGraph, node: usize) -> BTreeMap<usize, f64> {
        let mut weights = BTreeMap::new();
        for (&other, &w) in &graph.adjacency[node] {
            if other != node {
                *weights.entry(self.node_to_community[other]).or_insert(0.0) += w;
            }
        }
        weights
    }

    fn remove(&mut self, node: usize, community: usize, weight: f64) {
        self.degrees[community] -= self.node_degrees[node];
        self.internals[community] -= weight + self.loops[node];
        self.node_to_community[node] = UNASSIGNED;
    }

    fn insert(&mut self, node: usize, community: usize, weight: f64) {
        self.node_to_community[node] = community;
        self.degrees[community] += self.node_degrees[node];
        self.internals[community] += weight + self.loops[node];
    }

    /// Move single nodes between communities until modularity stops improving.
    fn one_level(&mut self, graph: &WeightedGraph) {
        let mut current = self.modularity();
        loop {
            let mut modified = false;
            for node in 0..graph.len() {
                let own = self.node_to_community[node];
                let share = self.node_degrees[node] / (2.0 * self.total_weight);
                let neighbours = self.neighbour_communities(graph, node);
                let own_weight = neighbours.get(&own).copied().unwrap_or(0.0);
                let remove_cost =
                    -own_weight + (self.degrees[own] - self.node_degrees[node]) * share;
                self.remove(node, own, own_weight);

                let mut best = own;
                let mut best_gain = 0.0;
                for (&community, &weight) in &neighbours {
                    let gain = remove_cost + weight - self.degrees[community] * share;
                    if gain > best_gain {
                        best_gain = gain;
                        best = community;
                    }
                }
                self.insert(node, best, neighbours.get(&best).copied().unwrap_or(0.0));
                if best != own {
                    modified = true;
                }
            }

            let updated = self.modularity();
            if !modified || updated - current < MIN_GAIN {
                break;
            }
            current = updated;
        }
    }

    /// Community ids renumbered 0.. in order of their first node.
    fn renumbered(&self) -> (Vec<usize>, usize) {
        let mut mapping: BTreeMap<usize, usize> = BTreeMap::new();
        let mut result = Vec::with_capacity(self.node_to_community.len());
        for &c in &self.node_to_community {
            let next = mapping.len();
            result.push(*mapping.entry(c).or_insert(next));
        }
        (result, mapping.len())
    }
}

/// Modularity of `communities` on the projection, `None` without edges.
pub fn modularity(projection: &SiteProjection, communities: &[usize]) -> Option<f64> {
    let graph = WeightedGraph::from_projection(projection);
    let links = graph.total_weight();
    if links <= 0.0 {
        return None;
    }
    let n_communities = communities.iter().max().map_or(0, |m| m + 1);
    let mut inside = vec![0.0; n_communities];
    let mut degree = vec![0.0; n_communities];
    for (node, neighbours) in graph.adjacency.iter().enumerate() {
        let c = communities[node];
        degree[c] += graph.degree(node);
        for (&other, &w) in neighbours {
            if communities[other] == c {
                inside[c] += w / 2.0;
            }
        }
    }
    Some(
        inside
            .iter()
            .zip(&degree)
            .map(|(i, d)| i / links - (d / (2.0 * links)).powi(2))
            .sum(),
    )
}

/// Best partition found by the Louvain method, `None` if the projection has no edges.
pub fn louvain(projection: &SiteProjection) -> Option<Partition> {
    if projection.edge_count() == 0 {
        return None;
    }

    let mut graph = WeightedGraph::from_projection(projection);
    let mut status = Status::new(&graph);
    status.one_level(&graph);
    let mut best_modularity = status.modularity();
    let (mut assignment, mut n_communities) = status.renumbered();

    loop {
        graph = graph.induce(&status.renumbered().0, n_communities);
        status = Status::new(&graph);
        status.one_level(&graph);
        let updated = status.modularity();
        if updated - best_modularity < MIN_GAIN {
            break;
        }
        best_modularity = updated;

        let (level, count) = status.renumbered();
        for community in assignment.iter_mut() {
            *community = level[*community];
        }
        n_communities = count;
    }

    let modularity = modularity(projection, &assignment)?;
    let partition = Partition {
        communities: assignment,
        modularity,
    };
    tracing::debug!(
        "louvain found {} communities, Q = {modularity:.4}",
        partition.n_communities()
    );
    Some(partition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BipartiteGraph;
    use crate::pools::{DarkPool, DarkPoolMap, PoolType};
    use crate::types::{Category, SellerKey, SellerSets, SiteRecord};

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

    /// Two triangles of sites joined by one weak link.
    fn two_cliques() -> SiteProjection {
        let names = ["A", "B", "C", "D", "E", "F"];
        let sites: Vec<SiteRecord> = names
            .iter()
            .map(|n| make_site(n, Category::Mainstream))
            .collect();
        let mut pools = DarkPoolMap::new();
        add_pool(&mut pools, "left1.com#1", "A,B,C");
        add_pool(&mut pools, "left2.com#1", "A,B,C");
        add_pool(&mut pools, "right1.com#1", "D,E,F");
        add_pool(&mut pools, "right2.com#1", "D,E,F");
        add_pool(&mut pools, "bridge.com#1", "C,D");
        BipartiteGraph::build(&sites, &pools).project_sites()
    }

    #[test]
    fn test_two_cliques_split() {
        let partition = louvain(&two_cliques()).unwrap();
        assert_eq!(partition.communities, vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(partition.n_communities(), 2);

        // m = 13; each side has internal weight 6 and degree 13.
        let expected = 2.0 * (6.0 / 13.0 - 0.25);
        assert!((partition.modularity - expected).abs() < 1e-9);
    }

    #[test]
    fn test_no_edges_has_no_partition() {
        let sites = vec![
            make_site("A", Category::Mainstream),
            make_site("B", Category::FactChecked),
        ];
        let projection = BipartiteGraph::build(&sites, &DarkPoolMap::new()).project_sites();
        assert!(louvain(&projection).is_none());
        assert!(modularity(&projection, &[0, 1]).is_none());
    }

    #[test]
    fn test_single_community_has_zero_modularity() {
        let projection = two_cliques();
        let q = modularity(&projection, &[0; 6]).unwrap();
        assert!(q.abs() < 1e-12);
    }

    #[test]
    fn test_isolated_site_forms_own_community() {
        let sites = vec![
            make_site("A", Category::Mainstream),
            make_site("B", Category::Mainstream),
            make_site("Z", Category::FactChecked),
        ];
        let mut pools = DarkPoolMap::new();
        add_pool(&mut pools, "x.com#1", "A,B");
        let projection = BipartiteGraph::build(&sites, &pools).project_sites();
        let partition = louvain(&projection).unwrap();
        assert_eq!(partition.communities, vec![0, 0, 1]);
    }
}
