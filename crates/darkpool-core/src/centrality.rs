//! Betweenness centrality (Brandes) over undirected, unweighted graphs.

use std::collections::VecDeque;

use petgraph::graph::UnGraph;

/// Normalized betweenness centrality of every node, indexed by node index.
///
/// Dependencies are accumulated over ordered source/target pairs and scaled by
/// 1 / ((n - 1)(n - 2)); graphs with two nodes or fewer are all zero.
pub fn betweenness<N, E>(graph: &UnGraph<N, E>) -> Vec<f64> {
    let n = graph.node_count();
    let mut centrality = vec![0.0; n];
    if n <= 2 {
        return centrality;
    }

    let mut stack: Vec<usize> = Vec::with_capacity(n);
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut distance = vec![-1i64; n];
    let mut delta = vec![0.0f64; n];
    let mut queue = VecDeque::new();

    for source in graph.node_indices() {
        let s = source.index();
        stack.clear();
        for p in predecessors.iter_mut() {
            p.clear();
        }
        sigma.iter_mut().for_each(|v| *v = 0.0);
        distance.iter_mut().for_each(|v| *v = -1);
        delta.iter_mut().for_each(|v| *v = 0.0);

        sigma[s] = 1.0;
        distance[s] = 0;
        queue.push_back(source);

        while let Some(v) = queue.pop_front() {
            let vi = v.index();
            stack.push(vi);
            for w in graph.neighbors(v) {
                let wi = w.index();
                if distance[wi] < 0 {
                    distance[wi] = distance[vi] + 1;
                    queue.push_back(w);
                }
                if distance[wi] == distance[vi] + 1 {
                    sigma[wi] += sigma[vi];
                    predecessors[wi].push(vi);
                }
            }
        }

        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                centrality[w] += delta[w];
            }
        }
    }

    let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
    for value in centrality.iter_mut() {
        *value *= scale;
    }
    centrality
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(n: usize) -> UnGraph<(), ()> {
        let mut graph = UnGraph::new_undirected();
        let nodes: Vec<_> = (0..n).map(|_| graph.add_node(())).collect();
        for pair in nodes.windows(2) {
            graph.add_edge(pair[0], pair[1], ());
        }
        graph
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_path_of_three() {
        let bc = betweenness(&path(3));
        assert!(close(bc[0], 0.0));
        assert!(close(bc[1], 1.0));
        assert!(close(bc[2], 0.0));
    }

    #[test]
    fn test_star_center_carries_all_paths() {
        let mut graph: UnGraph<(), ()> = UnGraph::new_undirected();
        let center = graph.add_node(());
        for _ in 0..4 {
            let leaf = graph.add_node(());
            graph.add_edge(center, leaf, ());
        }
        let bc = betweenness(&graph);
        assert!(close(bc[center.index()], 1.0));
        assert!(bc[1..].iter().all(|&v| close(v, 0.0)));
    }

    #[test]
    fn test_path_of_four() {
        // Inner nodes each lie on 2 of the 3 unordered pairs not involving them.
        let bc = betweenness(&path(4));
        assert!(close(bc[1], 2.0 / 3.0));
        assert!(close(bc[2], 2.0 / 3.0));
    }

    #[test]
    fn test_split_shortest_paths() {
        // Square a-b-c-d-a: each node carries half of the single opposite pair.
        let mut graph: UnGraph<(), ()> = UnGraph::new_undirected();
        let n: Vec<_> = (0..4).map(|_| graph.add_node(())).collect();
        for i in 0..4 {
            graph.add_edge(n[i], n[(i + 1) % 4], ());
        }
        let bc = betweenness(&graph);
        for value in bc {
            assert!(close(value, 0.5 / 3.0));
        }
    }

    #[test]
    fn test_tiny_graphs_are_zero() {
        assert_eq!(betweenness(&path(2)), vec![0.0, 0.0]);
        assert!(betweenness(&path(0)).is_empty());
    }
}
