use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::graph::BipartiteGraph;
use crate::types::{Category, SiteRecord};

/// Sites that would lose most of their direct sellers if one intermediary left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityEntry {
    pub n_vulnerable_fc: usize,
    pub n_vulnerable_ms: usize,
    /// Share of all FC sites in the graph that are vulnerable.
    pub rate_fc: f64,
    /// Share of all MS sites in the graph that are vulnerable.
    pub rate_ms: f64,
}

impl VulnerabilityEntry {
    pub fn score(&self) -> usize {
        self.n_vulnerable_fc + self.n_vulnerable_ms
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedVulnerability {
    pub intermediary: String,
    #[serde(flatten)]
    pub entry: VulnerabilityEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityReport {
    /// Every intermediary with at least one vulnerable FC or MS site.
    pub complete: BTreeMap<String, VulnerabilityEntry>,
    pub top: Vec<RankedVulnerability>,
}

fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Rank intermediaries by how many FC and MS sites depend on them.
///
/// An edge stands for exactly one seller relationship, compared against the
/// site's declared DIRECT line count; sites declaring none are skipped. A site
/// is vulnerable when that share exceeds `threshold`.
pub fn analyze_vulnerability(
    graph: &BipartiteGraph,
    sites: &[SiteRecord],
    threshold: f64,
    top_n: usize,
) -> VulnerabilityReport {
    let direct_raw: HashMap<&str, usize> = sites
        .iter()
        .map(|s| (s.name.as_str(), s.n_direct_raw()))
        .collect();

    let mut totals = [0usize; 3];
    for (_, idx) in graph.sites() {
        if let Some(category) = graph.node(idx).category() {
            totals[category.index()] += 1;
        }
    }

    let mut complete = BTreeMap::new();
    for (domain, intermediary) in graph.intermediaries() {
        let mut vulnerable = [0usize; 3];
        for site in graph.neighbors(intermediary) {
            let node = graph.node(site);
            let Some(category) = node.category() else {
                continue;
            };
            let total = direct_raw.get(node.id.as_str()).copied().unwrap_or(0);
            if total == 0 {
                continue;
            }
            let loss = 1.0 / total as f64;
            if loss > threshold {
                vulnerable[category.index()] += 1;
            }
        }

        let fc = vulnerable[Category::FactChecked.index()];
        let ms = vulnerable[Category::Mainstream.index()];
        if fc == 0 && ms == 0 {
            continue;
        }
        complete.insert(
            domain.to_string(),
            VulnerabilityEntry {
                n_vulnerable_fc: fc,
                n_vulnerable_ms: ms,
                rate_fc: rate(fc, totals[Category::FactChecked.index()]),
                rate_ms: rate(ms, totals[Category::Mainstream.index()]),
            },
        );
    }

    let mut ranked: Vec<(&String, &VulnerabilityEntry)> = complete.iter().collect();
    ranked.sort_by(|a, b| b.1.score().cmp(&a.1.score()).then_with(|| a.0.cmp(b.0)));
    let top = ranked
        .into_iter()
        .take(top_n)
        .map(|(domain, entry)| RankedVulnerability {
            intermediary: domain.clone(),
            entry: entry.clone(),
        })
        .collect();

    tracing::debug!("{} intermediaries with vulnerable sites", complete.len());
    VulnerabilityReport { complete, top }
}
