use colored::Colorize;

use darkpool_core::clustering::StrategyReport;
use darkpool_core::integration::CommunityKind;
use darkpool_core::metrics::TestResult;
use darkpool_core::pipeline::{CollectionReport, NetworkReport};
use darkpool_core::types::Category;

/// Number of shared sellers listed in the collection report.
const TOP_SELLERS: usize = 10;

fn header(out: &mut String, title: &str) {
    out.push_str(&format!("\n{}\n", title.bold()));
    out.push_str(&format!("{}\n", "=".repeat(60)));
}

fn section(out: &mut String, title: &str) {
    out.push_str(&format!("\n{}\n{}\n", title.bold(), "-".repeat(60)));
}

fn format_test(name: &str, test: &TestResult) -> String {
    let verdict = if test.significant {
        "significant".green().bold()
    } else {
        "not significant".yellow()
    };
    format!(
        "  {name}: {} = {:.2}, p = {:.4} ({verdict})\n",
        test.test, test.statistic, test.p
    )
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.4}"))
}

/// Format the executive summary of a collection for terminal output.
pub fn format_collection(report: &CollectionReport) -> String {
    let mut out = String::new();
    let meta = &report.metadata;

    header(&mut out, "Darkpool - Collection Report");
    out.push_str(&format!("Collected at {}\n", meta.timestamp));

    section(&mut out, "Sample");
    let rate = if meta.total_sites > 0 {
        meta.sites_with_adstxt as f64 / meta.total_sites as f64 * 100.0
    } else {
        0.0
    };
    out.push_str(&format!(
        "  Sites with ads.txt: {}/{} ({rate:.1}%)\n",
        meta.sites_with_adstxt, meta.total_sites
    ));
    out.push_str(&format!(
        "  Unique sellers: {} direct, {} reseller\n",
        meta.unique_direct_sellers, meta.unique_reseller_sellers
    ));

    let failed: Vec<_> = report.sites.iter().filter(|s| !s.success).collect();
    if !failed.is_empty() {
        out.push_str(&format!("  {}:\n", "Unavailable".red()));
        for site in failed {
            out.push_str(&format!(
                "    {} ({}): {}\n",
                site.name,
                site.domain,
                site.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    section(&mut out, "Dark Pools");
    let pools = &report.dark_pools;
    out.push_str(&format!("  Total: {}\n", pools.total));
    for (pool_type, count) in &pools.composition.by_type {
        out.push_str(&format!("    {pool_type}: {count}\n"));
    }

    section(&mut out, "Categories");
    for category in Category::ALL {
        let Some(stats) = report.statistics.get(&category) else {
            continue;
        };
        match &stats.detail {
            Some(detail) => out.push_str(&format!(
                "  {category} (n={}): direct mean {:.1} (median {}), exposure {:.1}%, opacity {:.1}%\n",
                stats.n,
                detail.sellers_direct.mean,
                detail.sellers_direct.median,
                detail.exposure.mean,
                detail.opacity.mean,
            )),
            None => out.push_str(&format!("  {category} (n=0): no data\n")),
        }
    }

    section(&mut out, "Significance Tests");
    let mut any = false;
    for (name, test) in report.tests.iter() {
        out.push_str(&format_test(name, test));
        any = true;
    }
    if !any {
        out.push_str("  No test could be run\n");
    }

    section(&mut out, "Top Shared Sellers");
    if pools.composition.top_sellers.is_empty() {
        out.push_str("  None\n");
    }
    for (rank, pool) in pools.composition.top_sellers.iter().take(TOP_SELLERS).enumerate() {
        out.push_str(&format!(
            "  {:>2}. {} - {} sites ({})\n",
            rank + 1,
            pool.seller,
            pool.n_sites,
            pool.pool_type
        ));
    }

    out.push('\n');
    out
}

/// Format the executive summary of the network analyses for terminal output.
pub fn format_network(report: &NetworkReport) -> String {
    let mut out = String::new();

    header(&mut out, "Darkpool - Network Report");
    if let Some(ref digest) = report.source_digest {
        out.push_str(&format!("Source collection sha256 {digest}\n"));
    }

    section(&mut out, "Graph");
    let graph = &report.graph;
    out.push_str(&format!(
        "  Nodes: {} sites + {} intermediaries\n  Edges: {}\n  Density: {:.4}\n",
        graph.n_sites, graph.n_intermediaries, graph.n_edges, graph.density
    ));

    section(&mut out, "Vulnerability");
    if report.vulnerability.top.is_empty() {
        out.push_str("  No site depends on a single intermediary\n");
    }
    for entry in &report.vulnerability.top {
        out.push_str(&format!(
            "  {}: {} FC ({:.1}%), {} MS ({:.1}%)\n",
            entry.intermediary,
            entry.entry.n_vulnerable_fc,
            entry.entry.rate_fc * 100.0,
            entry.entry.n_vulnerable_ms,
            entry.entry.rate_ms * 100.0,
        ));
    }

    section(&mut out, "Strategies");
    match &report.strategies {
        StrategyReport::Clustered {
            clusters,
            independence_test,
        } => {
            for cluster in clusters {
                let categories: Vec<String> = cluster
                    .categories
                    .iter()
                    .map(|(c, n)| format!("{c}={n}"))
                    .collect();
                out.push_str(&format!(
                    "  Cluster {}: {} sites, direct {:.1}, reseller {:.1} [{}]\n",
                    cluster.id,
                    cluster.n_sites,
                    cluster.direct_mean,
                    cluster.reseller_mean,
                    categories.join(", ")
                ));
                if !cluster.sample_sites.is_empty() {
                    out.push_str(&format!("    e.g. {}\n", cluster.sample_sites.join(", ")));
                }
            }
            match independence_test {
                Some(test) => out.push_str(&format_test("independence", test)),
                None => out.push_str("  independence: N/A\n"),
            }
        }
        StrategyReport::InsufficientData {
            error,
            eligible_sites,
            required,
        } => {
            out.push_str(&format!(
                "  {} ({eligible_sites} eligible, {required} required)\n",
                error.yellow()
            ));
        }
    }

    section(&mut out, "Brokers");
    for broker in &report.brokers.top {
        let marker = if broker.is_broker {
            " cross-editorial".red().bold().to_string()
        } else {
            String::new()
        };
        out.push_str(&format!(
            "  {} (BC={:.4}): {} FC, {} MS, {} total{marker}\n",
            broker.intermediary,
            broker.betweenness,
            broker.n_sites_fc,
            broker.n_sites_ms,
            broker.total_sites
        ));
    }
    out.push_str(&format!(
        "  Cross-editorial brokers: {}\n",
        report.brokers.n_cross_editorial
    ));

    section(&mut out, "Integration");
    let integration = &report.integration;
    out.push_str(&format!(
        "  Assortativity: {}\n  Modularity: {}\n  Communities: {}\n",
        optional(integration.assortativity),
        optional(integration.modularity),
        integration.n_communities
    ));
    let mixed = integration
        .communities
        .iter()
        .filter(|c| c.kind == CommunityKind::Mixed)
        .count();
    if integration.n_communities > 0 {
        out.push_str(&format!(
            "    {mixed} mixed, {} pure\n",
            integration.n_communities - mixed
        ));
    }

    out.push('\n');
    out
}
