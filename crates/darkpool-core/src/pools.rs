use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Category, SellerKey, SiteRecord};

/// Editorial group name mapped to the domains it owns.
pub type EditorialGroups = BTreeMap<String, BTreeSet<String>>;

/// All dark pools of a run keyed by their shared seller.
pub type DarkPoolMap = BTreeMap<SellerKey, DarkPool>;

/// Whether a pool joins sites of one editorial category or several.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum PoolType {
    Homogeneous(Category),
    /// Categories sorted ascending.
    Mixed(Vec<Category>),
}

impl PoolType {
    pub fn classify(categories: &BTreeSet<Category>) -> Self {
        if categories.len() == 1 {
            let only = *categories.iter().next().unwrap_or(&Category::FactChecked);
            PoolType::Homogeneous(only)
        } else {
            PoolType::Mixed(categories.iter().copied().collect())
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolType::Homogeneous(cat) => write!(f, "homogeneo_{cat}"),
            PoolType::Mixed(cats) => {
                let codes: Vec<&str> = cats.iter().map(|c| c.code()).collect();
                write!(f, "misto_{}", codes.join("_"))
            }
        }
    }
}

impl From<PoolType> for String {
    fn from(value: PoolType) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for PoolType {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if let Some(code) = value.strip_prefix("homogeneo_") {
            return Ok(PoolType::Homogeneous(code.parse()?));
        }
        if let Some(codes) = value.strip_prefix("misto_") {
            let cats = codes
                .split('_')
                .map(str::parse)
                .collect::<Result<Vec<Category>, _>>()?;
            return Ok(PoolType::Mixed(cats));
        }
        Err(anyhow::anyhow!("unknown pool type: {value}"))
    }
}

/// A seller key shared by editorially unrelated sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DarkPool {
    /// Participating site names, in configuration order.
    pub sites: Vec<String>,
    pub n_sites: usize,
    /// Distinct categories involved, sorted.
    pub categories: Vec<Category>,
    #[serde(rename = "type")]
    pub pool_type: PoolType,
}

/// One row of the top-pools ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub seller: SellerKey,
    pub n_sites: usize,
    pub categories: Vec<Category>,
    #[serde(rename = "type")]
    pub pool_type: PoolType,
}

/// How the pools split across pool types, plus the largest ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolComposition {
    pub by_type: BTreeMap<String, usize>,
    pub total: usize,
    pub top_sellers: Vec<PoolSummary>,
}

/// Returns true when every domain belongs to one editorial group.
fn within_single_group(domains: &BTreeSet<&str>, groups: &EditorialGroups) -> bool {
    groups
        .values()
        .any(|members| domains.iter().all(|d| members.contains(*d)))
}

/// Find DIRECT sellers shared by two or more sites that are not one publisher.
///
/// Sites whose fetch failed never contribute sellers.
pub fn detect_dark_pools(sites: &[SiteRecord], groups: &EditorialGroups) -> DarkPoolMap {
    let mut seller_to_sites: BTreeMap<&SellerKey, Vec<&SiteRecord>> = BTreeMap::new();
    for site in sites.iter().filter(|s| s.success) {
        for seller in &site.sellers.direct {
            seller_to_sites.entry(seller).or_default().push(site);
        }
    }

    let mut pools = DarkPoolMap::new();
    for (seller, members) in seller_to_sites {
        if members.len() < 2 {
            continue;
        }

        let domains: BTreeSet<&str> = members.iter().map(|s| s.domain.as_str()).collect();
        if within_single_group(&domains, groups) {
            tracing::debug!("seller {seller} shared only within an editorial group");
            continue;
        }

        let categories: BTreeSet<Category> = members.iter().map(|s| s.category).collect();
        pools.insert(
            seller.clone(),
            DarkPool {
                sites: members.iter().map(|s| s.name.clone()).collect(),
                n_sites: members.len(),
                pool_type: PoolType::classify(&categories),
                categories: categories.into_iter().collect(),
            },
        );
    }
    pools
}

/// Count pools per type and rank the largest, ties broken by seller key.
pub fn compose(pools: &DarkPoolMap, top_n: usize) -> PoolComposition {
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for pool in pools.values() {
        *by_type.entry(pool.pool_type.to_string()).or_default() += 1;
    }

    let mut ranked: Vec<(&SellerKey, &DarkPool)> = pools.iter().collect();
    ranked.sort_by(|a, b| b.1.n_sites.cmp(&a.1.n_sites).then_with(|| a.0.cmp(b.0)));

    PoolComposition {
        by_type,
        total: pools.len(),
        top_sellers: ranked
            .into_iter()
            .take(top_n)
            .map(|(seller, pool)| PoolSummary {
                seller: seller.clone(),
                n_sites: pool.n_sites,
                categories: pool.categories.clone(),
                pool_type: pool.pool_type.clone(),
            })
            .collect(),
    }
}
