use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Editorial category of a monitored site.
/// Ordered by code so that sorted category lists read "FC", "HP", "MS".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Outlet repeatedly flagged by fact-checkers.
    #[serde(rename = "FC")]
    FactChecked,
    #[serde(rename = "HP")]
    Hyperpartisan,
    #[serde(rename = "MS")]
    Mainstream,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::FactChecked,
        Category::Hyperpartisan,
        Category::Mainstream,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Category::FactChecked => "FC",
            Category::Hyperpartisan => "HP",
            Category::Mainstream => "MS",
        }
    }

    /// Column position in per-category tables.
    pub fn index(&self) -> usize {
        match self {
            Category::FactChecked => 0,
            Category::Hyperpartisan => 1,
            Category::Mainstream => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FC" => Ok(Category::FactChecked),
            "HP" => Ok(Category::Hyperpartisan),
            "MS" => Ok(Category::Mainstream),
            _ => Err(anyhow::anyhow!("unknown category: {s}")),
        }
    }
}

/// Relationship declared on an `ads.txt` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Relationship {
    Direct,
    Reseller,
}

impl Relationship {
    /// Parse an already upper-cased relationship token. Anything else is `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "DIRECT" => Some(Relationship::Direct),
            "RESELLER" => Some(Relationship::Reseller),
            _ => None,
        }
    }
}

/// Canonical cross-site seller identifier: "domain#publisher_id"
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SellerKey(pub String);

impl SellerKey {
    pub fn new(domain: &str, publisher_id: &str) -> Self {
        Self(format!("{domain}#{publisher_id}"))
    }

    /// The ad-system (intermediary) domain, i.e. everything before the first `#`.
    pub fn domain(&self) -> &str {
        self.0.split('#').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for SellerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A configured site to investigate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDescriptor {
    pub name: String,
    pub domain: String,
    pub category: Category,
}

/// De-duplicated seller keys of one site, split by relationship.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerSets {
    pub direct: BTreeSet<SellerKey>,
    pub reseller: BTreeSet<SellerKey>,
    /// Accepted DIRECT lines before de-duplication.
    #[serde(default)]
    pub direct_raw: usize,
    /// Accepted RESELLER lines before de-duplication.
    #[serde(default)]
    pub reseller_raw: usize,
}

/// Result of one best-effort `ads.txt` retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub domain: String,
    pub success: bool,
    pub lines: Vec<String>,
    pub error: String,
}

impl FetchOutcome {
    pub fn ok(domain: &str, lines: Vec<String>) -> Self {
        Self {
            domain: domain.to_string(),
            success: true,
            lines,
            error: String::new(),
        }
    }

    pub fn failed(domain: &str, error: impl Into<String>) -> Self {
        Self {
            domain: domain.to_string(),
            success: false,
            lines: Vec::new(),
            error: error.into(),
        }
    }
}

/// Derived per-site metrics, attached once pools are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteMetrics {
    pub n_direct: usize,
    pub n_reseller: usize,
    /// Percentage of direct sellers that sit in at least one dark pool.
    pub exposure: f64,
    /// Percentage of all seller relationships that are RESELLER.
    pub opacity: f64,
    pub n_pools: usize,
}

/// A site as recorded by the collection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub name: String,
    pub domain: String,
    pub category: Category,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub sellers: SellerSets,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SiteMetrics>,
}

impl SiteRecord {
    /// Number of DIRECT lines the site declared, used as its total direct count.
    pub fn n_direct_raw(&self) -> usize {
        self.sellers.direct_raw
    }
}
