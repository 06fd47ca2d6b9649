use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use crate::error::AnalysisError;
use crate::types::{Category, SiteDescriptor};

/// Config file name looked up by [`Config::load_or_default`].
pub const CONFIG_FILE: &str = "darkpool.toml";

/// Top-level configuration from `darkpool.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_sites")]
    pub sites: Vec<SiteDescriptor>,
    #[serde(default = "default_editorial_groups")]
    pub editorial_groups: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sites: default_sites(),
            editorial_groups: default_editorial_groups(),
            fetch: FetchConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

/// Settings for the `ads.txt` retrieval step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_timeout_secs() -> u64 {
    15
}
fn default_user_agent() -> String {
    "Mozilla/5.0 Research".to_string()
}
fn default_max_concurrent() -> usize {
    8
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Parameters of the statistical and network analyses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_top_pools")]
    pub top_pools: usize,
    #[serde(default = "default_top_intermediaries")]
    pub top_intermediaries: usize,
    #[serde(default = "default_vulnerability_threshold")]
    pub vulnerability_threshold: f64,
    #[serde(default = "default_clusters")]
    pub clusters: usize,
    #[serde(default = "default_cluster_restarts")]
    pub cluster_restarts: usize,
    #[serde(default = "default_cluster_seed")]
    pub cluster_seed: u64,
    #[serde(default = "default_min_cluster_sites")]
    pub min_cluster_sites: usize,
    #[serde(default = "default_broker_min_neighbors")]
    pub broker_min_neighbors: usize,
    #[serde(default = "default_significance_level")]
    pub significance_level: f64,
    #[serde(default = "default_true")]
    pub community_detection: bool,
}

fn default_top_pools() -> usize {
    20
}
fn default_top_intermediaries() -> usize {
    10
}
fn default_vulnerability_threshold() -> f64 {
    0.5
}
fn default_clusters() -> usize {
    4
}
fn default_cluster_restarts() -> usize {
    100
}
fn default_cluster_seed() -> u64 {
    42
}
fn default_min_cluster_sites() -> usize {
    10
}
fn default_broker_min_neighbors() -> usize {
    2
}
fn default_significance_level() -> f64 {
    0.05
}
fn default_true() -> bool {
    true
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_pools: default_top_pools(),
            top_intermediaries: default_top_intermediaries(),
            vulnerability_threshold: default_vulnerability_threshold(),
            clusters: default_clusters(),
            cluster_restarts: default_cluster_restarts(),
            cluster_seed: default_cluster_seed(),
            min_cluster_sites: default_min_cluster_sites(),
            broker_min_neighbors: default_broker_min_neighbors(),
            significance_level: default_significance_level(),
            community_detection: true,
        }
    }
}

/// Reference sample: Brazilian outlets flagged by fact-checkers, hyperpartisan
/// outlets and mainstream outlets.
const REFERENCE_SITES: &[(&str, &str, Category)] = &[
    ("Jornal da Cidade Online", "jornaldacidadeonline.com.br", Category::FactChecked),
    ("Pensa Brasil", "pensabrasil.com", Category::FactChecked),
    ("Plantão Brasil", "plantaobrasil.net", Category::FactChecked),
    ("Notícias Brasil Online", "noticiasbrasil.net.br", Category::FactChecked),
    ("Folha Política", "folhapolitica.org", Category::FactChecked),
    ("Gazeta Brasil", "gazetabrasil.com.br", Category::FactChecked),
    ("Diário do Brasil", "diariodobrasil.org", Category::FactChecked),
    ("Jornal 21 Brasil", "jornal21brasil.com.br", Category::FactChecked),
    ("Terça Livre", "tercalivre.com.br", Category::FactChecked),
    ("O Detetive", "odetetive.com.br", Category::FactChecked),
    ("Patriota News", "patriotanews.com.br", Category::FactChecked),
    ("Agora Notícias Brasil", "agoranoticias.com", Category::FactChecked),
    ("Senso Incomum", "sensoincomum.org", Category::FactChecked),
    ("Agora Paraná", "agoraparana.com.br", Category::FactChecked),
    ("Conexão Política", "conexaopolitica.com.br", Category::FactChecked),
    ("Ceticismo Político", "ceticismopolitico.com", Category::FactChecked),
    ("Correio do Poder", "correiodopoder.com", Category::FactChecked),
    ("Crítica Política", "criticapolitica.com.br", Category::FactChecked),
    ("Folha do Povo", "folhadopovo.com.br", Category::FactChecked),
    ("Gazeta Social", "gazetasocial.com", Category::FactChecked),
    ("Implicante", "implicante.org", Category::FactChecked),
    ("JornaLivre", "jornalivre.com", Category::FactChecked),
    ("Pleno News", "pleno.news", Category::FactChecked),
    ("Crítica Nacional", "criticanacional.com.br", Category::FactChecked),
    ("Imprensa Viva", "imprensaviva.com", Category::FactChecked),
    ("Pavão Misterioso", "pavaomisterioso.com.br", Category::FactChecked),
    ("República de Curitiba", "republicadecuritiba.net", Category::FactChecked),
    ("Diário Nordeste (fake)", "diario-nordeste.com", Category::FactChecked),
    ("Terra Brasil Notícias", "terrabrasilnoticias.com", Category::Hyperpartisan),
    ("Diário do Poder", "diariodopoder.com.br", Category::Hyperpartisan),
    ("Jovem Pan", "jovempan.com.br", Category::Hyperpartisan),
    ("Revista Oeste", "oeste.com.br", Category::Hyperpartisan),
    ("G1", "g1.globo.com", Category::Mainstream),
    ("Globo.com", "globo.com", Category::Mainstream),
    ("UOL", "uol.com.br", Category::Mainstream),
    ("R7", "r7.com", Category::Mainstream),
    ("CNN Brasil", "cnnbrasil.com.br", Category::Mainstream),
    ("Terra", "terra.com.br", Category::Mainstream),
    ("Metrópoles", "metropoles.com", Category::Mainstream),
    ("Estadão", "estadao.com.br", Category::Mainstream),
    ("Folha de S.Paulo", "folha.uol.com.br", Category::Mainstream),
    ("IG", "ig.com.br", Category::Mainstream),
];

/// Co-owned outlets that may legitimately share a seller account.
const REFERENCE_GROUPS: &[(&str, &[&str])] = &[
    ("Globo", &["g1.globo.com", "globo.com"]),
    ("Folha/UOL", &["folha.uol.com.br", "uol.com.br"]),
];

fn default_sites() -> Vec<SiteDescriptor> {
    REFERENCE_SITES
        .iter()
        .map(|(name, domain, category)| SiteDescriptor {
            name: name.to_string(),
            domain: domain.to_string(),
            category: *category,
        })
        .collect()
}

fn default_editorial_groups() -> BTreeMap<String, BTreeSet<String>> {
    REFERENCE_GROUPS
        .iter()
        .map(|(name, domains)| {
            (
                name.to_string(),
                domains.iter().map(|d| d.to_string()).collect(),
            )
        })
        .collect()
}

impl Config {
    /// Load configuration from a `darkpool.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content).with_context(|| {
            format!(
                "failed to parse '{}'. Run `darkpool init` to create a valid config file",
                path.display()
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `darkpool.toml` in the given directory or any ancestor, or return defaults.
    pub fn load_or_default(dir: &Path) -> Self {
        let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut current = start.as_path();
        loop {
            let config_path = current.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!(
                            "failed to load config from '{}': {e:#}. Using defaults.",
                            config_path.display()
                        );
                        Self::default()
                    }
                };
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Self::default()
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let mut names = HashSet::new();
        let mut domains = HashSet::new();
        for site in &self.sites {
            if site.domain.trim().is_empty() {
                return Err(AnalysisError::InvalidConfig(format!(
                    "site '{}' has an empty domain",
                    site.name
                )));
            }
            if !names.insert(site.name.as_str()) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "duplicate site name '{}'",
                    site.name
                )));
            }
            if !domains.insert(site.domain.trim().to_lowercase()) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "duplicate site domain '{}'",
                    site.domain
                )));
            }
        }

        let a = &self.analysis;
        if a.clusters == 0 {
            return Err(AnalysisError::InvalidConfig(
                "analysis.clusters must be at least 1".to_string(),
            ));
        }
        if a.cluster_restarts == 0 {
            return Err(AnalysisError::InvalidConfig(
                "analysis.cluster_restarts must be at least 1".to_string(),
            ));
        }
        for (field, value) in [
            ("vulnerability_threshold", a.vulnerability_threshold),
            ("significance_level", a.significance_level),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "analysis.{field} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.fetch.max_concurrent == 0 {
            return Err(AnalysisError::InvalidConfig(
                "fetch.max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate default TOML content for `darkpool init`.
    pub fn default_toml() -> String {
        let mut out = String::from(
            r#"# darkpool - ads.txt dark pool investigation
# Categories: "FC" (flagged by fact-checkers), "HP" (hyperpartisan), "MS" (mainstream)

[fetch]
timeout_secs = 15
user_agent = "Mozilla/5.0 Research"
max_concurrent = 8

[analysis]
top_pools = 20
top_intermediaries = 10
# A site is vulnerable to an intermediary above this share of its direct sellers
vulnerability_threshold = 0.5
clusters = 4
cluster_restarts = 100
cluster_seed = 42
min_cluster_sites = 10
broker_min_neighbors = 2
significance_level = 0.05
community_detection = true

# Domains owned by one publisher; sellers shared only inside a group are not pools
[editorial_groups]
"#,
        );
        for (name, domains) in REFERENCE_GROUPS {
            let list: Vec<String> = domains.iter().map(|d| format!("\"{d}\"")).collect();
            let _ = writeln!(out, "\"{name}\" = [{}]", list.join(", "));
        }
        for (name, domain, category) in REFERENCE_SITES {
            let _ = write!(
                out,
                "\n[[sites]]\nname = \"{name}\"\ndomain = \"{domain}\"\ncategory = \"{category}\"\n"
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sites.len(), 42);
        assert_eq!(config.editorial_groups.len(), 2);
        assert_eq!(config.analysis.clusters, 4);
        assert!((config.analysis.vulnerability_threshold - 0.5).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_is_valid() {
        let config: Config = toml::from_str(&Config::default_toml()).unwrap();
        assert_eq!(config.sites, Config::default().sites);
        assert_eq!(config.editorial_groups, Config::default().editorial_groups);
        assert_eq!(config.fetch.timeout_secs, 15);
    }

    #[test]
    fn test_deserialize_config() {
        let toml_str = r#"
[[sites]]
name = "A"
domain = "a.com"
category = "FC"

[[sites]]
name = "B"
domain = "b.com"
category = "MS"

[editorial_groups]
"Group" = ["a.com", "c.com"]

[analysis]
clusters = 3
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites[1].category, Category::Mainstream);
        assert!(config.editorial_groups["Group"].contains("c.com"));
        assert_eq!(config.analysis.clusters, 3);
        assert_eq!(config.analysis.cluster_restarts, 100);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.sites.len(), 42);
        assert_eq!(config.fetch.max_concurrent, 8);
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let mut config = Config::default();
        let dup = config.sites[0].clone();
        config.sites.push(dup);
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_domains() {
        let mut config = Config::default();
        let mut twin = config.sites[0].clone();
        twin.name = "Mirror".to_string();
        twin.domain = twin.domain.to_uppercase();
        config.sites.push(twin);
        match config.validate() {
            Err(AnalysisError::InvalidConfig(msg)) => {
                assert!(msg.contains("duplicate site domain"))
            }
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.analysis.vulnerability_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_finds_file_in_ancestor() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "[[sites]]\nname = \"Only\"\ndomain = \"only.com\"\ncategory = \"HP\"\n",
        )
        .unwrap();
        let nested = tmp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = Config::load_or_default(&nested);
        assert_eq!(config.sites.len(), 1);
        assert_eq!(config.sites[0].name, "Only");
    }
}
