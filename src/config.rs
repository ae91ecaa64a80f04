//! Pipeline configuration, resolved once from the environment.

use std::path::PathBuf;

use tracing::warn;

use crate::collector::QuerySpec;
use crate::util::env::{env_flag, env_opt, env_parse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogStrategy {
    /// Dual-language structured walk.
    Tcgdex,
    /// English card API plus the Japanese HTML index.
    Split,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub skip_catalog: bool,
    pub catalog_strategy: CatalogStrategy,
    pub enrich_english_pokemon_key: bool,
    pub strict_catalog: bool,
    pub min_catalog_cards: usize,
    pub min_english_cards: usize,
    pub days_window: i64,
    pub pages_per_query: u32,
    pub confidence_threshold: f64,
    pub market_category: u32,
    pub market_source: String,
    pub queries: Vec<QuerySpec>,
    pub tcgdex_base_url: String,
    pub ptcg_api_base_url: String,
    pub ptcg_api_key: Option<String>,
    pub species_api_base_url: String,
    pub jp_index_base_url: String,
    pub market_base_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            skip_catalog: false,
            catalog_strategy: CatalogStrategy::Tcgdex,
            enrich_english_pokemon_key: false,
            strict_catalog: false,
            min_catalog_cards: 12_000,
            min_english_cards: 8_000,
            days_window: 30,
            pages_per_query: 2,
            confidence_threshold: 0.72,
            market_category: 183_454,
            market_source: "ebay".to_string(),
            queries: crate::collector::default_queries(),
            tcgdex_base_url: "https://api.tcgdex.net/v2".to_string(),
            ptcg_api_base_url: "https://api.pokemontcg.io".to_string(),
            ptcg_api_key: None,
            species_api_base_url: "https://pokeapi.co/api/v2".to_string(),
            jp_index_base_url: "https://www.tcgcollector.com".to_string(),
            market_base_url: "https://www.ebay.it".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let catalog_strategy = match env_opt("CATALOG_STRATEGY").as_deref() {
            Some("split") => CatalogStrategy::Split,
            Some("tcgdex") | None => CatalogStrategy::Tcgdex,
            Some(other) => {
                warn!(strategy = %other, "unknown CATALOG_STRATEGY; using tcgdex");
                CatalogStrategy::Tcgdex
            }
        };

        let queries = match env_opt("MARKET_QUERIES") {
            Some(raw) => match serde_json::from_str::<Vec<QuerySpec>>(&raw) {
                Ok(list) if !list.is_empty() => list,
                Ok(_) => defaults.queries.clone(),
                Err(err) => {
                    warn!(error = %err, "MARKET_QUERIES parse failed; using defaults");
                    defaults.queries.clone()
                }
            },
            None => defaults.queries.clone(),
        };

        Self {
            data_dir: env_opt("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            skip_catalog: env_flag("SKIP_CATALOG", false),
            catalog_strategy,
            enrich_english_pokemon_key: env_flag("ENRICH_EN_POKEMON_KEY", false),
            strict_catalog: env_flag("STRICT_CATALOG", false),
            min_catalog_cards: env_parse("MIN_CATALOG_CARDS", defaults.min_catalog_cards),
            min_english_cards: env_parse("MIN_ENGLISH_CARDS", defaults.min_english_cards),
            days_window: env_parse("DAYS_WINDOW", defaults.days_window),
            pages_per_query: env_parse("PAGES_PER_QUERY", defaults.pages_per_query),
            confidence_threshold: env_parse("CONFIDENCE_THRESHOLD", defaults.confidence_threshold),
            market_category: env_parse("MARKET_CATEGORY", defaults.market_category),
            market_source: env_opt("MARKET_SOURCE").unwrap_or(defaults.market_source),
            queries,
            tcgdex_base_url: env_opt("TCGDEX_BASE_URL").unwrap_or(defaults.tcgdex_base_url),
            ptcg_api_base_url: env_opt("PTCG_API_BASE_URL").unwrap_or(defaults.ptcg_api_base_url),
            ptcg_api_key: env_opt("PTCG_API_KEY"),
            species_api_base_url: env_opt("SPECIES_API_BASE_URL")
                .unwrap_or(defaults.species_api_base_url),
            jp_index_base_url: env_opt("JP_INDEX_BASE_URL").unwrap_or(defaults.jp_index_base_url),
            market_base_url: env_opt("MARKET_BASE_URL").unwrap_or(defaults.market_base_url),
        }
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("catalog.json")
    }

    pub fn sales_path(&self) -> PathBuf {
        self.data_dir.join("sales_30d.json")
    }

    pub fn prices_path(&self) -> PathBuf {
        self.data_dir.join("prices.json")
    }

    pub fn meta_path(&self) -> PathBuf {
        self.data_dir.join("meta.json")
    }

    pub fn dex_cache_path(&self) -> PathBuf {
        self.data_dir.join("dex_names.json")
    }

    pub fn species_map_path(&self) -> PathBuf {
        self.data_dir.join("species_ja.json")
    }
}
