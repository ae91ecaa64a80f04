//! Pipeline driver: one run end to end.
//!
//! Phase order is fixed: catalog build (or reuse) → validate → persist →
//! sales load+prune → collect → sales persist → aggregate → prices and
//! metadata persist. Catalog failures under non-strict mode fall back to
//! the previously persisted catalog and the run continues.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use fetch_client::{FetchClient, FetchConfig};
use tracing::{info, warn};

use crate::aggregate::aggregate;
use crate::cache::{DexNameCache, SpeciesNameMap};
use crate::collector::{CollectorStats, MarketCollector};
use crate::config::PipelineConfig;
use crate::matching::CatalogIndex;
use crate::model::{Card, CatalogFile, Lang, MetaFile};
use crate::reconcile::{build_catalog, validate_catalog};
use crate::source_ops::jpindex::JpIndexProvider;
use crate::source_ops::ptcgapi::PtcgApiProvider;
use crate::source_ops::species::SpeciesProvider;
use crate::source_ops::tcgdex::TcgdexProvider;
use crate::store;
use crate::window::SalesWindow;

#[derive(Debug, Default)]
pub struct RunSummary {
    pub catalog_reused: bool,
    pub cards: usize,
    pub english_cards: usize,
    pub sales_pruned: usize,
    pub sales_added: usize,
    pub sales_deduplicated: usize,
    pub sales_dangling_dropped: usize,
    pub window_size: usize,
    pub priced_cards: usize,
    pub collector: CollectorStats,
}

pub async fn run_pipeline(cfg: &PipelineConfig) -> Result<RunSummary> {
    let client = FetchClient::new(FetchConfig::default());
    let tcgdex = TcgdexProvider::new(client.clone(), &cfg.tcgdex_base_url);
    let ptcgapi = PtcgApiProvider::new(
        client.clone(),
        &cfg.ptcg_api_base_url,
        cfg.ptcg_api_key.clone(),
    );
    let jpindex = JpIndexProvider::new(client.clone(), &cfg.jp_index_base_url);
    let species = SpeciesProvider::new(client.clone(), &cfg.species_api_base_url);
    let dex_cache = DexNameCache::load(cfg.dex_cache_path());
    let species_map = SpeciesNameMap::load(cfg.species_map_path());

    let mut summary = RunSummary::default();

    let cards = catalog_phase(
        cfg,
        &tcgdex,
        &ptcgapi,
        &jpindex,
        &species,
        &dex_cache,
        &species_map,
        &mut summary,
    )
    .await?;
    check_card_invariants(&cards)?;
    summary.cards = cards.len();
    summary.english_cards = cards
        .iter()
        .filter(|c| c.printing_lang == Lang::En)
        .count();

    // Sales: load the previous window, age it, collect, merge, persist.
    let now = Utc::now();
    let mut window = SalesWindow::load(&cfg.sales_path());
    summary.sales_pruned = window.prune(now, cfg.days_window);

    let index = CatalogIndex::new(&cards);
    let collector = MarketCollector::new(&client, cfg);
    let (new_sales, stats) = collector.collect(&index).await;
    summary.collector = stats;

    let (added, duplicates) = window.merge(new_sales);
    summary.sales_added = added;
    summary.sales_deduplicated = duplicates;
    let known_ids: HashSet<&str> = cards.iter().map(|c| c.id.as_str()).collect();
    summary.sales_dangling_dropped = window.prune_unknown_cards(&known_ids);
    summary.window_size = window.len();
    window
        .persist(&cfg.sales_path())
        .context("persist sales window")?;

    // Aggregate and stamp.
    let prices = aggregate(window.sales());
    summary.priced_cards = prices.by_card.len();
    store::write_json(&cfg.prices_path(), &prices).context("persist prices")?;
    store::write_json(&cfg.meta_path(), &MetaFile { updated_at: now }).context("persist meta")?;

    info!(
        cards = summary.cards,
        english = summary.english_cards,
        catalog_reused = summary.catalog_reused,
        sales_added = summary.sales_added,
        sales_deduplicated = summary.sales_deduplicated,
        window = summary.window_size,
        priced_cards = summary.priced_cards,
        "run complete"
    );
    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
async fn catalog_phase(
    cfg: &PipelineConfig,
    tcgdex: &TcgdexProvider,
    ptcgapi: &PtcgApiProvider,
    jpindex: &JpIndexProvider,
    species: &SpeciesProvider,
    dex_cache: &DexNameCache,
    species_map: &SpeciesNameMap,
    summary: &mut RunSummary,
) -> Result<Vec<Card>> {
    let previous: Option<CatalogFile> =
        store::read_json(&cfg.catalog_path()).filter(|f: &CatalogFile| !f.cards.is_empty());

    if cfg.skip_catalog {
        if let Some(prev) = previous.as_ref() {
            info!(cards = prev.cards.len(), "skip-mode: reusing persisted catalog");
            summary.catalog_reused = true;
            return Ok(prev.cards.clone());
        }
        info!("skip-mode requested but no usable persisted catalog; building");
    }

    // The Japanese-name map seeds translation before any walk needs it.
    if let Err(err) = species_map.ensure_built(species).await {
        warn!(error = %err, "species map build failed; proceeding with partial coverage");
    }

    let built = build_catalog(cfg, tcgdex, ptcgapi, jpindex, species, dex_cache, species_map).await;

    match built {
        Ok(cards) => match validate_catalog(&cards, cfg) {
            Ok(counts) => {
                info!(total = counts.total, english = counts.english, "catalog validated");
                store::write_json(&cfg.catalog_path(), &CatalogFile { cards: cards.clone() })
                    .context("persist catalog")?;
                Ok(cards)
            }
            Err(counts) => {
                if cfg.strict_catalog {
                    bail!(
                        "catalog below thresholds: {} cards ({} english), need {}/{}",
                        counts.total,
                        counts.english,
                        cfg.min_catalog_cards,
                        cfg.min_english_cards
                    );
                }
                warn!(
                    total = counts.total,
                    english = counts.english,
                    "catalog below thresholds; retaining previous catalog"
                );
                match previous {
                    Some(prev) => {
                        summary.catalog_reused = true;
                        Ok(prev.cards)
                    }
                    None => {
                        // No previous catalog on disk to retain.
                        store::write_json(
                            &cfg.catalog_path(),
                            &CatalogFile { cards: cards.clone() },
                        )
                        .context("persist catalog")?;
                        Ok(cards)
                    }
                }
            }
        },
        Err(err) => {
            if cfg.strict_catalog {
                return Err(err);
            }
            match previous {
                Some(prev) => {
                    warn!(error = %err, "catalog build failed; retaining previous catalog");
                    summary.catalog_reused = true;
                    Ok(prev.cards)
                }
                None => Err(err.context("catalog build failed with no previous catalog to retain")),
            }
        }
    }
}

/// Programmer-invariant guard over the final catalog: identity fields
/// non-empty and ids injective. Violations abort with a diagnostic.
fn check_card_invariants(cards: &[Card]) -> Result<()> {
    let mut ids = HashSet::with_capacity(cards.len());
    for card in cards {
        if card.set_id.is_empty()
            || card.number.is_empty()
            || card.name.is_empty()
        {
            bail!(
                "card invariant violated: empty identity field on {:?}/{:?}",
                card.set_id,
                card.number
            );
        }
        if !ids.insert(card.id.as_str()) {
            bail!("card invariant violated: duplicate id {}", card.id);
        }
    }
    Ok(())
}
