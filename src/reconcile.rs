//! Catalog reconciliation: merge per-(set, number) partials, infer the
//! printing language, drive enrichment, and explode into per-printing
//! records with stable ids.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use anyhow::{bail, Result};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::cache::{DexNameCache, SpeciesNameMap};
use crate::config::{CatalogStrategy, PipelineConfig};
use crate::model::{Card, Lang};
use crate::normalization::{contains_japanese, normalize, slugify};
use crate::source_ops::jpindex::JpIndexProvider;
use crate::source_ops::ptcgapi::PtcgApiProvider;
use crate::source_ops::species::SpeciesProvider;
use crate::source_ops::tcgdex::TcgdexProvider;
use crate::source_ops::{AggMap, Pacer, PartialRecord};

fn japanese_set_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(sv|s|sm|bw|xy)\d{1,3}a$").unwrap())
}

/// Heuristic: Japanese sub-set ids end in a letter suffix on the numbered
/// main-series code (`sv9a`, `s12a`, `sm12a`, ...).
pub fn is_japanese_set_code(set_id: &str) -> bool {
    japanese_set_re().is_match(&set_id.to_lowercase())
}

/// Printing language of a record, when one can be pinned down:
/// 1. sets observed under the Japanese index are `ja`;
/// 2. sets matching the Japanese sub-set pattern are `ja`;
/// 3. anything else stays unspecified and may emit both printings.
pub fn inferred_printing_lang(
    set_id: &str,
    japanese_exclusive: &BTreeSet<String>,
) -> Option<Lang> {
    if japanese_exclusive.contains(set_id) || is_japanese_set_code(set_id) {
        return Some(Lang::Ja);
    }
    None
}

/// Validation outcome with the observed counts, for logging either way.
#[derive(Debug)]
pub struct CatalogCounts {
    pub total: usize,
    pub english: usize,
}

pub fn validate_catalog(cards: &[Card], cfg: &PipelineConfig) -> Result<CatalogCounts, CatalogCounts> {
    let counts = CatalogCounts {
        total: cards.len(),
        english: cards
            .iter()
            .filter(|c| c.printing_lang == Lang::En)
            .count(),
    };
    if counts.total >= cfg.min_catalog_cards && counts.english >= cfg.min_english_cards {
        Ok(counts)
    } else {
        Err(counts)
    }
}

/// Everything the enrichment pass needs to reach the outside world.
pub struct Reconciler<'a> {
    pub tcgdex: &'a TcgdexProvider,
    pub jpindex: &'a JpIndexProvider,
    pub species: &'a SpeciesProvider,
    pub dex_cache: &'a DexNameCache,
    pub species_map: &'a SpeciesNameMap,
    pub enrich_english_pokemon_key: bool,
}

impl Reconciler<'_> {
    /// Enrichment over every aggregated record, in key order. Per record the
    /// sequence is fixed: image backfill first, then language linkage.
    pub async fn enrich(&self, agg: &mut AggMap) {
        let mut detail_pacer = Pacer::detail();
        let mut detail_fetches = 0u64;
        let japanese_exclusive = agg.japanese_exclusive.clone();

        for rec in agg.records.values_mut() {
            let lang = inferred_printing_lang(&rec.set_id, &japanese_exclusive);

            // 1. Image backfill through whichever structured detail id exists.
            if rec.image_large.is_none() {
                if let Some((detail_lang, id)) = rec
                    .detail_id_en
                    .as_deref()
                    .map(|id| (Lang::En, id))
                    .or_else(|| rec.detail_id_ja.as_deref().map(|id| (Lang::Ja, id)))
                {
                    detail_pacer.tick().await;
                    detail_fetches += 1;
                    if let Some(detail) = self.tcgdex.card_detail(detail_lang, id).await {
                        rec.image_large = crate::source_ops::value_str(&detail, "image");
                    }
                }
            }

            // 2. Japanese → English linkage.
            if lang == Some(Lang::Ja) && (rec.name_en.is_none() || rec.pokemon_key.is_none()) {
                self.link_japanese(rec, &mut detail_pacer, &mut detail_fetches)
                    .await;
            }

            // 3. Optional English linkage (expensive, opt-in).
            if self.enrich_english_pokemon_key
                && lang != Some(Lang::Ja)
                && rec.pokemon_key.is_none()
            {
                if let Some(id) = rec.detail_id_en.clone() {
                    detail_pacer.tick().await;
                    detail_fetches += 1;
                    if let Some(detail) = self.tcgdex.card_detail(Lang::En, &id).await {
                        if rec.dex_id.is_none() {
                            rec.dex_id = detail
                                .get("dexId")
                                .and_then(crate::source_ops::value_as_i64);
                        }
                    }
                }
                if let Some(dex_id) = rec.dex_id {
                    if let Some(en) = self.dex_cache.english_name(dex_id, self.species).await {
                        rec.pokemon_key = Some(normalize(&en));
                    }
                }
            }
        }

        info!(detail_fetches, "enrichment pass complete");
    }

    async fn link_japanese(
        &self,
        rec: &mut PartialRecord,
        pacer: &mut Pacer,
        fetches: &mut u64,
    ) {
        // Pull the Japanese card detail when we still need a dex id or a
        // script-form name.
        let needs_name = !rec
            .name_ja
            .as_deref()
            .map(contains_japanese)
            .unwrap_or(false);
        if rec.dex_id.is_none() || needs_name {
            if let Some(id) = rec.detail_id_ja.clone() {
                pacer.tick().await;
                *fetches += 1;
                if let Some(detail) = self.tcgdex.card_detail(Lang::Ja, &id).await {
                    if rec.dex_id.is_none() {
                        rec.dex_id = detail
                            .get("dexId")
                            .and_then(crate::source_ops::value_as_i64);
                    }
                    if needs_name {
                        if let Some(name) =
                            crate::source_ops::value_str(&detail, "name").filter(|n| contains_japanese(n))
                        {
                            rec.name_ja = Some(name);
                        }
                    }
                }
            } else if let Some(url) = rec.detail_url_ja.clone() {
                pacer.tick().await;
                *fetches += 1;
                if let Some(detail) = self.jpindex.card_detail(&url).await {
                    if rec.dex_id.is_none() {
                        rec.dex_id = detail.dex_id;
                    }
                    if needs_name && detail.name_ja.is_some() {
                        rec.name_ja = detail.name_ja;
                    }
                    if rec.image_large.is_none() {
                        rec.image_large = detail.image;
                    }
                }
            }
        }

        if let Some(dex_id) = rec.dex_id {
            if let Some(en) = self.dex_cache.english_name(dex_id, self.species).await {
                if rec.name_en.is_none() {
                    rec.name_en = Some(en.clone());
                }
                rec.pokemon_key = Some(normalize(&en));
                return;
            }
        }
        if let Some(name_ja) = rec.name_ja.clone() {
            if let Some(entry) = self.species_map.lookup(&name_ja).await {
                if rec.name_en.is_none() {
                    rec.name_en = Some(entry.en_name);
                }
                rec.pokemon_key = Some(entry.normalized_key);
                if rec.dex_id.is_none() {
                    rec.dex_id = Some(entry.dex_id);
                }
            } else {
                debug!(set = %rec.set_id, number = %rec.number, "species unresolved for japanese record");
            }
        }
    }
}

/// Explode aggregated records into the final per-printing cards.
pub fn explode(agg: &AggMap) -> Vec<Card> {
    let mut cards = Vec::with_capacity(agg.records.len());
    for rec in agg.records.values() {
        match inferred_printing_lang(&rec.set_id, &agg.japanese_exclusive) {
            Some(Lang::Ja) => {
                // Japanese-exclusive: exactly one `ja` record, even when an
                // English variant name is known.
                let Some(name) = rec.name_ja.clone().or_else(|| rec.name_en.clone()) else {
                    debug!(set = %rec.set_id, number = %rec.number, "nameless record dropped");
                    continue;
                };
                cards.push(build_card(rec, Lang::Ja, name));
            }
            _ => {
                if let Some(name_en) = rec.name_en.clone() {
                    cards.push(build_card(rec, Lang::En, name_en));
                }
                if let Some(name_ja) = rec.name_ja.clone() {
                    cards.push(build_card(rec, Lang::Ja, name_ja));
                }
            }
        }
    }
    cards.sort_by(|a, b| a.id.cmp(&b.id));
    cards
}

fn build_card(rec: &PartialRecord, lang: Lang, name: String) -> Card {
    // The English name anchors the id so the same printing keeps the same
    // id across runs even when the display name is in the printing language.
    let slug_source = rec.name_en.as_deref().unwrap_or(&name);
    let pokemon_key = rec
        .pokemon_key
        .clone()
        .or_else(|| rec.name_en.as_deref().map(normalize));
    Card {
        id: format!(
            "{}-{}-{}-{}",
            rec.set_id,
            rec.number,
            slugify(slug_source),
            lang
        ),
        card_key: Card::make_card_key(&rec.set_id, &rec.number, lang),
        set_id: rec.set_id.clone(),
        set_name: rec.set_name.clone(),
        number: rec.number.clone(),
        number_full: rec.number_full.clone(),
        printing_lang: lang,
        name,
        name_en: rec.name_en.clone(),
        name_ja: rec.name_ja.clone(),
        pokemon_key,
        rarity: rec.rarity.clone(),
        features: if rec.features.is_empty() {
            rec.rarity.clone().map(|r| vec![r])
        } else {
            Some(rec.features.clone())
        },
        image_large: rec.image_large.clone(),
    }
}

/// Full catalog build for the configured strategy. Source-fatal conditions
/// either switch to the defined fallback or abort the phase.
pub async fn build_catalog(
    cfg: &PipelineConfig,
    tcgdex: &TcgdexProvider,
    ptcgapi: &PtcgApiProvider,
    jpindex: &JpIndexProvider,
    species: &SpeciesProvider,
    dex_cache: &DexNameCache,
    species_map: &SpeciesNameMap,
) -> Result<Vec<Card>> {
    let mut agg = match cfg.catalog_strategy {
        CatalogStrategy::Tcgdex => {
            let result = tcgdex.collect(&[Lang::En, Lang::Ja]).await;
            if let Some(fatal) = result.fatal {
                bail!("catalog build aborted: {fatal}");
            }
            result.agg
        }
        CatalogStrategy::Split => {
            let english = ptcgapi.collect(dex_cache, species).await;
            let mut agg = match english.fatal {
                None => english.agg,
                Some(fatal) => {
                    // English primary down: structured English-only fallback.
                    warn!(error = %fatal, "english primary adapter failed; falling back");
                    let fallback = tcgdex.collect(&[Lang::En]).await;
                    if let Some(fb_fatal) = fallback.fatal {
                        bail!("catalog build aborted: {fatal}; fallback: {fb_fatal}");
                    }
                    fallback.agg
                }
            };

            let japanese = jpindex.collect(species_map, tcgdex).await;
            if let Some(fatal) = japanese.fatal {
                bail!("catalog build aborted: {fatal}");
            }
            agg.absorb(japanese.agg);
            agg
        }
    };

    info!(records = agg.len(), "aggregation complete; enriching");
    let reconciler = Reconciler {
        tcgdex,
        jpindex,
        species,
        dex_cache,
        species_map,
        enrich_english_pokemon_key: cfg.enrich_english_pokemon_key,
    };
    reconciler.enrich(&mut agg).await;

    let cards = explode(&agg);
    info!(cards = cards.len(), "catalog exploded");
    Ok(cards)
}
