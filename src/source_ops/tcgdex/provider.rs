//! Dual-language structured catalog adapter.
//!
//! Walks `/{lang}/sets` then `/{lang}/sets/{id}` for `en` and `ja`,
//! accumulating one partial record per (set, local number). A set observed
//! under `ja` marks its id as a Japanese-exclusive release. Sets belonging
//! to the pocket-edition sub-series are skipped wholesale.
//!
//! The same provider also serves the reconciler's enrichment fetches
//! (`/{lang}/cards/{id}`) and the Japanese index adapter's bulk per-set
//! image maps.

use std::collections::BTreeMap;

use fetch_client::FetchClient;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::model::Lang;
use crate::source_ops::{value_as_i64, value_str, AggMap, Pacer, SourceResult};

const EXCLUDED_SERIES: [&str; 1] = ["tcgp"];

#[derive(Clone)]
pub struct TcgdexProvider {
    client: FetchClient,
    base_url: String,
}

impl TcgdexProvider {
    pub fn new(client: FetchClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Brief set listing for one language.
    pub async fn list_sets(&self, lang: Lang) -> Option<Vec<Value>> {
        let url = format!("{}/{}/sets", self.base_url, lang);
        let v = self.client.get_json_opt(&url, &[]).await?;
        v.as_array().cloned()
    }

    /// Full set payload with its nested `cards[]`.
    pub async fn set_detail(&self, lang: Lang, set_id: &str) -> Option<Value> {
        let url = format!("{}/{}/sets/{}", self.base_url, lang, set_id);
        self.client.get_json_opt(&url, &[]).await
    }

    /// One card's detail payload.
    pub async fn card_detail(&self, lang: Lang, card_id: &str) -> Option<Value> {
        let url = format!("{}/{}/cards/{}", self.base_url, lang, card_id);
        self.client.get_json_opt(&url, &[]).await
    }

    /// Bulk per-set image map (local number → image URL) for one Japanese
    /// set, used as the preferred image source for HTML-index rows.
    pub async fn set_image_map(&self, set_id: &str) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let Some(detail) = self.set_detail(Lang::Ja, set_id).await else {
            return out;
        };
        if let Some(cards) = detail.get("cards").and_then(|c| c.as_array()) {
            for card in cards {
                let number = value_str(card, "localId").or_else(|| value_str(card, "number"));
                let image = value_str(card, "image");
                if let (Some(number), Some(image)) = (number, image) {
                    out.insert(number, image);
                }
            }
        }
        out
    }

    /// Walk the requested languages into an aggregation map. The result is
    /// fatal only when not a single set could be listed.
    pub async fn collect(&self, langs: &[Lang]) -> SourceResult {
        let mut agg = AggMap::default();
        let mut listed_sets = 0usize;
        let mut pacer = Pacer::bulk();

        for &lang in langs {
            let Some(sets) = self.list_sets(lang).await else {
                warn!(lang = %lang, "set listing unavailable");
                continue;
            };
            info!(lang = %lang, sets = sets.len(), "walking sets");
            listed_sets += sets.len();

            for set_row in sets {
                let Some(set_id) = value_str(&set_row, "id") else {
                    continue;
                };
                if is_excluded_set(&set_row) {
                    debug!(set = %set_id, "skipping excluded sub-series");
                    continue;
                }

                pacer.tick().await;
                let Some(detail) = self.set_detail(lang, &set_id).await else {
                    debug!(lang = %lang, set = %set_id, "set detail missing; skipped");
                    continue;
                };
                if is_excluded_set(&detail) {
                    debug!(set = %set_id, "skipping excluded sub-series");
                    continue;
                }

                if lang == Lang::Ja {
                    agg.japanese_exclusive.insert(set_id.clone());
                }
                self.fold_set(&mut agg, lang, &set_id, &detail);
            }
        }

        let fatal = if listed_sets == 0 {
            Some("structured catalog source listed no sets".to_string())
        } else {
            None
        };
        SourceResult { agg, fatal }
    }

    fn fold_set(&self, agg: &mut AggMap, lang: Lang, set_id: &str, detail: &Value) {
        let set_name = value_str(detail, "name").unwrap_or_else(|| set_id.to_string());
        let printed_total = detail
            .get("cardCount")
            .map(|c| {
                c.get("official")
                    .and_then(value_as_i64)
                    .or_else(|| c.get("total").and_then(value_as_i64))
            })
            .unwrap_or(None);

        let Some(cards) = detail.get("cards").and_then(|c| c.as_array()) else {
            return;
        };
        for card in cards {
            let Some(number) = value_str(card, "localId").or_else(|| value_str(card, "number"))
            else {
                continue;
            };
            let name = value_str(card, "name");
            let card_id = value_str(card, "id");
            let image = value_str(card, "image");
            let rarity = value_str(card, "rarity");
            let dex_id = card.get("dexId").and_then(value_as_i64);

            let rec = agg.entry(set_id, &set_name, &number);
            match lang {
                Lang::En => {
                    crate::source_ops::fill(&mut rec.name_en, name);
                    crate::source_ops::fill(&mut rec.detail_id_en, card_id);
                    rec.from_en = true;
                }
                Lang::Ja => {
                    crate::source_ops::fill(&mut rec.name_ja, name);
                    crate::source_ops::fill(&mut rec.detail_id_ja, card_id);
                    rec.from_ja = true;
                }
            }
            crate::source_ops::fill(&mut rec.image_large, image);
            crate::source_ops::fill(&mut rec.dex_id, dex_id);
            if rec.number_full.is_none() {
                if let Some(total) = printed_total {
                    rec.number_full = Some(format!("{}/{}", number, total));
                }
            }
            if let Some(rarity) = rarity {
                if rec.features.is_empty() {
                    rec.features.push(rarity.clone());
                }
                crate::source_ops::fill(&mut rec.rarity, Some(rarity));
            }
        }
    }
}

/// Pocket-edition sub-series are out of catalog scope.
fn is_excluded_set(set_row: &Value) -> bool {
    let serie_id = set_row
        .get("serie")
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if EXCLUDED_SERIES.contains(&serie_id) {
        return true;
    }
    set_row
        .get("serie")
        .and_then(|s| s.get("name"))
        .and_then(|v| v.as_str())
        .map(|name| name.to_lowercase().contains("pocket"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> TcgdexProvider {
        TcgdexProvider::new(
            FetchClient::new(fetch_client::FetchConfig::default()),
            "https://api.example.net/v2",
        )
    }

    #[test]
    fn excluded_series_detection() {
        assert!(is_excluded_set(&json!({"id": "a1", "serie": {"id": "tcgp"}})));
        assert!(is_excluded_set(
            &json!({"id": "a2", "serie": {"id": "x", "name": "TCG Pocket"}})
        ));
        assert!(!is_excluded_set(
            &json!({"id": "sv2a", "serie": {"id": "sv", "name": "Scarlet & Violet"}})
        ));
        assert!(!is_excluded_set(&json!({"id": "sv2a"})));
    }

    #[test]
    fn fold_set_accumulates_both_languages() {
        let p = provider();
        let mut agg = AggMap::default();
        let en_detail = json!({
            "name": "Pokémon Card 151",
            "cardCount": {"official": 165, "total": 207},
            "cards": [
                {"id": "sv2a-006", "localId": "006", "name": "Charizard ex",
                 "image": "https://img.example.net/sv2a/006", "rarity": "Double Rare",
                 "dexId": [6]}
            ]
        });
        let ja_detail = json!({
            "name": "ポケモンカード151",
            "cards": [
                {"id": "sv2a-006", "localId": "006", "name": "リザードンex"}
            ]
        });
        p.fold_set(&mut agg, Lang::En, "sv2a", &en_detail);
        p.fold_set(&mut agg, Lang::Ja, "sv2a", &ja_detail);

        let rec = &agg.records[&("sv2a".to_string(), "006".to_string())];
        assert_eq!(rec.name_en.as_deref(), Some("Charizard ex"));
        assert_eq!(rec.name_ja.as_deref(), Some("リザードンex"));
        assert_eq!(rec.number_full.as_deref(), Some("006/165"));
        assert_eq!(rec.dex_id, Some(6));
        assert_eq!(rec.features, vec!["Double Rare".to_string()]);
        assert!(rec.from_en && rec.from_ja);
        // First-seen set name wins.
        assert_eq!(rec.set_name, "Pokémon Card 151");
    }

    #[test]
    fn fold_set_accepts_number_key_alias() {
        let p = provider();
        let mut agg = AggMap::default();
        let detail = json!({
            "name": "Promo",
            "cards": [{"id": "svp-049", "number": "049", "name": "Mew"}]
        });
        p.fold_set(&mut agg, Lang::En, "svp", &detail);
        assert!(agg.records.contains_key(&("svp".to_string(), "049".to_string())));
    }
}
