//! English primary catalog adapter (split strategy, English half).
//!
//! Paginates `/v2/cards?page=N&pageSize=250&q=supertype:pokemon` and folds
//! one English partial per row. Hard failure is reported distinctly so the
//! reconciler can fall back to the structured English-only walk:
//! - unrecoverable status (401/403),
//! - repeated 429/5xx after the fetcher's retries,
//! - an empty `data` page with a non-zero declared total.

use fetch_client::{FetchClient, FetchError};
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::DexNameCache;
use crate::normalization::normalize;
use crate::source_ops::species::SpeciesProvider;
use crate::source_ops::{value_as_i64, value_str, AggMap, Pacer, SourceResult};

const PAGE_SIZE: u32 = 250;

#[derive(Clone)]
pub struct PtcgApiProvider {
    client: FetchClient,
    base_url: String,
    api_key: Option<String>,
}

impl PtcgApiProvider {
    pub fn new(client: FetchClient, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|s| !s.trim().is_empty()),
        }
    }

    async fn page(&self, page: u32) -> Result<Value, FetchError> {
        let url = format!(
            "{}/v2/cards?page={}&pageSize={}&q=supertype:pokemon",
            self.base_url, page, PAGE_SIZE
        );
        let headers: Vec<(&str, &str)> = match self.api_key.as_deref() {
            Some(key) => vec![("X-Api-Key", key)],
            None => Vec::new(),
        };
        self.client.get_json(&url, &headers).await
    }

    /// Walk every page into an aggregation map. Rows seen before a hard
    /// failure are discarded by the caller together with the fragment.
    pub async fn collect(
        &self,
        dex_cache: &DexNameCache,
        species: &SpeciesProvider,
    ) -> SourceResult {
        let mut agg = AggMap::default();
        let mut pacer = Pacer::pages();
        let mut page_no = 1u32;
        let mut seen_rows = 0u64;

        loop {
            let payload = match self.page(page_no).await {
                Ok(v) => v,
                Err(err) => {
                    let fatal = match &err {
                        FetchError::Http { status, .. } if *status == 401 || *status == 403 => {
                            format!("card API rejected credentials (status {status})")
                        }
                        e if e.is_exhausted_transient() => {
                            format!("card API unavailable after retries: {e}")
                        }
                        e => format!("card API request failed: {e}"),
                    };
                    warn!(page = page_no, error = %err, "card API page failed");
                    return SourceResult {
                        agg,
                        fatal: Some(fatal),
                    };
                }
            };

            let total = payload
                .get("totalCount")
                .and_then(value_as_i64)
                .unwrap_or(0) as u64;
            let rows = payload
                .get("data")
                .and_then(|d| d.as_array())
                .cloned()
                .unwrap_or_default();

            if rows.is_empty() {
                if total > seen_rows {
                    return SourceResult {
                        agg,
                        fatal: Some(format!(
                            "card API returned no data at page {page_no} with {total} declared"
                        )),
                    };
                }
                break;
            }

            for row in &rows {
                self.fold_row(&mut agg, row, dex_cache, species).await;
            }
            seen_rows += rows.len() as u64;
            info!(page = page_no, rows = rows.len(), seen = seen_rows, total, "card API page folded");

            if total > 0 && seen_rows >= total {
                break;
            }
            page_no += 1;
            pacer.tick().await;
        }

        SourceResult { agg, fatal: None }
    }

    async fn fold_row(
        &self,
        agg: &mut AggMap,
        row: &Value,
        dex_cache: &DexNameCache,
        species: &SpeciesProvider,
    ) {
        let Some(name) = value_str(row, "name") else {
            return;
        };
        let set = row.get("set").cloned().unwrap_or(Value::Null);
        let Some(set_id) = value_str(&set, "id") else {
            return;
        };
        let set_name = value_str(&set, "name").unwrap_or_else(|| set_id.clone());
        let Some(number) = value_str(row, "number") else {
            return;
        };

        let dex_id = row
            .get("nationalPokedexNumbers")
            .and_then(value_as_i64);
        let pokemon_key = match dex_id {
            Some(id) => dex_cache
                .english_name(id, species)
                .await
                .map(|en| normalize(&en))
                .unwrap_or_else(|| normalize(&name)),
            None => normalize(&name),
        };

        let number_full = value_str(&set, "printedTotal")
            .or_else(|| set.get("printedTotal").and_then(value_as_i64).map(|n| n.to_string()))
            .map(|total| format!("{}/{}", number, total));
        let image = row
            .get("images")
            .and_then(|i| value_str(i, "large"))
            .or_else(|| row.get("images").and_then(|i| value_str(i, "small")));
        let rarity = value_str(row, "rarity");
        let subtypes: Vec<String> = row
            .get("subtypes")
            .and_then(|s| s.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let rec = agg.entry(&set_id, &set_name, &number);
        crate::source_ops::fill(&mut rec.name_en, Some(name));
        crate::source_ops::fill(&mut rec.pokemon_key, Some(pokemon_key));
        crate::source_ops::fill(&mut rec.dex_id, dex_id);
        crate::source_ops::fill(&mut rec.image_large, image);
        crate::source_ops::fill(&mut rec.number_full, number_full);
        if rec.features.is_empty() {
            if let Some(r) = rarity.as_deref() {
                rec.features.push(r.to_string());
            }
            rec.features.extend(subtypes);
        }
        crate::source_ops::fill(&mut rec.rarity, rarity);
        rec.from_api = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> PtcgApiProvider {
        PtcgApiProvider::new(
            FetchClient::new(fetch_client::FetchConfig::default()),
            "https://api.example.io",
            None,
        )
    }

    fn deps() -> (DexNameCache, SpeciesProvider) {
        let dir = std::env::temp_dir().join("cardpulse-ptcgapi-tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dex-empty.json");
        std::fs::remove_file(&path).ok();
        (
            DexNameCache::load(path),
            SpeciesProvider::new(
                FetchClient::new(fetch_client::FetchConfig::default()),
                "http://127.0.0.1:9", // unroutable: cache misses resolve to None fast
            ),
        )
    }

    #[tokio::test]
    async fn fold_row_builds_english_partial() {
        let p = provider();
        let (dex_cache, species) = deps();
        let mut agg = AggMap::default();
        let row = json!({
            "id": "sv3pt5-25",
            "name": "Mew",
            "number": "25",
            "rarity": "Rare",
            "subtypes": ["Basic"],
            "set": {"id": "sv3pt5", "name": "151", "printedTotal": 165},
            "images": {"small": "https://img.example.io/25.png",
                       "large": "https://img.example.io/25_hires.png"}
        });
        p.fold_row(&mut agg, &row, &dex_cache, &species).await;

        let rec = &agg.records[&("sv3pt5".to_string(), "25".to_string())];
        assert_eq!(rec.name_en.as_deref(), Some("Mew"));
        // No dex number in the row: the key falls back to the card name.
        assert_eq!(rec.pokemon_key.as_deref(), Some("mew"));
        assert_eq!(rec.number_full.as_deref(), Some("25/165"));
        assert_eq!(rec.image_large.as_deref(), Some("https://img.example.io/25_hires.png"));
        assert_eq!(rec.features, vec!["Rare".to_string(), "Basic".to_string()]);
        assert!(rec.from_api);
    }

    #[tokio::test]
    async fn fold_row_skips_rows_without_identity() {
        let p = provider();
        let (dex_cache, species) = deps();
        let mut agg = AggMap::default();
        p.fold_row(&mut agg, &json!({"name": "Mew"}), &dex_cache, &species)
            .await;
        p.fold_row(&mut agg, &json!({"set": {"id": "sv1"}}), &dex_cache, &species)
            .await;
        assert!(agg.is_empty());
    }
}
