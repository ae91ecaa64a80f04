//! Catalog source adapters and the partial-record shapes they produce.
//!
//! Each adapter walks one upstream source and folds rows into an [`AggMap`]
//! keyed by `(set_id, number)`. Merging is first-non-empty per field, so
//! the order adapters run in defines precedence and stays auditable.

pub mod jpindex;
pub mod ptcgapi;
pub mod species;
pub mod tcgdex;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde_json::Value;

/// One partially-known card, tagged with the sources that contributed.
#[derive(Debug, Clone, Default)]
pub struct PartialRecord {
    pub set_id: String,
    pub set_name: String,
    pub number: String,
    pub number_full: Option<String>,
    pub name_en: Option<String>,
    pub name_ja: Option<String>,
    pub pokemon_key: Option<String>,
    pub rarity: Option<String>,
    pub features: Vec<String>,
    pub image_large: Option<String>,
    pub dex_id: Option<i64>,
    /// Structured-API detail ids, when the row came from that source.
    pub detail_id_en: Option<String>,
    pub detail_id_ja: Option<String>,
    /// Per-card page of the Japanese HTML index, when the row came from it.
    pub detail_url_ja: Option<String>,
    pub from_en: bool,
    pub from_ja: bool,
    pub from_api: bool,
    pub from_index: bool,
}

/// Aggregation map all adapters fold into, plus the set ids that were
/// observed under the Japanese index (Japanese-exclusive releases).
#[derive(Debug, Default)]
pub struct AggMap {
    pub records: BTreeMap<(String, String), PartialRecord>,
    pub japanese_exclusive: BTreeSet<String>,
}

impl AggMap {
    /// Fetch-or-create the record for `(set_id, number)`; identity fields
    /// are written on creation and never overwritten afterwards.
    pub fn entry(&mut self, set_id: &str, set_name: &str, number: &str) -> &mut PartialRecord {
        let rec = self
            .records
            .entry((set_id.to_string(), number.to_string()))
            .or_insert_with(|| PartialRecord {
                set_id: set_id.to_string(),
                set_name: set_name.to_string(),
                number: number.to_string(),
                ..PartialRecord::default()
            });
        if rec.set_name.is_empty() && !set_name.is_empty() {
            rec.set_name = set_name.to_string();
        }
        rec
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merge another fragment in; existing fields win (first-seen
    /// precedence, with `self` counting as first).
    pub fn absorb(&mut self, other: AggMap) {
        for (key, incoming) in other.records {
            match self.records.entry(key) {
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(incoming);
                }
                std::collections::btree_map::Entry::Occupied(mut slot) => {
                    let rec = slot.get_mut();
                    fill(&mut rec.number_full, incoming.number_full);
                    fill(&mut rec.name_en, incoming.name_en);
                    fill(&mut rec.name_ja, incoming.name_ja);
                    fill(&mut rec.pokemon_key, incoming.pokemon_key);
                    fill(&mut rec.rarity, incoming.rarity);
                    fill(&mut rec.image_large, incoming.image_large);
                    fill(&mut rec.dex_id, incoming.dex_id);
                    fill(&mut rec.detail_id_en, incoming.detail_id_en);
                    fill(&mut rec.detail_id_ja, incoming.detail_id_ja);
                    fill(&mut rec.detail_url_ja, incoming.detail_url_ja);
                    if rec.features.is_empty() {
                        rec.features = incoming.features;
                    }
                    rec.from_en |= incoming.from_en;
                    rec.from_ja |= incoming.from_ja;
                    rec.from_api |= incoming.from_api;
                    rec.from_index |= incoming.from_index;
                }
            }
        }
        self.japanese_exclusive.extend(other.japanese_exclusive);
    }
}

/// Keep the first non-empty value.
pub fn fill<T>(dst: &mut Option<T>, src: Option<T>) {
    if dst.is_none() {
        *dst = src;
    }
}

/// Adapter outcome: whatever partial catalog was assembled, plus the fatal
/// condition when the adapter could make no further progress. The caller
/// decides whether to keep the fragment or fall back.
#[derive(Debug, Default)]
pub struct SourceResult {
    pub agg: AggMap,
    pub fatal: Option<String>,
}

/// N-requests-then-pause throttle. The pauses are floors applied on top of
/// whatever time the requests themselves took.
#[derive(Debug)]
pub struct Pacer {
    every: u32,
    delay: Duration,
    count: u32,
}

impl Pacer {
    pub fn new(every: u32, delay_ms: u64) -> Self {
        Self {
            every: every.max(1),
            delay: Duration::from_millis(delay_ms),
            count: 0,
        }
    }

    /// Throttle for set-level bulk fetches (~250 ms every 8 requests).
    pub fn bulk() -> Self {
        Self::new(8, 250)
    }

    /// Throttle for per-card detail fetches (~700 ms every 40 requests).
    pub fn detail() -> Self {
        Self::new(40, 700)
    }

    /// Throttle for paginated API calls (~200 ms every 6 pages).
    pub fn pages() -> Self {
        Self::new(6, 200)
    }

    pub async fn tick(&mut self) {
        self.count += 1;
        if self.count % self.every == 0 {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// String field out of a JSON object, empty values filtered.
pub fn value_str(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(|x| x.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Dex ids arrive as a number, a numeric string, or an array whose first
/// element is either; this accepts the union of all observed forms.
pub fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(arr) => arr.first().and_then(value_as_i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_keeps_identity_fields() {
        let mut agg = AggMap::default();
        agg.entry("sv2a", "Pokémon Card 151", "006").name_en = Some("Charizard ex".into());
        let rec = agg.entry("sv2a", "other name", "006");
        assert_eq!(rec.set_name, "Pokémon Card 151");
        assert_eq!(rec.name_en.as_deref(), Some("Charizard ex"));
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn absorb_prefers_existing_fields() {
        let mut a = AggMap::default();
        {
            let rec = a.entry("sv9a", "Set", "181");
            rec.name_en = Some("Pikachu V".into());
            rec.from_api = true;
        }
        let mut b = AggMap::default();
        {
            let rec = b.entry("sv9a", "Set", "181");
            rec.name_en = Some("different".into());
            rec.name_ja = Some("ピカチュウV".into());
            rec.from_index = true;
        }
        b.japanese_exclusive.insert("sv9a".into());
        a.absorb(b);
        let rec = &a.records[&("sv9a".to_string(), "181".to_string())];
        assert_eq!(rec.name_en.as_deref(), Some("Pikachu V"));
        assert_eq!(rec.name_ja.as_deref(), Some("ピカチュウV"));
        assert!(rec.from_api && rec.from_index);
        assert!(a.japanese_exclusive.contains("sv9a"));
    }

    #[test]
    fn dex_id_union_form() {
        assert_eq!(value_as_i64(&json!(25)), Some(25));
        assert_eq!(value_as_i64(&json!("133")), Some(133));
        assert_eq!(value_as_i64(&json!([6, 150])), Some(6));
        assert_eq!(value_as_i64(&json!(["9"])), Some(9));
        assert_eq!(value_as_i64(&json!(null)), None);
        assert_eq!(value_as_i64(&json!([])), None);
    }
}
