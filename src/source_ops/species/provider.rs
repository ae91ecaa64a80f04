//! Species API client: dex-id → localized species names, plus the paginated
//! species index used to seed the Japanese-name map.
//!
//! Endpoints:
//! - GET /pokemon-species/{id}/            - one species with names[]
//! - GET /pokemon-species?limit=N&offset=M - paginated index {results, next}

use fetch_client::FetchClient;
use serde_json::Value;

use crate::source_ops::value_str;

#[derive(Clone)]
pub struct SpeciesProvider {
    client: FetchClient,
    base_url: String,
}

impl SpeciesProvider {
    pub fn new(client: FetchClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// English-locale name for a dex id; `None` when the species is missing
    /// or carries no English entry.
    pub async fn english_name(&self, dex_id: i64) -> Option<String> {
        let url = format!("{}/pokemon-species/{}/", self.base_url, dex_id);
        let v = self.client.get_json_opt(&url, &[]).await?;
        locale_name(&v, "en").or_else(|| value_str(&v, "name"))
    }

    /// One page of the species index.
    pub async fn index_page(&self, limit: u32, offset: u32) -> Option<Value> {
        let url = format!(
            "{}/pokemon-species?limit={}&offset={}",
            self.base_url, limit, offset
        );
        self.client.get_json_opt(&url, &[]).await
    }

    /// Full species record behind an index `results[].url` entry.
    pub async fn species_record(&self, url: &str) -> Option<Value> {
        let absolute = if url.starts_with("http") {
            url.to_string()
        } else {
            format!("{}{}", self.base_url, url)
        };
        self.client.get_json_opt(&absolute, &[]).await
    }
}

/// Name under a specific locale inside a species record's `names[]`.
pub fn locale_name(record: &Value, locale: &str) -> Option<String> {
    record.get("names")?.as_array()?.iter().find_map(|entry| {
        let lang = entry
            .get("language")
            .and_then(|l| l.get("name"))
            .and_then(|n| n.as_str())?;
        if lang == locale {
            value_str(entry, "name")
        } else {
            None
        }
    })
}

/// Japanese name, trying the kanji/kana locale first and the
/// hiragana/katakana variant second.
pub fn japanese_names(record: &Value) -> Vec<String> {
    let mut out = Vec::new();
    for locale in ["ja", "ja-Hrkt"] {
        if let Some(name) = locale_name(record, locale) {
            if !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}
