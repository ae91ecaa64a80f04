//! Persistent read-through caches for the cross-language enrichment chain.
//!
//! Two on-disk maps: national-dex id → English species name, and Japanese
//! species name → resolved species entry. Both load lazily at construction,
//! grow monotonically, and write back to disk after each successful
//! resolution so a crashed run loses nothing already resolved.
//!
//! All access goes through a `tokio::sync::Mutex` held across the whole
//! read-miss-resolve-write sequence, so concurrent misses on the same key
//! coalesce into one outbound request.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::normalization::normalize;
use crate::source_ops::species::provider::{japanese_names, locale_name};
use crate::source_ops::species::SpeciesProvider;
use crate::source_ops::{value_as_i64, value_str, Pacer};
use crate::store;

/// National-dex id → English species name.
pub struct DexNameCache {
    path: PathBuf,
    inner: Mutex<BTreeMap<i64, String>>,
}

impl DexNameCache {
    pub fn load(path: PathBuf) -> Self {
        let map: BTreeMap<i64, String> = store::read_json(&path).unwrap_or_default();
        if !map.is_empty() {
            info!(entries = map.len(), path = %path.display(), "dex-name cache loaded");
        }
        Self {
            path,
            inner: Mutex::new(map),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// English name for a dex id, resolving through the species API on a
    /// miss and persisting the new entry before returning.
    pub async fn english_name(&self, dex_id: i64, provider: &SpeciesProvider) -> Option<String> {
        let mut map = self.inner.lock().await;
        if let Some(hit) = map.get(&dex_id) {
            return Some(hit.clone());
        }
        let resolved = provider.english_name(dex_id).await?;
        map.insert(dex_id, resolved.clone());
        if let Err(err) = store::write_json(&self.path, &*map) {
            warn!(error = %err, "dex-name cache write failed");
        }
        debug!(dex_id, name = %resolved, "dex-name cache filled");
        Some(resolved)
    }
}

/// Resolution of one Japanese species name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesEntry {
    pub dex_id: i64,
    pub en_name: String,
    pub normalized_key: String,
}

/// Japanese species name → dex id, English name, and normalized search key.
/// Built by walking the paginated species index once; later runs read the
/// persisted map and only rebuild when it is missing or empty.
pub struct SpeciesNameMap {
    path: PathBuf,
    inner: Mutex<BTreeMap<String, SpeciesEntry>>,
}

impl SpeciesNameMap {
    pub fn load(path: PathBuf) -> Self {
        let map: BTreeMap<String, SpeciesEntry> = store::read_json(&path).unwrap_or_default();
        if !map.is_empty() {
            info!(entries = map.len(), path = %path.display(), "species map loaded");
        }
        Self {
            path,
            inner: Mutex::new(map),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn lookup(&self, name_ja: &str) -> Option<SpeciesEntry> {
        self.inner.lock().await.get(name_ja.trim()).cloned()
    }

    /// Walk the species index and fill the map, unless it is already
    /// populated from disk. Entries are appended (and persisted) page by
    /// page, so an interrupted walk resumes with partial coverage.
    pub async fn ensure_built(&self, provider: &SpeciesProvider) -> Result<usize> {
        {
            let map = self.inner.lock().await;
            if !map.is_empty() {
                return Ok(map.len());
            }
        }
        info!("species map empty; walking the species index");

        let limit = 200u32;
        let mut offset = 0u32;
        let mut page_pacer = Pacer::pages();
        let mut detail_pacer = Pacer::detail();
        let semaphore = Arc::new(Semaphore::new(6));
        let mut total_records = 0usize;

        loop {
            let Some(page) = provider.index_page(limit, offset).await else {
                warn!(offset, "species index page unavailable; stopping walk");
                break;
            };
            let urls: Vec<String> = page
                .get("results")
                .and_then(|r| r.as_array())
                .map(|arr| arr.iter().filter_map(|e| value_str(e, "url")).collect())
                .unwrap_or_default();
            if urls.is_empty() {
                break;
            }

            let mut tasks = FuturesUnordered::new();
            for url in urls {
                let provider = provider.clone();
                let semaphore = semaphore.clone();
                tasks.push(async move {
                    let _permit = semaphore.acquire().await.ok();
                    provider.species_record(&url).await
                });
            }
            while let Some(record) = tasks.next().await {
                detail_pacer.tick().await;
                let Some(record) = record else { continue };
                if self.ingest_record(&record).await {
                    total_records += 1;
                }
            }

            {
                let map = self.inner.lock().await;
                if let Err(err) = store::write_json(&self.path, &*map) {
                    warn!(error = %err, "species map write failed");
                }
            }

            let has_next = page
                .get("next")
                .map(|n| !n.is_null())
                .unwrap_or(false);
            if !has_next {
                break;
            }
            offset += limit;
            page_pacer.tick().await;
        }

        let map = self.inner.lock().await;
        info!(
            species = total_records,
            entries = map.len(),
            "species map walk complete"
        );
        Ok(map.len())
    }

    async fn ingest_record(&self, record: &serde_json::Value) -> bool {
        let Some(dex_id) = record.get("id").and_then(value_as_i64) else {
            return false;
        };
        let Some(en_name) =
            locale_name(record, "en").or_else(|| value_str(record, "name"))
        else {
            return false;
        };
        let ja_forms = japanese_names(record);
        if ja_forms.is_empty() {
            return false;
        }
        let entry = SpeciesEntry {
            dex_id,
            normalized_key: normalize(&en_name),
            en_name,
        };
        let mut map = self.inner.lock().await;
        for form in ja_forms {
            map.entry(form).or_insert_with(|| entry.clone());
        }
        true
    }
}
