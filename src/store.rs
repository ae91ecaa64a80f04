//! JSON blob persistence for artifacts and caches.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Read a JSON blob; a missing, unreadable, or corrupt file logs a warning
/// and yields `None` so callers can start fresh.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return None,
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "corrupt JSON blob; starting fresh");
            None
        }
    }
}

/// Write a JSON blob via a sibling temp file and rename, so a crash mid-write
/// never leaves a truncated artifact behind.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }
    let body = serde_json::to_string_pretty(value).context("serialize JSON blob")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("cardpulse-store-tests");
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn round_trips_a_map() {
        let path = temp_path("roundtrip.json");
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1u32);
        write_json(&path, &map).unwrap();
        let back: BTreeMap<String, u32> = read_json(&path).unwrap();
        assert_eq!(back, map);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_and_corrupt_files_yield_none() {
        let missing = temp_path("does-not-exist.json");
        assert!(read_json::<BTreeMap<String, u32>>(&missing).is_none());

        let corrupt = temp_path("corrupt.json");
        fs::write(&corrupt, "{not json").unwrap();
        assert!(read_json::<BTreeMap<String, u32>>(&corrupt).is_none());
        fs::remove_file(&corrupt).ok();
    }
}
