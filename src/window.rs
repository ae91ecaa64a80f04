//! Rolling 30-day sales window: load, prune, dedup-merge, persist.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::model::{Sale, SalesFile};
use crate::store;

#[derive(Debug, Default)]
pub struct SalesWindow {
    sales: Vec<Sale>,
}

impl SalesWindow {
    pub fn load(path: &Path) -> Self {
        let file: SalesFile = store::read_json(path).unwrap_or_default();
        Self { sales: file.sales }
    }

    pub fn sales(&self) -> &[Sale] {
        &self.sales
    }

    pub fn len(&self) -> usize {
        self.sales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sales.is_empty()
    }

    /// Drop entries older than the window. Returns how many fell out.
    pub fn prune(&mut self, now: DateTime<Utc>, days_window: i64) -> usize {
        let cutoff = now - Duration::days(days_window);
        let before = self.sales.len();
        self.sales.retain(|s| s.collected_at >= cutoff);
        before - self.sales.len()
    }

    /// Drop entries whose card no longer exists in the catalog (ids can
    /// churn when a rebuild renames a printing). Returns how many fell out.
    pub fn prune_unknown_cards(&mut self, known_ids: &HashSet<&str>) -> usize {
        let before = self.sales.len();
        self.sales.retain(|s| known_ids.contains(s.card_id.as_str()));
        before - self.sales.len()
    }

    /// Merge newly collected sales, deduplicating on the composite
    /// `(url, priceEur, cardId, bucket)` key. Returns (added, duplicates).
    pub fn merge(&mut self, incoming: Vec<Sale>) -> (usize, usize) {
        let mut seen: HashSet<_> = self.sales.iter().map(Sale::dedup_key).collect();
        let mut added = 0usize;
        let mut duplicates = 0usize;
        for sale in incoming {
            if seen.insert(sale.dedup_key()) {
                self.sales.push(sale);
                added += 1;
            } else {
                duplicates += 1;
            }
        }
        info!(added, duplicates, window = self.sales.len(), "sales merged");
        (added, duplicates)
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        store::write_json(
            path,
            &SalesFile {
                sales: self.sales.clone(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GradeBucket;
    use chrono::TimeZone;

    fn sale(url: &str, price: f64, card_id: &str, bucket: GradeBucket, days_ago: i64) -> Sale {
        Sale {
            collected_at: Utc::now() - Duration::days(days_ago),
            source: "ebay".into(),
            title: "t".into(),
            url: url.into(),
            price_eur: price,
            card_id: card_id.into(),
            bucket,
        }
    }

    #[test]
    fn prune_drops_entries_outside_window() {
        let mut window = SalesWindow {
            sales: vec![
                sale("u1", 10.0, "c1", GradeBucket::Raw, 0),
                sale("u2", 10.0, "c1", GradeBucket::Raw, 29),
                sale("u3", 10.0, "c1", GradeBucket::Raw, 31),
            ],
        };
        let removed = window.prune(Utc::now(), 30);
        assert_eq!(removed, 1);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn merge_deduplicates_on_composite_key() {
        let mut window = SalesWindow::default();
        let first = sale("u1", 29.9, "c1", GradeBucket::Raw, 0);

        let (added, dups) = window.merge(vec![first.clone()]);
        assert_eq!((added, dups), (1, 0));

        // Same url/price/card/bucket later the same day: a duplicate even
        // though collectedAt differs.
        let mut again = first.clone();
        again.collected_at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let (added, dups) = window.merge(vec![again]);
        assert_eq!((added, dups), (0, 1));

        // Different bucket is a distinct observation.
        let mut graded = first;
        graded.bucket = GradeBucket::Graad9;
        let (added, dups) = window.merge(vec![graded]);
        assert_eq!((added, dups), (1, 0));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn unknown_card_ids_are_pruned() {
        let mut window = SalesWindow {
            sales: vec![
                sale("u1", 10.0, "alive", GradeBucket::Raw, 0),
                sale("u2", 10.0, "gone", GradeBucket::Raw, 0),
            ],
        };
        let known: HashSet<&str> = ["alive"].into_iter().collect();
        assert_eq!(window.prune_unknown_cards(&known), 1);
        assert_eq!(window.sales()[0].card_id, "alive");
    }

    #[test]
    fn persists_and_reloads() {
        let dir = std::env::temp_dir().join("cardpulse-window-tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sales.json");

        let mut window = SalesWindow::default();
        window.merge(vec![sale("u1", 29.9, "c1", GradeBucket::Graad10, 3)]);
        window.persist(&path).unwrap();

        let reloaded = SalesWindow::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.sales()[0].bucket, GradeBucket::Graad10);
        std::fs::remove_file(&path).ok();
    }
}
