//! Median price aggregation per (card, bucket).

use std::collections::BTreeMap;

use crate::model::{GradeBucket, PriceStat, PricesFile, Sale};

/// Median of the finite values: sort ascending, take the middle element, or
/// the mean of the two middles for even counts. Empty input → `None`.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = finite.len() / 2;
    if finite.len() % 2 == 1 {
        Some(finite[mid])
    } else {
        Some((finite[mid - 1] + finite[mid]) / 2.0)
    }
}

/// Group window sales by card then bucket and compute medians. Every card
/// with at least one sale carries all six canonical bucket keys; the
/// transient unknown bucket is never emitted.
pub fn aggregate(sales: &[Sale]) -> PricesFile {
    let mut grouped: BTreeMap<&str, BTreeMap<GradeBucket, Vec<f64>>> = BTreeMap::new();
    for sale in sales {
        if sale.bucket == GradeBucket::GraadUnknown {
            continue;
        }
        grouped
            .entry(sale.card_id.as_str())
            .or_default()
            .entry(sale.bucket)
            .or_default()
            .push(sale.price_eur);
    }

    let mut by_card = BTreeMap::new();
    for (card_id, buckets) in grouped {
        let mut per_bucket = BTreeMap::new();
        for bucket in GradeBucket::CANONICAL {
            let prices = buckets.get(&bucket).map(Vec::as_slice).unwrap_or(&[]);
            per_bucket.insert(
                bucket.as_str().to_string(),
                PriceStat {
                    median_eur: median(prices),
                    n: prices.len() as u32,
                },
            );
        }
        by_card.insert(card_id.to_string(), per_bucket);
    }

    PricesFile { by_card }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sale(card_id: &str, bucket: GradeBucket, price: f64) -> Sale {
        Sale {
            collected_at: Utc::now(),
            source: "ebay".into(),
            title: "t".into(),
            url: format!("u-{card_id}-{price}"),
            price_eur: price,
            card_id: card_id.into(),
            bucket,
        }
    }

    #[test]
    fn median_odd_even_and_empty() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[10.0]), Some(10.0));
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[f64::NAN, 5.0]), Some(5.0));
        assert_eq!(median(&[f64::INFINITY]), None);
    }

    #[test]
    fn every_priced_card_carries_all_six_buckets() {
        let sales = vec![sale("c1", GradeBucket::Raw, 10.0)];
        let prices = aggregate(&sales);
        let buckets = &prices.by_card["c1"];
        assert_eq!(buckets.len(), 6);
        for key in ["raw", "graad_7", "graad_8", "graad_9", "graad_9_5", "graad_10"] {
            assert!(buckets.contains_key(key), "{key}");
        }
        assert_eq!(buckets["raw"].median_eur, Some(10.0));
        assert_eq!(buckets["raw"].n, 1);
        assert_eq!(buckets["graad_10"].median_eur, None);
        assert_eq!(buckets["graad_10"].n, 0);
    }

    #[test]
    fn zero_n_iff_null_median() {
        let sales = vec![
            sale("c1", GradeBucket::Graad9, 50.0),
            sale("c1", GradeBucket::Graad9, 70.0),
            sale("c1", GradeBucket::Graad9, 60.0),
        ];
        let prices = aggregate(&sales);
        for (_, stat) in &prices.by_card["c1"] {
            assert_eq!(stat.n == 0, stat.median_eur.is_none());
        }
        assert_eq!(prices.by_card["c1"]["graad_9"].median_eur, Some(60.0));
        assert_eq!(prices.by_card["c1"]["graad_9"].n, 3);
    }

    #[test]
    fn cards_without_sales_are_absent() {
        let prices = aggregate(&[]);
        assert!(prices.by_card.is_empty());
    }

    #[test]
    fn unknown_bucket_never_emitted() {
        let sales = vec![
            sale("c1", GradeBucket::GraadUnknown, 10.0),
            sale("c1", GradeBucket::Raw, 12.0),
        ];
        let prices = aggregate(&sales);
        let buckets = &prices.by_card["c1"];
        assert!(buckets.keys().all(|k| k != "graad_unknown"));
        assert_eq!(buckets["raw"].n, 1);
    }
}
