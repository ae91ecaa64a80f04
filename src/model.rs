//! Canonical record types shared across the pipeline and the on-disk
//! artifact shapes they serialize into.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Printing language of a physical card (not the display language of a name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    En,
    Ja,
}

impl Lang {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Ja => "ja",
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grade category of a sold listing: ungraded, or one of the discrete
/// graded tiers. `GraadUnknown` is a transient classification that never
/// reaches persisted artifacts; the collector drops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GradeBucket {
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "graad_7")]
    Graad7,
    #[serde(rename = "graad_8")]
    Graad8,
    #[serde(rename = "graad_9")]
    Graad9,
    #[serde(rename = "graad_9_5")]
    Graad95,
    #[serde(rename = "graad_10")]
    Graad10,
    #[serde(rename = "graad_unknown")]
    GraadUnknown,
}

impl GradeBucket {
    /// The six bucket keys that may appear in persisted artifacts.
    pub const CANONICAL: [GradeBucket; 6] = [
        GradeBucket::Raw,
        GradeBucket::Graad7,
        GradeBucket::Graad8,
        GradeBucket::Graad9,
        GradeBucket::Graad95,
        GradeBucket::Graad10,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GradeBucket::Raw => "raw",
            GradeBucket::Graad7 => "graad_7",
            GradeBucket::Graad8 => "graad_8",
            GradeBucket::Graad9 => "graad_9",
            GradeBucket::Graad95 => "graad_9_5",
            GradeBucket::Graad10 => "graad_10",
            GradeBucket::GraadUnknown => "graad_unknown",
        }
    }

    pub fn is_graded(&self) -> bool {
        !matches!(self, GradeBucket::Raw)
    }
}

/// One catalog entry per physical printing.
///
/// Artifact keys are the lowercased single-word forms (`lang` for the
/// printing language); optional fields are omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    #[serde(rename = "cardkey")]
    pub card_key: String,
    #[serde(rename = "setid")]
    pub set_id: String,
    #[serde(rename = "setname")]
    pub set_name: String,
    pub number: String,
    #[serde(rename = "numberfull", default, skip_serializing_if = "Option::is_none")]
    pub number_full: Option<String>,
    #[serde(rename = "lang")]
    pub printing_lang: Lang,
    pub name: String,
    #[serde(rename = "nameen", default, skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    #[serde(rename = "nameja", default, skip_serializing_if = "Option::is_none")]
    pub name_ja: Option<String>,
    #[serde(rename = "pokemonkey", default, skip_serializing_if = "Option::is_none")]
    pub pokemon_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    #[serde(rename = "imagelarge", default, skip_serializing_if = "Option::is_none")]
    pub image_large: Option<String>,
}

impl Card {
    /// `{setId}|{number}|{printingLang}` join key.
    pub fn make_card_key(set_id: &str, number: &str, lang: Lang) -> String {
        format!("{}|{}|{}", set_id, number, lang)
    }
}

/// ISO-8601 instants truncated to seconds with a literal `Z` suffix.
pub mod iso_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// One observed sold listing, matched and classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    #[serde(rename = "collectedAt", with = "iso_seconds")]
    pub collected_at: DateTime<Utc>,
    pub source: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "priceEur")]
    pub price_eur: f64,
    #[serde(rename = "cardId")]
    pub card_id: String,
    pub bucket: GradeBucket,
}

impl Sale {
    /// Composite dedup key; the price participates at cent precision so a
    /// float round-trip through JSON cannot split one sale into two.
    pub fn dedup_key(&self) -> (String, i64, String, GradeBucket) {
        (
            self.url.clone(),
            (self.price_eur * 100.0).round() as i64,
            self.card_id.clone(),
            self.bucket,
        )
    }
}

/// Median price with sample count; `n == 0` ⇔ `median_eur == None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceStat {
    pub median_eur: Option<f64>,
    pub n: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SalesFile {
    pub sales: Vec<Sale>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricesFile {
    #[serde(rename = "byCard")]
    pub by_card: BTreeMap<String, BTreeMap<String, PriceStat>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    #[serde(rename = "updatedAt", with = "iso_seconds")]
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_card() -> Card {
        Card {
            id: "sv3pt5-6-charizard-ex-en".into(),
            card_key: Card::make_card_key("sv3pt5", "6", Lang::En),
            set_id: "sv3pt5".into(),
            set_name: "151".into(),
            number: "6".into(),
            number_full: Some("6/165".into()),
            printing_lang: Lang::En,
            name: "Charizard ex".into(),
            name_en: Some("Charizard ex".into()),
            name_ja: None,
            pokemon_key: Some("charizard".into()),
            rarity: Some("Double Rare".into()),
            features: Some(vec!["Double Rare".into()]),
            image_large: None,
        }
    }

    #[test]
    fn card_round_trip_preserves_documented_fields() {
        let card = sample_card();
        let json = serde_json::to_string(&card).unwrap();
        let back: Card = serde_json::from_str(&json).unwrap();
        assert_eq!(card, back);
    }

    #[test]
    fn card_serializes_lang_and_omits_absent_optionals() {
        let card = sample_card();
        let v: serde_json::Value = serde_json::to_value(&card).unwrap();
        assert_eq!(v["lang"], "en");
        assert_eq!(v["cardkey"], "sv3pt5|6|en");
        assert!(v.get("imagelarge").is_none());
        assert!(v.get("nameja").is_none());
    }

    #[test]
    fn sale_timestamp_truncates_to_seconds() {
        let sale = Sale {
            collected_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 45).unwrap(),
            source: "ebay".into(),
            title: "t".into(),
            url: "https://example.com/itm/1".into(),
            price_eur: 29.9,
            card_id: "sv3pt5-6-charizard-ex-en".into(),
            bucket: GradeBucket::Raw,
        };
        let v: serde_json::Value = serde_json::to_value(&sale).unwrap();
        assert_eq!(v["collectedAt"], "2026-03-01T12:30:45Z");
        let back: Sale = serde_json::from_value(v).unwrap();
        assert_eq!(back.collected_at, sale.collected_at);
    }

    #[test]
    fn dedup_key_is_stable_at_cent_precision() {
        let mk = |price: f64| Sale {
            collected_at: Utc::now(),
            source: "ebay".into(),
            title: "t".into(),
            url: "u".into(),
            price_eur: price,
            card_id: "c".into(),
            bucket: GradeBucket::Graad10,
        };
        assert_eq!(mk(29.90).dedup_key(), mk(29.900000000000002).dedup_key());
        assert_ne!(mk(29.90).dedup_key(), mk(29.91).dedup_key());
    }

    #[test]
    fn bucket_names_match_artifact_keys() {
        assert_eq!(GradeBucket::Graad95.as_str(), "graad_9_5");
        assert_eq!(GradeBucket::CANONICAL.len(), 6);
        assert!(!GradeBucket::CANONICAL.contains(&GradeBucket::GraadUnknown));
    }
}
