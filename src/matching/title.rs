//! Signal extraction from marketplace listing titles.
//!
//! Titles are adversarial: lot descriptors, grade tokens that look like card
//! numbers, mixed-language abbreviations. Everything here is a pure function
//! over the raw title and its normalized form; all regexes compile once.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{GradeBucket, Lang};
use crate::normalization::normalize;

fn lot_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(lot|bundle|playset|choose|seleziona)\b").unwrap())
}

fn lot_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+\s*(cards|carte)\b").unwrap())
}

fn eur_price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+,\d{1,2}|\d+)\s*(?:€|eur)").unwrap())
}

fn lang_ja_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(jap|jpn|jp|giapponese)\b").unwrap())
}

fn lang_en_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(eng|en|english|inglese)\b").unwrap())
}

fn set_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(sv\d{1,2}[a-z]?|m[a-z]{1,3})\b").unwrap())
}

fn fraction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,3})/(\d{1,3})\b").unwrap())
}

fn serial_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z]{1,4}\d{1,4}\b").unwrap())
}

fn set_shaped_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(sv\d{1,2}[a-z]?|m[a-z]{1,3})$").unwrap())
}

fn grade_strip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)graad\s*\d{1,2}(?:[.,]5)?").unwrap())
}

fn bare_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b#?\s*(\d{2,3})\b").unwrap())
}

fn grade_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)graad\s*(\d{1,2})(?:[.,](5))?").unwrap())
}

fn grade_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bgraad\b").unwrap())
}

/// All signals extracted from one listing title.
#[derive(Debug, Clone)]
pub struct ParsedTitle {
    pub raw: String,
    pub normalized: String,
    pub is_lot: bool,
    pub lang: Option<Lang>,
    pub set_code: Option<String>,
    pub local_id: Option<String>,
    /// `None` when no grade token is present at all.
    pub grade: Option<GradeBucket>,
}

impl ParsedTitle {
    pub fn parse(raw: &str) -> Self {
        let normalized = normalize(raw);
        Self {
            is_lot: is_likely_lot(&normalized),
            lang: detect_language(&normalized),
            set_code: extract_set_code(&normalized),
            local_id: extract_local_id(raw),
            grade: detect_grading_bucket(&normalized),
            raw: raw.to_string(),
            normalized,
        }
    }
}

/// Lot/bundle heuristics over the normalized title.
pub fn is_likely_lot(normalized: &str) -> bool {
    lot_word_re().is_match(normalized) || lot_count_re().is_match(normalized)
}

/// Euro price out of free text: thousands dots stripped, decimal comma.
/// Returns a finite positive number or `None`.
pub fn parse_eur_price(text: &str) -> Option<f64> {
    let lowered = text.to_lowercase().replace('.', "");
    let caps = eur_price_re().captures(&lowered)?;
    let value: f64 = caps.get(1)?.as_str().replace(',', ".").parse().ok()?;
    if value.is_finite() && value > 0.0 {
        Some(value)
    } else {
        None
    }
}

/// Explicit language hint; `None` when the title names none (or both).
pub fn detect_language(normalized: &str) -> Option<Lang> {
    let ja = lang_ja_re().find(normalized);
    let en = lang_en_re().find(normalized);
    match (ja, en) {
        (Some(_), None) => Some(Lang::Ja),
        (None, Some(_)) => Some(Lang::En),
        _ => None,
    }
}

/// First set-code-shaped token in the normalized title.
pub fn extract_set_code(normalized: &str) -> Option<String> {
    set_code_re()
        .captures(normalized)
        .map(|c| c[1].to_string())
}

/// Local card number, tried in order of reliability:
/// 1. `NNN/NNN`: take the numerator (leading zeros preserved);
/// 2. promo/serial token `[A-Z]{1,4}\d{1,4}` on the raw title, unless the
///    token is itself shaped like a set code (`SV3` in `SV3.5` would
///    otherwise shadow the real number);
/// 3. bare 2–3 digit token after removing any `graad N` substring, so grade
///    values never masquerade as card numbers.
pub fn extract_local_id(raw: &str) -> Option<String> {
    if let Some(caps) = fraction_re().captures(raw) {
        return Some(caps[1].to_string());
    }
    for m in serial_re().find_iter(raw) {
        if !set_shaped_re().is_match(m.as_str()) {
            return Some(m.as_str().to_string());
        }
    }
    let stripped = grade_strip_re().replace_all(raw, " ");
    bare_number_re()
        .captures(&stripped)
        .map(|c| c[1].to_string())
}

/// Grading bucket from the `graad` token. `None` means no token at all;
/// `GraadUnknown` means a token was present but the grade is not one the
/// pipeline prices.
pub fn detect_grading_bucket(normalized: &str) -> Option<GradeBucket> {
    if !grade_token_re().is_match(normalized) {
        return None;
    }
    let Some(caps) = grade_value_re().captures(normalized) else {
        return Some(GradeBucket::GraadUnknown);
    };
    let whole: f64 = match caps[1].parse() {
        Ok(v) => v,
        Err(_) => return Some(GradeBucket::GraadUnknown),
    };
    let grade = if caps.get(2).is_some() { whole + 0.5 } else { whole };

    let bucket = if grade == 7.0 {
        GradeBucket::Graad7
    } else if grade == 8.0 {
        GradeBucket::Graad8
    } else if grade == 9.0 {
        GradeBucket::Graad9
    } else if grade == 9.5 {
        GradeBucket::Graad95
    } else if grade == 10.0 {
        GradeBucket::Graad10
    } else if grade > 7.0 && grade < 8.0 {
        GradeBucket::Graad7
    } else if grade > 8.0 && grade < 9.0 {
        GradeBucket::Graad8
    } else if grade > 9.0 && grade < 9.5 {
        GradeBucket::Graad9
    } else {
        GradeBucket::GraadUnknown
    };
    Some(bucket)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(title: &str) -> Option<GradeBucket> {
        detect_grading_bucket(&normalize(title))
    }

    #[test]
    fn lot_detection() {
        assert!(is_likely_lot(&normalize("Lot 50 Pokemon Cards Random GRAAD 8")));
        assert!(is_likely_lot(&normalize("Pokemon bundle mint")));
        assert!(is_likely_lot(&normalize("seleziona la tua carta")));
        assert!(is_likely_lot(&normalize("25 carte pokemon")));
        assert!(!is_likely_lot(&normalize("Charizard ex 006/165 SV2A")));
        // "Charlotte" must not trip the \blot\b token.
        assert!(!is_likely_lot(&normalize("Charlotte promo card")));
    }

    #[test]
    fn eur_price_parsing() {
        assert_eq!(parse_eur_price("Charizard ex 29,90 €"), Some(29.9));
        assert_eq!(parse_eur_price("price 120 EUR"), Some(120.0));
        assert_eq!(parse_eur_price("1.299,90 €"), Some(1299.9));
        assert_eq!(parse_eur_price("no price here"), None);
        assert_eq!(parse_eur_price("0 €"), None);
    }

    #[test]
    fn language_detection() {
        assert_eq!(detect_language(&normalize("Pikachu V JAP")), Some(Lang::Ja));
        assert_eq!(detect_language(&normalize("Charizard ENG")), Some(Lang::En));
        assert_eq!(detect_language(&normalize("carta giapponese")), Some(Lang::Ja));
        assert_eq!(detect_language(&normalize("Mew mint")), None);
        // Conflicting hints cancel out.
        assert_eq!(detect_language(&normalize("JAP ENG double")), None);
    }

    #[test]
    fn set_code_extraction() {
        assert_eq!(extract_set_code(&normalize("Pikachu SV9A JAP")), Some("sv9a".into()));
        assert_eq!(extract_set_code(&normalize("Pikachu 025 SV3.5")), Some("sv3".into()));
        assert_eq!(extract_set_code(&normalize("booster mcd promo")), Some("mcd".into()));
        // Leftmost token wins, so short m-words can shadow a later sv code.
        assert_eq!(extract_set_code(&normalize("Mew 025 SV3.5")), Some("mew".into()));
        assert_eq!(extract_set_code(&normalize("plain charizard")), None);
    }

    #[test]
    fn local_id_prefers_fraction_numerator() {
        assert_eq!(
            extract_local_id("Pikachu V 181/165 SV9A JAP GRAAD 9.5"),
            Some("181".into())
        );
        assert_eq!(
            extract_local_id("Charizard ex 006/165 SV2A ENG"),
            Some("006".into())
        );
    }

    #[test]
    fn local_id_takes_promo_serials() {
        assert_eq!(extract_local_id("Pikachu SWSH284 promo"), Some("SWSH284".into()));
        assert_eq!(extract_local_id("Mew TG12 holo"), Some("TG12".into()));
    }

    #[test]
    fn local_id_skips_set_shaped_serials() {
        // "SV3" out of "SV3.5" is a set code, not a card number.
        assert_eq!(extract_local_id("Mew 025 SV3.5 GRAAD 10"), Some("025".into()));
    }

    #[test]
    fn local_id_never_reads_grade_values() {
        assert_eq!(extract_local_id("pokemon graad 9.5 charizard"), None);
        assert_eq!(extract_local_id("charizard GRAAD 10"), None);
    }

    #[test]
    fn grading_buckets() {
        assert_eq!(bucket("Pikachu V GRAAD 9.5"), Some(GradeBucket::Graad95));
        assert_eq!(bucket("Mew GRAAD 10"), Some(GradeBucket::Graad10));
        assert_eq!(bucket("Mew graad 7"), Some(GradeBucket::Graad7));
        assert_eq!(bucket("Mew graad 7,5"), Some(GradeBucket::Graad7));
        assert_eq!(bucket("Mew graad 8.5"), Some(GradeBucket::Graad8));
        assert_eq!(bucket("Mew graad 6"), Some(GradeBucket::GraadUnknown));
        assert_eq!(bucket("Mew graad 11"), Some(GradeBucket::GraadUnknown));
        assert_eq!(bucket("graad mint"), Some(GradeBucket::GraadUnknown));
        assert_eq!(bucket("Mew mint"), None);
    }

    #[test]
    fn grade_ten_never_buckets_below_nine_five() {
        for title in ["GRAAD 10", "graad  10", "pokemon graad 10 psa"] {
            let b = bucket(title).unwrap();
            assert!(b >= GradeBucket::Graad95, "{title} bucketed to {b:?}");
        }
    }

    #[test]
    fn parse_assembles_all_signals() {
        let p = ParsedTitle::parse("Pikachu V 181/165 SV9A JAP GRAAD 9.5");
        assert!(!p.is_lot);
        assert_eq!(p.lang, Some(Lang::Ja));
        assert_eq!(p.set_code.as_deref(), Some("sv9a"));
        assert_eq!(p.local_id.as_deref(), Some("181"));
        assert_eq!(p.grade, Some(GradeBucket::Graad95));
    }
}
