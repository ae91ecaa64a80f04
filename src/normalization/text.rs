//! Canonical text form used for key generation and substring matching.
//!
//! `normalize` is the single comparison substrate for the whole pipeline:
//! lowercase, NFD-decompose, drop combining marks, collapse whitespace.
//! It is idempotent, so values may be re-normalized freely at module
//! boundaries without drift.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

fn ja_alias_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(jap|jpn|jp|giapponese)\b").unwrap())
}

fn en_alias_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(eng|en|english|inglese)\b").unwrap())
}

/// Lowercase, strip diacritics, collapse whitespace runs, trim.
/// Empty input (or pure whitespace) yields the empty string.
pub fn normalize(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let lowered = s.to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    collapse_whitespace(&stripped)
}

/// `normalize` plus language-alias rewriting for user-supplied queries and
/// marketplace titles: `jap`/`jpn`/`jp`/`giapponese` → ` ja `,
/// `eng`/`en`/`english`/`inglese` → ` en `, then re-collapse.
pub fn normalize_query(s: &str) -> String {
    let base = normalize(s);
    let with_ja = ja_alias_re().replace_all(&base, " ja ");
    let with_en = en_alias_re().replace_all(&with_ja, " en ");
    collapse_whitespace(&with_en)
}

/// Identifier-safe slug: normalized text with every non-alphanumeric run
/// replaced by a single dash. Used for deterministic card ids.
pub fn slugify(s: &str) -> String {
    let norm = normalize(s);
    let mut out = String::with_capacity(norm.len());
    let mut prev_dash = false;
    for c in norm.chars() {
        if c.is_alphanumeric() {
            out.push(c);
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

/// True when the string carries actual Japanese script: hiragana/katakana
/// (U+3040–U+30FF) or CJK ideographs (U+3400–U+9FFF).
pub fn contains_japanese(s: &str) -> bool {
    s.chars().any(|c| {
        let cp = c as u32;
        (0x3040..=0x30FF).contains(&cp) || (0x3400..=0x9FFF).contains(&cp)
    })
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_inputs() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t\n "), "");
    }

    #[test]
    fn strips_diacritics_and_lowercases() {
        assert_eq!(normalize("Pokémon"), "pokemon");
        assert_eq!(normalize("FLABÉBÉ"), "flabebe");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(normalize("  Charizard   ex \t V "), "charizard ex v");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in [
            "Pokémon  Card\t151",
            "ピカチュウ",
            "  GRAAD 9.5 ",
            "Flabébé é̂",
        ] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn query_rewrites_language_aliases() {
        assert_eq!(normalize_query("Pikachu JAP mint"), "pikachu ja mint");
        assert_eq!(normalize_query("charizard english"), "charizard en");
        assert_eq!(normalize_query("carta inglese"), "carta en");
        // Aliases only rewrite as whole words.
        assert_eq!(normalize_query("japanese"), "japanese");
    }

    #[test]
    fn query_rewrite_is_idempotent() {
        let once = normalize_query("Mew JPN graad 10");
        assert_eq!(normalize_query(&once), once);
    }

    #[test]
    fn japanese_script_detection() {
        assert!(contains_japanese("ピカチュウ"));
        assert!(contains_japanese("リザードンex"));
        assert!(contains_japanese("炎"));
        assert!(!contains_japanese("Pikachu"));
        assert!(!contains_japanese(""));
    }

    #[test]
    fn slugs_are_dash_joined() {
        assert_eq!(slugify("Charizard ex"), "charizard-ex");
        assert_eq!(slugify("Farfetch'd"), "farfetch-d");
        assert_eq!(slugify("  Mr. Mime  "), "mr-mime");
    }
}
