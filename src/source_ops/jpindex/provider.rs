//! Japanese HTML-index catalog adapter (split strategy, Japanese half).
//!
//! Three steps against the index site:
//! 1. `/cards/jp`: set ids out of links shaped `/cards/jp/{setId}`;
//! 2. `/cards/jp/{setId}`: one row per link shaped
//!    `/cards/jp/{setId}/{number}`, with the link text, the surrounding
//!    row's image and the per-card detail URL;
//! 3. per-card detail pages, fetched only when the row yielded no
//!    Japanese-script name and the species map had no translation either.
//!
//! Rows whose text is romanized keep that text as a `nameJa` placeholder
//! until a detail fetch (or later enrichment) resolves the real name.

use std::sync::OnceLock;

use fetch_client::FetchClient;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::cache::SpeciesNameMap;
use crate::normalization::contains_japanese;
use crate::source_ops::tcgdex::TcgdexProvider;
use crate::source_ops::{AggMap, Pacer, SourceResult};

fn set_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/cards/jp/([A-Za-z0-9][A-Za-z0-9.\-]*)/?$").unwrap())
}

fn dex_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:national\s+)?pok[eé]dex[:\s#]*(\d+)").unwrap())
}

fn card_image_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"cards?|image|img").unwrap())
}

/// One parsed listing row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JpRow {
    pub number: String,
    pub text: String,
    pub title_attr: Option<String>,
    pub aria_label: Option<String>,
    pub adjacent_text: Option<String>,
    pub image: Option<String>,
    pub detail_url: String,
}

impl JpRow {
    /// First name candidate carrying actual Japanese script, in the
    /// documented precedence order.
    pub fn japanese_name(&self) -> Option<String> {
        [
            self.title_attr.as_deref(),
            self.aria_label.as_deref(),
            Some(self.text.as_str()),
            self.adjacent_text.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|cand| !cand.is_empty() && contains_japanese(cand))
        .map(str::to_string)
    }
}

/// Extraction out of a per-card detail page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JpCardDetail {
    pub name_ja: Option<String>,
    pub dex_id: Option<i64>,
    pub image: Option<String>,
}

#[derive(Clone)]
pub struct JpIndexProvider {
    client: FetchClient,
    base_url: String,
}

impl JpIndexProvider {
    pub fn new(client: FetchClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn collect(
        &self,
        species_map: &SpeciesNameMap,
        tcgdex: &TcgdexProvider,
    ) -> SourceResult {
        let mut agg = AggMap::default();

        let index_url = format!("{}/cards/jp", self.base_url);
        let Some(index_html) = self.client.get_html_opt(&index_url, &[]).await else {
            return SourceResult {
                agg,
                fatal: Some("japanese set index unavailable".to_string()),
            };
        };
        let set_ids = parse_set_ids(&index_html);
        if set_ids.is_empty() {
            return SourceResult {
                agg,
                fatal: Some("japanese set index listed no sets".to_string()),
            };
        }
        info!(sets = set_ids.len(), "japanese index walk");

        let mut bulk_pacer = Pacer::bulk();
        let mut detail_pacer = Pacer::new(45, 600);

        for set_id in set_ids {
            bulk_pacer.tick().await;
            let set_url = format!("{}/cards/jp/{}", self.base_url, set_id);
            let Some(set_html) = self.client.get_html_opt(&set_url, &[]).await else {
                debug!(set = %set_id, "set listing missing; skipped");
                continue;
            };
            let rows = parse_set_rows(&set_html, &self.base_url, &set_id);
            if rows.is_empty() {
                continue;
            }

            agg.japanese_exclusive.insert(set_id.clone());
            // One bulk image map per Japanese set; preferred over row images.
            let image_map = tcgdex.set_image_map(&set_id).await;

            for row in rows {
                let mut name_ja = row.japanese_name();
                let mut dex_id = None;
                let mut image = image_map
                    .get(&row.number)
                    .cloned()
                    .or_else(|| row.image.clone());

                if name_ja.is_none() {
                    let translated = species_map.lookup(&row.text).await.is_some();
                    if !translated {
                        detail_pacer.tick().await;
                        if let Some(detail_html) =
                            self.client.get_html_opt(&row.detail_url, &[]).await
                        {
                            let detail = parse_card_detail(&detail_html);
                            name_ja = detail.name_ja;
                            dex_id = detail.dex_id;
                            if image.is_none() {
                                image = detail.image;
                            }
                        }
                    }
                }

                let rec = agg.entry(&set_id, &set_id, &row.number);
                // Romanized placeholder until something resolves the script form.
                let fallback = Some(row.text.clone()).filter(|t| !t.is_empty());
                crate::source_ops::fill(&mut rec.name_ja, name_ja.or(fallback));
                crate::source_ops::fill(&mut rec.image_large, image);
                crate::source_ops::fill(&mut rec.dex_id, dex_id);
                crate::source_ops::fill(&mut rec.detail_url_ja, Some(row.detail_url));
                rec.from_index = true;
                rec.from_ja = true;
            }
        }

        if agg.is_empty() {
            warn!("japanese index walk produced no rows");
        }
        SourceResult { agg, fatal: None }
    }

    /// Detail page fetch + parse, shared with the reconciler's enrichment.
    pub async fn card_detail(&self, detail_url: &str) -> Option<JpCardDetail> {
        let html = self.client.get_html_opt(detail_url, &[]).await?;
        Some(parse_card_detail(&html))
    }
}

/// Set ids out of the index page links.
pub fn parse_set_ids(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").expect("static selector");
    let mut out: Vec<String> = Vec::new();
    for a in doc.select(&anchors) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let path = strip_origin(href);
        if let Some(caps) = set_link_re().captures(path) {
            let id = caps[1].to_string();
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
    out
}

/// Listing rows out of one set page.
pub fn parse_set_rows(html: &str, base_url: &str, set_id: &str) -> Vec<JpRow> {
    let doc = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").expect("static selector");
    let img = Selector::parse("img[src]").expect("static selector");
    let card_link_re =
        Regex::new(&format!(r"^/cards/jp/{}/(\d+)/?$", regex::escape(set_id))).expect("card link");

    let mut out: Vec<JpRow> = Vec::new();
    for a in doc.select(&anchors) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let path = strip_origin(href);
        let Some(caps) = card_link_re.captures(path) else {
            continue;
        };
        let number = caps[1].to_string();
        if out.iter().any(|r| r.number == number) {
            continue;
        }

        let row_scope = enclosing_row(&a);
        let image = row_scope
            .as_ref()
            .and_then(|scope| scope.select(&img).next())
            .and_then(|el| el.value().attr("src"))
            .map(|src| absolutize(base_url, src));
        let adjacent_text = adjacent_cell_text(&a);

        out.push(JpRow {
            number,
            text: collapse(&a.text().collect::<String>()),
            title_attr: a.value().attr("title").map(str::to_string),
            aria_label: a.value().attr("aria-label").map(str::to_string),
            adjacent_text,
            image,
            detail_url: absolutize(base_url, path),
        });
    }
    out
}

/// Per-card detail extraction: first short Japanese text node, the dex
/// number out of the body text, the open-graph image (or first card-ish img).
pub fn parse_card_detail(html: &str) -> JpCardDetail {
    let doc = Html::parse_document(html);

    let name_ja = doc
        .root_element()
        .text()
        .map(str::trim)
        .find(|t| !t.is_empty() && t.chars().count() <= 40 && contains_japanese(t))
        .map(str::to_string);

    let body_text: String = doc.root_element().text().collect::<Vec<_>>().join(" ");
    let dex_id = dex_number_re()
        .captures(&body_text)
        .and_then(|c| c[1].parse().ok());

    let og = Selector::parse(r#"meta[property="og:image"]"#).expect("static selector");
    let img = Selector::parse("img[src]").expect("static selector");
    let image = doc
        .select(&og)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
        .or_else(|| {
            doc.select(&img)
                .filter_map(|el| el.value().attr("src"))
                .find(|src| card_image_src_re().is_match(src))
                .map(str::to_string)
        });

    JpCardDetail {
        name_ja,
        dex_id,
        image,
    }
}

/// Nearest `tr`/`li` ancestor (a listing row); falls back to the direct
/// parent element so grid layouts still get an image scope.
fn enclosing_row<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    let mut first_parent = None;
    for ancestor in el.ancestors() {
        let Some(parent) = ElementRef::wrap(ancestor) else {
            continue;
        };
        if first_parent.is_none() {
            first_parent = Some(parent);
        }
        let tag = parent.value().name();
        if tag == "tr" || tag == "li" {
            return Some(parent);
        }
    }
    first_parent
}

/// Text of the table cell right after the one holding the link.
fn adjacent_cell_text(el: &ElementRef<'_>) -> Option<String> {
    for ancestor in el.ancestors() {
        let Some(cell) = ElementRef::wrap(ancestor) else {
            continue;
        };
        if cell.value().name() != "td" {
            continue;
        }
        let next = cell
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|sib| sib.value().name() == "td")?;
        let text = collapse(&next.text().collect::<String>());
        return Some(text).filter(|t| !t.is_empty());
    }
    None
}

fn strip_origin(href: &str) -> &str {
    if let Some(idx) = href.find("//") {
        let after_scheme = &href[idx + 2..];
        if let Some(slash) = after_scheme.find('/') {
            return &after_scheme[slash..];
        }
    }
    href
}

fn absolutize(base_url: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", base_url, href)
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
