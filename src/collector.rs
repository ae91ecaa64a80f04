//! Marketplace collector: sold-listing searches, row parsing, grade
//! classification and catalog matching.
//!
//! Nothing here is ever fatal: a failed query page just contributes fewer
//! sales. Accepted sales are appended in memory; the driver owns all disk
//! writes.

use chrono::Utc;
use fetch_client::FetchClient;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::config::PipelineConfig;
use crate::matching::title::{parse_eur_price, ParsedTitle};
use crate::matching::CatalogIndex;
use crate::model::{GradeBucket, Sale};
use crate::source_ops::Pacer;

/// One configured search: fixed keywords, optionally restricted to graded
/// listings on the remote side.
#[derive(Debug, Clone, Deserialize)]
pub struct QuerySpec {
    pub keywords: String,
    #[serde(default)]
    pub graded_only: bool,
}

pub fn default_queries() -> Vec<QuerySpec> {
    [
        ("pokemon kaart graad", true),
        ("pokemon card graad", true),
        ("pokemon kaart", false),
        ("carte pokemon giapponese", false),
        ("pokemon card jap", false),
    ]
    .into_iter()
    .map(|(keywords, graded_only)| QuerySpec {
        keywords: keywords.to_string(),
        graded_only,
    })
    .collect()
}

/// Raw listing row before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRow {
    pub title: String,
    pub url: String,
    pub price_text: String,
}

#[derive(Debug, Default, Clone)]
pub struct CollectorStats {
    pub queries: u32,
    pub pages: u32,
    pub items_seen: u32,
    pub lots_skipped: u32,
    pub unknown_grade_skipped: u32,
    pub not_graded_skipped: u32,
    pub priceless_skipped: u32,
    pub below_threshold: u32,
    pub accepted: u32,
}

pub struct MarketCollector<'a> {
    client: &'a FetchClient,
    cfg: &'a PipelineConfig,
}

impl<'a> MarketCollector<'a> {
    pub fn new(client: &'a FetchClient, cfg: &'a PipelineConfig) -> Self {
        Self { client, cfg }
    }

    /// Run every configured query over the first `pages_per_query` result
    /// pages and return the accepted sales.
    pub async fn collect(&self, index: &CatalogIndex<'_>) -> (Vec<Sale>, CollectorStats) {
        let mut sales = Vec::new();
        let mut stats = CollectorStats::default();
        let mut pacer = Pacer::pages();

        for query in &self.cfg.queries {
            stats.queries += 1;
            for page in 1..=self.cfg.pages_per_query {
                pacer.tick().await;
                let url = self.search_url(&query.keywords, page, query.graded_only);
                let Some(html) = self.client.get_html_opt(&url, &[]).await else {
                    debug!(query = %query.keywords, page, "search page unavailable");
                    continue;
                };
                stats.pages += 1;

                for row in parse_listing_rows(&html) {
                    stats.items_seen += 1;
                    if let Some(sale) =
                        self.classify_row(&row, query.graded_only, index, &mut stats)
                    {
                        sales.push(sale);
                    }
                }
            }
        }

        info!(
            queries = stats.queries,
            pages = stats.pages,
            seen = stats.items_seen,
            accepted = stats.accepted,
            lots = stats.lots_skipped,
            "collector pass complete"
        );
        (sales, stats)
    }

    fn classify_row(
        &self,
        row: &ListingRow,
        graded_only: bool,
        index: &CatalogIndex<'_>,
        stats: &mut CollectorStats,
    ) -> Option<Sale> {
        let parsed = ParsedTitle::parse(&row.title);
        if parsed.is_lot {
            stats.lots_skipped += 1;
            return None;
        }
        if parsed.grade == Some(GradeBucket::GraadUnknown) {
            stats.unknown_grade_skipped += 1;
            return None;
        }
        if graded_only && parsed.grade.is_none() {
            stats.not_graded_skipped += 1;
            return None;
        }
        let bucket = parsed.grade.unwrap_or(GradeBucket::Raw);

        let Some(price_eur) = parse_eur_price(&row.price_text).or_else(|| parse_eur_price(&row.title))
        else {
            stats.priceless_skipped += 1;
            return None;
        };

        let matched = index.match_title(&parsed);
        let card = match matched.card {
            Some(card) if matched.confidence >= self.cfg.confidence_threshold => card,
            _ => {
                stats.below_threshold += 1;
                return None;
            }
        };

        stats.accepted += 1;
        Some(Sale {
            collected_at: Utc::now(),
            source: self.cfg.market_source.clone(),
            title: row.title.clone(),
            url: row.url.clone(),
            price_eur,
            card_id: card.id.clone(),
            bucket,
        })
    }

    /// Sold/completed search with the documented query parameters; the
    /// graded item-condition filter is added on graded-only queries.
    fn search_url(&self, keywords: &str, page: u32, graded_only: bool) -> String {
        let mut url = Url::parse(&format!("{}/sch/i.html", self.cfg.market_base_url))
            .expect("market base url");
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("_nkw", keywords);
            qp.append_pair("LH_Sold", "1");
            qp.append_pair("LH_Complete", "1");
            qp.append_pair("rt", "nc");
            qp.append_pair("_pgn", &page.to_string());
            qp.append_pair("_sacat", &self.cfg.market_category.to_string());
            if graded_only {
                qp.append_pair("LH_ItemCondition", "2750");
            }
        }
        url.into()
    }
}

/// Item rows out of a search result page. The leading "Shop on eBay"
/// placeholder rows carry no real listing and are dropped here.
pub fn parse_listing_rows(html: &str) -> Vec<ListingRow> {
    let doc = Html::parse_document(html);
    let item_sel = Selector::parse("li.s-item, div.s-item").expect("static selector");
    let title_sel = Selector::parse(".s-item__title").expect("static selector");
    let link_sel = Selector::parse("a.s-item__link").expect("static selector");
    let price_sel = Selector::parse(".s-item__price").expect("static selector");

    let mut out = Vec::new();
    for item in doc.select(&item_sel) {
        let Some(title) = item
            .select(&title_sel)
            .next()
            .map(|el| el.text().collect::<String>())
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())
        else {
            continue;
        };
        if title.eq_ignore_ascii_case("shop on ebay") {
            continue;
        }
        let Some(url) = item
            .select(&link_sel)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string)
        else {
            continue;
        };
        let price_text = item
            .select(&price_sel)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        out.push(ListingRow {
            title,
            url,
            price_text,
        });
    }
    out
}
