//! Candidate search over parsed HTML.
//!
//! The upstream page has shipped at least four different layouts for the same
//! data over time. Rather than branching on which revision is live, all four
//! heuristics run as uniform strategies behind one trait, every pass feeding
//! the shared pool; ranking resolves the pool globally. A later strategy runs
//! even when an earlier one already found candidates — a small number from
//! the labeled scan can still lose to a larger spurious number from the
//! global scan, which is a known precision/recall trade-off, not a bug.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{json::search_json, CandidatePool, Origin};
use crate::normalize::normalize_number;

/// One self-contained heuristic for pulling candidates out of a document.
pub trait ExtractStrategy {
    fn name(&self) -> &'static str;
    fn extract(&self, doc: &Html, pool: &mut CandidatePool);
}

/// Run every strategy, in the order they historically appeared upstream.
pub fn search_html(doc: &Html, pool: &mut CandidatePool) {
    let strategies: [&dyn ExtractStrategy; 4] = [
        &EmbeddedJson,
        &LabeledNeighborhood,
        &SectionSum,
        &GlobalScan,
    ];
    for strategy in strategies {
        let before = pool.len();
        strategy.extract(doc, pool);
        tracing::debug!(
            strategy = strategy.name(),
            found = pool.len() - before,
            "strategy pass"
        );
    }
}

/// Parse `html` and run [`search_html`]. The parsed document never leaves
/// this frame, so callers inside async code stay `Send`.
pub fn search_html_str(html: &str, pool: &mut CandidatePool) {
    let doc = Html::parse_document(html);
    search_html(&doc, pool);
}

// ── Strategy 1: embedded structured JSON ────────────────────────────────────

/// Bootstrap islands (`#__NEXT_DATA__`), `application/ld+json` blocks, and
/// any sufficiently large script body that mentions the value vocabulary and
/// contains a parseable `{...}` object. Parse failures are ignored, never
/// fatal.
pub struct EmbeddedJson;

/// Script bodies shorter than this cannot hold a bootstrap blob worth
/// parsing.
const MIN_SCRIPT_LEN: usize = 50;

static NEXT_DATA_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script#__NEXT_DATA__").expect("next-data selector"));
static LD_JSON_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("ld+json selector")
});
static SCRIPT_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script").expect("script selector"));
static SCRIPT_HINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)value|player|account|inventory|robux").expect("script hint regex"));

impl ExtractStrategy for EmbeddedJson {
    fn name(&self) -> &'static str {
        "embedded_json"
    }

    fn extract(&self, doc: &Html, pool: &mut CandidatePool) {
        for el in doc.select(&NEXT_DATA_SEL) {
            feed_json_text(&script_text(&el), pool);
        }
        for el in doc.select(&LD_JSON_SEL) {
            feed_json_text(&script_text(&el), pool);
        }
        for el in doc.select(&SCRIPT_SEL) {
            let txt = script_text(&el);
            if txt.len() > MIN_SCRIPT_LEN && SCRIPT_HINT_RE.is_match(&txt) {
                if let Some(blob) = brace_slice(&txt) {
                    feed_json_text(blob, pool);
                }
            }
        }
    }
}

fn script_text(el: &ElementRef<'_>) -> String {
    html_escape::decode_html_entities(&el.inner_html()).into_owned()
}

/// Greedy first-`{` .. last-`}` slice; the bootstrap object is the outermost
/// brace pair in practice.
fn brace_slice(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

fn feed_json_text(text: &str, pool: &mut CandidatePool) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        search_json(&value, &Origin::EmbeddedJson, pool);
    }
}

// ── Strategy 2: labeled-neighborhood scan ───────────────────────────────────

/// Value labels and their numbers stay co-located in the DOM even when class
/// names churn release to release, so neighborhood proximity outlives any
/// CSS selector. The neighborhood of a labeled element is the element
/// itself, its next sibling element, and its parent.
pub struct LabeledNeighborhood;

static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)total value|inventory value|account value|value worth|value|worth|robux")
        .expect("label regex")
});

/// Digit-led runs as they appear next to labels.
static NEIGHBOR_NUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9][0-9,.\s\x{A0}]{0,20}").expect("neighborhood number regex"));

static ANY_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("*").expect("universal selector"));

impl ExtractStrategy for LabeledNeighborhood {
    fn name(&self) -> &'static str {
        "labeled_neighborhood"
    }

    fn extract(&self, doc: &Html, pool: &mut CandidatePool) {
        for el in doc.select(&ANY_SEL) {
            let own = element_text(&el);
            if !LABEL_RE.is_match(&own) {
                continue;
            }
            let mut neighborhood = own;
            if let Some(next) = next_sibling_element(&el) {
                neighborhood.push(' ');
                neighborhood.push_str(&element_text(&next));
            }
            if let Some(parent) = el.parent().and_then(ElementRef::wrap) {
                neighborhood.push(' ');
                neighborhood.push_str(&element_text(&parent));
            }
            for m in NEIGHBOR_NUM_RE.find_iter(&neighborhood) {
                if let Some(v) = normalize_number(m.as_str()) {
                    pool.push(v, Origin::LabeledNeighborhood);
                }
            }
        }
    }
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn next_sibling_element<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.next_siblings().find_map(ElementRef::wrap)
}

// ── Strategy 3: targeted section summation ──────────────────────────────────

/// When an inventory-style section exists, its item rows are parts of a
/// whole, not competing guesses: sum them into ONE aggregate candidate per
/// section. The aggregate is tagged `Origin::SectionSum` so traces can see
/// it, but it competes in ranking on equal terms with every other candidate.
pub struct SectionSum;

static INVENTORY_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[class*="inventory"], [id*="inventory"]"#).expect("inventory selector")
});
static ITEM_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[class*="item"]"#).expect("item selector"));
static ITEM_VALUE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[class*="value"]"#).expect("item value selector"));

impl ExtractStrategy for SectionSum {
    fn name(&self) -> &'static str {
        "section_sum"
    }

    fn extract(&self, doc: &Html, pool: &mut CandidatePool) {
        for section in doc.select(&INVENTORY_SEL) {
            let mut sum: u64 = 0;
            let mut items = 0usize;
            for item in section.select(&ITEM_SEL) {
                let value = item
                    .value()
                    .attr("data-value")
                    .and_then(normalize_number)
                    .or_else(|| {
                        item.select(&ITEM_VALUE_SEL)
                            .next()
                            .and_then(|v| normalize_number(&element_text(&v)))
                    });
                if let Some(v) = value {
                    sum = sum.saturating_add(v);
                    items += 1;
                }
            }
            if items > 0 {
                pool.push(sum, Origin::SectionSum { items });
            }
        }
    }
}

// ── Strategy 4: global fallback scan ────────────────────────────────────────

/// Last resort: every digit-led substring of the page's visible text becomes
/// a low-confidence candidate.
pub struct GlobalScan;

static GLOBAL_NUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9][0-9,.\s\x{A0}]+").expect("global number regex"));

impl ExtractStrategy for GlobalScan {
    fn name(&self) -> &'static str {
        "global_scan"
    }

    fn extract(&self, doc: &Html, pool: &mut CandidatePool) {
        let text = visible_text(doc);
        for m in GLOBAL_NUM_RE.find_iter(&text) {
            if let Some(v) = normalize_number(m.as_str()) {
                pool.push(v, Origin::GlobalScan);
            }
        }
    }
}

/// Concatenated text of the document with script/style subtrees skipped: the
/// global scan wants what a reader would see, not bootstrap blobs (those are
/// the embedded-JSON strategy's job).
pub fn visible_text(doc: &Html) -> String {
    let mut out = String::new();
    collect_visible_text(doc.root_element(), &mut out);
    out
}

fn collect_visible_text(el: ElementRef<'_>, out: &mut String) {
    if matches!(el.value().name(), "script" | "style" | "noscript" | "template") {
        return;
    }
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            collect_visible_text(child_el, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::rank;

    fn search(html: &str) -> CandidatePool {
        let mut pool = CandidatePool::new();
        search_html_str(html, &mut pool);
        pool
    }

    fn values_from(pool: &CandidatePool, origin: &Origin) -> Vec<u64> {
        pool.iter()
            .filter(|c| c.origin == *origin)
            .map(|c| c.value)
            .collect()
    }

    #[test]
    fn labeled_neighborhood_finds_sibling_value() {
        let html = r#"
        <html><body>
          <div><span class="x1">Total Value</span><span class="x2">12,500</span></div>
        </body></html>
        "#;
        let pool = search(html);
        assert!(values_from(&pool, &Origin::LabeledNeighborhood).contains(&12_500));
        assert_eq!(rank::select(&pool), Some(12_500));
    }

    #[test]
    fn ld_json_island_is_parsed() {
        let html = r#"
        <html><head>
        <script type="application/ld+json">
        {"@type":"ProfilePage","mainEntity":{"inventoryValue":54321}}
        </script>
        </head><body></body></html>
        "#;
        let pool = search(html);
        assert!(values_from(&pool, &Origin::EmbeddedJson).contains(&54_321));
    }

    #[test]
    fn next_data_island_is_parsed() {
        let html = r#"
        <html><body>
        <script id="__NEXT_DATA__" type="application/json">
        {"props":{"pageProps":{"player":{"value":777000}}}}
        </script>
        </body></html>
        "#;
        let pool = search(html);
        assert!(values_from(&pool, &Origin::EmbeddedJson).contains(&777_000));
    }

    #[test]
    fn generic_script_blob_is_brace_matched() {
        let html = r#"
        <html><body>
        <script>
        window.bootstrap = {"player":{"name":"x","inventory_value":98765,"rank":3}};
        </script>
        </body></html>
        "#;
        let pool = search(html);
        assert!(values_from(&pool, &Origin::EmbeddedJson).contains(&98_765));
    }

    #[test]
    fn malformed_islands_are_ignored() {
        let html = r#"
        <html><head>
        <script type="application/ld+json">{not json at all</script>
        </head><body><div>Worth 42</div></body></html>
        "#;
        let pool = search(html);
        assert!(values_from(&pool, &Origin::EmbeddedJson).is_empty());
        assert_eq!(rank::select(&pool), Some(42));
    }

    #[test]
    fn inventory_section_sums_item_values() {
        let html = r#"
        <html><body>
        <div class="inventory_section">
          <div class="item"><span class="item_value">1,000</span></div>
          <div class="item"><span class="item_value">250</span></div>
          <div class="item" data-value="750"></div>
        </div>
        </body></html>
        "#;
        let pool = search(html);
        assert_eq!(
            values_from(&pool, &Origin::SectionSum { items: 3 }),
            vec![2_000]
        );
    }

    #[test]
    fn global_scan_skips_script_text() {
        let html = r#"
        <html><body>
        <p>plain 321 here</p>
        <script>var unrelated = 999999;</script>
        </body></html>
        "#;
        let pool = search(html);
        let global = values_from(&pool, &Origin::GlobalScan);
        assert!(global.contains(&321));
        assert!(!global.contains(&999_999));
    }

    #[test]
    fn all_strategies_pool_together() {
        // Labeled value, an embedded island, and a larger stray number: the
        // stray number wins ranking. That trade-off is the documented policy.
        let html = r#"
        <html><body>
        <script type="application/ld+json">{"accountValue":5000}</script>
        <div>Total Value <b>12,500</b></div>
        <p>visitors this week: 999,999</p>
        </body></html>
        "#;
        let pool = search(html);
        assert!(values_from(&pool, &Origin::EmbeddedJson).contains(&5_000));
        assert!(values_from(&pool, &Origin::LabeledNeighborhood).contains(&12_500));
        assert_eq!(rank::select(&pool), Some(999_999));
    }

    #[test]
    fn empty_document_yields_empty_pool() {
        let pool = search("<html><body><p>nothing numeric</p></body></html>");
        assert!(rank::select(&pool).is_none());
    }
}
