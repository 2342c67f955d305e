//! HTML read models for manhuagui pages.
//!
//! The site serves several templates for the same kind of page (category
//! browse vs. keyword search, old vs. new detail layouts), so every parser
//! tries its container selectors in order and falls back to looser markers.
//!
//! - [`list`]: browse/search listings with pagination
//! - [`detail`]: manga detail with grouped chapter lists
//! - [`rank`]: day/week/month/total rank tables
//! - [`update`]: latest-update feed with relative dates

pub mod detail;
pub mod list;
pub mod rank;
pub mod update;

pub use detail::parse_manga_detail;
pub use list::parse_manga_list;
pub use rank::parse_rank_list;
pub use update::{parse_update_list, parse_update_time};

use crate::config::{DEFAULT_CDN_URL, DEFAULT_SITE_URL};
use crate::models::PaginationInfo;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::cmp::Ordering;
use std::sync::LazyLock;

static COMIC_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/comic/(\d+)").expect("valid regex"));
static SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"));
static NUMBER_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+|\D+").expect("valid regex"));
static PAGE_FRACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"第\s*(\d+)\s*/\s*(\d+)\s*[頁页]|(\d+)\s*/\s*(\d+)").expect("valid regex")
});
static TOTAL_ITEMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"共有?\s*(\d+)\s*[部条條]").expect("valid regex"));

/// Site roots used to absolutize links and synthesize covers
#[derive(Debug, Clone)]
pub struct SiteUrls {
    pub site_url: String,
    pub cdn_url: String,
}

impl Default for SiteUrls {
    fn default() -> Self {
        Self {
            site_url: DEFAULT_SITE_URL.to_string(),
            cdn_url: DEFAULT_CDN_URL.to_string(),
        }
    }
}

impl SiteUrls {
    /// Protocol-relative → https, site-relative → site root
    pub fn absolutize(&self, url: &str) -> String {
        let url = url.trim();
        if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if let Some(rest) = url.strip_prefix("//") {
            format!("https://{}", rest)
        } else if url.starts_with('/') {
            format!("{}{}", self.site_url.trim_end_matches('/'), url)
        } else {
            url.to_string()
        }
    }

    pub fn cover_url(&self, manga_id: u64) -> String {
        format!("{}/cpic/h/{}.jpg", self.cdn_url.trim_end_matches('/'), manga_id)
    }
}

/// Parse a selector known at compile time
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

pub(crate) fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Trimmed text of the first match, if it is non-empty
pub(crate) fn first_text(root: ElementRef, css: &str) -> Option<String> {
    root.select(&selector(css))
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

/// First non-empty value among `attrs` on the first match
pub(crate) fn first_attr(root: ElementRef, css: &str, attrs: &[&str]) -> Option<String> {
    let el = root.select(&selector(css)).next()?;
    attrs
        .iter()
        .filter_map(|a| el.value().attr(a))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

pub(crate) fn has_class(el: ElementRef, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

pub(crate) fn comic_id(href: &str) -> Option<u64> {
    COMIC_ID.captures(href)?.get(1)?.as_str().parse().ok()
}

pub(crate) fn parse_score(text: &str) -> Option<f64> {
    SCORE.find(text)?.as_str().parse().ok()
}

/// Digit-aware comparison: digit runs compare by value, other runs by text
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a_parts = NUMBER_RUNS.find_iter(a).map(|m| m.as_str());
    let mut b_parts = NUMBER_RUNS.find_iter(b).map(|m| m.as_str());
    loop {
        match (a_parts.next(), b_parts.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let x_num = x.as_bytes()[0].is_ascii_digit();
                let y_num = y.as_bytes()[0].is_ascii_digit();
                let ord = if x_num && y_num {
                    compare_digit_runs(x, y)
                } else {
                    x.cmp(y)
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_digit_runs(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}

/// Pagination from the `.pager` links and from "current / total" text.
///
/// The free-text form wins when both are present. `total` is never below `current`.
pub(crate) fn parse_pagination(doc: &Html, item_count: usize) -> PaginationInfo {
    let mut current = 1u32;
    let mut total = 1u32;
    let mut total_items = item_count as u32;

    if let Some(pager) = doc.select(&selector(".pager")).next() {
        let leaf_current = pager
            .select(&selector(".current"))
            .chain(
                pager
                    .select(&selector("span"))
                    .filter(|s| s.children().all(|c| !c.value().is_element())),
            )
            .find_map(|el| element_text(el).parse::<u32>().ok());
        if let Some(n) = leaf_current {
            current = n;
        }

        if let Some(max) = pager
            .select(&selector("a"))
            .filter_map(|a| element_text(a).parse::<u32>().ok())
            .max()
        {
            total = max;
        }
    }

    let mut counted_text = String::new();
    for block in doc.select(&selector(".pager, .page-box, .result-count")) {
        counted_text.push_str(&block.text().collect::<String>());
        counted_text.push(' ');
    }
    if let Some(caps) = TOTAL_ITEMS.captures(&counted_text) {
        if let Ok(n) = caps[1].parse() {
            total_items = n;
        }
    }
    if let Some(caps) = PAGE_FRACTION.captures(&counted_text) {
        let cur = caps.get(1).or_else(|| caps.get(3)).and_then(|m| m.as_str().parse().ok());
        let tot = caps.get(2).or_else(|| caps.get(4)).and_then(|m| m.as_str().parse().ok());
        if let (Some(cur), Some(tot)) = (cur, tot) {
            current = cur;
            total = tot;
        }
    }

    PaginationInfo {
        current,
        total: total.max(current),
        total_items,
    }
}
