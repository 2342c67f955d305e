use super::{comic_id, element_text, first_attr, first_text, parse_score, selector, SiteUrls};
use crate::models::{MangaListItem, MangaListPage, PaginationInfo};
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::LazyLock;

static FULL_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})").expect("valid regex"));
static MONTH_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(\d{1,2})-(\d{1,2})(?:\D|$)").expect("valid regex"));

/// Parse the latest-update feed. Relative dates resolve against `today`.
pub fn parse_update_list(html: &str, site: &SiteUrls, today: NaiveDate) -> MangaListPage {
    let document = Html::parse_document(html);

    let mut rows: Vec<ElementRef> = document.select(&selector(".latest-list ul li")).collect();
    if rows.is_empty() {
        rows = document.select(&selector("#contList li")).collect();
    }

    let items: Vec<MangaListItem> = rows
        .into_iter()
        .filter_map(|row| parse_row(row, site, today))
        .collect();

    MangaListPage {
        items,
        pagination: parse_pager(&document),
    }
}

fn parse_row(row: ElementRef, site: &SiteUrls, today: NaiveDate) -> Option<MangaListItem> {
    let link = row
        .select(&selector("a.cover, a"))
        .find(|a| a.value().attr("href").and_then(comic_id).is_some())?;
    let id = link.value().attr("href").and_then(comic_id)?;

    let name = link
        .value()
        .attr("title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| first_text(row, "p.ell a, p.ell"))
        .unwrap_or_else(|| element_text(link));

    let cover = first_attr(row, "img", &["src", "data-src", "data-original"])
        .map(|c| site.absolutize(&c))
        .unwrap_or_else(|| site.cover_url(id));

    Some(MangaListItem {
        id,
        name,
        cover,
        latest_chapter: first_text(row, ".tt").unwrap_or_default(),
        update_time: first_text(row, ".dt")
            .map(|t| parse_update_time(&t, today))
            .unwrap_or_default(),
        score: first_text(row, "em").and_then(|s| parse_score(&s)),
    })
}

fn parse_pager(document: &Html) -> PaginationInfo {
    let mut current = 1;
    let mut total = 1;
    if let Some(pager) = document.select(&selector(".pager")).next() {
        if let Some(n) = first_text(pager, ".current").and_then(|t| t.parse().ok()) {
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
    PaginationInfo {
        current,
        total: total.max(current),
        total_items: 0,
    }
}

/// Normalize the feed's date phrase to `YYYY-MM-DD`; unknown phrases give an empty string.
pub fn parse_update_time(text: &str, today: NaiveDate) -> String {
    let text = text.trim();
    let date = if text.contains("今天") {
        Some(today)
    } else if text.contains("昨天") {
        today.checked_sub_signed(Duration::days(1))
    } else if text.contains("前天") {
        today.checked_sub_signed(Duration::days(2))
    } else {
        parse_numeric_date(text, today)
    };
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn parse_numeric_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(caps) = FULL_DATE.captures(text) {
        return NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?);
    }
    let caps = MONTH_DAY.captures(text)?;
    let (month, day): (u32, u32) = (caps[1].parse().ok()?, caps[2].parse().ok()?);
    // most recent past occurrence; Feb 29 walks back to the last leap year
    (0..8).find_map(|back| {
        NaiveDate::from_ymd_opt(today.year() - back, month, day).filter(|d| *d <= today)
    })
}
