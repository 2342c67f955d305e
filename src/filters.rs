//! Listing request validation and list/search path building.
//!
//! Filtered browse paths look like
//! `/list/{region}_{genre}_{status}_{year}_{letter}/{sort}_p{page}.html`,
//! with empty parts omitted. Unknown filter values are dropped rather than
//! rejected; a bad page or an overlong keyword is rejected before any
//! network call.

use crate::error::{Result, ScrapeError};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

pub const REGIONS: &[&str] = &["japan", "hongkong", "korea", "other", "europe", "china"];

pub const GENRES: &[&str] = &[
    "rexue", "maoxian", "mohuan", "gaoxiao", "aiqing", "kehuan", "xiaoyuan", "xuanyi", "kongbu",
    "hougong", "danmei", "baihe", "wuxia", "gedou", "zhiyu",
];

pub const STATUSES: &[&str] = &["lianzai", "wanjie"];

pub const SORTS: &[&str] = &["update", "view", "rate"];

pub const MAX_PAGE: u32 = 500;
pub const MAX_KEYWORD_CHARS: usize = 100;
pub const DEFAULT_CATEGORY: &str = "japan";

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d{4}|\d{3}x)$").expect("valid regex"));
static LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[a-z]|0-9)$").expect("valid regex"));
static CATEGORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]{1,40}$").expect("valid regex"));

/// Raw query string of the listing endpoint
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ListQuery {
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub region: Option<String>,
    pub genre: Option<String>,
    pub year: Option<String>,
    pub letter: Option<String>,
    pub status: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
}

/// Validated filter combination for a browse listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub region: Option<String>,
    pub genre: Option<String>,
    pub status: Option<String>,
    pub year: Option<String>,
    pub letter: Option<String>,
    pub sort: Option<String>,
}

impl FilterOptions {
    pub fn is_empty(&self) -> bool {
        self.region.is_none()
            && self.genre.is_none()
            && self.status.is_none()
            && self.year.is_none()
            && self.letter.is_none()
            && self.sort.is_none()
    }
}

/// What a listing request resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRequest {
    Search { keyword: String, page: u32 },
    Filtered { filters: FilterOptions, page: u32 },
    Category { category: String, page: u32 },
}

impl ListRequest {
    /// Site path for this listing
    pub fn path(&self) -> String {
        match self {
            ListRequest::Search { keyword, page } => search_path(keyword, *page),
            ListRequest::Filtered { filters, page } => filtered_list_path(filters, *page),
            ListRequest::Category { category, page } => category_path(category, *page),
        }
    }
}

/// Clamp a page parameter into `1..=MAX_PAGE`; anything unparsable is page 1.
pub fn clamp_page(raw: Option<&str>) -> u32 {
    raw.and_then(|p| p.trim().parse::<i64>().ok())
        .map(|p| p.clamp(1, MAX_PAGE as i64) as u32)
        .unwrap_or(1)
}

fn allowed(value: Option<&str>, set: &[&str]) -> Option<String> {
    let value = value?.trim();
    set.contains(&value).then(|| value.to_string())
}

fn matching(value: Option<&str>, pattern: &Regex) -> Option<String> {
    let value = value?.trim().to_lowercase();
    pattern.is_match(&value).then_some(value)
}

impl ListQuery {
    pub fn validate(&self) -> Result<ListRequest> {
        let page = clamp_page(self.page.as_deref());

        if let Some(keyword) = self.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            if keyword.chars().count() > MAX_KEYWORD_CHARS {
                return Err(ScrapeError::InvalidInput(format!(
                    "keyword must be at most {} characters",
                    MAX_KEYWORD_CHARS
                )));
            }
            return Ok(ListRequest::Search { keyword: keyword.to_string(), page });
        }

        // the site has no multi-genre listing; only the first value is used
        let genre = self.genre.as_deref().and_then(|g| g.split(',').next());

        let filters = FilterOptions {
            region: allowed(self.region.as_deref(), REGIONS),
            genre: allowed(genre, GENRES),
            status: allowed(self.status.as_deref(), STATUSES),
            year: matching(self.year.as_deref(), &YEAR),
            letter: matching(self.letter.as_deref(), &LETTER),
            sort: allowed(self.sort.as_deref(), SORTS),
        };
        if !filters.is_empty() {
            return Ok(ListRequest::Filtered { filters, page });
        }

        let category = matching(self.category.as_deref(), &CATEGORY)
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        Ok(ListRequest::Category { category, page })
    }
}

/// `/s/{keyword}_p{page}.html`, keyword percent-encoded
pub fn search_path(keyword: &str, page: u32) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(keyword.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    format!("/s/{}_p{}.html", encoded, page)
}

/// Legacy single-category browse path
pub fn category_path(category: &str, page: u32) -> String {
    if page <= 1 {
        format!("/list/{}/", category)
    } else {
        format!("/list/{}/index_p{}.html", category, page)
    }
}

pub fn filtered_list_path(filters: &FilterOptions, page: u32) -> String {
    let segment = [
        &filters.region,
        &filters.genre,
        &filters.status,
        &filters.year,
        &filters.letter,
    ]
    .iter()
    .filter_map(|part| part.as_deref())
    .collect::<Vec<_>>()
    .join("_");

    let dir = if segment.is_empty() {
        "/list/".to_string()
    } else {
        format!("/list/{}/", segment)
    };

    match (&filters.sort, page) {
        (None, 0 | 1) => dir,
        (None, page) => format!("{}index_p{}.html", dir, page),
        (Some(sort), 0 | 1) => format!("{}{}.html", dir, sort),
        (Some(sort), page) => format!("{}{}_p{}.html", dir, sort, page),
    }
}
