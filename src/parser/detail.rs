use super::{element_text, first_attr, first_text, has_class, natural_cmp, parse_score, selector, SiteUrls};
use crate::filters::REGIONS;
use crate::models::{ChapterGroup, ChapterInfo, MangaDetail};
use crate::unpacker::decompress_lz_base64;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use std::sync::LazyLock;

static CHAPTER_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/comic/(\d+)/(\d+)\.html").expect("valid regex"));
static YEAR_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/list/\d{4}/?$").expect("valid regex"));
static LETTER_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/list/(?:[a-z]|0-9)/?$").expect("valid regex"));
static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{1,2}-\d{1,2}").expect("valid regex"));

const DEFAULT_GROUP: &str = "章節";
const UNKNOWN_AUTHOR: &str = "未知";
const SERIALIZING: &str = "連載中";
const FINISHED: &str = "已完結";

/// Parse a manga detail page. Returns `None` when the page has no title.
pub fn parse_manga_detail(html: &str, id: u64, site: &SiteUrls) -> Option<MangaDetail> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let name = first_text(root, ".book-title h1").or_else(|| first_text(root, "h1"))?;

    let cover = first_attr(root, ".hcover img, .book-cover img", &["src", "data-src"])
        .map(|c| site.absolutize(&c))
        .unwrap_or_else(|| site.cover_url(id));

    let mut authors = Vec::new();
    let mut genres = Vec::new();
    for link in root.select(&selector(".detail-list li a")) {
        let Some(href) = link.value().attr("href") else { continue };
        let text = element_text(link);
        if text.is_empty() {
            continue;
        }
        if href.contains("/author/") {
            if !authors.contains(&text) {
                authors.push(text);
            }
        } else if href.starts_with("/list/") && is_genre_path(href) && !genres.contains(&text) {
            genres.push(text);
        }
    }
    let author = if authors.is_empty() {
        UNKNOWN_AUTHOR.to_string()
    } else {
        authors.join(", ")
    };

    let (status, last_update) = parse_status_line(root);

    let score = first_text(root, "p.score-avg em, .score-avg em")
        .and_then(|s| parse_score(&s))
        .filter(|s| *s > 0.0);

    let description = first_text(root, "#intro-all")
        .map(|t| strip_collapse_marker(&t))
        .filter(|t| !t.is_empty())
        .or_else(|| first_text(root, "#intro-cut"))
        .unwrap_or_default();

    let chapters = parse_chapter_groups(&document, id);
    log::debug!(
        "Parsed detail {} with {} groups ({} chapters)",
        id,
        chapters.len(),
        chapters.iter().map(|g| g.chapters.len()).sum::<usize>()
    );

    Some(MangaDetail {
        id,
        name,
        cover,
        author,
        status,
        genres,
        description,
        last_update,
        score,
        chapters,
    })
}

fn is_genre_path(href: &str) -> bool {
    if YEAR_PATH.is_match(href) || LETTER_PATH.is_match(href) {
        return false;
    }
    let slug = href.trim_start_matches("/list/").trim_end_matches('/');
    !REGIONS.contains(&slug)
}

fn parse_status_line(root: ElementRef) -> (String, String) {
    let line = root
        .select(&selector(".detail-list li"))
        .map(|li| li.text().collect::<String>())
        .find(|t| t.contains("漫画状态") || t.contains("漫畫狀態"));

    let Some(line) = line else {
        return (SERIALIZING.to_string(), String::new());
    };

    let status = if line.contains("完结") || line.contains("完結") {
        FINISHED
    } else {
        SERIALIZING
    };
    let last_update = DATE
        .find(&line)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    (status.to_string(), last_update)
}

fn strip_collapse_marker(text: &str) -> String {
    text.trim()
        .trim_end_matches("收起>>")
        .trim_end_matches("[收起]")
        .trim()
        .to_string()
}

/// Chapter groups, trying the visible lists, then the compressed
/// `#__VIEWSTATE` copy served on adult-warning pages, then bare links.
fn parse_chapter_groups(document: &Html, manga_id: u64) -> Vec<ChapterGroup> {
    let mut seen = HashSet::new();
    let groups = grouped_chapters(document, &mut seen);
    if !groups.is_empty() {
        return groups;
    }

    if let Some(blob) = first_attr(document.root_element(), "#__VIEWSTATE", &["value"]) {
        match decompress_lz_base64(&blob) {
            Some(inner) => {
                let fragment = Html::parse_fragment(&inner);
                let groups = grouped_chapters(&fragment, &mut seen);
                if !groups.is_empty() {
                    return groups;
                }
            }
            None => log::warn!("Chapter list of {} is compressed but did not decode", manga_id),
        }
    }

    let chapters = collect_chapters(document.root_element(), "a", &mut seen)
        .into_iter()
        .filter(|c| {
            CHAPTER_HREF
                .captures(&c.url)
                .and_then(|caps| caps[1].parse::<u64>().ok())
                == Some(manga_id)
        })
        .collect::<Vec<_>>();
    if chapters.is_empty() {
        return Vec::new();
    }
    vec![sorted_group(DEFAULT_GROUP.to_string(), chapters)]
}

fn grouped_chapters(document: &Html, seen: &mut HashSet<u64>) -> Vec<ChapterGroup> {
    let mut groups = Vec::new();
    let mut claimed_lists = HashSet::new();

    for heading in document.select(&selector(".chapter h4")) {
        let title = first_text(heading, "span")
            .or_else(|| Some(element_text(heading)).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| DEFAULT_GROUP.to_string());

        let Some(list) = following_chapter_list(heading) else { continue };
        claimed_lists.insert(list.id());

        let chapters = collect_chapters(list, "li a", seen);
        if !chapters.is_empty() {
            groups.push(sorted_group(title, chapters));
        }
    }

    for list in document.select(&selector(".chapter-list")) {
        if claimed_lists.contains(&list.id()) {
            continue;
        }
        let chapters = collect_chapters(list, "li a", seen);
        if !chapters.is_empty() {
            groups.push(sorted_group(DEFAULT_GROUP.to_string(), chapters));
        }
    }

    groups
}

/// The `.chapter-list` after `heading`, stopping at the next heading
fn following_chapter_list(heading: ElementRef) -> Option<ElementRef> {
    for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
        if sibling.value().name() == "h4" {
            return None;
        }
        if has_class(sibling, "chapter-list") {
            return Some(sibling);
        }
    }
    None
}

fn collect_chapters(root: ElementRef, css: &str, seen: &mut HashSet<u64>) -> Vec<ChapterInfo> {
    let mut chapters = Vec::new();
    for link in root.select(&selector(css)) {
        let Some(href) = link.value().attr("href") else { continue };
        let Some(id) = CHAPTER_HREF
            .captures(href)
            .and_then(|caps| caps[2].parse::<u64>().ok())
        else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        chapters.push(ChapterInfo {
            id,
            name: chapter_name(link),
            url: href.to_string(),
        });
    }
    chapters
}

/// Title attribute, then the span's own text (page counts live in a nested `<i>`)
fn chapter_name(link: ElementRef) -> String {
    if let Some(title) = link.value().attr("title").map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    if let Some(span) = link.select(&selector("span")).next() {
        let own: String = span
            .children()
            .filter_map(|c| c.value().as_text().map(|t| t.to_string()))
            .collect();
        let own = own.trim();
        if !own.is_empty() {
            return own.to_string();
        }
    }
    element_text(link)
}

fn sorted_group(title: String, mut chapters: Vec<ChapterInfo>) -> ChapterGroup {
    chapters.sort_by(|a, b| natural_cmp(&b.name, &a.name));
    ChapterGroup { title, chapters }
}
