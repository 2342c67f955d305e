use super::{
    comic_id, element_text, first_attr, first_text, parse_pagination, parse_score, selector,
    SiteUrls,
};
use crate::models::{MangaListItem, MangaListPage};
use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::LazyLock;

static UPDATED_ON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"更新[于於][：:]?\s*(\d{4}-\d{1,2}-\d{1,2})").expect("valid regex"));
static ANY_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{1,2}-\d{1,2}").expect("valid regex"));

#[derive(Debug, Clone, Copy)]
enum Template {
    /// Keyword search results
    Search,
    /// Category browse grid
    Browse,
}

/// Row containers in the order they are tried
const LAYOUTS: &[(&str, Template)] = &[
    (".book-result li.cf", Template::Search),
    ("#contList li", Template::Browse),
    (".book-list li", Template::Browse),
];

/// Parse a browse or search listing page. An empty listing is a valid result.
pub fn parse_manga_list(html: &str, site: &SiteUrls) -> MangaListPage {
    let document = Html::parse_document(html);
    let mut items = Vec::new();

    for (css, template) in LAYOUTS {
        let rows: Vec<ElementRef> = document.select(&selector(css)).collect();
        if rows.is_empty() {
            continue;
        }
        items = rows
            .into_iter()
            .filter_map(|row| match template {
                Template::Search => parse_search_row(row, site),
                Template::Browse => parse_browse_row(row, site),
            })
            .collect();
        if !items.is_empty() {
            log::debug!("Listing parsed with {} ({} rows)", css, items.len());
            break;
        }
    }

    let pagination = parse_pagination(&document, items.len());
    MangaListPage { items, pagination }
}

fn parse_search_row(row: ElementRef, site: &SiteUrls) -> Option<MangaListItem> {
    let link = row.select(&selector(".book-cover a.bcover, .book-detail dt a")).next()?;
    let id = comic_id(link.value().attr("href")?)?;

    let cover = first_attr(row, ".book-cover img", &["src", "data-src", "data-original"])
        .map(|c| site.absolutize(&c))
        .unwrap_or_default();

    let name = link
        .value()
        .attr("title")
        .map(str::to_string)
        .or_else(|| first_attr(row, ".book-detail dt a", &["title"]))
        .or_else(|| first_text(row, ".book-detail dt a"))
        .unwrap_or_default();

    let latest_chapter = first_text(row, ".book-cover .tt")
        .or_else(|| first_text(row, ".book-detail .status a"))
        .unwrap_or_default();

    let detail_text = row
        .select(&selector(".book-detail"))
        .next()
        .map(|d| d.text().collect::<String>())
        .unwrap_or_default();
    let update_time = ANY_DATE
        .find(&detail_text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let score = first_text(row, ".book-cover em")
        .or_else(|| first_text(row, ".book-score strong"))
        .and_then(|s| parse_score(&s));

    Some(MangaListItem { id, name, cover, latest_chapter, update_time, score })
}

fn parse_browse_row(row: ElementRef, site: &SiteUrls) -> Option<MangaListItem> {
    let link = row
        .select(&selector("a"))
        .find(|a| a.value().attr("href").and_then(comic_id).is_some())?;
    let id = link.value().attr("href").and_then(comic_id)?;

    let cover = first_attr(row, "img", &["src", "data-src", "data-original"])
        .map(|c| site.absolutize(&c))
        .unwrap_or_default();

    let name = link
        .value()
        .attr("title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| first_text(row, "p.ell a"))
        .or_else(|| first_text(row, "p.ell"))
        .unwrap_or_default();

    let latest_chapter = first_text(row, ".tt").unwrap_or_default();

    let update_time = row
        .select(&selector(".updateon"))
        .next()
        .map(|u| u.text().collect::<String>())
        .and_then(|t| UPDATED_ON.captures(&t).map(|c| c[1].to_string()))
        .unwrap_or_default();

    let score = row
        .select(&selector(".updateon em, em.score, .score-avg em"))
        .map(element_text)
        .find(|t| !t.is_empty())
        .and_then(|t| parse_score(&t));

    Some(MangaListItem { id, name, cover, latest_chapter, update_time, score })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROWSE: &str = r#"
<html><body>
<ul id="contList">
  <li>
    <a class="bcover" href="/comic/1001/" title="進擊的巨人"><img src="//cf.mhgui.com/cpic/b/1001.jpg"><span class="tt">第139話</span></a>
    <p class="ell"><a href="/comic/1001/">進擊的巨人</a></p>
    <span class="updateon">更新于：2023-04-09 <em>9.6</em></span>
  </li>
  <li>
    <a class="bcover" href="/comic/1002/"><img data-src="//cf.mhgui.com/cpic/b/1002.jpg"><span class="tt">第5話</span></a>
    <p class="ell"><a href="/comic/1002/">無題漫畫</a></p>
    <span class="updateon">更新于：2024-01-02</span>
  </li>
  <li><a href="/list/japan/">not a comic</a></li>
</ul>
<div class="pager"><span class="current">1</span><a href="/list/japan/index_p2.html">2</a><a>3</a><a>下一页</a></div>
</body></html>"#;

    const SEARCH: &str = r#"
<html><body>
<div class="book-result"><ul>
  <li class="cf">
    <div class="book-cover fl">
      <a class="bcover" href="/comic/2001/" title="海賊王"><img src="//cf.mhgui.com/cpic/h/2001.jpg"><span class="tt">第1100話</span></a>
      <em>9.1</em>
    </div>
    <div class="book-detail"><dl><dt><a href="/comic/2001/" title="海賊王">海賊王</a></dt>
      <dd class="status">狀態：連載中 最新：第1100話 更新于 2024-01-05</dd></dl></div>
  </li>
</ul></div>
<div class="result-count">共 1 条</div>
</body></html>"#;

    #[test]
    fn test_browse_rows() {
        let page = parse_manga_list(BROWSE, &SiteUrls::default());
        assert_eq!(page.items.len(), 2);

        let first = &page.items[0];
        assert_eq!(first.id, 1001);
        assert_eq!(first.name, "進擊的巨人");
        assert_eq!(first.cover, "https://cf.mhgui.com/cpic/b/1001.jpg");
        assert_eq!(first.latest_chapter, "第139話");
        assert_eq!(first.update_time, "2023-04-09");
        assert_eq!(first.score, Some(9.6));

        let second = &page.items[1];
        assert_eq!(second.name, "無題漫畫");
        assert_eq!(second.cover, "https://cf.mhgui.com/cpic/b/1002.jpg");
        assert_eq!(second.score, None);

        assert_eq!(page.pagination.current, 1);
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.total_items, 2);
    }

    #[test]
    fn test_search_rows() {
        let page = parse_manga_list(SEARCH, &SiteUrls::default());
        assert_eq!(page.items.len(), 1);
        let item = &page.items[0];
        assert_eq!(item.id, 2001);
        assert_eq!(item.name, "海賊王");
        assert_eq!(item.latest_chapter, "第1100話");
        assert_eq!(item.update_time, "2024-01-05");
        assert_eq!(item.score, Some(9.1));
        assert_eq!(page.pagination.total_items, 1);
    }

    #[test]
    fn test_empty_listing_is_ok() {
        let page = parse_manga_list("<html><body><p>沒有結果</p></body></html>", &SiteUrls::default());
        assert!(page.items.is_empty());
        assert_eq!(page.pagination.current, 1);
        assert_eq!(page.pagination.total, 1);
    }
}
