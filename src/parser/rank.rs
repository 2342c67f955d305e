use super::{comic_id, element_text, first_text, has_class, parse_score, selector, SiteUrls};
use crate::models::{RankItem, RankKind, RankList, RankTrend};
use scraper::{ElementRef, Html};

/// Parse a rank page. The window is read from the page itself.
pub fn parse_rank_list(html: &str, site: &SiteUrls) -> RankList {
    let document = Html::parse_document(html);
    let kind = detect_window(&document);

    let mut items = Vec::new();
    for row in document.select(&selector("table.rank-detail tr")) {
        if row.select(&selector("th")).next().is_some()
            || has_class(row, "rank-split")
            || has_class(row, "rank-split-first")
        {
            continue;
        }
        match parse_row(row, site, items.len() as u32 + 1) {
            Some(item) => items.push(item),
            None => log::debug!("Skipping rank row without a comic link"),
        }
    }

    RankList { kind, items }
}

fn detect_window(document: &Html) -> RankKind {
    let root = document.root_element();
    let title = first_text(root, "title").unwrap_or_default();
    if let Some(kind) = window_from_text(&title) {
        return kind;
    }
    first_text(root, ".bar-tab li.selected a, .bar-tab li.active a")
        .and_then(|t| window_from_text(&t))
        .unwrap_or(RankKind::Day)
}

fn window_from_text(text: &str) -> Option<RankKind> {
    if text.contains("周排行") || text.contains("週排行") {
        Some(RankKind::Week)
    } else if text.contains("月排行") {
        Some(RankKind::Month)
    } else if text.contains("总排行") || text.contains("總排行") {
        Some(RankKind::Total)
    } else if text.contains("日排行") {
        Some(RankKind::Day)
    } else {
        None
    }
}

fn parse_row(row: ElementRef, site: &SiteUrls, position: u32) -> Option<RankItem> {
    let link = row.select(&selector(".rank-title h5 a, .rank-title a")).next()?;
    let id = comic_id(link.value().attr("href")?)?;

    let name = link
        .value()
        .attr("title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| element_text(link));

    let rank = first_text(row, ".rank-no span, .rank-no")
        .and_then(|t| t.parse().ok())
        .unwrap_or(position);

    let authors: Vec<String> = row
        .select(&selector(".rank-author a"))
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    let author = (!authors.is_empty()).then(|| authors.join(", "));

    let trend = row
        .select(&selector(".rank-trend span"))
        .next()
        .map(|s| {
            if has_class(s, "trend-up") {
                RankTrend::Up
            } else if has_class(s, "trend-down") {
                RankTrend::Down
            } else {
                RankTrend::Same
            }
        })
        .unwrap_or(RankTrend::Same);

    Some(RankItem {
        rank,
        id,
        name,
        cover: site.cover_url(id),
        latest_chapter: first_text(row, ".rank-update a").unwrap_or_default(),
        update_time: first_text(row, ".rank-time").unwrap_or_default(),
        score: first_text(row, ".rank-score").and_then(|s| parse_score(&s)),
        author,
        trend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEEK: &str = r#"
<html><head><title>漫画周排行榜_看漫画</title></head><body>
<table class="rank-detail">
  <tr><th>排名</th><th>漫画名称</th></tr>
  <tr>
    <td class="rank-no"><span>1</span></td>
    <td class="rank-title"><h5><a href="/comic/301/" title="一拳超人">一拳超人</a></h5></td>
    <td class="rank-author"><a href="/author/1/">ONE</a><a href="/author/2/">村田雄介</a></td>
    <td class="rank-update"><a href="/comic/301/9.html">第200話</a></td>
    <td class="rank-time">2024-01-03</td>
    <td class="rank-score">9.7</td>
    <td class="rank-trend"><span class="trend-up">1</span></td>
  </tr>
  <tr class="rank-split"><td colspan="7"></td></tr>
  <tr>
    <td class="rank-no"><span>2</span></td>
    <td class="rank-title"><h5><a href="/comic/302/">咒術迴戰</a></h5></td>
    <td class="rank-author"></td>
    <td class="rank-update"><a>第250話</a></td>
    <td class="rank-time">2024-01-02</td>
    <td class="rank-score">9.2</td>
    <td class="rank-trend"><span class="trend-down">-1</span></td>
  </tr>
  <tr>
    <td class="rank-no"><span>3</span></td>
    <td class="rank-title"><h5><a href="/comic/303/">海賊王</a></h5></td>
    <td class="rank-trend"><span class="trend-no">0</span></td>
  </tr>
</table>
</body></html>"#;

    #[test]
    fn test_rank_rows() {
        let list = parse_rank_list(WEEK, &SiteUrls::default());
        assert_eq!(list.kind, RankKind::Week);
        assert_eq!(list.items.len(), 3);

        let first = &list.items[0];
        assert_eq!(first.rank, 1);
        assert_eq!(first.id, 301);
        assert_eq!(first.name, "一拳超人");
        assert_eq!(first.author.as_deref(), Some("ONE, 村田雄介"));
        assert_eq!(first.latest_chapter, "第200話");
        assert_eq!(first.update_time, "2024-01-03");
        assert_eq!(first.score, Some(9.7));
        assert_eq!(first.trend, RankTrend::Up);
        assert_eq!(first.cover, "https://cf.mhgui.com/cpic/h/301.jpg");

        assert_eq!(list.items[1].author, None);
        assert_eq!(list.items[1].trend, RankTrend::Down);
        assert_eq!(list.items[2].trend, RankTrend::Same);
        assert_eq!(list.items[2].score, None);
    }

    #[test]
    fn test_window_from_selected_tab() {
        let html = r#"<html><head><title>排行榜</title></head><body>
            <ul class="bar-tab"><li><a href="/rank/">日排行</a></li><li class="selected"><a href="/rank/total.html">總排行</a></li></ul>
            </body></html>"#;
        let list = parse_rank_list(html, &SiteUrls::default());
        assert_eq!(list.kind, RankKind::Total);
        assert!(list.items.is_empty());
    }

    #[test]
    fn test_window_defaults_to_day() {
        assert_eq!(window_from_text("漫画月排行榜"), Some(RankKind::Month));
        assert_eq!(window_from_text("排行"), None);
        let list = parse_rank_list("<html><body></body></html>", &SiteUrls::default());
        assert_eq!(list.kind, RankKind::Day);
    }
}
