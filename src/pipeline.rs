//! Request pipelines: fetch → decode/parse → normalize, memoized per request.
//!
//! Every pipeline goes through its own injected [`CacheStore`]; only successful
//! results are cached. The chapter pipeline additionally consults the manga
//! detail page to fill neighbor chapter ids the reader script left out.

use crate::cache::{with_cache, CacheStore, TtlCache};
use crate::config::Config;
use crate::error::{Result, ScrapeError};
use crate::filters::{clamp_page, ListRequest};
use crate::http_client::{self, score_from_votes, FetchedImage, SiteFetcher};
use crate::manifest::{self, ManifestExtractor};
use crate::models::{ChapterPayload, MangaDetail, MangaListPage, RankKind, RankList, RawManifest};
use crate::parser::{self, SiteUrls};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;

/// One cache per result type
#[derive(Clone)]
pub struct Caches {
    pub lists: Arc<dyn CacheStore<MangaListPage>>,
    pub details: Arc<dyn CacheStore<MangaDetail>>,
    pub chapters: Arc<dyn CacheStore<ChapterPayload>>,
    pub ranks: Arc<dyn CacheStore<RankList>>,
}

impl Caches {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            lists: Arc::new(TtlCache::<MangaListPage>::new(ttl, capacity)),
            details: Arc::new(TtlCache::<MangaDetail>::new(ttl, capacity)),
            chapters: Arc::new(TtlCache::<ChapterPayload>::new(ttl, capacity)),
            ranks: Arc::new(TtlCache::<RankList>::new(ttl, capacity)),
        }
    }
}

pub struct Pipeline {
    fetcher: SiteFetcher,
    extractor: ManifestExtractor,
    caches: Caches,
    site: SiteUrls,
    image_host: String,
    allowed_hosts: Vec<String>,
    resolve_neighbors: bool,
}

impl Pipeline {
    pub fn new(config: &Config) -> Result<Self> {
        let caches = Caches::new(Duration::from_secs(config.cache.ttl_secs), config.cache.capacity);
        Self::with_caches(config, caches)
    }

    pub fn with_caches(config: &Config, caches: Caches) -> Result<Self> {
        Ok(Self {
            fetcher: SiteFetcher::new(config.fetcher.clone())?,
            extractor: ManifestExtractor::new(),
            caches,
            site: SiteUrls {
                site_url: config.fetcher.site_url.clone(),
                cdn_url: config.fetcher.cdn_url.clone(),
            },
            image_host: config.fetcher.image_host.clone(),
            allowed_hosts: config.image_proxy.allowed_hosts.clone(),
            resolve_neighbors: config.server.resolve_neighbors,
        })
    }

    pub fn fetcher(&self) -> &SiteFetcher {
        &self.fetcher
    }

    /// Browse, filtered or search listing
    pub async fn list(&self, request: &ListRequest) -> Result<MangaListPage> {
        let path = request.path();
        with_cache(self.caches.lists.as_ref(), &path, || async {
            let html = self.fetcher.fetch_page(&path).await?;
            let page = parser::parse_manga_list(&html, &self.site);
            if page.items.is_empty() {
                log::info!("Listing {} returned no rows", path);
            }
            Ok(page)
        })
        .await
    }

    /// Manga detail, with the vote API as score fallback
    pub async fn detail(&self, id: u64) -> Result<MangaDetail> {
        require_id("manga id", id)?;
        let path = http_client::detail_path(id);
        with_cache(self.caches.details.as_ref(), &path, || async {
            let html = self.fetcher.fetch_page(&path).await?;
            let mut detail = parser::parse_manga_detail(&html, id, &self.site)
                .ok_or_else(|| ScrapeError::Parse(format!("detail page {} has no title", id)))?;

            if detail.score.is_none() {
                match self.fetcher.fetch_vote(id).await {
                    Ok(votes) => detail.score = votes.as_ref().and_then(score_from_votes),
                    Err(e) => log::debug!("Vote lookup for {} failed: {}", id, e),
                }
            }
            Ok(detail)
        })
        .await
    }

    /// Chapter image list with neighbor ids
    pub async fn chapter(&self, bid: u64, cid: u64) -> Result<ChapterPayload> {
        require_id("manga id", bid)?;
        require_id("chapter id", cid)?;
        let key = http_client::chapter_path(bid, cid);
        with_cache(self.caches.chapters.as_ref(), &key, || async {
            let (page, detail) = if self.resolve_neighbors {
                let (page, detail) =
                    tokio::join!(self.fetcher.fetch_chapter_page(bid, cid), self.detail(bid));
                (page, Some(detail))
            } else {
                (self.fetcher.fetch_chapter_page(bid, cid).await, None)
            };

            let mut raw = manifest::decode_chapter_page(&page?, &self.extractor)?;
            match detail {
                Some(Ok(detail)) => fill_from_detail(&mut raw, &detail),
                Some(Err(e)) => log::warn!("Detail for {} unavailable, neighbors not resolved: {}", bid, e),
                None => {}
            }

            let payload = manifest::chapter_payload(&raw, &self.image_host);
            log::info!("Chapter {}/{} decoded with {} images", bid, cid, payload.total);
            Ok(payload)
        })
        .await
    }

    pub async fn rank(&self, kind: RankKind) -> Result<RankList> {
        let path = http_client::rank_path(kind);
        with_cache(self.caches.ranks.as_ref(), path, || async {
            let html = self.fetcher.fetch_page(path).await?;
            let mut list = parser::parse_rank_list(&html, &self.site);
            if list.kind != kind {
                log::warn!("Rank page {} looks like {} ranking", path, list.kind.as_str());
                list.kind = kind;
            }
            Ok(list)
        })
        .await
    }

    pub async fn updates(&self, page: Option<&str>) -> Result<MangaListPage> {
        let path = http_client::update_path(clamp_page(page));
        with_cache(self.caches.lists.as_ref(), &path, || async {
            let html = self.fetcher.fetch_page(&path).await?;
            Ok(parser::parse_update_list(&html, &self.site, Local::now().date_naive()))
        })
        .await
    }

    /// Proxy an image from an allow-listed host
    pub async fn image(&self, url: &str) -> Result<FetchedImage> {
        check_image_host(url, &self.allowed_hosts)?;
        self.fetcher.fetch_image(url).await
    }
}

fn require_id(what: &str, id: u64) -> Result<()> {
    if id == 0 {
        return Err(ScrapeError::InvalidInput(format!("{} must be a positive integer", what)));
    }
    Ok(())
}

/// Accept only http(s) URLs whose host equals or is a subdomain of an allowed host
pub fn check_image_host(raw: &str, allowed: &[String]) -> Result<()> {
    let url = url::Url::parse(raw)
        .map_err(|_| ScrapeError::InvalidInput("url must be an absolute URL".to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScrapeError::InvalidInput("url must use http or https".to_string()));
    }
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let permitted = allowed.iter().any(|a| {
        let a = a.to_ascii_lowercase();
        host == a || host.ends_with(&format!(".{}", a))
    });
    if permitted {
        Ok(())
    } else {
        Err(ScrapeError::HostNotAllowed(host))
    }
}

/// Fill names and missing neighbor ids from the detail chapter list.
///
/// Groups are sorted newest first, so the previous chapter is the entry
/// after `cid` and the next chapter the entry before it.
pub fn fill_from_detail(manifest: &mut RawManifest, detail: &MangaDetail) {
    if manifest.bname.is_empty() {
        manifest.bname = detail.name.clone();
    }
    for group in &detail.chapters {
        let Some(pos) = group.chapters.iter().position(|c| c.id == manifest.cid) else {
            continue;
        };
        if manifest.cname.is_empty() {
            manifest.cname = group.chapters[pos].name.clone();
        }
        if manifest.prevcid.is_none() {
            manifest.prevcid = group.chapters.get(pos + 1).map(|c| c.id);
        }
        if manifest.nextcid.is_none() && pos > 0 {
            manifest.nextcid = Some(group.chapters[pos - 1].id);
        }
        return;
    }
}
