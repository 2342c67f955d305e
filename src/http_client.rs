use crate::config::FetcherConfig;
use crate::error::{Result, ScrapeError};
use crate::models::RankKind;
use crate::unpacker;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, REFERER, USER_AGENT};
use reqwest::{Client, ClientBuilder, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

/// User agents rotated per request
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";
const DEFAULT_IMAGE_TYPE: &str = "image/jpeg";

/// Star counts returned by the site's vote API
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteStats {
    #[serde(default)]
    pub s1: u64,
    #[serde(default)]
    pub s2: u64,
    #[serde(default)]
    pub s3: u64,
    #[serde(default)]
    pub s4: u64,
    #[serde(default)]
    pub s5: u64,
}

#[derive(Debug, Deserialize)]
struct VoteResponse {
    #[serde(default)]
    success: bool,
    data: Option<VoteStats>,
}

/// Ten-point score from star votes (1 star = 2 points), one decimal place
pub fn score_from_votes(votes: &VoteStats) -> Option<f64> {
    let counts = [votes.s1, votes.s2, votes.s3, votes.s4, votes.s5].map(|c| c as f64);
    let total: f64 = counts.iter().sum();
    if total == 0.0 {
        return None;
    }
    let weighted: f64 = counts
        .iter()
        .zip([2.0, 4.0, 6.0, 8.0, 10.0])
        .map(|(count, points)| count * points)
        .sum();
    Some((weighted / total * 10.0).round() / 10.0)
}

/// Image bytes with the upstream content type
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// HTTP client for the manga site and its image hosts
pub struct SiteFetcher {
    client: Client,
    config: FetcherConfig,
}

impl SiteFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let mut builder = ClientBuilder::new()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        // Browser-like defaults; the site rejects bare clients
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(PAGE_ACCEPT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-TW,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        match HeaderValue::from_str(&referer_for(&config.site_url)) {
            Ok(referer) => {
                headers.insert(REFERER, referer);
            }
            Err(_) => log::warn!("Site URL {} is not a valid Referer", config.site_url),
        }
        builder = builder.default_headers(headers);

        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
            log::info!("Routing upstream requests through proxy {}", proxy);
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        let client = builder.build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Get a random user agent from the pool
    fn random_user_agent() -> &'static str {
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..USER_AGENTS.len());
        USER_AGENTS[index]
    }

    fn get(&self, url: &str, timeout: Duration) -> RequestBuilder {
        self.client
            .get(url)
            .header(USER_AGENT, Self::random_user_agent())
            .timeout(timeout)
    }

    /// Absolute URL for a site path; absolute URLs pass through
    pub fn url_for(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else {
            format!("{}{}", self.config.site_url.trim_end_matches('/'), path_or_url)
        }
    }

    /// Single-attempt page fetch
    pub async fn fetch_page(&self, path_or_url: &str) -> Result<String> {
        let url = self.url_for(path_or_url);
        log::debug!("GET {}", url);
        let response = self
            .get(&url, Duration::from_secs(self.config.page_timeout_secs))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// Fetch a chapter reader page, retrying until it carries the packed script
    pub async fn fetch_chapter_page(&self, bid: u64, cid: u64) -> Result<String> {
        let path = chapter_path(bid, cid);
        let attempts = self.config.chapter_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.fetch_page(&path).await {
                Ok(body) if unpacker::has_packed_marker(&body) => {
                    if attempt > 1 {
                        log::info!("Chapter {}/{} validated on attempt {}", bid, cid, attempt);
                    }
                    return Ok(body);
                }
                Ok(_) => {
                    log::warn!(
                        "Chapter page {} has no packed script, attempt {}/{}",
                        path,
                        attempt,
                        attempts
                    );
                    last_error = Some(ScrapeError::ValidationFailure { attempts });
                }
                Err(e) => {
                    log::warn!("Chapter page {} failed, attempt {}/{}: {}", path, attempt, attempts, e);
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                let delay = self.config.retry_base_delay_ms * attempt as u64;
                sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(last_error.unwrap_or(ScrapeError::ValidationFailure { attempts }))
    }

    /// Single-attempt image fetch with the site referer
    pub async fn fetch_image(&self, url: &str) -> Result<FetchedImage> {
        let response = self
            .get(url, Duration::from_secs(self.config.image_timeout_secs))
            .header(ACCEPT, IMAGE_ACCEPT)
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_IMAGE_TYPE)
            .to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(FetchedImage { bytes, content_type })
    }

    /// Star votes for a manga; `None` when the API reports no data
    pub async fn fetch_vote(&self, bid: u64) -> Result<Option<VoteStats>> {
        let url = self.url_for(&vote_path(bid));
        let vote: VoteResponse = self
            .get(&url, Duration::from_secs(self.config.vote_timeout_secs))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(vote.data.filter(|_| vote.success))
    }
}

fn referer_for(site_url: &str) -> String {
    format!("{}/", site_url.trim_end_matches('/'))
}

pub fn detail_path(id: u64) -> String {
    format!("/comic/{}/", id)
}

pub fn chapter_path(bid: u64, cid: u64) -> String {
    format!("/comic/{}/{}.html", bid, cid)
}

pub fn vote_path(bid: u64) -> String {
    format!("/tools/vote.ashx?act=get&bid={}", bid)
}

pub fn rank_path(kind: RankKind) -> &'static str {
    match kind {
        RankKind::Day => "/rank/",
        RankKind::Week => "/rank/week.html",
        RankKind::Month => "/rank/month.html",
        RankKind::Total => "/rank/total.html",
    }
}

pub fn update_path(page: u32) -> String {
    if page <= 1 {
        "/update/".to_string()
    } else {
        format!("/update/d{}.html", page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PACKED_BODY: &str =
        r#"<script>window["\x65\x76\x61\x6c"](function(p,a,c,k,e,d){return p;}('0',1,1,'a'.split('|'),0,{}))</script>"#;

    fn fetcher_for(server: &MockServer) -> SiteFetcher {
        let config = FetcherConfig {
            site_url: server.uri(),
            retry_base_delay_ms: 1,
            ..FetcherConfig::default()
        };
        SiteFetcher::new(config).unwrap()
    }

    #[test]
    fn test_random_user_agent() {
        for _ in 0..20 {
            assert!(USER_AGENTS.contains(&SiteFetcher::random_user_agent()));
        }
    }

    #[test]
    fn test_paths() {
        assert_eq!(detail_path(7), "/comic/7/");
        assert_eq!(chapter_path(7, 8), "/comic/7/8.html");
        assert_eq!(rank_path(RankKind::Week), "/rank/week.html");
        assert_eq!(update_path(1), "/update/");
        assert_eq!(update_path(3), "/update/d3.html");
    }

    #[test]
    fn test_score_from_votes() {
        let votes = VoteStats { s1: 0, s2: 0, s3: 1, s4: 1, s5: 1 };
        assert_eq!(score_from_votes(&votes), Some(8.0));
        let votes = VoteStats { s1: 1, s2: 0, s3: 0, s4: 0, s5: 2 };
        assert_eq!(score_from_votes(&votes), Some(7.3));
        assert_eq!(score_from_votes(&VoteStats::default()), None);
    }

    #[test]
    fn test_score_from_huge_vote_counts() {
        let votes = VoteStats { s1: 0, s2: 0, s3: 0, s4: 0, s5: u64::MAX };
        assert_eq!(score_from_votes(&votes), Some(10.0));
        let votes = VoteStats { s1: u64::MAX, s2: 0, s3: 0, s4: 0, s5: u64::MAX };
        assert_eq!(score_from_votes(&votes), Some(6.0));
    }

    #[test]
    fn test_bad_proxy_is_an_error() {
        let config = FetcherConfig { proxy: Some("not a url".into()), ..FetcherConfig::default() };
        assert!(SiteFetcher::new(config).is_err());
    }

    #[tokio::test]
    async fn test_chapter_fetch_retries_until_marker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/comic/1/2.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>busy</html>"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/comic/1/2.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PACKED_BODY))
            .expect(1)
            .mount(&server)
            .await;

        let body = fetcher_for(&server).fetch_chapter_page(1, 2).await.unwrap();
        assert!(body.contains("function(p,a,c,k,e,d)"));
    }

    #[tokio::test]
    async fn test_chapter_fetch_exhausts_with_validation_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/comic/1/2.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>no script</html>"))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher_for(&server).fetch_chapter_page(1, 2).await.unwrap_err();
        assert!(matches!(err, ScrapeError::ValidationFailure { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_chapter_fetch_reports_last_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/comic/1/2.html"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher_for(&server).fetch_chapter_page(1, 2).await.unwrap_err();
        assert!(matches!(err, ScrapeError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_page_fetch_is_single_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/comic/5/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let result = fetcher_for(&server).fetch_page(&detail_path(5)).await;
        assert!(matches!(result, Err(ScrapeError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_image_fetch_sends_referer_and_keeps_type() {
        let server = MockServer::start().await;
        let referer = referer_for(&server.uri());
        Mock::given(method("GET"))
            .and(path("/ps1/a.webp"))
            .and(header("referer", referer.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/webp")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let image = fetcher
            .fetch_image(&format!("{}/ps1/a.webp", server.uri()))
            .await
            .unwrap();
        assert_eq!(image.bytes, vec![1, 2, 3]);
        assert_eq!(image.content_type, "image/webp");
    }

    #[tokio::test]
    async fn test_vote_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tools/vote.ashx"))
            .and(query_param("act", "get"))
            .and(query_param("bid", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": {"s1": 0, "s2": 0, "s3": 0, "s4": 2, "s5": 2}
            })))
            .mount(&server)
            .await;

        let votes = fetcher_for(&server).fetch_vote(42).await.unwrap().unwrap();
        assert_eq!(score_from_votes(&votes), Some(9.0));
    }
}
