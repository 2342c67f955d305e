use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_SITE_URL: &str = "https://www.manhuagui.com";
pub const DEFAULT_IMAGE_HOST: &str = "https://i.hamreus.com";
pub const DEFAULT_CDN_URL: &str = "https://cf.mhgui.com";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub image_proxy: ImageProxyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the HTTP API binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Resolve missing prev/next chapter ids from the manga detail page
    #[serde(default = "default_true")]
    pub resolve_neighbors: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetcherConfig {
    /// Site root used for pages and as Referer
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Host prefixed to manifest paths when building image URLs
    #[serde(default = "default_image_host")]
    pub image_host: String,

    /// CDN used for synthesized cover URLs
    #[serde(default = "default_cdn_url")]
    pub cdn_url: String,

    /// Timeout for HTML page fetches in seconds
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,

    /// Timeout for image fetches in seconds
    #[serde(default = "default_image_timeout")]
    pub image_timeout_secs: u64,

    /// Timeout for the vote API in seconds
    #[serde(default = "default_vote_timeout")]
    pub vote_timeout_secs: u64,

    /// Attempts for chapter page fetches (the only retried request)
    #[serde(default = "default_chapter_attempts")]
    pub chapter_attempts: usize,

    /// Base delay in milliseconds, multiplied by the attempt number
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Optional upstream HTTP proxy, e.g. `http://127.0.0.1:8888`
    #[serde(default)]
    pub proxy: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Entry lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Maximum number of entries per cache
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageProxyConfig {
    /// Hosts the image proxy may fetch from
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
}

fn default_true() -> bool { true }
fn default_bind_addr() -> String { "127.0.0.1:8080".to_string() }
fn default_site_url() -> String { DEFAULT_SITE_URL.to_string() }
fn default_image_host() -> String { DEFAULT_IMAGE_HOST.to_string() }
fn default_cdn_url() -> String { DEFAULT_CDN_URL.to_string() }
fn default_page_timeout() -> u64 { 15 }
fn default_image_timeout() -> u64 { 30 }
fn default_vote_timeout() -> u64 { 5 }
fn default_chapter_attempts() -> usize { 3 }
fn default_retry_base_delay() -> u64 { 1000 }
fn default_cache_ttl() -> u64 { 24 * 60 * 60 }
fn default_cache_capacity() -> usize { 1000 }
fn default_allowed_hosts() -> Vec<String> {
    [
        "i.hamreus.com",
        "us.hamreus.com",
        "eu.hamreus.com",
        "cf.mhgui.com",
        "cf2.mhgui.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            resolve_neighbors: true,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            site_url: default_site_url(),
            image_host: default_image_host(),
            cdn_url: default_cdn_url(),
            page_timeout_secs: 15,
            image_timeout_secs: 30,
            vote_timeout_secs: 5,
            chapter_attempts: 3,
            retry_base_delay_ms: 1000,
            proxy: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for ImageProxyConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowed_hosts(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory, then apply environment overrides.
    /// A missing or malformed file falls back to defaults.
    pub fn load() -> Self {
        let mut cfg = Self::load_from(Path::new("config.toml"));
        cfg.apply_env();
        cfg
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<Config>(&content) {
                    Ok(cfg) => return cfg,
                    Err(e) => log::warn!("Ignoring malformed {}: {}", path.display(), e),
                },
                Err(e) => log::warn!("Could not read {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    fn apply_env(&mut self) {
        if let (Ok(host), Ok(port)) = (std::env::var("PROXY_HOST"), std::env::var("PROXY_PORT")) {
            if let Some(proxy) = proxy_from_parts(&host, &port) {
                self.fetcher.proxy = Some(proxy);
            }
        }
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            if !addr.trim().is_empty() {
                self.server.bind_addr = addr;
            }
        }
    }
}

/// Build a proxy URL from the `PROXY_HOST`/`PROXY_PORT` pair
fn proxy_from_parts(host: &str, port: &str) -> Option<String> {
    let host = host.trim();
    let port: u16 = port.trim().parse().ok()?;
    if host.is_empty() {
        return None;
    }
    if host.starts_with("http://") || host.starts_with("https://") {
        Some(format!("{}:{}", host.trim_end_matches('/'), port))
    } else {
        Some(format!("http://{}:{}", host, port))
    }
}
