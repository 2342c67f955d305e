use serde::{Deserialize, Serialize};

/// Opaque signature pair appended to image URLs
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    #[serde(default)]
    pub e: i64,
    #[serde(default)]
    pub m: String,
}

/// Chapter image manifest recovered from the unpacked reader script
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct RawManifest {
    pub bid: u64,
    pub cid: u64,
    #[serde(default)]
    pub bname: String,
    #[serde(default)]
    pub cname: String,
    pub files: Vec<String>,
    pub path: String,
    #[serde(default)]
    pub sl: Signature,
    #[serde(default, alias = "prevId", skip_serializing_if = "Option::is_none")]
    pub prevcid: Option<u64>,
    #[serde(default, alias = "nextId", skip_serializing_if = "Option::is_none")]
    pub nextcid: Option<u64>,
}

impl RawManifest {
    /// All structurally required fields are present
    pub fn is_complete(&self) -> bool {
        self.bid != 0 && self.cid != 0 && !self.files.is_empty() && !self.path.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPayload {
    pub bid: u64,
    pub cid: u64,
    pub bname: String,
    pub cname: String,
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_cid: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cid: Option<u64>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChapterInfo {
    pub id: u64,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChapterGroup {
    pub title: String,
    pub chapters: Vec<ChapterInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MangaDetail {
    pub id: u64,
    pub name: String,
    pub cover: String,
    pub author: String,
    pub status: String,
    pub genres: Vec<String>,
    pub description: String,
    pub last_update: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub chapters: Vec<ChapterGroup>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MangaListItem {
    pub id: u64,
    pub name: String,
    pub cover: String,
    pub latest_chapter: String,
    pub update_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RankTrend {
    Up,
    Down,
    Same,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankItem {
    pub rank: u32,
    pub id: u64,
    pub name: String,
    pub cover: String,
    pub latest_chapter: String,
    pub update_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub trend: RankTrend,
}

/// Rank window shown on a rank page
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RankKind {
    Day,
    Week,
    Month,
    Total,
}

impl RankKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "day" => Some(RankKind::Day),
            "week" => Some(RankKind::Week),
            "month" => Some(RankKind::Month),
            "total" => Some(RankKind::Total),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RankKind::Day => "day",
            RankKind::Week => "week",
            RankKind::Month => "month",
            RankKind::Total => "total",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RankList {
    #[serde(rename = "type")]
    pub kind: RankKind,
    pub items: Vec<RankItem>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub current: u32,
    pub total: u32,
    pub total_items: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MangaListPage {
    pub items: Vec<MangaListItem>,
    pub pagination: PaginationInfo,
}

/// Envelope returned by every API route
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
}

impl ApiResponse<()> {
    pub fn err(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()) }
    }
}
