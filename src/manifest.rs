//! Chapter image manifest extraction from unpacked reader scripts.
//!
//! The reader script embeds its page list in one of a few call shapes. Each
//! shape is handled by a [`ManifestStrategy`]; [`ManifestExtractor`] runs them
//! in priority order and keeps the first complete manifest.

use crate::error::{ScrapeError, UnpackError};
use crate::models::{ChapterPayload, RawManifest, Signature};
use crate::unpacker;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

static IMG_DATA_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SMH\.imgData\((\{[\s\S]+?\})\)").expect("valid regex"));
static READER_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SMH\.reader\((\{[\s\S]+?\})\)").expect("valid regex"));
static BARE_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{[^{}]*"bid"\s*:\s*\d+[^{}]*"files"\s*:\s*\[[^\]]+\][^{}]*\}"#)
        .expect("valid regex")
});

static BAREWORD_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_$][\w$]*)\s*:").expect("valid regex")
});
static DOUBLED_KEY_QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""{2,}([A-Za-z_$][\w$]*)"{2,}\s*:"#).expect("valid regex"));

static PREV_CID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bprevc?id['":\s=]+(\d+)"#).expect("valid regex"));
static NEXT_CID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bnextc?id['":\s=]+(\d+)"#).expect("valid regex"));

/// One way of finding a manifest in unpacked script text
pub trait ManifestStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return a manifest only if this shape parsed; completeness is checked by the caller.
    fn try_extract(&self, script: &str) -> Option<RawManifest>;
}

/// Canonical `SMH.imgData({...})` call
pub struct ImgDataCall;

/// `SMH.reader({...})` call, in either the alternate or the canonical schema
pub struct ReaderCall;

/// Any flat object literal carrying `"bid"` and `"files"`
pub struct BareObject;

/// Field-by-field regex fallback
pub struct ManualFields;

impl ManifestStrategy for ImgDataCall {
    fn name(&self) -> &'static str {
        "imgData"
    }

    fn try_extract(&self, script: &str) -> Option<RawManifest> {
        let caps = IMG_DATA_CALL.captures(script)?;
        parse_canonical(&caps[1])
    }
}

impl ManifestStrategy for ReaderCall {
    fn name(&self) -> &'static str {
        "reader"
    }

    fn try_extract(&self, script: &str) -> Option<RawManifest> {
        let caps = READER_CALL.captures(script)?;
        let json = normalize_json(&caps[1]);
        if let Ok(reader) = serde_json::from_str::<ReaderShape>(&json) {
            return reader.into_manifest();
        }
        serde_json::from_str::<RawManifest>(&json).ok()
    }
}

impl ManifestStrategy for BareObject {
    fn name(&self) -> &'static str {
        "bare-object"
    }

    fn try_extract(&self, script: &str) -> Option<RawManifest> {
        let m = BARE_OBJECT.find(script)?;
        parse_canonical(m.as_str())
    }
}

impl ManifestStrategy for ManualFields {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn try_extract(&self, script: &str) -> Option<RawManifest> {
        extract_fields_manually(script)
    }
}

/// Runs manifest strategies in priority order
pub struct ManifestExtractor {
    strategies: Vec<Box<dyn ManifestStrategy>>,
}

impl ManifestExtractor {
    pub fn new() -> Self {
        Self::with_strategies(vec![
            Box::new(ImgDataCall),
            Box::new(ReaderCall),
            Box::new(BareObject),
            Box::new(ManualFields),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ManifestStrategy>>) -> Self {
        Self { strategies }
    }

    /// First complete manifest wins; missing neighbor ids are recovered from the whole script.
    pub fn extract(&self, script: &str) -> Option<RawManifest> {
        for strategy in &self.strategies {
            let Some(mut manifest) = strategy.try_extract(script) else {
                continue;
            };
            if !manifest.is_complete() {
                log::debug!("Strategy {} produced an incomplete manifest", strategy.name());
                continue;
            }
            recover_neighbors(&mut manifest, script);
            log::debug!(
                "Manifest {}/{} extracted by {} ({} files)",
                manifest.bid,
                manifest.cid,
                strategy.name(),
                manifest.files.len()
            );
            return Some(manifest);
        }
        None
    }
}

impl Default for ManifestExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReaderShape {
    book_id: u64,
    chapter_id: u64,
    #[serde(default)]
    book_name: String,
    #[serde(default)]
    chapter_name: String,
    images: Vec<String>,
    #[serde(default)]
    sl: Option<Signature>,
    #[serde(default, alias = "prevChapterId")]
    prev_id: Option<u64>,
    #[serde(default, alias = "nextChapterId")]
    next_id: Option<u64>,
}

impl ReaderShape {
    /// Split full image URLs into one shared directory and bare filenames
    fn into_manifest(self) -> Option<RawManifest> {
        let mut path: Option<String> = None;
        let mut files = Vec::with_capacity(self.images.len());
        let mut sl = self.sl;

        for image in &self.images {
            let parsed = url::Url::parse(image).ok()?;
            // split the path as written; `Url::path` percent-encodes non-ASCII segments
            let (dir, file) = raw_path(image)?.rsplit_once('/')?;
            let dir = format!("{}/", dir);
            match &path {
                Some(p) if *p != dir => {
                    log::debug!("Reader images span directories {} and {}", p, dir);
                    return None;
                }
                Some(_) => {}
                None => path = Some(dir),
            }
            if sl.is_none() {
                sl = signature_from_query(&parsed);
            }
            files.push(file.to_string());
        }

        Some(RawManifest {
            bid: self.book_id,
            cid: self.chapter_id,
            bname: self.book_name,
            cname: self.chapter_name,
            files,
            path: path?,
            sl: sl.unwrap_or_default(),
            prevcid: self.prev_id,
            nextcid: self.next_id,
        })
    }
}

/// Path of an absolute URL without scheme, host, query or fragment
fn raw_path(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let rest = rest.split(['?', '#']).next()?;
    rest.find('/').map(|start| &rest[start..])
}

fn signature_from_query(url: &url::Url) -> Option<Signature> {
    let mut sl = Signature::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "e" => sl.e = value.parse().ok()?,
            "m" => sl.m = value.into_owned(),
            _ => {}
        }
    }
    (sl.e != 0 && !sl.m.is_empty()).then_some(sl)
}

fn parse_canonical(object: &str) -> Option<RawManifest> {
    let json = normalize_json(object);
    match serde_json::from_str::<RawManifest>(&json) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            log::debug!("Manifest object is not valid JSON after normalization: {}", e);
            None
        }
    }
}

/// Rewrite a JS object literal toward strict JSON
pub fn normalize_json(object: &str) -> String {
    let json = object.replace('\'', "\"");
    let json = BAREWORD_KEY.replace_all(&json, r#"${1}"${2}":"#);
    DOUBLED_KEY_QUOTES
        .replace_all(&json, r#""${1}":"#)
        .into_owned()
}

fn recover_neighbors(manifest: &mut RawManifest, script: &str) {
    if manifest.prevcid.is_none() {
        manifest.prevcid = capture_u64(&PREV_CID, script);
    }
    if manifest.nextcid.is_none() {
        manifest.nextcid = capture_u64(&NEXT_CID, script);
    }
}

fn capture_u64(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn capture_str(re: &Regex, text: &str) -> Option<String> {
    Some(re.captures(text)?.get(1)?.as_str().to_string())
}

fn extract_fields_manually(script: &str) -> Option<RawManifest> {
    static BID: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\bbid['":\s]+(\d+)"#).expect("valid regex"));
    static CID: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\bcid['":\s]+(\d+)"#).expect("valid regex"));
    static BNAME: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\bbname['":\s]+['"]([^'"]+)['"]"#).expect("valid regex"));
    static CNAME: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\bcname['":\s]+['"]([^'"]+)['"]"#).expect("valid regex"));
    static PATH: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\bpath['":\s]+['"]([^'"]+)['"]"#).expect("valid regex"));
    static FILES: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\bfiles['":\s]+\[([^\]]+)\]"#).expect("valid regex"));
    static SL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\bsl['":\s]+\{([^}]+)\}"#).expect("valid regex"));
    static SL_E: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\be['":\s]+(\d+)"#).expect("valid regex"));
    static SL_M: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\bm['":\s]+['"]([^'"]+)['"]"#).expect("valid regex"));

    let bid = capture_u64(&BID, script)?;
    let cid = capture_u64(&CID, script)?;
    let path = capture_str(&PATH, script)?;
    let files: Vec<String> = capture_str(&FILES, script)?
        .split(',')
        .map(|f| f.trim().replace(['\'', '"'], ""))
        .filter(|f| !f.is_empty())
        .collect();

    let mut sl = Signature::default();
    if let Some(body) = capture_str(&SL, script) {
        sl.e = capture_u64(&SL_E, &body).map(|e| e as i64).unwrap_or(0);
        sl.m = capture_str(&SL_M, &body).unwrap_or_default();
    }

    Some(RawManifest {
        bid,
        cid,
        bname: capture_str(&BNAME, script).unwrap_or_default(),
        cname: capture_str(&CNAME, script).unwrap_or_default(),
        files,
        path,
        sl,
        prevcid: capture_u64(&PREV_CID, script),
        nextcid: capture_u64(&NEXT_CID, script),
    })
}

/// Run a chapter page through locate → unpack → extract
pub fn decode_chapter_page(
    html: &str,
    extractor: &ManifestExtractor,
) -> Result<RawManifest, ScrapeError> {
    let packed = unpacker::extract_packed_script(html).ok_or(UnpackError::NotFound)?;
    let script = unpacker::unpack(&packed.source)?;
    extractor.extract(&script).ok_or(ScrapeError::ExtractionFailure)
}

/// Absolute image URL: host + path + file, plus the signature when present
pub fn build_image_url(image_host: &str, path: &str, file: &str, sl: &Signature) -> String {
    let mut url = format!("{}{}{}", image_host.trim_end_matches('/'), path, file);
    if sl.e != 0 && !sl.m.is_empty() {
        let m: String = url::form_urlencoded::byte_serialize(sl.m.as_bytes()).collect();
        url.push_str(&format!("?e={}&m={}", sl.e, m));
    }
    url
}

/// Read payload handed to the reader UI
pub fn chapter_payload(manifest: &RawManifest, image_host: &str) -> ChapterPayload {
    let images: Vec<String> = manifest
        .files
        .iter()
        .map(|file| build_image_url(image_host, &manifest.path, file, &manifest.sl))
        .collect();
    ChapterPayload {
        bid: manifest.bid,
        cid: manifest.cid,
        bname: manifest.bname.clone(),
        cname: manifest.cname.clone(),
        total: images.len(),
        images,
        prev_cid: manifest.prevcid,
        next_cid: manifest.nextcid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = r#"SMH.imgData({"bid":100,"cid":200,"bname":"海賊王","cname":"第2話","files":["001.jpg.webp","002.jpg.webp"],"finished":false,"len":2,"path":"/ps1/h/100/200/","status":1,"block_cc":"","sl":{"e":1700000000,"m":"a1B2c3"},"prevcid":199,"nextcid":201}).preInit();"#;

    const READER: &str = r#"SMH.reader({bookId:100,chapterId:200,bookName:'海賊王',chapterName:'第2話',images:['https://i.hamreus.com/ps1/h/100/200/001.jpg.webp?e=1700000000&m=a1B2c3','https://i.hamreus.com/ps1/h/100/200/002.jpg.webp?e=1700000000&m=a1B2c3'],prevId:199,nextId:201}).init();"#;

    #[test]
    fn test_canonical_shape() {
        let m = ManifestExtractor::new().extract(CANONICAL).unwrap();
        assert_eq!(m.bid, 100);
        assert_eq!(m.cid, 200);
        assert_eq!(m.bname, "海賊王");
        assert_eq!(m.files, vec!["001.jpg.webp", "002.jpg.webp"]);
        assert_eq!(m.path, "/ps1/h/100/200/");
        assert_eq!(m.sl, Signature { e: 1700000000, m: "a1B2c3".into() });
        assert_eq!(m.prevcid, Some(199));
        assert_eq!(m.nextcid, Some(201));
    }

    #[test]
    fn test_reader_shape_matches_canonical() {
        let extractor = ManifestExtractor::new();
        let canonical = extractor.extract(CANONICAL).unwrap();
        let reader = extractor.extract(READER).unwrap();
        assert_eq!(canonical, reader);
    }

    #[test]
    fn test_reader_shape_keeps_non_ascii_path() {
        let canonical = r#"SMH.imgData({"bid":9,"cid":190,"bname":"一拳超人","cname":"第190话","files":["P0001.jpg.webp","P0002.jpg.webp"],"path":"/ps3/y/一拳超人/第190话/","sl":{"e":1,"m":"q"}}).preInit();"#;
        let reader = r#"SMH.reader({bookId:9,chapterId:190,bookName:'一拳超人',chapterName:'第190话',images:['https://i.hamreus.com/ps3/y/一拳超人/第190话/P0001.jpg.webp?e=1&m=q','https://i.hamreus.com/ps3/y/一拳超人/第190话/P0002.jpg.webp?e=1&m=q']}).init();"#;

        let extractor = ManifestExtractor::new();
        let from_reader = extractor.extract(reader).unwrap();
        assert_eq!(from_reader.path, "/ps3/y/一拳超人/第190话/");
        assert_eq!(from_reader.files, vec!["P0001.jpg.webp", "P0002.jpg.webp"]);
        assert_eq!(extractor.extract(canonical).unwrap(), from_reader);
    }

    #[test]
    fn test_raw_path() {
        assert_eq!(raw_path("https://i.hamreus.com/a/b.jpg?e=1#x"), Some("/a/b.jpg"));
        assert_eq!(raw_path("https://i.hamreus.com"), None);
    }

    #[test]
    fn test_reader_images_in_different_directories_rejected() {
        let script = r#"SMH.reader({bookId:1,chapterId:2,images:['https://i.hamreus.com/a/1.jpg','https://i.hamreus.com/b/2.jpg']})"#;
        assert!(ReaderCall.try_extract(script).is_none());
    }

    #[test]
    fn test_single_quotes_and_bare_keys() {
        let script = r#"SMH.imgData({bid:5,cid:6,bname:'x',cname:'y',files:['1.png'],path:'/p/',sl:{e:1,m:'z'}})"#;
        let m = ImgDataCall.try_extract(script).unwrap();
        assert_eq!(m.bid, 5);
        assert_eq!(m.files, vec!["1.png"]);
        assert_eq!(m.sl.m, "z");
    }

    #[test]
    fn test_neighbors_recovered_outside_object() {
        let script = r#"SMH.imgData({"bid":1,"cid":2,"files":["a.jpg"],"path":"/p/"}).preInit();var prevcid = 11; nextcid=13;"#;
        let m = ManifestExtractor::new().extract(script).unwrap();
        assert_eq!(m.prevcid, Some(11));
        assert_eq!(m.nextcid, Some(13));
    }

    #[test]
    fn test_manual_fallback_on_broken_json() {
        // The trailing comma inside files breaks strict JSON parsing.
        let script = r#"SMH.imgData({"bid":7,"cid":8,"bname":"b","cname":"c","files":["1.jpg","2.jpg",],"path":"/x/","sl":{"e":9,"m":"q"},"prevcid":3})"#;
        assert!(ImgDataCall.try_extract(script).is_none());
        let m = ManifestExtractor::new().extract(script).unwrap();
        assert_eq!(m.bid, 7);
        assert_eq!(m.cid, 8);
        assert_eq!(m.files, vec!["1.jpg", "2.jpg"]);
        assert_eq!(m.sl, Signature { e: 9, m: "q".into() });
        assert_eq!(m.prevcid, Some(3));
        assert_eq!(m.nextcid, None);
    }

    #[test]
    fn test_manual_cid_not_confused_with_prevcid() {
        let script = r#"x={prevcid:1,bid:2,cid:3,path:'/p/',files:['a.jpg',]}"#;
        let m = extract_fields_manually(script).unwrap();
        assert_eq!(m.cid, 3);
        assert_eq!(m.prevcid, Some(1));
    }

    #[test]
    fn test_incomplete_manifest_is_failure() {
        let script = r#"SMH.imgData({"bid":1,"cid":2,"files":["a.jpg"],"path":""})"#;
        assert!(ManifestExtractor::new().extract(script).is_none());
        assert!(ManifestExtractor::new().extract("var nothing = 1;").is_none());
    }

    #[test]
    fn test_custom_strategy_order() {
        struct Fixed;
        impl ManifestStrategy for Fixed {
            fn name(&self) -> &'static str {
                "fixed"
            }
            fn try_extract(&self, _script: &str) -> Option<RawManifest> {
                Some(RawManifest {
                    bid: 1,
                    cid: 2,
                    files: vec!["f.jpg".into()],
                    path: "/f/".into(),
                    ..Default::default()
                })
            }
        }
        let extractor = ManifestExtractor::with_strategies(vec![Box::new(Fixed), Box::new(ImgDataCall)]);
        assert_eq!(extractor.extract(CANONICAL).unwrap().path, "/f/");
    }

    #[test]
    fn test_build_image_url() {
        let sl = Signature { e: 123, m: "a+b/c=".into() };
        assert_eq!(
            build_image_url("https://i.hamreus.com/", "/ps1/x/", "1.jpg", &sl),
            "https://i.hamreus.com/ps1/x/1.jpg?e=123&m=a%2Bb%2Fc%3D"
        );
        assert_eq!(
            build_image_url("https://i.hamreus.com", "/ps1/x/", "1.jpg", &Signature::default()),
            "https://i.hamreus.com/ps1/x/1.jpg"
        );
    }

    #[test]
    fn test_chapter_payload() {
        let m = ManifestExtractor::new().extract(CANONICAL).unwrap();
        let payload = chapter_payload(&m, "https://i.hamreus.com");
        assert_eq!(payload.total, 2);
        assert_eq!(payload.total, m.files.len());
        assert_eq!(
            payload.images[1],
            "https://i.hamreus.com/ps1/h/100/200/002.jpg.webp?e=1700000000&m=a1B2c3"
        );
        assert_eq!(payload.prev_cid, Some(199));
    }
}
