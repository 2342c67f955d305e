//! Reverses the `eval(function(p,a,c,k,e,d){...})` packer used by the chapter reader.
//!
//! The packer replaces every identifier in a script with its index in a
//! token table, written in base `radix` (0-9, a-z, then A-Z from 36 up), and
//! ships the table next to the payload. Unpacking rebuilds that index → token
//! dictionary and substitutes it back into the payload.
//!
//! ```
//! use manhuagui_scraper::unpacker::unpack;
//!
//! let packed = "}('0 1',62,2,'hello|world'.split('|'),0,{}))";
//! assert_eq!(unpack(packed).unwrap(), "hello world");
//! ```

use crate::error::UnpackError;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Upper bound on the packed payload accepted for unpacking
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// Minimum payload length accepted by the loose fallback pattern
pub const LOOSE_MIN_PAYLOAD_LEN: usize = 100;

const MAX_RADIX: u32 = 62;

/// How the packed block was located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Found inside an explicit decoder invocation
    Wrapped,
    /// Only the trailing argument shape matched; decoder was synthesized
    Loose,
}

#[derive(Debug, Clone)]
pub struct PackedScript {
    pub source: String,
    pub confidence: Confidence,
}

static WRAPPED_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "hex-eval",
            r#"window\[\\?"\\?x65\\?x76\\?x61\\?x6c\\?"\]\(function\(p,a,c,k,e,d\)\{.*?\}\('.+',\s*\d+,\s*\d+,\s*'[^']+'"#,
        ),
        (
            "eval",
            r"eval\(function\(p,a,c,k,e,d\)\{.*?\}\('.+',\s*\d+,\s*\d+,\s*'[^']+'",
        ),
        (
            "reader-call",
            r"\(function\(p,a,c,k,e,d\)\{.*?\}\('[^']+',\s*\d+,\s*\d+,\s*'[^']+'",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("valid packer pattern")))
    .collect()
});

static LOOSE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\}}\('([^']{{{},}})',\s*(\d+),\s*(\d+),\s*'([^']+)'",
        LOOSE_MIN_PAYLOAD_LEN
    ))
    .expect("valid loose pattern")
});

static ARGS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\}\('(.+)',\s*(\d+),\s*(\d+),\s*'([^']+)'").expect("valid args pattern")
});

static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u:\b)[a-zA-Z0-9]+(?-u:\b)").expect("valid word pattern"));

const SYNTHETIC_DECODER: &str = r#"function(p,a,c,k,e,d){e=function(c){return(c<a?"":e(parseInt(c/a)))+((c=c%a)>35?String.fromCharCode(c+29):c.toString(36))};while(c--)if(k[c])p=p.replace(new RegExp('\\b'+e(c)+'\\b','g'),k[c]);return p}"#;

/// True when the text carries the packer decoder signature
pub fn has_packed_marker(text: &str) -> bool {
    text.contains("p,a,c,k,e,d") || text.contains(r"\x65\x76\x61\x6c")
}

/// Locate the packed block in a page or script.
///
/// Explicit decoder invocations are tried first. Failing those, any
/// `}('<payload>',radix,count,'<tokens>'` tail with a payload of at least
/// [`LOOSE_MIN_PAYLOAD_LEN`] characters is wrapped in a synthetic decoder and
/// returned as [`Confidence::Loose`]. Non-chapter pages yield `None`.
pub fn extract_packed_script(html: &str) -> Option<PackedScript> {
    for (name, pattern) in WRAPPED_PATTERNS.iter() {
        if let Some(m) = pattern.find(html) {
            log::debug!("Packed script located with {} pattern ({} bytes)", name, m.len());
            return Some(PackedScript {
                source: m.as_str().to_string(),
                confidence: Confidence::Wrapped,
            });
        }
    }

    let caps = LOOSE_PATTERN.captures(html)?;
    log::warn!("Packed script located only by loose pattern; treating as low confidence");
    Some(PackedScript {
        source: format!(
            "{}('{}',{},{},'{}'.split('|'))",
            SYNTHETIC_DECODER, &caps[1], &caps[2], &caps[3], &caps[4]
        ),
        confidence: Confidence::Loose,
    })
}

/// Decode a packed script into plain script text
pub fn unpack(packed: &str) -> Result<String, UnpackError> {
    unpack_with_limit(packed, MAX_PAYLOAD_LEN)
}

pub fn unpack_with_limit(packed: &str, max_payload: usize) -> Result<String, UnpackError> {
    // The payload is a substring of the input, so an input this large cannot be valid.
    if packed.len() > max_payload.saturating_mul(4) {
        return Err(UnpackError::PayloadTooLarge { len: packed.len(), max: max_payload });
    }

    let caps = ARGS_PATTERN.captures(packed).ok_or(UnpackError::InvalidFormat)?;
    let payload = &caps[1];
    if payload.len() > max_payload {
        return Err(UnpackError::PayloadTooLarge { len: payload.len(), max: max_payload });
    }

    let radix: u32 = caps[2].parse().map_err(|_| UnpackError::InvalidFormat)?;
    let count: usize = caps[3].parse().map_err(|_| UnpackError::InvalidFormat)?;
    if !(2..=MAX_RADIX).contains(&radix) {
        return Err(UnpackError::InvalidFormat);
    }

    let tokens = split_tokens(&caps[4]);
    let dictionary = build_dictionary(&tokens, radix, count);
    let payload = unescape_js(payload);

    let result = WORD_PATTERN.replace_all(&payload, |caps: &Captures| {
        let word = &caps[0];
        dictionary.get(word).cloned().unwrap_or_else(|| word.to_string())
    });
    Ok(result.into_owned())
}

/// Encode `num` the way the packer's `e(c)` function does.
/// `None` when `radix` is outside `2..=62`.
pub fn encode_base(num: usize, radix: u32) -> Option<String> {
    if !(2..=MAX_RADIX).contains(&radix) {
        return None;
    }
    Some(encode_digits(num, radix as usize))
}

fn encode_digits(num: usize, radix: usize) -> String {
    let digit = |d: usize| -> char {
        if d < 36 {
            std::char::from_digit(d as u32, 36).unwrap_or('0')
        } else {
            char::from_u32(d as u32 + 29).unwrap_or('?')
        }
    };
    if num < radix {
        return digit(num).to_string();
    }
    let mut out = encode_digits(num / radix, radix);
    out.push(digit(num % radix));
    out
}

fn build_dictionary(tokens: &[String], radix: u32, count: usize) -> HashMap<String, String> {
    // Keys past the token table (or with empty tokens) map to themselves,
    // which is the same as leaving them out.
    let mut dictionary = HashMap::with_capacity(count.min(tokens.len()));
    for (i, token) in tokens.iter().enumerate().take(count) {
        if token.is_empty() {
            continue;
        }
        if let Some(key) = encode_base(i, radix) {
            dictionary.insert(key, token.clone());
        }
    }
    dictionary
}

/// Split the token table, decompressing it first when it is an LZ-String blob
fn split_tokens(table: &str) -> Vec<String> {
    if !table.contains('|') {
        if let Some(decompressed) = decompress_lz_base64(table) {
            if !decompressed.is_empty() {
                return decompressed.split('|').map(str::to_string).collect();
            }
        }
    }
    table.split('|').map(str::to_string).collect()
}

/// Decompress an LZ-String `compressToBase64` blob
pub fn decompress_lz_base64(blob: &str) -> Option<String> {
    let units = lz_str::decompress_from_base64(blob.trim())?;
    String::from_utf16(&units).ok()
}

fn unescape_js(s: &str) -> String {
    if !s.contains('\\') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(n @ ('\'' | '"' | '\\')) => out.push(n),
                Some(n) => {
                    out.push('\\');
                    out.push(n);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
