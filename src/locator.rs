use std::sync::LazyLock;

use regex::Regex;

pub const MAX_FILENAME_CHARS: usize = 200;

static SEPARATOR_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[:/\\?&=#%]+").unwrap());

/// Metadata endpoint for a collection. Only trailing whitespace is trimmed
/// from the identifier, which is inserted without encoding.
pub fn collection_url(provider: &str, collection_id: &str) -> String {
    let collection_id = collection_id.trim_end();
    format!("{provider}/api/object/meta?id={collection_id}&noUrid&resolve-parts")
}

/// Filesystem-safe name derived from a URL: percent-decoded, separator runs
/// collapsed to `_`, at most [`MAX_FILENAME_CHARS`] characters.
pub fn url_to_filename(url: &str) -> String {
    let decoded = percent_decode(url);
    let clean = SEPARATOR_RUNS.replace_all(&decoded, "_");
    clean.chars().take(MAX_FILENAME_CHARS).collect()
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' && idx + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (hex_value(bytes[idx + 1]), hex_value(bytes[idx + 2]))
            {
                out.push(high << 4 | low);
                idx += 3;
                continue;
            }
        }
        out.push(bytes[idx]);
        idx += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
