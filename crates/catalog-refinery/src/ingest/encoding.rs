//! Encoding resolution for raw catalog exports.
//!
//! Produces the ordered, de-duplicated list of text encodings the reader
//! walks through. The list starts with the statistical guess over the file's
//! bytes and always ends with Latin-1, which maps every byte to a character
//! and therefore terminates the ladder.

use encoding_rs::{Encoding, ISO_8859_15, UTF_8, WINDOWS_1250, WINDOWS_1252};
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// A text encoding candidate for decoding a raw file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8 without signature handling.
    Utf8,
    /// UTF-8 with an optional leading byte-order mark that is stripped.
    Utf8Sig,
    /// Any single- or multi-byte codec known to `encoding_rs`.
    Codec(&'static Encoding),
    /// ISO-8859-1: one byte, one code point, never fails.
    Latin1,
}

impl TextEncoding {
    /// Wrap an `encoding_rs` codec, folding UTF-8 into [`TextEncoding::Utf8`].
    pub fn from_codec(encoding: &'static Encoding) -> Self {
        if encoding == UTF_8 {
            TextEncoding::Utf8
        } else {
            TextEncoding::Codec(encoding)
        }
    }

    /// Lower-case label used in logs and reports.
    pub fn label(&self) -> String {
        match self {
            TextEncoding::Utf8 => "utf-8".to_string(),
            TextEncoding::Utf8Sig => "utf-8-sig".to_string(),
            TextEncoding::Codec(encoding) => encoding.name().to_ascii_lowercase(),
            TextEncoding::Latin1 => "latin-1".to_string(),
        }
    }

    /// Decode `bytes`, returning `None` on the first invalid sequence.
    pub fn decode_strict<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            TextEncoding::Utf8 => UTF_8.decode_without_bom_handling_and_without_replacement(bytes),
            TextEncoding::Utf8Sig => {
                let body = bytes.strip_prefix(&UTF8_BOM[..]).unwrap_or(bytes);
                UTF_8.decode_without_bom_handling_and_without_replacement(body)
            }
            TextEncoding::Codec(encoding) => {
                encoding.decode_without_bom_handling_and_without_replacement(bytes)
            }
            TextEncoding::Latin1 => Some(Cow::Owned(decode_latin1(bytes))),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Byte-preserving Latin-1 decode.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Undo a Latin-1 decode of text that was really UTF-8.
///
/// Characters outside the Latin-1 range cannot have come from a byte and are
/// kept as-is. Byte runs that are not valid UTF-8 become U+FFFD.
pub fn repair_latin1_mojibake(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut pending: Vec<u8> = Vec::new();
    for ch in text.chars() {
        let code = ch as u32;
        if code <= 0xFF {
            pending.push(code as u8);
        } else {
            out.push_str(&String::from_utf8_lossy(&pending));
            pending.clear();
            out.push(ch);
        }
    }
    out.push_str(&String::from_utf8_lossy(&pending));
    out
}

/// Statistical byte-pattern guess, or `None` for empty input.
pub fn detect_encoding(bytes: &[u8]) -> Option<TextEncoding> {
    if bytes.is_empty() {
        return None;
    }
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, true);
    debug!("Detected encoding guess: {}", guess.name());
    Some(TextEncoding::from_codec(guess))
}

/// Fixed fallback ladder, Latin-1 last.
pub fn fallback_ladder() -> Vec<TextEncoding> {
    vec![
        TextEncoding::Utf8,
        TextEncoding::Utf8Sig,
        TextEncoding::Codec(WINDOWS_1252),
        TextEncoding::Codec(WINDOWS_1250),
        TextEncoding::Codec(ISO_8859_15),
        TextEncoding::Latin1,
    ]
}

/// Build the candidate list for an in-memory file body.
pub fn resolve_bytes(bytes: &[u8]) -> Vec<TextEncoding> {
    let mut seeds = Vec::new();
    if bytes.starts_with(&UTF8_BOM) {
        seeds.push(TextEncoding::Utf8Sig);
    }
    if let Some(guess) = detect_encoding(bytes) {
        seeds.push(guess);
    }
    build_ladder(seeds)
}

/// Build the candidate list for a file on disk.
///
/// Never fails: an unreadable file yields the fixed ladder alone.
pub fn resolve_path(path: &Path) -> Vec<TextEncoding> {
    match std::fs::read(path) {
        Ok(bytes) => resolve_bytes(&bytes),
        Err(e) => {
            warn!(
                "Encoding detection skipped for {}: {}",
                path.display(),
                e
            );
            fallback_ladder()
        }
    }
}

fn build_ladder(seeds: Vec<TextEncoding>) -> Vec<TextEncoding> {
    let mut ladder: Vec<TextEncoding> = Vec::new();
    for candidate in seeds.into_iter().chain(fallback_ladder()) {
        if candidate == TextEncoding::Latin1 || ladder.contains(&candidate) {
            continue;
        }
        ladder.push(candidate);
    }
    ladder.push(TextEncoding::Latin1);
    ladder
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // resolve_bytes() tests
    // =========================================================================

    #[test]
    fn test_ladder_is_deduplicated_and_ends_with_latin1() {
        let ladder = resolve_bytes(b"id,name\n1,plain ascii\n");

        assert_eq!(ladder.last(), Some(&TextEncoding::Latin1));
        for (i, candidate) in ladder.iter().enumerate() {
            assert!(
                !ladder[i + 1..].contains(candidate),
                "{} appears twice",
                candidate
            );
        }
    }

    #[test]
    fn test_bom_puts_utf8_sig_first() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("name\ncafé\n".as_bytes());

        let ladder = resolve_bytes(&bytes);
        assert_eq!(ladder[0], TextEncoding::Utf8Sig);
    }

    #[test]
    fn test_empty_input_degrades_to_fixed_ladder() {
        assert_eq!(resolve_bytes(b""), fallback_ladder());
    }

    #[test]
    fn test_missing_path_degrades_to_fixed_ladder() {
        let ladder = resolve_path(Path::new("/definitely/not/here.csv"));
        assert_eq!(ladder, fallback_ladder());
    }

    // =========================================================================
    // decode tests
    // =========================================================================

    #[test]
    fn test_strict_utf8_rejects_latin1_bytes() {
        let bytes = b"caf\xe9";
        assert!(TextEncoding::Utf8.decode_strict(bytes).is_none());
        assert_eq!(
            TextEncoding::Codec(WINDOWS_1252)
                .decode_strict(bytes)
                .as_deref(),
            Some("café")
        );
    }

    #[test]
    fn test_utf8_sig_strips_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"id");
        assert_eq!(
            TextEncoding::Utf8Sig.decode_strict(&bytes).as_deref(),
            Some("id")
        );
    }

    #[test]
    fn test_latin1_decodes_every_byte() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let text = decode_latin1(&bytes);
        assert_eq!(text.chars().count(), 256);
    }

    #[test]
    fn test_repair_latin1_mojibake() {
        let mojibake = decode_latin1("café".as_bytes());
        assert_eq!(repair_latin1_mojibake(&mojibake), "café");

        // A lone Latin-1 byte cannot be repaired and becomes a replacement marker
        let lone = decode_latin1(b"caf\xe9");
        assert_eq!(repair_latin1_mojibake(&lone), "caf\u{FFFD}");
    }

    #[test]
    fn test_labels() {
        assert_eq!(TextEncoding::Utf8.label(), "utf-8");
        assert_eq!(TextEncoding::Codec(WINDOWS_1252).label(), "windows-1252");
        assert_eq!(TextEncoding::Latin1.to_string(), "latin-1");
    }
}
