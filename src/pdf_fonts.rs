//! Page fonts and how their string operands map to text.
//!
//! Lookup order for a font:
//!
//! 1. `ToUnicode` CMap (simple or composite fonts), decoded by `lopdf`.
//! 2. `/Encoding` name: one of the standard single-byte encodings.
//! 3. `/Encoding` dictionary: `/BaseEncoding` with `/Differences` applied.
//! 4. No encoding: `StandardEncoding` for simple fonts, UTF-16BE for
//!    composite (Type0) fonts.

use lopdf::{Dictionary, Document, Encoding, Object, ObjectId};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// A page font resource: bold flag plus its decoder.
pub struct PageFont {
    pub bold: bool,
    decoder: FontDecoder,
}

impl PageFont {
    pub fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let base_font = match font.get(b"BaseFont") {
            Ok(Object::Name(n)) => Some(String::from_utf8_lossy(n).into_owned()),
            _ => None,
        };
        Self {
            bold: base_font.as_deref().map(is_bold_font_name).unwrap_or(false),
            decoder: FontDecoder::for_font(doc, font),
        }
    }

    /// Text for one string operand shown with this font.
    pub fn decode(&self, bytes: &[u8]) -> String {
        self.decoder.decode(bytes)
    }
}

pub fn is_bold_font_name(base_font: &str) -> bool {
    let lower = base_font.to_lowercase();
    ["bold", "black", "heavy", "semibold", "demi"]
        .iter()
        .any(|w| lower.contains(w))
}

/// Fonts shared across pages, keyed by object id so each is decoded once.
#[derive(Default)]
pub struct FontCache {
    fonts: HashMap<ObjectId, Rc<PageFont>>,
}

impl FontCache {
    pub fn get(&mut self, doc: &Document, value: &Object) -> Option<Rc<PageFont>> {
        match value {
            Object::Reference(id) => {
                if let Some(font) = self.fonts.get(id) {
                    return Some(Rc::clone(font));
                }
                let dict = doc.get_dictionary(*id).ok()?;
                let font = Rc::new(PageFont::from_dict(doc, dict));
                self.fonts.insert(*id, Rc::clone(&font));
                Some(font)
            }
            Object::Dictionary(dict) => Some(Rc::new(PageFont::from_dict(doc, dict))),
            _ => None,
        }
    }
}

enum FontDecoder {
    /// One code byte per glyph.
    Table(Vec<Option<String>>),
    /// Variable-length codes through a `ToUnicode` CMap.
    CMap(Encoding<'static>),
    /// Two-byte codes read as UTF-16BE.
    Utf16,
    /// Nothing usable: Latin-1, or UTF-16BE behind a byte-order mark.
    Raw,
}

/// Single-byte encodings `lopdf` ships tables for.
const NAMED_ENCODINGS: [&[u8]; 4] = [
    b"StandardEncoding",
    b"WinAnsiEncoding",
    b"MacRomanEncoding",
    b"MacExpertEncoding",
];

impl FontDecoder {
    fn for_font(doc: &Document, font: &Dictionary) -> Self {
        if let Some(decoder) = Self::from_to_unicode(doc, font) {
            return decoder;
        }

        let composite = matches!(font.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Type0");
        let encoding = font
            .get(b"Encoding")
            .ok()
            .and_then(|e| doc.dereference(e).ok())
            .map(|(_, o)| o);

        match encoding {
            Some(Object::Name(name)) if NAMED_ENCODINGS.contains(&name.as_slice()) => {
                Self::table(name, &[]).unwrap_or(FontDecoder::Raw)
            }
            Some(Object::Name(name)) if composite || name.ends_with(b"UCS2-H") => {
                FontDecoder::Utf16
            }
            Some(Object::Dictionary(dict)) => {
                let base = match dict.get(b"BaseEncoding") {
                    Ok(Object::Name(n)) if NAMED_ENCODINGS.contains(&n.as_slice()) => n.as_slice(),
                    _ => b"StandardEncoding".as_slice(),
                };
                let differences = dict
                    .get(b"Differences")
                    .ok()
                    .and_then(|d| doc.dereference(d).ok())
                    .map(|(_, d)| parse_differences(d))
                    .unwrap_or_default();
                Self::table(base, &differences).unwrap_or(FontDecoder::Raw)
            }
            None if composite => FontDecoder::Utf16,
            None => Self::table(b"StandardEncoding", &[]).unwrap_or(FontDecoder::Raw),
            Some(_) => FontDecoder::Raw,
        }
    }

    fn from_to_unicode(doc: &Document, font: &Dictionary) -> Option<Self> {
        let to_unicode = font.get(b"ToUnicode").ok()?;
        let mut synthetic = Dictionary::new();
        synthetic.set("Type", Object::Name(b"Font".to_vec()));
        synthetic.set("Encoding", Object::Name(b"Identity-H".to_vec()));
        synthetic.set("ToUnicode", to_unicode.clone());
        match synthetic.get_font_encoding(doc) {
            Ok(Encoding::UnicodeMapEncoding(cmap)) => {
                Some(FontDecoder::CMap(Encoding::UnicodeMapEncoding(cmap)))
            }
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "unreadable ToUnicode CMap");
                None
            }
        }
    }

    /// Expand a named single-byte encoding into a 256-entry table, then
    /// overlay `/Differences`.
    fn table(name: &[u8], differences: &[(u8, Option<char>)]) -> Option<Self> {
        let mut synthetic = Dictionary::new();
        synthetic.set("Type", Object::Name(b"Font".to_vec()));
        synthetic.set("Encoding", Object::Name(name.to_vec()));
        let encoding = synthetic.get_font_encoding(&Document::new()).ok()?;
        if !matches!(encoding, Encoding::OneByteEncoding(_)) {
            return None;
        }

        let mut table: Vec<Option<String>> = (0..=255u8)
            .map(|code| {
                encoding
                    .bytes_to_string(&[code])
                    .ok()
                    .filter(|s| !s.is_empty())
            })
            .collect();
        for (code, ch) in differences {
            table[*code as usize] = ch.map(String::from);
        }
        Some(FontDecoder::Table(table))
    }

    fn decode(&self, bytes: &[u8]) -> String {
        match self {
            FontDecoder::Table(table) => bytes
                .iter()
                .filter_map(|&b| table[b as usize].as_deref())
                .collect(),
            FontDecoder::CMap(encoding) => encoding
                .bytes_to_string(bytes)
                .map(|s| s.replace('\u{FFFD}', ""))
                .unwrap_or_else(|_| decode_bytes(bytes)),
            FontDecoder::Utf16 => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                strip_controls(String::from_utf16_lossy(&units))
            }
            FontDecoder::Raw => decode_bytes(bytes),
        }
    }
}

/// Latin-1, or UTF-16BE behind a byte-order mark.
pub fn decode_bytes(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return strip_controls(String::from_utf16_lossy(&units));
    }
    strip_controls(bytes.iter().map(|&b| b as char).collect())
}

fn strip_controls(text: String) -> String {
    if text.chars().any(|c| c.is_control() && c != ' ') {
        text.chars().filter(|c| !c.is_control()).collect()
    } else {
        text
    }
}

/// `[code name name … code name …]` → code assignments.
fn parse_differences(obj: &Object) -> Vec<(u8, Option<char>)> {
    let Object::Array(items) = obj else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut code: Option<i64> = None;
    for item in items {
        match item {
            Object::Integer(start) => code = Some(*start),
            Object::Name(glyph) => {
                if let Some(c) = code.filter(|c| (0..=255).contains(c)) {
                    out.push((c as u8, glyph_char(&String::from_utf8_lossy(glyph))));
                }
                code = code.map(|c| c + 1);
            }
            _ => {}
        }
    }
    out
}

/// Unicode for an Adobe glyph name. Covers single letters and digits,
/// `uniXXXX` / `uXXXX`, and common punctuation; anything else is dropped.
fn glyph_char(name: &str) -> Option<char> {
    let name = name.split('.').next().unwrap_or(name);
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() {
            return Some(c);
        }
    }
    for prefix in ["uni", "u"] {
        if let Some(hex) = name.strip_prefix(prefix) {
            if (4..=6).contains(&hex.len()) {
                if let Some(c) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                    return Some(c);
                }
            }
        }
    }
    let c = match name {
        "space" | "nbspace" => ' ',
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        "period" => '.',
        "comma" => ',',
        "colon" => ':',
        "semicolon" => ';',
        "hyphen" | "minus" => '-',
        "endash" => '–',
        "emdash" => '—',
        "quotesingle" => '\'',
        "quoteright" => '’',
        "quoteleft" => '‘',
        "quotedbl" => '"',
        "quotedblleft" => '“',
        "quotedblright" => '”',
        "parenleft" => '(',
        "parenright" => ')',
        "slash" => '/',
        "ampersand" => '&',
        "percent" => '%',
        "exclam" => '!',
        "question" => '?',
        "bullet" => '•',
        "degree" => '°',
        "eacute" => 'é',
        "egrave" => 'è',
        "agrave" => 'à',
        "ccedilla" => 'ç',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win_ansi_table() {
        let decoder = FontDecoder::table(b"WinAnsiEncoding", &[]).unwrap();
        assert_eq!(decoder.decode(b"Chef\x92s chicken"), "Chef\u{2019}s chicken");
        assert_eq!(decoder.decode(b"caf\xe9"), "café");
    }

    #[test]
    fn test_differences_override_base() {
        let differences = parse_differences(&Object::Array(vec![
            Object::Integer(1),
            Object::Name(b"c".to_vec()),
            Object::Name(b"h".to_vec()),
            Object::Integer(10),
            Object::Name(b"uni00E9".to_vec()),
        ]));
        assert_eq!(
            differences,
            vec![(1, Some('c')), (2, Some('h')), (10, Some('é'))]
        );
        let decoder = FontDecoder::table(b"StandardEncoding", &differences).unwrap();
        assert_eq!(decoder.decode(&[1, 2, b'e', b'f', 10]), "chefé");
    }

    #[test]
    fn test_unknown_encoding_name_is_none() {
        assert!(FontDecoder::table(b"NoSuchEncoding", &[]).is_none());
    }

    #[test]
    fn test_glyph_names() {
        assert_eq!(glyph_char("a"), Some('a'));
        assert_eq!(glyph_char("T.sc"), Some('T'));
        assert_eq!(glyph_char("quoteright"), Some('’'));
        assert_eq!(glyph_char("u1F600"), Some('😀'));
        assert_eq!(glyph_char("g123"), None);
    }

    #[test]
    fn test_composite_without_cmap_reads_utf16() {
        let mut font = Dictionary::new();
        font.set("Type", "Font");
        font.set("Subtype", "Type0");
        font.set("BaseFont", "ABCDEF+Arial-BoldMT");
        font.set("Encoding", "Identity-H");
        let font = PageFont::from_dict(&Document::new(), &font);
        assert!(font.bold);
        assert_eq!(font.decode(&[0x00, 0x63, 0x00, 0x68]), "ch");
    }

    #[test]
    fn test_decode_bytes() {
        assert_eq!(decode_bytes(b"caf\xe9"), "café");
        assert_eq!(decode_bytes(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0x42]), "AB");
        assert_eq!(decode_bytes(b"a\0b"), "ab");
    }

    #[test]
    fn test_bold_font_names() {
        assert!(is_bold_font_name("ABCDEF+Arial-BoldMT"));
        assert!(is_bold_font_name("Montserrat-SemiBold"));
        assert!(!is_bold_font_name("Times-Roman"));
    }
}
