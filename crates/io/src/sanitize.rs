// Byte-level repair of Tally exports before they reach the XML parser.
//
// Tally writes UTF-16LE, Windows-1252 mislabelled as UTF-8, raw C0 control
// characters and character references to them. None of these survive a
// conforming parser, so every input passes through here first. Sanitizing
// never fails: the worst case is a lossy decode plus a warning.

use std::borrow::Cow;
use std::path::Path;
use std::sync::OnceLock;

use encoding_rs::{CoderResult, Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use regex::{Captures, Regex};

/// Inputs above this size are decoded in one streaming pass.
pub const LARGE_FILE_THRESHOLD: usize = 100 * 1024 * 1024;

const DECODE_CHUNK: usize = 1024 * 1024;
const MAX_REPORTED_OFFSETS: usize = 20;
const MAX_REPORTED_REFS: usize = 10;

/// Bytes Windows-1252 leaves undefined.
const CP1252_UNDEFINED: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];

#[derive(Debug, Clone, Default)]
pub struct SanitizeOptions<'a> {
    /// Source label, usually the file path. Used for logging and backup naming.
    pub source: &'a str,
    /// When set, the untouched input is copied here before any repair.
    pub backup_dir: Option<&'a Path>,
}

/// Clean UTF-8 text ready for parsing.
#[derive(Debug, Clone)]
pub struct Sanitized {
    pub text: String,
    /// Label of the encoding the input was decoded from.
    pub encoding: String,
    pub warnings: Vec<String>,
}

/// Repair raw export bytes into parseable UTF-8.
pub fn sanitize(raw: &[u8], opts: &SanitizeOptions<'_>) -> Sanitized {
    sanitize_with_threshold(raw, opts, LARGE_FILE_THRESHOLD)
}

pub(crate) fn sanitize_with_threshold(
    raw: &[u8],
    opts: &SanitizeOptions<'_>,
    large_threshold: usize,
) -> Sanitized {
    let mut warnings = Vec::new();

    if let Some(dir) = opts.backup_dir {
        if let Err(e) = write_backup(raw, opts.source, dir) {
            warnings.push(format!("Could not write raw backup: {e}"));
        }
    }

    if raw.len() > large_threshold {
        return sanitize_large(raw, opts.source, warnings);
    }

    let (decoded, encoding) = decode(raw);
    if encoding != "utf-8" {
        log::info!("{}: Re-encoded from {}", opts.source, encoding);
        warnings.push(format!("Re-encoded from {encoding} to UTF-8"));
    }

    let mut removed = RemovedChars::default();
    let mut text = String::with_capacity(decoded.len());
    push_filtered(&decoded, 0, &mut text, &mut removed);
    drop(decoded);

    finish(text, encoding.to_string(), opts.source, removed, warnings)
}

fn sanitize_large(raw: &[u8], source: &str, mut warnings: Vec<String>) -> Sanitized {
    let (encoding, bom_len) = Encoding::for_bom(raw).unwrap_or((UTF_8, 0));
    let label = match bom_len {
        0 => "utf-8",
        _ => bom_label(encoding),
    };
    log::info!("{}: Large file mode ({} bytes), encoding={}", source, raw.len(), label);
    warnings.push(format!("Large file mode: Re-encoded from {label} to UTF-8"));

    let mut decoder = encoding.new_decoder_with_bom_removal();
    let mut text = String::with_capacity(raw.len());
    let mut buf = String::with_capacity(
        decoder
            .max_utf8_buffer_length(DECODE_CHUNK)
            .unwrap_or(DECODE_CHUNK * 3),
    );
    let mut removed = RemovedChars::default();
    let mut decoded_len = 0usize;

    let mut drain = |input: &[u8], last: bool, buf: &mut String, text: &mut String| {
        let mut input = input;
        loop {
            let (result, read, _) = decoder.decode_to_string(input, buf, last);
            input = &input[read..];
            push_filtered(buf, decoded_len, text, &mut removed);
            decoded_len += buf.len();
            buf.clear();
            if let CoderResult::InputEmpty = result {
                break;
            }
        }
    };

    for chunk in raw.chunks(DECODE_CHUNK) {
        drain(chunk, false, &mut buf, &mut text);
    }
    drain(&[], true, &mut buf, &mut text);

    finish(text, label.to_string(), source, removed, warnings)
}

// Shared tail of both paths: report stripped controls, strip bad references,
// fix the declaration.
fn finish(
    mut text: String,
    encoding: String,
    source: &str,
    removed: RemovedChars,
    mut warnings: Vec<String>,
) -> Sanitized {
    if let Some(w) = removed.warning() {
        log::warn!("{source}: {w}");
        warnings.push(w);
    }

    let (stripped, bad_refs) = strip_invalid_char_refs(&text);
    if let Cow::Owned(s) = stripped {
        text = s;
    }
    if !bad_refs.is_empty() {
        let shown: Vec<&str> = bad_refs.iter().take(MAX_REPORTED_REFS).map(String::as_str).collect();
        let w = format!(
            "Removed {} invalid character reference(s): {:?}",
            bad_refs.len(),
            shown
        );
        log::warn!("{source}: {w}");
        warnings.push(w);
    }

    fix_declaration(&mut text);

    Sanitized { text, encoding, warnings }
}

// ---------------------------------------------------------------------------
// Encoding detection
// ---------------------------------------------------------------------------

fn bom_label(encoding: &'static Encoding) -> &'static str {
    if encoding == UTF_16LE {
        "utf-16-le"
    } else if encoding == UTF_16BE {
        "utf-16-be"
    } else {
        "utf-8-sig"
    }
}

/// Decode to text, returning the label of the winning encoding.
fn decode(raw: &[u8]) -> (Cow<'_, str>, &'static str) {
    // BOM first. A BOM that lies (undecodable body) falls through to the
    // candidate chain.
    if let Some((encoding, bom_len)) = Encoding::for_bom(raw) {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(&raw[bom_len..]) {
            return (text, bom_label(encoding));
        }
    }

    if let Ok(text) = std::str::from_utf8(raw) {
        return (Cow::Borrowed(text), "utf-8");
    }
    if let Some(text) = decode_utf16_unmarked(raw) {
        return (Cow::Owned(text), "utf-16");
    }
    if let Some(text) = decode_cp1252(raw) {
        return (Cow::Owned(text), "windows-1252");
    }
    if let Some(text) = decode_latin1(raw) {
        return (Cow::Owned(text), "latin-1");
    }
    (String::from_utf8_lossy(raw), "utf-8(replaced)")
}

/// BOM-less UTF-16 is only believed when it decodes cleanly and opens with `<`.
fn decode_utf16_unmarked(raw: &[u8]) -> Option<String> {
    if raw.len() < 2 || raw.len() % 2 != 0 {
        return None;
    }
    let text = UTF_16LE.decode_without_bom_handling_and_without_replacement(raw)?;
    if text.starts_with('<') {
        Some(text.into_owned())
    } else {
        None
    }
}

fn decode_cp1252(raw: &[u8]) -> Option<String> {
    if raw.iter().any(|b| CP1252_UNDEFINED.contains(b)) {
        return None;
    }
    let (text, had_errors) = WINDOWS_1252.decode_without_bom_handling(raw);
    if had_errors {
        None
    } else {
        Some(text.into_owned())
    }
}

fn decode_latin1(raw: &[u8]) -> Option<String> {
    Some(raw.iter().map(|&b| b as char).collect())
}

// ---------------------------------------------------------------------------
// Character filtering
// ---------------------------------------------------------------------------

fn is_stripped_char(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{7F}' | '\u{FEFF}')
}

#[derive(Debug, Default)]
struct RemovedChars {
    count: usize,
    offsets: Vec<usize>,
}

impl RemovedChars {
    fn record(&mut self, offset: usize) {
        self.count += 1;
        if self.offsets.len() < MAX_REPORTED_OFFSETS {
            self.offsets.push(offset);
        }
    }

    fn warning(&self) -> Option<String> {
        (self.count > 0).then(|| {
            format!(
                "Removed {} invalid XML control character(s) at byte offsets: {:?}",
                self.count, self.offsets
            )
        })
    }
}

/// Append `src` to `out` minus illegal characters. `base` is the offset of
/// `src` within the whole decoded text.
fn push_filtered(src: &str, base: usize, out: &mut String, removed: &mut RemovedChars) {
    if !src.chars().any(is_stripped_char) {
        out.push_str(src);
        return;
    }
    for (i, c) in src.char_indices() {
        if is_stripped_char(c) {
            removed.record(base + i);
        } else {
            out.push(c);
        }
    }
}

fn is_legal_xml_char(cp: u32) -> bool {
    matches!(cp, 0x9 | 0xA | 0xD | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF)
}

fn char_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)&#(?:x([0-9a-f]+)|([0-9]+));").expect("valid regex"))
}

fn declaration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<\?xml[^?]*encoding=["']([^"']+)["'][^?]*\?>"#).expect("valid regex")
    })
}

/// Drop `&#N;` / `&#xN;` references to code points XML 1.0 forbids.
/// Returns the cleaned text and the removed references in source order.
fn strip_invalid_char_refs(text: &str) -> (Cow<'_, str>, Vec<String>) {
    let mut removed = Vec::new();
    let cleaned = char_ref_re().replace_all(text, |caps: &Captures<'_>| {
        let whole = &caps[0];
        let cp = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            (None, None) => None,
        };
        match cp {
            Some(cp) if is_legal_xml_char(cp) => whole.to_string(),
            _ => {
                removed.push(whole.to_string());
                String::new()
            }
        }
    });
    (cleaned, removed)
}

/// Rewrite the first declaration's encoding attribute to `utf-8`.
fn fix_declaration(text: &mut String) {
    let range = match declaration_re().captures(text).and_then(|c| c.get(1)) {
        Some(enc) if enc.as_str() != "utf-8" => enc.range(),
        _ => return,
    };
    text.replace_range(range, "utf-8");
}

// ---------------------------------------------------------------------------
// Backup
// ---------------------------------------------------------------------------

fn write_backup(raw: &[u8], source: &str, dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let src = Path::new(source);
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let ext = src
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let path = dir.join(format!("{stem}_{stamp}{ext}.bak"));
    std::fs::write(&path, raw)?;
    log::debug!("Raw backup saved to {}", path.display());
    Ok(())
}
