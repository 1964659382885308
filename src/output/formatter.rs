//! Escape-safe, size-bounded fragmentation of remote output.
//!
//! Chat platforms cap message length and render color only inside styled
//! code fences. Game output arrives as one unbounded blob of text with
//! inline ANSI styling, so it has to be split into fragments that each
//! fit the delivery budget, never cut a multi-byte escape sequence in
//! half, and carry their own fence plus color reset when styled.
//!
//! The formatter is total: any input text, including pathological byte
//! soup, produces a (possibly empty) fragment list and never fails.

use crate::output::encoding::normalize_dashes;

/// Fixed marker appended when output is cut short by the fragment cap.
pub const TRUNCATION_NOTICE: &str = "…(output truncated)";

const ANSI_FENCE_OPEN: &str = "```ansi\n";
const ANSI_FENCE_CLOSE: &str = "\n```";
const SGR_RESET: &str = "\x1b[0m";

/// Wrapping overhead reserved for styled fragments: the fence strings
/// plus a trailing color reset.
const STYLED_OVERHEAD: usize = ANSI_FENCE_OPEN.len() + ANSI_FENCE_CLOSE.len() + SGR_RESET.len();

/// Fragmentation limits, normally taken from the output config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    /// Upper bound on a delivered fragment's length in bytes, wrapping
    /// markup included.
    pub fragment_size: usize,
    /// Upper bound on the number of fragments per response, truncation
    /// notice included.
    pub max_fragments: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            fragment_size: 1800,
            max_fragments: 8,
        }
    }
}

/// Split remote response text into delivery-ready fragments.
///
/// Line endings are unified and dash variants folded first. Text bearing
/// ANSI color sequences is chunked against a reduced window and each
/// fragment wrapped in an `ansi` code fence terminated by a color reset;
/// plain text is chunked against the full budget. Cuts prefer a newline
/// in the trailing third of the window and never land inside an escape
/// sequence. At most `max_fragments` fragments are returned; when input
/// is cut short the last one is the fixed truncation notice.
pub fn format_text(text: &str, opts: &FormatOptions) -> Vec<String> {
    if opts.fragment_size == 0 || opts.max_fragments == 0 {
        return Vec::new();
    }

    let text = normalize_dashes(&text.replace("\r\n", "\n"));
    if text.trim().is_empty() {
        return Vec::new();
    }

    if text.contains("\x1b[") {
        let window = opts.fragment_size.saturating_sub(STYLED_OVERHEAD).max(1);
        chunk_styled(&text, window, opts.max_fragments)
            .into_iter()
            .map(|fragment| wrap_styled_block(&fragment))
            .collect()
    } else {
        chunk_plain(&text, opts.fragment_size, opts.max_fragments)
    }
}

/// Chunk text with no escape sequences.
fn chunk_plain(text: &str, size: usize, max_fragments: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut rest = text;

    while !rest.is_empty() && chunks.len() < max_fragments {
        if rest.len() <= size {
            chunks.push(rest.to_string());
            rest = "";
            break;
        }
        let limit = window_limit(rest, size);
        let cut = preferred_newline_cut(&rest[..limit], size).unwrap_or(limit);
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }

    finish_chunks(chunks, rest, max_fragments)
}

/// Chunk text carrying ANSI escape sequences. Same shape as the plain
/// chunker, with every cut checked against escape byte ranges.
fn chunk_styled(text: &str, size: usize, max_fragments: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut rest = text;

    while !rest.is_empty() && chunks.len() < max_fragments {
        if rest.len() <= size {
            chunks.push(rest.to_string());
            rest = "";
            break;
        }
        let limit = window_limit(rest, size);
        let mut cut = preferred_newline_cut(&rest[..limit], size).unwrap_or(limit);
        cut = escape_safe_cut(rest, cut);
        if cut == 0 {
            // The window starts inside an escape sequence. Extend
            // forward past it, or fall back to a hard cut.
            cut = match csi_sequence_len(rest) {
                Some(len) => len.min(rest.len()),
                None => limit,
            };
        }
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }

    finish_chunks(chunks, rest, max_fragments)
}

/// Apply the truncation cap, then trim and drop empty fragments.
fn finish_chunks(mut chunks: Vec<String>, rest: &str, max_fragments: usize) -> Vec<String> {
    if !rest.is_empty() {
        // Out of budget with text left over. The last slot goes to the
        // notice so the count never exceeds the cap.
        if chunks.len() >= max_fragments {
            chunks.pop();
        }
        chunks.push(TRUNCATION_NOTICE.to_string());
    }

    chunks
        .into_iter()
        .map(|c| c.trim_end().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Largest window end within `size` bytes that lands on a char boundary.
/// Always at least one character so chunking makes progress.
fn window_limit(rest: &str, size: usize) -> usize {
    if rest.len() <= size {
        return rest.len();
    }
    let mut limit = size;
    while limit > 0 && !rest.is_char_boundary(limit) {
        limit -= 1;
    }
    if limit == 0 {
        limit = rest.chars().next().map_or(rest.len(), char::len_utf8);
    }
    limit
}

/// Prefer cutting right after a newline in the trailing third of the
/// window. A newline at the very start is not a useful cut.
fn preferred_newline_cut(window: &str, size: usize) -> Option<usize> {
    let mut from = size.saturating_sub(size / 3).min(window.len());
    while from > 0 && !window.is_char_boundary(from) {
        from -= 1;
    }
    let nl = window[from..].rfind('\n').map(|i| from + i)?;
    (nl > 0).then_some(nl + 1)
}

/// Move a cut point so it cannot land inside an ANSI escape sequence.
///
/// If the last escape before the cut opens a sequence that completes at
/// or before the cut, the cut stands; otherwise back up to just before
/// the escape byte. Returns 0 when the escape sits at the window start,
/// which callers must resolve by extending forward.
fn escape_safe_cut(text: &str, cut: usize) -> usize {
    if cut == 0 || cut >= text.len() {
        return cut;
    }
    let Some(esc) = text[..cut].rfind('\x1b') else {
        return cut;
    };
    match csi_sequence_len(&text[esc..]) {
        Some(len) if esc + len <= cut => cut,
        _ => esc,
    }
}

/// Length of a complete CSI sequence (`ESC [ params letter`) at the
/// start of `s`, if one is present.
fn csi_sequence_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.len() < 2 || bytes[0] != 0x1b || bytes[1] != b'[' {
        return None;
    }
    let mut i = 2;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b';') {
        i += 1;
    }
    (i < bytes.len() && bytes[i].is_ascii_alphabetic()).then_some(i + 1)
}

/// Wrap a styled fragment in an `ansi` code fence, closing any open
/// color state so styling cannot bleed into surrounding chat markup.
fn wrap_styled_block(fragment: &str) -> String {
    let mut inner = fragment.to_string();
    if !inner.ends_with(SGR_RESET) {
        inner.push_str(SGR_RESET);
    }
    format!("{ANSI_FENCE_OPEN}{inner}{ANSI_FENCE_CLOSE}")
}
