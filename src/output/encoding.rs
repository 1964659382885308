//! Byte-to-text recovery for remote output.
//!
//! MUD servers are sloppy about encodings: most send UTF-8, older ones
//! send Windows-1252, and some mix the two mid-stream. Raw bytes are
//! decoded both ways and the decoding that produced fewer replacement
//! characters wins, with UTF-8 preferred on a tie.

use encoding_rs::{UTF_8, WINDOWS_1252};

/// Decode raw remote bytes into text.
///
/// Total over arbitrary input: undecodable bytes become U+FFFD under
/// whichever decoding is kept. Typographic dash variants are folded to
/// ASCII `-` so fixed-width client rendering stays aligned.
pub fn recover_text(bytes: &[u8]) -> String {
    let (utf8, _) = UTF_8.decode_without_bom_handling(bytes);
    let (legacy, _) = WINDOWS_1252.decode_without_bom_handling(bytes);

    let text = if replacement_count(&utf8) <= replacement_count(&legacy) {
        utf8
    } else {
        legacy
    };

    normalize_dashes(&text)
}

/// Fold Unicode dash and minus variants into ASCII `-`.
pub fn normalize_dashes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2010}'..='\u{2014}' | '\u{2212}' => '-',
            _ => c,
        })
        .collect()
}

fn replacement_count(text: &str) -> usize {
    text.matches('\u{FFFD}').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_utf8_passes_through() {
        assert_eq!(recover_text("héllo, wörld".as_bytes()), "héllo, wörld");
    }

    #[test]
    fn test_windows_1252_fallback() {
        // 0xE9 is é in Windows-1252 but invalid UTF-8
        assert_eq!(recover_text(b"caf\xe9 au lait"), "café au lait");
    }

    #[test]
    fn test_utf8_wins_ties() {
        // Pure ASCII decodes cleanly either way; UTF-8 is kept
        assert_eq!(recover_text(b"plain ascii"), "plain ascii");
    }

    #[test]
    fn test_em_dash_normalized() {
        assert_eq!(recover_text("a\u{2014}b".as_bytes()), "a-b");
        assert_eq!(recover_text("range 1\u{2013}9".as_bytes()), "range 1-9");
    }

    #[test]
    fn test_minus_sign_normalized() {
        assert_eq!(recover_text("\u{2212}42".as_bytes()), "-42");
    }

    #[test]
    fn test_legacy_em_dash_normalized() {
        // 0x97 is an em dash in Windows-1252
        assert_eq!(recover_text(b"one \x97 two"), "one - two");
    }

    #[test]
    fn test_escape_bytes_survive() {
        assert_eq!(recover_text(b"\x1b[31mred\x1b[0m"), "\x1b[31mred\x1b[0m");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(recover_text(b""), "");
    }

    #[test]
    fn test_normalize_dashes_no_dashes() {
        assert_eq!(normalize_dashes("untouched"), "untouched");
    }
}
