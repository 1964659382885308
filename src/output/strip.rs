//! ANSI escape stripping for heuristic text matching.
//!
//! Game servers decorate their replies with color and cursor sequences.
//! The login classifier needs the plain words underneath, so this module
//! feeds raw output through a VTE parser and keeps only printable text
//! plus line structure.

use vte::{Params, Parser, Perform};

/// Strip ANSI escape codes from raw bytes.
///
/// Returns clean UTF-8 text with all control sequences removed. Newlines,
/// carriage returns and tabs survive; every other control byte is dropped.
pub fn strip_ansi(input: &[u8]) -> String {
    let mut visible = VisibleText::default();
    let mut parser = Parser::new();

    parser.advance(&mut visible, input);

    visible.text
}

/// Strip ANSI codes from a string.
pub fn strip_ansi_str(input: &str) -> String {
    strip_ansi(input.as_bytes())
}

/// VTE performer that keeps printable characters and line breaks.
#[derive(Default)]
struct VisibleText {
    text: String,
}

impl Perform for VisibleText {
    fn print(&mut self, c: char) {
        self.text.push(c);
    }

    fn execute(&mut self, byte: u8) {
        // Keep newline, carriage return and tab. Everything else
        // (bells, backspaces, telnet noise) is dropped.
        if matches!(byte, 0x0A | 0x0D | 0x09) {
            self.text.push(byte as char);
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(
        &mut self,
        _params: &Params,
        _intermediates: &[u8],
        _ignore: bool,
        _action: char,
    ) {
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}
