//! Remote output processing.
//!
//! Everything between raw bytes off the wire and chat-ready messages:
//! - encoding recovery for mixed UTF-8 / Windows-1252 servers
//! - ANSI escape stripping for heuristic text matching
//! - escape-safe, size-bounded fragmentation
//!
//! # Example
//!
//! ```
//! use mudgate::output::{format_text, recover_text, FormatOptions};
//!
//! let text = recover_text(b"You see: a caf\xe9 counter");
//! let fragments = format_text(&text, &FormatOptions::default());
//! assert_eq!(fragments, vec!["You see: a café counter".to_string()]);
//! ```

mod encoding;
mod formatter;
mod strip;

pub use encoding::{normalize_dashes, recover_text};
pub use formatter::{format_text, FormatOptions, TRUNCATION_NOTICE};
pub use strip::{strip_ansi, strip_ansi_str};
