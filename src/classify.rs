//! Phrase heuristics for login and account-creation outcomes.
//!
//! The game server answers `connect` and `create` with free-form prose,
//! not a status code, so authentication state has to be inferred from
//! wording. Matching runs on ANSI-stripped, lowercased text. The whole
//! module is best-effort: unmatched upstream wording yields a false
//! negative, never a crash, and the caller surfaces the raw text so a
//! human can judge.

use crate::output::strip_ansi_str;

/// Judgment over one captured reply to a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginVerdict {
    /// The reply carries a recognized success phrase.
    Accepted,
    /// The reply says the login/create commands are unavailable, which
    /// the server only does once a character is inside the game.
    AlreadyInside,
    /// Nothing recognizable; the attempt is presumed failed.
    Unrecognized,
}

impl LoginVerdict {
    /// Whether the session should be marked authenticated.
    pub fn is_authenticated(self) -> bool {
        !matches!(self, LoginVerdict::Unrecognized)
    }
}

/// Classify a captured reply to a `connect` attempt (or a pre-login
/// buffer peek, where only [`LoginVerdict::Accepted`] can appear).
pub fn classify_login(text: &str) -> LoginVerdict {
    let low = strip_ansi_str(text).to_lowercase();

    if low.contains("you become") {
        return LoginVerdict::Accepted;
    }
    // A room description implies an in-game character.
    if low.contains("exits:") || low.contains("you see:") {
        return LoginVerdict::Accepted;
    }
    // "Connected." style acknowledgements count, but only as a whole
    // word and never off the echoed command line itself ("connect foo
    // bar" echoes back on failure).
    if has_word(&low, "connected") && !low.contains("connect ") {
        return LoginVerdict::Accepted;
    }
    if (low.contains("command 'connect") || low.contains("command 'create"))
        && low.contains("not available")
    {
        return LoginVerdict::AlreadyInside;
    }

    LoginVerdict::Unrecognized
}

/// Whether a captured reply to `create` reports a fresh account.
pub fn creation_succeeded(text: &str) -> bool {
    let low = strip_ansi_str(text).to_lowercase();
    low.contains("created") && low.contains("account")
}

fn has_word(low: &str, word: &str) -> bool {
    low.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token == word)
}
