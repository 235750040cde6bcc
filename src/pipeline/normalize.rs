//! Text normalisation applied to every extractor's output.
//!
//! Three passes, in order:
//! 1. Drop every character outside the allow-list: Unicode alphanumerics
//!    (letters plus every numeric class, so `²`, `½` and `Ⅳ` survive), `_`,
//!    whitespace, `.`, `,`, `-`, `(`, `)`
//! 2. Collapse each whitespace run (spaces, tabs, newlines) to one space
//! 3. Trim both ends
//!
//! Stripping runs before collapsing: `"a $ b"` becomes `"a b"` in a single
//! pass, which keeps the function idempotent. The allow-list is lossy on
//! purpose (currency symbols, `/` in dates and `:` all go) and the
//! extraction prompts are tuned against exactly this output.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const ALLOWED_PUNCTUATION: &str = ".,-()";

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c.is_whitespace() || ALLOWED_PUNCTUATION.contains(c)
}

/// Normalise raw extracted text.
pub fn normalize(input: &str) -> String {
    let s: String = input.chars().filter(|&c| is_allowed(c)).collect();
    let s = RE_WHITESPACE.replace_all(&s, " ");
    s.trim().to_string()
}
