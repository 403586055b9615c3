//! Text normalization shared by documents and queries.
//!
//! Both sides of a BM25 comparison must go through [`normalize`]; any
//! divergence silently costs recall.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

fn possessive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\w+)'s\b").expect("valid possessive regex"))
}

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("valid punctuation regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

/// NFKC, lowercase, drop `'s` possessives, punctuation → space, collapse
/// whitespace, trim.
pub fn normalize(text: &str) -> String {
    let composed: String = text.nfkc().collect();
    let lowered = composed.to_lowercase();
    let no_possessive = possessive_re().replace_all(&lowered, "$1");
    let no_punct = punctuation_re().replace_all(&no_possessive, " ");
    whitespace_re().replace_all(&no_punct, " ").trim().to_string()
}

/// Tokens of already-normalized text.
pub fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split_whitespace()
}

/// Normalize then tokenize.
pub fn tokenize(text: &str) -> Vec<String> {
    tokens(&normalize(text)).map(str::to_string).collect()
}
