use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";
const PATH_MASK_THRESHOLD: usize = 30;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is valid"))
}

/// Redacts emails and path-like strings before they reach logs or responses.
///
/// Emails become `first 3 chars + ***** + last 4 chars`. Afterwards, a string
/// longer than 30 chars that contains a slash is collapsed to its first and
/// last 10 chars around a 10-char mask, discarding the middle. Email masking
/// runs first, so a long path holding an email is masked twice. Lossy by
/// design; empty input is returned unchanged.
pub fn mask_sensitive_data(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let masked = email_regex()
        .replace_all(text, |captures: &regex::Captures<'_>| mask_email(&captures[0]))
        .into_owned();

    let chars: Vec<char> = masked.chars().collect();
    if chars.len() > PATH_MASK_THRESHOLD && (masked.contains('/') || masked.contains('\\')) {
        let head: String = chars[..10].iter().collect();
        let tail: String = chars[chars.len() - 10..].iter().collect();
        return format!("{head}{}{tail}", "*".repeat(10));
    }

    masked
}

fn mask_email(email: &str) -> String {
    let chars: Vec<char> = email.chars().collect();
    // A 6-char match (the regex minimum) would echo overlapping plaintext,
    // so anything shorter than head + tail is starred out entirely.
    if chars.len() < 7 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}*****{tail}")
}

/// Short stable digest for correlating identifiers in logs without exposing
/// them.
pub fn hash_identifier(identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}
