//! Text cleanup for scraped product names.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

static SOLD_OUT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^sold\s*out[:\-\s]*").unwrap());
static SOLD_OUT_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(sold\s*out|soldout|out\s*of\s*stock)\b[:\-\s]*").unwrap()
});
static TRAILING_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$¥€£]\s?\d[\d,]*(?:\.\d{1,2})?$").unwrap());
static BRAND_GLUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i:(vuja\s*d[eé]))(\p{Lu})").unwrap());
static SLUG_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-_]+").unwrap());

/// Short words that read as ordinary words rather than acronyms.
const TITLE_PARTICLES: &[&str] = &[
    "a", "an", "and", "de", "dé", "del", "der", "des", "di", "du", "el", "en", "for", "la", "le", "les",
    "of", "on", "the", "to", "van", "von",
];

/// Collapses every whitespace run (non-breaking spaces included) into one space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Percent-decodes `text`, replacing invalid UTF-8 instead of failing.
pub fn percent_decode(text: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(text.as_bytes())).into_owned()
}

/// Builds a readable title from the last path segment of `url`.
///
/// Returns `url` unchanged when the segment is empty or purely numeric.
pub fn title_from_url(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let segment = path.rsplit('/').find(|s| !s.is_empty()).unwrap_or_default();
    let slug = normalize(&SLUG_SEPARATORS.replace_all(&percent_decode(segment), " "));

    if slug.is_empty() || slug.chars().all(char::is_numeric) {
        return url.to_string();
    }

    slug.split(' ')
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let lower = word.to_lowercase();
    let short = word.chars().count() <= 3 && word.chars().all(char::is_alphabetic);
    if short && !TITLE_PARTICLES.contains(&lower.as_str()) {
        return word.to_uppercase();
    }
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Strips sold-out badges and a trailing price from scraped product text.
///
/// Falls back to [`title_from_url`] when almost nothing is left.
pub fn clean_product_name(raw_text: &str, url: &str) -> String {
    let cleaned = normalize(&percent_decode(raw_text));
    let cleaned = SOLD_OUT_PREFIX.replace(&cleaned, "");
    let cleaned = SOLD_OUT_PHRASE.replace_all(&cleaned, "");
    let cleaned = TRAILING_PRICE.replace(cleaned.trim(), "");
    let cleaned = BRAND_GLUE.replace_all(&cleaned, "$1 $2");
    let cleaned = normalize(&cleaned);

    if cleaned.chars().count() <= 2 {
        title_from_url(url)
    } else {
        cleaned
    }
}
