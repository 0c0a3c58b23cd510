use std::sync::OnceLock;

use regex::Regex;

/// What a file name says about how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub prompt_text: String,
    pub sequence_number: u32,
    pub timestamp_token: Option<String>,
}

struct Patterns {
    trailing_number: Regex,
    leading_number: Regex,
    legacy: Regex,
    bare_timestamp: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        // "prompt 3", "prompt_3"
        trailing_number: Regex::new(r"^(?P<prompt>.+?)[ _](?P<n>\d{1,4})$").unwrap(),
        // "003 prompt"
        leading_number: Regex::new(r"^(?P<n>\d+) (?P<prompt>.+)$").unwrap(),
        // "prompt_003_1717351831"
        legacy: Regex::new(r"^(?P<prompt>.+?)_(?P<n>\d{1,4})_(?P<ts>\d[\dT\-]{5,})$").unwrap(),
        // "prompt_1717351831"
        bare_timestamp: Regex::new(r"^(?P<prompt>.+?)_(?P<ts>\d[\dT\-]{5,})$").unwrap(),
    })
}

/// Parse a file stem into prompt and sequence number. The patterns are tried
/// in priority order and only the first match is used; a stem that matches
/// none is all prompt with sequence number 0.
pub fn parse_asset_name(stem: &str) -> ParsedName {
    let p = patterns();
    let stem = stem.trim();
    let number = |s: &str| s.parse::<u32>().unwrap_or(0);

    if let Some(c) = p.trailing_number.captures(stem) {
        return ParsedName { prompt_text: normalize_prompt(&c["prompt"]), sequence_number: number(&c["n"]), timestamp_token: None };
    }
    if let Some(c) = p.leading_number.captures(stem) {
        return ParsedName { prompt_text: normalize_prompt(&c["prompt"]), sequence_number: number(&c["n"]), timestamp_token: None };
    }
    if let Some(c) = p.legacy.captures(stem) {
        return ParsedName {
            prompt_text: normalize_prompt(&c["prompt"]),
            sequence_number: number(&c["n"]),
            timestamp_token: Some(c["ts"].to_string()),
        };
    }
    if let Some(c) = p.bare_timestamp.captures(stem) {
        return ParsedName { prompt_text: normalize_prompt(&c["prompt"]), sequence_number: 0, timestamp_token: Some(c["ts"].to_string()) };
    }
    ParsedName { prompt_text: normalize_prompt(stem), sequence_number: 0, timestamp_token: None }
}

/// Lowercase, underscores folded to spaces, whitespace collapsed.
pub fn normalize_prompt(text: &str) -> String {
    text.to_lowercase().replace('_', " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

const MAX_SANITIZED_CHARS: usize = 60;

/// File-system-safe form of a prompt: lowercase alphanumerics joined by single
/// underscores.
pub fn sanitize_prompt(prompt: &str) -> String {
    let mut out = String::new();
    for ch in prompt.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed: String = out.trim_matches('_').chars().take(MAX_SANITIZED_CHARS).collect();
    let trimmed = trimmed.trim_end_matches('_');
    if trimmed.is_empty() { "sfx".to_string() } else { trimmed.to_string() }
}

pub fn asset_filename(prompt: &str, sequence_number: u32, extension: &str) -> String {
    format!("{}_{}.{}", sanitize_prompt(prompt), sequence_number, extension.trim_start_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(stem: &str) -> (String, u32, Option<String>) {
        let p = parse_asset_name(stem);
        (p.prompt_text, p.sequence_number, p.timestamp_token)
    }

    #[test]
    fn trailing_number_wins_first() {
        assert_eq!(parsed("Explosion 2"), ("explosion".into(), 2, None));
        assert_eq!(parsed("big_boom_3"), ("big boom".into(), 3, None));
        assert_eq!(parsed("laser_2000_1"), ("laser 2000".into(), 1, None));
    }

    #[test]
    fn leading_number_form() {
        assert_eq!(parsed("007 door slam"), ("door slam".into(), 7, None));
    }

    #[test]
    fn legacy_and_bare_timestamp_forms() {
        assert_eq!(parsed("dog_bark_002_1717351831"), ("dog bark".into(), 2, Some("1717351831".into())));
        assert_eq!(parsed("dog_bark_20250602T215031"), ("dog bark".into(), 0, Some("20250602T215031".into())));
    }

    #[test]
    fn unmatched_stem_is_all_prompt() {
        assert_eq!(parsed("Rain On Tin Roof"), ("rain on tin roof".into(), 0, None));
    }

    #[test]
    fn sanitize_produces_safe_names() {
        assert_eq!(sanitize_prompt("  Big BOOM!! (close) "), "big_boom_close");
        assert_eq!(sanitize_prompt("???"), "sfx");
        assert_eq!(asset_filename("Glass shatter", 4, ".mp3"), "glass_shatter_4.mp3");
        assert_eq!(sanitize_prompt(&"a".repeat(200)).len(), MAX_SANITIZED_CHARS);
    }

    #[test]
    fn written_names_parse_back() {
        let name = asset_filename("Metal door creak", 12, "mp3");
        let stem = name.trim_end_matches(".mp3");
        assert_eq!(parsed(stem), ("metal door creak".into(), 12, None));
    }
}
