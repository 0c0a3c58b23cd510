//! Scored fuzzy lookup over a merged asset catalog.

use regex::Regex;

use crate::naming::normalize_prompt;
use crate::scan::AssetRecord;

const EXACT: u32 = 1000;
const PREFIX: u32 = 500;
const CONTAINS: u32 = 100;
const WORD: u32 = 50;
const SUBSEQUENCE: u32 = 25;

struct Query {
    text: String,
    word: Option<Regex>,
}

impl Query {
    fn new(raw: &str) -> Self {
        let text = normalize_prompt(raw);
        let word = Regex::new(&format!(r"\b{}\b", regex::escape(&text))).ok();
        Self { text, word }
    }

    fn score(&self, record: &AssetRecord) -> u32 {
        let q = self.text.as_str();
        let prompt = record.prompt_text.as_str();
        let basename = normalize_prompt(&record.basename);
        let filename = record.filename.to_lowercase();

        let mut score = 0;
        if prompt == q || basename == q {
            score += EXACT;
        }
        if prompt.starts_with(q) || basename.starts_with(q) || filename.starts_with(q) {
            score += PREFIX;
        }
        if prompt.contains(q) || basename.contains(q) || filename.contains(q) {
            score += CONTAINS;
        }
        if let Some(word) = &self.word {
            if word.is_match(prompt) || word.is_match(&basename) {
                score += WORD;
            }
        }
        if is_subsequence(q, prompt) {
            score += SUBSEQUENCE;
        }
        score
    }
}

/// Every character of `needle` appears in `haystack` in order.
fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut hay = haystack.chars();
    needle.chars().all(|c| hay.any(|h| h == c))
}

/// Records matching `query`, best first, at most `limit`. Equal scores keep
/// index order. A blank query returns the index as is.
pub fn search_records(records: &[AssetRecord], query: &str, limit: usize) -> Vec<AssetRecord> {
    if query.trim().is_empty() {
        return records.iter().take(limit).cloned().collect();
    }
    let query = Query::new(query);
    let mut scored: Vec<(u32, &AssetRecord)> =
        records.iter().map(|r| (query.score(r), r)).filter(|(score, _)| *score > 0).collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, r)| r.clone()).collect()
}

/// One past the highest sequence number among records whose prompt contains,
/// or is contained in, `prompt`. Starts at 1.
pub fn next_sequence_number(records: &[AssetRecord], prompt: &str) -> u32 {
    let q = normalize_prompt(prompt);
    if q.is_empty() { return 1; }
    records
        .iter()
        .filter(|r| !r.prompt_text.is_empty() && (r.prompt_text.contains(&q) || q.contains(&r.prompt_text)))
        .map(|r| r.sequence_number)
        .max()
        .map_or(1, |n| n.saturating_add(1))
}
