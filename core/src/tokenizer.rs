use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref SPLIT: Regex = Regex::new(r#"[\s,.;:"\\!?_]+"#).expect("valid regex");
}

/// Shortest term kept by the tokenizer, in characters.
pub const MIN_TERM_CHARS: usize = 2;

/// Split text on whitespace and `. , ; : " \ ! ? _`, lowercase every piece and
/// drop pieces shorter than two characters. Duplicates are kept in input order.
pub fn tokenize(text: &str) -> Vec<String> {
    SPLIT
        .split(text)
        .filter(|piece| piece.chars().count() >= MIN_TERM_CHARS)
        .map(str::to_lowercase)
        .collect()
}

/// Per-term occurrence counts for one document.
pub fn term_frequencies<'a, I>(texts: I) -> HashMap<String, u32>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<String, u32> = HashMap::new();
    for text in texts {
        for term in tokenize(text) {
            *counts.entry(term).or_insert(0) += 1;
        }
    }
    counts
}
