//! Word counting and text clipping.
//!
//! A word is a whitespace-delimited token. The context budget is expressed
//! in these units.

/// Number of whitespace-delimited tokens in `text`.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Collapse every whitespace run (newlines included) into one space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most `max_chars` characters, appending `suffix` when cut.
pub fn truncate_chars(text: &str, max_chars: usize, suffix: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}{suffix}", &text[..end]),
        None => text.to_string(),
    }
}

/// The prefix of `text` holding its first `max_words` words, original
/// spacing preserved.
pub fn cut_to_words(text: &str, max_words: usize) -> &str {
    if max_words == 0 {
        return "";
    }

    let mut seen = 0;
    let mut in_word = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_word {
                seen += 1;
                if seen == max_words {
                    return &text[..idx];
                }
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    text
}
