//! The splitting contract shared by every piece of code that maps indices onto text.
//!
//! Line indices shown at level 1, line indices returned by cross-link lookups and
//! line indices rebuilt locally while resolving a cross-link must all agree, so the
//! rules live here once and both the navigator and the test service use them.

use crate::nav::Level;

pub const LINE_DELIMITER: &str = "\n";
pub const WORD_DELIMITER: &str = " ";
pub const TRAIL_LABEL_CHARS: usize = 30;
pub const MIN_PARAGRAPH_LINES: usize = 5;

/// Delimiter used to decompose a parent into the children shown at `level`.
pub fn default_delimiter(level: Level) -> &'static str {
    match level {
        Level::List | Level::Lines => LINE_DELIMITER,
        Level::Words => WORD_DELIMITER,
        Level::Characters => "",
    }
}

/// Splits `text` into the parts displayed at `level`.
///
/// An empty delimiter at character level yields one part per `char`; otherwise
/// empty segments are dropped while whitespace-only segments are kept.
pub fn split_parts(text: &str, delimiter: &str, level: Level) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    if delimiter.is_empty() {
        if level == Level::Characters {
            return text.chars().map(String::from).collect();
        }
        return vec![text.to_owned()];
    }

    text.split(delimiter)
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn split_lines(paragraph: &str) -> Vec<String> {
    split_parts(paragraph, LINE_DELIMITER, Level::Lines)
}

pub fn split_words(line: &str) -> Vec<String> {
    split_parts(line, WORD_DELIMITER, Level::Words)
}

pub fn split_chars(word: &str) -> Vec<String> {
    split_parts(word, "", Level::Characters)
}

/// Text of the line at `line_index`, using the same indexing as level-1 nodes.
pub fn line_at(paragraph: &str, line_index: usize) -> Option<String> {
    split_lines(paragraph).into_iter().nth(line_index)
}

/// Text of word `word_index` within line `line_index`.
pub fn word_at(paragraph: &str, line_index: usize, word_index: usize) -> Option<String> {
    let line = line_at(paragraph, line_index)?;
    split_words(&line).into_iter().nth(word_index)
}

/// Lines counted towards the minimum paragraph size when creating documents.
pub fn count_content_lines(paragraph: &str) -> usize {
    paragraph
        .split(LINE_DELIMITER)
        .filter(|line| !line.trim().is_empty())
        .count()
}

/// Breadcrumb label for a node: its first characters, or a positional fallback.
pub fn trail_label(label: &str, index: usize) -> String {
    if label.is_empty() {
        return format!("Item {index}");
    }
    label.chars().take(TRAIL_LABEL_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_drop_empty_segments_but_keep_whitespace_lines() {
        assert_eq!(split_lines("A\n\nB\n \nC\n"), vec!["A", "B", " ", "C"]);
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn words_split_on_single_spaces() {
        assert_eq!(split_words("the  quick fox "), vec!["the", "quick", "fox"]);
    }

    #[test]
    fn characters_split_per_char_including_multibyte() {
        assert_eq!(split_chars("héé"), vec!["h", "é", "é"]);
    }

    #[test]
    fn empty_delimiter_above_character_level_keeps_text_whole() {
        assert_eq!(split_parts("one two", "", Level::Words), vec!["one two"]);
    }

    #[test]
    fn line_and_word_lookup_follow_display_indexing() {
        let paragraph = "alpha beta\n\ngamma delta epsilon";
        assert_eq!(line_at(paragraph, 1).as_deref(), Some("gamma delta epsilon"));
        assert_eq!(word_at(paragraph, 1, 2).as_deref(), Some("epsilon"));
        assert_eq!(line_at(paragraph, 2), None);
        assert_eq!(word_at(paragraph, 0, 5), None);
    }

    #[test]
    fn content_lines_ignore_blank_lines() {
        assert_eq!(count_content_lines("a\n \nb\n\nc"), 3);
    }

    #[test]
    fn trail_label_truncates_and_falls_back_to_index() {
        let long = "x".repeat(45);
        assert_eq!(trail_label(&long, 0).chars().count(), TRAIL_LABEL_CHARS);
        assert_eq!(trail_label("", 4), "Item 4");
        assert_eq!(trail_label("short", 1), "short");
    }
}
