//! Naive whitespace tokenizer used for the input layer labels.

/// Split `text` on Unicode whitespace, dropping empty tokens.
///
/// # Example
/// ```
/// use neuroviz::tokenizer::tokenize;
///
/// assert_eq!(tokenize("  The quick\tbrown\n fox "), vec!["The", "quick", "brown", "fox"]);
/// assert!(tokenize("   ").is_empty());
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}
