//! Fitting a finished response into a token budget.
//!
//! A "token" here is a maximal run of non-whitespace characters, and a
//! sentence boundary is the two-character sequence `". "`. Both are rough
//! approximations: abbreviations and decimals split sentences, and the count
//! has nothing to do with the model's tokenizer.

const SENTENCE_DELIMITER: &str = ". ";

pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Returns `full_text` unchanged when it fits in `max_tokens`, otherwise the
/// longest prefix of whole sentences that fits. A first sentence that is
/// already over budget yields an empty string.
pub fn trim_to_max_tokens(full_text: &str, max_tokens: usize) -> String {
    if count_tokens(full_text) <= max_tokens {
        return full_text.to_string();
    }

    let mut trimmed = String::new();
    let mut token_count = 0;
    for segment in full_text.split(SENTENCE_DELIMITER) {
        let piece = format!("{segment}{SENTENCE_DELIMITER}");
        // every piece ends in a space, so counts add up across pieces
        let piece_tokens = count_tokens(&piece);
        if token_count + piece_tokens > max_tokens {
            break;
        }
        trimmed.push_str(&piece);
        token_count += piece_tokens;
    }
    trimmed.trim().to_string()
}
