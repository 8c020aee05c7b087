use crate::retrieval::ContextSnippet;

/// Join retrieved snippets into the block sent alongside the utterance.
///
/// Returns an empty string when there is nothing usable, which callers treat
/// as "no context".
pub fn build_context_block(header: &str, snippets: &[ContextSnippet]) -> String {
    let lines: Vec<&str> = snippets
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if lines.is_empty() {
        return String::new();
    }

    let mut block = String::from(header);
    block.push('\n');
    for line in lines {
        block.push_str("- ");
        block.push_str(line);
        block.push('\n');
    }
    block
}
