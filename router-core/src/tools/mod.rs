pub mod stats;
pub mod visualize;
pub mod workflow;

pub use stats::StatsTool;
pub use visualize::VisualizeTool;
pub use workflow::CoverageRateTool;

use crate::resolver::is_stopword;

/// Tokens that refer back to an earlier variable rather than naming one.
const PRONOUN_TERMS: &[&str] = &["it", "that", "again", "same", "previous"];

/// First pronoun-style token in the utterance, if any.
pub(crate) fn pronoun_reference<'a>(tokens: &'a [String]) -> Option<&'a str> {
    tokens
        .iter()
        .map(String::as_str)
        .find(|t| PRONOUN_TERMS.contains(t))
}

/// Best fuzzy match between any contentful token and a dataset column.
///
/// Stopwords, pronoun terms and very short tokens are skipped so that
/// filler words never masquerade as column mentions.
pub(crate) fn best_column_match(
    tokens: &[String],
    columns: &[String],
    threshold: f64,
) -> Option<(String, f64)> {
    let mut best: Option<(String, f64)> = None;
    for token in tokens {
        if token.len() < 3 || is_stopword(token) || PRONOUN_TERMS.contains(&token.as_str()) {
            continue;
        }
        for column in columns {
            let column_lc = column.to_lowercase();
            // Typos rarely corrupt the first character; requiring it to
            // match keeps short filler words away from unrelated columns.
            if token.chars().next() != column_lc.chars().next() {
                continue;
            }
            let similarity = strsim::jaro_winkler(token, &column_lc);
            if similarity >= threshold
                && best.as_ref().map_or(true, |(_, s)| similarity > *s)
            {
                best = Some((column.clone(), similarity));
            }
        }
    }
    best
}
