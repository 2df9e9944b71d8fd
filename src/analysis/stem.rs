use rust_stemmers::{Algorithm, Stemmer};

/// Porter2 stem of a single normalized word. Applied to `[STEM]` field
/// lookups and to `word$` query suffixes before wildcard expansion.
pub fn porter2(word: &str) -> String {
    let stemmer = Stemmer::create(Algorithm::English);
    stemmer.stem(word).to_string()
}
