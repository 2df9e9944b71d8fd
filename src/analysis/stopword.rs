use std::collections::HashSet;

/// The PubMed stop-word list. Query rewriting replaces these with `+`
/// placeholders so word distances inside phrases survive elision.
pub struct StopWords {
    pub words: HashSet<&'static str>,
}

impl StopWords {
    pub fn pubmed() -> Self {
        let words = [
            "a", "about", "again", "all", "almost", "also", "although", "always",
            "among", "an", "and", "another", "any", "are", "as", "at", "be",
            "because", "been", "before", "being", "between", "both", "but", "by",
            "can", "could", "did", "do", "does", "done", "due", "during", "each",
            "either", "enough", "especially", "etc", "for", "found", "from",
            "further", "had", "has", "have", "having", "here", "how", "however",
            "i", "if", "in", "into", "is", "it", "its", "itself", "just", "kg",
            "km", "made", "mainly", "make", "may", "mg", "might", "ml", "mm",
            "most", "mostly", "must", "nearly", "neither", "no", "nor",
            "obtained", "of", "often", "on", "our", "overall", "perhaps",
            "pmid", "quite", "rather", "really", "regarding", "seem", "seen",
            "several", "should", "show", "showed", "shown", "shows",
            "significantly", "since", "so", "some", "such", "than", "that",
            "the", "their", "theirs", "them", "then", "there", "therefore",
            "these", "they", "this", "those", "through", "thus", "to", "upon",
            "use", "used", "using", "various", "very", "was", "we", "were",
            "what", "when", "which", "while", "with", "within", "without",
            "would",
        ]
        .into_iter()
        .collect();

        StopWords { words }
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.words.contains(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_words_are_stopped() {
        let stop = StopWords::pubmed();
        assert!(stop.is_stop_word("the"));
        assert!(stop.is_stop_word("within"));
        assert!(!stop.is_stop_word("fox"));
        assert!(!stop.is_stop_word("kinase"));
    }
}
