use std::collections::HashMap;

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "said", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Is `term` (lowercase) in the built-in English stopword list?
pub fn is_stopword(term: &str) -> bool {
    STOPWORDS.contains(&term)
}

/// Lowercase alphabetic tokens of `text`
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Growing term <-> id map. Ids are assigned in order of first
/// appearance.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    exclude_stopwords: bool,
    terms: Vec<Box<str>>,
    ids: HashMap<Box<str>, usize>,
}

impl Vocabulary {
    pub fn new(exclude_stopwords: bool) -> Self {
        Vocabulary {
            exclude_stopwords,
            ..Default::default()
        }
    }

    /// Tokenize a document and map each token to its id, adding
    /// unseen terms. Stopwords are dropped if the vocabulary excludes
    /// them.
    pub fn doc_to_ids(&mut self, text: &str) -> Vec<usize> {
        let mut ret = vec![];
        for term in tokenize(text) {
            if self.exclude_stopwords && is_stopword(&term) {
                continue;
            }
            let id = match self.ids.get(term.as_str()) {
                Some(&id) => id,
                None => {
                    let id = self.terms.len();
                    let term = term.into_boxed_str();
                    self.terms.push(term.clone());
                    self.ids.insert(term, id);
                    id
                }
            };
            ret.push(id);
        }
        ret
    }

    /// Vocabulary size V
    pub fn size(&self) -> usize {
        self.terms.len()
    }

    pub fn term(&self, id: usize) -> Option<&str> {
        self.terms.get(id).map(|t| t.as_ref())
    }

    pub fn id(&self, term: &str) -> Option<usize> {
        self.ids.get(term).copied()
    }
}
