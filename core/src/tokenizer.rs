use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
    static ref NEGATORS: HashSet<&'static str> = {
        let words: &[&str] = &["no", "not", "never", "none", "cannot", "nor", "neither", "without"];
        words.iter().copied().collect()
    };
}

/// Runtime tokenizer configuration.
///
/// Deliberately not part of the persisted index state: the caller supplies
/// it again on every load. The same configuration must be used at build
/// and query time, otherwise relevance scores are incomparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub remove_stopwords: bool,
    pub stem: bool,
    /// How many tokens after a negator receive the `!` marker.
    pub negation_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            remove_stopwords: true,
            stem: true,
            negation_window: 2,
        }
    }
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

fn is_negator(token: &str) -> bool {
    NEGATORS.contains(token) || token.ends_with("n't")
}

/// Tokenize text through the fixed stage order: NFKC + lowercase
/// normalization, word segmentation, stopword removal, stemming, negation
/// propagation. Identical input and config produce identical output
/// regardless of call site.
///
/// Negators are exempt from stopword removal (several appear in the stop
/// list) so the negation stage always sees them.
pub fn tokenize(text: &str, config: &PipelineConfig) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    let mut tokens = Vec::new();
    for mat in RE.find_iter(&normalized) {
        let token = mat.as_str();
        let negator = is_negator(token);
        if config.remove_stopwords && !negator && is_stopword(token) {
            continue;
        }
        let term = if config.stem {
            STEMMER.stem(token).to_string()
        } else {
            token.to_string()
        };
        tokens.push((term, negator));
    }
    propagate_negations(tokens, config.negation_window)
}

/// Prefix up to `window` tokens following a negator with `!`, so negated
/// terms occupy distinct vocabulary entries. The negator itself is
/// consumed.
fn propagate_negations(tokens: Vec<(String, bool)>, window: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut remaining = 0usize;
    for (term, negator) in tokens {
        if negator {
            remaining = window;
            continue;
        }
        if remaining > 0 {
            out.push(format!("!{term}"));
            remaining -= 1;
        } else {
            out.push(term);
        }
    }
    out
}
