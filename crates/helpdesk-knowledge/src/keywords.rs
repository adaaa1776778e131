//! Keyword extraction from visitor questions.

use helpdesk_core::config::RetrievalConfig;
use std::collections::HashSet;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// French and English function words, already accent-stripped.
const STOPWORDS: &[&str] = &[
    // English
    "about", "after", "again", "all", "also", "and", "any", "are", "because", "been", "before",
    "being", "both", "but", "can", "cannot", "could", "did", "does", "doing", "each", "either",
    "ever", "few", "for", "from", "get", "got", "had", "has", "have", "having", "her", "here",
    "hers", "him", "his", "how", "into", "its", "just", "may", "might", "more", "most", "must",
    "need", "not", "now", "off", "once", "only", "other", "our", "ours", "out", "over", "own",
    "same", "she", "should", "some", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "too", "under", "until", "very", "want", "was",
    "were", "what", "when", "where", "which", "while", "who", "whom", "whose", "why", "will",
    "with", "would", "you", "your", "yours",
    // French
    "afin", "ainsi", "alors", "au", "aucun", "aussi", "autre", "aux", "avec", "avez", "avoir",
    "avons", "bien", "car", "ce", "ceci", "cela", "celle", "celui", "ces", "cet", "cette",
    "chez", "combien", "comme", "comment", "dans", "depuis", "des", "doit", "donc", "dont",
    "elle", "elles", "encore", "entre", "est", "etait", "etre", "faire", "fait", "faut", "ici",
    "ils", "je", "les", "leur", "leurs", "lui", "mais", "meme", "mes", "moi", "mon", "nos", "notre",
    "nous", "ont", "par", "pas", "peut", "peux", "plus", "pour", "pourquoi", "quand", "que",
    "quel", "quelle", "quelles", "quels", "qui", "quoi", "sans", "ses", "son", "sont", "sur",
    "tes", "toi", "ton", "tous", "tout", "toute", "toutes", "tres", "une", "vos", "votre",
    "vous", "voudrais", "veux",
];

static STOPWORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOPWORDS.iter().copied().collect());

/// Lowercase and strip diacritics (`"Activación"` → `"activacion"`).
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Distinct, discriminating keywords of a question, in order of appearance.
pub fn extract_keywords(question: &str, cfg: &RetrievalConfig) -> Vec<String> {
    let noise: HashSet<String> = cfg.noise_terms.iter().map(|t| normalize(t)).collect();
    let cleaned: String = normalize(question)
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut seen = HashSet::new();
    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() >= cfg.min_keyword_len)
        .filter(|t| !STOPWORD_SET.contains(t) && !noise.contains(*t))
        .filter(|t| seen.insert(t.to_string()))
        .take(cfg.max_keywords)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RetrievalConfig {
        RetrievalConfig::default()
    }

    #[test]
    fn test_normalize_strips_accents() {
        assert_eq!(normalize("Frais d'ACTIVATION élevés"), "frais d'activation eleves");
        assert_eq!(normalize("Ça coûte combien ?"), "ca coute combien ?");
    }

    #[test]
    fn test_english_question() {
        assert_eq!(extract_keywords("What are the activation fees?", &cfg()), vec!["activation", "fees"]);
    }

    #[test]
    fn test_french_question_with_accents() {
        let kw = extract_keywords("Bonjour, quels sont les frais d'activation ? Merci", &cfg());
        assert_eq!(kw, vec!["frais", "activation"]);
    }

    #[test]
    fn test_dedup_and_cap() {
        let cfg = RetrievalConfig { max_keywords: 2, ..cfg() };
        let kw = extract_keywords("refund refund REFUND delivery warranty", &cfg);
        assert_eq!(kw, vec!["refund", "delivery"]);
    }

    #[test]
    fn test_noise_terms_are_dropped() {
        let cfg = RetrievalConfig { noise_terms: vec!["Acmé".into()], ..cfg() };
        assert_eq!(extract_keywords("acme pricing", &cfg), vec!["pricing"]);
    }

    #[test]
    fn test_only_stopwords_yields_nothing() {
        assert!(extract_keywords("what is it, how and why?", &cfg()).is_empty());
        assert!(extract_keywords("", &cfg()).is_empty());
    }
}
