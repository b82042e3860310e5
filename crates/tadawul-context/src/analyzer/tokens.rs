//! Tokenisation and term lookup shared by the analyzer passes

/// Attached conjunctions, prepositions and the article, longest forms included
const ARABIC_PREFIXES: &[&str] = &[
    "", "و", "ف", "ب", "ل", "ك", "ال", "وال", "فال", "بال", "كال", "لل", "ولل", "وب", "ول",
];

/// Feminine, plural, nisba and pronoun endings
const ARABIC_SUFFIXES: &[&str] = &[
    "", "ة", "ه", "ها", "هم", "هما", "ي", "ية", "ات", "ان", "ين", "ون",
];

/// Lowercased alphanumeric runs; Arabic letters count as alphanumeric
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Token indices where `term` starts.
///
/// ASCII terms must match whole tokens. Arabic term parts must fill the
/// token apart from a known attached prefix and suffix, so "الارتفاع" counts
/// for "ارتفاع" while "ربيع" does not count for "بيع".
pub(crate) fn term_positions(tokens: &[String], term: &str) -> Vec<usize> {
    let parts = tokenize(term);
    if parts.is_empty() || parts.len() > tokens.len() {
        return Vec::new();
    }

    (0..=tokens.len() - parts.len())
        .filter(|&start| {
            parts.iter().enumerate().all(|(offset, part)| {
                let token = &tokens[start + offset];
                if part.is_ascii() {
                    token == part
                } else {
                    matches_affixed(token, part)
                }
            })
        })
        .collect()
}

fn matches_affixed(token: &str, part: &str) -> bool {
    ARABIC_PREFIXES.iter().any(|prefix| {
        token
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(part))
            .is_some_and(|suffix| ARABIC_SUFFIXES.contains(&suffix))
    })
}

pub(crate) fn count_term(tokens: &[String], term: &str) -> usize {
    term_positions(tokens, term).len()
}

pub(crate) fn contains_term(tokens: &[String], term: &str) -> bool {
    !term_positions(tokens, term).is_empty()
}

pub(crate) fn contains_any(tokens: &[String], terms: &[&str]) -> bool {
    terms.iter().any(|term| contains_term(tokens, term))
}

/// Labels of every `(term, label)` pair present, first-seen order, no repeats
pub(crate) fn matched_labels(tokens: &[String], pairs: &[&[(&str, &str)]]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for (term, label) in pairs.iter().flat_map(|list| list.iter()) {
        if contains_term(tokens, term) && !labels.iter().any(|l| l == label) {
            labels.push((*label).to_string());
        }
    }
    labels
}
