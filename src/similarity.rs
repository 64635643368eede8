use crate::models::CandidateRecord;

/// Collapses runs of whitespace and case-folds.
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `1 - levenshtein(a, b) / max(len(a), len(b), 1)` over case-folded characters.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Best similarity between the query and either the whole field or any run of
/// consecutive field words as long as the query, so a short query is not
/// penalised for the rest of a long title.
pub fn field_score(query: &str, field: &str) -> f64 {
    let query = normalize(query);
    let field = normalize(field);
    if field.is_empty() || query.is_empty() {
        return 0.0;
    }

    let mut best = similarity(&query, &field);

    let window = query.split(' ').count();
    let words: Vec<&str> = field.split(' ').collect();
    if words.len() > window {
        for run in words.windows(window) {
            best = best.max(similarity(&query, &run.join(" ")));
        }
    }

    best
}

/// A candidate scores as its best-matching field among title, description and course.
pub fn candidate_score(query: &str, record: &CandidateRecord) -> f64 {
    [&record.title, &record.description, &record.course]
        .into_iter()
        .map(|field| field_score(query, field))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [&str; 7] = [
        "",
        "a",
        "Veri Yapıları",
        "veri yapilari",
        "Algoritma Analizi",
        "İşletim Sistemleri",
        "abc  def",
    ];

    #[test]
    fn identical_strings_are_fully_similar() {
        for sample in ["", "abc", "Veri Yapıları", "İşletim"] {
            assert_eq!(similarity(sample, sample), 1.0);
        }
    }

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        for a in SAMPLES {
            for b in SAMPLES {
                let ab = similarity(a, b);
                assert_eq!(ab, similarity(b, a));
                assert!((0.0..=1.0).contains(&ab));
            }
        }
    }

    #[test]
    fn similarity_ignores_case() {
        assert_eq!(similarity("FIZIK", "fizik"), 1.0);
    }

    #[test]
    fn similarity_counts_characters_not_bytes() {
        // one substitution out of five characters
        assert!((similarity("yapıl", "yapil") - 0.8).abs() < 1e-9);
    }

    #[test]
    fn empty_field_scores_zero() {
        assert_eq!(field_score("fizik", ""), 0.0);
        assert_eq!(field_score("fizik", "   "), 0.0);
    }

    #[test]
    fn query_longer_than_field_still_scores() {
        let score = field_score("diferansiyel denklemler final", "Diferansiyel");
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn typo_matches_word_run_inside_long_title() {
        let score = field_score("Vri Yapıları", "Veri Yapıları - Vize Notları");
        assert!(score > 0.7, "score was {score}");
    }
}
