//! Text similarity used to pick the best places-search candidate.

use std::collections::HashSet;

pub const EXACT_MATCH_SCORE: f64 = 1.0;
pub const CONTAINMENT_SCORE: f64 = 0.8;

/// Lowercases, keeps letters/digits of any script, and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Scores how well `candidate` matches `query`, in `[0.0, 1.0]`.
///
/// Equal after normalization scores 1.0, containment either way 0.8,
/// otherwise the share of exactly matching tokens over the longer token list.
pub fn score(query: &str, candidate: &str) -> f64 {
    let a = normalize(query);
    let b = normalize(candidate);

    if a == b {
        return EXACT_MATCH_SCORE;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return CONTAINMENT_SCORE;
    }

    let a_tokens: HashSet<&str> = a.split(' ').collect();
    let b_tokens: HashSet<&str> = b.split(' ').collect();
    let longest = a.split(' ').count().max(b.split(' ').count());

    let matching = a_tokens.intersection(&b_tokens).count();

    matching as f64 / longest as f64
}

/// Index of the highest scoring candidate; ties keep the earliest one.
pub fn best_match<'a, I>(query: &str, candidates: I) -> Option<(usize, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in candidates.into_iter().enumerate() {
        let candidate_score = score(query, candidate);
        match best {
            Some((_, best_score)) if candidate_score <= best_score => {}
            _ => best = Some((index, candidate_score)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("  N Seoul-Tower!! "), "n seoul tower");
        assert_eq!(normalize("경복궁 (Gyeongbokgung)"), "경복궁 gyeongbokgung");
    }

    #[test]
    fn test_identical_strings_score_one() {
        for text in ["경복궁", "Namsan Seoul Tower", "N서울타워 2F", ""] {
            assert_eq!(score(text, text), 1.0);
        }
        assert_eq!(score("Bukchon  Hanok-Village", "bukchon hanok village"), 1.0);
    }

    #[test]
    fn test_containment_beats_unrelated() {
        let related = score("경복궁 야간개장", "경복궁");
        let unrelated = score("경복궁 야간개장", "창덕궁");
        assert_eq!(related, CONTAINMENT_SCORE);
        assert_eq!(unrelated, 0.0);
        assert!(related > unrelated);
    }

    #[test]
    fn test_token_overlap_ratio() {
        // "seoul" and "museum" match out of max(3, 4) tokens
        let s = score("seoul history museum", "national seoul folk museum");
        assert!((s - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_side_scores_zero() {
        assert_eq!(score("경복궁", "!!!"), 0.0);
    }

    #[test]
    fn test_best_match_keeps_first_on_tie() {
        let candidates = ["창덕궁", "경복궁", "경복궁"];
        assert_eq!(best_match("경복궁", candidates), Some((1, 1.0)));

        let unrelated = ["창덕궁", "덕수궁"];
        assert_eq!(best_match("경복궁", unrelated), Some((0, 0.0)));
        assert_eq!(best_match("경복궁", Vec::<&str>::new()), None);
    }
}
