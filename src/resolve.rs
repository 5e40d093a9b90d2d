use anyhow::Result;
use rusqlite::Connection;

use crate::store::{self, CandidateMatch, PlayerRow, SearchFilter};

const FUZZY_SCORE_FLOOR: f64 = 0.45;
const FUZZY_TOKEN_LIMIT: usize = 25;
const AMBIGUITY_CAP: usize = 5;

/// Outcome of resolving a free-text player reference. Ambiguous variants
/// never auto-fetch a full record; the caller has to re-prompt.
#[derive(Debug, Clone)]
pub enum Resolution {
    Exact {
        query: String,
        best_match: CandidateMatch,
        player: PlayerRow,
        candidates: Vec<CandidateMatch>,
    },
    SingleCandidate {
        query: String,
        best_match: CandidateMatch,
        player: PlayerRow,
    },
    FuzzySingle {
        query: String,
        best_match: CandidateMatch,
        player: PlayerRow,
        candidates: Vec<CandidateMatch>,
    },
    DuplicateExactName {
        query: String,
        candidates: Vec<CandidateMatch>,
    },
    SimilarNameCandidates {
        query: String,
        candidates: Vec<CandidateMatch>,
    },
    NoMatch {
        query: String,
        matches: Vec<CandidateMatch>,
    },
}

impl Resolution {
    pub fn resolved_player(&self) -> Option<&PlayerRow> {
        match self {
            Resolution::Exact { player, .. }
            | Resolution::SingleCandidate { player, .. }
            | Resolution::FuzzySingle { player, .. } => Some(player),
            _ => None,
        }
    }

    pub fn resolved_name(&self) -> Option<&str> {
        match self {
            Resolution::Exact { best_match, .. }
            | Resolution::SingleCandidate { best_match, .. }
            | Resolution::FuzzySingle { best_match, .. } => Some(best_match.name.as_str()),
            _ => None,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            Resolution::DuplicateExactName { .. } | Resolution::SimilarNameCandidates { .. }
        )
    }
}

/// Lowercase, strip non-alphanumerics to spaces, collapse whitespace.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = true;
    for ch in raw.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

pub fn tokenize_name(raw: &str) -> Vec<String> {
    normalize_name(raw)
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Token-set overlap ratio: |intersection| / max(|a|, |b|). Symmetric,
/// 1.0 for identical token sets, 0.0 when disjoint or either side is empty.
pub fn score_name_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize_name(a);
    let tokens_b = tokenize_name(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let set_a: std::collections::HashSet<&str> = tokens_a.iter().map(String::as_str).collect();
    let set_b: std::collections::HashSet<&str> = tokens_b.iter().map(String::as_str).collect();
    let overlap = set_a.intersection(&set_b).count();
    overlap as f64 / set_a.len().max(set_b.len()) as f64
}

/// Resolve a free-text player reference against the directory.
///
/// Exact normalized matches short-circuit; fuzzy token search only runs
/// when literal substring search finds nothing, trading recall for
/// precision since downstream text is presented as factual.
pub fn resolve_player(
    conn: &Connection,
    query: &str,
    team: &str,
    position: &str,
    limit: usize,
) -> Result<Resolution> {
    let query = query.trim().to_string();
    let matches = store::search_players(
        conn,
        &SearchFilter {
            query: query.clone(),
            team: team.to_string(),
            position: position.to_string(),
            limit,
        },
    )?;

    if query.is_empty() {
        return Ok(Resolution::NoMatch { query, matches });
    }

    let target = normalize_name(&query);
    let exact: Vec<&CandidateMatch> = matches
        .iter()
        .filter(|candidate| normalize_name(&candidate.name) == target)
        .collect();

    if exact.len() == 1 {
        let best = exact[0].clone();
        if let Some(player) = store::get_player(conn, &best.unique_id)? {
            return Ok(Resolution::Exact {
                query,
                best_match: best,
                player,
                candidates: matches.iter().take(AMBIGUITY_CAP).cloned().collect(),
            });
        }
    }

    if exact.len() > 1 {
        return Ok(Resolution::DuplicateExactName {
            query,
            candidates: exact.into_iter().take(AMBIGUITY_CAP).cloned().collect(),
        });
    }

    if matches.len() == 1 {
        let best = matches[0].clone();
        if let Some(player) = store::get_player(conn, &best.unique_id)? {
            return Ok(Resolution::SingleCandidate {
                query,
                best_match: best,
                player,
            });
        }
    }

    if matches.is_empty() {
        let ranked = fuzzy_candidates(conn, &query, team, position)?;

        if ranked.len() == 1 {
            let best = ranked[0].clone();
            if let Some(player) = store::get_player(conn, &best.unique_id)? {
                return Ok(Resolution::FuzzySingle {
                    query,
                    best_match: best,
                    player,
                    candidates: ranked,
                });
            }
        }

        if !ranked.is_empty() {
            return Ok(Resolution::SimilarNameCandidates {
                query,
                candidates: ranked.into_iter().take(AMBIGUITY_CAP).collect(),
            });
        }
    }

    Ok(Resolution::NoMatch { query, matches })
}

/// Second-pass token search: first and last normalized query tokens,
/// deduplicated, length >= 2, at most two searches of 25 rows each.
fn fuzzy_candidates(
    conn: &Connection,
    query: &str,
    team: &str,
    position: &str,
) -> Result<Vec<CandidateMatch>> {
    let tokens = tokenize_name(query);
    let mut fallback_tokens: Vec<&str> = Vec::new();
    for token in [tokens.first(), tokens.last()].into_iter().flatten() {
        if token.len() >= 2 && !fallback_tokens.contains(&token.as_str()) {
            fallback_tokens.push(token);
        }
    }
    fallback_tokens.truncate(2);

    let mut pool: Vec<CandidateMatch> = Vec::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    for token in fallback_tokens {
        let token_matches = store::search_players(
            conn,
            &SearchFilter {
                query: token.to_string(),
                team: team.to_string(),
                position: position.to_string(),
                limit: FUZZY_TOKEN_LIMIT,
            },
        )?;
        for candidate in token_matches {
            if seen.insert(candidate.unique_id.clone()) {
                pool.push(candidate);
            }
        }
    }

    let mut ranked: Vec<CandidateMatch> = pool
        .into_iter()
        .filter_map(|mut candidate| {
            let score = score_name_similarity(query, &candidate.name);
            if score >= FUZZY_SCORE_FLOOR {
                candidate.similarity_score = Some(score);
                Some(candidate)
            } else {
                None
            }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::{normalize_name, score_name_similarity, tokenize_name};

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_name("  D'Angelo  RUSSELL, Jr. "), "d angelo russell jr");
        assert_eq!(normalize_name("???"), "");
    }

    #[test]
    fn tokenize_splits_normalized_words() {
        assert_eq!(tokenize_name("Jalen-Green"), vec!["jalen", "green"]);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = "Jalen Green";
        let b = "Green Jalen Jr";
        assert_eq!(score_name_similarity(a, b), score_name_similarity(b, a));
    }

    #[test]
    fn similarity_identity_and_disjoint() {
        assert_eq!(score_name_similarity("Jalen Green", "jalen green"), 1.0);
        assert_eq!(score_name_similarity("Jalen Green", "Marcus Smart"), 0.0);
        assert_eq!(score_name_similarity("", "Marcus Smart"), 0.0);
    }
}
