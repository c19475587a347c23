//! Gym directory lookup and fuzzy name resolution.

use serde::Deserialize;

use crate::error::{MonitorError, Result};
use crate::session::{TokenSession, truncate};

/// A gym as listed by the directory or embedded in a member profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GymRecord {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

/// Lower-case and drop spaces and hyphens, so "Canterbury-Wincheap" and
/// "canterbury wincheap" compare equal.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect()
}

/// Levenshtein distance with unit insert/delete/substitute costs.
pub fn edit_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Pick the gym whose normalized name is closest to `query`.
///
/// The first gym wins a tie. There is no quality cutoff: any non-empty list
/// yields a match.
pub fn best_match<'a>(query: &str, gyms: &'a [GymRecord]) -> Option<&'a GymRecord> {
    let query = normalize_name(query);
    gyms.iter()
        .min_by_key(|gym| edit_distance(&query, &normalize_name(&gym.name)))
}

/// Directory client. The gym list is fetched on every call; nothing is cached.
#[derive(Clone, Debug)]
pub struct GymDirectory {
    session: TokenSession,
}

impl GymDirectory {
    pub fn new(session: TokenSession) -> Self {
        Self { session }
    }

    /// Fetch the full gym list.
    ///
    /// A non-success status yields an empty list, which callers treat as
    /// "no gyms found".
    pub async fn list_gyms(&self) -> Result<Vec<GymRecord>> {
        let response = self.session.get("/gyms/").await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(%status, "Gym list request failed");
            tracing::debug!("Gym list error body: {}", truncate(&body, 500));
            return Ok(Vec::new());
        }

        let gyms: Vec<GymRecord> = serde_json::from_str(&body)
            .map_err(|e| MonitorError::MalformedResponse(format!("gym list: {e}")))?;
        tracing::debug!(count = gyms.len(), "Fetched gym directory");
        Ok(gyms)
    }

    /// Resolve a free-text gym name to the closest directory entry.
    pub async fn find_by_name(&self, query: &str) -> Result<Option<GymRecord>> {
        let gyms = self.list_gyms().await?;
        let found = best_match(query, &gyms).cloned();
        if let Some(gym) = &found {
            tracing::debug!(query, id = gym.id, name = %gym.name, "Resolved gym name");
        }
        Ok(found)
    }

    /// Case-insensitive substring search, sorted by name. An empty term
    /// returns the whole directory.
    pub async fn search(&self, term: &str) -> Result<Vec<GymRecord>> {
        let gyms = self.list_gyms().await?;
        Ok(filter_by_term(gyms, term))
    }
}

fn filter_by_term(gyms: Vec<GymRecord>, term: &str) -> Vec<GymRecord> {
    let term = term.trim().to_lowercase();
    let mut matches: Vec<GymRecord> = gyms
        .into_iter()
        .filter(|gym| term.is_empty() || gym.name.to_lowercase().contains(&term))
        .collect();
    matches.sort_by(|a, b| a.name.cmp(&b.name));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gym(id: i64, name: &str) -> GymRecord {
        GymRecord {
            id,
            name: name.to_string(),
            status: "Open".to_string(),
        }
    }

    // ==================== Normalization Tests ====================

    #[test]
    fn test_normalize_strips_spaces_and_hyphens() {
        assert_eq!(normalize_name("Canterbury Wincheap"), "canterburywincheap");
        assert_eq!(normalize_name("canterbury-wincheap"), "canterburywincheap");
        assert_eq!(normalize_name(" London - Bank "), "londonbank");
    }

    // ==================== Edit Distance Tests ====================

    #[test]
    fn test_edit_distance_known_values() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("flaw", "lawn"), 2);
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("abc", ""), 3);
    }

    #[test]
    fn test_edit_distance_counts_characters_not_bytes() {
        assert_eq!(edit_distance("münchen", "munchen"), 1);
    }

    // ==================== Matching Tests ====================

    #[test]
    fn test_best_match_ignores_case_spaces_and_hyphens() {
        let gyms = vec![gym(3, "Canterbury Sturry Road"), gym(5, "Canterbury Wincheap")];
        let a = best_match("canterbury-wincheap", &gyms).unwrap();
        let b = best_match("Canterbury Wincheap", &gyms).unwrap();
        assert_eq!(a.id, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_best_match_prefers_smaller_distance() {
        let gyms = vec![gym(1, "Bristol Highbury"), gym(2, "Bristol Broadmead")];
        assert_eq!(best_match("Bristol Hghbry", &gyms).unwrap().id, 1);
    }

    #[test]
    fn test_best_match_tie_goes_to_first() {
        let gyms = vec![gym(7, "Leeds A"), gym(8, "Leeds B")];
        assert_eq!(best_match("Leeds C", &gyms).unwrap().id, 7);
    }

    #[test]
    fn test_best_match_has_no_quality_threshold() {
        let gyms = vec![gym(9, "Aberdeen Kittybrewster")];
        assert_eq!(best_match("zzzz", &gyms).unwrap().id, 9);
    }

    #[test]
    fn test_best_match_empty_directory() {
        assert!(best_match("anything", &[]).is_none());
    }

    // ==================== Search Tests ====================

    #[test]
    fn test_filter_by_term_sorts_and_filters() {
        let gyms = vec![
            gym(1, "Canterbury Wincheap"),
            gym(2, "Bristol Highbury"),
            gym(3, "Canterbury Sturry Road"),
        ];
        let found = filter_by_term(gyms, "CANTERBURY");
        let ids: Vec<i64> = found.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_filter_by_empty_term_returns_everything() {
        let gyms = vec![gym(2, "Bristol Highbury"), gym(1, "Aylesbury")];
        let found = filter_by_term(gyms, "");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "Aylesbury");
    }

    #[test]
    fn test_gym_record_deserializes_vendor_casing() {
        let json = r#"{"Id": 5, "Name": "Canterbury Wincheap", "Status": "Open", "Extra": 1}"#;
        let record: GymRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record, gym(5, "Canterbury Wincheap"));
    }

    // ==================== Property-Based Tests ====================

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn distance_to_empty_is_length(s in "\\PC{0,24}") {
                let len = s.chars().count();
                prop_assert_eq!(edit_distance("", &s), len);
                prop_assert_eq!(edit_distance(&s, ""), len);
            }

            #[test]
            fn distance_to_self_is_zero(s in "\\PC{0,24}") {
                prop_assert_eq!(edit_distance(&s, &s), 0);
            }

            #[test]
            fn distance_is_symmetric(a in "[a-z -]{0,16}", b in "[a-z -]{0,16}") {
                prop_assert_eq!(edit_distance(&a, &b), edit_distance(&b, &a));
            }

            #[test]
            fn normalized_forms_always_match_exactly(name in "[A-Za-z][A-Za-z -]{0,20}") {
                let gyms = vec![
                    GymRecord { id: 1, name: "zzzzzzzzzzzzzzzzzzzzzzzzzzzz".into(), status: String::new() },
                    GymRecord { id: 2, name: name.clone(), status: String::new() },
                ];
                let query = name.to_uppercase().replace(' ', "-");
                let found = best_match(&query, &gyms).unwrap();
                prop_assert_eq!(edit_distance(&normalize_name(&query), &normalize_name(&found.name)), 0);
            }
        }
    }
}
