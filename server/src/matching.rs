//! Competitive matcher (C7): assigns diarized speakers to enrolled identities using
//! the Hungarian algorithm over a top-k candidate pool, then classifies each
//! assignment into a confidence tier per §4.7.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::embedding::cosine_similarity;
use crate::error::AppResult;
use crate::hungarian;
use crate::providers::vector_store::VectorStore;

pub const HIGH_SCORE_THRESHOLD: f32 = 0.55;
pub const HIGH_MARGIN: f32 = 0.10;
pub const TOP_K: usize = 5;

/// Cost used for a (speaker, candidate) pair that never showed up in that
/// speaker's top-k neighbor list — effectively infinite relative to any real cost,
/// which is bounded in `[0, 2]`.
const UNSEEN_PAIR_COST: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub confidence: Confidence,
    pub assigned_name: Option<String>,
    pub top_score: f32,
    pub margin: f32,
    pub candidates: Vec<(String, f32)>,
}

fn placeholder_low() -> MatchResult {
    MatchResult {
        confidence: Confidence::Low,
        assigned_name: None,
        top_score: -1.0,
        margin: 0.0,
        candidates: vec![],
    }
}

/// Match a set of diarized-speaker embeddings against the enrolled set, querying
/// `store` for each speaker's top-k neighbors.
pub async fn match_speakers(
    embeddings: &HashMap<String, Vec<f32>>,
    store: &dyn VectorStore,
) -> AppResult<HashMap<String, MatchResult>> {
    if embeddings.is_empty() {
        return Ok(HashMap::new());
    }

    let labels: Vec<String> = embeddings.keys().cloned().collect();
    let mut neighbor_lists: HashMap<String, Vec<(String, f32)>> = HashMap::new();
    let mut all_names: Vec<String> = Vec::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    for label in &labels {
        let vector = &embeddings[label];
        let matches = store.query(vector, TOP_K).await?;
        for m in &matches {
            if seen_names.insert(m.name.clone()) {
                all_names.push(m.name.clone());
            }
        }
        neighbor_lists.insert(label.clone(), matches.into_iter().map(|m| (m.name, m.score)).collect());
    }

    if all_names.is_empty() {
        return Ok(labels.into_iter().map(|l| (l, placeholder_low())).collect());
    }

    // Build the dense cost matrix over labels x candidate names. Unseen pairs get
    // the unseen-pair cost rather than being recomputed against the vector itself,
    // since only top-k neighbors are considered candidates for a given speaker.
    let mut cost = vec![vec![UNSEEN_PAIR_COST; all_names.len()]; labels.len()];
    for (i, label) in labels.iter().enumerate() {
        for (name, score) in &neighbor_lists[label] {
            if let Some(j) = all_names.iter().position(|n| n == name) {
                cost[i][j] = (1.0 - *score as f64).max(0.0);
            }
        }
    }

    let assignment = hungarian::solve(&cost);
    let mut hungarian_pick: HashMap<String, String> = HashMap::new();
    for (i, j) in assignment {
        // A pairing only "survives" if it wasn't forced through the unseen-pair cost.
        if cost[i][j] < UNSEEN_PAIR_COST {
            hungarian_pick.insert(labels[i].clone(), all_names[j].clone());
        }
    }

    let mut results = HashMap::new();
    let mut claimed_high: HashSet<String> = HashSet::new();

    for label in &labels {
        let neighbors = &neighbor_lists[label];
        if neighbors.is_empty() {
            results.insert(label.clone(), placeholder_low());
            continue;
        }

        let top = &neighbors[0];
        let assigned_name = hungarian_pick.get(label).cloned().unwrap_or_else(|| top.0.clone());
        let top_score = cosine_similarity_lookup(neighbors, &assigned_name).unwrap_or(top.1);

        let second_best = neighbors
            .iter()
            .filter(|(name, _)| name != &assigned_name)
            .map(|(_, score)| *score)
            .fold(f32::NEG_INFINITY, f32::max);
        let margin = if second_best.is_finite() { top_score - second_best } else { top_score - (-1.0) };

        let unique_assignment = hungarian_pick.get(label) == Some(&assigned_name)
            && !claimed_high.contains(&assigned_name);

        let confidence = if top_score >= HIGH_SCORE_THRESHOLD && margin >= HIGH_MARGIN && unique_assignment
        {
            claimed_high.insert(assigned_name.clone());
            Confidence::High
        } else if top_score >= HIGH_SCORE_THRESHOLD {
            Confidence::Medium
        } else {
            Confidence::Low
        };

        let final_assigned_name = if confidence == Confidence::High { Some(assigned_name) } else { None };

        results.insert(
            label.clone(),
            MatchResult {
                confidence,
                assigned_name: final_assigned_name,
                top_score,
                margin,
                candidates: neighbors.clone(),
            },
        );
    }

    Ok(results)
}

fn cosine_similarity_lookup(neighbors: &[(String, f32)], name: &str) -> Option<f32> {
    neighbors.iter().find(|(n, _)| n == name).map(|(_, s)| *s)
}

/// Recompute a score directly (used when the assigned name wasn't in the top-k,
/// which cannot happen given the construction above, but kept for clarity/tests).
#[allow(dead_code)]
fn direct_score(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::vector_store::{VectorMatch, VectorMetadata, VectorRecord};
    use async_trait::async_trait;
    use std::collections::HashMap as Map;

    struct FixedStore {
        neighbors: Map<String, Vec<VectorMatch>>,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn upsert(&self, _: &str, _: &[f32], _: VectorMetadata) -> AppResult<()> {
            Ok(())
        }
        async fn get(&self, _: &str) -> AppResult<Option<VectorRecord>> {
            Ok(None)
        }
        async fn delete(&self, _: &str) -> AppResult<()> {
            Ok(())
        }
        async fn query(&self, vector: &[f32], _k: usize) -> AppResult<Vec<VectorMatch>> {
            // Key neighbor lists by a hash of the vector's first element so each
            // speaker embedding maps to its configured neighbor list deterministically.
            let key = format!("{:.3}", vector[0]);
            Ok(self.neighbors.get(&key).cloned().unwrap_or_default())
        }
        async fn list_all(&self) -> AppResult<Vec<VectorRecord>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn unique_high_assignments_never_collide() {
        let mut neighbors = Map::new();
        neighbors.insert(
            "0.100".to_string(),
            vec![
                VectorMatch { name: "alice".to_string(), score: 0.9 },
                VectorMatch { name: "bob".to_string(), score: 0.2 },
            ],
        );
        neighbors.insert(
            "0.200".to_string(),
            vec![
                VectorMatch { name: "alice".to_string(), score: 0.85 },
                VectorMatch { name: "bob".to_string(), score: 0.3 },
            ],
        );
        let store = FixedStore { neighbors };

        let mut embeddings = HashMap::new();
        embeddings.insert("X".to_string(), vec![0.1, 0.0, 0.0]);
        embeddings.insert("Y".to_string(), vec![0.2, 0.0, 0.0]);

        let results = match_speakers(&embeddings, &store).await.unwrap();
        let highs: Vec<&String> = results
            .iter()
            .filter(|(_, m)| m.confidence == Confidence::High)
            .filter_map(|(_, m)| m.assigned_name.as_ref())
            .collect();
        let unique: HashSet<&String> = highs.iter().cloned().collect();
        assert_eq!(highs.len(), unique.len());
    }

    #[tokio::test]
    async fn speaker_with_no_candidates_is_low_with_empty_candidates() {
        let store = FixedStore { neighbors: Map::new() };
        let mut embeddings = HashMap::new();
        embeddings.insert("Z".to_string(), vec![0.9, 0.0, 0.0]);
        let results = match_speakers(&embeddings, &store).await.unwrap();
        let m = &results["Z"];
        assert_eq!(m.confidence, Confidence::Low);
        assert!(m.candidates.is_empty());
        assert!(m.assigned_name.is_none());
    }

    #[tokio::test]
    async fn below_score_threshold_is_low() {
        let mut neighbors = Map::new();
        neighbors.insert(
            "0.500".to_string(),
            vec![VectorMatch { name: "alice".to_string(), score: 0.549 }],
        );
        let store = FixedStore { neighbors };
        let mut embeddings = HashMap::new();
        embeddings.insert("X".to_string(), vec![0.5, 0.0, 0.0]);
        let results = match_speakers(&embeddings, &store).await.unwrap();
        assert_eq!(results["X"].confidence, Confidence::Low);
    }
}
