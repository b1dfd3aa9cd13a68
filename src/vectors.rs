//! Node vectors produced by one replicate, plus similarity lookups.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

use crate::error::TrainingError;

/// Mapping node id -> fixed-length vector. Ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeVectors {
    dim: usize,
    vectors: BTreeMap<String, Vec<f32>>,
}

impl NodeVectors {
    pub fn new(dim: usize) -> Self {
        Self { dim, vectors: BTreeMap::new() }
    }

    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f32>) -> Result<(), TrainingError> {
        let id = id.into();
        if vector.len() != self.dim {
            return Err(TrainingError::Failed(format!(
                "vector for `{id}` has {} components, expected {}",
                vector.len(),
                self.dim
            )));
        }
        self.vectors.insert(id, vector);
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.vectors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// The `k` nodes with the highest cosine similarity to `id`, best first.
    ///
    /// Returns an empty list when `id` has no vector.
    pub fn most_similar(&self, id: &str, k: usize) -> Vec<(String, f32)> {
        let Some(query) = self.get(id) else { return Vec::new() };
        if k == 0 {
            return Vec::new();
        }
        let keys: Vec<&String> = self.vectors.keys().collect();
        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (i, (other, v)) in self.vectors.iter().enumerate() {
            if other == id {
                continue;
            }
            let Ok(s) = NotNan::new(cosine_similarity(query, v)) else { continue };
            if heap.len() < k {
                heap.push(Reverse((s, Reverse(i))));
            } else if let Some(&Reverse((min_score, _))) = heap.peek() {
                if s > min_score {
                    heap.pop();
                    heap.push(Reverse((s, Reverse(i))));
                }
            }
        }
        let mut results: Vec<(NotNan<f32>, usize)> =
            heap.into_iter().map(|Reverse((s, Reverse(i)))| (s, i)).collect();
        results.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        results
            .into_iter()
            .map(|(s, i)| (keys[i].clone(), s.into_inner()))
            .collect()
    }
}

/// Cosine similarity; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NodeVectors {
        let mut nv = NodeVectors::new(2);
        nv.insert("a", vec![1.0, 0.0]).unwrap();
        nv.insert("b", vec![0.9, 0.1]).unwrap();
        nv.insert("c", vec![0.0, 1.0]).unwrap();
        nv.insert("d", vec![-1.0, 0.0]).unwrap();
        nv.insert("z", vec![0.0, 0.0]).unwrap();
        nv
    }

    #[test]
    fn most_similar_orders_by_cosine() {
        let nv = sample();
        let got = nv.most_similar("a", 3);
        let ids: Vec<&str> = got.iter().map(|(id, _)| id.as_str()).collect();
        // c and z both score 0; ties break by id order.
        assert_eq!(ids, ["b", "c", "z"]);
        assert!(got[0].1 > 0.99);
    }

    #[test]
    fn most_similar_unknown_or_zero_k_is_empty() {
        let nv = sample();
        assert!(nv.most_similar("nope", 3).is_empty());
        assert!(nv.most_similar("a", 0).is_empty());
        assert_eq!(nv.most_similar("a", 10).len(), 4);
    }

    #[test]
    fn insert_rejects_wrong_dimension() {
        let mut nv = NodeVectors::new(3);
        assert!(nv.insert("x", vec![1.0]).is_err());
        assert!(nv.is_empty());
    }

    #[test]
    fn cosine_of_opposites_is_minus_one() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
