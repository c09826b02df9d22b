//! Exact brute-force index used when approximate indexing is disabled.

use crate::vector::similarity::{IndexHit, dot, normalized, rank_hits};
use crate::vector::{VectorDimension, VectorResult};
use rayon::prelude::*;
use std::collections::HashMap;

#[derive(Debug)]
struct FlatEntry {
    key: String,
    seq: u64,
    vector: Vec<f32>,
}

/// Scores every stored vector against the query.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: VectorDimension,
    entries: Vec<FlatEntry>,
    positions: HashMap<String, usize>,
}

impl FlatIndex {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    #[must_use]
    pub fn entries(&self) -> Vec<(String, u64)> {
        self.entries
            .iter()
            .map(|e| (e.key.clone(), e.seq))
            .collect()
    }

    pub fn insert(&mut self, key: &str, seq: u64, vector: &[f32]) -> VectorResult<()> {
        self.dimension.validate_vector(vector)?;
        let entry = FlatEntry {
            key: key.to_string(),
            seq,
            vector: normalized(vector),
        };
        match self.positions.get(key) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.positions.insert(key.to_string(), self.entries.len());
                self.entries.push(entry);
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let Some(pos) = self.positions.remove(key) else {
            return false;
        };
        self.entries.swap_remove(pos);
        if let Some(moved) = self.entries.get(pos) {
            self.positions.insert(moved.key.clone(), pos);
        }
        true
    }

    pub fn search(&self, query: &[f32], k: usize) -> VectorResult<Vec<IndexHit>> {
        self.dimension.validate_vector(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = normalized(query);

        let mut hits: Vec<IndexHit> = self
            .entries
            .par_iter()
            .map(|e| IndexHit {
                key: e.key.clone(),
                score: dot(&query, &e.vector),
                seq: e.seq,
            })
            .collect();

        rank_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_search_is_exact() {
        let mut index = FlatIndex::new(VectorDimension::new(2).unwrap());
        index.insert("x", 0, &[1.0, 0.0]).unwrap();
        index.insert("y", 1, &[0.0, 1.0]).unwrap();
        index.insert("xy", 2, &[1.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.1], 3).unwrap();
        let keys: Vec<_> = hits.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, vec!["x", "xy", "y"]);
    }

    #[test]
    fn test_swap_remove_keeps_positions() {
        let mut index = FlatIndex::new(VectorDimension::new(2).unwrap());
        index.insert("a", 0, &[1.0, 0.0]).unwrap();
        index.insert("b", 1, &[0.0, 1.0]).unwrap();
        index.insert("c", 2, &[1.0, 1.0]).unwrap();

        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert!(index.contains("c"));
        assert!(index.remove("c"));
        assert_eq!(index.len(), 1);
        assert_eq!(index.entries(), vec![("b".to_string(), 1)]);
    }
}
