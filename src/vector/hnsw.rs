//! Hierarchical navigable small-world graph for approximate nearest neighbor search.
//!
//! Nodes live in a contiguous arena and neighbor lists are `u32` indexes into
//! that arena, one list per layer. Vectors are normalized on insert so the
//! dot product of two stored vectors is their cosine similarity.
//!
//! # Deletion
//! Removing a key marks its node as a tombstone. Tombstones keep routing
//! traffic through the graph but never surface as results. Once tombstones
//! outnumber live nodes the graph is rebuilt from the live set.
//!
//! # Persistence
//! [`HnswIndex::to_snapshot`] encodes the arena with bincode and compresses
//! it with lz4 so a namespace can be reloaded without re-linking the graph.

use crate::vector::similarity::{IndexHit, dot, normalized, rank_hits};
use crate::vector::{VectorDimension, VectorError, VectorResult};
use bincode::{Decode, Encode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Hard cap on the number of layers a node may occupy.
const MAX_LEVEL: usize = 16;

/// Snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Seed for level assignment, so identical insert sequences build identical graphs.
const LEVEL_SEED: u64 = 0x5eed_c0de_0000_0001;

/// Build and query parameters for the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnswParams {
    /// Max neighbors per node on layers above 0 (layer 0 allows twice as many).
    pub m: usize,
    /// Candidate list breadth while linking a new node.
    pub ef_construction: usize,
    /// Candidate list breadth while querying.
    pub ef_search: usize,
    /// Max number of live vectors.
    pub max_elements: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            max_elements: 10_000,
        }
    }
}

impl HnswParams {
    fn sanitized(self) -> Self {
        let m = self.m.max(2);
        Self {
            m,
            ef_construction: self.ef_construction.max(m),
            ef_search: self.ef_search.max(1),
            max_elements: self.max_elements.max(1),
        }
    }

    fn max_neighbors(&self, layer: usize) -> usize {
        if layer == 0 { self.m * 2 } else { self.m }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
struct Node {
    key: String,
    seq: u64,
    vector: Vec<f32>,
    /// One adjacency list per layer; `neighbors.len() - 1` is the node's level.
    neighbors: Vec<Vec<u32>>,
    deleted: bool,
}

#[derive(Encode, Decode)]
struct HnswSnapshot {
    version: u32,
    dimension: u64,
    entry_point: Option<u32>,
    max_level: u32,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    sim: f32,
    id: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sim
            .total_cmp(&other.sim)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Arena-backed HNSW index keyed by string ids.
pub struct HnswIndex {
    dimension: VectorDimension,
    params: HnswParams,
    nodes: Vec<Node>,
    key_to_node: HashMap<String, u32>,
    entry_point: Option<u32>,
    max_level: usize,
    live: usize,
    level_mult: f64,
    rng: StdRng,
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimension", &self.dimension)
            .field("params", &self.params)
            .field("live", &self.live)
            .field("tombstones", &self.tombstones())
            .field("max_level", &self.max_level)
            .finish_non_exhaustive()
    }
}

impl HnswIndex {
    #[must_use]
    pub fn new(dimension: VectorDimension, params: HnswParams) -> Self {
        let params = params.sanitized();
        Self {
            dimension,
            params,
            nodes: Vec::new(),
            key_to_node: HashMap::new(),
            entry_point: None,
            max_level: 0,
            live: 0,
            level_mult: 1.0 / (params.m as f64).ln(),
            rng: StdRng::seed_from_u64(LEVEL_SEED),
        }
    }

    /// Number of live vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of deleted nodes still held in the arena.
    #[must_use]
    pub fn tombstones(&self) -> usize {
        self.nodes.len() - self.live
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.key_to_node.contains_key(key)
    }

    /// Whether inserting `key` would stay within `max_elements`.
    #[must_use]
    pub fn can_insert(&self, key: &str) -> bool {
        self.contains(key) || self.live < self.params.max_elements
    }

    /// Live `(key, seq)` pairs.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, u64)> {
        self.nodes
            .iter()
            .filter(|n| !n.deleted)
            .map(|n| (n.key.clone(), n.seq))
            .collect()
    }

    /// Inserts or replaces the vector stored under `key`.
    pub fn insert(&mut self, key: &str, seq: u64, vector: &[f32]) -> VectorResult<()> {
        self.dimension.validate_vector(vector)?;
        if !self.can_insert(key) {
            return Err(VectorError::CapacityExceeded {
                max_elements: self.params.max_elements,
            });
        }

        if let Some(old) = self.key_to_node.remove(key) {
            self.nodes[old as usize].deleted = true;
            self.live -= 1;
        }

        self.push_node(key.to_string(), seq, normalized(vector))?;
        self.maybe_compact();
        Ok(())
    }

    /// Marks `key` deleted. Returns false when the key is unknown.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(id) = self.key_to_node.remove(key) else {
            return false;
        };
        self.nodes[id as usize].deleted = true;
        self.live -= 1;
        self.maybe_compact();
        true
    }

    /// Returns up to `k` live hits ranked by cosine similarity.
    pub fn search(&self, query: &[f32], k: usize) -> VectorResult<Vec<IndexHit>> {
        self.dimension.validate_vector(query)?;
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 || self.live == 0 {
            return Ok(Vec::new());
        }

        let query = normalized(query);
        let mut entry_points = vec![entry];
        for layer in (1..=self.max_level).rev() {
            if let Some(best) = self.search_layer(&query, &entry_points, 1, layer).first() {
                entry_points = vec![best.id];
            }
        }

        // Tombstones occupy candidate slots, so widen the beam while they exist.
        let mut ef = self.params.ef_search.max(k);
        if self.tombstones() > 0 {
            ef = ef.saturating_mul(2);
        }
        let ef = ef.min(self.nodes.len());

        let mut hits: Vec<IndexHit> = self
            .search_layer(&query, &entry_points, ef, 0)
            .into_iter()
            .filter_map(|c| {
                let node = &self.nodes[c.id as usize];
                (!node.deleted).then(|| IndexHit {
                    key: node.key.clone(),
                    score: c.sim,
                    seq: node.seq,
                })
            })
            .collect();

        rank_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    /// Rebuilds the graph from live nodes, dropping all tombstones.
    pub fn compact(&mut self) {
        let mut live: Vec<Node> = std::mem::take(&mut self.nodes)
            .into_iter()
            .filter(|n| !n.deleted)
            .collect();
        live.sort_by_key(|n| n.seq);

        self.key_to_node.clear();
        self.entry_point = None;
        self.max_level = 0;
        self.live = 0;

        for node in live {
            // The arena was just emptied, so ids cannot overflow here.
            let _ = self.push_node(node.key, node.seq, node.vector);
        }
    }

    /// Encodes the graph into a compressed snapshot.
    pub fn to_snapshot(&self) -> VectorResult<Vec<u8>> {
        let snapshot = HnswSnapshot {
            version: SNAPSHOT_VERSION,
            dimension: self.dimension.get() as u64,
            entry_point: self.entry_point,
            max_level: self.max_level as u32,
            nodes: self.nodes.clone(),
        };
        let bytes = bincode::encode_to_vec(snapshot, bincode::config::standard())
            .map_err(|e| VectorError::Serialization(format!("Failed to encode index: {e}")))?;
        Ok(lz4_flex::compress_prepend_size(&bytes))
    }

    /// Restores a graph from [`HnswIndex::to_snapshot`] output.
    ///
    /// The snapshot is rejected when its dimension differs from `dimension`
    /// or when any neighbor index points outside the arena.
    pub fn from_snapshot(
        bytes: &[u8],
        dimension: VectorDimension,
        params: HnswParams,
    ) -> VectorResult<Self> {
        let raw = lz4_flex::decompress_size_prepended(bytes)
            .map_err(|e| VectorError::Serialization(format!("Failed to decompress index: {e}")))?;
        let (snapshot, _): (HnswSnapshot, usize) =
            bincode::decode_from_slice(&raw, bincode::config::standard())
                .map_err(|e| VectorError::Serialization(format!("Failed to decode index: {e}")))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(VectorError::Serialization(format!(
                "Unsupported index snapshot version {}",
                snapshot.version
            )));
        }
        if snapshot.dimension != dimension.get() as u64 {
            return Err(VectorError::DimensionMismatch {
                expected: dimension.get(),
                actual: snapshot.dimension as usize,
            });
        }

        let node_count = snapshot.nodes.len();
        let mut key_to_node = HashMap::new();
        for (idx, node) in snapshot.nodes.iter().enumerate() {
            dimension.validate_vector(&node.vector)?;
            if node.neighbors.is_empty() || node.neighbors.len() > MAX_LEVEL + 1 {
                return Err(VectorError::Serialization(format!(
                    "Node {idx} has an invalid level"
                )));
            }
            if node
                .neighbors
                .iter()
                .flatten()
                .any(|&n| n as usize >= node_count)
            {
                return Err(VectorError::Serialization(format!(
                    "Node {idx} links outside the index"
                )));
            }
            if !node.deleted && key_to_node.insert(node.key.clone(), idx as u32).is_some() {
                return Err(VectorError::Serialization(format!(
                    "Duplicate live key '{}'",
                    node.key
                )));
            }
        }

        let max_level = snapshot.max_level as usize;
        match snapshot.entry_point {
            Some(ep) if (ep as usize) < node_count => {
                if snapshot.nodes[ep as usize].neighbors.len() != max_level + 1 {
                    return Err(VectorError::Serialization(
                        "Entry point level does not match graph height".to_string(),
                    ));
                }
            }
            Some(_) => {
                return Err(VectorError::Serialization(
                    "Entry point outside the index".to_string(),
                ));
            }
            None if node_count > 0 => {
                return Err(VectorError::Serialization(
                    "Non-empty index without entry point".to_string(),
                ));
            }
            None => {}
        }

        let params = params.sanitized();
        Ok(Self {
            dimension,
            params,
            live: key_to_node.len(),
            key_to_node,
            entry_point: snapshot.entry_point,
            max_level,
            nodes: snapshot.nodes,
            level_mult: 1.0 / (params.m as f64).ln(),
            rng: StdRng::seed_from_u64(LEVEL_SEED ^ node_count as u64),
        })
    }

    fn random_level(&mut self) -> usize {
        let uniform = 1.0 - self.rng.random::<f64>();
        let level = (-uniform.ln() * self.level_mult).floor();
        (level as usize).min(MAX_LEVEL)
    }

    fn push_node(&mut self, key: String, seq: u64, vector: Vec<f32>) -> VectorResult<()> {
        let id = u32::try_from(self.nodes.len()).map_err(|_| VectorError::CapacityExceeded {
            max_elements: self.params.max_elements,
        })?;
        let level = self.random_level();

        self.key_to_node.insert(key.clone(), id);
        self.nodes.push(Node {
            key,
            seq,
            vector,
            neighbors: vec![Vec::new(); level + 1],
            deleted: false,
        });
        self.live += 1;
        self.link(id, level);
        Ok(())
    }

    fn link(&mut self, id: u32, level: usize) {
        let Some(entry) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_level = level;
            return;
        };

        let query = self.nodes[id as usize].vector.clone();
        let mut entry_points = vec![entry];

        // Greedy descent through the layers above the new node.
        for layer in (level + 1..=self.max_level).rev() {
            if let Some(best) = self.search_layer(&query, &entry_points, 1, layer).first() {
                entry_points = vec![best.id];
            }
        }

        for layer in (0..=level.min(self.max_level)).rev() {
            let candidates =
                self.search_layer(&query, &entry_points, self.params.ef_construction, layer);
            let selected: Vec<u32> = candidates
                .iter()
                .filter(|c| c.id != id)
                .take(self.params.m)
                .map(|c| c.id)
                .collect();

            let max_neighbors = self.params.max_neighbors(layer);
            for &neighbor in &selected {
                self.connect(neighbor, id, layer, max_neighbors);
            }
            self.nodes[id as usize].neighbors[layer] = selected;

            if !candidates.is_empty() {
                entry_points = candidates.iter().map(|c| c.id).collect();
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(id);
        }
    }

    /// Adds `new` to `node`'s adjacency on `layer`, pruning to the closest `max_neighbors`.
    fn connect(&mut self, node: u32, new: u32, layer: usize, max_neighbors: usize) {
        let list = &mut self.nodes[node as usize].neighbors[layer];
        if list.contains(&new) {
            return;
        }
        list.push(new);
        if list.len() <= max_neighbors {
            return;
        }

        let base = &self.nodes[node as usize];
        let mut scored: Vec<Candidate> = base.neighbors[layer]
            .iter()
            .map(|&n| Candidate {
                sim: dot(&base.vector, &self.nodes[n as usize].vector),
                id: n,
            })
            .collect();
        scored.sort_by(|a, b| b.cmp(a));
        scored.truncate(max_neighbors);
        self.nodes[node as usize].neighbors[layer] = scored.into_iter().map(|c| c.id).collect();
    }

    /// Beam search on a single layer. Returns candidates best-first.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[u32],
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let ef = ef.max(1);
        let mut visited: HashSet<u32> = HashSet::with_capacity(ef * 4);
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
        let mut results: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();

        for &ep in entry_points {
            if !visited.insert(ep) {
                continue;
            }
            let c = Candidate {
                sim: dot(query, &self.nodes[ep as usize].vector),
                id: ep,
            };
            candidates.push(c);
            results.push(Reverse(c));
            if results.len() > ef {
                results.pop();
            }
        }

        while let Some(current) = candidates.pop() {
            let worst = results.peek().map_or(f32::NEG_INFINITY, |r| r.0.sim);
            if results.len() >= ef && current.sim < worst {
                break;
            }

            let Some(neighbors) = self.nodes[current.id as usize].neighbors.get(layer) else {
                continue;
            };
            for &n in neighbors {
                if !visited.insert(n) {
                    continue;
                }
                let sim = dot(query, &self.nodes[n as usize].vector);
                let worst = results.peek().map_or(f32::NEG_INFINITY, |r| r.0.sim);
                if results.len() < ef || sim > worst {
                    let c = Candidate { sim, id: n };
                    candidates.push(c);
                    results.push(Reverse(c));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<Candidate> = results.into_iter().map(|Reverse(c)| c).collect();
        out.sort_by(|a, b| b.cmp(a));
        out
    }

    fn maybe_compact(&mut self) {
        if self.live == 0 {
            self.nodes.clear();
            self.key_to_node.clear();
            self.entry_point = None;
            self.max_level = 0;
        } else if self.tombstones() > self.live {
            self.compact();
        }
    }
}
