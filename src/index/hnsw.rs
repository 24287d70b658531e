//! In-memory HNSW graph for approximate nearest-neighbor search
//!
//! Hierarchical Navigable Small World index over cosine distance:
//! - Geometric level sampling with a seeded RNG
//! - Greedy descent through upper layers, beam search at the target layer
//! - Nearest-first neighbor pruning
//! - Edge repair on removal
//! - Snapshot serialization for persistence

use super::distance::cosine_distance;
use crate::config::IndexConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Hard cap on sampled levels
pub const MAX_LEVEL: usize = 16;

const DEFAULT_SEED: u64 = 0x5eed_1dec;

/// Construction and query parameters, fixed for the lifetime of an index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Max neighbors per node on layers above 0
    pub m: usize,
    /// Max neighbors per node on layer 0
    pub m_max0: usize,
    /// Candidate list width during insertion
    pub ef_construction: usize,
    /// Candidate list width during search
    pub ef_search: usize,
    /// Level normalization factor `1/ln(M)`; reported only, sampling uses `1/M`
    pub ml: f64,
}

impl HnswParams {
    pub fn new(m: usize, ef_construction: usize, ef_search: usize) -> Self {
        let m = m.max(2);
        Self {
            m,
            m_max0: m * 2,
            ef_construction: ef_construction.max(1),
            ef_search: ef_search.max(1),
            ml: 1.0 / (m as f64).ln(),
        }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(config.hnsw_m, config.hnsw_ef_construction, config.hnsw_ef_search)
    }
}

impl Default for HnswParams {
    fn default() -> Self {
        Self::new(16, 200, 50)
    }
}

#[derive(Debug, Clone)]
struct HnswNode {
    id: String,
    vector: Vec<f32>,
    /// `neighbors[layer]` is the edge set on that layer
    neighbors: Vec<BTreeSet<String>>,
}

impl HnswNode {
    fn level(&self) -> usize {
        self.neighbors.len().saturating_sub(1)
    }
}

/// Distance-ordered candidate (ties broken by id)
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    distance: f32,
    id: String,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Search result from the HNSW index
#[derive(Debug, Clone, PartialEq)]
pub struct HnswHit {
    pub id: String,
    pub distance: f32,
}

impl HnswHit {
    /// Cosine similarity (`1 - distance`)
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Graph statistics
#[derive(Debug, Clone, Serialize)]
pub struct HnswStats {
    pub nodes: usize,
    pub max_level: usize,
    /// Number of nodes present on each layer
    pub layer_counts: Vec<usize>,
    pub avg_degree_layer0: f32,
}

/// Serializable form of the whole graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswSnapshot {
    pub params: HnswParams,
    pub entry_point: Option<String>,
    pub max_level: usize,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: String,
    pub vector: Vec<f32>,
    pub neighbors: Vec<Vec<String>>,
}

/// HNSW vector index
///
/// Mutation takes `&mut self`; callers that share an index across tasks wrap
/// it in a lock so a search never observes a half-applied insert.
#[derive(Debug, Clone)]
pub struct HnswIndex {
    nodes: HashMap<String, HnswNode>,
    entry_point: Option<String>,
    max_level: usize,
    params: HnswParams,
    rng: ChaCha8Rng,
}

impl Default for HnswIndex {
    fn default() -> Self {
        Self::new(HnswParams::default())
    }
}

impl HnswIndex {
    /// Create an empty index
    pub fn new(params: HnswParams) -> Self {
        Self::with_seed(params, DEFAULT_SEED)
    }

    /// Create an empty index with an explicit level-sampling seed
    pub fn with_seed(params: HnswParams, seed: u64) -> Self {
        debug!(
            "Creating HNSW index: M={}, ef_construction={}, ef_search={}",
            params.m, params.ef_construction, params.ef_search
        );
        Self {
            nodes: HashMap::new(),
            entry_point: None,
            max_level: 0,
            params,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::with_seed(HnswParams::from_config(config), config.seed)
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    pub fn get_vector(&self, id: &str) -> Option<&[f32]> {
        self.nodes.get(id).map(|n| n.vector.as_slice())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|k| k.as_str())
    }

    fn layer_cap(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.m_max0
        } else {
            self.params.m
        }
    }

    /// Sample a level with `P(level > k) = (1/M)^k`
    fn random_level(&mut self) -> usize {
        let p = 1.0 / self.params.m as f64;
        let mut level = 0;
        while level < MAX_LEVEL && self.rng.gen::<f64>() < p {
            level += 1;
        }
        level
    }

    /// Insert a vector.
    ///
    /// Re-inserting an existing id replaces the node; edges other nodes held
    /// to the old node now lead to the new vector.
    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f32>) {
        let id = id.into();
        let level = self.random_level();
        let mut node = HnswNode {
            id: id.clone(),
            vector,
            neighbors: vec![BTreeSet::new(); level + 1],
        };

        let entry_id = match self.entry_point.clone() {
            Some(entry) => entry,
            None => {
                self.nodes.insert(id.clone(), node);
                self.entry_point = Some(id);
                self.max_level = level;
                return;
            }
        };

        // Greedy descent through layers above the new node's level
        let mut current = vec![entry_id.clone()];
        for layer in (level + 1..=self.max_level).rev() {
            let nearest = self.search_layer(&node.vector, &current, 1, layer);
            if let Some(best) = nearest.into_iter().next() {
                current = vec![best.id];
            }
        }

        // Connect on every shared layer, top-down
        let mut new_edges: Vec<(usize, Vec<String>)> = Vec::new();
        for layer in (0..=level.min(self.max_level)).rev() {
            let candidates =
                self.search_layer(&node.vector, &current, self.params.ef_construction, layer);
            let selected: Vec<String> = candidates
                .iter()
                .filter(|c| c.id != id)
                .take(self.layer_cap(layer))
                .map(|c| c.id.clone())
                .collect();

            node.neighbors[layer] = selected.iter().cloned().collect();
            new_edges.push((layer, selected));

            let next: Vec<String> = candidates
                .into_iter()
                .filter(|c| c.id != id)
                .map(|c| c.id)
                .collect();
            if !next.is_empty() {
                current = next;
            }
        }

        self.nodes.insert(id.clone(), node);

        for (layer, neighbors) in new_edges {
            for neighbor_id in neighbors {
                if let Some(set) = self
                    .nodes
                    .get_mut(&neighbor_id)
                    .and_then(|n| n.neighbors.get_mut(layer))
                {
                    set.insert(id.clone());
                }
                self.prune_connections(&neighbor_id, layer);
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(id);
        } else if self.entry_point.as_deref() == Some(id.as_str()) {
            // The entry point itself was replaced by a shorter node
            self.promote_entry_point();
        }
    }

    /// Find the `k` nearest neighbors of `query`, ascending by distance
    pub fn search(&self, query: &[f32], k: usize) -> Vec<HnswHit> {
        let entry = match &self.entry_point {
            Some(entry) if k > 0 => entry.clone(),
            _ => return Vec::new(),
        };

        let mut current = vec![entry];
        for layer in (1..=self.max_level).rev() {
            let nearest = self.search_layer(query, &current, 1, layer);
            if let Some(best) = nearest.into_iter().next() {
                current = vec![best.id];
            }
        }

        let ef = self.params.ef_search.max(k);
        let mut results = self.search_layer(query, &current, ef, 0);
        results.truncate(k);

        results
            .into_iter()
            .map(|c| HnswHit {
                id: c.id,
                distance: c.distance,
            })
            .collect()
    }

    /// Best-first beam search restricted to one layer.
    ///
    /// Returns up to `ef` candidates sorted ascending by distance.
    fn search_layer(
        &self,
        query: &[f32],
        entry_ids: &[String],
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        for entry_id in entry_ids {
            if let Some(node) = self.nodes.get(entry_id) {
                if visited.insert(node.id.as_str()) {
                    let candidate = Candidate {
                        distance: cosine_distance(query, &node.vector),
                        id: node.id.clone(),
                    };
                    candidates.push(Reverse(candidate.clone()));
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        while let Some(Reverse(current)) = candidates.pop() {
            let worst = results.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);
            if current.distance > worst {
                break;
            }

            let Some(neighbors) = self
                .nodes
                .get(&current.id)
                .and_then(|n| n.neighbors.get(layer))
            else {
                continue;
            };

            for neighbor_id in neighbors {
                let Some(neighbor) = self.nodes.get(neighbor_id) else {
                    continue;
                };
                if !visited.insert(neighbor.id.as_str()) {
                    continue;
                }

                let distance = cosine_distance(query, &neighbor.vector);
                let worst = results.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);
                if results.len() < ef || distance < worst {
                    let candidate = Candidate {
                        distance,
                        id: neighbor.id.clone(),
                    };
                    candidates.push(Reverse(candidate.clone()));
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Trim a node's edge set on `layer` to its closest `cap` neighbors
    fn prune_connections(&mut self, id: &str, layer: usize) {
        let cap = self.layer_cap(layer);
        let (vector, neighbor_ids) = match self.nodes.get(id) {
            Some(node) => match node.neighbors.get(layer) {
                Some(set) if set.len() > cap => {
                    (node.vector.clone(), set.iter().cloned().collect::<Vec<_>>())
                }
                _ => return,
            },
            None => return,
        };

        let mut scored: Vec<Candidate> = neighbor_ids
            .into_iter()
            .map(|neighbor_id| Candidate {
                distance: self
                    .nodes
                    .get(&neighbor_id)
                    .map(|n| cosine_distance(&vector, &n.vector))
                    .unwrap_or(f32::INFINITY),
                id: neighbor_id,
            })
            .collect();
        scored.sort();
        scored.truncate(cap);

        if let Some(set) = self.nodes.get_mut(id).and_then(|n| n.neighbors.get_mut(layer)) {
            *set = scored.into_iter().map(|c| c.id).collect();
        }
    }

    /// Remove a node and every edge pointing at it.
    ///
    /// Returns `false` if the id is unknown.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(removed) = self.nodes.remove(id) else {
            return false;
        };

        let mut orphaned: Vec<(usize, String)> = Vec::new();
        for node in self.nodes.values_mut() {
            for (layer, set) in node.neighbors.iter_mut().enumerate() {
                if set.remove(id) {
                    orphaned.push((layer, node.id.clone()));
                }
            }
        }

        // Bridge the hole: reconnect each former neighbor to its closest
        // peer from the removed node's neighborhood. Sorted so the repair
        // does not depend on map iteration order.
        orphaned.sort();
        for (layer, node_id) in orphaned {
            if let Some(pool) = removed.neighbors.get(layer) {
                self.reconnect(&node_id, layer, pool);
            }
        }

        if self.entry_point.as_deref() == Some(id) {
            self.promote_entry_point();
        }

        debug!("Removed node {} from HNSW index ({} remaining)", id, self.nodes.len());
        true
    }

    fn reconnect(&mut self, node_id: &str, layer: usize, pool: &BTreeSet<String>) {
        let best = {
            let Some(node) = self.nodes.get(node_id) else {
                return;
            };
            let Some(existing) = node.neighbors.get(layer) else {
                return;
            };
            pool.iter()
                .filter(|candidate| candidate.as_str() != node_id && !existing.contains(*candidate))
                .filter_map(|candidate| {
                    self.nodes
                        .get(candidate)
                        .filter(|c| c.neighbors.len() > layer)
                        .map(|c| Candidate {
                            distance: cosine_distance(&node.vector, &c.vector),
                            id: c.id.clone(),
                        })
                })
                .min()
        };

        let Some(best) = best else {
            return;
        };

        if let Some(set) = self.nodes.get_mut(node_id).and_then(|n| n.neighbors.get_mut(layer)) {
            set.insert(best.id.clone());
        }
        if let Some(set) = self.nodes.get_mut(&best.id).and_then(|n| n.neighbors.get_mut(layer)) {
            set.insert(node_id.to_string());
        }
        self.prune_connections(node_id, layer);
        self.prune_connections(&best.id, layer);
    }

    /// Make the tallest remaining node the entry point
    fn promote_entry_point(&mut self) {
        let tallest = self
            .nodes
            .values()
            .max_by(|a, b| a.level().cmp(&b.level()).then_with(|| b.id.cmp(&a.id)))
            .map(|n| (n.id.clone(), n.level()));

        match tallest {
            Some((id, level)) => {
                self.entry_point = Some(id);
                self.max_level = level;
            }
            None => {
                self.entry_point = None;
                self.max_level = 0;
            }
        }
    }

    /// Whether every node is reachable from the entry point, treating edges
    /// on all layers as undirected
    pub fn is_connected(&self) -> bool {
        let Some(entry) = &self.entry_point else {
            return self.nodes.is_empty();
        };

        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in self.nodes.values() {
            for set in &node.neighbors {
                for neighbor in set {
                    if let Some(other) = self.nodes.get(neighbor) {
                        adjacency.entry(node.id.as_str()).or_default().push(other.id.as_str());
                        adjacency.entry(other.id.as_str()).or_default().push(node.id.as_str());
                    }
                }
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        seen.insert(entry.as_str());
        queue.push_back(entry.as_str());
        while let Some(current) = queue.pop_front() {
            if let Some(next) = adjacency.get(current) {
                for n in next {
                    if seen.insert(n) {
                        queue.push_back(n);
                    }
                }
            }
        }

        seen.len() == self.nodes.len()
    }

    /// Number of nodes a layer-0 search can reach from the entry point,
    /// following edges in their stored direction
    pub fn reachable_count(&self) -> usize {
        let Some(entry) = &self.entry_point else {
            return 0;
        };

        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        seen.insert(entry.as_str());
        queue.push_back(entry.as_str());
        while let Some(current) = queue.pop_front() {
            let Some(layer0) = self.nodes.get(current).and_then(|n| n.neighbors.first()) else {
                continue;
            };
            for neighbor in layer0 {
                if let Some(node) = self.nodes.get(neighbor) {
                    if seen.insert(node.id.as_str()) {
                        queue.push_back(node.id.as_str());
                    }
                }
            }
        }
        seen.len()
    }

    /// Whether every node can be returned by some search
    pub fn is_reachable(&self) -> bool {
        self.reachable_count() == self.nodes.len()
    }

    pub fn stats(&self) -> HnswStats {
        let mut layer_counts = vec![0usize; self.max_level + 1];
        let mut degree_sum = 0usize;
        for node in self.nodes.values() {
            for layer in 0..=node.level().min(self.max_level) {
                layer_counts[layer] += 1;
            }
            degree_sum += node.neighbors.first().map(|s| s.len()).unwrap_or(0);
        }

        HnswStats {
            nodes: self.nodes.len(),
            max_level: self.max_level,
            layer_counts,
            avg_degree_layer0: if self.nodes.is_empty() {
                0.0
            } else {
                degree_sum as f32 / self.nodes.len() as f32
            },
        }
    }

    /// Capture the full graph
    pub fn to_snapshot(&self) -> HnswSnapshot {
        let mut nodes: Vec<NodeSnapshot> = self
            .nodes
            .values()
            .map(|n| NodeSnapshot {
                id: n.id.clone(),
                vector: n.vector.clone(),
                neighbors: n.neighbors.iter().map(|s| s.iter().cloned().collect()).collect(),
            })
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        HnswSnapshot {
            params: self.params,
            entry_point: self.entry_point.clone(),
            max_level: self.max_level,
            nodes,
        }
    }

    /// Rebuild an index from a snapshot, repairing a stale entry point
    pub fn from_snapshot(snapshot: HnswSnapshot) -> Self {
        let mut index = Self::new(snapshot.params);
        for node in snapshot.nodes {
            let neighbors = if node.neighbors.is_empty() {
                vec![BTreeSet::new()]
            } else {
                node.neighbors.into_iter().map(|l| l.into_iter().collect()).collect()
            };
            index.nodes.insert(
                node.id.clone(),
                HnswNode {
                    id: node.id,
                    vector: node.vector,
                    neighbors,
                },
            );
        }
        index.entry_point = snapshot.entry_point;
        index.max_level = snapshot.max_level;

        let entry_valid = index
            .entry_point
            .as_ref()
            .and_then(|id| index.nodes.get(id))
            .is_some_and(|n| n.level() == index.max_level);
        if !entry_valid && !index.nodes.is_empty() {
            warn!("HNSW snapshot has an invalid entry point, promoting a new one");
            index.promote_entry_point();
        } else if index.nodes.is_empty() {
            index.entry_point = None;
            index.max_level = 0;
        }

        index
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_snapshot())
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let snapshot: HnswSnapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(snapshot))
    }
}
