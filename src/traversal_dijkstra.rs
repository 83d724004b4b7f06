use std::collections::hash_map::Entry::{Occupied, Vacant};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::cmp::Ordering;

use ndarray::prelude::*;
use petgraph::graph::{EdgeIndex, NodeIndex};

use super::network::BikeNetwork;


/// Turn-aware dijkstra.  A search state is the edge a node was reached by, so that the
/// utility of each turn can be charged when leaving the node.  States are expanded lazily
/// from `origins` until every node in `targets` is settled or nothing within `bound` is left.
///
/// Costs are disutilities: leaving an origin along `e` costs `-edge_utils[e]`, and moving
/// from `e` onto `f` costs `-edge_utils[f] - traversal_utils[t]` where `t` is the traversal
/// from `e` to `f`.  Utilities must be non-positive.  States costing more than `bound` are
/// never expanded.  Equal-cost states are expanded in the order they were first reached.
pub fn traversal_dijkstra(
    network: &BikeNetwork,
    origins: &[NodeIndex],
    targets: &HashSet<NodeIndex>,
    edge_utils: ArrayView1<f64>,
    traversal_utils: ArrayView1<f64>,
    bound: f64,
) -> SearchTree
{
    let mut visited: HashSet<EdgeIndex> = HashSet::new();
    let mut scores: HashMap<EdgeIndex, f64> = HashMap::new();
    let mut predecessors: HashMap<EdgeIndex, Option<EdgeIndex>> = HashMap::new();
    let mut settled_targets = HashMap::new();
    let mut visit_next = BinaryHeap::new();
    let mut seq = 0;

    for origin in origins {
        for edge in network.outgoing(*origin) {
            let score = -edge_utils[edge.index()];
            if score > bound {
                continue;
            }
            match scores.entry(*edge) {
                Occupied(ent) => {
                    if score < *ent.get() {
                        *ent.into_mut() = score;
                    } else {
                        continue;
                    }
                }
                Vacant(ent) => {
                    ent.insert(score);
                }
            }
            predecessors.insert(*edge, None);
            visit_next.push(MinScored(score, seq, *edge));
            seq += 1;
        }
    }

    while let Some(MinScored(edge_score, _, edge)) = visit_next.pop() {
        if visited.contains(&edge) {
            continue;
        }
        if edge_score > bound {
            break;
        }
        visited.insert(edge);

        let (_, head) = network.edge_endpoints(edge);
        if targets.contains(&head) && !settled_targets.contains_key(&head) {
            let order = settled_targets.len();
            settled_targets.insert(head, (order, edge));
            if settled_targets.len() == targets.len() {
                break;
            }
        }

        for trav_idx in network.traversals_from(edge) {
            let next = network.traversal(trav_idx).to_edge;
            if visited.contains(&next) {
                continue;
            }
            let next_score = edge_score - edge_utils[next.index()] - traversal_utils[trav_idx];
            if next_score > bound {
                continue;
            }
            match scores.entry(next) {
                Occupied(ent) => {
                    if next_score < *ent.get() {
                        *ent.into_mut() = next_score;
                    } else {
                        continue;
                    }
                }
                Vacant(ent) => {
                    ent.insert(next_score);
                }
            }
            predecessors.insert(next, Some(edge));
            visit_next.push(MinScored(next_score, seq, next));
            seq += 1;
        }
    }

    log::debug!("search from {} origins settled {} of {} targets after {} pushes",
                origins.len(), settled_targets.len(), targets.len(), seq);
    SearchTree {
        predecessors,
        settled_targets,
    }
}

/// The settled part of one search, from which the path to each reached target is read.
#[derive(Debug)]
pub struct SearchTree {
    predecessors: HashMap<EdgeIndex, Option<EdgeIndex>>,
    // target node -> (settlement order, arrival edge)
    settled_targets: HashMap<NodeIndex, (usize, EdgeIndex)>,
}

impl SearchTree {
    pub fn num_settled_targets(&self) -> usize {
        self.settled_targets.len()
    }

    pub fn path_to(&self, node: NodeIndex) -> Option<Vec<EdgeIndex>> {
        let (_, edge) = self.settled_targets.get(&node)?;
        Some(self.unwind(*edge))
    }

    /// The path to whichever of `nodes` the search settled first.
    pub fn path_to_first(&self, nodes: &[NodeIndex]) -> Option<Vec<EdgeIndex>> {
        let first = nodes.iter()
            .filter_map(|node| self.settled_targets.get(node))
            .min_by_key(|(order, _)| *order)?;
        Some(self.unwind(first.1))
    }

    fn unwind(&self, last_edge: EdgeIndex) -> Vec<EdgeIndex> {
        let mut path = vec![last_edge];
        let mut current = last_edge;
        while let Some(Some(prev)) = self.predecessors.get(&current) {
            path.push(*prev);
            current = *prev;
        }
        path.reverse();
        return path;
    }
}

/// Heap entry ordered so that `BinaryHeap` pops the lowest score first, and among equal
/// scores the lowest sequence number first.
#[derive(Copy, Clone, Debug)]
pub struct MinScored<K, T>(pub K, pub usize, pub T);

impl<K: PartialOrd, T> PartialEq for MinScored<K, T> {
    #[inline]
    fn eq(&self, other: &MinScored<K, T>) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: PartialOrd, T> Eq for MinScored<K, T> {}

impl<K: PartialOrd, T> PartialOrd for MinScored<K, T> {
    #[inline]
    fn partial_cmp(&self, other: &MinScored<K, T>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: PartialOrd, T> Ord for MinScored<K, T> {
    #[inline]
    fn cmp(&self, other: &MinScored<K, T>) -> Ordering {
        let a = &self.0;
        let b = &other.0;
        if a == b {
            other.1.cmp(&self.1)
        } else if a < b {
            Ordering::Greater
        } else if a > b {
            Ordering::Less
        } else if a.ne(a) && b.ne(b) {
            // these are the NaN cases
            other.1.cmp(&self.1)
        } else if a.ne(a) {
            // Order NaN less, so that it is last in the MinScore order
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}
