use std::collections::HashSet;

use ndarray::prelude::*;
use petgraph::graph::EdgeIndex;

use super::network::BikeNetwork;
use super::BikeRouteError;


/// A loop-free sequence of contiguous edges, with the traversals joining them.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub edges: Vec<EdgeIndex>,
    pub traversals: Vec<usize>,
    pub distance: f64,
    pub utility: f64,
}

impl Path {
    /// Builds a path from its edges, pricing it with the given utilities.  Fails if the
    /// edges are not joined by traversals or an edge repeats.
    pub fn priced(network: &BikeNetwork, edges: Vec<EdgeIndex>, edge_utils: ArrayView1<f64>,
                  traversal_utils: ArrayView1<f64>) -> Result<Path, BikeRouteError> {
        if edges.is_empty() {
            return Err(BikeRouteError::config("path has no edges"));
        }
        let mut seen = HashSet::new();
        for edge in &edges {
            if !seen.insert(*edge) {
                return Err(BikeRouteError::config(
                    format!("edge {} repeats in path", edge.index())));
            }
        }
        let mut traversals = vec![];
        for pair in edges.windows(2) {
            match network.find_traversal(pair[0], pair[1]) {
                Some(trav_idx) => traversals.push(trav_idx),
                None => return Err(BikeRouteError::config(
                    format!("no traversal from edge {} to edge {}", pair[0].index(),
                            pair[1].index()))),
            }
        }
        let distance = edges.iter().map(|ee| network.edge_distance(*ee)).sum();
        let mut path = Path {
            edges,
            traversals,
            distance,
            utility: 0.,
        };
        path.utility = path.utility_under(edge_utils, traversal_utils);
        return Ok(path);
    }

    pub fn utility_under(&self, edge_utils: ArrayView1<f64>,
                         traversal_utils: ArrayView1<f64>) -> f64 {
        let edge_sum: f64 = self.edges.iter().map(|ee| edge_utils[ee.index()]).sum();
        let trav_sum: f64 = self.traversals.iter().map(|tt| traversal_utils[*tt]).sum();
        return edge_sum + trav_sum;
    }

    /// The same path priced under different utilities.
    pub fn repriced(&self, edge_utils: ArrayView1<f64>, traversal_utils: ArrayView1<f64>)
                    -> Path {
        let mut path = self.clone();
        path.utility = self.utility_under(edge_utils, traversal_utils);
        return path;
    }
}

/// The distinct paths found for one OD pair over all iterations, in the order first found.
#[derive(Debug, Clone, Default)]
pub struct PathSet {
    paths: Vec<Path>,
    seen: HashSet<Vec<EdgeIndex>>,
    num_found: usize,
    num_missing: usize,
}

impl PathSet {
    pub fn new() -> PathSet {
        PathSet::default()
    }

    /// Records one iteration's path.  Returns true if it had not been found before.
    pub fn add(&mut self, path: Path) -> bool {
        self.num_found += 1;
        if self.seen.contains(&path.edges) {
            return false;
        }
        self.seen.insert(path.edges.clone());
        self.paths.push(path);
        return true;
    }

    /// Records an iteration that found no path.
    pub fn add_missing(&mut self) {
        self.num_missing += 1;
    }

    pub fn paths(&self) -> &Vec<Path> {
        &self.paths
    }

    pub fn num_distinct(&self) -> usize {
        self.paths.len()
    }

    pub fn num_found(&self) -> usize {
        self.num_found
    }

    pub fn num_missing(&self) -> usize {
        self.num_missing
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    fn edges(indices: &[usize]) -> Vec<EdgeIndex> {
        indices.iter().map(|ii| EdgeIndex::new(*ii)).collect()
    }

    #[test]
    fn test_priced_path() {
        let network = test_utils::line_network();
        let edge_utils = array![-1., -2., -0.5];
        let trav_utils = array![-0.25, 0.];
        let path = Path::priced(&network, edges(&[0, 1, 2]), edge_utils.view(),
                                trav_utils.view()).unwrap();
        assert_eq!(path.distance, 3.);
        assert_eq!(path.utility, -3.75);
        assert_eq!(path.traversals, vec![0, 1]);

        let repriced = path.repriced(Array1::from_elem(3, -1.).view(), trav_utils.view());
        assert_eq!(repriced.utility, -3.25);
        assert_eq!(repriced.edges, path.edges);
    }

    #[test]
    fn test_invalid_paths() {
        let network = test_utils::line_network();
        let edge_utils = Array1::from_elem(3, -1.);
        let trav_utils = Array1::zeros(2);
        // gap between A->B and C->D
        assert!(Path::priced(&network, edges(&[0, 2]), edge_utils.view(), trav_utils.view())
            .is_err());
        match Path::priced(&network, edges(&[0, 0]), edge_utils.view(), trav_utils.view()) {
            Err(BikeRouteError::Configuration(msg)) => assert!(msg.contains("repeats")),
            _ => panic!("expected a configuration error"),
        }
        assert!(Path::priced(&network, vec![], edge_utils.view(), trav_utils.view()).is_err());
    }

    #[test]
    fn test_path_set_dedupes() {
        let network = test_utils::line_network();
        let edge_utils = Array1::from_elem(3, -1.);
        let trav_utils = Array1::zeros(2);
        let path = Path::priced(&network, edges(&[0, 1]), edge_utils.view(), trav_utils.view())
            .unwrap();
        let mut path_set = PathSet::new();
        assert!(path_set.add(path.clone()));
        assert!(!path_set.add(path));
        path_set.add_missing();
        assert_eq!(path_set.num_distinct(), 1);
        assert_eq!(path_set.num_found(), 2);
        assert_eq!(path_set.num_missing(), 1);
    }
}
