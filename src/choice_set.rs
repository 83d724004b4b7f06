use std::collections::HashMap;

use petgraph::graph::EdgeIndex;

use super::network::BikeNetwork;
use super::paths::{Path, PathSet};
use super::ZoneId;


/// The aggregate impedance of one OD pair over its choice set.
#[derive(Debug, Clone, PartialEq)]
pub struct OdImpedance {
    pub origin: ZoneId,
    pub destination: ZoneId,
    pub logsum: f64,
    /// probability-weighted path distance
    pub distance: f64,
    pub path_count: usize,
}

/// Normalized path sizes.  A path's size is the sum over its edges of the edge's share of
/// the path length, divided by the number of paths in the set using the edge.  Paths of
/// zero length count as size 1 / n before normalization.
pub fn path_sizes(network: &BikeNetwork, paths: &[Path]) -> Vec<f64> {
    let num_paths = paths.len();
    let mut edge_usage: HashMap<EdgeIndex, usize> = HashMap::new();
    for path in paths {
        for edge in &path.edges {
            *edge_usage.entry(*edge).or_insert(0) += 1;
        }
    }

    let sizes: Vec<f64> = paths.iter().map(|path| {
        if path.distance <= 0. {
            return 1. / num_paths as f64;
        }
        path.edges.iter()
            .map(|edge| network.edge_distance(*edge) / path.distance / edge_usage[edge] as f64)
            .sum()
    }).collect();

    let total: f64 = sizes.iter().sum();
    if total <= 0. {
        return vec![1. / num_paths as f64; num_paths];
    }
    return sizes.iter().map(|size| size / total).collect();
}

/// Path-size logit over the distinct paths of an OD pair.  Yields nothing when fewer than
/// `min_paths` (and at least one) distinct paths were found.
pub fn aggregate_od(network: &BikeNetwork, origin: ZoneId, destination: ZoneId,
                    path_set: &PathSet, min_paths: usize) -> Option<OdImpedance> {
    let paths = path_set.paths();
    if paths.is_empty() || paths.len() < min_paths {
        return None;
    }

    let sizes = path_sizes(network, paths);
    let values: Vec<f64> = paths.iter().zip(sizes.iter())
        .map(|(path, size)| path.utility + size.ln())
        .collect();
    let max_value = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = values.iter().map(|vv| (vv - max_value).exp()).collect();
    let weight_sum: f64 = weights.iter().sum();
    let logsum = max_value + weight_sum.ln();
    let distance = paths.iter().zip(weights.iter())
        .map(|(path, weight)| path.distance * weight / weight_sum)
        .sum();

    Some(OdImpedance {
        origin,
        destination,
        logsum,
        distance,
        path_count: paths.len(),
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_ulps_eq;
    use crate::test_utils;
    use ndarray::prelude::*;

    fn path_set(network: &BikeNetwork, edge_seqs: &[&[usize]], edge_utils: &Array1<f64>)
                -> PathSet {
        let trav_utils = Array1::zeros(network.num_traversals());
        let mut path_set = PathSet::new();
        for seq in edge_seqs {
            let edges = seq.iter().map(|ii| EdgeIndex::new(*ii)).collect();
            path_set.add(Path::priced(network, edges, edge_utils.view(), trav_utils.view())
                .unwrap());
        }
        return path_set;
    }

    #[test]
    fn test_single_path() {
        let network = test_utils::line_network();
        let edge_utils = Array1::from_elem(3, -1.);
        let paths = path_set(&network, &[&[0, 1, 2]], &edge_utils);
        let od = aggregate_od(&network, 1, 4, &paths, 0).unwrap();
        // one path has size 1, so the logsum is its utility
        assert_ulps_eq!(od.logsum, -3.);
        assert_ulps_eq!(od.distance, 3.);
        assert_eq!(od.path_count, 1);
        assert!(aggregate_od(&network, 1, 4, &paths, 2).is_none());
        assert!(aggregate_od(&network, 1, 4, &PathSet::new(), 0).is_none());
    }

    #[test]
    fn test_overlapping_paths() {
        let network = test_utils::diamond_network();
        // edges: 0 A->B (1), 1 B->D (1), 2 A->C (2), 3 C->D (2)
        let edge_utils = array![-1., -1., -2., -2.];
        let paths = path_set(&network, &[&[0, 1], &[2, 3]], &edge_utils);
        let sizes = path_sizes(&network, paths.paths());
        // disjoint paths each have size 1
        assert_ulps_eq!(sizes[0], 0.5);
        assert_ulps_eq!(sizes[1], 0.5);

        let od = aggregate_od(&network, 1, 4, &paths, 2).unwrap();
        let v1 = -2. + 0.5f64.ln();
        let v2 = -4. + 0.5f64.ln();
        assert_ulps_eq!(od.logsum, (v1.exp() + v2.exp()).ln(), epsilon = 1e-12);
        let p1 = v1.exp() / (v1.exp() + v2.exp());
        assert_ulps_eq!(od.distance, p1 * 2. + (1. - p1) * 4., epsilon = 1e-12);
    }

    #[test]
    fn test_shared_edges_shrink_path_size() {
        let network = test_utils::diamond_network();
        // A->B->D and its own prefix A->B share the first edge
        let edge_utils = array![-1., -1., -2., -2.];
        let paths = path_set(&network, &[&[0, 1], &[0]], &edge_utils);
        let sizes = path_sizes(&network, paths.paths());
        // path 0: 0.5 / 2 + 0.5 / 1 = 0.75; path 1: 1 / 2 = 0.5
        assert_ulps_eq!(sizes[0], 0.75 / 1.25);
        assert_ulps_eq!(sizes[1], 0.5 / 1.25);
    }
}
