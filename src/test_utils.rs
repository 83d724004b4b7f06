use std::collections::HashMap;
use std::path::Path;

use super::network::{BikeNetwork, EdgeRecord, NodeRecord};
use super::settings::{BikeRouteSettings, ZoneLevel};
use super::utility::{SpecRow, SpecTable, UtilityEvaluator};


/// A(0,0) -> B(1,0) -> C(2,0) -> D(3,0), one way, unit distances.  A is zone 1 and D is
/// zone 4.
pub fn line_network() -> BikeNetwork {
    let nodes = vec![
        NodeRecord::new(1, 0., 0., 1, 0),
        NodeRecord::new(2, 1., 0., 0, 0),
        NodeRecord::new(3, 2., 0., 0, 0),
        NodeRecord::new(4, 3., 0., 4, 0),
    ];
    let edges = vec![
        EdgeRecord::new(1, 2, 1.),
        EdgeRecord::new(2, 3, 1.),
        EdgeRecord::new(3, 4, 1.),
    ];
    BikeNetwork::from_records(nodes, edges, ZoneLevel::Taz).unwrap()
}

/// Two disjoint routes from A (zone 1) to D (zone 4): A -> B -> D with unit links and
/// A -> C -> D with links of length 2.
pub fn diamond_network() -> BikeNetwork {
    let nodes = vec![
        NodeRecord::new(1, 0., 0., 1, 0),
        NodeRecord::new(2, 1., 0., 0, 0),
        NodeRecord::new(3, 0., 1., 0, 0),
        NodeRecord::new(4, 1., 1., 4, 0),
    ];
    let edges = vec![
        EdgeRecord::new(1, 2, 1.),
        EdgeRecord::new(2, 4, 1.),
        EdgeRecord::new(1, 3, 2.),
        EdgeRecord::new(3, 4, 2.),
    ];
    BikeNetwork::from_records(nodes, edges, ZoneLevel::Taz).unwrap()
}

/// A 3 x 3 grid of two-way unit links, with node ids 1 to 9 in row-major order.  The four
/// corners are zones named after their node.
pub fn grid_network() -> BikeNetwork {
    let mut nodes = vec![];
    for id in 1..10 {
        let col = (id - 1) % 3;
        let row = (id - 1) / 3;
        let zone = if col != 1 && row != 1 { id as u32 } else { 0 };
        nodes.push(NodeRecord::new(id, col as f64, row as f64, zone, 0));
    }
    let mut edges = vec![];
    for id in 1..10 {
        let neighbours = [(id % 3 != 0, id + 1), (id <= 6, id + 3)];
        for (exists, other) in neighbours.iter() {
            if *exists {
                let gain = ((id + other) % 3) as f64;
                edges.push(EdgeRecord::new(id, *other, 1.).with_attribute("gain", gain));
                edges.push(EdgeRecord::new(*other, id, 1.).with_attribute("gain", -gain));
            }
        }
    }
    BikeNetwork::from_records(nodes, edges, ZoneLevel::Taz).unwrap()
}

/// Unit disutility per unit distance, and free turns.
pub fn unit_evaluators(network: &BikeNetwork) -> (UtilityEvaluator, UtilityEvaluator) {
    let edge_spec = SpecTable::new(vec![SpecRow::new("distance", -1.)]);
    let traversal_spec = SpecTable::new(vec![SpecRow::new("turnType", 0.)]);
    evaluators(network, &edge_spec, &traversal_spec)
}

pub fn grid_evaluators(network: &BikeNetwork) -> (UtilityEvaluator, UtilityEvaluator) {
    let edge_spec = SpecTable::new(vec![
        SpecRow::new("distance", -1.),
        SpecRow::new("@np.maximum(df.gain, 0)", -0.2),
    ]);
    let traversal_spec = SpecTable::new(vec![
        SpecRow::new("turnType == 2", -0.5),
        SpecRow::new("turnType == 1", -0.2),
    ]);
    evaluators(network, &edge_spec, &traversal_spec)
}

fn evaluators(network: &BikeNetwork, edge_spec: &SpecTable, traversal_spec: &SpecTable)
              -> (UtilityEvaluator, UtilityEvaluator) {
    let constants = HashMap::new();
    let edge_eval = UtilityEvaluator::new(edge_spec, network.edge_attributes(), &constants,
                                          "bike_edge_utilities").unwrap();
    let traversal_eval = UtilityEvaluator::new(traversal_spec, network.traversal_attributes(),
                                               &constants, "bike_traversal_utilities").unwrap();
    (edge_eval, traversal_eval)
}

fn placeholder_settings() -> BikeRouteSettings {
    BikeRouteSettings::new(Path::new("nodes.csv"), Path::new("links.csv"),
                           Path::new("edge_utils.csv"), Path::new("traversal_utils.csv"))
}

/// One deterministic iteration at the given threshold.
pub fn line_settings(max_dijkstra_utility: f64) -> BikeRouteSettings {
    let mut settings = placeholder_settings();
    settings.number_of_iterations = 1;
    settings.random_scale_coef = 0.;
    settings.random_scale_link = 0.;
    settings.max_dijkstra_utility = max_dijkstra_utility;
    return settings;
}

pub fn grid_settings() -> BikeRouteSettings {
    let mut settings = placeholder_settings();
    settings.number_of_iterations = 4;
    settings.max_dijkstra_utility = -50.;
    return settings;
}
