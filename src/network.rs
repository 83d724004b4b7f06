use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs::File;
use std::ops::Range;
use std::path::Path;

use ndarray::prelude::*;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};

use super::config_utils::parse_numeric_cell;
use super::geometry::{turn_angle, Point2d};
use super::settings::ZoneLevel;
use super::BikeRouteError;
use super::ZoneId;


// A convenience type for parsing csv data
type Row = HashMap<String, String>;

const TURN_THRESHOLD: f64 = PI / 6.;
const REVERSAL_THRESHOLD: f64 = 5. * PI / 6.;

/// Numeric attributes of a set of network elements, one row per element and one column per
/// attribute name.
#[derive(Debug, Clone)]
pub struct AttributeTable {
    names: Vec<String>,
    index: HashMap<String, usize>,
    values: Array2<f64>,
}

impl AttributeTable {
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<AttributeTable, BikeRouteError> {
        if names.len() != values.ncols() {
            return Err(BikeRouteError::config(
                format!("{} attribute names given for {} columns", names.len(), values.ncols())));
        }
        let mut index = HashMap::new();
        for (ii, name) in names.iter().enumerate() {
            if index.insert(name.clone(), ii).is_some() {
                return Err(BikeRouteError::config(format!("duplicate attribute '{}'", name)));
            }
        }
        Ok(AttributeTable { names, index, values })
    }

    pub fn names(&self) -> &Vec<String> {
        &self.names
    }

    pub fn index(&self) -> &HashMap<String, usize> {
        &self.index
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn num_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<f64>> {
        self.index.get(name).map(|idx| self.values.column(*idx))
    }

    pub fn get(&self, row: usize, name: &str) -> Option<f64> {
        self.index.get(name).map(|idx| self.values[[row, *idx]])
    }
}

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: i64,
    pub position: Point2d,
    pub taz: ZoneId,
    pub mgra: ZoneId,
    pub attributes: BTreeMap<String, f64>,
}

impl NodeRecord {
    pub fn new(id: i64, x_coord: f64, y_coord: f64, taz: ZoneId, mgra: ZoneId) -> NodeRecord {
        NodeRecord {
            id,
            position: Point2d::new(x_coord, y_coord),
            taz,
            mgra,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: f64) -> NodeRecord {
        self.attributes.insert(String::from(name), value);
        return self;
    }
}

#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub from_node: i64,
    pub to_node: i64,
    pub distance: f64,
    pub attributes: BTreeMap<String, f64>,
}

impl EdgeRecord {
    pub fn new(from_node: i64, to_node: i64, distance: f64) -> EdgeRecord {
        EdgeRecord {
            from_node,
            to_node,
            distance,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: f64) -> EdgeRecord {
        self.attributes.insert(String::from(name), value);
        return self;
    }
}

#[derive(Debug, Clone)]
pub struct NetworkNode {
    pub id: i64,
    pub position: Point2d,
    pub zone: Option<ZoneId>,
}

#[derive(Debug, Clone)]
pub struct NetworkEdge {
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnType {
    None = 0,
    Right = 1,
    Left = 2,
    Reversal = 3,
}

impl TurnType {
    /// Classifies a heading change.  Positive angles turn left.
    pub fn from_angle(angle: f64) -> TurnType {
        if angle.abs() > REVERSAL_THRESHOLD {
            TurnType::Reversal
        } else if angle > TURN_THRESHOLD {
            TurnType::Left
        } else if angle < -TURN_THRESHOLD {
            TurnType::Right
        } else {
            TurnType::None
        }
    }

    pub fn value(&self) -> f64 {
        *self as i32 as f64
    }
}

/// A movement from one edge onto the next through their shared node.
#[derive(Debug, Clone)]
pub struct Traversal {
    pub from_edge: EdgeIndex,
    pub to_edge: EdgeIndex,
    pub angle: f64,
    pub turn_type: TurnType,
}

/// The directed bike network, with its turn traversals and zone centroids.  Built once and
/// shared read-only by every search.
pub struct BikeNetwork {
    graph: DiGraph<NetworkNode, NetworkEdge>,
    node_idxs_by_id: HashMap<i64, NodeIndex>,
    // outgoing edges of each node, sorted by edge index
    outgoing: Vec<Vec<EdgeIndex>>,
    traversals: Vec<Traversal>,
    // traversals out of edge e are traversals[traversal_offsets[e]..traversal_offsets[e + 1]]
    traversal_offsets: Vec<usize>,
    edge_attributes: AttributeTable,
    traversal_attributes: AttributeTable,
    zones: BTreeMap<ZoneId, Vec<NodeIndex>>,
}

impl BikeNetwork {
    pub fn from_csv(node_path: &Path, link_path: &Path, zone_level: ZoneLevel)
                    -> Result<BikeNetwork, BikeRouteError> {
        log::info!("reading nodes from {}", node_path.display());
        let nodes = read_node_csv(node_path)?;
        log::info!("reading links from {}", link_path.display());
        let edges = read_edge_csv(link_path)?;
        BikeNetwork::from_records(nodes, edges, zone_level)
    }

    pub fn from_records(nodes: Vec<NodeRecord>, edges: Vec<EdgeRecord>, zone_level: ZoneLevel)
                        -> Result<BikeNetwork, BikeRouteError> {
        let mut graph = DiGraph::new();
        let mut node_idxs_by_id = HashMap::new();
        let mut zones: BTreeMap<ZoneId, Vec<NodeIndex>> = BTreeMap::new();
        let node_attr_names: BTreeSet<String> = nodes.iter()
            .flat_map(|nn| nn.attributes.keys().cloned())
            .collect();
        let node_attr_names: Vec<String> = node_attr_names.into_iter().collect();
        let mut node_attr_rows = vec![];

        for record in nodes {
            if node_idxs_by_id.contains_key(&record.id) {
                return Err(BikeRouteError::config(format!("duplicate node id {}", record.id)));
            }
            let zone = match zone_level {
                ZoneLevel::Taz => record.taz,
                ZoneLevel::Mgra => record.mgra,
            };
            let zone = if zone > 0 { Some(zone) } else { None };
            let node_idx = graph.add_node(NetworkNode {
                id: record.id,
                position: record.position.clone(),
                zone,
            });
            if let Some(zone) = zone {
                zones.entry(zone).or_insert_with(Vec::new).push(node_idx);
            }
            node_idxs_by_id.insert(record.id, node_idx);
            node_attr_rows.push(node_attr_names.iter()
                .map(|name| *record.attributes.get(name).unwrap_or(&0.))
                .collect::<Vec<f64>>());
        }

        // edge attribute columns: distance first, then the rest by name, then the heading
        let mut edge_attr_names = vec![String::from("distance")];
        let other_names: BTreeSet<String> = edges.iter()
            .flat_map(|ee| ee.attributes.keys().cloned())
            .filter(|name| name != "distance")
            .collect();
        edge_attr_names.extend(other_names.into_iter());
        let derive_heading = !edge_attr_names.iter().any(|name| name == "angle");
        if derive_heading {
            edge_attr_names.push(String::from("angle"));
        }

        let mut edge_attr_rows = vec![];
        for record in edges {
            let from_idx = match node_idxs_by_id.get(&record.from_node) {
                Some(idx) => *idx,
                None => {
                    log::warn!("No node with id {}, skipping link ({}, {})", record.from_node,
                               record.from_node, record.to_node);
                    continue;
                }
            };
            let to_idx = match node_idxs_by_id.get(&record.to_node) {
                Some(idx) => *idx,
                None => {
                    log::warn!("No node with id {}, skipping link ({}, {})", record.to_node,
                               record.from_node, record.to_node);
                    continue;
                }
            };
            if from_idx == to_idx {
                log::warn!("ignoring self loop at node {}", record.from_node);
                continue;
            }
            if !(record.distance >= 0.) {
                return Err(BikeRouteError::config(
                    format!("link ({}, {}) has invalid distance {}", record.from_node,
                            record.to_node, record.distance)));
            }

            let heading = graph[from_idx].position.heading_to(&graph[to_idx].position);
            let mut row = vec![record.distance];
            for name in &edge_attr_names[1..] {
                if derive_heading && name == "angle" {
                    row.push(heading);
                } else {
                    row.push(*record.attributes.get(name).unwrap_or(&0.));
                }
            }
            edge_attr_rows.push(row);
            graph.add_edge(from_idx, to_idx, NetworkEdge { distance: record.distance });
        }
        let width = edge_attr_names.len();
        let edge_attributes = AttributeTable::new(edge_attr_names,
                                                  rows_to_array(&edge_attr_rows, width))?;

        // outgoing edge lists, by ascending edge index
        let mut outgoing = vec![vec![]; graph.node_count()];
        for edge_idx in graph.edge_indices() {
            if let Some((source, _)) = graph.edge_endpoints(edge_idx) {
                outgoing[source.index()].push(edge_idx);
            }
        }

        if zones.is_empty() {
            log::warn!("no node has a positive '{}' value, so the network has no zones",
                       zone_level.column());
        }

        let comps = kosaraju_scc(&graph);
        if comps.len() > 1 {
            log::warn!("there are {} strongly connected components", comps.len());
            for comp in comps.iter().filter(|comp| comp.len() < 10) {
                let ids: Vec<i64> = comp.iter().map(|ni| graph[*ni].id).collect();
                log::debug!("small component with node ids {:?}", ids);
            }
        }

        let mut network = BikeNetwork {
            graph,
            node_idxs_by_id,
            outgoing,
            traversals: vec![],
            traversal_offsets: vec![],
            edge_attributes,
            traversal_attributes: AttributeTable::new(vec![], Array2::zeros((0, 0)))?,
            zones,
        };
        network.build_traversals(&node_attr_names, &node_attr_rows)?;
        log::info!("network has {} nodes, {} edges, {} traversals and {} zones",
                   network.num_nodes(), network.num_edges(), network.num_traversals(),
                   network.zones.len());
        return Ok(network);
    }

    fn build_traversals(&mut self, node_attr_names: &Vec<String>,
                        node_attr_rows: &Vec<Vec<f64>>) -> Result<(), BikeRouteError> {
        let edge_names = self.edge_attributes.names().clone();
        let mut names = vec![String::from("angle"), String::from("absAngle"),
                             String::from("turnType")];
        let mut node_columns = vec![];
        for (ii, name) in node_attr_names.iter().enumerate() {
            if names.contains(name) {
                log::warn!("node attribute '{}' clashes with a traversal attribute, ignoring it",
                           name);
                continue;
            }
            names.push(name.clone());
            node_columns.push(ii);
        }
        for name in &edge_names {
            names.push(format!("{}_fromEdge", name));
        }
        for name in &edge_names {
            names.push(format!("{}_toEdge", name));
        }

        let heading_col = self.edge_attributes.index()["angle"];
        let mut traversals = vec![];
        let mut offsets = vec![0];
        let mut rows = vec![];
        for from_edge in self.graph.edge_indices() {
            let (start, thru) = self.edge_endpoints(from_edge);
            for to_edge in &self.outgoing[thru.index()] {
                let (_, end) = self.edge_endpoints(*to_edge);
                if end == start {
                    continue;
                }
                let from_values = self.edge_attributes.values().row(from_edge.index());
                let to_values = self.edge_attributes.values().row(to_edge.index());
                let angle = turn_angle(from_values[heading_col], to_values[heading_col]);
                let involves_centroid = [start, thru, end].iter()
                    .any(|ni| self.graph[*ni].zone.is_some());
                let turn_type = if involves_centroid {
                    TurnType::None
                } else {
                    TurnType::from_angle(angle)
                };

                let mut row = vec![angle, angle.abs(), turn_type.value()];
                for col in &node_columns {
                    row.push(node_attr_rows[thru.index()][*col]);
                }
                row.extend(from_values.iter());
                row.extend(to_values.iter());
                rows.push(row);
                traversals.push(Traversal {
                    from_edge,
                    to_edge: *to_edge,
                    angle,
                    turn_type,
                });
            }
            offsets.push(traversals.len());
        }

        let width = names.len();
        self.traversal_attributes = AttributeTable::new(names, rows_to_array(&rows, width))?;
        self.traversals = traversals;
        self.traversal_offsets = offsets;
        Ok(())
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn num_traversals(&self) -> usize {
        self.traversals.len()
    }

    pub fn graph(&self) -> &DiGraph<NetworkNode, NetworkEdge> {
        &self.graph
    }

    pub fn node(&self, node_idx: NodeIndex) -> &NetworkNode {
        &self.graph[node_idx]
    }

    pub fn get_node_idx_by_id(&self, node_id: i64) -> Option<NodeIndex> {
        self.node_idxs_by_id.get(&node_id).cloned()
    }

    pub fn edge_endpoints(&self, edge_idx: EdgeIndex) -> (NodeIndex, NodeIndex) {
        // every edge index handed out by this network is valid
        match self.graph.edge_endpoints(edge_idx) {
            Some(endpoints) => endpoints,
            None => panic!("edge {} is not in the network", edge_idx.index()),
        }
    }

    pub fn edge_distance(&self, edge_idx: EdgeIndex) -> f64 {
        self.graph[edge_idx].distance
    }

    pub fn outgoing(&self, node_idx: NodeIndex) -> &[EdgeIndex] {
        &self.outgoing[node_idx.index()]
    }

    /// Indices of the traversals that continue from `edge_idx`, ordered by outgoing edge.
    pub fn traversals_from(&self, edge_idx: EdgeIndex) -> Range<usize> {
        self.traversal_offsets[edge_idx.index()]..self.traversal_offsets[edge_idx.index() + 1]
    }

    pub fn traversal(&self, traversal_idx: usize) -> &Traversal {
        &self.traversals[traversal_idx]
    }

    pub fn find_traversal(&self, from_edge: EdgeIndex, to_edge: EdgeIndex) -> Option<usize> {
        self.traversals_from(from_edge).find(|ti| self.traversals[*ti].to_edge == to_edge)
    }

    pub fn edge_attributes(&self) -> &AttributeTable {
        &self.edge_attributes
    }

    pub fn traversal_attributes(&self) -> &AttributeTable {
        &self.traversal_attributes
    }

    pub fn zone_ids(&self) -> Vec<ZoneId> {
        self.zones.keys().cloned().collect()
    }

    pub fn zone_nodes(&self, zone: ZoneId) -> &[NodeIndex] {
        match self.zones.get(&zone) {
            Some(nodes) => nodes,
            None => &[],
        }
    }
}

fn rows_to_array(rows: &Vec<Vec<f64>>, width: usize) -> Array2<f64> {
    let mut array = Array2::zeros((rows.len(), width));
    for (ii, row) in rows.iter().enumerate() {
        for (jj, value) in row.iter().enumerate() {
            array[[ii, jj]] = *value;
        }
    }
    return array;
}

fn required_number(row: &Row, column: &str, line: usize, path: &Path)
                   -> Result<f64, BikeRouteError> {
    let cell = row.get(column).ok_or_else(|| BikeRouteError::config(
        format!("{} has no '{}' column", path.display(), column)))?;
    parse_numeric_cell(cell).ok_or_else(|| BikeRouteError::config(
        format!("{} row {}: '{}' value '{}' is not a number", path.display(), line, column,
                cell)))
}

/// Reads the remaining columns of each row as numbers.  Columns holding any non-numeric
/// value (street names and the like) are dropped; empty cells read as 0.
fn numeric_attributes(rows: &Vec<Row>, reserved: &[&str]) -> Vec<BTreeMap<String, f64>> {
    let mut columns: BTreeSet<&String> = BTreeSet::new();
    if let Some(first) = rows.get(0) {
        columns.extend(first.keys().filter(|key| !reserved.contains(&key.as_str())));
    }
    let numeric: Vec<&String> = columns.into_iter().filter(|col| {
        let is_numeric = rows.iter().all(|row| {
            let cell = row[*col].trim();
            cell.is_empty() || parse_numeric_cell(cell).is_some()
        });
        if !is_numeric {
            log::debug!("column '{}' is not numeric, ignoring it", col);
        }
        is_numeric
    }).collect();

    rows.iter().map(|row| {
        numeric.iter()
            .map(|col| ((*col).clone(), parse_numeric_cell(&row[*col]).unwrap_or(0.)))
            .collect()
    }).collect()
}

fn read_rows(path: &Path) -> Result<Vec<Row>, BikeRouteError> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    let mut rows = vec![];
    for result in reader.deserialize() {
        let row: Row = result?;
        rows.push(row);
    }
    return Ok(rows);
}

pub fn read_node_csv(path: &Path) -> Result<Vec<NodeRecord>, BikeRouteError> {
    let rows = read_rows(path)?;
    let reserved = ["id", "x", "y", "taz", "mgra"];
    let attributes = numeric_attributes(&rows, &reserved);
    let mut nodes = vec![];
    for (line, (row, attributes)) in rows.iter().zip(attributes.into_iter()).enumerate() {
        let zone_of = |column: &str| -> Result<ZoneId, BikeRouteError> {
            match row.get(column) {
                Some(_) => {
                    let zone = required_number(row, column, line, path)?;
                    Ok(if zone > 0. { zone as ZoneId } else { 0 })
                }
                None => Ok(0),
            }
        };
        let mut node = NodeRecord::new(required_number(row, "id", line, path)? as i64,
                                       required_number(row, "x", line, path)?,
                                       required_number(row, "y", line, path)?,
                                       zone_of("taz")?, zone_of("mgra")?);
        node.attributes = attributes;
        nodes.push(node);
    }
    return Ok(nodes);
}

pub fn read_edge_csv(path: &Path) -> Result<Vec<EdgeRecord>, BikeRouteError> {
    let rows = read_rows(path)?;
    let reserved = ["fromNode", "toNode", "distance"];
    let attributes = numeric_attributes(&rows, &reserved);
    let mut edges = vec![];
    for (line, (row, attributes)) in rows.iter().zip(attributes.into_iter()).enumerate() {
        let mut edge = EdgeRecord::new(required_number(row, "fromNode", line, path)? as i64,
                                       required_number(row, "toNode", line, path)? as i64,
                                       required_number(row, "distance", line, path)?);
        edge.attributes = attributes;
        edges.push(edge);
    }
    return Ok(edges);
}
