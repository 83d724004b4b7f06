use std::collections::{BTreeMap, HashSet};

use ndarray::prelude::*;
use petgraph::graph::NodeIndex;
use rand::Rng;
use rand::SeedableRng;
use rand_isaac::Isaac64Rng;
use rayon::prelude::*;

use super::choice_set::{aggregate_od, path_sizes, OdImpedance};
use super::network::BikeNetwork;
use super::paths::{Path, PathSet};
use super::settings::BikeRouteSettings;
use super::traversal_dijkstra::traversal_dijkstra;
use super::utility::{RandomScales, UtilityEvaluator};
use super::BikeRouteError;
use super::ZoneId;


/// Splits origins into at most `num_batches` contiguous, non-empty, near-equal batches.
pub fn partition_origins(origins: &[ZoneId], num_batches: usize) -> Vec<Vec<ZoneId>> {
    if origins.is_empty() {
        return vec![];
    }
    let num_batches = num_batches.max(1).min(origins.len());
    let batch_size = (origins.len() + num_batches - 1) / num_batches;
    return origins.chunks(batch_size).map(|chunk| chunk.to_vec()).collect();
}

/// A distinct path of a traced OD pair, as it entered the choice set.
#[derive(Debug, Clone)]
pub struct TracedPath {
    pub origin: ZoneId,
    pub destination: ZoneId,
    pub path_idx: usize,
    pub path: Path,
    pub path_size: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub num_searches: usize,
    pub paths_found: usize,
    pub paths_missing: usize,
    pub od_pairs_kept: usize,
    pub od_pairs_dropped: usize,
}

impl BatchStats {
    pub fn merge(&mut self, other: &BatchStats) {
        self.num_searches += other.num_searches;
        self.paths_found += other.paths_found;
        self.paths_missing += other.paths_missing;
        self.od_pairs_kept += other.od_pairs_kept;
        self.od_pairs_dropped += other.od_pairs_dropped;
    }
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub batch_idx: usize,
    pub impedances: Vec<OdImpedance>,
    pub traced_paths: Vec<TracedPath>,
    pub stats: BatchStats,
}

/// Runs path sampling and choice-set aggregation for batches of origins.  The network and
/// evaluators are shared read-only by every worker.
pub struct BatchRunner<'a> {
    network: &'a BikeNetwork,
    edge_evaluator: &'a UtilityEvaluator,
    traversal_evaluator: &'a UtilityEvaluator,
    base_edge_utils: Array1<f64>,
    base_traversal_utils: Array1<f64>,
    settings: &'a BikeRouteSettings,
}

impl<'a> BatchRunner<'a> {
    pub fn new(network: &'a BikeNetwork, edge_evaluator: &'a UtilityEvaluator,
               traversal_evaluator: &'a UtilityEvaluator, settings: &'a BikeRouteSettings)
               -> BatchRunner<'a> {
        BatchRunner {
            network,
            edge_evaluator,
            traversal_evaluator,
            base_edge_utils: edge_evaluator.utilities(),
            base_traversal_utils: traversal_evaluator.utilities(),
            settings,
        }
    }

    /// Runs every batch of `origins` against `destinations` on a pool of
    /// `number_of_processors` threads.  Results come back sorted by batch.
    pub fn run(&self, origins: &[ZoneId], destinations: &[ZoneId])
               -> Result<Vec<BatchResult>, BikeRouteError> {
        let batches = partition_origins(origins, self.settings.number_of_batches);

        // seed each batch from the top-level rng, so a batch is reproducible on its own
        let mut rng = Isaac64Rng::seed_from_u64(self.settings.random_seed);
        let batches_and_seeds: Vec<(usize, Vec<ZoneId>, u64)> = batches.into_iter().enumerate()
            .map(|(ii, batch)| (ii, batch, rng.gen::<u64>()))
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.number_of_processors)
            .build()
            .map_err(|err| BikeRouteError::config(format!("failed to start workers: {}", err)))?;
        log::info!("running {} batches of {} origins on {} threads", batches_and_seeds.len(),
                   origins.len(), self.settings.number_of_processors);

        let mut results: Vec<BatchResult> = pool.install(|| {
            batches_and_seeds.par_iter().map(|(batch_idx, batch_origins, seed)| {
                self.run_batch(*batch_idx, batch_origins, destinations, *seed)
            }).collect()
        });
        results.sort_by_key(|result| result.batch_idx);

        let mut stats = BatchStats::default();
        for result in &results {
            stats.merge(&result.stats);
        }
        if stats.od_pairs_dropped > 0 {
            log::warn!("{} OD pairs had fewer than {} distinct paths and were dropped",
                       stats.od_pairs_dropped, self.settings.min_iterations.max(1));
        }
        return Ok(results);
    }

    pub fn run_batch(&self, batch_idx: usize, origins: &[ZoneId], destinations: &[ZoneId],
                     seed: u64) -> BatchResult {
        log::info!("batch {}: starting {} origins", batch_idx, origins.len());
        let scales = RandomScales::from_settings(self.settings);
        let bound = self.settings.search_bound();
        let mut batch_rng = Isaac64Rng::seed_from_u64(seed);
        let mut stats = BatchStats::default();
        let mut path_sets: BTreeMap<(ZoneId, ZoneId), PathSet> = BTreeMap::new();

        for iteration in 0..self.settings.number_of_iterations {
            let mut rng = Isaac64Rng::seed_from_u64(batch_rng.gen::<u64>());
            let edge_utils = self.edge_evaluator.randomized_utilities(&scales, &mut rng);
            let traversal_utils = self.traversal_evaluator.randomized_utilities(&scales,
                                                                                &mut rng);

            for origin in origins {
                let origin_nodes = self.network.zone_nodes(*origin);
                let targets: HashSet<NodeIndex> = destinations.iter()
                    .filter(|dest| *dest != origin)
                    .flat_map(|dest| self.network.zone_nodes(*dest).iter().cloned())
                    .collect();
                let tree = traversal_dijkstra(self.network, origin_nodes, &targets,
                                              edge_utils.view(), traversal_utils.view(), bound);
                stats.num_searches += 1;
                log::debug!("batch {}: origin {} reached {} of {} destination nodes", batch_idx,
                            origin, tree.num_settled_targets(), targets.len());

                for dest in destinations.iter().filter(|dest| *dest != origin) {
                    let path_set = path_sets.entry((*origin, *dest)).or_insert_with(PathSet::new);
                    let edges = match tree.path_to_first(self.network.zone_nodes(*dest)) {
                        Some(edges) => edges,
                        None => {
                            path_set.add_missing();
                            stats.paths_missing += 1;
                            continue;
                        }
                    };
                    match Path::priced(self.network, edges, edge_utils.view(),
                                       traversal_utils.view()) {
                        Ok(path) => {
                            // the choice set is evaluated on the unperturbed utilities
                            path_set.add(path.repriced(self.base_edge_utils.view(),
                                                       self.base_traversal_utils.view()));
                            stats.paths_found += 1;
                        }
                        Err(reason) => {
                            log::error!("discarding invalid path from {} to {}: {}", origin,
                                        dest, reason);
                            path_set.add_missing();
                            stats.paths_missing += 1;
                        }
                    }
                }
            }
            log::debug!("batch {}: finished iteration {}", batch_idx, iteration);
        }

        let trace_pairs: HashSet<(ZoneId, ZoneId)> =
            self.settings.trace_pairs().into_iter().collect();
        let mut impedances = vec![];
        let mut traced_paths = vec![];
        for ((origin, dest), path_set) in &path_sets {
            match aggregate_od(self.network, *origin, *dest, path_set,
                               self.settings.min_iterations) {
                Some(impedance) => {
                    impedances.push(impedance);
                    stats.od_pairs_kept += 1;
                }
                None => {
                    log::debug!("batch {}: dropping ({}, {}) with {} distinct paths from {} \
                                 found and {} missing", batch_idx, origin, dest,
                                path_set.num_distinct(), path_set.num_found(),
                                path_set.num_missing());
                    stats.od_pairs_dropped += 1;
                }
            }
            if trace_pairs.contains(&(*origin, *dest)) && path_set.num_distinct() > 0 {
                let sizes = path_sizes(self.network, path_set.paths());
                for (path_idx, (path, size)) in path_set.paths().iter().zip(sizes).enumerate() {
                    traced_paths.push(TracedPath {
                        origin: *origin,
                        destination: *dest,
                        path_idx,
                        path: path.clone(),
                        path_size: size,
                    });
                }
            }
        }

        log::info!("batch {}: {} searches, {} paths found, {} missing, {} OD pairs kept",
                   batch_idx, stats.num_searches, stats.paths_found, stats.paths_missing,
                   stats.od_pairs_kept);
        BatchResult {
            batch_idx,
            impedances,
            traced_paths,
            stats,
        }
    }
}
