use std::collections::BTreeSet;
use std::time::Instant;

use ndarray::prelude::*;

use super::batch::{BatchRunner, BatchStats, TracedPath};
use super::choice_set::OdImpedance;
use super::network::BikeNetwork;
use super::output;
use super::settings::{BikeRouteSettings, ZoneSubset};
use super::utility::{SpecTable, UtilityEvaluator};
use super::BikeRouteError;
use super::ThresholdModel;
use super::ZoneId;


pub const EDGE_TRACE_LABEL: &str = "bike_edge_utilities";
pub const TRAVERSAL_TRACE_LABEL: &str = "bike_traversal_utilities";

/// Everything one run of the model produces.
#[derive(Debug, Clone)]
pub struct RouteChoiceOutput {
    pub zones: Vec<ZoneId>,
    /// sorted by origin, then destination
    pub impedances: Vec<OdImpedance>,
    pub traced_paths: Vec<TracedPath>,
    pub stats: BatchStats,
    pub runtime_s: f64,
}

impl RouteChoiceOutput {
    pub fn distances(&self) -> Vec<f64> {
        self.impedances.iter().map(|od| od.distance).collect()
    }

    /// Logsums as a dense zone by zone matrix in `zones` order.  Pairs without a choice set
    /// are `None`.
    pub fn logsum_matrix(&self) -> Array2<Option<f64>> {
        let num_zones = self.zones.len();
        let mut matrix = Array2::from_elem((num_zones, num_zones), None);
        for od in &self.impedances {
            let row = self.zones.binary_search(&od.origin);
            let col = self.zones.binary_search(&od.destination);
            if let (Ok(row), Ok(col)) = (row, col) {
                matrix[[row, col]] = Some(od.logsum);
            }
        }
        return matrix;
    }
}

/// The bike route choice model: a network and its two utility specifications.
pub struct BikeRouteChoice {
    settings: BikeRouteSettings,
    network: BikeNetwork,
    edge_evaluator: UtilityEvaluator,
    traversal_evaluator: UtilityEvaluator,
}

impl BikeRouteChoice {
    pub fn from_settings(settings: BikeRouteSettings) -> Result<BikeRouteChoice, BikeRouteError> {
        let node_path = settings.resolve_input(&settings.node_file)?;
        let link_path = settings.resolve_input(&settings.link_file)?;
        let edge_spec_path = settings.resolve_input(&settings.edge_util_file)?;
        let traversal_spec_path = settings.resolve_input(&settings.traversal_util_file)?;

        let network = BikeNetwork::from_csv(&node_path, &link_path, settings.zone_level)?;
        let edge_spec = SpecTable::from_csv(&edge_spec_path)?;
        let traversal_spec = SpecTable::from_csv(&traversal_spec_path)?;
        BikeRouteChoice::from_parts(settings, network, &edge_spec, &traversal_spec)
    }

    pub fn from_parts(settings: BikeRouteSettings, network: BikeNetwork, edge_spec: &SpecTable,
                      traversal_spec: &SpecTable) -> Result<BikeRouteChoice, BikeRouteError> {
        settings.validate()?;
        let edge_evaluator = UtilityEvaluator::new(edge_spec, network.edge_attributes(),
                                                   &settings.constants, EDGE_TRACE_LABEL)?;
        let traversal_evaluator = UtilityEvaluator::new(traversal_spec,
                                                        network.traversal_attributes(),
                                                        &settings.constants,
                                                        TRAVERSAL_TRACE_LABEL)?;
        Ok(BikeRouteChoice {
            settings,
            network,
            edge_evaluator,
            traversal_evaluator,
        })
    }

    pub fn settings(&self) -> &BikeRouteSettings {
        &self.settings
    }

    pub fn network(&self) -> &BikeNetwork {
        &self.network
    }

    /// The zones the model runs over, after applying any configured subset.
    pub fn zones(&self, settings: &BikeRouteSettings) -> Vec<ZoneId> {
        let all_zones = self.network.zone_ids();
        match &settings.zone_subset {
            None => all_zones,
            Some(ZoneSubset::FirstN(nn)) => all_zones.into_iter().take(*nn).collect(),
            Some(ZoneSubset::Zones(zones)) => {
                let selected: BTreeSet<ZoneId> = zones.iter().cloned().collect();
                for zone in &selected {
                    if all_zones.binary_search(zone).is_err() {
                        log::warn!("zone {} in zone_subset has no centroid in the network", zone);
                    }
                }
                all_zones.into_iter().filter(|zone| selected.contains(zone)).collect()
            }
        }
    }

    pub fn run(&self) -> Result<RouteChoiceOutput, BikeRouteError> {
        self.run_with(&self.settings)
    }

    /// Runs the model under `settings` in place of the ones it was built with.  The network,
    /// specifications and constants stay those of the model.
    pub fn run_with(&self, settings: &BikeRouteSettings)
                    -> Result<RouteChoiceOutput, BikeRouteError> {
        settings.validate()?;
        let start = Instant::now();
        let zones = self.zones(settings);
        log::info!("running bike route choice over {} zones with threshold {}", zones.len(),
                   settings.max_dijkstra_utility);

        let runner = BatchRunner::new(&self.network, &self.edge_evaluator,
                                      &self.traversal_evaluator, settings);
        let results = runner.run(&zones, &zones)?;

        let mut impedances = vec![];
        let mut traced_paths = vec![];
        let mut stats = BatchStats::default();
        for result in results {
            stats.merge(&result.stats);
            impedances.extend(result.impedances);
            traced_paths.extend(result.traced_paths);
        }
        impedances.sort_by_key(|od| (od.origin, od.destination));
        traced_paths.sort_by_key(|tp| (tp.origin, tp.destination, tp.path_idx));

        let runtime_s = start.elapsed().as_secs_f64();
        log::info!("finished in {:.2}s: {} OD pairs with paths, {} dropped", runtime_s,
                   stats.od_pairs_kept, stats.od_pairs_dropped);
        Ok(RouteChoiceOutput {
            zones,
            impedances,
            traced_paths,
            stats,
            runtime_s,
        })
    }

    /// Writes the logsum tables, the zone map and any requested traces under the output path.
    pub fn write_outputs(&self, run_output: &RouteChoiceOutput)
                         -> Result<(), BikeRouteError> {
        let out_dir = &self.settings.output_path;
        std::fs::create_dir_all(out_dir)?;
        output::write_logsums(&out_dir.join(output::LOGSUM_FILE), &run_output.impedances)?;
        output::write_logsum_matrix(&out_dir.join(output::LOGSUM_MATRIX_FILE), &run_output.zones,
                                    &run_output.logsum_matrix())?;
        output::write_zone_map(&out_dir.join(output::ZONE_MAP_FILE), &run_output.zones)?;

        if self.settings.trace_bike_utilities {
            for evaluator in &[&self.edge_evaluator, &self.traversal_evaluator] {
                let path = out_dir.join(format!("{}_utilities.csv", evaluator.trace_label()));
                evaluator.write_trace(&path, &evaluator.utilities())?;
            }
        }
        if !self.settings.trace_origins.is_empty() {
            output::write_trace_paths(&out_dir.join(output::TRACE_PATHS_FILE), &self.network,
                                      &run_output.traced_paths)?;
        }
        log::info!("wrote outputs to {}", out_dir.display());
        Ok(())
    }
}

impl ThresholdModel for BikeRouteChoice {
    fn base_settings(&self) -> &BikeRouteSettings {
        &self.settings
    }

    fn path_distances(&self, settings: &BikeRouteSettings) -> Result<Vec<f64>, BikeRouteError> {
        Ok(self.run_with(settings)?.distances())
    }
}
