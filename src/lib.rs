// imports of other modules from this crate
mod error;
pub use error::BikeRouteError;

mod config_utils;

mod geometry;
pub use geometry::Point2d;

pub mod settings;
pub use settings::{BikeRouteSettings, ZoneLevel, ZoneSubset};

mod expression;
pub use expression::Expression;

pub mod network;
pub use network::{BikeNetwork, EdgeRecord, NodeRecord, TurnType};

pub mod utility;
pub use utility::{RandomScales, SpecRow, SpecTable, UtilityEvaluator};

mod traversal_dijkstra;
pub use traversal_dijkstra::{traversal_dijkstra, SearchTree};

pub mod paths;
pub use paths::PathSet;

mod choice_set;
pub use choice_set::{aggregate_od, path_sizes, OdImpedance};

mod batch;
pub use batch::{partition_origins, BatchResult, BatchRunner, BatchStats, TracedPath};

mod route_choice;
pub use route_choice::{BikeRouteChoice, RouteChoiceOutput};

pub mod output;

pub mod calibration;
pub use calibration::{CalibrationResult, CalibrationStep, CalibrationTarget,
                      ThresholdCalibrator};

#[cfg(test)]
mod test_utils;


/// Zone ids, at either TAZ or MGRA level.
pub type ZoneId = u32;

/// A model whose OD path distances grow with the magnitude of its search threshold.
pub trait ThresholdModel {
    fn base_settings(&self) -> &BikeRouteSettings;

    /// Distances of every OD pair with a choice set when run under `settings`.
    fn path_distances(&self, settings: &BikeRouteSettings) -> Result<Vec<f64>, BikeRouteError>;
}
