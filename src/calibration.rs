use std::path::Path;
use std::time::Instant;

use itertools::Itertools;
use yaml_rust::{Yaml, YamlEmitter, YamlLoader};

use super::BikeRouteError;
use super::ThresholdModel;


pub const CALIBRATED_SETTINGS_FILE: &str = "calibrated_settings.yaml";

/// What the calibrated threshold should achieve: the `percentile` of OD path distances
/// within `margin` (relative) of `target_distance`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTarget {
    pub target_distance: f64,
    pub margin: f64,
    pub percentile: f64,
    pub max_iterations: usize,
}

impl CalibrationTarget {
    pub fn new(target_distance: f64) -> CalibrationTarget {
        CalibrationTarget {
            target_distance,
            margin: 0.1,
            percentile: 0.99,
            max_iterations: 20,
        }
    }

    pub fn validate(&self) -> Result<(), BikeRouteError> {
        if !(self.target_distance > 0.) {
            return Err(BikeRouteError::config(
                format!("target distance must be positive, got {}", self.target_distance)));
        }
        if !(self.margin > 0. && self.margin < 1.) {
            return Err(BikeRouteError::config(
                format!("target margin must lie in (0, 1), got {}", self.margin)));
        }
        if !(0. ..=1.).contains(&self.percentile) {
            return Err(BikeRouteError::config(
                format!("percentile must lie in [0, 1], got {}", self.percentile)));
        }
        if self.max_iterations == 0 {
            return Err(BikeRouteError::config("max_iterations must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStep {
    pub threshold: f64,
    pub distance: f64,
    pub runtime_s: f64,
}

#[derive(Debug, Clone)]
pub struct CalibrationResult {
    pub steps: Vec<CalibrationStep>,
    pub converged: bool,
    pub final_threshold: f64,
    pub final_distance: f64,
}

/// Linearly interpolated quantile of `values`, `fraction` in [0, 1].
pub fn percentile(values: &[f64], fraction: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted: Vec<f64> = values.iter().cloned()
        .sorted_by(|aa, bb| aa.partial_cmp(bb).unwrap_or(std::cmp::Ordering::Equal))
        .collect();
    let position = fraction.max(0.).min(1.) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    return Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight);
}

/// Bisection search over the search threshold.  The threshold doubles (or halves) until the
/// measured distance has been bracketed, then moves halfway toward the bracketing bound.
#[derive(Debug, Clone)]
pub struct ThresholdCalibrator {
    target: CalibrationTarget,
    lower_bound: Option<f64>,
    upper_bound: Option<f64>,
    current: f64,
}

impl ThresholdCalibrator {
    pub fn new(target: CalibrationTarget, initial_threshold: f64) -> ThresholdCalibrator {
        ThresholdCalibrator {
            target,
            lower_bound: None,
            upper_bound: None,
            current: initial_threshold,
        }
    }

    pub fn current_threshold(&self) -> f64 {
        self.current
    }

    pub fn bounds(&self) -> (Option<f64>, Option<f64>) {
        (self.lower_bound, self.upper_bound)
    }

    pub fn is_within_margin(&self, distance: f64) -> bool {
        let target = self.target.target_distance;
        (distance - target).abs() / target < self.target.margin
    }

    /// Moves to the next threshold given the distance measured at the current one.
    pub fn next_threshold(&mut self, distance: f64) -> f64 {
        if distance > self.target.target_distance {
            self.upper_bound = Some(self.current);
            self.current = match self.lower_bound {
                None => self.current / 2.,
                Some(lower) => self.current - (self.current - lower) / 2.,
            };
        } else {
            self.lower_bound = Some(self.current);
            self.current = match self.upper_bound {
                None => self.current * 2.,
                Some(upper) => self.current + (upper - self.current) / 2.,
            };
        }
        return self.current;
    }

    pub fn calibrate<M: ThresholdModel>(&mut self, model: &M)
                                        -> Result<CalibrationResult, BikeRouteError> {
        self.target.validate()?;
        let mut steps = vec![];
        let mut converged = false;
        loop {
            let settings = model.base_settings().with_threshold(self.current);
            log::info!("running with threshold {}", self.current);
            let start = Instant::now();
            let distances = model.path_distances(&settings)?;
            let runtime_s = start.elapsed().as_secs_f64();

            let distance = match percentile(&distances, self.target.percentile) {
                Some(distance) => distance,
                None => {
                    log::warn!("no OD pair has a path at threshold {}", self.current);
                    0.
                }
            };
            log::info!("{} percentile distance: {} ({} OD pairs, {:.2}s)",
                       self.target.percentile, distance, distances.len(), runtime_s);
            steps.push(CalibrationStep {
                threshold: self.current,
                distance,
                runtime_s,
            });

            if self.is_within_margin(distance) {
                converged = true;
                break;
            }
            if steps.len() >= self.target.max_iterations {
                break;
            }
            self.next_threshold(distance);
        }

        let (final_threshold, final_distance) = match steps.last() {
            Some(step) => (step.threshold, step.distance),
            None => (self.current, 0.),
        };
        if !converged {
            log::warn!("threshold did not converge after {} runs; last threshold {} gave \
                        distance {}", steps.len(), final_threshold, final_distance);
        }
        Ok(CalibrationResult {
            steps,
            converged,
            final_threshold,
            final_distance,
        })
    }
}

/// Copies the settings file at `source` to `dest` with `max_dijkstra_utility` replaced.
pub fn write_calibrated_settings(source: &Path, dest: &Path, threshold: f64)
                                 -> Result<(), BikeRouteError> {
    let contents = std::fs::read_to_string(source)?;
    let mut docs = YamlLoader::load_from_str(&contents)?;
    let mut doc = match docs.pop() {
        Some(doc) => doc,
        None => return Err(BikeRouteError::config(
            format!("settings file {} is empty", source.display()))),
    };
    match doc {
        Yaml::Hash(ref mut hash) => {
            hash.insert(Yaml::String(String::from("max_dijkstra_utility")),
                        Yaml::Real(format!("{:?}", threshold)));
        }
        _ => return Err(BikeRouteError::config(
            format!("settings file {} is not a mapping", source.display()))),
    }

    let mut out_str = String::new();
    YamlEmitter::new(&mut out_str).dump(&doc).map_err(|err|
        BikeRouteError::config(format!("failed to write settings: {:?}", err)))?;
    out_str.push('\n');
    std::fs::write(dest, out_str)?;
    log::info!("wrote calibrated settings to {}", dest.display());
    Ok(())
}
