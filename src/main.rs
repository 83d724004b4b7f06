use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use bike_route_choice::calibration::{self, CALIBRATED_SETTINGS_FILE};
use bike_route_choice::output::{self, THRESHOLD_RESULTS_FILE};
use bike_route_choice::{BikeRouteChoice, BikeRouteError, BikeRouteSettings, CalibrationTarget,
                        ThresholdCalibrator};


#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct BikeRouteApp {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// generate bike paths for every OD pair and write the logsum tables
    Run {
        /// YAML settings file
        settings: PathBuf,
    },
    /// search for the threshold at which the given percentile of OD path distances
    /// reaches the target distance
    Calibrate {
        /// YAML settings file
        settings: PathBuf,
        target_distance: f64,
        /// allowed relative deviation from the target distance
        #[arg(default_value_t = 0.1)]
        margin: f64,
        #[arg(default_value_t = 0.99)]
        percentile: f64,
        /// total number of model runs, counting the first one; calibration stops after this
        /// many runs even if the margin was not reached
        #[arg(default_value_t = 20)]
        max_iterations: usize,
    },
}

fn run(settings_path: &Path) -> Result<(), BikeRouteError> {
    let settings = BikeRouteSettings::from_file(settings_path)?;
    let model = BikeRouteChoice::from_settings(settings)?;
    let run_output = model.run()?;
    model.write_outputs(&run_output)?;
    Ok(())
}

fn calibrate(settings_path: &Path, target: CalibrationTarget) -> Result<(), BikeRouteError> {
    let settings = BikeRouteSettings::from_file(settings_path)?;
    let initial_threshold = settings.max_dijkstra_utility;
    let out_dir = settings.output_path.clone();
    let model = BikeRouteChoice::from_settings(settings)?;

    let mut calibrator = ThresholdCalibrator::new(target, initial_threshold);
    let result = calibrator.calibrate(&model)?;

    std::fs::create_dir_all(&out_dir)?;
    output::write_threshold_results(&out_dir.join(THRESHOLD_RESULTS_FILE), &result.steps)?;
    calibration::write_calibrated_settings(settings_path, &out_dir.join(CALIBRATED_SETTINGS_FILE),
                                           result.final_threshold)?;
    log::info!("final threshold {} gives distance {} (converged: {})", result.final_threshold,
               result.final_distance, result.converged);
    Ok(())
}

fn main() {
    env_logger::init();
    let args = BikeRouteApp::parse();
    let result = match args.command {
        Command::Run { settings } => run(&settings),
        Command::Calibrate { settings, target_distance, margin, percentile, max_iterations } => {
            let target = CalibrationTarget {
                target_distance,
                margin,
                percentile,
                max_iterations,
            };
            calibrate(&settings, target)
        }
    };
    if let Err(err) = result {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
