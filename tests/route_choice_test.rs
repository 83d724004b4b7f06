use std::collections::HashMap;
use std::path::PathBuf;

use approx::assert_ulps_eq;
use glob::glob;
use tempfile::tempdir;
use yaml_rust::YamlLoader;

use bike_route_choice::calibration::{self, CALIBRATED_SETTINGS_FILE};
use bike_route_choice::output;
use bike_route_choice::{BikeRouteChoice, BikeRouteSettings, CalibrationTarget,
                        ThresholdCalibrator, ZoneLevel};


fn load_env(env_name: &str) -> BikeRouteSettings {
    let settings_path = PathBuf::from("tests/envs").join(env_name).join("settings.yaml");
    BikeRouteSettings::from_file(&settings_path).unwrap()
}

/// Every environment under tests/envs loads, runs and writes its outputs.
#[test]
fn test_run_all_envs() -> Result<(), Box<dyn std::error::Error>> {
    let mut num_envs = 0;
    for entry in glob("tests/envs/*/settings.yaml")? {
        let settings_path = entry?;
        println!("Testing {:?}", settings_path);
        let out_dir = tempdir()?;
        let mut settings = BikeRouteSettings::from_file(&settings_path)?;
        settings.output_path = out_dir.path().to_path_buf();
        let model = BikeRouteChoice::from_settings(settings)?;
        let run_output = model.run()?;
        model.write_outputs(&run_output)?;

        assert!(!run_output.impedances.is_empty());
        let keys: Vec<(u32, u32)> = run_output.impedances.iter()
            .map(|od| (od.origin, od.destination))
            .collect();
        let mut sorted_keys = keys.clone();
        sorted_keys.sort();
        assert_eq!(keys, sorted_keys);
        for od in &run_output.impedances {
            assert_ne!(od.origin, od.destination);
            assert!(od.distance > 0.);
            assert!(od.logsum.is_finite());
            assert!(od.path_count >= 1);
        }

        let mut reader = csv::Reader::from_path(out_dir.path().join(output::LOGSUM_FILE))?;
        let mut num_rows = 0;
        for result in reader.deserialize() {
            let row: HashMap<String, String> = result?;
            assert!(row.contains_key("logsum"));
            num_rows += 1;
        }
        assert_eq!(num_rows, run_output.impedances.len());
        assert!(out_dir.path().join(output::LOGSUM_MATRIX_FILE).exists());
        assert!(out_dir.path().join(output::ZONE_MAP_FILE).exists());
        num_envs += 1;
    }
    assert!(num_envs >= 2);
    Ok(())
}

#[test]
fn test_line_threshold() {
    let model = BikeRouteChoice::from_settings(load_env("line")).unwrap();
    let run_output = model.run().unwrap();
    assert_eq!(run_output.zones, vec![1, 4]);
    assert_eq!(run_output.impedances.len(), 1);
    let od = &run_output.impedances[0];
    assert_eq!((od.origin, od.destination), (1, 4));
    assert_ulps_eq!(od.logsum, -3.);
    assert_ulps_eq!(od.distance, 3.);
    assert_eq!(od.path_count, 1);

    let tight = model.run_with(&model.settings().with_threshold(-2.)).unwrap();
    assert!(tight.impedances.is_empty());
    assert_eq!(tight.stats.paths_missing, 2);
}

#[test]
fn test_line_mgra_zones() {
    let mut settings = load_env("line");
    settings.zone_level = ZoneLevel::Mgra;
    let model = BikeRouteChoice::from_settings(settings).unwrap();
    let run_output = model.run().unwrap();
    assert_eq!(run_output.zones, vec![11, 44]);
    assert_eq!(run_output.impedances[0].destination, 44);
}

#[test]
fn test_line_calibration() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = tempdir()?;
    let settings_path = PathBuf::from("tests/envs/line/settings.yaml");
    let mut settings = BikeRouteSettings::from_file(&settings_path)?;
    settings.max_dijkstra_utility = -1.;
    let model = BikeRouteChoice::from_settings(settings)?;

    let mut target = CalibrationTarget::new(3.);
    target.margin = 0.1;
    let mut calibrator = ThresholdCalibrator::new(target, -1.);
    let result = calibrator.calibrate(&model)?;
    let thresholds: Vec<f64> = result.steps.iter().map(|step| step.threshold).collect();
    assert_eq!(thresholds, vec![-1., -2., -4.]);
    assert!(result.converged);
    assert_eq!(result.final_threshold, -4.);
    assert_ulps_eq!(result.final_distance, 3.);
    assert_eq!(result.steps[0].distance, 0.);

    let results_path = out_dir.path().join(output::THRESHOLD_RESULTS_FILE);
    output::write_threshold_results(&results_path, &result.steps)?;
    let contents = std::fs::read_to_string(&results_path)?;
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], "threshold,distance,runtime");
    assert_eq!(lines.len(), 4);
    assert!(lines[3].starts_with("-4,3,"));

    let calibrated_path = out_dir.path().join(CALIBRATED_SETTINGS_FILE);
    calibration::write_calibrated_settings(&settings_path, &calibrated_path,
                                           result.final_threshold)?;
    let docs = YamlLoader::load_from_str(&std::fs::read_to_string(&calibrated_path)?)?;
    assert_eq!(docs[0]["max_dijkstra_utility"].as_f64(), Some(-4.));
    assert_eq!(docs[0]["node_file"].as_str(), Some("nodes.csv"));
    Ok(())
}

#[test]
fn test_grid_independent_of_processors() {
    let mut settings = load_env("grid");
    settings.number_of_processors = 1;
    let serial = BikeRouteChoice::from_settings(settings.clone()).unwrap().run().unwrap();
    settings.number_of_processors = 4;
    let parallel = BikeRouteChoice::from_settings(settings.clone()).unwrap().run().unwrap();
    assert_eq!(serial.impedances, parallel.impedances);
    assert_eq!(serial.stats, parallel.stats);

    // a different seed draws different perturbations but the same OD pairs
    settings.random_seed += 1;
    let reseeded = BikeRouteChoice::from_settings(settings).unwrap().run().unwrap();
    assert_eq!(reseeded.impedances.len(), serial.impedances.len());
}

#[test]
fn test_grid_traced_paths() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = tempdir()?;
    let mut settings = load_env("grid");
    settings.output_path = out_dir.path().to_path_buf();
    let model = BikeRouteChoice::from_settings(settings)?;
    let run_output = model.run()?;
    assert!(!run_output.traced_paths.is_empty());
    let mut size_sum = 0.;
    for traced in &run_output.traced_paths {
        assert_eq!((traced.origin, traced.destination), (1, 9));
        // corner to opposite corner is four half-mile links at the least
        assert!(traced.path.distance >= 2. - 1e-9);
        size_sum += traced.path_size;
    }
    assert_ulps_eq!(size_sum, 1., epsilon = 1e-9);

    model.write_outputs(&run_output)?;
    let mut reader = csv::Reader::from_path(out_dir.path().join(output::TRACE_PATHS_FILE))?;
    for result in reader.deserialize() {
        let row: HashMap<String, String> = result?;
        assert_eq!(row["origin"], "1");
        assert_eq!(row["destination"], "9");
    }
    Ok(())
}
