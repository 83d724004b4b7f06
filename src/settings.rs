use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use yaml_rust::Yaml;
use yaml_rust::YamlLoader;

use super::config_utils;
use super::BikeRouteError;
use super::ZoneId;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoneLevel {
    Taz,
    Mgra,
}

impl ZoneLevel {
    pub fn from_str(level: &str) -> Result<ZoneLevel, BikeRouteError> {
        match level.to_lowercase().as_str() {
            "taz" => Ok(ZoneLevel::Taz),
            "mgra" | "maz" => Ok(ZoneLevel::Mgra),
            _ => Err(BikeRouteError::config(
                format!("zone_level must be 'taz' or 'mgra', got '{}'", level))),
        }
    }

    /// Name of the node column holding zone ids at this level.
    pub fn column(&self) -> &'static str {
        match self {
            ZoneLevel::Taz => "taz",
            ZoneLevel::Mgra => "mgra",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ZoneSubset {
    /// the first n zones, in ascending zone id order
    FirstN(usize),
    Zones(Vec<ZoneId>),
}

/// Process-wide configuration of the bike route choice model.  A run never mutates it; the
/// threshold calibrator derives a new value per iteration with `with_threshold`.
#[derive(Clone, Debug)]
pub struct BikeRouteSettings {
    pub node_file: PathBuf,
    pub link_file: PathBuf,
    pub edge_util_file: PathBuf,
    pub traversal_util_file: PathBuf,
    pub data_dir: Option<PathBuf>,
    pub settings_dir: Option<PathBuf>,
    pub output_path: PathBuf,
    pub zone_level: ZoneLevel,
    pub number_of_iterations: usize,
    pub min_iterations: usize,
    pub number_of_batches: usize,
    pub number_of_processors: usize,
    pub random_seed: u64,
    pub random_scale_coef: f64,
    pub random_scale_link: f64,
    pub max_dijkstra_utility: f64,
    pub zone_subset: Option<ZoneSubset>,
    pub trace_bike_utilities: bool,
    pub trace_origins: Vec<ZoneId>,
    pub trace_destinations: Vec<ZoneId>,
    pub constants: HashMap<String, f64>,
}

impl BikeRouteSettings {
    /// Settings with the model defaults for everything but the input files.
    pub fn new(node_file: &Path, link_file: &Path, edge_util_file: &Path,
               traversal_util_file: &Path) -> BikeRouteSettings {
        return BikeRouteSettings {
            node_file: node_file.to_path_buf(),
            link_file: link_file.to_path_buf(),
            edge_util_file: edge_util_file.to_path_buf(),
            traversal_util_file: traversal_util_file.to_path_buf(),
            data_dir: None,
            settings_dir: None,
            output_path: PathBuf::from("output"),
            zone_level: ZoneLevel::Taz,
            number_of_iterations: 10,
            min_iterations: 0,
            number_of_batches: 1,
            number_of_processors: 1,
            random_seed: 42,
            random_scale_coef: 0.5,
            random_scale_link: 0.7,
            max_dijkstra_utility: 10.,
            zone_subset: None,
            trace_bike_utilities: false,
            trace_origins: vec![],
            trace_destinations: vec![],
            constants: HashMap::new(),
        };
    }

    pub fn from_file(config_path: &Path) -> Result<BikeRouteSettings, BikeRouteError> {
        let file_contents = std::fs::read_to_string(config_path).map_err(|err|
            BikeRouteError::config(format!("failed to read settings file {}: {}",
                                           config_path.display(), err)))?;
        let yaml_cfgs = YamlLoader::load_from_str(&file_contents)?;
        let yaml_cfg = match yaml_cfgs.get(0) {
            Some(doc) => doc,
            None => return Err(BikeRouteError::config(
                format!("settings file {} is empty", config_path.display()))),
        };
        let settings_dir = config_path.parent().map(|pp| pp.to_path_buf());
        BikeRouteSettings::from_yaml(yaml_cfg, settings_dir)
    }

    pub fn from_yaml(yaml_cfg: &Yaml, settings_dir: Option<PathBuf>)
                     -> Result<BikeRouteSettings, BikeRouteError> {
        let node_file = config_utils::get_required_str(yaml_cfg, "node_file")?;
        let link_file = config_utils::get_required_str(yaml_cfg, "link_file")?;
        let edge_util_file = config_utils::get_required_str(yaml_cfg, "edge_util_file")?;
        let traversal_util_file = config_utils::get_required_str(yaml_cfg,
                                                                 "traversal_util_file")?;
        let mut settings = BikeRouteSettings::new(Path::new(node_file), Path::new(link_file),
                                                  Path::new(edge_util_file),
                                                  Path::new(traversal_util_file));

        // a relative data directory is taken relative to the settings file
        if let Some(data_dir) = config_utils::get_opt_str(yaml_cfg, "data_dir")? {
            if !data_dir.is_empty() {
                settings.data_dir = Some(match &settings_dir {
                    Some(dir) => config_utils::str_to_absolute_path(data_dir, dir),
                    None => PathBuf::from(data_dir),
                });
            }
        }
        settings.settings_dir = settings_dir;
        if let Some(output_path) = config_utils::get_opt_str(yaml_cfg, "output_path")? {
            settings.output_path = PathBuf::from(output_path);
        }
        if let Some(level) = config_utils::get_opt_str(yaml_cfg, "zone_level")? {
            settings.zone_level = ZoneLevel::from_str(level)?;
        }

        settings.number_of_iterations = config_utils::get_usize(
            yaml_cfg, "number_of_iterations", settings.number_of_iterations)?;
        settings.min_iterations = config_utils::get_usize(
            yaml_cfg, "min_iterations", settings.min_iterations)?;
        settings.number_of_batches = config_utils::get_usize(
            yaml_cfg, "number_of_batches", settings.number_of_batches)?;
        settings.number_of_processors = config_utils::get_usize(
            yaml_cfg, "number_of_processors", settings.number_of_processors)?;
        settings.random_seed = config_utils::get_usize(
            yaml_cfg, "random_seed", settings.random_seed as usize)? as u64;
        settings.random_scale_coef = config_utils::get_f64(
            yaml_cfg, "random_scale_coef", settings.random_scale_coef)?;
        settings.random_scale_link = config_utils::get_f64(
            yaml_cfg, "random_scale_link", settings.random_scale_link)?;
        settings.max_dijkstra_utility = config_utils::get_f64(
            yaml_cfg, "max_dijkstra_utility", settings.max_dijkstra_utility)?;
        settings.trace_bike_utilities = config_utils::get_bool(
            yaml_cfg, "trace_bike_utilities", settings.trace_bike_utilities)?;
        settings.trace_origins = config_utils::get_u32_list(yaml_cfg, "trace_origins")?;
        settings.trace_destinations = config_utils::get_u32_list(yaml_cfg, "trace_destinations")?;

        let subset = &yaml_cfg["zone_subset"];
        settings.zone_subset = match subset {
            Yaml::BadValue | Yaml::Null => None,
            Yaml::Integer(nn) if *nn > 0 => Some(ZoneSubset::FirstN(*nn as usize)),
            Yaml::Array(_) => Some(ZoneSubset::Zones(
                config_utils::get_u32_list(yaml_cfg, "zone_subset")?)),
            _ => return Err(BikeRouteError::config(
                format!("zone_subset must be a positive integer or a list of zones, got {:?}",
                        subset))),
        };

        let constants = &yaml_cfg["constants"];
        if let Some(hash) = constants.as_hash() {
            for (key, value) in hash {
                let name = key.as_str().ok_or_else(||
                    BikeRouteError::config(format!("constant names must be strings: {:?}", key)))?;
                let value = config_utils::yaml_as_f64(value).ok_or_else(||
                    BikeRouteError::config(format!("constant '{}' must be a number", name)))?;
                settings.constants.insert(String::from(name), value);
            }
        } else if !(constants.is_badvalue() || constants.is_null()) {
            return Err(BikeRouteError::config("constants must be a mapping of names to numbers"));
        }

        settings.validate()?;
        return Ok(settings);
    }

    pub fn validate(&self) -> Result<(), BikeRouteError> {
        if self.number_of_iterations == 0 {
            return Err(BikeRouteError::config("number_of_iterations must be at least 1"));
        }
        if self.number_of_batches == 0 {
            return Err(BikeRouteError::config("number_of_batches must be at least 1"));
        }
        if self.number_of_processors == 0 {
            return Err(BikeRouteError::config("number_of_processors must be at least 1"));
        }
        for (name, scale) in &[("random_scale_coef", self.random_scale_coef),
                               ("random_scale_link", self.random_scale_link)] {
            if !(0. ..=1.).contains(scale) {
                return Err(BikeRouteError::config(
                    format!("{} must lie in [0, 1], got {}", name, scale)));
            }
        }
        if self.max_dijkstra_utility == 0. || !self.max_dijkstra_utility.is_finite() {
            return Err(BikeRouteError::config(
                format!("max_dijkstra_utility must be finite and non-zero, got {}",
                        self.max_dijkstra_utility)));
        }
        if self.trace_origins.len() != self.trace_destinations.len() {
            return Err(BikeRouteError::config(
                "trace_origins and trace_destinations must have the same length"));
        }
        Ok(())
    }

    /// A copy of these settings searching out to a different utility threshold.
    pub fn with_threshold(&self, max_dijkstra_utility: f64) -> BikeRouteSettings {
        let mut settings = self.clone();
        settings.max_dijkstra_utility = max_dijkstra_utility;
        return settings;
    }

    /// The largest accumulated disutility the path search may expand.
    pub fn search_bound(&self) -> f64 {
        return self.max_dijkstra_utility.abs();
    }

    pub fn resolve_input(&self, path: &Path) -> Result<PathBuf, BikeRouteError> {
        config_utils::resolve_input_path(path, self.settings_dir.as_deref(),
                                         self.data_dir.as_deref())
    }

    pub fn trace_pairs(&self) -> Vec<(ZoneId, ZoneId)> {
        return self.trace_origins.iter().cloned()
            .zip(self.trace_destinations.iter().cloned())
            .collect();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<BikeRouteSettings, BikeRouteError> {
        let docs = YamlLoader::load_from_str(yaml).unwrap();
        BikeRouteSettings::from_yaml(&docs[0], Some(PathBuf::from("/data/model")))
    }

    static FILES: &str = "node_file: nodes.csv\nlink_file: links.csv\n\
                          edge_util_file: edge_utils.csv\ntraversal_util_file: trav_utils.csv\n";

    #[test]
    fn test_defaults() {
        let settings = parse(FILES).unwrap();
        assert_eq!(settings.zone_level, ZoneLevel::Taz);
        assert_eq!(settings.number_of_iterations, 10);
        assert_eq!(settings.min_iterations, 0);
        assert_eq!(settings.random_seed, 42);
        assert_eq!(settings.random_scale_coef, 0.5);
        assert_eq!(settings.random_scale_link, 0.7);
        assert_eq!(settings.max_dijkstra_utility, 10.);
        assert_eq!(settings.output_path, PathBuf::from("output"));
        assert_eq!(settings.settings_dir, Some(PathBuf::from("/data/model")));
        assert!(settings.zone_subset.is_none());
    }

    #[test]
    fn test_full_settings() {
        let yaml = format!("{}zone_level: mgra\nnumber_of_iterations: 5\nmin_iterations: 2\n\
                            number_of_batches: 4\nnumber_of_processors: 2\nrandom_seed: 7\n\
                            random_scale_coef: 0\nrandom_scale_link: 0.25\n\
                            max_dijkstra_utility: -12.5\nzone_subset: [3, 1]\n\
                            data_dir: network\ntrace_origins: [1]\ntrace_destinations: [3]\n\
                            constants:\n  turn_left: 2\n  scale: 0.5\n", FILES);
        let settings = parse(&yaml).unwrap();
        assert_eq!(settings.zone_level, ZoneLevel::Mgra);
        assert_eq!(settings.number_of_iterations, 5);
        assert_eq!(settings.min_iterations, 2);
        assert_eq!(settings.number_of_batches, 4);
        assert_eq!(settings.number_of_processors, 2);
        assert_eq!(settings.random_seed, 7);
        assert_eq!(settings.random_scale_coef, 0.);
        assert_eq!(settings.random_scale_link, 0.25);
        assert_eq!(settings.search_bound(), 12.5);
        assert_eq!(settings.zone_subset, Some(ZoneSubset::Zones(vec![3, 1])));
        assert_eq!(settings.data_dir, Some(PathBuf::from("/data/model/network")));
        assert_eq!(settings.trace_pairs(), vec![(1, 3)]);
        assert_eq!(settings.constants.get("turn_left"), Some(&2.));
        assert_eq!(settings.constants.get("scale"), Some(&0.5));
    }

    #[test]
    fn test_missing_required_field() {
        let result = parse("node_file: nodes.csv\nlink_file: links.csv\n\
                            edge_util_file: edge_utils.csv\n");
        match result {
            Err(BikeRouteError::Configuration(msg)) => assert!(msg.contains("traversal_util_file")),
            _ => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn test_invalid_values() {
        assert!(parse(&format!("{}zone_level: county\n", FILES)).is_err());
        assert!(parse(&format!("{}random_scale_link: 1.5\n", FILES)).is_err());
        assert!(parse(&format!("{}max_dijkstra_utility: 0\n", FILES)).is_err());
        assert!(parse(&format!("{}number_of_iterations: 0\n", FILES)).is_err());
        assert!(parse(&format!("{}trace_origins: [1, 2]\ntrace_destinations: [3]\n", FILES))
            .is_err());
    }

    #[test]
    fn test_with_threshold_leaves_original_untouched() {
        let settings = parse(FILES).unwrap();
        let tighter = settings.with_threshold(-4.);
        assert_eq!(tighter.max_dijkstra_utility, -4.);
        assert_eq!(tighter.search_bound(), 4.);
        assert_eq!(settings.max_dijkstra_utility, 10.);
        assert_eq!(tighter.number_of_iterations, settings.number_of_iterations);
    }
}
