use std::convert::TryFrom;
use std::path::Path;
use std::path::PathBuf;

use yaml_rust::Yaml;

use super::BikeRouteError;


pub fn str_to_absolute_path(path_str: &str, default_base_dir: &Path) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        return path;
    } else {
        return [default_base_dir, Path::new(&path)].iter().collect();
    }
}

/// Finds an input file by looking, in order, at the path as given (relative to the working
/// directory), relative to the directory holding the settings file, and relative to the
/// configured data directory.
pub fn resolve_input_path(path: &Path, settings_dir: Option<&Path>, data_dir: Option<&Path>)
                          -> Result<PathBuf, BikeRouteError> {
    let mut searched = vec![path.to_path_buf()];
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if path.is_absolute() {
        return Err(BikeRouteError::FileNotFound {
            path: path.display().to_string(),
            searched,
        });
    }

    for base_dir in settings_dir.iter().chain(data_dir.iter()) {
        let candidate = base_dir.join(path);
        if candidate.exists() {
            return Ok(candidate);
        }
        searched.push(candidate);
    }

    Err(BikeRouteError::FileNotFound {
        path: path.display().to_string(),
        searched,
    })
}

/// Parses one csv cell as a number.  Boolean spellings count as 1 and 0.
pub fn parse_numeric_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    match cell {
        "True" | "true" | "TRUE" => Some(1.),
        "False" | "false" | "FALSE" => Some(0.),
        _ => cell.parse::<f64>().ok(),
    }
}

pub fn yaml_as_f64(value: &Yaml) -> Option<f64> {
    match value {
        Yaml::Integer(ii) => Some(*ii as f64),
        Yaml::Real(_) => value.as_f64(),
        _ => None,
    }
}

pub fn get_f64(yaml_cfg: &Yaml, key: &str, default: f64) -> Result<f64, BikeRouteError> {
    let value = &yaml_cfg[key];
    if value.is_badvalue() || value.is_null() {
        return Ok(default);
    }
    yaml_as_f64(value).ok_or_else(||
        BikeRouteError::config(format!("'{}' must be a number, got {:?}", key, value)))
}

pub fn get_usize(yaml_cfg: &Yaml, key: &str, default: usize) -> Result<usize, BikeRouteError> {
    let value = &yaml_cfg[key];
    if value.is_badvalue() || value.is_null() {
        return Ok(default);
    }
    match value.as_i64() {
        Some(ii) if ii >= 0 => Ok(ii as usize),
        _ => Err(BikeRouteError::config(
            format!("'{}' must be a non-negative integer, got {:?}", key, value))),
    }
}

pub fn get_bool(yaml_cfg: &Yaml, key: &str, default: bool) -> Result<bool, BikeRouteError> {
    let value = &yaml_cfg[key];
    if value.is_badvalue() || value.is_null() {
        return Ok(default);
    }
    value.as_bool().ok_or_else(||
        BikeRouteError::config(format!("'{}' must be true or false, got {:?}", key, value)))
}

pub fn get_opt_str<'a>(yaml_cfg: &'a Yaml, key: &str) -> Result<Option<&'a str>, BikeRouteError> {
    let value = &yaml_cfg[key];
    if value.is_badvalue() || value.is_null() {
        return Ok(None);
    }
    match value.as_str() {
        Some(ss) => Ok(Some(ss)),
        None => Err(BikeRouteError::config(format!("'{}' must be a string, got {:?}", key, value))),
    }
}

pub fn get_required_str<'a>(yaml_cfg: &'a Yaml, key: &str) -> Result<&'a str, BikeRouteError> {
    match get_opt_str(yaml_cfg, key)? {
        Some(ss) => Ok(ss),
        None => Err(BikeRouteError::config(format!("missing required setting '{}'", key))),
    }
}

pub fn get_u32_list(yaml_cfg: &Yaml, key: &str) -> Result<Vec<u32>, BikeRouteError> {
    let value = &yaml_cfg[key];
    if value.is_badvalue() || value.is_null() {
        return Ok(vec![]);
    }
    let items = value.as_vec().ok_or_else(||
        BikeRouteError::config(format!("'{}' must be a list, got {:?}", key, value)))?;
    items.iter().map(|item| {
        item.as_i64().and_then(|ii| u32::try_from(ii).ok()).ok_or_else(||
            BikeRouteError::config(format!("'{}' entries must be integers in [0, {}], got {:?}",
                                           key, u32::MAX, item)))
    }).collect()
}
