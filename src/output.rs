use std::path::Path;

use ndarray::prelude::*;

use super::batch::TracedPath;
use super::calibration::CalibrationStep;
use super::choice_set::OdImpedance;
use super::network::BikeNetwork;
use super::BikeRouteError;
use super::ZoneId;


pub const LOGSUM_FILE: &str = "bike_logsum.csv";
pub const LOGSUM_MATRIX_FILE: &str = "bike_logsum_matrix.csv";
pub const ZONE_MAP_FILE: &str = "bike_zone_map.csv";
pub const TRACE_PATHS_FILE: &str = "bike_trace_paths.csv";
pub const THRESHOLD_RESULTS_FILE: &str = "threshold_results.csv";

pub fn write_logsums(path: &Path, impedances: &[OdImpedance]) -> Result<(), BikeRouteError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&["origin", "destination", "logsum", "distance", "path_count"])?;
    for od in impedances {
        writer.write_record(&[od.origin.to_string(), od.destination.to_string(),
                              od.logsum.to_string(), od.distance.to_string(),
                              od.path_count.to_string()])?;
    }
    writer.flush()?;
    log::debug!("wrote {} OD logsums to {}", impedances.len(), path.display());
    Ok(())
}

/// Rows and columns follow `zones`.  Cells without a logsum are left empty.
pub fn write_logsum_matrix(path: &Path, zones: &[ZoneId], matrix: &Array2<Option<f64>>)
                           -> Result<(), BikeRouteError> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec![String::from("origin")];
    header.extend(zones.iter().map(|zone| zone.to_string()));
    writer.write_record(&header)?;
    for (zone, row) in zones.iter().zip(matrix.outer_iter()) {
        let mut record = vec![zone.to_string()];
        record.extend(row.iter().map(|cell| match cell {
            Some(logsum) => logsum.to_string(),
            None => String::new(),
        }));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_zone_map(path: &Path, zones: &[ZoneId]) -> Result<(), BikeRouteError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&["index", "zone"])?;
    for (ii, zone) in zones.iter().enumerate() {
        writer.write_record(&[ii.to_string(), zone.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// One row per edge of every traced path, with node ids in place of edge indices.
pub fn write_trace_paths(path: &Path, network: &BikeNetwork, traced_paths: &[TracedPath])
                         -> Result<(), BikeRouteError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&["origin", "destination", "path", "sequence", "from_node", "to_node",
                          "distance", "utility", "path_size"])?;
    for traced in traced_paths {
        for (seq, edge) in traced.path.edges.iter().enumerate() {
            let (from_idx, to_idx) = network.edge_endpoints(*edge);
            writer.write_record(&[traced.origin.to_string(), traced.destination.to_string(),
                                  traced.path_idx.to_string(), seq.to_string(),
                                  network.node(from_idx).id.to_string(),
                                  network.node(to_idx).id.to_string(),
                                  traced.path.distance.to_string(),
                                  traced.path.utility.to_string(),
                                  traced.path_size.to_string()])?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_threshold_results(path: &Path, steps: &[CalibrationStep])
                               -> Result<(), BikeRouteError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&["threshold", "distance", "runtime"])?;
    for step in steps {
        writer.write_record(&[step.threshold.to_string(), step.distance.to_string(),
                              step.runtime_s.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use crate::paths::Path as BikePath;
    use petgraph::graph::EdgeIndex;
    use tempfile::tempdir;

    #[test]
    fn test_logsum_outputs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let impedances = vec![OdImpedance {
            origin: 1,
            destination: 4,
            logsum: -3.,
            distance: 3.,
            path_count: 1,
        }];
        write_logsums(&dir.path().join(LOGSUM_FILE), &impedances)?;
        let contents = std::fs::read_to_string(dir.path().join(LOGSUM_FILE))?;
        assert_eq!(contents, "origin,destination,logsum,distance,path_count\n1,4,-3,3,1\n");

        let matrix = array![[None, Some(-3.)], [None, None]];
        write_logsum_matrix(&dir.path().join(LOGSUM_MATRIX_FILE), &[1, 4], &matrix)?;
        let contents = std::fs::read_to_string(dir.path().join(LOGSUM_MATRIX_FILE))?;
        assert_eq!(contents, "origin,1,4\n1,,-3\n4,,\n");

        write_zone_map(&dir.path().join(ZONE_MAP_FILE), &[1, 4])?;
        let contents = std::fs::read_to_string(dir.path().join(ZONE_MAP_FILE))?;
        assert_eq!(contents, "index,zone\n0,1\n1,4\n");
        Ok(())
    }

    #[test]
    fn test_trace_paths() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let network = test_utils::line_network();
        let edges = vec![EdgeIndex::new(0), EdgeIndex::new(1), EdgeIndex::new(2)];
        let path = BikePath::priced(&network, edges, Array1::from_elem(3, -1.).view(),
                                    Array1::zeros(2).view())?;
        let traced = vec![TracedPath {
            origin: 1,
            destination: 4,
            path_idx: 0,
            path,
            path_size: 1.,
        }];
        let out_path = dir.path().join(TRACE_PATHS_FILE);
        write_trace_paths(&out_path, &network, &traced)?;
        let contents = std::fs::read_to_string(&out_path)?;
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "1,4,0,0,1,2,3,-3,1");
        assert_eq!(lines[3], "1,4,0,2,3,4,3,-3,1");
        Ok(())
    }
}
