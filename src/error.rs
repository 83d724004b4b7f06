use std::path::PathBuf;


/// Every fatal condition the route choice model can hit.  Recoverable conditions (clamped
/// utilities, missing paths, non-converged calibration) are logged instead.
#[derive(thiserror::Error, Debug)]
pub enum BikeRouteError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("file '{path}' not found in working directory, settings directory, or data \
             directory (searched {searched:?})")]
    FileNotFound { path: String, searched: Vec<PathBuf> },
    #[error("{trace_label} - failed evaluating '{expression}': {reason}")]
    Expression {
        expression: String,
        trace_label: String,
        reason: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("failed to parse yaml: {0}")]
    Yaml(#[from] yaml_rust::ScanError),
}

impl BikeRouteError {
    pub fn config<S: Into<String>>(msg: S) -> BikeRouteError {
        return BikeRouteError::Configuration(msg.into());
    }

    pub fn expression(expression: &str, trace_label: &str, reason: &str) -> BikeRouteError {
        return BikeRouteError::Expression {
            expression: String::from(expression),
            trace_label: String::from(trace_label),
            reason: String::from(reason),
        };
    }
}
