use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use ndarray::prelude::*;
use rand::Rng;

use super::config_utils::parse_numeric_cell;
use super::expression::Expression;
use super::network::AttributeTable;
use super::settings::BikeRouteSettings;
use super::BikeRouteError;


/// Spec rows with a coefficient at or below this mark an element as unavailable.  They are
/// never randomized.
pub const UNAVAILABLE_COEFFICIENT: f64 = -990.;

// A convenience type for parsing csv data
type Row = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct SpecRow {
    pub label: Option<String>,
    pub expression: String,
    pub coefficient: f64,
}

impl SpecRow {
    pub fn new(expression: &str, coefficient: f64) -> SpecRow {
        SpecRow {
            label: None,
            expression: String::from(expression),
            coefficient,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.coefficient <= UNAVAILABLE_COEFFICIENT
    }
}

/// The ordered (expression, coefficient) rows of one utility specification.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecTable {
    pub rows: Vec<SpecRow>,
}

impl SpecTable {
    pub fn new(rows: Vec<SpecRow>) -> SpecTable {
        SpecTable { rows }
    }

    pub fn from_csv(path: &Path) -> Result<SpecTable, BikeRouteError> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(file);
        let mut rows = vec![];
        for (line, result) in reader.deserialize().enumerate() {
            let row: Row = result?;
            let expression = match row.get("Expression") {
                Some(expr) if !expr.is_empty() => expr.clone(),
                Some(_) => continue,
                None => return Err(BikeRouteError::config(
                    format!("{} has no 'Expression' column", path.display()))),
            };
            let coefficient = row.get("Coefficient").and_then(|cc| parse_numeric_cell(cc))
                .ok_or_else(|| BikeRouteError::config(
                    format!("{} row {}: missing or non-numeric coefficient for '{}'",
                            path.display(), line, expression)))?;
            let label = row.get("Label").filter(|ll| !ll.is_empty()).cloned();
            rows.push(SpecRow { label, expression, coefficient });
        }
        log::debug!("read {} spec rows from {}", rows.len(), path.display());
        return Ok(SpecTable { rows });
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomScales {
    pub coef: f64,
    pub link: f64,
}

impl RandomScales {
    pub fn none() -> RandomScales {
        RandomScales { coef: 0., link: 0. }
    }

    pub fn from_settings(settings: &BikeRouteSettings) -> RandomScales {
        RandomScales {
            coef: settings.random_scale_coef,
            link: settings.random_scale_link,
        }
    }
}

/// Evaluates a spec table over every element of an attribute table.  Expression values are
/// computed once at construction; each call to `utilities` or `randomized_utilities` only
/// combines them with (possibly perturbed) coefficients.
#[derive(Debug)]
pub struct UtilityEvaluator {
    trace_label: String,
    expressions: Vec<Expression>,
    coefficients: Array1<f64>,
    unavailable: Vec<bool>,
    // one row per element, one column per expression
    values: Array2<f64>,
    // set once the first clamping has been reported
    clamp_warned: AtomicBool,
}

impl UtilityEvaluator {
    pub fn new(spec: &SpecTable, attributes: &AttributeTable, constants: &HashMap<String, f64>,
               trace_label: &str) -> Result<UtilityEvaluator, BikeRouteError> {
        let mut expressions = vec![];
        for spec_row in &spec.rows {
            let expr = Expression::compile(&spec_row.expression, attributes.index(), constants)
                .map_err(|reason| BikeRouteError::expression(&spec_row.expression, trace_label,
                                                             &reason))?;
            expressions.push(expr);
        }

        let num_rows = attributes.num_rows();
        let mut values = Array2::zeros((num_rows, expressions.len()));
        for (jj, expr) in expressions.iter().enumerate() {
            for (ii, element) in attributes.values().outer_iter().enumerate() {
                let value = expr.evaluate(element);
                if !value.is_finite() {
                    return Err(BikeRouteError::expression(
                        expr.text(), trace_label,
                        &format!("non-finite value {} for element {}", value, ii)));
                }
                values[[ii, jj]] = value;
            }
        }
        log::debug!("{}: evaluated {} expressions over {} elements", trace_label,
                    expressions.len(), num_rows);

        Ok(UtilityEvaluator {
            trace_label: String::from(trace_label),
            coefficients: spec.rows.iter().map(|rr| rr.coefficient).collect(),
            unavailable: spec.rows.iter().map(|rr| rr.is_unavailable()).collect(),
            expressions,
            values,
            clamp_warned: AtomicBool::new(false),
        })
    }

    pub fn trace_label(&self) -> &str {
        &self.trace_label
    }

    pub fn num_elements(&self) -> usize {
        self.values.nrows()
    }

    /// The deterministic utility of every element.
    pub fn utilities(&self) -> Array1<f64> {
        let (available, unavailable) = self.split_sums(self.coefficients.view());
        let utilities = available + unavailable;
        return self.clamped(utilities);
    }

    /// Utilities under one random draw.  Each available coefficient is scaled by a factor
    /// drawn uniformly from [1 - coef, 1 + coef]; the available part of each element's
    /// utility is then scaled by 1 - link or 1 + link with equal probability.  Unavailable
    /// rows are added afterwards at full weight.
    pub fn randomized_utilities<R: Rng>(&self, scales: &RandomScales, rng: &mut R)
                                        -> Array1<f64> {
        let mut coefficients = self.coefficients.clone();
        if scales.coef > 0. {
            for (coef, unavailable) in coefficients.iter_mut().zip(self.unavailable.iter()) {
                if !unavailable {
                    *coef *= rng.gen_range(1. - scales.coef..=1. + scales.coef);
                }
            }
        }
        let (mut available, unavailable) = self.split_sums(coefficients.view());
        if scales.link > 0. {
            for utility in available.iter_mut() {
                let factor = if rng.gen_bool(0.5) {
                    1. + scales.link
                } else {
                    1. - scales.link
                };
                *utility *= factor;
            }
        }
        return self.clamped(available + unavailable);
    }

    fn split_sums(&self, coefficients: ArrayView1<f64>) -> (Array1<f64>, Array1<f64>) {
        let mut available = Array1::zeros(self.num_elements());
        let mut unavailable = Array1::zeros(self.num_elements());
        for (ii, element) in self.values.outer_iter().enumerate() {
            for (jj, value) in element.iter().enumerate() {
                if self.unavailable[jj] {
                    unavailable[ii] += coefficients[jj] * value;
                } else {
                    available[ii] += coefficients[jj] * value;
                }
            }
        }
        return (available, unavailable);
    }

    fn clamped(&self, mut utilities: Array1<f64>) -> Array1<f64> {
        let num_positive = utilities.iter().filter(|uu| **uu > 0.).count();
        if num_positive > 0 {
            if self.clamp_warned.swap(true, Ordering::Relaxed) {
                log::debug!("{}: {} positive utilities clamped to 0", self.trace_label,
                            num_positive);
            } else {
                log::warn!("{}: {} positive utilities clamped to 0 (further clampings are \
                            logged at debug level)", self.trace_label, num_positive);
            }
            utilities.par_mapv_inplace(|uu| uu.min(0.));
        }
        return utilities;
    }

    /// Writes each element's expression values and final utility.
    pub fn write_trace(&self, path: &Path, utilities: &Array1<f64>)
                       -> Result<(), BikeRouteError> {
        let mut writer = csv::Writer::from_path(path)?;
        let mut header = vec![String::from("index")];
        header.extend(self.expressions.iter().map(|expr| String::from(expr.text())));
        header.push(String::from("utility"));
        writer.write_record(&header)?;
        for (ii, element) in self.values.outer_iter().enumerate() {
            let mut record = vec![ii.to_string()];
            record.extend(element.iter().map(|vv| vv.to_string()));
            record.push(utilities[ii].to_string());
            writer.write_record(&record)?;
        }
        writer.flush()?;
        log::info!("wrote {} utility trace to {}", self.trace_label, path.display());
        Ok(())
    }
}
