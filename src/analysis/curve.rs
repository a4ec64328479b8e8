//! Probability-by-stream-order curve.
//!
//! Built once per species from its threshold:
//!
//! ```text
//!   order >  threshold  →  above
//!   order == threshold  →  ceiling
//!   order <  threshold  →  ceiling * rate^(threshold - order)
//! ```
//!
//! The curve is total over the configured domain and never changes after it
//! is built.

use std::collections::BTreeMap;

use crate::config::{CurveConfig, StreamOrderDomain};
use crate::model::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityCurve {
    domain: StreamOrderDomain,
    threshold: i32,
    /// Probability per order, index 0 = `domain.min`.
    values: Vec<f64>,
}

impl ProbabilityCurve {
    pub fn domain(&self) -> StreamOrderDomain {
        self.domain
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    /// Probability for `order`, or `None` outside the domain.
    pub fn get(&self, order: i32) -> Option<f64> {
        if !self.domain.contains(order) {
            return None;
        }
        self.values.get((order - self.domain.min) as usize).copied()
    }

    /// `(order, probability)` pairs from the lowest order up.
    pub fn entries(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, p)| (self.domain.min + i as i32, *p))
    }

    pub fn to_map(&self) -> BTreeMap<i32, f64> {
        self.entries().collect()
    }
}

/// Builds the curve for `threshold` with the given parameters.
///
/// The parameters are validated again here so the builder is safe to call
/// outside the pipeline; the threshold must lie inside the domain.
pub fn build_curve(threshold: i32, params: &CurveConfig) -> Result<ProbabilityCurve, PipelineError> {
    params.validate()?;
    let domain = params.domain();
    if !domain.contains(threshold) {
        return Err(PipelineError::Config(format!(
            "threshold {} is outside stream order domain {}..={}",
            threshold, domain.min, domain.max
        )));
    }

    let values = (domain.min..=domain.max)
        .map(|order| probability_at(order, threshold, params))
        .collect();

    Ok(ProbabilityCurve {
        domain,
        threshold,
        values,
    })
}

fn probability_at(order: i32, threshold: i32, params: &CurveConfig) -> f64 {
    use std::cmp::Ordering;

    match order.cmp(&threshold) {
        Ordering::Greater => params.above,
        Ordering::Equal => params.ceiling,
        Ordering::Less => params.ceiling * params.rate.powi(threshold - order),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
