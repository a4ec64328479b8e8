//! Species stream-order threshold.
//!
//! A species' threshold is the smallest of the per-watershed maximum orders
//! across its range: the smallest "largest stream" the species is known to
//! occupy. Below it, presence confidence decays.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::StreamOrderDomain;
use crate::model::{PipelineError, WatershedId, WatershedOrders};

/// Threshold plus the context needed to explain it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Threshold {
    pub order: i32,
    /// Range watersheds that had a known max order.
    pub matched_watersheds: usize,
    pub range_size: usize,
}

/// Minimum of the known max orders across `range`.
///
/// Watersheds with no max order (no streams) are skipped. An empty result,
/// or a minimum outside the curve domain, is a data integrity error for the
/// species: it means the range or the aggregation is broken, and no default
/// threshold is substituted.
pub fn threshold(
    species: &str,
    range: &BTreeSet<WatershedId>,
    orders: &WatershedOrders,
    domain: StreamOrderDomain,
) -> Result<Threshold, PipelineError> {
    let known: Vec<i32> = range.iter().filter_map(|huc| orders.get(huc).copied()).collect();

    let Some(min) = known.iter().copied().min() else {
        return Err(PipelineError::UndefinedThreshold {
            species: species.to_string(),
            range_size: range.len(),
        });
    };

    if min < 1 || !domain.contains(min) {
        return Err(PipelineError::ThresholdOutOfDomain {
            species: species.to_string(),
            threshold: min,
            min_order: domain.min,
            max_order: domain.max,
        });
    }

    Ok(Threshold {
        order: min,
        matched_watersheds: known.len(),
        range_size: range.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: StreamOrderDomain = StreamOrderDomain { min: 1, max: 10 };

    fn orders(pairs: &[(&str, i32)]) -> WatershedOrders {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn range(ids: &[&str]) -> BTreeSet<WatershedId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_threshold_is_min_of_max_orders() {
        let orders = orders(&[("W1", 3), ("W2", 5), ("W3", 7)]);
        let t = threshold("hardhead", &range(&["W1", "W2"]), &orders, DOMAIN).unwrap();
        assert_eq!(t.order, 3);
        assert_eq!(t.matched_watersheds, 2);
    }

    #[test]
    fn test_watersheds_without_order_are_ignored() {
        let orders = orders(&[("W2", 5)]);
        let t = threshold("hardhead", &range(&["W1", "W2", "W9"]), &orders, DOMAIN).unwrap();
        assert_eq!(t.order, 5);
        assert_eq!(t.matched_watersheds, 1);
        assert_eq!(t.range_size, 3);
    }

    #[test]
    fn test_no_known_order_is_undefined_not_defaulted() {
        let orders = orders(&[("W2", 5)]);
        let err = threshold("hardhead", &range(&["W1"]), &orders, DOMAIN).unwrap_err();
        assert_eq!(
            err,
            PipelineError::UndefinedThreshold {
                species: "hardhead".to_string(),
                range_size: 1
            }
        );
    }

    #[test]
    fn test_empty_range_is_undefined() {
        let err = threshold("hardhead", &BTreeSet::new(), &orders(&[("W1", 2)]), DOMAIN).unwrap_err();
        assert!(matches!(err, PipelineError::UndefinedThreshold { range_size: 0, .. }));
    }

    #[test]
    fn test_minimum_below_one_is_a_data_error() {
        // Cannot come out of the aggregator, but a hand-built map may carry it.
        let orders = orders(&[("W1", 0), ("W2", 4)]);
        let err = threshold("hardhead", &range(&["W1", "W2"]), &orders, DOMAIN).unwrap_err();
        assert!(matches!(err, PipelineError::ThresholdOutOfDomain { threshold: 0, .. }));
    }

    #[test]
    fn test_minimum_above_domain_is_rejected() {
        let orders = orders(&[("W1", 11)]);
        let err = threshold("hardhead", &range(&["W1"]), &orders, DOMAIN).unwrap_err();
        assert!(matches!(err, PipelineError::ThresholdOutOfDomain { threshold: 11, .. }));
    }
}
