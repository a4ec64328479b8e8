/// Stream-order analysis for the probability pipeline.
///
/// `aggregate` runs once for the whole network; the other stages run in
/// order for every species.
///
/// Submodules:
/// - `aggregate`: maximum stream order per watershed.
/// - `threshold`: a species' minimum of watershed maxima.
/// - `curve`: probability by stream order from a threshold.
/// - `assign`: one probability cell per segment for a species.

pub mod aggregate;
pub mod assign;
pub mod curve;
pub mod threshold;
