/// Minimal spatial layer: planar geometry primitives and the containment
/// queries the pipeline is built on.
///
/// Submodules:
/// - `geometry`: points, polygons, regions, centroids, line midpoints.
/// - `index`: the `SpatialQuery` capability and its R-tree implementation.

pub mod geometry;
pub mod index;
