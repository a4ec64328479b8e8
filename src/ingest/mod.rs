/// Input loading for the probability pipeline.
///
/// Submodules:
/// - `features`: GeoJSON flowlines, watersheds and range polygons.
/// - `ranges`: species range sources (membership table or polygon layers).

pub mod features;
pub mod ranges;
