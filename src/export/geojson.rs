//! Writes probabilities back onto the flowline features.

use geojson::FeatureCollection;
use serde_json::Value as JsonValue;

use crate::config::FieldNames;
use crate::export::write_file;
use crate::ingest::features::feature_key;
use crate::model::{CellValue, INDETERMINATE_TEXT, PipelineError};
use crate::table::ProbabilityTable;

/// JSON form of a cell: probabilities and absence as numbers, the
/// indeterminate sentinel as the string `"N/A"`.
pub fn cell_json(cell: CellValue) -> JsonValue {
    match cell {
        CellValue::Probability(p) => serde_json::Number::from_f64(p)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(INDETERMINATE_TEXT.to_string())),
        CellValue::Absent => JsonValue::from(0),
        CellValue::Indeterminate => JsonValue::String(INDETERMINATE_TEXT.to_string()),
    }
}

/// Copy of `flowlines` with one property per species column. Every feature
/// must map to a table row; the table was built from the same collection.
pub fn attach_probabilities(
    flowlines: &FeatureCollection,
    table: &ProbabilityTable,
    fields: &FieldNames,
) -> Result<FeatureCollection, PipelineError> {
    let mut out = flowlines.clone();
    for (i, feature) in out.features.iter_mut().enumerate() {
        let key = feature_key(feature, &fields.segment_id).ok_or_else(|| {
            PipelineError::Export(format!("flowline feature {}: missing {}", i, fields.segment_id))
        })?;
        let row = table.row(&key).ok_or_else(|| {
            PipelineError::Export(format!("flowline feature {} ({}) is not in the table", i, key))
        })?;
        for (species, cell) in row {
            feature.set_property(species, cell_json(cell));
        }
    }
    Ok(out)
}

pub fn write_geojson(
    path: &str,
    flowlines: &FeatureCollection,
    table: &ProbabilityTable,
    fields: &FieldNames,
) -> Result<usize, PipelineError> {
    let fc = attach_probabilities(flowlines, table, fields)?;
    let text = serde_json::to_string(&fc)
        .map_err(|e| PipelineError::Export(format!("GeoJSON serialization: {}", e)))?;
    write_file(path, text)?;
    Ok(fc.features.len())
}
