//! The consolidated probability table and its single writer.
//!
//! Rows are fixed at construction (the full segment identity space).
//! Columns are added one species at a time through `Accumulator::merge`,
//! which is the only way to write and is safe to call from many species
//! tasks at once.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::model::{CellValue, PipelineError, SegmentId, SpeciesId, StreamSegment};

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityTable {
    rows: Vec<SegmentId>,
    row_index: HashMap<SegmentId, usize>,
    /// Species in first-merge order.
    species: Vec<SpeciesId>,
    columns: HashMap<SpeciesId, Vec<CellValue>>,
}

impl ProbabilityTable {
    /// Creates an empty table over the given row identities. Duplicate ids
    /// are rejected since rows are addressed by id.
    pub fn new<I>(segment_ids: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = SegmentId>,
    {
        let mut rows = Vec::new();
        let mut row_index = HashMap::new();
        for id in segment_ids {
            if row_index.contains_key(&id) {
                return Err(PipelineError::DuplicateId {
                    collection: "stream segments".to_string(),
                    id,
                });
            }
            row_index.insert(id.clone(), rows.len());
            rows.push(id);
        }
        Ok(ProbabilityTable {
            rows,
            row_index,
            species: Vec::new(),
            columns: HashMap::new(),
        })
    }

    pub fn for_segments(segments: &[StreamSegment]) -> Result<Self, PipelineError> {
        Self::new(segments.iter().map(|s| s.id.clone()))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn segment_ids(&self) -> &[SegmentId] {
        &self.rows
    }

    pub fn species(&self) -> &[SpeciesId] {
        &self.species
    }

    pub fn column(&self, species: &str) -> Option<&[CellValue]> {
        self.columns.get(species).map(|c| c.as_slice())
    }

    pub fn get(&self, segment: &str, species: &str) -> Option<CellValue> {
        let row = *self.row_index.get(segment)?;
        self.columns.get(species).map(|column| column[row])
    }

    /// All species cells for one row, in column order.
    pub fn row(&self, segment: &str) -> Option<Vec<(&str, CellValue)>> {
        let row = *self.row_index.get(segment)?;
        Some(
            self.species
                .iter()
                .map(|sp| (sp.as_str(), self.columns[sp][row]))
                .collect(),
        )
    }

    /// Replaces (or adds) `species`' column. Rows without a supplied value
    /// get `Absent`. Unknown segments reject the whole merge before any
    /// write, so a failed merge leaves the table as it was.
    fn write_column(
        &mut self,
        species: &str,
        values: &BTreeMap<SegmentId, CellValue>,
    ) -> Result<(), PipelineError> {
        if let Some(unknown) = values.keys().find(|id| !self.row_index.contains_key(*id)) {
            return Err(PipelineError::UnknownSegment {
                species: species.to_string(),
                segment: unknown.clone(),
            });
        }

        let mut column = vec![CellValue::Absent; self.rows.len()];
        for (id, value) in values {
            column[self.row_index[id]] = *value;
        }

        if !self.columns.contains_key(species) {
            self.species.push(species.to_string());
        }
        self.columns.insert(species.to_string(), column);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Exclusive owner of the output table. Merges are serialized through a
/// single lock; per-species computation happens outside it.
#[derive(Debug)]
pub struct Accumulator {
    table: Mutex<ProbabilityTable>,
}

impl Accumulator {
    pub fn new(table: ProbabilityTable) -> Self {
        Accumulator {
            table: Mutex::new(table),
        }
    }

    // A panic inside `write_column` happens before the column swap, so a
    // poisoned table is still consistent.
    fn lock(&self) -> MutexGuard<'_, ProbabilityTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes `species`' column. Idempotent: merging the same values twice
    /// leaves the same table as merging once. Other species' columns are
    /// never touched.
    pub fn merge(
        &self,
        species: &str,
        segment_values: &BTreeMap<SegmentId, CellValue>,
    ) -> Result<(), PipelineError> {
        self.lock().write_column(species, segment_values)
    }

    pub fn row_count(&self) -> usize {
        self.lock().row_count()
    }

    pub fn into_table(self) -> ProbabilityTable {
        self.table
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
