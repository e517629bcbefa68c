//! # Compaction Module
//!
//! Leveled compaction for the engine: merges all tables of a source
//! level with the overlapping tables of the next level, deduplicates by
//! recency, drops tombstones where provably safe, and keeps the
//! write-amplification ledger.
//!
//! ## Recency during the merge
//!
//! For the purpose of tie-breaking equal keys, the level number is the
//! major recency key (lower level = newer data) and, within level 0,
//! the table id is the minor key (higher id = newer flush). The merge
//! feeds its sources in exactly that order, so the first record of each
//! equal-key run is always the newest — dedup keeps it and discards the
//! rest.
//!
//! ## Tombstone policy
//!
//! A tombstone exists to shadow older copies of its key in deeper
//! levels. After the inputs are consumed, if no populated level remains
//! below the target, nothing is left for tombstones to shadow and they
//! are dropped from the output. Otherwise they are retained.
//!
//! ## Accounting
//!
//! Every compaction appends a [`CompactionRecord`] to the history and
//! adds its byte estimates to the running totals; write amplification is
//! the cumulative ratio `Σ output bytes / Σ input bytes`.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

pub mod merge;

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::levels::LevelManager;
use crate::memtable::Record;
use crate::sstable::{self, SSTable, SSTableError};

use merge::MergeIterator;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors produced by compaction.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// Compacting a level with no tables is a precondition failure; the
    /// engine state is left untouched.
    #[error("no source tables at level {level}")]
    EmptySourceLevel {
        /// The level that was asked to compact.
        level: u32,
    },

    /// Building the output table failed. Merged input is never empty
    /// when an output is attempted, so this indicates an engine bug.
    #[error("failed to build compaction output: {0}")]
    Build(#[from] SSTableError),
}

// ------------------------------------------------------------------------------------------------
// CompactionRecord
// ------------------------------------------------------------------------------------------------

/// Accounting entry for one executed compaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionRecord {
    /// Level the inputs were taken from.
    pub source_level: u32,

    /// Level the output was written to.
    pub target_level: u32,

    /// Number of source-level tables consumed.
    pub source_tables: usize,

    /// Number of overlapping target-level tables consumed.
    pub overlapping_tables: usize,

    /// Records in the output table (0 when everything was dropped).
    pub output_records: usize,

    /// Byte estimate of all consumed tables.
    pub input_bytes: u64,

    /// Byte estimate of the output table.
    pub output_bytes: u64,

    /// Older versions discarded during dedup.
    pub duplicates_removed: u64,

    /// Tombstones dropped at the bottom level.
    pub tombstones_dropped: u64,

    /// Id of the output table, if one was produced.
    pub output_table: Option<u64>,

    /// Wall time of the whole operation.
    pub elapsed_ms: f64,
}

// ------------------------------------------------------------------------------------------------
// CompactionEngine
// ------------------------------------------------------------------------------------------------

/// Default per-level trigger thresholds; the last entry repeats for all
/// deeper levels.
pub const DEFAULT_LEVEL_THRESHOLDS: [usize; 4] = [4, 10, 100, 1000];

/// Owns the trigger thresholds, the compaction history, and the
/// write-amplification totals. Operates on a [`LevelManager`] borrowed
/// per call.
pub struct CompactionEngine {
    thresholds: Vec<usize>,
    history: Vec<CompactionRecord>,
    total_input_bytes: u64,
    total_output_bytes: u64,
    total_duplicates_removed: u64,
}

impl CompactionEngine {
    /// Creates an engine with the given per-level thresholds (the last
    /// entry applies to all deeper levels). An empty vector falls back
    /// to [`DEFAULT_LEVEL_THRESHOLDS`].
    pub fn new(thresholds: Vec<usize>) -> Self {
        let thresholds = if thresholds.is_empty() {
            DEFAULT_LEVEL_THRESHOLDS.to_vec()
        } else {
            thresholds
        };
        Self {
            thresholds,
            history: Vec::new(),
            total_input_bytes: 0,
            total_output_bytes: 0,
            total_duplicates_removed: 0,
        }
    }

    /// The trigger threshold for `level`.
    pub fn threshold_for(&self, level: u32) -> usize {
        let idx = (level as usize).min(self.thresholds.len() - 1);
        self.thresholds[idx]
    }

    /// Sweeps levels in ascending order and compacts every level whose
    /// table count has reached its threshold. One sweep may cascade:
    /// compacting L can push L+1 over its own threshold, which the same
    /// sweep picks up next.
    pub fn auto_compact(
        &mut self,
        levels: &mut LevelManager,
    ) -> Result<Vec<CompactionRecord>, CompactionError> {
        let mut performed = Vec::new();

        let mut level = 0u32;
        while let Some(deepest) = levels.deepest_populated() {
            if level > deepest {
                break;
            }
            let count = levels.tables(level).len();
            if count > 0 && count >= self.threshold_for(level) {
                let record = self.compact(levels, level, level + 1)?;
                performed.push(record);
            }
            level += 1;
        }

        Ok(performed)
    }

    /// Merges every table at `src` with the overlapping tables at `dst`
    /// and installs the result at `dst`.
    ///
    /// Fails with [`CompactionError::EmptySourceLevel`] — without
    /// touching any state — when `src` holds no tables. A merge whose
    /// output is entirely tombstone-dropped still consumes its inputs
    /// and produces no table.
    pub fn compact(
        &mut self,
        levels: &mut LevelManager,
        src: u32,
        dst: u32,
    ) -> Result<CompactionRecord, CompactionError> {
        let started = Instant::now();

        if levels.tables(src).is_empty() {
            return Err(CompactionError::EmptySourceLevel { level: src });
        }

        // Union key range of the source tables selects the overlap set.
        let (range_lo, range_hi) = {
            let tables = levels.tables(src);
            let lo = tables.iter().map(|t| t.min_key().to_vec()).min();
            let hi = tables.iter().map(|t| t.max_key().to_vec()).max();
            (lo.unwrap_or_default(), hi.unwrap_or_default())
        };

        let overlap_ids: Vec<u64> = levels
            .tables(dst)
            .iter()
            .filter(|t| t.overlaps(&range_lo, &range_hi))
            .map(SSTable::id)
            .collect();

        let mut source_tables = levels.take_level(src);
        let overlap_tables = levels.remove_tables(dst, &overlap_ids);

        // Newest first: within the source level a higher id means a more
        // recent flush (only L0 can overlap, deeper levels are disjoint
        // so the order is immaterial there).
        source_tables.sort_by(|a, b| b.id().cmp(&a.id()));

        let source_count = source_tables.len();
        let overlap_count = overlap_tables.len();
        let input_bytes: u64 = source_tables
            .iter()
            .chain(&overlap_tables)
            .map(|t| t.size_bytes() as u64)
            .sum();

        info!(
            src,
            dst,
            source_count,
            overlap_count,
            input_bytes,
            "compaction: starting merge"
        );

        // Tombstones are droppable when, with the inputs consumed, no
        // populated level remains below the target.
        let drop_tombstones = levels.deepest_populated().is_none_or(|deep| deep <= dst);

        let sources: Vec<&[Record]> = source_tables
            .iter()
            .map(SSTable::records)
            .chain(overlap_tables.iter().map(SSTable::records))
            .collect();

        let mut output: Vec<Record> = Vec::new();
        let mut duplicates_removed = 0u64;
        let mut tombstones_dropped = 0u64;
        let mut last_key: Option<&[u8]> = None;

        for record in MergeIterator::new(sources) {
            if last_key == Some(record.key.as_slice()) {
                duplicates_removed += 1;
                continue;
            }
            last_key = Some(record.key.as_slice());

            if record.is_tombstone() && drop_tombstones {
                tombstones_dropped += 1;
                continue;
            }
            output.push(record.clone());
        }

        let output_records = output.len();
        let output_bytes = sstable::estimated_bytes(&output) as u64;

        let output_table = if output.is_empty() {
            debug!(src, dst, "compaction: all records eliminated, no output table");
            None
        } else {
            Some(levels.create(dst, output)?)
        };

        let record = CompactionRecord {
            source_level: src,
            target_level: dst,
            source_tables: source_count,
            overlapping_tables: overlap_count,
            output_records,
            input_bytes,
            output_bytes,
            duplicates_removed,
            tombstones_dropped,
            output_table,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        };

        self.total_input_bytes += input_bytes;
        self.total_output_bytes += output_bytes;
        self.total_duplicates_removed += duplicates_removed;
        self.history.push(record.clone());

        info!(
            src,
            dst,
            output_records,
            output_bytes,
            duplicates_removed,
            tombstones_dropped,
            output_table = ?record.output_table,
            "compaction: complete"
        );

        Ok(record)
    }

    /// Cumulative write amplification: `Σ output bytes / Σ input bytes`
    /// across all compactions so far. 0.0 before the first compaction.
    pub fn write_amplification(&self) -> f64 {
        if self.total_input_bytes == 0 {
            return 0.0;
        }
        self.total_output_bytes as f64 / self.total_input_bytes as f64
    }

    /// All compaction records, oldest first.
    pub fn history(&self) -> &[CompactionRecord] {
        &self.history
    }

    /// Number of compactions performed.
    pub fn count(&self) -> usize {
        self.history.len()
    }

    /// Total older versions discarded across all compactions.
    pub fn total_duplicates_removed(&self) -> u64 {
        self.total_duplicates_removed
    }

    /// Cumulative input byte estimate.
    pub fn total_input_bytes(&self) -> u64 {
        self.total_input_bytes
    }

    /// Cumulative output byte estimate.
    pub fn total_output_bytes(&self) -> u64 {
        self.total_output_bytes
    }

    /// Resets history and totals. Thresholds are kept.
    pub fn clear(&mut self) {
        self.history.clear();
        self.total_input_bytes = 0;
        self.total_output_bytes = 0;
        self.total_duplicates_removed = 0;
    }
}
