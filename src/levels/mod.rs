//! # Level Manager Module
//!
//! Per-level bookkeeping for the engine's SSTables, and the cross-level
//! point-lookup orchestration.
//!
//! ## Design Invariants
//!
//! - Level 0 tables may overlap; they are stored in insertion order
//!   (newest last) and searched newest-first, which preserves recency
//!   without consulting timestamps at read time.
//! - Tables at level ≥ 1 have pairwise disjoint key ranges (compaction
//!   guarantees this on insert) and are kept sorted by `min_key`.
//! - Table ids come from one monotonic counter, so within level 0 a
//!   higher id always means a newer table.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::memtable::Record;
use crate::sstable::{SSTable, SSTableError, TableOptions};

// ------------------------------------------------------------------------------------------------
// Search path
// ------------------------------------------------------------------------------------------------

/// What probing one table produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A live record was found.
    Hit,

    /// A tombstone was found — definitive, the key is deleted.
    TombstoneHit,

    /// Nothing for this key here.
    Miss,
}

/// One step of a cross-level search: which table was probed and what
/// happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchStep {
    /// Level of the probed table.
    pub level: u32,

    /// Id of the probed table.
    pub table_id: u64,

    /// What the probe produced.
    pub outcome: ProbeOutcome,

    /// True when the bloom filter answered the probe without a search.
    pub bloom_saved: bool,
}

/// Result of a cross-level search: the winning record (if any) plus the
/// full path of probed tables.
#[derive(Debug)]
pub struct LevelSearch<'a> {
    /// First record found in recency order. May be a tombstone.
    pub record: Option<&'a Record>,

    /// Every table that was actually probed, in probe order.
    pub path: Vec<SearchStep>,
}

// ------------------------------------------------------------------------------------------------
// Per-level stats
// ------------------------------------------------------------------------------------------------

/// Table count, byte estimate, and bloom occupancy for one level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelStats {
    /// Level number.
    pub level: u32,

    /// Number of tables at the level.
    pub tables: usize,

    /// Sum of the tables' byte estimates.
    pub bytes: usize,

    /// Mean fill ratio of the tables' bloom filters.
    pub bloom_fill: f64,
}

// ------------------------------------------------------------------------------------------------
// LevelManager
// ------------------------------------------------------------------------------------------------

/// Owns every SSTable in the engine, organised into integer-tagged
/// levels, and allocates table ids.
pub struct LevelManager {
    levels: BTreeMap<u32, Vec<SSTable>>,
    next_table_id: u64,
    opts: TableOptions,
}

impl LevelManager {
    /// Creates an empty manager; `opts` are applied to every table it
    /// builds.
    pub fn new(opts: TableOptions) -> Self {
        Self {
            levels: BTreeMap::new(),
            next_table_id: 1,
            opts,
        }
    }

    /// Builds a new table from `records` and inserts it at `level`.
    /// Returns the allocated table id.
    pub fn create(&mut self, level: u32, records: Vec<Record>) -> Result<u64, SSTableError> {
        let id = self.next_table_id;
        self.next_table_id += 1;

        let table = SSTable::new(id, records, self.opts)?;
        debug!(level, id, records = table.len(), "SSTable created");
        self.add(level, table);
        Ok(id)
    }

    /// Inserts an existing table at `level`. L0 appends (newest last);
    /// deeper levels keep their table list sorted by `min_key` — the
    /// caller (compaction) guarantees range disjointness there.
    pub fn add(&mut self, level: u32, table: SSTable) {
        let tables = self.levels.entry(level).or_default();
        if level == 0 {
            tables.push(table);
        } else {
            let at = tables.partition_point(|t| t.min_key() < table.min_key());
            tables.insert(at, table);
        }
    }

    /// The tables currently at `level` (empty slice when unpopulated).
    pub fn tables(&self, level: u32) -> &[SSTable] {
        self.levels.get(&level).map_or(&[], Vec::as_slice)
    }

    /// Removes and returns every table at `level`.
    pub fn take_level(&mut self, level: u32) -> Vec<SSTable> {
        self.levels.remove(&level).unwrap_or_default()
    }

    /// Removes the tables with the given ids from `level` and returns
    /// them.
    pub fn remove_tables(&mut self, level: u32, ids: &[u64]) -> Vec<SSTable> {
        let Some(tables) = self.levels.remove(&level) else {
            return Vec::new();
        };
        let (removed, kept): (Vec<_>, Vec<_>) =
            tables.into_iter().partition(|t| ids.contains(&t.id()));
        if !kept.is_empty() {
            self.levels.insert(level, kept);
        }
        removed
    }

    /// Drops every table at `level`.
    pub fn clear_level(&mut self, level: u32) {
        self.levels.remove(&level);
    }

    /// Drops all tables everywhere. The id counter keeps running.
    pub fn clear_all(&mut self) {
        self.levels.clear();
    }

    /// Populated level numbers, ascending.
    pub fn populated_levels(&self) -> impl Iterator<Item = u32> + '_ {
        self.levels
            .iter()
            .filter(|(_, tables)| !tables.is_empty())
            .map(|(&level, _)| level)
    }

    /// The deepest populated level, if any.
    pub fn deepest_populated(&self) -> Option<u32> {
        self.populated_levels().max()
    }

    /// Total number of tables across all levels.
    pub fn table_count(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    /// Per-level table counts and byte estimates, ascending by level.
    pub fn level_stats(&self) -> Vec<LevelStats> {
        self.levels
            .iter()
            .filter(|(_, tables)| !tables.is_empty())
            .map(|(&level, tables)| LevelStats {
                level,
                tables: tables.len(),
                bytes: tables.iter().map(SSTable::size_bytes).sum(),
                bloom_fill: tables.iter().map(|t| t.bloom().fill_ratio()).sum::<f64>()
                    / tables.len() as f64,
            })
            .collect()
    }

    /// Cross-level point lookup.
    ///
    /// Iterates levels in ascending order. Level 0 is scanned
    /// newest-first; deeper levels skip any table whose range excludes
    /// the key (those tables do not appear on the path). The first hit —
    /// live or tombstone — wins.
    pub fn search(&self, key: &[u8]) -> LevelSearch<'_> {
        let mut path = Vec::new();

        for (&level, tables) in &self.levels {
            // L0 overlaps; newest-last insertion order means reverse
            // iteration preserves recency. Deeper levels are disjoint,
            // so order does not matter and range skips apply.
            let candidates: Vec<&SSTable> = if level == 0 {
                tables.iter().rev().collect()
            } else {
                tables
                    .iter()
                    .filter(|t| t.contains_in_range(key))
                    .collect()
            };

            for table in candidates {
                let lookup = table.get(key);
                match lookup.record {
                    Some(record) => {
                        let outcome = if record.is_tombstone() {
                            ProbeOutcome::TombstoneHit
                        } else {
                            ProbeOutcome::Hit
                        };
                        path.push(SearchStep {
                            level,
                            table_id: table.id(),
                            outcome,
                            bloom_saved: false,
                        });
                        trace!(level, table_id = table.id(), ?outcome, "level search hit");
                        return LevelSearch {
                            record: Some(record),
                            path,
                        };
                    }
                    None => {
                        path.push(SearchStep {
                            level,
                            table_id: table.id(),
                            outcome: ProbeOutcome::Miss,
                            bloom_saved: lookup.bloom_saved,
                        });
                    }
                }
            }
        }

        LevelSearch { record: None, path }
    }
}
