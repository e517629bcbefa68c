//! Operation counters and the aggregate statistics snapshot.

use std::fmt;

use crate::compaction::CompactionRecord;
use crate::levels::LevelStats;

/// How many history entries a snapshot carries.
const HISTORY_TAIL: usize = 8;

/// Plain counters owned by the engine. The engine is single-threaded,
/// so no atomics.
#[derive(Debug, Default, Clone)]
pub struct OpCounters {
    pub puts: u64,
    pub gets: u64,
    pub deletes: u64,
    pub updates: u64,
    pub flushes: u64,

    pub memtable_hits: u64,
    pub table_hits: u64,
    pub misses: u64,
    pub tombstone_misses: u64,

    /// Table probes the bloom filter answered without a search.
    pub bloom_saved: u64,

    /// Table probes that went through to a binary search.
    pub table_searches: u64,

    /// Observer callbacks that returned an error.
    pub observer_errors: u64,
}

impl OpCounters {
    /// Ratio of bloom-answered probes to all table probes, 0.0 when no
    /// table was ever probed.
    pub fn bloom_effectiveness(&self) -> f64 {
        let total = self.bloom_saved + self.table_searches;
        if total == 0 {
            return 0.0;
        }
        self.bloom_saved as f64 / total as f64
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Point-in-time aggregate view over the whole engine, returned by
/// `Engine::stats`.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    // Operation counters
    pub puts: u64,
    pub gets: u64,
    pub deletes: u64,
    pub updates: u64,
    pub flushes: u64,
    pub memtable_hits: u64,
    pub table_hits: u64,
    pub misses: u64,
    pub tombstone_misses: u64,
    pub observer_errors: u64,

    // Memtable
    pub memtable_len: usize,
    pub memtable_height: usize,
    pub memtable_bytes: usize,

    // Levels
    pub levels: Vec<LevelStats>,
    pub total_tables: usize,

    // Bloom
    pub bloom_saved: u64,
    pub table_searches: u64,
    /// `bloom_saved / (bloom_saved + table_searches)`.
    pub bloom_effectiveness: f64,

    // Compaction
    pub compactions: usize,
    pub duplicates_removed: u64,
    /// Cumulative `Σ output bytes / Σ input bytes` across all
    /// compactions (0.0 before the first one).
    pub write_amplification: f64,
    /// The most recent compaction records, oldest first.
    pub history_tail: Vec<CompactionRecord>,
}

impl StatsSnapshot {
    /// Trims a full history to the tail a snapshot carries.
    pub(crate) fn tail_of(history: &[CompactionRecord]) -> Vec<CompactionRecord> {
        let skip = history.len().saturating_sub(HISTORY_TAIL);
        history[skip..].to_vec()
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Engine Stats ===")?;
        writeln!(f, "Operations:")?;
        writeln!(f, "  PUT: {} (updates: {})", self.puts, self.updates)?;
        writeln!(f, "  GET: {}", self.gets)?;
        writeln!(f, "  DELETE: {}", self.deletes)?;
        writeln!(
            f,
            "  hits: {} memtable / {} sstable, misses: {} ({} tombstoned)",
            self.memtable_hits, self.table_hits, self.misses, self.tombstone_misses
        )?;
        writeln!(f)?;
        writeln!(f, "Memtable:")?;
        writeln!(
            f,
            "  {} records, skip-list height {}, ~{} bytes",
            self.memtable_len, self.memtable_height, self.memtable_bytes
        )?;
        writeln!(f, "  flushes: {}", self.flushes)?;
        writeln!(f)?;
        writeln!(f, "Levels ({} tables):", self.total_tables)?;
        if self.levels.is_empty() {
            writeln!(f, "  (empty)")?;
        }
        for level in &self.levels {
            writeln!(
                f,
                "  L{}: {} tables, ~{} bytes, bloom fill {:.1}%",
                level.level,
                level.tables,
                level.bytes,
                level.bloom_fill * 100.0
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Bloom filters:")?;
        writeln!(
            f,
            "  saved {} of {} table probes ({:.1}% effective)",
            self.bloom_saved,
            self.bloom_saved + self.table_searches,
            self.bloom_effectiveness * 100.0
        )?;
        writeln!(f)?;
        writeln!(f, "Compaction:")?;
        writeln!(
            f,
            "  {} runs, {} duplicates removed, write amplification {:.2}",
            self.compactions, self.duplicates_removed, self.write_amplification
        )?;
        for record in &self.history_tail {
            writeln!(
                f,
                "  L{}->L{}: {}+{} tables -> {} records ({} dup, {} tombstones dropped, {:.2} ms)",
                record.source_level,
                record.target_level,
                record.source_tables,
                record.overlapping_tables,
                record.output_records,
                record.duplicates_removed,
                record.tombstones_dropped,
                record.elapsed_ms
            )?;
        }
        if self.observer_errors > 0 {
            writeln!(f)?;
            writeln!(f, "Observer errors: {}", self.observer_errors)?;
        }
        Ok(())
    }
}
