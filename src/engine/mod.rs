//! # LSM Engine Module
//!
//! The facade that ties the storage engine together: one memtable, one
//! level map, one compaction engine, one counter set, and the observer
//! channels.
//!
//! ## Design Overview
//!
//! Writes land in the memtable; when it reaches the configured
//! threshold it is flushed into a new L0 SSTable, and a threshold sweep
//! may then cascade compactions down the levels. Reads probe the
//! memtable first (a tombstone hit is definitive), then the levels in
//! ascending order — the first hit wins, and the full search path is
//! returned to the caller.
//!
//! ## Concurrency Model
//!
//! Single-threaded cooperative: all operations take `&mut self`, run to
//! completion — including any flush and compaction cascade they trigger —
//! and are strictly serializable in call order. There are no background
//! threads. A reentrancy guard additionally reports engine entry during
//! observer delivery as a fatal usage error.
//!
//! ## Failure Semantics
//!
//! - Caller errors (empty key, compacting an empty level) are returned
//!   and leave no trace in engine state.
//! - Invariant violations (an unsorted table out of a flush or merge)
//!   poison the engine: every subsequent operation fails until
//!   [`Engine::clear`] resets it.
//! - Observer errors are quarantined — logged, counted, appended to the
//!   diagnostic log — and the operation still succeeds.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

pub mod events;
pub mod stats;

use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::compaction::{
    CompactionEngine, CompactionError, CompactionRecord, DEFAULT_LEVEL_THRESHOLDS,
};
use crate::levels::{LevelManager, ProbeOutcome};
use crate::memtable::{Memtable, MemtableProbe, MemtableWrite};
use crate::sstable::{self, TableOptions};

use events::{
    CompactionEvent, EngineObserver, MemtableFlushEvent, MemtableInsertEvent, ReadEvent,
};
use stats::{OpCounters, StatsSnapshot};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Keys must be non-empty byte strings.
    #[error("key must not be empty")]
    EmptyKey,

    /// An operation was issued while observer callbacks were being
    /// delivered.
    #[error("engine re-entered during observer callback delivery")]
    ReentrantCallback,

    /// A prior invariant violation disabled the engine; `clear` resets it.
    #[error("engine is poisoned by an earlier invariant violation: {0}")]
    Poisoned(String),

    /// A runtime check found engine state violating a structural
    /// invariant. Fatal — the engine refuses further operations.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Compaction failure (e.g. empty source level).
    #[error(transparent)]
    Compaction(#[from] CompactionError),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Flush the memtable when it reaches this many records.
    pub memtable_threshold: usize,

    /// Maximum skip-list node level.
    pub max_skip_list_level: usize,

    /// Skip-list level promotion probability.
    pub skip_list_promotion_p: f64,

    /// Record every s-th key in each SSTable's sparse index.
    pub sstable_sparse_index_step: usize,

    /// Target false-positive rate for SSTable bloom filters.
    pub bloom_filter_target_fpr: f64,

    /// Per-level compaction trigger thresholds; the last entry applies
    /// to all deeper levels.
    pub level_compaction_thresholds: Vec<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memtable_threshold: 10,
            max_skip_list_level: 16,
            skip_list_promotion_p: 0.5,
            sstable_sparse_index_step: 10,
            bloom_filter_target_fpr: 0.01,
            level_compaction_thresholds: DEFAULT_LEVEL_THRESHOLDS.to_vec(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Operation receipts
// ------------------------------------------------------------------------------------------------

/// Whether a write created a new key or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The key was new.
    Inserted,

    /// An existing record for the key was overwritten.
    Updated,
}

/// Descriptor of a memtable flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReceipt {
    /// Id of the L0 table the flush created.
    pub table_id: u64,

    /// Records moved out of the memtable.
    pub records: usize,

    /// Byte estimate of the new table.
    pub bytes: u64,
}

/// Receipt returned by `put` and `delete`.
#[derive(Debug, Clone)]
pub struct WriteReceipt {
    /// Insert vs update.
    pub outcome: WriteOutcome,

    /// The flush this write triggered, if any.
    pub flush: Option<FlushReceipt>,

    /// Compactions the triggered flush cascaded into.
    pub compactions: Vec<CompactionRecord>,

    /// Wall time of the whole operation, flush and cascade included.
    pub elapsed_ms: f64,

    /// Nominal complexity class of the write path.
    pub complexity: &'static str,
}

/// Where a read terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Live value found in the memtable.
    MemtableHit,

    /// Live value found in an SSTable.
    TableHit {
        /// Level of the winning table.
        level: u32,
        /// Id of the winning table.
        table_id: u64,
    },

    /// A tombstone shadows the key; reported as a miss.
    TombstoneMiss,

    /// The key is nowhere in the engine.
    NotFound,
}

/// One probe on a read's search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStep {
    /// What was probed.
    pub location: ReadLocation,

    /// What the probe produced.
    pub outcome: ProbeOutcome,

    /// True when a bloom filter answered the probe without a search.
    pub bloom_saved: bool,
}

/// The thing a read step probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLocation {
    /// The in-memory write buffer.
    Memtable,

    /// An SSTable at `level`.
    Table {
        /// Level of the probed table.
        level: u32,
        /// Id of the probed table.
        table_id: u64,
    },
}

/// Receipt returned by `get`.
#[derive(Debug, Clone)]
pub struct ReadReceipt {
    /// The value, when a live record was found.
    pub value: Option<Vec<u8>>,

    /// Where the read terminated.
    pub outcome: ReadOutcome,

    /// Every probe made, memtable first.
    pub path: Vec<ReadStep>,

    /// Wall time of the lookup.
    pub elapsed_ms: f64,
}

// ------------------------------------------------------------------------------------------------
// Engine
// ------------------------------------------------------------------------------------------------

/// The LSM storage engine.
///
/// Owns all state — nothing global. Observers are registered on the
/// engine and delivered synchronously.
pub struct Engine {
    config: EngineConfig,
    memtable: Memtable,
    levels: LevelManager,
    compaction: CompactionEngine,
    counters: OpCounters,
    observers: Vec<Box<dyn EngineObserver>>,

    /// Quarantined observer failures, newest last.
    diagnostics: Vec<String>,

    /// True while observer callbacks are being delivered.
    in_callback: bool,

    /// Set when an invariant violation disabled the engine.
    poisoned: Option<String>,
}

impl Engine {
    /// Creates an empty engine.
    pub fn new(config: EngineConfig) -> Self {
        let table_opts = TableOptions {
            bloom_fpr: config.bloom_filter_target_fpr,
            sparse_index_step: config.sstable_sparse_index_step,
        };
        Self {
            memtable: Memtable::new(config.max_skip_list_level, config.skip_list_promotion_p),
            levels: LevelManager::new(table_opts),
            compaction: CompactionEngine::new(config.level_compaction_thresholds.clone()),
            counters: OpCounters::default(),
            observers: Vec::new(),
            diagnostics: Vec::new(),
            in_callback: false,
            poisoned: None,
            config,
        }
    }

    /// Registers an observer on all four event channels.
    pub fn register_observer(&mut self, observer: Box<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    /// Inserts or updates a key.
    ///
    /// Runs the full write path: memtable insert, threshold flush, and
    /// the compaction sweep — all before returning.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<WriteReceipt, EngineError> {
        self.ensure_ready()?;
        if key.is_empty() {
            return Err(EngineError::EmptyKey);
        }

        let started = Instant::now();
        self.counters.puts += 1;

        let write = self.memtable.put(key.to_vec(), value.to_vec());
        if write.updated {
            self.counters.updates += 1;
        }
        self.notify_insert(key, write, false);

        let flush = self.flush_if_threshold()?;
        let compactions = self.sweep_compactions()?;

        Ok(Self::write_receipt(write, flush, compactions, started))
    }

    /// Deletes a key by inserting a tombstone. Idempotent.
    pub fn delete(&mut self, key: &[u8]) -> Result<WriteReceipt, EngineError> {
        self.ensure_ready()?;
        if key.is_empty() {
            return Err(EngineError::EmptyKey);
        }

        let started = Instant::now();
        self.counters.deletes += 1;

        let write = self.memtable.delete(key.to_vec());
        if write.updated {
            self.counters.updates += 1;
        }
        self.notify_insert(key, write, true);

        let flush = self.flush_if_threshold()?;
        let compactions = self.sweep_compactions()?;

        Ok(Self::write_receipt(write, flush, compactions, started))
    }

    /// Point lookup. A miss — absent or tombstoned — is not an error;
    /// the receipt's `value` is `None` and the path tells the story.
    pub fn get(&mut self, key: &[u8]) -> Result<ReadReceipt, EngineError> {
        self.ensure_ready()?;
        if key.is_empty() {
            return Err(EngineError::EmptyKey);
        }

        let started = Instant::now();
        self.counters.gets += 1;

        let mut path = Vec::new();
        let (value, outcome) = match self.memtable.probe(key) {
            MemtableProbe::Value(found) => {
                let value = found.to_vec();
                path.push(ReadStep {
                    location: ReadLocation::Memtable,
                    outcome: ProbeOutcome::Hit,
                    bloom_saved: false,
                });
                self.counters.memtable_hits += 1;
                (Some(value), ReadOutcome::MemtableHit)
            }
            MemtableProbe::Tombstone => {
                path.push(ReadStep {
                    location: ReadLocation::Memtable,
                    outcome: ProbeOutcome::TombstoneHit,
                    bloom_saved: false,
                });
                self.counters.misses += 1;
                self.counters.tombstone_misses += 1;
                (None, ReadOutcome::TombstoneMiss)
            }
            MemtableProbe::NotFound => {
                path.push(ReadStep {
                    location: ReadLocation::Memtable,
                    outcome: ProbeOutcome::Miss,
                    bloom_saved: false,
                });
                self.search_levels(key, &mut path)
            }
        };

        let bloom_saved = path.iter().filter(|s| s.bloom_saved).count();
        self.notify_read(ReadEvent {
            key: key.to_vec(),
            found: value.is_some(),
            steps: path.len(),
            bloom_saved,
        });

        Ok(ReadReceipt {
            value,
            outcome,
            path,
            elapsed_ms: elapsed_ms(started),
        })
    }

    /// Delegates a read that missed the memtable to the level manager,
    /// folding the search path into `path` and updating counters.
    fn search_levels(
        &mut self,
        key: &[u8],
        path: &mut Vec<ReadStep>,
    ) -> (Option<Vec<u8>>, ReadOutcome) {
        let search = self.levels.search(key);

        let mut winner = None;
        for step in &search.path {
            if step.bloom_saved {
                self.counters.bloom_saved += 1;
            } else {
                self.counters.table_searches += 1;
            }
            if step.outcome != ProbeOutcome::Miss {
                winner = Some((step.level, step.table_id));
            }
        }

        let value = search.record.and_then(|r| r.value.clone());
        let outcome = match (&value, winner) {
            (Some(_), Some((level, table_id))) => {
                self.counters.table_hits += 1;
                ReadOutcome::TableHit { level, table_id }
            }
            (None, Some(_)) => {
                self.counters.misses += 1;
                self.counters.tombstone_misses += 1;
                ReadOutcome::TombstoneMiss
            }
            _ => {
                self.counters.misses += 1;
                ReadOutcome::NotFound
            }
        };

        path.extend(search.path.iter().map(|step| ReadStep {
            location: ReadLocation::Table {
                level: step.level,
                table_id: step.table_id,
            },
            outcome: step.outcome,
            bloom_saved: step.bloom_saved,
        }));

        (value, outcome)
    }

    /// Flushes the memtable into a new L0 SSTable. No-op when the
    /// memtable is empty.
    pub fn flush(&mut self) -> Result<Option<FlushReceipt>, EngineError> {
        self.ensure_ready()?;
        self.flush_inner()
    }

    fn flush_if_threshold(&mut self) -> Result<Option<FlushReceipt>, EngineError> {
        if self.memtable.len() >= self.config.memtable_threshold {
            self.flush_inner()
        } else {
            Ok(None)
        }
    }

    fn flush_inner(&mut self) -> Result<Option<FlushReceipt>, EngineError> {
        if self.memtable.is_empty() {
            return Ok(None);
        }

        let records = self.memtable.take_sorted();
        let count = records.len();
        let bytes = sstable::estimated_bytes(&records) as u64;

        let table_id = match self.levels.create(0, records) {
            Ok(id) => id,
            // The memtable drains sorted and unique; a build failure here
            // means the engine state itself is broken.
            Err(e) => return Err(self.poison(format!("flush produced an invalid SSTable: {e}"))),
        };

        self.counters.flushes += 1;
        info!(table_id, records = count, bytes, "memtable flushed to L0");

        self.notify_flush(MemtableFlushEvent {
            table_id,
            records: count,
            bytes,
        });

        Ok(Some(FlushReceipt {
            table_id,
            records: count,
            bytes,
        }))
    }

    /// Manually compacts `src` into `dst`.
    pub fn compact(&mut self, src: u32, dst: u32) -> Result<CompactionRecord, EngineError> {
        self.ensure_ready()?;
        let record = match self.compaction.compact(&mut self.levels, src, dst) {
            Ok(record) => record,
            Err(CompactionError::Build(e)) => {
                return Err(self.poison(format!("compaction produced an invalid SSTable: {e}")));
            }
            Err(other) => return Err(other.into()),
        };
        self.notify_compaction(record.clone());
        Ok(record)
    }

    /// Threshold sweep over all levels; part of every write path.
    fn sweep_compactions(&mut self) -> Result<Vec<CompactionRecord>, EngineError> {
        let performed = match self.compaction.auto_compact(&mut self.levels) {
            Ok(performed) => performed,
            Err(CompactionError::Build(e)) => {
                return Err(self.poison(format!("compaction produced an invalid SSTable: {e}")));
            }
            Err(other) => return Err(other.into()),
        };
        for record in &performed {
            self.notify_compaction(record.clone());
        }
        Ok(performed)
    }

    /// Wipes the engine back to its initial state: memtable, levels,
    /// compaction history, counters, diagnostics — and any poisoning.
    /// Registered observers are kept.
    pub fn clear(&mut self) {
        self.memtable = Memtable::new(
            self.config.max_skip_list_level,
            self.config.skip_list_promotion_p,
        );
        self.levels.clear_all();
        self.compaction.clear();
        self.counters.reset();
        self.diagnostics.clear();
        self.poisoned = None;
        info!("engine cleared");
    }

    /// Aggregate statistics snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            puts: self.counters.puts,
            gets: self.counters.gets,
            deletes: self.counters.deletes,
            updates: self.counters.updates,
            flushes: self.counters.flushes,
            memtable_hits: self.counters.memtable_hits,
            table_hits: self.counters.table_hits,
            misses: self.counters.misses,
            tombstone_misses: self.counters.tombstone_misses,
            observer_errors: self.counters.observer_errors,

            memtable_len: self.memtable.len(),
            memtable_height: self.memtable.height(),
            memtable_bytes: self.memtable.approximate_size(),

            levels: self.levels.level_stats(),
            total_tables: self.levels.table_count(),

            bloom_saved: self.counters.bloom_saved,
            table_searches: self.counters.table_searches,
            bloom_effectiveness: self.counters.bloom_effectiveness(),

            compactions: self.compaction.count(),
            duplicates_removed: self.compaction.total_duplicates_removed(),
            write_amplification: self.compaction.write_amplification(),
            history_tail: StatsSnapshot::tail_of(self.compaction.history()),
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Quarantined observer failures, oldest first.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    // --------------------------------------------------------------------------------------------
    // Internals
    // --------------------------------------------------------------------------------------------

    fn ensure_ready(&self) -> Result<(), EngineError> {
        if let Some(reason) = &self.poisoned {
            return Err(EngineError::Poisoned(reason.clone()));
        }
        if self.in_callback {
            return Err(EngineError::ReentrantCallback);
        }
        Ok(())
    }

    /// Disables the engine and returns the violation as an error.
    fn poison(&mut self, reason: String) -> EngineError {
        error!(%reason, "invariant violation; engine poisoned");
        self.poisoned = Some(reason.clone());
        EngineError::InvariantViolation(reason)
    }

    fn write_receipt(
        write: MemtableWrite,
        flush: Option<FlushReceipt>,
        compactions: Vec<CompactionRecord>,
        started: Instant,
    ) -> WriteReceipt {
        WriteReceipt {
            outcome: if write.updated {
                WriteOutcome::Updated
            } else {
                WriteOutcome::Inserted
            },
            flush,
            compactions,
            elapsed_ms: elapsed_ms(started),
            complexity: "O(log n)",
        }
    }

    // --------------------------------------------------------------------------------------------
    // Observer delivery
    // --------------------------------------------------------------------------------------------

    fn notify_insert(&mut self, key: &[u8], write: MemtableWrite, tombstone: bool) {
        let event = MemtableInsertEvent {
            key: key.to_vec(),
            updated: write.updated,
            tombstone,
            node_level: write.node_level,
            memtable_len: self.memtable.len(),
        };
        self.deliver("on_memtable_insert", |observer| {
            observer.on_memtable_insert(&event)
        });
    }

    fn notify_flush(&mut self, event: MemtableFlushEvent) {
        self.deliver("on_memtable_flush", |observer| {
            observer.on_memtable_flush(&event)
        });
    }

    fn notify_read(&mut self, event: ReadEvent) {
        self.deliver("on_read", |observer| observer.on_read(&event));
    }

    fn notify_compaction(&mut self, record: CompactionRecord) {
        let event = CompactionEvent { record };
        self.deliver("on_compaction", |observer| observer.on_compaction(&event));
    }

    /// Synchronous fan-out to all observers. Failures are quarantined:
    /// logged, recorded in the diagnostic log, counted — never
    /// propagated to the caller.
    fn deliver<F>(&mut self, channel: &'static str, send: F)
    where
        F: Fn(&mut dyn EngineObserver) -> Result<(), events::ObserverError>,
    {
        if self.observers.is_empty() {
            return;
        }

        self.in_callback = true;
        let mut faults = Vec::new();
        for observer in &mut self.observers {
            if let Err(fault) = send(observer.as_mut()) {
                warn!(channel, %fault, "observer failed; continuing");
                faults.push(format!("{channel}: {fault}"));
            }
        }
        self.in_callback = false;

        self.counters.observer_errors += faults.len() as u64;
        self.diagnostics.append(&mut faults);
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
