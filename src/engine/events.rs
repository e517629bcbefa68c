//! Observer channels.
//!
//! The engine exposes four fixed event channels. Delivery is synchronous:
//! events fire after the engine state has been updated and before the
//! triggering operation returns. Observers are registered on the engine —
//! never discovered globally — and must not re-enter the engine during
//! delivery.
//!
//! A failing observer never fails the operation: the error is logged,
//! recorded in the engine's diagnostic log, and counted in stats.

use thiserror::Error;

use crate::compaction::CompactionRecord;

/// An observer callback refused the event. Quarantined by the engine.
#[derive(Debug, Error)]
#[error("observer failure: {0}")]
pub struct ObserverError(pub String);

/// A record landed in the memtable (put or delete).
#[derive(Debug, Clone)]
pub struct MemtableInsertEvent {
    /// The written key.
    pub key: Vec<u8>,

    /// True when an existing record was overwritten in place.
    pub updated: bool,

    /// True when the write was a tombstone.
    pub tombstone: bool,

    /// Skip-list level of the node holding the record.
    pub node_level: usize,

    /// Memtable size after the write.
    pub memtable_len: usize,
}

/// The memtable was flushed into a new L0 SSTable.
#[derive(Debug, Clone)]
pub struct MemtableFlushEvent {
    /// Id of the created table.
    pub table_id: u64,

    /// Records moved out of the memtable.
    pub records: usize,

    /// Byte estimate of the new table.
    pub bytes: u64,
}

/// A point lookup completed.
#[derive(Debug, Clone)]
pub struct ReadEvent {
    /// The probed key.
    pub key: Vec<u8>,

    /// Whether a live value was found.
    pub found: bool,

    /// Number of probes on the search path (memtable included).
    pub steps: usize,

    /// How many table probes the bloom filters answered negatively.
    pub bloom_saved: usize,
}

/// A compaction completed.
#[derive(Debug, Clone)]
pub struct CompactionEvent {
    /// The full accounting record of the compaction.
    pub record: CompactionRecord,
}

/// The four observer channels. Every method has a no-op default, so an
/// observer implements only the channels it cares about.
pub trait EngineObserver {
    /// A record landed in the memtable.
    fn on_memtable_insert(&mut self, _event: &MemtableInsertEvent) -> Result<(), ObserverError> {
        Ok(())
    }

    /// The memtable was flushed to a new L0 table.
    fn on_memtable_flush(&mut self, _event: &MemtableFlushEvent) -> Result<(), ObserverError> {
        Ok(())
    }

    /// A point lookup completed.
    fn on_read(&mut self, _event: &ReadEvent) -> Result<(), ObserverError> {
        Ok(())
    }

    /// A compaction completed.
    fn on_compaction(&mut self, _event: &CompactionEvent) -> Result<(), ObserverError> {
        Ok(())
    }
}
