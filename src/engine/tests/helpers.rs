use crate::engine::{Engine, EngineConfig};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with a huge flush threshold — everything stays in the memtable.
pub fn memtable_only_config() -> EngineConfig {
    init_tracing();
    EngineConfig {
        memtable_threshold: 1_000_000,
        ..EngineConfig::default()
    }
}

/// Stock defaults: flush at 10 records, compact L0 at 4 tables.
pub fn default_config() -> EngineConfig {
    init_tracing();
    EngineConfig::default()
}

/// Tiny thresholds so flushes and compactions happen within a handful of
/// writes.
pub fn churn_config() -> EngineConfig {
    init_tracing();
    EngineConfig {
        memtable_threshold: 2,
        level_compaction_thresholds: vec![2, 2, 2],
        ..EngineConfig::default()
    }
}

/// Helper: fill `user1..=userN` with well-known values ("alice", "bob", …
/// wrapping after 10).
pub fn fill_users(engine: &mut Engine, n: usize) {
    const NAMES: [&str; 10] = [
        "alice", "bob", "charlie", "dave", "eve", "frank", "grace", "heidi", "ivan", "jack",
    ];
    for i in 1..=n {
        let key = format!("user{i}");
        let value = NAMES[(i - 1) % 10];
        engine.put(key.as_bytes(), value.as_bytes()).expect("put");
    }
}

/// Value of `get` as an owned string, panicking on a miss.
pub fn get_str(engine: &mut Engine, key: &str) -> String {
    let receipt = engine.get(key.as_bytes()).expect("get");
    String::from_utf8(receipt.value.expect("expected a value")).expect("utf8")
}

/// True when `get` reports a miss (absent or tombstoned).
pub fn is_miss(engine: &mut Engine, key: &str) -> bool {
    engine.get(key.as_bytes()).expect("get").value.is_none()
}
