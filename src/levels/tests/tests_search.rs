#[cfg(test)]
mod tests {
    use crate::levels::{LevelManager, ProbeOutcome};
    use crate::memtable::Record;
    use crate::sstable::TableOptions;

    fn manager() -> LevelManager {
        LevelManager::new(TableOptions::default())
    }

    #[test]
    fn test_search_empty_manager() {
        let mgr = manager();
        let search = mgr.search(b"anything");
        assert!(search.record.is_none());
        assert!(search.path.is_empty());
    }

    #[test]
    fn test_level_zero_searched_newest_first() {
        let mut mgr = manager();
        // Two overlapping L0 tables holding different versions of "k".
        mgr.create(0, vec![Record::put(b"k".to_vec(), b"old".to_vec(), 1)])
            .unwrap();
        let newer = mgr
            .create(0, vec![Record::put(b"k".to_vec(), b"new".to_vec(), 2)])
            .unwrap();

        let search = mgr.search(b"k");
        let record = search.record.unwrap();
        assert_eq!(record.value.as_deref(), Some(b"new".as_slice()));

        // The newer table must be the first (and only) probe.
        assert_eq!(search.path.len(), 1);
        assert_eq!(search.path[0].table_id, newer);
        assert_eq!(search.path[0].outcome, ProbeOutcome::Hit);
    }

    #[test]
    fn test_lower_level_wins_over_deeper() {
        let mut mgr = manager();
        mgr.create(1, vec![Record::put(b"k".to_vec(), b"deep".to_vec(), 1)])
            .unwrap();
        mgr.create(0, vec![Record::put(b"k".to_vec(), b"shallow".to_vec(), 2)])
            .unwrap();

        let search = mgr.search(b"k");
        assert_eq!(
            search.record.unwrap().value.as_deref(),
            Some(b"shallow".as_slice())
        );
    }

    #[test]
    fn test_range_skip_keeps_table_off_the_path() {
        let mut mgr = manager();
        let in_range = mgr
            .create(
                1,
                vec![
                    Record::put(b"a".to_vec(), b"1".to_vec(), 1),
                    Record::put(b"f".to_vec(), b"2".to_vec(), 2),
                ],
            )
            .unwrap();
        mgr.create(
            1,
            vec![
                Record::put(b"m".to_vec(), b"3".to_vec(), 3),
                Record::put(b"r".to_vec(), b"4".to_vec(), 4),
            ],
        )
        .unwrap();

        let search = mgr.search(b"c");
        // Only the table whose range contains "c" is probed.
        assert_eq!(search.path.len(), 1);
        assert_eq!(search.path[0].table_id, in_range);
        assert_eq!(search.path[0].outcome, ProbeOutcome::Miss);
        assert!(search.record.is_none());
    }

    #[test]
    fn test_tombstone_hit_stops_the_search() {
        let mut mgr = manager();
        mgr.create(1, vec![Record::put(b"k".to_vec(), b"buried".to_vec(), 1)])
            .unwrap();
        mgr.create(0, vec![Record::tombstone(b"k".to_vec(), 2)])
            .unwrap();

        let search = mgr.search(b"k");
        let record = search.record.unwrap();
        assert!(record.is_tombstone());
        assert_eq!(search.path.len(), 1);
        assert_eq!(search.path[0].outcome, ProbeOutcome::TombstoneHit);
    }

    #[test]
    fn test_miss_path_covers_all_considered_tables() {
        let mut mgr = manager();
        mgr.create(0, vec![Record::put(b"a".to_vec(), b"1".to_vec(), 1)])
            .unwrap();
        mgr.create(0, vec![Record::put(b"b".to_vec(), b"2".to_vec(), 2)])
            .unwrap();
        mgr.create(
            1,
            vec![
                Record::put(b"a".to_vec(), b"old".to_vec(), 3),
                Record::put(b"z".to_vec(), b"3".to_vec(), 4),
            ],
        )
        .unwrap();

        let search = mgr.search(b"nope");
        assert!(search.record.is_none());
        // Both L0 tables plus the in-range L1 table were considered.
        assert_eq!(search.path.len(), 3);
        assert!(search.path.iter().all(|s| s.outcome == ProbeOutcome::Miss));
    }

    #[test]
    fn test_bloom_saved_marked_on_absent_probes() {
        let mut mgr = manager();
        let records: Vec<Record> = (0..100u32)
            .map(|i| Record::put(format!("key{i:03}").into_bytes(), b"v".to_vec(), u64::from(i) + 1))
            .collect();
        mgr.create(0, records).unwrap();

        let mut saved = 0;
        for i in 0..100 {
            let search = mgr.search(format!("zzz{i}").as_bytes());
            if search.path[0].bloom_saved {
                saved += 1;
            }
        }
        assert!(saved > 90, "expected most absent probes to be bloom-saved");
    }
}
