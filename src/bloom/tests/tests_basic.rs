#[cfg(test)]
mod tests {
    use crate::bloom::BloomFilter;

    #[test]
    fn test_add_and_contain() {
        let mut filter = BloomFilter::new(100, 0.01);

        filter.add(b"apple");
        filter.add(b"orange");

        assert!(filter.may_contain(b"apple"));
        assert!(filter.may_contain(b"orange"));
        assert_eq!(filter.inserted(), 2);
    }

    #[test]
    fn test_empty_filter_rejects_everything() {
        let filter = BloomFilter::new(100, 0.01);

        assert!(!filter.may_contain(b"anything"));
        assert_eq!(filter.fill_ratio(), 0.0);
        assert_eq!(filter.theoretical_fpr(), 0.0);
    }

    #[test]
    fn test_zero_expected_entries_gets_minimal_geometry() {
        let filter = BloomFilter::new(0, 0.01);

        assert_eq!(filter.num_bits(), 64);
        assert_eq!(filter.num_hashes(), 1);
        assert!(!filter.may_contain(b"key"));
    }

    #[test]
    fn test_no_false_negatives() {
        let mut filter = BloomFilter::new(1000, 0.01);

        let keys: Vec<Vec<u8>> = (0..1000)
            .map(|i| format!("key{i}").into_bytes())
            .collect();
        for key in &keys {
            filter.add(key);
        }

        for key in &keys {
            assert!(
                filter.may_contain(key),
                "false negative for {:?}",
                String::from_utf8_lossy(key)
            );
        }
    }

    #[test]
    fn test_geometry_derivation() {
        let filter = BloomFilter::new(1000, 0.01);

        // m = -1000 * ln(0.01) / ln(2)^2 ≈ 9586 bits, k = ceil(m/n * ln 2) ≈ 7.
        assert!(filter.num_bits() >= 9586);
        assert!(filter.num_bits() < 9586 + 64);
        assert_eq!(filter.num_hashes(), 7);
    }

    #[test]
    fn test_fill_ratio_grows_monotonically() {
        let mut filter = BloomFilter::new(100, 0.01);
        let mut previous = 0.0;

        for i in 0..100 {
            filter.add(format!("key{i}").as_bytes());
            let ratio = filter.fill_ratio();
            assert!(ratio >= previous);
            previous = ratio;
        }

        assert!(previous > 0.0 && previous < 1.0);
    }

    #[test]
    fn test_stats_snapshot() {
        let mut filter = BloomFilter::new(100, 0.01);
        filter.add(b"a");
        filter.add(b"b");

        let stats = filter.stats();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.num_bits, filter.num_bits());
        assert_eq!(stats.num_hashes, filter.num_hashes());
        assert!(stats.bits_set > 0);
        assert!(stats.fill_ratio > 0.0);
        assert!(stats.theoretical_fpr > 0.0);
    }
}
