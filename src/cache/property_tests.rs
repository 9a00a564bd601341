//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the page cache invariants over random operation
//! sequences.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::thread::sleep;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::cache::{estimate_size, EvictionStrategy, PageCache, PageQuery};
use crate::config::PageCacheConfig;
use crate::error::CacheError;

// == Test Configuration ==
const TEST_TTL: Duration = Duration::from_secs(300);

fn config(max_entries: usize, max_bytes: usize, strategy: EvictionStrategy) -> PageCacheConfig {
    PageCacheConfig {
        max_entries,
        max_bytes,
        entry_ttl: TEST_TTL,
        eviction_strategy: strategy,
        ..PageCacheConfig::default()
    }
}

// == Strategies ==
fn strategy_strategy() -> impl Strategy<Value = EvictionStrategy> {
    prop_oneof![
        Just(EvictionStrategy::Lru),
        Just(EvictionStrategy::Fifo),
        Just(EvictionStrategy::Lfu),
    ]
}

/// Page payloads of varying size
fn page_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z0-9]{1,24}", 0..12)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Put { page: u32, rows: Vec<String> },
    Get { page: u32 },
    Invalidate { page: u32 },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (0u32..30, page_strategy()).prop_map(|(page, rows)| CacheOp::Put { page, rows }),
        (0u32..30).prop_map(|page| CacheOp::Get { page }),
        (0u32..30).prop_map(|page| CacheOp::Invalidate { page }),
    ]
}

fn query(page: u32) -> PageQuery {
    PageQuery::new("invoices", page, 25)
}

/// Flat filter maps with scalar values
fn filter_strategy() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // After any sequence of puts, occupancy stays within both ceilings
    #[test]
    fn prop_capacity_invariant(
        strategy in strategy_strategy(),
        max_entries in 1usize..10,
        max_bytes in 16usize..400,
        ops in prop::collection::vec(cache_op_strategy(), 1..120)
    ) {
        let mut store = PageCache::new(&config(max_entries, max_bytes, strategy));

        for op in ops {
            match op {
                CacheOp::Put { page, rows } => store.put(&query(page), rows, None),
                CacheOp::Get { page } => { store.get(&query(page)); }
                CacheOp::Invalidate { page } => {
                    store.invalidate(|_, meta| meta.page_number == page);
                }
            }

            let stats = store.stats();
            prop_assert!(stats.total_entries <= max_entries, "{} > {}", stats.total_entries, max_entries);
            prop_assert!(stats.total_bytes <= max_bytes, "{} > {}", stats.total_bytes, max_bytes);
        }
    }

    // Hit and miss counters match what the caller observed
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let mut store = PageCache::new(&config(8, 64 * 1024, EvictionStrategy::Lru));
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Put { page, rows } => store.put(&query(page), rows, None),
                CacheOp::Get { page } => match store.get(&query(page)) {
                    Some(_) => expected_hits += 1,
                    None => expected_misses += 1,
                },
                CacheOp::Invalidate { page } => {
                    store.invalidate(|_, meta| meta.page_number == page);
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.total_entries, store.len(), "Total entries mismatch");
    }

    // Filter insertion order never changes the fingerprint
    #[test]
    fn prop_fingerprint_ignores_key_order(filters in filter_strategy()) {
        let mut unique: Vec<(String, i64)> = Vec::new();
        for (k, v) in filters {
            unique.retain(|(existing, _)| existing != &k);
            unique.push((k, v));
        }

        let base = PageQuery::new("invoices", 1, 20);
        let forward = unique
            .iter()
            .fold(base.clone(), |q, (k, v)| q.with_filter(k.clone(), *v));
        let backward = unique
            .iter()
            .rev()
            .fold(base, |q, (k, v)| q.with_filter(k.clone(), *v));

        let nested_forward: Map<String, Value> =
            unique.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
        let nested_backward: Map<String, Value> =
            unique.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();

        prop_assert_eq!(forward.fingerprint(), backward.fingerprint());
        prop_assert_eq!(
            forward.with_filter("meta", Value::Object(nested_forward)).fingerprint(),
            backward.with_filter("meta", Value::Object(nested_backward)).fingerprint()
        );
    }

    // Evicting under LRU spares a re-read entry
    #[test]
    fn prop_lru_access_tracking(pages in prop::collection::hash_set(0u32..1000, 3..10), extra in 1000u32..2000) {
        let pages: Vec<u32> = pages.into_iter().collect();
        let capacity = pages.len();
        let mut store = PageCache::new(&config(capacity, 1024 * 1024, EvictionStrategy::Lru));

        for page in &pages {
            store.put(&query(*page), vec![page.to_string()], None);
        }

        store.get(&query(pages[0]));
        store.put(&query(extra), vec![extra.to_string()], None);

        prop_assert!(store.contains(&query(pages[0])), "Touched page was evicted");
        prop_assert!(!store.contains(&query(pages[1])), "Oldest untouched page survived");
        prop_assert!(store.contains(&query(extra)));
        prop_assert_eq!(store.len(), capacity);
    }

    // Byte accounting always equals the sum of resident sizes
    #[test]
    fn prop_byte_accounting(rows in prop::collection::vec(page_strategy(), 1..40)) {
        let mut store = PageCache::new(&config(5, 1024, EvictionStrategy::Fifo));
        let mut distinct = HashSet::new();

        for (i, page) in rows.into_iter().enumerate() {
            let q = query((i % 7) as u32);
            distinct.insert(q.fingerprint());
            store.put(&q, page, None);
        }

        let expected: usize = distinct
            .iter()
            .filter_map(|key| store.peek(key))
            .map(|entry| entry.size_bytes)
            .sum();
        prop_assert_eq!(store.total_bytes(), expected);
    }
}

// Fewer cases for the time-sensitive expiry check
proptest! {
    #![proptest_config(ProptestConfig::with_cases(5))]

    #[test]
    fn prop_ttl_expiration(page in 0u32..100, rows in page_strategy()) {
        let mut cfg = config(10, 64 * 1024, EvictionStrategy::Lru);
        cfg.entry_ttl = Duration::from_millis(50);
        let mut store = PageCache::new(&cfg);

        store.put(&query(page), rows.clone(), None);
        prop_assert_eq!(store.get(&query(page)), Some(rows));

        sleep(Duration::from_millis(80));

        prop_assert_eq!(store.get(&query(page)), None);
        prop_assert!(store.is_empty(), "Expired entry should be dropped on read");
        prop_assert_eq!(store.stats().expirations, 1);
    }
}

// Error responses carry the message in an "error" field
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_error_response_format(message in "[a-zA-Z0-9 ]{1,40}", variant in 0usize..3) {
        let (error, expected_status) = match variant {
            0 => (CacheError::NotFound(message.clone()), StatusCode::NOT_FOUND),
            1 => (CacheError::InvalidRequest(message.clone()), StatusCode::BAD_REQUEST),
            _ => (CacheError::Internal(message.clone()), StatusCode::INTERNAL_SERVER_ERROR),
        };
        let expected_text = error.to_string();

        let response = error.into_response();
        prop_assert_eq!(response.status(), expected_status);

        let rt = tokio::runtime::Runtime::new().unwrap();
        let body = rt.block_on(async {
            axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
        });
        let json: Value = serde_json::from_slice(&body).unwrap();

        prop_assert_eq!(json["error"].as_str(), Some(expected_text.as_str()));
        prop_assert!(expected_text.contains(&message));
    }
}

#[test]
fn test_estimate_size_is_json_length() {
    assert_eq!(estimate_size(&vec!["ab".to_string()]), r#"["ab"]"#.len());
}
