//! Per-mode distribution cache.
//!
//! Groups a table's outcomes by exact payout, precomputes odds and
//! per-bucket slices, and serves paginated reads. Entries move
//! absent -> generating -> ready; generation runs off the request path and
//! any weight write or watcher reload invalidates the mode.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::LookupTable;

const DEFAULT_PAGE_LIMIT: usize = 100;
const MAX_PAGE_LIMIT: usize = 500;
/// At most this many sim_ids are kept per payout group.
const MAX_SIM_IDS: usize = 10;

/// A payout range used for distribution grouping (not a constraint bucket).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PayoutBucket {
    pub range_start: f64,
    pub range_end: f64,
}

/// One distinct payout value with its aggregate weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionItem {
    /// Payout as a bet multiplier, rounded to 2 decimals.
    pub payout: f64,
    pub weight: u64,
    /// Human-readable odds, e.g. "1 in 1250".
    pub odds: String,
    /// Number of outcomes sharing this payout.
    pub count: usize,
    pub sim_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct CachedDistribution {
    pub items: Vec<DistributionItem>,
    pub by_bucket: HashMap<String, Vec<DistributionItem>>,
    pub buckets: Vec<PayoutBucket>,
    pub total_weight: u64,
    pub max_payout: f64,
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketDistributionResponse {
    pub range_start: f64,
    pub range_end: f64,
    pub items: Vec<DistributionItem>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

/// Concurrent per-mode cache of precomputed distributions.
#[derive(Default)]
pub struct DistributionCache {
    cache: RwLock<HashMap<String, Arc<CachedDistribution>>>,
    /// Guards against duplicate concurrent generations.
    generating: Mutex<HashSet<String>>,
}

impl DistributionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ready entry for a mode, or None.
    pub fn get(&self, mode: &str) -> Option<Arc<CachedDistribution>> {
        self.cache.read().get(mode).cloned()
    }

    pub fn is_generating(&self, mode: &str) -> bool {
        self.generating.lock().contains(mode)
    }

    /// Paginated slice of one precomputed bucket. None until the mode's
    /// entry is ready.
    pub fn get_bucket_items(
        &self,
        mode: &str,
        range_start: f64,
        range_end: f64,
        offset: usize,
        limit: usize,
    ) -> Option<BucketDistributionResponse> {
        let cached = self.get(mode)?;
        if !cached.ready {
            return None;
        }

        let limit = if limit == 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            limit.min(MAX_PAGE_LIMIT)
        };

        let key = bucket_key(range_start, range_end);
        let Some(items) = cached.by_bucket.get(&key) else {
            return Some(BucketDistributionResponse {
                range_start,
                range_end,
                items: Vec::new(),
                total: 0,
                offset,
                limit,
                has_more: false,
            });
        };

        let total = items.len();
        let offset = offset.min(total);
        let end = (offset + limit).min(total);

        Some(BucketDistributionResponse {
            range_start,
            range_end,
            items: items[offset..end].to_vec(),
            total,
            offset,
            limit,
            has_more: end < total,
        })
    }

    /// Kick off background generation unless one is already in flight.
    pub fn generate_async(
        self: Arc<Self>,
        mode: &str,
        table: Arc<LookupTable>,
        buckets: Vec<PayoutBucket>,
    ) {
        {
            let mut generating = self.generating.lock();
            if !generating.insert(mode.to_string()) {
                debug!(mode, "distribution generation already in flight");
                return;
            }
        }

        let mode = mode.to_string();
        tokio::spawn(async move {
            self.generate(&mode, &table, buckets);
            self.generating.lock().remove(&mode);
        });
    }

    /// Synchronous generation; `generate_async` is the usual entry point.
    pub fn generate(&self, mode: &str, table: &LookupTable, buckets: Vec<PayoutBucket>) {
        let total_weight = table.total_weight();
        if total_weight == 0 || table.outcomes.is_empty() {
            return;
        }

        let max_payout = table.max_payout_cents() as f64 / 100.0;

        // Group outcomes by exact payout in cents.
        struct Group {
            weight: u64,
            sim_ids: Vec<i64>,
        }
        let mut groups: HashMap<u64, Group> = HashMap::new();
        for outcome in &table.outcomes {
            let group = groups.entry(outcome.payout_cents).or_insert(Group {
                weight: 0,
                sim_ids: Vec::new(),
            });
            group.weight += outcome.weight;
            group.sim_ids.push(outcome.sim_id);
        }

        let mut items: Vec<DistributionItem> = groups
            .into_iter()
            .map(|(cents, group)| {
                let odds = total_weight as f64 / group.weight as f64;
                let count = group.sim_ids.len();
                let mut sim_ids = group.sim_ids;
                sim_ids.truncate(MAX_SIM_IDS);
                DistributionItem {
                    payout: round2(cents as f64 / 100.0),
                    weight: group.weight,
                    odds: format_odds(odds),
                    count,
                    sim_ids,
                }
            })
            .collect();
        items.sort_by(|a, b| b.payout.total_cmp(&a.payout));

        let max_range_end = buckets
            .iter()
            .map(|b| b.range_end)
            .fold(0.0f64, f64::max);

        let mut by_bucket = HashMap::with_capacity(buckets.len());
        for bucket in &buckets {
            let bucket_items: Vec<DistributionItem> = items
                .iter()
                .filter(|item| {
                    if bucket.range_start == 0.0 && bucket.range_end == 0.0 {
                        // Zero bucket: exact losses only.
                        item.payout == 0.0
                    } else if bucket.range_end >= max_range_end * 0.99 {
                        // Terminal bucket is right-closed.
                        item.payout >= bucket.range_start
                    } else {
                        item.payout >= bucket.range_start && item.payout < bucket.range_end
                    }
                })
                .cloned()
                .collect();
            by_bucket.insert(bucket_key(bucket.range_start, bucket.range_end), bucket_items);
        }

        let cached = Arc::new(CachedDistribution {
            items,
            by_bucket,
            buckets,
            total_weight,
            max_payout,
            ready: true,
        });

        self.cache.write().insert(mode.to_string(), cached);
        info!(mode, "distribution generated");
    }

    pub fn invalidate(&self, mode: &str) {
        self.cache.write().remove(mode);
        debug!(mode, "distribution invalidated");
    }

    pub fn invalidate_all(&self) {
        self.cache.write().clear();
    }
}

fn bucket_key(range_start: f64, range_end: f64) -> String {
    format!("{range_start:.2}-{range_end:.2}")
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn format_odds(odds: f64) -> String {
    if odds < 100.0 {
        format!("1 in {odds:.2}")
    } else {
        format!("1 in {odds:.0}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Outcome;

    fn table() -> Arc<LookupTable> {
        // Two 5x outcomes, one 20x, many losses.
        let mut outcomes = vec![
            Outcome::new(0, 500, 10),
            Outcome::new(1, 500, 30),
            Outcome::new(2, 2000, 10),
        ];
        for i in 3..15 {
            outcomes.push(Outcome::new(i, 0, 100));
        }
        Arc::new(LookupTable::new("base", 1.0, outcomes))
    }

    fn buckets() -> Vec<PayoutBucket> {
        vec![
            PayoutBucket { range_start: 0.0, range_end: 0.0 },
            PayoutBucket { range_start: 0.01, range_end: 10.0 },
            PayoutBucket { range_start: 10.0, range_end: 25.0 },
        ]
    }

    #[test]
    fn generation_groups_by_payout_and_sorts_descending() {
        let cache = DistributionCache::new();
        cache.generate("base", &table(), buckets());

        let cached = cache.get("base").unwrap();
        assert!(cached.ready);
        assert_eq!(cached.items.len(), 3); // 20x, 5x, 0x
        assert_eq!(cached.items[0].payout, 20.0);
        assert_eq!(cached.items[1].payout, 5.0);
        assert_eq!(cached.items[1].weight, 40);
        assert_eq!(cached.items[1].count, 2);
    }

    #[test]
    fn sim_ids_are_truncated_to_ten() {
        let cache = DistributionCache::new();
        cache.generate("base", &table(), buckets());

        let cached = cache.get("base").unwrap();
        let losses = cached.items.last().unwrap();
        assert_eq!(losses.count, 12);
        assert_eq!(losses.sim_ids.len(), 10);
    }

    #[test]
    fn zero_bucket_matches_only_losses() {
        let cache = DistributionCache::new();
        cache.generate("base", &table(), buckets());

        let response = cache.get_bucket_items("base", 0.0, 0.0, 0, 0).unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.items[0].payout, 0.0);
    }

    #[test]
    fn terminal_bucket_is_right_closed() {
        let cache = DistributionCache::new();
        cache.generate("base", &table(), buckets());

        // 20.0 sits exactly on the last bucket's range and must be included.
        let response = cache.get_bucket_items("base", 10.0, 25.0, 0, 0).unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.items[0].payout, 20.0);
    }

    #[test]
    fn pagination_clamps_offset_and_limit() {
        let cache = DistributionCache::new();
        cache.generate("base", &table(), buckets());

        let response = cache
            .get_bucket_items("base", 0.01, 10.0, 999, 9999)
            .unwrap();
        assert_eq!(response.offset, response.total);
        assert!(response.items.is_empty());
        assert!(!response.has_more);
        assert_eq!(response.limit, MAX_PAGE_LIMIT);

        let default_limit = cache.get_bucket_items("base", 0.01, 10.0, 0, 0).unwrap();
        assert_eq!(default_limit.limit, DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn unknown_bucket_returns_empty_response() {
        let cache = DistributionCache::new();
        cache.generate("base", &table(), buckets());

        let response = cache.get_bucket_items("base", 77.0, 88.0, 0, 0).unwrap();
        assert_eq!(response.total, 0);
        assert!(response.items.is_empty());
    }

    #[test]
    fn invalidate_empties_the_entry() {
        let cache = DistributionCache::new();
        cache.generate("base", &table(), buckets());
        assert!(cache.get("base").is_some());

        cache.invalidate("base");
        assert!(cache.get("base").is_none());

        cache.generate("base", &table(), buckets());
        cache.invalidate_all();
        assert!(cache.get("base").is_none());
    }

    #[tokio::test]
    async fn generate_async_is_single_flight_and_completes() {
        let cache = Arc::new(DistributionCache::new());
        let t = table();

        cache.clone().generate_async("base", t.clone(), buckets());
        // Second call while the flag is held is a no-op.
        cache.clone().generate_async("base", t.clone(), buckets());

        // Wait for the background task to land.
        for _ in 0..50 {
            if cache.get("base").is_some() && !cache.is_generating("base") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let cached = cache.get("base").expect("generation completed");
        assert!(cached.ready);
        assert_eq!(cached.buckets, buckets());
        assert_eq!(cached.total_weight, t.total_weight());
    }
}
