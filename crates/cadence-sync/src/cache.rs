//! Occurrence cache with TTL and capacity limits.
//!
//! Expansion is pure, so its result can be reused for the same
//! `(rule, from, to)` until the entry expires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_core::{InvalidRuleError, RecurrenceRule, expand};
use chrono::NaiveDate;
use tracing::{debug, trace};

/// Identifies one expansion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpansionKey {
    pub rule: RecurrenceRule,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl ExpansionKey {
    pub fn new(rule: &RecurrenceRule, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            rule: rule.clone(),
            from,
            to,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    dates: Arc<[NaiveDate]>,
    /// Monotonic expiry.
    expires_at: Instant,
}

impl CacheEntry {
    fn new(dates: Arc<[NaiveDate]>, ttl: Duration) -> Self {
        Self {
            dates,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Expanded occurrences keyed by rule and range.
#[derive(Debug)]
pub struct OccurrenceCache {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<ExpansionKey, CacheEntry>,
}

impl Default for OccurrenceCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(600), 256)
    }
}

impl OccurrenceCache {
    /// A cache holding at most `capacity` expansions, each for `ttl`.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: HashMap::new(),
        }
    }

    /// Cached occurrences for `key`, if present and not expired.
    pub fn get(&self, key: &ExpansionKey) -> Option<Arc<[NaiveDate]>> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.dates.clone())
    }

    /// Stores `dates` for `key`, evicting to stay within capacity.
    pub fn insert(&mut self, key: ExpansionKey, dates: Arc<[NaiveDate]>) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_expired();
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        debug!(from = %key.from, to = %key.to, count = dates.len(), "Cached expansion");
        self.entries.insert(key, CacheEntry::new(dates, self.ttl));
    }

    /// Returns the cached expansion for the range, expanding and caching on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRuleError`] if the rule or range is invalid. Errors are
    /// not cached.
    pub fn get_or_expand(
        &mut self,
        rule: &RecurrenceRule,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Arc<[NaiveDate]>, InvalidRuleError> {
        let key = ExpansionKey::new(rule, from, to);
        if let Some(dates) = self.get(&key) {
            trace!(%from, %to, "Expansion cache hit");
            return Ok(dates);
        }
        let dates: Arc<[NaiveDate]> = expand(rule, from, to)?.into();
        self.insert(key, dates.clone());
        Ok(dates)
    }

    /// Removes all expired entries and returns how many were dropped.
    pub fn evict_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let keep = !entry.is_expired();
            if !keep {
                trace!(from = %key.from, to = %key.to, "Evicting expired expansion");
            }
            keep
        });
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted, "Evicted expired expansions");
        }
        evicted
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        debug!(count, "Cleared expansion cache");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn daily() -> RecurrenceRule {
        RecurrenceRule::daily(date(2024, 1, 1))
    }

    #[test]
    fn miss_then_hit_shares_the_expansion() {
        let mut cache = OccurrenceCache::new(Duration::from_secs(60), 8);
        let first = cache.get_or_expand(&daily(), date(2024, 1, 1), date(2024, 1, 8)).unwrap();
        assert_eq!(first.len(), 7);
        assert_eq!(cache.len(), 1);

        let second = cache.get_or_expand(&daily(), date(2024, 1, 1), date(2024, 1, 8)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn different_rule_or_range_is_a_different_entry() {
        let mut cache = OccurrenceCache::new(Duration::from_secs(60), 8);
        cache.get_or_expand(&daily(), date(2024, 1, 1), date(2024, 1, 8)).unwrap();
        cache.get_or_expand(&daily(), date(2024, 1, 1), date(2024, 1, 9)).unwrap();
        cache
            .get_or_expand(&daily().with_interval(2), date(2024, 1, 1), date(2024, 1, 8))
            .unwrap();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn errors_are_not_cached() {
        let mut cache = OccurrenceCache::default();
        let result = cache.get_or_expand(&daily(), date(2024, 2, 1), date(2024, 1, 1));
        assert!(matches!(result, Err(InvalidRuleError::InvertedRange { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn entries_expire() {
        let mut cache = OccurrenceCache::new(Duration::from_millis(50), 8);
        let key = ExpansionKey::new(&daily(), date(2024, 1, 1), date(2024, 1, 3));
        cache.insert(key.clone(), Arc::from(vec![date(2024, 1, 1), date(2024, 1, 2)]));
        assert!(cache.get(&key).is_some());

        thread::sleep(Duration::from_millis(60));
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.evict_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut cache = OccurrenceCache::new(Duration::from_secs(60), 2);
        for end in [2, 3, 4] {
            cache.get_or_expand(&daily(), date(2024, 1, 1), date(2024, 1, end)).unwrap();
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&ExpansionKey::new(&daily(), date(2024, 1, 1), date(2024, 1, 2))).is_none());
        assert!(cache.get(&ExpansionKey::new(&daily(), date(2024, 1, 1), date(2024, 1, 4))).is_some());
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let mut cache = OccurrenceCache::new(Duration::from_secs(60), 0);
        let dates = cache.get_or_expand(&daily(), date(2024, 1, 1), date(2024, 1, 4)).unwrap();
        assert_eq!(dates.len(), 3);
        assert!(cache.is_empty());

        cache.clear();
        assert!(cache.is_empty());
    }
}
