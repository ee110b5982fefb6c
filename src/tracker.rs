//! Per-instance attestation attempt limiting.

use std::collections::HashMap;
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Default number of independently locked shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Result of recording one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// Number of attempts recorded for the instance, including this one
    pub count: u32,
    /// True when `count` is above the configured limit
    pub exceeded: bool,
    /// True when `now` is past the deadline stored for the instance
    pub expired: bool,
}

/// Rate-limiting capability consulted once per attestation.
pub trait AttemptLimiter: Send + Sync {
    /// Records an attempt for `instance_id` and reports whether the limit is
    /// now exceeded.
    ///
    /// `deadline` is stored only when the instance has no record yet. `now`
    /// is used to drop records whose deadline has passed and is compared
    /// against the stored deadline to set [`AttemptOutcome::expired`].
    fn record_attempt(
        &self,
        instance_id: &str,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AttemptOutcome;

    /// Returns the configured maximum number of attempts.
    fn limit(&self) -> u32;
}

#[derive(Debug, Clone, Copy)]
struct AuthAttempt {
    count: u32,
    deadline: DateTime<Utc>,
}

/// Striped in-memory attempt counter.
///
/// Each instance gets a record holding its attempt count and the deadline
/// computed on its first attempt. The count only grows; the deadline is
/// never refreshed. Once the deadline has passed the record may be dropped.
/// Every attempt reports whether it landed after the stored deadline, so a
/// record dropped and recreated after its deadline never yields a fresh
/// allowance.
///
/// Instances hash onto one of several shards, each with its own lock, so the
/// critical section for one instance does not block unrelated instances on
/// other shards.
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use nova_authenticator::{AttemptLimiter, AttemptTracker};
///
/// let tracker = AttemptTracker::new(2);
/// let now = Utc::now();
/// let deadline = now + Duration::minutes(5);
///
/// assert!(!tracker.record_attempt("i-1", deadline, now).exceeded);
/// assert!(!tracker.record_attempt("i-1", deadline, now).exceeded);
/// assert!(tracker.record_attempt("i-1", deadline, now).exceeded);
/// ```
#[derive(Debug)]
pub struct AttemptTracker {
    limit: u32,
    shards: Box<[Mutex<HashMap<String, AuthAttempt>>]>,
    hasher: RandomState,
}

impl AttemptTracker {
    /// Creates a tracker allowing `limit` attempts per instance.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self::with_shards(limit, DEFAULT_SHARDS)
    }

    /// Creates a tracker with an explicit shard count (at least one).
    #[must_use]
    pub fn with_shards(limit: u32, shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            limit,
            shards,
            hasher: RandomState::new(),
        }
    }

    /// Returns the recorded attempt count for an instance, if it has a record.
    #[must_use]
    pub fn attempts(&self, instance_id: &str) -> Option<u32> {
        self.shard(instance_id)
            .lock()
            .get(instance_id)
            .map(|attempt| attempt.count)
    }

    /// Returns the deadline captured on the instance's first attempt.
    #[must_use]
    pub fn deadline(&self, instance_id: &str) -> Option<DateTime<Utc>> {
        self.shard(instance_id)
            .lock()
            .get(instance_id)
            .map(|attempt| attempt.deadline)
    }

    /// Returns the number of instances with a live record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Returns true if no instance has a record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.lock().is_empty())
    }

    /// Drops every record whose deadline is before `now`.
    ///
    /// Returns how many records were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let mut records = shard.lock();
                let before = records.len();
                records.retain(|_, attempt| attempt.deadline >= now);
                before - records.len()
            })
            .sum()
    }

    fn shard(&self, instance_id: &str) -> &Mutex<HashMap<String, AuthAttempt>> {
        // Truncating the hash is fine for picking a shard.
        #[allow(clippy::cast_possible_truncation)]
        let index = self.hasher.hash_one(instance_id) as usize % self.shards.len();
        &self.shards[index]
    }
}

impl AttemptLimiter for AttemptTracker {
    fn record_attempt(
        &self,
        instance_id: &str,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AttemptOutcome {
        let mut records = self.shard(instance_id).lock();

        if !records.contains_key(instance_id) {
            records.retain(|_, attempt| attempt.deadline >= now);
        }

        let attempt = records
            .entry(instance_id.to_string())
            .or_insert(AuthAttempt { count: 0, deadline });
        attempt.count = attempt.count.saturating_add(1);

        AttemptOutcome {
            count: attempt.count,
            exceeded: attempt.count > self.limit,
            expired: now > attempt.deadline,
        }
    }

    fn limit(&self) -> u32 {
        self.limit
    }
}

impl<L: AttemptLimiter + ?Sized> AttemptLimiter for std::sync::Arc<L> {
    fn record_attempt(
        &self,
        instance_id: &str,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AttemptOutcome {
        (**self).record_attempt(instance_id, deadline, now)
    }

    fn limit(&self) -> u32 {
        (**self).limit()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;

    #[test]
    fn counts_up_to_limit_then_exceeds() {
        let tracker = AttemptTracker::new(2);
        let now = Utc::now();
        let deadline = now + Duration::minutes(5);

        let outcomes: Vec<_> = (0..4)
            .map(|_| tracker.record_attempt("i-1", deadline, now))
            .collect();

        assert_eq!(
            outcomes,
            vec![
                AttemptOutcome { count: 1, exceeded: false, expired: false },
                AttemptOutcome { count: 2, exceeded: false, expired: false },
                AttemptOutcome { count: 3, exceeded: true, expired: false },
                AttemptOutcome { count: 4, exceeded: true, expired: false },
            ]
        );
    }

    #[test]
    fn instances_are_counted_separately() {
        let tracker = AttemptTracker::new(1);
        let now = Utc::now();
        let deadline = now + Duration::minutes(5);

        assert!(!tracker.record_attempt("i-1", deadline, now).exceeded);
        assert!(!tracker.record_attempt("i-2", deadline, now).exceeded);
        assert!(tracker.record_attempt("i-1", deadline, now).exceeded);
        assert_eq!(tracker.attempts("i-2"), Some(1));
    }

    #[test]
    fn deadline_is_captured_once() {
        let tracker = AttemptTracker::new(3);
        let now = Utc::now();
        let first = now + Duration::minutes(5);
        let second = now + Duration::minutes(10);

        tracker.record_attempt("i-1", first, now);
        tracker.record_attempt("i-1", second, now);

        assert_eq!(tracker.deadline("i-1"), Some(first));
    }

    #[test]
    fn zero_limit_rejects_first_attempt() {
        let tracker = AttemptTracker::new(0);
        let now = Utc::now();

        assert!(tracker.record_attempt("i-1", now, now).exceeded);
    }

    #[test]
    fn purge_drops_only_expired_records() {
        let tracker = AttemptTracker::new(3);
        let now = Utc::now();

        tracker.record_attempt("old", now - Duration::seconds(1), now - Duration::minutes(1));
        tracker.record_attempt("live", now + Duration::minutes(1), now);

        assert_eq!(tracker.purge_expired(now), 1);
        assert_eq!(tracker.attempts("old"), None);
        assert_eq!(tracker.attempts("live"), Some(1));
    }

    #[test]
    fn new_record_sweeps_expired_neighbours() {
        let tracker = AttemptTracker::with_shards(3, 1);
        let now = Utc::now();

        tracker.record_attempt("old", now, now - Duration::minutes(1));
        tracker.record_attempt("new", now + Duration::minutes(5), now + Duration::seconds(1));

        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.attempts("old"), None);
    }

    #[test]
    fn existing_record_is_not_swept_on_its_own_attempt() {
        let tracker = AttemptTracker::with_shards(3, 1);
        let now = Utc::now();
        let deadline = now + Duration::seconds(1);

        tracker.record_attempt("i-1", deadline, now);
        let outcome = tracker.record_attempt("i-1", deadline, now + Duration::seconds(2));

        assert_eq!(outcome.count, 2);
        assert!(outcome.expired);
    }

    #[test]
    fn attempt_at_deadline_is_not_expired() {
        let tracker = AttemptTracker::new(3);
        let now = Utc::now();

        assert!(!tracker.record_attempt("i-1", now, now).expired);
        assert!(tracker.record_attempt("i-1", now, now + Duration::milliseconds(1)).expired);
    }

    #[test]
    fn recreated_record_past_its_deadline_is_expired() {
        let tracker = AttemptTracker::new(1);
        let now = Utc::now();
        let deadline = now + Duration::seconds(1);
        tracker.record_attempt("i-1", deadline, now);
        tracker.record_attempt("i-1", deadline, now);

        assert_eq!(tracker.purge_expired(now + Duration::seconds(2)), 1);
        let outcome = tracker.record_attempt("i-1", deadline, now + Duration::seconds(2));

        assert_eq!(outcome.count, 1);
        assert!(!outcome.exceeded);
        assert!(outcome.expired);
    }

    #[test]
    fn concurrent_attempts_are_all_counted() {
        let tracker = Arc::new(AttemptTracker::new(1000));
        let now = Utc::now();
        let deadline = now + Duration::minutes(5);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.record_attempt("shared", deadline, now);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.attempts("shared"), Some(800));
    }

    #[test]
    fn empty_tracker() {
        let tracker = AttemptTracker::with_shards(1, 0);

        assert!(tracker.is_empty());
        assert_eq!(tracker.len(), 0);
        assert_eq!(tracker.limit(), 1);
    }
}
