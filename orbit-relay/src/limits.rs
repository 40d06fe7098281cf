//! Per-account bandwidth throttling for relayed frames.
//!
//! ## Design Notes
//!
//! Each rate-limited account owns one token bucket whose burst capacity and
//! refill rate are both the plan's bytes-per-second allowance. Buckets are
//! governor GCRA limiters held in a DashMap keyed by account, so throttling
//! one account never contends with another.
//!
//! Consumption never rejects: the calling task waits until the bytes are
//! admitted. Frames larger than one second of allowance are admitted in
//! capacity-sized installments. A bucket is only rebuilt when a connection
//! adopts a newly resolved rate, never by a frame.

use crate::plans::RateLimit;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use orbit_types::AccountId;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Type alias for a direct (non-keyed) rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket of one account.
struct RateBucket {
    rate: NonZeroU32,
    limiter: DirectLimiter,
}

impl RateBucket {
    fn new(rate: NonZeroU32) -> Self {
        Self {
            rate,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        }
    }
}

/// Per-account bandwidth limiter.
#[derive(Default)]
pub struct BandwidthLimiter {
    buckets: DashMap<AccountId, Arc<RateBucket>>,
}

impl std::fmt::Debug for BandwidthLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BandwidthLimiter")
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

impl BandwidthLimiter {
    /// Create an empty limiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `bytes` may be relayed for `account`, then debit them.
    ///
    /// Returns immediately for unlimited accounts without allocating a bucket.
    pub async fn consume(&self, account: &AccountId, limit: RateLimit, bytes: usize) {
        let RateLimit::BytesPerSecond(rate) = limit else {
            return;
        };

        let bucket = self.bucket(account, rate);
        let capacity = bucket.rate.get() as usize;
        let mut remaining = bytes;

        while remaining > 0 {
            let installment = remaining.min(capacity);
            let Some(cells) = u32::try_from(installment).ok().and_then(NonZeroU32::new) else {
                break;
            };

            // Installments never exceed the burst size, so this cannot fail.
            if let Err(e) = bucket.limiter.until_n_ready(cells).await {
                tracing::error!("Bucket for {} rejected {} bytes: {}", account, installment, e);
                break;
            }

            remaining -= installment;
        }
    }

    /// Number of allocated buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Whether `account` has a bucket.
    pub fn has_bucket(&self, account: &AccountId) -> bool {
        self.buckets.contains_key(account)
    }

    /// Install `limit` as the account's ceiling, replacing a bucket built for another rate.
    ///
    /// Called when a connection resolves its plan. Frames never rebuild a
    /// bucket, so connections holding an older rate cannot reset the burst.
    pub fn adopt(&self, account: &AccountId, limit: RateLimit) {
        let RateLimit::BytesPerSecond(rate) = limit else {
            return;
        };

        match self.buckets.entry(account.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().rate != rate {
                    tracing::debug!(
                        "Rate for {} changed {} -> {} B/s, rebuilding bucket",
                        account,
                        entry.get().rate,
                        rate
                    );
                    entry.insert(Arc::new(RateBucket::new(rate)));
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(RateBucket::new(rate)));
            }
        }
    }

    /// Get or lazily create the account's bucket.
    ///
    /// An existing bucket is kept whatever rate the caller holds.
    fn bucket(&self, account: &AccountId, rate: NonZeroU32) -> Arc<RateBucket> {
        self.buckets
            .entry(account.clone())
            .or_insert_with(|| Arc::new(RateBucket::new(rate)))
            .value()
            .clone()
    }
}
