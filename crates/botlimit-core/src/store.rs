//! The shared key-value store abstraction and its two backends.
//!
//! [`Store::authorize`] and [`Store::refund`] are the only entry points the
//! Authorizer and Usage Adjuster use; both are required to be atomic with
//! respect to concurrent callers for the same tenant; see the data model's
//! key families and invariants.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use redis::Script;

use crate::error::{Reason, StoreError};

/// Outcome of an [`Store::authorize`] call; mirrors the 6-tuple the
/// authorize script returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthDecision {
	pub allowed: bool,
	pub reason: Reason,
	pub usage: i64,
	pub quota: i64,
	pub counter: i64,
	pub rate_limit: i64,
}

/// Outcome of a [`Store::refund`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundOutcome {
	pub refunded: bool,
	pub usage: i64,
}

/// The atomic operations the Authorizer and Usage Adjuster perform against
/// the key-value store.
#[allow(async_fn_in_trait)]
pub trait Store: Send + Sync {
	/// Atomically evaluate and reserve one unit of rate and quota for
	/// `tenant` at unix-second `now`, per §4.1 of the authorization
	/// algorithm.
	async fn authorize(&self, tenant: &str, now: i64, cost: i64) -> Result<AuthDecision, StoreError>;

	/// Atomically refund `cost` units of usage for `tenant`, floored at
	/// zero, per §4.2's refund algorithm.
	async fn refund(&self, tenant: &str, cost: i64) -> Result<RefundOutcome, StoreError>;
}

/// `KEYS = [rate_limit:{T}, counter:{T}:{S}, usage:{T}, quota:{T}]`,
/// `ARGV = [cost]`.
///
/// Returns `{allowed, reason, usage, quota, counter, rate_limit}`. Absence
/// of `rate_limit:{T}` or `quota:{T}` denies unconditionally (no default
/// grants); rate is checked and charged before quota, per the ordering
/// note in the authorization algorithm.
const AUTHORIZE_SCRIPT: &str = r#"
local rate_limit_raw = redis.call('GET', KEYS[1])
if not rate_limit_raw then
  return {0, 'rate_exceeded', 0, 0, 0, 0}
end
local rate_limit = tonumber(rate_limit_raw)

local quota_raw = redis.call('GET', KEYS[4])
if not quota_raw then
  return {0, 'quota_exceeded', 0, 0, 0, rate_limit}
end
local quota = tonumber(quota_raw)

local cost = tonumber(ARGV[1])
local counter = tonumber(redis.call('GET', KEYS[2]) or '0')

if counter + cost > rate_limit then
  local usage = tonumber(redis.call('GET', KEYS[3]) or '0')
  return {0, 'rate_exceeded', usage, quota, counter, rate_limit}
end

counter = redis.call('INCRBY', KEYS[2], cost)
redis.call('EXPIRE', KEYS[2], 1)

local usage = tonumber(redis.call('GET', KEYS[3]) or '0')
if usage + cost > quota then
  return {0, 'quota_exceeded', usage, quota, counter, rate_limit}
end

usage = redis.call('INCRBY', KEYS[3], cost)
return {1, 'success', usage, quota, counter, rate_limit}
"#;

/// `KEYS = [usage:{T}]`, `ARGV = [cost]`.
///
/// Returns `{refunded, usage}`. A missing key refunds nothing; the result
/// is floored at zero so an already-exhausted usage counter never goes
/// negative.
const REFUND_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return {0, 0}
end
local usage = tonumber(redis.call('GET', KEYS[1]))
local cost = tonumber(ARGV[1])
local new_usage = usage - cost
if new_usage < 0 then
  new_usage = 0
end
redis.call('SET', KEYS[1], new_usage)
return {1, new_usage}
"#;

static AUTHORIZE: Lazy<Script> = Lazy::new(|| Script::new(AUTHORIZE_SCRIPT));
static REFUND: Lazy<Script> = Lazy::new(|| Script::new(REFUND_SCRIPT));

/// Redis-backed [`Store`]. Scripts are loaded lazily and cached server-side
/// by SHA1 digest through `redis::Script`'s `EVALSHA`/`EVAL` fallback.
pub struct RedisStore {
	pool: deadpool_redis::Pool,
}

impl RedisStore {
	pub fn new(pool: deadpool_redis::Pool) -> Self {
		Self { pool }
	}
}

impl Store for RedisStore {
	async fn authorize(&self, tenant: &str, now: i64, cost: i64) -> Result<AuthDecision, StoreError> {
		let mut conn = self.pool.get().await?;
		let (allowed, reason, usage, quota, counter, rate_limit): (i64, String, i64, i64, i64, i64) =
			AUTHORIZE
				.key(format!("rate_limit:{tenant}"))
				.key(format!("counter:{tenant}:{now}"))
				.key(format!("usage:{tenant}"))
				.key(format!("quota:{tenant}"))
				.arg(cost)
				.invoke_async(&mut conn)
				.await?;
		Ok(AuthDecision {
			allowed: allowed == 1,
			reason: Reason::from_code(&reason),
			usage,
			quota,
			counter,
			rate_limit,
		})
	}

	async fn refund(&self, tenant: &str, cost: i64) -> Result<RefundOutcome, StoreError> {
		let mut conn = self.pool.get().await?;
		let (refunded, usage): (i64, i64) = REFUND
			.key(format!("usage:{tenant}"))
			.arg(cost)
			.invoke_async(&mut conn)
			.await?;
		Ok(RefundOutcome {
			refunded: refunded == 1,
			usage,
		})
	}
}

/// In-process reimplementation of the same two scripts' semantics, used by
/// the test suites in `authorizer` and `usage-adjuster` so they can assert
/// against the data model's invariants without a running Redis.
#[derive(Default)]
pub struct MemoryStore {
	inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
	rate_limit: HashMap<String, i64>,
	quota: HashMap<String, i64>,
	usage: HashMap<String, i64>,
	counters: HashMap<(String, i64), i64>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_rate_limit(&self, tenant: &str, value: i64) {
		self.inner
			.lock()
			.unwrap()
			.rate_limit
			.insert(tenant.to_string(), value);
	}

	pub fn set_quota(&self, tenant: &str, value: i64) {
		self.inner
			.lock()
			.unwrap()
			.quota
			.insert(tenant.to_string(), value);
	}

	pub fn usage(&self, tenant: &str) -> i64 {
		*self.inner.lock().unwrap().usage.get(tenant).unwrap_or(&0)
	}

	/// Simulates TTL expiry: drops the counter for `(tenant, second)`, as
	/// Redis would once the 1 s key expires.
	pub fn expire_counter(&self, tenant: &str, second: i64) {
		self.inner
			.lock()
			.unwrap()
			.counters
			.remove(&(tenant.to_string(), second));
	}
}

impl Store for MemoryStore {
	async fn authorize(&self, tenant: &str, now: i64, cost: i64) -> Result<AuthDecision, StoreError> {
		let mut state = self.inner.lock().unwrap();

		let Some(&rate_limit) = state.rate_limit.get(tenant) else {
			return Ok(AuthDecision {
				allowed: false,
				reason: Reason::RateExceeded,
				usage: 0,
				quota: 0,
				counter: 0,
				rate_limit: 0,
			});
		};

		let Some(&quota) = state.quota.get(tenant) else {
			return Ok(AuthDecision {
				allowed: false,
				reason: Reason::QuotaExceeded,
				usage: 0,
				quota: 0,
				counter: 0,
				rate_limit,
			});
		};

		let counter_key = (tenant.to_string(), now);
		let counter = *state.counters.get(&counter_key).unwrap_or(&0);
		if counter + cost > rate_limit {
			let usage = *state.usage.get(tenant).unwrap_or(&0);
			return Ok(AuthDecision {
				allowed: false,
				reason: Reason::RateExceeded,
				usage,
				quota,
				counter,
				rate_limit,
			});
		}
		let counter = counter + cost;
		state.counters.insert(counter_key, counter);

		let usage = *state.usage.get(tenant).unwrap_or(&0);
		if usage + cost > quota {
			return Ok(AuthDecision {
				allowed: false,
				reason: Reason::QuotaExceeded,
				usage,
				quota,
				counter,
				rate_limit,
			});
		}
		let usage = usage + cost;
		state.usage.insert(tenant.to_string(), usage);

		Ok(AuthDecision {
			allowed: true,
			reason: Reason::Success,
			usage,
			quota,
			counter,
			rate_limit,
		})
	}

	async fn refund(&self, tenant: &str, cost: i64) -> Result<RefundOutcome, StoreError> {
		let mut state = self.inner.lock().unwrap();
		let Some(usage) = state.usage.get(tenant).copied() else {
			return Ok(RefundOutcome {
				refunded: false,
				usage: 0,
			});
		};
		let new_usage = (usage - cost).max(0);
		state.usage.insert(tenant.to_string(), new_usage);
		Ok(RefundOutcome {
			refunded: true,
			usage: new_usage,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn denies_with_no_provisioning() {
		let store = MemoryStore::new();
		let decision = store.authorize("99", 1000, 1).await.unwrap();
		assert!(!decision.allowed);
		assert_eq!(decision.reason, Reason::RateExceeded);
	}

	#[tokio::test]
	async fn allows_exactly_rate_limit_requests_per_second() {
		let store = MemoryStore::new();
		store.set_rate_limit("42", 2);
		store.set_quota("42", 10);

		let first = store.authorize("42", 1000, 1).await.unwrap();
		let second = store.authorize("42", 1000, 1).await.unwrap();
		let third = store.authorize("42", 1000, 1).await.unwrap();

		assert!(first.allowed && second.allowed);
		assert!(!third.allowed);
		assert_eq!(third.reason, Reason::RateExceeded);
		assert_eq!(first.usage, 1);
		assert_eq!(second.usage, 2);
	}

	#[tokio::test]
	async fn denies_quota_exceeded_without_consuming_usage() {
		let store = MemoryStore::new();
		store.set_rate_limit("42", 10);
		store.set_quota("42", 2);

		store.authorize("42", 1, 1).await.unwrap();
		store.authorize("42", 2, 1).await.unwrap();
		let third = store.authorize("42", 3, 1).await.unwrap();

		assert!(!third.allowed);
		assert_eq!(third.reason, Reason::QuotaExceeded);
		assert_eq!(store.usage("42"), 2);
	}

	#[tokio::test]
	async fn refund_floors_at_zero() {
		let store = MemoryStore::new();
		store.set_rate_limit("42", 10);
		store.set_quota("42", 10);
		store.authorize("42", 1, 1).await.unwrap();

		let first = store.refund("42", 1).await.unwrap();
		let second = store.refund("42", 1).await.unwrap();

		assert_eq!(first.usage, 0);
		assert!(second.refunded);
		assert_eq!(second.usage, 0);
	}

	#[tokio::test]
	async fn refund_of_unprovisioned_tenant_is_a_noop() {
		let store = MemoryStore::new();
		let outcome = store.refund("7", 1).await.unwrap();
		assert!(!outcome.refunded);
		assert_eq!(outcome.usage, 0);
	}

	#[tokio::test]
	async fn counter_expiry_resets_the_rate_window() {
		let store = MemoryStore::new();
		store.set_rate_limit("42", 1);
		store.set_quota("42", 10);

		store.authorize("42", 1, 1).await.unwrap();
		store.expire_counter("42", 1);
		let next_second = store.authorize("42", 2, 1).await.unwrap();

		assert!(next_second.allowed);
	}
}
