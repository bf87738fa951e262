//! The request-id → tenant correlation table described in §3 and §9.
//!
//! Entries are created on request-headers and consumed (looked up and
//! removed) on response-headers. Concurrent streams insert and remove
//! disjoint keys in practice, but the table must tolerate concurrent
//! access from arbitrarily many streams regardless.

/// State captured at request-headers time and mirrored back onto the
/// response at response-headers time.
#[derive(Debug, Clone)]
pub struct CorrelationEntry {
	pub tenant: String,
	pub quota_remaining: String,
	pub quota_limit: String,
	pub rate_limit: String,
}

pub struct CorrelationTable {
	inner: flurry::HashMap<String, CorrelationEntry>,
}

impl CorrelationTable {
	pub fn new() -> Self {
		Self {
			inner: flurry::HashMap::new(),
		}
	}

	pub fn insert(&self, request_id: String, entry: CorrelationEntry) {
		let guard = self.inner.guard();
		self.inner.insert(request_id, entry, &guard);
	}

	/// Looks up and evicts the entry for `request_id`, bounding the
	/// table's memory to in-flight requests.
	pub fn remove(&self, request_id: &str) -> Option<CorrelationEntry> {
		let guard = self.inner.guard();
		let entry = self.inner.get(request_id, &guard).cloned();
		self.inner.remove(request_id, &guard);
		entry
	}
}

impl Default for CorrelationTable {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn insert_then_remove_returns_the_entry() {
		let table = CorrelationTable::new();
		table.insert(
			"req-1".to_string(),
			CorrelationEntry {
				tenant: "42".to_string(),
				quota_remaining: "1".to_string(),
				quota_limit: "3".to_string(),
				rate_limit: "2".to_string(),
			},
		);

		let entry = table.remove("req-1").unwrap();
		assert_eq!(entry.tenant, "42");
		assert!(table.remove("req-1").is_none());
	}

	#[test]
	fn missing_entry_is_not_an_error() {
		let table = CorrelationTable::new();
		assert!(table.remove("never-seen").is_none());
	}
}
