//! Error types shared by the Authorizer and Usage Adjuster binaries.

/// Errors surfaced by the [`crate::store::Store`] trait.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("connection error: {0}")]
	Connection(String),
	#[error("script execution error: {0}")]
	Script(String),
}

impl From<redis::RedisError> for StoreError {
	fn from(err: redis::RedisError) -> Self {
		StoreError::Script(err.to_string())
	}
}

impl From<deadpool_redis::PoolError> for StoreError {
	fn from(err: deadpool_redis::PoolError) -> Self {
		StoreError::Connection(err.to_string())
	}
}

/// The machine-readable deny/refund reasons named in the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
	Success,
	RateExceeded,
	QuotaExceeded,
	InvalidBotToken,
	MissingHttpAttributes,
	RateLimitError,
}

impl Reason {
	pub fn as_code(&self) -> &'static str {
		match self {
			Reason::Success => "success",
			Reason::RateExceeded => "rate_exceeded",
			Reason::QuotaExceeded => "quota_exceeded",
			Reason::InvalidBotToken => "invalid_bot_token",
			Reason::MissingHttpAttributes => "missing_http_attributes",
			Reason::RateLimitError => "rate_limit_error",
		}
	}

	pub fn from_code(code: &str) -> Self {
		match code {
			"success" => Reason::Success,
			"rate_exceeded" => Reason::RateExceeded,
			"quota_exceeded" => Reason::QuotaExceeded,
			"invalid_bot_token" => Reason::InvalidBotToken,
			"missing_http_attributes" => Reason::MissingHttpAttributes,
			_ => Reason::RateLimitError,
		}
	}

	/// `retry-after` seconds hint for a deny, per the error taxonomy table.
	pub fn retry_after(&self) -> Option<u64> {
		match self {
			Reason::RateExceeded => Some(1),
			Reason::QuotaExceeded => Some(3600),
			_ => None,
		}
	}

	pub fn human_message(&self, usage: i64, quota: i64) -> String {
		match self {
			Reason::RateExceeded => {
				"Rate limit exceeded - too many requests per second".to_string()
			}
			Reason::QuotaExceeded => {
				format!("Bot quota exceeded ({usage}/{quota} requests used)")
			}
			Reason::InvalidBotToken => "Invalid or missing bot token in URL".to_string(),
			_ => "Rate limit exceeded".to_string(),
		}
	}
}
