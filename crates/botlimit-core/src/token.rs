//! Bot token extraction from the inbound request path.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches `/bot<digits>:<token-chars>/...` and captures the tenant id and
/// the full token (`<digits>:<token-chars>`). The endpoint suffix after the
/// token is intentionally not captured; this system never reads it.
static BOT_TOKEN_RE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^/bot((?P<tenant>[0-9]+):[A-Za-z0-9_-]+)(?:/|$)").unwrap());

/// A bot token extracted from a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotToken {
	/// The full captured token, e.g. `42:XYZ`.
	pub token: String,
	/// The tenant identifier, the digits before the first colon.
	pub tenant: String,
}

/// Extracts the bot token from a request path, per the wire URL format
/// `/bot<digits>:<token-chars>/<endpoint...>`.
pub fn extract(path: &str) -> Option<BotToken> {
	let caps = BOT_TOKEN_RE.captures(path)?;
	let tenant = caps.name("tenant")?.as_str().to_string();
	let token = caps.get(1)?.as_str().to_string();
	Some(BotToken { token, tenant })
}

/// Extracts just the tenant identifier from a full token of the form
/// `<digits>:<secret>`, as stored by the Authorizer in outbound headers and
/// read back by the Usage Adjuster.
pub fn tenant_from_token(token: &str) -> Option<&str> {
	token.split_once(':').map(|(tenant, _)| tenant)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_tenant_and_token() {
		let bot = extract("/bot42:XYZ/getMe").unwrap();
		assert_eq!(bot.tenant, "42");
		assert_eq!(bot.token, "42:XYZ");
	}

	#[test]
	fn accepts_empty_endpoint() {
		let bot = extract("/bot123:TOKEN/").unwrap();
		assert_eq!(bot.tenant, "123");
		assert_eq!(bot.token, "123:TOKEN");
	}

	#[test]
	fn accepts_bare_token_with_no_trailing_slash() {
		let bot = extract("/bot123:TOKEN").unwrap();
		assert_eq!(bot.tenant, "123");
	}

	#[test]
	fn rejects_non_numeric_id() {
		assert!(extract("/botABC/foo").is_none());
	}

	#[test]
	fn rejects_missing_secret() {
		assert!(extract("/bot123:/foo").is_none());
	}

	#[test]
	fn tenant_from_token_splits_on_colon() {
		assert_eq!(tenant_from_token("42:XYZ"), Some("42"));
		assert_eq!(tenant_from_token("garbage"), None);
	}
}
