//! Shapes an authorization decision into the ext_authz wire contract.

use botlimit_core::Reason;
use botlimit_proto::ext_authz::check_response::HttpResponse;
use botlimit_proto::ext_authz::http_status::StatusCode as EnvoyStatusCode;
use botlimit_proto::ext_authz::{
	CheckResponse, DeniedHttpResponse, HeaderValue, HeaderValueOption, HttpStatus, OkHttpResponse,
	Status,
};

/// The response-pass-through headers injected on Allow, per §4.1.
pub struct AllowHeaders {
	pub token: String,
	pub usage: i64,
	pub quota_limit: i64,
	pub rate_limit: i64,
}

fn header(key: &str, value: String) -> HeaderValueOption {
	HeaderValueOption {
		header: Some(HeaderValue {
			key: key.to_string(),
			value,
			raw_value: Vec::new(),
		}),
		append: false,
	}
}

/// Builds the OK response; the proxy is expected to add `headers` both to
/// the forwarded upstream request and, via `response_headers_to_add`, to
/// the final client response.
pub fn allow(headers: AllowHeaders) -> CheckResponse {
	let option_headers = vec![
		header("x-bot-token", headers.token),
		header(
			"x-quota-remaining",
			(headers.quota_limit - headers.usage).to_string(),
		),
		header("x-quota-limit", headers.quota_limit.to_string()),
		header("x-rate-limit", headers.rate_limit.to_string()),
		header("content-type", "application/json".to_string()),
	];

	CheckResponse {
		status: Some(Status {
			code: 0,
			message: String::new(),
		}),
		http_response: Some(HttpResponse::OkResponse(OkHttpResponse {
			headers: option_headers.clone(),
			headers_to_remove: Vec::new(),
			response_headers_to_add: option_headers,
			query_parameters_to_set: Vec::new(),
			query_parameters_to_remove: Vec::new(),
		})),
	}
}

/// Builds a Deny response for `reason`, per the error taxonomy in §7.
pub fn deny(reason: Reason, http_status: u16, usage: i64, quota: i64) -> CheckResponse {
	let status_code = match http_status {
		401 => EnvoyStatusCode::Unauthorized,
		429 => EnvoyStatusCode::TooManyRequests,
		_ => EnvoyStatusCode::InternalServerError,
	};

	let mut headers = vec![header("x-rate-limit-reason", reason.as_code().to_string())];
	if let Some(retry_after) = reason.retry_after() {
		headers.push(header("retry-after", retry_after.to_string()));
	}
	headers.push(header("content-type", "application/json".to_string()));

	let body = serde_json::json!({
		"error": reason.as_code(),
		"message": reason.human_message(usage, quota),
	})
	.to_string();

	CheckResponse {
		status: Some(Status {
			code: 7,
			message: reason.as_code().to_string(),
		}),
		http_response: Some(HttpResponse::DeniedResponse(DeniedHttpResponse {
			status: Some(HttpStatus {
				code: status_code as i32,
			}),
			headers,
			body,
		})),
	}
}
