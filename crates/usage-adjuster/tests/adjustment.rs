//! Exercises the request/response-headers handling against an in-memory
//! store, covering the refund scenarios from the testable-properties
//! section.

use std::sync::Arc;

use botlimit_core::MemoryStore;
use botlimit_proto::ext_proc::processing_request::Request as RequestVariant;
use botlimit_proto::ext_proc::processing_response::Response as ResponseVariant;
use botlimit_proto::ext_proc::{HeaderMap, HeaderValue, HttpHeaders, ProcessingRequest};

#[path = "../src/correlation.rs"]
mod correlation;
#[path = "../src/server.rs"]
mod server;

use correlation::CorrelationTable;

fn headers(pairs: &[(&str, &str)]) -> ProcessingRequest {
	ProcessingRequest {
		observability_mode: false,
		request: Some(RequestVariant::RequestHeaders(HttpHeaders {
			headers: Some(HeaderMap {
				headers: pairs
					.iter()
					.map(|(k, v)| HeaderValue {
						key: k.to_string(),
						value: v.to_string(),
						raw_value: Vec::new(),
					})
					.collect(),
			}),
			end_of_stream: false,
		})),
	}
}

fn response_headers(pairs: &[(&str, &str)]) -> ProcessingRequest {
	let mut req = headers(pairs);
	if let Some(RequestVariant::RequestHeaders(h)) = req.request.take() {
		req.request = Some(RequestVariant::ResponseHeaders(h));
	}
	req
}

async fn run(store: &MemoryStore, correlation: &CorrelationTable, req: ProcessingRequest) -> botlimit_proto::ext_proc::ProcessingResponse {
	server::handle_message(store, correlation, req).await
}

#[tokio::test]
async fn refunds_on_non_paid_status() {
	let store = MemoryStore::new();
	store.set_rate_limit("42", 10);
	store.set_quota("42", 10);
	store.authorize("42", 1, 1).await.unwrap();
	let correlation = CorrelationTable::new();

	run(
		&store,
		&correlation,
		headers(&[
			("x-bot-token", "42:XYZ"),
			("x-request-id", "req-1"),
			("x-quota-remaining", "1"),
			("x-quota-limit", "10"),
			("x-rate-limit", "10"),
		]),
	)
	.await;

	run(
		&store,
		&correlation,
		response_headers(&[(":status", "502"), ("x-request-id", "req-1")]),
	)
	.await;

	assert_eq!(store.usage("42"), 0);
}

#[tokio::test]
async fn does_not_refund_on_paid_status() {
	let store = MemoryStore::new();
	store.set_rate_limit("42", 10);
	store.set_quota("42", 10);
	store.authorize("42", 1, 1).await.unwrap();
	let correlation = CorrelationTable::new();

	run(
		&store,
		&correlation,
		headers(&[("x-bot-token", "42:XYZ"), ("x-request-id", "req-1")]),
	)
	.await;

	run(
		&store,
		&correlation,
		response_headers(&[(":status", "304"), ("x-request-id", "req-1")]),
	)
	.await;

	assert_eq!(store.usage("42"), 1);
}

#[tokio::test]
async fn missing_correlation_entry_mirrors_empty_headers_without_erroring() {
	let store = MemoryStore::new();
	let correlation = CorrelationTable::new();

	let resp = run(
		&store,
		&correlation,
		response_headers(&[(":status", "500"), ("x-request-id", "never-seen")]),
	)
	.await;

	match resp.response {
		Some(ResponseVariant::ResponseHeaders(h)) => {
			let mutation = h.response.unwrap().header_mutation.unwrap();
			assert_eq!(mutation.set_headers.len(), 3);
			for set in mutation.set_headers {
				assert_eq!(set.header.unwrap().value, "");
			}
		}
		other => panic!("unexpected response: {other:?}"),
	}
}

#[tokio::test]
async fn missing_status_defaults_to_200_and_is_treated_as_paid() {
	let store = MemoryStore::new();
	store.set_rate_limit("42", 10);
	store.set_quota("42", 10);
	store.authorize("42", 1, 1).await.unwrap();
	let correlation = CorrelationTable::new();

	run(
		&store,
		&correlation,
		headers(&[("x-bot-token", "42:XYZ"), ("x-request-id", "req-1")]),
	)
	.await;

	run(
		&store,
		&correlation,
		response_headers(&[("x-request-id", "req-1")]),
	)
	.await;

	assert_eq!(store.usage("42"), 1);
}
