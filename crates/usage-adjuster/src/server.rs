//! The ext_proc `ExternalProcessor.Process` implementation.

use std::pin::Pin;
use std::sync::Arc;

use botlimit_core::{tenant_from_token, Store};
use botlimit_proto::ext_proc::external_processor_server::ExternalProcessor;
use botlimit_proto::ext_proc::processing_request::Request as RequestVariant;
use botlimit_proto::ext_proc::processing_response::Response as ResponseVariant;
use botlimit_proto::ext_proc::{
	BodyResponse, CommonResponse, CommonResponseStatus, HeaderMap, HeaderMutation, HeaderValue,
	HeaderValueOption, HeadersResponse, ProcessingRequest, ProcessingResponse, TrailersResponse,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::warn;

use crate::correlation::{CorrelationEntry, CorrelationTable};

/// Response statuses for which a request is billable and never refunded.
const PAID_STATUSES: &[u16] = &[200, 201, 202, 204, 206, 304];

pub struct UsageAdjusterService<S> {
	store: Arc<S>,
	correlation: Arc<CorrelationTable>,
}

impl<S> UsageAdjusterService<S> {
	pub fn new(store: Arc<S>, correlation: Arc<CorrelationTable>) -> Self {
		Self { store, correlation }
	}
}

fn find_header<'a>(headers: &'a Option<HeaderMap>, name: &str) -> Option<&'a str> {
	headers
		.as_ref()?
		.headers
		.iter()
		.find(|h| h.key.eq_ignore_ascii_case(name))
		.map(|h| h.value.as_str())
}

fn empty_common_response() -> CommonResponse {
	CommonResponse {
		status: CommonResponseStatus::Continue as i32,
		header_mutation: None,
	}
}

async fn handle_request_headers(
	correlation: &CorrelationTable,
	headers: Option<HeaderMap>,
) -> ProcessingResponse {
	let token = find_header(&headers, "x-bot-token").map(str::to_string);
	let request_id = find_header(&headers, "x-request-id").map(str::to_string);

	if let (Some(token), Some(request_id)) = (token, request_id) {
		if let Some(tenant) = tenant_from_token(&token) {
			correlation.insert(
				request_id,
				CorrelationEntry {
					tenant: tenant.to_string(),
					quota_remaining: find_header(&headers, "x-quota-remaining")
						.unwrap_or_default()
						.to_string(),
					quota_limit: find_header(&headers, "x-quota-limit")
						.unwrap_or_default()
						.to_string(),
					rate_limit: find_header(&headers, "x-rate-limit")
						.unwrap_or_default()
						.to_string(),
				},
			);
		}
	}

	ProcessingResponse {
		response: Some(ResponseVariant::RequestHeaders(HeadersResponse {
			response: Some(empty_common_response()),
		})),
	}
}

fn mirrored_header(key: &str, value: String) -> HeaderValueOption {
	HeaderValueOption {
		header: Some(HeaderValue {
			key: key.to_string(),
			value,
			raw_value: Vec::new(),
		}),
		append: false,
	}
}

async fn handle_response_headers<S: Store>(
	store: &S,
	correlation: &CorrelationTable,
	headers: Option<HeaderMap>,
) -> ProcessingResponse {
	let status: u16 = find_header(&headers, ":status")
		.and_then(|s| s.parse().ok())
		.unwrap_or(200);
	let request_id = find_header(&headers, "x-request-id").unwrap_or_default();

	let entry = correlation.remove(request_id);

	let (quota_remaining, quota_limit, rate_limit) = match &entry {
		Some(entry) => (
			entry.quota_remaining.clone(),
			entry.quota_limit.clone(),
			entry.rate_limit.clone(),
		),
		None => (String::new(), String::new(), String::new()),
	};

	if let Some(entry) = &entry {
		if !PAID_STATUSES.contains(&status) {
			if let Err(err) = store.refund(&entry.tenant, 1).await {
				warn!(error = %err, tenant = %entry.tenant, "refund failed, dropping");
			}
		}
	}

	let header_mutation = HeaderMutation {
		set_headers: vec![
			mirrored_header("x-quota-remaining", quota_remaining),
			mirrored_header("x-quota-limit", quota_limit),
			mirrored_header("x-rate-limit", rate_limit),
		],
		remove_headers: Vec::new(),
	};

	ProcessingResponse {
		response: Some(ResponseVariant::ResponseHeaders(HeadersResponse {
			response: Some(CommonResponse {
				status: CommonResponseStatus::Continue as i32,
				header_mutation: Some(header_mutation),
			}),
		})),
	}
}

pub async fn handle_message<S: Store>(
	store: &S,
	correlation: &CorrelationTable,
	message: ProcessingRequest,
) -> ProcessingResponse {
	match message.request {
		Some(RequestVariant::RequestHeaders(h)) => {
			handle_request_headers(correlation, h.headers).await
		}
		Some(RequestVariant::ResponseHeaders(h)) => {
			handle_response_headers(store, correlation, h.headers).await
		}
		Some(RequestVariant::RequestBody(_)) => ProcessingResponse {
			response: Some(ResponseVariant::RequestBody(BodyResponse {
				response: Some(empty_common_response()),
			})),
		},
		Some(RequestVariant::ResponseBody(_)) => ProcessingResponse {
			response: Some(ResponseVariant::ResponseBody(BodyResponse {
				response: Some(empty_common_response()),
			})),
		},
		Some(RequestVariant::RequestTrailers(_)) => ProcessingResponse {
			response: Some(ResponseVariant::RequestTrailers(TrailersResponse {
				header_mutation: None,
			})),
		},
		Some(RequestVariant::ResponseTrailers(_)) => ProcessingResponse {
			response: Some(ResponseVariant::ResponseTrailers(TrailersResponse {
				header_mutation: None,
			})),
		},
		None => ProcessingResponse { response: None },
	}
}

impl<S> ExternalProcessor for UsageAdjusterService<S>
where
	S: Store + 'static,
{
	type ProcessStream = Pin<Box<dyn tokio_stream::Stream<Item = Result<ProcessingResponse, Status>> + Send>>;

	async fn process(
		&self,
		request: Request<Streaming<ProcessingRequest>>,
	) -> Result<Response<Self::ProcessStream>, Status> {
		let mut inbound = request.into_inner();
		let store = self.store.clone();
		let correlation = self.correlation.clone();
		let (tx, rx) = mpsc::channel(16);

		tokio::spawn(async move {
			loop {
				let message = match inbound.message().await {
					Ok(Some(message)) => message,
					Ok(None) => break,
					Err(err) => {
						warn!(error = %err, "ext_proc stream read error");
						break;
					}
				};
				let response = handle_message(store.as_ref(), &correlation, message).await;
				if tx.send(Ok(response)).await.is_err() {
					break;
				}
			}
		});

		Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
	}
}
