//! The ext_authz `Authorization.Check` implementation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use botlimit_core::{extract_bot_token, Reason, Store};
use botlimit_proto::ext_authz::authorization_server::Authorization;
use botlimit_proto::ext_authz::{CheckRequest, CheckResponse};
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use crate::response::{self, AllowHeaders};

pub struct AuthorizerService<S> {
	store: Arc<S>,
}

impl<S> AuthorizerService<S> {
	pub fn new(store: Arc<S>) -> Self {
		Self { store }
	}
}

fn current_unix_second() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs() as i64)
		.unwrap_or(0)
}

impl<S> Authorization for AuthorizerService<S>
where
	S: Store + 'static,
{
	async fn check(
		&self,
		request: Request<CheckRequest>,
	) -> Result<Response<CheckResponse>, Status> {
		let req = request.into_inner();

		let Some(path) = req
			.attributes
			.as_ref()
			.and_then(|attrs| attrs.request.as_ref())
			.and_then(|r| r.http.as_ref())
			.map(|http| http.path.as_str())
		else {
			debug!("check request missing http attributes");
			return Ok(Response::new(response::deny(
				Reason::MissingHttpAttributes,
				401,
				0,
				0,
			)));
		};

		let Some(bot_token) = extract_bot_token(path) else {
			debug!(path, "no bot token in path");
			return Ok(Response::new(response::deny(
				Reason::InvalidBotToken,
				401,
				0,
				0,
			)));
		};

		let now = current_unix_second();
		let decision = match self.store.authorize(&bot_token.tenant, now, 1).await {
			Ok(decision) => decision,
			Err(err) => {
				warn!(error = %err, tenant = %bot_token.tenant, "store error during authorization");
				return Ok(Response::new(response::deny(
					Reason::RateLimitError,
					500,
					0,
					0,
				)));
			}
		};

		if decision.allowed {
			Ok(Response::new(response::allow(AllowHeaders {
				token: bot_token.token,
				usage: decision.usage,
				quota_limit: decision.quota,
				rate_limit: decision.rate_limit,
			})))
		} else {
			let http_status = match decision.reason {
				Reason::RateExceeded | Reason::QuotaExceeded => 429,
				Reason::InvalidBotToken | Reason::MissingHttpAttributes => 401,
				_ => 500,
			};
			Ok(Response::new(response::deny(
				decision.reason,
				http_status,
				decision.usage,
				decision.quota,
			)))
		}
	}
}
