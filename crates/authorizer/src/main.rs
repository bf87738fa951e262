mod response;
mod server;

use std::sync::Arc;

use botlimit_core::config::{AuthorizerConfig, RedisMode};
use botlimit_core::{telemetry, RedisStore};
use botlimit_proto::ext_authz::authorization_server::AuthorizationServer;
use tonic::transport::Server;
use tracing::{info, warn};

use crate::server::AuthorizerService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	telemetry::init();

	let config = AuthorizerConfig::from_env()?;
	let addr = parse_listen_addr(&config.grpc_port)?;

	if config.redis.mode == RedisMode::Cluster {
		warn!(
			addrs = %config.redis.cluster_addrs.join(","),
			"REDIS_MODE=cluster is recognized but not wired into connection routing: \
			 the dual-key authorize script requires all of its keys on one slot, which \
			 this system's plain key names (no hash tags) cannot guarantee across a real \
			 cluster, so this process connects to REDIS_ADDR as a single node regardless"
		);
	}

	let redis_cfg = deadpool_redis::Config::from_url(config.redis.connection_url());
	let pool = redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
	// Fail fast: a store we cannot reach at startup means we cannot serve.
	let mut conn = pool.get().await?;
	redis::cmd("PING").query_async::<String>(&mut conn).await?;
	drop(conn);

	let store = Arc::new(RedisStore::new(pool));
	let service = AuthorizerService::new(store);

	info!(%addr, "authorizer listening");
	Server::builder()
		.add_service(AuthorizationServer::new(service))
		.serve(addr)
		.await?;

	Ok(())
}

fn parse_listen_addr(grpc_port: &str) -> anyhow::Result<std::net::SocketAddr> {
	let normalized = if let Some(port) = grpc_port.strip_prefix(':') {
		format!("0.0.0.0:{port}")
	} else {
		grpc_port.to_string()
	};
	normalized
		.parse()
		.map_err(|e| anyhow::anyhow!("invalid GRPC_PORT {grpc_port}: {e}"))
}
