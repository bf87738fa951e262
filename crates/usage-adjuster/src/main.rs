mod correlation;
mod server;

use std::sync::Arc;

use botlimit_core::config::{RedisMode, UsageAdjusterConfig};
use botlimit_core::{telemetry, RedisStore};
use botlimit_proto::ext_proc::external_processor_server::ExternalProcessorServer;
use tonic::transport::Server;
use tracing::{info, warn};

use crate::correlation::CorrelationTable;
use crate::server::UsageAdjusterService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	telemetry::init();

	let config = UsageAdjusterConfig::from_env()?;
	let addr = parse_listen_addr(&config.grpc_port)?;

	if config.redis.mode == RedisMode::Cluster {
		warn!(
			addrs = %config.redis.cluster_addrs.join(","),
			"REDIS_MODE=cluster is recognized but not wired into connection routing: \
			 the refund script only ever touches a single usage:{{T}} key so cluster \
			 routing would be safe, but this process has no code path that opens a \
			 cluster-aware connection yet, so it falls back to REDIS_ADDR as a single node"
		);
	}

	let redis_cfg = deadpool_redis::Config::from_url(config.redis.connection_url());
	let pool = redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
	let mut conn = pool.get().await?;
	redis::cmd("PING").query_async::<String>(&mut conn).await?;
	drop(conn);

	let store = Arc::new(RedisStore::new(pool));
	let correlation = Arc::new(CorrelationTable::new());
	let service = UsageAdjusterService::new(store, correlation);

	info!(%addr, "usage-adjuster listening");
	Server::builder()
		.add_service(ExternalProcessorServer::new(service))
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
