//! Environment-variable configuration, read once at process startup.

use std::env;
use std::str::FromStr;

/// Redis connectivity mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisMode {
	Standalone,
	Cluster,
}

impl FromStr for RedisMode {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"standalone" => Ok(RedisMode::Standalone),
			"cluster" => Ok(RedisMode::Cluster),
			other => anyhow::bail!("invalid REDIS_MODE {other} (expected standalone|cluster)"),
		}
	}
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
	pub addr: String,
	pub mode: RedisMode,
	pub cluster_addrs: Vec<String>,
	pub password: Option<String>,
}

impl RedisConfig {
	pub fn from_env() -> anyhow::Result<Self> {
		let mode = parse_default("REDIS_MODE", RedisMode::Standalone)?;
		let cluster_addrs = parse::<String>("REDIS_CLUSTER_ADDRS")?
			.map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
			.unwrap_or_default();
		Ok(Self {
			addr: parse_default("REDIS_ADDR", "localhost:6379".to_string())?,
			mode,
			cluster_addrs,
			password: parse("REDIS_PASSWORD")?,
		})
	}

	/// A `redis://` connection URL for the configured single-node address.
	pub fn connection_url(&self) -> String {
		match &self.password {
			Some(password) => format!("redis://:{password}@{}", self.addr),
			None => format!("redis://{}", self.addr),
		}
	}
}

#[derive(Debug, Clone)]
pub struct AuthorizerConfig {
	pub redis: RedisConfig,
	pub grpc_port: String,
}

impl AuthorizerConfig {
	pub fn from_env() -> anyhow::Result<Self> {
		Ok(Self {
			redis: RedisConfig::from_env()?,
			grpc_port: parse_default("GRPC_PORT", ":9001".to_string())?,
		})
	}
}

#[derive(Debug, Clone)]
pub struct UsageAdjusterConfig {
	pub redis: RedisConfig,
	pub grpc_port: String,
}

impl UsageAdjusterConfig {
	pub fn from_env() -> anyhow::Result<Self> {
		Ok(Self {
			redis: RedisConfig::from_env()?,
			grpc_port: parse_default("GRPC_PORT", ":9002".to_string())?,
		})
	}
}

fn parse<T: FromStr>(env: &str) -> anyhow::Result<Option<T>>
where
	<T as FromStr>::Err: ToString,
{
	match env::var(env) {
		Ok(val) => val
			.parse()
			.map(Some)
			.map_err(|e: <T as FromStr>::Err| {
				anyhow::anyhow!("invalid env var {}={} ({})", env, val, e.to_string())
			}),
		Err(_) => Ok(None),
	}
}

fn parse_default<T: FromStr>(env: &str, default: T) -> anyhow::Result<T>
where
	<T as FromStr>::Err: ToString,
{
	parse(env).map(|v| v.unwrap_or(default))
}
