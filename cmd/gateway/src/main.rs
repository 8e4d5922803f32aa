use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use gateway_rpc::cache::CacheStore;
use gateway_rpc::clients::{GrpcConsensusClient, HttpArchiveClient};
use gateway_rpc::config::{GatewayConfig, IpRateLimitStore};
use gateway_rpc::context::AppContext;
use gateway_rpc::ratelimit::{LruRateLimitStore, RateLimitConfig, RateLimitStore, RateLimitWindow};
use gateway_rpc::registry::MethodRegistry;
use gateway_rpc::server;
use gateway_rpc::services::{debug, eth, net, web3};
use gateway_rpc::subscriptions::{ConnectionLimiter, SubscriptionRuntime};

/// All day-to-day configuration lives in the environment (see
/// [`GatewayConfig::from_env`]); the CLI only covers the one thing an
/// operator might reasonably want to override per-invocation rather than
/// per-deployment.
#[derive(Parser)]
#[command(name = "gateway", version, about = "Ethereum JSON-RPC gateway")]
struct Cli {
    /// Overrides HTTP_ADDR for this run without touching the environment.
    #[arg(long, env = "GATEWAY_HTTP_ADDR")]
    http_addr: Option<String>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = GatewayConfig::from_env()?;
    if let Some(http_addr) = cli.http_addr {
        config.http_addr = http_addr;
    }
    tracing::info!(chain_id = config.chain_id, http_addr = %config.http_addr, "starting gateway");

    let archive = Arc::new(HttpArchiveClient::new(
        config.archive_base_url.clone(),
        config.archive_timeout,
        config.archive_max_retries,
    ));
    let consensus = Arc::new(GrpcConsensusClient::new(config.consensus_endpoint.clone()));
    let subscriptions = Arc::new(SubscriptionRuntime::new(
        config.ws_polling_interval,
        config.ws_cache_ttl,
        config.ws_subscription_limit,
        config.ws_same_sub_for_same_event,
    ));
    let connection_limiter = Arc::new(ConnectionLimiter::new(
        config.ws_connection_limit,
        config.ws_connection_limit_per_ip,
    ));

    let rate_limiter: Arc<dyn RateLimitStore> = match config.ip_rate_limit_store {
        IpRateLimitStore::Redis => {
            let url = config
                .redis_url
                .clone()
                .ok_or_else(|| eyre::eyre!("IP_RATE_LIMIT_STORE=REDIS requires REDIS_URL"))?;
            let store = gateway_rpc::ratelimit::RedisRateLimitStore::connect(
                &url,
                config.redis_reconnect_delay,
                config.limit_duration,
            )
            .await?;
            Arc::new(store)
        }
        IpRateLimitStore::Lru => Arc::new(LruRateLimitStore::new(config.limit_duration)),
    };

    let (eth_ops, eth_cache_configs) = eth::operations(
        archive.clone(),
        consensus.clone(),
        subscriptions.clone(),
        config.chain_id,
        config.cache_ttl,
        config.subscriptions_enabled,
        config.ws_new_heads_enabled,
    );
    let registry = Arc::new(MethodRegistry::build(vec![
        ("eth", eth_ops),
        ("net", net::operations(config.chain_id)),
        ("web3", web3::operations(&config.client_version)),
        (
            "debug",
            debug::operations(archive.clone(), config.debug_api_enabled),
        ),
    ]));

    let mut cache_configs = HashMap::new();
    for (method, cache_config) in eth_cache_configs {
        cache_configs.insert(method.to_string(), cache_config);
    }

    let rate_limit_config = RateLimitConfig {
        disabled: config.rate_limit_disabled,
        default_limit: config.default_rate_limit,
        window: RateLimitWindow {
            duration: config.limit_duration,
        },
        overrides: HashMap::new(),
    };

    let http_addr = config.http_addr.parse()?;

    let context = AppContext {
        cache: Arc::new(CacheStore::new(config.cache_max)),
        cache_configs: Arc::new(cache_configs),
        rate_limiter,
        rate_limit_config: Arc::new(rate_limit_config),
        connection_limiter,
        subscriptions,
        archive,
        consensus,
        registry,
        config: Arc::new(config),
    };

    server::serve(context, http_addr).await?;
    Ok(())
}
