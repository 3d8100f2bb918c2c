use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use solana_sdk::signature::read_keypair_file;
use solana_sdk::signer::Signer;
use tracing::{info, warn};

use solana_swap_engine::config::Config;
use solana_swap_engine::engine::Engine;
use solana_swap_engine::monitor::{Executor, Monitor};
use solana_swap_engine::price::PriceClient;
use solana_swap_engine::store::PositionStore;
use solana_swap_engine::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load local .env if present (no-op in prod/systemd envs)
    let _ = dotenvy::dotenv();

    telemetry::init_tracing();

    let cfg = Config::from_env()?;
    info!(
        rpc = %cfg.rpc_http_url,
        jupiter = %cfg.jupiter_base_url,
        relay = cfg.jito_engine_url.as_deref().unwrap_or(""),
        allow_unbundled_tip = cfg.allow_unbundled_tip,
        database = %cfg.database_path,
        price_check_ms = cfg.price_check_delay_ms,
        "boot"
    );

    let store = Arc::new(
        PositionStore::open(&cfg.database_path)
            .with_context(|| format!("opening {}", cfg.database_path))?,
    );

    let executor = match cfg.sol_keypair_path.as_deref() {
        Some(path) => {
            let signer = read_keypair_file(path).map_err(|e| anyhow!("reading keypair {path}: {e}"))?;
            info!(wallet = %signer.pubkey(), "wallet.loaded");
            Some(Executor {
                engine: Engine::from_config(&cfg)?,
                signer: Box::new(signer),
                settings: cfg.default_settings(),
            })
        }
        None => {
            warn!("SOL_KEYPAIR_PATH not set; exits are reported but not executed");
            None
        }
    };

    let prices = Arc::new(PriceClient::new(cfg.price_api_url.clone(), cfg.price_api_key.clone()));
    let monitor = Monitor::new(
        store,
        prices,
        executor,
        Duration::from_millis(cfg.price_check_delay_ms),
    );

    tokio::select! {
        res = monitor.run() => res?,
        _ = tokio::signal::ctrl_c() => info!("shutdown"),
    }
    Ok(())
}
