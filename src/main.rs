use anyhow::{anyhow, Context, Result};
use lease_mutex::config::{Config, StoreType};
use lease_mutex::scenario::Scenario;
use lease_mutex::storage::memory::MemoryStore;
use lease_mutex::storage::redis::RedisStore;
use lease_mutex::storage::LeaseStore;
use lease_mutex::worker::run_worker;
use lease_mutex::LockManager;
use log::info;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env();
    info!("Starting lease-mutex with config: {:?}", config);

    let scenario = Scenario::by_index(config.scenario)
        .ok_or_else(|| anyhow!("unknown scenario {}", config.scenario))?;
    info!(
        "Scenario {}: {} (expiry: {:?}, hold: {:?}, tries: {}, max wait: {:?})",
        config.scenario,
        scenario.name,
        scenario.expiry,
        scenario.hold,
        scenario.tries,
        scenario.options().max_wait()
    );

    let store: Arc<dyn LeaseStore> = match config.store_type {
        StoreType::Memory => {
            info!("Using memory store");
            let memory_store = Arc::new(MemoryStore::new());
            let _sweeper =
                memory_store.spawn_sweeper(Duration::from_secs(config.memory_sweep_interval));
            memory_store as Arc<dyn LeaseStore>
        }
        StoreType::Redis => {
            info!("Using Redis store");
            let redis_url = config
                .redis_url
                .as_deref()
                .context("Redis URL not configured")?;
            let redis_store = RedisStore::new(
                redis_url,
                config.redis_username.clone(),
                config.redis_password.clone(),
                config.redis_db,
            )
            .await
            .context("Failed to connect to Redis")?
            .with_prefix(config.lock_key_prefix.clone());
            Arc::new(redis_store) as Arc<dyn LeaseStore>
        }
    };

    let mut handles = Vec::with_capacity(config.workers);
    for index in 0..config.workers {
        if index > 0 && !config.worker_stagger.is_zero() {
            tokio::time::sleep(config.worker_stagger).await;
        }

        let manager = LockManager::new(config.lock_key.clone(), store.clone(), scenario.options())?;
        let hold = scenario.hold;
        handles.push(tokio::spawn(async move {
            let name = format!("worker-{}", index + 1);
            run_worker(&name, &manager, hold).await
        }));
    }

    let mut ran = 0;
    for handle in handles {
        if handle.await.context("worker task failed")?.ran() {
            ran += 1;
        }
    }
    info!("{} of {} workers ran the critical section", ran, config.workers);
    Ok(())
}
