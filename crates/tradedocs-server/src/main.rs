//! Trade document registry backend.
//!
//! Wires together the store, the registry ledger client, the job queues,
//! the event reconciler, and the HTTP API, then runs until interrupted.

mod api;
mod auth;
mod config;
mod error;
mod jobs;
mod rate_limit;
mod reconciler;
mod state;

#[cfg(test)]
mod testutil;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tradedocs_ledger::{DocumentLedger, RpcLedger};
use tradedocs_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::jobs::JobQueues;
use crate::rate_limit::RateLimiter;
use crate::reconciler::Reconciler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tradedocs_server=debug")),
        )
        .init();

    let config = Arc::new(ServerConfig::from_env());
    info!(instance = %config.instance_name, "starting");

    let database = match &config.database_path {
        Some(path) => Database::open_at(path)
            .with_context(|| format!("opening database at {}", path.display()))?,
        None => Database::new().context("opening default database")?,
    };
    let db = state::shared(database);

    let rpc = RpcLedger::new(config.ledger_rpc_url.clone());
    let gas_refresher = rpc.spawn_gas_refresher();
    let ledger: Arc<dyn DocumentLedger> = Arc::new(rpc);

    let queues = Arc::new(JobQueues::start(db.clone(), ledger.clone()));
    let (live, backfill) = Reconciler::new(db.clone(), ledger).spawn();

    let rate_limiter = RateLimiter::default();
    let purger = {
        let limiter = rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5 * 60));
            loop {
                interval.tick().await;
                limiter.purge_stale(10.0 * 60.0).await;
            }
        })
    };

    let app_state = AppState {
        db,
        queues,
        config,
        rate_limiter,
    };

    tokio::select! {
        result = api::serve(app_state) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    gas_refresher.abort();
    live.abort();
    backfill.abort();
    purger.abort();

    Ok(())
}
