//! Service wiring and lifecycle.
//!
//! Startup order matters: the loader's first pass completes before the
//! executer and scheduler start, so neither ever reads an unpopulated cache.
//! One cancellation token governs every loop; SIGINT/SIGTERM cancels it, the
//! HTTP server drains, and the queue client is closed on the way out.

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::handlers;
use super::middleware::{self, AuthConfig};
use super::AppState;
use crate::audit::NoopAudit;
use crate::cache::JobsCache;
use crate::config::{self, Config};
use crate::error::{Error, ErrorCode};
use crate::executer::Executer;
use crate::kv::KvRepository;
use crate::loader::Loader;
use crate::lock::RedisLocker;
use crate::metrics::Metrics;
use crate::queue::{JobQueue, RedisQueue};
use crate::repository::Repository;
use crate::runner;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Serialize)]
pub struct ApiVersion {
    pub version: String,
    pub githash: String,
    pub buildstamp: String,
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            githash: option_env!("MINION_GITHASH").unwrap_or("unknown").to_string(),
            buildstamp: option_env!("MINION_BUILDSTAMP").unwrap_or("unknown").to_string(),
        }
    }
}

/// Build and run the whole service until a shutdown signal arrives.
pub async fn serve(config: Config) -> Result<(), Error> {
    let instance_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(id = %instance_id, org = %config.org, "starting api server");

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    let cache = Arc::new(JobsCache::new());
    let metrics = Arc::new(Metrics::new());

    let repository = KvRepository::new(&config.org, &config.jobs_repository).await?;
    let queue = RedisQueue::new(&config.org, &config.queue_provider).await?;
    let locker = RedisLocker::new(&config.org, &config.lock_provider).await?;
    let runners = Arc::new(runner::new_registry(&config.job_runners)?);

    let accounts: Arc<HashMap<_, _>> = Arc::new(config.accounts.clone());
    let account_names: Vec<String> = accounts.keys().cloned().collect();

    let refresh_interval = config::parse_duration(&config.jobs_repository.refresh_interval)?;

    // Load jobs from durable storage into the local cache before anything
    // else can look at it.
    let loader = Loader::new(
        instance_id.clone(),
        account_names,
        Arc::clone(&cache),
        repository.clone(),
        refresh_interval,
    );
    loader.start(shutdown.clone()).await?;

    // Pop and execute jobs from the queue.
    let executer = Executer::new(
        instance_id.clone(),
        Arc::clone(&cache),
        queue.clone(),
        Arc::clone(&runners),
        config.on_retry_exhaustion,
        Arc::clone(&metrics),
    );
    executer.start(shutdown.clone());

    // Race for the minute lock and enqueue due jobs.
    let scheduler = Scheduler::new(
        instance_id.clone(),
        Arc::clone(&cache),
        locker,
        queue.clone(),
        Arc::clone(&metrics),
    );
    scheduler.start(shutdown.clone());

    if config.log_provider.is_some() {
        tracing::warn!("logProvider configured but no audit shipper is built in, using no-op");
    }

    let state = AppState {
        accounts,
        repository,
        queue: queue.clone(),
        runners,
        audit: Arc::new(NoopAudit),
        metrics,
        version: Arc::new(ApiVersion::default()),
    };

    let app = router(
        state,
        AuthConfig {
            token: config.token.clone(),
        },
    );

    let addr = bind_address(config.listen_address());
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        Error::with_cause(
            ErrorCode::ServiceUnavailable,
            format!("failed to bind {addr}"),
            e,
        )
    })?;
    tracing::info!(%addr, "starting listener");

    let drain = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { drain.cancelled().await })
        .await
        .map_err(|e| Error::with_cause(ErrorCode::InternalError, "http server failed", e))?;

    shutdown.cancel();
    queue.close().await?;
    tracing::info!(id = %instance_id, "api server stopped");
    Ok(())
}

/// Assemble the `/v1/minion` router with auth and deadline layers.
pub fn router<R: Repository, Q: JobQueue>(state: AppState<R, Q>, auth: AuthConfig) -> Router {
    let api = Router::new()
        .route("/ping", get(handlers::ping))
        .route("/version", get(handlers::version::<R, Q>))
        .route("/metrics", get(handlers::metrics::<R, Q>))
        .route("/{account}/jobs", get(handlers::jobs_list::<R, Q>))
        .route(
            "/{account}/jobs/{group}",
            get(handlers::jobs_list_group::<R, Q>)
                .post(handlers::jobs_create::<R, Q>)
                .delete(handlers::jobs_delete_group::<R, Q>),
        )
        .route(
            "/{account}/jobs/{group}/{id}",
            get(handlers::jobs_show::<R, Q>)
                .put(handlers::jobs_update::<R, Q>)
                .delete(handlers::jobs_delete::<R, Q>)
                .patch(handlers::jobs_run::<R, Q>),
        );

    Router::new()
        .nest("/v1/minion", api)
        .layer(axum::middleware::from_fn_with_state(
            auth,
            middleware::token_auth,
        ))
        .layer(axum::middleware::from_fn(middleware::request_deadline))
        .with_state(state)
}

fn bind_address(listen: &str) -> String {
    if let Some(port) = listen.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        listen.to_string()
    }
}

/// Resolves on SIGINT or, on unix, SIGTERM, so container orchestrators
/// trigger a clean drain.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm => {}
    }
}
