//! Job catalog handlers plus the public ping/version/metrics endpoints.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::audit::Tag;
use crate::error::{Error, ErrorCode};
use crate::job::Job;
use crate::queue::{JobQueue, QueuedJob};
use crate::repository::{join_key, Repository};
use crate::rollback::Rollback;

/// Audit logs are retained for 90 days.
const LOG_RETENTION_DAYS: i64 = 90;

#[derive(Deserialize)]
pub struct JobInput {
    pub job: Option<Job>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Serialize)]
pub struct JobResponse {
    pub job: Job,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

pub async fn ping() -> &'static str {
    "pong"
}

pub async fn version<R: Repository, Q: JobQueue>(
    State(state): State<AppState<R, Q>>,
) -> impl IntoResponse {
    Json(state.version.as_ref().clone())
}

pub async fn metrics<R: Repository, Q: JobQueue>(
    State(state): State<AppState<R, Q>>,
) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// GET `/{account}/jobs` and `/{account}/jobs/{group}`.
pub async fn jobs_list<R: Repository, Q: JobQueue>(
    State(state): State<AppState<R, Q>>,
    Path(account): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    list_jobs(&state, &account, "").await
}

pub async fn jobs_list_group<R: Repository, Q: JobQueue>(
    State(state): State<AppState<R, Q>>,
    Path((account, group)): Path<(String, String)>,
) -> Result<Json<Vec<String>>, ApiError> {
    list_jobs(&state, &account, &group).await
}

async fn list_jobs<R: Repository, Q: JobQueue>(
    state: &AppState<R, Q>,
    account: &str,
    group: &str,
) -> Result<Json<Vec<String>>, ApiError> {
    require_account(state, account)?;
    tracing::info!(account, group, "listing jobs from repository");
    let list = state.repository.list(account, group).await?;
    Ok(Json(list))
}

/// POST `/{account}/jobs/{group}`.
pub async fn jobs_create<R: Repository, Q: JobQueue>(
    State(state): State<AppState<R, Q>>,
    Path((account, group)): Path<(String, String)>,
    body: Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    require_account(&state, &account)?;
    let input = decode_input(body.0)?;
    let mut job = input
        .job
        .ok_or_else(|| Error::new(ErrorCode::BadRequest, "job cannot be empty"))?;
    job.account = account.clone();
    job.group = group.clone();

    tracing::info!(account, group, "creating job");

    let job = state.repository.create(&account, &group, job).await?;

    let mut rollback = Rollback::new();
    {
        let repository = state.repository.clone();
        let (account, group, id) = (account.clone(), group.clone(), job.id.clone());
        rollback.defer(move || async move { repository.delete(&account, &group, &id).await });
    }

    if let Err(e) = state
        .audit
        .create_log(&group, &job.id, LOG_RETENTION_DAYS, &input.tags)
        .await
    {
        rollback.abort().await;
        return Err(Error::with_cause(
            ErrorCode::InternalError,
            "failed creating job audit log",
            e,
        )
        .into());
    }

    rollback.commit();
    Ok(Json(JobResponse {
        job,
        tags: input.tags,
    }))
}

/// GET `/{account}/jobs/{group}/{id}`.
pub async fn jobs_show<R: Repository, Q: JobQueue>(
    State(state): State<AppState<R, Q>>,
    Path((account, group, id)): Path<(String, String, String)>,
) -> Result<Json<JobResponse>, ApiError> {
    require_account(&state, &account)?;
    tracing::info!(account, group, id, "showing job from repository");
    let job = state.repository.get(&account, &group, &id).await?;
    Ok(Json(JobResponse {
        job,
        tags: Vec::new(),
    }))
}

/// PUT `/{account}/jobs/{group}/{id}`.
pub async fn jobs_update<R: Repository, Q: JobQueue>(
    State(state): State<AppState<R, Q>>,
    Path((account, group, id)): Path<(String, String, String)>,
    body: Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    require_account(&state, &account)?;
    let input = decode_input(body.0)?;
    let mut job = input
        .job
        .ok_or_else(|| Error::new(ErrorCode::BadRequest, "job cannot be empty"))?;
    job.id = id.clone();
    job.account = account.clone();
    job.group = group.clone();

    tracing::info!(account, group, id, "updating job");

    // Make sure the job exists before overwriting it.
    state.repository.get(&account, &group, &id).await?;
    let job = state.repository.update(&account, &group, &id, job).await?;

    state
        .audit
        .update_log(&group, LOG_RETENTION_DAYS, &input.tags)
        .await
        .map_err(|e| {
            Error::with_cause(ErrorCode::InternalError, "failed updating job audit log", e)
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobResponse {
            job,
            tags: input.tags,
        }),
    ))
}

/// DELETE `/{account}/jobs/{group}`: the whole group, capped.
pub async fn jobs_delete_group<R: Repository, Q: JobQueue>(
    State(state): State<AppState<R, Q>>,
    Path((account, group)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    require_account(&state, &account)?;
    tracing::info!(account, group, "deleting job group from repository");
    state.repository.delete(&account, &group, "").await?;
    Ok((StatusCode::ACCEPTED, "OK"))
}

/// DELETE `/{account}/jobs/{group}/{id}`.
pub async fn jobs_delete<R: Repository, Q: JobQueue>(
    State(state): State<AppState<R, Q>>,
    Path((account, group, id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    require_account(&state, &account)?;
    tracing::info!(account, group, id, "deleting job from repository");
    state.repository.delete(&account, &group, &id).await?;
    Ok((StatusCode::ACCEPTED, "OK"))
}

/// PATCH `/{account}/jobs/{group}/{id}`: enqueue the job right now.
pub async fn jobs_run<R: Repository, Q: JobQueue>(
    State(state): State<AppState<R, Q>>,
    Path((account, group, id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let allowed_runners = &require_account(&state, &account)?.runners;

    tracing::debug!(account, group, id, "queuing job");
    let job = state.repository.get(&account, &group, &id).await?;

    let runner = job
        .runner()
        .ok_or_else(|| Error::new(ErrorCode::BadRequest, "runner not found in job"))?;

    if !state.runners.contains_key(runner) {
        return Err(Error::new(
            ErrorCode::BadRequest,
            format!("no runner configured for requested runner '{runner}'"),
        )
        .into());
    }

    if !allowed_runners.iter().any(|r| r == runner) {
        return Err(Error::new(
            ErrorCode::Forbidden,
            format!("runner '{runner}' not allowed for account '{account}'"),
        )
        .into());
    }

    let queued = QueuedJob::new(join_key(&group, &id), Utc::now().timestamp() as f64);
    state.queue.enqueue(&queued).await.map_err(|e| {
        Error::with_cause(ErrorCode::BadRequest, "failed queuing job", e)
    })?;

    Ok((StatusCode::ACCEPTED, "OK"))
}

fn require_account<'a, R: Repository, Q: JobQueue>(
    state: &'a AppState<R, Q>,
    account: &str,
) -> Result<&'a crate::config::Account, Error> {
    state
        .accounts
        .get(account)
        .ok_or_else(|| Error::new(ErrorCode::NotFound, format!("account not found: {account}")))
}

fn decode_input(body: serde_json::Value) -> Result<JobInput, Error> {
    serde_json::from_value(body).map_err(|e| {
        Error::with_cause(
            ErrorCode::BadRequest,
            format!("cannot decode body into job input: {e}"),
            e,
        )
    })
}
