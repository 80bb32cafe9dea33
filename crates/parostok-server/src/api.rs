//! HTTP routes
//!
//! Every error leaves as `{"error": "..."}` with a matching status code.
//! Catalog failures also say whether resubmitting may succeed.

use chrono::{DateTime, Utc};
use parostok_core::{CatalogConfig, CatalogError, ManualImport, Orchestrator, VERSION};
use parostok_provenance::{JobId, Market, Run, RunCounts, RunStatus, SourceId, StepLog};
use parostok_store::StoreError;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Body of `POST /update`
///
/// Omitted lists fall back to the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Markets to update
    #[serde(default)]
    pub markets: Option<Vec<Market>>,
    /// Sources to run
    #[serde(default)]
    pub sources: Option<Vec<SourceId>>,
    /// Fetch and log without writing
    #[serde(default)]
    pub dry_run: bool,
}

/// Response of `POST /update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accepted {
    /// Job to poll
    pub job_id: JobId,
}

/// Response of `GET /update/{job_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    /// Job
    pub job_id: JobId,
    /// Current status
    pub status: RunStatus,
    /// Audit log so far
    pub step_logs: Vec<StepLog>,
    /// Progress counters
    pub counts: RunCounts,
    /// Creation time
    pub started_at: DateTime<Utc>,
    /// Terminal time
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<Run> for JobView {
    fn from(run: Run) -> Self {
        Self {
            job_id: run.job_id,
            status: run.status,
            step_logs: run.step_logs,
            counts: run.counts,
            started_at: run.started_at,
            ended_at: run.ended_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogQuery {
    market: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retryable: Option<bool>,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            retryable: None,
        }
    }
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        Self {
            error: err.to_string(),
            retryable: err.retryable(),
        }
    }
}

/// Request failures mapped to HTTP statuses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Path segment is not a job id
    #[error("job not found: {0}")]
    UnknownJob(String),

    /// Catalog operation failed
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl warp::reject::Reject for ApiError {}

impl ApiError {
    /// Status code for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownJob(_) | Self::Catalog(CatalogError::JobNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::Catalog(CatalogError::Store(StoreError::Unavailable(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Catalog(err) if err.is_client_error() => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether resubmitting may succeed; `None` when there is nothing to retry
    #[must_use]
    pub fn retryable(&self) -> Option<bool> {
        match self {
            Self::UnknownJob(_) | Self::Catalog(CatalogError::JobNotFound(_)) => None,
            Self::Catalog(err) => Some(err.is_retryable()),
        }
    }
}

fn reject(err: impl Into<ApiError>) -> Rejection {
    warp::reject::custom(err.into())
}

#[derive(Clone)]
struct State {
    orchestrator: Orchestrator,
    config: Arc<CatalogConfig>,
}

fn with_state(state: State) -> impl Filter<Extract = (State,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// All routes with CORS, JSON error replies and request tracing
pub fn routes(
    orchestrator: Orchestrator,
    config: Arc<CatalogConfig>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let state = State {
        orchestrator,
        config,
    };

    let health = warp::path!("health")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({ "status": "ok", "version": VERSION })));

    let submit = warp::path!("update")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(submit_update);

    let status = warp::path!("update" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(job_status);

    let sources = warp::path!("catalog" / "sources")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_sources);

    let catalog = warp::path!("catalog")
        .and(warp::get())
        .and(warp::query::<CatalogQuery>())
        .and(with_state(state.clone()))
        .and_then(get_catalog);

    let import = warp::path!("manual-import")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(manual_import);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(["GET", "POST"])
        .allow_header("content-type");

    health
        .or(submit)
        .or(status)
        .or(sources)
        .or(catalog)
        .or(import)
        .with(cors)
        .recover(recover)
        .with(warp::trace::request())
}

async fn submit_update(body: UpdateRequest, state: State) -> Result<impl Reply, Rejection> {
    let request = state
        .config
        .resolve_request(body.markets, body.sources, body.dry_run);
    let job_id = state.orchestrator.submit(request);
    Ok(warp::reply::with_status(
        warp::reply::json(&Accepted { job_id }),
        StatusCode::ACCEPTED,
    ))
}

async fn job_status(raw_id: String, state: State) -> Result<impl Reply, Rejection> {
    let job_id: JobId = raw_id
        .parse()
        .map_err(|_| reject(ApiError::UnknownJob(raw_id.clone())))?;
    let run = state
        .orchestrator
        .get_status(job_id)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&JobView::from(run)))
}

async fn list_sources(state: State) -> Result<impl Reply, Rejection> {
    let overview = state.orchestrator.sources().await.map_err(reject)?;
    Ok(warp::reply::json(&overview))
}

async fn get_catalog(query: CatalogQuery, state: State) -> Result<impl Reply, Rejection> {
    let market = query
        .market
        .as_deref()
        .map(Market::new)
        .filter(|m| !m.is_blank());
    let catalog = state
        .orchestrator
        .catalog(market.as_ref())
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&catalog))
}

async fn manual_import(payload: ManualImport, state: State) -> Result<impl Reply, Rejection> {
    let report = state
        .orchestrator
        .manual_import(payload)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&report))
}

async fn recover(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = if let Some(err) = rejection.find::<ApiError>() {
        if err.status().is_server_error() {
            tracing::error!("request failed: {}", err);
        }
        (err.status(), ErrorBody::from(err))
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, ErrorBody::new("not found"))
    } else if let Some(err) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, ErrorBody::new(err.to_string()))
    } else if let Some(err) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, ErrorBody::new(err.to_string()))
    } else if let Some(err) = rejection.find::<warp::reject::PayloadTooLarge>() {
        (StatusCode::PAYLOAD_TOO_LARGE, ErrorBody::new(err.to_string()))
    } else if let Some(err) = rejection.find::<warp::reject::UnsupportedMediaType>() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, ErrorBody::new(err.to_string()))
    } else if let Some(err) = rejection.find::<warp::cors::CorsForbidden>() {
        (StatusCode::FORBIDDEN, ErrorBody::new(err.to_string()))
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, ErrorBody::new("method not allowed"))
    } else {
        tracing::error!("unhandled rejection: {:?}", rejection);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new("internal server error"),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&body),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parostok_provenance::ProvenanceError;

    #[test]
    fn error_statuses() {
        let job = JobId::new();
        assert_eq!(
            ApiError::Catalog(CatalogError::JobNotFound(job)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::UnknownJob("nope".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Catalog(CatalogError::InvalidRequest("blank".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Catalog(ProvenanceError::invalid("fao", "no hash").into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Catalog(StoreError::Unavailable("locked".into()).into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn error_bodies_say_whether_to_retry() {
        let busy = ApiError::Catalog(StoreError::Unavailable("locked".into()).into());
        assert_eq!(
            serde_json::to_value(ErrorBody::from(&busy)).unwrap(),
            serde_json::json!({ "error": "store unavailable: locked", "retryable": true })
        );

        let rejected = ApiError::Catalog(ProvenanceError::invalid("fao", "no hash").into());
        assert_eq!(ErrorBody::from(&rejected).retryable, Some(false));

        let missing = ApiError::UnknownJob("nope".into());
        let body = serde_json::to_value(ErrorBody::from(&missing)).unwrap();
        assert!(body.get("retryable").is_none());
    }

    #[test]
    fn update_body_fields_are_optional() {
        let body: UpdateRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(body, UpdateRequest::default());

        let body: UpdateRequest =
            serde_json::from_str(r#"{"markets":["ua"],"dry_run":true}"#).unwrap();
        assert_eq!(body.markets, Some(vec![Market::new("UA")]));
        assert!(body.sources.is_none());
        assert!(body.dry_run);
    }
}
