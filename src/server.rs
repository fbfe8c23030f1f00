use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::alert;
use crate::baseline::{GlobalBaseline, TeamOverride, TeamScores};
use crate::blend::{BlendEngine, BlendError, BlendedScores};
use crate::config::Config;
use crate::drift::{MergeDriftResult, ThresholdRow};
use crate::governor::{GovernanceError, MergeGovernor};
use crate::regime::{RegimeCheck, TeamRegime};
use crate::report::{save_report, CrossTeamReport, CrossTeamReporter};
use crate::store::{BaselineStore, StoreError};

#[derive(Clone)]
pub struct ApiState {
    config: Arc<Config>,
    governor: Arc<MergeGovernor>,
    blend: BlendEngine,
    reporter: Arc<CrossTeamReporter>,
}

impl ApiState {
    pub fn new(config: Config, store: Arc<dyn BaselineStore>) -> Self {
        let mut governor = MergeGovernor::new(store, config.drift_policy(), config.governor_settings())
            .with_alert_rules(config.alerts.rules.clone());
        for sink in config.alert_sinks() {
            governor = governor.with_sink(sink);
        }
        let reporter = CrossTeamReporter::new(
            config.drift_policy(),
            config.blend_engine(),
            config.report_settings(),
        );
        Self {
            blend: config.blend_engine(),
            config: Arc::new(config),
            governor: Arc::new(governor),
            reporter: Arc::new(reporter),
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, error: impl std::fmt::Display) -> Self {
        Self {
            status,
            message: error.to_string(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else if matches!(err, StoreError::InvalidTeamId(_)) {
            StatusCode::BAD_REQUEST
        } else if err.is_retryable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, err)
    }
}

impl From<GovernanceError> for ApiError {
    fn from(err: GovernanceError) -> Self {
        match err {
            GovernanceError::Store(inner) => inner.into(),
            GovernanceError::InvalidProposal { .. } => Self::new(StatusCode::BAD_REQUEST, err),
            err if err.is_retryable() => Self::new(StatusCode::SERVICE_UNAVAILABLE, err),
            err => Self::internal(err),
        }
    }
}

impl From<BlendError> for ApiError {
    fn from(err: BlendError) -> Self {
        match err {
            BlendError::Store(inner) => inner.into(),
            BlendError::ZeroScore { .. } => Self::new(StatusCode::BAD_REQUEST, err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlendRequest {
    team_id: String,
    scores: TeamScores,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriftRequest {
    team_id: String,
    proposed_shm: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergeRequest {
    team_id: String,
    proposed_shm: f64,
    commit_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TeamsRequest {
    #[serde(default)]
    teams: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ReportRequest {
    #[serde(default)]
    teams: Vec<String>,
    #[serde(default)]
    save: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MergeResponse {
    approved: bool,
    global_shm: f64,
    commits_since_update: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    commits_since_update: u64,
}

#[derive(Debug, Serialize)]
struct RegimeResponse {
    teams: Vec<TeamRegime>,
    check: RegimeCheck,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportResponse {
    report: CrossTeamReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    markdown_path: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/baseline", get(baseline))
        .route("/api/teams/:id", get(team))
        .route("/api/blend", post(blend))
        .route("/api/drift/check", post(check_drift))
        .route("/api/merge", post(merge))
        .route("/api/commits", post(commit))
        .route("/api/regime", post(regime))
        .route("/api/report", post(report))
        .route("/api/thresholds", get(thresholds))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    let store: Arc<dyn BaselineStore> = Arc::new(config.open_store());
    let app = router(ApiState::new(config, store));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("baseline API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn baseline(State(state): State<ApiState>) -> ApiResult<GlobalBaseline> {
    Ok(ok(state.governor.load_global().await?))
}

async fn team(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<TeamOverride> {
    Ok(ok(state.governor.load_team(&id).await?))
}

async fn blend(
    State(state): State<ApiState>,
    Json(request): Json<BlendRequest>,
) -> ApiResult<BlendedScores> {
    let blended = state
        .blend
        .blend_for_team(state.governor.store().as_ref(), &request.team_id, &request.scores)
        .await?;
    Ok(ok(blended))
}

async fn check_drift(
    State(state): State<ApiState>,
    Json(request): Json<DriftRequest>,
) -> ApiResult<MergeDriftResult> {
    let result = state
        .governor
        .check_merge_drift(&request.team_id, request.proposed_shm)
        .await?;
    Ok(ok(result))
}

async fn merge(
    State(state): State<ApiState>,
    Json(request): Json<MergeRequest>,
) -> ApiResult<MergeResponse> {
    let approved = state
        .governor
        .approve_auto_merge(&request.team_id, request.proposed_shm, request.commit_hash)
        .await?;
    let global = state.governor.load_global().await?;
    Ok(ok(MergeResponse {
        approved,
        global_shm: global.shm,
        commits_since_update: global.commits_since_update,
    }))
}

async fn commit(State(state): State<ApiState>) -> ApiResult<CommitResponse> {
    let commits_since_update = state.governor.record_commit().await?;
    Ok(ok(CommitResponse {
        commits_since_update,
    }))
}

async fn regime(
    State(state): State<ApiState>,
    Json(request): Json<TeamsRequest>,
) -> ApiResult<RegimeResponse> {
    let teams = state.governor.team_regimes(&state.blend, &request.teams).await?;
    let check = state.governor.check_regime_mismatch(&teams);
    Ok(ok(RegimeResponse { teams, check }))
}

async fn report(
    State(state): State<ApiState>,
    Json(request): Json<ReportRequest>,
) -> ApiResult<ReportResponse> {
    let report = state
        .reporter
        .generate_report(state.governor.store().as_ref(), &request.teams)
        .await?;
    alert::dispatch(
        state.governor.sinks(),
        state.governor.alert_rules(),
        &alert::report_alerts(&report),
    )
    .await;

    let (json_path, markdown_path) = if request.save {
        let snapshot = report.clone();
        let dir = state.config.resolved_report_dir();
        let saved = tokio::task::spawn_blocking(move || save_report(&snapshot, &dir))
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::internal)?;
        (
            Some(saved.json_path.display().to_string()),
            Some(saved.markdown_path.display().to_string()),
        )
    } else {
        (None, None)
    };

    Ok(ok(ReportResponse {
        report,
        json_path,
        markdown_path,
    }))
}

async fn thresholds(State(state): State<ApiState>) -> Json<ApiResponse<Vec<ThresholdRow>>> {
    ok(state.governor.policy().threshold_table())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::fixtures::{global_baseline, ux_team};
    use crate::store::MemoryStore;

    fn state() -> ApiState {
        let mut config = Config::default();
        config.alerts.enable_stdout = false;
        let store = MemoryStore::with_global(global_baseline()).with_team(ux_team());
        ApiState::new(config, Arc::new(store))
    }

    #[tokio::test]
    async fn merge_endpoint_reports_decision_and_new_state() {
        let state = state();
        let Json(body) = merge(
            State(state.clone()),
            Json(MergeRequest {
                team_id: "team-ux".to_string(),
                proposed_shm: 0.821,
                commit_hash: Some("abc123".to_string()),
            }),
        )
        .await
        .expect("merge");
        assert!(body.ok);
        assert!(body.data.approved);
        assert_eq!(body.data.global_shm, 0.821);
        assert_eq!(body.data.commits_since_update, 0);
    }

    #[tokio::test]
    async fn unknown_team_maps_to_not_found() {
        let err = team(State(state()), Path("team-ghost".to_string()))
            .await
            .expect_err("missing team");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn out_of_range_proposal_is_bad_request() {
        let err = check_drift(
            State(state()),
            Json(DriftRequest {
                team_id: "team-ux".to_string(),
                proposed_shm: 1.5,
            }),
        )
        .await
        .expect_err("invalid");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn contention_maps_to_service_unavailable() {
        let err: ApiError = GovernanceError::Contention { attempts: 4 }.into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        let err: ApiError = StoreError::InvalidTeamId("../etc".to_string()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn saved_report_includes_earlier_merges() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::default();
        config.alerts.enable_stdout = false;
        config.storage.root = dir.path().display().to_string();
        let store = MemoryStore::with_global(global_baseline()).with_team(ux_team());
        let state = ApiState::new(config, Arc::new(store));

        merge(
            State(state.clone()),
            Json(MergeRequest {
                team_id: "team-ux".to_string(),
                proposed_shm: 0.821,
                commit_hash: None,
            }),
        )
        .await
        .expect("merge");

        let Json(body) = report(
            State(state),
            Json(ReportRequest {
                teams: vec!["team-ux".to_string()],
                save: true,
            }),
        )
        .await
        .expect("report");
        assert_eq!(body.data.report.merge_log.len(), 1);
        let json_path = body.data.json_path.expect("json path");
        assert!(json_path.starts_with(&dir.path().join("reports").display().to_string()));
        assert!(std::path::Path::new(&json_path).exists());
        assert!(body.data.markdown_path.is_some());
    }

    #[tokio::test]
    async fn regime_endpoint_flags_mixed_teams() {
        let Json(body) = regime(
            State(state()),
            Json(TeamsRequest {
                teams: vec!["team-ux".to_string(), "team-other".to_string()],
            }),
        )
        .await
        .expect("regime");
        assert_eq!(body.data.teams.len(), 2);
        assert!(body.data.check.mismatch);
    }
}
