use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use eye_strain_core::{EngineConfig, EngineError, FrameUpdate, LandmarkPoint, SessionReport};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::export::{report_stem, ExportedReport};
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::sessions::{SessionInfo, SharedSession};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions).post(start_session))
        .route("/:id", axum::routing::delete(delete_session))
        .route("/:id/frames", post(ingest_frame))
        .route("/:id/metrics", get(get_metrics))
        .route("/:id/stop", post(stop_session))
        .route("/:id/report.txt", get(report_text))
        .route("/:id/report.csv", get(report_csv))
}

/// 服务器时钟，单位秒
pub fn now_seconds() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

pub(crate) async fn load_session(state: &AppState, id: &Uuid) -> Result<SharedSession, AppError> {
    state
        .sessions()
        .get(id)
        .await
        .ok_or_else(|| AppError::not_found("Session not found"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StartSessionRequest {
    started_at: Option<f64>,
    window_seconds: Option<f64>,
    blink_ear_threshold: Option<f64>,
    perclos_ear_threshold: Option<f64>,
}

impl StartSessionRequest {
    fn engine_config(&self, defaults: &EngineConfig) -> EngineConfig {
        EngineConfig {
            window_seconds: self.window_seconds.unwrap_or(defaults.window_seconds),
            blink_ear_threshold: self
                .blink_ear_threshold
                .unwrap_or(defaults.blink_ear_threshold),
            perclos_ear_threshold: self
                .perclos_ear_threshold
                .unwrap_or(defaults.perclos_ear_threshold),
            ..*defaults
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionResponse {
    session: SessionInfo,
    config: EngineConfig,
}

async fn start_session(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let config = req.engine_config(state.sessions().default_config());
    let started_at = req.started_at.unwrap_or_else(now_seconds);
    let (_, session) = state.sessions().create(config, started_at).await?;
    let info = session.lock().await.info();
    Ok(created(StartSessionResponse {
        session: info,
        config,
    }))
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.sessions().list().await)
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .sessions()
        .remove(&id)
        .await
        .ok_or_else(|| AppError::not_found("Session not found"))?;
    Ok(ok(serde_json::json!({ "id": id, "deleted": true })))
}

/// `landmarks` 为 null 表示本帧未检测到人脸；只给 `ear` 时跳过关键点计算
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FrameRequest {
    timestamp: Option<f64>,
    landmarks: Option<Vec<LandmarkPoint>>,
    ear: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameResponse {
    skipped: bool,
    update: Option<FrameUpdate>,
}

async fn ingest_frame(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<FrameRequest>,
) -> Result<impl IntoResponse, AppError> {
    let timestamp = req.timestamp.unwrap_or_else(now_seconds);
    let session = load_session(&state, &id).await?;
    let mut live = session.lock().await;
    let update = match (req.landmarks.as_deref(), req.ear) {
        (Some(landmarks), _) => live.process_frame(Some(landmarks), timestamp)?,
        (None, Some(ear)) => Some(live.process_ear(ear, timestamp)?),
        (None, None) => live.process_frame(None, timestamp)?,
    };

    if let Some(lines) = update.as_ref().and_then(|u| u.recommendation) {
        tracing::info!(session_id = %id, timestamp, lines = lines.len(), "Break recommendation issued");
    }

    Ok(ok(FrameResponse {
        skipped: update.is_none(),
        update,
    }))
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    now: Option<f64>,
}

async fn get_metrics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<MetricsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let session = load_session(&state, &id).await?;
    let mut live = session.lock().await;
    // 默认取会话自身的时间线，客户端时间戳与服务器时钟可能不一致
    let now = q
        .now
        .or(live.engine().stopped_at())
        .or(live.engine().last_timestamp())
        .unwrap_or_else(now_seconds);
    Ok(ok(live.snapshot(now)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StopRequest {
    ended_at: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StopResponse {
    session: SessionInfo,
    report: SessionReport,
    exported: Option<ExportedReport>,
}

async fn stop_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<StopRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = load_session(&state, &id).await?;
    let mut live = session.lock().await;
    if live.engine().is_stopped() {
        return Err(EngineError::SessionStopped.into());
    }

    // 结束时间超出会话跨度时引擎返回 INVALID_TIMESTAMP，会话保持运行
    let ended_at = req.ended_at.unwrap_or_else(now_seconds);
    let report = live.stop(ended_at)?;
    tracing::info!(
        session_id = %id,
        total_blinks = report.summary.total_blinks,
        final_level = %report.summary.final_level,
        "Session stopped"
    );

    if let Some(exporter) = state.exporter() {
        match exporter.export(&id, &report).await {
            Ok(exported) => live.set_exported(exported),
            // 导出失败不影响报告本身，客户端仍可通过接口下载
            Err(e) => tracing::error!(session_id = %id, error = %e, "Report export failed"),
        }
    }

    Ok(ok(StopResponse {
        session: live.info(),
        exported: live.exported().cloned(),
        report,
    }))
}

async fn finished_report(state: &AppState, id: &Uuid) -> Result<SessionReport, AppError> {
    let session = load_session(state, id).await?;
    let live = session.lock().await;
    live.report().cloned().ok_or_else(|| {
        AppError::conflict("SESSION_RUNNING", "Report is available after the session stops")
    })
}

async fn report_text(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let report = finished_report(&state, &id).await?;
    let body = report.to_text()?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.txt\"", report_stem(&id, &report)),
            ),
        ],
        body,
    ))
}

async fn report_csv(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let report = finished_report(&state, &id).await?;
    let body = report.to_csv()?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.csv\"", report_stem(&id, &report)),
            ),
        ],
        body,
    ))
}
