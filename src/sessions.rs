use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eye_strain_core::report::iso_utc;
use eye_strain_core::{
    EngineConfig, EngineError, FrameUpdate, LandmarkPoint, Metrics, Session, SessionReport,
    SessionSummary, StrainAssessment, StrainClassifier,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

use crate::export::ExportedReport;
use crate::response::AppError;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 推送给 SSE 订阅者的会话事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    Frame(FrameUpdate),
    Stopped { summary: SessionSummary },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: Uuid,
    pub started_at: f64,
    pub started_at_iso: String,
    pub ended_at: Option<f64>,
    pub stopped: bool,
    pub frames_processed: u64,
    pub skipped_frames: u64,
    pub total_blinks: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub now: f64,
    pub metrics: Metrics,
    pub assessment: StrainAssessment,
    pub total_blinks: u64,
    pub stopped: bool,
}

/// 一个正在托管的会话：引擎状态、结束后的报告，以及事件广播
#[derive(Debug)]
pub struct LiveSession {
    id: Uuid,
    engine: Session,
    frames_processed: u64,
    report: Option<SessionReport>,
    exported: Option<ExportedReport>,
    events: broadcast::Sender<SessionEvent>,
    last_activity: Instant,
}

impl LiveSession {
    fn new(id: Uuid, config: EngineConfig, started_at: f64) -> Result<Self, EngineError> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            id,
            engine: Session::new(config, started_at)?,
            frames_processed: 0,
            report: None,
            exported: None,
            events,
            last_activity: Instant::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn engine(&self) -> &Session {
        &self.engine
    }

    pub fn process_frame(
        &mut self,
        landmarks: Option<&[LandmarkPoint]>,
        timestamp: f64,
    ) -> Result<Option<FrameUpdate>, EngineError> {
        let update = self.engine.process_frame(landmarks, timestamp)?;
        self.last_activity = Instant::now();
        if let Some(update) = &update {
            self.publish(update);
        }
        Ok(update)
    }

    pub fn process_ear(&mut self, ear: f64, timestamp: f64) -> Result<FrameUpdate, EngineError> {
        let update = self.engine.process_ear(ear, timestamp)?;
        self.publish(&update);
        Ok(update)
    }

    fn publish(&mut self, update: &FrameUpdate) {
        self.frames_processed += 1;
        self.last_activity = Instant::now();
        // 没有订阅者时发送失败是正常情况
        let _ = self.events.send(SessionEvent::Frame(update.clone()));
    }

    pub fn snapshot(&mut self, now: f64) -> MetricsSnapshot {
        self.last_activity = Instant::now();
        let metrics = self.engine.metrics(now);
        MetricsSnapshot {
            now,
            assessment: StrainClassifier::assess(&metrics),
            metrics,
            total_blinks: self.engine.total_blinks(),
            stopped: self.engine.is_stopped(),
        }
    }

    pub fn stop(&mut self, ended_at: f64) -> Result<SessionReport, EngineError> {
        let report = self.engine.stop(ended_at)?;
        self.last_activity = Instant::now();
        self.report = Some(report.clone());
        let _ = self.events.send(SessionEvent::Stopped {
            summary: report.summary.clone(),
        });
        Ok(report)
    }

    pub fn report(&self) -> Option<&SessionReport> {
        self.report.as_ref()
    }

    pub fn exported(&self) -> Option<&ExportedReport> {
        self.exported.as_ref()
    }

    pub fn set_exported(&mut self, exported: ExportedReport) {
        self.exported = Some(exported);
    }

    /// 距最近一次帧、指标查询或结束操作的时长
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            started_at: self.engine.started_at(),
            started_at_iso: iso_utc(self.engine.started_at()),
            ended_at: self.engine.stopped_at(),
            stopped: self.engine.is_stopped(),
            frames_processed: self.frames_processed,
            skipped_frames: self.engine.skipped_frames(),
            total_blinks: self.engine.total_blinks(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session limit reached ({0} live sessions)")]
    Full(usize),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<RegistryError> for AppError {
    fn from(value: RegistryError) -> Self {
        match &value {
            RegistryError::Full(_) => AppError::too_many_requests(&value.to_string()),
            RegistryError::Engine(e) => e.clone().into(),
        }
    }
}

pub type SharedSession = Arc<Mutex<LiveSession>>;

/// 会话表；每个会话各自持有一把异步锁，同一会话的帧严格串行处理
///
/// 超过 `idle_ttl` 没有任何操作的会话（无论是否已结束）会被清理。
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
    default_config: EngineConfig,
    max_sessions: usize,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(default_config: EngineConfig, max_sessions: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_config,
            max_sessions,
            idle_ttl,
        }
    }

    pub fn default_config(&self) -> &EngineConfig {
        &self.default_config
    }

    /// 创建会话；达到上限时先淘汰已结束或闲置超时的会话，仍然满则拒绝
    pub async fn create(
        &self,
        config: EngineConfig,
        started_at: f64,
    ) -> Result<(Uuid, SharedSession), RegistryError> {
        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(LiveSession::new(id, config, started_at)?));

        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            let now = Instant::now();
            let before = sessions.len();
            // 正被其他请求持有的会话视为活跃
            sessions.retain(|_, s| {
                s.try_lock()
                    .map(|live| {
                        !live.engine.is_stopped() && live.idle_for(now) < self.idle_ttl
                    })
                    .unwrap_or(true)
            });
            tracing::info!(
                evicted = before - sessions.len(),
                "Evicted stopped and idle sessions at capacity"
            );
        }
        if sessions.len() >= self.max_sessions {
            return Err(RegistryError::Full(self.max_sessions));
        }
        sessions.insert(id, session.clone());

        tracing::info!(session_id = %id, started_at, "Session started");
        Ok((id, session))
    }

    /// 清理截至 `now` 闲置超过 `idle_ttl` 的会话，返回清理数量
    pub async fn evict_idle(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, s| match s.try_lock() {
            Ok(live) if live.idle_for(now) >= self.idle_ttl => {
                tracing::info!(
                    session_id = %id,
                    stopped = live.engine.is_stopped(),
                    idle_secs = live.idle_for(now).as_secs(),
                    "Evicting idle session"
                );
                false
            }
            _ => true,
        });
        before - sessions.len()
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &Uuid) -> Option<SharedSession> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            tracing::info!(session_id = %id, "Session removed");
        }
        removed
    }

    /// 按开始时间排序
    pub async fn list(&self) -> Vec<SessionInfo> {
        let handles: Vec<SharedSession> = self.sessions.read().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            infos.push(handle.lock().await.info());
        }
        infos.sort_by(|a, b| a.started_at.total_cmp(&b.started_at));
        infos
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    fn registry(max: usize) -> SessionRegistry {
        SessionRegistry::new(EngineConfig::default(), max, TTL)
    }

    #[tokio::test]
    async fn create_get_remove() {
        let reg = registry(4);
        let (id, _) = reg.create(EngineConfig::default(), 10.0).await.unwrap();
        assert_eq!(reg.len().await, 1);
        assert!(reg.get(&id).await.is_some());
        assert!(reg.remove(&id).await.is_some());
        assert!(reg.get(&id).await.is_none());
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let reg = registry(4);
        let err = reg
            .create(EngineConfig::new(0.0, 0.25, 0.25), 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Engine(EngineError::InvalidConfig(_))));
        assert_eq!(reg.len().await, 0);
    }

    #[tokio::test]
    async fn full_registry_evicts_only_stopped_sessions() {
        let reg = registry(2);
        let (a, sa) = reg.create(EngineConfig::default(), 0.0).await.unwrap();
        let (b, _) = reg.create(EngineConfig::default(), 1.0).await.unwrap();

        let err = reg.create(EngineConfig::default(), 2.0).await.unwrap_err();
        assert!(matches!(err, RegistryError::Full(2)));

        sa.lock().await.stop(5.0).unwrap();
        let (c, _) = reg.create(EngineConfig::default(), 3.0).await.unwrap();
        assert!(reg.get(&a).await.is_none());
        assert!(reg.get(&b).await.is_some());
        assert!(reg.get(&c).await.is_some());
    }

    #[tokio::test]
    async fn idle_sessions_are_swept() {
        let reg = registry(4);
        let (quiet, _) = reg.create(EngineConfig::default(), 0.0).await.unwrap();
        let (busy, busy_handle) = reg.create(EngineConfig::default(), 0.0).await.unwrap();

        assert_eq!(reg.evict_idle(Instant::now()).await, 0);

        let later = Instant::now() + TTL + Duration::from_secs(1);
        // 被其他请求持有的会话不会被清理
        let guard = busy_handle.lock().await;
        assert_eq!(reg.evict_idle(later).await, 1);
        drop(guard);
        assert!(reg.get(&quiet).await.is_none());
        assert!(reg.get(&busy).await.is_some());

        assert_eq!(reg.evict_idle(later).await, 1);
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn activity_resets_idle_clock() {
        let reg = registry(4);
        let (_, handle) = reg.create(EngineConfig::default(), 0.0).await.unwrap();
        let before = Instant::now();
        handle.lock().await.process_ear(0.3, 1.0).unwrap();
        assert!(handle.lock().await.idle_for(before).is_zero());
        assert!(handle.lock().await.idle_for(before + TTL) <= TTL);
    }

    #[tokio::test]
    async fn full_registry_evicts_abandoned_running_sessions() {
        let reg = SessionRegistry::new(EngineConfig::default(), 1, Duration::ZERO);
        let (abandoned, _) = reg.create(EngineConfig::default(), 0.0).await.unwrap();
        let (fresh, _) = reg.create(EngineConfig::default(), 1.0).await.unwrap();
        assert!(reg.get(&abandoned).await.is_none());
        assert!(reg.get(&fresh).await.is_some());
    }

    #[tokio::test]
    async fn frames_and_stop_are_broadcast() {
        let reg = registry(4);
        let (_, handle) = reg.create(EngineConfig::default(), 0.0).await.unwrap();
        let mut rx = handle.lock().await.subscribe();

        {
            let mut live = handle.lock().await;
            live.process_ear(0.3, 1.0).unwrap();
            assert!(live.process_frame(None, 2.0).unwrap().is_none());
            live.stop(3.0).unwrap();
        }

        match rx.recv().await.unwrap() {
            SessionEvent::Frame(update) => assert_eq!(update.timestamp, 1.0),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            SessionEvent::Stopped { summary } => assert_eq!(summary.total_frames, 1),
            other => panic!("unexpected event: {other:?}"),
        }

        let info = handle.lock().await.info();
        assert!(info.stopped);
        assert_eq!(info.frames_processed, 1);
        assert_eq!(info.skipped_frames, 1);
        assert_eq!(info.ended_at, Some(3.0));
    }

    #[test]
    fn stopped_event_is_tagged() {
        let summary = SessionSummary {
            total_frames: 0,
            total_blinks: 0,
            avg_blink_duration_ms: 0.0,
            overall_perclos: 0.0,
            avg_ear: 0.0,
            blinks_per_minute: 0.0,
            final_level: eye_strain_core::StrainLevel::Low,
        };
        let json = serde_json::to_value(SessionEvent::Stopped { summary }).unwrap();
        assert_eq!(json["type"], "stopped");
        assert_eq!(json["summary"]["finalLevel"], "Low");
    }

    #[tokio::test]
    async fn list_is_sorted_by_start() {
        let reg = registry(4);
        reg.create(EngineConfig::default(), 20.0).await.unwrap();
        reg.create(EngineConfig::default(), 10.0).await.unwrap();
        let list = reg.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].started_at, 10.0);
        assert!(list[0].started_at_iso.starts_with("1970-01-01T00:00:10"));
    }
}
