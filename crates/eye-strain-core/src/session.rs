//! 会话处理流水线
//!
//! 每帧：关键点 → EAR → 眨眼状态机 → 窗口追加 → 裁剪并计算指标 → 等级分类。
//! 会话结束：丢弃进行中的眨眼，生成报告。
//!
//! 一个 `Session` 只能由单一调用方按时间顺序串行驱动，内部没有任何锁或定时器。

use serde::Serialize;

use crate::blink::{BlinkDetector, BlinkEvent};
use crate::config::{EngineConfig, ReportHistory, MAX_SESSION_SECONDS};
use crate::ear::{EARCalculator, EarReading, LandmarkPoint};
use crate::error::EngineError;
use crate::report::{is_representable, SessionReport, SessionReportGenerator};
use crate::strain::{RecommendationThrottle, StrainAssessment, StrainClassifier};
use crate::window::{FrameSample, Metrics, WindowedAggregator};

/// 每处理一帧输出给界面层的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameUpdate {
    pub timestamp: f64,
    /// 双眼联合 EAR
    pub ear: f64,
    /// 左右眼分别的 EAR，直接输入 EAR 时为空
    pub eyes: Option<EarReading>,
    pub closed: bool,
    /// 本帧完成的眨眼
    pub blink: Option<BlinkEvent>,
    pub total_blinks: u64,
    pub metrics: Metrics,
    pub assessment: StrainAssessment,
    pub recommendation: Option<&'static [&'static str]>,
}

/// 不裁剪的完整会话历史，仅用于生成报告
#[derive(Debug, Clone, Default)]
struct SessionHistory {
    frames: Vec<FrameSample>,
    blinks: Vec<BlinkEvent>,
}

#[derive(Debug, Clone)]
pub struct Session {
    config: EngineConfig,
    started_at: f64,
    ear: EARCalculator,
    detector: BlinkDetector,
    window: WindowedAggregator,
    history: Option<SessionHistory>,
    throttle: RecommendationThrottle,
    last_timestamp: Option<f64>,
    skipped_frames: u64,
    stopped_at: Option<f64>,
}

impl Session {
    pub fn new(config: EngineConfig, started_at: f64) -> Result<Self, EngineError> {
        config.validate()?;
        if !is_representable(started_at) || !is_representable(started_at + MAX_SESSION_SECONDS) {
            return Err(EngineError::InvalidTimestamp(format!(
                "session start {started_at} is not a usable unix time in seconds"
            )));
        }
        let history = match config.report_history {
            ReportHistory::Full => Some(SessionHistory::default()),
            ReportHistory::Window => None,
        };
        Ok(Self {
            ear: EARCalculator::new(config.eyes),
            detector: BlinkDetector::new(config.blink_ear_threshold),
            window: WindowedAggregator::new(config.window_seconds, config.perclos_ear_threshold),
            throttle: RecommendationThrottle::new(config.recommendation_cooldown_seconds),
            history,
            config,
            started_at,
            last_timestamp: None,
            skipped_frames: 0,
            stopped_at: None,
        })
    }

    /// 处理一帧检测结果；`None` 表示本帧未检测到人脸，直接跳过不产生样本
    pub fn process_frame(
        &mut self,
        landmarks: Option<&[LandmarkPoint]>,
        timestamp: f64,
    ) -> Result<Option<FrameUpdate>, EngineError> {
        self.ensure_running()?;
        self.check_timestamp(timestamp)?;
        let Some(landmarks) = landmarks else {
            self.skipped_frames += 1;
            return Ok(None);
        };
        let reading = self.ear.calculate(landmarks)?;
        Ok(Some(self.ingest(reading.combined, Some(reading), timestamp)))
    }

    /// 跳过关键点，直接输入联合 EAR
    pub fn process_ear(&mut self, ear: f64, timestamp: f64) -> Result<FrameUpdate, EngineError> {
        self.ensure_running()?;
        self.check_timestamp(timestamp)?;
        Ok(self.ingest(ear, None, timestamp))
    }

    fn ingest(&mut self, ear: f64, eyes: Option<EarReading>, timestamp: f64) -> FrameUpdate {
        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                tracing::warn!(timestamp, last, "Frame timestamp went backwards");
            }
        }
        self.last_timestamp = Some(timestamp);

        let blink = self.detector.update(ear, timestamp);
        let sample = self.window.record_frame(timestamp, ear);
        if let Some(history) = self.history.as_mut() {
            history.frames.push(sample);
        }
        if let Some(event) = blink {
            self.window.record_blink(event);
            if let Some(history) = self.history.as_mut() {
                history.blinks.push(event);
            }
        }

        let metrics = self.window.compute_metrics(timestamp);
        let assessment = StrainClassifier::assess(&metrics);
        let recommendation = self.throttle.check(assessment.level, timestamp);

        FrameUpdate {
            timestamp,
            ear,
            eyes,
            closed: sample.closed,
            blink,
            total_blinks: self.detector.blink_count(),
            metrics,
            assessment,
            recommendation,
        }
    }

    pub fn metrics(&mut self, now: f64) -> Metrics {
        self.window.compute_metrics(now)
    }

    pub fn assessment(&mut self, now: f64) -> StrainAssessment {
        StrainClassifier::assess(&self.metrics(now))
    }

    /// 结束会话并生成报告
    ///
    /// 仍在进行中的眨眼被丢弃，不计入累计次数。结束后不再接受新帧。
    /// `ended_at` 必须落在起点之后 [`MAX_SESSION_SECONDS`] 以内，否则会话保持运行。
    pub fn stop(&mut self, ended_at: f64) -> Result<SessionReport, EngineError> {
        self.ensure_running()?;
        let span = ended_at - self.started_at;
        if !(0.0..=MAX_SESSION_SECONDS).contains(&span) {
            return Err(EngineError::InvalidTimestamp(format!(
                "end {ended_at} must be within {MAX_SESSION_SECONDS} s after start {}",
                self.started_at
            )));
        }
        if let Some(start) = self.detector.discard_in_progress() {
            tracing::debug!(blink_start = start, "Discarding in-progress blink at stop");
        }
        self.stopped_at = Some(ended_at);
        Ok(self.build_report(ended_at))
    }

    fn build_report(&self, ended_at: f64) -> SessionReport {
        let total_blinks = self.detector.blink_count();
        match &self.history {
            Some(history) => {
                SessionReportGenerator::new(&history.frames, &history.blinks, total_blinks)
                    .build(self.started_at, ended_at)
            }
            None => {
                let frames: Vec<FrameSample> = self.window.frames().iter().copied().collect();
                let blinks: Vec<BlinkEvent> = self.window.blinks().iter().copied().collect();
                SessionReportGenerator::new(&frames, &blinks, total_blinks)
                    .build(self.started_at, ended_at)
            }
        }
    }

    /// 早于起点的帧按乱序处理；晚于最长跨度的帧会让会话无法正常结束，直接拒绝
    fn check_timestamp(&self, timestamp: f64) -> Result<(), EngineError> {
        if timestamp.is_finite() && timestamp - self.started_at <= MAX_SESSION_SECONDS {
            Ok(())
        } else {
            Err(EngineError::InvalidTimestamp(format!(
                "frame timestamp {timestamp} is outside the session span"
            )))
        }
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.stopped_at.is_some() {
            Err(EngineError::SessionStopped)
        } else {
            Ok(())
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    pub fn stopped_at(&self) -> Option<f64> {
        self.stopped_at
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped_at.is_some()
    }

    pub fn total_blinks(&self) -> u64 {
        self.detector.blink_count()
    }

    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames
    }

    /// 最近一次处理的帧时间戳
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    pub fn window(&self) -> &WindowedAggregator {
        &self.window
    }
}
