//! 引擎配置
//!
//! 所有阈值与窗口长度在会话创建时固定，会话期间不可修改。

use serde::{Deserialize, Serialize};

use crate::ear::EyeLandmarks;
use crate::error::EngineError;

/// 默认滑动窗口长度（秒）
pub const DEFAULT_WINDOW_SECONDS: f64 = 60.0;

/// 默认眨眼检测 EAR 阈值
pub const DEFAULT_BLINK_EAR_THRESH: f64 = 0.25;

/// 默认 PERCLOS 闭眼判定 EAR 阈值
pub const DEFAULT_PERCLOS_EAR_THRESH: f64 = 0.25;

/// 两次休息建议之间的最短间隔（秒）
pub const DEFAULT_RECOMMENDATION_COOLDOWN_SECONDS: f64 = 300.0;

/// 单个会话的最长跨度（秒），帧时间戳和结束时间都不得超出起点之后这一范围
pub const MAX_SESSION_SECONDS: f64 = 24.0 * 60.0 * 60.0;

/// 会话报告所使用的历史数据来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportHistory {
    /// 额外保留整个会话的未裁剪历史，逐分钟报告覆盖完整会话
    #[default]
    Full,
    /// 只使用滑动窗口中仍保留的数据，超过一个窗口的会话只有最后一段准确
    Window,
}

impl std::str::FromStr for ReportHistory {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "session" => Ok(Self::Full),
            "window" => Ok(Self::Window),
            other => Err(EngineError::InvalidConfig(format!(
                "unknown report history mode: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub window_seconds: f64,
    pub blink_ear_threshold: f64,
    pub perclos_ear_threshold: f64,
    pub recommendation_cooldown_seconds: f64,
    pub report_history: ReportHistory,
    pub eyes: EyeLandmarks,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_seconds: DEFAULT_WINDOW_SECONDS,
            blink_ear_threshold: DEFAULT_BLINK_EAR_THRESH,
            perclos_ear_threshold: DEFAULT_PERCLOS_EAR_THRESH,
            recommendation_cooldown_seconds: DEFAULT_RECOMMENDATION_COOLDOWN_SECONDS,
            report_history: ReportHistory::default(),
            eyes: EyeLandmarks::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(window_seconds: f64, blink_ear_threshold: f64, perclos_ear_threshold: f64) -> Self {
        Self {
            window_seconds,
            blink_ear_threshold,
            perclos_ear_threshold,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.window_seconds.is_finite() || self.window_seconds <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "window_seconds must be a positive number, got {}",
                self.window_seconds
            )));
        }
        if !self.blink_ear_threshold.is_finite() {
            return Err(EngineError::InvalidConfig(
                "blink_ear_threshold must be finite".to_string(),
            ));
        }
        if !self.perclos_ear_threshold.is_finite() {
            return Err(EngineError::InvalidConfig(
                "perclos_ear_threshold must be finite".to_string(),
            ));
        }
        if !self.recommendation_cooldown_seconds.is_finite()
            || self.recommendation_cooldown_seconds < 0.0
        {
            return Err(EngineError::InvalidConfig(
                "recommendation_cooldown_seconds must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
