//! 眨眼检测模块
//!
//! 基于两状态有限状态机进行眨眼检测：
//! Open（睁眼）→ Closing（闭眼中，记录起始时间）→ Open
//!
//! EAR 跌破阈值进入 Closing，回到阈值及以上时确认一次完整眨眼。
//! 会话结束时仍处于 Closing 的眨眼直接丢弃，不记录也不计数。

use serde::{Deserialize, Serialize};

/// 已完成的眨眼事件，时间单位为秒
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlinkEvent {
    pub start: f64,
    pub end: f64,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EyeState {
    Open,
    Closing { start: f64 },
}

/// 眨眼检测器
#[derive(Debug, Clone)]
pub struct BlinkDetector {
    threshold: f64,
    state: EyeState,
    /// 会话累计眨眼次数，只增不减，不受窗口裁剪影响
    blink_count: u64,
}

impl BlinkDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            state: EyeState::Open,
            blink_count: 0,
        }
    }

    /// 输入当前帧的联合 EAR 和时间戳（秒），眨眼完成时返回事件
    pub fn update(&mut self, ear: f64, timestamp: f64) -> Option<BlinkEvent> {
        let below = ear < self.threshold;
        match self.state {
            EyeState::Open if below => {
                self.state = EyeState::Closing { start: timestamp };
                None
            }
            EyeState::Closing { start } if !below => {
                self.state = EyeState::Open;
                self.blink_count += 1;
                Some(BlinkEvent {
                    start,
                    end: timestamp,
                    duration_ms: (timestamp - start) * 1000.0,
                })
            }
            _ => None,
        }
    }

    pub fn blink_count(&self) -> u64 {
        self.blink_count
    }

    pub fn state(&self) -> EyeState {
        self.state
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 丢弃进行中的眨眼，返回被丢弃眨眼的起始时间
    pub fn discard_in_progress(&mut self) -> Option<f64> {
        match std::mem::replace(&mut self.state, EyeState::Open) {
            EyeState::Closing { start } => Some(start),
            EyeState::Open => None,
        }
    }

    pub fn reset(&mut self) {
        self.state = EyeState::Open;
        self.blink_count = 0;
    }
}
