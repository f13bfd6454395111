//! 滑动窗口聚合模块
//!
//! 保存最近 `window_seconds` 秒内的帧样本与眨眼事件，按时间自动裁剪，
//! 并计算实时指标：
//! - PERCLOS: 窗口内闭眼帧数占比（百分比，按帧计数而非按时长加权）
//! - 眨眼率: 窗口内眨眼次数按固定窗口外推到每分钟
//! - 平均眨眼时长、平均 EAR
//!
//! 两个队列始终按时间升序，裁剪只从队首截断。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::blink::BlinkEvent;

/// 带时间戳的单帧样本
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    /// 时间戳（秒）
    pub timestamp: f64,
    pub ear: f64,
    /// 按 PERCLOS 阈值判定的闭眼状态
    pub closed: bool,
}

impl FrameSample {
    pub fn classify(timestamp: f64, ear: f64, perclos_threshold: f64) -> Self {
        Self {
            timestamp,
            ear,
            closed: ear < perclos_threshold,
        }
    }
}

/// 实时指标快照，每次请求重新计算
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub blinks_per_minute: f64,
    pub perclos_percent: f64,
    pub avg_ear: f64,
    pub avg_blink_duration_ms: f64,
    pub blinks_in_window: usize,
}

/// 滑动窗口聚合器
#[derive(Debug, Clone)]
pub struct WindowedAggregator {
    window_seconds: f64,
    perclos_threshold: f64,
    frames: VecDeque<FrameSample>,
    blinks: VecDeque<BlinkEvent>,
}

impl WindowedAggregator {
    pub fn new(window_seconds: f64, perclos_threshold: f64) -> Self {
        Self {
            window_seconds,
            perclos_threshold,
            // 约 30fps × 60s
            frames: VecDeque::with_capacity(2048),
            blinks: VecDeque::new(),
        }
    }

    /// 按 PERCLOS 阈值构造样本并追加
    pub fn record_frame(&mut self, timestamp: f64, ear: f64) -> FrameSample {
        let sample = FrameSample::classify(timestamp, ear, self.perclos_threshold);
        self.append(sample);
        sample
    }

    pub fn append(&mut self, sample: FrameSample) {
        self.frames.push_back(sample);
    }

    pub fn record_blink(&mut self, event: BlinkEvent) {
        self.blinks.push_back(event);
    }

    /// 移除窗口外的旧数据，眨眼按起始时间判断
    pub fn purge(&mut self, now: f64) {
        let cutoff = now - self.window_seconds;
        while let Some(front) = self.frames.front() {
            if front.timestamp < cutoff {
                self.frames.pop_front();
            } else {
                break;
            }
        }
        while let Some(front) = self.blinks.front() {
            if front.start < cutoff {
                self.blinks.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn compute_metrics(&mut self, now: f64) -> Metrics {
        self.purge(now);

        if self.frames.is_empty() {
            return Metrics::default();
        }

        let blinks_in_window = self.blinks.len();
        Metrics {
            // 固定窗口外推，会话前 window_seconds 秒内会低估
            blinks_per_minute: blinks_in_window as f64 * (60.0 / self.window_seconds),
            perclos_percent: perclos_percent(self.frames.iter()),
            avg_ear: mean_ear(self.frames.iter()),
            avg_blink_duration_ms: mean_blink_ms(self.blinks.iter()),
            blinks_in_window,
        }
    }

    pub fn frames(&self) -> &VecDeque<FrameSample> {
        &self.frames
    }

    pub fn blinks(&self) -> &VecDeque<BlinkEvent> {
        &self.blinks
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    pub fn perclos_threshold(&self) -> f64 {
        self.perclos_threshold
    }

    pub fn reset(&mut self) {
        self.frames.clear();
        self.blinks.clear();
    }
}

pub(crate) fn perclos_percent<'a>(frames: impl Iterator<Item = &'a FrameSample>) -> f64 {
    let (closed, total) = frames.fold((0usize, 0usize), |(closed, total), f| {
        (closed + usize::from(f.closed), total + 1)
    });
    if total == 0 {
        return 0.0;
    }
    100.0 * closed as f64 / total as f64
}

pub(crate) fn mean_ear<'a>(frames: impl Iterator<Item = &'a FrameSample>) -> f64 {
    mean(frames.map(|f| f.ear))
}

pub(crate) fn mean_blink_ms<'a>(blinks: impl Iterator<Item = &'a BlinkEvent>) -> f64 {
    mean(blinks.map(|b| b.duration_ms))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
