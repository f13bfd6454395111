//! 会话报告模块
//!
//! 会话结束时基于保留的帧样本和眨眼事件生成：
//! - 逐分钟聚合：从会话起点开始按 60 秒切分，空的分钟也输出一行
//! - 会话汇总：总帧数、总眨眼数（累计计数器）、平均眨眼时长、PERCLOS、平均 EAR、眨眼率、最终等级
//!
//! 并渲染为纯文本报告和独立 CSV，两者的分钟表格式完全一致。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blink::BlinkEvent;
use crate::config::MAX_SESSION_SECONDS;
use crate::error::ReportError;
use crate::strain::{StrainClassifier, StrainLevel};
use crate::window::{mean_blink_ms, mean_ear, perclos_percent, FrameSample};

const MINUTE_SECONDS: f64 = 60.0;

pub const CSV_HEADER: [&str; 7] = [
    "minute_index",
    "start_iso",
    "frames",
    "blinks_in_min",
    "blinks_per_min",
    "perclos",
    "avg_blink_ms",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinuteAggregate {
    pub minute_index: usize,
    pub start_iso: String,
    pub frame_count: usize,
    pub blinks_in_minute: usize,
    pub perclos_percent: f64,
    pub avg_blink_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub total_frames: usize,
    pub total_blinks: u64,
    pub avg_blink_duration_ms: f64,
    pub overall_perclos: f64,
    pub avg_ear: f64,
    pub blinks_per_minute: f64,
    pub final_level: StrainLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    /// 起止时间（秒）
    pub start: f64,
    pub end: f64,
    pub summary: SessionSummary,
    pub minutes: Vec<MinuteAggregate>,
}

/// CSV 中的一行，列名与表头一致；`blinks_per_min` 列只是 `blinks_in_min` 的重复，读取时忽略
#[derive(Debug, Deserialize)]
struct MinuteRecord {
    minute_index: usize,
    start_iso: String,
    frames: usize,
    blinks_in_min: usize,
    perclos: f64,
    avg_blink_ms: f64,
}

impl From<MinuteRecord> for MinuteAggregate {
    fn from(r: MinuteRecord) -> Self {
        Self {
            minute_index: r.minute_index,
            start_iso: r.start_iso,
            frame_count: r.frames,
            blinks_in_minute: r.blinks_in_min,
            perclos_percent: r.perclos,
            avg_blink_ms: r.avg_blink_ms,
        }
    }
}

/// 报告生成器，借用会话保留的数据
pub struct SessionReportGenerator<'a> {
    frames: &'a [FrameSample],
    blinks: &'a [BlinkEvent],
    total_blinks: u64,
}

impl<'a> SessionReportGenerator<'a> {
    /// `total_blinks` 为会话累计眨眼计数器，而不是 `blinks.len()`；窗口裁剪后两者不同
    pub fn new(frames: &'a [FrameSample], blinks: &'a [BlinkEvent], total_blinks: u64) -> Self {
        Self {
            frames,
            blinks,
            total_blinks,
        }
    }

    /// 至少一桶，至多覆盖 [`MAX_SESSION_SECONDS`]
    pub fn minute_count(start: f64, end: f64) -> usize {
        let max_minutes = (MAX_SESSION_SECONDS / MINUTE_SECONDS).ceil();
        ((end - start) / MINUTE_SECONDS)
            .ceil()
            .max(1.0)
            .min(max_minutes) as usize
    }

    /// 第 `i` 分钟覆盖 `[start + 60i, start + 60(i+1))`，帧和眨眼各扫描一遍分桶，不要求按时间排序
    pub fn aggregate_per_minute(&self, start: f64, end: f64) -> Vec<MinuteAggregate> {
        let count = Self::minute_count(start, end);
        let mut frame_buckets: Vec<Vec<&FrameSample>> = vec![Vec::new(); count];
        let mut blink_buckets: Vec<Vec<&BlinkEvent>> = vec![Vec::new(); count];
        for f in self.frames {
            if let Some(i) = bucket_index(start, count, f.timestamp) {
                frame_buckets[i].push(f);
            }
        }
        for b in self.blinks {
            if let Some(i) = bucket_index(start, count, b.start) {
                blink_buckets[i].push(b);
            }
        }

        frame_buckets
            .into_iter()
            .zip(blink_buckets)
            .enumerate()
            .map(|(i, (frames, blinks))| MinuteAggregate {
                minute_index: i,
                start_iso: iso_utc(bucket_start(start, i)),
                frame_count: frames.len(),
                blinks_in_minute: blinks.len(),
                perclos_percent: perclos_percent(frames.into_iter()),
                avg_blink_ms: mean_blink_ms(blinks.into_iter()),
            })
            .collect()
    }

    pub fn build_summary(&self, start: f64, end: f64) -> SessionSummary {
        let minutes = ((end - start) / MINUTE_SECONDS).max(1.0);
        let blinks_per_minute = self.total_blinks as f64 / minutes;
        let overall_perclos = perclos_percent(self.frames.iter());
        let avg_blink_duration_ms = mean_blink_ms(self.blinks.iter());

        SessionSummary {
            total_frames: self.frames.len(),
            total_blinks: self.total_blinks,
            avg_blink_duration_ms,
            overall_perclos,
            avg_ear: mean_ear(self.frames.iter()),
            blinks_per_minute,
            final_level: StrainClassifier::classify(
                blinks_per_minute,
                overall_perclos,
                avg_blink_duration_ms,
            ),
        }
    }

    pub fn build(&self, start: f64, end: f64) -> SessionReport {
        SessionReport {
            start,
            end,
            summary: self.build_summary(start, end),
            minutes: self.aggregate_per_minute(start, end),
        }
    }
}

impl SessionReport {
    pub fn duration_seconds(&self) -> f64 {
        self.end - self.start
    }

    /// 独立 CSV：仅包含表头和逐分钟数据
    pub fn to_csv(&self) -> Result<String, ReportError> {
        render_minute_csv(&self.minutes)
    }

    /// 纯文本报告：汇总字段 + 逐分钟 CSV 表
    pub fn to_text(&self) -> Result<String, ReportError> {
        let s = &self.summary;
        let mut out = String::from("Eye Strain Session Report\n");
        out.push_str(&format!("Start: {}\n", iso_utc(self.start)));
        out.push_str(&format!("End: {}\n", iso_utc(self.end)));
        out.push_str(&format!("Duration (s): {:.1}\n\n", self.duration_seconds()));
        out.push_str(&format!("Total frames: {}\n", s.total_frames));
        out.push_str(&format!("Total blinks: {}\n", s.total_blinks));
        out.push_str(&format!("Blinks/min: {:.2}\n", s.blinks_per_minute));
        out.push_str(&format!(
            "Avg blink duration (ms): {:.1}\n",
            s.avg_blink_duration_ms
        ));
        out.push_str(&format!("PERCLOS (%): {:.2}\n", s.overall_perclos));
        out.push_str(&format!("Avg EAR: {:.4}\n", s.avg_ear));
        out.push_str(&format!("Final strain level: {}\n\n", s.final_level));
        out.push_str("Minute-by-minute:\n");
        out.push_str(&self.to_csv()?);
        Ok(out)
    }

    /// 导出文件名（不含扩展名），按会话开始时间命名，如 `session_20240301_091500`
    pub fn file_stem(&self) -> String {
        format!("session_{}", utc(self.start).format("%Y%m%d_%H%M%S"))
    }
}

pub fn render_minute_csv(minutes: &[MinuteAggregate]) -> Result<String, ReportError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for m in minutes {
        writer.write_record([
            m.minute_index.to_string(),
            m.start_iso.clone(),
            m.frame_count.to_string(),
            m.blinks_in_minute.to_string(),
            format!("{:.1}", m.blinks_in_minute as f64),
            format!("{:.1}", m.perclos_percent),
            format!("{:.1}", m.avg_blink_ms),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Flush(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

/// 读取 CSV 产物，数值精度为渲染时的 1 位小数
pub fn parse_minute_csv(input: &str) -> Result<Vec<MinuteAggregate>, ReportError> {
    let mut reader = csv::Reader::from_reader(input.as_bytes());
    let mut minutes = Vec::new();
    for record in reader.deserialize::<MinuteRecord>() {
        let record = record?;
        DateTime::parse_from_rfc3339(&record.start_iso)
            .map_err(|e| ReportError::InvalidTimestamp(format!("{}: {e}", record.start_iso)))?;
        minutes.push(record.into());
    }
    Ok(minutes)
}

fn bucket_start(start: f64, index: usize) -> f64 {
    start + index as f64 * MINUTE_SECONDS
}

/// 先按除法估计下标，再用与边界完全相同的比较修正浮点误差
fn bucket_index(start: f64, count: usize, t: f64) -> Option<usize> {
    if t.is_nan() || t < start {
        return None;
    }
    let mut i = (((t - start) / MINUTE_SECONDS).floor() as usize).min(count);
    while i > 0 && t < bucket_start(start, i) {
        i -= 1;
    }
    while i < count && t >= bucket_start(start, i + 1) {
        i += 1;
    }
    (i < count).then_some(i)
}

fn to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis((seconds * 1000.0).round() as i64)
}

/// 能否按毫秒精度表示为 UTC 时间
pub fn is_representable(seconds: f64) -> bool {
    to_utc(seconds).is_some()
}

// `Session` 在创建和结束时已确认起止时间可表示，这里的回退值只在直接调用时出现
fn utc(seconds: f64) -> DateTime<Utc> {
    to_utc(seconds).unwrap_or_default()
}

/// 秒级时间戳转 ISO-8601 UTC，毫秒精度，如 `2024-03-01T09:15:00.000Z`
pub fn iso_utc(seconds: f64) -> String {
    utc(seconds).format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
