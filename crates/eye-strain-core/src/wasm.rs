//! 浏览器端 JS 接口
//!
//! 页面在每个 requestAnimationFrame 中把人脸关键点交给 `processLandmarks`，
//! 停止时调用 `stop` 获取报告，再由页面负责下载或复制到剪贴板。

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::config::EngineConfig;
use crate::ear::LandmarkPoint;
use crate::report::SessionReport;
use crate::session::Session;
use crate::strain::{StrainAssessment, StrainClassifier};
use crate::window::Metrics;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsSnapshot {
    metrics: Metrics,
    assessment: StrainAssessment,
    total_blinks: u64,
}

/// 眼疲劳监测器
///
/// 每次点击"开始"时新建一个实例，旧实例的窗口与计数随之丢弃。
#[wasm_bindgen]
pub struct EyeStrainMonitor {
    session: Session,
    report: Option<SessionReport>,
}

#[wasm_bindgen]
impl EyeStrainMonitor {
    /// 创建新的监测会话
    ///
    /// # 参数
    /// - `window_seconds`: 滑动窗口大小（秒），推荐 60
    /// - `blink_threshold`: 眨眼 EAR 阈值，推荐 0.25
    /// - `perclos_threshold`: PERCLOS 闭眼 EAR 阈值，推荐 0.25
    /// - `started_at`: 会话开始时间（秒）
    #[wasm_bindgen(constructor)]
    pub fn new(
        window_seconds: f64,
        blink_threshold: f64,
        perclos_threshold: f64,
        started_at: f64,
    ) -> Result<EyeStrainMonitor, JsError> {
        let config = EngineConfig::new(window_seconds, blink_threshold, perclos_threshold);
        Ok(Self {
            session: Session::new(config, started_at)?,
            report: None,
        })
    }

    /// 输入: 展平的关键点坐标 x0, y0, x1, y1, ...；空数组表示本帧无人脸，奇数长度报错
    ///
    /// 返回本帧的 FrameUpdate 对象，无人脸时返回 null
    #[wasm_bindgen(js_name = "processLandmarks")]
    pub fn process_landmarks(&mut self, flat: &[f64], timestamp: f64) -> Result<JsValue, JsError> {
        let landmarks = LandmarkPoint::from_flat(flat)?;
        let input = (!landmarks.is_empty()).then_some(landmarks.as_slice());
        Ok(match self.session.process_frame(input, timestamp)? {
            Some(update) => serde_wasm_bindgen::to_value(&update).unwrap_or(JsValue::NULL),
            None => JsValue::NULL,
        })
    }

    #[wasm_bindgen(js_name = "processEar")]
    pub fn process_ear(&mut self, ear: f64, timestamp: f64) -> Result<JsValue, JsError> {
        let update = self.session.process_ear(ear, timestamp)?;
        Ok(serde_wasm_bindgen::to_value(&update).unwrap_or(JsValue::NULL))
    }

    #[wasm_bindgen(js_name = "getMetrics")]
    pub fn get_metrics(&mut self, now: f64) -> JsValue {
        let metrics = self.session.metrics(now);
        let snapshot = MetricsSnapshot {
            assessment: StrainClassifier::assess(&metrics),
            metrics,
            total_blinks: self.session.total_blinks(),
        };
        serde_wasm_bindgen::to_value(&snapshot).unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = "getTotalBlinks")]
    pub fn get_total_blinks(&self) -> f64 {
        self.session.total_blinks() as f64
    }

    /// 结束会话，返回报告对象（summary + minutes）
    pub fn stop(&mut self, ended_at: f64) -> Result<JsValue, JsError> {
        let report = self.session.stop(ended_at)?;
        let value = serde_wasm_bindgen::to_value(&report).unwrap_or(JsValue::NULL);
        self.report = Some(report);
        Ok(value)
    }

    #[wasm_bindgen(js_name = "reportText")]
    pub fn report_text(&self) -> Result<String, JsError> {
        Ok(self.finished_report()?.to_text()?)
    }

    #[wasm_bindgen(js_name = "reportCsv")]
    pub fn report_csv(&self) -> Result<String, JsError> {
        Ok(self.finished_report()?.to_csv()?)
    }

    /// 下载文件名（不含扩展名）
    #[wasm_bindgen(js_name = "reportFileStem")]
    pub fn report_file_stem(&self) -> Result<String, JsError> {
        Ok(self.finished_report()?.file_stem())
    }
}

impl EyeStrainMonitor {
    fn finished_report(&self) -> Result<&SessionReport, JsError> {
        self.report
            .as_ref()
            .ok_or_else(|| JsError::new("session has not been stopped"))
    }
}
