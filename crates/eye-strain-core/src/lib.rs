//! 眼疲劳流式指标引擎
//!
//! 输入逐帧的面部关键点，实时计算眼部疲劳指标并给出累积的眼疲劳等级，
//! 会话结束时生成文本与 CSV 报告。既可作为普通 Rust 库使用，
//! 也可编译为 WebAssembly 在浏览器端运行。
//!
//! ## 模块
//! - `ear`: EAR (Eye Aspect Ratio) 眼部纵横比计算
//! - `blink`: 眨眼检测状态机
//! - `window`: 滑动时间窗口聚合（PERCLOS、眨眼率、平均眨眼时长、平均 EAR）
//! - `strain`: 眼疲劳等级分类与休息建议
//! - `report`: 会话报告（逐分钟聚合、汇总、文本/CSV 渲染）
//! - `session`: 单个会话的完整处理流水线
//! - `wasm`: 浏览器端 JS 接口

pub mod blink;
pub mod config;
pub mod ear;
pub mod error;
pub mod report;
pub mod session;
pub mod strain;
pub mod wasm;
pub mod window;

// 重新导出核心类型，方便外部使用
pub use blink::{BlinkDetector, BlinkEvent};
pub use config::{EngineConfig, ReportHistory};
pub use ear::{EARCalculator, EarReading, EyeIndexSet, EyeLandmarks, LandmarkPoint};
pub use error::{EngineError, ReportError};
pub use report::{MinuteAggregate, SessionReport, SessionReportGenerator, SessionSummary};
pub use session::{FrameUpdate, Session};
pub use strain::{RecommendationThrottle, StrainAssessment, StrainClassifier, StrainLevel};
pub use wasm::EyeStrainMonitor;
pub use window::{FrameSample, Metrics, WindowedAggregator};
