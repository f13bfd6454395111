//! EAR (Eye Aspect Ratio) 计算模块
//!
//! 每只眼取 6 个关键点 p1..p6，使用单组垂直距离的简化公式：
//! EAR = |p2-p6| / |p1-p4|
//!
//! 注意这不是经典的双组平均公式 (|p2-p6| + |p3-p5|) / (2 * |p1-p4|)，
//! 阈值 0.25 是按简化公式标定的，不要替换成经典公式。

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// 单眼 6 个关键点在整张人脸关键点序列中的下标 `[p1, p2, p3, p4, p5, p6]`
pub type EyeIndexSet = [usize; 6];

/// MediaPipe face mesh 左眼下标
pub const MEDIAPIPE_LEFT_EYE: EyeIndexSet = [33, 160, 158, 133, 153, 144];

/// MediaPipe face mesh 右眼下标
pub const MEDIAPIPE_RIGHT_EYE: EyeIndexSet = [362, 385, 387, 263, 373, 380];

/// 归一化二维关键点，坐标范围 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &LandmarkPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// 从展平的 `x0, y0, x1, y1, ...` 还原关键点，坐标个数必须为偶数
    pub fn from_flat(flat: &[f64]) -> Result<Vec<LandmarkPoint>, EngineError> {
        if flat.len() % 2 != 0 {
            return Err(EngineError::OddCoordinateCount(flat.len()));
        }
        Ok(flat
            .chunks_exact(2)
            .map(|p| LandmarkPoint::new(p[0], p[1]))
            .collect())
    }
}

/// 左右眼的关键点下标，构造时注入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EyeLandmarks {
    pub left: EyeIndexSet,
    pub right: EyeIndexSet,
}

impl Default for EyeLandmarks {
    fn default() -> Self {
        Self {
            left: MEDIAPIPE_LEFT_EYE,
            right: MEDIAPIPE_RIGHT_EYE,
        }
    }
}

/// 单帧 EAR 结果
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarReading {
    pub left: f64,
    pub right: f64,
    /// 左右眼 EAR 的算术平均
    pub combined: f64,
}

/// EAR 计算器
///
/// 无内部状态，只持有左右眼的下标配置。
#[derive(Debug, Clone, Copy, Default)]
pub struct EARCalculator {
    eyes: EyeLandmarks,
}

impl EARCalculator {
    pub fn new(eyes: EyeLandmarks) -> Self {
        Self { eyes }
    }

    pub fn eyes(&self) -> &EyeLandmarks {
        &self.eyes
    }

    /// 对 6 个已取出的眼部点计算 EAR
    ///
    /// 水平距离为 0（或为 NaN）时返回 0，视为完全闭眼。
    pub fn eye_aspect_ratio(points: &[LandmarkPoint; 6]) -> f64 {
        let vertical = points[1].distance(&points[5]);
        let horizontal = points[0].distance(&points[3]);
        if horizontal > 0.0 {
            vertical / horizontal
        } else {
            0.0
        }
    }

    /// 从整张人脸关键点序列中按下标取点并计算单眼 EAR
    pub fn eye_ear(
        &self,
        landmarks: &[LandmarkPoint],
        eye: &EyeIndexSet,
    ) -> Result<f64, EngineError> {
        let mut points = [LandmarkPoint::default(); 6];
        for (slot, &index) in points.iter_mut().zip(eye.iter()) {
            *slot = *landmarks
                .get(index)
                .ok_or(EngineError::LandmarkIndexOutOfRange {
                    index,
                    len: landmarks.len(),
                })?;
        }
        Ok(Self::eye_aspect_ratio(&points))
    }

    /// 双眼联合计算：左右眼 EAR 取平均
    pub fn calculate(&self, landmarks: &[LandmarkPoint]) -> Result<EarReading, EngineError> {
        let left = self.eye_ear(landmarks, &self.eyes.left)?;
        let right = self.eye_ear(landmarks, &self.eyes.right)?;
        Ok(EarReading {
            left,
            right,
            combined: (left + right) / 2.0,
        })
    }
}
