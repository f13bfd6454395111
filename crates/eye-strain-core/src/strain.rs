//! 眼疲劳等级分类模块
//!
//! 按顺序检查，首个命中的规则生效（各区间允许重叠，顺序即优先级）：
//! 1. Low: 眨眼率 >= 12 且 PERCLOS < 10% 且平均眨眼时长 < 300ms
//! 2. Mild: 8 <= 眨眼率 < 12，或 10% <= PERCLOS < 20%，或 300ms <= 时长 < 400ms
//! 3. High: 眨眼率 < 8，或 PERCLOS >= 20%，或时长 >= 400ms
//! 4. 其余情况为 Moderate

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::window::Metrics;

/// 高疲劳时展示的休息建议
pub const RECOMMENDATION_LINES: [&str; 3] = [
    "High eye strain detected!",
    "Recommendation: Follow 20-20-20 (look 20 ft away for 20 s every 20 min)",
    "Or take a 5-minute break from screens",
];

/// 眼疲劳等级，按严重程度排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StrainLevel {
    Low,
    Mild,
    Moderate,
    High,
}

impl StrainLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrainLevel::Low => "Low",
            StrainLevel::Mild => "Mild",
            StrainLevel::Moderate => "Moderate",
            StrainLevel::High => "High",
        }
    }

    /// 界面展示颜色
    pub fn color(&self) -> &'static str {
        match self {
            StrainLevel::Low => "green",
            StrainLevel::Mild => "orange",
            StrainLevel::Moderate => "yellow",
            StrainLevel::High => "red",
        }
    }

    pub fn explanation(&self) -> &'static str {
        match self {
            StrainLevel::Low => "Your eyes are healthy. Keep up good habits!",
            StrainLevel::Mild => "Some eye strain detected. Take breaks every 20 minutes.",
            StrainLevel::Moderate => {
                "Moderate strain. Follow the 20-20-20 rule: every 20 min, look 20 ft away for 20 sec."
            }
            StrainLevel::High => {
                "High eye strain! Take a break now. Rest your eyes and follow 20-20-20 rule."
            }
        }
    }
}

impl fmt::Display for StrainLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分类结果，直接交给界面层
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrainAssessment {
    pub level: StrainLevel,
    pub color: &'static str,
    pub explanation: &'static str,
}

impl From<StrainLevel> for StrainAssessment {
    fn from(level: StrainLevel) -> Self {
        Self {
            level,
            color: level.color(),
            explanation: level.explanation(),
        }
    }
}

pub struct StrainClassifier;

impl StrainClassifier {
    /// # 参数
    /// - `bpm`: 眨眼率（次/分钟）
    /// - `perclos`: PERCLOS 百分比 (0-100)
    /// - `avg_blink_ms`: 平均眨眼时长（毫秒）
    pub fn classify(bpm: f64, perclos: f64, avg_blink_ms: f64) -> StrainLevel {
        if bpm >= 12.0 && perclos < 10.0 && avg_blink_ms < 300.0 {
            return StrainLevel::Low;
        }
        if (8.0..12.0).contains(&bpm)
            || (10.0..20.0).contains(&perclos)
            || (300.0..400.0).contains(&avg_blink_ms)
        {
            return StrainLevel::Mild;
        }
        if bpm < 8.0 || perclos >= 20.0 || avg_blink_ms >= 400.0 {
            return StrainLevel::High;
        }
        StrainLevel::Moderate
    }

    pub fn assess(metrics: &Metrics) -> StrainAssessment {
        Self::classify(
            metrics.blinks_per_minute,
            metrics.perclos_percent,
            metrics.avg_blink_duration_ms,
        )
        .into()
    }
}

/// 休息建议节流器
///
/// 处于 High 等级且距上次建议超过冷却时间时才再次给出建议。
#[derive(Debug, Clone)]
pub struct RecommendationThrottle {
    cooldown_seconds: f64,
    last_issued: Option<f64>,
}

impl RecommendationThrottle {
    pub fn new(cooldown_seconds: f64) -> Self {
        Self {
            cooldown_seconds,
            last_issued: None,
        }
    }

    pub fn check(&mut self, level: StrainLevel, now: f64) -> Option<&'static [&'static str]> {
        if level != StrainLevel::High {
            return None;
        }
        let due = match self.last_issued {
            Some(last) => now - last >= self.cooldown_seconds,
            None => true,
        };
        if !due {
            return None;
        }
        self.last_issued = Some(now);
        Some(&RECOMMENDATION_LINES)
    }

    pub fn last_issued(&self) -> Option<f64> {
        self.last_issued
    }

    pub fn reset(&mut self) {
        self.last_issued = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_levels() {
        assert_eq!(StrainClassifier::classify(12.0, 5.0, 250.0), StrainLevel::Low);
        assert_eq!(StrainClassifier::classify(10.0, 5.0, 250.0), StrainLevel::Mild);
        assert_eq!(StrainClassifier::classify(5.0, 5.0, 250.0), StrainLevel::High);
    }

    #[test]
    fn mild_wins_over_high_when_both_match() {
        // perclos 落在 Mild 区间，同时 bpm < 8 命中 High，顺序决定结果
        assert_eq!(StrainClassifier::classify(5.0, 15.0, 250.0), StrainLevel::Mild);
    }

    #[test]
    fn perclos_band_alone_is_mild() {
        // bpm 满足 Low 但 PERCLOS 落在 [10, 20)，规则 2 先于兜底命中
        assert_eq!(StrainClassifier::classify(12.0, 15.0, 250.0), StrainLevel::Mild);
    }

    #[test]
    fn boundaries_follow_rule_inclusivity() {
        assert_eq!(StrainClassifier::classify(12.0, 9.999, 299.9), StrainLevel::Low);
        assert_eq!(StrainClassifier::classify(12.0, 10.0, 250.0), StrainLevel::Mild);
        assert_eq!(StrainClassifier::classify(12.0, 5.0, 300.0), StrainLevel::Mild);
        assert_eq!(StrainClassifier::classify(8.0, 5.0, 250.0), StrainLevel::Mild);
        assert_eq!(StrainClassifier::classify(7.99, 5.0, 250.0), StrainLevel::High);
        assert_eq!(StrainClassifier::classify(12.0, 20.0, 250.0), StrainLevel::High);
        assert_eq!(StrainClassifier::classify(12.0, 5.0, 400.0), StrainLevel::High);
    }

    #[test]
    fn moderate_is_the_fallback() {
        // 有限输入总会命中前三条规则之一，只有 NaN 能落到兜底
        assert_eq!(
            StrainClassifier::classify(f64::NAN, f64::NAN, f64::NAN),
            StrainLevel::Moderate
        );
    }

    #[test]
    fn assessment_carries_color_and_text() {
        let metrics = Metrics {
            blinks_per_minute: 15.0,
            perclos_percent: 2.0,
            avg_ear: 0.3,
            avg_blink_duration_ms: 150.0,
            blinks_in_window: 15,
        };
        let assessment = StrainClassifier::assess(&metrics);
        assert_eq!(assessment.level, StrainLevel::Low);
        assert_eq!(assessment.color, "green");
        assert!(assessment.explanation.contains("healthy"));
    }

    #[test]
    fn levels_are_ordered() {
        assert!(StrainLevel::Low < StrainLevel::Mild);
        assert!(StrainLevel::Mild < StrainLevel::Moderate);
        assert!(StrainLevel::Moderate < StrainLevel::High);
    }

    #[test]
    fn throttle_respects_cooldown() {
        let mut throttle = RecommendationThrottle::new(300.0);
        assert!(throttle.check(StrainLevel::Mild, 0.0).is_none());
        assert!(throttle.check(StrainLevel::High, 10.0).is_some());
        assert!(throttle.check(StrainLevel::High, 100.0).is_none());
        assert!(throttle.check(StrainLevel::High, 309.9).is_none());
        assert!(throttle.check(StrainLevel::High, 310.0).is_some());
        assert_eq!(throttle.last_issued(), Some(310.0));
    }
}
