use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use eye_strain_core::config::{
    DEFAULT_BLINK_EAR_THRESH, DEFAULT_PERCLOS_EAR_THRESH,
    DEFAULT_RECOMMENDATION_COOLDOWN_SECONDS, DEFAULT_WINDOW_SECONDS,
};
use eye_strain_core::{EngineConfig, ReportHistory};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub cors_origin: String,
    pub engine: EngineEnvConfig,
    pub export: ExportConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone)]
pub struct EngineEnvConfig {
    pub window_seconds: f64,
    pub blink_ear_thresh: f64,
    pub perclos_ear_thresh: f64,
    pub recommendation_cooldown_secs: f64,
    pub report_history: ReportHistory,
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub enabled: bool,
    pub report_dir: String,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_sessions: usize,
    pub max_sse_connections: usize,
    /// 会话闲置超过该时长后被清理
    pub session_idle_ttl_secs: u64,
}

impl Default for EngineEnvConfig {
    fn default() -> Self {
        Self {
            window_seconds: DEFAULT_WINDOW_SECONDS,
            blink_ear_thresh: DEFAULT_BLINK_EAR_THRESH,
            perclos_ear_thresh: DEFAULT_PERCLOS_EAR_THRESH,
            recommendation_cooldown_secs: DEFAULT_RECOMMENDATION_COOLDOWN_SECONDS,
            report_history: ReportHistory::Full,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_dir: "./reports".to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            max_sse_connections: 32,
            session_idle_ttl_secs: 1800,
        }
    }
}

impl EngineEnvConfig {
    /// 眼部下标使用 MediaPipe face mesh 默认值
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            window_seconds: self.window_seconds,
            blink_ear_threshold: self.blink_ear_thresh,
            perclos_ear_threshold: self.perclos_ear_thresh,
            recommendation_cooldown_seconds: self.recommendation_cooldown_secs,
            report_history: self.report_history,
            ..EngineConfig::default()
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            engine: EngineEnvConfig {
                window_seconds: env_or_parse("WINDOW_SECONDS", DEFAULT_WINDOW_SECONDS),
                blink_ear_thresh: env_or_parse("BLINK_EAR_THRESH", DEFAULT_BLINK_EAR_THRESH),
                perclos_ear_thresh: env_or_parse("PERCLOS_EAR_THRESH", DEFAULT_PERCLOS_EAR_THRESH),
                recommendation_cooldown_secs: env_or_parse(
                    "RECOMMENDATION_COOLDOWN_SECS",
                    DEFAULT_RECOMMENDATION_COOLDOWN_SECONDS,
                ),
                report_history: env_or_parse("REPORT_HISTORY", ReportHistory::Full),
            },
            export: ExportConfig {
                enabled: env_or_bool("EXPORT_REPORTS", true),
                report_dir: env_or("REPORT_DIR", "./reports"),
            },
            limits: LimitsConfig {
                max_sessions: env_or_parse("MAX_SESSIONS", 64_usize),
                max_sse_connections: env_or_parse("MAX_SSE_CONNECTIONS", 32_usize),
                session_idle_ttl_secs: env_or_parse("SESSION_IDLE_TTL_SECS", 1800_u64),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
