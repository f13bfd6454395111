use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "eye-strain-monitor";

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
        }
    }
}

impl From<&Config> for LogConfig {
    fn from(config: &Config) -> Self {
        Self {
            log_level: config.log_level.clone(),
            enable_file_logs: config.enable_file_logs,
            log_dir: config.log_dir.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create rolling file appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// 安装全局 subscriber；开启文件日志时返回的 guard 必须持有到进程退出，否则缓冲日志会丢失
pub fn init_tracing(config: &LogConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let stdout_layer = fmt::layer().with_target(true).with_thread_ids(false);

    let registry = Registry::default().with(env_filter).with(stdout_layer);

    if config.enable_file_logs {
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .max_log_files(30)
            .build(&config.log_dir)?;
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = fmt::layer().with_writer(writer).with_ansi(false).json();
        tolerate_already_set(registry.with(file_layer).try_init())?;
        Ok(Some(guard))
    } else {
        tolerate_already_set(registry.try_init())?;
        Ok(None)
    }
}

// 测试中多次初始化时全局 subscriber 已存在，属于正常情况
fn tolerate_already_set(
    result: Result<(), tracing_subscriber::util::TryInitError>,
) -> Result<(), LoggingError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("already been set") => Ok(()),
        Err(e) => Err(LoggingError::Subscriber(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let cfg = LogConfig::default();
        assert!(init_tracing(&cfg).is_ok());
        assert!(init_tracing(&cfg).is_ok());
    }

    #[test]
    fn file_logs_return_guard() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = LogConfig {
            enable_file_logs: true,
            log_dir: dir.path().to_string_lossy().to_string(),
            ..LogConfig::default()
        };
        let guard = init_tracing(&cfg).expect("init with file logs");
        assert!(guard.is_some());
    }
}
