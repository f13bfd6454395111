use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use eye_strain_monitor::config::{Config, ExportConfig, LimitsConfig};
use eye_strain_monitor::routes::build_router;
use eye_strain_monitor::state::AppState;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub report_dir: std::path::PathBuf,
    _temp_dir: TempDir,
}

async fn spawn_with_limits(limits: LimitsConfig, export_enabled: bool) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let report_dir = temp_dir.path().join("reports");

    // 直接构造 Config，避免使用 set_var 造成多线程测试环境变量竞态
    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        engine: Default::default(),
        export: ExportConfig {
            enabled: export_enabled,
            report_dir: report_dir.to_string_lossy().to_string(),
        },
        limits,
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(&config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        report_dir,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_server() -> TestApp {
    spawn_with_limits(LimitsConfig::default(), true).await
}

pub async fn spawn_test_server_without_export() -> TestApp {
    spawn_with_limits(LimitsConfig::default(), false).await
}

pub async fn spawn_test_server_with_limits(max_sessions: usize, max_sse: usize) -> TestApp {
    spawn_with_limits(
        LimitsConfig {
            max_sessions,
            max_sse_connections: max_sse,
            ..LimitsConfig::default()
        },
        true,
    )
    .await
}
