use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderName, HeaderValue};
use eye_strain_monitor::config::Config;
use eye_strain_monitor::logging::{init_tracing, LogConfig};
use eye_strain_monitor::routes::build_router;
use eye_strain_monitor::state::AppState;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

const CSP_HEADER: &str = "default-src 'none'; frame-ancestors 'none'; base-uri 'none'";
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    // guard 持有到进程退出，保证文件日志刷盘
    let _log_guard = match init_tracing(&LogConfig::from(&config)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialise logging: {e}");
            None
        }
    };
    tracing::info!(
        window_seconds = config.engine.window_seconds,
        blink_ear_thresh = config.engine.blink_ear_thresh,
        perclos_ear_thresh = config.engine.perclos_ear_thresh,
        report_history = ?config.engine.report_history,
        "Starting eye-strain-monitor"
    );

    if let Err(e) = config.engine.to_engine_config().validate() {
        tracing::error!(error = %e, "Invalid engine configuration");
        std::process::exit(1);
    }

    let cors_layer = match build_cors_layer(&config) {
        Ok(layer) => layer,
        Err(e) => {
            tracing::error!(origin = %config.cors_origin, error = %e, "Invalid CORS_ORIGIN");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(&config, shutdown_tx.clone());
    spawn_idle_sweeper(state.clone());

    let app = build_router(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("content-security-policy"),
            HeaderValue::from_static(CSP_HEADER),
        ));

    let addr = SocketAddr::new(config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind TCP listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "Listening");

    let server = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx));

    if let Err(e) = server.await {
        tracing::error!(error = %e, "HTTP server crashed");
    }
    tracing::info!("Shutdown complete");
}

fn build_cors_layer(config: &Config) -> Result<CorsLayer, header::InvalidHeaderValue> {
    let layer = CorsLayer::new()
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_methods(Any);

    if config.cors_origin.trim() == "*" {
        return Ok(layer.allow_origin(Any));
    }
    let origin = config.cors_origin.parse::<HeaderValue>()?;
    Ok(layer.allow_origin(origin))
}

/// 定期清理被客户端遗弃的会话，随关闭信号退出
fn spawn_idle_sweeper(state: AppState) {
    let mut shutdown_rx = state.shutdown_rx();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(IDLE_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = state.sessions().evict_idle(Instant::now()).await;
                    if evicted > 0 {
                        tracing::info!(evicted, "Idle sessions swept");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    });
}

/// 收到信号后广播关闭，SSE 流随之结束，服务器等待在途请求完成
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
